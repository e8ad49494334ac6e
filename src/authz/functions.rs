//! Builtin matcher functions for path and pattern matching.

use std::collections::HashMap;

use parking_lot::RwLock;
use regex::Regex;

use crate::authz::errors::{AuthzError, AuthzResult};

/// Distinct patterns kept by a [`RegexCache`] before it starts over.
const REGEX_CACHE_CAPACITY: usize = 1024;

/// Glob match where `*` stands for any run of characters, including none.
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let (mut p_idx, mut v_idx) = (0usize, 0usize);
    let (mut star_idx, mut match_idx) = (None, 0usize);
    let pattern_bytes = pattern.as_bytes();
    let value_bytes = value.as_bytes();

    while v_idx < value_bytes.len() {
        if p_idx < pattern_bytes.len() && pattern_bytes[p_idx] == b'*' {
            star_idx = Some(p_idx);
            match_idx = v_idx;
            p_idx += 1;
            continue;
        }

        if p_idx < pattern_bytes.len() && pattern_bytes[p_idx] == value_bytes[v_idx] {
            p_idx += 1;
            v_idx += 1;
            continue;
        }

        if let Some(star) = star_idx {
            p_idx = star + 1;
            match_idx += 1;
            v_idx = match_idx;
            continue;
        }

        return false;
    }

    while p_idx < pattern_bytes.len() && pattern_bytes[p_idx] == b'*' {
        p_idx += 1;
    }

    p_idx == pattern_bytes.len()
}

/// `keyMatch(key, pattern)`: `/data/*` matches `/data/` and anything below it.
pub fn key_match(key: &str, pattern: &str) -> bool {
    wildcard_match(pattern, key)
}

/// `keyMatch2(key, pattern)`: path segments compared one by one. A `:name`
/// segment matches exactly one non-empty segment and a trailing `*` segment
/// matches the rest of the path.
pub fn key_match2(key: &str, pattern: &str) -> bool {
    let mut keys = key.split('/');
    let mut patterns = pattern.split('/').peekable();

    loop {
        match (patterns.next(), keys.next()) {
            (None, None) => return true,
            (Some("*"), Some(_)) if patterns.peek().is_none() => return true,
            (Some(p), Some(k)) => {
                let ok = if p.starts_with(':') {
                    !k.is_empty()
                } else if p.contains('*') {
                    wildcard_match(p, k)
                } else {
                    p == k
                };
                if !ok {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

pub fn compile_regex(pattern: &str) -> AuthzResult<Regex> {
    Regex::new(pattern).map_err(|e| AuthzError::Eval(format!("invalid regex `{pattern}`: {e}")))
}

/// Compiled `regexMatch` patterns that come from rule fields, keyed by source text.
/// Once full it is emptied and refilled from the patterns still in use.
#[derive(Debug, Default)]
pub struct RegexCache {
    compiled: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    /// `regexMatch(value, pattern)`, compiling `pattern` at most once while cached.
    pub fn is_match(&self, value: &str, pattern: &str) -> AuthzResult<bool> {
        if let Some(re) = self.compiled.read().get(pattern) {
            return Ok(re.is_match(value));
        }
        let re = compile_regex(pattern)?;
        let matched = re.is_match(value);

        let mut compiled = self.compiled.write();
        if compiled.len() >= REGEX_CACHE_CAPACITY {
            tracing::debug!(patterns = compiled.len(), "Regex cache full, clearing");
            compiled.clear();
        }
        compiled.insert(pattern.to_string(), re);
        Ok(matched)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.compiled.read().len()
    }
}
