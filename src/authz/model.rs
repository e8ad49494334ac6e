//! Model definition parser.
//!
//! A model is a line-oriented text document:
//!
//! ```text
//! [request_definition]
//! r = sub, obj, act
//!
//! [policy_definition]
//! p = sub, obj, act
//!
//! [role_definition]
//! g = _, _
//!
//! [policy_effect]
//! e = some(where (p.eft == allow))
//!
//! [matchers]
//! m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
//! ```
//!
//! Section headers are optional. Lines starting with `#` are comments and a
//! trailing `\` joins a line with the next one.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;

use crate::authz::errors::{AuthzError, AuthzResult};

/// Name of the reserved policy field carrying a rule's effect.
pub const EFFECT_FIELD: &str = "eft";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    Request,
    Policy,
    Role,
    Effect,
    Matcher,
}

impl SectionKind {
    fn from_header(header: &str) -> Option<Self> {
        match header {
            "request_definition" => Some(Self::Request),
            "policy_definition" => Some(Self::Policy),
            "role_definition" => Some(Self::Role),
            "policy_effect" => Some(Self::Effect),
            "matchers" => Some(Self::Matcher),
            _ => None,
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "r" => Some(Self::Request),
            "e" => Some(Self::Effect),
            "m" => Some(Self::Matcher),
            _ => {
                let (kind, suffix) = if let Some(rest) = key.strip_prefix('p') {
                    (Self::Policy, rest)
                } else if let Some(rest) = key.strip_prefix('g') {
                    (Self::Role, rest)
                } else {
                    return None;
                };
                // p, p2, p3, ... (no p0 / p1 / p01)
                let numbered = suffix.chars().all(|c| c.is_ascii_digit())
                    && !suffix.starts_with('0')
                    && suffix != "1";
                (suffix.is_empty() || numbered).then_some(kind)
            }
        }
    }
}

/// Parsed authorization model. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    /// Field names of the request definition, in order.
    pub request: Vec<String>,
    /// ptype -> field names.
    pub policies: BTreeMap<String, Vec<String>>,
    /// gtype -> number of `_` placeholders (2, or 3 with a domain).
    pub roles: BTreeMap<String, usize>,
    /// Raw policy effect expression.
    pub effect: String,
    /// Raw matcher expression.
    pub matcher: String,
}

impl Model {
    pub fn parse(text: &str) -> AuthzResult<Self> {
        let mut request = None;
        let mut policies = BTreeMap::new();
        let mut roles = BTreeMap::new();
        let mut effect = None;
        let mut matcher = None;
        let mut seen = HashSet::new();
        let mut current: Option<SectionKind> = None;

        for (line_no, line) in logical_lines(text) {
            if let Some(header) = line.strip_prefix('[') {
                let header = header.strip_suffix(']').ok_or_else(|| {
                    AuthzError::ModelParse(format!("line {line_no}: unterminated section header"))
                })?;
                current = Some(SectionKind::from_header(header.trim()).ok_or_else(|| {
                    AuthzError::ModelParse(format!(
                        "line {line_no}: unknown section `[{}]`",
                        header.trim()
                    ))
                })?);
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                AuthzError::ModelParse(format!("line {line_no}: expected `key = value`"))
            })?;
            let key = key.trim();
            let value = value.trim();

            let kind = SectionKind::from_key(key).ok_or_else(|| {
                AuthzError::ModelParse(format!("line {line_no}: unknown section key `{key}`"))
            })?;
            if let Some(header_kind) = current {
                if header_kind != kind {
                    return Err(AuthzError::ModelParse(format!(
                        "line {line_no}: key `{key}` does not belong in this section"
                    )));
                }
            }
            if !seen.insert(key.to_string()) {
                return Err(AuthzError::ModelParse(format!(
                    "line {line_no}: duplicate definition of `{key}`"
                )));
            }
            if value.is_empty() {
                return Err(AuthzError::ModelParse(format!(
                    "line {line_no}: `{key}` has an empty definition"
                )));
            }

            match kind {
                SectionKind::Request => request = Some(field_list(key, value, line_no)?),
                SectionKind::Policy => {
                    policies.insert(key.to_string(), field_list(key, value, line_no)?);
                }
                SectionKind::Role => {
                    roles.insert(key.to_string(), placeholder_count(key, value, line_no)?);
                }
                SectionKind::Effect => effect = Some(value.to_string()),
                SectionKind::Matcher => matcher = Some(value.to_string()),
            }
        }

        let request = request
            .ok_or_else(|| AuthzError::ModelParse("missing request definition `r`".into()))?;
        if policies.is_empty() {
            return Err(AuthzError::ModelParse(
                "missing policy definition `p`".into(),
            ));
        }
        let effect =
            effect.ok_or_else(|| AuthzError::ModelParse("missing policy effect `e`".into()))?;
        let matcher =
            matcher.ok_or_else(|| AuthzError::ModelParse("missing matcher `m`".into()))?;

        Ok(Self {
            request,
            policies,
            roles,
            effect,
            matcher,
        })
    }

    pub fn from_file(path: &Path) -> AuthzResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| AuthzError::Storage {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn policy_fields(&self, ptype: &str) -> Option<&[String]> {
        self.policies.get(ptype).map(|v| v.as_slice())
    }

    pub fn request_index(&self, name: &str) -> Option<usize> {
        self.request.iter().position(|f| f == name)
    }

    pub fn policy_index(&self, ptype: &str, name: &str) -> Option<usize> {
        self.policy_fields(ptype)?.iter().position(|f| f == name)
    }

    /// Position of the `eft` field in the given policy type, if declared.
    pub fn effect_index(&self, ptype: &str) -> Option<usize> {
        self.policy_index(ptype, EFFECT_FIELD)
    }
}

impl FromStr for Model {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Yield trimmed, non-empty, non-comment lines with `\` continuations joined,
/// paired with the 1-based number of the line they start on.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if pending.is_none() && (line.is_empty() || line.starts_with('#')) {
            continue;
        }
        let (continues, body) = match line.strip_suffix('\\') {
            Some(body) => (true, body.trim_end()),
            None => (false, line),
        };
        let entry = pending.get_or_insert_with(|| (idx + 1, String::new()));
        if !entry.1.is_empty() {
            entry.1.push(' ');
        }
        entry.1.push_str(body);
        if !continues {
            if let Some(done) = pending.take() {
                out.push(done);
            }
        }
    }
    if let Some(done) = pending {
        out.push(done);
    }
    out
}

fn field_list(key: &str, value: &str, line_no: usize) -> AuthzResult<Vec<String>> {
    let mut fields = Vec::new();
    for field in value.split(',').map(str::trim) {
        let valid = field
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(AuthzError::ModelParse(format!(
                "line {line_no}: invalid field name `{field}` in `{key}`"
            )));
        }
        if fields.iter().any(|f| f == field) {
            return Err(AuthzError::ModelParse(format!(
                "line {line_no}: field `{field}` declared twice in `{key}`"
            )));
        }
        fields.push(field.to_string());
    }
    Ok(fields)
}

fn placeholder_count(key: &str, value: &str, line_no: usize) -> AuthzResult<usize> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.iter().any(|p| *p != "_") || !(2..=3).contains(&parts.len()) {
        return Err(AuthzError::ModelParse(format!(
            "line {line_no}: role definition `{key}` must be `_, _` or `_, _, _`"
        )));
    }
    Ok(parts.len())
}
