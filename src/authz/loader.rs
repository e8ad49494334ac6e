use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::authz::errors::{AuthzError, AuthzResult};
use crate::authz::types::{PolicyRule, RuleSet};

/// Durable source of policy and grouping rules.
///
/// `load_policy` returns the complete stored rule set; `save_policy` replaces the
/// stored rule set with the given one. Neither merges with existing content.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn load_policy(&self) -> AuthzResult<RuleSet>;
    async fn save_policy(&self, rules: &RuleSet) -> AuthzResult<()>;
}

#[async_trait]
impl<A: Adapter + ?Sized> Adapter for Box<A> {
    async fn load_policy(&self) -> AuthzResult<RuleSet> {
        (**self).load_policy().await
    }

    async fn save_policy(&self, rules: &RuleSet) -> AuthzResult<()> {
        (**self).save_policy(rules).await
    }
}

/// Comma-separated policy file, one rule per row: `ptype, field1, field2, ...`.
#[derive(Debug, Clone)]
pub struct FileAdapter {
    path: PathBuf,
}

impl FileAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Adapter for FileAdapter {
    async fn load_policy(&self) -> AuthzResult<RuleSet> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| AuthzError::Storage {
                path: self.path.display().to_string(),
                source,
            })?;
        let rules = parse_policy_text(&contents)?;

        tracing::info!(
            path = %self.path.display(),
            policies = rules.policies.len(),
            groupings = rules.groupings.len(),
            "Loaded policy file"
        );
        Ok(rules)
    }

    async fn save_policy(&self, rules: &RuleSet) -> AuthzResult<()> {
        let text = render_policy_text(rules)?;
        let path = self.path.clone();
        let count = rules.len();

        tokio::task::spawn_blocking(move || write_atomically(&path, &text))
            .await
            .map_err(|e| AuthzError::Storage {
                path: self.path.display().to_string(),
                source: std::io::Error::other(e),
            })??;

        tracing::info!(path = %self.path.display(), rules = count, "Saved policy file");
        Ok(())
    }
}

/// Write to a sibling temp file, then rename it over `path`, so readers see
/// either the old or the new file and a failed write leaves the old one intact.
fn write_atomically(path: &Path, text: &str) -> AuthzResult<()> {
    let storage_err = |source| AuthzError::Storage {
        path: path.display().to_string(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(storage_err)?;
    tmp.write_all(text.as_bytes()).map_err(storage_err)?;
    tmp.as_file().sync_all().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

/// Parse policy rows. Blank lines and lines starting with `#` are skipped.
pub fn parse_policy_text(text: &str) -> AuthzResult<RuleSet> {
    let mut rules = RuleSet::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = split_row(line, idx + 1)?;
        let ptype = fields.remove(0);
        if ptype.is_empty() {
            return Err(AuthzError::MalformedRow {
                row: idx + 1,
                message: "missing policy type".into(),
            });
        }
        if fields.is_empty() {
            return Err(AuthzError::MalformedRow {
                row: idx + 1,
                message: format!("`{ptype}` row has no fields"),
            });
        }
        rules.push(PolicyRule { ptype, fields });
    }
    Ok(rules)
}

/// Render rows in the format read by [`parse_policy_text`]: policies first, then groupings.
/// Fields holding a line break cannot be represented and are rejected.
pub fn render_policy_text(rules: &RuleSet) -> AuthzResult<String> {
    let mut out = String::new();
    for rule in rules.iter() {
        if let Some(index) = rule.fields.iter().position(|f| f.contains(['\r', '\n'])) {
            return Err(AuthzError::InvalidField {
                ptype: rule.ptype.clone(),
                index,
            });
        }
        out.push_str(&rule.ptype);
        for field in &rule.fields {
            out.push_str(", ");
            out.push_str(&quote_field(field));
        }
        out.push('\n');
    }
    Ok(out)
}

/// Split one row on commas. Fields are trimmed; a field wrapped in double quotes
/// may contain commas and uses `""` for a literal quote.
fn split_row(line: &str, row: usize) -> AuthzResult<Vec<String>> {
    let malformed = |message: &str| AuthzError::MalformedRow {
        row,
        message: message.to_string(),
    };
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut field = String::new();
        if chars.next_if_eq(&'"').is_some() {
            loop {
                match chars.next() {
                    Some('"') if chars.next_if_eq(&'"').is_some() => field.push('"'),
                    Some('"') => break,
                    Some(c) => field.push(c),
                    None => return Err(malformed("unterminated quoted field")),
                }
            }
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if !matches!(chars.peek(), None | Some(',')) {
                return Err(malformed("unexpected text after quoted field"));
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != ',') {
                field.push(c);
            }
            field.truncate(field.trim_end().len());
        }
        fields.push(field);

        if chars.next().is_none() {
            return Ok(fields);
        }
    }
}

fn quote_field(field: &str) -> String {
    let needs_quotes = field.contains([',', '"'])
        || field.starts_with(char::is_whitespace)
        || field.ends_with(char::is_whitespace);
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
