use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::authz::errors::AuthzError;

/// One stored rule: the policy or grouping type tag followed by its ordered fields.
///
/// Grouping rows (`g`, `g2`, ...) use the same shape: `fields[0]` is the member,
/// `fields[1]` the role and an optional `fields[2]` the domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRule {
    pub ptype: String,
    pub fields: Vec<String>,
}

impl PolicyRule {
    pub fn new<I, S>(ptype: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ptype: ptype.to_string(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_grouping(&self) -> bool {
        is_grouping_type(&self.ptype)
    }
}

impl std::fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ptype)?;
        for field in &self.fields {
            write!(f, ", {field}")?;
        }
        Ok(())
    }
}

/// Grouping types are the `g`, `g2`, ... families; everything else is a policy family.
pub fn is_grouping_type(ptype: &str) -> bool {
    ptype.starts_with('g')
}

/// The complete rule set exchanged with persistence adapters, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    pub policies: Vec<PolicyRule>,
    pub groupings: Vec<PolicyRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a rule to the policy or grouping list by its type tag.
    pub fn push(&mut self, rule: PolicyRule) {
        if rule.is_grouping() {
            self.groupings.push(rule);
        } else {
            self.policies.push(rule);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PolicyRule> {
        self.policies.iter().chain(self.groupings.iter())
    }

    pub fn len(&self) -> usize {
        self.policies.len() + self.groupings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<PolicyRule> for RuleSet {
    fn from_iter<T: IntoIterator<Item = PolicyRule>>(iter: T) -> Self {
        let mut set = RuleSet::new();
        for rule in iter {
            set.push(rule);
        }
        set
    }
}

/// Verdict attached to a policy rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl FromStr for Effect {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Effect::Allow),
            "deny" => Ok(Effect::Deny),
            other => Err(AuthzError::InvalidEffectValue(other.to_string())),
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Allow => write!(f, "allow"),
            Effect::Deny => write!(f, "deny"),
        }
    }
}

/// Outcome of an enforcement call with the rules that decided it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnforceResult {
    pub allowed: bool,
    pub explain: Vec<PolicyRule>,
}
