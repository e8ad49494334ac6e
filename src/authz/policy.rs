//! In-memory rule sets, one per policy or grouping type declared by the model.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::authz::errors::{AuthzError, AuthzResult};
use crate::authz::model::Model;
use crate::authz::types::Effect;

#[derive(Debug, Clone, Default)]
struct Assertion {
    arity: usize,
    effect_index: Option<usize>,
    rules: Vec<Vec<String>>,
    index: HashSet<Vec<String>>,
}

impl Assertion {
    fn validate(&self, ptype: &str, fields: &[String]) -> AuthzResult<()> {
        if fields.len() != self.arity {
            return Err(AuthzError::RuleArity {
                ptype: ptype.to_string(),
                expected: self.arity,
                actual: fields.len(),
            });
        }
        if let Some(index) = fields.iter().position(|f| f.contains(['\r', '\n'])) {
            return Err(AuthzError::InvalidField {
                ptype: ptype.to_string(),
                index,
            });
        }
        if let Some(idx) = self.effect_index {
            fields[idx].parse::<Effect>()?;
        }
        Ok(())
    }
}

/// Rule storage keyed by type tag. Each rule set sits behind an `Arc` so cloning
/// the store only copies the sets that are later mutated.
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    assertions: BTreeMap<String, Arc<Assertion>>,
}

impl PolicyStore {
    /// Empty store accepting exactly the policy and grouping types of `model`.
    pub fn for_model(model: &Model) -> Self {
        let mut assertions = BTreeMap::new();
        for (ptype, fields) in &model.policies {
            assertions.insert(
                ptype.clone(),
                Arc::new(Assertion {
                    arity: fields.len(),
                    effect_index: model.effect_index(ptype),
                    ..Default::default()
                }),
            );
        }
        for (gtype, arity) in &model.roles {
            assertions.insert(
                gtype.clone(),
                Arc::new(Assertion {
                    arity: *arity,
                    ..Default::default()
                }),
            );
        }
        Self { assertions }
    }

    fn assertion(&self, ptype: &str) -> AuthzResult<&Assertion> {
        self.assertions
            .get(ptype)
            .map(|a| a.as_ref())
            .ok_or_else(|| AuthzError::UnknownPolicyType(ptype.to_string()))
    }

    fn assertion_mut(&mut self, ptype: &str) -> AuthzResult<&mut Assertion> {
        self.assertions
            .get_mut(ptype)
            .map(Arc::make_mut)
            .ok_or_else(|| AuthzError::UnknownPolicyType(ptype.to_string()))
    }

    /// Check a rule against its type's arity and effect field without inserting it.
    pub fn validate(&self, ptype: &str, fields: &[String]) -> AuthzResult<()> {
        self.assertion(ptype)?.validate(ptype, fields)
    }

    /// Insert unless an identical rule is present. Returns whether it was inserted.
    pub fn add_policy(&mut self, ptype: &str, fields: Vec<String>) -> AuthzResult<bool> {
        self.validate(ptype, &fields)?;
        if self.assertion(ptype)?.index.contains(&fields) {
            return Ok(false);
        }
        let assertion = self.assertion_mut(ptype)?;
        assertion.index.insert(fields.clone());
        assertion.rules.push(fields);
        Ok(true)
    }

    pub fn remove_policy(&mut self, ptype: &str, fields: &[String]) -> AuthzResult<bool> {
        if !self.assertion(ptype)?.index.contains(fields) {
            return Ok(false);
        }
        let assertion = self.assertion_mut(ptype)?;
        assertion.index.remove(fields);
        assertion.rules.retain(|r| r.as_slice() != fields);
        Ok(true)
    }

    pub fn has_policy(&self, ptype: &str, fields: &[String]) -> bool {
        self.assertions
            .get(ptype)
            .is_some_and(|a| a.index.contains(fields))
    }

    /// Rules whose fields starting at `field_index` equal `values` positionally.
    /// An empty value matches anything at its position.
    pub fn get_filtered_policy(
        &self,
        ptype: &str,
        field_index: usize,
        values: &[&str],
    ) -> Vec<Vec<String>> {
        self.all_policies(ptype)
            .iter()
            .filter(|rule| filter_matches(rule, field_index, values))
            .cloned()
            .collect()
    }

    /// Remove every rule selected by the filter, returning the removed rules.
    pub fn remove_filtered_policy(
        &mut self,
        ptype: &str,
        field_index: usize,
        values: &[&str],
    ) -> AuthzResult<Vec<Vec<String>>> {
        let removed = self.get_filtered_policy(ptype, field_index, values);
        if removed.is_empty() {
            self.assertion(ptype)?;
            return Ok(removed);
        }
        let assertion = self.assertion_mut(ptype)?;
        assertion
            .rules
            .retain(|rule| !filter_matches(rule, field_index, values));
        for rule in &removed {
            assertion.index.remove(rule);
        }
        Ok(removed)
    }

    /// All rules of `ptype` in insertion order.
    pub fn all_policies(&self, ptype: &str) -> &[Vec<String>] {
        self.assertions
            .get(ptype)
            .map(|a| a.rules.as_slice())
            .unwrap_or(&[])
    }

    pub fn ptypes(&self) -> impl Iterator<Item = &str> {
        self.assertions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.assertions.values().map(|a| a.rules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn filter_matches(rule: &[String], field_index: usize, values: &[&str]) -> bool {
    values.iter().enumerate().all(|(i, value)| {
        value.is_empty()
            || rule
                .get(field_index + i)
                .is_some_and(|field| field == value)
    })
}
