//! Policy and grouping rule management on [`Enforcer`].
//!
//! Unnamed variants operate on `p` and `g`. Every mutation is applied to a copy
//! of the current state and published only if it succeeds as a whole.

use crate::authz::engine::Enforcer;
use crate::authz::errors::AuthzResult;

pub(crate) const DEFAULT_PTYPE: &str = "p";
pub(crate) const DEFAULT_GTYPE: &str = "g";

pub(crate) fn to_fields<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    values.iter().map(|v| v.as_ref().to_string()).collect()
}

fn to_filter<S: AsRef<str>>(values: &[S]) -> Vec<&str> {
    values.iter().map(AsRef::as_ref).collect()
}

impl Enforcer {
    // ─── Policy rules ──────────────────────────────────────────────────

    pub fn get_policy(&self) -> Vec<Vec<String>> {
        self.get_named_policy(DEFAULT_PTYPE)
    }

    pub fn get_named_policy(&self, ptype: &str) -> Vec<Vec<String>> {
        self.snapshot().policies.all_policies(ptype).to_vec()
    }

    /// Rules of `p` whose fields from `field_index` on equal `values`; an empty
    /// value matches any field.
    pub fn get_filtered_policy<S: AsRef<str>>(
        &self,
        field_index: usize,
        values: &[S],
    ) -> Vec<Vec<String>> {
        self.get_filtered_named_policy(DEFAULT_PTYPE, field_index, values)
    }

    pub fn get_filtered_named_policy<S: AsRef<str>>(
        &self,
        ptype: &str,
        field_index: usize,
        values: &[S],
    ) -> Vec<Vec<String>> {
        self.snapshot()
            .policies
            .get_filtered_policy(ptype, field_index, &to_filter(values))
    }

    pub fn has_policy<S: AsRef<str>>(&self, rule: &[S]) -> bool {
        self.has_named_policy(DEFAULT_PTYPE, rule)
    }

    pub fn has_named_policy<S: AsRef<str>>(&self, ptype: &str, rule: &[S]) -> bool {
        self.snapshot().policies.has_policy(ptype, &to_fields(rule))
    }

    /// Returns `false` if the rule was already present.
    pub fn add_policy<S: AsRef<str>>(&self, rule: &[S]) -> AuthzResult<bool> {
        self.add_named_policy(DEFAULT_PTYPE, rule)
    }

    pub fn add_named_policy<S: AsRef<str>>(&self, ptype: &str, rule: &[S]) -> AuthzResult<bool> {
        let fields = to_fields(rule);
        let added = self.mutate(|s| s.add_rule(ptype, fields.clone()))?;
        tracing::debug!(ptype, rule = ?fields, added, "Add rule");
        Ok(added)
    }

    /// Add several `p` rules at once. Either every rule is valid and the new
    /// ones are inserted, or nothing changes. Returns whether any rule was new.
    pub fn add_policies<S: AsRef<str>>(&self, rules: &[Vec<S>]) -> AuthzResult<bool> {
        self.add_named_policies(DEFAULT_PTYPE, rules)
    }

    pub fn add_named_policies<S: AsRef<str>>(
        &self,
        ptype: &str,
        rules: &[Vec<S>],
    ) -> AuthzResult<bool> {
        let added = self.mutate(|s| {
            let mut added = false;
            for rule in rules {
                added |= s.add_rule(ptype, to_fields(rule))?;
            }
            Ok(added)
        })?;
        tracing::debug!(ptype, count = rules.len(), added, "Add rules");
        Ok(added)
    }

    /// Returns `false` if no such rule was present.
    pub fn remove_policy<S: AsRef<str>>(&self, rule: &[S]) -> AuthzResult<bool> {
        self.remove_named_policy(DEFAULT_PTYPE, rule)
    }

    pub fn remove_named_policy<S: AsRef<str>>(
        &self,
        ptype: &str,
        rule: &[S],
    ) -> AuthzResult<bool> {
        let fields = to_fields(rule);
        let removed = self.mutate(|s| s.remove_rule(ptype, &fields))?;
        tracing::debug!(ptype, rule = ?fields, removed, "Remove rule");
        Ok(removed)
    }

    pub fn remove_filtered_policy<S: AsRef<str>>(
        &self,
        field_index: usize,
        values: &[S],
    ) -> AuthzResult<bool> {
        self.remove_filtered_named_policy(DEFAULT_PTYPE, field_index, values)
    }

    pub fn remove_filtered_named_policy<S: AsRef<str>>(
        &self,
        ptype: &str,
        field_index: usize,
        values: &[S],
    ) -> AuthzResult<bool> {
        let filter = to_filter(values);
        let removed = self.mutate(|s| s.remove_filtered(ptype, field_index, &filter))?;
        tracing::debug!(ptype, field_index, removed = removed.len(), "Remove filtered rules");
        Ok(!removed.is_empty())
    }

    // ─── Grouping rules ────────────────────────────────────────────────

    pub fn get_grouping_policy(&self) -> Vec<Vec<String>> {
        self.get_named_grouping_policy(DEFAULT_GTYPE)
    }

    pub fn get_named_grouping_policy(&self, gtype: &str) -> Vec<Vec<String>> {
        self.get_named_policy(gtype)
    }

    pub fn get_filtered_grouping_policy<S: AsRef<str>>(
        &self,
        field_index: usize,
        values: &[S],
    ) -> Vec<Vec<String>> {
        self.get_filtered_named_policy(DEFAULT_GTYPE, field_index, values)
    }

    pub fn has_grouping_policy<S: AsRef<str>>(&self, rule: &[S]) -> bool {
        self.has_named_policy(DEFAULT_GTYPE, rule)
    }

    /// Add a `g` link: `[member, role]` or `[member, role, domain]`.
    pub fn add_grouping_policy<S: AsRef<str>>(&self, rule: &[S]) -> AuthzResult<bool> {
        self.add_named_grouping_policy(DEFAULT_GTYPE, rule)
    }

    pub fn add_named_grouping_policy<S: AsRef<str>>(
        &self,
        gtype: &str,
        rule: &[S],
    ) -> AuthzResult<bool> {
        self.add_named_policy(gtype, rule)
    }

    pub fn remove_grouping_policy<S: AsRef<str>>(&self, rule: &[S]) -> AuthzResult<bool> {
        self.remove_named_grouping_policy(DEFAULT_GTYPE, rule)
    }

    pub fn remove_named_grouping_policy<S: AsRef<str>>(
        &self,
        gtype: &str,
        rule: &[S],
    ) -> AuthzResult<bool> {
        self.remove_named_policy(gtype, rule)
    }

    pub fn remove_filtered_grouping_policy<S: AsRef<str>>(
        &self,
        field_index: usize,
        values: &[S],
    ) -> AuthzResult<bool> {
        self.remove_filtered_named_policy(DEFAULT_GTYPE, field_index, values)
    }
}
