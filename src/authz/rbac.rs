//! Role-based access API on [`Enforcer`], built on the `p` and `g` rule types.
//!
//! Domain variants take `Some(domain)`; grouping rows for them carry the domain
//! as their third field and require a `g = _, _, _` role definition.

use std::collections::HashSet;

use crate::authz::engine::Enforcer;
use crate::authz::errors::AuthzResult;
use crate::authz::management::{to_fields, DEFAULT_GTYPE, DEFAULT_PTYPE};

/// Policy field that holds the domain in domain-scoped models.
const DOMAIN_FIELD: &str = "dom";

fn link<'a>(user: &'a str, role: &'a str, domain: Option<&'a str>) -> Vec<&'a str> {
    let mut fields = vec![user, role];
    fields.extend(domain);
    fields
}

impl Enforcer {
    pub fn add_role_for_user(
        &self,
        user: &str,
        role: &str,
        domain: Option<&str>,
    ) -> AuthzResult<bool> {
        self.add_grouping_policy(&link(user, role, domain))
    }

    pub fn delete_role_for_user(
        &self,
        user: &str,
        role: &str,
        domain: Option<&str>,
    ) -> AuthzResult<bool> {
        self.remove_grouping_policy(&link(user, role, domain))
    }

    /// Remove every direct role of `user`. Without a domain this spans all domains.
    pub fn delete_roles_for_user(&self, user: &str, domain: Option<&str>) -> AuthzResult<bool> {
        self.remove_filtered_grouping_policy(0, &link(user, "", domain))
    }

    /// Roles `user` is directly assigned.
    pub fn get_roles_for_user(&self, user: &str, domain: Option<&str>) -> Vec<String> {
        self.snapshot()
            .roles
            .get(DEFAULT_GTYPE)
            .map(|rm| rm.direct_roles(user, domain))
            .unwrap_or_default()
    }

    /// Users (or roles) directly assigned `role`.
    pub fn get_users_for_role(&self, role: &str, domain: Option<&str>) -> Vec<String> {
        self.snapshot()
            .roles
            .get(DEFAULT_GTYPE)
            .map(|rm| rm.direct_members(role, domain))
            .unwrap_or_default()
    }

    pub fn has_role_for_user(&self, user: &str, role: &str, domain: Option<&str>) -> bool {
        self.get_roles_for_user(user, domain)
            .iter()
            .any(|r| r == role)
    }

    /// Direct and inherited roles of `user`, nearest first.
    pub fn get_implicit_roles_for_user(&self, user: &str, domain: Option<&str>) -> Vec<String> {
        self.snapshot()
            .roles
            .get(DEFAULT_GTYPE)
            .map(|rm| rm.roles_of(user, domain))
            .unwrap_or_default()
    }

    /// Add a `p` rule with `user` as subject followed by `permission`.
    pub fn add_permission_for_user<S: AsRef<str>>(
        &self,
        user: &str,
        permission: &[S],
    ) -> AuthzResult<bool> {
        self.add_policy(&subject_rule(user, permission))
    }

    pub fn delete_permission_for_user<S: AsRef<str>>(
        &self,
        user: &str,
        permission: &[S],
    ) -> AuthzResult<bool> {
        self.remove_policy(&subject_rule(user, permission))
    }

    /// `p` rules whose subject is `user` itself.
    pub fn get_permissions_for_user(&self, user: &str) -> Vec<Vec<String>> {
        self.get_filtered_policy(0, &[user])
    }

    /// `p` rules granted to `user` directly or through any inherited role. With a
    /// domain, only rules whose `dom` field equals it are returned.
    pub fn get_implicit_permissions_for_user(
        &self,
        user: &str,
        domain: Option<&str>,
    ) -> Vec<Vec<String>> {
        let snapshot = self.snapshot();
        let mut subjects: Vec<String> = vec![user.to_string()];
        if let Some(rm) = snapshot.roles.get(DEFAULT_GTYPE) {
            subjects.extend(rm.roles_of(user, domain));
        }
        let subjects: HashSet<&str> = subjects.iter().map(String::as_str).collect();

        let dom_index = domain.and_then(|_| {
            snapshot
                .model
                .model
                .policy_index(DEFAULT_PTYPE, DOMAIN_FIELD)
        });

        snapshot
            .policies
            .all_policies(DEFAULT_PTYPE)
            .iter()
            .filter(|rule| rule.first().is_some_and(|s| subjects.contains(s.as_str())))
            .filter(|rule| match (dom_index, domain) {
                (Some(idx), Some(dom)) => rule[idx] == dom,
                _ => true,
            })
            .cloned()
            .collect()
    }

    /// Remove `user` as a member in `g` and as a subject in `p`.
    pub fn delete_user(&self, user: &str) -> AuthzResult<bool> {
        self.delete_subject(user, 0)
    }

    /// Remove every link to `role` and every `p` rule granted to it.
    pub fn delete_role(&self, role: &str) -> AuthzResult<bool> {
        self.delete_subject(role, 1)
    }

    /// Drop the `g` rows holding `name` at `link_index` and the `p` rows whose
    /// subject is `name`, published together. Models without `g` skip the first step.
    fn delete_subject(&self, name: &str, link_index: usize) -> AuthzResult<bool> {
        let (links, perms) = self.mutate(|s| {
            let links = if s.roles.contains_key(DEFAULT_GTYPE) {
                s.remove_filtered(DEFAULT_GTYPE, link_index, &[name])?.len()
            } else {
                0
            };
            let perms = s.remove_filtered(DEFAULT_PTYPE, 0, &[name])?.len();
            Ok((links, perms))
        })?;
        tracing::debug!(name, links, perms, "Deleted subject");
        Ok(links + perms > 0)
    }
}

fn subject_rule<S: AsRef<str>>(user: &str, permission: &[S]) -> Vec<String> {
    let mut rule = vec![user.to_string()];
    rule.extend(to_fields(permission));
    rule
}
