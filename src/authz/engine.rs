use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::authz::condition::Matcher;
use crate::authz::effect::EffectRule;
use crate::authz::errors::{AuthzError, AuthzResult};
use crate::authz::loader::Adapter;
use crate::authz::model::Model;
use crate::authz::policy::PolicyStore;
use crate::authz::roles::RoleManager;
use crate::authz::types::{is_grouping_type, Effect, EnforceResult, PolicyRule, RuleSet};

/// Model with its matcher and effect expressions compiled.
#[derive(Debug)]
pub struct CompiledModel {
    pub model: Model,
    pub matcher: Matcher,
    pub effect: EffectRule,
    effect_index: Option<usize>,
}

impl CompiledModel {
    pub fn compile(model: Model) -> AuthzResult<Self> {
        let matcher = Matcher::compile(&model)?;
        let effect = EffectRule::parse(&model.effect, matcher.ptype())?;
        let effect_index = model.effect_index(matcher.ptype());
        Ok(Self {
            model,
            matcher,
            effect,
            effect_index,
        })
    }
}

/// Everything one enforcement call reads. Published as a unit, never mutated in place.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub(crate) model: Arc<CompiledModel>,
    pub(crate) policies: PolicyStore,
    pub(crate) roles: BTreeMap<String, Arc<RoleManager>>,
}

impl Snapshot {
    fn empty(model: Arc<CompiledModel>) -> Self {
        let policies = PolicyStore::for_model(&model.model);
        let roles = model
            .model
            .roles
            .keys()
            .map(|gtype| (gtype.clone(), Arc::new(RoleManager::new())))
            .collect();
        Self {
            model,
            policies,
            roles,
        }
    }

    /// Build a snapshot from a full rule set. Fails without side effects if any
    /// rule does not fit the model.
    fn from_rules(model: Arc<CompiledModel>, rules: &RuleSet) -> AuthzResult<Self> {
        let mut snapshot = Self::empty(model);
        for rule in rules.iter() {
            snapshot.add_rule(&rule.ptype, rule.fields.clone())?;
        }
        Ok(snapshot)
    }

    pub(crate) fn add_rule(&mut self, ptype: &str, fields: Vec<String>) -> AuthzResult<bool> {
        let link = is_grouping_type(ptype).then(|| fields.clone());
        let added = self.policies.add_policy(ptype, fields)?;
        if let (true, Some(link)) = (added, link) {
            self.role_manager(ptype)?
                .add_link(&link[0], &link[1], link.get(2).map(String::as_str));
        }
        Ok(added)
    }

    pub(crate) fn remove_rule(&mut self, ptype: &str, fields: &[String]) -> AuthzResult<bool> {
        let removed = self.policies.remove_policy(ptype, fields)?;
        if removed && is_grouping_type(ptype) {
            self.role_manager(ptype)?
                .remove_link(&fields[0], &fields[1], fields.get(2).map(String::as_str));
        }
        Ok(removed)
    }

    pub(crate) fn remove_filtered(
        &mut self,
        ptype: &str,
        field_index: usize,
        values: &[&str],
    ) -> AuthzResult<Vec<Vec<String>>> {
        let removed = self
            .policies
            .remove_filtered_policy(ptype, field_index, values)?;
        if is_grouping_type(ptype) && !removed.is_empty() {
            let rm = self.role_manager(ptype)?;
            for fields in &removed {
                rm.remove_link(&fields[0], &fields[1], fields.get(2).map(String::as_str));
            }
        }
        Ok(removed)
    }

    /// Writable role graph for `gtype`, copied first if another snapshot shares it.
    fn role_manager(&mut self, gtype: &str) -> AuthzResult<&mut RoleManager> {
        self.roles
            .get_mut(gtype)
            .map(Arc::make_mut)
            .ok_or_else(|| AuthzError::UnknownPolicyType(gtype.to_string()))
    }

    fn rule_set(&self) -> RuleSet {
        self.policies
            .ptypes()
            .flat_map(|ptype| {
                self.policies
                    .all_policies(ptype)
                    .iter()
                    .map(move |fields| PolicyRule {
                        ptype: ptype.to_string(),
                        fields: fields.clone(),
                    })
            })
            .collect()
    }

    fn enforce(&self, request: &[String]) -> AuthzResult<EnforceResult> {
        let compiled = &self.model;
        let expected = compiled.model.request.len();
        if request.len() != expected {
            return Err(AuthzError::RequestArity {
                expected,
                actual: request.len(),
            });
        }

        let ptype = compiled.matcher.ptype();
        let rules = self.policies.all_policies(ptype);
        let mut effects = compiled.effect.evaluator();

        for (idx, rule) in rules.iter().enumerate() {
            if !compiled.matcher.eval(request, rule, &self.roles)? {
                continue;
            }
            let effect = match compiled.effect_index {
                Some(pos) => rule[pos].parse::<Effect>()?,
                None => Effect::Allow,
            };
            if effects.push(idx, effect) {
                break;
            }
        }

        let (allowed, decided_by) = effects.finish();
        let explain = decided_by
            .map(|idx| PolicyRule {
                ptype: ptype.to_string(),
                fields: rules[idx].clone(),
            })
            .into_iter()
            .collect();
        Ok(EnforceResult { allowed, explain })
    }
}

/// Access-control decision engine.
///
/// Readers load the current [`Snapshot`] without locking. Writers serialize on
/// `write_lock`, build the next snapshot from a copy and publish it with one
/// atomic swap, so an enforcement call never sees a half-applied mutation.
pub struct Enforcer {
    snapshot: ArcSwap<Snapshot>,
    write_lock: Mutex<()>,
    adapter: Option<Box<dyn Adapter>>,
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("Enforcer")
            .field("model", &snapshot.model.model)
            .field("rules", &snapshot.policies.len())
            .field("adapter", &self.adapter.is_some())
            .finish()
    }
}

impl Enforcer {
    /// Enforcer with an empty rule set and no persistence.
    pub fn new(model: Model) -> AuthzResult<Self> {
        let compiled = Arc::new(CompiledModel::compile(model)?);
        Ok(Self {
            snapshot: ArcSwap::from_pointee(Snapshot::empty(compiled)),
            write_lock: Mutex::new(()),
            adapter: None,
        })
    }

    /// Enforcer backed by `adapter`, with its rules loaded.
    pub async fn with_adapter(model: Model, adapter: impl Adapter + 'static) -> AuthzResult<Self> {
        let mut enforcer = Self::new(model)?;
        enforcer.adapter = Some(Box::new(adapter));
        enforcer.load_policy().await?;
        Ok(enforcer)
    }

    pub(crate) fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn model(&self) -> Arc<CompiledModel> {
        self.snapshot.load().model.clone()
    }

    /// Apply `mutate` to a copy of the current snapshot and publish it if it succeeds.
    pub(crate) fn mutate<T>(
        &self,
        mutate: impl FnOnce(&mut Snapshot) -> AuthzResult<T>,
    ) -> AuthzResult<T> {
        let _guard = self.write_lock.lock();
        let mut next = Snapshot::clone(&self.snapshot.load());
        let out = mutate(&mut next)?;
        self.snapshot.store(Arc::new(next));
        Ok(out)
    }

    /// Decide `request` against the current model, rules and role graph.
    pub fn enforce<S: AsRef<str>>(&self, request: &[S]) -> AuthzResult<bool> {
        Ok(self.enforce_ex(request)?.allowed)
    }

    /// Like [`Enforcer::enforce`], also returning the rule that decided the outcome.
    pub fn enforce_ex<S: AsRef<str>>(&self, request: &[S]) -> AuthzResult<EnforceResult> {
        let request: Vec<String> = request.iter().map(|s| s.as_ref().to_string()).collect();
        let snapshot = self.snapshot.load();
        let result = snapshot.enforce(&request)?;
        tracing::debug!(
            request = ?request,
            allowed = result.allowed,
            decided_by = ?result.explain.first(),
            "Enforced request"
        );
        Ok(result)
    }

    /// Replace the model. Current rules are revalidated against it; on any error
    /// the previous model and rules stay in place.
    pub fn load_model(&self, model: Model) -> AuthzResult<()> {
        let compiled = Arc::new(CompiledModel::compile(model)?);
        self.mutate(|snapshot| {
            let rules = snapshot.rule_set();
            *snapshot = Snapshot::from_rules(compiled, &rules)?;
            Ok(())
        })?;
        tracing::info!("Reloaded model");
        Ok(())
    }

    /// Replace all in-memory rules with the adapter's rule set.
    pub async fn load_policy(&self) -> AuthzResult<()> {
        let adapter = self.adapter.as_ref().ok_or(AuthzError::NoAdapter)?;
        let rules = adapter.load_policy().await?;
        self.mutate(|snapshot| {
            *snapshot = Snapshot::from_rules(snapshot.model.clone(), &rules)?;
            Ok(())
        })?;
        tracing::info!(rules = rules.len(), "Loaded policy");
        Ok(())
    }

    /// Write the complete current rule set through the adapter.
    pub async fn save_policy(&self) -> AuthzResult<()> {
        let adapter = self.adapter.as_ref().ok_or(AuthzError::NoAdapter)?;
        let rules = self.snapshot().rule_set();
        adapter.save_policy(&rules).await
    }

    /// Current rules in the same shape adapters exchange.
    pub fn rules(&self) -> RuleSet {
        self.snapshot().rule_set()
    }

    /// Clear all rules in memory. Durable storage is untouched until the next save.
    pub fn clear_policy(&self) {
        let _guard = self.write_lock.lock();
        let current = self.snapshot.load();
        self.snapshot
            .store(Arc::new(Snapshot::empty(current.model.clone())));
    }
}
