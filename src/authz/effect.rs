//! Policy effect expressions: reduce per-rule matcher outcomes to one decision.

use crate::authz::errors::{AuthzError, AuthzResult};
use crate::authz::types::Effect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// `some(where (p.eft == allow))`
    AllowOverride,
    /// `!some(where (p.eft == deny))`
    DenyOverride,
    /// `some(where (p.eft == allow)) && !some(where (p.eft == deny))`
    AllowAndDeny,
    /// `priority(p.eft)`: the first matching rule in insertion order decides.
    Priority,
}

/// Parsed effect expression together with its no-decision fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectRule {
    combinator: Combinator,
    fallback: bool,
}

impl EffectRule {
    /// Parse `expr` for the policy type `ptype` (usually `p`). Whitespace is ignored.
    /// A trailing `|| allow` or `|| deny` sets the outcome used when no rule decides.
    pub fn parse(expr: &str, ptype: &str) -> AuthzResult<Self> {
        let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
        let invalid = || AuthzError::InvalidEffect(expr.to_string());

        let (body, else_branch) = if let Some(body) = compact.strip_suffix("||allow") {
            (body, Some(true))
        } else if let Some(body) = compact.strip_suffix("||deny") {
            (body, Some(false))
        } else {
            (compact.as_str(), None)
        };

        let some_allow = format!("some(where({ptype}.eft==allow))");
        let no_deny = format!("!some(where({ptype}.eft==deny))");
        let combinator = if body == some_allow {
            Combinator::AllowOverride
        } else if body == no_deny {
            Combinator::DenyOverride
        } else if body == format!("{some_allow}&&{no_deny}") {
            Combinator::AllowAndDeny
        } else if body == format!("priority({ptype}.eft)") {
            Combinator::Priority
        } else {
            return Err(invalid());
        };

        let fallback = match (combinator, else_branch) {
            // the expression already says "allow unless denied"
            (Combinator::DenyOverride, None) => true,
            (Combinator::DenyOverride, Some(_)) => return Err(invalid()),
            (_, branch) => branch.unwrap_or(false),
        };

        Ok(Self {
            combinator,
            fallback,
        })
    }

    pub fn combinator(&self) -> Combinator {
        self.combinator
    }

    /// Decision when no matching rule decides.
    pub fn fallback(&self) -> bool {
        self.fallback
    }

    pub fn evaluator(&self) -> EffectEvaluator {
        EffectEvaluator {
            rule: *self,
            allow: None,
            deny: None,
            first: None,
        }
    }
}

/// Streaming combination over matched rules, fed in insertion order.
#[derive(Debug)]
pub struct EffectEvaluator {
    rule: EffectRule,
    allow: Option<usize>,
    deny: Option<usize>,
    first: Option<(usize, Effect)>,
}

impl EffectEvaluator {
    /// Record that rule `idx` matched with `effect`. Returns `true` once the
    /// decision can no longer change, so the caller may stop scanning.
    pub fn push(&mut self, idx: usize, effect: Effect) -> bool {
        if self.first.is_none() {
            self.first = Some((idx, effect));
        }
        match effect {
            Effect::Allow if self.allow.is_none() => self.allow = Some(idx),
            Effect::Deny if self.deny.is_none() => self.deny = Some(idx),
            _ => {}
        }
        match self.rule.combinator {
            Combinator::AllowOverride => self.allow.is_some(),
            Combinator::DenyOverride | Combinator::AllowAndDeny => self.deny.is_some(),
            Combinator::Priority => true,
        }
    }

    /// Final decision and the index of the rule that produced it, if any.
    pub fn finish(self) -> (bool, Option<usize>) {
        let fallback = (self.rule.fallback, None);
        match self.rule.combinator {
            Combinator::AllowOverride => match self.allow {
                Some(idx) => (true, Some(idx)),
                None => fallback,
            },
            Combinator::DenyOverride => match self.deny {
                Some(idx) => (false, Some(idx)),
                None => fallback,
            },
            Combinator::AllowAndDeny => match (self.deny, self.allow) {
                (Some(idx), _) => (false, Some(idx)),
                (None, Some(idx)) => (true, Some(idx)),
                (None, None) => fallback,
            },
            Combinator::Priority => match self.first {
                Some((idx, effect)) => (effect == Effect::Allow, Some(idx)),
                None => fallback,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(expr: &str, matched: &[Effect]) -> (bool, Option<usize>) {
        let rule = EffectRule::parse(expr, "p").unwrap();
        let mut eval = rule.evaluator();
        for (idx, effect) in matched.iter().enumerate() {
            if eval.push(idx, *effect) {
                break;
            }
        }
        eval.finish()
    }

    const ALLOW_OVERRIDE: &str = "some(where (p.eft == allow))";
    const DENY_OVERRIDE: &str = "!some(where (p.eft == deny))";
    const ALLOW_AND_DENY: &str = "some(where (p.eft == allow)) && !some(where (p.eft == deny))";
    const PRIORITY: &str = "priority(p.eft) || deny";

    #[test]
    fn test_parse_variants() {
        let cases = [
            (ALLOW_OVERRIDE, Combinator::AllowOverride, false),
            (DENY_OVERRIDE, Combinator::DenyOverride, true),
            (ALLOW_AND_DENY, Combinator::AllowAndDeny, false),
            (PRIORITY, Combinator::Priority, false),
            ("priority(p.eft) || allow", Combinator::Priority, true),
            ("some(where(p.eft==allow))||allow", Combinator::AllowOverride, true),
        ];
        for (expr, combinator, fallback) in cases {
            let rule = EffectRule::parse(expr, "p").unwrap();
            assert_eq!(rule.combinator(), combinator, "{expr}");
            assert_eq!(rule.fallback(), fallback, "{expr}");
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(EffectRule::parse("any(p.eft)", "p").is_err());
        assert!(EffectRule::parse("!some(where (p.eft == deny)) || deny", "p").is_err());
        assert!(EffectRule::parse(ALLOW_OVERRIDE, "p2").is_err());
        assert!(EffectRule::parse("some(where (p2.eft == allow))", "p2").is_ok());
    }

    #[test]
    fn test_allow_override() {
        assert_eq!(run(ALLOW_OVERRIDE, &[Effect::Allow]), (true, Some(0)));
        assert_eq!(
            run(ALLOW_OVERRIDE, &[Effect::Deny, Effect::Allow]),
            (true, Some(1))
        );
        assert_eq!(run(ALLOW_OVERRIDE, &[Effect::Deny]), (false, None));
        assert_eq!(run(ALLOW_OVERRIDE, &[]), (false, None));
    }

    #[test]
    fn test_deny_override() {
        assert_eq!(run(DENY_OVERRIDE, &[]), (true, None));
        assert_eq!(run(DENY_OVERRIDE, &[Effect::Allow]), (true, None));
        assert_eq!(
            run(DENY_OVERRIDE, &[Effect::Allow, Effect::Deny]),
            (false, Some(1))
        );
    }

    #[test]
    fn test_allow_and_deny() {
        assert_eq!(run(ALLOW_AND_DENY, &[Effect::Allow]), (true, Some(0)));
        assert_eq!(
            run(ALLOW_AND_DENY, &[Effect::Allow, Effect::Deny]),
            (false, Some(1))
        );
        assert_eq!(run(ALLOW_AND_DENY, &[]), (false, None));
    }

    #[test]
    fn test_priority_first_match_wins() {
        assert_eq!(
            run(PRIORITY, &[Effect::Deny, Effect::Allow]),
            (false, Some(0))
        );
        assert_eq!(
            run(PRIORITY, &[Effect::Allow, Effect::Deny]),
            (true, Some(0))
        );
        assert_eq!(run(PRIORITY, &[]), (false, None));
        assert_eq!(run("priority(p.eft) || allow", &[]), (true, None));
    }
}
