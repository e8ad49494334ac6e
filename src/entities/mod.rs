pub mod policy_rule;

pub use policy_rule::Entity as PolicyRule;
