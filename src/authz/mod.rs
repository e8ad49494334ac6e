//! Access-control decision engine.
//!
//! A [`Model`] declares the request shape, policy and role definitions, the
//! matcher and the effect expression. An [`Enforcer`] evaluates requests against
//! that model, the stored rules and the role graph, and persists rules through
//! an [`Adapter`].

pub mod condition;
pub mod effect;
pub mod engine;
pub mod errors;
pub mod functions;
pub mod loader;
pub mod management;
pub mod model;
pub mod policy;
pub mod rbac;
pub mod roles;
pub mod types;

pub use engine::Enforcer;
pub use errors::{AuthzError, AuthzResult};
pub use loader::{Adapter, FileAdapter};
pub use model::Model;
pub use types::{Effect, EnforceResult, PolicyRule, RuleSet};
