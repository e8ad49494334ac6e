pub mod builders;
pub mod db;
pub mod fixtures;

pub use builders::EnforcerBuilder;
pub use db::TestDb;
pub use fixtures::{write_fixture, RBAC_MODEL, RBAC_POLICY};
