use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ActiveValue::Set, Database, DatabaseConnection, EntityTrait, QueryOrder, TransactionTrait,
};

use crate::authz::errors::{AuthzError, AuthzResult};
use crate::authz::loader::{Adapter, FileAdapter};
use crate::authz::types::{PolicyRule, RuleSet};
use crate::entities;
use crate::settings::{Backend, Storage};

/// Widest rule the `policy_rules` table can hold (columns `v0`..`v5`).
pub const MAX_RULE_FIELDS: usize = 6;

/// Rows per INSERT. Each row binds 7 values; 100 rows stay under SQLite's
/// historical limit of 999 bound variables.
const INSERT_BATCH_ROWS: usize = 100;

/// Open the adapter selected by `settings.backend`.
pub async fn init(settings: &Storage) -> AuthzResult<Box<dyn Adapter>> {
    Ok(match settings.backend {
        Backend::File => Box::new(FileAdapter::new(settings.policy_path.clone())),
        Backend::Database => Box::new(DbAdapter::connect(&settings.database_url).await?),
    })
}

/// Policy adapter backed by the `policy_rules` table.
#[derive(Debug, Clone)]
pub struct DbAdapter {
    db: DatabaseConnection,
}

impl DbAdapter {
    /// Connect to `url` and apply pending migrations.
    pub async fn connect(url: &str) -> AuthzResult<Self> {
        let db = Database::connect(url).await?;
        Migrator::up(&db, None).await?;
        tracing::info!("Connected policy database");
        Ok(Self { db })
    }

    /// Wrap an existing connection whose schema is already migrated.
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Adapter for DbAdapter {
    async fn load_policy(&self) -> AuthzResult<RuleSet> {
        use entities::policy_rule::{Column, Entity};

        let rows = Entity::find()
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?;

        let rules: RuleSet = rows.into_iter().map(row_to_rule).collect();
        tracing::info!(
            policies = rules.policies.len(),
            groupings = rules.groupings.len(),
            "Loaded policy rows"
        );
        Ok(rules)
    }

    async fn save_policy(&self, rules: &RuleSet) -> AuthzResult<()> {
        use entities::policy_rule::Entity;

        let rows = rules
            .iter()
            .enumerate()
            .map(|(idx, rule)| rule_to_row(idx + 1, rule))
            .collect::<AuthzResult<Vec<_>>>()?;

        // Replace the whole table in one transaction; dropping `txn` on error rolls back.
        let txn = self.db.begin().await?;
        Entity::delete_many().exec(&txn).await?;
        for batch in rows.chunks(INSERT_BATCH_ROWS) {
            Entity::insert_many(batch.to_vec()).exec(&txn).await?;
        }
        txn.commit().await?;

        tracing::info!(rules = rules.len(), "Saved policy rows");
        Ok(())
    }
}

fn row_to_rule(row: entities::policy_rule::Model) -> PolicyRule {
    let fields = [row.v0, row.v1, row.v2, row.v3, row.v4, row.v5]
        .into_iter()
        .map_while(|v| v)
        .collect();
    PolicyRule {
        ptype: row.ptype,
        fields,
    }
}

fn rule_to_row(row: usize, rule: &PolicyRule) -> AuthzResult<entities::policy_rule::ActiveModel> {
    if rule.fields.len() > MAX_RULE_FIELDS {
        return Err(AuthzError::MalformedRow {
            row,
            message: format!(
                "`{}` rule has {} fields, the table holds at most {MAX_RULE_FIELDS}",
                rule.ptype,
                rule.fields.len()
            ),
        });
    }
    let field = |i: usize| Set(rule.fields.get(i).cloned());
    Ok(entities::policy_rule::ActiveModel {
        ptype: Set(rule.ptype.clone()),
        v0: field(0),
        v1: field(1),
        v2: field(2),
        v3: field(3),
        v4: field(4),
        v5: field(5),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_rule_stops_at_first_null() {
        let row = entities::policy_rule::Model {
            id: 1,
            ptype: "g".into(),
            v0: Some("alice".into()),
            v1: Some("admin".into()),
            v2: None,
            v3: None,
            v4: None,
            v5: None,
        };
        assert_eq!(row_to_rule(row), PolicyRule::new("g", ["alice", "admin"]));
    }

    #[test]
    fn test_rule_too_wide_rejected() {
        let rule = PolicyRule::new("p", ["a", "b", "c", "d", "e", "f", "g"]);
        let err = rule_to_row(3, &rule).unwrap_err();
        assert!(matches!(err, AuthzError::MalformedRow { row: 3, .. }));
    }

    #[tokio::test]
    async fn test_round_trip_sqlite() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", file.path().display());
        let adapter = DbAdapter::connect(&url).await.unwrap();
        let rules: RuleSet = vec![
            PolicyRule::new("p", ["admin", "data2", "write"]),
            PolicyRule::new("p", ["alice", "data1", ""]),
            PolicyRule::new("g", ["alice", "admin"]),
        ]
        .into_iter()
        .collect();

        adapter.save_policy(&rules).await.unwrap();
        assert_eq!(adapter.load_policy().await.unwrap(), rules);

        adapter.save_policy(&RuleSet::new()).await.unwrap();
        assert!(adapter.load_policy().await.unwrap().is_empty());
    }
}
