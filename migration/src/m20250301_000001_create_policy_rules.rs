use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One row per rule; unused trailing columns stay NULL
        manager
            .create_table(
                Table::create()
                    .table(PolicyRules::Table)
                    .if_not_exists()
                    .col(pk_auto(PolicyRules::Id))
                    .col(string(PolicyRules::Ptype))
                    .col(string_null(PolicyRules::V0))
                    .col(string_null(PolicyRules::V1))
                    .col(string_null(PolicyRules::V2))
                    .col(string_null(PolicyRules::V3))
                    .col(string_null(PolicyRules::V4))
                    .col(string_null(PolicyRules::V5))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_policy_rules_ptype")
                    .table(PolicyRules::Table)
                    .col(PolicyRules::Ptype)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PolicyRules::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PolicyRules {
    Table,
    Id,
    Ptype,
    V0,
    V1,
    V2,
    V3,
    V4,
    V5,
}
