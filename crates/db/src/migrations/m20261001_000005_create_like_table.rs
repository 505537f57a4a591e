//! Create like table migration.

use sea_orm_migration::prelude::*;

use super::m20261001_000001_create_user_table::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Like::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Like::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Like::LikedById).string_len(32).not_null())
                    .col(ColumnDef::new(Like::TargetType).string_len(16).not_null())
                    .col(ColumnDef::new(Like::TargetId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Like::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Like::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_like_liked_by")
                            .from(Like::Table, Like::LikedById)
                            .to(User::Table, User::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: one like per (actor, target); the toggle relies on it
        manager
            .create_index(
                Index::create()
                    .name("idx_like_actor_target")
                    .table(Like::Table)
                    .col(Like::LikedById)
                    .col(Like::TargetType)
                    .col(Like::TargetId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: (target_type, target_id) for like counts
        manager
            .create_index(
                Index::create()
                    .name("idx_like_target")
                    .table(Like::Table)
                    .col(Like::TargetType)
                    .col(Like::TargetId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Like::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Like {
    Table,
    Id,
    LikedById,
    TargetType,
    TargetId,
    CreatedAt,
    UpdatedAt,
}
