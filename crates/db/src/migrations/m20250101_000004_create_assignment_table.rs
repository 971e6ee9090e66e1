//! Create assignment table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Assignment::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Assignment::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Assignment::TaskId).integer().not_null())
                    .col(ColumnDef::new(Assignment::AssigneeId).integer().not_null())
                    .col(ColumnDef::new(Assignment::AssignedBy).integer())
                    .col(
                        ColumnDef::new(Assignment::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Assignment::AcceptExpiresAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Assignment::AcceptedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Assignment::DeclinedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Assignment::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_assignment_task")
                            .from(Assignment::Table, Assignment::TaskId)
                            .to(TaskRequest::Table, TaskRequest::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_assignment_assignee")
                            .from(Assignment::Table, Assignment::AssigneeId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_assignment_task_id")
                    .table(Assignment::Table)
                    .col(Assignment::TaskId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_assignment_assignee_id")
                    .table(Assignment::Table)
                    .col(Assignment::AssigneeId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Assignment::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Assignment {
    Table,
    Id,
    TaskId,
    AssigneeId,
    AssignedBy,
    Status,
    AcceptExpiresAt,
    AcceptedAt,
    DeclinedAt,
    CreatedAt,
}

#[derive(Iden)]
pub enum TaskRequest {
    Table,
    Id,
}

#[derive(Iden)]
pub enum User {
    Table,
    Id,
}
