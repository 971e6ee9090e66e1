//! Create task request table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TaskRequest::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TaskRequest::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TaskRequest::ClientId).integer().not_null())
                    .col(ColumnDef::new(TaskRequest::Title).string_len(256).not_null())
                    .col(ColumnDef::new(TaskRequest::Category).string_len(128))
                    .col(ColumnDef::new(TaskRequest::Description).text())
                    .col(ColumnDef::new(TaskRequest::AdminNotes).text())
                    .col(ColumnDef::new(TaskRequest::DeadlineAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(TaskRequest::ClientBudget).double())
                    .col(
                        ColumnDef::new(TaskRequest::Priority)
                            .string_len(16)
                            .not_null()
                            .default("normal"),
                    )
                    .col(
                        ColumnDef::new(TaskRequest::Status)
                            .string_len(32)
                            .not_null()
                            .default("submitted"),
                    )
                    .col(
                        ColumnDef::new(TaskRequest::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(TaskRequest::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_request_client")
                            .from(TaskRequest::Table, TaskRequest::ClientId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_task_request_client_id")
                    .table(TaskRequest::Table)
                    .col(TaskRequest::ClientId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_task_request_status")
                    .table(TaskRequest::Table)
                    .col(TaskRequest::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TaskRequest::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum TaskRequest {
    Table,
    Id,
    ClientId,
    Title,
    Category,
    Description,
    AdminNotes,
    DeadlineAt,
    ClientBudget,
    Priority,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum User {
    Table,
    Id,
}
