//! Create review meeting table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Meeting::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Meeting::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Meeting::TaskId).integer().not_null())
                    .col(
                        ColumnDef::new(Meeting::Provider)
                            .string_len(32)
                            .not_null()
                            .default("google_meet"),
                    )
                    .col(
                        ColumnDef::new(Meeting::Status)
                            .string_len(16)
                            .not_null()
                            .default("scheduled"),
                    )
                    .col(
                        ColumnDef::new(Meeting::ScheduledFor)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Meeting::DurationMinutes)
                            .integer()
                            .not_null()
                            .default(30),
                    )
                    .col(ColumnDef::new(Meeting::JoinUrl).text())
                    .col(ColumnDef::new(Meeting::Notes).text())
                    .col(ColumnDef::new(Meeting::CreatedById).integer())
                    .col(ColumnDef::new(Meeting::InviteUid).string_len(255))
                    .col(
                        ColumnDef::new(Meeting::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Meeting::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_meeting_task")
                            .from(Meeting::Table, Meeting::TaskId)
                            .to(TaskRequest::Table, TaskRequest::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_meeting_task_id")
                    .table(Meeting::Table)
                    .col(Meeting::TaskId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Meeting::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Meeting {
    Table,
    Id,
    TaskId,
    Provider,
    Status,
    ScheduledFor,
    DurationMinutes,
    JoinUrl,
    Notes,
    CreatedById,
    InviteUid,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum TaskRequest {
    Table,
    Id,
}
