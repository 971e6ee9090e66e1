//! Create work submission table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WorkSubmission::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkSubmission::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WorkSubmission::TaskId).integer().not_null())
                    .col(ColumnDef::new(WorkSubmission::AssignmentId).integer())
                    .col(ColumnDef::new(WorkSubmission::FreelancerId).integer().not_null())
                    .col(ColumnDef::new(WorkSubmission::Comment).text())
                    .col(ColumnDef::new(WorkSubmission::FilesJson).json_binary().not_null())
                    .col(
                        ColumnDef::new(WorkSubmission::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_work_submission_task")
                            .from(WorkSubmission::Table, WorkSubmission::TaskId)
                            .to(TaskRequest::Table, TaskRequest::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_work_submission_task_id")
                    .table(WorkSubmission::Table)
                    .col(WorkSubmission::TaskId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WorkSubmission::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum WorkSubmission {
    Table,
    Id,
    TaskId,
    AssignmentId,
    FreelancerId,
    Comment,
    FilesJson,
    CreatedAt,
}

#[derive(Iden)]
pub enum TaskRequest {
    Table,
    Id,
}
