//! Create file asset table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FileAsset::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FileAsset::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FileAsset::OwnerId).integer().not_null())
                    .col(ColumnDef::new(FileAsset::TaskId).integer())
                    .col(ColumnDef::new(FileAsset::Kind).string_len(16).not_null())
                    .col(ColumnDef::new(FileAsset::Path).text().not_null())
                    .col(ColumnDef::new(FileAsset::Filename).string_len(256).not_null())
                    .col(ColumnDef::new(FileAsset::Mime).string_len(128))
                    .col(
                        ColumnDef::new(FileAsset::SizeBytes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FileAsset::Visibility)
                            .string_len(16)
                            .not_null()
                            .default("private"),
                    )
                    .col(
                        ColumnDef::new(FileAsset::UploadedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_file_asset_owner")
                            .from(FileAsset::Table, FileAsset::OwnerId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_file_asset_task")
                            .from(FileAsset::Table, FileAsset::TaskId)
                            .to(TaskRequest::Table, TaskRequest::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_file_asset_task_id")
                    .table(FileAsset::Table)
                    .col(FileAsset::TaskId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FileAsset::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum FileAsset {
    Table,
    Id,
    OwnerId,
    TaskId,
    Kind,
    Path,
    Filename,
    Mime,
    SizeBytes,
    Visibility,
    UploadedAt,
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
