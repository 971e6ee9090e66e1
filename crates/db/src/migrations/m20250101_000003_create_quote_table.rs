//! Create quote table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Quote::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Quote::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Quote::TaskId).integer().not_null())
                    .col(ColumnDef::new(Quote::ProposedPrice).double().not_null())
                    .col(
                        ColumnDef::new(Quote::Currency)
                            .string_len(8)
                            .not_null()
                            .default("UGX"),
                    )
                    .col(
                        ColumnDef::new(Quote::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Quote::PayOption)
                            .string_len(16)
                            .not_null()
                            .default("pay_on_delivery"),
                    )
                    .col(ColumnDef::new(Quote::Message).text())
                    .col(ColumnDef::new(Quote::ValidUntil).timestamp_with_time_zone())
                    .col(ColumnDef::new(Quote::ClientCounterAmount).double())
                    .col(ColumnDef::new(Quote::ClientCounterCurrency).string_len(8))
                    .col(ColumnDef::new(Quote::ClientCounterReason).text())
                    .col(ColumnDef::new(Quote::ClientCounterStatus).string_len(16))
                    .col(ColumnDef::new(Quote::ClientCounterAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Quote::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_quote_task")
                            .from(Quote::Table, Quote::TaskId)
                            .to(TaskRequest::Table, TaskRequest::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_quote_task_id_status")
                    .table(Quote::Table)
                    .col(Quote::TaskId)
                    .col(Quote::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Quote::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Quote {
    Table,
    Id,
    TaskId,
    ProposedPrice,
    Currency,
    Status,
    PayOption,
    Message,
    ValidUntil,
    ClientCounterAmount,
    ClientCounterCurrency,
    ClientCounterReason,
    ClientCounterStatus,
    ClientCounterAt,
    CreatedAt,
}

#[derive(Iden)]
pub enum TaskRequest {
    Table,
    Id,
}
