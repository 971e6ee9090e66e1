//! Create invoice table.
//!
//! A partial unique index keeps at most one unpaid invoice per task.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Invoice::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Invoice::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Invoice::TaskId).integer().not_null())
                    .col(ColumnDef::new(Invoice::Amount).double().not_null())
                    .col(
                        ColumnDef::new(Invoice::Currency)
                            .string_len(8)
                            .not_null()
                            .default("UGX"),
                    )
                    .col(
                        ColumnDef::new(Invoice::Status)
                            .string_len(16)
                            .not_null()
                            .default("unpaid"),
                    )
                    .col(
                        ColumnDef::new(Invoice::IssuedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Invoice::PaidAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Invoice::Gateway).string_len(32))
                    .col(ColumnDef::new(Invoice::GatewayStatus).string_len(64))
                    .col(ColumnDef::new(Invoice::GatewayMeta).json_binary())
                    .col(ColumnDef::new(Invoice::PesapalTrackingId).string_len(128))
                    .col(ColumnDef::new(Invoice::PesapalMerchantRef).string_len(128))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_invoice_task")
                            .from(Invoice::Table, Invoice::TaskId)
                            .to(TaskRequest::Table, TaskRequest::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_invoice_task_id")
                    .table(Invoice::Table)
                    .col(Invoice::TaskId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_invoice_merchant_ref")
                    .table(Invoice::Table)
                    .col(Invoice::PesapalMerchantRef)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_invoice_tracking_id")
                    .table(Invoice::Table)
                    .col(Invoice::PesapalTrackingId)
                    .to_owned(),
            )
            .await?;

        // Same statement works on PostgreSQL and SQLite.
        manager
            .get_connection()
            .execute_unprepared(
                r"
                CREATE UNIQUE INDEX IF NOT EXISTS ux_invoice_task_unpaid
                ON invoice (task_id)
                WHERE status = 'unpaid';
                ",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP INDEX IF EXISTS ux_invoice_task_unpaid;")
            .await?;

        manager
            .drop_table(Table::drop().table(Invoice::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Invoice {
    Table,
    Id,
    TaskId,
    Amount,
    Currency,
    Status,
    IssuedAt,
    PaidAt,
    Gateway,
    GatewayStatus,
    GatewayMeta,
    PesapalTrackingId,
    PesapalMerchantRef,
}

#[derive(Iden)]
pub enum TaskRequest {
    Table,
    Id,
}
