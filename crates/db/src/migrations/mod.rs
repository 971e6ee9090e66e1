//! Database migrations.
//!
//! Schema migrations for the database.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20250101_000001_create_user_table;
mod m20250101_000002_create_task_request_table;
mod m20250101_000003_create_quote_table;
mod m20250101_000004_create_assignment_table;
mod m20250101_000005_create_invoice_table;
mod m20250101_000006_create_meeting_table;
mod m20250101_000007_create_file_asset_table;
mod m20250101_000008_create_work_submission_table;
mod m20250101_000009_create_subscriber_table;
mod m20250101_000010_create_rating_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_user_table::Migration),
            Box::new(m20250101_000002_create_task_request_table::Migration),
            Box::new(m20250101_000003_create_quote_table::Migration),
            Box::new(m20250101_000004_create_assignment_table::Migration),
            Box::new(m20250101_000005_create_invoice_table::Migration),
            Box::new(m20250101_000006_create_meeting_table::Migration),
            Box::new(m20250101_000007_create_file_asset_table::Migration),
            Box::new(m20250101_000008_create_work_submission_table::Migration),
            Box::new(m20250101_000009_create_subscriber_table::Migration),
            Box::new(m20250101_000010_create_rating_table::Migration),
        ]
    }
}
