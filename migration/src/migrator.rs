use sea_orm_migration::prelude::*;

use crate::migrations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(migrations::m20260101_000001_create_students::Migration),
            Box::new(migrations::m20260101_000002_create_attendances::Migration),
            Box::new(migrations::m20260101_000003_create_rssi_streams::Migration),
            Box::new(migrations::m20260101_000004_create_anomalies::Migration),
            Box::new(migrations::m20260101_000005_create_idempotency_keys::Migration),
        ]
    }
}
