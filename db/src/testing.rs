//! In-memory database setup shared by this crate's own tests and by the
//! integration tests of crates built on top of it (`core_logic`). Public,
//! not `#[cfg(test)]`-gated, the same way the teacher exposes its own
//! `factories`/`seeders` modules for cross-crate test use.

use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("failed to connect to in-memory db");

    migration::Migrator::up(&db, None)
        .await
        .expect("failed to run migrations");

    db
}
