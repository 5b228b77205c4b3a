pub mod error;
pub mod models;
pub mod repositories;
pub mod retry;
pub mod testing;

#[cfg(test)]
mod tests;

use sea_orm::{Database, DbErr};
pub use sea_orm::DatabaseConnection;

/// Opens a pooled connection to `url`. Schema setup is a separate step.
pub async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(url).await
}

/// Connects and applies all pending migrations, for tests and tools that
/// need a ready-to-use database without shelling out to the migration binary.
pub async fn connect_and_migrate(url: &str) -> DatabaseConnection {
    migration::runner::run_all_migrations(url).await;
    Database::connect(url)
        .await
        .expect("failed to connect after running migrations")
}
