use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::migrator::{migrate, migration_scripts, MigrationError};

#[derive(rust_embed::RustEmbed)]
#[folder = "migrations"]
struct Migrations;

/// Connect to Postgres and apply every embedded migration, returning a
/// ready-to-use pool: connect, then bring the schema up to date before
/// handing the pool back.
///
/// # Errors
///
/// Returns [`MigrationError`] if the connection or a migration fails.
pub async fn connect(database_url: &str) -> Result<PgPool, MigrationError> {
    let options: PgConnectOptions = database_url.parse().map_err(MigrationError::Db)?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    let migrations = migration_scripts::<Migrations>()?;
    migrate(&pool, &migrations).await?;

    Ok(pool)
}
