use sha2::{Digest, Sha384};
use sqlx::{Executor, PgPool};

const MIGRATIONS_TABLE: &str = "_registry_migrations";

#[derive(Debug)]
pub struct MigrationScript {
    pub script: String,
    pub description: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("unable to parse migration script `{filename}`: {error}")]
    Script { filename: String, error: String },
    #[error("checksum mismatch for already-applied migration `{filename}`: the script changed after it ran")]
    ChecksumMismatch { filename: String },
}

async fn create_migrations_table(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            checksum BYTEA NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL
        )"
    ))
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
struct AppliedMigration {
    version: i32,
    checksum: Vec<u8>,
}

/// Apply every migration in `migrations` that hasn't already run, in
/// order, tracking checksums so a script edited after being applied is
/// caught rather than silently skipped.
///
/// # Errors
///
/// Returns [`MigrationError`] on a database failure or a checksum
/// mismatch against an already-applied migration.
pub async fn migrate(pool: &PgPool, migrations: &[MigrationScript]) -> Result<(), MigrationError> {
    create_migrations_table(pool).await?;

    let applied: Vec<AppliedMigration> =
        sqlx::query_as(&format!("SELECT version, checksum FROM {MIGRATIONS_TABLE}"))
            .fetch_all(pool)
            .await?;

    for (version, migration) in migrations.iter().enumerate() {
        let version = i32::try_from(version).unwrap_or(i32::MAX);
        let checksum = Sha384::digest(migration.script.as_bytes()).to_vec();

        if let Some(existing) = applied.iter().find(|m| m.version == version) {
            if existing.checksum != checksum {
                return Err(MigrationError::ChecksumMismatch {
                    filename: migration.description.clone(),
                });
            }
            continue;
        }

        let mut tx = pool.begin().await?;
        tx.execute(migration.script.as_str()).await?;
        sqlx::query(&format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, description, checksum, applied_at)
             VALUES ($1, $2, $3, now())"
        ))
        .bind(version)
        .bind(&migration.description)
        .bind(checksum)
        .execute(&mut tx)
        .await?;
        tx.commit().await?;

        tracing::info!(version, description = %migration.description, "applied migration");
    }

    Ok(())
}

/// Retrieve [`MigrationScript`]s from a type embedding migration files via
/// [`rust_embed::RustEmbed`], in filename order.
///
/// # Errors
///
/// Returns [`MigrationError`] if any embedded file isn't valid UTF-8.
pub fn migration_scripts<M: rust_embed::RustEmbed>() -> Result<Vec<MigrationScript>, MigrationError> {
    let mut files = M::iter().collect::<Vec<_>>();
    files.sort();

    files
        .into_iter()
        .map(|filename| {
            let file = M::get(&filename).ok_or_else(|| MigrationError::Script {
                filename: filename.to_string(),
                error: "embedded file vanished".to_string(),
            })?;
            let script = String::from_utf8(file.data.to_vec()).map_err(|_| MigrationError::Script {
                filename: filename.to_string(),
                error: "not valid UTF-8".to_string(),
            })?;
            Ok(MigrationScript {
                description: filename.to_string(),
                script,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database_url() -> Option<String> {
        std::env::var("DATABASE_URL").ok()
    }

    #[tokio::test]
    #[ignore = "requires a live Postgres at DATABASE_URL"]
    async fn migration_is_idempotent() {
        let Some(url) = database_url() else {
            return;
        };
        let pool = PgPool::connect(&url).await.expect("connect");

        let migrations = vec![MigrationScript {
            description: "0001_init.sql".into(),
            script: "CREATE TABLE IF NOT EXISTS registry_migration_smoke_test (id INT PRIMARY KEY)"
                .into(),
        }];
        migrate(&pool, &migrations).await.expect("first run");
        migrate(&pool, &migrations).await.expect("second run is a no-op");

        sqlx::query("DROP TABLE registry_migration_smoke_test")
            .execute(&pool)
            .await
            .ok();
        sqlx::query(&format!("DELETE FROM {MIGRATIONS_TABLE}"))
            .execute(&pool)
            .await
            .ok();
    }
}
