//! `PolicyRepo`: CRUD over the `policies` table, storing one whole policy
//! document per row rather than one row per rule (the policy model here is
//! a single process-wide document, built once at startup and replaced
//! wholesale on reload, never mutated in place).

use std::sync::Arc;

use registry_types::error::ApiError;
use sqlx::PgPool;

#[derive(Clone)]
pub struct PolicyRepo {
    pool: Arc<PgPool>,
}

#[derive(Debug, sqlx::FromRow)]
struct PolicyRaw {
    name: String,
    document: serde_json::Value,
}

impl PolicyRepo {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self))]
    pub async fn lookup(&self, name: &str) -> Result<Option<serde_json::Value>, ApiError> {
        sqlx::query_as("SELECT * FROM POLICIES WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(|_| ApiError::internal_error().in_context("policy", "lookup"))
            .map(|raw: Option<PolicyRaw>| raw.map(|p| p.document))
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<(String, serde_json::Value)>, ApiError> {
        sqlx::query_as("SELECT * FROM POLICIES")
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(|_| ApiError::internal_error().in_context("policy", "list"))
            .map(|rows: Vec<PolicyRaw>| rows.into_iter().map(|p| (p.name, p.document)).collect())
    }

    /// Insert or replace the document stored under `name`, the mechanism
    /// behind a policy hot reload: the ABAC parser/linker (C2) is re-run
    /// against the new document before it ever reaches this call, so what
    /// lands here always replaces the previous snapshot wholesale.
    #[tracing::instrument(skip(self, document))]
    pub async fn put(&self, name: &str, document: &serde_json::Value) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO POLICIES (name, document) VALUES ($1, $2)
             ON CONFLICT (name) DO UPDATE SET document = EXCLUDED.document",
        )
        .bind(name)
        .bind(document)
        .execute(self.pool.as_ref())
        .await
        .map_err(|_| ApiError::internal_error().in_context("policy", "put"))
        .map(|_| ())
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, name: &str) -> Result<bool, ApiError> {
        sqlx::query("DELETE FROM POLICIES WHERE name = $1")
            .bind(name)
            .execute(self.pool.as_ref())
            .await
            .map_err(|_| ApiError::internal_error().in_context("policy", "remove"))
            .map(|res| res.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database_url() -> Option<String> {
        std::env::var("DATABASE_URL").ok()
    }

    #[tokio::test]
    #[ignore = "requires a live Postgres at DATABASE_URL"]
    async fn crud() {
        let Some(url) = database_url() else {
            return;
        };
        let pool = Arc::new(crate::pool::connect(&url).await.expect("connect"));
        let repo = PolicyRepo::new(Arc::clone(&pool));

        let doc = serde_json::json!({"AllAccessPermissionRules": []});
        repo.put("default", &doc).await.expect("put");
        assert_eq!(repo.lookup("default").await.unwrap(), Some(doc.clone()));
        assert_eq!(repo.list().await.unwrap(), vec![("default".to_string(), doc)]);
        assert!(repo.remove("default").await.unwrap());
        assert_eq!(repo.lookup("default").await.unwrap(), None);
    }
}
