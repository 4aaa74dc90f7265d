//! `DescriptorRepo`: list/get queries over the descriptor tables, gated by
//! the [`QueryFilter`] the authorizer (C6/C7) already resolved for the
//! caller. Splices an arbitrary lowered predicate and its joins onto the
//! base query rather than a fixed `WHERE` clause, and projects any masked
//! column through a `CASE WHEN` built from the caller's mask plan.

use std::sync::Arc;

use registry_sql::{MaskFlag, QueryFilter, SqlValue};
use registry_types::error::ApiError;
use sqlx::{postgres::PgArguments, query::Query, PgPool, Postgres, Row};

use crate::cursor;

const DEFAULT_PAGE_SIZE: i64 = 50;

#[derive(Clone)]
pub struct DescriptorRepo {
    pool: Arc<PgPool>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AasDescriptor {
    pub id: String,
    pub id_short: String,
    pub asset_kind: String,
    pub global_asset_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SubmodelDescriptor {
    pub id: String,
    pub aasdesc_id: String,
    pub id_short: String,
    pub semantic_id: Option<String>,
}

impl DescriptorRepo {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, filter, mask))]
    pub async fn get_aas_descriptor_by_id(
        &self,
        id: &str,
        filter: &QueryFilter,
        mask: &[MaskFlag],
    ) -> Result<Option<AasDescriptor>, ApiError> {
        let joins = join_sql(&filter.joins);
        let mut offset = 1 + filter.binds.len();
        let id_short = masked_column("aasdesc", "id_short", "idShort", mask, &mut offset);
        let asset_kind = masked_column("aasdesc", "asset_kind", "assetKind", mask, &mut offset);
        let global_asset_id =
            masked_column("aasdesc", "global_asset_id", "globalAssetId", mask, &mut offset);

        let sql = format!(
            "SELECT DISTINCT aasdesc.id, {}, {}, {}
             FROM aas_descriptors aasdesc{joins}
             WHERE aasdesc.id = $1{}",
            id_short.sql,
            asset_kind.sql,
            global_asset_id.sql,
            filter_clause(filter, 1),
        );

        let mut query = sqlx::query(&sql).bind(id);
        query = bind_values(query, &filter.binds);
        query = bind_values(query, &id_short.binds);
        query = bind_values(query, &asset_kind.binds);
        query = bind_values(query, &global_asset_id.binds);

        query
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(map_db_err)
            .map(|row| row.map(|r| row_to_aas(&r)))
    }

    /// DenyLeakFree pre-check: does this id exist at all, ignoring the
    /// caller's filter? Lets a handler tell a denied-but-existing resource
    /// (403) apart from one that genuinely doesn't exist (404).
    #[tracing::instrument(skip(self))]
    pub async fn aas_descriptor_exists(&self, id: &str) -> Result<bool, ApiError> {
        sqlx::query("SELECT 1 FROM aas_descriptors WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(map_db_err)
            .map(|row| row.is_some())
    }

    #[tracing::instrument(skip(self, filter, mask))]
    pub async fn list_aas_descriptors(
        &self,
        filter: &QueryFilter,
        cursor: Option<&str>,
        limit: Option<i64>,
        mask: &[MaskFlag],
    ) -> Result<(Vec<AasDescriptor>, Option<String>), ApiError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
        let from_id = cursor.map(cursor::decode).transpose()?;

        let joins = join_sql(&filter.joins);
        let cursor_offset = usize::from(from_id.is_some());
        let where_clauses = {
            let mut clauses = Vec::new();
            if from_id.is_some() {
                clauses.push("aasdesc.id >= $1".to_string());
            }
            if let Some(sql) = &filter.where_sql {
                clauses.push(registry_sql::renumber_placeholders(sql, cursor_offset));
            }
            clauses
        };
        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", where_clauses.join(" AND "))
        };

        let mut offset = cursor_offset + filter.binds.len();
        let id_short = masked_column("aasdesc", "id_short", "idShort", mask, &mut offset);
        let asset_kind = masked_column("aasdesc", "asset_kind", "assetKind", mask, &mut offset);
        let global_asset_id =
            masked_column("aasdesc", "global_asset_id", "globalAssetId", mask, &mut offset);

        let sql = format!(
            "SELECT DISTINCT aasdesc.id, {}, {}, {}
             FROM aas_descriptors aasdesc{joins}{where_sql}
             ORDER BY aasdesc.id ASC
             LIMIT {}",
            id_short.sql,
            asset_kind.sql,
            global_asset_id.sql,
            limit + 1,
        );

        let mut query = sqlx::query(&sql);
        if let Some(id) = &from_id {
            query = query.bind(id);
        }
        query = bind_values(query, &filter.binds);
        query = bind_values(query, &id_short.binds);
        query = bind_values(query, &asset_kind.binds);
        query = bind_values(query, &global_asset_id.binds);

        let rows = query
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(map_db_err)?;

        let mut items: Vec<AasDescriptor> = rows.iter().map(row_to_aas).collect();
        let next_cursor = if items.len() > limit as usize {
            items.truncate(limit as usize);
            items.last().map(|d| cursor::encode(&d.id))
        } else {
            None
        };

        Ok((items, next_cursor))
    }

    #[tracing::instrument(skip(self, filter, mask))]
    pub async fn list_submodel_descriptors(
        &self,
        aasdesc_id: &str,
        filter: &QueryFilter,
        mask: &[MaskFlag],
    ) -> Result<Vec<SubmodelDescriptor>, ApiError> {
        let joins = join_sql(&filter.joins);
        let mut offset = 1 + filter.binds.len();
        let id_short = masked_column("smdesc", "id_short", "idShort", mask, &mut offset);
        let semantic_id = masked_column("smdesc", "semantic_id", "semanticId", mask, &mut offset);

        let sql = format!(
            "SELECT DISTINCT smdesc.id, smdesc.aasdesc_id, {}, {}
             FROM submodel_descriptors smdesc{joins}
             WHERE smdesc.aasdesc_id = $1{}",
            id_short.sql,
            semantic_id.sql,
            filter_clause(filter, 1),
        );

        let mut query = sqlx::query(&sql).bind(aasdesc_id);
        query = bind_values(query, &filter.binds);
        query = bind_values(query, &id_short.binds);
        query = bind_values(query, &semantic_id.binds);

        query
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(map_db_err)
            .map(|rows| rows.iter().map(row_to_submodel).collect())
    }
}

fn join_sql(joins: &[registry_sql::JoinClause]) -> String {
    joins
        .iter()
        .map(|j| format!(" JOIN {} {} ON {}", j.table, j.alias, j.on))
        .collect()
}

fn filter_clause(filter: &QueryFilter, offset: usize) -> String {
    filter
        .where_sql
        .as_ref()
        .map(|sql| format!(" AND {}", registry_sql::renumber_placeholders(sql, offset)))
        .unwrap_or_default()
}

/// One projected column: its SQL (bare or `CASE WHEN` masked) and any
/// binds its masking predicate needs, in placeholder order.
struct MaskedColumn {
    sql: String,
    binds: Vec<SqlValue>,
}

/// Looks up `field_name` (the mask plan's JSON-level field name) in
/// `mask`; if present, renumbers its predicate's placeholders to start
/// after `*offset` existing binds and wraps the column in a `CASE WHEN`,
/// advancing `*offset` by the predicate's own bind count. Otherwise
/// returns the bare `alias.column` untouched.
fn masked_column(
    alias: &str,
    column: &str,
    field_name: &str,
    mask: &[MaskFlag],
    offset: &mut usize,
) -> MaskedColumn {
    match mask.iter().find(|flag| flag.field == field_name) {
        Some(flag) => {
            let predicate = registry_sql::renumber_placeholders(&flag.predicate_sql, *offset);
            *offset += flag.binds.len();
            MaskedColumn {
                sql: format!("CASE WHEN {predicate} THEN {alias}.{column} ELSE NULL END AS {column}"),
                binds: flag.binds.clone(),
            }
        }
        None => MaskedColumn {
            sql: format!("{alias}.{column}"),
            binds: Vec::new(),
        },
    }
}

fn bind_values<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    values: &'q [SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for bind in values {
        query = match bind {
            SqlValue::Str(s) => query.bind(s),
            SqlValue::Num(n) => query.bind(n),
            SqlValue::Bool(b) => query.bind(b),
            SqlValue::DateTime(dt) => query.bind(dt),
            SqlValue::StrArray(items) => query.bind(items),
            SqlValue::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

fn row_to_aas(row: &sqlx::postgres::PgRow) -> AasDescriptor {
    AasDescriptor {
        id: row.get("id"),
        id_short: row.get("id_short"),
        asset_kind: row.get("asset_kind"),
        global_asset_id: row.get("global_asset_id"),
    }
}

fn row_to_submodel(row: &sqlx::postgres::PgRow) -> SubmodelDescriptor {
    SubmodelDescriptor {
        id: row.get("id"),
        aasdesc_id: row.get("aasdesc_id"),
        id_short: row.get("id_short"),
        semantic_id: row.get("semantic_id"),
    }
}

fn map_db_err(err: sqlx::Error) -> ApiError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return ApiError::conflict();
        }
    }
    ApiError::internal_error().in_context("descriptor", "query")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_column_wraps_case_when_and_advances_offset() {
        let mask = vec![MaskFlag {
            field: "assetKind".to_string(),
            predicate_sql: "($1 = $2)".to_string(),
            binds: vec![SqlValue::Str("a".into()), SqlValue::Str("b".into())],
        }];
        let mut offset = 3;
        let col = masked_column("aasdesc", "asset_kind", "assetKind", &mask, &mut offset);
        assert_eq!(
            col.sql,
            "CASE WHEN ($4 = $5) THEN aasdesc.asset_kind ELSE NULL END AS asset_kind"
        );
        assert_eq!(col.binds.len(), 2);
        assert_eq!(offset, 5);
    }

    #[test]
    fn unmasked_column_is_bare_and_does_not_advance_offset() {
        let mut offset = 2;
        let col = masked_column("aasdesc", "asset_kind", "assetKind", &[], &mut offset);
        assert_eq!(col.sql, "aasdesc.asset_kind");
        assert!(col.binds.is_empty());
        assert_eq!(offset, 2);
    }
}
