pub mod attachment;
pub mod equipment;
pub mod listing;
pub mod reservation;
pub mod schema;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use agrimart_core::{merge_patch, now_rfc3339, valid_id, FilterValue, ListQuery, ServiceError};
use blob::BlobStore;
use sql::{SQLStore, Stmt, Value};

/// Marketplace service — holds the storage backends and provides all
/// business logic for listings, equipment, and reservations.
pub struct MarketService {
    pub(crate) sql: Arc<dyn SQLStore>,
    pub(crate) blob: Arc<dyn BlobStore>,
}

impl MarketService {
    pub fn new(
        sql: Arc<dyn SQLStore>,
        blob: Arc<dyn BlobStore>,
    ) -> Result<Self, ServiceError> {
        schema::init_schema(sql.as_ref())?;
        Ok(Self { sql, blob })
    }

    /// Reject malformed record identifiers before any store access.
    pub(crate) fn ensure_id(label: &str, id: &str) -> Result<(), ServiceError> {
        if valid_id(id) {
            Ok(())
        } else {
            Err(ServiceError::Validation(format!(
                "invalid {} id format",
                label
            )))
        }
    }

    // ── Generic CRUD helpers ──

    /// Build the INSERT for a record stored as JSON with indexed columns.
    pub(crate) fn insert_stmt<T: Serialize>(
        table: &str,
        id: &str,
        record: &T,
        indexes: &[(&str, Value)],
    ) -> Result<Stmt, ServiceError> {
        let json = serde_json::to_string(record)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let mut cols = vec!["id", "data"];
        let mut placeholders = vec!["?1".to_string(), "?2".to_string()];
        let mut params = vec![Value::Text(id.to_string()), Value::Text(json)];

        for (i, (col, val)) in indexes.iter().enumerate() {
            let idx = i + 3;
            cols.push(col);
            placeholders.push(format!("?{}", idx));
            params.push(val.clone());
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            cols.join(", "),
            placeholders.join(", "),
        );

        Ok((sql, params))
    }

    /// Insert a record as JSON into a table with indexed columns.
    pub(crate) fn insert_record<T: Serialize>(
        &self,
        table: &str,
        id: &str,
        record: &T,
        indexes: &[(&str, Value)],
    ) -> Result<(), ServiceError> {
        let (sql, params) = Self::insert_stmt(table, id, record, indexes)?;
        self.sql
            .exec(&sql, &params)
            .map_err(|e| map_insert_err(e.to_string()))?;
        Ok(())
    }

    /// Get a record by id, deserializing the JSON `data` column.
    pub(crate) fn get_record<T: DeserializeOwned>(
        &self,
        table: &str,
        label: &str,
        id: &str,
    ) -> Result<T, ServiceError> {
        let sql = format!("SELECT data FROM {} WHERE id = ?1", table);
        let rows = self
            .sql
            .query(&sql, &[Value::Text(id.to_string())])
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("{} '{}' not found", label, id)))?;
        let data = row
            .get_str("data")
            .ok_or_else(|| ServiceError::Internal("missing data column".into()))?;
        serde_json::from_str(data).map_err(|e| ServiceError::Internal(e.to_string()))
    }

    /// Update a record's JSON data and indexed columns.
    pub(crate) fn update_record<T: Serialize>(
        &self,
        table: &str,
        label: &str,
        id: &str,
        record: &T,
        indexes: &[(&str, Value)],
    ) -> Result<(), ServiceError> {
        let json = serde_json::to_string(record)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let mut sets = vec!["data = ?1".to_string()];
        let mut params: Vec<Value> = vec![Value::Text(json)];

        for (i, (col, val)) in indexes.iter().enumerate() {
            let idx = i + 2;
            sets.push(format!("{} = ?{}", col, idx));
            params.push(val.clone());
        }

        let id_idx = params.len() + 1;
        params.push(Value::Text(id.to_string()));

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            table,
            sets.join(", "),
            id_idx,
        );

        let affected = self
            .sql
            .exec(&sql, &params)
            .map_err(|e| map_insert_err(e.to_string()))?;

        if affected == 0 {
            return Err(ServiceError::NotFound(format!("{} '{}' not found", label, id)));
        }

        Ok(())
    }

    /// Delete a record by id.
    pub(crate) fn delete_record(
        &self,
        table: &str,
        label: &str,
        id: &str,
    ) -> Result<(), ServiceError> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", table);
        let affected = self
            .sql
            .exec(&sql, &[Value::Text(id.to_string())])
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("{} '{}' not found", label, id)));
        }
        Ok(())
    }

    // ── Query execution ──

    /// Run a parsed list query against a table: fixed `extra` equality
    /// filters AND the query's own conditions, with sort and pagination.
    ///
    /// Returns the raw JSON documents (unprojected — callers inject
    /// derived fields first) plus the total match count, computed by
    /// re-running the conditions as a COUNT query.
    pub(crate) fn query_docs(
        &self,
        table: &str,
        query: &ListQuery,
        extra: &[(&str, Value)],
    ) -> Result<(Vec<serde_json::Value>, usize), ServiceError> {
        let mut where_clauses = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        for (col, val) in extra {
            where_clauses.push(format!("{} = ?{}", col, params.len() + 1));
            params.push(val.clone());
        }
        for cond in &query.conditions {
            where_clauses.push(format!(
                "{} {} ?{}",
                cond.column,
                cond.op.as_sql(),
                params.len() + 1
            ));
            params.push(filter_param(&cond.value));
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", where_clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) as cnt FROM {}{}", table, where_sql);
        let rows = self
            .sql
            .query(&count_sql, &params)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let total = rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0) as usize;

        let order_sql = query
            .sort
            .iter()
            .map(|k| {
                format!(
                    "{} {}",
                    k.column,
                    if k.descending { "DESC" } else { "ASC" }
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        let limit_idx = params.len() + 1;
        let offset_idx = params.len() + 2;
        params.push(Value::Integer(query.limit as i64));
        params.push(Value::Integer(query.skip() as i64));

        let sql = format!(
            "SELECT data FROM {}{} ORDER BY {} LIMIT ?{} OFFSET ?{}",
            table, where_sql, order_sql, limit_idx, offset_idx,
        );

        let rows = self
            .sql
            .query(&sql, &params)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let mut docs = Vec::new();
        for row in &rows {
            let data = row
                .get_str("data")
                .ok_or_else(|| ServiceError::Internal("missing data column".into()))?;
            let doc: serde_json::Value = serde_json::from_str(data)
                .map_err(|e| ServiceError::Internal(e.to_string()))?;
            docs.push(doc);
        }

        Ok((docs, total))
    }

    /// List all records matching fixed equality filters, newest first,
    /// without pagination.
    pub(crate) fn list_docs_where<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, Value)],
    ) -> Result<Vec<T>, ServiceError> {
        let mut where_clauses = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        for (col, val) in filters {
            where_clauses.push(format!("{} = ?{}", col, params.len() + 1));
            params.push(val.clone());
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", where_clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT data FROM {}{} ORDER BY created_at DESC",
            table, where_sql,
        );

        let rows = self
            .sql
            .query(&sql, &params)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let mut items = Vec::new();
        for row in &rows {
            let data = row
                .get_str("data")
                .ok_or_else(|| ServiceError::Internal("missing data column".into()))?;
            let item: T = serde_json::from_str(data)
                .map_err(|e| ServiceError::Internal(e.to_string()))?;
            items.push(item);
        }

        Ok(items)
    }

    /// Apply a field patch to a record: bumps `rev`, refreshes
    /// `updatedAt`, merges the provided fields, deserializes back.
    ///
    /// Callers build the patch from an allow-list, so `id` and
    /// `createdAt` can never appear in it.
    pub(crate) fn patch_doc<T: Serialize + DeserializeOwned>(
        current: &T,
        mut patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<T, ServiceError> {
        let mut doc = serde_json::to_value(current)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let rev = doc.get("rev").and_then(|v| v.as_u64()).unwrap_or(0);
        patch.insert("rev".into(), serde_json::json!(rev + 1));
        patch.insert("updatedAt".into(), serde_json::json!(now_rfc3339()));

        merge_patch(&mut doc, &serde_json::Value::Object(patch));
        serde_json::from_value(doc).map_err(|e| ServiceError::Internal(e.to_string()))
    }
}

/// Convert a typed filter value to a SQL parameter.
fn filter_param(value: &FilterValue) -> Value {
    match value {
        FilterValue::Int(i) => Value::Integer(*i),
        FilterValue::Float(f) => Value::Real(*f),
        FilterValue::Bool(b) => Value::Integer(*b as i64),
        FilterValue::Text(s) => Value::Text(s.clone()),
    }
}

/// Map a store-level write error, detecting duplicate unique keys.
fn map_insert_err(msg: String) -> ServiceError {
    if msg.contains("UNIQUE constraint") {
        ServiceError::Conflict(msg)
    } else {
        ServiceError::Storage(msg)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use blob::FileStore;
    use sql::SqliteStore;

    /// A service over in-memory SQLite and a temp-dir blob store.
    /// The TempDir must outlive the service.
    pub(crate) fn market_service() -> (tempfile::TempDir, MarketService) {
        let dir = tempfile::tempdir().unwrap();
        let sql: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let blob: Arc<dyn BlobStore> = Arc::new(FileStore::open(dir.path()).unwrap());
        let svc = MarketService::new(sql, blob).unwrap();
        (dir, svc)
    }
}
