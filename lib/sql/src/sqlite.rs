use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::SQLError;
use crate::traits::{Row, SQLStore, Stmt, Value};

/// SqliteStore is a SQLStore implementation backed by rusqlite (bundled SQLite).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, SQLError> {
        let conn = Connection::open(path)
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        // Enable WAL mode for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self, SQLError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Convert our Value enum to rusqlite's ToSql.
fn bind_params(params: &[Value]) -> Vec<Box<dyn rusqlite::types::ToSql + '_>> {
    params
        .iter()
        .map(|v| -> Box<dyn rusqlite::types::ToSql + '_> {
            match v {
                Value::Null => Box::new(rusqlite::types::Null),
                Value::Integer(i) => Box::new(*i),
                Value::Real(f) => Box::new(*f),
                Value::Text(s) => Box::new(s.as_str()),
            }
        })
        .collect()
}

impl SQLStore for SqliteStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SQLError::Query(e.to_string()))?;

        let bound = bind_params(params);
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            bound.iter().map(|b| b.as_ref()).collect();

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| SQLError::Query(e.to_string()))?;

        let column_names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let mut columns = Vec::new();
                for (i, name) in column_names.iter().enumerate() {
                    let val = row_value_at(row, i);
                    columns.push((name.clone(), val));
                }
                Ok(Row { columns })
            })
            .map_err(|e| SQLError::Query(e.to_string()))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(|e| SQLError::Query(e.to_string()))?);
        }
        Ok(result)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SQLError::Execution(e.to_string()))?;

        let bound = bind_params(params);
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            bound.iter().map(|b| b.as_ref()).collect();

        let affected = conn
            .execute(sql, param_refs.as_slice())
            .map_err(|e| SQLError::Execution(e.to_string()))?;

        Ok(affected as u64)
    }

    fn exec_batch(&self, stmts: &[Stmt]) -> Result<u64, SQLError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| SQLError::Execution(e.to_string()))?;

        let tx = conn
            .transaction()
            .map_err(|e| SQLError::Execution(e.to_string()))?;

        let mut affected = 0u64;
        for (sql, params) in stmts {
            let bound = bind_params(params);
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                bound.iter().map(|b| b.as_ref()).collect();

            // An error here drops `tx`, which rolls the batch back.
            affected += tx
                .execute(sql, param_refs.as_slice())
                .map_err(|e| SQLError::Execution(e.to_string()))?
                as u64;
        }

        tx.commit()
            .map_err(|e| SQLError::Execution(e.to_string()))?;

        Ok(affected)
    }
}

/// Extract a Value from a rusqlite row at a given column index.
fn row_value_at(row: &rusqlite::Row, idx: usize) -> Value {
    // Try integer first, then real, then text, then null.
    if let Ok(i) = row.get::<_, i64>(idx) {
        return Value::Integer(i);
    }
    if let Ok(f) = row.get::<_, f64>(idx) {
        return Value::Real(f);
    }
    if let Ok(s) = row.get::<_, String>(idx) {
        return Value::Text(s);
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_table() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .exec(
                "CREATE TABLE items (id TEXT PRIMARY KEY, data TEXT NOT NULL, price REAL)",
                &[],
            )
            .unwrap();
        store
    }

    #[test]
    fn exec_and_query_roundtrip() {
        let store = store_with_table();
        let affected = store
            .exec(
                "INSERT INTO items (id, data, price) VALUES (?1, ?2, ?3)",
                &[
                    Value::Text("a".into()),
                    Value::Text("{}".into()),
                    Value::Real(9.5),
                ],
            )
            .unwrap();
        assert_eq!(affected, 1);

        let rows = store
            .query("SELECT id, data, price FROM items", &[])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("id"), Some("a"));
        assert_eq!(rows[0].get_str("data"), Some("{}"));
    }

    #[test]
    fn count_query() {
        let store = store_with_table();
        for id in ["a", "b", "c"] {
            store
                .exec(
                    "INSERT INTO items (id, data) VALUES (?1, ?2)",
                    &[Value::Text(id.into()), Value::Text("{}".into())],
                )
                .unwrap();
        }
        let rows = store.query("SELECT COUNT(*) as cnt FROM items", &[]).unwrap();
        assert_eq!(rows[0].get_i64("cnt"), Some(3));
    }

    #[test]
    fn exec_batch_commits_together() {
        let store = store_with_table();
        let stmts: Vec<Stmt> = vec![
            (
                "INSERT INTO items (id, data) VALUES (?1, ?2)".into(),
                vec![Value::Text("a".into()), Value::Text("{}".into())],
            ),
            (
                "INSERT INTO items (id, data) VALUES (?1, ?2)".into(),
                vec![Value::Text("b".into()), Value::Text("{}".into())],
            ),
        ];
        assert_eq!(store.exec_batch(&stmts).unwrap(), 2);

        let rows = store.query("SELECT COUNT(*) as cnt FROM items", &[]).unwrap();
        assert_eq!(rows[0].get_i64("cnt"), Some(2));
    }

    #[test]
    fn exec_batch_rolls_back_on_failure() {
        let store = store_with_table();
        store
            .exec(
                "INSERT INTO items (id, data) VALUES (?1, ?2)",
                &[Value::Text("dup".into()), Value::Text("{}".into())],
            )
            .unwrap();

        // Second statement violates the primary key; the first must not stick.
        let stmts: Vec<Stmt> = vec![
            (
                "INSERT INTO items (id, data) VALUES (?1, ?2)".into(),
                vec![Value::Text("fresh".into()), Value::Text("{}".into())],
            ),
            (
                "INSERT INTO items (id, data) VALUES (?1, ?2)".into(),
                vec![Value::Text("dup".into()), Value::Text("{}".into())],
            ),
        ];
        assert!(store.exec_batch(&stmts).is_err());

        let rows = store
            .query("SELECT COUNT(*) as cnt FROM items WHERE id = 'fresh'", &[])
            .unwrap();
        assert_eq!(rows[0].get_i64("cnt"), Some(0));
    }

    #[test]
    fn null_params_bind() {
        let store = store_with_table();
        store
            .exec(
                "INSERT INTO items (id, data, price) VALUES (?1, ?2, ?3)",
                &[
                    Value::Text("n".into()),
                    Value::Text("{}".into()),
                    Value::Null,
                ],
            )
            .unwrap();
        let rows = store
            .query("SELECT price FROM items WHERE id = 'n'", &[])
            .unwrap();
        assert!(matches!(rows[0].get("price"), Some(Value::Null)));
    }
}
