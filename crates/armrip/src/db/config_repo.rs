//! Config snapshot repository: one `config` row per job.

use rusqlite::types::{ToSql, Value as SqlValue};
use rusqlite::params;
use serde_json::{Map, Value};

use super::{Database, DatabaseError};
use crate::config::snapshot::SNAPSHOT_COLUMNS;
use crate::config::ConfigSnapshot;

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql_value(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => Value::from(f),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(_) => Value::Null,
    }
}

/// Persists a snapshot and returns the new `config_id`.
///
/// Columns absent from the snapshot fall back to the table defaults.
pub fn insert(db: &Database, snapshot: &ConfigSnapshot) -> Result<i64, DatabaseError> {
    let present: Vec<&str> = SNAPSHOT_COLUMNS
        .iter()
        .copied()
        .filter(|column| snapshot.values.contains_key(*column))
        .collect();

    if present.is_empty() {
        return db.with_conn(|conn| {
            conn.execute("INSERT INTO config DEFAULT VALUES", [])?;
            Ok(conn.last_insert_rowid())
        });
    }

    let placeholders: Vec<String> = (1..=present.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO config ({}) VALUES ({})",
        present.join(", "),
        placeholders.join(", ")
    );
    let values: Vec<SqlValue> = present
        .iter()
        .map(|column| to_sql_value(&snapshot.values[*column]))
        .collect();

    db.with_conn(|conn| {
        let params_ref: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
        conn.execute(&sql, params_ref.as_slice())?;
        let id = conn.last_insert_rowid();
        log::debug!("Stored config snapshot {}", id);
        Ok(id)
    })
}

/// Loads a snapshot. Booleans come back as `0`/`1`.
pub fn find_by_id(db: &Database, config_id: i64) -> Result<Option<ConfigSnapshot>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM config WHERE config_id = ?1",
        SNAPSHOT_COLUMNS.join(", ")
    );

    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![config_id], |row| {
            let mut values = Map::new();
            for (i, column) in SNAPSHOT_COLUMNS.iter().enumerate() {
                let value: SqlValue = row.get(i)?;
                values.insert(column.to_string(), from_sql_value(value));
            }
            Ok(values)
        })?;

        match rows.next() {
            Some(Ok(values)) => Ok(Some(ConfigSnapshot { config_id, values })),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
