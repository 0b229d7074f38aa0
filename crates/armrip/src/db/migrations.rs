//! Schema upgrades for the ARM database.
//!
//! Applied steps are recorded in `_migrations`. Each step runs in its own
//! transaction together with its bookkeeping row, so an interrupted upgrade
//! resumes at the step that failed.

use rusqlite::{params, Connection};

use super::error::DatabaseError;

/// One schema step.
struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
    /// `(table, column)` already present in databases written by older
    /// ARM releases; the step is recorded without running.
    unless_column: Option<(&'static str, &'static str)>,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "create_config_table",
        sql: include_str!("sql/001_create_config.sql"),
        unless_column: None,
    },
    Step {
        version: 2,
        name: "create_job_table",
        sql: include_str!("sql/002_create_job.sql"),
        unless_column: None,
    },
    Step {
        version: 3,
        name: "create_track_table",
        sql: include_str!("sql/003_create_track.sql"),
        unless_column: None,
    },
    Step {
        version: 4,
        name: "create_notifications_table",
        sql: include_str!("sql/004_create_notifications.sql"),
        unless_column: None,
    },
    Step {
        version: 5,
        name: "add_protection_to_job",
        sql: include_str!("sql/005_add_protection.sql"),
        unless_column: Some(("job", "protection")),
    },
];

/// Highest schema version this build knows about.
pub const LATEST_VERSION: u32 = 5;

/// Returns the highest applied schema version, 0 for an empty database.
pub fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let tracked: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_migrations')",
        [],
        |r| r.get(0),
    )?;
    if !tracked {
        return Ok(0);
    }
    Ok(conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |r| r.get(0))?)
}

/// Brings the schema up to [`LATEST_VERSION`].
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = schema_version(conn)?;
    for step in STEPS.iter().filter(|s| s.version > current) {
        apply(conn, step)?;
    }
    Ok(())
}

fn apply(conn: &Connection, step: &Step) -> Result<(), DatabaseError> {
    let failed = |e: rusqlite::Error| DatabaseError::Migration {
        version: step.version,
        reason: e.to_string(),
    };

    let tx = conn.unchecked_transaction()?;
    let present = match step.unless_column {
        Some((table, column)) => has_column(&tx, table, column)?,
        None => false,
    };
    if present {
        log::info!("Schema v{} ({}) already present, recording only", step.version, step.name);
    } else {
        log::info!("Upgrading schema to v{}: {}", step.version, step.name);
        tx.execute_batch(step.sql).map_err(failed)?;
    }
    tx.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        params![step.version, step.name],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    Ok(conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2)",
        params![table, column],
        |r| r.get(0),
    )?)
}
