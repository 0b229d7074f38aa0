//! The ARM job database: `config`, `job`, `track` and `notifications`.
//!
//! One rusqlite connection behind a mutex is shared by the pipeline and
//! the notification channels. A file database uses WAL so the web UI can
//! read while a rip writes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

pub mod config_repo;
pub mod error;
pub mod job_repo;
pub mod migrations;
pub mod notification_repo;
pub mod track_repo;

pub use error::DatabaseError;

/// Waiting time when the web UI holds a write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens `arm.db` at `path`, creating its directory, and upgrades the schema.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self::prepare(conn)?;
        log::info!("Job database ready at {}", path.display());
        Ok(db)
    }

    /// Schema-complete database that lives as long as the handle.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let before = migrations::schema_version(&conn)?;
        migrations::run_all(&conn)?;
        if before < migrations::LATEST_VERSION {
            log::info!(
                "Schema upgraded from v{} to v{}",
                before,
                migrations::LATEST_VERSION
            );
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` while holding the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

/// `~/db/arm.db`, where ARM keeps its database.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join("db").join("arm.db"))
}
