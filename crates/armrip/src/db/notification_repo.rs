//! Notification repository. Records are read and dismissed by the web UI.

use chrono::Utc;
use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRow {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub seen: bool,
    pub trigger_time: String,
    pub dismiss_time: Option<String>,
    pub cleared: bool,
}

impl NotificationRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            message: row.get("message")?,
            seen: row.get("seen")?,
            trigger_time: row.get("trigger_time")?,
            dismiss_time: row.get("dismiss_time")?,
            cleared: row.get("cleared")?,
        })
    }
}

pub fn insert(db: &Database, title: &str, message: &str) -> Result<i64, DatabaseError> {
    let now = Utc::now().to_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO notifications (title, message, trigger_time) VALUES (?1, ?2, ?3)",
            params![title, message, now],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Notifications neither read nor cleared, newest first.
pub fn find_unseen(db: &Database) -> Result<Vec<NotificationRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM notifications WHERE seen = 0 AND cleared = 0 ORDER BY id DESC",
        )?;
        let rows = stmt
            .query_map([], NotificationRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn mark_read(db: &Database, id: i64) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE notifications SET seen = 1, dismiss_time = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: "notifications",
                id,
            });
        }
        Ok(())
    })
}

/// Clears every notification. Returns how many rows changed.
pub fn clear_all(db: &Database) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("UPDATE notifications SET cleared = 1 WHERE cleared = 0", [])?;
        log::debug!("Cleared {} notifications", changed);
        Ok(changed)
    })
}
