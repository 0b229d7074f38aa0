//! Job repository: persistence for the `job` table.

use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, Row};

use super::{Database, DatabaseError};
use crate::job::{DiscType, Job, JobStatus};

/// Writable columns, in the order [`job_values`] binds them.
const JOB_COLUMNS: &[&str] = &[
    "arm_version",
    "crc_id",
    "logfile",
    "start_time",
    "stop_time",
    "job_length",
    "status",
    "stage",
    "progress",
    "title",
    "title_auto",
    "title_manual",
    "year",
    "year_auto",
    "year_manual",
    "video_type",
    "video_type_auto",
    "video_type_manual",
    "imdb_id",
    "imdb_id_auto",
    "imdb_id_manual",
    "poster_url",
    "poster_url_auto",
    "poster_url_manual",
    "devpath",
    "mountpoint",
    "label",
    "disctype",
    "hasnicetitle",
    "protection",
    "no_of_titles",
    "path",
    "config_id",
    "drive_id",
    "errors",
    "pid",
    "pid_hash",
    "process_log",
];

fn job_values(job: &Job) -> Vec<Box<dyn ToSql>> {
    vec![
        Box::new(job.arm_version.clone()),
        Box::new(job.crc_id.clone()),
        Box::new(job.logfile.clone()),
        Box::new(to_db_time(job.start_time)),
        Box::new(to_db_time(job.stop_time)),
        Box::new(job.job_length.clone()),
        Box::new(job.status.as_str()),
        Box::new(job.stage.clone()),
        Box::new(job.progress.clone()),
        Box::new(job.title.clone()),
        Box::new(job.title_auto.clone()),
        Box::new(job.title_manual.clone()),
        Box::new(job.year.clone()),
        Box::new(job.year_auto.clone()),
        Box::new(job.year_manual.clone()),
        Box::new(job.video_type.clone()),
        Box::new(job.video_type_auto.clone()),
        Box::new(job.video_type_manual.clone()),
        Box::new(job.imdb_id.clone()),
        Box::new(job.imdb_id_auto.clone()),
        Box::new(job.imdb_id_manual.clone()),
        Box::new(job.poster_url.clone()),
        Box::new(job.poster_url_auto.clone()),
        Box::new(job.poster_url_manual.clone()),
        Box::new(job.devpath.clone()),
        Box::new(job.mountpoint.clone()),
        Box::new(job.label.clone()),
        Box::new(job.disctype.as_str()),
        Box::new(job.hasnicetitle),
        Box::new(job.protection),
        Box::new(job.no_of_titles),
        Box::new(job.path.clone()),
        Box::new(job.config_id),
        Box::new(job.drive_id),
        Box::new(job.errors.clone()),
        Box::new(job.pid),
        Box::new(job.pid_hash.clone()),
        Box::new(job.process_log.clone()),
    ]
}

fn to_db_time(time: Option<DateTime<Utc>>) -> Option<String> {
    time.map(|t| t.to_rfc3339())
}

fn from_db_time(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn job_from_row(row: &Row<'_>) -> Result<Job, rusqlite::Error> {
    let status: String = row.get("status")?;
    let status = status.parse::<JobStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
    })?;
    let disctype: String = row.get("disctype")?;
    let disctype = disctype.parse::<DiscType>().unwrap_or_default();

    Ok(Job {
        job_id: row.get("job_id")?,
        arm_version: row.get::<_, Option<String>>("arm_version")?.unwrap_or_default(),
        crc_id: row.get("crc_id")?,
        logfile: row.get("logfile")?,
        start_time: from_db_time(row.get("start_time")?),
        stop_time: from_db_time(row.get("stop_time")?),
        job_length: row.get("job_length")?,
        status,
        stage: row.get("stage")?,
        progress: row.get("progress")?,
        title: row.get("title")?,
        title_auto: row.get("title_auto")?,
        title_manual: row.get("title_manual")?,
        year: row.get("year")?,
        year_auto: row.get("year_auto")?,
        year_manual: row.get("year_manual")?,
        video_type: row.get("video_type")?,
        video_type_auto: row.get("video_type_auto")?,
        video_type_manual: row.get("video_type_manual")?,
        imdb_id: row.get("imdb_id")?,
        imdb_id_auto: row.get("imdb_id_auto")?,
        imdb_id_manual: row.get("imdb_id_manual")?,
        poster_url: row.get("poster_url")?,
        poster_url_auto: row.get("poster_url_auto")?,
        poster_url_manual: row.get("poster_url_manual")?,
        devpath: row.get("devpath")?,
        mountpoint: row.get("mountpoint")?,
        label: row.get("label")?,
        disctype,
        hasnicetitle: row.get("hasnicetitle")?,
        protection: row.get("protection")?,
        no_of_titles: row.get("no_of_titles")?,
        path: row.get("path")?,
        config_id: row.get("config_id")?,
        drive_id: row.get("drive_id")?,
        errors: row.get("errors")?,
        pid: row.get("pid")?,
        pid_hash: row.get("pid_hash")?,
        process_log: row.get("process_log")?,
    })
}

/// Inserts a new job and returns its `job_id`.
pub fn insert(db: &Database, job: &Job) -> Result<i64, DatabaseError> {
    let placeholders: Vec<String> = (1..=JOB_COLUMNS.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO job ({}) VALUES ({})",
        JOB_COLUMNS.join(", "),
        placeholders.join(", ")
    );
    let values = job_values(job);

    db.with_conn(|conn| {
        let params_ref: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
        conn.execute(&sql, params_ref.as_slice())?;
        let id = conn.last_insert_rowid();
        log::debug!("Inserted job {} for {}", id, job.devpath);
        Ok(id)
    })
}

/// Overwrites every column of an existing job.
pub fn update(db: &Database, job: &Job) -> Result<(), DatabaseError> {
    let assignments: Vec<String> = JOB_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{} = ?{}", column, i + 1))
        .collect();
    let sql = format!(
        "UPDATE job SET {} WHERE job_id = ?{}",
        assignments.join(", "),
        JOB_COLUMNS.len() + 1
    );
    let mut values = job_values(job);
    values.push(Box::new(job.job_id));

    db.with_conn(|conn| {
        let params_ref: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
        let changed = conn.execute(&sql, params_ref.as_slice())?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: "job",
                id: job.job_id,
            });
        }
        Ok(())
    })
}

pub fn update_status(db: &Database, job_id: i64, status: JobStatus) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE job SET status = ?2 WHERE job_id = ?1",
            params![job_id, status.as_str()],
        )?;
        Ok(())
    })
}

/// Appends a line to the job's `errors` column.
pub fn append_error(db: &Database, job_id: i64, message: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE job SET errors = CASE
                WHEN errors IS NULL OR errors = '' THEN ?2
                ELSE errors || char(10) || ?2
             END
             WHERE job_id = ?1",
            params![job_id, message],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, job_id: i64) -> Result<Option<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM job WHERE job_id = ?1")?;
        let mut rows = stmt.query_map(params![job_id], job_from_row)?;
        match rows.next() {
            Some(Ok(job)) => Ok(Some(job)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Most recent successful job for the same disc fingerprint, other than
/// `exclude_job_id`.
pub fn find_successful_duplicate(
    db: &Database,
    crc_id: &str,
    exclude_job_id: i64,
) -> Result<Option<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM job
             WHERE crc_id = ?1 AND status = ?2 AND job_id != ?3
             ORDER BY job_id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(
            params![crc_id, JobStatus::Success.as_str(), exclude_job_id],
            job_from_row,
        )?;
        match rows.next() {
            Some(Ok(job)) => Ok(Some(job)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
