//! Track repository: titles and audio tracks belonging to a job.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};
use crate::job::Track;

fn track_from_row(row: &Row<'_>) -> Result<Track, rusqlite::Error> {
    let length: i64 = row.get("length")?;
    Ok(Track {
        track_id: row.get("track_id")?,
        job_id: row.get("job_id")?,
        track_number: row.get("track_number")?,
        length: length.max(0) as u64,
        aspect_ratio: row.get::<_, Option<String>>("aspect_ratio")?.unwrap_or_default(),
        fps: row.get("fps")?,
        main_feature: row.get("main_feature")?,
        basename: row.get("basename")?,
        filename: row.get("filename")?,
        new_filename: row.get("new_filename")?,
        orig_filename: row.get("orig_filename")?,
        ripped: row.get("ripped")?,
        process: row.get("process")?,
        source: row.get("source")?,
    })
}

/// Inserts a track and returns its `track_id`.
pub fn insert(db: &Database, track: &Track) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO track (job_id, track_number, length, aspect_ratio, fps, main_feature,
             basename, filename, new_filename, orig_filename, ripped, process, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                track.job_id,
                track.track_number,
                track.length as i64,
                track.aspect_ratio,
                track.fps,
                track.main_feature,
                track.basename,
                track.filename,
                track.new_filename,
                track.orig_filename,
                track.ripped,
                track.process,
                track.source,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Updates an existing track. `job_id` and `track_number` are fixed at insert.
pub fn update(db: &Database, track: &Track) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE track SET length=?2, aspect_ratio=?3, fps=?4, main_feature=?5,
             basename=?6, filename=?7, new_filename=?8, orig_filename=?9, ripped=?10,
             process=?11, source=?12
             WHERE track_id=?1",
            params![
                track.track_id,
                track.length as i64,
                track.aspect_ratio,
                track.fps,
                track.main_feature,
                track.basename,
                track.filename,
                track.new_filename,
                track.orig_filename,
                track.ripped,
                track.process,
                track.source,
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: "track",
                id: track.track_id,
            });
        }
        Ok(())
    })
}

/// All tracks of a job, ordered by track number.
pub fn find_by_job(db: &Database, job_id: i64) -> Result<Vec<Track>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM track WHERE job_id = ?1 ORDER BY track_number, track_id")?;
        let tracks = stmt
            .query_map(params![job_id], track_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    })
}
