//! Library path naming.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::job::Job;

const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Strips characters illegal on common filesystems and collapses whitespace.
/// Idempotent.
pub fn clean_for_filename(name: &str) -> String {
    let stripped: String = name.chars().filter(|c| !ILLEGAL_CHARS.contains(c)).collect();
    RE_WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// `movie` → `movies`, `series` / `tv show` → `tv`, anything else unchanged.
/// Empty or missing types have no segment.
pub fn library_segment(video_type: Option<&str>) -> Option<String> {
    let video_type = video_type.map(str::trim).filter(|t| !t.is_empty())?;
    Some(
        match video_type.to_ascii_lowercase().as_str() {
            "movie" => "movies".to_string(),
            "series" | "tv show" => "tv".to_string(),
            _ => video_type.to_string(),
        },
    )
}

/// The job's directory name under the raw, transcode and library roots.
pub fn job_dir_name(job: &Job) -> String {
    let cleaned = clean_for_filename(&job.display_title());
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// `<root>/<clean display title>`
pub fn work_dir(root: &Path, job: &Job) -> PathBuf {
    root.join(job_dir_name(job))
}

/// `<completed>/<segment>/<clean display title>`, or without the segment when
/// the video type is unknown.
pub fn library_dir(completed: &Path, job: &Job) -> PathBuf {
    match library_segment(job.video_type.as_deref()) {
        Some(segment) => completed.join(clean_for_filename(&segment)).join(job_dir_name(job)),
        None => completed.join(job_dir_name(job)),
    }
}

/// Data discs go straight under the completed root, named after the title
/// or label.
pub fn data_dir(completed: &Path, job: &Job) -> PathBuf {
    let name = job
        .title
        .as_deref()
        .or(job.label.as_deref())
        .map(clean_for_filename)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "data_disc".to_string());
    completed.join(name)
}
