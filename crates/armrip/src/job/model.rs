use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{transition, JobEvent, JobStatus, TransitionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscType {
    Dvd,
    Bluray,
    Music,
    Data,
    #[default]
    Unknown,
}

impl DiscType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscType::Dvd => "dvd",
            DiscType::Bluray => "bluray",
            DiscType::Music => "music",
            DiscType::Data => "data",
            DiscType::Unknown => "unknown",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, DiscType::Dvd | DiscType::Bluray)
    }
}

impl fmt::Display for DiscType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscType {
    type Err = std::convert::Infallible;

    /// Anything unrecognised reads back as `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "dvd" => DiscType::Dvd,
            "bluray" => DiscType::Bluray,
            "music" => DiscType::Music,
            "data" => DiscType::Data,
            _ => DiscType::Unknown,
        })
    }
}

/// A title proposed by one identification source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identification {
    pub title: String,
    pub year: Option<String>,
    pub video_type: Option<String>,
    pub imdb_id: Option<String>,
    pub poster_url: Option<String>,
    /// Which source produced this (e.g. `omdb`, `ai_label`).
    pub source: String,
}

/// One disc-ripping attempt.
///
/// `status` and `hasnicetitle` can only be changed through methods: the status
/// follows the transition table and `hasnicetitle` never goes back to false.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub job_id: i64,
    pub arm_version: String,
    pub crc_id: Option<String>,
    pub logfile: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    pub job_length: Option<String>,
    pub(crate) status: JobStatus,
    pub stage: Option<String>,
    pub progress: Option<String>,
    pub title: Option<String>,
    pub title_auto: Option<String>,
    pub title_manual: Option<String>,
    pub year: Option<String>,
    pub year_auto: Option<String>,
    pub year_manual: Option<String>,
    pub video_type: Option<String>,
    pub video_type_auto: Option<String>,
    pub video_type_manual: Option<String>,
    pub imdb_id: Option<String>,
    pub imdb_id_auto: Option<String>,
    pub imdb_id_manual: Option<String>,
    pub poster_url: Option<String>,
    pub poster_url_auto: Option<String>,
    pub poster_url_manual: Option<String>,
    pub devpath: String,
    pub mountpoint: Option<String>,
    pub label: Option<String>,
    pub disctype: DiscType,
    pub(crate) hasnicetitle: bool,
    /// Copy protection detected on the disc (AACS on Blu-ray).
    pub protection: bool,
    pub no_of_titles: Option<u32>,
    pub path: Option<String>,
    pub config_id: Option<i64>,
    pub drive_id: Option<i64>,
    pub errors: Option<String>,
    pub pid: Option<u32>,
    pub pid_hash: Option<String>,
    pub process_log: Option<String>,
}

impl Job {
    pub fn new(devpath: impl Into<String>) -> Self {
        Self {
            job_id: 0,
            arm_version: env!("CARGO_PKG_VERSION").to_string(),
            crc_id: None,
            logfile: None,
            start_time: None,
            stop_time: None,
            job_length: None,
            status: JobStatus::None,
            stage: None,
            progress: None,
            title: None,
            title_auto: None,
            title_manual: None,
            year: None,
            year_auto: None,
            year_manual: None,
            video_type: None,
            video_type_auto: None,
            video_type_manual: None,
            imdb_id: None,
            imdb_id_auto: None,
            imdb_id_manual: None,
            poster_url: None,
            poster_url_auto: None,
            poster_url_manual: None,
            devpath: devpath.into(),
            mountpoint: None,
            label: None,
            disctype: DiscType::Unknown,
            hasnicetitle: false,
            protection: false,
            no_of_titles: None,
            path: None,
            config_id: None,
            drive_id: None,
            errors: None,
            pid: None,
            pid_hash: None,
            process_log: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Moves the job along the transition table.
    pub fn apply(&mut self, event: JobEvent) -> Result<JobStatus, TransitionError> {
        let next = transition(self.status, event)?;
        self.status = next;
        Ok(next)
    }

    pub fn has_nice_title(&self) -> bool {
        self.hasnicetitle
    }

    /// Records a confident identification into the `*_auto` fields and marks
    /// the title as resolved. Manual overrides keep precedence.
    pub fn apply_identification(&mut self, ident: &Identification) {
        self.title_auto = Some(ident.title.clone());
        if ident.year.is_some() {
            self.year_auto = ident.year.clone();
        }
        if ident.video_type.is_some() {
            self.video_type_auto = ident.video_type.clone();
        }
        if ident.imdb_id.is_some() {
            self.imdb_id_auto = ident.imdb_id.clone();
        }
        if ident.poster_url.is_some() {
            self.poster_url_auto = ident.poster_url.clone();
        }
        self.hasnicetitle = true;
        self.refresh_resolved();
    }

    /// Title read from the disc itself (volume label, Blu-ray metadata).
    /// Does not count as a resolved identification.
    pub fn set_structural_title(&mut self, title: &str) {
        if title.trim().is_empty() {
            return;
        }
        self.title_auto = Some(title.trim().to_string());
        self.refresh_resolved();
    }

    /// Operator edit. The only path that writes the `*_manual` fields.
    pub fn apply_manual(&mut self, ident: &Identification) {
        self.title_manual = Some(ident.title.clone());
        self.year_manual = ident.year.clone();
        self.video_type_manual = ident.video_type.clone();
        self.imdb_id_manual = ident.imdb_id.clone();
        self.poster_url_manual = ident.poster_url.clone();
        self.hasnicetitle = true;
        self.refresh_resolved();
    }

    fn refresh_resolved(&mut self) {
        fn pick(manual: &Option<String>, auto: &Option<String>) -> Option<String> {
            manual
                .as_ref()
                .filter(|v| !v.is_empty())
                .or(auto.as_ref().filter(|v| !v.is_empty()))
                .cloned()
        }

        self.title = pick(&self.title_manual, &self.title_auto);
        self.year = pick(&self.year_manual, &self.year_auto);
        self.video_type = pick(&self.video_type_manual, &self.video_type_auto);
        self.imdb_id = pick(&self.imdb_id_manual, &self.imdb_id_auto);
        self.poster_url = pick(&self.poster_url_manual, &self.poster_url_auto);
    }

    /// Appends a line to the accumulated `errors` text.
    pub fn append_error(&mut self, message: &str) {
        match self.errors.as_mut() {
            Some(existing) if !existing.is_empty() => {
                existing.push('\n');
                existing.push_str(message);
            }
            _ => self.errors = Some(message.to_string()),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.errors.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// `Title (Year)` when the year is known, `unknown` without a title.
    pub fn display_title(&self) -> String {
        let title = self
            .title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or("unknown");
        match self.year.as_deref().filter(|y| !y.is_empty()) {
            Some(year) => format!("{} ({})", title, year),
            None => title.to_string(),
        }
    }

    /// Stamps `stop_time` and `job_length` (`H:MM:SS`).
    pub fn mark_stopped(&mut self, now: DateTime<Utc>) {
        self.stop_time = Some(now);
        if let Some(start) = self.start_time {
            let secs = (now - start).num_seconds().max(0);
            self.job_length = Some(format!(
                "{}:{:02}:{:02}",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60
            ));
        }
    }
}
