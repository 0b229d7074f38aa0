//! Job status lifecycle.
//!
//! `JobStatus` is a closed set of states stored as lower-case strings in the
//! `job.status` column. Every write goes through [`transition`], which rejects
//! moves the table below does not allow (e.g. `success → ripping`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    None,
    Active,
    Ripping,
    RippingFail,
    Transcoding,
    TranscodingFail,
    Success,
    Fail,
    Ejected,
}

/// What happened to a job. Paired with the current status to find the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    /// The job record was created for a device.
    Start,
    BeginRip,
    BeginTranscode,
    /// The current phase raised an error. Moves into the transient `*_fail` marker.
    PhaseFailed,
    /// Re-enter the phase after a transient failure.
    Retry,
    Complete,
    Abort,
    /// Operator removed the disc.
    Eject,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Illegal job transition from '{from}' on {event:?}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub event: JobEvent,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown job status '{0}'")]
pub struct UnknownStatus(pub String);

impl JobStatus {
    pub const ALL: [JobStatus; 9] = [
        JobStatus::None,
        JobStatus::Active,
        JobStatus::Ripping,
        JobStatus::RippingFail,
        JobStatus::Transcoding,
        JobStatus::TranscodingFail,
        JobStatus::Success,
        JobStatus::Fail,
        JobStatus::Ejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::None => "none",
            JobStatus::Active => "active",
            JobStatus::Ripping => "ripping",
            JobStatus::RippingFail => "ripping_fail",
            JobStatus::Transcoding => "transcoding",
            JobStatus::TranscodingFail => "transcoding_fail",
            JobStatus::Success => "success",
            JobStatus::Fail => "fail",
            JobStatus::Ejected => "ejected",
        }
    }

    /// Terminal states: `success`, `fail`, `ejected`.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Fail | JobStatus::Ejected
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_finished()
    }

    pub fn is_ripping(&self) -> bool {
        matches!(self, JobStatus::Ripping | JobStatus::RippingFail)
    }

    pub fn is_transcoding(&self) -> bool {
        matches!(self, JobStatus::Transcoding | JobStatus::TranscodingFail)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Computes the status that follows `from` when `event` happens.
pub fn transition(from: JobStatus, event: JobEvent) -> Result<JobStatus, TransitionError> {
    use JobEvent as E;
    use JobStatus as S;

    let next = match (from, event) {
        (S::None, E::Start) => S::Active,

        (S::Active, E::BeginRip) => S::Ripping,
        (S::Active, E::BeginTranscode) => S::Transcoding,

        (S::Ripping, E::PhaseFailed) => S::RippingFail,
        (S::Ripping, E::BeginTranscode) => S::Transcoding,
        (S::Ripping, E::Complete) => S::Success,
        (S::RippingFail, E::Retry) => S::Ripping,

        (S::Transcoding, E::PhaseFailed) => S::TranscodingFail,
        (S::Transcoding, E::Complete) => S::Success,
        (S::TranscodingFail, E::Retry) => S::Transcoding,

        (
            S::Active | S::Ripping | S::RippingFail | S::Transcoding | S::TranscodingFail,
            E::Abort,
        ) => S::Fail,
        (
            S::Active | S::Ripping | S::RippingFail | S::Transcoding | S::TranscodingFail,
            E::Eject,
        ) => S::Ejected,

        _ => return Err(TransitionError { from, event }),
    };

    Ok(next)
}
