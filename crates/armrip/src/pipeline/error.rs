use std::path::PathBuf;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::error::{MountError, StorageError, ToolError};
use crate::job::TransitionError;

/// Errors that end a job with status `fail`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Mount failed: {0}")]
    Mount(#[from] MountError),

    #[error("Unknown disc type")]
    UnknownDiscType,

    #[error("Extraction failed: {0}")]
    Extraction(#[source] ToolError),

    #[error("Extraction produced no files in '{}'", .path.display())]
    NoOutput { path: PathBuf },

    #[error("Transcoding failed for {failed} of {total} files: {details}")]
    Transcode {
        failed: usize,
        total: usize,
        details: String,
    },

    #[error("Audio rip failed: {0}")]
    MusicRip(#[source] ToolError),

    #[error("Data copy failed: {0}")]
    DataCopy(#[source] StorageError),

    #[error("Could not prepare '{}': {source}", .path.display())]
    WorkDir {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl PipelineError {
    /// Phase name reported to the error diagnosis.
    pub fn phase(&self) -> &'static str {
        match self {
            PipelineError::Mount(_) | PipelineError::UnknownDiscType => "identification",
            PipelineError::Extraction(_)
            | PipelineError::NoOutput { .. }
            | PipelineError::MusicRip(_)
            | PipelineError::DataCopy(_) => "ripping",
            PipelineError::Transcode { .. } => "transcoding",
            PipelineError::WorkDir { .. }
            | PipelineError::Transition(_)
            | PipelineError::Database(_) => "internal",
        }
    }

    /// External tool involved, if any.
    pub fn tool(&self) -> Option<&'static str> {
        match self {
            PipelineError::Extraction(_) | PipelineError::NoOutput { .. } => Some("MakeMKV"),
            PipelineError::MusicRip(_) => Some("abcde"),
            PipelineError::Mount(_) => Some("mount"),
            _ => None,
        }
    }
}

/// Problems that were logged but did not fail the job.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    RelocationSkipped { path: PathBuf, error: String },
    Relocation { error: String },
    Permissions { error: String },
    LibraryRefresh { error: String },
    Cleanup { error: String },
    Persistence { error: String },
}
