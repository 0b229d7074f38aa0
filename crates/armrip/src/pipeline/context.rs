use std::path::PathBuf;

use crate::ai::{Diagnosis, TranscodeRecommendation};
use crate::job::{Job, Track};

use super::error::PipelineWarning;

/// Results of advisory AI calls. Kept beside the job, never persisted with it.
#[derive(Debug, Clone, Default)]
pub struct Advisory {
    pub transcode: Option<TranscodeRecommendation>,
    pub diagnosis: Option<Diagnosis>,
}

pub struct PipelineContext {
    pub job: Job,

    // Filled by track discovery (video) or the album lookup (music)
    pub tracks: Vec<Track>,

    // `WIDTHxHEIGHT` of the main title, when the disc scan reported it
    pub main_resolution: Option<String>,

    // Set once identification has named the job
    pub raw_dir: Option<PathBuf>,
    pub transcode_dir: Option<PathBuf>,
    pub library_dir: Option<PathBuf>,

    pub advisory: Advisory,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            tracks: Vec::new(),
            main_resolution: None,
            raw_dir: None,
            transcode_dir: None,
            library_dir: None,
            advisory: Advisory::default(),
            warnings: Vec::new(),
        }
    }

    pub fn main_feature(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.main_feature)
    }
}
