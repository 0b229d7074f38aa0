use serde::{Deserialize, Serialize};

pub const SOURCE_MAKEMKV: &str = "makemkv";
pub const SOURCE_MUSICBRAINZ: &str = "music_brainz";

/// One title or audio track belonging to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: i64,
    pub job_id: i64,
    pub track_number: u32,
    /// Length in seconds.
    pub length: u64,
    pub aspect_ratio: String,
    pub fps: f64,
    pub main_feature: bool,
    pub basename: Option<String>,
    pub filename: Option<String>,
    pub new_filename: Option<String>,
    pub orig_filename: Option<String>,
    pub ripped: bool,
    /// False when the title falls outside the configured length window.
    pub process: bool,
    pub source: String,
}

impl Track {
    pub fn new(job_id: i64, track_number: u32, source: &str) -> Self {
        Self {
            track_id: 0,
            job_id,
            track_number,
            length: 0,
            aspect_ratio: String::new(),
            fps: 0.0,
            main_feature: false,
            basename: None,
            filename: None,
            new_filename: None,
            orig_filename: None,
            ripped: false,
            process: true,
            source: source.to_string(),
        }
    }

    /// Records a rename performed during relocation.
    pub fn record_rename(&mut self, original: &str, renamed: &str) {
        self.orig_filename = Some(original.to_string());
        self.new_filename = Some(renamed.to_string());
        self.filename = Some(renamed.to_string());
    }
}

/// Flags the longest track as the main feature and marks tracks outside
/// `[min_length, max_length]` as not to be processed.
pub fn classify_tracks(tracks: &mut [Track], min_length: u64, max_length: u64) {
    let longest = tracks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.length > 0)
        .max_by_key(|(i, t)| (t.length, std::cmp::Reverse(*i)))
        .map(|(i, _)| i);

    for (i, track) in tracks.iter_mut().enumerate() {
        track.main_feature = Some(i) == longest;
        track.process = track.length >= min_length && track.length <= max_length;
    }
}
