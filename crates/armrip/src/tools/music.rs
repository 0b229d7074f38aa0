//! Audio CD tools: `abcde` for ripping, `cd-discid` for the table of contents.

use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::tools::ToolCommand;

pub const ABCDE: &str = "abcde";
pub const CD_DISCID: &str = "cd-discid";

/// Upper bound for a full CD rip.
const ABCDE_TIMEOUT: Duration = Duration::from_secs(3600);

/// `abcde -d <devpath> -o flac -N`
pub fn abcde_command(devpath: &str) -> ToolCommand {
    ToolCommand::new(ABCDE)
        .args(["-d", devpath, "-o", "flac", "-N"])
        .timeout(ABCDE_TIMEOUT)
}

/// `cd-discid --musicbrainz <devpath>`
pub fn discid_command(devpath: &str) -> ToolCommand {
    ToolCommand::new(CD_DISCID).args(["--musicbrainz", devpath])
}

/// Disc table of contents: track start offsets and the lead-out, in sectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscToc {
    pub offsets: Vec<u32>,
    pub leadout: u32,
}

impl DiscToc {
    /// Parses `cd-discid --musicbrainz` output: `<ntracks> <offset>... <leadout>`.
    pub fn parse(output: &str) -> Option<Self> {
        let numbers: Vec<u32> = output
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .ok()?;
        let (count, rest) = numbers.split_first()?;
        let count = *count as usize;
        if count == 0 || rest.len() != count + 1 {
            return None;
        }
        Some(Self {
            offsets: rest[..count].to_vec(),
            leadout: rest[count],
        })
    }

    pub fn track_count(&self) -> usize {
        self.offsets.len()
    }

    /// The `toc` query value for a MusicBrainz fuzzy lookup:
    /// `1+<last>+<leadout>+<offset>...`.
    pub fn to_query(&self) -> String {
        let mut parts = vec![
            "1".to_string(),
            self.track_count().to_string(),
            self.leadout.to_string(),
        ];
        parts.extend(self.offsets.iter().map(u32::to_string));
        parts.join("+")
    }

    /// Stable fingerprint stored as `crc_id`.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_query().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Length of each track in seconds (75 sectors per second).
    pub fn track_lengths(&self) -> Vec<u64> {
        let mut bounds = self.offsets.clone();
        bounds.push(self.leadout);
        bounds
            .windows(2)
            .map(|w| u64::from(w[1].saturating_sub(w[0])) / 75)
            .collect()
    }
}
