//! Which extraction runs and which transcodes follow it.

use std::path::{Path, PathBuf};

use crate::config::{Config, RipMethod};
use crate::error::StorageError;
use crate::job::{Job, Track};
use crate::tools::transcode::{TitleSelection, TranscodeRequest};

use super::error::PipelineError;

/// How MakeMKV reads a video disc, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// One MKV per title (or just the main feature).
    Mkv,
    /// Decrypted folder backup of the whole disc.
    Backup,
}

/// True when the disc has to go through MakeMKV: copy protection, a backup
/// rip method, or the default MKV method.
pub fn rip_with_mkv(job: &Job, config: &Config) -> bool {
    job.protection || config.ripmethod.is_backup() || config.ripmethod == RipMethod::Mkv
}

/// `None` means the transcoder reads the device directly.
pub fn extraction_mode(job: &Job, config: &Config) -> Option<ExtractionMode> {
    if config.ripmethod.is_backup() {
        Some(ExtractionMode::Backup)
    } else if rip_with_mkv(job, config) || config.skip_transcode {
        // Without a transcode step MakeMKV is the only thing that produces files
        Some(ExtractionMode::Mkv)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranscodePlan {
    pub requests: Vec<TranscodeRequest>,
    /// Output stem that belongs to the main feature, when known.
    pub main_stem: Option<String>,
}

pub struct PlanInput<'a> {
    pub mode: Option<ExtractionMode>,
    pub raw_dir: &'a Path,
    pub devpath: &'a str,
    pub out_dir: &'a Path,
    pub name: &'a str,
    pub ext: &'a str,
    pub tracks: &'a [Track],
    pub mainfeature: bool,
}

pub fn plan_transcodes(input: &PlanInput<'_>) -> Result<TranscodePlan, PipelineError> {
    match input.mode {
        Some(ExtractionMode::Mkv) => plan_from_mkv_files(input),
        Some(ExtractionMode::Backup) => Ok(plan_from_titles(input, input.raw_dir.to_path_buf())),
        None => Ok(plan_from_titles(input, PathBuf::from(input.devpath))),
    }
}

/// Every MKV MakeMKV wrote is transcoded whole, keeping its stem.
fn plan_from_mkv_files(input: &PlanInput<'_>) -> Result<TranscodePlan, PipelineError> {
    let entries = std::fs::read_dir(input.raw_dir).map_err(|e| PipelineError::WorkDir {
        path: input.raw_dir.to_path_buf(),
        source: StorageError::ReadDirectory {
            path: input.raw_dir.to_path_buf(),
            source: e,
        },
    })?;

    let mut sources: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("mkv"))
        })
        .collect();
    sources.sort();

    if sources.is_empty() {
        return Err(PipelineError::NoOutput {
            path: input.raw_dir.to_path_buf(),
        });
    }

    let requests = sources
        .into_iter()
        .filter_map(|source| {
            let stem = source.file_stem()?.to_string_lossy().into_owned();
            Some(TranscodeRequest {
                output: input.out_dir.join(format!("{}.{}", stem, input.ext)),
                source,
                selection: TitleSelection::Whole,
            })
        })
        .collect();

    let main_stem = input
        .tracks
        .iter()
        .find(|t| t.main_feature)
        .and_then(|t| t.filename.as_deref())
        .and_then(|f| Path::new(f).file_stem())
        .map(|s| s.to_string_lossy().into_owned());

    Ok(TranscodePlan {
        requests,
        main_stem,
    })
}

/// Title-by-title from a backup folder or the device. MakeMKV numbers titles
/// from 0, HandBrake from 1.
fn plan_from_titles(input: &PlanInput<'_>, source: PathBuf) -> TranscodePlan {
    let processable: Vec<&Track> = input.tracks.iter().filter(|t| t.process).collect();

    if input.mainfeature || processable.is_empty() {
        return TranscodePlan {
            requests: vec![TranscodeRequest {
                source,
                output: input.out_dir.join(format!("{}.{}", input.name, input.ext)),
                selection: TitleSelection::MainFeature,
            }],
            main_stem: Some(input.name.to_string()),
        };
    }

    let stem = |track: &Track| format!("{}_t{:02}", input.name, track.track_number);
    let requests = processable
        .iter()
        .map(|track| TranscodeRequest {
            source: source.clone(),
            output: input.out_dir.join(format!("{}.{}", stem(track), input.ext)),
            selection: TitleSelection::Title(track.track_number + 1),
        })
        .collect();
    let main_stem = processable.iter().find(|t| t.main_feature).map(|t| stem(t));

    TranscodePlan {
        requests,
        main_stem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::track::SOURCE_MAKEMKV;
    use tempfile::TempDir;

    fn track(number: u32, main: bool, process: bool) -> Track {
        let mut track = Track::new(1, number, SOURCE_MAKEMKV);
        track.main_feature = main;
        track.process = process;
        track.filename = Some(format!("title_t{:02}.mkv", number));
        track
    }

    fn input<'a>(
        mode: Option<ExtractionMode>,
        raw_dir: &'a Path,
        tracks: &'a [Track],
        mainfeature: bool,
    ) -> PlanInput<'a> {
        PlanInput {
            mode,
            raw_dir,
            devpath: "/dev/sr0",
            out_dir: Path::new("/transcode/Alien (1979)"),
            name: "Alien (1979)",
            ext: "mkv",
            tracks,
            mainfeature,
        }
    }

    #[test]
    fn test_rip_with_mkv_forced_by_protection() {
        let config = Config {
            ripmethod: RipMethod::Direct,
            ..Config::default()
        };
        let mut job = Job::new("/dev/sr0");
        assert!(!rip_with_mkv(&job, &config));
        assert_eq!(extraction_mode(&job, &config), None);

        job.protection = true;
        assert!(rip_with_mkv(&job, &config));
        assert_eq!(extraction_mode(&job, &config), Some(ExtractionMode::Mkv));
    }

    #[test]
    fn test_extraction_mode_by_method() {
        let job = Job::new("/dev/sr0");
        let mode = |ripmethod| {
            extraction_mode(
                &job,
                &Config {
                    ripmethod,
                    ..Config::default()
                },
            )
        };
        assert_eq!(mode(RipMethod::Mkv), Some(ExtractionMode::Mkv));
        assert_eq!(mode(RipMethod::Backup), Some(ExtractionMode::Backup));
        assert_eq!(mode(RipMethod::BackupDvd), Some(ExtractionMode::Backup));
        assert_eq!(mode(RipMethod::Direct), None);
    }

    #[test]
    fn test_plan_from_mkv_files() {
        let raw = TempDir::new().unwrap();
        std::fs::write(raw.path().join("title_t01.mkv"), b"b").unwrap();
        std::fs::write(raw.path().join("title_t00.mkv"), b"a").unwrap();
        std::fs::write(raw.path().join("notes.txt"), b"x").unwrap();
        let tracks = vec![track(0, true, true), track(1, false, true)];

        let plan = plan_transcodes(&input(Some(ExtractionMode::Mkv), raw.path(), &tracks, false))
            .unwrap();
        assert_eq!(plan.requests.len(), 2);
        assert_eq!(plan.requests[0].source, raw.path().join("title_t00.mkv"));
        assert_eq!(
            plan.requests[0].output,
            PathBuf::from("/transcode/Alien (1979)/title_t00.mkv")
        );
        assert_eq!(plan.requests[0].selection, TitleSelection::Whole);
        assert_eq!(plan.main_stem.as_deref(), Some("title_t00"));
    }

    #[test]
    fn test_plan_from_empty_raw_dir_is_no_output() {
        let raw = TempDir::new().unwrap();
        let result = plan_transcodes(&input(Some(ExtractionMode::Mkv), raw.path(), &[], false));
        assert!(matches!(result, Err(PipelineError::NoOutput { .. })));
    }

    #[test]
    fn test_plan_direct_per_title() {
        let tracks = vec![track(0, false, false), track(2, true, true), track(3, false, true)];
        let plan =
            plan_transcodes(&input(None, Path::new("/raw/unused"), &tracks, false)).unwrap();

        assert_eq!(plan.requests.len(), 2);
        assert!(plan.requests.iter().all(|r| r.source == Path::new("/dev/sr0")));
        assert_eq!(plan.requests[0].selection, TitleSelection::Title(3));
        assert_eq!(
            plan.requests[0].output,
            PathBuf::from("/transcode/Alien (1979)/Alien (1979)_t02.mkv")
        );
        assert_eq!(plan.main_stem.as_deref(), Some("Alien (1979)_t02"));
    }

    #[test]
    fn test_plan_backup_main_feature() {
        let raw = Path::new("/raw/Alien (1979)");
        let tracks = vec![track(0, true, true)];
        let plan =
            plan_transcodes(&input(Some(ExtractionMode::Backup), raw, &tracks, true)).unwrap();

        assert_eq!(plan.requests.len(), 1);
        assert_eq!(plan.requests[0].source, raw);
        assert_eq!(plan.requests[0].selection, TitleSelection::MainFeature);
        assert_eq!(
            plan.requests[0].output,
            PathBuf::from("/transcode/Alien (1979)/Alien (1979).mkv")
        );
    }

    #[test]
    fn test_plan_without_tracks_falls_back_to_main_feature() {
        let plan = plan_transcodes(&input(None, Path::new("/raw"), &[], false)).unwrap();
        assert_eq!(plan.requests.len(), 1);
        assert_eq!(plan.requests[0].selection, TitleSelection::MainFeature);
    }
}
