//! Moving finished files into the library.
//!
//! Existing destination files are never overwritten: `_2`, `_3`, ... are
//! appended instead. A destination directory is held by one job at a time
//! through a lock file created with `O_EXCL`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::copy::copy_tree;
use crate::error::StorageError;
use crate::sanitize::redact_path;

pub const LOCK_FILE_NAME: &str = ".armrip.lock";
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_CONFLICT_SUFFIX: u32 = 1000;

/// Exclusive hold on a destination directory. Released on drop.
#[derive(Debug)]
pub struct DestinationLock {
    path: PathBuf,
}

impl DestinationLock {
    /// Creates the lock file, polling while another job holds it.
    pub async fn acquire(dir: &Path, timeout: Duration) -> Result<Self, StorageError> {
        ensure_directory(dir)?;
        let path = dir.join(LOCK_FILE_NAME);
        let started = Instant::now();

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    // Holder pid, for operators clearing a stale lock.
                    if let Err(e) = writeln!(file, "{}", std::process::id()) {
                        warn!(dir = %redact_path(dir), error = %e, "Could not write pid to destination lock");
                    }
                    debug!(dir = %redact_path(dir), "Took destination lock");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if started.elapsed() >= timeout {
                        return Err(StorageError::LockTimeout {
                            path,
                            waited_secs: timeout.as_secs(),
                        });
                    }
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => return Err(StorageError::Lock { path, source: e }),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DestinationLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release destination lock");
        }
    }
}

/// Renames the main feature's file to the display title while relocating.
#[derive(Debug, Clone)]
pub struct MainFeatureRename {
    /// File stem produced for the main-feature track (e.g. `title_t00`).
    pub source_stem: String,
    /// New stem, already cleaned for the filesystem.
    pub target_stem: String,
}

#[derive(Debug, Default)]
pub struct RelocationReport {
    pub moved: Vec<PathBuf>,
    /// Entries left behind, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
    /// `(original file name, new file name)` of the main feature.
    pub renamed: Option<(String, String)>,
}

pub(crate) fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// `rename` first; copy and remove when the rename crosses filesystems.
pub fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

fn move_dir(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    copy_tree(src, dst)?;
    std::fs::remove_dir_all(src).map_err(|e| StorageError::Remove {
        path: src.to_path_buf(),
        source: e,
    })
}

/// First free name in `directory`: `name`, then `name_2`, `name_3`, ...
/// The suffix goes before the extension.
pub fn resolve_conflict(directory: &Path, filename: &str) -> Result<PathBuf, StorageError> {
    let path = directory.join(filename);
    if std::fs::symlink_metadata(&path).is_err() {
        return Ok(path);
    }

    let (base, ext) = match filename.rfind('.') {
        Some(dot) if dot > 0 => (&filename[..dot], Some(&filename[dot..])),
        _ => (filename, None),
    };

    for counter in 2..=MAX_CONFLICT_SUFFIX {
        let candidate = match ext {
            Some(ext) => format!("{}_{}{}", base, counter, ext),
            None => format!("{}_{}", base, counter),
        };
        let candidate = directory.join(candidate);
        if std::fs::symlink_metadata(&candidate).is_err() {
            return Ok(candidate);
        }
    }

    Err(StorageError::FileExists(path))
}

/// Moves every entry of `src_dir` into `dest_dir`. A failure on one entry is
/// logged and recorded; the others still move. `src_dir` is removed when it
/// ends up empty.
pub fn relocate_dir(
    src_dir: &Path,
    dest_dir: &Path,
    main_feature: Option<&MainFeatureRename>,
) -> Result<RelocationReport, StorageError> {
    ensure_directory(dest_dir)?;
    let entries = std::fs::read_dir(src_dir).map_err(|e| StorageError::ReadDirectory {
        path: src_dir.to_path_buf(),
        source: e,
    })?;

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name != LOCK_FILE_NAME)
        .collect();
    names.sort();

    let mut report = RelocationReport::default();
    for name in names {
        let src = src_dir.join(&name);
        let target_name = match main_feature {
            Some(rename) if report.renamed.is_none() && src.is_file() => {
                rename_for_main_feature(&name, rename).unwrap_or_else(|| name.clone())
            }
            _ => name.clone(),
        };

        let result = resolve_conflict(dest_dir, &target_name).and_then(|dst| {
            if src.is_dir() {
                move_dir(&src, &dst)?;
            } else {
                move_file(&src, &dst)?;
            }
            Ok(dst)
        });

        match result {
            Ok(dst) => {
                info!(file = %redact_path(&src), to = %redact_path(&dst), "Moved to library");
                if target_name != name {
                    let final_name = dst
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or(target_name);
                    report.renamed = Some((name, final_name));
                }
                report.moved.push(dst);
            }
            Err(e) => {
                warn!(file = %redact_path(&src), error = %e, "Skipping file that could not be moved");
                report.skipped.push((src, e.to_string()));
            }
        }
    }

    if std::fs::remove_dir(src_dir).is_err() {
        debug!(dir = %redact_path(src_dir), "Source directory not empty after relocation");
    }

    Ok(report)
}

fn rename_for_main_feature(name: &str, rename: &MainFeatureRename) -> Option<String> {
    let path = Path::new(name);
    let stem = path.file_stem()?.to_str()?;
    if stem != rename.source_stem || rename.target_stem.is_empty() {
        return None;
    }
    Some(match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", rename.target_stem, ext),
        None => rename.target_stem.clone(),
    })
}

/// Removes a working directory if it exists.
pub fn remove_dir_if_exists(path: &Path) -> Result<(), StorageError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            info!(dir = %redact_path(path), "Deleted working directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
