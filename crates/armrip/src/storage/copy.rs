//! Verbatim tree copy, used for data discs.

use std::path::Path;

use walkdir::WalkDir;

use crate::error::StorageError;

/// Copies everything under `src` into `dst`, creating directories as needed.
/// Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64, StorageError> {
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| StorageError::Walk {
            path: src.to_path_buf(),
            source: e,
        })?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| StorageError::CreateDirectory {
                path: target.clone(),
                source: e,
            })?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target).map_err(|e| StorageError::CopyFile {
                from: entry.path().to_path_buf(),
                to: target.clone(),
                source: e,
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    #[test]
    fn test_copy_tree() {
        let src = TempDir::new().unwrap();
        src.child("photos/2019/a.jpg").write_str("a").unwrap();
        src.child("readme.txt").write_str("r").unwrap();
        src.child("empty").create_dir_all().unwrap();
        let dst = TempDir::new().unwrap();
        let target = dst.child("Backup");

        let copied = copy_tree(src.path(), target.path()).unwrap();

        assert_eq!(copied, 2);
        target.child("photos/2019/a.jpg").assert("a");
        target.child("readme.txt").assert("r");
        assert!(target.child("empty").path().is_dir());
        src.child("readme.txt").assert("r");
    }

    #[test]
    fn test_copy_missing_source() {
        let dst = TempDir::new().unwrap();
        let result = copy_tree(Path::new("/nonexistent/armrip/disc"), dst.path());
        assert!(matches!(result, Err(StorageError::Walk { .. })));
    }
}
