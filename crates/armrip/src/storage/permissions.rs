//! Library permission normalisation: directories 775, files 664.

use std::path::Path;

use walkdir::WalkDir;

use crate::error::StorageError;

pub const DIR_MODE: u32 = 0o775;
pub const FILE_MODE: u32 = 0o664;

#[cfg(unix)]
pub fn set_permissions(root: &Path) -> Result<u64, StorageError> {
    use std::os::unix::fs::PermissionsExt;

    let mut changed = 0;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| StorageError::Walk {
            path: root.to_path_buf(),
            source: e,
        })?;
        let mode = if entry.file_type().is_dir() {
            DIR_MODE
        } else if entry.file_type().is_file() {
            FILE_MODE
        } else {
            continue;
        };
        std::fs::set_permissions(entry.path(), std::fs::Permissions::from_mode(mode)).map_err(
            |e| StorageError::Permissions {
                path: entry.path().to_path_buf(),
                source: e,
            },
        )?;
        changed += 1;
    }
    Ok(changed)
}

#[cfg(not(unix))]
pub fn set_permissions(_root: &Path) -> Result<u64, StorageError> {
    Ok(0)
}
