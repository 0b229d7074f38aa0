//! Locating or creating the mountpoint for a disc device.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::MountError;
use crate::tools::{ToolCommand, ToolInvoker};

pub const PROC_MOUNTS: &str = "/proc/mounts";
pub const DEFAULT_MOUNT_ROOT: &str = "/mnt";

#[derive(Clone)]
pub struct Mounter {
    invoker: ToolInvoker,
    mount_table: PathBuf,
    mount_root: PathBuf,
}

impl Mounter {
    pub fn new(invoker: ToolInvoker) -> Self {
        Self {
            invoker,
            mount_table: PathBuf::from(PROC_MOUNTS),
            mount_root: PathBuf::from(DEFAULT_MOUNT_ROOT),
        }
    }

    pub fn with_mount_table(mut self, path: impl Into<PathBuf>) -> Self {
        self.mount_table = path.into();
        self
    }

    pub fn with_mount_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.mount_root = path.into();
        self
    }

    /// Returns the current mountpoint of `devpath`, if any.
    pub fn find_mount(&self, devpath: &str) -> Result<Option<PathBuf>, MountError> {
        let table = std::fs::read_to_string(&self.mount_table).map_err(|e| {
            MountError::ReadMountTable {
                path: self.mount_table.clone(),
                source: e,
            }
        })?;

        let canonical = std::fs::canonicalize(devpath)
            .ok()
            .map(|p| p.to_string_lossy().into_owned());

        Ok(parse_mount_table(&table)
            .into_iter()
            .find(|(device, _)| {
                device == devpath || canonical.as_deref().is_some_and(|c| c == device)
            })
            .map(|(_, mountpoint)| mountpoint))
    }

    /// `/dev/sr0` mounts at `<root>/dev/sr0`.
    pub fn mountpoint_for(&self, devpath: &str) -> PathBuf {
        self.mount_root.join(devpath.trim_start_matches('/'))
    }

    /// Reuses an existing mount or mounts the device read-only.
    pub async fn ensure_mounted(&self, devpath: &str) -> Result<PathBuf, MountError> {
        if let Some(existing) = self.find_mount(devpath)? {
            debug!(devpath, mountpoint = %existing.display(), "Disc already mounted");
            return Ok(existing);
        }

        let mountpoint = self.mountpoint_for(devpath);
        std::fs::create_dir_all(&mountpoint).map_err(|e| MountError::CreateMountpoint {
            path: mountpoint.clone(),
            source: e,
        })?;

        let command = mount_command(devpath, &mountpoint);
        self.invoker
            .run_strict(&command)
            .await
            .map_err(|e| MountError::Mount {
                devpath: devpath.to_string(),
                source: e,
            })?;

        info!(devpath, mountpoint = %mountpoint.display(), "Mounted disc");
        Ok(mountpoint)
    }
}

pub fn mount_command(devpath: &str, mountpoint: &Path) -> ToolCommand {
    ToolCommand::new("mount")
        .args(["-o", "ro", devpath])
        .arg(mountpoint.to_string_lossy())
}

/// Parses `/proc/mounts` into `(device, mountpoint)` pairs.
pub fn parse_mount_table(table: &str) -> Vec<(String, PathBuf)> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mountpoint = fields.next()?;
            Some((unescape(device), PathBuf::from(unescape(mountpoint))))
        })
        .collect()
}

/// The kernel writes space, tab, newline and backslash as three-digit octal.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = std::str::from_utf8(&bytes[i + 1..i + 4]).ok();
            if let Some(value) = digits.and_then(|d| u8::from_str_radix(d, 8).ok()) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
