//! Duplicate-run guard. Best effort: a process-table scan, not a lock.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ArmError;

const PROGRAM_NAME: &str = "armrip";

pub struct ProcessGuard {
    proc_root: PathBuf,
    own_pid: u32,
}

impl ProcessGuard {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            own_pid: std::process::id(),
        }
    }

    /// Scan a different process table; fixtures use a temp directory.
    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    pub fn with_own_pid(mut self, pid: u32) -> Self {
        self.own_pid = pid;
        self
    }

    /// Pid of another `armrip` process whose arguments name `devpath`.
    pub fn find_duplicate(&self, devpath: &str) -> Option<u32> {
        let entries = std::fs::read_dir(&self.proc_root).ok()?;
        let mut pids: Vec<u32> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str()?.parse().ok())
            .filter(|pid| *pid != self.own_pid)
            .collect();
        pids.sort_unstable();

        pids.into_iter().find(|pid| {
            std::fs::read(self.proc_root.join(pid.to_string()).join("cmdline"))
                .map(|raw| is_armrip_for(&raw, devpath))
                .unwrap_or(false)
        })
    }

    pub fn check(&self, devpath: &str) -> Result<(), ArmError> {
        match self.find_duplicate(devpath) {
            Some(pid) => Err(ArmError::DuplicateRun {
                devpath: devpath.to_string(),
                pid,
            }),
            None => {
                debug!(devpath, "No other armrip process for this device");
                Ok(())
            }
        }
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// `cmdline` is NUL-separated; the first argument is the program.
fn is_armrip_for(cmdline: &[u8], devpath: &str) -> bool {
    let text = String::from_utf8_lossy(cmdline);
    let mut args = text.split('\0').filter(|a| !a.is_empty());
    let Some(program) = args.next() else {
        return false;
    };
    let is_armrip = Path::new(program)
        .file_name()
        .is_some_and(|name| name == PROGRAM_NAME);
    is_armrip && args.any(|arg| arg == devpath)
}
