//! Per-run remote and local directories.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::transfer::remote_join;

/// Format of the run timestamp that names the run directories.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Where one orchestration run stages and collects its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub timestamp: String,
    /// `<remote-base>/<timestamp>`.
    pub remote_dir: String,
    /// `<remote-base>/<timestamp>/logs`.
    pub remote_logs: String,
    /// `<local-dir>/logs/<timestamp>`.
    pub local_logs: PathBuf,
}

impl RunContext {
    /// Context stamped with the current local time.
    pub fn now(remote_base: &str, local_dir: &Path) -> Self {
        Self::at(remote_base, local_dir, Local::now())
    }

    pub fn at(remote_base: &str, local_dir: &Path, time: DateTime<Local>) -> Self {
        let timestamp = time.format(TIMESTAMP_FORMAT).to_string();
        let remote_dir = remote_join(&normalize_remote_base(remote_base), &timestamp);
        let remote_logs = remote_join(&remote_dir, "logs");
        let local_logs = local_dir.join("logs").join(&timestamp);
        Self {
            timestamp,
            remote_dir,
            remote_logs,
            local_logs,
        }
    }

    /// Path of `name` inside the remote run directory.
    pub fn remote_path(&self, name: &str) -> String {
        remote_join(&self.remote_dir, name)
    }
}

/// Make a `~`-based remote directory relative to the login's home.
///
/// SFTP does not expand `~`, while both SFTP and the sub-shell resolve
/// relative paths against the home directory.
pub fn normalize_remote_base(base: &str) -> String {
    let base = base.trim();
    let stripped = if base == "~" {
        "."
    } else if let Some(rest) = base.strip_prefix("~/") {
        rest
    } else {
        base
    };
    match stripped.trim_end_matches('/') {
        "" if stripped.starts_with('/') => "/".to_string(),
        "" => ".".to_string(),
        other => other.to_string(),
    }
}
