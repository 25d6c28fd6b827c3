//! Console verbosity policy for remote output.

use crate::error::{ConfigError, Result};

/// Substrings that mark a line of remote output as worth surfacing.
pub const ERROR_MARKERS: &[&str] = &["Error", "ERROR", "error", "failed", "invalid", "% "];

/// How much of the management node's console output is shown locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Progress messages, and only the error lines of remote output on
    /// stderr.
    #[default]
    Normal,
    /// Progress messages and the full remote output on the console.
    Verbose,
    /// Only the error lines of remote output, on stderr.
    Quiet,
}

impl Verbosity {
    /// Resolve the `--verbose`/`--quiet` pair.
    pub fn from_flags(verbose: bool, quiet: bool) -> Result<Self> {
        match (verbose, quiet) {
            (true, true) => Err(ConfigError::ConflictingFlags(
                "--verbose and --quiet cannot be used together".to_string(),
            )
            .into()),
            (true, false) => Ok(Verbosity::Verbose),
            (false, true) => Ok(Verbosity::Quiet),
            (false, false) => Ok(Verbosity::Normal),
        }
    }

    /// Lines of `output` to show on the console.
    pub fn console_lines(self, output: &str) -> Vec<&str> {
        match self {
            Verbosity::Verbose => output.lines().map(str::trim_end).collect(),
            Verbosity::Normal | Verbosity::Quiet => Vec::new(),
        }
    }

    /// Lines of `output` to report on the error stream.
    pub fn error_stream_lines(self, output: &str) -> Vec<&str> {
        match self {
            Verbosity::Verbose => Vec::new(),
            Verbosity::Normal | Verbosity::Quiet => error_lines(output),
        }
    }

    pub fn shows_progress(self) -> bool {
        self != Verbosity::Quiet
    }

    /// Default log filter for this verbosity.
    pub fn log_filter(self) -> &'static str {
        match self {
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::Quiet => "warn",
        }
    }
}

/// Lines of `output` containing any of [`ERROR_MARKERS`].
pub fn error_lines(output: &str) -> Vec<&str> {
    output
        .lines()
        .filter(|line| ERROR_MARKERS.iter().any(|marker| line.contains(marker)))
        .map(str::trim_end)
        .collect()
}
