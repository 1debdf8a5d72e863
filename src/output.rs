//! Output formatting for parse runs.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::cli::VerbosityLevel;
use crate::error::{ParseError, PoolError};
use crate::pool::PoolStats;

/// Outcome of parsing one file.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    WellFormed,
    Malformed,
    ReadError,
}

/// Per-file entry of the run report.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub status: FileStatus,
    pub detail: Option<String>,
    pub duration_ms: u64,
}

impl FileReport {
    pub fn from_result(
        path: PathBuf,
        result: &Result<(), PoolError>,
        duration: Duration,
    ) -> Self {
        let (status, detail) = match result {
            Ok(()) => (FileStatus::WellFormed, None),
            Err(PoolError::Parse(ParseError::Syntax { .. })) => (
                FileStatus::Malformed,
                result.as_ref().err().map(|e| e.to_string()),
            ),
            Err(err) => (FileStatus::ReadError, Some(err.to_string())),
        };
        Self {
            path,
            status,
            detail,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// Aggregate report for a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scanned: usize,
    pub well_formed: usize,
    pub malformed: usize,
    pub read_errors: usize,
    pub duration_ms: u64,
    pub pool: PoolStats,
    pub files: Vec<FileReport>,
}

impl RunReport {
    pub fn new(files: Vec<FileReport>, duration: Duration, pool: PoolStats) -> Self {
        let well_formed = files
            .iter()
            .filter(|f| f.status == FileStatus::WellFormed)
            .count();
        let malformed = files
            .iter()
            .filter(|f| f.status == FileStatus::Malformed)
            .count();
        let read_errors = files
            .iter()
            .filter(|f| f.status == FileStatus::ReadError)
            .count();
        Self {
            scanned: files.len(),
            well_formed,
            malformed,
            read_errors,
            duration_ms: duration.as_millis() as u64,
            pool,
            files,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.malformed > 0 || self.read_errors > 0
    }
}

/// Human-readable output formatter
pub struct Output {
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    #[cfg(test)]
    fn plain(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: false,
        }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{color}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    pub fn format_file(&self, report: &FileReport) -> String {
        let path = report.path.display();
        match report.status {
            FileStatus::WellFormed => {
                format!(
                    "{}  {} ({}ms)",
                    self.colorize("✓ OK", "32"),
                    path,
                    report.duration_ms
                )
            }
            FileStatus::Malformed => format!(
                "{}  {} - {}",
                self.colorize("✗ MALFORMED", "31"),
                path,
                report.detail.as_deref().unwrap_or("malformed content")
            ),
            FileStatus::ReadError => format!(
                "{}  {} - {}",
                self.colorize("⚠ ERROR", "33"),
                path,
                report.detail.as_deref().unwrap_or("unreadable")
            ),
        }
    }

    pub fn format_summary(&self, report: &RunReport) -> String {
        format!(
            "{} files scanned in {}ms: {} well-formed, {} malformed, {} unreadable (pool: {} created, {} reused)",
            report.scanned,
            report.duration_ms,
            report.well_formed,
            report.malformed,
            report.read_errors,
            report.pool.created,
            report.pool.reused,
        )
    }

    pub fn format_report(&self, report: &RunReport) -> String {
        let mut out = String::new();
        match self.verbosity {
            VerbosityLevel::Quiet => {
                for file in &report.files {
                    if file.status != FileStatus::WellFormed {
                        out.push_str(&self.format_file(file));
                        out.push('\n');
                    }
                }
            }
            VerbosityLevel::Normal => {
                for file in &report.files {
                    if file.status != FileStatus::WellFormed {
                        out.push_str(&self.format_file(file));
                        out.push('\n');
                    }
                }
                out.push_str(&self.format_summary(report));
                out.push('\n');
            }
            VerbosityLevel::Verbose => {
                for file in &report.files {
                    out.push_str(&self.format_file(file));
                    out.push('\n');
                }
                out.push_str(&self.format_summary(report));
                out.push('\n');
            }
        }
        out
    }
}
