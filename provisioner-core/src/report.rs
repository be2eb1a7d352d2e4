//! Per-job results and the aggregate run report.

use std::fmt;

use crate::error::StageError;

/// Terminal status of a job. Jobs never leave a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    FetchFailed,
    ExtractFailed,
    PlaceFailed,
    /// The job observed a cancellation signal at a stage boundary and
    /// abandoned further work.
    Cancelled,
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "ok",
            Self::FetchFailed => "fetch failed",
            Self::ExtractFailed => "extract failed",
            Self::PlaceFailed => "place failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<&StageError> for JobStatus {
    fn from(err: &StageError) -> Self {
        match err {
            StageError::Fetch(_) => Self::FetchFailed,
            StageError::Extract(_) => Self::ExtractFailed,
            StageError::Place(_) => Self::PlaceFailed,
        }
    }
}

/// Outcome of a single job. Created once, never mutated.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub name: String,
    pub status: JobStatus,
    pub error: Option<String>,
}

impl JobResult {
    pub fn success(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: JobStatus::Success,
            error: None,
        }
    }

    pub fn cancelled(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: JobStatus::Cancelled,
            error: None,
        }
    }

    pub fn failed(name: &str, err: &StageError) -> Self {
        Self {
            name: name.to_string(),
            status: JobStatus::from(err),
            error: Some(err.to_string()),
        }
    }
}

/// All job results for one run, in manifest order.
#[derive(Debug)]
pub struct RunReport {
    pub results: Vec<JobResult>,
}

impl RunReport {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.status.is_success())
    }

    /// Process exit code: 0 when every job succeeded, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.all_succeeded() {
            0
        } else {
            1
        }
    }

    pub fn failed_jobs(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|r| !r.status.is_success())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            match &result.error {
                Some(error) => writeln!(f, "  {:<20} {} ({error})", result.name, result.status.label())?,
                None => writeln!(f, "  {:<20} {}", result.name, result.status.label())?,
            }
        }

        let failed = self.failed_jobs().count();
        if failed == 0 {
            write!(f, "{} job(s) provisioned", self.results.len())
        } else {
            write!(
                f,
                "{failed} of {} job(s) did not complete",
                self.results.len()
            )
        }
    }
}
