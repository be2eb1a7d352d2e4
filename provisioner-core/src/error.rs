//! Error types for the provisioning pipeline.
//!
//! Each stage has its own error enum so the orchestrator can map a failure
//! to the right terminal job status. `ConfigError` is the only error that is
//! fatal for the whole run; stage errors are recorded per job.

use std::path::PathBuf;

use thiserror::Error;

// =============================================================================
// Manifest / configuration errors (fatal, abort before any job starts)
// =============================================================================

/// Errors detected while loading or validating a manifest.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("manifest contains no jobs")]
    Empty,

    #[error("job #{index}: {field} must not be empty")]
    EmptyField { index: usize, field: &'static str },

    #[error("duplicate job name: {name}")]
    DuplicateName { name: String },

    #[error("job '{name}': invalid source URL '{url}': {reason}")]
    InvalidUrl {
        name: String,
        url: String,
        reason: String,
    },

    #[error("job '{name}': destination {reason}")]
    InvalidDestination { name: String, reason: String },

    #[error("jobs '{first}' and '{second}' declare overlapping destinations")]
    OverlappingDestinations { first: String, second: String },

    #[error("job '{name}': sha256 must be 64 hexadecimal characters")]
    InvalidChecksum { name: String },
}

// =============================================================================
// Fetch stage
// =============================================================================

/// Errors from the download stage.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server returned {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("empty response body from {url}")]
    EmptyBody { url: String },

    #[error("sha256 mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("i/o error while downloading {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Whether retrying could plausibly succeed.
    ///
    /// Connection and timeout failures are transient, as are 5xx and 429
    /// responses. Client errors (404 and friends), malformed requests, local
    /// i/o failures and checksum mismatches are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { source, .. } => !source.is_builder(),
            Self::Status { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            Self::EmptyBody { .. } | Self::ChecksumMismatch { .. } | Self::Io { .. } => false,
        }
    }
}

// =============================================================================
// Extract stage
// =============================================================================

/// Errors from the extraction stage. Never retried: a corrupt or malicious
/// archive will not improve on a second attempt.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// An entry path is absolute, contains `..`, or would otherwise resolve
    /// outside the staging directory. Archives come from third-party sources
    /// and a single unsafe entry poisons the whole archive.
    #[error("unsafe entry path in archive: {entry}")]
    UnsafePath { entry: String },

    #[error("invalid or corrupt zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("i/o error during extraction: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Place stage
// =============================================================================

/// Errors from the placement stage. The destination is only touched once
/// selection has succeeded, so `NoMatch`/`Ambiguous` leave it as it was.
#[derive(Debug, Error)]
pub enum PlaceError {
    #[error("inner path pattern '{pattern}' matched nothing in the staged contents")]
    NoMatch { pattern: String },

    #[error("inner path pattern '{pattern}' matched {count} entries, expected exactly one")]
    Ambiguous { pattern: String, count: usize },

    #[error("invalid inner path pattern '{pattern}': {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("i/o error during placement: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Stage error union
// =============================================================================

/// A failure in any pipeline stage, tagged by stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Place(#[from] PlaceError),
}
