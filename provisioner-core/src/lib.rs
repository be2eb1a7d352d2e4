//! Asset Provisioner Core Library
//!
//! Fetches remote archives, extracts them into scoped staging directories
//! and places the selected contents at their destinations. The pipeline per
//! job is fetch → extract → place; each job owns its own staging area and
//! jobs run concurrently up to a configurable limit.
//!
//! - Manifest loading and validation ([`manifest`])
//! - Streaming downloads with retries ([`fetcher`])
//! - Safe archive extraction ([`extractor`])
//! - Atomic-where-possible placement ([`placer`])
//! - Job scheduling and result collection ([`orchestrator`])

pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod manifest;
pub mod orchestrator;
pub mod placer;
pub mod report;
pub mod staging;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use error::{ConfigError, ExtractError, FetchError, PlaceError, StageError};
pub use fetcher::FetchOptions;
pub use manifest::{ArchiveKind, AssetJob, Manifest};
pub use orchestrator::{run, RunOptions, DEFAULT_CONCURRENCY};
pub use report::{JobResult, JobStatus, RunReport};
pub use staging::StagingArea;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
