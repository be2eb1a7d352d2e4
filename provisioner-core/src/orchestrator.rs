//! Drives manifest jobs through fetch, extract and place.
//!
//! Jobs are independent by construction (the manifest rejects overlapping
//! destinations), so they run concurrently up to a configurable limit. A
//! job's failure never aborts its siblings: every job runs to a terminal
//! status and the caller gets one result per job. Cancellation is observed
//! at stage boundaries; a cancelled job abandons further work but still
//! releases its staging area through RAII.

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::StageError;
use crate::extractor;
use crate::fetcher::{self, FetchOptions};
use crate::manifest::{AssetJob, Manifest};
use crate::placer;
use crate::report::{JobResult, JobStatus, RunReport};
use crate::staging::StagingArea;

/// Default bound on simultaneously running jobs, keeping network and disk
/// load modest.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Knobs for a whole provisioning run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub concurrency: usize,
    pub fetch: FetchOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            fetch: FetchOptions::default(),
        }
    }
}

/// Runs every job in the manifest and reports per-job outcomes in manifest
/// order.
pub async fn run(
    manifest: &Manifest,
    options: &RunOptions,
    cancel: &CancellationToken,
) -> RunReport {
    let client = reqwest::Client::new();
    let concurrency = options.concurrency.max(1);

    info!(
        "Provisioning {} job(s), concurrency limit {}",
        manifest.len(),
        concurrency
    );

    let mut indexed: Vec<(usize, JobResult)> =
        stream::iter(manifest.jobs().iter().enumerate())
            .map(|(index, job)| {
                let client = client.clone();
                let cancel = cancel.clone();
                async move { (index, run_job(&client, job, options, &cancel).await) }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

    // buffer_unordered yields in completion order; the report reads better
    // in manifest order.
    indexed.sort_by_key(|(index, _)| *index);

    RunReport {
        results: indexed.into_iter().map(|(_, result)| result).collect(),
    }
}

enum StageOutcome {
    Completed,
    Cancelled,
}

async fn run_job(
    client: &reqwest::Client,
    job: &AssetJob,
    options: &RunOptions,
    cancel: &CancellationToken,
) -> JobResult {
    if cancel.is_cancelled() {
        debug!("Job '{}' cancelled before starting", job.name);
        return JobResult::cancelled(&job.name);
    }

    let staging = match StagingArea::new() {
        Ok(staging) => staging,
        Err(err) => {
            return JobResult {
                name: job.name.clone(),
                status: JobStatus::FetchFailed,
                error: Some(format!("failed to create staging area: {err}")),
            };
        }
    };

    let result = match run_stages(client, job, options, cancel, &staging).await {
        Ok(StageOutcome::Completed) => {
            info!("Job '{}' provisioned {}", job.name, job.destination.display());
            JobResult::success(&job.name)
        }
        Ok(StageOutcome::Cancelled) => {
            debug!("Job '{}' cancelled mid-pipeline", job.name);
            JobResult::cancelled(&job.name)
        }
        Err(err) => JobResult::failed(&job.name, &err),
    };

    // `staging` drops here: the downloaded archive and extracted tree are
    // removed on success, failure and cancellation alike.
    result
}

async fn run_stages(
    client: &reqwest::Client,
    job: &AssetJob,
    options: &RunOptions,
    cancel: &CancellationToken,
    staging: &StagingArea,
) -> Result<StageOutcome, StageError> {
    let archive = staging.download_path(&job.name);
    fetcher::fetch(
        client,
        &job.source_url,
        job.sha256.as_deref(),
        &archive,
        &options.fetch,
    )
    .await?;

    if cancel.is_cancelled() {
        return Ok(StageOutcome::Cancelled);
    }

    let extract_dir = staging.extract_dir();
    extractor::extract(&archive, job.archive_kind, &extract_dir)?;

    // The archive has served its purpose; drop it before placement so the
    // staging area never holds both copies longer than needed.
    let _ = tokio::fs::remove_file(&archive).await;

    if cancel.is_cancelled() {
        return Ok(StageOutcome::Cancelled);
    }

    placer::place(&extract_dir, job.inner_path.as_deref(), &job.destination)?;

    Ok(StageOutcome::Completed)
}
