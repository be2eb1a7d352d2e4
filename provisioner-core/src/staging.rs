//! Per-job staging areas.
//!
//! Every job owns exactly one staging area for the duration of its run: a
//! temporary directory holding the downloaded archive and the extracted
//! tree. Dropping the area deletes everything in it, so cleanup happens on
//! every exit path, including panics and cancellation.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

/// Directory name for the downloaded archive inside the staging area.
const DOWNLOAD_SUBDIR: &str = "download";

/// Directory name for extracted contents inside the staging area.
const EXTRACT_SUBDIR: &str = "staged";

/// A scoped temporary directory owned by a single job.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Creates a fresh staging area under the OS temp directory with the
    /// download and extraction subdirectories already in place.
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("provision-").tempdir()?;
        std::fs::create_dir_all(dir.path().join(DOWNLOAD_SUBDIR))?;
        std::fs::create_dir_all(dir.path().join(EXTRACT_SUBDIR))?;
        debug!("Created staging area at {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Root of the staging area.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the fetcher writes the downloaded archive.
    pub fn download_path(&self, job_name: &str) -> PathBuf {
        self.dir
            .path()
            .join(DOWNLOAD_SUBDIR)
            .join(format!("{job_name}.archive"))
    }

    /// Where the extractor unpacks the archive.
    pub fn extract_dir(&self) -> PathBuf {
        self.dir.path().join(EXTRACT_SUBDIR)
    }
}
