//! Manifest loading and validation.
//!
//! A manifest is an ordered list of asset jobs, read once at startup from a
//! JSON file (or built in, when no file is given) and immutable for the rest
//! of the run. All structural problems are rejected here so that no job ever
//! starts against a malformed configuration.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::ConfigError;

// =============================================================================
// Archive kinds
// =============================================================================

/// Supported archive formats for downloaded assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveKind {
    /// ZIP archive (.zip)
    Zip,
    /// Gzip-compressed tar archive (.tar.gz, .tgz)
    TarGz,
    /// XZ-compressed tar archive (.tar.xz)
    TarXz,
}

impl ArchiveKind {
    /// Infers the archive kind from a URL or filename, if recognizable.
    pub fn from_url(url: &str) -> Option<Self> {
        let lower = url.to_lowercase();
        if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tar.xz") {
            Some(Self::TarXz)
        } else {
            None
        }
    }
}

// =============================================================================
// Asset jobs
// =============================================================================

/// A single provisioning job: one remote archive, one destination directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetJob {
    /// Unique name, used in the run report.
    pub name: String,
    /// URL of the remote archive (http or https).
    pub source_url: String,
    /// Archive format of the remote resource.
    pub archive_kind: ArchiveKind,
    /// Directory that receives the placed contents. Replaced on success.
    pub destination: PathBuf,
    /// Optional glob selecting exactly one staged entry to place
    /// (e.g. `*/svg`). When absent, the whole extracted tree is placed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_path: Option<String>,
    /// Optional SHA-256 checksum (hex) the download must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

// =============================================================================
// Manifest
// =============================================================================

/// Validated, ordered list of asset jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    jobs: Vec<AssetJob>,
}

impl Manifest {
    /// Loads and validates a manifest from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let jobs: Vec<AssetJob> =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        debug!("Loaded {} job(s) from {}", jobs.len(), path.display());
        Self::from_jobs(jobs)
    }

    /// Builds a manifest from in-memory jobs, running full validation.
    pub fn from_jobs(jobs: Vec<AssetJob>) -> Result<Self, ConfigError> {
        validate(&jobs)?;
        Ok(Self { jobs })
    }

    /// The built-in default manifest: web fonts plus an icon sprite set,
    /// placed into `fonts/` and `sprites/` under the current directory.
    pub fn builtin() -> Self {
        // Validated by test, not revalidated at runtime: the jobs are static.
        Self {
            jobs: vec![
                AssetJob {
                    name: "fonts".to_string(),
                    source_url:
                        "https://github.com/googlefonts/roboto/releases/download/v2.138/roboto-unhinted.zip"
                            .to_string(),
                    archive_kind: ArchiveKind::Zip,
                    destination: PathBuf::from("fonts"),
                    inner_path: None,
                    sha256: None,
                },
                AssetJob {
                    name: "sprites".to_string(),
                    source_url:
                        "https://github.com/Templarian/MaterialDesign/archive/refs/tags/v7.4.47.tar.gz"
                            .to_string(),
                    archive_kind: ArchiveKind::TarGz,
                    destination: PathBuf::from("sprites"),
                    inner_path: Some("*/svg".to_string()),
                    sha256: None,
                },
            ],
        }
    }

    /// The jobs in manifest order.
    pub fn jobs(&self) -> &[AssetJob] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate(jobs: &[AssetJob]) -> Result<(), ConfigError> {
    if jobs.is_empty() {
        return Err(ConfigError::Empty);
    }

    for (index, job) in jobs.iter().enumerate() {
        if job.name.trim().is_empty() {
            return Err(ConfigError::EmptyField {
                index,
                field: "name",
            });
        }
        if job.source_url.trim().is_empty() {
            return Err(ConfigError::EmptyField {
                index,
                field: "source_url",
            });
        }

        validate_url(&job.name, &job.source_url)?;
        validate_destination(&job.name, &job.destination)?;

        if let Some(sha) = &job.sha256 {
            if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::InvalidChecksum {
                    name: job.name.clone(),
                });
            }
        }

        if let Some(pattern) = &job.inner_path {
            if pattern.trim().is_empty() {
                return Err(ConfigError::EmptyField {
                    index,
                    field: "inner_path",
                });
            }
        }
    }

    for (i, a) in jobs.iter().enumerate() {
        for b in &jobs[i + 1..] {
            if a.name == b.name {
                return Err(ConfigError::DuplicateName {
                    name: a.name.clone(),
                });
            }
            // Two jobs writing into the same subtree is a config error, not
            // a runtime race (Path::starts_with compares whole components).
            if a.destination.starts_with(&b.destination)
                || b.destination.starts_with(&a.destination)
            {
                return Err(ConfigError::OverlappingDestinations {
                    first: a.name.clone(),
                    second: b.name.clone(),
                });
            }
        }
    }

    Ok(())
}

fn validate_url(name: &str, source_url: &str) -> Result<(), ConfigError> {
    let url = Url::parse(source_url).map_err(|e| ConfigError::InvalidUrl {
        name: name.to_string(),
        url: source_url.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl {
            name: name.to_string(),
            url: source_url.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            name: name.to_string(),
            url: source_url.to_string(),
            reason: "URL has no host".to_string(),
        });
    }

    Ok(())
}

fn validate_destination(name: &str, destination: &Path) -> Result<(), ConfigError> {
    if destination.as_os_str().is_empty() {
        return Err(ConfigError::InvalidDestination {
            name: name.to_string(),
            reason: "must not be empty".to_string(),
        });
    }

    let is_root = destination
        .components()
        .all(|c| matches!(c, Component::RootDir | Component::Prefix(_)));
    if is_root {
        return Err(ConfigError::InvalidDestination {
            name: name.to_string(),
            reason: "must not be the filesystem root".to_string(),
        });
    }

    Ok(())
}
