//! Placement of staged contents into their final destination.
//!
//! Selection happens first: either the whole extracted tree, or the single
//! entry matched by the job's inner path glob. Only once selection has
//! succeeded is the old destination removed, so a failed job never disturbs
//! what was provisioned before. The final move is a rename where staging and
//! destination share a filesystem; across filesystems it degrades to a
//! recursive copy plus delete, which widens the window in which a crash
//! leaves a partial destination (re-running the provisioner recovers).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::PlaceError;

/// Moves the selected staged content to `destination`, replacing whatever
/// was there.
pub fn place(
    staged_root: &Path,
    inner_path: Option<&str>,
    destination: &Path,
) -> Result<(), PlaceError> {
    let source = match inner_path {
        Some(pattern) => select_single_match(staged_root, pattern)?,
        None => staged_root.to_path_buf(),
    };

    info!(
        "Placing {} at {}",
        source.display(),
        destination.display()
    );

    replace_destination(destination)?;

    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    match fs::rename(&source, destination) {
        Ok(()) => {
            debug!("Renamed staged content into place");
            Ok(())
        }
        Err(err) if is_cross_device(&err) => {
            warn!(
                "Staging and destination are on different filesystems; \
                 falling back to copy (placement is not atomic on this path)"
            );
            copy_recursive(&source, destination)?;
            remove_path(&source)?;
            Ok(())
        }
        Err(err) => Err(PlaceError::Io(err)),
    }
}

/// Resolves the inner path glob to exactly one staged entry.
fn select_single_match(staged_root: &Path, pattern: &str) -> Result<PathBuf, PlaceError> {
    let full_pattern = staged_root.join(pattern);
    let entries = glob::glob(&full_pattern.to_string_lossy()).map_err(|source| {
        PlaceError::BadPattern {
            pattern: pattern.to_string(),
            source,
        }
    })?;

    let mut matches = Vec::new();
    for entry in entries {
        matches.push(entry.map_err(|e| PlaceError::Io(e.into_error()))?);
    }

    match matches.len() {
        0 => Err(PlaceError::NoMatch {
            pattern: pattern.to_string(),
        }),
        1 => Ok(matches.remove(0)),
        count => Err(PlaceError::Ambiguous {
            pattern: pattern.to_string(),
            count,
        }),
    }
}

/// Removes whatever currently exists at the destination path.
fn replace_destination(destination: &Path) -> Result<(), PlaceError> {
    match fs::symlink_metadata(destination) {
        Ok(meta) => {
            debug!("Removing previous contents at {}", destination.display());
            if meta.is_dir() {
                fs::remove_dir_all(destination)?;
            } else {
                fs::remove_file(destination)?;
            }
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(PlaceError::Io(err)),
    }
}

fn remove_path(path: &Path) -> Result<(), PlaceError> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

fn is_cross_device(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(18) // EXDEV
    }
    #[cfg(windows)]
    {
        err.raw_os_error() == Some(17) // ERROR_NOT_SAME_DEVICE
    }
    #[cfg(not(any(unix, windows)))]
    {
        false
    }
}

/// Copies a file or directory tree. `fs::copy` carries permissions with it.
fn copy_recursive(source: &Path, dest: &Path) -> Result<(), io::Error> {
    if source.is_dir() {
        fs::create_dir_all(dest)?;
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &dest.join(entry.file_name()))?;
        }
    } else {
        fs::copy(source, dest)?;
    }
    Ok(())
}
