//! Archive extraction into a staging directory.
//!
//! Supports zip, tar.gz and tar.xz. Archives come from third-party sources,
//! so entry paths are never trusted: any entry that is absolute or contains
//! a parent-directory component fails the whole extraction. Symlink and
//! hardlink entries are skipped. Executable bits are preserved on Unix;
//! timestamps are not.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path};

use tracing::{debug, info, warn};

use crate::error::ExtractError;
use crate::manifest::ArchiveKind;

/// Extracts an archive into `dest_dir`.
///
/// Zip integrity is validated up front via the central directory; tar
/// corruption surfaces as an i/o error while reading entries. On any error
/// the staging directory may hold a partial tree; the caller owns the
/// staging area and discards it wholesale.
pub fn extract(
    archive_path: &Path,
    kind: ArchiveKind,
    dest_dir: &Path,
) -> Result<(), ExtractError> {
    info!(
        "Extracting {:?} archive {} to {}",
        kind,
        archive_path.display(),
        dest_dir.display()
    );

    fs::create_dir_all(dest_dir)?;

    match kind {
        ArchiveKind::Zip => extract_zip(archive_path, dest_dir),
        ArchiveKind::TarGz => extract_tar_gz(archive_path, dest_dir),
        ArchiveKind::TarXz => extract_tar_xz(archive_path, dest_dir),
    }
}

// =============================================================================
// ZIP
// =============================================================================

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive_path)?;

    // Reads and validates the central directory before any entry is written.
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => path.to_owned(),
            None => {
                return Err(ExtractError::UnsafePath {
                    entry: entry.name().to_string(),
                });
            }
        };

        let dest_path = dest_dir.join(&entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut outfile = File::create(&dest_path)?;
            io::copy(&mut entry, &mut outfile)?;

            #[cfg(unix)]
            set_unix_permissions(&dest_path, entry.unix_mode())?;
        }
    }

    debug!("ZIP extraction complete");
    Ok(())
}

// =============================================================================
// TAR (gz / xz)
// =============================================================================

fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive_path)?;
    let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    extract_tar(decoder, dest_dir)
}

fn extract_tar_xz(archive_path: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive_path)?;
    let decoder = xz2::read::XzDecoder::new(BufReader::new(file));
    extract_tar(decoder, dest_dir)
}

fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<(), ExtractError> {
    let mut archive = tar::Archive::new(reader);

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_type = entry.header().entry_type();

        // Symlinks and hardlinks could point anywhere on the host; assets
        // never need them.
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            warn!("Skipping symlink/hardlink entry in tar archive");
            continue;
        }

        let path = entry.path()?;
        if path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ExtractError::UnsafePath {
                entry: path.display().to_string(),
            });
        }

        let dest_path = dest_dir.join(&path);

        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry_type.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut outfile = File::create(&dest_path)?;
            io::copy(&mut entry, &mut outfile)?;
            outfile.flush()?;

            #[cfg(unix)]
            {
                if let Ok(mode) = entry.header().mode() {
                    set_unix_permissions(&dest_path, Some(mode))?;
                }
            }
        }
    }

    debug!("TAR extraction complete");
    Ok(())
}

// =============================================================================
// Unix permissions
// =============================================================================

#[cfg(unix)]
fn set_unix_permissions(path: &Path, mode: Option<u32>) -> Result<(), ExtractError> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = mode {
        if mode & 0o111 != 0 {
            fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o755))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_tar_gz(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(name).unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
        builder.finish().unwrap();
    }

    #[test]
    fn test_extract_zip_simple() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("test.zip");
        let out = temp.path().join("out");

        write_zip(
            &archive,
            &[
                ("hello.txt", b"Hello, World!"),
                ("subdir/nested.txt", b"Nested content"),
            ],
        );

        extract(&archive, ArchiveKind::Zip, &out).unwrap();

        assert!(out.join("hello.txt").exists());
        assert!(out.join("subdir/nested.txt").exists());
        assert_eq!(
            fs::read_to_string(out.join("hello.txt")).unwrap(),
            "Hello, World!"
        );
    }

    #[test]
    fn test_extract_tar_gz_simple() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("test.tar.gz");
        let out = temp.path().join("out");

        write_tar_gz(&archive, &[("fonts/regular.woff2", b"font bytes")]);

        extract(&archive, ArchiveKind::TarGz, &out).unwrap();
        assert_eq!(
            fs::read(out.join("fonts/regular.woff2")).unwrap(),
            b"font bytes"
        );
    }

    #[test]
    fn test_extract_tar_xz_simple() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("test.tar.xz");
        let out = temp.path().join("out");

        {
            let file = File::create(&archive).unwrap();
            let encoder = xz2::write::XzEncoder::new(file, 6);
            let mut builder = tar::Builder::new(encoder);
            let data = b"icon bytes";
            let mut header = tar::Header::new_gnu();
            header.set_path("icons/home.svg").unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, &data[..]).unwrap();
            builder.finish().unwrap();
        }

        extract(&archive, ArchiveKind::TarXz, &out).unwrap();
        assert_eq!(fs::read(out.join("icons/home.svg")).unwrap(), b"icon bytes");
    }

    #[test]
    fn test_corrupt_zip_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bad.zip");
        fs::write(&archive, b"this is not a zip file").unwrap();

        let result = extract(&archive, ArchiveKind::Zip, &temp.path().join("out"));
        assert!(matches!(result, Err(ExtractError::Zip(_))));
    }

    #[test]
    fn test_truncated_tar_gz_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bad.tar.gz");
        fs::write(&archive, b"\x1f\x8b\x08\x00garbage").unwrap();

        let result = extract(&archive, ArchiveKind::TarGz, &temp.path().join("out"));
        assert!(matches!(result, Err(ExtractError::Io(_))));
    }

    #[test]
    fn test_zip_traversal_entry_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.zip");
        let out = temp.path().join("out");
        let escape_target = temp.path().join("escaped.txt");

        write_zip(&archive, &[("../escaped.txt", b"should not land outside")]);

        let result = extract(&archive, ArchiveKind::Zip, &out);
        assert!(matches!(result, Err(ExtractError::UnsafePath { .. })));
        assert!(!escape_target.exists());
    }

    #[test]
    fn test_tar_traversal_entry_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.tar.gz");
        let out = temp.path().join("out");
        let escape_target = temp.path().join("escaped.txt");

        // tar::Header::set_path refuses "..", so write the raw name field
        // directly, the way a hostile archive would arrive on the wire.
        {
            let file = File::create(&archive).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let data = b"should not land outside";
            let mut header = tar::Header::new_gnu();
            let name = b"../escaped.txt";
            header.as_old_mut().name[..name.len()].copy_from_slice(name);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, &data[..]).unwrap();
            builder.finish().unwrap();
        }

        let result = extract(&archive, ArchiveKind::TarGz, &out);
        assert!(matches!(result, Err(ExtractError::UnsafePath { .. })));
        assert!(!escape_target.exists());
    }

    #[test]
    fn test_tar_symlink_entry_skipped() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("links.tar.gz");
        let out = temp.path().join("out");

        {
            let file = File::create(&archive).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);

            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            header.set_mode(0o777);
            header.set_cksum();
            builder
                .append_link(&mut header, "link", "../outside.txt")
                .unwrap();

            let data = b"real file";
            let mut file_header = tar::Header::new_gnu();
            file_header.set_path("real.txt").unwrap();
            file_header.set_size(data.len() as u64);
            file_header.set_mode(0o644);
            file_header.set_cksum();
            builder.append(&file_header, &data[..]).unwrap();
            builder.finish().unwrap();
        }

        extract(&archive, ArchiveKind::TarGz, &out).unwrap();
        assert!(out.join("real.txt").exists());
        assert!(!out.join("link").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_bit_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bin.tar.gz");
        let out = temp.path().join("out");

        {
            let file = File::create(&archive).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let data = b"#!/bin/sh\necho hi";
            let mut header = tar::Header::new_gnu();
            header.set_path("run.sh").unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append(&header, &data[..]).unwrap();
            builder.finish().unwrap();
        }

        extract(&archive, ArchiveKind::TarGz, &out).unwrap();
        let mode = fs::metadata(out.join("run.sh")).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0);
    }
}
