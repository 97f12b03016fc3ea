//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Streaming a file to its destination in fixed-size chunks with progress
//! - Copying timestamps and permission bits
//! - Creating destination directories recursively

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use filetime::FileTime;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::checksums::{self, ChecksumAlgorithm, ChecksumValue};
use crate::error::{EngineError, Result};
use crate::progress::ProgressTracker;

/// Size of one read/write chunk (1 MiB).
pub const CHUNK_SIZE: usize = 1 << 20;

/// Result of copying one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    /// Source size in bytes
    pub bytes: u64,
    /// Source digest, when verification ran
    pub checksum: Option<ChecksumValue>,
}

/// Copy `src` to `dst`, creating parent directories, carrying metadata over
/// and optionally verifying the result.
///
/// `tracker` holds the whole job's counters; it is advanced after every chunk
/// and `on_chunk` is called with it.
///
/// # Errors
/// - Read/write/directory errors abort; a partially written `dst` is removed.
/// - `IntegrityMismatch` if verification fails; the bad `dst` is removed.
/// - `Cancelled` if `cancel` fires between chunks.
/// - `WriteError` if `dst` is `src` itself; nothing is opened.
///
/// Metadata copy failures are logged and do not fail the copy.
pub fn copy_media_file(
    src: &Path,
    dst: &Path,
    verify: Option<ChecksumAlgorithm>,
    tracker: &mut ProgressTracker,
    cancel: &CancelToken,
    on_chunk: &mut dyn FnMut(&ProgressTracker),
) -> Result<CopyOutcome> {
    if is_same_file(src, dst) {
        return Err(EngineError::WriteError {
            path: dst.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                "destination is the source file",
            ),
        });
    }
    ensure_parent_dir_exists(dst)?;

    let src_size = fs::metadata(src)
        .map_err(|e| EngineError::ReadError {
            path: src.to_path_buf(),
            source: e,
        })?
        .len();
    info!(
        "Copy {} -> {} ({:.1} MiB)",
        src.display(),
        dst.display(),
        src_size as f64 / 1_048_576.0
    );

    if let Err(e) = copy_file_chunked(src, dst, tracker, cancel, on_chunk) {
        remove_partial(dst);
        return Err(e);
    }

    if let Err(e) = copy_metadata(src, dst) {
        warn!(error = %e, cause = ?std::error::Error::source(&e), "metadata not preserved");
    }

    let checksum = match verify {
        Some(algorithm) => match checksums::verify_copy(src, dst, algorithm) {
            Ok(checksum) => {
                info!("Verified {} ({})", dst.display(), checksum.labeled());
                Some(checksum)
            }
            Err(e) => {
                if matches!(e, EngineError::IntegrityMismatch { .. }) {
                    remove_partial(dst);
                }
                return Err(e);
            }
        },
        None => None,
    };

    Ok(CopyOutcome {
        bytes: src_size,
        checksum,
    })
}

/// Stream `src` into `dst` in `CHUNK_SIZE` pieces.
///
/// Returns the number of bytes written. Both handles are closed before this
/// returns, on every path.
pub fn copy_file_chunked(
    src: &Path,
    dst: &Path,
    tracker: &mut ProgressTracker,
    cancel: &CancelToken,
    on_chunk: &mut dyn FnMut(&ProgressTracker),
) -> Result<u64> {
    let read_error = |e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    };
    let write_error = |e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    };

    let mut src_file = fs::File::open(src).map_err(read_error)?;
    let mut dst_file = fs::File::create(dst).map_err(write_error)?;

    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;

    loop {
        cancel.check()?;

        let n = match src_file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(e)),
        };
        dst_file.write_all(&buffer[..n]).map_err(write_error)?;

        written += n as u64;
        tracker.advance(n as u64);
        on_chunk(tracker);
    }

    dst_file.flush().map_err(write_error)?;
    Ok(written)
}

/// Copy access/modification times and permission bits from `src` to `dst`.
pub fn copy_metadata(src: &Path, dst: &Path) -> Result<()> {
    let metadata_error = |e| EngineError::Metadata {
        path: dst.to_path_buf(),
        source: e,
    };

    let src_metadata = fs::metadata(src).map_err(metadata_error)?;
    let atime = FileTime::from_last_access_time(&src_metadata);
    let mtime = FileTime::from_last_modification_time(&src_metadata);

    filetime::set_file_times(dst, atime, mtime).map_err(metadata_error)?;
    fs::set_permissions(dst, src_metadata.permissions()).map_err(metadata_error)?;
    Ok(())
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns EngineError if directory creation fails or the parent exists but
/// is not a directory.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    // Skip if parent is empty path (relative root)
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %parent.display(), "creating directory");
            fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}

/// True when `dst` already exists and resolves to the same file as `src`.
fn is_same_file(src: &Path, dst: &Path) -> bool {
    match (fs::canonicalize(src), fs::canonicalize(dst)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn remove_partial(dst: &Path) {
    match fs::remove_file(dst) {
        Ok(()) => debug!(path = %dst.display(), "removed incomplete copy"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dst.display(), error = %e, "could not remove incomplete copy"),
    }
}
