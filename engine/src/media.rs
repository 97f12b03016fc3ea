//! Media classification and discovery.
//!
//! Files are classified by extension (case-insensitive) into video, audio or
//! photo. Discovery walks every source root and collects only those three
//! types; anything else is ignored at scan time.
//!
//! Unreadable subtrees and symlink loops are logged and skipped rather than
//! aborting the scan. Only a missing or unreadable root is an error.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{EngineError, Result};
use crate::model::{MediaFile, MediaType};

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "avi", "wmv", "flv", "webm", "mkv", "mpeg", "mpg", "3gp", "3g2", "ts",
    "mts", "m2ts", "vob", "ogv", "divx", "rm", "rmvb", "asf", "f4v", "amv", "drc", "mxf", "roq",
    "nsv", "yuv", "bik",
];

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "aac", "ogg", "m4a", "wma", "alac", "aiff", "ape", "amr", "opus", "ra",
    "ac3",
];

pub const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "heif", "heic", "raw", "cr2", "nef",
    "orf", "sr2", "arw", "dng", "ico", "svg", "jfif",
];

/// Entry names never descended into or copied (compared lowercase).
pub const EXCLUDED_NAMES: &[&str] = &[
    "system volume information",
    "$recycle.bin",
    "recycler",
    "pagefile.sys",
    "hiberfil.sys",
];

impl MediaType {
    /// Classify an extension given without the leading dot.
    pub fn from_extension(ext: &str) -> MediaType {
        let ext = ext.to_lowercase();
        let ext = ext.as_str();
        if VIDEO_EXTENSIONS.contains(&ext) {
            MediaType::Video
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            MediaType::Audio
        } else if PHOTO_EXTENSIONS.contains(&ext) {
            MediaType::Photo
        } else {
            MediaType::Other
        }
    }

    /// Classify a path by its extension.
    pub fn from_path(path: &Path) -> MediaType {
        path.extension()
            .and_then(|e| e.to_str())
            .map(MediaType::from_extension)
            .unwrap_or(MediaType::Other)
    }
}

impl MediaFile {
    /// Build a record for `path` from already-fetched metadata.
    pub fn from_metadata(path: PathBuf, metadata: &fs::Metadata) -> io::Result<Self> {
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let media_type = MediaType::from_path(&path);
        Ok(MediaFile {
            path,
            extension,
            media_type,
            size: metadata.len(),
            modified: metadata.modified()?,
        })
    }
}

/// Discovered files, one ordered list per classified type.
#[derive(Debug, Default, Clone)]
pub struct MediaBuckets {
    pub video: Vec<MediaFile>,
    pub audio: Vec<MediaFile>,
    pub photo: Vec<MediaFile>,
}

impl MediaBuckets {
    pub fn len(&self) -> usize {
        self.video.len() + self.audio.len() + self.photo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge into one work list: video, then audio, then photo.
    pub fn into_work_list(self) -> Vec<MediaFile> {
        let mut all = self.video;
        all.extend(self.audio);
        all.extend(self.photo);
        all
    }

    fn push(&mut self, file: MediaFile) {
        match file.media_type {
            MediaType::Video => self.video.push(file),
            MediaType::Audio => self.audio.push(file),
            MediaType::Photo => self.photo.push(file),
            MediaType::Other => {}
        }
    }
}

/// Returns true if the entry name is on the exclusion list.
pub fn is_excluded(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .is_some_and(|name| EXCLUDED_NAMES.contains(&name.as_str()))
}

/// Check that a source root exists and is readable.
pub fn check_root(root: &Path) -> Result<()> {
    let metadata = fs::metadata(root).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => EngineError::SourceNotFound {
            path: root.to_path_buf(),
        },
        _ => EngineError::SourceAccessDenied {
            path: root.to_path_buf(),
            source: e,
        },
    })?;

    if metadata.is_dir() {
        fs::read_dir(root).map_err(|e| EngineError::SourceAccessDenied {
            path: root.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Recursively find all video, audio and photo files under `roots`.
///
/// Each root may be a directory or a single file. A file reachable from more
/// than one root is returned once.
///
/// # Errors
/// Returns a scan error if any root is missing or unreadable. Errors below
/// the root are logged and the offending entry is skipped.
pub fn find_media_files<P: AsRef<Path>>(roots: &[P]) -> Result<MediaBuckets> {
    for root in roots {
        check_root(root.as_ref())?;
    }

    let mut buckets = MediaBuckets::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for root in roots {
        let walker = WalkDir::new(root.as_ref())
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| !is_excluded(e.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        path = %e.path().map(|p| p.display().to_string()).unwrap_or_default(),
                        error = %e,
                        "skipping unreadable entry"
                    );
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(file) = discover(&entry, &mut seen) {
                buckets.push(file);
            }
        }
    }

    debug!(
        video = buckets.video.len(),
        audio = buckets.audio.len(),
        photo = buckets.photo.len(),
        "scan complete"
    );
    Ok(buckets)
}

fn discover(entry: &DirEntry, seen: &mut HashSet<PathBuf>) -> Option<MediaFile> {
    let path = entry.path();
    if MediaType::from_path(path) == MediaType::Other {
        return None;
    }

    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if !seen.insert(canonical.clone()) {
        debug!(path = %canonical.display(), "already discovered");
        return None;
    }

    let metadata = match entry.metadata() {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping file without metadata");
            return None;
        }
    };

    match MediaFile::from_metadata(canonical, &metadata) {
        Ok(file) => Some(file),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping file without modification time");
            None
        }
    }
}
