//! Core data model for ingest jobs.
//!
//! This module defines the main data structures for representing an ingest run:
//! - CopyJob: the whole multi-source, multi-target operation
//! - MediaFile: one discovered source file
//! - CopyItem: one (file, destination root) pair within a job
//! - MediaType, ItemState, JobState: enums controlling behavior

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksums::{ChecksumAlgorithm, ChecksumValue};
use crate::template::TemplateSet;
use crate::tokens::TokenSet;

/// Media classification of a file, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
    Photo,
    Other,
}

impl MediaType {
    /// The classified types collected by a scan, in work-list order.
    pub const SCANNED: [MediaType; 3] = [MediaType::Video, MediaType::Audio, MediaType::Photo];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Photo => "photo",
            MediaType::Other => "other",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "video" => Some(MediaType::Video),
            "audio" => Some(MediaType::Audio),
            "photo" => Some(MediaType::Photo),
            "other" => Some(MediaType::Other),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source file discovered by the classifier.
///
/// Immutable once discovered. Identity is the canonical `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Canonical absolute path
    pub path: PathBuf,

    /// Extension including the leading dot, original case (empty if none)
    pub extension: String,

    /// Classified type
    pub media_type: MediaType,

    /// Size in bytes at discovery time
    pub size: u64,

    /// Last modification time at discovery time
    pub modified: SystemTime,
}

/// Represents a single ingest job.
///
/// A CopyJob encompasses:
/// - Source roots, destination roots and the templates used to place files
/// - Every (file, destination root) pair to be copied
/// - Current state and byte-level progress
#[derive(Debug)]
pub struct CopyJob {
    /// Unique identifier for this job
    pub id: Uuid,

    /// Source roots (files or directories), in caller order
    pub sources: Vec<PathBuf>,

    /// Destination roots, in caller order
    pub targets: Vec<PathBuf>,

    /// Folder and filename templates
    pub templates: TemplateSet,

    /// Caller-supplied tokens overlaid on every resolved token set
    pub custom_tokens: TokenSet,

    /// Whether to verify each copy by content digest
    pub verify: bool,

    /// Digest used when `verify` is set
    pub checksum_algorithm: ChecksumAlgorithm,

    /// Discovered files in work-list order (video, then audio, then photo)
    pub files: Vec<MediaFile>,

    /// One entry per (file, destination root) pair
    pub items: Vec<CopyItem>,

    /// Current job state
    pub state: JobState,

    /// Sum of source sizes times the number of destination roots, fixed at planning
    pub total_bytes: u64,

    /// Bytes accounted as copied so far
    pub copied_bytes: u64,

    /// Next value of the `index` token
    pub next_index: u64,

    /// Terminal error message if the job failed
    pub failure: Option<String>,

    /// When job was created
    pub created_at: SystemTime,

    /// When copying started
    pub start_time: Option<SystemTime>,

    /// When job reached a terminal state
    pub end_time: Option<SystemTime>,
}

impl CopyJob {
    /// Current progress as a whole percentage.
    pub fn percent(&self) -> u8 {
        crate::progress::percent_of(self.copied_bytes, self.total_bytes)
    }
}

/// One (file, destination root) pair within a job.
#[derive(Debug, Clone)]
pub struct CopyItem {
    /// Position of the source in `CopyJob::files`
    pub file_index: usize,

    /// Full source path
    pub source_path: PathBuf,

    /// Destination root this item is copied into
    pub target_root: PathBuf,

    /// Rendered destination path, set once the templates are expanded
    pub destination_path: Option<PathBuf>,

    /// Source size in bytes
    pub file_size: u64,

    /// Current state of this item
    pub state: ItemState,

    /// Bytes copied for this item
    pub bytes_copied: u64,

    /// Human-readable error message
    pub error_message: Option<String>,

    /// Source digest computed during verification
    pub source_checksum: Option<ChecksumValue>,

    /// Whether verification passed (None if verification was off)
    pub verification_passed: Option<bool>,
}

impl CopyItem {
    pub fn new(file_index: usize, file: &MediaFile, target_root: PathBuf) -> Self {
        CopyItem {
            file_index,
            source_path: file.path.clone(),
            target_root,
            destination_path: None,
            file_size: file.size,
            state: ItemState::Pending,
            bytes_copied: 0,
            error_message: None,
            source_checksum: None,
            verification_passed: None,
        }
    }
}

/// The state of one copy item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Not yet processed
    Pending,
    /// Currently transferring
    Copying,
    /// Successfully copied
    Done,
    /// Error occurred; the job stopped here
    Failed,
}

/// The state of an entire ingest job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Created, not yet scanned
    Idle,
    /// Classifying source roots
    Scanning,
    /// Scanned; items are pending or being copied
    Copying,
    /// Every item copied
    Completed,
    /// Stopped by an error or cancellation
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Idle => "Idle",
            JobState::Scanning => "Scanning",
            JobState::Copying => "Copying",
            JobState::Completed => "Completed",
            JobState::Failed => "Failed",
        };
        f.write_str(name)
    }
}
