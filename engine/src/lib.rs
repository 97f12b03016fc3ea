//! # DITZ Engine - Media Ingest Library
//!
//! A headless media-ingest copy engine. It finds video, audio and photo files
//! on one or more source roots, places each one under one or more destination
//! roots according to user templates, and copies the bytes with job-wide
//! progress and optional content verification.
//!
//! ## Overview
//!
//! - Recursive discovery that skips unreadable subtrees and system folders
//! - Destination paths from `{token:spec}` templates with per-type folders
//! - Chunked copy (1 MiB) with byte-accurate progress across the whole job
//! - Timestamp and permission preservation
//! - Optional SHA-256 (or BLAKE3/MD5) verification, fail-fast on mismatch
//! - Cooperative cancellation and a channel-based background worker
//!
//! ## Basic Usage
//!
//! ```no_run
//! use ditz_engine::{create_job, plan_job, run_job, CancelToken, IngestRequest};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let request = IngestRequest::new(
//!     vec![PathBuf::from("/media/card")],
//!     vec![PathBuf::from("/backup/a"), PathBuf::from("/backup/b")],
//! )
//! .with_verify(true);
//!
//! let mut job = create_job(request)?;
//! plan_job(&mut job)?;
//! println!("Will copy {} files", job.files.len());
//!
//! run_job(&mut job, None, &CancelToken::new())?;
//!
//! for item in &job.items {
//!     println!("{:?} -> {:?}", item.source_path, item.destination_path);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (CopyJob, CopyItem, MediaFile, enums)
//! - **error**: Error types and handling
//! - **media**: Extension-based classification and discovery
//! - **tokens**: Token resolution from file metadata
//! - **template**: Template parsing and destination rendering
//! - **fs_ops**: Chunked copy and metadata preservation
//! - **checksums**: Content digests and verification
//! - **progress**: Progress tracker and callback trait
//! - **cancel**: Cooperative cancellation
//! - **job**: Job orchestration (create, plan, run)
//! - **worker**: Background execution with channel events

pub mod cancel;
pub mod checksums;
pub mod error;
pub mod fs_ops;
pub mod job;
pub mod media;
pub mod model;
pub mod progress;
pub mod template;
pub mod tokens;
pub mod worker;

// Re-export main types and functions
pub use cancel::CancelToken;
pub use checksums::{compute_file_checksum, verify_copy, ChecksumAlgorithm, ChecksumValue};
pub use error::{EngineError, ErrorKind};
pub use job::{create_job, plan_job, run_job, IngestRequest};
pub use media::{find_media_files, MediaBuckets};
pub use model::{CopyItem, CopyJob, ItemState, JobState, MediaFile, MediaType};
pub use progress::{ProgressCallback, ProgressTracker};
pub use template::{render_destination, Template, TemplateSet};
pub use tokens::{TokenSet, TokenValue};
pub use worker::{spawn_job, spawn_job_with_cancel, JobEvent, JobHandle};
