//! Progress reporting.
//!
//! `ProgressTracker` owns the byte counters of a running job and turns them
//! into a whole percentage. `ProgressCallback` lets any front end (CLI,
//! channel-backed worker, tests) observe a job without the engine knowing
//! about it.
//!
//! All callback methods are called synchronously on the job's thread.

use crate::model::{CopyItem, CopyJob};

/// `floor(copied / total * 100)`, clamped to 100. A zero total counts as done.
pub fn percent_of(copied: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = u128::from(copied) * 100 / u128::from(total);
    pct.min(100) as u8
}

/// Cumulative byte counter for one job.
///
/// The total is fixed at construction. The copied counter only moves
/// forward and never passes the total, so the percentage never decreases.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_bytes: u64,
    copied_bytes: u64,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64) -> Self {
        ProgressTracker {
            total_bytes,
            copied_bytes: 0,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn copied_bytes(&self) -> u64 {
        self.copied_bytes
    }

    pub fn percent(&self) -> u8 {
        percent_of(self.copied_bytes, self.total_bytes)
    }

    /// Record `bytes` more copied.
    pub fn advance(&mut self, bytes: u64) {
        self.copied_bytes = self.copied_bytes.saturating_add(bytes).min(self.total_bytes);
    }

    /// Move the counter to `position` if that is further along.
    pub fn settle(&mut self, position: u64) {
        self.copied_bytes = self.copied_bytes.max(position.min(self.total_bytes));
    }

    /// Jump to the end, as on completion.
    pub fn finish(&mut self) {
        self.copied_bytes = self.total_bytes;
    }
}

/// Trait for receiving progress updates from an ingest job.
///
/// Only `on_progress` is required; the other hooks default to no-ops.
pub trait ProgressCallback: Send {
    /// Called once the job is planned and copying starts.
    fn on_job_started(&self, _job: &CopyJob) {}

    /// Called after the destination of an item is rendered, before copying.
    fn on_item_started(&self, _job: &CopyJob, _item_index: usize, _item: &CopyItem) {}

    /// Called after every chunk write and once more when the job completes.
    fn on_progress(&self, copied_bytes: u64, total_bytes: u64, percent: u8);

    /// Called when an item is done or failed.
    fn on_item_completed(&self, _job: &CopyJob, _item_index: usize, _item: &CopyItem) {}

    /// Called when the job reaches a terminal state.
    fn on_job_completed(&self, _job: &CopyJob) {}
}
