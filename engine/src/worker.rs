//! Background execution of ingest jobs.
//!
//! [`spawn_job`] runs one job on its own thread and reports back over a
//! channel, so a caller's UI loop never blocks on I/O. Per job the caller
//! receives zero or more [`JobEvent::Progress`] values (non-decreasing), then
//! exactly one [`JobEvent::Completed`] or [`JobEvent::Failed`].

use std::cell::Cell;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::job::{create_job, run_job, IngestRequest};
use crate::progress::ProgressCallback;

/// A notification from a running job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// Whole-job progress in percent
    Progress(u8),
    /// Every item was copied
    Completed,
    /// The job stopped; carries a human-readable message
    Failed(String),
}

/// A ProgressCallback implementation that forwards percentages to a channel,
/// dropping repeats.
pub struct ChannelProgressCallback {
    sender: Sender<JobEvent>,
    last_percent: Cell<Option<u8>>,
}

impl ChannelProgressCallback {
    pub fn new(sender: Sender<JobEvent>) -> Self {
        ChannelProgressCallback {
            sender,
            last_percent: Cell::new(None),
        }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_progress(&self, _copied_bytes: u64, _total_bytes: u64, percent: u8) {
        if self.last_percent.get() == Some(percent) {
            return;
        }
        self.last_percent.set(Some(percent));
        // The receiver may be gone; the job still runs to the end.
        let _ = self.sender.send(JobEvent::Progress(percent));
    }
}

/// Handle to a job running on a worker thread.
pub struct JobHandle {
    events: Receiver<JobEvent>,
    cancel: CancelToken,
    thread: thread::JoinHandle<()>,
}

impl JobHandle {
    /// Event stream; disconnects once the worker thread exits.
    pub fn events(&self) -> &Receiver<JobEvent> {
        &self.events
    }

    /// Ask the job to stop at the next file or chunk boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the job ends, discarding progress events.
    ///
    /// Returns the failure message if the job failed.
    pub fn wait(self) -> std::result::Result<(), String> {
        self.wait_with(|_| {})
    }

    /// Block until the job ends, passing each progress percentage to
    /// `on_progress` on the calling thread.
    pub fn wait_with(self, mut on_progress: impl FnMut(u8)) -> std::result::Result<(), String> {
        let mut outcome = Err("worker stopped without reporting a result".to_string());
        for event in self.events.iter() {
            match event {
                JobEvent::Progress(percent) => on_progress(percent),
                JobEvent::Completed => outcome = Ok(()),
                JobEvent::Failed(message) => outcome = Err(message),
            }
        }
        if self.thread.join().is_err() {
            return Err("worker thread panicked".to_string());
        }
        outcome
    }
}

/// Spawn a background worker thread to execute an ingest job.
pub fn spawn_job(request: IngestRequest) -> JobHandle {
    spawn_job_with_cancel(request, CancelToken::new())
}

/// Like [`spawn_job`], using a caller-owned cancel token.
pub fn spawn_job_with_cancel(request: IngestRequest, cancel: CancelToken) -> JobHandle {
    let (tx, rx) = unbounded::<JobEvent>();
    let worker_cancel = cancel.clone();

    let thread = thread::spawn(move || {
        let terminal = match execute_ingest(request, tx.clone(), &worker_cancel) {
            Ok(()) => JobEvent::Completed,
            Err(e) => JobEvent::Failed(e.to_string()),
        };
        debug!(event = ?terminal, "worker finished");
        let _ = tx.send(terminal);
    });

    JobHandle {
        events: rx,
        cancel,
        thread,
    }
}

fn execute_ingest(request: IngestRequest, tx: Sender<JobEvent>, cancel: &CancelToken) -> Result<()> {
    let mut job = create_job(request)?;
    let callback = ChannelProgressCallback::new(tx);
    run_job(&mut job, Some(&callback), cancel)
}
