//! Job orchestration module.
//!
//! This module provides the main job lifecycle functions:
//! - Creating a job from an [`IngestRequest`]
//! - Planning a job (classifying the sources and fixing the byte total)
//! - Running a job (rendering destinations and copying every item)
//!
//! A job moves `Idle → Scanning → Copying → Completed | Failed`. Any error
//! while copying stops the job at that item. Items already copied stay on
//! disk.

use std::path::PathBuf;
use std::time::SystemTime;

use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::checksums::ChecksumAlgorithm;
use crate::error::{EngineError, Result};
use crate::fs_ops;
use crate::media;
use crate::model::{CopyItem, CopyJob, ItemState, JobState};
use crate::progress::{ProgressCallback, ProgressTracker};
use crate::template::{render_destination, TemplateSet};
use crate::tokens::TokenSet;

/// Everything a caller supplies to start an ingest.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Source roots (files or directories), scanned in order
    pub sources: Vec<PathBuf>,
    /// Destination roots, copied to in order
    pub targets: Vec<PathBuf>,
    /// Verify each copy by content digest
    pub verify: bool,
    /// Digest used when `verify` is set
    pub checksum_algorithm: ChecksumAlgorithm,
    pub templates: TemplateSet,
    pub custom_tokens: TokenSet,
}

impl IngestRequest {
    pub fn new(sources: Vec<PathBuf>, targets: Vec<PathBuf>) -> Self {
        IngestRequest {
            sources,
            targets,
            verify: false,
            checksum_algorithm: ChecksumAlgorithm::default(),
            templates: TemplateSet::default(),
            custom_tokens: TokenSet::new(),
        }
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_checksum_algorithm(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum_algorithm = algorithm;
        self
    }

    pub fn with_templates(mut self, templates: TemplateSet) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_custom_tokens(mut self, custom_tokens: TokenSet) -> Self {
        self.custom_tokens = custom_tokens;
        self
    }
}

/// Create a new ingest job.
///
/// Validates that there is at least one source and one target, and that
/// every source root exists and is readable.
///
/// # Errors
/// Returns a scan error for a missing or unreadable source, or
/// `InvalidRequest` for empty source/target lists.
pub fn create_job(request: IngestRequest) -> Result<CopyJob> {
    if request.sources.is_empty() {
        return Err(EngineError::InvalidRequest {
            reason: "no sources given".to_string(),
        });
    }
    if request.targets.is_empty() {
        return Err(EngineError::InvalidRequest {
            reason: "no destinations given".to_string(),
        });
    }
    if let Some(empty) = request.targets.iter().find(|t| t.as_os_str().is_empty()) {
        return Err(EngineError::InvalidRequest {
            reason: format!("destination path is empty: '{}'", empty.display()),
        });
    }
    for source in &request.sources {
        media::check_root(source)?;
    }

    Ok(CopyJob {
        id: Uuid::new_v4(),
        sources: request.sources,
        targets: request.targets,
        templates: request.templates,
        custom_tokens: request.custom_tokens,
        verify: request.verify,
        checksum_algorithm: request.checksum_algorithm,
        files: Vec::new(),
        items: Vec::new(),
        state: JobState::Idle,
        total_bytes: 0,
        copied_bytes: 0,
        next_index: 1,
        failure: None,
        created_at: SystemTime::now(),
        start_time: None,
        end_time: None,
    })
}

/// Plan a job by classifying its sources.
///
/// Populates `job.files` (video, then audio, then photo), one `CopyItem` per
/// file and destination root, and the fixed `job.total_bytes`. A job with
/// nothing to copy goes straight to `Completed`.
///
/// # Errors
/// Returns a scan error if a source root became unreadable; the job is then
/// `Failed`.
#[instrument(skip_all, fields(job_id = %job.id))]
pub fn plan_job(job: &mut CopyJob) -> Result<()> {
    if job.state != JobState::Idle {
        return Err(EngineError::InvalidState {
            reason: format!("job must be Idle to plan; current state: {}", job.state),
        });
    }

    job.state = JobState::Scanning;
    let buckets = match media::find_media_files(&job.sources) {
        Ok(buckets) => buckets,
        Err(e) => {
            job.state = JobState::Failed;
            job.failure = Some(e.to_string());
            job.end_time = Some(SystemTime::now());
            return Err(e);
        }
    };

    job.files = buckets.into_work_list();
    job.items = job
        .files
        .iter()
        .enumerate()
        .flat_map(|(file_index, file)| {
            job.targets
                .iter()
                .map(move |target| CopyItem::new(file_index, file, target.clone()))
        })
        .collect();

    let source_bytes: u64 = job.files.iter().map(|f| f.size).sum();
    job.total_bytes = source_bytes.saturating_mul(job.targets.len() as u64);

    info!(
        files = job.files.len(),
        targets = job.targets.len(),
        total_bytes = job.total_bytes,
        "planned ingest"
    );

    job.state = if job.total_bytes == 0 {
        JobState::Completed
    } else {
        JobState::Copying
    };
    Ok(())
}

/// Run a job, copying every item in order.
///
/// Plans the job first if it is still `Idle`. Progress is reported through
/// `progress_callback` after every chunk; on success a final 100% is
/// reported. The first error stops the job, marks it `Failed` and is
/// returned. Nothing already copied is removed.
///
/// # Errors
/// Any scan, template, I/O, integrity or cancellation error.
#[instrument(skip_all, fields(job_id = %job.id))]
pub fn run_job(
    job: &mut CopyJob,
    progress_callback: Option<&dyn ProgressCallback>,
    cancel: &CancelToken,
) -> Result<()> {
    if job.state == JobState::Idle {
        plan_job(job)?;
    }

    let planned_empty = job.state == JobState::Completed && job.start_time.is_none();
    if !(job.state == JobState::Copying || planned_empty) || job.start_time.is_some() {
        return Err(EngineError::InvalidState {
            reason: format!("job has already run; current state: {}", job.state),
        });
    }

    job.start_time = Some(SystemTime::now());
    if let Some(callback) = progress_callback {
        callback.on_job_started(job);
    }

    let mut tracker = ProgressTracker::new(job.total_bytes);
    let result = if planned_empty {
        info!("nothing to copy");
        Ok(())
    } else {
        copy_items(job, &mut tracker, progress_callback, cancel)
    };

    match &result {
        Ok(()) => {
            tracker.finish();
            job.copied_bytes = tracker.copied_bytes();
            job.state = JobState::Completed;
            if let Some(callback) = progress_callback {
                callback.on_progress(tracker.copied_bytes(), tracker.total_bytes(), 100);
            }
            info!(bytes = job.copied_bytes, "ingest complete");
        }
        Err(e) => {
            job.state = JobState::Failed;
            job.failure = Some(e.to_string());
            error!(error = %e, "ingest failed");
        }
    }

    job.end_time = Some(SystemTime::now());
    if let Some(callback) = progress_callback {
        callback.on_job_completed(job);
    }
    result
}

fn copy_items(
    job: &mut CopyJob,
    tracker: &mut ProgressTracker,
    progress_callback: Option<&dyn ProgressCallback>,
    cancel: &CancelToken,
) -> Result<()> {
    let verify = job.verify.then_some(job.checksum_algorithm);

    for item_index in 0..job.items.len() {
        cancel.check()?;

        let file_index = job.items[item_index].file_index;
        let target_root = job.items[item_index].target_root.clone();
        let src_path = job.items[item_index].source_path.clone();

        // The index advances once per rendered destination, not per source file.
        let index = job.next_index;
        job.next_index += 1;

        let dst_path = match render_destination(
            &target_root,
            &job.files[file_index],
            index,
            &job.templates,
            &job.custom_tokens,
        ) {
            Ok(path) => path,
            Err(e) => return Err(fail_item(job, item_index, e, progress_callback)),
        };

        job.items[item_index].destination_path = Some(dst_path.clone());
        job.items[item_index].state = ItemState::Copying;
        if let Some(callback) = progress_callback {
            callback.on_item_started(job, item_index, &job.items[item_index]);
        }

        let start = tracker.copied_bytes();
        let mut on_chunk = |t: &ProgressTracker| {
            if let Some(callback) = progress_callback {
                callback.on_progress(t.copied_bytes(), t.total_bytes(), t.percent());
            }
        };

        match fs_ops::copy_media_file(&src_path, &dst_path, verify, tracker, cancel, &mut on_chunk)
        {
            Ok(outcome) => {
                tracker.settle(start.saturating_add(job.items[item_index].file_size));
                job.copied_bytes = tracker.copied_bytes();

                let item = &mut job.items[item_index];
                item.bytes_copied = outcome.bytes;
                item.state = ItemState::Done;
                item.verification_passed = outcome.checksum.as_ref().map(|_| true);
                item.source_checksum = outcome.checksum;
            }
            Err(e) => return Err(fail_item(job, item_index, e, progress_callback)),
        }

        if let Some(callback) = progress_callback {
            callback.on_item_completed(job, item_index, &job.items[item_index]);
        }
    }
    Ok(())
}

fn fail_item(
    job: &mut CopyJob,
    item_index: usize,
    error: EngineError,
    progress_callback: Option<&dyn ProgressCallback>,
) -> EngineError {
    let item = &mut job.items[item_index];
    item.state = ItemState::Failed;
    item.error_message = Some(error.to_string());
    if matches!(error, EngineError::IntegrityMismatch { .. }) {
        item.verification_passed = Some(false);
    }
    if let Some(callback) = progress_callback {
        callback.on_item_completed(job, item_index, &job.items[item_index]);
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::MediaType;
    use crate::tokens::TokenValue;
    use chrono::{Local, TimeZone};
    use filetime::FileTime;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;

    const MIB: usize = 1 << 20;

    fn march_5_2024() -> FileTime {
        let local = Local
            .with_ymd_and_hms(2024, 3, 5, 12, 0, 0)
            .single()
            .expect("valid local time");
        FileTime::from_system_time(SystemTime::from(local))
    }

    fn write_media(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(path, content).expect("Failed to write file");
        filetime::set_file_mtime(path, march_5_2024()).expect("Failed to set mtime");
    }

    // Test helper: records every callback invocation
    #[derive(Default)]
    struct RecordingCallback {
        progress: Mutex<Vec<(u64, u8)>>,
        completed_items: Mutex<Vec<(ItemState, u64)>>,
        job_completed: Mutex<Option<JobState>>,
    }

    impl ProgressCallback for RecordingCallback {
        fn on_progress(&self, copied_bytes: u64, _total_bytes: u64, percent: u8) {
            self.progress.lock().unwrap().push((copied_bytes, percent));
        }

        fn on_item_completed(&self, _job: &CopyJob, _item_index: usize, item: &CopyItem) {
            self.completed_items
                .lock()
                .unwrap()
                .push((item.state, item.bytes_copied));
        }

        fn on_job_completed(&self, job: &CopyJob) {
            *self.job_completed.lock().unwrap() = Some(job.state);
        }
    }

    #[test]
    fn test_create_job_validates_inputs() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dst = temp_dir.path().join("dst");

        let missing = IngestRequest::new(vec![temp_dir.path().join("nope")], vec![dst.clone()]);
        assert_eq!(create_job(missing).unwrap_err().kind(), ErrorKind::Scan);

        let no_targets = IngestRequest::new(vec![temp_dir.path().to_path_buf()], vec![]);
        assert_eq!(create_job(no_targets).unwrap_err().kind(), ErrorKind::Usage);

        let job = create_job(IngestRequest::new(vec![temp_dir.path().to_path_buf()], vec![dst]))
            .expect("Failed to create job");
        assert_eq!(job.state, JobState::Idle);
        assert_eq!(job.next_index, 1);
        assert!(job.items.is_empty());
    }

    #[test]
    fn test_plan_job_orders_work_and_fixes_total() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("card");
        write_media(&src.join("a.jpg"), b"123");
        write_media(&src.join("b.wav"), b"12345");
        write_media(&src.join("c.mp4"), b"1234567");
        write_media(&src.join("d.txt"), b"ignored");

        let targets = vec![temp_dir.path().join("t1"), temp_dir.path().join("t2")];
        let mut job = create_job(IngestRequest::new(vec![src], targets)).expect("create");
        plan_job(&mut job).expect("plan");

        assert_eq!(job.state, JobState::Copying);
        assert_eq!(job.total_bytes, (3 + 5 + 7) * 2);
        let types: Vec<MediaType> = job.files.iter().map(|f| f.media_type).collect();
        assert_eq!(types, vec![MediaType::Video, MediaType::Audio, MediaType::Photo]);
        assert_eq!(job.items.len(), 6);
        assert!(job.items.iter().all(|i| i.state == ItemState::Pending));
        assert!(job.items[0].target_root.ends_with("t1"));
        assert!(job.items[1].target_root.ends_with("t2"));

        assert!(plan_job(&mut job).is_err(), "a job is planned once");
    }

    #[test]
    fn test_zero_media_completes_at_100() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("card");
        write_media(&src.join("readme.txt"), b"not media");
        let dst = temp_dir.path().join("dst");

        let mut job = create_job(IngestRequest::new(vec![src], vec![dst.clone()])).expect("create");
        plan_job(&mut job).expect("plan");
        assert_eq!(job.state, JobState::Completed);

        let recorder = RecordingCallback::default();
        run_job(&mut job, Some(&recorder), &CancelToken::new()).expect("run");

        assert_eq!(*recorder.progress.lock().unwrap(), vec![(0, 100)]);
        assert_eq!(*recorder.job_completed.lock().unwrap(), Some(JobState::Completed));
        assert!(!dst.exists(), "no copy attempted");
    }

    #[test]
    fn test_scenario_default_templates() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("card");
        write_media(&src.join("clip.mp4"), b"video bytes");
        write_media(&src.join("photo.jpg"), b"photo bytes");
        let target = temp_dir.path().join("target");

        let mut job =
            create_job(IngestRequest::new(vec![src], vec![target.clone()])).expect("create");
        run_job(&mut job, None, &CancelToken::new()).expect("run");

        assert_eq!(job.state, JobState::Completed);
        let clip = target.join("video/2024/03/clip-5-3-2024.mp4");
        let photo = target.join("photo/2024/03/photo-5-3-2024.jpg");
        assert_eq!(fs::read(&clip).expect("clip copied"), b"video bytes");
        assert_eq!(fs::read(&photo).expect("photo copied"), b"photo bytes");
        assert_eq!(job.items[0].destination_path.as_deref(), Some(clip.as_path()));

        let copied_mtime =
            FileTime::from_last_modification_time(&fs::metadata(&clip).expect("stat"));
        assert_eq!(copied_mtime, march_5_2024());
    }

    #[test]
    fn test_two_targets_reach_50_percent_after_first_copy() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("card");
        write_media(&src.join("big.mov"), &vec![1u8; 10 * MIB]);
        let targets = vec![temp_dir.path().join("a"), temp_dir.path().join("b")];

        let mut job = create_job(IngestRequest::new(vec![src], targets)).expect("create");
        let recorder = RecordingCallback::default();
        run_job(&mut job, Some(&recorder), &CancelToken::new()).expect("run");

        assert_eq!(job.total_bytes, 20 * MIB as u64);
        let progress = recorder.progress.lock().unwrap().clone();
        assert!(progress.windows(2).all(|w| w[0].1 <= w[1].1), "progress never decreases");
        assert!(progress.contains(&(10 * MIB as u64, 50)));
        assert_eq!(progress.last(), Some(&(20 * MIB as u64, 100)));

        let completed = recorder.completed_items.lock().unwrap().clone();
        let sum: u64 = completed.iter().map(|(_, bytes)| bytes).sum();
        assert_eq!(sum, job.total_bytes);
        assert!(completed.iter().all(|(state, _)| *state == ItemState::Done));
    }

    #[test]
    fn test_verify_records_matching_checksums() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("card");
        write_media(&src.join("clip.mp4"), b"verify me");
        let target = temp_dir.path().join("target");

        let request = IngestRequest::new(vec![src], vec![target])
            .with_verify(true)
            .with_checksum_algorithm(ChecksumAlgorithm::Blake3);
        let mut job = create_job(request).expect("create");
        run_job(&mut job, None, &CancelToken::new()).expect("run");

        let item = &job.items[0];
        assert_eq!(item.verification_passed, Some(true));
        let dst = item.destination_path.as_ref().expect("rendered");
        let dst_sum = crate::checksums::compute_file_checksum(dst, ChecksumAlgorithm::Blake3)
            .expect("hash dest");
        assert_eq!(item.source_checksum.as_ref(), Some(&dst_sum));
    }

    #[test]
    fn test_template_error_stops_job_without_rollback() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("card");
        write_media(&src.join("clip.mp4"), b"video");
        write_media(&src.join("still.jpg"), b"photo");
        let target = temp_dir.path().join("target");

        let templates = TemplateSet::default()
            .with_folder_template(MediaType::Video, "{type}")
            .with_folder_template(MediaType::Photo, "{nonexistent_token}")
            .with_filename_template("{stem}{ext}");
        let request = IngestRequest::new(vec![src], vec![target.clone()]).with_templates(templates);
        let mut job = create_job(request).expect("create");

        let recorder = RecordingCallback::default();
        let err = run_job(&mut job, Some(&recorder), &CancelToken::new()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Template);
        assert!(err.to_string().contains("nonexistent_token"));
        assert_eq!(job.state, JobState::Failed);
        assert!(job.failure.as_deref().unwrap().contains("nonexistent_token"));
        assert!(target.join("video/clip.mp4").exists(), "earlier copy stays");
        assert_eq!(job.items[1].state, ItemState::Failed);
        assert!(job.items[1].destination_path.is_none());
        assert_eq!(*recorder.job_completed.lock().unwrap(), Some(JobState::Failed));
        assert!(recorder.progress.lock().unwrap().iter().all(|(_, pct)| *pct < 100));
    }

    #[test]
    fn test_index_advances_per_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("card");
        write_media(&src.join("clip.mp4"), b"v");
        let targets = vec![temp_dir.path().join("a"), temp_dir.path().join("b")];

        let templates = TemplateSet::default()
            .with_folder_template(MediaType::Video, "")
            .with_filename_template("{index:03d}{ext}");
        let request = IngestRequest::new(vec![src], targets.clone()).with_templates(templates);
        let mut job = create_job(request).expect("create");
        run_job(&mut job, None, &CancelToken::new()).expect("run");

        assert!(targets[0].join("001.mp4").exists());
        assert!(targets[1].join("002.mp4").exists());
        assert_eq!(job.next_index, 3);
    }

    #[test]
    fn test_custom_tokens_are_applied() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("card");
        write_media(&src.join("take.wav"), b"a");
        let target = temp_dir.path().join("target");

        let templates = TemplateSet::default()
            .with_folder_template(MediaType::Audio, "{project}/{type}")
            .with_filename_template("{project}_{reel:02d}{ext}");
        let custom: TokenSet = [
            ("project", TokenValue::from("wedding")),
            ("reel", TokenValue::Int(4)),
        ]
        .into_iter()
        .collect();
        let request = IngestRequest::new(vec![src], vec![target.clone()])
            .with_templates(templates)
            .with_custom_tokens(custom);
        let mut job = create_job(request).expect("create");
        run_job(&mut job, None, &CancelToken::new()).expect("run");

        assert!(target.join("wedding/audio/wedding_04.wav").exists());
    }

    #[test]
    fn test_io_error_mid_job_keeps_earlier_copies() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("card");
        write_media(&src.join("a.mp4"), b"video");
        write_media(&src.join("b.jpg"), b"photo b");
        write_media(&src.join("c.jpg"), b"photo c");
        let target = temp_dir.path().join("target");
        fs::create_dir_all(&target).expect("Failed to create target");
        // Photos land under a path that is a regular file
        fs::write(target.join("blocked"), b"in the way").expect("Failed to write blocker");

        let templates = TemplateSet::default()
            .with_folder_template(MediaType::Video, "{type}")
            .with_folder_template(MediaType::Photo, "blocked")
            .with_filename_template("{stem}{ext}");
        let request =
            IngestRequest::new(vec![src], vec![target.clone()]).with_templates(templates);
        let mut job = create_job(request).expect("create");

        let recorder = RecordingCallback::default();
        let err = run_job(&mut job, Some(&recorder), &CancelToken::new()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CopyIo);
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(*recorder.job_completed.lock().unwrap(), Some(JobState::Failed));
        assert_eq!(fs::read(target.join("video/a.mp4")).expect("first copy kept"), b"video");

        let states: Vec<ItemState> = job.items.iter().map(|i| i.state).collect();
        assert_eq!(states, vec![ItemState::Done, ItemState::Failed, ItemState::Pending]);
        assert!(job.items[1].error_message.is_some());
    }

    #[test]
    fn test_destination_resolving_to_source_is_refused() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let card = temp_dir.path().join("card");
        write_media(&card.join("clip.mp4"), b"sixteen bytes!!!");

        let templates = TemplateSet::default()
            .with_folder_template(MediaType::Video, "")
            .with_filename_template("{stem}{ext}");
        let request = IngestRequest::new(vec![card.clone()], vec![card.clone()])
            .with_templates(templates)
            .with_verify(true);
        let mut job = create_job(request).expect("create");

        let err = run_job(&mut job, None, &CancelToken::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CopyIo);
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(fs::read(card.join("clip.mp4")).expect("source kept"), b"sixteen bytes!!!");
    }

    #[test]
    fn test_cancelled_job_fails_before_copying() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("card");
        write_media(&src.join("clip.mp4"), b"v");
        let target = temp_dir.path().join("target");

        let mut job =
            create_job(IngestRequest::new(vec![src], vec![target.clone()])).expect("create");
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = run_job(&mut job, None, &cancel).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(job.state, JobState::Failed);
        assert!(!target.exists());
    }

    #[test]
    fn test_run_job_twice_is_rejected() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("card");
        write_media(&src.join("clip.mp4"), b"v");

        let mut job = create_job(IngestRequest::new(vec![src], vec![temp_dir.path().join("t")]))
            .expect("create");
        run_job(&mut job, None, &CancelToken::new()).expect("first run");

        let err = run_job(&mut job, None, &CancelToken::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
