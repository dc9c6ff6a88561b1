use crate::config::RenderConfig;
use crate::error::{Error, Result};
use crate::frames;
use crate::job::{JobSpec, JobStatus, RenderJob};
use crate::pool::{WorkerJob, WorkerMessage, WorkerPool};
use crate::store::JobStore;
use crate::timeout::{TimeoutManager, TimeoutReason};
use crate::verifier::{Expectations, OutputVerifier};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const EVENT_RECV_TIMEOUT: Duration = Duration::from_millis(250);
const SHUTDOWN_DRAIN_WAIT: Duration = Duration::from_secs(30);

/// What recovery did with the jobs found on disk at startup
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryReport {
    pub requeued: usize,
    pub failed: usize,
}

/// The orchestrator: accepts submissions, owns queued/active job state,
/// routes work through the worker pool, applies timeout and verification
/// results, and persists every transition.
///
/// All state transitions flow through one event loop, so no two writers
/// ever race on a single job. The store is the source of truth; the
/// in-memory map is a cache reconciled by `recover`.
pub struct RenderQueue {
    store: Arc<JobStore>,
    jobs: Mutex<HashMap<String, RenderJob>>,
    pool: WorkerPool,
    timeouts: TimeoutManager,
    verifier: Arc<dyn OutputVerifier>,
    pending_tx: Mutex<Option<SyncSender<String>>>,
    pending_rx: Mutex<Option<Receiver<String>>>,
    event_rx: Mutex<Option<Receiver<WorkerMessage>>>,
    accepting: AtomicBool,
    running: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    submission_timeout: Duration,
    duration_tolerance_secs: f64,
    crf: u8,
    min_frame_bytes: u64,
    max_age_hours: u64,
}

impl RenderQueue {
    /// Wire up the queue, pool, and timeout manager. Nothing is global;
    /// the caller owns the instance and passes it to whoever needs it.
    pub fn new(
        store: Arc<JobStore>,
        config: &RenderConfig,
        verifier: Arc<dyn OutputVerifier>,
    ) -> Arc<Self> {
        let (event_tx, event_rx) = mpsc::channel::<WorkerMessage>();

        let pool = WorkerPool::new(&config.workers, &config.timeouts, event_tx.clone());

        // Timeouts feed the same event loop as the workers: an expired
        // job is indistinguishable from a crashed one downstream
        let timeout_tx = event_tx;
        let timeouts = TimeoutManager::new(
            &config.timeouts,
            Box::new(move |job_id, reason| {
                let err = match reason {
                    TimeoutReason::Stall => "Encoding stalled: no heartbeat from worker",
                    TimeoutReason::Timeout => "Encoding exceeded maximum job duration",
                };
                let _ = timeout_tx.send(WorkerMessage::Error {
                    job_id: job_id.to_string(),
                    error: err.to_string(),
                });
            }),
        );

        let (pending_tx, pending_rx) = mpsc::sync_channel::<String>(config.workers.pending_capacity);

        Arc::new(Self {
            store,
            jobs: Mutex::new(HashMap::new()),
            pool,
            timeouts,
            verifier,
            pending_tx: Mutex::new(Some(pending_tx)),
            pending_rx: Mutex::new(Some(pending_rx)),
            event_rx: Mutex::new(Some(event_rx)),
            accepting: AtomicBool::new(true),
            running: Arc::new(AtomicBool::new(false)),
            threads: Mutex::new(Vec::new()),
            submission_timeout: Duration::from_secs(config.workers.submission_timeout_secs),
            duration_tolerance_secs: config.quality.duration_tolerance_secs,
            crf: config.quality.crf,
            min_frame_bytes: config.quality.min_frame_bytes,
            max_age_hours: config.retention.max_age_hours,
        })
    }

    /// Start the event loop, the dispatcher, and the timeout sweep
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.timeouts.start();

        let mut threads = self.threads.lock().expect("threads lock poisoned");

        let queue = Arc::clone(self);
        let event_rx = self
            .event_rx
            .lock()
            .expect("event_rx lock poisoned")
            .take()
            .expect("event loop already started");
        threads.push(
            std::thread::Builder::new()
                .name("queue-events".to_string())
                .spawn(move || queue.event_loop(event_rx))
                .expect("failed to spawn event loop"),
        );

        let queue = Arc::clone(self);
        let pending_rx = self
            .pending_rx
            .lock()
            .expect("pending_rx lock poisoned")
            .take()
            .expect("dispatcher already started");
        threads.push(
            std::thread::Builder::new()
                .name("queue-dispatch".to_string())
                .spawn(move || queue.dispatch_loop(pending_rx))
                .expect("failed to spawn dispatcher"),
        );

        info!("Render queue started");
    }

    /// Persist a new job as `queued` and hand it to the dispatcher.
    ///
    /// A full pending queue is backpressure: the submission is rejected
    /// rather than buffered without bound.
    pub fn submit(&self, spec: JobSpec) -> Result<String> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        // Corrupt uploads are rejected here; such a job must never reach
        // a worker
        let sizes = frames::validate_sizes(&spec.frames_dir, self.min_frame_bytes)?;
        if !sizes.valid {
            return Err(Error::Validation(format!(
                "{} undersized frame files in {}",
                sizes.undersized.len(),
                spec.frames_dir.display()
            )));
        }

        let job = RenderJob::new(spec);
        let job_id = job.job_id.clone();
        // A failed save must reject the submission outright
        self.store.save(&job)?;
        self.jobs
            .lock()
            .expect("jobs lock poisoned")
            .insert(job_id.clone(), job);

        let guard = self.pending_tx.lock().expect("pending_tx lock poisoned");
        let send_result = match guard.as_ref() {
            Some(tx) => tx.try_send(job_id.clone()),
            None => {
                self.discard_rejected(&job_id);
                return Err(Error::ShuttingDown);
            }
        };
        drop(guard);

        match send_result {
            Ok(()) => {
                info!(job_id = %job_id, "Job submitted");
                Ok(job_id)
            }
            Err(TrySendError::Full(_)) => {
                self.discard_rejected(&job_id);
                Err(Error::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.discard_rejected(&job_id);
                Err(Error::ShuttingDown)
            }
        }
    }

    fn discard_rejected(&self, job_id: &str) {
        self.jobs.lock().expect("jobs lock poisoned").remove(job_id);
        if let Err(e) = self.store.delete(job_id) {
            warn!(job_id, "Failed to remove rejected submission: {}", e);
        }
    }

    /// Snapshot of one job's current state
    pub fn job(&self, job_id: &str) -> Option<RenderJob> {
        self.jobs
            .lock()
            .expect("jobs lock poisoned")
            .get(job_id)
            .cloned()
    }

    /// Snapshot of all known jobs
    pub fn list_jobs(&self) -> Vec<RenderJob> {
        self.jobs
            .lock()
            .expect("jobs lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Reconcile in-memory state with the store after a restart.
    ///
    /// Jobs found `encoding` were interrupted mid-render and cannot be
    /// resumed, so they are failed; `queued` jobs are re-enqueued.
    /// Requires `start` to have been called so the dispatcher drains the
    /// pending queue.
    pub fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        for mut job in self.store.list()? {
            match job.status {
                JobStatus::Complete | JobStatus::Failed => {
                    self.jobs
                        .lock()
                        .expect("jobs lock poisoned")
                        .insert(job.job_id.clone(), job);
                }
                JobStatus::Encoding => {
                    warn!(job_id = %job.job_id, "Failing job interrupted by restart");
                    job.status = JobStatus::Failed;
                    job.error = Some("Encoding interrupted by server restart".to_string());
                    self.store.save(&job)?;
                    self.jobs
                        .lock()
                        .expect("jobs lock poisoned")
                        .insert(job.job_id.clone(), job);
                    report.failed += 1;
                }
                JobStatus::Queued => {
                    let job_id = job.job_id.clone();
                    self.jobs
                        .lock()
                        .expect("jobs lock poisoned")
                        .insert(job_id.clone(), job);
                    let guard = self.pending_tx.lock().expect("pending_tx lock poisoned");
                    if let Some(tx) = guard.as_ref() {
                        if tx.send(job_id.clone()).is_ok() {
                            report.requeued += 1;
                        }
                    }
                }
            }
        }
        if report.requeued > 0 || report.failed > 0 {
            info!(
                "Recovery: re-queued {} jobs, failed {} interrupted jobs",
                report.requeued, report.failed
            );
        }
        Ok(report)
    }

    /// Drop terminal jobs older than the retention threshold, on disk
    /// and in the cache
    pub fn cleanup_old(&self) -> Result<usize> {
        let removed = self.store.cleanup_old(self.max_age_hours)?;
        let max_age = self.max_age_hours as f64;
        self.jobs
            .lock()
            .expect("jobs lock poisoned")
            .retain(|_, job| !(job.is_terminal() && job.age_hours() > max_age));
        Ok(removed)
    }

    /// Stop accepting submissions, drain workers, stop the sweeps
    pub fn shutdown(&self) {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Render queue shutting down");
        // Dispatcher exits once the pending side is closed
        self.pending_tx.lock().expect("pending_tx lock poisoned").take();
        self.timeouts.stop();
        // In-flight renders get a grace period before being cancelled
        self.pool.shutdown(SHUTDOWN_DRAIN_WAIT);
        self.running.store(false, Ordering::SeqCst);
        let threads = std::mem::take(&mut *self.threads.lock().expect("threads lock poisoned"));
        for handle in threads {
            let _ = handle.join();
        }
        info!("Render queue stopped");
    }

    // Event plumbing

    fn event_loop(&self, events: Receiver<WorkerMessage>) {
        loop {
            match events.recv_timeout(EVENT_RECV_TIMEOUT) {
                Ok(message) => self.handle_message(message),
                Err(RecvTimeoutError::Timeout) => {
                    if !self.running.load(Ordering::SeqCst) {
                        // Drain whatever arrived during shutdown
                        while let Ok(message) = events.try_recv() {
                            self.handle_message(message);
                        }
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("Event loop exiting");
    }

    fn handle_message(&self, message: WorkerMessage) {
        let result = match message {
            WorkerMessage::Progress {
                job_id,
                progress,
                current_frame,
            } => self.update_progress(&job_id, progress, current_frame),
            WorkerMessage::Heartbeat { job_id } => {
                self.record_heartbeat(&job_id);
                Ok(())
            }
            WorkerMessage::Complete {
                job_id,
                output_path,
                output_size,
            } => self.handle_complete(&job_id, output_path, output_size),
            WorkerMessage::Error { job_id, error } => self.handle_job_error(&job_id, &error),
        };
        if let Err(e) = result {
            // Store failures here are infra errors; the job's own error
            // field is only touched by its own failure path
            error!("Failed to apply worker event: {}", e);
        }
    }

    fn dispatch_loop(&self, pending: Receiver<String>) {
        for job_id in pending.iter() {
            self.dispatch(&job_id);
        }
        debug!("Dispatcher exiting");
    }

    /// Hand one queued job to the pool, blocking until a worker frees up
    fn dispatch(&self, job_id: &str) {
        let Some(job) = self.job(job_id) else {
            debug!(job_id, "Pending job vanished before dispatch");
            return;
        };
        if job.status != JobStatus::Queued {
            return;
        }

        let worker_job = WorkerJob {
            job_id: job.job_id.clone(),
            frames_dir: job.frames_dir.clone(),
            audio_path: job.audio_path.clone(),
            output_path: job.target_path.clone(),
            fps: job.fps,
            total_frames: job.total_frames,
            crf: self.crf,
        };

        loop {
            if !self.accepting.load(Ordering::SeqCst) {
                // Leave the job queued; recovery re-enqueues it next run
                return;
            }
            match self.pool.submit(worker_job.clone(), self.submission_timeout) {
                Ok(()) => {
                    self.mark_encoding(job_id);
                    return;
                }
                Err(Error::PoolBusy(timeout)) => {
                    debug!(job_id, "All workers busy for {:?}, still waiting", timeout);
                }
                Err(e) => {
                    warn!(job_id, "Dispatch failed: {}", e);
                    let _ = self.handle_job_error(job_id, &format!("dispatch failed: {}", e));
                    return;
                }
            }
        }
    }

    // State transitions; every persisted mutation happens under the jobs
    // lock so disk order matches memory order

    fn mark_encoding(&self, job_id: &str) {
        let mut jobs = self.jobs.lock().expect("jobs lock poisoned");
        let Some(job) = jobs.get_mut(job_id) else {
            return;
        };
        if job.status != JobStatus::Queued {
            return;
        }
        job.status = JobStatus::Encoding;
        if let Err(e) = self.store.save(job) {
            // Disk still says queued; continuing would let the two
            // diverge. Stop the worker and fail the job instead.
            error!(job_id, "Failed to persist encoding transition: {}", e);
            self.pool.cancel_job(job_id);
            job.status = JobStatus::Failed;
            job.error = Some(format!("failed to persist encoding transition: {}", e));
            if let Err(e) = self.store.save(job) {
                error!(job_id, "Failed to persist failure after store error: {}", e);
            }
            return;
        }
        self.timeouts.track_job(job_id);
        info!(job_id, "Job handed to worker");
    }

    /// Apply a progress report. Valid only while `encoding`; late,
    /// duplicate, or regressing reports are logged and dropped.
    pub fn update_progress(
        &self,
        job_id: &str,
        progress: u8,
        current_frame: Option<u32>,
    ) -> Result<()> {
        let mut jobs = self.jobs.lock().expect("jobs lock poisoned");
        let Some(job) = jobs.get_mut(job_id) else {
            debug!(job_id, "Progress for unknown job ignored");
            return Ok(());
        };
        if job.status != JobStatus::Encoding {
            debug!(job_id, status = %job.status, "Progress for non-encoding job ignored");
            return Ok(());
        }
        let progress = progress.min(100);
        if progress < job.progress {
            debug!(
                job_id,
                from = job.progress,
                to = progress,
                "Regressing progress ignored"
            );
            return Ok(());
        }
        job.progress = progress;
        if current_frame.is_some() {
            job.current_frame = current_frame;
        }
        self.store.save(job)
    }

    /// Forward a liveness signal. Heartbeats never mutate persisted
    /// state.
    pub fn record_heartbeat(&self, job_id: &str) {
        let jobs = self.jobs.lock().expect("jobs lock poisoned");
        match jobs.get(job_id) {
            Some(job) if job.status == JobStatus::Encoding => {
                self.timeouts.record_heartbeat(job_id);
            }
            _ => debug!(job_id, "Heartbeat for inactive job ignored"),
        }
    }

    /// A worker reported COMPLETE. The output is verified before the job
    /// may become terminal; a failed verification forces `failed` even
    /// though the encoder claimed success.
    pub fn handle_complete(
        &self,
        job_id: &str,
        output_path: PathBuf,
        output_size: u64,
    ) -> Result<()> {
        let expectations = {
            let jobs = self.jobs.lock().expect("jobs lock poisoned");
            let Some(job) = jobs.get(job_id) else {
                warn!(job_id, "COMPLETE for unknown job ignored");
                return Ok(());
            };
            if job.is_terminal() {
                debug!(job_id, "COMPLETE for terminal job ignored");
                return Ok(());
            }
            Expectations {
                fps: job.fps,
                total_frames: job.total_frames,
                require_audio: job.audio_path.is_some(),
                duration_tolerance_secs: self.duration_tolerance_secs,
            }
        };

        // Never trust the encoder's self-report
        let report = self.verifier.verify(&output_path, &expectations);

        let mut jobs = self.jobs.lock().expect("jobs lock poisoned");
        let Some(job) = jobs.get_mut(job_id) else {
            return Ok(());
        };
        if job.is_terminal() {
            return Ok(());
        }
        self.timeouts.untrack_job(job_id);

        if report.passed {
            job.status = JobStatus::Complete;
            job.progress = 100;
            job.current_frame = None;
            job.output_path = Some(output_path);
            job.output_size = Some(output_size);
            job.error = None;
            self.store.save(job)?;
            info!(job_id, output_size, "Job complete");
        } else {
            let detail = report.errors.join("; ");
            job.status = JobStatus::Failed;
            job.error = Some(format!("quality verification failed: {}", detail));
            self.store.save(job)?;
            warn!(job_id, "Output failed verification: {}", detail);
        }
        Ok(())
    }

    /// Force a job to `failed`: worker errors, crashes, stalls, and
    /// overruns all land here. Idempotent for terminal jobs.
    pub fn handle_job_error(&self, job_id: &str, err: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().expect("jobs lock poisoned");
        let Some(job) = jobs.get_mut(job_id) else {
            warn!(job_id, "Error for unknown job ignored: {}", err);
            return Ok(());
        };
        if job.is_terminal() {
            debug!(job_id, "Error for terminal job ignored: {}", err);
            return Ok(());
        }
        self.timeouts.untrack_job(job_id);
        // Stop the worker if one is still on this job
        self.pool.cancel_job(job_id);

        job.status = JobStatus::Failed;
        job.error = Some(err.to_string());
        self.store.save(job)?;
        warn!(job_id, "Job failed: {}", err);
        Ok(())
    }

    /// Cancel a job by request. Queued jobs are skipped by the
    /// dispatcher once failed; encoding jobs get their worker's render
    /// killed.
    pub fn cancel(&self, job_id: &str) -> Result<()> {
        if self.job(job_id).is_none() {
            return Err(Error::UnknownJob(job_id.to_string()));
        }
        self.handle_job_error(job_id, "Cancelled by request")
    }

    #[cfg(test)]
    fn is_tracked(&self, job_id: &str) -> bool {
        self.timeouts.is_tracked(job_id)
    }
}
