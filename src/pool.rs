use crate::config::{TimeoutConfig, WorkerConfig};
use crate::encoder::{self, Encoder, RenderParams};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const FFMPEG_BIN: &str = "ffmpeg";
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const IDLE_RECV_TIMEOUT: Duration = Duration::from_millis(250);
const SUBMIT_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Messages sent from workers to the queue's single event loop
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// Progress update for a job
    Progress {
        job_id: String,
        progress: u8,
        current_frame: Option<u32>,
    },
    /// Liveness signal while encoding
    Heartbeat { job_id: String },
    /// The worker finished and produced an output file
    Complete {
        job_id: String,
        output_path: PathBuf,
        output_size: u64,
    },
    /// The worker failed, crashed, or was cancelled
    Error { job_id: String, error: String },
}

/// Data a worker needs to render one job
#[derive(Debug, Clone)]
pub struct WorkerJob {
    pub job_id: String,
    pub frames_dir: PathBuf,
    pub audio_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub fps: u32,
    pub total_frames: u32,
    pub crf: u8,
}

enum RenderOutcome {
    Complete { output_size: u64 },
    Cancelled,
    Failed(String),
}

/// A bounded set of render workers, each handling at most one job at a
/// time. Submission uses a rendezvous channel, so a job is accepted only
/// when a worker is actually idle.
pub struct WorkerPool {
    job_tx: Mutex<Option<SyncSender<WorkerJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
    cancels: Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>,
    active_hw: Arc<AtomicUsize>,
    worker_count: usize,
}

impl WorkerPool {
    /// Spawn the configured number of workers. Events flow to `events`;
    /// the queue is the sole subscriber.
    pub fn new(
        config: &WorkerConfig,
        timeouts: &TimeoutConfig,
        events: Sender<WorkerMessage>,
    ) -> Self {
        let worker_count = effective_worker_count(config.count, encoder::detect_encoders());
        let (job_tx, job_rx) = mpsc::sync_channel::<WorkerJob>(0);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let shutdown = Arc::new(AtomicBool::new(false));
        let cancels: Arc<Mutex<HashMap<String, Arc<AtomicBool>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let active_hw = Arc::new(AtomicUsize::new(0));
        let heartbeat_interval = timeouts.heartbeat_interval();

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = Arc::clone(&job_rx);
            let events = events.clone();
            let shutdown = Arc::clone(&shutdown);
            let cancels = Arc::clone(&cancels);
            let active_hw = Arc::clone(&active_hw);
            let handle = std::thread::Builder::new()
                .name(format!("render-worker-{}", worker_id))
                .spawn(move || {
                    worker_loop(
                        worker_id,
                        job_rx,
                        events,
                        shutdown,
                        cancels,
                        active_hw,
                        heartbeat_interval,
                    )
                })
                .expect("failed to spawn render worker");
            workers.push(handle);
        }

        info!("Worker pool started with {} workers", worker_count);
        Self {
            job_tx: Mutex::new(Some(job_tx)),
            workers: Mutex::new(workers),
            shutdown,
            cancels,
            active_hw,
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Hand a job to an idle worker, waiting up to `timeout`.
    ///
    /// A full pool within the timeout is backpressure: the caller should
    /// reject or delay rather than queue unboundedly.
    pub fn submit(&self, job: WorkerJob, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        // Clone the sender out of the guard; a submit waiting for an idle
        // worker must not hold the lock shutdown needs
        let tx = {
            let guard = self.job_tx.lock().expect("job_tx lock poisoned");
            match guard.as_ref() {
                Some(tx) => tx.clone(),
                None => return Err(Error::ShuttingDown),
            }
        };

        let mut job = job;
        loop {
            match tx.try_send(job) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(returned)) => {
                    if Instant::now() >= deadline {
                        return Err(Error::PoolBusy(timeout));
                    }
                    job = returned;
                    std::thread::sleep(SUBMIT_RETRY_INTERVAL);
                }
                Err(TrySendError::Disconnected(_)) => return Err(Error::ShuttingDown),
            }
        }
    }

    /// Ask the worker rendering `job_id` to stop and kill its encoder
    /// process. Idempotent; unknown or finished jobs are a no-op.
    pub fn cancel_job(&self, job_id: &str) -> bool {
        let cancels = self.cancels.lock().expect("cancel map poisoned");
        match cancels.get(job_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Stop all workers: drain gracefully up to `wait`, then cancel
    /// whatever is still running.
    pub fn shutdown(&self, wait: Duration) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down worker pool");
        // Closing the submit side wakes idle workers
        self.job_tx.lock().expect("job_tx lock poisoned").take();

        let deadline = Instant::now() + wait;
        let workers = std::mem::take(&mut *self.workers.lock().expect("workers lock poisoned"));
        for handle in workers {
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(50));
            }
            if !handle.is_finished() {
                warn!("Worker still busy at shutdown deadline; cancelling its job");
                for flag in self.cancels.lock().expect("cancel map poisoned").values() {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            let _ = handle.join();
        }
        info!("Worker pool stopped");
    }
}

/// Bound worker count by CPU count and by the hardware encoder session
/// ceiling, whichever is smaller.
fn effective_worker_count(requested: usize, available: &[Encoder]) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let mut count = if requested == 0 {
        cpus
    } else {
        requested.min(cpus)
    };
    if let Some(cap) = available
        .iter()
        .filter(|e| e.is_hardware())
        .filter_map(|e| e.max_sessions())
        .min()
    {
        count = count.min(cap);
    }
    count.max(1)
}

fn worker_loop(
    worker_id: usize,
    job_rx: Arc<Mutex<Receiver<WorkerJob>>>,
    events: Sender<WorkerMessage>,
    shutdown: Arc<AtomicBool>,
    cancels: Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>,
    active_hw: Arc<AtomicUsize>,
    heartbeat_interval: Duration,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let job = {
            let rx = job_rx.lock().expect("job receiver poisoned");
            rx.recv_timeout(IDLE_RECV_TIMEOUT)
        };
        let job = match job {
            Ok(job) => job,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        run_job(
            worker_id,
            job,
            &events,
            &cancels,
            &active_hw,
            heartbeat_interval,
        );
    }
    debug!(worker_id, "Worker exiting");
}

fn run_job(
    worker_id: usize,
    job: WorkerJob,
    events: &Sender<WorkerMessage>,
    cancels: &Mutex<HashMap<String, Arc<AtomicBool>>>,
    active_hw: &AtomicUsize,
    heartbeat_interval: Duration,
) {
    run_job_with(
        worker_id,
        job,
        events,
        cancels,
        active_hw,
        heartbeat_interval,
        render,
    )
}

fn run_job_with<F>(
    worker_id: usize,
    job: WorkerJob,
    events: &Sender<WorkerMessage>,
    cancels: &Mutex<HashMap<String, Arc<AtomicBool>>>,
    active_hw: &AtomicUsize,
    heartbeat_interval: Duration,
    render_fn: F,
) where
    F: FnOnce(
        &WorkerJob,
        Encoder,
        &str,
        &AtomicBool,
        &Sender<WorkerMessage>,
        Duration,
    ) -> RenderOutcome,
{
    let cancel = Arc::new(AtomicBool::new(false));
    cancels
        .lock()
        .expect("cancel map poisoned")
        .insert(job.job_id.clone(), Arc::clone(&cancel));

    // Encoder choice is re-evaluated per job since hardware slots come
    // and go
    let chosen = encoder::select_encoder(
        encoder::detect_encoders(),
        active_hw.load(Ordering::SeqCst),
    );
    let is_hw = chosen.is_hardware();
    if is_hw {
        active_hw.fetch_add(1, Ordering::SeqCst);
    }
    info!(worker_id, job_id = %job.job_id, encoder = %chosen, "Starting render");

    // A panic inside the render stage must not kill the worker thread:
    // the pool would silently shrink and the job would only be rescued
    // by the stall sweep. Contain it and report a plain failure.
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        render_fn(&job, chosen, FFMPEG_BIN, &cancel, events, heartbeat_interval)
    }))
    .unwrap_or_else(|_| {
        warn!(worker_id, job_id = %job.job_id, "Worker panicked during render");
        RenderOutcome::Failed("worker crashed during render".to_string())
    });

    if is_hw {
        active_hw.fetch_sub(1, Ordering::SeqCst);
    }
    cancels
        .lock()
        .expect("cancel map poisoned")
        .remove(&job.job_id);

    match outcome {
        RenderOutcome::Complete { output_size } => {
            let _ = events.send(WorkerMessage::Complete {
                job_id: job.job_id,
                output_path: job.output_path,
                output_size,
            });
        }
        RenderOutcome::Cancelled => {
            // The queue already decided this job's fate; a late error for
            // a terminal job is ignored there
            let _ = events.send(WorkerMessage::Error {
                job_id: job.job_id,
                error: "render cancelled".to_string(),
            });
        }
        RenderOutcome::Failed(error) => {
            let _ = events.send(WorkerMessage::Error {
                job_id: job.job_id,
                error,
            });
        }
    }
}

/// Run one FFmpeg render, relaying progress and heartbeats while it runs
fn render(
    job: &WorkerJob,
    chosen: Encoder,
    ffmpeg_bin: &str,
    cancel: &AtomicBool,
    events: &Sender<WorkerMessage>,
    heartbeat_interval: Duration,
) -> RenderOutcome {
    let params = RenderParams {
        frames_dir: job.frames_dir.clone(),
        audio_path: job.audio_path.clone(),
        output: job.output_path.clone(),
        fps: job.fps,
        encoder: chosen,
        crf: job.crf,
    };
    let mut args = encoder::build_ffmpeg_args(&params);

    let progress_file = std::env::temp_dir().join(format!("ffmpeg_progress_{}", job.job_id));
    if std::fs::File::create(&progress_file).is_err() {
        return RenderOutcome::Failed("Failed to create progress file".to_string());
    }
    // Insert progress args after -nostdin
    args.insert(2, "-progress".to_string());
    args.insert(3, progress_file.to_string_lossy().to_string());

    let mut child = match Command::new(ffmpeg_bin)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            let _ = std::fs::remove_file(&progress_file);
            return RenderOutcome::Failed(format!("Failed to start ffmpeg: {}", e));
        }
    };

    let result = run_render_loop(
        &mut child,
        &progress_file,
        job,
        cancel,
        events,
        heartbeat_interval,
    );
    let _ = std::fs::remove_file(&progress_file);
    result
}

fn run_render_loop(
    child: &mut Child,
    progress_file: &std::path::Path,
    job: &WorkerJob,
    cancel: &AtomicBool,
    events: &Sender<WorkerMessage>,
    heartbeat_interval: Duration,
) -> RenderOutcome {
    let expected_duration = if job.fps > 0 {
        job.total_frames as f64 / job.fps as f64
    } else {
        0.0
    };
    let mut last_progress: u8 = 0;
    let mut last_heartbeat = Instant::now();

    loop {
        if cancel.load(Ordering::SeqCst) {
            let _ = child.kill();
            let _ = child.wait();
            let _ = std::fs::remove_file(&job.output_path);
            return RenderOutcome::Cancelled;
        }

        if let Ok(content) = std::fs::read_to_string(progress_file) {
            let (time_us, frame) = parse_progress(&content);
            if let Some(time_us) = time_us {
                if expected_duration > 0.0 {
                    let secs = time_us / 1_000_000.0;
                    // Hold at 99 until COMPLETE; the queue pins 100
                    let progress = ((secs / expected_duration) * 100.0).min(99.0) as u8;
                    if progress > last_progress {
                        last_progress = progress;
                        let _ = events.send(WorkerMessage::Progress {
                            job_id: job.job_id.clone(),
                            progress,
                            current_frame: frame,
                        });
                    }
                }
            }
        }

        if last_heartbeat.elapsed() >= heartbeat_interval {
            last_heartbeat = Instant::now();
            let _ = events.send(WorkerMessage::Heartbeat {
                job_id: job.job_id.clone(),
            });
        }

        match child.try_wait() {
            Ok(Some(status)) if status.success() => {
                return match std::fs::metadata(&job.output_path) {
                    Ok(meta) if meta.len() > 0 => RenderOutcome::Complete {
                        output_size: meta.len(),
                    },
                    _ => RenderOutcome::Failed(
                        "ffmpeg reported success but output is missing or empty".to_string(),
                    ),
                };
            }
            Ok(Some(status)) => {
                let stderr_tail = read_stderr_tail(child);
                let _ = std::fs::remove_file(&job.output_path);
                let error = if stderr_tail.is_empty() {
                    // A killed encoder process surfaces here as a
                    // signal-terminated status with no clean error output
                    format!("ffmpeg exited abnormally with status: {}", status)
                } else {
                    format!("ffmpeg failed: {}", stderr_tail)
                };
                return RenderOutcome::Failed(error);
            }
            Ok(None) => {
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                return RenderOutcome::Failed(format!("Failed to check ffmpeg status: {}", e));
            }
        }
    }
}

/// Pull the latest `out_time_us` and `frame` values from an FFmpeg
/// progress file
fn parse_progress(content: &str) -> (Option<f64>, Option<u32>) {
    let mut latest_time_us = None;
    let mut latest_frame = None;
    for line in content.lines() {
        if let Some(value) = line.strip_prefix("out_time_us=") {
            if let Ok(time_us) = value.trim().parse::<f64>() {
                if time_us > 0.0 {
                    latest_time_us = Some(time_us);
                }
            }
        } else if let Some(value) = line.strip_prefix("frame=") {
            if let Ok(frame) = value.trim().parse::<u32>() {
                latest_frame = Some(frame);
            }
        }
    }
    (latest_time_us, latest_frame)
}

fn read_stderr_tail(child: &mut Child) -> String {
    let stderr = child
        .stderr
        .take()
        .and_then(|mut s| {
            use std::io::Read;
            let mut buf = String::new();
            s.read_to_string(&mut buf).ok()?;
            Some(buf)
        })
        .unwrap_or_default();
    let last_lines: Vec<&str> = stderr.lines().rev().take(5).collect();
    last_lines.into_iter().rev().collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job(dir: &std::path::Path) -> WorkerJob {
        WorkerJob {
            job_id: "test-job".to_string(),
            frames_dir: dir.join("frames"),
            audio_path: None,
            output_path: dir.join("out.mp4"),
            fps: 24,
            total_frames: 48,
            crf: 23,
        }
    }

    #[test]
    fn worker_count_defaults_to_cpus() {
        let cpus = std::thread::available_parallelism().unwrap().get();
        assert_eq!(effective_worker_count(0, &[Encoder::X264]), cpus);
    }

    #[test]
    fn worker_count_clamped_by_request_and_hardware_cap() {
        assert_eq!(effective_worker_count(1, &[Encoder::X264]), 1);
        // Hardware session ceiling wins over a larger request
        let with_hw = [Encoder::Nvenc, Encoder::X264];
        assert!(effective_worker_count(16, &with_hw) <= 2);
        assert!(effective_worker_count(0, &[Encoder::X264]) >= 1);
    }

    #[test]
    fn parse_progress_picks_latest_values() {
        let content = "frame=10\nout_time_us=1000000\nframe=20\nout_time_us=2000000\n";
        let (time_us, frame) = parse_progress(content);
        assert_eq!(time_us, Some(2_000_000.0));
        assert_eq!(frame, Some(20));
    }

    #[test]
    fn parse_progress_handles_garbage() {
        let (time_us, frame) = parse_progress("out_time_us=N/A\nframe=abc\n");
        assert_eq!(time_us, None);
        assert_eq!(frame, None);
    }

    #[test]
    fn render_fails_when_encoder_binary_fails() {
        let dir = tempfile::tempdir().unwrap();
        let job = test_job(dir.path());
        let (tx, _rx) = mpsc::channel();
        let cancel = AtomicBool::new(false);

        // `false` accepts any args and exits non-zero, standing in for a
        // crashed encoder process
        let outcome = render(
            &job,
            Encoder::X264,
            "false",
            &cancel,
            &tx,
            Duration::from_secs(5),
        );
        match outcome {
            RenderOutcome::Failed(message) => {
                assert!(message.contains("status"), "unexpected: {}", message)
            }
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn render_fails_when_binary_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let job = test_job(dir.path());
        let (tx, _rx) = mpsc::channel();
        let cancel = AtomicBool::new(false);

        let outcome = render(
            &job,
            Encoder::X264,
            "/nonexistent/ffmpeg",
            &cancel,
            &tx,
            Duration::from_secs(5),
        );
        match outcome {
            RenderOutcome::Failed(message) => {
                assert!(message.contains("Failed to start"), "unexpected: {}", message)
            }
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn render_trusts_exit_status_only_with_output_present() {
        let dir = tempfile::tempdir().unwrap();
        let job = test_job(dir.path());
        let (tx, _rx) = mpsc::channel();
        let cancel = AtomicBool::new(false);

        // `true` exits zero without writing anything
        let outcome = render(
            &job,
            Encoder::X264,
            "true",
            &cancel,
            &tx,
            Duration::from_secs(5),
        );
        match outcome {
            RenderOutcome::Failed(message) => {
                assert!(message.contains("missing or empty"), "unexpected: {}", message)
            }
            _ => panic!("expected failure"),
        }

        // With a non-empty output file the success report is accepted
        std::fs::write(&job.output_path, b"fake video bytes").unwrap();
        let outcome = render(
            &job,
            Encoder::X264,
            "true",
            &cancel,
            &tx,
            Duration::from_secs(5),
        );
        match outcome {
            RenderOutcome::Complete { output_size } => assert_eq!(output_size, 16),
            _ => panic!("expected completion"),
        }
    }

    #[test]
    fn cancelled_render_kills_child_and_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let job = test_job(dir.path());
        std::fs::write(&job.output_path, b"partial").unwrap();
        let (tx, _rx) = mpsc::channel();
        let cancel = AtomicBool::new(true);

        // `sleep` would run long; cancellation must kill it immediately.
        // It exits quickly on bad args anyway, but the cancel branch runs
        // first in the loop.
        let outcome = render(
            &job,
            Encoder::X264,
            "sleep",
            &cancel,
            &tx,
            Duration::from_secs(5),
        );
        assert!(matches!(outcome, RenderOutcome::Cancelled));
        assert!(!job.output_path.exists());
    }

    #[test]
    fn cancel_unknown_job_is_a_noop() {
        let (tx, _rx) = mpsc::channel();
        let pool = WorkerPool::new(
            &WorkerConfig {
                count: 1,
                pending_capacity: 4,
                submission_timeout_secs: 1,
            },
            &TimeoutConfig::default(),
            tx,
        );
        assert!(!pool.cancel_job("never-submitted"));
        pool.shutdown(Duration::from_secs(2));
    }

    #[test]
    fn failed_worker_job_surfaces_as_error_message() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel();
        let pool = WorkerPool::new(
            &WorkerConfig {
                count: 1,
                pending_capacity: 4,
                submission_timeout_secs: 5,
            },
            &TimeoutConfig::default(),
            tx,
        );

        // Frames directory does not exist, so the render fails no matter
        // whether ffmpeg is installed; the pool must still report ERROR
        // rather than leaving the job silently stuck
        let job = test_job(dir.path());
        pool.submit(job, Duration::from_secs(5)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(30);
        let mut saw_error = false;
        while Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_secs(1)) {
                Ok(WorkerMessage::Error { job_id, .. }) => {
                    assert_eq!(job_id, "test-job");
                    saw_error = true;
                    break;
                }
                Ok(_) => continue,
                Err(_) => continue,
            }
        }
        assert!(saw_error, "no error message received for failing job");
        pool.shutdown(Duration::from_secs(2));
    }

    #[test]
    fn panicking_render_reports_error_and_leaves_pool_state_clean() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel();
        let cancels = Mutex::new(HashMap::new());
        let active_hw = AtomicUsize::new(0);

        run_job_with(
            0,
            test_job(dir.path()),
            &tx,
            &cancels,
            &active_hw,
            Duration::from_secs(5),
            |_, _, _, _, _, _| -> RenderOutcome { panic!("render stage blew up") },
        );

        // The panic is contained: an error message still flows to the
        // queue and the per-job bookkeeping is released
        match rx.recv_timeout(Duration::from_secs(1)).unwrap() {
            WorkerMessage::Error { job_id, error } => {
                assert_eq!(job_id, "test-job");
                assert!(error.contains("crashed"), "unexpected: {}", error);
            }
            other => panic!("expected error message, got {:?}", other),
        }
        assert!(cancels.lock().unwrap().is_empty());
        assert_eq!(active_hw.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_is_not_blocked_by_waiting_submit() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel();
        let pool = Arc::new(WorkerPool::new(
            &WorkerConfig {
                count: 1,
                pending_capacity: 4,
                submission_timeout_secs: 5,
            },
            &TimeoutConfig::default(),
            tx,
        ));

        let submitter = {
            let pool = Arc::clone(&pool);
            let template = test_job(dir.path());
            std::thread::spawn(move || {
                // Keep submits in flight while shutdown runs; they stop
                // once the pool reports it is shutting down
                for i in 0..50 {
                    let mut job = template.clone();
                    job.job_id = format!("job-{}", i);
                    if pool.submit(job, Duration::from_secs(5)).is_err() {
                        break;
                    }
                }
            })
        };

        std::thread::sleep(Duration::from_millis(100));
        let started = Instant::now();
        pool.shutdown(Duration::from_secs(10));
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "shutdown blocked behind a waiting submit"
        );
        let _ = submitter.join();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (tx, _rx) = mpsc::channel();
        let pool = WorkerPool::new(
            &WorkerConfig {
                count: 1,
                pending_capacity: 4,
                submission_timeout_secs: 1,
            },
            &TimeoutConfig::default(),
            tx,
        );
        pool.shutdown(Duration::from_secs(1));
        pool.shutdown(Duration::from_secs(1));
    }
}
