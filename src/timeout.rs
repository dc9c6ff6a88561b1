use crate::config::TimeoutConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Why a tracked job was expired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutReason {
    /// No heartbeat within the stall threshold
    Stall,
    /// Exceeded the maximum job duration
    Timeout,
}

impl TimeoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutReason::Stall => "stall",
            TimeoutReason::Timeout => "timeout",
        }
    }
}

/// Liveness state for one actively encoding job
#[derive(Debug, Clone, Copy)]
struct TrackedJob {
    last_heartbeat: Instant,
    started_at: Instant,
}

/// Callback invoked exactly once per expired job
pub type TimeoutCallback = Box<dyn Fn(&str, TimeoutReason) + Send + Sync>;

/// Detects stalled and runaway jobs independently of the encoder's own
/// error reporting.
///
/// Heartbeats reset the stall clock only; the max-duration clock runs
/// from `track_job` until the job is untracked.
pub struct TimeoutManager {
    jobs: Arc<Mutex<HashMap<String, TrackedJob>>>,
    callback: Arc<TimeoutCallback>,
    stall_threshold: Duration,
    max_job_duration: Duration,
    check_interval: Duration,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimeoutManager {
    pub fn new(config: &TimeoutConfig, callback: TimeoutCallback) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            callback: Arc::new(callback),
            stall_threshold: config.stall_threshold(),
            max_job_duration: config.max_job_duration(),
            check_interval: config.check_interval(),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Start the periodic sweep thread
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let jobs = Arc::clone(&self.jobs);
        let callback = Arc::clone(&self.callback);
        let running = Arc::clone(&self.running);
        let stall_threshold = self.stall_threshold;
        let max_job_duration = self.max_job_duration;
        let check_interval = self.check_interval;

        let handle = std::thread::Builder::new()
            .name("timeout-sweep".to_string())
            .spawn(move || {
                info!(
                    "Timeout manager started (stall {:?}, max duration {:?})",
                    stall_threshold, max_job_duration
                );
                while running.load(Ordering::SeqCst) {
                    // Sleep in short steps so shutdown is prompt
                    let mut slept = Duration::ZERO;
                    while slept < check_interval && running.load(Ordering::SeqCst) {
                        let step = (check_interval - slept).min(Duration::from_millis(100));
                        std::thread::sleep(step);
                        slept += step;
                    }
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }

                    let expired = {
                        let mut jobs = jobs.lock().expect("timeout map poisoned");
                        sweep(&mut jobs, Instant::now(), stall_threshold, max_job_duration)
                    };
                    for (job_id, reason) in expired {
                        warn!(job_id = %job_id, reason = reason.as_str(), "Job expired");
                        callback(&job_id, reason);
                    }
                }
            })
            .expect("failed to spawn timeout sweep thread");
        *self.handle.lock().expect("handle lock poisoned") = Some(handle);
    }

    /// Begin tracking a job that just entered encoding
    pub fn track_job(&self, job_id: &str) {
        let now = Instant::now();
        let mut jobs = self.jobs.lock().expect("timeout map poisoned");
        jobs.insert(
            job_id.to_string(),
            TrackedJob {
                last_heartbeat: now,
                started_at: now,
            },
        );
        debug!(job_id, "Tracking job liveness");
    }

    /// Stop tracking on completion, failure, or timeout
    pub fn untrack_job(&self, job_id: &str) {
        let mut jobs = self.jobs.lock().expect("timeout map poisoned");
        if jobs.remove(job_id).is_some() {
            debug!(job_id, "Stopped tracking job");
        }
    }

    /// Reset the stall clock. Heartbeats for untracked jobs are silently
    /// ignored; the max-duration clock is never reset.
    pub fn record_heartbeat(&self, job_id: &str) {
        let mut jobs = self.jobs.lock().expect("timeout map poisoned");
        if let Some(tracked) = jobs.get_mut(job_id) {
            tracked.last_heartbeat = Instant::now();
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.jobs.lock().expect("timeout map poisoned").len()
    }

    pub fn is_tracked(&self, job_id: &str) -> bool {
        self.jobs
            .lock()
            .expect("timeout map poisoned")
            .contains_key(job_id)
    }

    /// Run a single sweep immediately, outside the periodic cadence
    pub fn check_now(&self) {
        let expired = {
            let mut jobs = self.jobs.lock().expect("timeout map poisoned");
            sweep(
                &mut jobs,
                Instant::now(),
                self.stall_threshold,
                self.max_job_duration,
            )
        };
        for (job_id, reason) in expired {
            warn!(job_id = %job_id, reason = reason.as_str(), "Job expired");
            (self.callback)(&job_id, reason);
        }
    }

    /// Stop the sweep thread; tracked state is left in place
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.handle.lock().expect("handle lock poisoned").take() {
            let _ = handle.join();
        }
        info!("Timeout manager stopped");
    }
}

impl Drop for TimeoutManager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Collect and remove every job past its stall or duration threshold.
/// Removal happens here so each job expires at most once.
fn sweep(
    jobs: &mut HashMap<String, TrackedJob>,
    now: Instant,
    stall_threshold: Duration,
    max_job_duration: Duration,
) -> Vec<(String, TimeoutReason)> {
    let mut expired = Vec::new();
    for (job_id, tracked) in jobs.iter() {
        if now.duration_since(tracked.started_at) > max_job_duration {
            expired.push((job_id.clone(), TimeoutReason::Timeout));
        } else if now.duration_since(tracked.last_heartbeat) > stall_threshold {
            expired.push((job_id.clone(), TimeoutReason::Stall));
        }
    }
    for (job_id, _) in &expired {
        jobs.remove(job_id);
    }
    expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn tracked(now: Instant, heartbeat_age: Duration, job_age: Duration) -> TrackedJob {
        TrackedJob {
            last_heartbeat: now - heartbeat_age,
            started_at: now - job_age,
        }
    }

    #[test]
    fn sweep_expires_stalled_job_once() {
        let now = Instant::now();
        let mut jobs = HashMap::new();
        jobs.insert(
            "job-a".to_string(),
            tracked(now, Duration::from_secs(61), Duration::from_secs(61)),
        );

        let expired = sweep(
            &mut jobs,
            now,
            Duration::from_secs(60),
            Duration::from_secs(1800),
        );
        assert_eq!(expired, vec![("job-a".to_string(), TimeoutReason::Stall)]);
        assert!(jobs.is_empty());

        // Second sweep finds nothing
        let expired = sweep(
            &mut jobs,
            now,
            Duration::from_secs(60),
            Duration::from_secs(1800),
        );
        assert!(expired.is_empty());
    }

    #[test]
    fn sweep_leaves_live_job_alone() {
        let now = Instant::now();
        let mut jobs = HashMap::new();
        jobs.insert(
            "job-a".to_string(),
            tracked(now, Duration::from_secs(3), Duration::from_secs(120)),
        );

        let expired = sweep(
            &mut jobs,
            now,
            Duration::from_secs(60),
            Duration::from_secs(1800),
        );
        assert!(expired.is_empty());
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn heartbeat_does_not_reset_max_duration() {
        let now = Instant::now();
        let mut jobs = HashMap::new();
        // Fresh heartbeat, but the job has been running too long
        jobs.insert(
            "job-a".to_string(),
            tracked(now, Duration::from_secs(1), Duration::from_secs(1801)),
        );

        let expired = sweep(
            &mut jobs,
            now,
            Duration::from_secs(60),
            Duration::from_secs(1800),
        );
        assert_eq!(expired, vec![("job-a".to_string(), TimeoutReason::Timeout)]);
    }

    fn short_config() -> TimeoutConfig {
        TimeoutConfig {
            heartbeat_interval_secs: 1,
            stall_threshold_secs: 1,
            max_job_duration_secs: 60,
            check_interval_secs: 1,
        }
    }

    #[test]
    fn manager_fires_callback_exactly_once() {
        let (tx, rx) = mpsc::channel();
        let manager = TimeoutManager::new(
            &short_config(),
            Box::new(move |job_id, reason| {
                tx.send((job_id.to_string(), reason)).unwrap();
            }),
        );

        manager.track_job("job-a");
        std::thread::sleep(Duration::from_millis(1100));
        manager.check_now();

        let (job_id, reason) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(job_id, "job-a");
        assert_eq!(reason, TimeoutReason::Stall);
        assert!(!manager.is_tracked("job-a"));

        manager.check_now();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn heartbeat_keeps_job_tracked() {
        let (tx, rx) = mpsc::channel();
        let manager = TimeoutManager::new(
            &short_config(),
            Box::new(move |job_id, reason| {
                tx.send((job_id.to_string(), reason)).unwrap();
            }),
        );

        manager.track_job("job-a");
        std::thread::sleep(Duration::from_millis(600));
        manager.record_heartbeat("job-a");
        std::thread::sleep(Duration::from_millis(600));
        manager.check_now();

        assert!(rx.try_recv().is_err());
        assert!(manager.is_tracked("job-a"));
    }

    #[test]
    fn heartbeat_after_untrack_is_ignored() {
        let manager = TimeoutManager::new(&short_config(), Box::new(|_, _| {}));
        manager.track_job("job-a");
        manager.untrack_job("job-a");
        manager.record_heartbeat("job-a");
        assert!(!manager.is_tracked("job-a"));
        assert_eq!(manager.tracked_count(), 0);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let manager = TimeoutManager::new(&short_config(), Box::new(|_, _| {}));
        manager.start();
        manager.start();
        manager.stop();
        manager.stop();
    }
}
