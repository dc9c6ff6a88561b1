use crate::error::Result;
use crate::job::RenderJob;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Durable on-disk store: one JSON document per job.
///
/// The store is the single source of truth for job state; the in-memory
/// map held by the queue is a cache reconciled against it at startup.
pub struct JobStore {
    dir: PathBuf,
}

/// Strip anything but alphanumerics, `_` and `-` so a job id can never
/// escape the jobs directory.
pub fn sanitize_job_id(job_id: &str) -> String {
    job_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

impl JobStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_job_id(job_id)))
    }

    /// Serialize and atomically overwrite the job's file.
    ///
    /// A failed save must surface to the caller: silently diverging from
    /// disk is worse than a rejected write.
    pub fn save(&self, job: &RenderJob) -> Result<()> {
        let json = serde_json::to_vec_pretty(job)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.job_path(&job.job_id))
            .map_err(|e| e.error)?;
        debug!(job_id = %job.job_id, status = %job.status, "Saved job");
        Ok(())
    }

    /// Load a job; `None` if no file exists for the id
    pub fn load(&self, job_id: &str) -> Result<Option<RenderJob>> {
        let content = match std::fs::read_to_string(self.job_path(job_id)) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Remove a job file; already-missing files are a no-op
    pub fn delete(&self, job_id: &str) -> Result<()> {
        match std::fs::remove_file(self.job_path(job_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Enumerate all persisted jobs.
    ///
    /// Unreadable individual files are logged and skipped so one corrupt
    /// document cannot block recovery or cleanup.
    pub fn list(&self) -> Result<Vec<RenderJob>> {
        let mut jobs = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|c| serde_json::from_str::<RenderJob>(&c).map_err(|e| e.to_string()))
            {
                Ok(job) => jobs.push(job),
                Err(e) => warn!("Skipping unreadable job file {}: {}", path.display(), e),
            }
        }
        Ok(jobs)
    }

    /// Jobs whose last persisted status was not terminal; used at startup
    /// to decide which jobs need re-queuing or failing
    pub fn load_incomplete(&self) -> Result<Vec<RenderJob>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|j| !j.is_terminal())
            .collect())
    }

    /// Delete terminal jobs older than `max_age_hours`; returns how many
    /// were removed
    pub fn cleanup_old(&self, max_age_hours: u64) -> Result<usize> {
        let mut removed = 0;
        for job in self.list()? {
            if job.is_terminal() && job.age_hours() > max_age_hours as f64 {
                if let Err(e) = self.delete(&job.job_id) {
                    warn!(job_id = %job.job_id, "Failed to delete old job: {}", e);
                } else {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            info!("Retention sweep removed {} terminal jobs", removed);
        }
        Ok(removed)
    }

    /// Load-modify-save; `None` if the job does not exist. Callers must
    /// not create jobs through this path.
    pub fn update<F>(&self, job_id: &str, apply: F) -> Result<Option<RenderJob>>
    where
        F: FnOnce(&mut RenderJob),
    {
        let Some(mut job) = self.load(job_id)? else {
            return Ok(None);
        };
        apply(&mut job);
        self.save(&job)?;
        Ok(Some(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobSpec, JobStatus};

    fn test_job() -> RenderJob {
        RenderJob::new(JobSpec {
            fps: 24,
            total_frames: 100,
            frames_dir: PathBuf::from("/tmp/frames"),
            audio_path: None,
            output_path: PathBuf::from("/tmp/out.mp4"),
        })
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path()).unwrap();
        let job = test_job();
        store.save(&job).unwrap();

        let loaded = store.load(&job.job_id).unwrap().unwrap();
        assert_eq!(loaded.job_id, job.job_id);
        assert_eq!(loaded.status, JobStatus::Queued);
        assert_eq!(loaded.total_frames, 100);
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path()).unwrap();
        assert!(store.load("no-such-job").unwrap().is_none());
    }

    #[test]
    fn delete_is_tolerant_of_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path()).unwrap();
        store.delete("never-existed").unwrap();

        let job = test_job();
        store.save(&job).unwrap();
        store.delete(&job.job_id).unwrap();
        store.delete(&job.job_id).unwrap();
        assert!(store.load(&job.job_id).unwrap().is_none());
    }

    #[test]
    fn sanitize_strips_path_traversal() {
        assert_eq!(sanitize_job_id("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_job_id("job_1-a"), "job_1-a");
        assert_eq!(sanitize_job_id("a/b\\c:d"), "abcd");
    }

    #[test]
    fn traversal_id_stays_inside_store_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path()).unwrap();
        let mut job = test_job();
        job.job_id = "../escape".to_string();
        store.save(&job).unwrap();
        // The file lands inside the store, under the sanitized name
        assert!(dir.path().join("escape.json").exists());
    }

    #[test]
    fn load_incomplete_filters_terminal_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path()).unwrap();

        let queued = test_job();
        store.save(&queued).unwrap();

        let mut encoding = test_job();
        encoding.status = JobStatus::Encoding;
        store.save(&encoding).unwrap();

        let mut complete = test_job();
        complete.status = JobStatus::Complete;
        store.save(&complete).unwrap();

        let mut failed = test_job();
        failed.status = JobStatus::Failed;
        store.save(&failed).unwrap();

        let incomplete = store.load_incomplete().unwrap();
        let ids: Vec<&str> = incomplete.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(incomplete.len(), 2);
        assert!(ids.contains(&queued.job_id.as_str()));
        assert!(ids.contains(&encoding.job_id.as_str()));
    }

    #[test]
    fn list_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path()).unwrap();
        let job = test_job();
        store.save(&job).unwrap();
        std::fs::write(dir.path().join("corrupt.json"), "{not json").unwrap();

        let jobs = store.list().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, job.job_id);
    }

    #[test]
    fn cleanup_removes_only_old_terminal_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path()).unwrap();

        let mut old_complete = test_job();
        old_complete.status = JobStatus::Complete;
        old_complete.created_at -= 48 * 3_600_000;
        store.save(&old_complete).unwrap();

        let mut old_encoding = test_job();
        old_encoding.status = JobStatus::Encoding;
        old_encoding.created_at -= 48 * 3_600_000;
        store.save(&old_encoding).unwrap();

        let fresh_complete = {
            let mut j = test_job();
            j.status = JobStatus::Complete;
            j
        };
        store.save(&fresh_complete).unwrap();

        let removed = store.cleanup_old(24).unwrap();
        assert_eq!(removed, 1);
        assert!(store.load(&old_complete.job_id).unwrap().is_none());
        assert!(store.load(&old_encoding.job_id).unwrap().is_some());
        assert!(store.load(&fresh_complete.job_id).unwrap().is_some());
    }

    #[test]
    fn update_returns_none_for_unknown_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path()).unwrap();
        let result = store
            .update("missing", |j| j.progress = 50)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn update_persists_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path()).unwrap();
        let job = test_job();
        store.save(&job).unwrap();

        let updated = store
            .update(&job.job_id, |j| {
                j.status = JobStatus::Encoding;
                j.progress = 40;
            })
            .unwrap()
            .unwrap();
        assert_eq!(updated.progress, 40);

        let loaded = store.load(&job.job_id).unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Encoding);
        assert_eq!(loaded.progress, 40);
    }
}
