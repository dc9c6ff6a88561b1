use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Status of a render job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a free worker
    Queued,
    /// A worker is encoding the job
    Encoding,
    /// Encoded and verified
    Complete,
    /// Encoding, verification, or the worker itself failed
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Encoding => "encoding",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters fixed at submission time
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub fps: u32,
    pub total_frames: u32,
    /// Directory holding the uploaded frame sequence
    pub frames_dir: PathBuf,
    /// Optional audio track to mux in
    pub audio_path: Option<PathBuf>,
    /// Where the finished file should land
    pub output_path: PathBuf,
}

/// A render job as persisted in the job store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    pub job_id: String,
    pub status: JobStatus,
    /// 0-100, monotonically non-decreasing while encoding
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_frame: Option<u32>,
    /// Creation timestamp, epoch milliseconds
    pub created_at: i64,
    pub fps: u32,
    pub total_frames: u32,
    pub frames_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,
    /// Set only once the job is complete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<u64>,
    /// Set only when the job failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Target output path requested at submission
    pub target_path: PathBuf,
}

impl RenderJob {
    /// Create a new queued job from a submission spec
    pub fn new(spec: JobSpec) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: JobStatus::Queued,
            progress: 0,
            current_frame: None,
            created_at: Utc::now().timestamp_millis(),
            fps: spec.fps,
            total_frames: spec.total_frames,
            frames_dir: spec.frames_dir,
            audio_path: spec.audio_path,
            output_path: None,
            output_size: None,
            error: None,
            target_path: spec.output_path,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Expected output duration in seconds
    pub fn expected_duration_secs(&self) -> f64 {
        if self.fps == 0 {
            return 0.0;
        }
        self.total_frames as f64 / self.fps as f64
    }

    /// Age of the job in hours
    pub fn age_hours(&self) -> f64 {
        let age_ms = Utc::now().timestamp_millis().saturating_sub(self.created_at);
        age_ms as f64 / 3_600_000.0
    }
}

/// Client-computed checksum for one uploaded frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameChecksum {
    pub frame_index: u32,
    /// SHA-256 hex digest of the frame bytes
    pub checksum: String,
    pub size: u64,
}
