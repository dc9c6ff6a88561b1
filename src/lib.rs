//! Render pipeline for turning uploaded frame sequences and audio into
//! verified H.264 video files.
//!
//! Submissions flow through [`queue::RenderQueue`]: jobs are persisted by
//! [`store::JobStore`], encoded by the [`pool::WorkerPool`] via FFmpeg,
//! watched for stalls by [`timeout::TimeoutManager`], and accepted only
//! after [`verifier`] has probed the produced file.

pub mod config;
pub mod encoder;
pub mod error;
pub mod frames;
pub mod job;
pub mod logger;
pub mod pool;
pub mod queue;
pub mod store;
pub mod timeout;
pub mod verifier;

pub use config::RenderConfig;
pub use error::{Error, Result};
pub use job::{JobSpec, JobStatus, RenderJob};
pub use queue::RenderQueue;
pub use store::JobStore;
pub use verifier::{FfprobeVerifier, OutputVerifier};
