use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Main render service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Directory holding one JSON document per job
    pub jobs_dir: PathBuf,
    /// Directory where finished videos are written
    pub output_dir: PathBuf,
    /// Worker pool settings
    pub workers: WorkerConfig,
    /// Liveness tracking settings
    pub timeouts: TimeoutConfig,
    /// Encoding quality and verification settings
    pub quality: QualityConfig,
    /// Terminal job retention settings
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of workers; 0 means derive from CPU count
    pub count: usize,
    /// Bounded pending queue between submit and dispatch
    pub pending_capacity: usize,
    /// How long a dispatch waits for an idle worker before backing off
    pub submission_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Expected worker heartbeat cadence
    pub heartbeat_interval_secs: u64,
    /// Silence longer than this marks a job stalled
    pub stall_threshold_secs: u64,
    /// Hard ceiling on a single job's runtime
    pub max_job_duration_secs: u64,
    /// Sweep cadence for the timeout manager
    pub check_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Quality proxy, mapped to each encoder's native knob
    pub crf: u8,
    /// Allowed difference between expected and probed duration
    pub duration_tolerance_secs: f64,
    /// Frames smaller than this are treated as truncated uploads
    pub min_frame_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Terminal jobs older than this are deleted
    pub max_age_hours: u64,
    /// Cadence of the cleanup sweep
    pub sweep_interval_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clipforge");
        Self {
            jobs_dir: data_dir.join("jobs"),
            output_dir: data_dir.join("renders"),
            workers: WorkerConfig::default(),
            timeouts: TimeoutConfig::default(),
            quality: QualityConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 0,
            pending_capacity: 32,
            submission_timeout_secs: 30,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 5,
            stall_threshold_secs: 60,
            max_job_duration_secs: 30 * 60,
            check_interval_secs: 5,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            crf: 23,
            duration_tolerance_secs: 1.0,
            min_frame_bytes: 1000,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_hours: 24,
            sweep_interval_secs: 60 * 60,
        }
    }
}

impl TimeoutConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn stall_threshold(&self) -> Duration {
        Duration::from_secs(self.stall_threshold_secs)
    }

    pub fn max_job_duration(&self) -> Duration {
        Duration::from_secs(self.max_job_duration_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl RenderConfig {
    /// Load configuration from TOML file, or create default if not found
    pub fn load() -> Self {
        let config_path = Self::config_path();

        if config_path.exists() {
            match Self::load_from_file(&config_path) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config: {}. Using defaults.", e);
                }
            }
        }

        let config = Self::default();
        // Save default config for future editing
        if let Err(e) = config.save() {
            warn!("Failed to save default config: {}", e);
        }
        config
    }

    /// Save configuration to TOML file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, toml_string)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        info!("Saved config to {}", config_path.display());
        Ok(())
    }

    /// Load configuration from a specific file
    fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        let config: RenderConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clipforge")
            .join("config.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.quality.crf > 51 {
            return Err(Error::Config("CRF must be between 0 and 51".to_string()));
        }
        if self.timeouts.stall_threshold_secs == 0 {
            return Err(Error::Config(
                "Stall threshold must be greater than zero".to_string(),
            ));
        }
        if self.timeouts.max_job_duration_secs < self.timeouts.stall_threshold_secs {
            return Err(Error::Config(
                "Max job duration must not be below the stall threshold".to_string(),
            ));
        }
        if self.workers.pending_capacity == 0 {
            return Err(Error::Config(
                "Pending queue capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
