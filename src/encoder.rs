use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;
use tracing::info;

/// Filename pattern workers expect inside a job's frame directory
pub const FRAME_PATTERN: &str = "frame_%06d.png";

/// H.264 encoders the worker pool can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoder {
    /// NVIDIA NVENC
    Nvenc,
    /// Intel Quick Sync Video
    Qsv,
    /// libx264 software fallback
    X264,
}

impl Encoder {
    /// FFmpeg encoder name
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Encoder::Nvenc => "h264_nvenc",
            Encoder::Qsv => "h264_qsv",
            Encoder::X264 => "libx264",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Encoder::Nvenc => "NVENC (NVIDIA)",
            Encoder::Qsv => "Quick Sync (Intel)",
            Encoder::X264 => "x264 (Software)",
        }
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, Encoder::X264)
    }

    /// Concurrent session ceiling; consumer hardware encoders typically
    /// allow only a couple of simultaneous sessions
    pub fn max_sessions(&self) -> Option<usize> {
        match self {
            Encoder::Nvenc => Some(2),
            Encoder::Qsv => Some(2),
            Encoder::X264 => None,
        }
    }
}

impl std::fmt::Display for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Detect usable encoders, best first. Probes run once per process and
/// the result is cached.
pub fn detect_encoders() -> &'static [Encoder] {
    static DETECTED: OnceLock<Vec<Encoder>> = OnceLock::new();
    DETECTED.get_or_init(|| {
        let found = probe_encoders();
        info!(
            "Detected encoders: {}",
            found
                .iter()
                .map(|e| e.display_name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        found
    })
}

fn probe_encoders() -> Vec<Encoder> {
    let listing = ffmpeg_encoder_listing();
    let mut found = Vec::new();

    if listing.contains("h264_nvenc") && has_nvidia_gpu() {
        found.push(Encoder::Nvenc);
    }
    if listing.contains("h264_qsv") && has_intel_gpu() {
        found.push(Encoder::Qsv);
    }
    // Software path is always available as the fallback
    found.push(Encoder::X264);
    found
}

fn ffmpeg_encoder_listing() -> String {
    Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).to_lowercase())
        .unwrap_or_default()
}

fn has_nvidia_gpu() -> bool {
    Command::new("nvidia-smi")
        .args(["--query-gpu=name", "--format=csv,noheader"])
        .output()
        .map(|o| o.status.success() && !o.stdout.is_empty())
        .unwrap_or(false)
}

fn has_intel_gpu() -> bool {
    #[cfg(target_os = "linux")]
    {
        if let Ok(output) = Command::new("lspci").output() {
            let lspci = String::from_utf8_lossy(&output.stdout).to_lowercase();
            if lspci.contains("intel") && lspci.contains("graphics") {
                return true;
            }
        }

        if let Ok(output) = Command::new("vainfo").output() {
            let vainfo = String::from_utf8_lossy(&output.stdout).to_lowercase();
            if vainfo.contains("vaentrypointencslice") && vainfo.contains("h264") {
                return true;
            }
        }
    }

    false
}

/// Pick an encoder for the next job.
///
/// Hardware is a performance decision, never a quality decision: prefer it
/// when detected and below its session ceiling, otherwise fall back to
/// software. Re-evaluated per job since hardware slots come and go.
pub fn select_encoder(available: &[Encoder], active_hw_sessions: usize) -> Encoder {
    for encoder in available {
        if !encoder.is_hardware() {
            continue;
        }
        match encoder.max_sessions() {
            Some(cap) if active_hw_sessions >= cap => continue,
            _ => return *encoder,
        }
    }
    Encoder::X264
}

/// Everything needed to build one render invocation
#[derive(Debug, Clone)]
pub struct RenderParams {
    pub frames_dir: PathBuf,
    pub audio_path: Option<PathBuf>,
    pub output: PathBuf,
    pub fps: u32,
    pub encoder: Encoder,
    /// Quality proxy, converted to each encoder's native knob
    pub crf: u8,
}

/// Build the canonical FFmpeg argument list for a render job.
///
/// Color handling is standardized across every encoder so hardware and
/// software output never visibly diverge.
pub fn build_ffmpeg_args(params: &RenderParams) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-nostdin".to_string(),
        "-framerate".to_string(),
        params.fps.to_string(),
        "-i".to_string(),
        params
            .frames_dir
            .join(FRAME_PATTERN)
            .to_string_lossy()
            .to_string(),
    ];

    if let Some(audio) = &params.audio_path {
        args.extend(["-i".to_string(), audio.to_string_lossy().to_string()]);
    }

    args.extend(["-c:v".to_string(), params.encoder.ffmpeg_name().to_string()]);

    // Encoder-specific quality parameters
    args.extend(quality_args(params.encoder, params.crf));

    // Standardized color handling, mandatory for every encoder
    args.extend(color_args());

    if params.audio_path.is_some() {
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
            "-shortest".to_string(),
        ]);
    }

    args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    args.push(params.output.to_string_lossy().to_string());
    args
}

/// Map the quality proxy to each encoder's native quality knob, tuned to
/// be visually equivalent across encoders
fn quality_args(encoder: Encoder, crf: u8) -> Vec<String> {
    match encoder {
        Encoder::X264 => vec![
            "-crf".to_string(),
            crf.to_string(),
            "-preset".to_string(),
            "medium".to_string(),
        ],
        Encoder::Nvenc => vec![
            "-cq".to_string(),
            crf.to_string(),
            "-preset".to_string(),
            "p5".to_string(),
            "-tune".to_string(),
            "hq".to_string(),
            "-rc".to_string(),
            "vbr".to_string(),
        ],
        Encoder::Qsv => vec![
            "-global_quality".to_string(),
            crf.to_string(),
            "-preset".to_string(),
            "medium".to_string(),
        ],
    }
}

/// Standardized color-space arguments applied regardless of encoder
fn color_args() -> Vec<String> {
    vec![
        "-colorspace".to_string(),
        "bt709".to_string(),
        "-color_primaries".to_string(),
        "bt709".to_string(),
        "-color_trc".to_string(),
        "bt709".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ]
}

/// Check that ffmpeg and ffprobe are runnable
pub fn check_dependencies() -> bool {
    check_command("ffmpeg", &["-version"]) && check_command("ffprobe", &["-version"])
}

fn check_command(cmd: &str, args: &[&str]) -> bool {
    Command::new(cmd)
        .args(args)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}
