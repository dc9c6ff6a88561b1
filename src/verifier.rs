use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use tracing::{info, warn};

/// Probed metadata of a produced video file
#[derive(Debug, Clone)]
pub struct VideoMetadata {
    pub codec_name: String,
    pub width: u32,
    pub height: u32,
    pub pixel_format: Option<String>,
    pub duration_secs: f64,
    pub frame_rate: (u32, u32),
    pub has_audio: bool,
    pub size_bytes: u64,
}

/// What the output file must look like for a job to be trusted
#[derive(Debug, Clone)]
pub struct Expectations {
    pub fps: u32,
    pub total_frames: u32,
    pub require_audio: bool,
    pub duration_tolerance_secs: f64,
}

impl Expectations {
    pub fn expected_duration_secs(&self) -> f64 {
        if self.fps == 0 {
            return 0.0;
        }
        self.total_frames as f64 / self.fps as f64
    }
}

/// Outcome of post-encode verification
#[derive(Debug, Clone)]
pub struct QualityReport {
    pub passed: bool,
    pub errors: Vec<String>,
}

impl QualityReport {
    fn pass() -> Self {
        Self {
            passed: true,
            errors: Vec::new(),
        }
    }

    fn fail(errors: Vec<String>) -> Self {
        Self {
            passed: false,
            errors,
        }
    }
}

/// Post-encode inspection of a produced file.
///
/// A worker's COMPLETE report is never trusted on its own; the queue runs
/// this before a job may become `complete`.
pub trait OutputVerifier: Send + Sync {
    fn verify(&self, output: &Path, expectations: &Expectations) -> QualityReport;
}

/// ffprobe-backed verifier used in production
pub struct FfprobeVerifier;

impl OutputVerifier for FfprobeVerifier {
    fn verify(&self, output: &Path, expectations: &Expectations) -> QualityReport {
        let metadata = match get_video_metadata(output) {
            Ok(m) => m,
            Err(e) => {
                warn!("Output probe failed for {}: {}", output.display(), e);
                return QualityReport::fail(vec![format!("output not probeable: {}", e)]);
            }
        };

        let report = check_metadata(&metadata, expectations);
        if report.passed {
            info!(
                "Verified {}: {}x{} {} {:.2}s",
                output.display(),
                metadata.width,
                metadata.height,
                metadata.codec_name,
                metadata.duration_secs
            );
        }
        report
    }
}

/// Pure verification layer over already-probed metadata
pub fn check_metadata(metadata: &VideoMetadata, expectations: &Expectations) -> QualityReport {
    let mut errors = Vec::new();

    if metadata.size_bytes == 0 {
        errors.push("output file is empty".to_string());
    }

    if metadata.codec_name != "h264" {
        errors.push(format!(
            "unexpected video codec: {} (expected h264)",
            metadata.codec_name
        ));
    }

    if metadata.width == 0 || metadata.height == 0 {
        errors.push(format!(
            "implausible resolution: {}x{}",
            metadata.width, metadata.height
        ));
    }

    if let Some(pix_fmt) = &metadata.pixel_format {
        if pix_fmt != "yuv420p" {
            errors.push(format!(
                "unexpected pixel format: {} (expected yuv420p)",
                pix_fmt
            ));
        }
    }

    let expected = expectations.expected_duration_secs();
    if expected > 0.0 {
        let diff = (metadata.duration_secs - expected).abs();
        if diff > expectations.duration_tolerance_secs {
            errors.push(format!(
                "duration mismatch: expected {:.2}s, got {:.2}s (diff {:.2}s)",
                expected, metadata.duration_secs, diff
            ));
        }
    }

    if expectations.fps > 0 && metadata.frame_rate.0 > 0 {
        let probed_fps = metadata.frame_rate.0 as f64 / metadata.frame_rate.1.max(1) as f64;
        if (probed_fps - expectations.fps as f64).abs() > 0.01 {
            errors.push(format!(
                "frame rate mismatch: expected {} fps, got {:.3} fps",
                expectations.fps, probed_fps
            ));
        }
    }

    if expectations.require_audio && !metadata.has_audio {
        errors.push("output has no audio stream".to_string());
    }

    if errors.is_empty() {
        QualityReport::pass()
    } else {
        QualityReport::fail(errors)
    }
}

/// Probe a video file's metadata with ffprobe
pub fn get_video_metadata(path: &Path) -> Result<VideoMetadata> {
    let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if size_bytes == 0 {
        return Err(Error::Probe(format!(
            "{} is missing or empty",
            path.display()
        )));
    }

    let path_str = path.to_string_lossy();
    let output = run_ffprobe(&[
        "-v",
        "error",
        "-show_entries",
        "stream=index,codec_type,codec_name,width,height,pix_fmt,r_frame_rate,avg_frame_rate",
        "-show_entries",
        "format=duration",
        "-of",
        "json",
        &path_str,
    ])?;

    let data: FfprobeOutput = serde_json::from_str(&output)
        .map_err(|e| Error::Probe(format!("Failed to parse ffprobe output: {}", e)))?;

    let video = data
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Error::Probe("No video stream found".to_string()))?;
    let has_audio = data
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let frame_rate = parse_frame_rate(
        video
            .r_frame_rate
            .as_deref()
            .or(video.avg_frame_rate.as_deref()),
    );

    let duration_secs = data
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoMetadata {
        codec_name: video
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        pixel_format: video.pix_fmt.clone(),
        duration_secs,
        frame_rate,
        has_audio,
        size_bytes,
    })
}

/// Parse frame rate from ffprobe's `num/den` format
fn parse_frame_rate(rate_str: Option<&str>) -> (u32, u32) {
    rate_str
        .and_then(|s| {
            let parts: Vec<&str> = s.split('/').collect();
            if parts.len() == 2 {
                let num = parts[0].parse::<u32>().ok()?;
                let den = parts[1].parse::<u32>().ok()?;
                if den > 0 {
                    return Some((num, den));
                }
            }
            None
        })
        .unwrap_or((0, 1))
}

fn run_ffprobe(args: &[&str]) -> Result<String> {
    let output = Command::new("ffprobe")
        .args(args)
        .output()
        .map_err(|e| Error::Probe(format!("Failed to execute ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Probe(format!("ffprobe failed: {}", stderr)));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

// JSON deserialization structures

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    streams: Vec<RawStream>,
    format: Option<FormatInfo>,
}

#[derive(Debug, Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_metadata() -> VideoMetadata {
        VideoMetadata {
            codec_name: "h264".to_string(),
            width: 1920,
            height: 1080,
            pixel_format: Some("yuv420p".to_string()),
            duration_secs: 100.0 / 24.0,
            frame_rate: (24, 1),
            has_audio: true,
            size_bytes: 1_500_000,
        }
    }

    fn expectations() -> Expectations {
        Expectations {
            fps: 24,
            total_frames: 100,
            require_audio: true,
            duration_tolerance_secs: 1.0,
        }
    }

    #[test]
    fn accepts_matching_output() {
        let report = check_metadata(&good_metadata(), &expectations());
        assert!(report.passed, "{:?}", report.errors);
    }

    #[test]
    fn rejects_duration_outside_tolerance() {
        let mut metadata = good_metadata();
        metadata.duration_secs = 100.0 / 24.0 + 1.5;
        let report = check_metadata(&metadata, &expectations());
        assert!(!report.passed);
        assert!(report.errors.iter().any(|e| e.contains("duration mismatch")));
    }

    #[test]
    fn accepts_duration_inside_tolerance() {
        let mut metadata = good_metadata();
        metadata.duration_secs = 100.0 / 24.0 + 0.5;
        let report = check_metadata(&metadata, &expectations());
        assert!(report.passed);
    }

    #[test]
    fn rejects_wrong_codec() {
        let mut metadata = good_metadata();
        metadata.codec_name = "mpeg4".to_string();
        let report = check_metadata(&metadata, &expectations());
        assert!(!report.passed);
        assert!(report.errors.iter().any(|e| e.contains("codec")));
    }

    #[test]
    fn rejects_missing_audio_when_required() {
        let mut metadata = good_metadata();
        metadata.has_audio = false;
        let report = check_metadata(&metadata, &expectations());
        assert!(!report.passed);
        assert!(report.errors.iter().any(|e| e.contains("audio")));
    }

    #[test]
    fn missing_audio_ok_when_not_required() {
        let mut metadata = good_metadata();
        metadata.has_audio = false;
        let mut exp = expectations();
        exp.require_audio = false;
        assert!(check_metadata(&metadata, &exp).passed);
    }

    #[test]
    fn rejects_empty_file_and_bad_resolution() {
        let mut metadata = good_metadata();
        metadata.size_bytes = 0;
        metadata.width = 0;
        let report = check_metadata(&metadata, &expectations());
        assert!(!report.passed);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn rejects_wrong_frame_rate() {
        let mut metadata = good_metadata();
        metadata.frame_rate = (30, 1);
        // Keep the duration consistent with the frame count at 30 fps so
        // only the frame rate check trips
        metadata.duration_secs = 100.0 / 24.0;
        let report = check_metadata(&metadata, &expectations());
        assert!(!report.passed);
        assert!(report.errors.iter().any(|e| e.contains("frame rate")));
    }

    #[test]
    fn frame_rate_parsing() {
        assert_eq!(parse_frame_rate(Some("24/1")), (24, 1));
        assert_eq!(parse_frame_rate(Some("30000/1001")), (30000, 1001));
        assert_eq!(parse_frame_rate(Some("garbage")), (0, 1));
        assert_eq!(parse_frame_rate(None), (0, 1));
    }
}
