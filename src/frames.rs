use crate::error::{Error, Result};
use crate::job::FrameChecksum;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// SHA-256 hex digest of a frame's bytes
pub fn checksum(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// One frame whose expected checksum did not match
#[derive(Debug, Clone)]
pub struct ChecksumMismatch {
    pub frame_index: u32,
    pub expected: String,
    pub actual: String,
}

/// Result of verifying a batch of uploaded frames
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub valid: bool,
    pub valid_count: usize,
    pub invalid_frames: Vec<u32>,
    pub mismatches: Vec<ChecksumMismatch>,
}

/// Verify uploaded frame bytes against client-supplied checksums.
///
/// Verification is opportunistic: frames with no expected checksum are
/// accepted, since not every caller computes them.
pub fn validate_batch(frames: &[(u32, Vec<u8>)], expected: &[FrameChecksum]) -> BatchReport {
    let expected_by_index: HashMap<u32, &FrameChecksum> =
        expected.iter().map(|c| (c.frame_index, c)).collect();

    let mut invalid_frames = Vec::new();
    let mut mismatches = Vec::new();
    let mut valid_count = 0;

    for (frame_index, bytes) in frames {
        match expected_by_index.get(frame_index) {
            Some(exp) => {
                let actual = checksum(bytes);
                if actual == exp.checksum {
                    valid_count += 1;
                } else {
                    warn!(
                        frame_index,
                        "Frame checksum mismatch: expected {}, got {}", exp.checksum, actual
                    );
                    invalid_frames.push(*frame_index);
                    mismatches.push(ChecksumMismatch {
                        frame_index: *frame_index,
                        expected: exp.checksum.clone(),
                        actual,
                    });
                }
            }
            // Unverifiable but accepted
            None => valid_count += 1,
        }
    }

    invalid_frames.sort_unstable();
    BatchReport {
        valid: invalid_frames.is_empty(),
        valid_count,
        invalid_frames,
        mismatches,
    }
}

/// Result of checking a frame index sequence for gaps and duplicates
#[derive(Debug, Clone)]
pub struct SequenceReport {
    pub valid: bool,
    pub missing_frames: Vec<u32>,
    pub duplicate_frames: Vec<u32>,
}

/// A sequence is valid iff every index in `[0, expected_total)` appears
/// exactly once.
pub fn validate_sequence(received: &[u32], expected_total: u32) -> SequenceReport {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for index in received {
        *counts.entry(*index).or_insert(0) += 1;
    }

    let missing_frames: Vec<u32> = (0..expected_total)
        .filter(|i| !counts.contains_key(i))
        .collect();
    let mut duplicate_frames: Vec<u32> = counts
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(index, _)| *index)
        .collect();
    duplicate_frames.sort_unstable();

    let valid = missing_frames.is_empty()
        && duplicate_frames.is_empty()
        && received.len() == expected_total as usize;

    SequenceReport {
        valid,
        missing_frames,
        duplicate_frames,
    }
}

/// Result of scanning persisted frame files for implausible sizes
#[derive(Debug, Clone)]
pub struct SizeReport {
    pub valid: bool,
    pub scanned: usize,
    pub undersized: Vec<PathBuf>,
}

/// Flag persisted frame files below a minimum plausible size as evidence
/// of a corrupt or truncated upload.
pub fn validate_sizes(dir: &Path, min_size_bytes: u64) -> Result<SizeReport> {
    let mut scanned = 0;
    let mut undersized = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry
            .map_err(|e| Error::Validation(format!("failed to scan {}: {}", dir.display(), e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        scanned += 1;
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if size < min_size_bytes {
            warn!(
                "Undersized frame file {} ({} bytes)",
                entry.path().display(),
                size
            );
            undersized.push(entry.path().to_path_buf());
        }
    }

    undersized.sort();
    Ok(SizeReport {
        valid: undersized.is_empty(),
        scanned,
        undersized,
    })
}
