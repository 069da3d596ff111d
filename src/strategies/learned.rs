//! Alignment through an external dense-correspondence matcher.
//!
//! The matcher is any executable that accepts two image paths as trailing
//! arguments and prints a JSON array of point pairs on stdout. Every way
//! the external process can fail maps to `CapabilityUnavailable`, so a
//! missing model file and a missing binary look the same to callers and an
//! auto run can fall back cleanly.

use super::{AlignInput, AlignSuccess, AlignmentStrategy};
use crate::config::AlignmentConfig;
use crate::estimation::{estimate_homography, EstimationConfig};
use crate::warp::warp_to_reference;
use crate::AlignError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::process::Command;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnedConfig {
    /// Command line of the external matcher; the source and reference image
    /// paths are appended as the final two arguments.
    pub matcher_command: Option<String>,
    /// Reported correspondences below this confidence are dropped.
    pub min_confidence: f32,
}

impl Default for LearnedConfig {
    fn default() -> Self {
        Self {
            matcher_command: None,
            min_confidence: 0.1,
        }
    }
}

impl LearnedConfig {
    /// The configured command, if a non-blank one is set.
    pub fn command(&self) -> Option<&str> {
        self.matcher_command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// One point pair as reported on the matcher's stdout.
#[derive(Debug, Deserialize)]
struct DenseMatch {
    source: [f64; 2],
    reference: [f64; 2],
    #[serde(default = "full_confidence")]
    confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

pub struct LearnedAligner {
    learned: LearnedConfig,
    estimation: EstimationConfig,
}

impl LearnedAligner {
    pub fn new(config: &AlignmentConfig) -> Self {
        Self {
            learned: config.learned.clone(),
            estimation: config.estimation.clone(),
        }
    }

    fn run_matcher(
        &self,
        command: &str,
        input: &AlignInput<'_>,
    ) -> Result<Vec<DenseMatch>, AlignError> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            AlignError::CapabilityUnavailable("dense matcher command is empty".into())
        })?;
        let output = Command::new(program)
            .args(parts)
            .arg(input.source_path)
            .arg(input.reference_path)
            .output()
            .map_err(|e| {
                AlignError::CapabilityUnavailable(format!("failed to launch '{}': {}", program, e))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AlignError::CapabilityUnavailable(format!(
                "matcher exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        serde_json::from_slice(&output.stdout).map_err(|e| {
            AlignError::CapabilityUnavailable(format!("matcher output is not valid JSON: {}", e))
        })
    }
}

impl AlignmentStrategy for LearnedAligner {
    fn name(&self) -> &'static str {
        "learned"
    }

    fn align(&self, input: &AlignInput<'_>) -> Result<AlignSuccess, AlignError> {
        let command = self.learned.command().ok_or_else(|| {
            AlignError::CapabilityUnavailable("no dense matcher command configured".into())
        })?;

        let reported = self.run_matcher(command, input)?;
        let kept: Vec<&DenseMatch> = reported
            .iter()
            .filter(|m| m.confidence >= self.learned.min_confidence)
            .collect();
        debug!(
            "{}: matcher reported {} correspondences, {} above confidence {:.2}",
            input.source_path.display(),
            reported.len(),
            kept.len(),
            self.learned.min_confidence
        );
        if kept.is_empty() {
            return Err(AlignError::CapabilityUnavailable(
                "matcher produced no usable correspondences".into(),
            ));
        }

        let source_pts: Vec<(f64, f64)> = kept.iter().map(|m| (m.source[0], m.source[1])).collect();
        let reference_pts: Vec<(f64, f64)> = kept
            .iter()
            .map(|m| (m.reference[0], m.reference[1]))
            .collect();
        let estimate = estimate_homography(
            &source_pts,
            &reference_pts,
            &self.estimation,
            self.estimation.learned_reproj_threshold,
        )?;

        let (ref_w, ref_h) = input.reference_gray.dimensions();
        let warped = warp_to_reference(input.source_rgb, &estimate.homography, ref_w, ref_h)?;
        Ok(AlignSuccess {
            warped,
            method: "learned",
            correspondences: kept.len(),
            inliers: estimate.inlier_count,
            inlier_ratio: estimate.inlier_ratio(),
            fallback: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use std::path::Path;

    fn tiny_input<'a>(
        rgb: &'a RgbImage,
        gray: &'a GrayImage,
    ) -> AlignInput<'a> {
        AlignInput {
            source_rgb: rgb,
            source_gray: gray,
            source_path: Path::new("a.png"),
            reference_gray: gray,
            reference_path: Path::new("b.png"),
        }
    }

    #[test]
    fn unconfigured_matcher_is_a_missing_capability() {
        let gray = GrayImage::from_pixel(8, 8, Luma([0]));
        let rgb = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        let aligner = LearnedAligner::new(&AlignmentConfig::default());

        let err = aligner.align(&tiny_input(&rgb, &gray)).unwrap_err();
        assert!(matches!(err, AlignError::CapabilityUnavailable(_)));
    }

    #[test]
    fn missing_binary_is_a_missing_capability() {
        let gray = GrayImage::from_pixel(8, 8, Luma([0]));
        let rgb = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        let mut config = AlignmentConfig::default();
        config.learned.matcher_command = Some("definitely-not-an-installed-matcher".into());
        let aligner = LearnedAligner::new(&config);

        let err = aligner.align(&tiny_input(&rgb, &gray)).unwrap_err();
        assert!(matches!(err, AlignError::CapabilityUnavailable(_)));
    }

    #[test]
    fn matcher_output_parses_with_and_without_confidence() {
        let json = r#"[
            {"source": [1.0, 2.0], "reference": [3.0, 4.5], "confidence": 0.9},
            {"source": [5.0, 6.0], "reference": [7.0, 8.0]}
        ]"#;
        let parsed: Vec<DenseMatch> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].reference, [3.0, 4.5]);
        assert_eq!(parsed[0].confidence, 0.9);
        assert_eq!(parsed[1].confidence, 1.0);
    }
}
