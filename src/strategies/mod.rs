//! Alignment strategies and the contract shared between them.

pub mod classical;
pub mod learned;

pub use classical::ClassicalAligner;
pub use learned::{LearnedAligner, LearnedConfig};

use crate::AlignError;
use image::{GrayImage, RgbImage};
use std::path::Path;

/// Borrowed view of one frame to align plus the run's reference frame.
///
/// Paths are carried alongside the decoded pixels because the learned
/// strategy hands them to an external process.
pub struct AlignInput<'a> {
    pub source_rgb: &'a RgbImage,
    pub source_gray: &'a GrayImage,
    pub source_path: &'a Path,
    pub reference_gray: &'a GrayImage,
    pub reference_path: &'a Path,
}

/// A completed alignment with its provenance for the run report.
#[derive(Debug, Clone)]
pub struct AlignSuccess {
    pub warped: RgbImage,
    /// Which mechanism produced the transform: "features", "template", or
    /// "learned".
    pub method: &'static str,
    pub correspondences: usize,
    pub inliers: usize,
    /// Inlier share for model-based methods, correlation confidence for the
    /// template fallback.
    pub inlier_ratio: f32,
    /// True when the primary mechanism failed and a fallback produced the
    /// result.
    pub fallback: bool,
}

pub trait AlignmentStrategy {
    fn name(&self) -> &'static str;

    /// Align one frame to the reference, or explain why it cannot be done.
    fn align(&self, input: &AlignInput<'_>) -> Result<AlignSuccess, AlignError>;
}
