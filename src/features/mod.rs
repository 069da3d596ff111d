pub mod descriptor;
pub mod detector;
pub mod matcher;

pub use matcher::{match_descriptors, Correspondence, MatchingConfig};

use crate::AlignError;
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// 256-bit binary descriptor packed into 32 bytes.
pub type Descriptor = [u8; 32];

#[derive(Debug, Clone, Copy)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub response: f32,
    pub angle: f32,
}

/// Keypoints and their descriptors for one image, kept in lockstep.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn point(&self, index: usize) -> (f64, f64) {
        let kp = &self.keypoints[index];
        (kp.x as f64, kp.y as f64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Minimum center-to-ring intensity difference for the segment test.
    pub fast_threshold: u8,
    /// Cap on keypoints kept after non-maximum suppression.
    pub max_keypoints: usize,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            fast_threshold: 10,
            max_keypoints: 2000,
        }
    }
}

/// Corner detection plus description for a single grayscale image.
pub struct FeatureExtractor {
    config: FeaturesConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeaturesConfig) -> Self {
        Self { config }
    }

    /// Detects oriented corners and describes each one. A featureless image
    /// (uniform sky, solid black frame) is an extraction failure, not an
    /// empty success: downstream matching would be meaningless.
    pub fn extract(&self, image: &GrayImage) -> Result<FeatureSet, AlignError> {
        let keypoints = detector::detect_corners(
            image,
            self.config.fast_threshold,
            self.config.max_keypoints,
        );
        if keypoints.is_empty() {
            return Err(AlignError::Extraction(format!(
                "no keypoints in {}x{} image",
                image.width(),
                image.height()
            )));
        }
        let descriptors = descriptor::describe(image, &keypoints);
        Ok(FeatureSet {
            keypoints,
            descriptors,
        })
    }
}
