//! Feature-first alignment with a coarse template fallback.

use super::{AlignInput, AlignSuccess, AlignmentStrategy};
use crate::config::AlignmentConfig;
use crate::enhance::{self, NightConfig};
use crate::estimation::{estimate_homography, EstimationConfig, Homography};
use crate::features::{match_descriptors, FeatureExtractor, FeaturesConfig, MatchingConfig};
use crate::template::{coarse_translation, TemplateConfig};
use crate::warp::warp_to_reference;
use crate::AlignError;
use image::GrayImage;
use log::{debug, warn};

/// Corner-feature alignment pipeline.
///
/// Low-light frames are normalized before detection and matched with a
/// relaxed distinctiveness ratio but a tighter reprojection threshold. When
/// the feature path cannot produce a transform, a multi-scale template
/// sweep recovers a translation-only one instead.
pub struct ClassicalAligner {
    features: FeaturesConfig,
    matching: MatchingConfig,
    estimation: EstimationConfig,
    night: NightConfig,
    template: TemplateConfig,
}

impl ClassicalAligner {
    pub fn new(config: &AlignmentConfig) -> Self {
        Self {
            features: config.features.clone(),
            matching: config.matching.clone(),
            estimation: config.estimation.clone(),
            night: config.night.clone(),
            template: config.template.clone(),
        }
    }

    fn feature_align(
        &self,
        input: &AlignInput<'_>,
        source_gray: &GrayImage,
        reference_gray: &GrayImage,
        ratio: f32,
        reproj: f64,
    ) -> Result<AlignSuccess, AlignError> {
        let extractor = FeatureExtractor::new(self.features.clone());
        let source_set = extractor.extract(source_gray)?;
        let reference_set = extractor.extract(reference_gray)?;
        debug!(
            "{}: {} source / {} reference keypoints",
            input.source_path.display(),
            source_set.len(),
            reference_set.len()
        );

        let matches = match_descriptors(&source_set, &reference_set, ratio);
        if matches.len() < self.matching.min_correspondences {
            return Err(AlignError::InsufficientCorrespondences {
                found: matches.len(),
                required: self.matching.min_correspondences,
            });
        }

        let source_pts: Vec<(f64, f64)> = matches
            .iter()
            .map(|m| source_set.point(m.source_idx))
            .collect();
        let reference_pts: Vec<(f64, f64)> = matches
            .iter()
            .map(|m| reference_set.point(m.reference_idx))
            .collect();
        let estimate = estimate_homography(&source_pts, &reference_pts, &self.estimation, reproj)?;
        debug!(
            "{}: transform from {}/{} inliers",
            input.source_path.display(),
            estimate.inlier_count,
            matches.len()
        );

        let (ref_w, ref_h) = reference_gray.dimensions();
        let warped = warp_to_reference(input.source_rgb, &estimate.homography, ref_w, ref_h)?;
        Ok(AlignSuccess {
            warped,
            method: "features",
            correspondences: matches.len(),
            inliers: estimate.inlier_count,
            inlier_ratio: estimate.inlier_ratio(),
            fallback: false,
        })
    }
}

impl AlignmentStrategy for ClassicalAligner {
    fn name(&self) -> &'static str {
        "classical"
    }

    fn align(&self, input: &AlignInput<'_>) -> Result<AlignSuccess, AlignError> {
        let night = enhance::is_low_light(input.source_gray, &self.night);
        let normalized = if night {
            debug!(
                "{}: low-light frame, normalizing before detection",
                input.source_path.display()
            );
            Some((
                enhance::normalize_low_light(input.source_gray, &self.night),
                enhance::normalize_low_light(input.reference_gray, &self.night),
            ))
        } else {
            None
        };
        let (source_gray, reference_gray): (&GrayImage, &GrayImage) = match &normalized {
            Some((s, r)) => (s, r),
            None => (input.source_gray, input.reference_gray),
        };
        let ratio = if night {
            self.matching.night_ratio_threshold
        } else {
            self.matching.ratio_threshold
        };
        let reproj = if night {
            self.estimation.night_reproj_threshold
        } else {
            self.estimation.reproj_threshold
        };

        let primary = match self.feature_align(input, source_gray, reference_gray, ratio, reproj) {
            Ok(success) => return Ok(success),
            Err(err) => err,
        };
        warn!(
            "{}: feature alignment failed ({}), trying template fallback",
            input.source_path.display(),
            primary
        );

        let Some(peak) = coarse_translation(source_gray, reference_gray, &self.template) else {
            return Err(primary);
        };
        debug!(
            "{}: template fallback shift ({:.1}, {:.1}) at scale {:.2}, correlation {:.2}",
            input.source_path.display(),
            peak.dx,
            peak.dy,
            peak.scale,
            peak.score
        );
        let shift = Homography::translation(peak.dx, peak.dy);
        let (ref_w, ref_h) = reference_gray.dimensions();
        let warped = warp_to_reference(input.source_rgb, &shift, ref_w, ref_h)?;
        Ok(AlignSuccess {
            warped,
            method: "template",
            correspondences: 0,
            inliers: 0,
            inlier_ratio: peak.confidence(),
            fallback: true,
        })
    }
}
