//! Consensus-sampling homography estimation.

use super::homography::{fit_homography, sample_degenerate, Homography};
use crate::AlignError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Minimal sample for a projective transform.
const MIN_SAMPLE: usize = 4;

/// Fixed seed keeps repeated runs on identical input classifying identically.
const RANSAC_SEED: u64 = 0x616c_6967_6e;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    /// Reprojection error below which a correspondence counts as an inlier.
    pub reproj_threshold: f64,
    /// Tighter threshold for low-light scenes, where false matches are common.
    pub night_reproj_threshold: f64,
    /// Wider threshold for dense learned correspondences.
    pub learned_reproj_threshold: f64,
    pub max_iterations: usize,
    /// Early-stop confidence that at least one sample was outlier-free.
    pub confidence: f64,
    /// Consensus below this floor is rejected as unreliable.
    pub min_inliers: usize,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            reproj_threshold: 5.0,
            night_reproj_threshold: 3.0,
            learned_reproj_threshold: 8.0,
            max_iterations: 2000,
            confidence: 0.99,
            min_inliers: 8,
        }
    }
}

/// A fitted transform plus the consensus that produced it.
#[derive(Debug, Clone)]
pub struct EstimatedTransform {
    pub homography: Homography,
    pub inlier_mask: Vec<bool>,
    pub inlier_count: usize,
}

impl EstimatedTransform {
    pub fn total(&self) -> usize {
        self.inlier_mask.len()
    }

    /// Inlier share of all correspondences, used downstream as an alignment
    /// confidence proxy.
    pub fn inlier_ratio(&self) -> f32 {
        if self.inlier_mask.is_empty() {
            return 0.0;
        }
        self.inlier_count as f32 / self.inlier_mask.len() as f32
    }
}

/// Estimate a homography from parallel point slices, rejecting outliers.
///
/// Samples minimal subsets, fits candidates, and keeps the largest consensus.
/// The iteration budget shrinks adaptively as the observed inlier ratio
/// rises; `reproj_threshold` overrides the config default when given by the
/// caller profile (day/night/learned).
pub fn estimate_homography(
    source: &[(f64, f64)],
    reference: &[(f64, f64)],
    config: &EstimationConfig,
    reproj_threshold: f64,
) -> Result<EstimatedTransform, AlignError> {
    assert_eq!(source.len(), reference.len());
    let n = source.len();
    if n < MIN_SAMPLE {
        return Err(AlignError::InsufficientCorrespondences {
            found: n,
            required: MIN_SAMPLE,
        });
    }

    let mut rng = StdRng::seed_from_u64(RANSAC_SEED);
    let indices: Vec<usize> = (0..n).collect();

    let mut best_model: Option<Homography> = None;
    let mut best_mask: Vec<bool> = Vec::new();
    let mut best_count = 0usize;

    let mut budget = config.max_iterations.max(1);
    let mut iteration = 0usize;
    while iteration < budget {
        iteration += 1;

        let sample: Vec<usize> = indices
            .choose_multiple(&mut rng, MIN_SAMPLE)
            .cloned()
            .collect();
        let sample_src: Vec<(f64, f64)> = sample.iter().map(|&i| source[i]).collect();
        let sample_ref: Vec<(f64, f64)> = sample.iter().map(|&i| reference[i]).collect();

        if sample_degenerate(&sample_src) || sample_degenerate(&sample_ref) {
            continue;
        }
        let Some(candidate) = fit_homography(&sample_src, &sample_ref) else {
            continue;
        };

        let (count, mask) = count_inliers(&candidate, source, reference, reproj_threshold);
        if count > best_count {
            best_count = count;
            best_mask = mask;
            best_model = Some(candidate);

            let w = count as f64 / n as f64;
            if w >= 1.0 {
                break;
            }
            // Iterations needed for `confidence` odds of one clean sample.
            let miss = (1.0 - w.powi(4)).ln();
            if miss < 0.0 {
                let needed = ((1.0 - config.confidence).ln() / miss).ceil();
                if needed.is_finite() {
                    budget = budget.min((needed as usize).max(iteration));
                }
            }
        }
    }

    let sample_model = best_model.ok_or_else(|| {
        AlignError::DegenerateTransform("no consistent model found in sampling budget".into())
    })?;
    let floor = config.min_inliers.max(MIN_SAMPLE);
    if best_count < floor {
        return Err(AlignError::DegenerateTransform(format!(
            "consensus too small: {} inliers, floor {}",
            best_count, floor
        )));
    }

    // Re-fit on the full consensus set, keeping the sample model if the
    // refinement does not improve support.
    let inlier_src: Vec<(f64, f64)> = mask_select(source, &best_mask);
    let inlier_ref: Vec<(f64, f64)> = mask_select(reference, &best_mask);
    let (homography, inlier_mask, inlier_count) = match fit_homography(&inlier_src, &inlier_ref) {
        Some(refined) => {
            let (count, mask) = count_inliers(&refined, source, reference, reproj_threshold);
            if count >= best_count {
                (refined, mask, count)
            } else {
                (sample_model, best_mask, best_count)
            }
        }
        None => (sample_model, best_mask, best_count),
    };

    if !homography.is_invertible() {
        return Err(AlignError::DegenerateTransform(
            "estimated matrix is not invertible".into(),
        ));
    }

    Ok(EstimatedTransform {
        homography,
        inlier_mask,
        inlier_count,
    })
}

fn count_inliers(
    model: &Homography,
    source: &[(f64, f64)],
    reference: &[(f64, f64)],
    threshold: f64,
) -> (usize, Vec<bool>) {
    let mask: Vec<bool> = source
        .iter()
        .zip(reference.iter())
        .map(|(&s, &r)| model.reprojection_error(s, r) < threshold)
        .collect();
    let count = mask.iter().filter(|&&m| m).count();
    (count, mask)
}

fn mask_select(points: &[(f64, f64)], mask: &[bool]) -> Vec<(f64, f64)> {
    points
        .iter()
        .zip(mask.iter())
        .filter(|(_, &keep)| keep)
        .map(|(&p, _)| p)
        .collect()
}
