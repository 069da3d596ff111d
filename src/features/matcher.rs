use super::{Descriptor, FeatureSet};
use serde::{Deserialize, Serialize};

/// One filtered match between two feature sets, by index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub source_idx: usize,
    pub reference_idx: usize,
    pub distance: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Distinctiveness ratio: best distance must be below this fraction of
    /// the second-best distance.
    pub ratio_threshold: f32,
    /// Relaxed ratio used for low-light scenes.
    pub night_ratio_threshold: f32,
    /// Below this many correspondences the feature path is considered too
    /// thin and the template fallback takes over.
    pub min_correspondences: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.7,
            night_ratio_threshold: 0.75,
            min_correspondences: 50,
        }
    }
}

/// Two-nearest-neighbor matching with the ratio test. An empty result is a
/// quality signal for the caller, never an error: blank or dissimilar image
/// pairs legitimately share nothing.
pub fn match_descriptors(
    source: &FeatureSet,
    reference: &FeatureSet,
    ratio_threshold: f32,
) -> Vec<Correspondence> {
    if reference.len() < 2 {
        return Vec::new();
    }

    let mut matches = Vec::new();
    for (source_idx, desc) in source.descriptors.iter().enumerate() {
        let mut best = u32::MAX;
        let mut second = u32::MAX;
        let mut best_idx = 0usize;

        for (reference_idx, candidate) in reference.descriptors.iter().enumerate() {
            let distance = hamming(desc, candidate);
            if distance < best {
                second = best;
                best = distance;
                best_idx = reference_idx;
            } else if distance < second {
                second = distance;
            }
        }

        if second > 0 && (best as f32) < ratio_threshold * second as f32 {
            matches.push(Correspondence {
                source_idx,
                reference_idx: best_idx,
                distance: best,
            });
        }
    }
    matches
}

pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Keypoint;

    fn kp(x: f32, y: f32) -> Keypoint {
        Keypoint {
            x,
            y,
            response: 1.0,
            angle: 0.0,
        }
    }

    fn feature_set(descriptors: Vec<Descriptor>) -> FeatureSet {
        let keypoints = descriptors
            .iter()
            .enumerate()
            .map(|(i, _)| kp(i as f32, i as f32))
            .collect();
        FeatureSet {
            keypoints,
            descriptors,
        }
    }

    #[test]
    fn empty_sets_yield_empty_matches() {
        let empty = FeatureSet::default();
        assert!(match_descriptors(&empty, &empty, 0.7).is_empty());
    }

    #[test]
    fn distinct_match_survives_ratio_test() {
        let mut near = [0u8; 32];
        near[0] = 0b0000_0001; // distance 1 from zero
        let mut far = [0xFFu8; 32];
        far[0] = 0x00; // distance 224 from zero
        let source = feature_set(vec![[0u8; 32]]);
        let reference = feature_set(vec![near, far]);

        let matches = match_descriptors(&source, &reference, 0.7);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].reference_idx, 0);
        assert_eq!(matches[0].distance, 1);
    }

    #[test]
    fn ambiguous_match_is_rejected() {
        let mut a = [0u8; 32];
        a[0] = 0b0000_0011; // distance 2
        let mut b = [0u8; 32];
        b[1] = 0b0000_0011; // also distance 2
        let source = feature_set(vec![[0u8; 32]]);
        let reference = feature_set(vec![a, b]);

        // best == second-best, the ratio test must reject.
        assert!(match_descriptors(&source, &reference, 0.7).is_empty());
    }

    #[test]
    fn single_reference_descriptor_cannot_be_ranked() {
        let source = feature_set(vec![[0u8; 32]]);
        let reference = feature_set(vec![[0u8; 32]]);
        assert!(match_descriptors(&source, &reference, 0.7).is_empty());
    }

    #[test]
    fn hamming_counts_differing_bits() {
        let a = [0u8; 32];
        let mut b = [0u8; 32];
        b[0] = 0xFF;
        b[31] = 0x0F;
        assert_eq!(hamming(&a, &b), 12);
        assert_eq!(hamming(&a, &a), 0);
    }
}
