pub mod homography;
pub mod ransac;

pub use homography::{fit_homography, Homography};
pub use ransac::{estimate_homography, EstimatedTransform, EstimationConfig};
