pub mod config;
pub mod data;
pub mod enhance;
pub mod estimation;
pub mod features;
pub mod runner;
pub mod strategies;
pub mod template;
pub mod warp;

pub use config::AlignmentConfig;
pub use runner::{AlignmentCoordinator, ImageOutcome, RunSummary};
pub use strategies::{AlignSuccess, AlignmentStrategy};

pub type Result<T> = anyhow::Result<T>;

/// Failure taxonomy shared by the alignment strategies and the batch runner.
///
/// Every variant except `Directory` is recoverable at the image level: the
/// runner converts it into a `failed` outcome and keeps going. `Directory`
/// aborts the run before any per-image work.
#[derive(Debug, Clone, PartialEq)]
pub enum AlignError {
    /// The image could not be decoded or yielded zero keypoints.
    Extraction(String),
    /// Too few matches survived the distinctiveness test.
    InsufficientCorrespondences { found: usize, required: usize },
    /// No consistent, invertible model could be estimated.
    DegenerateTransform(String),
    /// The external dense-matching capability is missing or unusable.
    CapabilityUnavailable(String),
    /// Input path missing, no images found, or reference index out of range.
    Directory(String),
}

impl std::fmt::Display for AlignError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlignError::Extraction(msg) => write!(f, "feature extraction failed: {}", msg),
            AlignError::InsufficientCorrespondences { found, required } => write!(
                f,
                "insufficient correspondences: {} found, {} required",
                found, required
            ),
            AlignError::DegenerateTransform(msg) => {
                write!(f, "degenerate transform: {}", msg)
            }
            AlignError::CapabilityUnavailable(msg) => {
                write!(f, "dense matching capability unavailable: {}", msg)
            }
            AlignError::Directory(msg) => write!(f, "directory error: {}", msg),
        }
    }
}

impl std::error::Error for AlignError {}

/// Strategy selection for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignMethod {
    /// Try the learned matcher first, retry with the classical pipeline on failure.
    #[default]
    Auto,
    /// Feature-based pipeline with template-matching fallback.
    Classical,
    /// External dense matcher only; no implicit fallback.
    Learned,
}

impl std::str::FromStr for AlignMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(AlignMethod::Auto),
            "classical" => Ok(AlignMethod::Classical),
            "learned" => Ok(AlignMethod::Learned),
            other => Err(anyhow::anyhow!(
                "unknown method '{}', expected auto, classical, or learned",
                other
            )),
        }
    }
}

impl std::fmt::Display for AlignMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlignMethod::Auto => write!(f, "auto"),
            AlignMethod::Classical => write!(f, "classical"),
            AlignMethod::Learned => write!(f, "learned"),
        }
    }
}

/// Per-image outcome classification carried into the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Aligned,
    Reference,
    Failed,
}
