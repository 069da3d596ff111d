use crate::enhance::NightConfig;
use crate::estimation::EstimationConfig;
use crate::features::{FeaturesConfig, MatchingConfig};
use crate::strategies::learned::LearnedConfig;
use crate::template::TemplateConfig;
use crate::AlignMethod;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Full configuration of a run: locations, method, and per-stage tuning.
///
/// Every field has a working default, so a config file only needs the keys
/// it wants to change. Files are TOML by convention; content starting with
/// `{` is read as JSON instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Directory of frames to align.
    pub input: PathBuf,
    /// Directory receiving aligned frames and reports.
    pub output: PathBuf,
    pub method: AlignMethod,
    /// Position of the reference frame in the sorted image list.
    pub reference_index: usize,
    /// Markdown report location, `<output>/alignment_report.md` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    /// JSON summary location, `<output>/alignment_summary.json` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_path: Option<PathBuf>,
    pub features: FeaturesConfig,
    pub matching: MatchingConfig,
    pub estimation: EstimationConfig,
    pub night: NightConfig,
    pub template: TemplateConfig,
    pub learned: LearnedConfig,
}

#[derive(Debug, Clone)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl AlignmentConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        if content.trim_start().starts_with('{') {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, format: ConfigFormat) -> crate::Result<()> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };
        fs::write(path, content)?;
        Ok(())
    }

    pub fn report_file(&self) -> PathBuf {
        self.report_path
            .clone()
            .unwrap_or_else(|| self.output.join("alignment_report.md"))
    }

    pub fn summary_file(&self) -> PathBuf {
        self.summary_path
            .clone()
            .unwrap_or_else(|| self.output.join("alignment_summary.json"))
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.input.as_os_str().is_empty() {
            errors.push("input directory must be set".to_string());
        }
        if self.output.as_os_str().is_empty() {
            errors.push("output directory must be set".to_string());
        }
        if !self.input.as_os_str().is_empty() && self.input == self.output {
            errors.push("input and output directories must differ".to_string());
        }

        if self.features.fast_threshold == 0 {
            errors.push("features.fast_threshold must be positive".to_string());
        }
        if self.features.max_keypoints < 4 {
            errors.push("features.max_keypoints must be at least 4".to_string());
        }

        for (name, ratio) in [
            ("matching.ratio_threshold", self.matching.ratio_threshold),
            (
                "matching.night_ratio_threshold",
                self.matching.night_ratio_threshold,
            ),
        ] {
            if ratio <= 0.0 || ratio > 1.0 {
                errors.push(format!("{} must be within (0, 1]", name));
            }
        }
        if self.matching.min_correspondences < 4 {
            errors.push("matching.min_correspondences must be at least 4".to_string());
        }

        for (name, threshold) in [
            ("estimation.reproj_threshold", self.estimation.reproj_threshold),
            (
                "estimation.night_reproj_threshold",
                self.estimation.night_reproj_threshold,
            ),
            (
                "estimation.learned_reproj_threshold",
                self.estimation.learned_reproj_threshold,
            ),
        ] {
            if threshold <= 0.0 {
                errors.push(format!("{} must be positive", name));
            }
        }
        if self.estimation.max_iterations == 0 {
            errors.push("estimation.max_iterations must be positive".to_string());
        }
        if self.estimation.confidence <= 0.0 || self.estimation.confidence >= 1.0 {
            errors.push("estimation.confidence must be within (0, 1)".to_string());
        }
        if self.estimation.min_inliers < 4 {
            errors.push("estimation.min_inliers must be at least 4".to_string());
        }

        if self.night.clahe_grid == 0 {
            errors.push("night.clahe_grid must be positive".to_string());
        }
        if self.night.gamma <= 0.0 {
            errors.push("night.gamma must be positive".to_string());
        }

        if self.template.patch_fraction <= 0.0 || self.template.patch_fraction > 1.0 {
            errors.push("template.patch_fraction must be within (0, 1]".to_string());
        }
        if self.template.scales.is_empty() {
            errors.push("template.scales must not be empty".to_string());
        }
        if self.template.scales.iter().any(|&s| s <= 0.0) {
            errors.push("template.scales must all be positive".to_string());
        }
        if !(-1.0..=1.0).contains(&self.template.min_correlation) {
            errors.push("template.min_correlation must be within [-1, 1]".to_string());
        }

        if self.learned.min_confidence < 0.0 {
            errors.push("learned.min_confidence must be non-negative".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
