//! Batch orchestration: discovery, the strategy chain, and the run report.

pub mod discovery;
pub mod report;

use crate::config::AlignmentConfig;
use crate::data;
use crate::strategies::{AlignInput, AlignmentStrategy, ClassicalAligner, LearnedAligner};
use crate::{AlignError, AlignMethod, ImageStatus};
use chrono::Utc;
use image::GrayImage;
use instant::Instant;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Per-image row of the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageOutcome {
    /// Path relative to the input root, mirrored under the output root.
    pub path: PathBuf,
    pub status: ImageStatus,
    /// Mechanism that produced the output file: "features", "template",
    /// "learned", "reference", or "none".
    pub method: String,
    pub correspondences: usize,
    pub inliers: usize,
    pub inlier_ratio: f32,
    /// True when the primary mechanism failed and a later one succeeded.
    pub fallback: bool,
    pub time_ms: f32,
    /// Collected strategy errors, empty on a clean first-try alignment.
    pub note: String,
}

/// Aggregated result of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated_at: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub method: AlignMethod,
    /// Reference frame, relative to the input root.
    pub reference: PathBuf,
    pub total_images: usize,
    pub aligned: usize,
    pub fallbacks: usize,
    pub failed: usize,
    pub mean_correspondences: f64,
    pub total_time_ms: f32,
    pub images: Vec<ImageOutcome>,
}

/// Drives a whole-directory alignment run.
///
/// One image failing to align never aborts the run; it is copied through
/// unaligned and recorded as failed. Directory-level problems (missing
/// input, reference index out of range, unwritable output) are fatal.
pub struct AlignmentCoordinator {
    config: AlignmentConfig,
}

impl AlignmentCoordinator {
    pub fn new(config: AlignmentConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> crate::Result<RunSummary> {
        let started = Instant::now();
        let input = &self.config.input;
        let output = &self.config.output;

        let images = discovery::discover_images(input)?;
        info!("discovered {} images under {}", images.len(), input.display());

        let reference_index = self.config.reference_index;
        if reference_index >= images.len() {
            return Err(AlignError::Directory(format!(
                "reference index {} out of range for {} images",
                reference_index,
                images.len()
            ))
            .into());
        }
        let reference_path = images[reference_index].clone();
        let reference_rel = relative_to(&reference_path, input);

        fs::create_dir_all(output)?;
        data::copy_unchanged(&reference_path, output.join(&reference_rel))?;
        // The reference itself must decode; nothing can align without it.
        let reference_rgb = data::load_image(&reference_path)?;
        let reference_gray = data::to_gray(&reference_rgb);
        info!("reference frame: {}", reference_rel.display());

        let strategies = self.build_chain();

        let mut outcomes = Vec::with_capacity(images.len());
        for (index, path) in images.iter().enumerate() {
            let rel = relative_to(path, input);
            if index == reference_index {
                outcomes.push(ImageOutcome {
                    path: rel,
                    status: ImageStatus::Reference,
                    method: "reference".into(),
                    correspondences: 0,
                    inliers: 0,
                    inlier_ratio: 0.0,
                    fallback: false,
                    time_ms: 0.0,
                    note: String::new(),
                });
                continue;
            }
            let outcome = self.process_one(
                path,
                rel,
                &reference_gray,
                &reference_path,
                &strategies,
                output,
            )?;
            outcomes.push(outcome);
        }

        let summary = summarize(
            &self.config,
            reference_rel,
            outcomes,
            started.elapsed().as_millis() as f32,
        );
        report::write_summary(&self.config.summary_file(), &summary)?;
        report::write_markdown(&self.config.report_file(), &summary)?;
        info!(
            "aligned {}/{} images ({} by fallback, {} failed) in {:.1} s",
            summary.aligned,
            summary.total_images.saturating_sub(1),
            summary.fallbacks,
            summary.failed,
            summary.total_time_ms / 1000.0
        );
        Ok(summary)
    }

    fn process_one(
        &self,
        path: &Path,
        rel: PathBuf,
        reference_gray: &GrayImage,
        reference_path: &Path,
        strategies: &[Box<dyn AlignmentStrategy>],
        output: &Path,
    ) -> crate::Result<ImageOutcome> {
        let start = Instant::now();
        let dest = output.join(&rel);

        let source_rgb = match data::load_image(path) {
            Ok(img) => img,
            Err(e) => {
                warn!(
                    "{}: cannot decode ({}), copying through unaligned",
                    rel.display(),
                    e
                );
                data::copy_unchanged(path, &dest)?;
                return Ok(ImageOutcome {
                    path: rel,
                    status: ImageStatus::Failed,
                    method: "none".into(),
                    correspondences: 0,
                    inliers: 0,
                    inlier_ratio: 0.0,
                    fallback: false,
                    time_ms: start.elapsed().as_millis() as f32,
                    note: format!("decode: {}", e),
                });
            }
        };
        let source_gray = data::to_gray(&source_rgb);
        let view = AlignInput {
            source_rgb: &source_rgb,
            source_gray: &source_gray,
            source_path: path,
            reference_gray,
            reference_path,
        };

        let mut notes: Vec<String> = Vec::new();
        for strategy in strategies {
            match strategy.align(&view) {
                Ok(success) => {
                    data::save_image(&success.warped, &dest)?;
                    info!(
                        "{}: aligned via {} ({} correspondences, {} inliers)",
                        rel.display(),
                        success.method,
                        success.correspondences,
                        success.inliers
                    );
                    let fallback = success.fallback || !notes.is_empty();
                    return Ok(ImageOutcome {
                        path: rel,
                        status: ImageStatus::Aligned,
                        method: success.method.into(),
                        correspondences: success.correspondences,
                        inliers: success.inliers,
                        inlier_ratio: success.inlier_ratio,
                        fallback,
                        time_ms: start.elapsed().as_millis() as f32,
                        note: notes.join("; "),
                    });
                }
                Err(err) => {
                    warn!(
                        "{}: {} strategy failed: {}",
                        rel.display(),
                        strategy.name(),
                        err
                    );
                    notes.push(format!("{}: {}", strategy.name(), err));
                }
            }
        }

        warn!(
            "{}: all strategies failed, copying through unaligned",
            rel.display()
        );
        data::copy_unchanged(path, &dest)?;
        Ok(ImageOutcome {
            path: rel,
            status: ImageStatus::Failed,
            method: "none".into(),
            correspondences: 0,
            inliers: 0,
            inlier_ratio: 0.0,
            fallback: false,
            time_ms: start.elapsed().as_millis() as f32,
            note: notes.join("; "),
        })
    }

    fn build_chain(&self) -> Vec<Box<dyn AlignmentStrategy>> {
        match self.config.method {
            AlignMethod::Classical => vec![Box::new(ClassicalAligner::new(&self.config))],
            AlignMethod::Learned => vec![Box::new(LearnedAligner::new(&self.config))],
            AlignMethod::Auto => {
                if self.config.learned.command().is_some() {
                    vec![
                        Box::new(LearnedAligner::new(&self.config)),
                        Box::new(ClassicalAligner::new(&self.config)),
                    ]
                } else {
                    info!("no dense matcher configured, auto mode runs the classical pipeline only");
                    vec![Box::new(ClassicalAligner::new(&self.config))]
                }
            }
        }
    }
}

fn relative_to(path: &Path, root: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

fn summarize(
    config: &AlignmentConfig,
    reference: PathBuf,
    outcomes: Vec<ImageOutcome>,
    total_time_ms: f32,
) -> RunSummary {
    let aligned = outcomes
        .iter()
        .filter(|o| o.status == ImageStatus::Aligned)
        .count();
    let failed = outcomes
        .iter()
        .filter(|o| o.status == ImageStatus::Failed)
        .count();
    let fallbacks = outcomes.iter().filter(|o| o.fallback).count();
    let correspondence_sum: usize = outcomes
        .iter()
        .filter(|o| o.status == ImageStatus::Aligned)
        .map(|o| o.correspondences)
        .sum();
    let mean_correspondences = if aligned > 0 {
        correspondence_sum as f64 / aligned as f64
    } else {
        0.0
    };

    RunSummary {
        generated_at: Utc::now().to_rfc3339(),
        input_dir: config.input.clone(),
        output_dir: config.output.clone(),
        method: config.method,
        reference,
        total_images: outcomes.len(),
        aligned,
        fallbacks,
        failed,
        mean_correspondences,
        total_time_ms,
        images: outcomes,
    }
}
