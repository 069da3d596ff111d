//! Coarse translation recovery by multi-scale template matching.
//!
//! When feature matching collapses the runner still needs a rough
//! alignment, so a central patch of the source frame is swept across the
//! reference at several scales with normalized cross-correlation. The best
//! peak, if it correlates strongly enough, yields a translation-only
//! transform.

use image::imageops::{self, FilterType};
use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Side fraction of the source frame used as the matching patch.
    pub patch_fraction: f64,
    /// Relative patch scales swept to absorb mild zoom between frames.
    pub scales: Vec<f64>,
    /// Peaks correlating below this value are discarded.
    pub min_correlation: f32,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            patch_fraction: 0.5,
            scales: vec![0.8, 0.9, 1.0, 1.1, 1.2],
            min_correlation: 0.3,
        }
    }
}

/// Best correlation peak over all scales.
#[derive(Debug, Clone, Copy)]
pub struct TemplateMatch {
    /// Source-to-reference shift of the patch center.
    pub dx: f64,
    pub dy: f64,
    /// Raw correlation in [-1, 1].
    pub score: f32,
    pub scale: f64,
}

impl TemplateMatch {
    /// Correlation rescaled to [0, 1] for reporting.
    pub fn confidence(&self) -> f32 {
        (self.score + 1.0) / 2.0
    }
}

/// Recover a coarse source-to-reference translation, `None` when no patch
/// scale correlates above the configured floor.
pub fn coarse_translation(
    source: &GrayImage,
    reference: &GrayImage,
    config: &TemplateConfig,
) -> Option<TemplateMatch> {
    let (width, height) = source.dimensions();
    let patch_w = (width as f64 * config.patch_fraction).round() as u32;
    let patch_h = (height as f64 * config.patch_fraction).round() as u32;
    if patch_w < 8 || patch_h < 8 {
        return None;
    }
    let x0 = (width - patch_w) / 2;
    let y0 = (height - patch_h) / 2;
    let patch = imageops::crop_imm(source, x0, y0, patch_w, patch_h).to_image();
    let patch_center = (
        x0 as f64 + patch_w as f64 / 2.0,
        y0 as f64 + patch_h as f64 / 2.0,
    );

    let mut best: Option<TemplateMatch> = None;
    for &scale in &config.scales {
        let scaled_w = (patch_w as f64 * scale).round() as u32;
        let scaled_h = (patch_h as f64 * scale).round() as u32;
        if scaled_w < 4 || scaled_h < 4 {
            continue;
        }
        if scaled_w > reference.width() || scaled_h > reference.height() {
            continue;
        }
        let template = if scale == 1.0 {
            patch.clone()
        } else {
            imageops::resize(&patch, scaled_w, scaled_h, FilterType::Triangle)
        };

        let Some((score, px, py)) = correlate(&template, reference) else {
            continue;
        };
        if best.as_ref().map_or(true, |b| score > b.score) {
            let match_center = (
                px as f64 + scaled_w as f64 / 2.0,
                py as f64 + scaled_h as f64 / 2.0,
            );
            best = Some(TemplateMatch {
                dx: match_center.0 - patch_center.0,
                dy: match_center.1 - patch_center.1,
                score,
                scale,
            });
        }
    }

    best.filter(|m| m.score >= config.min_correlation)
}

/// Sweep `template` over `reference` and return the refined peak.
fn correlate(template: &GrayImage, reference: &GrayImage) -> Option<(f32, f32, f32)> {
    let (t_width, t_height) = template.dimensions();
    let (r_width, r_height) = reference.dimensions();
    if t_width > r_width || t_height > r_height {
        return None;
    }

    let template_mean = mean(template);
    let template_std = std_dev(template, template_mean);
    if template_std < 1e-6 {
        return None;
    }

    let search_width = r_width - t_width + 1;
    let search_height = r_height - t_height + 1;
    let scores: Vec<(f32, u32, u32)> = (0..search_height)
        .into_par_iter()
        .flat_map(|y| {
            (0..search_width).into_par_iter().map(move |x| {
                let score = ncc_at(template, reference, x, y, template_mean, template_std);
                (score, x, y)
            })
        })
        .collect();

    let (peak_score, peak_x, peak_y) = scores
        .into_iter()
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal))?;
    let (sub_x, sub_y) = refine_peak(
        template,
        reference,
        peak_x,
        peak_y,
        template_mean,
        template_std,
    );
    Some((peak_score, sub_x, sub_y))
}

fn mean(image: &GrayImage) -> f32 {
    let sum: u64 = image.pixels().map(|p| p[0] as u64).sum();
    sum as f32 / (image.width() * image.height()) as f32
}

fn std_dev(image: &GrayImage, mean: f32) -> f32 {
    let variance: f32 = image
        .pixels()
        .map(|p| {
            let diff = p[0] as f32 - mean;
            diff * diff
        })
        .sum::<f32>()
        / (image.width() * image.height()) as f32;
    variance.sqrt()
}

/// Normalized cross-correlation of the template against one window.
fn ncc_at(
    template: &GrayImage,
    reference: &GrayImage,
    offset_x: u32,
    offset_y: u32,
    template_mean: f32,
    template_std: f32,
) -> f32 {
    let (t_width, t_height) = template.dimensions();
    let mut sum_window = 0.0f32;
    let mut sum_window_sq = 0.0f32;
    let mut sum_product = 0.0f32;

    for y in 0..t_height {
        for x in 0..t_width {
            let t_val = template.get_pixel(x, y)[0] as f32;
            let w_val = reference.get_pixel(x + offset_x, y + offset_y)[0] as f32;
            sum_window += w_val;
            sum_window_sq += w_val * w_val;
            sum_product += t_val * w_val;
        }
    }

    let n = (t_width * t_height) as f32;
    let window_mean = sum_window / n;
    let window_std = ((sum_window_sq / n) - window_mean * window_mean).max(0.0).sqrt();
    if window_std < 1e-6 {
        return 0.0;
    }
    ((sum_product / n) - template_mean * window_mean) / (template_std * window_std)
}

/// Parabolic sub-pixel refinement around the integer peak.
fn refine_peak(
    template: &GrayImage,
    reference: &GrayImage,
    peak_x: u32,
    peak_y: u32,
    template_mean: f32,
    template_std: f32,
) -> (f32, f32) {
    let (t_width, t_height) = template.dimensions();
    let (r_width, r_height) = reference.dimensions();
    if peak_x == 0
        || peak_y == 0
        || peak_x >= r_width - t_width
        || peak_y >= r_height - t_height
    {
        return (peak_x as f32, peak_y as f32);
    }

    let at = |x: u32, y: u32| ncc_at(template, reference, x, y, template_mean, template_std);
    let center = at(peak_x, peak_y);
    let left = at(peak_x - 1, peak_y);
    let right = at(peak_x + 1, peak_y);
    let up = at(peak_x, peak_y - 1);
    let down = at(peak_x, peak_y + 1);

    let denom_x = left - 2.0 * center + right;
    let dx = if denom_x.abs() > 1e-9 {
        0.5 * (left - right) / denom_x
    } else {
        0.0
    };
    let denom_y = up - 2.0 * center + down;
    let dy = if denom_y.abs() > 1e-9 {
        0.5 * (up - down) / denom_y
    } else {
        0.0
    };

    (peak_x as f32 + dx, peak_y as f32 + dy)
}
