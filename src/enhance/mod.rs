//! Low-light detection and normalization.
//!
//! Night frames in a fixed-scene sequence lose most of their corner
//! structure to sensor noise and underexposure. Before feature detection
//! the pipeline measures mean brightness, and below the configured
//! threshold it runs contrast-limited adaptive equalization followed by a
//! gamma lift on both the frame and the reference.

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NightConfig {
    /// Mean-intensity cutoff below which a frame is treated as low-light.
    pub brightness_threshold: f64,
    /// Clip limit as a multiplier on the uniform bin count per tile.
    pub clahe_clip: f32,
    /// Equalization tiles per axis.
    pub clahe_grid: u32,
    /// Gamma lift applied after equalization; values above 1.0 brighten.
    pub gamma: f32,
}

impl Default for NightConfig {
    fn default() -> Self {
        Self {
            brightness_threshold: 80.0,
            clahe_clip: 3.0,
            clahe_grid: 8,
            gamma: 1.5,
        }
    }
}

/// Mean pixel intensity over the whole frame.
pub fn mean_intensity(image: &GrayImage) -> f64 {
    let data = image.as_raw();
    if data.is_empty() {
        return 0.0;
    }
    let sum: u64 = data.iter().map(|&v| v as u64).sum();
    sum as f64 / data.len() as f64
}

pub fn is_low_light(image: &GrayImage, config: &NightConfig) -> bool {
    mean_intensity(image) < config.brightness_threshold
}

/// Full low-light normalization: adaptive equalization, then a gamma lift.
pub fn normalize_low_light(image: &GrayImage, config: &NightConfig) -> GrayImage {
    let equalized = equalize_adaptive(image, config.clahe_grid, config.clahe_clip);
    gamma_correct(&equalized, config.gamma)
}

/// Contrast-limited adaptive histogram equalization.
///
/// The frame is covered by `grid` x `grid` tiles, each tile gets its own
/// clipped-histogram lookup table, and every pixel blends the tables of the
/// four nearest tile centers so tile seams stay invisible.
pub fn equalize_adaptive(image: &GrayImage, grid: u32, clip: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || grid == 0 {
        return image.clone();
    }

    let cols = grid.min(width) as usize;
    let rows = grid.min(height) as usize;
    let tile_w = (width as usize + cols - 1) / cols;
    let tile_h = (height as usize + rows - 1) / rows;

    let mut tile_luts = vec![[0u8; 256]; cols * rows];
    for ty in 0..rows {
        for tx in 0..cols {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width as usize);
            let y1 = (y0 + tile_h).min(height as usize);
            let tile_pixels = (x1 - x0) * (y1 - y0);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x as u32, y as u32)[0] as usize] += 1;
                }
            }
            if clip > 0.0 {
                clip_histogram(&mut hist, tile_pixels, clip);
            }
            tile_luts[ty * cols + tx] = build_tile_lut(&hist, tile_pixels);
        }
    }

    let tile_cx = |tx: usize| (tx as f32 + 0.5) * tile_w as f32;
    let tile_cy = |ty: usize| (ty as f32 + 0.5) * tile_h as f32;

    GrayImage::from_fn(width, height, |x, y| {
        let px = x as f32;
        let py = y as f32;

        let fx = px / tile_w as f32 - 0.5;
        let fy = py / tile_h as f32 - 0.5;
        let tx0 = (fx.floor() as isize).max(0) as usize;
        let ty0 = (fy.floor() as isize).max(0) as usize;
        let tx1 = (tx0 + 1).min(cols - 1);
        let ty1 = (ty0 + 1).min(rows - 1);

        let ax = if tx0 == tx1 {
            0.0
        } else {
            ((px - tile_cx(tx0)) / (tile_cx(tx1) - tile_cx(tx0))).clamp(0.0, 1.0)
        };
        let ay = if ty0 == ty1 {
            0.0
        } else {
            ((py - tile_cy(ty0)) / (tile_cy(ty1) - tile_cy(ty0))).clamp(0.0, 1.0)
        };

        let v = image.get_pixel(x, y)[0] as usize;
        let v00 = tile_luts[ty0 * cols + tx0][v] as f32;
        let v10 = tile_luts[ty0 * cols + tx1][v] as f32;
        let v01 = tile_luts[ty1 * cols + tx0][v] as f32;
        let v11 = tile_luts[ty1 * cols + tx1][v] as f32;

        let blended = v00 * (1.0 - ax) * (1.0 - ay)
            + v10 * ax * (1.0 - ay)
            + v01 * (1.0 - ax) * ay
            + v11 * ax * ay;
        Luma([blended.round().clamp(0.0, 255.0) as u8])
    })
}

/// Remap intensities through `v_out = 255 * (v_in / 255)^(1 / gamma)`.
pub fn gamma_correct(image: &GrayImage, gamma: f32) -> GrayImage {
    if gamma <= 0.0 {
        return image.clone();
    }
    let exponent = 1.0 / gamma;
    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate() {
        let normalized = (v as f32 / 255.0).powf(exponent);
        *slot = (normalized * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([lut[image.get_pixel(x, y)[0] as usize]])
    })
}

/// Cap each bin at the clip limit and spread the excess evenly.
fn clip_histogram(hist: &mut [u32; 256], tile_pixels: usize, clip: f32) {
    let clip_val = ((tile_pixels as f32 / 256.0) * clip).ceil() as u32;

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip_val {
            excess += *bin - clip_val;
            *bin = clip_val;
        }
    }

    let per_bin = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += per_bin;
        if i < remainder {
            *bin += 1;
        }
    }
}

/// Cumulative-distribution lookup table for one tile.
fn build_tile_lut(hist: &[u32; 256], tile_pixels: usize) -> [u8; 256] {
    let mut cdf = [0u32; 256];
    cdf[0] = hist[0];
    for i in 1..256 {
        cdf[i] = cdf[i - 1] + hist[i];
    }
    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);

    let mut lut = [0u8; 256];
    let denom = tile_pixels as f32 - cdf_min as f32;
    if denom <= 0.0 {
        return lut;
    }
    for i in 0..256 {
        let val = (cdf[i] as f32 - cdf_min as f32) / denom * 255.0;
        lut[i] = val.round().clamp(0.0, 255.0) as u8;
    }
    lut
}
