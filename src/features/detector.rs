//! FAST corner detection with orientation assignment.
//!
//! Segment test over a Bresenham circle of 16 pixels: a pixel is a corner
//! when at least 9 contiguous circle pixels are all brighter or all darker
//! than the center by the threshold. Surviving corners get a variance-based
//! response, non-maximum suppression, and an intensity-centroid orientation.

use super::Keypoint;
use image::GrayImage;
use std::cmp::Ordering;

/// Circle offsets for the 16-pixel segment test, clockwise from 12 o'clock.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

const SEGMENT_LENGTH: u32 = 9;
const SUPPRESSION_RADIUS: f32 = 3.0;
const ORIENTATION_RADIUS: i32 = 15;

pub fn detect_corners(image: &GrayImage, threshold: u8, max_keypoints: usize) -> Vec<Keypoint> {
    let (width, height) = (image.width(), image.height());
    if width < 7 || height < 7 {
        return Vec::new();
    }

    let mut corners = Vec::new();
    for y in 3..(height - 3) {
        for x in 3..(width - 3) {
            let center = image.get_pixel(x, y)[0];
            if is_corner(image, x, y, center, threshold) {
                corners.push(Keypoint {
                    x: x as f32,
                    y: y as f32,
                    response: corner_response(image, x, y),
                    angle: 0.0,
                });
            }
        }
    }

    let mut selected = suppress_non_maxima(corners, max_keypoints);
    for corner in &mut selected {
        corner.angle = orientation(image, corner.x as u32, corner.y as u32);
    }
    selected
}

fn is_corner(image: &GrayImage, x: u32, y: u32, center: u8, threshold: u8) -> bool {
    let bright = center.saturating_add(threshold);
    let dark = center.saturating_sub(threshold);

    let mut run_bright = 0u32;
    let mut run_dark = 0u32;
    let mut best_bright = 0u32;
    let mut best_dark = 0u32;

    // Walk the circle twice so a contiguous run may wrap around the seam.
    for i in 0..(CIRCLE.len() * 2) {
        let (dx, dy) = CIRCLE[i % CIRCLE.len()];
        let px = (x as i32 + dx) as u32;
        let py = (y as i32 + dy) as u32;
        let pixel = image.get_pixel(px, py)[0];

        if pixel > bright {
            run_bright += 1;
            run_dark = 0;
            best_bright = best_bright.max(run_bright);
        } else if pixel < dark {
            run_dark += 1;
            run_bright = 0;
            best_dark = best_dark.max(run_dark);
        } else {
            run_bright = 0;
            run_dark = 0;
        }
    }

    best_bright >= SEGMENT_LENGTH || best_dark >= SEGMENT_LENGTH
}

/// Local intensity spread; sharper structure scores higher.
fn corner_response(image: &GrayImage, x: u32, y: u32) -> f32 {
    let mut sum = 0.0f32;
    let mut sum_sq = 0.0f32;
    let mut count = 0u32;

    for dy in -2i32..=2 {
        for dx in -2i32..=2 {
            let px = x as i32 + dx;
            let py = y as i32 + dy;
            if px >= 0 && py >= 0 && (px as u32) < image.width() && (py as u32) < image.height() {
                let v = image.get_pixel(px as u32, py as u32)[0] as f32;
                sum += v;
                sum_sq += v * v;
                count += 1;
            }
        }
    }

    let mean = sum / count as f32;
    let variance = (sum_sq / count as f32) - mean * mean;
    variance.max(0.0).sqrt()
}

fn suppress_non_maxima(mut corners: Vec<Keypoint>, max_keypoints: usize) -> Vec<Keypoint> {
    if corners.is_empty() {
        return corners;
    }
    corners.sort_by(|a, b| b.response.partial_cmp(&a.response).unwrap_or(Ordering::Equal));

    let mut selected: Vec<Keypoint> = Vec::new();
    for corner in corners {
        let crowded = selected.iter().any(|kept| {
            let dx = corner.x - kept.x;
            let dy = corner.y - kept.y;
            (dx * dx + dy * dy).sqrt() < SUPPRESSION_RADIUS
        });
        if !crowded {
            selected.push(corner);
            if selected.len() >= max_keypoints {
                break;
            }
        }
    }
    selected
}

/// Intensity-centroid orientation over a circular patch.
fn orientation(image: &GrayImage, x: u32, y: u32) -> f32 {
    let mut m01 = 0.0f32;
    let mut m10 = 0.0f32;

    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            let px = x as i32 + dx;
            let py = y as i32 + dy;
            if px < 0 || py < 0 || px as u32 >= image.width() || py as u32 >= image.height() {
                continue;
            }
            if dx * dx + dy * dy > ORIENTATION_RADIUS * ORIENTATION_RADIUS {
                continue;
            }
            let v = image.get_pixel(px as u32, py as u32)[0] as f32;
            m01 += v * dy as f32;
            m10 += v * dx as f32;
        }
    }

    m01.atan2(m10)
}
