//! Rotated binary descriptors over a 31x31 patch.

use super::{Descriptor, Keypoint};
use image::GrayImage;

const PATTERN_TESTS: usize = 256;

/// Describe each keypoint with a 256-bit comparison descriptor. The test
/// pattern is fixed, so descriptors from different images are comparable;
/// rotating the pattern by the keypoint angle makes them rotation-tolerant.
pub fn describe(image: &GrayImage, keypoints: &[Keypoint]) -> Vec<Descriptor> {
    let pattern = test_pattern();
    keypoints
        .iter()
        .map(|kp| describe_one(image, kp, &pattern))
        .collect()
}

fn describe_one(image: &GrayImage, keypoint: &Keypoint, pattern: &[(i8, i8, i8, i8)]) -> Descriptor {
    let mut descriptor = [0u8; 32];
    let x = keypoint.x as i32;
    let y = keypoint.y as i32;
    let cos_a = keypoint.angle.cos();
    let sin_a = keypoint.angle.sin();

    let w = image.width() as i32;
    let h = image.height() as i32;

    for (byte_idx, byte_tests) in pattern.chunks(8).enumerate() {
        let mut byte_val = 0u8;
        for (bit_idx, &(dx1, dy1, dx2, dy2)) in byte_tests.iter().enumerate() {
            let (rx1, ry1) = rotate(dx1, dy1, cos_a, sin_a);
            let (rx2, ry2) = rotate(dx2, dy2, cos_a, sin_a);

            let p1x = (x + rx1).clamp(0, w - 1) as u32;
            let p1y = (y + ry1).clamp(0, h - 1) as u32;
            let p2x = (x + rx2).clamp(0, w - 1) as u32;
            let p2y = (y + ry2).clamp(0, h - 1) as u32;

            if image.get_pixel(p1x, p1y)[0] < image.get_pixel(p2x, p2y)[0] {
                byte_val |= 1 << bit_idx;
            }
        }
        descriptor[byte_idx] = byte_val;
    }

    descriptor
}

fn rotate(dx: i8, dy: i8, cos_a: f32, sin_a: f32) -> (i32, i32) {
    let rx = (dx as f32 * cos_a - dy as f32 * sin_a) as i32;
    let ry = (dx as f32 * sin_a + dy as f32 * cos_a) as i32;
    (rx, ry)
}

/// Pseudo-random point pairs inside the 31x31 patch, derived from a fixed
/// linear congruential sequence so every call yields the same pattern.
fn test_pattern() -> Vec<(i8, i8, i8, i8)> {
    let mut pattern = Vec::with_capacity(PATTERN_TESTS);
    for i in 0..PATTERN_TESTS as u32 {
        let x1 = (lcg(i) % 31) as i8 - 15;
        let y1 = (lcg(i + 1) % 31) as i8 - 15;
        let x2 = (lcg(i + 2) % 31) as i8 - 15;
        let y2 = (lcg(i + 3) % 31) as i8 - 15;
        pattern.push((x1, y1, x2, y2));
    }
    pattern
}

fn lcg(seed: u32) -> u32 {
    seed.wrapping_mul(1103515245).wrapping_add(12345)
}
