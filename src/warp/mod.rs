//! Resampling of a source image into the reference pixel grid.
//!
//! Warping walks the output grid and maps each destination pixel back
//! through the inverse transform, so no holes appear in the result. Pixels
//! that land outside the source frame stay black.

use crate::estimation::Homography;
use crate::AlignError;
use image::{Rgb, RgbImage};

/// Resample `source` into the reference frame described by `homography`.
///
/// `homography` maps source coordinates to reference coordinates; the output
/// always has exactly `ref_width` x `ref_height` pixels.
pub fn warp_to_reference(
    source: &RgbImage,
    homography: &Homography,
    ref_width: u32,
    ref_height: u32,
) -> Result<RgbImage, AlignError> {
    let inverse = homography.inverse().ok_or_else(|| {
        AlignError::DegenerateTransform("transform is not invertible for resampling".into())
    })?;

    let mut output = RgbImage::new(ref_width, ref_height);
    for y in 0..ref_height {
        for x in 0..ref_width {
            let Some((sx, sy)) = inverse.project(x as f64, y as f64) else {
                continue;
            };
            if let Some(pixel) = sample_bilinear(source, sx, sy) {
                output.put_pixel(x, y, pixel);
            }
        }
    }
    Ok(output)
}

/// Bilinear sample at a fractional source position, `None` outside the frame.
///
/// The high neighbor clamps to the last row/column so integer coordinates on
/// the image border resample exactly instead of falling to black.
fn sample_bilinear(image: &RgbImage, x: f64, y: f64) -> Option<Rgb<u8>> {
    let (width, height) = image.dimensions();
    if x < 0.0 || y < 0.0 || x > (width - 1) as f64 || y > (height - 1) as f64 {
        return None;
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let dx = x - x0 as f64;
    let dy = y - y0 as f64;

    let p00 = image.get_pixel(x0, y0);
    let p10 = image.get_pixel(x1, y0);
    let p01 = image.get_pixel(x0, y1);
    let p11 = image.get_pixel(x1, y1);

    let mut blended = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - dx) + p10[c] as f64 * dx;
        let bottom = p01[c] as f64 * (1.0 - dx) + p11[c] as f64 * dx;
        blended[c] = (top * (1.0 - dy) + bottom * dy).round() as u8;
    }
    Some(Rgb(blended))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    fn gradient_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 20) as u8, (y * 30) as u8, ((x + y) * 10) as u8])
        })
    }

    #[test]
    fn identity_reproduces_the_source() {
        let source = gradient_image(8, 6);
        let warped = warp_to_reference(&source, &Homography::identity(), 8, 6).unwrap();
        assert_eq!(source.as_raw(), warped.as_raw());
    }

    #[test]
    fn translation_moves_content_into_place() {
        let mut source = RgbImage::new(10, 10);
        source.put_pixel(3, 4, Rgb([200, 0, 0]));

        let warped =
            warp_to_reference(&source, &Homography::translation(2.0, 1.0), 10, 10).unwrap();
        assert_eq!(warped.get_pixel(5, 5), &Rgb([200, 0, 0]));
        assert_eq!(warped.get_pixel(3, 4), &Rgb([0, 0, 0]));
    }

    #[test]
    fn fractional_shift_blends_neighbors() {
        let mut source = RgbImage::new(6, 6);
        source.put_pixel(2, 2, Rgb([100, 100, 100]));

        let warped =
            warp_to_reference(&source, &Homography::translation(0.5, 0.0), 6, 6).unwrap();
        assert_eq!(warped.get_pixel(2, 2), &Rgb([50, 50, 50]));
        assert_eq!(warped.get_pixel(3, 2), &Rgb([50, 50, 50]));
    }

    #[test]
    fn output_matches_reference_dimensions() {
        let source = gradient_image(10, 8);
        let warped = warp_to_reference(&source, &Homography::identity(), 7, 5).unwrap();
        assert_eq!(warped.dimensions(), (7, 5));
    }

    #[test]
    fn pixels_outside_the_source_stay_black() {
        let source = gradient_image(4, 4);
        let warped =
            warp_to_reference(&source, &Homography::translation(100.0, 100.0), 4, 4).unwrap();
        assert!(warped.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn singular_transform_is_rejected() {
        let source = gradient_image(4, 4);
        let broken = Homography {
            matrix: Matrix3::zeros(),
        };
        let err = warp_to_reference(&source, &broken, 4, 4).unwrap_err();
        assert!(matches!(err, AlignError::DegenerateTransform(_)));
    }
}
