use image::{GrayImage, RgbImage};
use std::fs;
use std::path::Path;

/// Decode an image from disk, keeping color for output generation.
pub fn load_image<P: AsRef<Path>>(path: P) -> crate::Result<RgbImage> {
    let img = image::open(path.as_ref())?;
    Ok(img.to_rgb8())
}

/// Single-channel intensity view used by every alignment computation.
pub fn to_gray(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// Encode an image, creating parent directories as needed.
pub fn save_image<P: AsRef<Path>>(image: &RgbImage, path: P) -> crate::Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    image.save(path.as_ref())?;
    Ok(())
}

/// Byte-for-byte copy, used for the reference image and for failed images.
pub fn copy_unchanged<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q) -> crate::Result<()> {
    if let Some(parent) = dst.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src.as_ref(), dst.as_ref())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn gray_conversion_preserves_dimensions() {
        let mut img = RgbImage::new(12, 7);
        img.put_pixel(3, 2, Rgb([200, 100, 50]));
        let gray = to_gray(&img);
        assert_eq!(gray.width(), 12);
        assert_eq!(gray.height(), 7);
    }

    #[test]
    fn copy_is_byte_identical() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("a.bin");
        let dst = dir.path().join("nested/b.bin");
        fs::write(&src, b"not actually an image").unwrap();
        copy_unchanged(&src, &dst).unwrap();
        assert_eq!(fs::read(&src).unwrap(), fs::read(&dst).unwrap());
    }

}
