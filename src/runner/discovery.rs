//! Image discovery under the input root.

use crate::AlignError;
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Collect every image under `root`, recursing into subdirectories.
///
/// The result is sorted lexicographically so timestamp-named sequences come
/// back in capture order and the default reference (index 0) is stable
/// across runs and platforms.
pub fn discover_images(root: &Path) -> Result<Vec<PathBuf>, AlignError> {
    if !root.is_dir() {
        return Err(AlignError::Directory(format!(
            "input directory not found: {}",
            root.display()
        )));
    }
    let mut found = Vec::new();
    walk(root, &mut found)?;
    found.sort();
    found.dedup();
    if found.is_empty() {
        return Err(AlignError::Directory(format!(
            "no images found under {}",
            root.display()
        )));
    }
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<(), AlignError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| AlignError::Directory(format!("cannot read {}: {}", dir.display(), e)))?;
    for entry in entries {
        let entry = entry
            .map_err(|e| AlignError::Directory(format!("cannot read {}: {}", dir.display(), e)))?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, found)?;
        } else if is_image_path(&path) {
            found.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(path).unwrap();
    }

    #[test]
    fn finds_images_recursively_in_sorted_order() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("b.jpg"));
        touch(&dir.path().join("a.png"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("day2/c.JPG"));
        touch(&dir.path().join("day2/skip.raw"));

        let images = discover_images(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.png"),
                PathBuf::from("b.jpg"),
                PathBuf::from("day2/c.JPG"),
            ]
        );
    }

    #[test]
    fn missing_root_is_a_directory_error() {
        let err = discover_images(Path::new("/no/such/place")).unwrap_err();
        assert!(matches!(err, AlignError::Directory(_)));
    }

    #[test]
    fn empty_root_is_a_directory_error() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("readme.md"));
        let err = discover_images(dir.path()).unwrap_err();
        assert!(matches!(err, AlignError::Directory(_)));
    }

    #[test]
    fn extension_check_ignores_case_and_requires_one() {
        assert!(is_image_path(Path::new("x/y/IMG_001.TIFF")));
        assert!(is_image_path(Path::new("shot.jpeg")));
        assert!(!is_image_path(Path::new("archive.tar.gz")));
        assert!(!is_image_path(Path::new("noextension")));
    }
}
