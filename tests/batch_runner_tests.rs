use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use timelapse_align::runner::report;
use timelapse_align::{AlignError, AlignMethod, AlignmentConfig, AlignmentCoordinator, ImageStatus};

fn scatter(count: usize, width: u32, height: u32, salt: u64) -> Vec<(u32, u32)> {
    let mut state = salt
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    let mut centers = Vec::with_capacity(count);
    for _ in 0..count {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let x = 10 + ((state >> 33) % (width as u64 - 20)) as u32;
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let y = 10 + ((state >> 33) % (height as u64 - 20)) as u32;
        centers.push((x, y));
    }
    centers
}

fn dot_frame(width: u32, height: u32, centers: &[(u32, u32)], dx: i32, dy: i32) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, Rgb([120, 120, 120]));
    for &(cx, cy) in centers {
        let cx = (cx as i32 + dx) as u32;
        let cy = (cy as i32 + dy) as u32;
        for oy in 0..3 {
            for ox in 0..3 {
                let x = cx + ox;
                let y = cy + oy;
                if x < width && y < height {
                    image.put_pixel(x, y, Rgb([250, 250, 250]));
                }
            }
        }
    }
    image
}

fn seed_sequence(input: &Path) -> Vec<(u32, u32)> {
    fs::create_dir_all(input).unwrap();
    let centers = scatter(60, 160, 120, 7);
    dot_frame(160, 120, &centers, 0, 0)
        .save(input.join("frame_0000.png"))
        .unwrap();
    dot_frame(160, 120, &centers, 5, 2)
        .save(input.join("frame_0001.png"))
        .unwrap();
    dot_frame(160, 120, &centers, -3, 4)
        .save(input.join("frame_0002.png"))
        .unwrap();
    centers
}

fn base_config(input: &Path, output: &Path) -> AlignmentConfig {
    let mut config = AlignmentConfig::default();
    config.input = input.to_path_buf();
    config.output = output.to_path_buf();
    config.method = AlignMethod::Classical;
    config.matching.min_correspondences = 10;
    config
}

fn mismatch_fraction(a: &RgbImage, b: &RgbImage, margin: u32) -> f64 {
    let mut off = 0u32;
    let mut total = 0u32;
    for y in margin..b.height() - margin {
        for x in margin..b.width() - margin {
            total += 1;
            let pa = a.get_pixel(x, y)[0] as i32;
            let pb = b.get_pixel(x, y)[0] as i32;
            if (pa - pb).abs() > 8 {
                off += 1;
            }
        }
    }
    off as f64 / total as f64
}

#[test]
fn test_run_aligns_every_frame_and_writes_reports() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");

    fs::create_dir_all(input.join("part2")).unwrap();
    let centers = scatter(60, 160, 120, 7);
    dot_frame(160, 120, &centers, 0, 0)
        .save(input.join("frame_0000.png"))
        .unwrap();
    dot_frame(160, 120, &centers, 5, 2)
        .save(input.join("frame_0001.png"))
        .unwrap();
    dot_frame(160, 120, &centers, 2, -2)
        .save(input.join("part2/frame_0002.png"))
        .unwrap();

    let summary = AlignmentCoordinator::new(base_config(&input, &output))
        .run()
        .unwrap();

    assert_eq!(summary.total_images, 3);
    assert_eq!(summary.aligned, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.reference, PathBuf::from("frame_0000.png"));

    // The output tree mirrors the input tree.
    for name in ["frame_0000.png", "frame_0001.png", "part2/frame_0002.png"] {
        assert!(output.join(name).is_file(), "missing {}", name);
    }

    // The reference is copied, not re-encoded.
    assert_eq!(
        fs::read(input.join("frame_0000.png")).unwrap(),
        fs::read(output.join("frame_0000.png")).unwrap()
    );

    assert_eq!(summary.images[0].status, ImageStatus::Reference);
    assert_eq!(summary.images[0].method, "reference");
    for outcome in &summary.images[1..] {
        assert_eq!(outcome.status, ImageStatus::Aligned);
        assert_eq!(outcome.method, "features");
        assert!(!outcome.fallback);
    }

    // Aligned frames actually line up with the reference.
    let reference = image::open(input.join("frame_0000.png")).unwrap().to_rgb8();
    let aligned = image::open(output.join("frame_0001.png")).unwrap().to_rgb8();
    assert!(mismatch_fraction(&aligned, &reference, 16) < 0.01);

    let loaded = report::load_summary(&output.join("alignment_summary.json")).unwrap();
    assert_eq!(loaded.aligned, 2);
    assert_eq!(loaded.images.len(), 3);

    let markdown = fs::read_to_string(output.join("alignment_report.md")).unwrap();
    assert!(markdown.contains("# Alignment Report"));
    assert!(markdown.contains("frame_0001.png"));
    assert!(markdown.contains("part2/frame_0002.png"));
}

#[test]
fn test_rerun_produces_identical_outputs() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    seed_sequence(&input);

    AlignmentCoordinator::new(base_config(&input, &output))
        .run()
        .unwrap();
    let first: Vec<Vec<u8>> = ["frame_0001.png", "frame_0002.png"]
        .iter()
        .map(|name| fs::read(output.join(name)).unwrap())
        .collect();

    AlignmentCoordinator::new(base_config(&input, &output))
        .run()
        .unwrap();
    let second: Vec<Vec<u8>> = ["frame_0001.png", "frame_0002.png"]
        .iter()
        .map(|name| fs::read(output.join(name)).unwrap())
        .collect();

    assert_eq!(first, second);
}

#[test]
fn test_undecodable_frame_is_copied_through() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    seed_sequence(&input);
    fs::write(input.join("frame_0003.png"), b"not an image").unwrap();

    let summary = AlignmentCoordinator::new(base_config(&input, &output))
        .run()
        .unwrap();

    assert_eq!(summary.total_images, 4);
    assert_eq!(summary.aligned, 2);
    assert_eq!(summary.failed, 1);

    let outcome = &summary.images[3];
    assert_eq!(outcome.path, PathBuf::from("frame_0003.png"));
    assert_eq!(outcome.status, ImageStatus::Failed);
    assert_eq!(outcome.method, "none");
    assert!(outcome.note.starts_with("decode:"), "{}", outcome.note);

    // The broken file still lands in the output, byte for byte.
    assert_eq!(
        fs::read(output.join("frame_0003.png")).unwrap(),
        b"not an image"
    );
}

#[test]
fn test_blank_frame_fails_and_is_copied_raw() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    seed_sequence(&input);
    RgbImage::from_pixel(160, 120, Rgb([128, 128, 128]))
        .save(input.join("frame_0003.png"))
        .unwrap();

    let summary = AlignmentCoordinator::new(base_config(&input, &output))
        .run()
        .unwrap();

    assert_eq!(summary.aligned, 2);
    assert_eq!(summary.failed, 1);

    let outcome = &summary.images[3];
    assert_eq!(outcome.status, ImageStatus::Failed);
    assert_eq!(outcome.method, "none");
    assert!(outcome.note.contains("classical:"), "{}", outcome.note);

    // Total failure still produces an output file, untouched.
    assert_eq!(
        fs::read(input.join("frame_0003.png")).unwrap(),
        fs::read(output.join("frame_0003.png")).unwrap()
    );
}

#[test]
fn test_missing_input_directory_is_fatal() {
    let dir = tempdir().unwrap();
    let config = base_config(&dir.path().join("nope"), &dir.path().join("out"));

    let err = AlignmentCoordinator::new(config).run().unwrap_err();
    let align = err.downcast_ref::<AlignError>().expect("align error");
    assert!(matches!(align, AlignError::Directory(_)), "{:?}", align);
}

#[test]
fn test_reference_index_out_of_range_is_fatal() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    seed_sequence(&input);

    let mut config = base_config(&input, &dir.path().join("out"));
    config.reference_index = 5;

    let err = AlignmentCoordinator::new(config).run().unwrap_err();
    let align = err.downcast_ref::<AlignError>().expect("align error");
    match align {
        AlignError::Directory(msg) => assert!(msg.contains("reference index"), "{}", msg),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_auto_without_matcher_behaves_like_classical() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    seed_sequence(&input);

    let out_auto = dir.path().join("out_auto");
    let mut config = base_config(&input, &out_auto);
    config.method = AlignMethod::Auto;
    let auto_summary = AlignmentCoordinator::new(config).run().unwrap();

    let out_classical = dir.path().join("out_classical");
    let classical_summary = AlignmentCoordinator::new(base_config(&input, &out_classical))
        .run()
        .unwrap();

    assert_eq!(auto_summary.aligned, classical_summary.aligned);
    for (a, c) in auto_summary.images.iter().zip(&classical_summary.images) {
        assert_eq!(a.status, c.status);
        assert_eq!(a.method, c.method);
    }
    for name in ["frame_0001.png", "frame_0002.png"] {
        assert_eq!(
            fs::read(out_auto.join(name)).unwrap(),
            fs::read(out_classical.join(name)).unwrap(),
            "{} differs between auto and classical",
            name
        );
    }
}
