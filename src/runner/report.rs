//! Run summary persistence and the human-readable report.

use super::RunSummary;
use crate::ImageStatus;
use std::fs;
use std::path::Path;

pub fn write_summary(path: &Path, summary: &RunSummary) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn load_summary(path: &Path) -> crate::Result<RunSummary> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn write_markdown(path: &Path, summary: &RunSummary) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_markdown(summary))?;
    Ok(())
}

/// Render the markdown report: run header, totals, then a row per image.
pub fn render_markdown(summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str("# Alignment Report\n\n");
    out.push_str(&format!("- Generated: {}\n", summary.generated_at));
    out.push_str(&format!("- Input: `{}`\n", summary.input_dir.display()));
    out.push_str(&format!("- Output: `{}`\n", summary.output_dir.display()));
    out.push_str(&format!("- Method: {}\n", summary.method));
    out.push_str(&format!("- Reference: `{}`\n\n", summary.reference.display()));
    out.push_str(&format!(
        "{} images: {} aligned ({} by fallback), {} failed.\n",
        summary.total_images, summary.aligned, summary.fallbacks, summary.failed
    ));
    out.push_str(&format!(
        "Mean correspondences per aligned frame: {:.1}\n",
        summary.mean_correspondences
    ));
    out.push_str(&format!(
        "Total time: {:.1} s\n\n",
        summary.total_time_ms / 1000.0
    ));

    out.push_str("| Image | Status | Method | Matches | Inliers | Ratio | Time (ms) | Note |\n");
    out.push_str("|---|---|---|---|---|---|---|---|\n");
    for image in &summary.images {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {:.2} | {:.0} | {} |\n",
            image.path.display(),
            status_label(image.status),
            image.method,
            image.correspondences,
            image.inliers,
            image.inlier_ratio,
            image.time_ms,
            image.note,
        ));
    }
    out
}

fn status_label(status: ImageStatus) -> &'static str {
    match status {
        ImageStatus::Aligned => "aligned",
        ImageStatus::Reference => "reference",
        ImageStatus::Failed => "failed",
    }
}
