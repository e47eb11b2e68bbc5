//! Result presentation: confidence tiers, detection rows and the text report.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::detect::DetectionResult;

pub const REPORT_FILENAME: &str = "detection_report.txt";
const REPORT_TITLE: &str = "Scene Scout Detection Report";
const MISSING: &str = "n/a";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn label(self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        }
    }
}

/// `> 0.90` high, `> 0.75` medium, anything else (including NaN) low.
pub fn confidence_tier(confidence: f64) -> ConfidenceTier {
    if confidence > 0.90 {
        ConfidenceTier::High
    } else if confidence > 0.75 {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

/// One entry of the detection list, numbered from 1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectionRow {
    pub index: usize,
    pub label: String,
    pub percent: u32,
    pub tier: ConfidenceTier,
}

pub fn detection_rows(result: &DetectionResult) -> Vec<DetectionRow> {
    result
        .detections
        .iter()
        .enumerate()
        .map(|(i, det)| DetectionRow {
            index: i + 1,
            label: det.label.clone(),
            percent: det.percent(),
            tier: confidence_tier(det.confidence),
        })
        .collect()
}

/// Badge text; always the full detection count.
pub fn badge(result: &DetectionResult) -> String {
    format!("{} objects", result.detections.len())
}

/// Terminal rendering of the results panel.
pub fn render_summary(result: &DetectionResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Analysis Results [{}]", badge(result));
    let _ = writeln!(out, "File: {}", result.filename);
    if let Some(analysis) = &result.analysis {
        let _ = writeln!(out, "Scene: {}", analysis.scene_type);
        let _ = writeln!(out, "  {}", analysis.summary);
    }
    let rows = detection_rows(result);
    if rows.is_empty() {
        let _ = writeln!(out, "No objects detected above threshold.");
    }
    for row in rows {
        let _ = writeln!(
            out,
            "{:>3}. {:<20} {:>3}% [{}]",
            row.index,
            row.label,
            row.percent,
            row.tier.label()
        );
    }
    out
}

/// Plain-text report for a result.
pub fn render_report(result: &DetectionResult, exported_at: DateTime<Local>) -> String {
    let (scene_type, summary) = match &result.analysis {
        Some(analysis) => (analysis.scene_type.as_str(), analysis.summary.as_str()),
        None => (MISSING, MISSING),
    };
    let mut out = String::new();
    let _ = writeln!(out, "{}", REPORT_TITLE);
    let _ = writeln!(out);
    let _ = writeln!(out, "Date: {}", exported_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "File: {}", result.filename);
    let _ = writeln!(out, "Scene Analysis: {}", scene_type);
    let _ = writeln!(out, "Summary: {}", summary);
    let _ = writeln!(out);
    let _ = write!(out, "Detections:");
    for det in &result.detections {
        let _ = write!(out, "\n- {} ({}%)", det.label, det.percent());
    }
    out
}

/// Write `detection_report.txt` into `dir`. No result means nothing to export.
pub fn export_report(result: Option<&DetectionResult>, dir: &Path) -> Result<Option<PathBuf>> {
    let Some(result) = result else {
        log::debug!("report export skipped: no result");
        return Ok(None);
    };
    let path = dir.join(REPORT_FILENAME);
    let content = render_report(result, Local::now());
    std::fs::write(&path, content)
        .with_context(|| format!("write report to {}", path.display()))?;
    log::info!("report written to {}", path.display());
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection, SceneAnalysis};
    use chrono::TimeZone;

    fn cat_result() -> DetectionResult {
        DetectionResult {
            filename: "a.jpg".to_string(),
            detections: vec![Detection {
                label: "cat".to_string(),
                confidence: 0.92,
                bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
            }],
            message: "Detection successful".to_string(),
            analysis: Some(SceneAnalysis {
                scene_type: "indoor".to_string(),
                summary: "A cat on a couch.".to_string(),
            }),
        }
    }

    #[test]
    fn tiers_follow_thresholds() {
        assert_eq!(confidence_tier(0.95), ConfidenceTier::High);
        assert_eq!(confidence_tier(0.80), ConfidenceTier::Medium);
        assert_eq!(confidence_tier(0.50), ConfidenceTier::Low);
        assert_eq!(confidence_tier(0.90), ConfidenceTier::Medium);
        assert_eq!(confidence_tier(0.75), ConfidenceTier::Low);
        assert_eq!(confidence_tier(1.0), ConfidenceTier::High);
        assert_eq!(confidence_tier(0.0), ConfidenceTier::Low);
        assert_eq!(confidence_tier(f64::NAN), ConfidenceTier::Low);
    }

    #[test]
    fn report_lists_detections_and_summary() {
        let at = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let report = render_report(&cat_result(), at);
        assert!(report.contains("- cat (92%)"));
        assert!(report.contains("A cat on a couch."));
        assert!(report.contains("Scene Analysis: indoor"));
        assert!(report.contains("File: a.jpg"));
        assert!(report.contains("Date: 2026-03-04 05:06:07"));
    }

    #[test]
    fn report_without_analysis_marks_fields_missing() {
        let mut result = cat_result();
        result.analysis = None;
        let report = render_report(&result, Local::now());
        assert!(report.contains("Scene Analysis: n/a"));
        assert!(report.contains("Summary: n/a"));
    }

    #[test]
    fn export_is_a_no_op_without_result() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(export_report(None, dir.path())?, None);
        assert!(!dir.path().join(REPORT_FILENAME).exists());
        Ok(())
    }

    #[test]
    fn export_writes_report_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = export_report(Some(&cat_result()), dir.path())?.unwrap();
        assert_eq!(path.file_name().unwrap(), REPORT_FILENAME);
        let text = std::fs::read_to_string(path)?;
        assert!(text.starts_with(REPORT_TITLE));
        assert!(text.ends_with("- cat (92%)"));
        Ok(())
    }

    #[test]
    fn rows_and_badge_keep_every_detection() {
        let mut result = cat_result();
        result.detections.push(Detection {
            label: "cat".to_string(),
            confidence: 0.1,
            bbox: BoundingBox::new(0.0, 0.0, 0.0, 0.0),
        });
        let rows = detection_rows(&result);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].index, 2);
        assert_eq!(rows[1].tier, ConfidenceTier::Low);
        assert_eq!(badge(&result), "2 objects");
        assert!(render_summary(&result).contains("[2 objects]"));
    }

    #[test]
    fn empty_result_says_nothing_was_detected() {
        let mut result = cat_result();
        result.detections.clear();
        assert!(render_summary(&result).contains("No objects detected above threshold."));
        assert_eq!(badge(&result), "0 objects");
    }
}
