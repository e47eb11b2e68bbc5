//! Detection service response types.
//!
//! The service answers `POST /detect` with:
//! `{ "filename", "detections": [{ "label", "confidence", "box": [x, y, w, h] }], "message", "analysis"? }`
//!
//! Boxes are absolute pixels of the uploaded image (top-left x/y, width, height).
//! Anything that does not match this shape is rejected as a whole.

use anyhow::{anyhow, Result};
use serde::Deserialize;

/// Axis-aligned box in source-image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub bbox: BoundingBox,
}

impl Detection {
    /// Confidence as a rounded whole percentage.
    pub fn percent(&self) -> u32 {
        (self.confidence * 100.0).round() as u32
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SceneAnalysis {
    pub scene_type: String,
    pub summary: String,
}

/// One successful detection response. Detection order is the service's order.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    pub filename: String,
    pub detections: Vec<Detection>,
    pub message: String,
    pub analysis: Option<SceneAnalysis>,
}

impl DetectionResult {
    /// Parse and validate a response body.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let wire: WireResult =
            serde_json::from_slice(body).map_err(|e| anyhow!("malformed detection response: {}", e))?;
        wire.into_result()
    }
}

#[derive(Debug, Deserialize)]
struct WireResult {
    filename: String,
    detections: Vec<WireDetection>,
    message: String,
    #[serde(default)]
    analysis: Option<WireAnalysis>,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    label: String,
    confidence: f64,
    #[serde(rename = "box")]
    bbox: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct WireAnalysis {
    scene_type: String,
    summary: String,
}

/// Error body the service returns when its model failed to load.
#[derive(Debug, Deserialize)]
struct WireServiceError {
    error: String,
}

impl WireResult {
    fn into_result(self) -> Result<DetectionResult> {
        let detections = self
            .detections
            .into_iter()
            .enumerate()
            .map(|(index, det)| det.validate(index))
            .collect::<Result<Vec<_>>>()?;
        Ok(DetectionResult {
            filename: self.filename,
            detections,
            message: self.message,
            analysis: self.analysis.map(|a| SceneAnalysis {
                scene_type: a.scene_type,
                summary: a.summary,
            }),
        })
    }
}

impl WireDetection {
    fn validate(self, index: usize) -> Result<Detection> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!(
                "detection {} confidence {} outside [0, 1]",
                index,
                self.confidence
            ));
        }
        let [x, y, width, height] = <[f64; 4]>::try_from(self.bbox.as_slice()).map_err(|_| {
            anyhow!(
                "detection {} box must have 4 values, got {}",
                index,
                self.bbox.len()
            )
        })?;
        if ![x, y, width, height].iter().all(|v| v.is_finite()) {
            return Err(anyhow!("detection {} box has non-finite values", index));
        }
        if width < 0.0 || height < 0.0 {
            return Err(anyhow!("detection {} box has negative size", index));
        }
        Ok(Detection {
            label: self.label,
            confidence: self.confidence,
            bbox: BoundingBox::new(x, y, width, height),
        })
    }
}

/// Extract the service's `error` text from a body that failed to parse as a result.
pub fn service_error_text(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<WireServiceError>(body)
        .ok()
        .map(|e| e.error)
        .filter(|e| !e.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "filename": "street.jpg",
        "detections": [
            { "label": "person", "confidence": 0.91, "box": [12.5, 40.0, 100.0, 220.0] },
            { "label": "car", "confidence": 0.77, "box": [300, 120, 180, 90] }
        ],
        "message": "Detection successful",
        "analysis": { "scene_type": "Urban Street / Traffic", "summary": "Detected 2 objects." }
    }"#;

    #[test]
    fn parses_service_response_in_order() -> Result<()> {
        let result = DetectionResult::from_json(SAMPLE.as_bytes())?;
        assert_eq!(result.filename, "street.jpg");
        assert_eq!(result.detections.len(), 2);
        assert_eq!(result.detections[0].label, "person");
        assert_eq!(result.detections[1].bbox, BoundingBox::new(300.0, 120.0, 180.0, 90.0));
        assert_eq!(
            result.analysis.as_ref().map(|a| a.scene_type.as_str()),
            Some("Urban Street / Traffic")
        );
        Ok(())
    }

    #[test]
    fn analysis_is_optional() -> Result<()> {
        let body = r#"{"filename":"a.png","detections":[],"message":"ok"}"#;
        let result = DetectionResult::from_json(body.as_bytes())?;
        assert!(result.analysis.is_none());
        let body = r#"{"filename":"a.png","detections":[],"message":"ok","analysis":null}"#;
        assert!(DetectionResult::from_json(body.as_bytes())?.analysis.is_none());
        Ok(())
    }

    #[test]
    fn rejects_bodies_that_do_not_match_the_shape() {
        let bad = [
            r#"not json"#,
            r#"{"error":"AI model not loaded","message":"Backend is running in mock mode fallback"}"#,
            r#"{"filename":"a","detections":[{"label":"x","confidence":1.5,"box":[0,0,1,1]}],"message":""}"#,
            r#"{"filename":"a","detections":[{"label":"x","confidence":0.5,"box":[0,0,1]}],"message":""}"#,
            r#"{"filename":"a","detections":[{"label":"x","confidence":0.5,"box":[0,0,-1,1]}],"message":""}"#,
            r#"{"filename":"a","detections":[{"confidence":0.5,"box":[0,0,1,1]}],"message":""}"#,
            r#"{"filename":"a","detections":[],"message":"","analysis":{"scene_type":"x"}}"#,
        ];
        for body in bad {
            assert!(
                DetectionResult::from_json(body.as_bytes()).is_err(),
                "accepted {}",
                body
            );
        }
    }

    #[test]
    fn extracts_service_error_text() {
        let body = br#"{"error":"AI model not loaded","message":"mock mode"}"#;
        assert_eq!(service_error_text(body).as_deref(), Some("AI model not loaded"));
        assert_eq!(service_error_text(b"{}"), None);
    }

    #[test]
    fn percent_rounds_to_nearest() {
        let det = Detection {
            label: "cat".to_string(),
            confidence: 0.916,
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
        };
        assert_eq!(det.percent(), 92);
    }
}
