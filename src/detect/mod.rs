mod client;
mod model;

pub use client::{DetectService, HttpDetectService};
pub use model::{BoundingBox, Detection, DetectionResult, SceneAnalysis};
