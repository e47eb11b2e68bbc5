//! Scene Scout
//!
//! Client for a remote object-detection service: acquire an image from a file
//! or a live camera, submit it, and present the detections with a scene
//! summary.
//!
//! # Module Structure
//!
//! - `source`: working image acquisition (file, camera) and display handles
//! - `session`: the detection session state machine and submission dispatch
//! - `detect`: service response model and HTTP client
//! - `overlay`: source-pixel boxes mapped into the displayed image
//! - `report`: confidence tiers, result listing and the text report
//! - `narration`: optional spoken summaries
//! - `liveness`: periodic backend reachability checks
//! - `config`: file/env configuration
//! - `ui`: stderr progress for the binary

pub mod config;
pub mod detect;
pub mod liveness;
pub mod narration;
pub mod overlay;
pub mod report;
pub mod session;
pub mod source;
pub mod ui;

pub use config::ClientConfig;
pub use detect::{
    BoundingBox, DetectService, Detection, DetectionResult, HttpDetectService, SceneAnalysis,
};
pub use liveness::{BackendStatus, HttpProbe, LivenessHandle, LivenessMonitor, LivenessProbe};
pub use narration::{CommandSpeaker, NarrationSink, Speaker};
pub use report::{confidence_tier, ConfidenceTier};
pub use session::{
    Dispatcher, Notice, SessionController, SessionEvent, SessionState, Submission,
    SubmissionTicket,
};
pub use source::{ImageSourceManager, SourceMode, WorkingImage};
