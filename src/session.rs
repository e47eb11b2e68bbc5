//! Detection session controller.
//!
//! All session state lives here and changes only through `handle`, one event
//! at a time. Network work is returned to the caller as a `Submission`
//! command; its outcome comes back later as `SessionEvent::DetectionFinished`.
//!
//! ```text
//! Idle --acquire--> ImageReady --submit--> Submitting --ok--> ResultReady
//!                       ^                       |
//!                       |                       +--err--> Error
//!                       +--- acquire (from ImageReady, ResultReady, Error)
//! clear: any state --> Idle
//! ```
//!
//! A response is applied only if it belongs to the submission in flight for
//! the image that is still current; anything else is dropped silently.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::detect::{DetectService, DetectionResult};
use crate::narration::NarrationSink;
use crate::overlay::{self, Annotation, Size};
use crate::source::{CameraActivation, ImageId, ImageSourceManager, SourceMode, WorkingImage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    ImageReady,
    Submitting,
    ResultReady,
    Error,
}

/// Identifies one submission of one working image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmissionTicket {
    image: ImageId,
    seq: u64,
}

impl SubmissionTicket {
    pub fn image(&self) -> ImageId {
        self.image
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// A request the caller must send to the detection service.
#[derive(Clone, Debug)]
pub struct Submission {
    pub ticket: SubmissionTicket,
    pub filename: String,
    pub payload: Arc<[u8]>,
}

#[derive(Debug)]
pub enum SessionEvent {
    FileChosen(PathBuf),
    FileModeSelected,
    CameraActivated,
    CaptureRequested,
    ClearRequested,
    SubmitRequested,
    DetectionFinished {
        ticket: SubmissionTicket,
        outcome: Result<DetectionResult>,
    },
    NarrationToggled,
}

/// User-visible messages, drained by the front end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    SubmissionFailed(String),
    AcquisitionFailed(String),
    CameraUnavailable(String),
}

pub struct SessionController {
    state: SessionState,
    sources: ImageSourceManager,
    image: Option<WorkingImage>,
    result: Option<DetectionResult>,
    in_flight: Option<SubmissionTicket>,
    narration: NarrationSink,
    notices: Vec<Notice>,
    next_seq: u64,
}

impl SessionController {
    pub fn new(sources: ImageSourceManager, narration: NarrationSink) -> Self {
        Self {
            state: SessionState::Idle,
            sources,
            image: None,
            result: None,
            in_flight: None,
            narration,
            notices: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn image(&self) -> Option<&WorkingImage> {
        self.image.as_ref()
    }

    /// Present only in `ResultReady`.
    pub fn result(&self) -> Option<&DetectionResult> {
        match self.state {
            SessionState::ResultReady => self.result.as_ref(),
            _ => None,
        }
    }

    pub fn source_mode(&self) -> SourceMode {
        self.sources.mode()
    }

    pub fn sources(&self) -> &ImageSourceManager {
        &self.sources
    }

    pub fn narration_enabled(&self) -> bool {
        self.narration.enabled()
    }

    pub fn set_narration(&mut self, enabled: bool) {
        self.narration.set_enabled(enabled);
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Apply one event. Returns a submission to dispatch, if the event started one.
    pub fn handle(&mut self, event: SessionEvent) -> Option<Submission> {
        match event {
            SessionEvent::FileChosen(path) => {
                self.choose_file(&path);
                None
            }
            SessionEvent::FileModeSelected => {
                self.clear();
                self.sources.select_file_mode();
                None
            }
            SessionEvent::CameraActivated => {
                self.clear();
                if let CameraActivation::Unavailable(reason) = self.sources.activate_camera() {
                    self.notices.push(Notice::CameraUnavailable(reason));
                }
                None
            }
            SessionEvent::CaptureRequested => {
                match self.sources.capture() {
                    Ok(image) => self.install(image),
                    Err(err) => {
                        log::warn!("capture failed: {:#}", err);
                        self.notices
                            .push(Notice::AcquisitionFailed(format!("{:#}", err)));
                    }
                }
                None
            }
            SessionEvent::ClearRequested => {
                self.clear();
                None
            }
            SessionEvent::SubmitRequested => self.submit(),
            SessionEvent::DetectionFinished { ticket, outcome } => {
                self.finish(ticket, outcome);
                None
            }
            SessionEvent::NarrationToggled => {
                let enabled = self.narration.toggle();
                log::info!("voice feedback {}", if enabled { "on" } else { "off" });
                None
            }
        }
    }

    /// Start a submission and hand it to `dispatch`.
    ///
    /// Returns the ticket of the started submission, or `None` when the
    /// request was ignored. If `dispatch` fails, the submission is finished
    /// as failed so the session never stays in `Submitting`.
    pub fn submit_with<F>(&mut self, dispatch: F) -> Option<SubmissionTicket>
    where
        F: FnOnce(Submission) -> Result<()>,
    {
        let submission = self.submit()?;
        let ticket = submission.ticket;
        if let Err(err) = dispatch(submission) {
            self.finish(ticket, Err(err.context("dispatch detection request")));
        }
        Some(ticket)
    }

    /// Overlay for the current result, mapped into a container of `container` pixels.
    ///
    /// Empty unless a result is ready for the current image.
    pub fn overlay(&self, container: Size) -> Vec<Annotation> {
        let (Some(result), Some(image)) = (self.result(), self.image.as_ref()) else {
            return Vec::new();
        };
        let Some((width, height)) = image.dimensions() else {
            log::debug!("{}: dimensions unknown, overlay skipped", image.id());
            return Vec::new();
        };
        overlay::annotate(
            &result.detections,
            Size::new(width as f64, height as f64),
            container,
        )
    }

    /// Write the text report for the current result into `dir`.
    pub fn export_report(&self, dir: &Path) -> Result<Option<PathBuf>> {
        crate::report::export_report(self.result(), dir)
    }

    /// Stop the camera and drop all session state.
    pub fn shutdown(&mut self) {
        self.clear();
        self.sources.shutdown();
    }

    fn choose_file(&mut self, path: &Path) {
        match self.sources.load_file(path) {
            Ok(image) => self.install(image),
            Err(err) => {
                log::warn!("file selection failed: {:#}", err);
                self.notices
                    .push(Notice::AcquisitionFailed(format!("{:#}", err)));
            }
        }
    }

    fn install(&mut self, image: WorkingImage) {
        self.result = None;
        self.in_flight = None;
        // Replacing the slot drops the previous image and revokes its handle.
        self.image = Some(image);
        self.state = SessionState::ImageReady;
    }

    fn clear(&mut self) {
        self.result = None;
        self.in_flight = None;
        self.image = None;
        self.state = SessionState::Idle;
    }

    fn submit(&mut self) -> Option<Submission> {
        if self.state == SessionState::Submitting {
            log::debug!("submit ignored: a submission is already in flight");
            return None;
        }
        let Some(image) = self.image.as_ref() else {
            log::debug!("submit ignored: no image selected");
            return None;
        };
        self.next_seq += 1;
        let ticket = SubmissionTicket {
            image: image.id(),
            seq: self.next_seq,
        };
        log::info!(
            "submitting {} ({}, {} bytes)",
            image.origin_filename(),
            image.id(),
            image.payload().len()
        );
        let submission = Submission {
            ticket,
            filename: image.origin_filename().to_string(),
            payload: image.payload(),
        };
        self.result = None;
        self.in_flight = Some(ticket);
        self.state = SessionState::Submitting;
        Some(submission)
    }

    fn finish(&mut self, ticket: SubmissionTicket, outcome: Result<DetectionResult>) {
        let current = self.image.as_ref().map(WorkingImage::id);
        if self.state != SessionState::Submitting
            || self.in_flight != Some(ticket)
            || current != Some(ticket.image)
        {
            log::debug!(
                "discarding stale response for {} (submission {})",
                ticket.image,
                ticket.seq
            );
            return;
        }
        self.in_flight = None;
        match outcome {
            Ok(result) => {
                log::info!(
                    "detection complete: {} objects in {}",
                    result.detections.len(),
                    result.filename
                );
                let summary = result.analysis.as_ref().map(|a| a.summary.as_str());
                self.narration.narrate(ticket.seq, summary);
                self.result = Some(result);
                self.state = SessionState::ResultReady;
            }
            Err(err) => {
                log::error!("error uploading file: {:#}", err);
                self.notices.push(Notice::SubmissionFailed(format!(
                    "Failed to reach the detection service: {:#}",
                    err
                )));
                self.state = SessionState::Error;
            }
        }
    }
}

/// Runs submissions on worker threads and posts the outcome back as an event.
#[derive(Clone)]
pub struct Dispatcher {
    service: Arc<dyn DetectService>,
    events: Sender<SessionEvent>,
}

impl Dispatcher {
    pub fn new(service: Arc<dyn DetectService>, events: Sender<SessionEvent>) -> Self {
        Self { service, events }
    }

    pub fn dispatch(&self, submission: Submission) -> Result<()> {
        let service = self.service.clone();
        let events = self.events.clone();
        std::thread::Builder::new()
            .name(format!("detect-{}", submission.ticket.seq))
            .spawn(move || {
                let outcome = service.detect(&submission.filename, &submission.payload);
                let event = SessionEvent::DetectionFinished {
                    ticket: submission.ticket,
                    outcome,
                };
                if events.send(event).is_err() {
                    log::debug!("session closed before detection finished");
                }
            })
            .context("spawn detection worker")?;
        Ok(())
    }
}
