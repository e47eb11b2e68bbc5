//! Live camera acquisition.
//!
//! A camera device hands out a stream; the stream is owned by a `StreamGuard`
//! that stops it on every exit path (capture, mode switch, teardown).
//!
//! Device backends:
//! - `stub://<name>`: synthetic frames, always available
//! - V4L2 device nodes (feature: camera-v4l2)

use anyhow::{anyhow, Context, Result};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::CameraSettings;

/// Filename given to captured stills.
pub const CAPTURE_FILENAME: &str = "webcam-capture.jpg";

/// One RGB24 frame.
#[derive(Clone, Debug)]
pub struct Frame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// An open video stream.
pub trait CameraStream: Send {
    fn grab(&mut self) -> Result<Frame>;

    /// Stop all tracks and release the device. Must be idempotent.
    fn stop(&mut self);
}

/// A camera that can be asked for a stream.
pub trait CameraDevice: Send {
    fn name(&self) -> &str;

    fn open(&mut self) -> Result<Box<dyn CameraStream>>;
}

/// Owns an open stream and stops it when dropped.
pub struct StreamGuard {
    stream: Option<Box<dyn CameraStream>>,
}

impl StreamGuard {
    pub fn new(stream: Box<dyn CameraStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub fn grab(&mut self) -> Result<Frame> {
        self.stream
            .as_mut()
            .ok_or_else(|| anyhow!("camera stream already stopped"))?
            .grab()
    }

    pub fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Encode a frame as a JPEG payload.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>> {
    let image = image::RgbImage::from_raw(frame.width, frame.height, frame.pixels.clone())
        .ok_or_else(|| {
            anyhow!(
                "frame buffer does not match {}x{} RGB",
                frame.width,
                frame.height
            )
        })?;
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .context("encode captured frame as jpeg")?;
    Ok(out.into_inner())
}

/// Pick a camera backend for the configured device.
pub fn camera_for(settings: &CameraSettings) -> Box<dyn CameraDevice> {
    if settings.device.starts_with("stub://") {
        return Box::new(SyntheticCamera::new(
            &settings.device,
            settings.width,
            settings.height,
        ));
    }
    #[cfg(feature = "camera-v4l2")]
    {
        Box::new(super::camera_v4l2::V4l2Camera::new(settings.clone()))
    }
    #[cfg(not(feature = "camera-v4l2"))]
    {
        Box::new(UnavailableCamera::new(
            &settings.device,
            "device capture requires the camera-v4l2 feature",
        ))
    }
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://)
// ----------------------------------------------------------------------------

pub struct SyntheticCamera {
    name: String,
    width: u32,
    height: u32,
    open_streams: Arc<AtomicUsize>,
}

impl SyntheticCamera {
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of streams that are open and not yet stopped.
    pub fn open_streams(&self) -> Arc<AtomicUsize> {
        self.open_streams.clone()
    }
}

impl CameraDevice for SyntheticCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<Box<dyn CameraStream>> {
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        log::info!("camera {}: stream started (synthetic)", self.name);
        Ok(Box::new(SyntheticStream {
            width: self.width,
            height: self.height,
            frame_count: 0,
            open_streams: self.open_streams.clone(),
            stopped: false,
        }))
    }
}

struct SyntheticStream {
    width: u32,
    height: u32,
    frame_count: u64,
    open_streams: Arc<AtomicUsize>,
    stopped: bool,
}

impl CameraStream for SyntheticStream {
    fn grab(&mut self) -> Result<Frame> {
        if self.stopped {
            return Err(anyhow!("synthetic stream stopped"));
        }
        self.frame_count += 1;
        let pixel_count = (self.width * self.height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 256) as u8;
        }
        Ok(Frame {
            pixels,
            width: self.width,
            height: self.height,
        })
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.open_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.stop();
    }
}

// ----------------------------------------------------------------------------
// Unavailable camera (denied or missing device)
// ----------------------------------------------------------------------------

pub struct UnavailableCamera {
    name: String,
    reason: String,
}

impl UnavailableCamera {
    pub fn new(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl CameraDevice for UnavailableCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<Box<dyn CameraStream>> {
        Err(anyhow!("camera {} unavailable: {}", self.name, self.reason))
    }
}
