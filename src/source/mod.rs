//! Working image acquisition.
//!
//! Two mutually exclusive modes produce a `WorkingImage`:
//! - file mode: the raw bytes of a user-chosen local file
//! - camera mode: one JPEG-encoded still captured from a live stream
//!
//! The camera stream is held only while camera mode is armed and is stopped
//! on capture, on switching back to file mode, and on teardown.

pub mod camera;
#[cfg(feature = "camera-v4l2")]
pub(crate) mod camera_v4l2;
pub mod file;
pub mod preview;

use anyhow::{anyhow, Result};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub use camera::{CameraDevice, CameraStream, Frame, StreamGuard, SyntheticCamera, UnavailableCamera};
pub use preview::{DisplayHandle, PreviewRegistry};

/// Identity of one acquisition. Never reused within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageId(u64);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image#{}", self.0)
    }
}

/// The currently selected image.
///
/// Holds its display handle for its whole lifetime and revokes it on drop, so
/// replacing or clearing the owning slot releases the handle exactly once.
pub struct WorkingImage {
    id: ImageId,
    payload: Arc<[u8]>,
    display: DisplayHandle,
    origin_filename: String,
    previews: PreviewRegistry,
}

impl WorkingImage {
    pub fn id(&self) -> ImageId {
        self.id
    }

    /// Bytes sent to the service.
    pub fn payload(&self) -> Arc<[u8]> {
        self.payload.clone()
    }

    pub fn display(&self) -> &DisplayHandle {
        &self.display
    }

    pub fn origin_filename(&self) -> &str {
        &self.origin_filename
    }

    /// Pixel dimensions, when the payload decodes as an image.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        image::ImageReader::new(std::io::Cursor::new(&self.payload[..]))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    }
}

impl fmt::Debug for WorkingImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkingImage")
            .field("id", &self.id)
            .field("bytes", &self.payload.len())
            .field("display", &self.display)
            .field("origin_filename", &self.origin_filename)
            .finish()
    }
}

impl Drop for WorkingImage {
    fn drop(&mut self) {
        self.previews.revoke(&self.display);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceMode {
    File,
    Camera,
}

/// Outcome of arming camera mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraActivation {
    Streaming,
    /// Camera mode is armed but no stream could be obtained.
    Unavailable(String),
}

pub struct ImageSourceManager {
    mode: SourceMode,
    camera: Box<dyn CameraDevice>,
    stream: Option<StreamGuard>,
    previews: PreviewRegistry,
    next_id: u64,
}

impl ImageSourceManager {
    pub fn new(camera: Box<dyn CameraDevice>) -> Self {
        Self {
            mode: SourceMode::File,
            camera,
            stream: None,
            previews: PreviewRegistry::new(),
            next_id: 0,
        }
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    /// Switch to file mode, stopping any active stream.
    pub fn select_file_mode(&mut self) {
        self.stop_stream();
        self.mode = SourceMode::File;
    }

    /// Arm camera mode and request a stream.
    ///
    /// A failure to obtain the stream is logged and leaves camera mode armed
    /// without a stream; it is never an error for the caller.
    pub fn activate_camera(&mut self) -> CameraActivation {
        self.stop_stream();
        self.mode = SourceMode::Camera;
        match self.camera.open() {
            Ok(stream) => {
                self.stream = Some(StreamGuard::new(stream));
                CameraActivation::Streaming
            }
            Err(err) => {
                log::warn!("camera error: {:#}", err);
                CameraActivation::Unavailable(format!("{:#}", err))
            }
        }
    }

    /// Acquire a file. Choosing a file implies file mode.
    pub fn load_file(&mut self, path: &Path) -> Result<WorkingImage> {
        let chosen = file::read_chosen_file(path)?;
        self.select_file_mode();
        log::info!(
            "selected {} ({} bytes)",
            chosen.filename,
            chosen.bytes.len()
        );
        Ok(self.make_image(chosen.bytes, chosen.filename))
    }

    /// Capture one still from the active stream and release the camera.
    pub fn capture(&mut self) -> Result<WorkingImage> {
        if self.mode != SourceMode::Camera {
            return Err(anyhow!("camera mode is not active"));
        }
        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| anyhow!("no active camera stream to capture from"))?;
        let frame = stream.grab();
        stream.stop();
        let jpeg = camera::encode_jpeg(&frame?)?;
        self.mode = SourceMode::File;
        log::info!(
            "captured {} ({} bytes)",
            camera::CAPTURE_FILENAME,
            jpeg.len()
        );
        Ok(self.make_image(jpeg, camera::CAPTURE_FILENAME.to_string()))
    }

    /// Stop the stream, if any. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.stop_stream();
    }

    fn stop_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            log::debug!("camera {}: stream released", self.camera.name());
        }
    }

    fn make_image(&mut self, bytes: Vec<u8>, origin_filename: String) -> WorkingImage {
        self.next_id += 1;
        WorkingImage {
            id: ImageId(self.next_id),
            payload: Arc::from(bytes),
            display: self.previews.issue(),
            origin_filename,
            previews: self.previews.clone(),
        }
    }
}

impl Drop for ImageSourceManager {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn stub_manager() -> (ImageSourceManager, Arc<std::sync::atomic::AtomicUsize>) {
        let camera = SyntheticCamera::new("stub://front", 32, 24);
        let open = camera.open_streams();
        (ImageSourceManager::new(Box::new(camera)), open)
    }

    #[test]
    fn capture_produces_jpeg_and_releases_camera() -> Result<()> {
        let (mut manager, open) = stub_manager();
        assert_eq!(manager.activate_camera(), CameraActivation::Streaming);
        assert_eq!(open.load(Ordering::SeqCst), 1);

        let image = manager.capture()?;
        assert_eq!(image.origin_filename(), "webcam-capture.jpg");
        assert_eq!(image.dimensions(), Some((32, 24)));
        assert_eq!(open.load(Ordering::SeqCst), 0);
        assert_eq!(manager.mode(), SourceMode::File);
        assert!(!manager.is_streaming());
        Ok(())
    }

    #[test]
    fn switching_to_file_mode_stops_the_stream() {
        let (mut manager, open) = stub_manager();
        manager.activate_camera();
        manager.select_file_mode();
        assert_eq!(open.load(Ordering::SeqCst), 0);
        assert!(manager.capture().is_err());
    }

    #[test]
    fn dropping_the_manager_stops_the_stream() {
        let (mut manager, open) = stub_manager();
        manager.activate_camera();
        drop(manager);
        assert_eq!(open.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unavailable_camera_leaves_mode_armed_without_stream() {
        let mut manager = ImageSourceManager::new(Box::new(UnavailableCamera::new(
            "/dev/video0",
            "permission denied",
        )));
        let activation = manager.activate_camera();
        assert!(matches!(activation, CameraActivation::Unavailable(_)));
        assert_eq!(manager.mode(), SourceMode::Camera);
        assert!(!manager.is_streaming());
        assert!(manager.capture().is_err());
    }

    #[test]
    fn replaced_images_release_their_display_handles() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"abc")?;
        let (mut manager, _) = stub_manager();

        let mut slot = Some(manager.load_file(&path)?);
        let first = slot.as_ref().map(|img| img.display().clone());
        assert_eq!(manager.previews().live_count(), 1);

        slot = Some(manager.load_file(&path)?);
        assert_eq!(manager.previews().live_count(), 1);
        assert!(!manager.previews().is_live(&first.unwrap()));

        let current = slot.as_ref().map(|img| img.display().clone()).unwrap();
        assert!(manager.previews().is_live(&current));
        slot = None;
        assert!(slot.is_none());
        assert_eq!(manager.previews().live_count(), 0);
        Ok(())
    }

    #[test]
    fn image_ids_are_unique() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"abc")?;
        let (mut manager, _) = stub_manager();
        let a = manager.load_file(&path)?;
        let b = manager.load_file(&path)?;
        assert_ne!(a.id(), b.id());
        Ok(())
    }
}
