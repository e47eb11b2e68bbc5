//! V4L2 camera backend.
//!
//! Opens a local device node (e.g. /dev/video0) in RGB24 and hands out one
//! memory-mapped stream at a time. Stopping the stream closes the device.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::camera::{CameraDevice, CameraStream, Frame};
use crate::config::CameraSettings;

pub struct V4l2Camera {
    settings: CameraSettings,
}

impl V4l2Camera {
    pub fn new(settings: CameraSettings) -> Self {
        Self { settings }
    }
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this>,
}

struct V4l2Stream {
    device_path: String,
    state: Option<DeviceState>,
    width: u32,
    height: u32,
}

impl CameraDevice for V4l2Camera {
    fn name(&self) -> &str {
        &self.settings.device
    }

    fn open(&mut self) -> Result<Box<dyn CameraStream>> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.settings.device)
            .with_context(|| format!("open v4l2 device {}", self.settings.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.settings.width;
        format.height = self.settings.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "camera {}: failed to set format: {}",
                    self.settings.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            return Err(anyhow!(
                "camera {} does not deliver RGB24 frames",
                self.settings.device
            ));
        }

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "camera {}: stream started ({}x{})",
            self.settings.device,
            format.width,
            format.height
        );
        Ok(Box::new(V4l2Stream {
            device_path: self.settings.device.clone(),
            state: Some(state),
            width: format.width,
            height: format.height,
        }))
    }
}

impl CameraStream for V4l2Stream {
    fn grab(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 stream stopped")?;
        let pixels = state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .context("capture v4l2 frame")?;
        let expected = (self.width * self.height * 3) as usize;
        if pixels.len() < expected {
            return Err(anyhow!(
                "v4l2 frame too short: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Frame {
            pixels: pixels[..expected].to_vec(),
            width: self.width,
            height: self.height,
        })
    }

    fn stop(&mut self) {
        if self.state.take().is_some() {
            log::info!("camera {}: stream stopped", self.device_path);
        }
    }
}
