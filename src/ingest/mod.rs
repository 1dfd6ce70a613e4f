//! Camera collaborators.
//!
//! A `CameraProvider` enumerates devices and opens them as `FrameSource`s:
//! - Synthetic cameras for `stub://` paths (always available)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Sources only produce frames. Pacing, late-frame dropping and pixel format
//! conversion for the frame output are handled by the capture session.

use anyhow::Result;

use crate::config::CameraSettings;
use crate::frame::{Frame, Orientation};
use crate::session::FrameOutput;

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use synthetic::{SyntheticCamera, SyntheticConfig};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Camera, V4l2Config};

/// Physical placement of a camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DevicePosition {
    Back,
    Front,
}

/// A camera the provider can open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device path or stub URL.
    pub id: String,
    pub name: String,
    pub position: DevicePosition,
}

/// Frame statistics for a source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub device: String,
}

/// Device enumeration and input creation.
pub trait CameraProvider: Send {
    /// Default device at the given position, if the platform has one.
    fn default_device(&self, position: DevicePosition) -> Option<DeviceInfo>;

    /// Open a device. The returned source is connected and ready to stream.
    fn open(&self, device: &DeviceInfo) -> Result<Box<dyn FrameSource>>;

    /// Whether a session may take `device` as its input.
    fn accepts_input(&self, _device: &DeviceInfo) -> bool {
        true
    }

    /// Whether a session may attach `output`.
    fn accepts_output(&self, _output: &FrameOutput) -> bool {
        true
    }
}

/// A connected stream of frames from one device.
pub trait FrameSource: Send {
    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Whether the source can rotate its output to `orientation`.
    fn supports_orientation(&self, orientation: Orientation) -> bool {
        orientation == Orientation::Up
    }

    /// Apply an output orientation. Only called after `supports_orientation`.
    fn set_orientation(&mut self, _orientation: Orientation) {}

    /// False while the source is failing or has stalled.
    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats;
}

/// Build the camera provider for the configured device.
pub fn camera_for(settings: &CameraSettings) -> Result<Box<dyn CameraProvider>> {
    if settings.device.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::new(SyntheticConfig {
            device: settings.device.clone(),
            width: settings.width,
            height: settings.height,
            target_fps: settings.target_fps,
        })));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Camera::new(V4l2Config {
            device: settings.device.clone(),
            target_fps: settings.target_fps,
            width: settings.width,
            height: settings.height,
        })))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        anyhow::bail!(
            "camera device {} requires the ingest-v4l2 feature",
            settings.device
        )
    }
}
