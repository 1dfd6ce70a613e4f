//! Synthetic camera for `stub://` device paths.
//!
//! The device path selects the simulated hardware:
//! - `stub://front...` exposes only a front camera (no back camera)
//! - `stub://offline...` exposes a back camera that fails to open
//! - anything else exposes a working back camera
//!
//! Frames are generated in-memory as BGRA with a slowly drifting scene so the
//! classifier sees changing content.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use super::{CameraProvider, DeviceInfo, DevicePosition, FrameSource, SourceStats};
use crate::frame::{Frame, Orientation, PixelFormat};

/// Configuration for a synthetic camera.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Frames per second; 0 disables pacing.
    pub target_fps: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            device: "stub://back_camera".to_string(),
            width: 320,
            height: 240,
            target_fps: 30,
        }
    }
}

pub struct SyntheticCamera {
    config: SyntheticConfig,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    fn variant(&self) -> &str {
        self.config
            .device
            .strip_prefix("stub://")
            .unwrap_or(&self.config.device)
    }

    fn position(&self) -> DevicePosition {
        if self.variant().starts_with("front") {
            DevicePosition::Front
        } else {
            DevicePosition::Back
        }
    }
}

impl CameraProvider for SyntheticCamera {
    fn default_device(&self, position: DevicePosition) -> Option<DeviceInfo> {
        if position != self.position() {
            return None;
        }
        Some(DeviceInfo {
            id: self.config.device.clone(),
            name: "Synthetic camera".to_string(),
            position,
        })
    }

    fn open(&self, device: &DeviceInfo) -> Result<Box<dyn FrameSource>> {
        if self.variant().starts_with("offline") {
            return Err(anyhow!("synthetic device {} is offline", device.id));
        }
        log::info!("SyntheticCamera: connected to {} (synthetic)", device.id);
        Ok(Box::new(SyntheticSource::new(self.config.clone())))
    }
}

struct SyntheticSource {
    config: SyntheticConfig,
    orientation: Orientation,
    frame_count: u64,
    scene_state: u8,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            orientation: Orientation::Up,
            frame_count: 0,
            scene_state: 0,
            last_frame_at: None,
        }
    }

    fn frame_interval(&self) -> Option<Duration> {
        if self.config.target_fps == 0 {
            None
        } else {
            Some(Duration::from_secs(1) / self.config.target_fps)
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        let (w, h) = (self.config.width, self.config.height);
        match self.orientation {
            Orientation::Portrait => (w.min(h), w.max(h)),
            Orientation::Landscape => (w.max(h), w.min(h)),
            Orientation::Up => (w, h),
        }
    }

    fn generate_pixels(&mut self, width: u32, height: u32) -> Vec<u8> {
        // Shift the scene every 50 frames.
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(37);
        }
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let base = self.scene_state as u64;
                let b = ((x as u64 + base) % 256) as u8;
                let g = ((y as u64 + self.frame_count) % 256) as u8;
                let r = base as u8;
                pixels.extend_from_slice(&[b, g, r, 0xff]);
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Frame> {
        if let (Some(interval), Some(last)) = (self.frame_interval(), self.last_frame_at) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());

        let (width, height) = self.dimensions();
        let pixels = self.generate_pixels(width, height);
        Ok(Frame::new(pixels, width, height, PixelFormat::Bgra32)
            .with_orientation(self.orientation))
    }

    fn supports_orientation(&self, _orientation: Orientation) -> bool {
        true
    }

    fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}
