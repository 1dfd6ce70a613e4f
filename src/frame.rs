//! Captured video frames.
//!
//! - `Frame`: pixel container delivered by the capture layer to the frame sink.
//! - `PixelFormat`: layouts the frame output can be configured to deliver.
//! - `Orientation`: output connection orientation and classifier hint.
//!
//! Frames are moved, never cloned, through the pipeline: capture thread ->
//! frame sink -> inference worker. A frame that is not consumed in time is
//! dropped by the sink.

use anyhow::{anyhow, Result};
use std::time::Instant;

/// Pixel layouts a frame output can deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// 32-bit BGRA, 4 bytes per pixel. Default for the frame output.
    Bgra32,
    /// Packed RGB, 3 bytes per pixel.
    Rgb24,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra32 => 4,
            PixelFormat::Rgb24 => 3,
        }
    }
}

/// Orientation of a capture connection, or of the image handed to a classifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Orientation {
    /// Buffer is upright as stored.
    #[default]
    Up,
    Portrait,
    Landscape,
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One decoded video frame.
///
/// Pixel bytes are private; consumers read them through `pixels()` or one of
/// the conversion helpers. There is intentionally no `Clone`.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub orientation: Orientation,
    captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
            orientation: Orientation::Up,
            captured_at: Instant::now(),
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Byte length a frame of this geometry must have.
    pub fn expected_len(width: u32, height: u32, format: PixelFormat) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(format.bytes_per_pixel()))
    }

    /// Rejects frames whose byte length does not match their geometry.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!(
                "frame has empty geometry {}x{}",
                self.width,
                self.height
            ));
        }
        let expected = Self::expected_len(self.width, self.height, self.format)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if self.data.len() != expected {
            return Err(anyhow!(
                "{:?} frame length mismatch: expected {}, got {}",
                self.format,
                expected,
                self.data.len()
            ));
        }
        Ok(())
    }

    /// Convert into another pixel format. Same-format conversion is a no-op.
    pub fn convert(self, target: PixelFormat) -> Result<Frame> {
        if self.format == target {
            return Ok(self);
        }
        self.validate()?;
        let data = match (self.format, target) {
            (PixelFormat::Rgb24, PixelFormat::Bgra32) => rgb_to_bgra(&self.data),
            (PixelFormat::Bgra32, PixelFormat::Rgb24) => bgra_to_rgb(&self.data),
            _ => unreachable!("same-format conversion handled above"),
        };
        Ok(Frame {
            data,
            format: target,
            ..self
        })
    }

    /// Packed RGB copy of the pixel data.
    pub fn to_rgb(&self) -> Result<Vec<u8>> {
        self.validate()?;
        Ok(match self.format {
            PixelFormat::Rgb24 => self.data.clone(),
            PixelFormat::Bgra32 => bgra_to_rgb(&self.data),
        })
    }

    /// Nearest-neighbour RGB copy at most `max_width` pixels wide. Aspect
    /// ratio, orientation and capture instant are kept.
    pub fn thumbnail(&self, max_width: u32) -> Result<Frame> {
        self.validate()?;
        let width = self.width.min(max_width.max(1));
        let height = ((self.height as u64 * width as u64) / self.width as u64).max(1) as u32;
        let bpp = self.format.bytes_per_pixel();
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            let src_y = (y as u64 * self.height as u64 / height as u64) as usize;
            for x in 0..width {
                let src_x = (x as u64 * self.width as u64 / width as u64) as usize;
                let offset = (src_y * self.width as usize + src_x) * bpp;
                let px = &self.data[offset..offset + bpp];
                match self.format {
                    PixelFormat::Rgb24 => data.extend_from_slice(px),
                    PixelFormat::Bgra32 => data.extend_from_slice(&[px[2], px[1], px[0]]),
                }
            }
        }
        Ok(Frame {
            data,
            width,
            height,
            format: PixelFormat::Rgb24,
            orientation: self.orientation,
            captured_at: self.captured_at,
        })
    }

    /// Per-pixel luma (BT.601), one byte per pixel.
    pub fn luma(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let bpp = self.format.bytes_per_pixel();
        let luma = self
            .data
            .chunks_exact(bpp)
            .map(|px| {
                let (r, g, b) = match self.format {
                    PixelFormat::Rgb24 => (px[0], px[1], px[2]),
                    PixelFormat::Bgra32 => (px[2], px[1], px[0]),
                };
                let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
                y.round().clamp(0.0, 255.0) as u8
            })
            .collect();
        Ok(luma)
    }
}

fn rgb_to_bgra(rgb: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgb.len() / 3 * 4);
    for px in rgb.chunks_exact(3) {
        out.extend_from_slice(&[px[2], px[1], px[0], 0xff]);
    }
    out
}

fn bgra_to_rgb(bgra: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bgra.len() / 4 * 3);
    for px in bgra.chunks_exact(4) {
        out.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_short_buffers() {
        let frame = Frame::new(vec![0u8; 10], 2, 2, PixelFormat::Bgra32);
        let err = frame.validate().unwrap_err();
        assert!(err.to_string().contains("expected 16, got 10"));
    }

    #[test]
    fn validate_rejects_empty_geometry() {
        let frame = Frame::new(Vec::new(), 0, 4, PixelFormat::Rgb24);
        assert!(frame.validate().is_err());
    }

    #[test]
    fn rgb_to_bgra_swaps_channels_and_adds_alpha() -> Result<()> {
        let frame = Frame::new(vec![10, 20, 30], 1, 1, PixelFormat::Rgb24);
        let frame = frame.convert(PixelFormat::Bgra32)?;
        assert_eq!(frame.format, PixelFormat::Bgra32);
        assert_eq!(frame.pixels(), &[30, 20, 10, 255]);
        assert_eq!(frame.to_rgb()?, vec![10, 20, 30]);
        Ok(())
    }

    #[test]
    fn convert_keeps_orientation() -> Result<()> {
        let frame = Frame::new(vec![0u8; 4], 1, 1, PixelFormat::Bgra32)
            .with_orientation(Orientation::Portrait);
        let frame = frame.convert(PixelFormat::Rgb24)?;
        assert_eq!(frame.orientation, Orientation::Portrait);
        Ok(())
    }

    #[test]
    fn thumbnail_downscales_and_keeps_aspect() -> Result<()> {
        // 4x2 BGRA: left half white, right half black.
        let mut data = Vec::new();
        for _row in 0..2 {
            data.extend_from_slice(&[255, 255, 255, 255, 255, 255, 255, 255]);
            data.extend_from_slice(&[0, 0, 0, 255, 0, 0, 0, 255]);
        }
        let frame = Frame::new(data, 4, 2, PixelFormat::Bgra32)
            .with_orientation(Orientation::Portrait);
        let thumb = frame.thumbnail(2)?;
        assert_eq!((thumb.width, thumb.height), (2, 1));
        assert_eq!(thumb.format, PixelFormat::Rgb24);
        assert_eq!(thumb.orientation, Orientation::Portrait);
        assert_eq!(thumb.pixels(), &[255, 255, 255, 0, 0, 0]);

        let same = frame.thumbnail(16)?;
        assert_eq!((same.width, same.height), (4, 2));
        Ok(())
    }

    #[test]
    fn luma_of_white_and_black() -> Result<()> {
        let frame = Frame::new(vec![255, 255, 255, 0, 0, 0], 2, 1, PixelFormat::Rgb24);
        assert_eq!(frame.luma()?, vec![255, 0]);
        Ok(())
    }
}
