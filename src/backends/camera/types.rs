// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the camera sources and video sinks

//! Shared frame types

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Pixel layout of an 8-bit video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PixelFormat {
    /// Gray8 - 8-bit grayscale (single channel)
    /// Used for the raw depth and amplitude streams
    Gray8,
    /// BGR24 - 24-bit color, blue first (3 bytes per pixel)
    /// USB camera frames and colorized depth
    Bgr24,
}

impl PixelFormat {
    /// Channels per pixel
    pub fn channels(&self) -> u8 {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Bgr24 => 3,
        }
    }

    /// Pick the layout for a color/mono sink
    pub fn for_color(is_color: bool) -> Self {
        if is_color {
            PixelFormat::Bgr24
        } else {
            PixelFormat::Gray8
        }
    }

    /// GStreamer video/x-raw format string
    pub fn to_gst_format_string(&self) -> &'static str {
        match self {
            PixelFormat::Gray8 => "GRAY8",
            PixelFormat::Bgr24 => "BGR",
        }
    }
}

/// Frame geometry: width x height x channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FrameShape {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl FrameShape {
    pub fn new(width: u32, height: u32, channels: u8) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Number of pixels in one frame
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Tightly packed byte length of one frame
    pub fn byte_len(&self) -> usize {
        self.pixel_count() * self.channels as usize
    }

    /// Whether this shape carries three-channel color
    pub fn is_color(&self) -> bool {
        self.channels == 3
    }
}

impl fmt::Display for FrameShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// Framerate as a fraction (numerator/denominator)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    /// Create a new framerate from numerator and denominator
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: if denom == 0 { 1 } else { denom },
        }
    }

    /// Create a framerate from an integer (e.g., 30 becomes 30/1)
    pub fn from_int(fps: u32) -> Self {
        Self { num: fps, denom: 1 }
    }

    /// Build from a V4L2 frame interval (seconds per frame)
    pub fn from_interval(numerator: u32, denominator: u32) -> Self {
        Self::new(denominator, numerator)
    }

    /// Get the framerate as a floating point value
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    /// Get the rounded integer framerate
    pub fn as_int(&self) -> u32 {
        self.num / self.denom
    }
}

impl fmt::Display for Framerate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denom != 1 {
            write!(f, "{:.2}", self.as_f64())
        } else {
            write!(f, "{}", self.num)
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self { num: 30, denom: 1 }
    }
}

/// A tightly packed 8-bit frame ready for a video sink
///
/// Rows are `width * channels` bytes with no padding. Sinks re-stride when
/// the encoder wants aligned rows.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Arc<[u8]>,
    /// Timestamp when the source produced the frame
    pub captured_at: Instant,
}

impl VideoFrame {
    /// Wrap packed pixel data, checking that the length matches the geometry
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, crate::errors::RecorderError> {
        let expected = FrameShape::new(width, height, format.channels()).byte_len();
        if data.len() != expected {
            return Err(crate::errors::RecorderError::InvalidFrameShape(format!(
                "{}x{} {:?} needs {} bytes, got {}",
                width,
                height,
                format,
                expected,
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            format,
            data: Arc::from(data),
            captured_at: Instant::now(),
        })
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape::new(self.width, self.height, self.format.channels())
    }
}

/// Depth + amplitude pair from the ToF sensor
///
/// Depth is in millimeters; amplitude is the sensor's raw 12-bit intensity
/// scale. Both grids are `width * height` samples, row-major.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    pub width: u32,
    pub height: u32,
    pub depth_mm: Arc<[f32]>,
    pub amplitude: Arc<[f32]>,
    /// Frame sequence number
    pub sequence: u64,
    /// Timestamp when frame was captured
    pub captured_at: Instant,
}

impl DepthFrame {
    /// Single-channel shape of each grid in the pair
    pub fn shape(&self) -> FrameShape {
        FrameShape::new(self.width, self.height, 1)
    }
}

/// Device information from V4L2 capability
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceInfo {
    /// V4L2 index (the N in /dev/videoN)
    pub index: usize,
    /// Name of the device (V4L2 card)
    pub card: String,
    /// Driver name (V4L2 driver)
    pub driver: String,
    /// Device path (e.g., /dev/video0)
    pub path: String,
}
