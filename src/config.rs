// SPDX-License-Identifier: GPL-3.0-only

//! Validated recording configuration
//!
//! The CLI argument structs convert into these types; nothing downstream
//! re-checks the values.

use crate::constants::defaults;
use crate::errors::{RecorderError, RecorderResult};
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// What to do when the USB camera cannot provide the requested mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsbModePolicy {
    /// Record at whatever mode the driver negotiated, with a warning
    #[default]
    Fallback,
    /// Refuse to record unless the exact mode is granted
    Strict,
}

/// How the pumps are scheduled during recording
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingMode {
    /// One pump thread per camera
    #[default]
    Threaded,
    /// Both cameras pumped in turn on the calling thread
    Interleaved,
}

/// ToF camera settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TofCameraConfig {
    /// Depth that maps to the end of the color palette, also sent to the
    /// sensor as its range control (mm)
    pub max_distance_mm: f32,
    /// Nominal container frame rate for the depth and amplitude files
    pub fps: u32,
}

impl Default for TofCameraConfig {
    fn default() -> Self {
        Self {
            max_distance_mm: defaults::MAX_DISTANCE_MM,
            fps: defaults::TOF_FPS,
        }
    }
}

impl TofCameraConfig {
    pub fn validate(&self) -> RecorderResult<()> {
        if !self.max_distance_mm.is_finite() || self.max_distance_mm <= 0.0 {
            return Err(RecorderError::Config(format!(
                "max distance must be a positive number of millimeters, got {}",
                self.max_distance_mm
            )));
        }
        if self.fps == 0 {
            return Err(RecorderError::Config("ToF fps must be non-zero".into()));
        }
        Ok(())
    }
}

/// USB camera settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsbCameraConfig {
    /// V4L2 index (the N in /dev/videoN)
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub mode_policy: UsbModePolicy,
}

impl Default for UsbCameraConfig {
    fn default() -> Self {
        Self {
            index: defaults::USB_CAMERA_INDEX,
            width: defaults::USB_WIDTH,
            height: defaults::USB_HEIGHT,
            fps: defaults::USB_FPS,
            mode_policy: UsbModePolicy::default(),
        }
    }
}

impl UsbCameraConfig {
    /// Device node for the configured index
    pub fn device_path(&self) -> String {
        format!("/dev/video{}", self.index)
    }

    pub fn validate(&self) -> RecorderResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RecorderError::Config(format!(
                "USB resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(RecorderError::Config("USB fps must be non-zero".into()));
        }
        Ok(())
    }
}

/// One recording session
///
/// A camera left as `None` is not opened and gets no output file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecorderConfig {
    pub output_dir: PathBuf,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub scheduling: SchedulingMode,
    pub tof: Option<TofCameraConfig>,
    pub usb: Option<UsbCameraConfig>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(defaults::OUTPUT_DIR),
            duration: Duration::from_secs(defaults::DURATION_SECS),
            scheduling: SchedulingMode::default(),
            tof: Some(TofCameraConfig::default()),
            usb: Some(UsbCameraConfig::default()),
        }
    }
}

impl RecorderConfig {
    /// Check every value, including the camera sections
    pub fn validate(&self) -> RecorderResult<()> {
        if self.duration.is_zero() {
            return Err(RecorderError::Config("duration must be non-zero".into()));
        }
        if Instant::now().checked_add(self.duration).is_none() {
            return Err(RecorderError::Config(format!(
                "duration of {}s is too long",
                self.duration.as_secs()
            )));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(RecorderError::Config("output path must not be empty".into()));
        }
        if self.tof.is_none() && self.usb.is_none() {
            return Err(RecorderError::Config("no camera selected".into()));
        }
        if let Some(tof) = &self.tof {
            tof.validate()?;
        }
        if let Some(usb) = &self.usb {
            usb.validate()?;
        }
        Ok(())
    }

    /// ToF read deadline for this session's scheduling
    ///
    /// Sharing a thread with the USB pump needs a short ToF wait so the USB
    /// stream is not starved.
    pub fn tof_timeout(&self) -> Duration {
        use crate::constants::timeouts;
        if self.scheduling == SchedulingMode::Interleaved && self.usb.is_some() {
            timeouts::TOF_INTERLEAVED
        } else {
            timeouts::TOF_THREADED
        }
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
