// SPDX-License-Identifier: GPL-3.0-only

//! Hardware access
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             Recording Coordinator            │
//! └────────────────────┬────────────────────────┘
//!                      │ CaptureBackend
//! ┌────────────────────┴────────────────────────┐
//! │  ┌─────────────┐ ┌─────────────┐ ┌────────┐ │
//! │  │ ToF (SDK)   │ │ USB (V4L2)  │ │ Sinks  │ │
//! │  └─────────────┘ └─────────────┘ └────────┘ │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The coordinator only talks to [`CaptureBackend`], so the whole session can
//! run against in-memory devices in tests.

pub mod camera;

use crate::config::{TofCameraConfig, UsbCameraConfig};
use crate::errors::RecorderResult;
use crate::pipelines::video::{EncoderFactory, GstEncoderFactory};
use camera::{ColorSource, DepthSource};
use std::time::Duration;

/// Opens the devices and encoders a session needs
pub trait CaptureBackend: Send + Sync {
    /// Open the ToF camera with the given read deadline
    fn open_tof(
        &self,
        config: &TofCameraConfig,
        timeout: Duration,
    ) -> RecorderResult<Box<dyn DepthSource>>;

    /// Open the USB camera with the given read deadline
    fn open_usb(
        &self,
        config: &UsbCameraConfig,
        timeout: Duration,
    ) -> RecorderResult<Box<dyn ColorSource>>;

    /// Encoders for the output files
    fn encoders(&self) -> &dyn EncoderFactory;
}

/// Real hardware: vendor ToF SDK, V4L2 and GStreamer
#[derive(Debug, Default)]
pub struct SystemBackend {
    encoders: GstEncoderFactory,
}

impl CaptureBackend for SystemBackend {
    fn open_tof(
        &self,
        config: &TofCameraConfig,
        timeout: Duration,
    ) -> RecorderResult<Box<dyn DepthSource>> {
        camera::tof::open_default(config, timeout)
    }

    fn open_usb(
        &self,
        config: &UsbCameraConfig,
        timeout: Duration,
    ) -> RecorderResult<Box<dyn ColorSource>> {
        Ok(Box::new(camera::v4l2_usb::V4l2UsbCamera::open(
            config, timeout,
        )?))
    }

    fn encoders(&self) -> &dyn EncoderFactory {
        &self.encoders
    }
}

/// Get the backend for real devices
pub fn get_backend() -> SystemBackend {
    SystemBackend::default()
}
