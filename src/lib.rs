// SPDX-License-Identifier: GPL-3.0-only

//! Dual camera recorder
//!
//! Records a Time-of-Flight depth camera and a USB color camera at the same
//! time into three AVI files per session: colorized depth, amplitude and the
//! raw USB stream.
//!
//! # Architecture
//!
//! - [`backends`]: device access (ToF SDK, V4L2) behind [`backends::CaptureBackend`]
//! - [`depth`]: depth-to-color mapping
//! - [`pipelines`]: shape-checked video sinks over GStreamer
//! - [`recorder`]: session state machine, pumps and report
//! - [`config`]: validated recording configuration
//! - [`cli`]: argument groups and commands shared by the binaries

pub mod backends;
pub mod cli;
pub mod config;
pub mod constants;
pub mod depth;
pub mod errors;
pub mod pipelines;
pub mod recorder;
#[cfg(any(test, feature = "testing"))]
#[doc(hidden)]
pub mod testing;

// Re-export commonly used types
pub use config::{RecorderConfig, SchedulingMode, TofCameraConfig, UsbCameraConfig, UsbModePolicy};
pub use errors::{RecorderError, RecorderResult, Stream};
pub use recorder::{Coordinator, SessionReport, SessionState};
