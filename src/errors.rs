// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the recorder
//!
//! Open-time failures (`DeviceUnavailable`, `EncoderUnavailable`) abort the
//! session. Per-frame failures (`CaptureTimeout`, `ShapeMismatch`,
//! `InvalidFrameShape`) only skip the frame they occurred on.

use crate::backends::camera::types::FrameShape;
use std::fmt;
use std::time::Duration;

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;

/// Which physical stream an error (or log line) belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    /// ToF depth map (colorized on the way to disk)
    TofDepth,
    /// ToF amplitude map
    TofAmplitude,
    /// Raw USB camera frames
    UsbCamera,
}

impl Stream {
    /// Short name used in log fields and report keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::TofDepth => "tof_depth",
            Stream::TofAmplitude => "tof_amplitude",
            Stream::UsbCamera => "usb_camera",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main recorder error type
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// Device missing, busy, or unable to provide the requested mode
    #[error("{stream}: device unavailable: {reason}")]
    DeviceUnavailable { stream: Stream, reason: String },

    /// No frame arrived within the device timeout
    #[error("{stream}: no frame within {}ms", .timeout.as_millis())]
    CaptureTimeout { stream: Stream, timeout: Duration },

    /// Frame geometry differs from what the sink was opened with
    #[error("{stream}: frame shape {actual} does not match sink shape {expected}")]
    ShapeMismatch {
        stream: Stream,
        expected: FrameShape,
        actual: FrameShape,
    },

    /// Producer handed over a buffer that does not describe its own geometry
    #[error("invalid frame shape: {0}")]
    InvalidFrameShape(String),

    /// No usable codec/container combination
    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// Encoding pipeline failed while recording
    #[error("{stream}: encoder failure: {reason}")]
    Encoder { stream: Stream, reason: String },

    /// Device I/O failed while recording (disconnect, driver error)
    #[error("{stream}: device failure: {reason}")]
    Device { stream: Stream, reason: String },

    /// Rejected configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors (output directory)
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecorderError {
    /// Per-frame failures that skip one iteration instead of ending the session
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RecorderError::CaptureTimeout { .. }
                | RecorderError::ShapeMismatch { .. }
                | RecorderError::InvalidFrameShape(_)
        )
    }

    /// Stream the error is attributed to, if any
    pub fn stream(&self) -> Option<Stream> {
        match self {
            RecorderError::DeviceUnavailable { stream, .. }
            | RecorderError::CaptureTimeout { stream, .. }
            | RecorderError::ShapeMismatch { stream, .. }
            | RecorderError::Encoder { stream, .. }
            | RecorderError::Device { stream, .. } => Some(*stream),
            _ => None,
        }
    }
}
