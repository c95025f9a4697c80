// SPDX-License-Identifier: GPL-3.0-only

//! Video file output
//!
//! [`VideoSink`] enforces the frame shape declared at open and counts what it
//! writes. The actual encoding sits behind [`FrameEncoder`]; production
//! builds use the GStreamer AVI pipeline in [`recorder`].

pub mod encoder_selection;
pub mod muxer;
pub mod recorder;
pub mod sink;

pub use recorder::{GstAviEncoder, GstEncoderFactory};
pub use sink::VideoSink;

use crate::backends::camera::types::{FrameShape, VideoFrame};
use crate::errors::{RecorderResult, Stream};
use std::path::Path;

/// Encoding backend for one output file
pub trait FrameEncoder: Send {
    /// Encoder element (or fake) in use, for logging
    fn name(&self) -> &str;

    /// Encode one frame. `index` is the frame's position in the file.
    ///
    /// The caller has already checked the frame against the open shape.
    fn push(&mut self, frame: &VideoFrame, index: u64) -> RecorderResult<()>;

    /// Flush and finalize the container. Must tolerate repeated calls.
    fn finish(&mut self) -> RecorderResult<()>;
}

/// Creates encoders for new output files
pub trait EncoderFactory: Send + Sync {
    fn open_encoder(
        &self,
        stream: Stream,
        path: &Path,
        fps: u32,
        shape: FrameShape,
    ) -> RecorderResult<Box<dyn FrameEncoder>>;
}
