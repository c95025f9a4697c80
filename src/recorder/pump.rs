// SPDX-License-Identifier: GPL-3.0-only

//! Frame pumps: read one frame, convert, write
//!
//! A pump step only fails for errors that end the session. Per-frame
//! failures are counted against their stream and the frame is skipped.

use crate::backends::camera::format_converters::amplitude_to_gray8;
use crate::backends::camera::types::{PixelFormat, VideoFrame};
use crate::backends::camera::{ColorSource, DepthSource};
use crate::constants::FRAME_LOG_INTERVAL;
use crate::depth::colorize;
use crate::errors::{RecorderError, RecorderResult, Stream};
use crate::pipelines::video::VideoSink;
use serde::Serialize;
use tracing::{debug, warn};

/// Frames skipped on one stream, by cause
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkipCounters {
    /// Reads that hit the source deadline
    pub timeouts: u64,
    /// Frames dropped for a wrong size or a malformed buffer
    pub shape_errors: u64,
}

impl SkipCounters {
    /// Count a recoverable error, or hand back a fatal one
    fn absorb(&mut self, stream: Stream, result: RecorderResult<()>) -> RecorderResult<()> {
        let err = match result {
            Ok(()) => return Ok(()),
            Err(e) if e.is_recoverable() => e,
            Err(e) => return Err(e),
        };

        let count = match err {
            RecorderError::CaptureTimeout { .. } => {
                self.timeouts += 1;
                self.timeouts
            }
            _ => {
                self.shape_errors += 1;
                self.shape_errors
            }
        };

        // First occurrence always, then rate-limited
        if count == 1 || count % FRAME_LOG_INTERVAL == 0 {
            warn!(stream = %stream, operation = "write", count, error = %err, "Frame skipped");
        }
        Ok(())
    }
}

/// One camera's read-convert-write loop body
pub trait Pump: Send {
    /// Thread and log name
    fn name(&self) -> &'static str;

    /// Move one frame from the source to the sink(s)
    fn step(&mut self) -> RecorderResult<()>;
}

/// ToF source feeding the colorized depth sink and the amplitude sink
pub struct TofPump {
    pub source: Box<dyn DepthSource>,
    pub depth_sink: VideoSink,
    pub amplitude_sink: VideoSink,
    pub max_distance_mm: f32,
    pub depth_skips: SkipCounters,
    pub amplitude_skips: SkipCounters,
    frames_read: u64,
}

impl TofPump {
    pub fn new(
        source: Box<dyn DepthSource>,
        depth_sink: VideoSink,
        amplitude_sink: VideoSink,
        max_distance_mm: f32,
    ) -> Self {
        Self {
            source,
            depth_sink,
            amplitude_sink,
            max_distance_mm,
            depth_skips: SkipCounters::default(),
            amplitude_skips: SkipCounters::default(),
            frames_read: 0,
        }
    }
}

impl Pump for TofPump {
    fn name(&self) -> &'static str {
        "tof-pump"
    }

    fn step(&mut self) -> RecorderResult<()> {
        let frame = match self.source.read_frame() {
            Ok(frame) => frame,
            Err(e) if e.is_recoverable() => {
                // Neither ToF file gets a frame this round
                self.amplitude_skips
                    .absorb(Stream::TofAmplitude, Err(clone_recoverable(&e)))?;
                return self.depth_skips.absorb(Stream::TofDepth, Err(e));
            }
            Err(e) => return Err(e),
        };
        self.frames_read += 1;

        // Depth and amplitude writes are independent of each other
        let depth = colorize(&frame, self.max_distance_mm)
            .and_then(|colored| self.depth_sink.write(&colored));
        self.depth_skips.absorb(Stream::TofDepth, depth)?;

        let amplitude = VideoFrame::new(
            frame.width,
            frame.height,
            PixelFormat::Gray8,
            amplitude_to_gray8(&frame.amplitude),
        )
        .and_then(|gray| self.amplitude_sink.write(&gray));
        self.amplitude_skips.absorb(Stream::TofAmplitude, amplitude)?;

        if self.frames_read % FRAME_LOG_INTERVAL == 0 {
            debug!(
                stream = %Stream::TofDepth,
                frame = frame.sequence,
                depth_written = self.depth_sink.frames_written(),
                amplitude_written = self.amplitude_sink.frames_written(),
                "ToF frames written"
            );
        }
        Ok(())
    }
}

/// USB source feeding the raw camera sink
pub struct UsbPump {
    pub source: Box<dyn ColorSource>,
    pub sink: VideoSink,
    pub skips: SkipCounters,
}

impl UsbPump {
    pub fn new(source: Box<dyn ColorSource>, sink: VideoSink) -> Self {
        Self {
            source,
            sink,
            skips: SkipCounters::default(),
        }
    }
}

impl Pump for UsbPump {
    fn name(&self) -> &'static str {
        "usb-pump"
    }

    fn step(&mut self) -> RecorderResult<()> {
        let result = self
            .source
            .read_frame()
            .and_then(|frame| self.sink.write(&frame));
        self.skips.absorb(Stream::UsbCamera, result)?;

        let written = self.sink.frames_written();
        if written > 0 && written % FRAME_LOG_INTERVAL == 0 {
            debug!(stream = %Stream::UsbCamera, frame = written, "USB frames written");
        }
        Ok(())
    }
}

/// Same cause, for counting one read failure against a second stream
fn clone_recoverable(err: &RecorderError) -> RecorderError {
    match err {
        RecorderError::CaptureTimeout { timeout, .. } => RecorderError::CaptureTimeout {
            stream: Stream::TofAmplitude,
            timeout: *timeout,
        },
        other => RecorderError::InvalidFrameShape(other.to_string()),
    }
}
