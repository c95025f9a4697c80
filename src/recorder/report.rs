// SPDX-License-Identifier: GPL-3.0-only

//! End-of-session report

use super::pump::SkipCounters;
use super::state::SessionState;
use crate::config::RecorderConfig;
use crate::errors::Stream;
use crate::pipelines::video::VideoSink;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

/// What one output file ended up with
#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub stream: Stream,
    pub file: PathBuf,
    pub frames_written: u64,
    pub timeouts: u64,
    pub shape_errors: u64,
    /// Frames written per second of recording
    pub fps: f64,
}

impl StreamReport {
    pub fn from_sink(sink: &VideoSink, skips: SkipCounters, elapsed_secs: f64) -> Self {
        let frames_written = sink.frames_written();
        Self {
            stream: sink.stream(),
            file: sink.path().to_path_buf(),
            frames_written,
            timeouts: skips.timeouts,
            shape_errors: skips.shape_errors,
            fps: if elapsed_secs > 0.0 {
                frames_written as f64 / elapsed_secs
            } else {
                0.0
            },
        }
    }
}

/// Outcome of one recording session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub version: &'static str,
    pub state: SessionState,
    /// States visited, in order
    pub transitions: Vec<SessionState>,
    /// Session timestamp used in the file names
    pub timestamp: Option<String>,
    /// Seconds spent in Recording
    pub elapsed_secs: f64,
    pub abort_cause: Option<String>,
    pub config: RecorderConfig,
    pub streams: Vec<StreamReport>,
}

impl SessionReport {
    pub fn exit_code(&self) -> i32 {
        self.state.exit_code()
    }

    pub fn stream(&self, stream: Stream) -> Option<&StreamReport> {
        self.streams.iter().find(|s| s.stream == stream)
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable summary for the terminal
    pub fn summary(&self) -> String {
        let rule = "=".repeat(60);
        let mut out = String::new();
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "RECORDING SUMMARY");
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "State:    {}", self.state);
        if let Some(ts) = &self.timestamp {
            let _ = writeln!(out, "Session:  {}", ts);
        }
        let _ = writeln!(out, "Duration: {:.2}s", self.elapsed_secs);
        if let Some(cause) = &self.abort_cause {
            let _ = writeln!(out, "Cause:    {}", cause);
        }

        for s in &self.streams {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}:", s.stream);
            let _ = writeln!(out, "  File:    {}", s.file.display());
            let _ = writeln!(out, "  Frames:  {}", s.frames_written);
            let _ = writeln!(out, "  FPS:     {:.2}", s.fps);
            if s.timeouts > 0 || s.shape_errors > 0 {
                let _ = writeln!(
                    out,
                    "  Skipped: {} timeouts, {} bad frames",
                    s.timeouts, s.shape_errors
                );
            }
        }
        let _ = write!(out, "{}", rule);
        out
    }
}
