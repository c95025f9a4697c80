// SPDX-License-Identifier: GPL-3.0-only

//! Command-line plumbing shared by the recorder binaries
//!
//! This module provides:
//! - clap argument groups that flatten into each binary
//! - logging and Ctrl+C setup
//! - the `list` and `probe` commands
//! - running a session and printing its report

use crate::backends::CaptureBackend;
use crate::backends::camera::v4l2_utils::enumerate_capture_devices;
use crate::config::{
    RecorderConfig, SchedulingMode, TofCameraConfig, UsbCameraConfig, UsbModePolicy,
};
use crate::constants::{defaults, timeouts};
use crate::errors::{RecorderError, RecorderResult, Stream};
use crate::pipelines::video::encoder_selection::detect_avi_encoders;
use crate::recorder::{Coordinator, SessionReport};
use clap::Args;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// Reads attempted per camera by `probe` before giving up
const PROBE_ATTEMPTS: usize = 3;

/// ToF camera options
#[derive(Debug, Clone, Args)]
pub struct TofArgs {
    /// Depth shown at the red end of the palette, in millimeters
    #[arg(long = "max-distance", default_value_t = defaults::MAX_DISTANCE_MM)]
    pub max_distance: f32,

    /// Frame rate written into the depth and amplitude files
    #[arg(long = "tof-fps", default_value_t = defaults::TOF_FPS)]
    pub tof_fps: u32,
}

impl From<&TofArgs> for TofCameraConfig {
    fn from(args: &TofArgs) -> Self {
        Self {
            max_distance_mm: args.max_distance,
            fps: args.tof_fps,
        }
    }
}

/// USB camera options
#[derive(Debug, Clone, Args)]
pub struct UsbArgs {
    /// V4L2 device index (/dev/videoN)
    #[arg(long = "usb-camera", default_value_t = defaults::USB_CAMERA_INDEX)]
    pub usb_camera: usize,

    #[arg(long = "usb-width", default_value_t = defaults::USB_WIDTH)]
    pub usb_width: u32,

    #[arg(long = "usb-height", default_value_t = defaults::USB_HEIGHT)]
    pub usb_height: u32,

    #[arg(long = "usb-fps", default_value_t = defaults::USB_FPS)]
    pub usb_fps: u32,

    /// Fail instead of recording at a different mode than requested
    #[arg(long = "strict-usb-mode")]
    pub strict_usb_mode: bool,
}

impl From<&UsbArgs> for UsbCameraConfig {
    fn from(args: &UsbArgs) -> Self {
        Self {
            index: args.usb_camera,
            width: args.usb_width,
            height: args.usb_height,
            fps: args.usb_fps,
            mode_policy: if args.strict_usb_mode {
                UsbModePolicy::Strict
            } else {
                UsbModePolicy::Fallback
            },
        }
    }
}

/// Session length, destination and report format
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Recording duration in seconds
    #[arg(short, long, default_value_t = defaults::DURATION_SECS as f64)]
    pub duration: f64,

    /// Output directory
    #[arg(short, long, default_value = defaults::OUTPUT_DIR)]
    pub output: PathBuf,

    /// Print the session report as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

impl OutputArgs {
    /// Build a validated config for the given cameras
    pub fn into_config(
        &self,
        tof: Option<&TofArgs>,
        usb: Option<&UsbArgs>,
        scheduling: SchedulingMode,
    ) -> RecorderResult<RecorderConfig> {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(RecorderError::Config(format!(
                "duration must be a positive number of seconds, got {}",
                self.duration
            )));
        }

        let duration = Duration::try_from_secs_f64(self.duration).map_err(|e| {
            RecorderError::Config(format!("duration of {}s: {}", self.duration, e))
        })?;

        let config = RecorderConfig {
            output_dir: self.output.clone(),
            duration,
            scheduling,
            tof: tof.map(TofCameraConfig::from),
            usb: usb.map(UsbCameraConfig::from),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Initialize logging
///
/// Set RUST_LOG to control the level, for example `RUST_LOG=debug` or
/// `RUST_LOG=dual_camera_recorder::recorder=debug`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .with_level(true)
        .init();
}

/// Raise `stop` on Ctrl+C
pub fn install_interrupt_handler(stop: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        if !stop.swap(true, Ordering::SeqCst) {
            info!("Interrupt received, stopping");
        }
    })?;
    Ok(())
}

/// Record one session and print its report; returns the process exit code
pub fn record<B: CaptureBackend>(
    backend: B,
    config: RecorderConfig,
    json: bool,
) -> anyhow::Result<i32> {
    let coordinator = Coordinator::new(backend, config)?;
    install_interrupt_handler(coordinator.stop_handle())?;

    println!("Recording... (press Ctrl+C to stop early)");
    let report = coordinator.run();
    print_report(&report, json)?;

    if let Some(cause) = &report.abort_cause {
        error!(cause = %cause, state = %report.state, "Recording aborted");
    }
    Ok(report.exit_code())
}

pub fn print_report(report: &SessionReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        println!();
        println!("{}", report.summary());
    }
    Ok(())
}

/// List V4L2 capture devices and the AVI encoders GStreamer offers
pub fn list_devices() -> anyhow::Result<()> {
    let devices = enumerate_capture_devices();

    if devices.is_empty() {
        println!("No V4L2 capture devices found.");
    } else {
        println!("Available capture devices:");
        println!();
        for device in &devices {
            println!("  [{}] {}", device.index, device.card);
            println!("      Driver: {}", device.driver);
            println!("      Path:   {}", device.path);
        }
    }

    println!();
    gstreamer::init()?;
    let encoders = detect_avi_encoders();
    if encoders.is_empty() {
        println!("No AVI encoders available (install gst-libav or gst-plugins-ugly).");
    } else {
        println!("AVI encoders: {}", encoders.join(", "));
    }

    Ok(())
}

/// Result of probing one camera
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub stream: Stream,
    /// Frame shape on success, the failure otherwise
    pub outcome: Result<String, String>,
}

impl ProbeResult {
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Open each configured camera, grab one frame, close it
pub fn probe_cameras<B: CaptureBackend>(
    backend: &B,
    tof: Option<&TofCameraConfig>,
    usb: Option<&UsbCameraConfig>,
) -> Vec<ProbeResult> {
    let mut results = Vec::new();

    if let Some(config) = tof {
        let outcome = backend
            .open_tof(config, timeouts::TOF_THREADED)
            .and_then(|mut source| {
                let frame = retry_read(Stream::TofDepth, || source.read_frame());
                let closed = source.close();
                let frame = frame?;
                closed?;
                Ok(frame.shape().to_string())
            });
        results.push(ProbeResult {
            stream: Stream::TofDepth,
            outcome: outcome.map_err(|e| e.to_string()),
        });
    }

    if let Some(config) = usb {
        let outcome = backend
            .open_usb(config, timeouts::USB)
            .and_then(|mut source| {
                let frame = retry_read(Stream::UsbCamera, || source.read_frame());
                let closed = source.close();
                let frame = frame?;
                closed?;
                Ok(format!("{} @ {}fps", frame.shape(), source.fps()))
            });
        results.push(ProbeResult {
            stream: Stream::UsbCamera,
            outcome: outcome.map_err(|e| e.to_string()),
        });
    }

    results
}

/// First frame within a few reads; recoverable failures are retried
fn retry_read<T>(stream: Stream, mut read: impl FnMut() -> RecorderResult<T>) -> RecorderResult<T> {
    let mut attempt = 1;
    loop {
        match read() {
            Err(e) if e.is_recoverable() && attempt < PROBE_ATTEMPTS => {
                warn!(stream = %stream, attempt, error = %e, "Probe read failed, retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Print probe results; returns the process exit code
pub fn report_probe(results: &[ProbeResult]) -> i32 {
    println!("Camera probe:");
    for result in results {
        match &result.outcome {
            Ok(detail) => println!("  {:<14} PASS  {}", result.stream, detail),
            Err(cause) => println!("  {:<14} FAIL  {}", result.stream, cause),
        }
    }

    if results.iter().all(ProbeResult::passed) {
        0
    } else {
        1
    }
}

/// Process exit status for a report or probe code
pub fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code)
        .map(ExitCode::from)
        .unwrap_or(ExitCode::FAILURE)
}
