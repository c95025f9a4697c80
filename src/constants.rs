// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Recording defaults, matching the CLI defaults
pub mod defaults {
    /// Recording length in seconds
    pub const DURATION_SECS: u64 = 10;

    /// Output directory, relative to the working directory
    pub const OUTPUT_DIR: &str = "recordings";

    /// USB camera V4L2 index
    pub const USB_CAMERA_INDEX: usize = 0;

    /// Requested USB camera mode
    pub const USB_WIDTH: u32 = 1280;
    pub const USB_HEIGHT: u32 = 720;
    pub const USB_FPS: u32 = 30;

    /// Depth range the colorizer maps onto the full palette (mm)
    pub const MAX_DISTANCE_MM: f32 = 4000.0;

    /// Nominal rate written into the ToF containers
    pub const TOF_FPS: u32 = 20;
}

/// Read deadlines for each source
pub mod timeouts {
    use super::Duration;

    /// ToF frame request when the pump has its own thread
    pub const TOF_THREADED: Duration = Duration::from_millis(1000);

    /// ToF frame request when both cameras share one thread
    pub const TOF_INTERLEAVED: Duration = Duration::from_millis(200);

    /// USB dequeue
    pub const USB: Duration = Duration::from_millis(1000);

    /// Muxer finalization after EOS
    pub const SINK_FINALIZE: Duration = Duration::from_secs(5);

    /// Pipeline start (NULL -> PLAYING)
    pub const SINK_START: Duration = Duration::from_secs(5);
}

/// Coordinator supervision tick
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Largest amplitude the ToF sensor reports (12-bit)
pub const AMPLITUDE_FULL_SCALE: f32 = 4095.0;

/// V4L2 mmap buffers requested for the USB stream
pub const USB_BUFFER_COUNT: u32 = 4;

/// Frame counter modulo for periodic debug logging
pub const FRAME_LOG_INTERVAL: u64 = 60;

/// Output file naming
pub mod files {
    /// strftime pattern for the shared session timestamp
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

    pub const TOF_DEPTH_PREFIX: &str = "tof_depth";
    pub const TOF_AMPLITUDE_PREFIX: &str = "tof_amplitude";
    pub const USB_CAMERA_PREFIX: &str = "usb_camera";

    /// Container extension for every stream
    pub const EXTENSION: &str = "avi";
}

/// GStreamer pipeline constants
pub mod pipeline {
    /// Threads for videoconvert based on available CPU threads
    pub fn videoconvert_threads() -> u32 {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(4)
    }

    /// appsrc queue limit in bytes before push_buffer blocks
    pub const APPSRC_MAX_BYTES: u64 = 64 * 1024 * 1024;
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
