// SPDX-License-Identifier: GPL-3.0-only

//! Session timestamp and output paths

use crate::constants::files;
use crate::errors::{RecorderResult, Stream};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::info;

/// One recording run's identity on disk
#[derive(Debug, Clone)]
pub struct Session {
    output_dir: PathBuf,
    timestamp: String,
}

impl Session {
    pub fn new(output_dir: &Path, started_at: DateTime<Local>) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            timestamp: started_at.format(files::TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Create the output directory and stamp the session with the current time
    pub fn start(output_dir: &Path) -> RecorderResult<Self> {
        std::fs::create_dir_all(output_dir)?;
        let session = Self::new(output_dir, Local::now());
        info!(
            output_dir = %output_dir.display(),
            timestamp = %session.timestamp,
            "Session started"
        );
        Ok(session)
    }

    /// `YYYYMMDD_HHMMSS` shared by every file of the session
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Output file for a stream
    pub fn path_for(&self, stream: Stream) -> PathBuf {
        let prefix = match stream {
            Stream::TofDepth => files::TOF_DEPTH_PREFIX,
            Stream::TofAmplitude => files::TOF_AMPLITUDE_PREFIX,
            Stream::UsbCamera => files::USB_CAMERA_PREFIX,
        };
        self.output_dir
            .join(format!("{}_{}.{}", prefix, self.timestamp, files::EXTENSION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_paths_share_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let session = Session::new(Path::new("recordings"), at);

        assert_eq!(session.timestamp(), "20240309_140507");
        assert_eq!(
            session.path_for(Stream::TofDepth),
            PathBuf::from("recordings/tof_depth_20240309_140507.avi")
        );
        assert_eq!(
            session.path_for(Stream::TofAmplitude),
            PathBuf::from("recordings/tof_amplitude_20240309_140507.avi")
        );
        assert_eq!(
            session.path_for(Stream::UsbCamera),
            PathBuf::from("recordings/usb_camera_20240309_140507.avi")
        );
    }

    #[test]
    fn test_start_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out");
        Session::start(&out).unwrap();
        assert!(out.is_dir());
    }
}
