// SPDX-License-Identifier: GPL-3.0-only

//! Time-of-Flight depth camera source
//!
//! The vendor SDK is reached through [`DepthSdk`]. [`TofCamera`] owns one SDK
//! handle and adds the open sequence (CSI, then USB), shape checking, and
//! close-once semantics on top of it.

#[cfg(feature = "arducam")]
pub mod arducam;

use super::DepthSource;
use super::types::{DepthFrame, FrameShape};
use crate::config::TofCameraConfig;
use crate::constants::FRAME_LOG_INTERVAL;
use crate::errors::{RecorderError, RecorderResult, Stream};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Physical link between the host and the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Csi,
    Usb,
}

impl Connection {
    /// Order in which links are tried at open
    pub const PREFERENCE: [Connection; 2] = [Connection::Csi, Connection::Usb];
}

/// Failure reported by the vendor SDK
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    /// A call returned a non-zero status
    #[error("{call} returned status {status}")]
    Status { call: &'static str, status: i32 },
    /// No frame was ready before the deadline
    #[error("no frame before deadline")]
    Timeout,
    /// This build cannot talk to the sensor at all
    #[error("{0}")]
    Unsupported(String),
}

/// One depth/amplitude pair copied out of the SDK's frame buffer
#[derive(Debug, Clone)]
pub struct SdkFrame {
    pub width: u32,
    pub height: u32,
    pub depth: Vec<f32>,
    pub amplitude: Vec<f32>,
}

/// Safe view of the vendor depth SDK
///
/// Implementations must release the SDK's frame buffer inside
/// `request_frame` on every path, including errors.
pub trait DepthSdk: Send {
    /// Claim the sensor over the given link
    fn open(&mut self, connection: Connection) -> Result<(), SdkError>;

    /// Start the depth output
    fn start(&mut self) -> Result<(), SdkError>;

    /// Set the range control (mm)
    fn set_range(&mut self, max_distance_mm: i32) -> Result<(), SdkError>;

    /// Frame geometry reported by the sensor after open
    fn frame_size(&self) -> Result<(u32, u32), SdkError>;

    /// Wait up to `timeout` for the next frame
    fn request_frame(&mut self, timeout: Duration) -> Result<SdkFrame, SdkError>;

    fn stop(&mut self) -> Result<(), SdkError>;

    /// Release the sensor handle
    fn close(&mut self) -> Result<(), SdkError>;
}

/// ToF camera wrapping a [`DepthSdk`]
pub struct TofCamera<S: DepthSdk> {
    sdk: S,
    shape: FrameShape,
    timeout: Duration,
    connection: Connection,
    streaming: bool,
    open: bool,
    sequence: u64,
}

impl<S: DepthSdk> TofCamera<S> {
    /// Open the sensor, start depth output and configure its range
    ///
    /// Anything claimed before a failure is released before returning.
    pub fn open(mut sdk: S, config: &TofCameraConfig, timeout: Duration) -> RecorderResult<Self> {
        let mut last_error = None;
        let mut connection = None;
        for link in Connection::PREFERENCE {
            match sdk.open(link) {
                Ok(()) => {
                    connection = Some(link);
                    break;
                }
                Err(e) => {
                    debug!(?link, error = %e, "ToF open failed on link");
                    last_error = Some(e);
                }
            }
        }

        let Some(connection) = connection else {
            // The handle exists even though no link came up
            if let Err(e) = sdk.close() {
                warn!(stream = %Stream::TofDepth, error = %e, "Failed to release ToF handle");
            }
            return Err(unavailable(
                last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no connection attempted".into()),
            ));
        };

        // From here Drop releases the handle on any early return
        let mut camera = Self {
            sdk,
            shape: FrameShape::new(0, 0, 1),
            timeout,
            connection,
            streaming: false,
            open: true,
            sequence: 0,
        };

        camera.sdk.start().map_err(|e| unavailable(e.to_string()))?;
        camera.streaming = true;

        let range = config.max_distance_mm.round() as i32;
        if let Err(e) = camera.sdk.set_range(range) {
            // Sensor keeps its default range; colorizing still uses ours
            warn!(stream = %Stream::TofDepth, range, error = %e, "Failed to set ToF range");
        }

        let (width, height) = camera
            .sdk
            .frame_size()
            .map_err(|e| unavailable(e.to_string()))?;
        if width == 0 || height == 0 {
            return Err(unavailable(format!("sensor reported {}x{}", width, height)));
        }
        camera.shape = FrameShape::new(width, height, 1);

        info!(
            stream = %Stream::TofDepth,
            ?connection,
            width,
            height,
            range,
            timeout_ms = timeout.as_millis() as u64,
            "ToF camera opened"
        );

        Ok(camera)
    }

    pub fn connection(&self) -> Connection {
        self.connection
    }
}

impl<S: DepthSdk> DepthSource for TofCamera<S> {
    fn shape(&self) -> FrameShape {
        self.shape
    }

    fn read_frame(&mut self) -> RecorderResult<DepthFrame> {
        if !self.streaming {
            return Err(RecorderError::Device {
                stream: Stream::TofDepth,
                reason: "read after close".into(),
            });
        }

        let frame = match self.sdk.request_frame(self.timeout) {
            Ok(frame) => frame,
            Err(SdkError::Timeout) => {
                return Err(RecorderError::CaptureTimeout {
                    stream: Stream::TofDepth,
                    timeout: self.timeout,
                });
            }
            Err(e) => {
                return Err(RecorderError::Device {
                    stream: Stream::TofDepth,
                    reason: e.to_string(),
                });
            }
        };

        let actual = FrameShape::new(frame.width, frame.height, 1);
        let pixels = self.shape.pixel_count();
        if actual != self.shape || frame.depth.len() != pixels || frame.amplitude.len() != pixels
        {
            return Err(RecorderError::InvalidFrameShape(format!(
                "ToF frame {} with {} depth / {} amplitude samples, expected {}",
                actual,
                frame.depth.len(),
                frame.amplitude.len(),
                self.shape
            )));
        }

        let sequence = self.sequence;
        self.sequence += 1;
        if sequence % FRAME_LOG_INTERVAL == 0 {
            debug!(stream = %Stream::TofDepth, frame = sequence, "ToF frame captured");
        }

        Ok(DepthFrame {
            width: frame.width,
            height: frame.height,
            depth_mm: Arc::from(frame.depth),
            amplitude: Arc::from(frame.amplitude),
            sequence,
            captured_at: Instant::now(),
        })
    }

    fn close(&mut self) -> RecorderResult<()> {
        let mut first_error = None;

        if self.streaming {
            self.streaming = false;
            if let Err(e) = self.sdk.stop() {
                warn!(stream = %Stream::TofDepth, error = %e, "Failed to stop ToF stream");
                first_error.get_or_insert(e);
            }
        }

        if self.open {
            self.open = false;
            if let Err(e) = self.sdk.close() {
                warn!(stream = %Stream::TofDepth, error = %e, "Failed to close ToF camera");
                first_error.get_or_insert(e);
            } else {
                info!(stream = %Stream::TofDepth, frames = self.sequence, "ToF camera closed");
            }
        }

        match first_error {
            Some(e) => Err(RecorderError::Device {
                stream: Stream::TofDepth,
                reason: e.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl<S: DepthSdk> Drop for TofCamera<S> {
    fn drop(&mut self) {
        if self.open {
            debug!(stream = %Stream::TofDepth, "ToF camera dropped while open, closing");
            let _ = DepthSource::close(self);
        }
    }
}

fn unavailable(reason: String) -> RecorderError {
    RecorderError::DeviceUnavailable {
        stream: Stream::TofDepth,
        reason,
    }
}

/// Open the ToF camera through the SDK this build was compiled with
pub fn open_default(
    config: &TofCameraConfig,
    timeout: Duration,
) -> RecorderResult<Box<dyn DepthSource>> {
    #[cfg(feature = "arducam")]
    {
        let sdk = arducam::ArducamSdk::new().map_err(|e| unavailable(e.to_string()))?;
        Ok(Box::new(TofCamera::open(sdk, config, timeout)?))
    }

    #[cfg(not(feature = "arducam"))]
    {
        let _ = (config, timeout);
        Err(unavailable(
            "built without ToF SDK support (enable the `arducam` feature)".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSdk, SdkScript};

    fn open(script: SdkScript) -> RecorderResult<TofCamera<FakeSdk>> {
        TofCamera::open(
            FakeSdk::new(script),
            &TofCameraConfig::default(),
            Duration::from_millis(200),
        )
    }

    #[test]
    fn test_falls_back_to_usb_link() {
        let script = SdkScript {
            fail_csi: true,
            ..Default::default()
        };
        let log = script.log.clone();
        let camera = open(script).unwrap();
        assert_eq!(camera.connection(), Connection::Usb);
        assert_eq!(camera.shape(), FrameShape::new(240, 180, 1));
        assert_eq!(log.ranges(), vec![4000]);
    }

    #[test]
    fn test_no_link_is_unavailable_and_releases_handle() {
        let script = SdkScript {
            fail_csi: true,
            fail_usb: true,
            ..Default::default()
        };
        let log = script.log.clone();
        let err = open(script).err().unwrap();
        assert!(matches!(err, RecorderError::DeviceUnavailable { .. }));
        assert_eq!(log.closes(), 1);
        assert_eq!(log.stops(), 0);
    }

    #[test]
    fn test_failed_start_releases_handle() {
        let script = SdkScript {
            fail_start: true,
            ..Default::default()
        };
        let log = script.log.clone();
        assert!(open(script).is_err());
        assert_eq!(log.closes(), 1);
        assert_eq!(log.stops(), 0);
    }

    #[test]
    fn test_timeout_and_bad_shape() {
        let script = SdkScript {
            timeout_at: vec![0],
            short_frame_at: vec![1],
            ..Default::default()
        };
        let mut camera = open(script).unwrap();

        assert!(matches!(
            camera.read_frame(),
            Err(RecorderError::CaptureTimeout { .. })
        ));
        assert!(matches!(
            camera.read_frame(),
            Err(RecorderError::InvalidFrameShape(_))
        ));
        let frame = camera.read_frame().unwrap();
        assert_eq!(frame.shape(), camera.shape());
        assert_eq!(frame.sequence, 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let script = SdkScript::default();
        let log = script.log.clone();
        let mut camera = open(script).unwrap();

        camera.close().unwrap();
        camera.close().unwrap();
        drop(camera);

        assert_eq!(log.stops(), 1);
        assert_eq!(log.closes(), 1);
    }

    #[test]
    fn test_drop_closes() {
        let script = SdkScript::default();
        let log = script.log.clone();
        drop(open(script).unwrap());
        assert_eq!(log.closes(), 1);
    }
}
