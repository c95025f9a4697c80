// SPDX-License-Identifier: GPL-3.0-only

//! Direct V4L2 capture for the USB camera
//!
//! Uses the v4l crate with memory-mapped buffers. YUYV is preferred since it
//! converts without a decoder; MJPG is the fallback for cameras that only
//! offer high resolutions compressed.

use super::ColorSource;
use super::format_converters::{mjpeg_to_bgr, yuyv_to_bgr};
use super::types::{FrameShape, Framerate, PixelFormat, VideoFrame};
use super::v4l2_utils::fourcc_name;
use crate::config::{UsbCameraConfig, UsbModePolicy};
use crate::constants::{FRAME_LOG_INTERVAL, USB_BUFFER_COUNT};
use crate::errors::{RecorderError, RecorderResult, Stream};
use std::fmt;
use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::{CaptureStream, Stream as _};
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;

/// Wire formats we can turn into BGR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    Yuyv,
    Mjpg,
}

impl CaptureFormat {
    /// Negotiation order
    pub const PREFERENCE: [CaptureFormat; 2] = [CaptureFormat::Yuyv, CaptureFormat::Mjpg];

    pub fn fourcc(&self) -> v4l::FourCC {
        match self {
            CaptureFormat::Yuyv => v4l::FourCC::new(b"YUYV"),
            CaptureFormat::Mjpg => v4l::FourCC::new(b"MJPG"),
        }
    }
}

/// Resolution and rate of a capture mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbMode {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl fmt::Display for UsbMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.fps)
    }
}

/// Decide whether a negotiated mode is usable under `policy`
///
/// Returns the mode the session should declare.
pub fn accept_mode(
    requested: UsbMode,
    actual: UsbMode,
    policy: UsbModePolicy,
) -> RecorderResult<UsbMode> {
    if requested == actual {
        return Ok(actual);
    }

    match policy {
        UsbModePolicy::Fallback => {
            warn!(
                stream = %Stream::UsbCamera,
                requested = %requested,
                actual = %actual,
                "USB camera did not grant the requested mode, recording at the negotiated mode"
            );
            Ok(actual)
        }
        UsbModePolicy::Strict => Err(unavailable(format!(
            "requested {} but device negotiated {}",
            requested, actual
        ))),
    }
}

/// USB camera capturing through V4L2 mmap streaming
pub struct V4l2UsbCamera {
    // Field order matters: the stream must drop before the device
    stream: Option<MmapStream<'static>>,
    device: Option<Device>,
    path: String,
    format: CaptureFormat,
    mode: UsbMode,
    stride: u32,
    timeout: Duration,
    frames: u64,
}

impl V4l2UsbCamera {
    /// Open `/dev/video<index>`, negotiate a format and start streaming
    pub fn open(config: &UsbCameraConfig, timeout: Duration) -> RecorderResult<Self> {
        let path = config.device_path();
        info!(
            stream = %Stream::UsbCamera,
            path = %path,
            width = config.width,
            height = config.height,
            fps = config.fps,
            "Opening USB camera"
        );

        let device = Device::with_path(&path)
            .map_err(|e| unavailable(format!("cannot open {}: {}", path, e)))?;

        let (negotiated, format) = negotiate_format(&device, config)?;

        let fps = match device.set_params(&Parameters::with_fps(config.fps)) {
            Ok(params) => {
                let rate =
                    Framerate::from_interval(params.interval.numerator, params.interval.denominator);
                rate.as_int()
            }
            Err(e) => {
                debug!(stream = %Stream::UsbCamera, error = %e, "Driver rejected frame interval");
                0
            }
        };

        let requested = UsbMode {
            width: config.width,
            height: config.height,
            fps: config.fps,
        };
        let actual = UsbMode {
            width: negotiated.width,
            height: negotiated.height,
            // Drivers that do not report an interval run at what was asked
            fps: if fps == 0 { config.fps } else { fps },
        };
        let mode = accept_mode(requested, actual, config.mode_policy)?;

        let mut stream = MmapStream::with_buffers(&device, Type::VideoCapture, USB_BUFFER_COUNT)
            .map_err(|e| unavailable(format!("cannot create buffer stream: {}", e)))?;
        stream.set_timeout(timeout);

        info!(
            stream = %Stream::UsbCamera,
            path = %path,
            fourcc = %fourcc_name(&negotiated.fourcc),
            mode = %mode,
            stride = negotiated.stride,
            "USB camera streaming"
        );

        Ok(Self {
            stream: Some(stream),
            device: Some(device),
            path,
            format,
            mode,
            stride: negotiated.stride,
            timeout,
            frames: 0,
        })
    }
}

fn negotiate_format(
    device: &Device,
    config: &UsbCameraConfig,
) -> RecorderResult<(v4l::Format, CaptureFormat)> {
    for format in CaptureFormat::PREFERENCE {
        let mut wanted = device
            .format()
            .map_err(|e| unavailable(format!("cannot query format: {}", e)))?;
        wanted.width = config.width;
        wanted.height = config.height;
        wanted.fourcc = format.fourcc();

        match device.set_format(&wanted) {
            Ok(actual) if actual.fourcc == format.fourcc() => return Ok((actual, format)),
            Ok(actual) => debug!(
                stream = %Stream::UsbCamera,
                wanted = %fourcc_name(&wanted.fourcc),
                got = %fourcc_name(&actual.fourcc),
                "Format not accepted"
            ),
            Err(e) => debug!(
                stream = %Stream::UsbCamera,
                wanted = %fourcc_name(&wanted.fourcc),
                error = %e,
                "Could not set format"
            ),
        }
    }

    Err(unavailable("device offers neither YUYV nor MJPG".into()))
}

impl ColorSource for V4l2UsbCamera {
    fn shape(&self) -> FrameShape {
        FrameShape::new(self.mode.width, self.mode.height, 3)
    }

    fn fps(&self) -> u32 {
        self.mode.fps
    }

    fn read_frame(&mut self) -> RecorderResult<VideoFrame> {
        let (width, height, stride, format) =
            (self.mode.width, self.mode.height, self.stride, self.format);

        let Some(stream) = self.stream.as_mut() else {
            return Err(RecorderError::Device {
                stream: Stream::UsbCamera,
                reason: "read after close".into(),
            });
        };

        let (buf, meta) = match stream.next() {
            Ok(frame) => frame,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                return Err(RecorderError::CaptureTimeout {
                    stream: Stream::UsbCamera,
                    timeout: self.timeout,
                });
            }
            Err(e) => {
                return Err(RecorderError::Device {
                    stream: Stream::UsbCamera,
                    reason: e.to_string(),
                });
            }
        };

        let used = (meta.bytesused as usize).min(buf.len());
        let data = &buf[..used];

        let bgr = match format {
            CaptureFormat::Yuyv => yuyv_to_bgr(data, width, height, stride)?,
            CaptureFormat::Mjpg => {
                let (w, h, bgr) = mjpeg_to_bgr(data)?;
                if (w, h) != (width, height) {
                    return Err(RecorderError::InvalidFrameShape(format!(
                        "MJPEG frame decoded to {}x{}, stream is {}x{}",
                        w, h, width, height
                    )));
                }
                bgr
            }
        };

        let frame_num = self.frames;
        self.frames += 1;
        if frame_num % FRAME_LOG_INTERVAL == 0 {
            debug!(
                stream = %Stream::UsbCamera,
                frame = frame_num,
                sequence = meta.sequence,
                size = used,
                "USB frame captured"
            );
        }

        VideoFrame::new(width, height, PixelFormat::Bgr24, bgr)
    }

    fn close(&mut self) -> RecorderResult<()> {
        let mut result = Ok(());

        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.stop() {
                warn!(stream = %Stream::UsbCamera, error = %e, "Failed to stop USB stream");
                result = Err(RecorderError::Device {
                    stream: Stream::UsbCamera,
                    reason: e.to_string(),
                });
            }
        }

        if self.device.take().is_some() {
            info!(stream = %Stream::UsbCamera, path = %self.path, frames = self.frames, "USB camera closed");
        }

        result
    }
}

impl Drop for V4l2UsbCamera {
    fn drop(&mut self) {
        if self.device.is_some() {
            debug!(stream = %Stream::UsbCamera, "USB camera dropped while open, closing");
            let _ = self.close();
        }
    }
}

fn unavailable(reason: String) -> RecorderError {
    RecorderError::DeviceUnavailable {
        stream: Stream::UsbCamera,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HD: UsbMode = UsbMode {
        width: 1280,
        height: 720,
        fps: 30,
    };
    const VGA: UsbMode = UsbMode {
        width: 640,
        height: 480,
        fps: 30,
    };

    #[test]
    fn test_exact_mode_accepted_under_both_policies() {
        assert_eq!(accept_mode(HD, HD, UsbModePolicy::Strict).unwrap(), HD);
        assert_eq!(accept_mode(HD, HD, UsbModePolicy::Fallback).unwrap(), HD);
    }

    #[test]
    fn test_fallback_declares_actual_mode() {
        assert_eq!(accept_mode(HD, VGA, UsbModePolicy::Fallback).unwrap(), VGA);
    }

    #[test]
    fn test_strict_rejects_other_mode() {
        let err = accept_mode(HD, VGA, UsbModePolicy::Strict).unwrap_err();
        assert!(matches!(
            err,
            RecorderError::DeviceUnavailable {
                stream: Stream::UsbCamera,
                ..
            }
        ));
        assert!(err.to_string().contains("1280x720@30"));
    }

    #[test]
    fn test_missing_device_is_unavailable() {
        let config = UsbCameraConfig {
            index: 250,
            ..Default::default()
        };
        assert!(matches!(
            V4l2UsbCamera::open(&config, Duration::from_millis(100)),
            Err(RecorderError::DeviceUnavailable { .. })
        ));
    }
}
