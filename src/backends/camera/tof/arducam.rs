// SPDX-License-Identifier: GPL-3.0-only

//! Arducam ToF SDK binding (libArducamDepthCamera)
//!
//! Thin FFI over the SDK's C interface. Frame buffers are copied out and
//! handed back to the SDK before `request_frame` returns.

use super::{Connection, DepthSdk, SdkError, SdkFrame};
use std::ffi::{c_int, c_uint, c_void};
use std::time::Duration;

type CameraHandle = *mut c_void;
type FrameBuffer = *mut c_void;

const CONNECTION_CSI: c_int = 0;
const CONNECTION_USB: c_int = 1;
const FRAME_TYPE_DEPTH: c_int = 2;
const CONTROL_RANGE: c_int = 0;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct CameraInfo {
    index: c_uint,
    connect: c_int,
    device_type: c_int,
    frame_type: c_int,
    width: c_uint,
    height: c_uint,
    bit_width: c_uint,
    bpp: c_uint,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct FrameFormat {
    frame_type: c_int,
    width: u16,
    height: u16,
    bit_width: u8,
    timestamp: u64,
}

#[link(name = "ArducamDepthCamera")]
unsafe extern "C" {
    fn createArducamDepthCamera() -> CameraHandle;
    fn arducamCameraOpen(camera: CameraHandle, conn: c_int, index: c_int) -> c_int;
    fn arducamCameraClose(camera: *mut CameraHandle) -> c_int;
    fn arducamCameraStart(camera: CameraHandle, frame_type: c_int) -> c_int;
    fn arducamCameraStop(camera: CameraHandle) -> c_int;
    fn arducamCameraGetInfo(camera: CameraHandle) -> CameraInfo;
    fn arducamCameraSetCtrl(camera: CameraHandle, ctrl: c_int, val: c_int) -> c_int;
    fn arducamCameraRequestFrame(camera: CameraHandle, timeout: c_int) -> FrameBuffer;
    fn arducamCameraReleaseFrame(camera: CameraHandle, frame: FrameBuffer) -> c_int;
    fn arducamCameraGetFormat(frame: FrameBuffer, frame_type: c_int) -> FrameFormat;
    fn arducamCameraGetDepthData(frame: FrameBuffer) -> *const f32;
    fn arducamCameraGetAmplitudeData(frame: FrameBuffer) -> *const f32;
}

/// Owned SDK camera handle
pub struct ArducamSdk {
    handle: CameraHandle,
}

// The handle is only touched through &mut self, from one thread at a time.
unsafe impl Send for ArducamSdk {}

impl ArducamSdk {
    pub fn new() -> Result<Self, SdkError> {
        // SAFETY: no preconditions; returns null on allocation failure
        let handle = unsafe { createArducamDepthCamera() };
        if handle.is_null() {
            return Err(SdkError::Unsupported(
                "createArducamDepthCamera returned null".into(),
            ));
        }
        Ok(Self { handle })
    }
}

impl Drop for ArducamSdk {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            let _ = DepthSdk::close(self);
        }
    }
}

fn check(call: &'static str, status: c_int) -> Result<(), SdkError> {
    if status == 0 {
        Ok(())
    } else {
        Err(SdkError::Status { call, status })
    }
}

/// Hands a frame buffer back to the SDK when dropped
struct FrameGuard {
    camera: CameraHandle,
    frame: FrameBuffer,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        // SAFETY: frame came from arducamCameraRequestFrame on this camera
        // and is released exactly once
        unsafe {
            arducamCameraReleaseFrame(self.camera, self.frame);
        }
    }
}

impl DepthSdk for ArducamSdk {
    fn open(&mut self, connection: Connection) -> Result<(), SdkError> {
        let conn = match connection {
            Connection::Csi => CONNECTION_CSI,
            Connection::Usb => CONNECTION_USB,
        };
        // SAFETY: handle is a live camera from createArducamDepthCamera
        check("arducamCameraOpen", unsafe {
            arducamCameraOpen(self.handle, conn, 0)
        })
    }

    fn start(&mut self) -> Result<(), SdkError> {
        // SAFETY: handle is live
        check("arducamCameraStart", unsafe {
            arducamCameraStart(self.handle, FRAME_TYPE_DEPTH)
        })
    }

    fn set_range(&mut self, max_distance_mm: i32) -> Result<(), SdkError> {
        // SAFETY: handle is live
        check("arducamCameraSetCtrl", unsafe {
            arducamCameraSetCtrl(self.handle, CONTROL_RANGE, max_distance_mm)
        })
    }

    fn frame_size(&self) -> Result<(u32, u32), SdkError> {
        // SAFETY: handle is live and opened
        let info = unsafe { arducamCameraGetInfo(self.handle) };
        Ok((info.width, info.height))
    }

    fn request_frame(&mut self, timeout: Duration) -> Result<SdkFrame, SdkError> {
        let timeout_ms = timeout.as_millis().min(c_int::MAX as u128) as c_int;
        // SAFETY: handle is live and streaming
        let frame = unsafe { arducamCameraRequestFrame(self.handle, timeout_ms) };
        if frame.is_null() {
            return Err(SdkError::Timeout);
        }
        let guard = FrameGuard {
            camera: self.handle,
            frame,
        };

        // SAFETY: guard.frame is a valid buffer until the guard drops
        let format = unsafe { arducamCameraGetFormat(guard.frame, FRAME_TYPE_DEPTH) };
        let (width, height) = (format.width as u32, format.height as u32);
        let len = width as usize * height as usize;

        let (depth_ptr, amplitude_ptr) = unsafe {
            (
                arducamCameraGetDepthData(guard.frame),
                arducamCameraGetAmplitudeData(guard.frame),
            )
        };
        if depth_ptr.is_null() || amplitude_ptr.is_null() {
            return Err(SdkError::Status {
                call: "arducamCameraGetDepthData",
                status: -1,
            });
        }

        // SAFETY: both planes hold width * height floats for a depth frame
        let depth = unsafe { std::slice::from_raw_parts(depth_ptr, len) }.to_vec();
        let amplitude = unsafe { std::slice::from_raw_parts(amplitude_ptr, len) }.to_vec();
        drop(guard);

        Ok(SdkFrame {
            width,
            height,
            depth,
            amplitude,
        })
    }

    fn stop(&mut self) -> Result<(), SdkError> {
        // SAFETY: handle is live
        check("arducamCameraStop", unsafe { arducamCameraStop(self.handle) })
    }

    fn close(&mut self) -> Result<(), SdkError> {
        if self.handle.is_null() {
            return Ok(());
        }
        // SAFETY: handle is live; the SDK nulls it through the pointer
        let status = unsafe { arducamCameraClose(&mut self.handle) };
        self.handle = std::ptr::null_mut();
        check("arducamCameraClose", status)
    }
}
