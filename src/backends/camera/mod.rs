// SPDX-License-Identifier: GPL-3.0-only

//! Camera sources
//!
//! ```text
//! ┌───────────────────────┐      ┌───────────────────────┐
//! │  DepthSource (trait)  │      │  ColorSource (trait)  │
//! └──────────┬────────────┘      └──────────┬────────────┘
//!            │                              │
//!            ▼                              ▼
//!   TofCamera<DepthSdk>              V4l2UsbCamera
//!            │                              │
//!            ▼                              ▼
//!   libArducamDepthCamera           v4l (mmap streaming)
//! ```
//!
//! Sources own their device handle exclusively. `close()` releases it and is
//! safe to call more than once; dropping an open source closes it.

pub mod format_converters;
pub mod frame_loop;
pub mod tof;
pub mod types;
pub mod v4l2_usb;
pub mod v4l2_utils;

pub use types::*;

use crate::errors::RecorderResult;

/// Source of depth + amplitude frame pairs
pub trait DepthSource: Send {
    /// Single-channel shape of both grids, fixed at open
    fn shape(&self) -> FrameShape;

    /// Block up to the source's timeout for the next frame
    fn read_frame(&mut self) -> RecorderResult<DepthFrame>;

    /// Stop streaming and release the device
    fn close(&mut self) -> RecorderResult<()>;
}

/// Source of BGR color frames
pub trait ColorSource: Send {
    /// Three-channel shape, fixed at open
    fn shape(&self) -> FrameShape;

    /// Negotiated frame rate
    fn fps(&self) -> u32;

    /// Block up to the source's timeout for the next frame
    fn read_frame(&mut self) -> RecorderResult<VideoFrame>;

    /// Stop streaming and release the device
    fn close(&mut self) -> RecorderResult<()>;
}
