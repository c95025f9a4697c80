// SPDX-License-Identifier: GPL-3.0-only

//! Output pipelines
//!
//! - [`video`]: frame-by-frame AVI recording with GStreamer

pub mod video;
