// SPDX-License-Identifier: GPL-3.0-only

//! Depth map processing
//!
//! - [`visualization`]: Turbo colormap for writing depth as BGR video

pub mod visualization;

pub use visualization::{colorize, palette_index, turbo_palette};
