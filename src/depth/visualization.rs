// SPDX-License-Identifier: GPL-3.0-only

//! Depth visualization
//!
//! Depth in millimeters is normalized by the session's maximum distance and
//! looked up in a 256-entry Turbo palette (blue=near, red=far). Samples with
//! no return (negative, NaN, infinite) are written black.

use crate::backends::camera::types::{DepthFrame, PixelFormat, VideoFrame};
use crate::errors::{RecorderError, RecorderResult};
use std::sync::OnceLock;

/// Number of palette entries
pub const PALETTE_SIZE: usize = 256;

/// Turbo colormap: perceptually uniform rainbow (blue=near, red=far)
///
/// Based on: https://ai.googleblog.com/2019/08/turbo-improved-rainbow-colormap-for.html
/// Polynomial approximation, returned as B, G, R.
#[inline]
fn turbo_bgr(t: f32) -> [u8; 3] {
    let r = (0.13572138
        + t * (4.6153926 + t * (-42.66032 + t * (132.13108 + t * (-152.54825 + t * 59.28144)))))
        .clamp(0.0, 1.0);
    let g = (0.09140261
        + t * (2.19418 + t * (4.84296 + t * (-14.18503 + t * (4.27805 + t * 2.53377)))))
        .clamp(0.0, 1.0);
    let b = (0.1066733
        + t * (12.64194 + t * (-60.58204 + t * (109.99648 + t * (-82.52904 + t * 20.43388)))))
        .clamp(0.0, 1.0);
    [(b * 255.0) as u8, (g * 255.0) as u8, (r * 255.0) as u8]
}

/// The fixed BGR palette, built once
pub fn turbo_palette() -> &'static [[u8; 3]; PALETTE_SIZE] {
    static PALETTE: OnceLock<[[u8; 3]; PALETTE_SIZE]> = OnceLock::new();
    PALETTE.get_or_init(|| {
        let mut lut = [[0u8; 3]; PALETTE_SIZE];
        for (i, entry) in lut.iter_mut().enumerate() {
            *entry = turbo_bgr(i as f32 / (PALETTE_SIZE - 1) as f32);
        }
        lut
    })
}

/// Palette slot for one depth sample, `None` for samples with no return
///
/// Non-decreasing in `depth_mm` over `[0, max_distance_mm]`; everything past
/// the maximum lands in the last slot.
#[inline]
pub fn palette_index(depth_mm: f32, max_distance_mm: f32) -> Option<u8> {
    if !depth_mm.is_finite() || depth_mm < 0.0 {
        return None;
    }
    let t = (depth_mm / max_distance_mm).clamp(0.0, 1.0);
    Some((t * (PALETTE_SIZE - 1) as f32).round() as u8)
}

/// Colorize a depth map into a BGR frame of the same width and height
pub fn colorize(frame: &DepthFrame, max_distance_mm: f32) -> RecorderResult<VideoFrame> {
    if !max_distance_mm.is_finite() || max_distance_mm <= 0.0 {
        return Err(RecorderError::InvalidFrameShape(format!(
            "max distance must be positive, got {}",
            max_distance_mm
        )));
    }

    let pixel_count = frame.shape().pixel_count();
    if frame.depth_mm.len() != pixel_count {
        return Err(RecorderError::InvalidFrameShape(format!(
            "depth buffer has {} samples, {}x{} needs {}",
            frame.depth_mm.len(),
            frame.width,
            frame.height,
            pixel_count
        )));
    }

    let palette = turbo_palette();
    let mut bgr = Vec::with_capacity(pixel_count * 3);
    for &depth in frame.depth_mm.iter() {
        match palette_index(depth, max_distance_mm) {
            Some(i) => bgr.extend_from_slice(&palette[i as usize]),
            None => bgr.extend_from_slice(&[0, 0, 0]),
        }
    }

    let mut colored = VideoFrame::new(frame.width, frame.height, PixelFormat::Bgr24, bgr)?;
    colored.captured_at = frame.captured_at;
    Ok(colored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    fn depth_frame(width: u32, height: u32, depth: Vec<f32>) -> DepthFrame {
        let amplitude = vec![0.0; depth.len()];
        DepthFrame {
            width,
            height,
            depth_mm: Arc::from(depth),
            amplitude: Arc::from(amplitude),
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    #[test]
    fn test_palette_ends() {
        let palette = turbo_palette();
        // Near range is blue-dominant, far end red-dominant
        assert!(palette[40][0] > palette[40][2]);
        assert!(palette[255][2] > palette[255][0]);
    }

    #[test]
    fn test_no_return_is_black() {
        let frame = depth_frame(3, 1, vec![-1.0, f32::NAN, f32::INFINITY]);
        let out = colorize(&frame, 4000.0).unwrap();
        assert!(out.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_far_samples_clamp_to_last_entry() {
        let frame = depth_frame(2, 1, vec![4000.0, 9000.0]);
        let out = colorize(&frame, 4000.0).unwrap();
        assert_eq!(&out.data[..3], &out.data[3..]);
        assert_eq!(&out.data[..3], &turbo_palette()[255]);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let frame = depth_frame(2, 2, vec![0.0; 3]);
        assert!(colorize(&frame, 4000.0).is_err());

        let frame = depth_frame(1, 1, vec![100.0]);
        assert!(colorize(&frame, 0.0).is_err());
        assert!(colorize(&frame, f32::NAN).is_err());
    }
}
