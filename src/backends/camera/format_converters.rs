// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion for the camera sources
//!
//! Everything here produces tightly packed 8-bit output for the video sinks:
//! BGR24 for the USB camera, Gray8 for the ToF amplitude map.

use crate::constants::AMPLITUDE_FULL_SCALE;
use crate::errors::{RecorderError, RecorderResult};

/// Convert YUYV (YUV 4:2:2) to BGR24
///
/// YUYV format: Y0 U0 Y1 V0 - each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients. `stride` is the driver's bytes-per-line, which
/// may include padding past `width * 2`.
pub fn yuyv_to_bgr(data: &[u8], width: u32, height: u32, stride: u32) -> RecorderResult<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let stride = (stride as usize).max(w * 2);

    if w % 2 != 0 {
        return Err(RecorderError::InvalidFrameShape(format!(
            "YUYV width must be even, got {}",
            width
        )));
    }
    if data.len() < stride * (h.saturating_sub(1)) + w * 2 {
        return Err(RecorderError::InvalidFrameShape(format!(
            "YUYV buffer of {} bytes too short for {}x{} (stride {})",
            data.len(),
            width,
            height,
            stride
        )));
    }

    let mut bgr = Vec::with_capacity(w * h * 3);
    for row in data.chunks(stride).take(h) {
        for chunk in row[..w * 2].chunks_exact(4) {
            let y0 = chunk[0] as f32;
            let u = chunk[1] as f32 - 128.0;
            let y1 = chunk[2] as f32;
            let v = chunk[3] as f32 - 128.0;

            for y in [y0, y1] {
                let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
                let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
                let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
                bgr.extend_from_slice(&[b, g, r]);
            }
        }
    }

    Ok(bgr)
}

/// Decode one MJPEG frame to BGR24
///
/// Returns the decoded dimensions alongside the pixels; cameras are free to
/// send a different size than negotiated and the caller decides what to do.
pub fn mjpeg_to_bgr(data: &[u8]) -> RecorderResult<(u32, u32, Vec<u8>)> {
    let img = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| RecorderError::InvalidFrameShape(format!("MJPEG decode failed: {}", e)))?;

    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut bgr = rgb.into_raw();
    rgb_to_bgr_in_place(&mut bgr);

    Ok((width, height, bgr))
}

/// Swap R and B channels of packed 24-bit pixels
pub fn rgb_to_bgr_in_place(pixels: &mut [u8]) {
    for chunk in pixels.chunks_exact_mut(3) {
        chunk.swap(0, 2);
    }
}

/// Scale ToF amplitude to 8-bit grayscale
///
/// The sensor reports a 12-bit range; dividing by 16 maps it onto 0-255.
/// Negative and non-finite samples become 0.
pub fn amplitude_to_gray8(amplitude: &[f32]) -> Vec<u8> {
    amplitude
        .iter()
        .map(|&a| {
            if !a.is_finite() || a <= 0.0 {
                0
            } else {
                (a.min(AMPLITUDE_FULL_SCALE) / 16.0) as u8
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_gray_is_neutral() {
        // Y=128, U=V=128 -> mid gray
        let data = vec![128u8, 128, 128, 128];
        let bgr = yuyv_to_bgr(&data, 2, 1, 4).unwrap();
        assert_eq!(bgr, vec![128, 128, 128, 128, 128, 128]);
    }

    #[test]
    fn test_yuyv_respects_stride() {
        // 2x2 frame with 4 padding bytes per row
        let mut data = Vec::new();
        data.extend_from_slice(&[255, 128, 255, 128, 9, 9, 9, 9]);
        data.extend_from_slice(&[0, 128, 0, 128, 9, 9, 9, 9]);
        let bgr = yuyv_to_bgr(&data, 2, 2, 8).unwrap();
        assert_eq!(bgr.len(), 12);
        assert_eq!(&bgr[..3], &[255, 255, 255]);
        assert_eq!(&bgr[6..9], &[0, 0, 0]);
    }

    #[test]
    fn test_yuyv_red_lands_in_last_channel() {
        // Strong V pushes red up; B G R order puts it last
        let data = vec![76u8, 85, 76, 255];
        let bgr = yuyv_to_bgr(&data, 2, 1, 4).unwrap();
        assert!(bgr[2] > 200);
        assert!(bgr[0] < 60);
    }

    #[test]
    fn test_yuyv_short_buffer() {
        assert!(yuyv_to_bgr(&[0u8; 6], 2, 2, 4).is_err());
        assert!(yuyv_to_bgr(&[0u8; 8], 3, 1, 6).is_err());
    }

    #[test]
    fn test_amplitude_scaling() {
        let gray = amplitude_to_gray8(&[0.0, 16.0, 4095.0, 100_000.0, -3.0, f32::NAN]);
        assert_eq!(gray, vec![0, 1, 255, 255, 0, 0]);
    }

    #[test]
    fn test_rgb_to_bgr() {
        let mut px = vec![1, 2, 3, 4, 5, 6];
        rgb_to_bgr_in_place(&mut px);
        assert_eq!(px, vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_mjpeg_rejects_garbage() {
        assert!(mjpeg_to_bgr(&[0xFF, 0xD8, 0x00]).is_err());
    }
}
