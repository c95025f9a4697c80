// SPDX-License-Identifier: GPL-3.0-only

//! Shared V4L2 utility functions
//!
//! Device discovery for the `list` and `probe` commands, and small helpers
//! shared with the USB capture source.

use super::types::DeviceInfo;
use tracing::debug;
use v4l::capability::Flags;
use v4l::prelude::*;

/// Query a device node and describe it, if it can capture video
///
/// Metadata-only nodes (UVC cameras expose two per device) are skipped.
pub fn build_device_info(index: usize, path: &str) -> Option<DeviceInfo> {
    let dev = Device::with_path(path).ok()?;
    let caps = dev.query_caps().ok()?;

    if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
        debug!(path, card = %caps.card, "Skipping non-capture node");
        return None;
    }

    debug!(path, driver = %caps.driver, card = %caps.card, "Found V4L2 capture device");
    Some(DeviceInfo {
        index,
        card: caps.card,
        driver: caps.driver,
        path: path.to_string(),
    })
}

/// All V4L2 capture devices, ordered by index
pub fn enumerate_capture_devices() -> Vec<DeviceInfo> {
    let mut nodes = v4l::context::enum_devices();
    nodes.sort_by_key(|node| node.index());

    nodes
        .iter()
        .filter_map(|node| {
            let path = node.path().to_string_lossy().to_string();
            build_device_info(node.index(), &path)
        })
        .collect()
}

/// Printable name for a FourCC code
pub fn fourcc_name(fourcc: &v4l::FourCC) -> String {
    fourcc
        .str()
        .map(|s| s.to_string())
        .unwrap_or_else(|_| format!("{:?}", fourcc.repr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_name() {
        assert_eq!(fourcc_name(&v4l::FourCC::new(b"YUYV")), "YUYV");
        assert_eq!(fourcc_name(&v4l::FourCC::new(b"MJPG")), "MJPG");
    }

    #[test]
    fn test_missing_node_is_skipped() {
        assert!(build_device_info(99, "/dev/video-does-not-exist").is_none());
    }
}
