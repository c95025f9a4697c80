// SPDX-License-Identifier: GPL-3.0-only

//! AVI muxing and file output

use crate::errors::{RecorderError, RecorderResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use std::path::Path;
use tracing::debug;

/// Muxer configuration
pub struct MuxerConfig {
    /// avimux element
    pub muxer: gst::Element,
    /// File sink element
    pub filesink: gst::Element,
}

/// Create avimux and a filesink writing to `output_path`
pub fn create_avi_muxer(name_prefix: &str, output_path: &Path) -> RecorderResult<MuxerConfig> {
    let location = output_path.to_str().ok_or_else(|| {
        RecorderError::EncoderUnavailable(format!(
            "output path is not valid UTF-8: {}",
            output_path.display()
        ))
    })?;

    let muxer = gst::ElementFactory::make("avimux")
        .name(format!("{}_mux", name_prefix))
        .build()
        .map_err(|e| RecorderError::EncoderUnavailable(format!("Failed to create avimux: {}", e)))?;

    let filesink = gst::ElementFactory::make("filesink")
        .name(format!("{}_filesink", name_prefix))
        .property("location", location)
        .build()
        .map_err(|e| {
            RecorderError::EncoderUnavailable(format!("Failed to create filesink: {}", e))
        })?;

    // Reach PLAYING before the first frame is pushed
    if filesink.has_property("async") {
        filesink.set_property("async", false);
    }

    debug!(path = %output_path.display(), "AVI muxer and filesink created");

    Ok(MuxerConfig { muxer, filesink })
}

/// Link muxer to filesink
pub fn link_muxer_to_sink(config: &MuxerConfig) -> RecorderResult<()> {
    config.muxer.link(&config.filesink).map_err(|_| {
        RecorderError::EncoderUnavailable("Failed to link muxer to filesink".into())
    })?;

    debug!("Muxer linked to filesink");
    Ok(())
}
