// SPDX-License-Identifier: GPL-3.0-only

//! Encoder selection for AVI recording
//!
//! Only encoders whose output avimux accepts are considered, in order of
//! preference. The first one GStreamer can instantiate wins.

use crate::errors::{RecorderError, RecorderResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, info};

/// Candidate encoders, most preferred first
///
/// MPEG-4 Part 2 matches what the recordings have always used; H.264 and
/// Motion JPEG keep recording possible on installs without gst-libav.
pub const AVI_ENCODERS: &[&str] = &["avenc_mpeg4", "x264enc", "jpegenc"];

/// Check if a specific GStreamer element is available
pub fn is_element_available(element_name: &str) -> bool {
    gst::ElementFactory::find(element_name).is_some()
}

/// Encoders from [`AVI_ENCODERS`] present in this GStreamer install
pub fn detect_avi_encoders() -> Vec<&'static str> {
    let available: Vec<&'static str> = AVI_ENCODERS
        .iter()
        .copied()
        .filter(|name| {
            let found = is_element_available(name);
            debug!(encoder = name, found, "Probed AVI encoder");
            found
        })
        .collect();

    info!(encoders = ?available, "Detected AVI encoders");
    available
}

/// Create the preferred encoder element, configured for file recording
pub fn select_avi_encoder(name_prefix: &str) -> RecorderResult<gst::Element> {
    for &factory in AVI_ENCODERS {
        let Ok(encoder) = gst::ElementFactory::make(factory)
            .name(format!("{}_encoder", name_prefix))
            .build()
        else {
            continue;
        };

        configure_encoder(factory, &encoder);
        debug!(encoder = factory, sink = name_prefix, "Selected video encoder");
        return Ok(encoder);
    }

    Err(RecorderError::EncoderUnavailable(format!(
        "none of {} is installed",
        AVI_ENCODERS.join(", ")
    )))
}

fn configure_encoder(factory: &str, encoder: &gst::Element) {
    match factory {
        // Default bitrate is tuned for streaming; keep quality fixed instead
        "avenc_mpeg4" => {
            if encoder.has_property("qscale") {
                encoder.set_property_from_str("qscale", "4");
            }
        }
        "x264enc" => {
            encoder.set_property_from_str("speed-preset", "veryfast");
            encoder.set_property_from_str("tune", "zerolatency");
        }
        _ => {}
    }
}
