// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer AVI encoder
//!
//! Pipeline: `appsrc ! videoconvert ! <encoder> ! avimux ! filesink`
//!
//! Frames are pushed with timestamps `n / fps`, so the container plays back
//! at the nominal rate regardless of capture jitter.

use super::encoder_selection::select_avi_encoder;
use super::muxer::{create_avi_muxer, link_muxer_to_sink};
use super::{EncoderFactory, FrameEncoder};
use crate::backends::camera::types::{FrameShape, PixelFormat, VideoFrame};
use crate::constants::{FRAME_LOG_INTERVAL, pipeline as pipeline_consts, timeouts};
use crate::errors::{RecorderError, RecorderResult, Stream};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use gstreamer_video as gst_video;
use gstreamer_video::VideoFrameExt;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Opens [`GstAviEncoder`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct GstEncoderFactory;

impl EncoderFactory for GstEncoderFactory {
    fn open_encoder(
        &self,
        stream: Stream,
        path: &Path,
        fps: u32,
        shape: FrameShape,
    ) -> RecorderResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(GstAviEncoder::open(stream, path, fps, shape)?))
    }
}

/// One running `appsrc ! ... ! filesink` pipeline
pub struct GstAviEncoder {
    stream: Stream,
    pipeline: gst::Pipeline,
    appsrc: AppSrc,
    info: gst_video::VideoInfo,
    encoder_name: String,
    fps: u32,
    finished: bool,
}

fn video_format(format: PixelFormat) -> gst_video::VideoFormat {
    match format {
        PixelFormat::Gray8 => gst_video::VideoFormat::Gray8,
        PixelFormat::Bgr24 => gst_video::VideoFormat::Bgr,
    }
}

impl GstAviEncoder {
    /// Build the pipeline and bring it to PLAYING
    pub fn open(stream: Stream, path: &Path, fps: u32, shape: FrameShape) -> RecorderResult<Self> {
        let unavailable = |reason: String| RecorderError::EncoderUnavailable(reason);

        gst::init().map_err(|e| unavailable(format!("GStreamer init failed: {}", e)))?;

        let format = PixelFormat::for_color(shape.is_color());
        let info = gst_video::VideoInfo::builder(video_format(format), shape.width, shape.height)
            .fps(gst::Fraction::new(fps as i32, 1))
            .build()
            .map_err(|e| unavailable(format!("Invalid video info: {}", e)))?;
        let caps = info
            .to_caps()
            .map_err(|e| unavailable(format!("Failed to build caps: {}", e)))?;

        let name = stream.as_str();
        let pipeline = gst::Pipeline::with_name(&format!("{}_pipeline", name));

        let appsrc = gst::ElementFactory::make("appsrc")
            .name(format!("{}_src", name))
            .build()
            .map_err(|e| unavailable(format!("Failed to create appsrc: {}", e)))?
            .downcast::<AppSrc>()
            .map_err(|_| unavailable("Failed to downcast to AppSrc".into()))?;

        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gst::Format::Time);
        appsrc.set_is_live(false);
        appsrc.set_block(true);
        appsrc.set_max_bytes(pipeline_consts::APPSRC_MAX_BYTES);

        let videoconvert = gst::ElementFactory::make("videoconvert")
            .name(format!("{}_convert", name))
            .property("n-threads", pipeline_consts::videoconvert_threads())
            .build()
            .map_err(|e| unavailable(format!("Failed to create videoconvert: {}", e)))?;

        let encoder = select_avi_encoder(name)?;
        let encoder_name = encoder
            .factory()
            .map(|f| f.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let muxer = create_avi_muxer(name, path)?;

        pipeline
            .add_many([
                appsrc.upcast_ref(),
                &videoconvert,
                &encoder,
                &muxer.muxer,
                &muxer.filesink,
            ])
            .map_err(|e| unavailable(format!("Failed to add elements: {}", e)))?;

        gst::Element::link_many([appsrc.upcast_ref(), &videoconvert, &encoder, &muxer.muxer])
            .map_err(|e| unavailable(format!("Failed to link {} into avimux: {}", encoder_name, e)))?;
        link_muxer_to_sink(&muxer)?;

        let sink = Self {
            stream,
            pipeline,
            appsrc,
            info,
            encoder_name,
            fps,
            finished: false,
        };
        sink.start()?;

        info!(
            stream = %stream,
            path = %path.display(),
            encoder = %sink.encoder_name,
            shape = %shape,
            fps,
            "Video sink opened"
        );
        Ok(sink)
    }

    fn start(&self) -> RecorderResult<()> {
        self.pipeline.set_state(gst::State::Playing).map_err(|e| {
            RecorderError::EncoderUnavailable(format!("Failed to start pipeline: {}", e))
        })?;

        let (result, _state, _pending) = self
            .pipeline
            .state(gst::ClockTime::from_seconds(timeouts::SINK_START.as_secs()));
        if result.is_err() {
            return Err(RecorderError::EncoderUnavailable(
                "Pipeline failed to reach Playing state".into(),
            ));
        }

        if let Some(reason) = self.pending_error() {
            return Err(RecorderError::EncoderUnavailable(reason));
        }
        Ok(())
    }

    /// Drain the bus for an error without blocking
    fn pending_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => {
                error!(
                    stream = %self.stream,
                    error = %err.error(),
                    debug = ?err.debug(),
                    source = ?err.src().map(|s| s.name()),
                    "GStreamer error"
                );
                Some(err.error().to_string())
            }
            _ => None,
        }
    }

    fn encoder_error(&self, reason: String) -> RecorderError {
        RecorderError::Encoder {
            stream: self.stream,
            reason,
        }
    }
}

impl FrameEncoder for GstAviEncoder {
    fn name(&self) -> &str {
        &self.encoder_name
    }

    fn push(&mut self, frame: &VideoFrame, index: u64) -> RecorderResult<()> {
        if self.finished {
            return Err(self.encoder_error("push after EOS".into()));
        }
        if let Some(reason) = self.pending_error() {
            return Err(self.encoder_error(reason));
        }

        let mut buffer = gst::Buffer::with_size(self.info.size())
            .map_err(|e| self.encoder_error(format!("Failed to create buffer: {}", e)))?;

        {
            let buffer_ref = buffer
                .get_mut()
                .ok_or_else(|| self.encoder_error("Failed to get mutable buffer reference".into()))?;

            let fps = self.fps.max(1) as u64;
            buffer_ref.set_pts(gst::ClockTime::from_nseconds(index * 1_000_000_000 / fps));
            buffer_ref.set_duration(gst::ClockTime::from_nseconds(1_000_000_000 / fps));

            let mut vframe =
                gst_video::VideoFrameRef::from_buffer_ref_writable(buffer_ref, &self.info)
                    .map_err(|e| self.encoder_error(format!("Failed to map frame: {}", e)))?;

            let stride = vframe.plane_stride()[0] as usize;
            let row_bytes = frame.width as usize * frame.format.channels() as usize;
            let plane = vframe
                .plane_data_mut(0)
                .map_err(|e| self.encoder_error(format!("Failed to map plane: {}", e)))?;

            // Encoder rows may be padded to 4-byte alignment
            for (row, src) in frame.data.chunks_exact(row_bytes).enumerate() {
                let start = row * stride;
                plane[start..start + row_bytes].copy_from_slice(src);
            }
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| self.encoder_error(format!("Failed to push frame: {:?}", e)))?;

        if index % FRAME_LOG_INTERVAL == 0 {
            debug!(stream = %self.stream, frame = index, "Frame pushed to encoder");
        }
        Ok(())
    }

    fn finish(&mut self) -> RecorderResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        info!(stream = %self.stream, "Sending EOS to pipeline");
        let mut result = Ok(());
        if let Err(e) = self.appsrc.end_of_stream() {
            warn!(stream = %self.stream, ?e, "Failed to send EOS");
        } else if let Some(bus) = self.pipeline.bus() {
            // avimux writes its index on EOS; wait for it before tearing down
            let timeout = gst::ClockTime::from_mseconds(timeouts::SINK_FINALIZE.as_millis() as u64);
            match bus.timed_pop_filtered(
                timeout,
                &[gst::MessageType::Eos, gst::MessageType::Error],
            ) {
                Some(msg) => {
                    if let gst::MessageView::Error(err) = msg.view() {
                        result = Err(self.encoder_error(format!(
                            "Error while finalizing: {}",
                            err.error()
                        )));
                    }
                }
                None => {
                    warn!(stream = %self.stream, "Timed out waiting for EOS, file may lack an index");
                }
            }
        }

        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(stream = %self.stream, ?e, "Failed to stop pipeline");
            result = result.and(Err(self.encoder_error(format!("Failed to stop pipeline: {}", e))));
        }

        result
    }
}

impl Drop for GstAviEncoder {
    fn drop(&mut self) {
        // Ensure pipeline is properly stopped to avoid GStreamer warnings
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            error!(stream = %self.stream, ?e, "Failed to set pipeline to Null on drop");
        }
    }
}
