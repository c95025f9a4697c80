// SPDX-License-Identifier: GPL-3.0-only

//! Shape-checked video output file

use super::{EncoderFactory, FrameEncoder};
use crate::backends::camera::types::{FrameShape, VideoFrame};
use crate::errors::{RecorderError, RecorderResult, Stream};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One output video file with a fixed frame shape
///
/// A write either pushes the whole frame or nothing: shape is checked first.
/// Closing is idempotent; writes after close fail.
pub struct VideoSink {
    stream: Stream,
    path: PathBuf,
    fps: u32,
    shape: FrameShape,
    encoder: Option<Box<dyn FrameEncoder>>,
    frames_written: u64,
}

impl VideoSink {
    /// Open an output file for `width` x `height` frames, BGR if `is_color`
    /// else grayscale
    pub fn open(
        factory: &dyn EncoderFactory,
        stream: Stream,
        path: &Path,
        fps: u32,
        width: u32,
        height: u32,
        is_color: bool,
    ) -> RecorderResult<Self> {
        if width == 0 || height == 0 || fps == 0 {
            return Err(RecorderError::EncoderUnavailable(format!(
                "{}: cannot encode {}x{} at {} fps",
                stream, width, height, fps
            )));
        }

        let shape = FrameShape::new(width, height, if is_color { 3 } else { 1 });
        let encoder = factory.open_encoder(stream, path, fps, shape)?;

        Ok(Self {
            stream,
            path: path.to_path_buf(),
            fps,
            shape,
            encoder: Some(encoder),
            frames_written: 0,
        })
    }

    /// Append one frame
    pub fn write(&mut self, frame: &VideoFrame) -> RecorderResult<()> {
        let actual = frame.shape();
        if actual != self.shape {
            return Err(RecorderError::ShapeMismatch {
                stream: self.stream,
                expected: self.shape,
                actual,
            });
        }

        let encoder = self.encoder.as_mut().ok_or_else(|| RecorderError::Encoder {
            stream: self.stream,
            reason: "write after close".into(),
        })?;

        encoder.push(frame, self.frames_written)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Finalize the file and release the encoder
    pub fn close(&mut self) -> RecorderResult<()> {
        let Some(mut encoder) = self.encoder.take() else {
            debug!(stream = %self.stream, "Sink already closed");
            return Ok(());
        };

        let result = encoder.finish();
        match &result {
            Ok(()) => info!(
                stream = %self.stream,
                path = %self.path.display(),
                frames = self.frames_written,
                "Recording saved"
            ),
            Err(e) => warn!(stream = %self.stream, error = %e, "Failed to finalize recording"),
        }
        result
    }

    pub fn is_closed(&self) -> bool {
        self.encoder.is_none()
    }

    pub fn stream(&self) -> Stream {
        self.stream
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Drop for VideoSink {
    fn drop(&mut self) {
        if !self.is_closed() {
            debug!(stream = %self.stream, "VideoSink dropped while open, closing");
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::PixelFormat;
    use crate::testing::MemoryEncoderFactory;

    fn gray(width: u32, height: u32) -> VideoFrame {
        VideoFrame::new(
            width,
            height,
            PixelFormat::Gray8,
            vec![7; (width * height) as usize],
        )
        .unwrap()
    }

    #[test]
    fn test_write_counts_frames() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MemoryEncoderFactory::default();
        let path = dir.path().join("a.avi");
        let mut sink =
            VideoSink::open(&factory, Stream::TofAmplitude, &path, 20, 4, 2, false).unwrap();

        sink.write(&gray(4, 2)).unwrap();
        sink.write(&gray(4, 2)).unwrap();
        assert_eq!(sink.frames_written(), 2);
        assert_eq!(factory.recorded(Stream::TofAmplitude).frame_indices(), vec![0, 1]);
    }

    #[test]
    fn test_mismatch_pushes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MemoryEncoderFactory::default();
        let path = dir.path().join("a.avi");
        let mut sink =
            VideoSink::open(&factory, Stream::TofAmplitude, &path, 20, 4, 2, false).unwrap();

        let err = sink.write(&gray(2, 4)).unwrap_err();
        assert!(matches!(err, RecorderError::ShapeMismatch { .. }));
        assert_eq!(sink.frames_written(), 0);
        assert!(factory.recorded(Stream::TofAmplitude).frame_indices().is_empty());
    }

    #[test]
    fn test_close_twice_then_write_fails() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MemoryEncoderFactory::default();
        let path = dir.path().join("u.avi");
        let mut sink =
            VideoSink::open(&factory, Stream::UsbCamera, &path, 30, 2, 2, true).unwrap();

        sink.close().unwrap();
        sink.close().unwrap();
        assert_eq!(factory.recorded(Stream::UsbCamera).finish_calls(), 1);

        let frame = VideoFrame::new(2, 2, PixelFormat::Bgr24, vec![0; 12]).unwrap();
        assert!(matches!(
            sink.write(&frame),
            Err(RecorderError::Encoder { .. })
        ));
    }
}
