// SPDX-License-Identifier: GPL-3.0-only

//! In-memory devices and encoders
//!
//! Scripted stand-ins for the ToF SDK, the USB camera and the GStreamer
//! encoders, so sessions can run end to end without hardware. Every fake
//! writes what happens to it into a shared [`EventLog`].

use crate::backends::CaptureBackend;
use crate::backends::camera::tof::{Connection, DepthSdk, SdkError, SdkFrame, TofCamera};
use crate::backends::camera::types::{FrameShape, PixelFormat, VideoFrame};
use crate::backends::camera::{ColorSource, DepthSource};
use crate::config::{TofCameraConfig, UsbCameraConfig};
use crate::errors::{RecorderError, RecorderResult, Stream};
use crate::pipelines::video::{EncoderFactory, FrameEncoder};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Ordered record of device and encoder calls, shared between fakes
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn record(&self, event: impl Into<String>) {
        lock(&self.0).push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        lock(&self.0).clone()
    }

    pub fn count(&self, event: &str) -> usize {
        lock(&self.0).iter().filter(|e| *e == event).count()
    }

    /// Index of the first occurrence of `event`
    pub fn position(&self, event: &str) -> Option<usize> {
        lock(&self.0).iter().position(|e| e == event)
    }
}

/// What a [`FakeSdk`] was asked to do
#[derive(Debug, Clone, Default)]
pub struct SdkLog {
    events: EventLog,
    ranges: Arc<Mutex<Vec<i32>>>,
}

impl SdkLog {
    fn with_events(events: EventLog) -> Self {
        Self {
            events,
            ranges: Arc::default(),
        }
    }

    /// Range values passed to `set_range`
    pub fn ranges(&self) -> Vec<i32> {
        lock(&self.ranges).clone()
    }

    pub fn stops(&self) -> usize {
        self.events.count("tof stop")
    }

    pub fn closes(&self) -> usize {
        self.events.count("tof close")
    }

    pub fn requests(&self) -> usize {
        self.events.count("tof request")
    }
}

/// Behaviour of a [`FakeSdk`]
///
/// Request indices count every `request_frame` call from zero.
#[derive(Debug, Clone)]
pub struct SdkScript {
    pub width: u32,
    pub height: u32,
    pub fail_csi: bool,
    pub fail_usb: bool,
    pub fail_start: bool,
    pub fail_range: bool,
    /// Requests that return no frame
    pub timeout_at: Vec<u64>,
    /// Every request returns no frame (a stalled sensor)
    pub always_timeout: bool,
    /// Timed out requests block for the full timeout, as the SDK does
    pub stall_on_timeout: bool,
    /// Requests that return one depth sample short
    pub short_frame_at: Vec<u64>,
    /// Request that fails hard (sensor gone)
    pub fail_at: Option<u64>,
    /// Simulated exposure time per request
    pub frame_interval: Duration,
    pub log: SdkLog,
}

impl Default for SdkScript {
    fn default() -> Self {
        Self {
            width: 240,
            height: 180,
            fail_csi: false,
            fail_usb: false,
            fail_start: false,
            fail_range: false,
            timeout_at: Vec::new(),
            always_timeout: false,
            stall_on_timeout: false,
            short_frame_at: Vec::new(),
            fail_at: None,
            frame_interval: Duration::ZERO,
            log: SdkLog::default(),
        }
    }
}

/// Scripted [`DepthSdk`]
#[derive(Debug)]
pub struct FakeSdk {
    script: SdkScript,
    requests: u64,
}

impl FakeSdk {
    pub fn new(script: SdkScript) -> Self {
        Self {
            script,
            requests: 0,
        }
    }

    fn frame(&self, index: u64) -> SdkFrame {
        let (w, h) = (self.script.width, self.script.height);
        let pixels = (w * h) as usize;
        // Ramp across the row, shifted each frame
        let depth = (0..pixels)
            .map(|i| ((i as u32 % w) * 16 + index as u32 % 100) as f32)
            .collect();
        let amplitude = (0..pixels).map(|i| (i % 4096) as f32).collect();
        SdkFrame {
            width: w,
            height: h,
            depth,
            amplitude,
        }
    }
}

impl DepthSdk for FakeSdk {
    fn open(&mut self, connection: Connection) -> Result<(), SdkError> {
        let refused = match connection {
            Connection::Csi => self.script.fail_csi,
            Connection::Usb => self.script.fail_usb,
        };
        if refused {
            return Err(SdkError::Status {
                call: "open",
                status: -1,
            });
        }
        self.script.log.events.record("tof open");
        Ok(())
    }

    fn start(&mut self) -> Result<(), SdkError> {
        if self.script.fail_start {
            return Err(SdkError::Status {
                call: "start",
                status: -2,
            });
        }
        Ok(())
    }

    fn set_range(&mut self, max_distance_mm: i32) -> Result<(), SdkError> {
        lock(&self.script.log.ranges).push(max_distance_mm);
        if self.script.fail_range {
            return Err(SdkError::Status {
                call: "set_range",
                status: -3,
            });
        }
        Ok(())
    }

    fn frame_size(&self) -> Result<(u32, u32), SdkError> {
        Ok((self.script.width, self.script.height))
    }

    fn request_frame(&mut self, timeout: Duration) -> Result<SdkFrame, SdkError> {
        let index = self.requests;
        self.requests += 1;
        self.script.log.events.record("tof request");

        if !self.script.frame_interval.is_zero() {
            thread::sleep(self.script.frame_interval);
        }

        if self.script.fail_at == Some(index) {
            return Err(SdkError::Status {
                call: "request_frame",
                status: -4,
            });
        }
        if self.script.always_timeout || self.script.timeout_at.contains(&index) {
            if self.script.stall_on_timeout {
                thread::sleep(timeout);
            }
            return Err(SdkError::Timeout);
        }

        let mut frame = self.frame(index);
        if self.script.short_frame_at.contains(&index) {
            frame.depth.pop();
        }
        Ok(frame)
    }

    fn stop(&mut self) -> Result<(), SdkError> {
        self.script.log.events.record("tof stop");
        Ok(())
    }

    fn close(&mut self) -> Result<(), SdkError> {
        self.script.log.events.record("tof close");
        Ok(())
    }
}

/// Behaviour of a [`FakeColorSource`]
#[derive(Debug, Clone)]
pub struct ColorScript {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Reads that time out
    pub timeout_at: Vec<u64>,
    /// Reads that return a frame of the wrong size
    pub wrong_shape_at: Vec<u64>,
    /// Read that fails hard (camera unplugged)
    pub fail_at: Option<u64>,
    pub frame_interval: Duration,
    pub events: EventLog,
}

impl Default for ColorScript {
    fn default() -> Self {
        Self {
            width: 16,
            height: 12,
            fps: 30,
            timeout_at: Vec::new(),
            wrong_shape_at: Vec::new(),
            fail_at: None,
            frame_interval: Duration::ZERO,
            events: EventLog::default(),
        }
    }
}

/// Scripted [`ColorSource`]
#[derive(Debug)]
pub struct FakeColorSource {
    script: ColorScript,
    timeout: Duration,
    reads: u64,
    closed: bool,
}

impl FakeColorSource {
    pub fn new(script: ColorScript, timeout: Duration) -> Self {
        script.events.record("usb open");
        Self {
            script,
            timeout,
            reads: 0,
            closed: false,
        }
    }
}

impl ColorSource for FakeColorSource {
    fn shape(&self) -> FrameShape {
        FrameShape::new(self.script.width, self.script.height, 3)
    }

    fn fps(&self) -> u32 {
        self.script.fps
    }

    fn read_frame(&mut self) -> RecorderResult<VideoFrame> {
        if self.closed {
            return Err(RecorderError::Device {
                stream: Stream::UsbCamera,
                reason: "read after close".into(),
            });
        }

        let index = self.reads;
        self.reads += 1;
        if !self.script.frame_interval.is_zero() {
            thread::sleep(self.script.frame_interval);
        }

        if self.script.fail_at == Some(index) {
            return Err(RecorderError::Device {
                stream: Stream::UsbCamera,
                reason: "device disconnected".into(),
            });
        }
        if self.script.timeout_at.contains(&index) {
            return Err(RecorderError::CaptureTimeout {
                stream: Stream::UsbCamera,
                timeout: self.timeout,
            });
        }

        let (mut w, h) = (self.script.width, self.script.height);
        if self.script.wrong_shape_at.contains(&index) {
            w /= 2;
        }
        let value = (index % 256) as u8;
        VideoFrame::new(w, h, PixelFormat::Bgr24, vec![value; (w * h * 3) as usize])
    }

    fn close(&mut self) -> RecorderResult<()> {
        if !self.closed {
            self.closed = true;
            self.script.events.record("usb close");
        }
        Ok(())
    }
}

impl Drop for FakeColorSource {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Snapshot of what one fake encoder received
#[derive(Debug, Clone, Default)]
pub struct Recording {
    path: PathBuf,
    shape: Option<FrameShape>,
    fps: u32,
    frame_indices: Vec<u64>,
    finish_calls: usize,
}

impl Recording {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn shape(&self) -> Option<FrameShape> {
        self.shape
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Indices passed to `push`, in call order
    pub fn frame_indices(&self) -> Vec<u64> {
        self.frame_indices.clone()
    }

    pub fn finish_calls(&self) -> usize {
        self.finish_calls
    }
}

type Recordings = Arc<Mutex<HashMap<Stream, Recording>>>;

/// [`EncoderFactory`] that writes a plain-text frame index instead of video
///
/// The output file is created at open so directory listings look like a
/// real session.
#[derive(Debug, Clone, Default)]
pub struct MemoryEncoderFactory {
    recordings: Recordings,
    events: EventLog,
    fail_open: Option<Stream>,
    fail_push: Option<(Stream, u64)>,
}

impl MemoryEncoderFactory {
    pub fn with_events(events: EventLog) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    /// Refuse to open an encoder for `stream`
    pub fn failing_open(mut self, stream: Stream) -> Self {
        self.fail_open = Some(stream);
        self
    }

    /// Fail the push of frame `index` on `stream`
    pub fn failing_push(mut self, stream: Stream, index: u64) -> Self {
        self.fail_push = Some((stream, index));
        self
    }

    pub fn recorded(&self, stream: Stream) -> Recording {
        lock(&self.recordings)
            .get(&stream)
            .cloned()
            .unwrap_or_default()
    }
}

impl EncoderFactory for MemoryEncoderFactory {
    fn open_encoder(
        &self,
        stream: Stream,
        path: &Path,
        fps: u32,
        shape: FrameShape,
    ) -> RecorderResult<Box<dyn FrameEncoder>> {
        if self.fail_open == Some(stream) {
            return Err(RecorderError::EncoderUnavailable(format!(
                "{}: no encoder",
                stream
            )));
        }

        let file = File::create(path)?;
        lock(&self.recordings).insert(
            stream,
            Recording {
                path: path.to_path_buf(),
                shape: Some(shape),
                fps,
                ..Default::default()
            },
        );
        self.events.record(format!("{} open", stream));

        Ok(Box::new(MemoryEncoder {
            stream,
            file,
            recordings: Arc::clone(&self.recordings),
            events: self.events.clone(),
            fail_push_at: self
                .fail_push
                .filter(|(s, _)| *s == stream)
                .map(|(_, index)| index),
        }))
    }
}

struct MemoryEncoder {
    stream: Stream,
    file: File,
    recordings: Recordings,
    events: EventLog,
    fail_push_at: Option<u64>,
}

impl FrameEncoder for MemoryEncoder {
    fn name(&self) -> &str {
        "memory"
    }

    fn push(&mut self, frame: &VideoFrame, index: u64) -> RecorderResult<()> {
        if self.fail_push_at == Some(index) {
            return Err(RecorderError::Encoder {
                stream: self.stream,
                reason: "encoder rejected buffer".into(),
            });
        }
        writeln!(self.file, "{} {} {}", index, frame.shape(), frame.data.len())?;
        if let Some(rec) = lock(&self.recordings).get_mut(&self.stream) {
            rec.frame_indices.push(index);
        }
        Ok(())
    }

    fn finish(&mut self) -> RecorderResult<()> {
        self.file.flush()?;
        if let Some(rec) = lock(&self.recordings).get_mut(&self.stream) {
            rec.finish_calls += 1;
        }
        self.events.record(format!("{} finish", self.stream));
        Ok(())
    }
}

/// [`CaptureBackend`] over the fakes in this module
///
/// A camera whose script is `None` is absent and fails to open.
pub struct FakeBackend {
    tof: Option<SdkScript>,
    usb: Option<ColorScript>,
    encoders: MemoryEncoderFactory,
    events: EventLog,
}

impl FakeBackend {
    pub fn new(tof: Option<SdkScript>, usb: Option<ColorScript>) -> Self {
        let events = EventLog::default();
        let tof = tof.map(|mut script| {
            script.log = SdkLog::with_events(events.clone());
            script
        });
        let usb = usb.map(|mut script| {
            script.events = events.clone();
            script
        });
        Self {
            tof,
            usb,
            encoders: MemoryEncoderFactory::with_events(events.clone()),
            events,
        }
    }

    /// Swap in a factory with injected failures; it joins this backend's log
    pub fn with_encoders(mut self, mut encoders: MemoryEncoderFactory) -> Self {
        encoders.events = self.events.clone();
        self.encoders = encoders;
        self
    }

    pub fn events(&self) -> EventLog {
        self.events.clone()
    }

    /// Handle on the ToF script's call log
    pub fn sdk_log(&self) -> Option<SdkLog> {
        self.tof.as_ref().map(|s| s.log.clone())
    }

    /// Handle on everything the encoders receive
    pub fn recordings(&self) -> MemoryEncoderFactory {
        self.encoders.clone()
    }
}

impl CaptureBackend for FakeBackend {
    fn open_tof(
        &self,
        config: &TofCameraConfig,
        timeout: Duration,
    ) -> RecorderResult<Box<dyn DepthSource>> {
        let script = self
            .tof
            .clone()
            .ok_or_else(|| RecorderError::DeviceUnavailable {
                stream: Stream::TofDepth,
                reason: "no ToF camera connected".into(),
            })?;
        self.events
            .record(format!("tof timeout {}ms", timeout.as_millis()));
        Ok(Box::new(TofCamera::open(
            FakeSdk::new(script),
            config,
            timeout,
        )?))
    }

    fn open_usb(
        &self,
        config: &UsbCameraConfig,
        timeout: Duration,
    ) -> RecorderResult<Box<dyn ColorSource>> {
        let script = self
            .usb
            .clone()
            .ok_or_else(|| RecorderError::DeviceUnavailable {
                stream: Stream::UsbCamera,
                reason: format!("cannot open {}", config.device_path()),
            })?;
        Ok(Box::new(FakeColorSource::new(script, timeout)))
    }

    fn encoders(&self) -> &dyn EncoderFactory {
        &self.encoders
    }
}
