// SPDX-License-Identifier: GPL-3.0-only

//! Recording coordinator
//!
//! Opens the session's sources and sinks in dependency order, runs the pumps
//! until the duration elapses or a stop is requested, then releases
//! everything in reverse order. See [`SessionState`] for the lifecycle.

use super::pump::{Pump, SkipCounters, TofPump, UsbPump};
use super::report::{SessionReport, StreamReport};
use super::session::Session;
use super::state::{SessionState, StateMachine};
use crate::backends::CaptureBackend;
use crate::backends::camera::frame_loop::{CaptureLoopController, LoopAction};
use crate::backends::camera::{ColorSource, DepthSource};
use crate::config::{RecorderConfig, SchedulingMode};
use crate::constants::{POLL_INTERVAL, app_info, timeouts};
use crate::errors::{RecorderError, RecorderResult, Stream};
use crate::pipelines::video::VideoSink;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Why a session ended early
#[derive(Debug)]
enum Abort {
    /// Stop requested before recording began
    Interrupted,
    Failed(RecorderError),
    /// A pump thread panicked and took its resources with it
    PumpPanicked(&'static str),
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Abort::Interrupted => f.write_str("interrupted while opening devices"),
            Abort::Failed(e) => write!(f, "{}", e),
            Abort::PumpPanicked(name) => write!(f, "{} thread panicked", name),
        }
    }
}

impl From<RecorderError> for Abort {
    fn from(e: RecorderError) -> Self {
        Abort::Failed(e)
    }
}

/// Everything a session opens
///
/// Fields are declared in opening order; [`Resources::release`] closes them
/// in reverse.
#[derive(Default)]
struct Resources {
    tof_source: Option<Box<dyn DepthSource>>,
    usb_source: Option<Box<dyn ColorSource>>,
    depth_sink: Option<VideoSink>,
    amplitude_sink: Option<VideoSink>,
    usb_sink: Option<VideoSink>,
}

impl Resources {
    /// Close everything that is open, logging each failure independently
    ///
    /// Sinks stay in place after closing so the report can read their counts.
    fn release(&mut self) -> usize {
        let mut failures = 0;

        for sink in [&mut self.usb_sink, &mut self.amplitude_sink, &mut self.depth_sink]
            .into_iter()
            .flatten()
        {
            if let Err(e) = sink.close() {
                error!(stream = %sink.stream(), operation = "close", error = %e, "Failed to close sink");
                failures += 1;
            }
        }

        if let Some(mut source) = self.usb_source.take() {
            if let Err(e) = source.close() {
                error!(stream = %Stream::UsbCamera, operation = "close", error = %e, "Failed to close source");
                failures += 1;
            }
        }

        if let Some(mut source) = self.tof_source.take() {
            if let Err(e) = source.close() {
                error!(stream = %Stream::TofDepth, operation = "close", error = %e, "Failed to close source");
                failures += 1;
            }
        }

        failures
    }

    /// Split into pumps; whatever is missing for a pump stays behind
    fn take_pumps(&mut self, max_distance_mm: f32) -> (Option<TofPump>, Option<UsbPump>) {
        let tof = match (
            self.tof_source.take(),
            self.depth_sink.take(),
            self.amplitude_sink.take(),
        ) {
            (Some(source), Some(depth), Some(amplitude)) => {
                Some(TofPump::new(source, depth, amplitude, max_distance_mm))
            }
            (source, depth, amplitude) => {
                self.tof_source = source;
                self.depth_sink = depth;
                self.amplitude_sink = amplitude;
                None
            }
        };

        let usb = match (self.usb_source.take(), self.usb_sink.take()) {
            (Some(source), Some(sink)) => Some(UsbPump::new(source, sink)),
            (source, sink) => {
                self.usb_source = source;
                self.usb_sink = sink;
                None
            }
        };

        (tof, usb)
    }
}

/// Skip counters carried over from the pumps for the report
#[derive(Debug, Default, Clone, Copy)]
struct SessionSkips {
    depth: SkipCounters,
    amplitude: SkipCounters,
    usb: SkipCounters,
}

/// What a recording mode hands back once its pumps have stopped
struct Recorded {
    tof: Option<TofPump>,
    usb: Option<UsbPump>,
    failure: Option<Abort>,
    /// When recording ended, before any pump was joined
    stopped_at: Instant,
}

/// A pump plus the fatal error that stopped it, if any
struct PumpSlot<P> {
    pump: P,
    failure: Option<RecorderError>,
}

fn spawn_pump<P: Pump + 'static>(pump: P) -> RecorderResult<CaptureLoopController<PumpSlot<P>>> {
    let name = pump.name();
    CaptureLoopController::start(name, PumpSlot { pump, failure: None }, |slot| {
        match slot.pump.step() {
            Ok(()) => LoopAction::Continue,
            Err(e) => {
                error!(pump = slot.pump.name(), error = %e, "Pump failed");
                slot.failure = Some(e);
                LoopAction::Stop
            }
        }
    })
}

/// Runs one recording session against a [`CaptureBackend`]
pub struct Coordinator<B: CaptureBackend> {
    backend: B,
    config: RecorderConfig,
    stop: Arc<AtomicBool>,
    state: StateMachine,
}

impl<B: CaptureBackend> Coordinator<B> {
    /// Validate `config` and prepare an idle session
    pub fn new(backend: B, config: RecorderConfig) -> RecorderResult<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            stop: Arc::new(AtomicBool::new(false)),
            state: StateMachine::default(),
        })
    }

    /// Flag that ends the session when set (wired to Ctrl+C by the binaries)
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn check_interrupt(&self) -> Result<(), Abort> {
        if self.stop_requested() {
            Err(Abort::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Run the session to a terminal state
    pub fn run(mut self) -> SessionReport {
        self.state.advance(SessionState::Opening);

        let session = match Session::start(&self.config.output_dir) {
            Ok(session) => session,
            Err(e) => {
                error!(operation = "open", error = %e, "Cannot prepare output directory");
                self.state.advance(SessionState::Aborted);
                return self.report(
                    None,
                    Duration::ZERO,
                    Some(e.to_string()),
                    &Resources::default(),
                    SessionSkips::default(),
                );
            }
        };

        let mut resources = Resources::default();
        if let Err(abort) = self.open_all(&session, &mut resources) {
            error!(operation = "open", cause = %abort, "Session aborted while opening");
            resources.release();
            self.state.advance(SessionState::Aborted);
            return self.report(
                Some(&session),
                Duration::ZERO,
                Some(abort.to_string()),
                &resources,
                SessionSkips::default(),
            );
        }

        let started = Instant::now();
        let Some(deadline) = started.checked_add(self.config.duration) else {
            let cause = RecorderError::Config("duration exceeds the clock range".into());
            error!(operation = "open", error = %cause, "Session aborted while opening");
            resources.release();
            self.state.advance(SessionState::Aborted);
            return self.report(
                Some(&session),
                Duration::ZERO,
                Some(cause.to_string()),
                &resources,
                SessionSkips::default(),
            );
        };

        self.state.advance(SessionState::Recording);
        let max_distance = self
            .config
            .tof
            .as_ref()
            .map(|t| t.max_distance_mm)
            .unwrap_or_default();
        let (tof, usb) = resources.take_pumps(max_distance);

        let Recorded {
            tof,
            usb,
            failure,
            stopped_at,
        } = match self.config.scheduling {
            SchedulingMode::Threaded => self.record_threaded(tof, usb, deadline),
            SchedulingMode::Interleaved => self.record_interleaved(tof, usb, deadline),
        };
        let elapsed = stopped_at.saturating_duration_since(started);

        // Hand everything back for ordered release
        let mut skips = SessionSkips::default();
        if let Some(pump) = tof {
            skips.depth = pump.depth_skips;
            skips.amplitude = pump.amplitude_skips;
            resources.tof_source = Some(pump.source);
            resources.depth_sink = Some(pump.depth_sink);
            resources.amplitude_sink = Some(pump.amplitude_sink);
        }
        if let Some(pump) = usb {
            skips.usb = pump.skips;
            resources.usb_source = Some(pump.source);
            resources.usb_sink = Some(pump.sink);
        }

        let closing = self.state.current() == SessionState::Closing;
        match failure {
            Some(abort) if !closing => {
                error!(operation = "record", cause = %abort, "Session aborted while recording");
                resources.release();
                self.state.advance(SessionState::Aborted);
                self.report(Some(&session), elapsed, Some(abort.to_string()), &resources, skips)
            }
            late => {
                if let Some(abort) = late {
                    // The frame in flight at stop time failed; what was written stands
                    warn!(operation = "record", cause = %abort, "Pump failed while stopping");
                }
                if !closing {
                    self.state.advance(SessionState::Closing);
                }
                let failures = resources.release();
                if failures > 0 {
                    warn!(failures, "Some resources failed to close cleanly");
                }
                self.state.advance(SessionState::Done);
                self.report(Some(&session), elapsed, None, &resources, skips)
            }
        }
    }

    /// Open sources, then sinks, stopping at the first failure
    fn open_all(&self, session: &Session, res: &mut Resources) -> Result<(), Abort> {
        self.check_interrupt()?;

        if let Some(tof) = &self.config.tof {
            res.tof_source = Some(self.backend.open_tof(tof, self.config.tof_timeout())?);
            self.check_interrupt()?;
        }

        if let Some(usb) = &self.config.usb {
            res.usb_source = Some(self.backend.open_usb(usb, timeouts::USB)?);
            self.check_interrupt()?;
        }

        let encoders = self.backend.encoders();

        if let (Some(tof), Some(source)) = (&self.config.tof, &res.tof_source) {
            let shape = source.shape();
            res.depth_sink = Some(VideoSink::open(
                encoders,
                Stream::TofDepth,
                &session.path_for(Stream::TofDepth),
                tof.fps,
                shape.width,
                shape.height,
                true,
            )?);
            self.check_interrupt()?;

            res.amplitude_sink = Some(VideoSink::open(
                encoders,
                Stream::TofAmplitude,
                &session.path_for(Stream::TofAmplitude),
                tof.fps,
                shape.width,
                shape.height,
                false,
            )?);
            self.check_interrupt()?;
        }

        if let Some(source) = &res.usb_source {
            let shape = source.shape();
            res.usb_sink = Some(VideoSink::open(
                encoders,
                Stream::UsbCamera,
                &session.path_for(Stream::UsbCamera),
                source.fps(),
                shape.width,
                shape.height,
                true,
            )?);
            self.check_interrupt()?;
        }

        Ok(())
    }

    /// One thread per pump, supervised from the calling thread
    fn record_threaded(
        &mut self,
        tof: Option<TofPump>,
        usb: Option<UsbPump>,
        deadline: Instant,
    ) -> Recorded {
        let tof_loop = match tof.map(spawn_pump).transpose() {
            Ok(ctl) => ctl,
            Err(e) => {
                return Recorded {
                    tof: None,
                    usb,
                    failure: Some(Abort::Failed(e)),
                    stopped_at: Instant::now(),
                };
            }
        };
        let usb_loop = match usb.map(spawn_pump).transpose() {
            Ok(ctl) => ctl,
            Err(e) => {
                let stopped_at = Instant::now();
                let tof = tof_loop.and_then(|ctl| ctl.stop()).map(|slot| slot.pump);
                return Recorded {
                    tof,
                    usb: None,
                    failure: Some(Abort::Failed(e)),
                    stopped_at,
                };
            }
        };

        let finished = loop {
            if Instant::now() >= deadline {
                info!("Recording duration reached");
                break true;
            }
            if self.stop_requested() {
                info!("Stop requested, finishing recording");
                break true;
            }
            let tof_dead = tof_loop.as_ref().is_some_and(|c| !c.is_running());
            let usb_dead = usb_loop.as_ref().is_some_and(|c| !c.is_running());
            if tof_dead || usb_dead {
                break false;
            }
            thread::sleep(POLL_INTERVAL);
        };
        let stopped_at = Instant::now();

        // Joining can wait out a read timeout; the session is closing from here
        if finished {
            self.state.advance(SessionState::Closing);
        }

        // Raise both signals before waiting on either
        if let Some(ctl) = &tof_loop {
            ctl.request_stop();
        }
        if let Some(ctl) = &usb_loop {
            ctl.request_stop();
        }

        let mut failure = None;
        let tof = collect_slot(tof_loop, "tof-pump", &mut failure);
        let usb = collect_slot(usb_loop, "usb-pump", &mut failure);

        Recorded {
            tof,
            usb,
            failure,
            stopped_at,
        }
    }

    /// Both pumps in turn on the calling thread
    fn record_interleaved(
        &self,
        mut tof: Option<TofPump>,
        mut usb: Option<UsbPump>,
        deadline: Instant,
    ) -> Recorded {
        let mut failure = None;

        'record: while Instant::now() < deadline {
            if self.stop_requested() {
                info!("Stop requested, finishing recording");
                break;
            }

            let pumps: [Option<&mut dyn Pump>; 2] = [
                tof.as_mut().map(|p| p as &mut dyn Pump),
                usb.as_mut().map(|p| p as &mut dyn Pump),
            ];
            for pump in pumps.into_iter().flatten() {
                if let Err(e) = pump.step() {
                    error!(pump = pump.name(), error = %e, "Pump failed");
                    failure = Some(Abort::Failed(e));
                    break 'record;
                }
            }
        }

        Recorded {
            tof,
            usb,
            failure,
            stopped_at: Instant::now(),
        }
    }

    fn report(
        &self,
        session: Option<&Session>,
        elapsed: Duration,
        abort_cause: Option<String>,
        res: &Resources,
        skips: SessionSkips,
    ) -> SessionReport {
        let secs = elapsed.as_secs_f64();
        let streams = [
            (&res.depth_sink, skips.depth),
            (&res.amplitude_sink, skips.amplitude),
            (&res.usb_sink, skips.usb),
        ]
        .into_iter()
        .filter_map(|(sink, skips)| {
            sink.as_ref()
                .map(|sink| StreamReport::from_sink(sink, skips, secs))
        })
        .collect();

        SessionReport {
            version: app_info::version(),
            state: self.state.current(),
            transitions: self.state.history().to_vec(),
            timestamp: session.map(|s| s.timestamp().to_string()),
            elapsed_secs: secs,
            abort_cause,
            config: self.config.clone(),
            streams,
        }
    }
}

/// Join a pump thread and take back its pump, noting why it stopped
fn collect_slot<P: Send + 'static>(
    ctl: Option<CaptureLoopController<PumpSlot<P>>>,
    name: &'static str,
    failure: &mut Option<Abort>,
) -> Option<P> {
    let slot = match ctl?.join() {
        Some(slot) => slot,
        None => {
            failure.get_or_insert(Abort::PumpPanicked(name));
            return None;
        }
    };
    if let Some(e) = slot.failure {
        failure.get_or_insert(Abort::Failed(e));
    }
    Some(slot.pump)
}
