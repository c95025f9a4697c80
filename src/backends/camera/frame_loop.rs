// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for capture loops
//!
//! Each pump runs on its own named thread and owns its state (source and
//! sinks) for the thread's lifetime. Joining hands the state back so the
//! caller can release resources in a fixed order.

use crate::errors::RecorderResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by the capture loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a capture loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let controller = CaptureLoopController::start("tof-pump", pump, |pump| {
///     match pump.step() {
///         Ok(()) => LoopAction::Continue,
///         Err(_) => LoopAction::Stop,
///     }
/// })?;
///
/// controller.request_stop();
/// let pump = controller.join();
/// ```
pub struct CaptureLoopController<S: Send + 'static> {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<S>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl<S: Send + 'static> CaptureLoopController<S> {
    /// Start a new capture loop in a separate thread
    ///
    /// `loop_fn` is called with the owned state until it returns
    /// `LoopAction::Stop` or the stop signal is raised.
    pub fn start<F>(name: &str, state: S, mut loop_fn: F) -> RecorderResult<Self>
    where
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting capture loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut state = state;
                debug!(name = %name_clone, "Capture loop thread started");

                loop {
                    // Check stop signal first
                    if stop_signal_clone.load(Ordering::SeqCst) {
                        debug!(name = %name_clone, "Stop signal received");
                        break;
                    }

                    match loop_fn(&mut state) {
                        LoopAction::Continue => {}
                        LoopAction::Stop => {
                            debug!(name = %name_clone, "Loop requested stop");
                            break;
                        }
                    }
                }

                info!(name = %name_clone, "Capture loop thread exiting");
                state
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Wait for the thread to finish and take back its state
    ///
    /// Does not raise the stop signal. Returns `None` if the loop panicked,
    /// in which case the state was dropped during unwinding.
    pub fn join(mut self) -> Option<S> {
        let handle = self.thread_handle.take()?;
        debug!(name = %self.name, "Waiting for capture loop thread to finish");
        match handle.join() {
            Ok(state) => {
                debug!(name = %self.name, "Capture loop thread finished");
                Some(state)
            }
            Err(e) => {
                warn!(name = %self.name, "Capture loop thread panicked: {:?}", e);
                None
            }
        }
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(self) -> Option<S> {
        self.request_stop();
        self.join()
    }
}

impl<S: Send + 'static> Drop for CaptureLoopController<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop_signal.store(true, Ordering::SeqCst);
            if handle.join().is_err() {
                warn!(name = %self.name, "Capture loop thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_loop_returns_state() {
        let controller = CaptureLoopController::start("test-loop", 0u32, |count| {
            *count += 1;
            if *count > 10 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        })
        .unwrap();

        assert_eq!(controller.join(), Some(11));
    }

    #[test]
    fn test_stop_signal() {
        let controller = CaptureLoopController::start("test-loop", 0u32, |count| {
            *count += 1;
            thread::sleep(Duration::from_millis(10));
            LoopAction::Continue
        })
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(controller.is_running());

        let count = controller.stop().unwrap();
        assert!(count > 0);
    }

    #[test]
    fn test_panic_yields_none() {
        let controller =
            CaptureLoopController::start("test-panic", (), |_| panic!("pump blew up")).unwrap();
        assert!(controller.join().is_none());
    }

    #[test]
    fn test_drop_stops_loop() {
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&flag);
        let controller = CaptureLoopController::start("test-drop", (), move |_| {
            flag_clone.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            LoopAction::Continue
        })
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        drop(controller);
        assert!(flag.load(Ordering::SeqCst));
    }
}
