// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end session tests against in-memory devices

use dual_camera_recorder::testing::{
    ColorScript, EventLog, FakeBackend, MemoryEncoderFactory, SdkScript,
};
use dual_camera_recorder::{
    Coordinator, RecorderConfig, SchedulingMode, SessionReport, SessionState, Stream,
    TofCameraConfig, UsbCameraConfig,
};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

fn tof_script() -> SdkScript {
    SdkScript {
        width: 8,
        height: 6,
        frame_interval: Duration::from_millis(5),
        ..Default::default()
    }
}

fn usb_script() -> ColorScript {
    ColorScript {
        width: 16,
        height: 12,
        frame_interval: Duration::from_millis(5),
        ..Default::default()
    }
}

fn config(dir: &Path, duration: Duration, scheduling: SchedulingMode) -> RecorderConfig {
    RecorderConfig {
        output_dir: dir.to_path_buf(),
        duration,
        scheduling,
        tof: Some(TofCameraConfig::default()),
        usb: Some(UsbCameraConfig::default()),
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Assert the events occur in this order
fn assert_order(events: &EventLog, expected: &[&str]) {
    let positions: Vec<usize> = expected
        .iter()
        .map(|e| {
            events
                .position(e)
                .unwrap_or_else(|| panic!("missing event {:?} in {:?}", e, events.events()))
        })
        .collect();
    assert!(
        positions.windows(2).all(|w| w[0] < w[1]),
        "events out of order: {:?}",
        events.events()
    );
}

#[test]
fn test_dual_session_completes() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(Some(tof_script()), Some(usb_script()));
    let coordinator = Coordinator::new(
        backend,
        config(dir.path(), Duration::from_millis(300), SchedulingMode::Threaded),
    )
    .unwrap();

    let report = coordinator.run();

    assert_eq!(report.state, SessionState::Done);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        report.transitions,
        vec![
            SessionState::Idle,
            SessionState::Opening,
            SessionState::Recording,
            SessionState::Closing,
            SessionState::Done,
        ]
    );
    assert!(report.abort_cause.is_none());
    assert_eq!(report.streams.len(), 3);
    for stream in &report.streams {
        assert!(stream.frames_written > 0, "{} wrote nothing", stream.stream);
    }

    // All three files share the session timestamp
    let ts = report.timestamp.clone().unwrap();
    assert_eq!(
        file_names(dir.path()),
        vec![
            format!("tof_amplitude_{}.avi", ts),
            format!("tof_depth_{}.avi", ts),
            format!("usb_camera_{}.avi", ts),
        ]
    );
}

#[test]
fn test_open_and_close_order() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(Some(tof_script()), Some(usb_script()));
    let events = backend.events();
    let coordinator = Coordinator::new(
        backend,
        config(dir.path(), Duration::from_millis(100), SchedulingMode::Threaded),
    )
    .unwrap();

    assert_eq!(coordinator.run().state, SessionState::Done);

    assert_order(
        &events,
        &[
            "tof open",
            "usb open",
            "tof_depth open",
            "tof_amplitude open",
            "usb_camera open",
            "usb_camera finish",
            "tof_amplitude finish",
            "tof_depth finish",
            "usb close",
            "tof stop",
            "tof close",
        ],
    );
    for event in [
        "usb_camera finish",
        "tof_amplitude finish",
        "tof_depth finish",
        "usb close",
        "tof close",
    ] {
        assert_eq!(events.count(event), 1, "{} not exactly once", event);
    }
}

#[test]
fn test_missing_usb_camera_aborts_without_files() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(Some(tof_script()), None);
    let events = backend.events();
    let coordinator = Coordinator::new(
        backend,
        config(dir.path(), Duration::from_secs(5), SchedulingMode::Threaded),
    )
    .unwrap();

    let report = coordinator.run();

    assert_eq!(report.state, SessionState::Aborted);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(
        report.transitions,
        vec![SessionState::Idle, SessionState::Opening, SessionState::Aborted]
    );
    assert!(report.abort_cause.as_deref().unwrap().contains("usb_camera"));
    assert!(report.streams.is_empty());
    assert!(file_names(dir.path()).is_empty());

    // The ToF camera opened first and was released
    assert_eq!(events.count("tof close"), 1);
}

#[test]
fn test_depth_timeout_does_not_end_session() {
    let dir = tempfile::tempdir().unwrap();
    let tof = SdkScript {
        timeout_at: vec![2],
        ..tof_script()
    };
    let backend = FakeBackend::new(Some(tof), Some(usb_script()));
    let coordinator = Coordinator::new(
        backend,
        config(dir.path(), Duration::from_millis(300), SchedulingMode::Threaded),
    )
    .unwrap();

    let report = coordinator.run();

    assert_eq!(report.state, SessionState::Done);
    let depth = report.stream(Stream::TofDepth).unwrap();
    let amplitude = report.stream(Stream::TofAmplitude).unwrap();
    let usb = report.stream(Stream::UsbCamera).unwrap();
    assert_eq!(depth.timeouts, 1);
    assert_eq!(amplitude.timeouts, 1);
    assert!(depth.frames_written > 2);
    assert_eq!(depth.frames_written, amplitude.frames_written);
    assert!(usb.frames_written > 0);
    assert_eq!(usb.timeouts, 0);
}

fn stalled_tof() -> SdkScript {
    SdkScript {
        always_timeout: true,
        stall_on_timeout: true,
        ..tof_script()
    }
}

/// ToF reads that block for their whole timeout and never deliver
fn assert_only_tof_timeouts(report: &SessionReport) {
    for stream in [Stream::TofDepth, Stream::TofAmplitude] {
        let counts = report.stream(stream).unwrap();
        assert_eq!(counts.frames_written, 0, "{} wrote frames", stream);
        assert!(counts.timeouts > 0, "{} saw no timeouts", stream);
        assert_eq!(counts.shape_errors, 0);
    }
}

#[test]
fn test_stalled_tof_does_not_block_usb_threaded() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(Some(stalled_tof()), Some(usb_script()));
    let events = backend.events();
    let coordinator = Coordinator::new(
        backend,
        config(dir.path(), Duration::from_millis(600), SchedulingMode::Threaded),
    )
    .unwrap();

    let report = coordinator.run();

    assert_eq!(report.state, SessionState::Done);
    assert_eq!(events.count("tof timeout 1000ms"), 1);
    assert_only_tof_timeouts(&report);
    // One ToF request spans the whole session; USB keeps its own pace
    let usb = report.stream(Stream::UsbCamera).unwrap();
    assert!(usb.frames_written > 20, "usb wrote {}", usb.frames_written);
    assert_eq!(usb.timeouts, 0);
    assert_eq!(
        &report.transitions[2..],
        &[SessionState::Recording, SessionState::Closing, SessionState::Done]
    );
}

#[test]
fn test_stalled_tof_does_not_block_usb_interleaved() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(Some(stalled_tof()), Some(usb_script()));
    let events = backend.events();
    let recordings = backend.recordings();
    let coordinator = Coordinator::new(
        backend,
        config(dir.path(), Duration::from_millis(700), SchedulingMode::Interleaved),
    )
    .unwrap();

    let report = coordinator.run();

    assert_eq!(report.state, SessionState::Done);
    assert_eq!(events.count("tof timeout 200ms"), 1);
    assert_only_tof_timeouts(&report);
    // Each pass waits out one short ToF timeout, then pulls a USB frame
    let usb = report.stream(Stream::UsbCamera).unwrap();
    assert!(usb.frames_written >= 2, "usb wrote {}", usb.frames_written);
    let indices = recordings.recorded(Stream::UsbCamera).frame_indices();
    assert_eq!(indices.len() as u64, usb.frames_written);
    assert!(indices.windows(2).all(|w| w[1] == w[0] + 1));
}

#[test]
fn test_closing_starts_before_stalled_pump_returns() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(Some(stalled_tof()), Some(usb_script()));
    let duration = Duration::from_millis(200);
    let coordinator =
        Coordinator::new(backend, config(dir.path(), duration, SchedulingMode::Threaded)).unwrap();

    let started = Instant::now();
    let report = coordinator.run();
    let wall = started.elapsed();

    // The first ToF request holds its thread for the full second
    assert!(wall >= Duration::from_millis(1000), "took {:?}", wall);
    // Recording time ends at Closing, not when that request gives up
    assert!(report.elapsed_secs >= duration.as_secs_f64());
    assert!(report.elapsed_secs < 0.8, "recorded {}s", report.elapsed_secs);
    assert_eq!(report.state, SessionState::Done);
    assert!(report.abort_cause.is_none());
}

#[test]
fn test_stop_during_stalled_read_still_closes() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(Some(stalled_tof()), Some(usb_script()));
    let events = backend.events();
    let coordinator = Coordinator::new(
        backend,
        config(dir.path(), Duration::from_secs(30), SchedulingMode::Threaded),
    )
    .unwrap();

    let stop = coordinator.stop_handle();
    let trigger = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        stop.store(true, Ordering::SeqCst);
    });

    let report = coordinator.run();
    trigger.join().unwrap();

    assert_eq!(report.state, SessionState::Done);
    assert!(report.abort_cause.is_none());
    assert!(!report.transitions.contains(&SessionState::Aborted));
    assert_eq!(events.count("tof close"), 1);
    assert_eq!(events.count("usb close"), 1);
}

#[test]
fn test_wrong_shape_frame_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let usb = ColorScript {
        wrong_shape_at: vec![1],
        ..usb_script()
    };
    let backend = FakeBackend::new(Some(tof_script()), Some(usb));
    let recordings = backend.recordings();
    let coordinator = Coordinator::new(
        backend,
        config(dir.path(), Duration::from_millis(200), SchedulingMode::Threaded),
    )
    .unwrap();

    let report = coordinator.run();

    assert_eq!(report.state, SessionState::Done);
    let usb = report.stream(Stream::UsbCamera).unwrap();
    assert_eq!(usb.shape_errors, 1);
    let indices = recordings.recorded(Stream::UsbCamera).frame_indices();
    assert_eq!(indices.len() as u64, usb.frames_written);
    assert!(indices.windows(2).all(|w| w[1] == w[0] + 1));
}

#[test]
fn test_duration_bounds_recording() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(Some(tof_script()), Some(usb_script()));
    let duration = Duration::from_millis(300);
    let coordinator =
        Coordinator::new(backend, config(dir.path(), duration, SchedulingMode::Threaded)).unwrap();

    let started = Instant::now();
    let report = coordinator.run();
    let wall = started.elapsed();

    assert_eq!(report.state, SessionState::Done);
    assert!(report.elapsed_secs >= duration.as_secs_f64());
    // Deadline plus one read and the final flush
    assert!(wall < duration + Duration::from_millis(1500), "took {:?}", wall);
}

#[test]
fn test_interrupt_while_recording_finishes_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(Some(tof_script()), Some(usb_script()));
    let events = backend.events();
    let coordinator = Coordinator::new(
        backend,
        config(dir.path(), Duration::from_secs(30), SchedulingMode::Threaded),
    )
    .unwrap();

    let stop = coordinator.stop_handle();
    let trigger = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        stop.store(true, Ordering::SeqCst);
    });

    let started = Instant::now();
    let report = coordinator.run();
    trigger.join().unwrap();

    assert_eq!(report.state, SessionState::Done);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.streams.len(), 3);
    assert_eq!(events.count("tof close"), 1);
    assert_eq!(events.count("usb close"), 1);
}

#[test]
fn test_interrupt_before_recording_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(Some(tof_script()), Some(usb_script()));
    let coordinator = Coordinator::new(
        backend,
        config(dir.path(), Duration::from_secs(30), SchedulingMode::Threaded),
    )
    .unwrap();
    coordinator.stop_handle().store(true, Ordering::SeqCst);

    let report = coordinator.run();

    assert_eq!(report.state, SessionState::Aborted);
    assert!(report.abort_cause.as_deref().unwrap().contains("interrupted"));
    assert!(file_names(dir.path()).is_empty());
}

#[test]
fn test_device_failure_aborts_and_releases_everything() {
    let dir = tempfile::tempdir().unwrap();
    let usb = ColorScript {
        fail_at: Some(3),
        ..usb_script()
    };
    let backend = FakeBackend::new(Some(tof_script()), Some(usb));
    let events = backend.events();
    let coordinator = Coordinator::new(
        backend,
        config(dir.path(), Duration::from_secs(30), SchedulingMode::Threaded),
    )
    .unwrap();

    let started = Instant::now();
    let report = coordinator.run();

    assert_eq!(report.state, SessionState::Aborted);
    assert_eq!(
        report.transitions,
        vec![
            SessionState::Idle,
            SessionState::Opening,
            SessionState::Recording,
            SessionState::Aborted,
        ]
    );
    assert!(report.abort_cause.as_deref().unwrap().contains("disconnected"));
    assert!(started.elapsed() < Duration::from_secs(5));

    // Files written so far are still finalized
    assert_eq!(report.stream(Stream::UsbCamera).unwrap().frames_written, 3);
    assert_order(
        &events,
        &[
            "usb_camera finish",
            "tof_amplitude finish",
            "tof_depth finish",
            "usb close",
            "tof close",
        ],
    );
}

#[test]
fn test_encoder_unavailable_aborts_during_opening() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(Some(tof_script()), Some(usb_script()))
        .with_encoders(MemoryEncoderFactory::default().failing_open(Stream::TofAmplitude));
    let events = backend.events();
    let coordinator = Coordinator::new(
        backend,
        config(dir.path(), Duration::from_secs(5), SchedulingMode::Threaded),
    )
    .unwrap();

    let report = coordinator.run();

    assert_eq!(report.state, SessionState::Aborted);
    assert_eq!(events.count("usb_camera open"), 0);
    assert_order(&events, &["tof_depth finish", "usb close", "tof close"]);
    let depth = report.stream(Stream::TofDepth).unwrap();
    assert_eq!(depth.frames_written, 0);
}

#[test]
fn test_interleaved_session() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(Some(tof_script()), Some(usb_script()));
    let events = backend.events();
    let coordinator = Coordinator::new(
        backend,
        config(dir.path(), Duration::from_millis(200), SchedulingMode::Interleaved),
    )
    .unwrap();

    let report = coordinator.run();

    assert_eq!(report.state, SessionState::Done);
    assert_eq!(events.count("tof timeout 200ms"), 1);
    // One thread takes turns, so both cameras advance together
    let depth = report.stream(Stream::TofDepth).unwrap().frames_written;
    let usb = report.stream(Stream::UsbCamera).unwrap().frames_written;
    assert!(depth > 0 && usb > 0);
    assert!(depth.abs_diff(usb) <= 1);
}

#[test]
fn test_tof_only_session() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(Some(tof_script()), None);
    let events = backend.events();
    let config = RecorderConfig {
        usb: None,
        ..config(dir.path(), Duration::from_millis(100), SchedulingMode::Interleaved)
    };
    let coordinator = Coordinator::new(backend, config).unwrap();

    let report = coordinator.run();

    assert_eq!(report.state, SessionState::Done);
    assert_eq!(events.count("tof timeout 1000ms"), 1);
    assert_eq!(report.streams.len(), 2);
    assert!(report.stream(Stream::UsbCamera).is_none());
    assert_eq!(file_names(dir.path()).len(), 2);
}

#[test]
fn test_usb_only_session() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(None, Some(usb_script()));
    let config = RecorderConfig {
        tof: None,
        ..config(dir.path(), Duration::from_millis(100), SchedulingMode::Interleaved)
    };
    let coordinator = Coordinator::new(backend, config).unwrap();

    let report = coordinator.run();

    assert_eq!(report.state, SessionState::Done);
    assert_eq!(report.streams.len(), 1);
    let usb = report.stream(Stream::UsbCamera).unwrap();
    assert!(usb.frames_written > 0);
    assert!(usb.file.to_string_lossy().contains("usb_camera_"));
}

#[test]
fn test_invalid_config_is_rejected_before_opening() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(Some(tof_script()), Some(usb_script()));
    let events = backend.events();
    let result = Coordinator::new(
        backend,
        config(dir.path(), Duration::ZERO, SchedulingMode::Threaded),
    );

    assert!(result.is_err());
    assert!(events.events().is_empty());
}

#[test]
fn test_duration_past_clock_range_is_rejected_before_opening() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(Some(tof_script()), Some(usb_script()));
    let events = backend.events();
    let result = Coordinator::new(
        backend,
        config(dir.path(), Duration::from_secs(u64::MAX), SchedulingMode::Threaded),
    );

    match result {
        Err(e) => assert!(e.to_string().contains("too long"), "{}", e),
        Ok(_) => panic!("oversized duration accepted"),
    }
    assert!(events.events().is_empty());
}
