// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use dual_camera_recorder::{
    RecorderConfig, RecorderError, SchedulingMode, TofCameraConfig, UsbCameraConfig,
    UsbModePolicy,
};
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_config_default() {
    let config = RecorderConfig::default();

    assert_eq!(config.duration, Duration::from_secs(10));
    assert_eq!(config.output_dir, PathBuf::from("recordings"));
    assert_eq!(config.scheduling, SchedulingMode::Threaded);

    let usb = config.usb.expect("USB camera enabled by default");
    assert_eq!((usb.width, usb.height, usb.fps), (1280, 720, 30));
    assert_eq!(usb.mode_policy, UsbModePolicy::Fallback);

    let tof = config.tof.expect("ToF camera enabled by default");
    assert_eq!(tof.max_distance_mm, 4000.0);
}

#[test]
fn test_config_rejects_invalid_values() {
    let cases = [
        RecorderConfig {
            duration: Duration::ZERO,
            ..Default::default()
        },
        RecorderConfig {
            output_dir: PathBuf::new(),
            ..Default::default()
        },
        RecorderConfig {
            tof: None,
            usb: None,
            ..Default::default()
        },
        RecorderConfig {
            usb: Some(UsbCameraConfig {
                fps: 0,
                ..Default::default()
            }),
            ..Default::default()
        },
        RecorderConfig {
            usb: Some(UsbCameraConfig {
                width: 0,
                ..Default::default()
            }),
            ..Default::default()
        },
        RecorderConfig {
            tof: Some(TofCameraConfig {
                max_distance_mm: -1.0,
                ..Default::default()
            }),
            ..Default::default()
        },
    ];

    for config in cases {
        assert!(
            matches!(config.validate(), Err(RecorderError::Config(_))),
            "accepted {:?}",
            config
        );
    }
}

#[test]
fn test_single_camera_configs_validate() {
    let tof_only = RecorderConfig {
        usb: None,
        ..Default::default()
    };
    let usb_only = RecorderConfig {
        tof: None,
        ..Default::default()
    };
    assert!(tof_only.validate().is_ok());
    assert!(usb_only.validate().is_ok());
}

#[test]
fn test_interleaved_shortens_tof_timeout_only_with_usb() {
    let dual = RecorderConfig {
        scheduling: SchedulingMode::Interleaved,
        ..Default::default()
    };
    assert_eq!(dual.tof_timeout(), Duration::from_millis(200));

    let tof_only = RecorderConfig {
        usb: None,
        ..dual
    };
    assert_eq!(tof_only.tof_timeout(), Duration::from_millis(1000));
}

#[test]
fn test_config_serializes_for_report() {
    let json = serde_json::to_value(RecorderConfig::default()).unwrap();
    assert_eq!(json["duration_secs"], 10.0);
    assert_eq!(json["scheduling"], "threaded");
    assert_eq!(json["tof"]["max_distance_mm"], 4000.0);
    assert_eq!(json["usb"]["index"], 0);
}
