// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use dual_camera_recorder::backends::get_backend;
use dual_camera_recorder::cli::{self, OutputArgs, TofArgs, UsbArgs};
use dual_camera_recorder::config::{SchedulingMode, TofCameraConfig, UsbCameraConfig};
use dual_camera_recorder::constants::app_info;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "dual_camera_recorder")]
#[command(about = "Record a ToF depth camera and a USB camera side by side")]
#[command(version = app_info::version())]
#[command(subcommand_required = false)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    tof: TofArgs,

    #[command(flatten)]
    usb: UsbArgs,

    /// Pump both cameras from one thread instead of one thread each
    #[arg(long)]
    interleaved: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List V4L2 capture devices and available encoders
    List,

    /// Open each camera, read one frame and report PASS/FAIL
    Probe,
}

fn main() -> anyhow::Result<ExitCode> {
    cli::init_logging();

    let args = Cli::parse();
    let backend = get_backend();

    match args.command {
        Some(Commands::List) => {
            cli::list_devices()?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Probe) => {
            let results = cli::probe_cameras(
                &backend,
                Some(&TofCameraConfig::from(&args.tof)),
                Some(&UsbCameraConfig::from(&args.usb)),
            );
            Ok(cli::exit_code(cli::report_probe(&results)))
        }
        None => {
            let scheduling = if args.interleaved {
                SchedulingMode::Interleaved
            } else {
                SchedulingMode::Threaded
            };
            let config = args
                .output
                .into_config(Some(&args.tof), Some(&args.usb), scheduling)?;
            let code = cli::record(backend, config, args.output.json)?;
            Ok(cli::exit_code(code))
        }
    }
}
