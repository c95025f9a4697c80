// SPDX-License-Identifier: GPL-3.0-only

use clap::Parser;
use dual_camera_recorder::backends::get_backend;
use dual_camera_recorder::cli::{self, OutputArgs, TofArgs};
use dual_camera_recorder::config::SchedulingMode;
use dual_camera_recorder::constants::app_info;
use std::process::ExitCode;

/// Record depth and amplitude from the ToF camera only
#[derive(Parser)]
#[command(name = "tof_recorder")]
#[command(version = app_info::version())]
struct Cli {
    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    tof: TofArgs,
}

fn main() -> anyhow::Result<ExitCode> {
    cli::init_logging();

    let args = Cli::parse();
    let config = args
        .output
        .into_config(Some(&args.tof), None, SchedulingMode::Interleaved)?;
    let code = cli::record(get_backend(), config, args.output.json)?;
    Ok(cli::exit_code(code))
}
