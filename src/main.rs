use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::config::{Config, DriveConfig};
use swerve_zenoh_runtime::drive::controller::Drivetrain;
use swerve_zenoh_runtime::drive::hardware::{DriveHardware, SerialDrive};
use swerve_zenoh_runtime::drive::sim::SimulatedDrive;
use swerve_zenoh_runtime::runtime;

/// Control runtime for a four-module swerve base.
#[derive(Parser)]
struct Args {
    /// JSON configuration file; missing keys fall back to built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the servo bus (overrides the configured port)
    #[arg(long)]
    port: Option<String>,

    /// Drive the built-in physics model instead of real hardware
    #[arg(long)]
    sim: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path),
        None => Config::default(),
    };
    let mut drive_config = DriveConfig::from_config(&config);
    if let Some(port) = args.port {
        drive_config.port = port;
    }

    let hardware: Box<dyn DriveHardware> = if args.sim {
        Box::new(SimulatedDrive::new(&drive_config))
    } else {
        match SerialDrive::connect(&drive_config) {
            Ok(drive) => Box::new(drive),
            Err(e) => {
                eprintln!("failed to open drive hardware: {e}");
                std::process::exit(1);
            }
        }
    };
    let drivetrain = Drivetrain::new(&drive_config, hardware);

    if let Err(e) = runtime::run(&drive_config, drivetrain).await {
        eprintln!("runtime error: {e}");
        std::process::exit(1);
    }
}
