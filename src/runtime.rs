// Fixed-rate control loop with a command watchdog.
//
// The watchdog replaces stale commands with a stop: if teleop dies mid-run
// the base must not keep executing its last velocity. All integration inside
// the cycle uses the nominal period, never measured elapsed time, so a
// simulated run is deterministic regardless of scheduling jitter.

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{DriveConfig, TOPIC_CMD_BASE, TOPIC_HEALTH, TOPIC_POSE};
use crate::drive::controller::Drivetrain;
use crate::drive::shaping::AxisShaper;
use crate::messages::{BaseCommand, DrivetrainTelemetry, RuntimeHealth};

pub struct Runtime {
    drivetrain: Drivetrain,
    shaper: AxisShaper,
    period: Duration,
    stale_timeout: Duration,
    latest_cmd: Option<BaseCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new(config: &DriveConfig, drivetrain: Drivetrain) -> Self {
        Self {
            drivetrain,
            shaper: AxisShaper::new(config.skew_factor, config.slew_rate),
            period: config.period,
            stale_timeout: config.stale_timeout,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // stale until the first command
        }
    }

    pub fn on_command(&mut self, cmd: BaseCommand) {
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Raw command axes for this cycle, after the watchdog.
    fn commanded_axes(&mut self) -> [f64; 3] {
        let cmd_age = self.cmd_received_at.elapsed();
        if cmd_age > self.stale_timeout {
            if self.health != RuntimeHealth::CmdStale {
                warn!("command stale ({:?} old), stopping base", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            [0.0; 3]
        } else if let Some(cmd) = self.latest_cmd {
            self.health = RuntimeHealth::Ok;
            cmd.axes()
        } else {
            self.health = RuntimeHealth::CmdStale;
            [0.0; 3]
        }
    }

    /// One control cycle: shape inputs, actuate, advance simulated hardware,
    /// integrate odometry. Returns the telemetry record for this cycle.
    pub fn cycle(&mut self) -> DrivetrainTelemetry {
        let dt = self.period.as_secs_f64();
        let axes = self.commanded_axes();
        let [x, y, r] = self.shaper.shape(axes, dt);
        self.drivetrain.drive_normalized(x, y, r);
        self.drivetrain.step_hardware(dt);
        let pose = self.drivetrain.update_odometry();

        DrivetrainTelemetry {
            pose: pose.into(),
            modules: self.drivetrain.module_commands().map(Into::into),
            gyro_heading: self.drivetrain.gyro_heading(),
        }
    }
}

pub async fn run(
    config: &DriveConfig,
    drivetrain: Drivetrain,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("opening zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    let subscriber = session.declare_subscriber(TOPIC_CMD_BASE).await?;
    let pub_pose = session.declare_publisher(TOPIC_POSE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(config, drivetrain);
    let mut tick = interval(config.period);

    info!(
        "runtime started: {:?} cycle, {:?} watchdog timeout",
        config.period, config.stale_timeout
    );
    info!("subscribed to: {}", TOPIC_CMD_BASE);
    info!("publishing to: {}, {}", TOPIC_POSE, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // Drain all pending commands (non-blocking), keep the latest.
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<BaseCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("failed to parse command: {}", e),
            }
        }

        let telemetry = runtime.cycle();

        // Telemetry is best effort: a failed publish never stops the cycle.
        match serde_json::to_string(&telemetry) {
            Ok(json) => {
                if let Err(e) = pub_pose.put(json).await {
                    warn!("pose publish failed: {}", e);
                }
            }
            Err(e) => warn!("pose encode failed: {}", e),
        }
        match serde_json::to_string(&runtime.health()) {
            Ok(json) => {
                if let Err(e) = pub_health.put(json).await {
                    warn!("health publish failed: {}", e);
                }
            }
            Err(e) => warn!("health encode failed: {}", e),
        }
    }
}
