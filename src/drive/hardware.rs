// Hardware strategy for the drivetrain: one trait, selected at construction,
// with a serial servo-bus backend here and a physics-backed one in `sim`.

use std::f64::consts::TAU;

use tracing::{debug, info, warn};

use super::bus::{OperatingMode, Register, Result as BusResult, ServoBus};
use super::kinematics::{MODULE_COUNT, wrap_angle};
use super::odometry::{Pose, WheelSample};
use crate::config::DriveConfig;

/// Largest raw velocity command sent to a drive servo (safety limit).
const MAX_RAW_VELOCITY: f64 = 3000.0;

/// Per-module actuation for one cycle: normalized drive output in `[-1, 1]`
/// and the steer target angle in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModuleCommand {
    pub drive_output: f64,
    pub steer_angle: f64,
}

/// Actuation and sensing surface of the four modules.
///
/// All calls are synchronous and must not stall the control cycle: a failed
/// write is dropped (the next cycle re-commands fresh values) and a failed
/// read surfaces the last known sample.
pub trait DriveHardware {
    /// Fire-and-forget actuation of all four modules.
    fn apply(&mut self, commands: &[ModuleCommand; MODULE_COUNT]);

    /// Fresh cumulative-distance/steer-angle samples, best effort.
    fn read_wheels(&mut self) -> [WheelSample; MODULE_COUNT];

    /// Heading from a gyro when one exists (the simulated backend's
    /// synthetic gyro); `None` on a base without one.
    fn gyro_heading(&mut self) -> Option<f64> {
        None
    }

    /// Called when odometry is externally reset, so a physics-backed
    /// implementation can re-ground its state.
    fn on_pose_reset(&mut self, _pose: Pose) {}

    /// Advance internal state by the nominal cycle period. No-op on real
    /// hardware.
    fn step(&mut self, _dt: f64) {}
}

/// Real base: four velocity-mode drive servos and four position-mode steer
/// servos on one serial bus.
pub struct SerialDrive {
    bus: ServoBus,
    drive_ids: [u8; MODULE_COUNT],
    steer_ids: [u8; MODULE_COUNT],
    wheel_radius: f64,
    encoder_resolution: f64,
    // Multi-turn accumulation from the wrapping position counter.
    total_ticks: [i64; MODULE_COUNT],
    last_raw_position: [Option<u16>; MODULE_COUNT],
    last_samples: [WheelSample; MODULE_COUNT],
}

impl SerialDrive {
    pub fn connect(config: &DriveConfig) -> BusResult<Self> {
        info!("opening servo bus on {}", config.port);
        let bus = ServoBus::open(&config.port)?;
        let mut drive = Self {
            bus,
            drive_ids: config.drive_ids,
            steer_ids: config.steer_ids,
            wheel_radius: config.wheel_radius,
            encoder_resolution: config.encoder_resolution,
            total_ticks: [0; MODULE_COUNT],
            last_raw_position: [None; MODULE_COUNT],
            last_samples: [WheelSample::default(); MODULE_COUNT],
        };
        drive.initialize()?;
        Ok(drive)
    }

    /// Ping every servo, then torque-off, set modes, torque-on.
    fn initialize(&mut self) -> BusResult<()> {
        let all_ids: Vec<u8> = self.drive_ids.iter().chain(self.steer_ids.iter()).copied().collect();
        for &id in &all_ids {
            match self.bus.ping(id)? {
                true => debug!("servo {} responding", id),
                false => {
                    warn!("servo {} not responding to ping", id);
                    return Err(super::bus::BusError::Timeout { id });
                }
            }
        }
        for &id in &all_ids {
            self.bus.disable_torque(id)?;
        }
        for &id in &self.drive_ids {
            self.bus.set_operating_mode(id, OperatingMode::Velocity)?;
        }
        for &id in &self.steer_ids {
            self.bus.set_operating_mode(id, OperatingMode::Position)?;
        }
        for &id in &all_ids {
            self.bus.enable_torque(id)?;
        }
        info!("drive servos {:?} / steer servos {:?} initialized", self.drive_ids, self.steer_ids);
        Ok(())
    }

    fn write_commands(&mut self, commands: &[ModuleCommand; MODULE_COUNT]) -> BusResult<()> {
        let mut velocities = [(0u8, 0i16); MODULE_COUNT];
        for (i, (id, command)) in self.drive_ids.iter().zip(commands.iter()).enumerate() {
            let raw = (command.drive_output.clamp(-1.0, 1.0) * MAX_RAW_VELOCITY).round();
            velocities[i] = (*id, raw as i16);
        }
        self.bus.sync_write_i16(Register::GoalVelocity, &velocities)?;

        let mut positions = [(0u8, 0u16); MODULE_COUNT];
        for (i, (id, command)) in self.steer_ids.iter().zip(commands.iter()).enumerate() {
            positions[i] = (*id, steer_ticks(command.steer_angle, self.encoder_resolution));
        }
        self.bus.sync_write_u16(Register::GoalPosition, &positions)
    }

    fn stop(&mut self) -> BusResult<()> {
        let zeros: Vec<(u8, i16)> = self.drive_ids.iter().map(|&id| (id, 0)).collect();
        self.bus.sync_write_i16(Register::GoalVelocity, &zeros)
    }
}

impl DriveHardware for SerialDrive {
    fn apply(&mut self, commands: &[ModuleCommand; MODULE_COUNT]) {
        if let Err(e) = self.write_commands(commands) {
            warn!("dropped actuation write: {}", e);
        }
    }

    fn read_wheels(&mut self) -> [WheelSample; MODULE_COUNT] {
        for i in 0..MODULE_COUNT {
            let drive_read = self.bus.read_position_velocity(self.drive_ids[i]);
            let steer_read = self.bus.read_u16(self.steer_ids[i], Register::PresentPosition);
            match (drive_read, steer_read) {
                (Ok((position, _velocity)), Ok(steer_raw)) => {
                    if let Some(previous) = self.last_raw_position[i] {
                        self.total_ticks[i] +=
                            tick_delta(position, previous, self.encoder_resolution as i64);
                    }
                    self.last_raw_position[i] = Some(position);

                    let revolutions = self.total_ticks[i] as f64 / self.encoder_resolution;
                    let angle =
                        wrap_angle(steer_raw as f64 / self.encoder_resolution * TAU);
                    self.last_samples[i] = WheelSample {
                        distance: revolutions * TAU * self.wheel_radius,
                        angle,
                    };
                }
                (drive_result, steer_result) => {
                    if let Err(e) = drive_result {
                        warn!("wheel {}: drive feedback read failed: {}", i, e);
                    }
                    if let Err(e) = steer_result {
                        warn!("wheel {}: steer feedback read failed: {}", i, e);
                    }
                    // keep last known sample
                }
            }
        }
        self.last_samples
    }
}

impl Drop for SerialDrive {
    fn drop(&mut self) {
        // Leave the base stationary if the runtime goes down.
        if let Err(e) = self.stop() {
            warn!("failed to stop drive servos on shutdown: {}", e);
        }
    }
}

/// Map a steer angle onto the servo's position counter range.
fn steer_ticks(angle: f64, resolution: f64) -> u16 {
    let turns = angle.rem_euclid(TAU) / TAU;
    ((turns * resolution).round() as i64).rem_euclid(resolution as i64) as u16
}

/// Signed tick delta between wrapping position counter reads.
fn tick_delta(current: u16, previous: u16, resolution: i64) -> i64 {
    let half = resolution / 2;
    ((current as i64 - previous as i64 + half).rem_euclid(resolution)) - half
}
