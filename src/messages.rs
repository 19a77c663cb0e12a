// Wire types exchanged over zenoh.

use serde::{Deserialize, Serialize};

use crate::drive::hardware::ModuleCommand;
use crate::drive::kinematics::MODULE_COUNT;
use crate::drive::odometry::Pose;

/// Command from teleop/scripts -> runtime: normalized axes in `[-1, 1]`
/// (forward, strafe-left, rotate counter-clockwise).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BaseCommand {
    pub x: f64,
    pub y: f64,
    pub r: f64,
}

impl BaseCommand {
    pub fn axes(&self) -> [f64; 3] {
        [self.x, self.y, self.r]
    }
}

/// Current pose estimate, field frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct PoseTelemetry {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl From<Pose> for PoseTelemetry {
    fn from(pose: Pose) -> Self {
        Self { x: pose.x, y: pose.y, heading: pose.heading }
    }
}

/// One module's last issued command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ModuleTelemetry {
    pub drive_output: f64,
    pub steer_angle: f64,
}

impl From<ModuleCommand> for ModuleTelemetry {
    fn from(command: ModuleCommand) -> Self {
        Self {
            drive_output: command.drive_output,
            steer_angle: command.steer_angle,
        }
    }
}

/// Telemetry record published once per cycle.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DrivetrainTelemetry {
    pub pose: PoseTelemetry,
    pub modules: [ModuleTelemetry; MODULE_COUNT],
    /// Synthetic gyro heading when running simulated, absent on a real base.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gyro_heading: Option<f64>,
}

/// Health status published by the runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}
