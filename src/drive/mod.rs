// Drivetrain core for the four-module swerve base.
//
// Provides:
// - Forward/inverse swerve kinematics and wheel speed desaturation
// - Dead-reckoning odometry with external reset
// - Stick input shaping (skew curve + slew limiting)
// - The drivetrain controller and its hardware backends (serial bus, sim)

pub mod bus;
pub mod controller;
pub mod hardware;
pub mod kinematics;
pub mod odometry;
pub mod pid;
pub mod shaping;
pub mod sim;

pub use controller::Drivetrain;
pub use hardware::{DriveHardware, ModuleCommand, SerialDrive};
pub use kinematics::{BodyVelocity, ModuleState, SwerveKinematics, WheelGeometry, desaturate};
pub use odometry::{Odometry, Pose, WheelSample};
pub use sim::SimulatedDrive;
