// Drivetrain controller: owns the hardware, the kinematic model and the
// pose estimator, and runs the per-cycle drive/odometry contract.

use tracing::debug;

use super::hardware::{DriveHardware, ModuleCommand};
use super::kinematics::{BodyVelocity, MODULE_COUNT, SwerveKinematics, desaturate};
use super::odometry::{Odometry, Pose};
use crate::config::DriveConfig;

pub struct Drivetrain {
    hardware: Box<dyn DriveHardware>,
    kinematics: SwerveKinematics,
    odometry: Odometry,
    max_speed: f64,
    max_angular_speed: f64,
    field_relative: bool,
    // Last issued commands; also the reference the steer optimization
    // measures travel from.
    commands: [ModuleCommand; MODULE_COUNT],
}

impl Drivetrain {
    pub fn new(config: &DriveConfig, hardware: Box<dyn DriveHardware>) -> Self {
        Self {
            hardware,
            kinematics: SwerveKinematics::new(config.wheels),
            odometry: Odometry::new(config.wheels, Pose::default()),
            max_speed: config.max_speed,
            max_angular_speed: config.max_angular_speed,
            field_relative: config.field_relative,
            commands: [ModuleCommand::default(); MODULE_COUNT],
        }
    }

    /// Command a body velocity for this cycle.
    ///
    /// The velocity is interpreted in the field frame when the drivetrain is
    /// configured field-relative (rotated into the robot frame using the
    /// current heading estimate), run through kinematics and desaturation,
    /// and written to the modules fire-and-forget. Each steer target takes
    /// the shorter path from the previously commanded angle, reversing the
    /// wheel instead of swinging more than a quarter turn.
    pub fn drive(&mut self, forward: f64, strafe: f64, angular: f64) {
        let mut v = BodyVelocity::new(forward, strafe, angular);
        if self.field_relative {
            v = v.rotated(-self.odometry.pose().heading);
        }

        let states = desaturate(self.kinematics.to_module_states(v), self.max_speed);

        for (command, state) in self.commands.iter_mut().zip(states.iter()) {
            let optimized = state.optimize(command.steer_angle);
            command.drive_output = if self.max_speed > 0.0 {
                optimized.speed / self.max_speed
            } else {
                0.0
            };
            command.steer_angle = optimized.angle;
        }

        debug!("module commands: {:?}", self.commands);
        self.hardware.apply(&self.commands);
    }

    /// Normalized variant: all three axes in `[-1, 1]`, scaled by the
    /// configured maxima.
    pub fn drive_normalized(&mut self, x: f64, y: f64, r: f64) {
        self.drive(
            x.clamp(-1.0, 1.0) * self.max_speed,
            y.clamp(-1.0, 1.0) * self.max_speed,
            r.clamp(-1.0, 1.0) * self.max_angular_speed,
        );
    }

    /// Read fresh encoder samples and fold them into the pose estimate.
    pub fn update_odometry(&mut self) -> Pose {
        let samples = self.hardware.read_wheels();
        self.odometry.update(&samples)
    }

    /// Overwrite the pose estimate with externally known ground truth.
    /// The hardware is told as well, so a simulated backend stays aligned.
    pub fn reset_odometry(&mut self, pose: Pose) {
        self.odometry.reset(pose);
        self.hardware.on_pose_reset(pose);
    }

    /// Latest committed pose estimate; never blocks.
    pub fn estimated_position(&self) -> Pose {
        self.odometry.pose()
    }

    /// Advance the hardware by the nominal cycle period (simulation only;
    /// a no-op on the real base).
    pub fn step_hardware(&mut self, dt: f64) {
        self.hardware.step(dt);
    }

    pub fn gyro_heading(&mut self) -> Option<f64> {
        self.hardware.gyro_heading()
    }

    /// Last issued module commands, for telemetry.
    pub fn module_commands(&self) -> [ModuleCommand; MODULE_COUNT] {
        self.commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriveConfig;
    use crate::drive::odometry::WheelSample;
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::f64::consts::{FRAC_PI_2, PI};
    use std::rc::Rc;

    #[derive(Default)]
    struct Shared {
        applied: Vec<[ModuleCommand; MODULE_COUNT]>,
        samples: [WheelSample; MODULE_COUNT],
        reset_to: Option<Pose>,
    }

    struct MockHardware(Rc<RefCell<Shared>>);

    impl DriveHardware for MockHardware {
        fn apply(&mut self, commands: &[ModuleCommand; MODULE_COUNT]) {
            self.0.borrow_mut().applied.push(*commands);
        }

        fn read_wheels(&mut self) -> [WheelSample; MODULE_COUNT] {
            self.0.borrow().samples
        }

        fn on_pose_reset(&mut self, pose: Pose) {
            self.0.borrow_mut().reset_to = Some(pose);
        }
    }

    fn drivetrain() -> (Drivetrain, Rc<RefCell<Shared>>) {
        let shared = Rc::new(RefCell::new(Shared::default()));
        let config = DriveConfig::default();
        let drivetrain = Drivetrain::new(&config, Box::new(MockHardware(shared.clone())));
        (drivetrain, shared)
    }

    #[test]
    fn forward_drive_writes_normalized_outputs() {
        let (mut dt, shared) = drivetrain();
        dt.drive(1.0, 0.0, 0.0);
        let commands = *shared.borrow().applied.last().unwrap();
        for command in commands {
            // Default max speed is 3 m/s.
            assert_relative_eq!(command.drive_output, 1.0 / 3.0, epsilon = 1e-12);
            assert_relative_eq!(command.steer_angle, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn oversized_command_saturates_at_full_output() {
        let (mut dt, shared) = drivetrain();
        dt.drive(30.0, 0.0, 0.0);
        let commands = *shared.borrow().applied.last().unwrap();
        for command in commands {
            assert_relative_eq!(command.drive_output, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn reversal_flips_drive_direction_instead_of_steering_around() {
        let (mut dt, shared) = drivetrain();
        dt.drive(1.0, 0.0, 0.0);
        dt.drive(-1.0, 0.0, 0.0);
        let commands = *shared.borrow().applied.last().unwrap();
        for command in commands {
            // Wheels stay at zero and run backwards, never swing to pi.
            assert_relative_eq!(command.steer_angle, 0.0, epsilon = 1e-12);
            assert!(command.drive_output < 0.0);
        }
    }

    #[test]
    fn stop_command_keeps_wheel_headings() {
        let (mut dt, shared) = drivetrain();
        dt.drive(0.0, 1.0, 0.0);
        let moving = *shared.borrow().applied.last().unwrap();
        dt.drive(0.0, 0.0, 0.0);
        let stopped = *shared.borrow().applied.last().unwrap();
        for (before, after) in moving.iter().zip(stopped.iter()) {
            assert_eq!(after.drive_output, 0.0);
            assert_relative_eq!(after.steer_angle, before.steer_angle, epsilon = 1e-12);
        }
    }

    #[test]
    fn field_relative_command_follows_the_heading_estimate() {
        let (mut dt, shared) = drivetrain();
        dt.reset_odometry(Pose::new(0.0, 0.0, FRAC_PI_2));
        dt.drive(1.0, 0.0, 0.0);
        let commands = *shared.borrow().applied.last().unwrap();
        for command in commands {
            // Field +x while facing +y is a strafe to the robot's right.
            assert_relative_eq!(command.steer_angle.abs(), FRAC_PI_2, epsilon = 1e-9);
        }
    }

    #[test]
    fn robot_relative_mode_skips_the_rotation() {
        let shared = Rc::new(RefCell::new(Shared::default()));
        let config = DriveConfig { field_relative: false, ..DriveConfig::default() };
        let mut dt = Drivetrain::new(&config, Box::new(MockHardware(shared.clone())));
        dt.reset_odometry(Pose::new(0.0, 0.0, FRAC_PI_2));
        dt.drive(1.0, 0.0, 0.0);
        let commands = *shared.borrow().applied.last().unwrap();
        for command in commands {
            assert_relative_eq!(command.steer_angle, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn drive_normalized_scales_by_configured_maxima() {
        let (mut dt, shared) = drivetrain();
        dt.drive_normalized(0.5, 0.0, 0.0);
        let commands = *shared.borrow().applied.last().unwrap();
        for command in commands {
            assert_relative_eq!(command.drive_output, 0.5, epsilon = 1e-12);
        }
        // Out-of-range input clamps rather than over-driving.
        dt.drive_normalized(5.0, 0.0, 0.0);
        let commands = *shared.borrow().applied.last().unwrap();
        for command in commands {
            assert_relative_eq!(command.drive_output, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn odometry_reset_reaches_the_hardware() {
        let (mut dt, shared) = drivetrain();
        let pose = Pose::new(5.0, 5.0, PI / 4.0);
        dt.reset_odometry(pose);
        assert_eq!(dt.estimated_position(), pose);
        assert_eq!(shared.borrow().reset_to, Some(pose));
    }

    #[test]
    fn update_odometry_consumes_hardware_samples() {
        let (mut dt, shared) = drivetrain();
        shared.borrow_mut().samples = [WheelSample::new(0.0, 0.0); MODULE_COUNT];
        dt.update_odometry();
        shared.borrow_mut().samples = [WheelSample::new(2.0, 0.0); MODULE_COUNT];
        let pose = dt.update_odometry();
        assert_relative_eq!(pose.x, 2.0, epsilon = 1e-9);
        assert_relative_eq!(pose.y, 0.0, epsilon = 1e-9);
    }
}
