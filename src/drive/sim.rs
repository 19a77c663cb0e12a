// Physics-backed drive hardware for running without a robot.
//
// Each cycle the runtime steps the model by exactly the nominal period
// (never measured wall-clock time), then reads back synthetic encoder and
// gyro values exactly as it would from the real base. Fixed inputs and a
// fixed step make every run reproducible.

use std::f64::consts::PI;

use tracing::info;

use super::hardware::{DriveHardware, ModuleCommand};
use super::kinematics::{
    MODULE_COUNT, ModuleState, WheelGeometry, body_velocity_from_modules, wrap_angle,
};
use super::odometry::{Pose, WheelSample};
use super::pid::Pid;
use crate::config::DriveConfig;

/// First-order lag of the drive wheel speed toward its command, seconds.
const DRIVE_TIME_CONSTANT: f64 = 0.1;

/// Hard cap on how fast the steer servo model can slew, rad/s.
const STEER_RATE_LIMIT: f64 = 3.0 * PI;

pub struct SimulatedDrive {
    wheels: [WheelGeometry; MODULE_COUNT],
    max_speed: f64,
    commands: [ModuleCommand; MODULE_COUNT],
    wheel_speed: [f64; MODULE_COUNT],
    steer_angle: [f64; MODULE_COUNT],
    steer_servo: [Pid; MODULE_COUNT],
    distance: [f64; MODULE_COUNT],
    // Ground-truth pose, also reported as the synthetic gyro.
    pose: Pose,
}

impl SimulatedDrive {
    pub fn new(config: &DriveConfig) -> Self {
        info!("running against simulated drive hardware");
        let gains = config.steer_pid;
        Self {
            wheels: config.wheels,
            max_speed: config.max_speed,
            commands: [ModuleCommand::default(); MODULE_COUNT],
            wheel_speed: [0.0; MODULE_COUNT],
            steer_angle: [0.0; MODULE_COUNT],
            steer_servo: [Pid::new(gains.kp, gains.ki, gains.kd); MODULE_COUNT],
            distance: [0.0; MODULE_COUNT],
            pose: Pose::default(),
        }
    }

    /// Ground-truth pose of the model (test hook).
    pub fn true_pose(&self) -> Pose {
        self.pose
    }
}

impl DriveHardware for SimulatedDrive {
    fn apply(&mut self, commands: &[ModuleCommand; MODULE_COUNT]) {
        self.commands = *commands;
    }

    fn read_wheels(&mut self) -> [WheelSample; MODULE_COUNT] {
        let mut samples = [WheelSample::default(); MODULE_COUNT];
        for i in 0..MODULE_COUNT {
            samples[i] = WheelSample::new(self.distance[i], self.steer_angle[i]);
        }
        samples
    }

    fn gyro_heading(&mut self) -> Option<f64> {
        Some(self.pose.heading)
    }

    fn on_pose_reset(&mut self, pose: Pose) {
        self.pose = pose;
    }

    fn step(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let lag = dt / (dt + DRIVE_TIME_CONSTANT);

        let mut states = [ModuleState::default(); MODULE_COUNT];
        for i in 0..MODULE_COUNT {
            let target_speed = self.commands[i].drive_output.clamp(-1.0, 1.0) * self.max_speed;
            self.wheel_speed[i] += (target_speed - self.wheel_speed[i]) * lag;

            let error = wrap_angle(self.commands[i].steer_angle - self.steer_angle[i]);
            let rate = self.steer_servo[i]
                .update(error, dt)
                .clamp(-STEER_RATE_LIMIT, STEER_RATE_LIMIT);
            self.steer_angle[i] = wrap_angle(self.steer_angle[i] + rate * dt);

            self.distance[i] += self.wheel_speed[i] * dt;
            states[i] = ModuleState { speed: self.wheel_speed[i], angle: self.steer_angle[i] };
        }

        let twist = body_velocity_from_modules(&self.wheels, &states);
        let dtheta = twist.angular * dt;
        let (sin_h, cos_h) = (self.pose.heading + dtheta / 2.0).sin_cos();
        self.pose.x += (twist.forward * cos_h - twist.strafe * sin_h) * dt;
        self.pose.y += (twist.forward * sin_h + twist.strafe * cos_h) * dt;
        self.pose.heading = wrap_angle(self.pose.heading + dtheta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriveConfig;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    const PERIOD: f64 = 0.02;

    fn sim() -> SimulatedDrive {
        SimulatedDrive::new(&DriveConfig::default())
    }

    fn forward_commands() -> [ModuleCommand; MODULE_COUNT] {
        [ModuleCommand { drive_output: 1.0, steer_angle: 0.0 }; MODULE_COUNT]
    }

    #[test]
    fn forward_command_advances_the_pose() {
        let mut sim = sim();
        sim.apply(&forward_commands());
        for _ in 0..100 {
            sim.step(PERIOD);
        }
        let pose = sim.true_pose();
        assert!(pose.x > 0.5, "expected forward travel, got {:?}", pose);
        assert_relative_eq!(pose.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.heading, 0.0, epsilon = 1e-9);

        // Encoders saw the same travel the pose did.
        let samples = sim.read_wheels();
        for sample in samples {
            assert_relative_eq!(sample.distance, pose.x, epsilon = 1e-9);
        }
    }

    #[test]
    fn fixed_step_runs_are_reproducible() {
        let run = || {
            let mut sim = sim();
            sim.apply(&forward_commands());
            for _ in 0..25 {
                sim.step(PERIOD);
            }
            sim.apply(&[ModuleCommand { drive_output: 0.3, steer_angle: 1.0 }; MODULE_COUNT]);
            for _ in 0..25 {
                sim.step(PERIOD);
            }
            (sim.true_pose(), sim.read_wheels())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn steer_servo_converges_on_target() {
        let mut sim = sim();
        sim.apply(&[ModuleCommand { drive_output: 0.0, steer_angle: FRAC_PI_2 }; MODULE_COUNT]);
        for _ in 0..250 {
            sim.step(PERIOD);
        }
        for sample in sim.read_wheels() {
            assert_relative_eq!(sample.angle, FRAC_PI_2, epsilon = 0.05);
        }
    }

    #[test]
    fn pose_reset_regrounds_the_model() {
        let mut sim = sim();
        sim.apply(&forward_commands());
        for _ in 0..50 {
            sim.step(PERIOD);
        }
        let target = Pose::new(1.0, 2.0, 0.5);
        sim.on_pose_reset(target);
        assert_eq!(sim.true_pose(), target);
        assert_eq!(sim.gyro_heading(), Some(0.5));
    }
}
