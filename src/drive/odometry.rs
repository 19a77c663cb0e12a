// Dead-reckoning pose estimation from per-wheel encoder samples.

use tracing::warn;

use super::kinematics::{
    MODULE_COUNT, ModuleState, WheelGeometry, body_velocity_from_modules, wrap_angle,
};

/// Field pose of the base: position in meters, heading in radians wrapped to
/// `(-pi, pi]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading: wrap_angle(heading) }
    }
}

/// One wheel's encoder reading: cumulative travel of the drive wheel in
/// meters and the module's steer angle in radians. Read fresh every cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelSample {
    pub distance: f64,
    pub angle: f64,
}

impl WheelSample {
    pub fn new(distance: f64, angle: f64) -> Self {
        Self { distance, angle }
    }

    fn is_finite(&self) -> bool {
        self.distance.is_finite() && self.angle.is_finite()
    }
}

/// Integrates wheel displacement deltas into a running field pose.
///
/// The caller feeds one fresh sample set per cycle, strictly in order;
/// duplicate or out-of-order sample sets are a caller error and are not
/// detected here. Non-finite samples are rejected and leave the previous
/// estimate in place.
#[derive(Debug)]
pub struct Odometry {
    wheels: [WheelGeometry; MODULE_COUNT],
    pose: Pose,
    prev: Option<[WheelSample; MODULE_COUNT]>,
}

impl Odometry {
    pub fn new(wheels: [WheelGeometry; MODULE_COUNT], initial: Pose) -> Self {
        Self { wheels, pose: initial, prev: None }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Overwrite the estimate unconditionally.
    ///
    /// The encoder baseline is kept: encoders keep counting across a reset,
    /// so the next update integrates only motion after the reset.
    pub fn reset(&mut self, pose: Pose) {
        self.pose = pose;
    }

    /// Consume one sample set and return the updated estimate.
    ///
    /// Each wheel's displacement since the previous set, pointed along the
    /// midpoint of its previous and current steer angle, is reduced to a
    /// body-frame displacement through the inverse kinematic solve, then
    /// rotated into the field frame at the midpoint heading. Midpoint
    /// integration on both levels keeps drift well below naive Euler.
    pub fn update(&mut self, samples: &[WheelSample; MODULE_COUNT]) -> Pose {
        if samples.iter().any(|s| !s.is_finite()) {
            warn!("discarding non-finite encoder sample set: {:?}", samples);
            return self.pose;
        }

        let Some(prev) = self.prev else {
            // First sample set only establishes the baseline.
            self.prev = Some(*samples);
            return self.pose;
        };

        let mut deltas = [ModuleState::default(); MODULE_COUNT];
        for (i, (old, new)) in prev.iter().zip(samples.iter()).enumerate() {
            let half_turn = wrap_angle(new.angle - old.angle) / 2.0;
            deltas[i] = ModuleState {
                speed: new.distance - old.distance,
                angle: wrap_angle(old.angle + half_turn),
            };
        }

        // Displacements run through the same least-squares reduction as
        // velocities; over one cycle the two differ only by the factor dt.
        let twist = body_velocity_from_modules(&self.wheels, &deltas);

        let mid_heading = self.pose.heading + twist.angular / 2.0;
        let (sin_h, cos_h) = mid_heading.sin_cos();
        self.pose.x += twist.forward * cos_h - twist.strafe * sin_h;
        self.pose.y += twist.forward * sin_h + twist.strafe * cos_h;
        self.pose.heading = wrap_angle(self.pose.heading + twist.angular);

        self.prev = Some(*samples);
        self.pose
    }
}
