// Swerve drive kinematics for a four-module base.
// Converts body-frame velocities (forward, strafe, angular) to per-module
// wheel speed/angle targets, and back.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Number of swerve modules on the base.
pub const MODULE_COUNT: usize = 4;

/// Wrap an angle into `(-pi, pi]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

/// Fixed position of a wheel relative to the base's rotation center, meters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelGeometry {
    pub offset_x: f64,
    pub offset_y: f64,
}

impl WheelGeometry {
    pub fn new(offset_x: f64, offset_y: f64) -> Self {
        Self { offset_x, offset_y }
    }
}

/// Commanded base velocity in its own frame.
///
/// `forward` and `strafe` in m/s (strafe positive = left), `angular` in
/// rad/s (positive = counter-clockwise).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyVelocity {
    pub forward: f64,
    pub strafe: f64,
    pub angular: f64,
}

impl BodyVelocity {
    pub fn new(forward: f64, strafe: f64, angular: f64) -> Self {
        Self { forward, strafe, angular }
    }

    pub fn is_zero(&self) -> bool {
        self.forward == 0.0 && self.strafe == 0.0 && self.angular == 0.0
    }

    /// Rotate the linear part by `angle` radians; the angular rate is
    /// frame-independent. Pass the negated heading to map a field-frame
    /// command into the robot frame.
    pub fn rotated(self, angle: f64) -> Self {
        let (sin_a, cos_a) = angle.sin_cos();
        Self {
            forward: self.forward * cos_a - self.strafe * sin_a,
            strafe: self.forward * sin_a + self.strafe * cos_a,
            angular: self.angular,
        }
    }
}

/// Target state of one module: signed wheel speed in m/s and steer angle in
/// radians, wrapped to `(-pi, pi]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModuleState {
    pub speed: f64,
    pub angle: f64,
}

impl ModuleState {
    pub fn new(speed: f64, angle: f64) -> Self {
        Self { speed, angle: wrap_angle(angle) }
    }

    /// Choose the shorter steering path from `current_angle`.
    ///
    /// A target more than 90 degrees away is reached faster by flipping the
    /// wheel heading by pi and reversing the drive direction.
    #[must_use]
    pub fn optimize(self, current_angle: f64) -> Self {
        let error = wrap_angle(self.angle - current_angle);
        if error.abs() > FRAC_PI_2 {
            Self {
                speed: -self.speed,
                angle: wrap_angle(self.angle + PI),
            }
        } else {
            self
        }
    }
}

/// Uniformly rescale wheel speeds so none exceeds `max_speed`.
///
/// Relative speed ratios between modules are preserved exactly; angles are
/// untouched. An all-zero set passes through unchanged.
#[must_use]
pub fn desaturate(mut states: [ModuleState; MODULE_COUNT], max_speed: f64) -> [ModuleState; MODULE_COUNT] {
    let top = states.iter().map(|s| s.speed.abs()).fold(0.0, f64::max);
    if top > max_speed && top > 0.0 {
        let scale = max_speed / top;
        for state in &mut states {
            state.speed *= scale;
        }
    }
    states
}

/// Kinematic model of the four-module base.
///
/// Holds the last produced module states so a zero-velocity command keeps
/// each wheel at its previous heading instead of snapping to zero, which
/// would make stopped wheels chatter.
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    wheels: [WheelGeometry; MODULE_COUNT],
    prev_states: [ModuleState; MODULE_COUNT],
}

impl SwerveKinematics {
    pub fn new(wheels: [WheelGeometry; MODULE_COUNT]) -> Self {
        Self {
            wheels,
            prev_states: [ModuleState::default(); MODULE_COUNT],
        }
    }

    pub fn wheels(&self) -> &[WheelGeometry; MODULE_COUNT] {
        &self.wheels
    }

    /// Forward kinematics: body velocity to four module states.
    ///
    /// Each wheel's velocity vector is the body's linear velocity plus the
    /// angular rate crossed with the wheel's offset. A wheel whose resulting
    /// speed is zero holds its previous angle (atan2 of a zero vector is
    /// undefined).
    pub fn to_module_states(&mut self, v: BodyVelocity) -> [ModuleState; MODULE_COUNT] {
        let mut states = self.prev_states;

        for (i, wheel) in self.wheels.iter().enumerate() {
            let vx = v.forward - v.angular * wheel.offset_y;
            let vy = v.strafe + v.angular * wheel.offset_x;
            let speed = vx.hypot(vy);
            if speed > 0.0 {
                states[i] = ModuleState { speed, angle: vy.atan2(vx) };
            } else {
                states[i].speed = 0.0;
            }
        }

        self.prev_states = states;
        states
    }

    /// Inverse kinematics: module states back to a body velocity.
    ///
    /// Least-squares solve of the eight wheel-velocity equations for the
    /// three body unknowns. Round-trips `to_module_states` output within
    /// floating-point tolerance when no desaturation was applied.
    pub fn to_body_velocity(&self, states: &[ModuleState; MODULE_COUNT]) -> BodyVelocity {
        body_velocity_from_modules(&self.wheels, states)
    }
}

/// Least-squares reduction of four module states to a body velocity.
///
/// Normal equations of `vx_i = f - w*oy_i`, `vy_i = s + w*ox_i` in the
/// unknowns `(f, s, w)`, solved with Cramer's rule.
pub fn body_velocity_from_modules(
    wheels: &[WheelGeometry; MODULE_COUNT],
    states: &[ModuleState; MODULE_COUNT],
) -> BodyVelocity {
    let n = MODULE_COUNT as f64;
    let mut svx = 0.0;
    let mut svy = 0.0;
    let mut sox = 0.0;
    let mut soy = 0.0;
    let mut soo = 0.0;
    let mut scross = 0.0;

    for (wheel, state) in wheels.iter().zip(states.iter()) {
        let (sin_a, cos_a) = state.angle.sin_cos();
        let vx = state.speed * cos_a;
        let vy = state.speed * sin_a;
        svx += vx;
        svy += vy;
        sox += wheel.offset_x;
        soy += wheel.offset_y;
        soo += wheel.offset_x * wheel.offset_x + wheel.offset_y * wheel.offset_y;
        scross += wheel.offset_x * vy - wheel.offset_y * vx;
    }

    let a = [[n, 0.0, -soy], [0.0, n, sox], [-soy, sox, soo]];
    match solve3(a, [svx, svy, scross]) {
        Some([forward, strafe, angular]) => BodyVelocity { forward, strafe, angular },
        // Degenerate geometry (all offsets at the center): rotation is
        // unobservable, fall back to the mean translation.
        None => BodyVelocity {
            forward: svx / n,
            strafe: svy / n,
            angular: 0.0,
        },
    }
}

fn det3(m: [[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn solve3(a: [[f64; 3]; 3], b: [f64; 3]) -> Option<[f64; 3]> {
    let det = det3(a);
    if det.abs() < 1e-12 {
        return None;
    }
    let mut out = [0.0; 3];
    for col in 0..3 {
        let mut replaced = a;
        for row in 0..3 {
            replaced[row][col] = b[row];
        }
        out[col] = det3(replaced) / det;
    }
    Some(out)
}
