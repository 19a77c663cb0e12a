// Topics, defaults, and the (category, key) configuration store.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::drive::kinematics::{MODULE_COUNT, WheelGeometry};

// Zenoh topics
pub const TOPIC_CMD_BASE: &str = "swerve/cmd/base"; // normalized axis commands
pub const TOPIC_POSE: &str = "swerve/state/pose"; // pose + module telemetry
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

/// Category/key lookup over a JSON document.
///
/// Lookups never fail: a missing file, a missing key, or a value of the
/// wrong type all yield the caller-supplied default. Keys may be dotted to
/// traverse nested objects (`number("drivetrain", "steer_pid.kp", ..)`).
#[derive(Debug, Default)]
pub struct Config {
    root: Value,
}

impl Config {
    /// Read a configuration file. Any problem leaves every lookup on its
    /// default and is reported once, here.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!("config {} unreadable ({}); using defaults", path.display(), e);
                return Self::default();
            }
        };
        match serde_json::from_str(&text) {
            Ok(root) => Self { root },
            Err(e) => {
                warn!("config {} is not valid JSON ({}); using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    fn lookup(&self, category: &str, key: &str) -> Option<&Value> {
        let mut node = self.root.get(category)?;
        for part in key.split('.') {
            node = if let Some(child) = node.get(part) {
                child
            } else {
                // Numeric parts index into arrays ("drive_ids.0").
                let index: usize = part.parse().ok()?;
                node.get(index)?
            };
        }
        Some(node)
    }

    pub fn number(&self, category: &str, key: &str, default: f64) -> f64 {
        self.lookup(category, key)
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }

    pub fn integer(&self, category: &str, key: &str, default: i64) -> i64 {
        self.lookup(category, key)
            .and_then(Value::as_i64)
            .unwrap_or(default)
    }

    pub fn boolean(&self, category: &str, key: &str, default: bool) -> bool {
        self.lookup(category, key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn string(&self, category: &str, key: &str, default: &str) -> String {
        self.lookup(category, key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// Everything the drivetrain needs, gathered once at construction.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub max_speed: f64,         // m/s
    pub max_angular_speed: f64, // rad/s
    pub wheel_radius: f64,      // m
    pub encoder_resolution: f64,
    pub field_relative: bool,
    pub wheels: [WheelGeometry; MODULE_COUNT],
    pub steer_pid: PidGains,
    pub skew_factor: f64,
    pub slew_rate: f64, // normalized units per second
    pub period: Duration,
    pub stale_timeout: Duration,
    pub port: String,
    pub drive_ids: [u8; MODULE_COUNT],
    pub steer_ids: [u8; MODULE_COUNT],
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            max_speed: 3.0,
            max_angular_speed: std::f64::consts::PI,
            wheel_radius: 0.05,
            encoder_resolution: 4096.0,
            field_relative: true,
            wheels: [
                WheelGeometry::new(0.3, 0.3),   // front left
                WheelGeometry::new(0.3, -0.3),  // front right
                WheelGeometry::new(-0.3, 0.3),  // rear left
                WheelGeometry::new(-0.3, -0.3), // rear right
            ],
            steer_pid: PidGains { kp: 8.0, ki: 0.0, kd: 0.1 },
            skew_factor: 0.4,
            slew_rate: 3.0, // 1/3 s from rest to full
            period: Duration::from_millis(20),
            stale_timeout: Duration::from_millis(250),
            port: "/dev/ttyACM0".to_string(),
            drive_ids: [1, 2, 3, 4],
            steer_ids: [5, 6, 7, 8],
        }
    }
}

impl DriveConfig {
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();

        let wheel = |prefix: &str, fallback: WheelGeometry| {
            WheelGeometry::new(
                config.number(
                    "drivetrain",
                    &format!("wheel_positions.{prefix}_x"),
                    fallback.offset_x,
                ),
                config.number(
                    "drivetrain",
                    &format!("wheel_positions.{prefix}_y"),
                    fallback.offset_y,
                ),
            )
        };

        let id_list = |category: &str, key: &str, fallback: [u8; MODULE_COUNT]| {
            let mut ids = fallback;
            for (i, id) in ids.iter_mut().enumerate() {
                *id = config.integer(category, &format!("{key}.{i}"), *id as i64) as u8;
            }
            ids
        };

        Self {
            max_speed: config.number("drivetrain", "max_speed", defaults.max_speed),
            max_angular_speed: config.number(
                "drivetrain",
                "max_angular_speed",
                defaults.max_angular_speed,
            ),
            wheel_radius: config.number("drivetrain", "wheel_radius", defaults.wheel_radius),
            encoder_resolution: config.number(
                "drivetrain",
                "encoder_resolution",
                defaults.encoder_resolution,
            ),
            field_relative: config.boolean("drivetrain", "field_relative", defaults.field_relative),
            wheels: [
                wheel("front_left", defaults.wheels[0]),
                wheel("front_right", defaults.wheels[1]),
                wheel("rear_left", defaults.wheels[2]),
                wheel("rear_right", defaults.wheels[3]),
            ],
            steer_pid: PidGains {
                kp: config.number("drivetrain", "steer_pid.kp", defaults.steer_pid.kp),
                ki: config.number("drivetrain", "steer_pid.ki", defaults.steer_pid.ki),
                kd: config.number("drivetrain", "steer_pid.kd", defaults.steer_pid.kd),
            },
            skew_factor: config.number("gamepad", "skew_factor", defaults.skew_factor),
            slew_rate: config.number("gamepad", "slew_rate", defaults.slew_rate),
            period: Duration::from_millis(
                config.integer("engine", "period", defaults.period.as_millis() as i64) as u64,
            ),
            stale_timeout: Duration::from_millis(config.integer(
                "engine",
                "stale_timeout",
                defaults.stale_timeout.as_millis() as i64,
            ) as u64),
            port: config.string("motor", "port", &defaults.port),
            drive_ids: id_list("motor", "drive_ids", defaults.drive_ids),
            steer_ids: id_list("motor", "steer_ids", defaults.steer_ids),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_keys_yield_the_callers_default() {
        let config = Config::default();
        assert_eq!(config.number("drivetrain", "max_speed", 1001.0), 1001.0);
        assert_eq!(config.number("fake", "alsofake", -1002.0), -1002.0);
        assert_eq!(config.integer("engine", "period", 20), 20);
        assert!(config.boolean("drivetrain", "field_relative", true));
        assert_eq!(config.string("motor", "port", "/dev/null"), "/dev/null");
    }

    #[test]
    fn dotted_keys_traverse_nested_objects() {
        let config = Config::from_value(json!({
            "drivetrain": {
                "steer_pid": { "kp": 2.5 },
                "wheel_positions": { "front_left_x": 0.25 }
            }
        }));
        assert_eq!(config.number("drivetrain", "steer_pid.kp", 0.0), 2.5);
        assert_eq!(config.number("drivetrain", "wheel_positions.front_left_x", 0.0), 0.25);
        assert_eq!(config.number("drivetrain", "steer_pid.kd", 0.7), 0.7);
    }

    #[test]
    fn mistyped_values_fall_back_to_the_default() {
        let config = Config::from_value(json!({
            "drivetrain": { "max_speed": "fast" }
        }));
        assert_eq!(config.number("drivetrain", "max_speed", 3.0), 3.0);
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let config = Config::load(Path::new("/nonexistent/robot.json"));
        assert_eq!(config.number("drivetrain", "max_speed", 3.0), 3.0);
    }

    #[test]
    fn drive_config_reads_the_drivetrain_block() {
        let config = Config::from_value(json!({
            "drivetrain": {
                "max_speed": 4.5,
                "field_relative": false,
                "wheel_positions": {
                    "front_left_x": 0.25, "front_left_y": 0.2,
                    "rear_right_x": -0.25, "rear_right_y": -0.2
                }
            },
            "gamepad": { "skew_factor": 0.8 },
            "engine": { "period": 10 },
            "motor": { "drive_ids": [11, 12] }
        }));
        let drive = DriveConfig::from_config(&config);
        assert_eq!(drive.max_speed, 4.5);
        assert!(!drive.field_relative);
        assert_eq!(drive.wheels[0], WheelGeometry::new(0.25, 0.2));
        assert_eq!(drive.wheels[3], WheelGeometry::new(-0.25, -0.2));
        // Unspecified wheels keep their defaults.
        assert_eq!(drive.wheels[1], WheelGeometry::new(0.3, -0.3));
        assert_eq!(drive.skew_factor, 0.8);
        assert_eq!(drive.period, Duration::from_millis(10));
        assert_eq!(drive.drive_ids, [11, 12, 3, 4]);
        assert_eq!(drive.steer_ids, [5, 6, 7, 8]);
    }

    #[test]
    fn skew_factor_default_is_in_range() {
        let drive = DriveConfig::default();
        assert!((0.0..=1.0).contains(&drive.skew_factor));
    }
}
