//! Controller configuration: parameter surface, validation and frame-id
//! composition.

use std::{path::PathBuf, time::Duration};

use config::Config;
use serde::Deserialize;
use thiserror::Error;
use tracing::*;

use crate::{kinematics::Geometry, odometry::FeedbackMode, speed_limiter::TwistLimits};

pub const WHEEL_COUNT: usize = 4;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("expected {WHEEL_COUNT} wheel names in order front_left, front_right, rear_left, rear_right but got {0}")]
    WrongWheelCount(usize),
    #[error("wheel name at index {0} is empty")]
    EmptyWheelName(usize),
    #[error("wheel radius must be positive, got {0}")]
    InvalidWheelRadius(f64),
    #[error("wheel separation {axis} must be non-negative, got {value}")]
    NegativeWheelSeparation { axis: &'static str, value: f64 },
    #[error("both wheel separations are zero, angular odometry is unobservable")]
    ZeroSeparationSum,
    #[error("command timeout must be non-negative, got {0}")]
    InvalidCommandTimeout(f64),
    #[error("limiter bounds for {0} have the wrong sign")]
    InvalidLimiterSigns(&'static str),
}

/// Full parameter surface of the controller. Immutable once configured.
#[derive(Deserialize, Debug, Clone)]
pub struct ControllerConfig {
    /// exactly four, order front_left, front_right, rear_left, rear_right
    pub wheel_names: Vec<String>,
    pub wheel_radius: f64,
    #[serde(default)]
    pub wheel_separation_x: f64,
    #[serde(default)]
    pub wheel_separation_y: f64,
    /// true reads cumulative wheel angles, false reads wheel velocities
    #[serde(default = "default_position_feedback")]
    pub position_feedback: bool,
    /// seconds after which the last received command is considered stale
    #[serde(default = "default_command_timeout")]
    pub command_timeout: f64,
    #[serde(default)]
    pub limits: TwistLimits,
    #[serde(default = "default_odom_frame_id")]
    pub odom_frame_id: String,
    #[serde(default = "default_base_frame_id")]
    pub base_frame_id: String,
    #[serde(default)]
    pub tf_frame_prefix_enable: bool,
    #[serde(default)]
    pub tf_frame_prefix: String,
    /// namespace of the hosting node, used as a frame prefix fallback
    #[serde(default)]
    pub namespace: String,
}

fn default_position_feedback() -> bool {
    true
}

fn default_command_timeout() -> f64 {
    0.5
}

fn default_odom_frame_id() -> String {
    "odom".to_owned()
}

fn default_base_frame_id() -> String {
    "base_link".to_owned()
}

impl ControllerConfig {
    /// Load from a YAML file with `APP_*` environment overrides
    pub fn load(config: &Option<PathBuf>) -> anyhow::Result<Self> {
        let settings = if let Some(config) = config {
            info!("Using configuration from {:?}", config);
            Config::builder()
                .add_source(config::Environment::with_prefix("APP"))
                .add_source(config::File::with_name(
                    config
                        .to_str()
                        .ok_or_else(|| anyhow::anyhow!("Failed to convert path"))?,
                ))
                .build()?
        } else {
            info!("Using default configuration");
            Config::builder()
                .add_source(config::Environment::with_prefix("APP"))
                .add_source(config::File::with_name("config/settings"))
                .build()?
        };

        Ok(settings.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wheel_names.len() != WHEEL_COUNT {
            return Err(ConfigError::WrongWheelCount(self.wheel_names.len()));
        }
        if let Some(index) = self.wheel_names.iter().position(|name| name.is_empty()) {
            return Err(ConfigError::EmptyWheelName(index));
        }
        if self.wheel_radius <= 0.0 {
            return Err(ConfigError::InvalidWheelRadius(self.wheel_radius));
        }
        if self.wheel_separation_x < 0.0 {
            return Err(ConfigError::NegativeWheelSeparation {
                axis: "x",
                value: self.wheel_separation_x,
            });
        }
        if self.wheel_separation_y < 0.0 {
            return Err(ConfigError::NegativeWheelSeparation {
                axis: "y",
                value: self.wheel_separation_y,
            });
        }
        if self.wheel_separation_x + self.wheel_separation_y == 0.0 {
            return Err(ConfigError::ZeroSeparationSum);
        }
        if self.command_timeout < 0.0 {
            return Err(ConfigError::InvalidCommandTimeout(self.command_timeout));
        }
        for (axis, limits) in [
            ("linear_x", &self.limits.linear_x),
            ("linear_y", &self.limits.linear_y),
            ("angular_z", &self.limits.angular_z),
        ] {
            if !limits.signs_valid() {
                return Err(ConfigError::InvalidLimiterSigns(axis));
            }
        }
        Ok(())
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            wheel_radius: self.wheel_radius,
            wheel_separation_x: self.wheel_separation_x,
            wheel_separation_y: self.wheel_separation_y,
        }
    }

    pub fn feedback_mode(&self) -> FeedbackMode {
        if self.position_feedback {
            FeedbackMode::Position
        } else {
            FeedbackMode::Velocity
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.command_timeout)
    }

    /// Compose a frame id with the configured prefix rule.
    ///
    /// When prefixing is enabled a non-blank `tf_frame_prefix` wins,
    /// otherwise the namespace is used. A blank effective prefix leaves the
    /// frame untouched.
    pub fn prefixed_frame_id(&self, frame_id: &str) -> String {
        if !self.tf_frame_prefix_enable {
            return frame_id.to_owned();
        }
        let prefix = if self.tf_frame_prefix.is_empty() {
            self.namespace.trim_start_matches('/')
        } else {
            &self.tf_frame_prefix
        };
        if prefix.is_empty() {
            frame_id.to_owned()
        } else {
            format!("{}/{}", prefix, frame_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static DEFAULT_CONFIG: &str = include_str!("../config/settings.yaml");

    fn test_config() -> ControllerConfig {
        ControllerConfig {
            wheel_names: vec![
                "front_left_wheel".to_owned(),
                "front_right_wheel".to_owned(),
                "rear_left_wheel".to_owned(),
                "rear_right_wheel".to_owned(),
            ],
            wheel_radius: 0.1,
            wheel_separation_x: 1.0,
            wheel_separation_y: 1.0,
            position_feedback: true,
            command_timeout: 0.5,
            limits: TwistLimits::default(),
            odom_frame_id: "odom".to_owned(),
            base_frame_id: "base_link".to_owned(),
            tf_frame_prefix_enable: false,
            tf_frame_prefix: String::new(),
            namespace: String::new(),
        }
    }

    #[test]
    fn default_config_file_parses_and_validates() {
        let builder = Config::builder()
            .add_source(config::File::from_str(
                DEFAULT_CONFIG,
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap();
        let config: ControllerConfig = builder.try_deserialize().unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn valid_config_passes() {
        test_config().validate().unwrap();
    }

    #[test]
    fn wrong_wheel_count_is_rejected() {
        let mut config = test_config();
        config.wheel_names.pop();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WrongWheelCount(3))
        ));
    }

    #[test]
    fn non_positive_radius_is_rejected() {
        let mut config = test_config();
        config.wheel_radius = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWheelRadius(_))
        ));
    }

    #[test]
    fn zero_separation_sum_is_rejected() {
        let mut config = test_config();
        config.wheel_separation_x = 0.0;
        config.wheel_separation_y = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroSeparationSum)
        ));
    }

    #[test]
    fn wrong_limiter_sign_is_rejected() {
        let mut config = test_config();
        config.limits.linear_x.max_deceleration = Some(4.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLimiterSigns("linear_x"))
        ));
    }

    #[test]
    fn prefix_disabled_leaves_frames_alone() {
        let mut config = test_config();
        config.tf_frame_prefix = "test_prefix".to_owned();
        assert_eq!(config.prefixed_frame_id("odom"), "odom");
    }

    #[test]
    fn prefix_enabled_prepends_prefix() {
        let mut config = test_config();
        config.tf_frame_prefix_enable = true;
        config.tf_frame_prefix = "test_prefix".to_owned();
        assert_eq!(config.prefixed_frame_id("odom"), "test_prefix/odom");
    }

    #[test]
    fn blank_prefix_falls_back_to_namespace() {
        let mut config = test_config();
        config.tf_frame_prefix_enable = true;
        config.namespace = "/test_namespace".to_owned();
        assert_eq!(
            config.prefixed_frame_id("base_link"),
            "test_namespace/base_link"
        );
    }

    #[test]
    fn blank_prefix_and_namespace_leave_frames_alone() {
        let mut config = test_config();
        config.tf_frame_prefix_enable = true;
        assert_eq!(config.prefixed_frame_id("odom"), "odom");
    }
}
