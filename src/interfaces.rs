//! Seams to the external collaborators: the hardware layer that owns the
//! wheel command and state slots, and the telemetry publisher that receives
//! the odometry snapshot each cycle.
//!
//! The controller only ever talks to these through trait objects so tests
//! and the simulator can stand in for real hardware.

use std::{sync::Arc, time::Instant};

use serde::Serialize;
use thiserror::Error;

use crate::{
    kinematics::BodyTwist,
    odometry::{FeedbackMode, Pose2D},
};

/// A single cycle's hardware access failed. The loop reports it and retries
/// next cycle.
#[derive(Error, Debug)]
#[error("hardware interface {name:?} failed: {message}")]
pub struct TransientIoError {
    pub name: String,
    pub message: String,
}

impl TransientIoError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Writable wheel velocity command slot, unit rad/s
pub trait CommandInterface: Send {
    /// Full interface name, `"{wheel_name}/velocity"`
    fn name(&self) -> &str;

    fn set_value(&mut self, value: f64) -> Result<(), TransientIoError>;
}

/// Readable wheel state slot, either cumulative angle (rad) or angular
/// velocity (rad/s) depending on the configured feedback mode
pub trait StateInterface: Send {
    /// Full interface name, `"{wheel_name}/position"` or
    /// `"{wheel_name}/velocity"`
    fn name(&self) -> &str;

    fn value(&self) -> Result<f64, TransientIoError>;
}

/// Concrete handles handed to the controller at activation
pub struct HardwareResources {
    pub command: Vec<Box<dyn CommandInterface>>,
    pub state: Vec<Box<dyn StateInterface>>,
}

/// Build the full interface name for a wheel
pub fn interface_name(wheel_name: &str, mode: FeedbackMode) -> String {
    match mode {
        FeedbackMode::Position => format!("{}/position", wheel_name),
        FeedbackMode::Velocity => format!("{}/velocity", wheel_name),
    }
}

/// Copy-out of the odometry estimate handed to the telemetry collaborator
/// once per cycle
#[derive(Debug, Clone, Serialize)]
pub struct OdometrySnapshot {
    pub pose: Pose2D,
    pub twist: BodyTwist,
    #[serde(skip)]
    pub stamp: Instant,
    pub odom_frame_id: Arc<str>,
    pub base_frame_id: Arc<str>,
}

/// Receives the per-cycle odometry snapshot. Implementations must not block
/// the caller; hand the snapshot off and return.
pub trait TelemetrySink: Send {
    fn publish(&mut self, snapshot: OdometrySnapshot);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_names_follow_wheel_and_mode() {
        assert_eq!(
            interface_name("front_left_wheel", FeedbackMode::Position),
            "front_left_wheel/position"
        );
        assert_eq!(
            interface_name("rear_right_wheel", FeedbackMode::Velocity),
            "rear_right_wheel/velocity"
        );
    }
}
