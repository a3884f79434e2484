//! Wheel odometry for the mecanum base.
//!
//! Integrates wheel feedback into a pose and velocity estimate. Feedback is
//! either cumulative wheel angles (differenced against the previous cycle) or
//! instantaneous wheel velocities, selected once at configure time.

use nalgebra as na;
use serde::Serialize;
use tracing::warn;

use crate::kinematics::{BodyTwist, Geometry, WheelSpeeds};

/// Below this yaw rate the exact arc update degenerates and the straight
/// line form is used instead
const ANGULAR_RATE_EPSILON: f64 = 1e-6;

/// What the wheel state readout reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackMode {
    /// cumulative wheel angle in radians
    Position,
    /// instantaneous wheel angular velocity in rad/s
    Velocity,
}

/// Planar pose accumulated since the last reset. Heading is unwrapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Pose2D {
    /// Heading wrapped into (-pi, pi] for output
    pub fn normalized_heading(&self) -> f64 {
        na::Rotation2::new(self.heading).angle()
    }
}

/// Dead-reckoning estimator. Exclusively owned by the control loop.
#[derive(Debug, Clone)]
pub struct Odometry {
    geometry: Geometry,
    mode: FeedbackMode,
    pose: Pose2D,
    twist: BodyTwist,
    previous_positions: Option<[f64; 4]>,
}

impl Odometry {
    pub fn new(geometry: Geometry, mode: FeedbackMode) -> Self {
        Self {
            geometry,
            mode,
            pose: Pose2D::default(),
            twist: BodyTwist::zero(),
            previous_positions: None,
        }
    }

    pub fn mode(&self) -> FeedbackMode {
        self.mode
    }

    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    pub fn twist(&self) -> BodyTwist {
        self.twist
    }

    /// Zero the pose and twist and drop the feedback memory
    pub fn reset(&mut self) {
        self.pose = Pose2D::default();
        self.twist = BodyTwist::zero();
        self.previous_positions = None;
    }

    /// Fold one cycle of wheel feedback into the estimate.
    ///
    /// `readings` is one value per wheel in wheel order, interpreted
    /// according to the feedback mode. Returns false if the cycle was
    /// skipped (non-positive dt, or the priming sample in position mode).
    pub fn update(&mut self, readings: [f64; 4], dt: f64) -> bool {
        if dt <= 0.0 {
            warn!(dt, "skipping odometry update with non-positive time step");
            return false;
        }

        let wheel_speeds = match self.mode {
            FeedbackMode::Velocity => WheelSpeeds::new(
                readings[0],
                readings[1],
                readings[2],
                readings[3],
            ),
            FeedbackMode::Position => {
                let Some(previous) = self.previous_positions.replace(readings) else {
                    // first sample only establishes the baseline
                    return false;
                };
                WheelSpeeds::new(
                    (readings[0] - previous[0]) / dt,
                    (readings[1] - previous[1]) / dt,
                    (readings[2] - previous[2]) / dt,
                    (readings[3] - previous[3]) / dt,
                )
            }
        };

        self.twist = self.geometry.forward(&wheel_speeds);
        self.integrate(dt);
        true
    }

    /// Advance the pose assuming the current twist held for the whole
    /// interval.
    ///
    /// With a non-zero yaw rate the body moves along a circular arc; the
    /// closed form below is exact for constant body-frame velocity and avoids
    /// the heading error a first-order step accumulates on curves.
    fn integrate(&mut self, dt: f64) {
        let vx = self.twist.linear_x;
        let vy = self.twist.linear_y;
        let wz = self.twist.angular_z;
        let heading = self.pose.heading;

        if wz.abs() < ANGULAR_RATE_EPSILON {
            let delta_world =
                na::Rotation2::new(heading) * na::Vector2::new(vx * dt, vy * dt);
            self.pose.x += delta_world.x;
            self.pose.y += delta_world.y;
            self.pose.heading += wz * dt;
        } else {
            let new_heading = heading + wz * dt;
            let (sin_0, cos_0) = heading.sin_cos();
            let (sin_1, cos_1) = new_heading.sin_cos();
            self.pose.x += (vx * (sin_1 - sin_0) + vy * (cos_1 - cos_0)) / wz;
            self.pose.y += (-vx * (cos_1 - cos_0) + vy * (sin_1 - sin_0)) / wz;
            self.pose.heading = new_heading;
        }
    }
}
