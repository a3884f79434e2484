//! Mecanum wheel kinematics.
//!
//! Maps a planar body twist to the four wheel angular velocities and back.
//! Wheel order is fixed everywhere in this crate: front left, front right,
//! rear left, rear right.

use serde::{Deserialize, Serialize};

/// Desired or estimated planar velocity in the body frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyTwist {
    /// forward velocity in m/s
    pub linear_x: f64,
    /// lateral velocity in m/s (positive left)
    pub linear_y: f64,
    /// yaw rate in rad/s (positive counter-clockwise)
    pub angular_z: f64,
}

impl BodyTwist {
    pub fn new(linear_x: f64, linear_y: f64, angular_z: f64) -> Self {
        Self {
            linear_x,
            linear_y,
            angular_z,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Wheel angular velocities in rad/s, in the fixed wheel order
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WheelSpeeds {
    pub front_left: f64,
    pub front_right: f64,
    pub rear_left: f64,
    pub rear_right: f64,
}

impl WheelSpeeds {
    pub fn new(front_left: f64, front_right: f64, rear_left: f64, rear_right: f64) -> Self {
        Self {
            front_left,
            front_right,
            rear_left,
            rear_right,
        }
    }

    pub fn stopped() -> Self {
        Self::default()
    }

    /// Speeds as an array in wheel order
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.front_left,
            self.front_right,
            self.rear_left,
            self.rear_right,
        ]
    }
}

/// Chassis geometry. Immutable once the controller is configured.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    /// wheel radius in meters, must be positive
    pub wheel_radius: f64,
    /// distance between front and rear axles in meters
    pub wheel_separation_x: f64,
    /// distance between left and right wheels in meters
    pub wheel_separation_y: f64,
}

impl Geometry {
    /// Sum of the half separations, the lever arm of the angular terms
    fn half_separation_sum(&self) -> f64 {
        (self.wheel_separation_x + self.wheel_separation_y) / 2.0
    }

    /// Body twist to wheel angular velocities
    pub fn inverse(&self, twist: &BodyTwist) -> WheelSpeeds {
        let l = self.half_separation_sum();
        let r = self.wheel_radius;
        let vx = twist.linear_x;
        let vy = twist.linear_y;
        let wz = twist.angular_z;

        WheelSpeeds {
            front_left: (vx - vy - l * wz) / r,
            front_right: (vx + vy + l * wz) / r,
            rear_left: (vx + vy - l * wz) / r,
            rear_right: (vx - vy + l * wz) / r,
        }
    }

    /// Wheel angular velocities to body twist.
    ///
    /// Least-squares solution of the inverse map. With four measurements and
    /// three unknowns this reduces to averaging complementary wheel pairs.
    /// When both separations are zero the angular rate is unobservable and is
    /// reported as zero.
    pub fn forward(&self, wheels: &WheelSpeeds) -> BodyTwist {
        let l = self.half_separation_sum();
        let r = self.wheel_radius;
        let [fl, fr, rl, rr] = wheels.as_array();

        let angular_z = if l > 0.0 {
            r / (4.0 * l) * (-fl + fr - rl + rr)
        } else {
            0.0
        };

        BodyTwist {
            linear_x: r / 4.0 * (fl + fr + rl + rr),
            linear_y: r / 4.0 * (-fl + fr + rl - rr),
            angular_z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn test_geometry() -> Geometry {
        Geometry {
            wheel_radius: 0.1,
            wheel_separation_x: 1.0,
            wheel_separation_y: 1.0,
        }
    }

    #[test]
    fn pure_forward_drives_all_wheels_equally() {
        let wheels = test_geometry().inverse(&BodyTwist::new(1.0, 0.0, 0.0));
        for speed in wheels.as_array() {
            assert_relative_eq!(speed, 10.0);
        }
    }

    #[test]
    fn pure_rotation_splits_left_and_right() {
        let wheels = test_geometry().inverse(&BodyTwist::new(0.0, 0.0, 1.0));
        assert_relative_eq!(wheels.front_left, -10.0);
        assert_relative_eq!(wheels.rear_left, -10.0);
        assert_relative_eq!(wheels.front_right, 10.0);
        assert_relative_eq!(wheels.rear_right, 10.0);
    }

    #[test]
    fn pure_strafe_sign_pattern() {
        let wheels = test_geometry().inverse(&BodyTwist::new(0.0, 1.0, 0.0));
        assert_relative_eq!(wheels.front_left, -10.0);
        assert_relative_eq!(wheels.front_right, 10.0);
        assert_relative_eq!(wheels.rear_left, 10.0);
        assert_relative_eq!(wheels.rear_right, -10.0);
    }

    #[test]
    fn forward_inverts_inverse() {
        let geometry = test_geometry();
        let twists = [
            BodyTwist::new(0.5, -0.25, 0.75),
            BodyTwist::new(-1.0, 1.0, -2.0),
            BodyTwist::new(0.0, 0.0, 0.0),
            BodyTwist::new(0.1, 0.0, -0.1),
        ];
        for twist in twists {
            let recovered = geometry.forward(&geometry.inverse(&twist));
            assert_relative_eq!(recovered.linear_x, twist.linear_x, epsilon = 1e-12);
            assert_relative_eq!(recovered.linear_y, twist.linear_y, epsilon = 1e-12);
            assert_relative_eq!(recovered.angular_z, twist.angular_z, epsilon = 1e-12);
        }
    }

    #[test]
    fn zero_separation_reports_zero_angular_rate() {
        let geometry = Geometry {
            wheel_radius: 0.1,
            wheel_separation_x: 0.0,
            wheel_separation_y: 0.0,
        };
        let twist = geometry.forward(&WheelSpeeds::new(-1.0, 1.0, -1.0, 1.0));
        assert_relative_eq!(twist.angular_z, 0.0);
    }
}
