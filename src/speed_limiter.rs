//! Asymmetric acceleration limiting for the commanded body twist.
//!
//! Each axis remembers the velocity it last let through and clamps the next
//! request so the change per cycle stays inside the configured bound. Four
//! bounds exist per axis because speeding up and slowing down have different
//! safe rates, in both drive directions.

use serde::Deserialize;

use crate::kinematics::BodyTwist;

/// Acceleration bounds for a single axis.
///
/// Sign convention follows the parameter file: accelerations carry the sign
/// of the velocity change they bound, so `max_deceleration` and
/// `max_acceleration_reverse` are negative. An unset bound disables limiting
/// for that regime.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AxisLimits {
    /// bound while speeding up forwards, rad/s^2 or m/s^2, >= 0
    #[serde(default)]
    pub max_acceleration: Option<f64>,
    /// bound while slowing down forwards, <= 0
    #[serde(default)]
    pub max_deceleration: Option<f64>,
    /// bound while speeding up in reverse, <= 0
    #[serde(default)]
    pub max_acceleration_reverse: Option<f64>,
    /// bound while slowing down in reverse, >= 0
    #[serde(default)]
    pub max_deceleration_reverse: Option<f64>,
}

impl AxisLimits {
    /// True if every configured bound carries the expected sign
    pub fn signs_valid(&self) -> bool {
        self.max_acceleration.map_or(true, |a| a >= 0.0)
            && self.max_deceleration.map_or(true, |d| d <= 0.0)
            && self.max_acceleration_reverse.map_or(true, |a| a <= 0.0)
            && self.max_deceleration_reverse.map_or(true, |d| d >= 0.0)
    }
}

/// Rate limiter for one axis. Remembers the last velocity it produced.
#[derive(Debug, Clone, Copy, Default)]
struct AxisLimiter {
    limits: AxisLimits,
    last_velocity: f64,
}

impl AxisLimiter {
    /// Clamp `desired` against the applicable bound for this step.
    ///
    /// Exactly one of the four bounds applies, selected from the sign of the
    /// previous velocity and the direction of the change. A deceleration that
    /// crosses zero stays under the deceleration bound for the whole step.
    fn apply(&mut self, desired: f64, dt: f64) -> f64 {
        let v0 = self.last_velocity;
        let dv = desired - v0;

        let limited_dv = if v0 >= 0.0 {
            if dv >= 0.0 {
                // forward, speeding up
                match self.limits.max_acceleration {
                    Some(limit) if limit > 0.0 => dv.min(limit * dt),
                    _ => dv,
                }
            } else {
                // forward, slowing down (possibly through zero)
                match self.limits.max_deceleration {
                    Some(limit) if limit < 0.0 => dv.max(limit * dt),
                    _ => dv,
                }
            }
        } else if dv <= 0.0 {
            // reverse, speeding up
            match self.limits.max_acceleration_reverse {
                Some(limit) if limit < 0.0 => dv.max(limit * dt),
                _ => dv,
            }
        } else {
            // reverse, slowing down (possibly through zero)
            match self.limits.max_deceleration_reverse {
                Some(limit) if limit > 0.0 => dv.min(limit * dt),
                _ => dv,
            }
        };

        self.last_velocity = v0 + limited_dv;
        self.last_velocity
    }
}

/// Per-axis limiter configuration for the whole body twist
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TwistLimits {
    #[serde(default)]
    pub linear_x: AxisLimits,
    #[serde(default)]
    pub linear_y: AxisLimits,
    #[serde(default)]
    pub angular_z: AxisLimits,
}

/// Applies the per-axis limits to a requested body twist once per cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeedLimiter {
    linear_x: AxisLimiter,
    linear_y: AxisLimiter,
    angular_z: AxisLimiter,
}

impl SpeedLimiter {
    pub fn new(limits: TwistLimits) -> Self {
        Self {
            linear_x: AxisLimiter {
                limits: limits.linear_x,
                last_velocity: 0.0,
            },
            linear_y: AxisLimiter {
                limits: limits.linear_y,
                last_velocity: 0.0,
            },
            angular_z: AxisLimiter {
                limits: limits.angular_z,
                last_velocity: 0.0,
            },
        }
    }

    /// Forget the last velocities, optionally seeding them from measurement.
    ///
    /// Called on activation so an old velocity memory cannot clamp the first
    /// commands of a new session.
    pub fn reset(&mut self, current: BodyTwist) {
        self.linear_x.last_velocity = current.linear_x;
        self.linear_y.last_velocity = current.linear_y;
        self.angular_z.last_velocity = current.angular_z;
    }

    /// Limit the requested twist against the previous cycle, axis by axis
    pub fn limit(&mut self, desired: &BodyTwist, dt: f64) -> BodyTwist {
        BodyTwist {
            linear_x: self.linear_x.apply(desired.linear_x, dt),
            linear_y: self.linear_y.apply(desired.linear_y, dt),
            angular_z: self.angular_z.apply(desired.angular_z, dt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn limiter_with_x(limits: AxisLimits) -> SpeedLimiter {
        SpeedLimiter::new(TwistLimits {
            linear_x: limits,
            ..Default::default()
        })
    }

    fn all_x_limits() -> AxisLimits {
        AxisLimits {
            max_acceleration: Some(2.0),
            max_deceleration: Some(-4.0),
            max_acceleration_reverse: Some(-8.0),
            max_deceleration_reverse: Some(10.0),
        }
    }

    #[test]
    fn no_limits_is_identity() {
        let mut limiter = SpeedLimiter::default();
        let twist = BodyTwist::new(5.0, -3.0, 2.5);
        let out = limiter.limit(&twist, 0.01);
        assert_relative_eq!(out.linear_x, 5.0);
        assert_relative_eq!(out.linear_y, -3.0);
        assert_relative_eq!(out.angular_z, 2.5);
        // and again, the memory does not introduce limiting
        let out = limiter.limit(&BodyTwist::new(-5.0, 3.0, -2.5), 0.01);
        assert_relative_eq!(out.linear_x, -5.0);
    }

    #[test]
    fn forward_acceleration_is_clamped() {
        let mut limiter = limiter_with_x(all_x_limits());
        let out = limiter.limit(&BodyTwist::new(1.0, 0.0, 0.0), 0.1);
        assert_relative_eq!(out.linear_x, 0.2); // 2.0 * 0.1
    }

    #[test]
    fn forward_deceleration_is_clamped() {
        let mut limiter = limiter_with_x(all_x_limits());
        limiter.reset(BodyTwist::new(1.0, 0.0, 0.0));
        let out = limiter.limit(&BodyTwist::zero(), 0.1);
        assert_relative_eq!(out.linear_x, 0.6); // 1.0 - 4.0 * 0.1
    }

    #[test]
    fn deceleration_bound_holds_through_zero_crossing() {
        let mut limiter = limiter_with_x(all_x_limits());
        limiter.reset(BodyTwist::new(0.1, 0.0, 0.0));
        // single step that would cross into reverse stays on max_deceleration
        let out = limiter.limit(&BodyTwist::new(-1.0, 0.0, 0.0), 0.1);
        assert_relative_eq!(out.linear_x, -0.3); // 0.1 - 4.0 * 0.1
    }

    #[test]
    fn reverse_acceleration_is_clamped() {
        let mut limiter = limiter_with_x(all_x_limits());
        limiter.reset(BodyTwist::new(-0.5, 0.0, 0.0));
        let out = limiter.limit(&BodyTwist::new(-2.0, 0.0, 0.0), 0.1);
        assert_relative_eq!(out.linear_x, -1.3); // -0.5 - 8.0 * 0.1
    }

    #[test]
    fn reverse_deceleration_is_clamped() {
        let mut limiter = limiter_with_x(all_x_limits());
        limiter.reset(BodyTwist::new(-2.0, 0.0, 0.0));
        let out = limiter.limit(&BodyTwist::zero(), 0.1);
        assert_relative_eq!(out.linear_x, -1.0); // -2.0 + 10.0 * 0.1
    }

    #[test]
    fn change_per_cycle_never_exceeds_bound() {
        let limits = all_x_limits();
        let mut limiter = limiter_with_x(limits);
        let dt = 0.01;
        let mut previous = 0.0;
        let requests = [3.0, -3.0, 0.5, -0.5, 0.0, 2.0, -2.0];
        for desired in requests {
            for _ in 0..200 {
                let out = limiter.limit(&BodyTwist::new(desired, 0.0, 0.0), dt);
                let dv = out.linear_x - previous;
                // steepest allowed rise is reverse deceleration, steepest
                // allowed fall is reverse acceleration
                assert!(dv <= 10.0 * dt + 1e-12);
                assert!(dv >= -8.0 * dt - 1e-12);
                previous = out.linear_x;
            }
            assert_relative_eq!(previous, desired, epsilon = 1e-9);
        }
    }

    #[test]
    fn axes_are_independent() {
        let mut limiter = SpeedLimiter::new(TwistLimits {
            linear_x: AxisLimits {
                max_acceleration: Some(1.0),
                ..Default::default()
            },
            ..Default::default()
        });
        let out = limiter.limit(&BodyTwist::new(5.0, 5.0, 5.0), 0.1);
        assert_relative_eq!(out.linear_x, 0.1);
        assert_relative_eq!(out.linear_y, 5.0);
        assert_relative_eq!(out.angular_z, 5.0);
    }

    #[test]
    fn reset_seeds_velocity_memory() {
        let mut limiter = limiter_with_x(all_x_limits());
        limiter.reset(BodyTwist::new(0.95, 0.0, 0.0));
        let out = limiter.limit(&BodyTwist::new(1.0, 0.0, 0.0), 0.1);
        // within the acceleration bound of the seeded velocity
        assert_relative_eq!(out.linear_x, 1.0);
    }

    #[test]
    fn sign_validation() {
        assert!(all_x_limits().signs_valid());
        assert!(!AxisLimits {
            max_deceleration: Some(4.0),
            ..Default::default()
        }
        .signs_valid());
        assert!(!AxisLimits {
            max_acceleration: Some(-2.0),
            ..Default::default()
        }
        .signs_valid());
    }
}
