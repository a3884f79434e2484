//! The mecanum drive controller itself.
//!
//! Lifecycle follows the host contract Unconfigured -> Inactive -> Active
//! with deactivate and cleanup walking back down. The host invokes
//! configure, activate, update, deactivate and cleanup from a single thread;
//! only the command buffer is shared with the asynchronous command arrival
//! path.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    command_buffer::{CommandBuffer, CommandRead, CommandSender},
    configuration::{ConfigError, ControllerConfig, WHEEL_COUNT},
    interfaces::{
        interface_name, HardwareResources, OdometrySnapshot, TelemetrySink, TransientIoError,
    },
    kinematics::{BodyTwist, Geometry, WheelSpeeds},
    odometry::{FeedbackMode, Odometry},
    speed_limiter::SpeedLimiter,
};

/// Assigned hardware handles do not match what configure declared
#[derive(Error, Debug)]
pub enum ResourceMismatchError {
    #[error("expected {expected} command interfaces, got {actual}")]
    WrongCommandCount { expected: usize, actual: usize },
    #[error("expected {expected} state interfaces, got {actual}")]
    WrongStateCount { expected: usize, actual: usize },
    #[error("command interface {index} should be {expected:?}, got {actual:?}")]
    CommandNameMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("state interface {index} should be {expected:?}, got {actual:?}")]
    StateNameMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    ResourceMismatch(#[from] ResourceMismatchError),
    #[error(transparent)]
    TransientIo(#[from] TransientIoError),
    #[error("{operation} is not allowed while {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: LifecycleState,
    },
}

/// Externally visible lifecycle position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unconfigured,
    Inactive,
    Active,
}

/// Everything derived from a validated configuration. Lives from configure
/// until cleanup.
struct ConfiguredState {
    geometry: Geometry,
    feedback_mode: FeedbackMode,
    command_timeout: Duration,
    limiter: SpeedLimiter,
    odometry: Odometry,
    odom_frame_id: Arc<str>,
    base_frame_id: Arc<str>,
    command_interface_names: Vec<String>,
    state_interface_names: Vec<String>,
}

/// Configured state plus claimed hardware. Lives from activate until
/// deactivate.
struct ActiveState {
    configured: ConfiguredState,
    resources: HardwareResources,
    /// edge detector so a stale command window is logged once, not per cycle
    command_stale: bool,
}

enum State {
    Unconfigured,
    Inactive(ConfiguredState),
    Active(ActiveState),
}

pub struct MecanumDriveController {
    state: State,
    command_buffer: CommandBuffer,
    telemetry: Option<Box<dyn TelemetrySink>>,
}

impl Default for MecanumDriveController {
    fn default() -> Self {
        Self::new()
    }
}

impl MecanumDriveController {
    pub fn new() -> Self {
        Self {
            state: State::Unconfigured,
            command_buffer: CommandBuffer::new(),
            telemetry: None,
        }
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        match self.state {
            State::Unconfigured => LifecycleState::Unconfigured,
            State::Inactive(_) => LifecycleState::Inactive,
            State::Active(_) => LifecycleState::Active,
        }
    }

    /// Producer handle for the asynchronous command arrival path. May be
    /// cloned and used from any thread.
    pub fn command_sender(&self) -> CommandSender {
        self.command_buffer.sender()
    }

    pub fn set_telemetry_sink(&mut self, sink: Box<dyn TelemetrySink>) {
        self.telemetry = Some(sink);
    }

    /// Hardware command interface names declared by the last configure call,
    /// in wheel order
    pub fn command_interface_names(&self) -> Option<&[String]> {
        self.configured()
            .map(|configured| configured.command_interface_names.as_slice())
    }

    /// Hardware state interface names declared by the last configure call,
    /// in wheel order
    pub fn state_interface_names(&self) -> Option<&[String]> {
        self.configured()
            .map(|configured| configured.state_interface_names.as_slice())
    }

    fn configured(&self) -> Option<&ConfiguredState> {
        match &self.state {
            State::Unconfigured => None,
            State::Inactive(configured) => Some(configured),
            State::Active(active) => Some(&active.configured),
        }
    }

    /// Validate the configuration and declare the hardware resources the
    /// controller needs. Unconfigured -> Inactive.
    pub fn configure(&mut self, config: ControllerConfig) -> Result<(), ControllerError> {
        if !matches!(self.state, State::Unconfigured) {
            return Err(ControllerError::InvalidTransition {
                operation: "configure",
                state: self.lifecycle_state(),
            });
        }
        config.validate()?;

        let feedback_mode = config.feedback_mode();
        let command_interface_names = config
            .wheel_names
            .iter()
            .map(|wheel| interface_name(wheel, FeedbackMode::Velocity))
            .collect();
        let state_interface_names = config
            .wheel_names
            .iter()
            .map(|wheel| interface_name(wheel, feedback_mode))
            .collect();

        let configured = ConfiguredState {
            geometry: config.geometry(),
            feedback_mode,
            command_timeout: config.command_timeout(),
            limiter: SpeedLimiter::new(config.limits),
            odometry: Odometry::new(config.geometry(), feedback_mode),
            odom_frame_id: config.prefixed_frame_id(&config.odom_frame_id).into(),
            base_frame_id: config.prefixed_frame_id(&config.base_frame_id).into(),
            command_interface_names,
            state_interface_names,
        };
        info!(
            odom_frame_id = %configured.odom_frame_id,
            base_frame_id = %configured.base_frame_id,
            ?feedback_mode,
            "controller configured"
        );
        self.state = State::Inactive(configured);
        Ok(())
    }

    /// Claim the concrete hardware handles. Inactive -> Active.
    ///
    /// Fails and stays Inactive if the handed-in resources do not match the
    /// declared names exactly, in count, identity and order.
    pub fn activate(&mut self, resources: HardwareResources) -> Result<(), ControllerError> {
        let lifecycle = self.lifecycle_state();
        let State::Inactive(configured) = &self.state else {
            return Err(ControllerError::InvalidTransition {
                operation: "activate",
                state: lifecycle,
            });
        };
        check_resources(
            &resources,
            &configured.command_interface_names,
            &configured.state_interface_names,
        )?;

        let State::Inactive(mut configured) =
            std::mem::replace(&mut self.state, State::Unconfigured)
        else {
            unreachable!("state checked above");
        };

        // seed the limiter from the measured velocity so the first cycle is
        // not clamped against an arbitrary zero
        let seed = match configured.feedback_mode {
            FeedbackMode::Velocity => read_wheel_states(&resources)
                .map(|readings| {
                    configured.geometry.forward(&WheelSpeeds::new(
                        readings[0],
                        readings[1],
                        readings[2],
                        readings[3],
                    ))
                })
                .unwrap_or_else(|_| BodyTwist::zero()),
            FeedbackMode::Position => BodyTwist::zero(),
        };
        configured.limiter.reset(seed);
        configured.odometry.reset();
        self.command_buffer.clear();

        info!("controller activated");
        self.state = State::Active(ActiveState {
            configured,
            resources,
            command_stale: false,
        });
        Ok(())
    }

    /// One control cycle. Active only; in any other state this is a safe
    /// no-op.
    ///
    /// A hardware read or write failure is reported for this cycle and does
    /// not change state; the next cycle retries.
    pub fn update(&mut self, now: Instant, dt: Duration) -> Result<(), ControllerError> {
        let State::Active(active) = &mut self.state else {
            return Ok(());
        };
        let dt_seconds = dt.as_secs_f64();

        let desired = match self
            .command_buffer
            .latest_fresh(now, active.configured.command_timeout)
        {
            CommandRead::Fresh(command) => {
                if active.command_stale {
                    debug!("velocity command fresh again");
                    active.command_stale = false;
                }
                command.twist
            }
            CommandRead::Stale => {
                if !active.command_stale {
                    warn!(
                        timeout = ?active.configured.command_timeout,
                        "velocity command timed out, commanding zero"
                    );
                    active.command_stale = true;
                }
                BodyTwist::zero()
            }
            CommandRead::Empty => BodyTwist::zero(),
        };

        let limited = active.configured.limiter.limit(&desired, dt_seconds);
        let wheel_speeds = active.configured.geometry.inverse(&limited);

        // best effort: try every wheel even when one write fails, report the
        // first failure for this cycle
        let mut cycle_error: Option<TransientIoError> = None;
        for (interface, speed) in active
            .resources
            .command
            .iter_mut()
            .zip(wheel_speeds.as_array())
        {
            if let Err(error) = interface.set_value(speed) {
                warn!(%error, "wheel command write failed");
                cycle_error.get_or_insert(error);
            }
        }

        match read_wheel_states(&active.resources) {
            Ok(readings) => {
                active.configured.odometry.update(readings, dt_seconds);
                if let Some(sink) = &mut self.telemetry {
                    sink.publish(OdometrySnapshot {
                        pose: active.configured.odometry.pose(),
                        twist: active.configured.odometry.twist(),
                        stamp: now,
                        odom_frame_id: Arc::clone(&active.configured.odom_frame_id),
                        base_frame_id: Arc::clone(&active.configured.base_frame_id),
                    });
                }
            }
            Err(error) => {
                warn!(%error, "wheel state read failed, skipping odometry this cycle");
                cycle_error.get_or_insert(error);
            }
        }

        match cycle_error {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    /// Halt the wheels and release the hardware handles. Active -> Inactive.
    pub fn deactivate(&mut self) -> Result<(), ControllerError> {
        if !matches!(self.state, State::Active(_)) {
            return Err(ControllerError::InvalidTransition {
                operation: "deactivate",
                state: self.lifecycle_state(),
            });
        }
        let State::Active(mut active) = std::mem::replace(&mut self.state, State::Unconfigured)
        else {
            unreachable!("state checked above");
        };

        // the halt must be attempted on every wheel even if some writes fail
        for interface in active.resources.command.iter_mut() {
            if let Err(error) = interface.set_value(0.0) {
                warn!(%error, "failed to halt wheel on deactivate");
            }
        }
        active.configured.limiter.reset(BodyTwist::zero());

        info!("controller deactivated");
        self.state = State::Inactive(active.configured);
        Ok(())
    }

    /// Release all configuration-derived state. Inactive -> Unconfigured.
    pub fn cleanup(&mut self) -> Result<(), ControllerError> {
        if !matches!(self.state, State::Inactive(_)) {
            return Err(ControllerError::InvalidTransition {
                operation: "cleanup",
                state: self.lifecycle_state(),
            });
        }
        self.state = State::Unconfigured;
        self.command_buffer.clear();
        info!("controller cleaned up");
        Ok(())
    }
}

fn check_resources(
    resources: &HardwareResources,
    command_names: &[String],
    state_names: &[String],
) -> Result<(), ResourceMismatchError> {
    if resources.command.len() != WHEEL_COUNT {
        return Err(ResourceMismatchError::WrongCommandCount {
            expected: WHEEL_COUNT,
            actual: resources.command.len(),
        });
    }
    if resources.state.len() != WHEEL_COUNT {
        return Err(ResourceMismatchError::WrongStateCount {
            expected: WHEEL_COUNT,
            actual: resources.state.len(),
        });
    }
    for (index, (interface, expected)) in resources.command.iter().zip(command_names).enumerate() {
        if interface.name() != expected.as_str() {
            return Err(ResourceMismatchError::CommandNameMismatch {
                index,
                expected: expected.clone(),
                actual: interface.name().to_owned(),
            });
        }
    }
    for (index, (interface, expected)) in resources.state.iter().zip(state_names).enumerate() {
        if interface.name() != expected.as_str() {
            return Err(ResourceMismatchError::StateNameMismatch {
                index,
                expected: expected.clone(),
                actual: interface.name().to_owned(),
            });
        }
    }
    Ok(())
}

fn read_wheel_states(resources: &HardwareResources) -> Result<[f64; 4], TransientIoError> {
    Ok([
        resources.state[0].value()?,
        resources.state[1].value()?,
        resources.state[2].value()?,
        resources.state[3].value()?,
    ])
}
