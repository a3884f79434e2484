use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use anyhow::Result;
use clap::Parser;
use tokio::time::{interval, sleep};
use tracing::*;
use tracing_subscriber::EnvFilter;

use mecanum_drive_controller::{
    command_buffer::CommandSender,
    configuration::ControllerConfig,
    controller::MecanumDriveController,
    interfaces::{
        CommandInterface, HardwareResources, OdometrySnapshot, StateInterface, TelemetrySink,
        TransientIoError,
    },
    kinematics::BodyTwist,
};

/// Drive the controller against a simulated mecanum base at a fixed rate
#[derive(Parser)]
struct Args {
    /// Config path
    #[clap(long)]
    config: Option<PathBuf>,
    /// Control loop rate in Hz
    #[clap(long, default_value = "100")]
    rate: u64,
    /// How long to run the scripted drive, in seconds
    #[clap(long, default_value = "10.0")]
    duration: f64,
}

#[derive(Debug, Default)]
struct WheelSim {
    velocity: f64,
    position: f64,
}

/// One simulated wheel that follows its velocity command exactly
#[derive(Debug, Clone, Default)]
struct SimWheel {
    state: Arc<Mutex<WheelSim>>,
}

impl SimWheel {
    fn step(&self, dt: f64) {
        let mut state = self.state.lock().unwrap();
        state.position += state.velocity * dt;
    }
}

struct SimCommandHandle {
    name: String,
    wheel: SimWheel,
}

impl CommandInterface for SimCommandHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_value(&mut self, value: f64) -> Result<(), TransientIoError> {
        self.wheel.state.lock().unwrap().velocity = value;
        Ok(())
    }
}

struct SimStateHandle {
    name: String,
    wheel: SimWheel,
}

impl StateInterface for SimStateHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Result<f64, TransientIoError> {
        Ok(self.wheel.state.lock().unwrap().position)
    }
}

/// Prints each odometry snapshot as a JSON line
struct JsonTelemetry;

impl TelemetrySink for JsonTelemetry {
    fn publish(&mut self, snapshot: OdometrySnapshot) {
        if let Ok(json) = serde_json::to_string(&snapshot) {
            println!("{}", json);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("mecanum_sim=info,mecanum_drive_controller=info")
        }))
        .init();
    let args = Args::parse();

    let config = ControllerConfig::load(&args.config)?;

    let mut controller = MecanumDriveController::new();
    controller.set_telemetry_sink(Box::new(JsonTelemetry));
    controller.configure(config)?;

    // wire one simulated wheel to each declared interface pair
    let wheels: Vec<SimWheel> = (0..4).map(|_| SimWheel::default()).collect();
    let command_names = controller.command_interface_names().unwrap().to_vec();
    let state_names = controller.state_interface_names().unwrap().to_vec();
    let resources = HardwareResources {
        command: command_names
            .iter()
            .zip(&wheels)
            .map(|(name, wheel)| {
                Box::new(SimCommandHandle {
                    name: name.clone(),
                    wheel: wheel.clone(),
                }) as Box<dyn CommandInterface>
            })
            .collect(),
        state: state_names
            .iter()
            .zip(&wheels)
            .map(|(name, wheel)| {
                Box::new(SimStateHandle {
                    name: name.clone(),
                    wheel: wheel.clone(),
                }) as Box<dyn StateInterface>
            })
            .collect(),
    };
    controller.activate(resources)?;

    tokio::spawn(drive_script(controller.command_sender()));

    let period = Duration::from_micros(1_000_000 / args.rate.max(1));
    let mut ticker = interval(period);
    let started = Instant::now();
    let mut last_tick = started;
    while started.elapsed().as_secs_f64() < args.duration {
        ticker.tick().await;
        let now = Instant::now();
        let dt = now - last_tick;
        last_tick = now;

        for wheel in &wheels {
            wheel.step(dt.as_secs_f64());
        }
        if let Err(error) = controller.update(now, dt) {
            warn!(%error, "update cycle degraded");
        }
    }

    controller.deactivate()?;
    controller.cleanup()?;
    info!("simulation finished");
    Ok(())
}

/// Scripted drive: forward, strafe, rotate, stop, then go quiet so the
/// command timeout shows up in the log
async fn drive_script(sender: CommandSender) {
    let legs = [
        (BodyTwist::new(0.3, 0.0, 0.0), "forward"),
        (BodyTwist::new(0.0, 0.3, 0.0), "strafe left"),
        (BodyTwist::new(0.0, 0.0, 1.0), "rotate"),
        (BodyTwist::new(0.0, 0.0, 0.0), "stop"),
    ];
    for (twist, name) in legs {
        info!(leg = name, "driving");
        // resend at 20 Hz like a teleop source would
        for _ in 0..40 {
            sender.send(twist, Instant::now());
            sleep(Duration::from_millis(50)).await;
        }
    }
    info!("script finished, going quiet");
}
