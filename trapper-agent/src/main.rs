use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{WrapErr, eyre};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use trapper_agent::{Config, SensorConfig};
use trapper_edge::{
    CycleOutcome, Engine, IioSensor, MeasurementSource, SimulatedSensor, TrapperSender,
};

#[derive(Parser)]
#[command(name = "trapper-agent")]
#[command(about = "Push environment readings to a trapper server")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "trapper-agent.toml")]
    config: PathBuf,

    /// Run a single cycle and exit; non-zero status if it was not acknowledged
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "trapper_agent=info,trapper_edge=info".to_owned());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    let sender = TrapperSender::new(config.sender());

    info!(
        addr = %sender.addr(),
        host = %config.agent.host,
        interval_secs = config.agent.interval_secs,
        "Starting trapper-agent"
    );

    // a sensor that cannot be opened ends the process
    let source: Box<dyn MeasurementSource> = match &config.sensor {
        SensorConfig::Simulated { seed } => {
            info!(?seed, "Using simulated sensor");
            Box::new(seed.map_or_else(SimulatedSensor::new, SimulatedSensor::with_seed))
        }
        SensorConfig::Iio { path } => {
            info!(path = ?path, "Using IIO sensor");
            Box::new(
                IioSensor::open(path)
                    .await
                    .wrap_err("sensor initialization failed")?,
            )
        }
    };

    let mut engine = Engine::new(source, sender)
        .with_keys(config.measurement.keys.clone())
        .with_reference_pressure(config.measurement.reference_pressure_hpa)
        .with_interval(config.interval());

    if cli.once {
        return match engine.run_once().await {
            CycleOutcome::Sent(_) => Ok(()),
            CycleOutcome::Failed(e) => Err(eyre!(e).wrap_err("batch was not acknowledged")),
            CycleOutcome::Skipped(e) => Err(eyre!(e).wrap_err("no batch was sent")),
        };
    }

    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, stopping"),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, stopping"),
            }
            cancel.cancel();
        }
    });

    engine.run(cancel).await;

    Ok(())
}
