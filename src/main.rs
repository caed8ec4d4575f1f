use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sensorhub::config::Config;
use sensorhub::models::reading::SensorKind;
use sensorhub::publisher::{self, SensorSpec};
use sensorhub::sinks::ReadingStore;
use sensorhub::transport::Qos;
use sensorhub::{export, subscriber};

#[derive(Parser)]
#[command(name = "sensorhub")]
#[command(about = "Smart home telemetry simulation: MQTT sensors, hub and stored-data reports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hub: subscribe to all sensors and persist readings
    Hub,

    /// Run one simulated sensor
    Sensor {
        /// Sensor kind: temperature, humidity or motion
        sensor_type: String,

        /// Device identifier (defaults to the kind's standard instance)
        #[arg(short, long)]
        device: Option<String>,

        /// Seconds between readings
        #[arg(short, long, default_value = "2.0")]
        interval: f64,

        /// MQTT QoS level (0, 1 or 2)
        #[arg(short, long, default_value = "1")]
        qos: u8,

        /// Stop after this many seconds (runs until ctrl-c when omitted)
        #[arg(short = 'D', long)]
        duration: Option<f64>,
    },

    /// Run one sensor of every kind concurrently
    All {
        /// Seconds between readings
        #[arg(short, long, default_value = "2.0")]
        interval: f64,

        /// Stop after this many seconds (runs until ctrl-c when omitted)
        #[arg(short = 'D', long)]
        duration: Option<f64>,
    },

    /// Show the most recent stored readings
    Recent {
        #[arg(short = 'n', long, default_value = "10")]
        count: u32,
    },

    /// Show avg/min/max statistics for the analog sensors
    Stats,

    /// Export all stored data to CSV and JSON
    Export {
        #[arg(short, long, default_value = "exports")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::from_env();

    match cli.command {
        Commands::Hub => subscriber::run(&cfg, cancel_on_ctrl_c()).await,
        Commands::Sensor {
            sensor_type,
            device,
            interval,
            qos,
            duration,
        } => {
            let kind: SensorKind = sensor_type.parse()?;
            let spec = SensorSpec {
                kind,
                device_id: device.unwrap_or_else(|| kind.default_device().to_string()),
                interval: parse_interval(interval)?,
                qos: parse_qos(qos)?,
                duration: parse_duration(duration)?,
            };
            publisher::run(&cfg, spec, cancel_on_ctrl_c()).await
        }
        Commands::All { interval, duration } => run_all(&cfg, interval, duration).await,
        Commands::Recent { count } => show_recent(&cfg, count).await,
        Commands::Stats => show_stats(&cfg).await,
        Commands::Export { out_dir } => run_export(&cfg, &out_dir).await,
    }
}

/// Token cancelled by the first ctrl-c, so every loop winds down through its
/// normal teardown path.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            watcher.cancel();
        }
    });
    cancel
}

fn parse_interval(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        bail!("interval must be a positive number of seconds, got {secs}");
    }
    Ok(Duration::from_secs_f64(secs))
}

fn parse_duration(secs: Option<f64>) -> Result<Option<Duration>> {
    match secs {
        None => Ok(None),
        Some(s) if s.is_finite() && s > 0.0 => Ok(Some(Duration::from_secs_f64(s))),
        Some(s) => bail!("duration must be a positive number of seconds, got {s}"),
    }
}

fn parse_qos(qos: u8) -> Result<Qos> {
    Ok(match qos {
        0 => Qos::AtMostOnce,
        1 => Qos::AtLeastOnce,
        2 => Qos::ExactlyOnce,
        n => bail!("unsupported qos {n} (expected 0, 1 or 2)"),
    })
}

async fn run_all(cfg: &Config, interval: f64, duration: Option<f64>) -> Result<()> {
    let interval = parse_interval(interval)?;
    let duration = parse_duration(duration)?;
    let cancel = cancel_on_ctrl_c();

    let mut tasks = Vec::new();
    for kind in SensorKind::ALL {
        let spec = SensorSpec {
            kind,
            device_id: kind.default_device().to_string(),
            interval,
            qos: Qos::AtLeastOnce,
            duration,
        };
        let cfg = cfg.clone();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            publisher::run(&cfg, spec, cancel).await
        }));
    }

    for task in tasks {
        task.await??;
    }
    Ok(())
}

async fn show_recent(cfg: &Config, count: u32) -> Result<()> {
    let store = ReadingStore::open(&cfg.db_path)?;
    let rows = store.recent(count).await?;
    if rows.is_empty() {
        println!("no records stored yet");
        return Ok(());
    }

    println!("=== last {} records ===", rows.len());
    for r in rows {
        println!(
            "timestamp: {:.3} | device: {} | sensor: {} | value: {}",
            r.timestamp, r.device_id, r.sensor_type, r.value
        );
    }
    Ok(())
}

async fn show_stats(cfg: &Config) -> Result<()> {
    let store = ReadingStore::open(&cfg.db_path)?;

    println!("=== sensor statistics ===");
    for kind in [SensorKind::Temperature, SensorKind::Humidity] {
        match store.stats(kind).await? {
            Some(s) => println!(
                "{:<12} -> avg: {:.2}, min: {:.2}, max: {:.2}",
                kind.as_str(),
                s.avg,
                s.min,
                s.max
            ),
            None => println!("{:<12} -> no data yet", kind.as_str()),
        }
    }
    Ok(())
}

async fn run_export(cfg: &Config, out_dir: &std::path::Path) -> Result<()> {
    let store = ReadingStore::open(&cfg.db_path)?;
    match export::export_all(&store, out_dir).await? {
        Some(paths) => {
            println!(
                "exported to {} and {}",
                paths.csv.display(),
                paths.json.display()
            );
        }
        None => println!("no data available to export"),
    }
    Ok(())
}
