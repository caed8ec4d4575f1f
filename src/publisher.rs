//! Sensor-simulation loop: one dedicated bus connection per simulated
//! sensor, publishing a fresh bounded-random reading at a fixed cadence
//! until the optional time budget elapses or the caller cancels.

use anyhow::Result;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::models::reading::{Reading, SensorKind};
use crate::sensor::ValueGenerator;
use crate::transport::{BusConfig, MqttPublisher, PublishSink, Qos};

/// Everything that identifies and paces one simulated sensor instance.
#[derive(Debug, Clone)]
pub struct SensorSpec {
    pub kind: SensorKind,
    pub device_id: String,
    pub interval: Duration,
    pub qos: Qos,
    /// When set, the loop terminates on its own once this much wall-clock
    /// time has elapsed since it started.
    pub duration: Option<Duration>,
}

impl SensorSpec {
    pub fn client_id(&self) -> String {
        format!("{}-{}", self.kind, self.device_id)
    }

    pub fn topic(&self, prefix: &str) -> String {
        format!(
            "{}/{}/{}",
            prefix.trim_end_matches('/'),
            self.kind,
            self.device_id
        )
    }
}

/// Connects a client for this sensor instance and runs the publish loop.
/// The connection is released on every exit path, including errors.
pub async fn run(cfg: &Config, spec: SensorSpec, cancel: CancellationToken) -> Result<()> {
    let bus = BusConfig::persistent(&cfg.broker_host, cfg.broker_port, spec.client_id());
    let mut sink = MqttPublisher::connect(&bus);
    let mut values = ValueGenerator::from_entropy();
    run_with_sink(&spec, &cfg.topic_prefix, &mut sink, &mut values, &cancel).await
}

/// Runs the loop against any sink and guarantees `close` afterwards,
/// whatever the loop body returned.
pub async fn run_with_sink<S: PublishSink>(
    spec: &SensorSpec,
    prefix: &str,
    sink: &mut S,
    values: &mut ValueGenerator,
    cancel: &CancellationToken,
) -> Result<()> {
    let res = publish_loop(spec, prefix, sink, values, cancel).await;
    let closed = sink.close().await;
    res.and(closed)
}

async fn publish_loop<S: PublishSink>(
    spec: &SensorSpec,
    prefix: &str,
    sink: &mut S,
    values: &mut ValueGenerator,
    cancel: &CancellationToken,
) -> Result<()> {
    let topic = spec.topic(prefix);
    let started = Instant::now();
    info!("{} publishing to {} every {:?}", spec.client_id(), topic, spec.interval);

    loop {
        if let Some(budget) = spec.duration {
            if started.elapsed() >= budget {
                info!("{} sensor finished after {:?}", spec.kind, budget);
                break;
            }
        }
        if cancel.is_cancelled() {
            info!("{} sensor cancelled", spec.kind);
            break;
        }

        let value = values.sample(spec.kind);
        // Each envelope gets a fresh wall-clock timestamp, not the loop start.
        let reading = Reading::now(spec.kind, spec.device_id.clone(), value);
        let payload = serde_json::to_vec(&reading)?;
        sink.publish(&topic, spec.qos, payload).await?;
        debug!("published {} = {} on {}", spec.kind, value, topic);

        // Fixed cadence: publish latency is not subtracted, drift is accepted.
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("{} sensor cancelled", spec.kind);
                break;
            }
            _ = tokio::time::sleep(spec.interval) => {}
        }
    }

    Ok(())
}
