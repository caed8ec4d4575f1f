//! Hub loop: one persistent-session subscriber covering every sensor topic
//! under the configured prefix. Each inbound message is decoded, validated
//! and fanned out to both sinks; anything malformed is discarded with a
//! diagnostic and the loop keeps receiving.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::schema;
use crate::sinks::{DailyLog, DualSink, ReadingStore};
use crate::transport::{BusConfig, BusMessage, MessageSource, MqttSubscriber, Qos};

/// Fixed hub identity; distinct from every publisher's client id so the
/// broker keeps a separate persistent session for it.
pub const HUB_CLIENT_ID: &str = "smart-home-hub";

/// Runs the hub until `cancel` fires. Ensures the store exists before the
/// first message can arrive.
pub async fn run(cfg: &Config, cancel: CancellationToken) -> Result<()> {
    let store = ReadingStore::open(&cfg.db_path)
        .with_context(|| format!("open store at {}", cfg.db_path.display()))?;
    let log = DailyLog::new(&cfg.csv_dir)
        .with_context(|| format!("open log dir {}", cfg.csv_dir.display()))?;
    let sinks = DualSink::new(log, store);

    let bus = BusConfig::persistent(&cfg.broker_host, cfg.broker_port, HUB_CLIENT_ID);
    let filter = format!("{}/#", cfg.topic_prefix.trim_end_matches('/'));
    let mut source = MqttSubscriber::connect(&bus);
    source.subscribe(&filter, Qos::AtLeastOnce).await?;
    info!("hub subscribed to {filter}");

    receive_loop(&mut source, &sinks, &cancel).await
}

/// The steady-state receive loop, generic over the message source so the
/// pipeline is testable without a broker.
pub async fn receive_loop<S: MessageSource>(
    source: &mut S,
    sinks: &DualSink,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("hub shutdown requested");
                return Ok(());
            }
            msg = source.recv() => match msg? {
                Some(msg) => handle_message(&msg, sinks).await,
                None => {
                    info!("message stream closed");
                    return Ok(());
                }
            },
        }
    }
}

async fn handle_message(msg: &BusMessage, sinks: &DualSink) {
    let doc = match schema::decode(&msg.payload) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("undecodable payload on {}: {e}", msg.topic);
            return;
        }
    };

    let reading = match schema::validate(&doc) {
        Ok(reading) => reading,
        Err(e) => {
            warn!("rejected payload on {}: {e}", msg.topic);
            return;
        }
    };

    info!(
        "received {} = {} from '{}' on {}",
        reading.sensor_type, reading.value, reading.device_id, msg.topic
    );
    if let Err(e) = sinks.persist(&reading).await {
        // Sink trouble is an operator problem, never a reason to stop
        // receiving.
        warn!("persist failed for {}: {e}", msg.topic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reading::{Reading, SensorKind};
    use async_trait::async_trait;
    use std::collections::VecDeque;

    struct ScriptedSource {
        frames: VecDeque<BusMessage>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<BusMessage>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    #[async_trait]
    impl MessageSource for ScriptedSource {
        async fn recv(&mut self) -> Result<Option<BusMessage>> {
            Ok(self.frames.pop_front())
        }
    }

    fn msg(topic: &str, payload: impl Into<Vec<u8>>) -> BusMessage {
        BusMessage {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    fn wire(reading: &Reading) -> BusMessage {
        msg(
            &format!("home/sensors/{}/{}", reading.sensor_type, reading.device_id),
            serde_json::to_vec(reading).unwrap(),
        )
    }

    fn sinks(dir: &std::path::Path) -> DualSink {
        DualSink::new(
            DailyLog::new(dir).unwrap(),
            ReadingStore::in_memory().unwrap(),
        )
    }

    #[tokio::test]
    async fn valid_messages_are_persisted_in_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let sinks = sinks(dir.path());
        let a = Reading::now(SensorKind::Temperature, "temp-1", 21.5);
        let b = Reading::now(SensorKind::Humidity, "hum-1", 60.25);
        let mut source = ScriptedSource::new(vec![wire(&a), wire(&b)]);

        receive_loop(&mut source, &sinks, &CancellationToken::new())
            .await
            .unwrap();

        let rows = sinks.store().recent(10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].value, a.value);
        assert_eq!(rows[0].value, b.value);
    }

    #[tokio::test]
    async fn malformed_payload_is_discarded_and_the_loop_survives() {
        let dir = tempfile::tempdir().unwrap();
        let sinks = sinks(dir.path());
        let good = Reading::now(SensorKind::Motion, "motion-1", 1.0);
        let mut source = ScriptedSource::new(vec![
            msg("home/sensors/motion/motion-1", &b"{truncated"[..]),
            wire(&good),
        ]);

        receive_loop(&mut source, &sinks, &CancellationToken::new())
            .await
            .unwrap();

        // The bad frame left nothing behind; the frame after it was handled.
        let rows = sinks.store().recent(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sensor_type, SensorKind::Motion);
    }

    #[tokio::test]
    async fn schema_violations_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let sinks = sinks(dir.path());
        let mut source = ScriptedSource::new(vec![
            msg(
                "home/sensors/pressure/p-1",
                r#"{"timestamp": 1.0, "device_id": "p-1", "sensor_type": "pressure", "value": 3}"#,
            ),
            msg(
                "home/sensors/temperature/temp-1",
                r#"{"device_id": "temp-1", "sensor_type": "temperature", "value": 3}"#,
            ),
        ]);

        receive_loop(&mut source, &sinks, &CancellationToken::new())
            .await
            .unwrap();

        assert!(sinks.store().recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_deliveries_each_validate_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let sinks = sinks(dir.path());
        let r = Reading::now(SensorKind::Humidity, "hum-1", 45.5);
        let mut source = ScriptedSource::new(vec![wire(&r), wire(&r)]);

        receive_loop(&mut source, &sinks, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sinks.store().recent(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let sinks = sinks(dir.path());

        // A source that never yields: the loop must exit via cancellation.
        struct PendingSource;
        #[async_trait]
        impl MessageSource for PendingSource {
            async fn recv(&mut self) -> Result<Option<BusMessage>> {
                std::future::pending().await
            }
        }

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            canceller.cancel();
        });

        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            receive_loop(&mut PendingSource, &sinks, &cancel),
        )
        .await
        .expect("cancellation must end the loop")
        .unwrap();
    }
}
