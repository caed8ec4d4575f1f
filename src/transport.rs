//! MQTT seam. Publishers and the hub talk to the bus through the
//! [`PublishSink`] and [`MessageSource`] traits; the rumqttc-backed
//! implementations below are the only code that touches the wire, which
//! keeps the loops testable against scripted fakes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// `false` keeps session state (subscriptions, queued QoS 1 messages)
    /// on the broker across reconnects.
    pub clean_session: bool,
}

impl BusConfig {
    /// Persistent-session connection settings, as every client in this
    /// system uses.
    pub fn persistent(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            keep_alive_secs: 30,
            clean_session: false,
        }
    }

    fn options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(&self.client_id, &self.host, self.port);
        opts.set_keep_alive(Duration::from_secs(self.keep_alive_secs));
        opts.set_clean_session(self.clean_session);
        opts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

fn map_qos(q: Qos) -> QoS {
    match q {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
        Qos::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// One inbound message as delivered by the bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait PublishSink: Send {
    async fn publish(&mut self, topic: &str, qos: Qos, payload: Vec<u8>) -> Result<()>;

    /// Releases the connection: stop background I/O, then disconnect.
    /// Idempotent enough to sit on every exit path.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait MessageSource: Send {
    /// Waits for the next inbound message. `None` means the stream ended.
    async fn recv(&mut self) -> Result<Option<BusMessage>>;
}

/// Publish-only client. A background task drives the event loop so the
/// caller's loop body only ever suspends on its own cadence.
pub struct MqttPublisher {
    client: AsyncClient,
    driver: JoinHandle<()>,
}

impl MqttPublisher {
    pub fn connect(cfg: &BusConfig) -> Self {
        let (client, mut eventloop) = AsyncClient::new(cfg.options(), 50);
        let client_id = cfg.client_id.clone();
        let driver = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                        info!("{client_id}: broker session established ({:?})", ack.code);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("{client_id}: MQTT poll error: {e} (retrying)");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
        Self { client, driver }
    }
}

#[async_trait]
impl PublishSink for MqttPublisher {
    async fn publish(&mut self, topic: &str, qos: Qos, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic, map_qos(qos), false, payload)
            .await
            .with_context(|| format!("publish to '{topic}' failed"))
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.client.disconnect().await;
        self.driver.abort();
        Ok(())
    }
}

/// Subscribe-side client. Owns the event loop and polls it inline, so the
/// hub suspends exactly while waiting for the next message.
pub struct MqttSubscriber {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttSubscriber {
    pub fn connect(cfg: &BusConfig) -> Self {
        let (client, eventloop) = AsyncClient::new(cfg.options(), 50);
        Self { client, eventloop }
    }

    pub async fn subscribe(&mut self, filter: &str, qos: Qos) -> Result<()> {
        self.client
            .subscribe(filter, map_qos(qos))
            .await
            .with_context(|| format!("subscribe failed for '{filter}'"))
    }
}

#[async_trait]
impl MessageSource for MqttSubscriber {
    async fn recv(&mut self) -> Result<Option<BusMessage>> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    return Ok(Some(BusMessage {
                        topic: p.topic,
                        payload: p.payload.to_vec(),
                    }));
                }
                Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                    info!("broker session established ({:?})", ack.code);
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!("MQTT poll error: {e} (retrying)");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}
