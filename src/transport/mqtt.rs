// MIT License - Copyright (c) 2026 tapper-bridge contributors

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::MqttConfig;
use crate::error::{ConnectionDetails, Result, TapperError};
use crate::status::TapperStatus;
use crate::transport::{CommandParams, CommandResponse, TapperProtocol};

const PROTOCOL: &str = "MQTT";

/// How long the background task backs off after an event-loop error before
/// rumqttc retries the broker connection.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// MQTT transport for ESP32 tapper devices.
///
/// Stateful pub/sub protocol. Commands are published to
/// `tappers/{device_id}/commands` as JSON `{"action": …, ...params}` and are
/// fire-and-forget: success means the broker handoff succeeded, not that the
/// device moved. Status arrives asynchronously on `tappers/{device_id}/status`
/// and is cached last-value-wins; `get_status` returns the cache and never
/// waits for a fresher message.
#[derive(Debug)]
pub struct MqttTapperProtocol {
    device_id: String,
    broker: String,
    port: u16,
    timeout: Duration,
    keep_alive: Duration,
    command_topic: String,
    status_topic: String,
    client: Option<AsyncClient>,
    /// Written by the event-loop task, read by callers. Single writer,
    /// lock never held across an await.
    status: Arc<Mutex<Option<TapperStatus>>>,
    connected: Arc<AtomicBool>,
    loop_handle: Option<JoinHandle<()>>,
}

impl MqttTapperProtocol {
    pub fn new(device_id: impl Into<String>, config: &MqttConfig) -> Self {
        let device_id = device_id.into();
        let topic_prefix = format!("tappers/{device_id}");
        Self {
            command_topic: format!("{topic_prefix}/commands"),
            status_topic: format!("{topic_prefix}/status"),
            device_id,
            broker: config.broker.clone(),
            port: config.port,
            timeout: Duration::from_millis(config.timeout_ms),
            keep_alive: Duration::from_secs(config.keep_alive_secs),
            client: None,
            status: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            loop_handle: None,
        }
    }

    pub fn command_topic(&self) -> &str {
        &self.command_topic
    }

    pub fn status_topic(&self) -> &str {
        &self.status_topic
    }

    fn not_connected_error(&self, message: &str) -> TapperError {
        TapperError::Connection {
            device_id: self.device_id.clone(),
            protocol: PROTOCOL,
            message: message.to_string(),
            details: Some(ConnectionDetails {
                endpoint: Some(self.broker.clone()),
                port: Some(self.port),
                source_message: None,
            }),
        }
    }
}

impl TapperProtocol for MqttTapperProtocol {
    fn protocol_name(&self) -> &'static str {
        PROTOCOL
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Connect to the broker and subscribe to the status topic.
    ///
    /// Drives the event loop inline until the broker's ConnAck (bounded by
    /// the configured timeout), then hands the loop to a background task that
    /// keeps the status cache current and resubscribes after reconnects.
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            debug!(device_id = %self.device_id, "already connected to MQTT broker");
            return Ok(());
        }

        let client_id = format!("tapper-bridge-{}", self.device_id);
        let mut options = MqttOptions::new(client_id, &self.broker, self.port);
        options.set_keep_alive(self.keep_alive);
        let (client, mut eventloop) = AsyncClient::new(options, 64);

        client
            .subscribe(&self.status_topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| self.not_connected_error(&format!("subscribe request failed: {e}")))?;

        // Wait for the broker handshake before declaring ourselves connected.
        let handshake = tokio::time::timeout(self.timeout, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                    Ok(_) => continue,
                    Err(e) => return Err(e),
                }
            }
        })
        .await;

        match handshake {
            Err(_) => {
                debug!(device_id = %self.device_id, "MQTT connect timed out");
                Err(TapperError::Timeout {
                    device_id: self.device_id.clone(),
                    protocol: PROTOCOL,
                    operation: "connect".to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
            Ok(Err(e)) => {
                debug!(device_id = %self.device_id, "MQTT connection failed: {e}");
                Err(TapperError::Connection {
                    device_id: self.device_id.clone(),
                    protocol: PROTOCOL,
                    message: format!(
                        "cannot connect to MQTT broker at {}:{}",
                        self.broker, self.port
                    ),
                    details: Some(ConnectionDetails {
                        endpoint: Some(self.broker.clone()),
                        port: Some(self.port),
                        source_message: Some(e.to_string()),
                    }),
                })
            }
            Ok(Ok(())) => {
                self.loop_handle = Some(spawn_status_listener(
                    eventloop,
                    client.clone(),
                    Arc::clone(&self.status),
                    Arc::clone(&self.connected),
                    self.status_topic.clone(),
                    self.device_id.clone(),
                ));
                self.client = Some(client);
                self.connected.store(true, Ordering::SeqCst);
                debug!(
                    device_id = %self.device_id,
                    "connected to MQTT broker at {}:{}", self.broker, self.port
                );
                Ok(())
            }
        }
    }

    async fn send_command(
        &self,
        command: &str,
        params: Option<&CommandParams>,
    ) -> Result<CommandResponse> {
        if !self.is_connected() {
            return Err(self.not_connected_error("not connected to MQTT broker"));
        }
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| self.not_connected_error("not connected to MQTT broker"))?;

        let mut message = CommandParams::new();
        message.insert("action".to_string(), Value::from(command));
        if let Some(params) = params {
            message.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let payload = serde_json::to_vec(&Value::Object(message)).map_err(|e| {
            TapperError::protocol(
                &self.device_id,
                PROTOCOL,
                command,
                format!("failed to encode command as JSON: {e}"),
            )
        })?;

        client
            .publish(&self.command_topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| {
                error!(device_id = %self.device_id, "MQTT publish failed: {e}");
                TapperError::protocol(
                    &self.device_id,
                    PROTOCOL,
                    command,
                    format!("publish failed: {e}"),
                )
            })?;

        debug!(device_id = %self.device_id, "published '{command}' to {}", self.command_topic);
        Ok(CommandResponse::Published)
    }

    /// Last cached status. Never blocks waiting for a fresh message; the
    /// value may be stale by up to one publish interval.
    async fn get_status(&self) -> Result<TapperStatus> {
        if !self.is_connected() {
            return Err(self.not_connected_error("cannot get status - not connected to MQTT broker"));
        }

        let cached = lock_cache(&self.status).clone();
        let status =
            cached.unwrap_or_else(|| TapperStatus::Unknown("no status received yet".to_string()));
        debug!(device_id = %self.device_id, "returning cached status: {status}");
        Ok(status)
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            // Secondary errors are demoted to warnings; we are tearing down.
            if let Err(e) = client.disconnect().await {
                warn!(device_id = %self.device_id, "error during MQTT disconnect: {e}");
            }
        }
        if let Some(handle) = self.loop_handle.take() {
            handle.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
        debug!(device_id = %self.device_id, "disconnected from MQTT broker");
        Ok(())
    }
}

impl Drop for MqttTapperProtocol {
    fn drop(&mut self) {
        if let Some(handle) = self.loop_handle.take() {
            handle.abort();
        }
    }
}

/// Spawn the background task that owns the event loop after the handshake.
///
/// Caches incoming status payloads and tracks broker connectivity in the
/// shared flag. Resubscribes on every ConnAck: rumqttc does not
/// auto-resubscribe, so a broker restart would otherwise silently drop the
/// status subscription.
fn spawn_status_listener(
    mut eventloop: EventLoop,
    client: AsyncClient,
    status: Arc<Mutex<Option<TapperStatus>>>,
    connected: Arc<AtomicBool>,
    status_topic: String,
    device_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    debug!(device_id = %device_id, "MQTT (re)connected, subscribing to {status_topic}");
                    connected.store(true, Ordering::SeqCst);
                    if let Err(e) = client.subscribe(&status_topic, QoS::AtLeastOnce).await {
                        error!(device_id = %device_id, "failed to subscribe to {status_topic}: {e}");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(msg))) => {
                    if msg.topic == status_topic {
                        apply_status_payload(&status, &msg.payload, &device_id);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    connected.store(false, Ordering::SeqCst);
                    warn!(device_id = %device_id, "MQTT event loop error: {e}");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    })
}

/// Decode one status payload and update the last-value-wins cache.
fn apply_status_payload(
    cache: &Mutex<Option<TapperStatus>>,
    payload: &[u8],
    device_id: &str,
) {
    match std::str::from_utf8(payload) {
        Ok(text) => {
            let status = TapperStatus::parse(text);
            debug!(device_id = %device_id, "received status update: {status}");
            *lock_cache(cache) = Some(status);
        }
        Err(e) => {
            warn!(device_id = %device_id, "failed to decode MQTT status payload: {e}");
        }
    }
}

/// Cache lock helper; a poisoned lock just yields the inner value since the
/// cache holds plain data.
fn lock_cache(
    cache: &Mutex<Option<TapperStatus>>,
) -> std::sync::MutexGuard<'_, Option<TapperStatus>> {
    cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
