// MIT License - Copyright (c) 2026 tapper-bridge contributors

pub mod fallback;
pub mod http;
pub mod mqtt;

use serde_json::Value;

use crate::error::Result;
use crate::status::TapperStatus;

/// JSON parameter map attached to a command (e.g. `{"duration_ms": 1400}`).
pub type CommandParams = serde_json::Map<String, Value>;

/// Build the parameter map for a timed-motion command.
pub fn duration_params(duration_ms: u64) -> CommandParams {
    let mut params = CommandParams::new();
    params.insert("duration_ms".to_string(), Value::from(duration_ms));
    params
}

/// What a transport got back for a command.
///
/// HTTP returns a decoded body; MQTT publish is fire-and-forget, so success
/// is only the local broker handoff (`Published`).
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResponse {
    Json(Value),
    Text(String),
    Published,
}

/// Transport-agnostic contract for talking to one tapper device.
///
/// Sequencing code drives this trait and never branches on the concrete
/// transport. `send_command`/`get_status` must fail with a connection-kind
/// error when the transport is not connected.
#[allow(async_fn_in_trait)]
pub trait TapperProtocol {
    /// Short transport identifier used in logs and errors ("HTTP", "MQTT").
    fn protocol_name(&self) -> &'static str;

    /// Device identifier used for topic routing and logging.
    fn device_id(&self) -> &str;

    /// Whether the transport currently considers itself connected.
    fn is_connected(&self) -> bool;

    /// Establish transport-level connectivity. Idempotent for stateless
    /// transports. Failures are logged and reported, never swallowed.
    async fn connect(&mut self) -> Result<()>;

    /// Transmit one named command with optional parameters.
    async fn send_command(
        &self,
        command: &str,
        params: Option<&CommandParams>,
    ) -> Result<CommandResponse>;

    /// Best-known device status. Raises a typed error on failure; a fetched
    /// but unrecognized string comes back as `TapperStatus::Unknown`.
    async fn get_status(&self) -> Result<TapperStatus>;

    /// Release resources. Safe to call repeatedly and without a prior
    /// successful connect.
    async fn disconnect(&mut self) -> Result<()>;

    /// Extend the actuator for `duration_ms`. Transports with a first-class
    /// timed endpoint override this; the default goes through `send_command`.
    async fn extend_for_time(&self, duration_ms: u64) -> Result<CommandResponse> {
        self.send_command("extend_for_time", Some(&duration_params(duration_ms)))
            .await
    }

    /// Retract the actuator for `duration_ms`. See `extend_for_time`.
    async fn retract_for_time(&self, duration_ms: u64) -> Result<CommandResponse> {
        self.send_command("retract_for_time", Some(&duration_params(duration_ms)))
            .await
    }

    /// Names of the currently connected protocols. Single transports report
    /// themselves; the fallback composite reports every connected member.
    fn active_protocols(&self) -> Vec<&'static str> {
        if self.is_connected() {
            vec![self.protocol_name()]
        } else {
            Vec::new()
        }
    }
}

/// Concrete transport bound to one device, dispatched without trait objects.
///
/// The fallback composite owns a list of these; adding a transport means
/// adding a variant here.
#[derive(Debug)]
pub enum TapperTransport {
    Http(http::HttpTapperProtocol),
    Mqtt(mqtt::MqttTapperProtocol),
}

impl TapperProtocol for TapperTransport {
    fn protocol_name(&self) -> &'static str {
        match self {
            Self::Http(t) => t.protocol_name(),
            Self::Mqtt(t) => t.protocol_name(),
        }
    }

    fn device_id(&self) -> &str {
        match self {
            Self::Http(t) => t.device_id(),
            Self::Mqtt(t) => t.device_id(),
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::Http(t) => t.is_connected(),
            Self::Mqtt(t) => t.is_connected(),
        }
    }

    async fn connect(&mut self) -> Result<()> {
        match self {
            Self::Http(t) => t.connect().await,
            Self::Mqtt(t) => t.connect().await,
        }
    }

    async fn send_command(
        &self,
        command: &str,
        params: Option<&CommandParams>,
    ) -> Result<CommandResponse> {
        match self {
            Self::Http(t) => t.send_command(command, params).await,
            Self::Mqtt(t) => t.send_command(command, params).await,
        }
    }

    async fn get_status(&self) -> Result<TapperStatus> {
        match self {
            Self::Http(t) => t.get_status().await,
            Self::Mqtt(t) => t.get_status().await,
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        match self {
            Self::Http(t) => t.disconnect().await,
            Self::Mqtt(t) => t.disconnect().await,
        }
    }

    async fn extend_for_time(&self, duration_ms: u64) -> Result<CommandResponse> {
        match self {
            Self::Http(t) => t.extend_for_time(duration_ms).await,
            Self::Mqtt(t) => t.extend_for_time(duration_ms).await,
        }
    }

    async fn retract_for_time(&self, duration_ms: u64) -> Result<CommandResponse> {
        match self {
            Self::Http(t) => t.retract_for_time(duration_ms).await,
            Self::Mqtt(t) => t.retract_for_time(duration_ms).await,
        }
    }
}
