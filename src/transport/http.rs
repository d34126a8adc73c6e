// MIT License - Copyright (c) 2026 tapper-bridge contributors

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error};

use crate::config::HttpConfig;
use crate::error::{ConnectionDetails, Result, TapperError};
use crate::status::TapperStatus;
use crate::transport::{CommandParams, CommandResponse, TapperProtocol};

const PROTOCOL: &str = "HTTP";

/// HTTP transport for ESP32 tapper devices.
///
/// Stateless REST-style protocol: `connect()`/`disconnect()` only toggle the
/// local flag, every command is one request/response round trip. Simple
/// commands go to `GET /{command}`, parameterized commands to `POST /command`
/// with a JSON body, and the timed-motion operations use the firmware's
/// dedicated `POST /extend_for_time` / `POST /retract_for_time` endpoints.
#[derive(Debug)]
pub struct HttpTapperProtocol {
    device_id: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
    connected: bool,
}

impl HttpTapperProtocol {
    /// Build from config. Fails fast on a missing/empty `base_url`.
    pub fn new(device_id: impl Into<String>, config: &HttpConfig) -> Result<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(TapperError::Config(
                "missing 'base_url' in HTTP protocol config".to_string(),
            ));
        }

        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TapperError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            device_id: device_id.into(),
            base_url,
            timeout,
            client,
            connected: true, // stateless: usable from construction
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Map a reqwest failure onto the error taxonomy: timeouts stay timeouts,
    /// connect failures become connection errors with a refused/unreachable
    /// sub-classification, everything else is a protocol error.
    fn classify(&self, operation: &str, err: reqwest::Error) -> TapperError {
        if err.is_timeout() {
            return TapperError::Timeout {
                device_id: self.device_id.clone(),
                protocol: PROTOCOL,
                operation: operation.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            };
        }

        if err.is_connect() {
            let message = match io_error_kind(&err) {
                Some(std::io::ErrorKind::ConnectionRefused) => {
                    "Connection refused - device reachable but HTTP server not running"
                }
                Some(std::io::ErrorKind::HostUnreachable)
                | Some(std::io::ErrorKind::NetworkUnreachable) => {
                    "Host unreachable - device not responding"
                }
                _ => "Connection error",
            };
            return TapperError::Connection {
                device_id: self.device_id.clone(),
                protocol: PROTOCOL,
                message: format!("cannot reach device for '{operation}': {message}"),
                details: Some(ConnectionDetails {
                    endpoint: Some(self.base_url.clone()),
                    port: None,
                    source_message: Some(err.to_string()),
                }),
            };
        }

        TapperError::protocol(&self.device_id, PROTOCOL, operation, err.to_string())
    }

    /// Protocol error for a non-2xx response, carrying code and reason.
    fn status_error(&self, operation: &str, status: reqwest::StatusCode) -> TapperError {
        TapperError::protocol(
            &self.device_id,
            PROTOCOL,
            operation,
            format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown Status")
            ),
        )
    }

    fn ensure_connected(&self, operation: &str) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(TapperError::connection(
                &self.device_id,
                PROTOCOL,
                format!("transport disconnected, refusing '{operation}'"),
            ))
        }
    }

    /// POST to one of the firmware's timed-motion endpoints
    /// (`/extend_for_time` or `/retract_for_time`) with a duration query.
    async fn timed_motion(&self, endpoint: &str, duration_ms: u64) -> Result<CommandResponse> {
        self.ensure_connected(endpoint)?;
        debug!(
            device_id = %self.device_id,
            duration_ms,
            "POST {}/{endpoint}", self.base_url
        );

        let response = self
            .client
            .post(format!("{}/{endpoint}", self.base_url))
            .query(&[("duration", duration_ms)])
            .send()
            .await
            .map_err(|e| {
                error!(device_id = %self.device_id, "{endpoint} request failed: {e}");
                self.classify(endpoint, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error(endpoint, status));
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.classify(endpoint, e))?;
        Ok(CommandResponse::Text(text.trim().to_string()))
    }
}

impl TapperProtocol for HttpTapperProtocol {
    fn protocol_name(&self) -> &'static str {
        PROTOCOL
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<()> {
        // No handshake to perform; the flag is the whole connection state.
        debug!(device_id = %self.device_id, "HTTP protocol is stateless, connect is a flag toggle");
        self.connected = true;
        Ok(())
    }

    async fn send_command(
        &self,
        command: &str,
        params: Option<&CommandParams>,
    ) -> Result<CommandResponse> {
        self.ensure_connected(command)?;

        let response = match params {
            Some(params) => {
                let mut payload = CommandParams::new();
                payload.insert("action".to_string(), Value::from(command));
                payload.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
                debug!(device_id = %self.device_id, "POST {}/command: {:?}", self.base_url, payload);
                self.client
                    .post(format!("{}/command", self.base_url))
                    .json(&Value::Object(payload))
                    .send()
                    .await
            }
            None => {
                debug!(device_id = %self.device_id, "GET {}/{command}", self.base_url);
                self.client
                    .get(format!("{}/{command}", self.base_url))
                    .send()
                    .await
            }
        }
        .map_err(|e| {
            error!(device_id = %self.device_id, "HTTP error sending command '{command}': {e}");
            self.classify(command, e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error(command, status));
        }

        // Content-Type decides JSON vs plain-text decoding.
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));

        let result = if is_json {
            let body: Value = response
                .json()
                .await
                .map_err(|e| self.classify(command, e))?;
            CommandResponse::Json(body)
        } else {
            let text = response.text().await.map_err(|e| self.classify(command, e))?;
            CommandResponse::Text(text)
        };

        debug!(device_id = %self.device_id, "command '{command}' response: {result:?}");
        Ok(result)
    }

    async fn get_status(&self) -> Result<TapperStatus> {
        self.ensure_connected("status")?;
        debug!(device_id = %self.device_id, "GET {}/status", self.base_url);

        let response = self
            .client
            .get(format!("{}/status", self.base_url))
            .send()
            .await
            .map_err(|e| self.classify("status", e))?;

        let code = response.status();
        if !code.is_success() {
            return Err(self.status_error("status", code));
        }

        let text = response.text().await.map_err(|e| self.classify("status", e))?;
        let status = TapperStatus::parse(&text);
        debug!(device_id = %self.device_id, "tapper status: {status}");
        Ok(status)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        debug!(device_id = %self.device_id, "HTTP protocol is stateless, disconnect is a flag toggle");
        Ok(())
    }

    async fn extend_for_time(&self, duration_ms: u64) -> Result<CommandResponse> {
        self.timed_motion("extend_for_time", duration_ms).await
    }

    async fn retract_for_time(&self, duration_ms: u64) -> Result<CommandResponse> {
        self.timed_motion("retract_for_time", duration_ms).await
    }
}

/// Walk the error source chain looking for the underlying io::Error kind.
fn io_error_kind(err: &reqwest::Error) -> Option<std::io::ErrorKind> {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(io_err) = inner.downcast_ref::<std::io::Error>() {
            return Some(io_err.kind());
        }
        source = inner.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_base_url_rejected_at_construction() {
        let config = HttpConfig {
            base_url: "   ".to_string(),
            timeout_ms: 2000,
        };
        let err = HttpTapperProtocol::new("station1", &config).unwrap_err();
        assert!(matches!(err, TapperError::Config(_)));
    }

    #[test]
    fn test_trailing_slash_stripped() {
        let config = HttpConfig::new("http://10.0.0.149/");
        let protocol = HttpTapperProtocol::new("station1", &config).unwrap();
        assert_eq!(protocol.base_url(), "http://10.0.0.149");
    }

    #[tokio::test]
    async fn test_connected_from_construction() {
        let config = HttpConfig::new("http://10.0.0.149");
        let mut protocol = HttpTapperProtocol::new("station1", &config).unwrap();
        assert!(protocol.is_connected());
        assert_eq!(protocol.active_protocols(), vec!["HTTP"]);

        protocol.disconnect().await.unwrap();
        assert!(!protocol.is_connected());
        // Idempotent
        protocol.disconnect().await.unwrap();
        assert!(!protocol.is_connected());

        protocol.connect().await.unwrap();
        assert!(protocol.is_connected());
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_connection_error() {
        let config = HttpConfig::new("http://10.0.0.149");
        let mut protocol = HttpTapperProtocol::new("station1", &config).unwrap();
        protocol.disconnect().await.unwrap();

        let err = protocol.send_command("tap", None).await.unwrap_err();
        assert!(matches!(err, TapperError::Connection { .. }));
    }
}
