// MIT License - Copyright (c) 2026 tapper-bridge contributors

use std::fmt;

/// Extra context attached to connection failures (broker/endpoint details).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionDetails {
    /// HTTP base URL or MQTT broker host, whichever applies.
    pub endpoint: Option<String>,
    pub port: Option<u16>,
    /// Message from the underlying transport error.
    pub source_message: Option<String>,
}

impl fmt::Display for ConnectionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if let Some(ref ep) = self.endpoint {
            write!(f, "{ep}")?;
            wrote = true;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
            wrote = true;
        }
        if let Some(ref msg) = self.source_message {
            if wrote {
                write!(f, " - ")?;
            }
            write!(f, "{msg}")?;
        }
        Ok(())
    }
}

/// All errors produced by the tapper communication and sequencing layers.
///
/// Four kinds, matching how callers need to react:
/// - `Connection`: the transport cannot establish or use a connection.
/// - `Timeout`: an operation exceeded its allotted time.
/// - `Protocol`: the transport works but the operation itself failed
///   (bad HTTP status, encode failure, fallback chain exhausted).
/// - `Config`: malformed setup, raised at construction time.
#[derive(Debug, thiserror::Error)]
pub enum TapperError {
    #[error("[{protocol}/{device_id}] connection error: {message}")]
    Connection {
        device_id: String,
        protocol: &'static str,
        message: String,
        details: Option<ConnectionDetails>,
    },

    #[error("[{protocol}/{device_id}] '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        device_id: String,
        protocol: &'static str,
        operation: String,
        timeout_ms: u64,
    },

    #[error("[{protocol}/{device_id}] protocol error for command '{command}': {message}")]
    Protocol {
        device_id: String,
        protocol: &'static str,
        command: String,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl TapperError {
    pub fn connection(
        device_id: impl Into<String>,
        protocol: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Connection {
            device_id: device_id.into(),
            protocol,
            message: message.into(),
            details: None,
        }
    }

    pub fn protocol(
        device_id: impl Into<String>,
        protocol: &'static str,
        command: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Protocol {
            device_id: device_id.into(),
            protocol,
            command: command.into(),
            message: message.into(),
        }
    }

    /// Whether the failure is transient and worth retrying on another
    /// transport. Configuration errors are permanent by definition.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TapperError::Config(_))
    }

    /// The protocol that produced this error, if any.
    pub fn protocol_name(&self) -> Option<&'static str> {
        match self {
            TapperError::Connection { protocol, .. }
            | TapperError::Timeout { protocol, .. }
            | TapperError::Protocol { protocol, .. } => Some(protocol),
            TapperError::Config(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TapperError>;
