// MIT License - Copyright (c) 2026 tapper-bridge contributors
//
//! # tapper-bridge
//!
//! Dual-protocol (HTTP/MQTT) control of ESP32 card-tapper devices with
//! automatic failover and millisecond-timed dual-card tap sequencing.
//!
//! Each test station is backed by a fallback chain of transports tried in
//! configured priority order; the first transport that works is cached and
//! reused until it fails. Tap sequences run on top of the chain and never
//! care which transport carried the command.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tapper_bridge::sequences::dual_card;
//! use tapper_bridge::{Config, TapperService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config: Config = toml::from_str(
//!         &std::fs::read_to_string("config.toml")?,
//!     )?;
//!
//!     let mut service = TapperService::new("station1", config);
//!     service.connect().await?;
//!
//!     let tapper = service.protocol()?;
//!     dual_card::dual_card_sequence_timed(&*tapper.lock().await).await?;
//!
//!     println!("status: {}", service.get_status().await?);
//!     service.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod registry;
pub mod sequences;
pub mod service;
pub mod status;
pub mod transport;

// Re-exports for convenience
pub use config::{Config, HttpConfig, MqttConfig, ProtocolKind, StationConfig};
pub use error::{Result, TapperError};
pub use registry::TapperRegistry;
pub use service::{HealthReport, TapperService};
pub use status::{Drift, TapperStatus};
pub use transport::fallback::FallbackTapperProtocol;
pub use transport::{CommandResponse, TapperProtocol, TapperTransport};
