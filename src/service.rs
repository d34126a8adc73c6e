// MIT License - Copyright (c) 2026 tapper-bridge contributors

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Result, TapperError};
use crate::registry::{SharedTapper, TapperRegistry};
use crate::status::TapperStatus;
use crate::transport::{CommandParams, CommandResponse, TapperProtocol};

const SERVICE: &str = "Service";

/// Snapshot from [`TapperService::health_check`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub station_id: String,
    pub checked_at: DateTime<Utc>,
    pub service_connected: bool,
    pub active_protocols: Vec<&'static str>,
    /// Device status string, or "disconnected"/"error".
    pub device_status: String,
    pub last_error: Option<String>,
}

/// High-level interface to one station's tapper.
///
/// Owns a registry and the station's chain handle; sequence functions take
/// the protocol handle from [`TapperService::protocol`] and drive it
/// directly.
///
/// ```no_run
/// # async fn run() -> tapper_bridge::error::Result<()> {
/// use tapper_bridge::sequences::dual_card;
/// use tapper_bridge::service::TapperService;
///
/// let config = toml::from_str(r#"
///     [stations.station1.http]
///     base_url = "http://10.0.0.149"
///     [stations.station1.mqtt]
/// "#).expect("config");
///
/// let mut service = TapperService::new("station1", config);
/// service.connect().await?;
///
/// let tapper = service.protocol()?;
/// dual_card::dual_card_sequence_timed(&*tapper.lock().await).await?;
///
/// service.disconnect().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TapperService {
    station_id: String,
    registry: TapperRegistry,
    protocol: Option<SharedTapper>,
}

impl TapperService {
    pub fn new(station_id: impl Into<String>, config: Config) -> Self {
        Self {
            station_id: station_id.into(),
            registry: TapperRegistry::new(config),
            protocol: None,
        }
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    /// Build (or reuse) the station's chain and report whether any protocol
    /// came up. Config problems are errors; a station that is merely
    /// unreachable returns `Ok(false)`.
    pub async fn connect(&mut self) -> Result<bool> {
        debug!("connecting to tapper on station '{}'", self.station_id);
        let tapper = match self.registry.get_tapper(&self.station_id).await {
            Ok(tapper) => tapper,
            Err(e) => {
                self.registry.invalidate(&self.station_id).await;
                error!("failed to connect tapper for station '{}': {e}", self.station_id);
                return Err(e);
            }
        };

        let connected = {
            let chain = tapper.lock().await;
            if chain.is_connected() {
                info!("tapper connected via {}", chain.active_protocols().join(","));
                true
            } else {
                warn!(
                    "protocol created but not connected for station '{}'",
                    self.station_id
                );
                false
            }
        };

        self.protocol = Some(tapper);
        Ok(connected)
    }

    /// Disconnect and drop the cached chain. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        if let Some(tapper) = self.protocol.take() {
            if let Err(e) = tapper.lock().await.disconnect().await {
                warn!("error during disconnect for station '{}': {e}", self.station_id);
            }
            debug!("disconnected tapper for station '{}'", self.station_id);
        }
        self.registry.invalidate(&self.station_id).await;
    }

    pub async fn is_connected(&self) -> bool {
        match &self.protocol {
            Some(tapper) => tapper.lock().await.is_connected(),
            None => false,
        }
    }

    /// Handle to the underlying chain for driving sequences.
    pub fn protocol(&self) -> Result<SharedTapper> {
        self.protocol.clone().ok_or_else(|| self.not_connected())
    }

    pub async fn get_status(&self) -> Result<TapperStatus> {
        let tapper = self.ensure_connected().await?;
        let status = tapper.lock().await.get_status().await.inspect_err(|e| {
            error!("failed to get status for station '{}': {e}", self.station_id);
        })?;
        debug!("tapper status for station '{}': {status}", self.station_id);
        Ok(status)
    }

    pub async fn send_command(
        &self,
        command: &str,
        params: Option<&CommandParams>,
    ) -> Result<CommandResponse> {
        let tapper = self.ensure_connected().await?;
        debug!("sending command '{command}' to station '{}'", self.station_id);
        let response = tapper
            .lock()
            .await
            .send_command(command, params)
            .await
            .inspect_err(|e| {
                error!(
                    "failed to send command '{command}' to station '{}': {e}",
                    self.station_id
                );
            })?;
        debug!("command '{command}' completed for station '{}'", self.station_id);
        Ok(response)
    }

    /// Connectivity and device-status snapshot. Never fails; problems land
    /// in `last_error`.
    pub async fn health_check(&self) -> HealthReport {
        let mut report = HealthReport {
            station_id: self.station_id.clone(),
            checked_at: Utc::now(),
            service_connected: self.is_connected().await,
            active_protocols: Vec::new(),
            device_status: "unknown".to_string(),
            last_error: None,
        };

        if let Some(tapper) = &self.protocol {
            report.active_protocols = tapper.lock().await.active_protocols();
            if report.service_connected {
                match self.get_status().await {
                    Ok(status) => report.device_status = status.to_string(),
                    Err(e) => {
                        report.device_status = "error".to_string();
                        report.last_error = Some(e.to_string());
                    }
                }
            } else {
                report.device_status = "disconnected".to_string();
            }
        }

        report
    }

    async fn ensure_connected(&self) -> Result<&SharedTapper> {
        if let Some(tapper) = &self.protocol {
            if tapper.lock().await.is_connected() {
                return Ok(tapper);
            }
        }
        Err(self.not_connected())
    }

    fn not_connected(&self) -> TapperError {
        TapperError::connection(
            &self.station_id,
            SERVICE,
            "tapper not connected, call connect() first",
        )
    }
}
