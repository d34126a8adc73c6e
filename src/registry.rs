// MIT License - Copyright (c) 2026 tapper-bridge contributors

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{Config, ProtocolKind};
use crate::error::Result;
use crate::transport::fallback::FallbackTapperProtocol;
use crate::transport::http::HttpTapperProtocol;
use crate::transport::mqtt::MqttTapperProtocol;
use crate::transport::{TapperProtocol, TapperTransport};

/// Shared handle to one station's fallback chain.
pub type SharedTapper = Arc<Mutex<FallbackTapperProtocol>>;

/// Builds and caches one fallback chain per test station.
///
/// Construction is config-driven: the station's `protocols` list gives the
/// fallback priority order, and each listed protocol must have its settings
/// section present (validated before anything is built). The registry is an
/// ordinary value owned by its caller; two registries over the same config
/// are independent and share nothing.
#[derive(Debug)]
pub struct TapperRegistry {
    config: Config,
    cache: HashMap<String, SharedTapper>,
}

impl TapperRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cache: HashMap::new(),
        }
    }

    /// Get (or build) the tapper chain for a station.
    ///
    /// The first call builds the chain and attempts an initial connect; a
    /// connect failure is logged but not fatal, since the chain retries on
    /// every command anyway. Later calls return the cached instance.
    pub async fn get_tapper(&mut self, station_id: &str) -> Result<SharedTapper> {
        if let Some(tapper) = self.cache.get(station_id) {
            debug!("using cached tapper for station '{station_id}'");
            return Ok(Arc::clone(tapper));
        }

        debug!("creating tapper for station '{station_id}'");
        let station = self.config.station(station_id)?;
        station.validate(station_id)?;
        let device_id = station.device_id_or(station_id);
        debug!("station '{station_id}' maps to device_id '{device_id}'");

        let mut members = Vec::new();
        for kind in &station.protocols {
            match kind {
                ProtocolKind::Mqtt => {
                    // validate() guarantees the section is present
                    if let Some(mqtt) = &station.mqtt {
                        debug!("adding MQTT protocol for device '{device_id}'");
                        members.push(TapperTransport::Mqtt(MqttTapperProtocol::new(
                            &device_id, mqtt,
                        )));
                    }
                }
                ProtocolKind::Http => {
                    if let Some(http) = &station.http {
                        debug!("adding HTTP protocol for device '{device_id}'");
                        members.push(TapperTransport::Http(HttpTapperProtocol::new(
                            &device_id, http,
                        )?));
                    }
                }
            }
        }

        let mut chain = FallbackTapperProtocol::new(device_id, members)?;
        if let Err(e) = chain.connect().await {
            warn!("initial connection failed for station '{station_id}': {e}");
        }

        let active = chain.active_protocols();
        if active.is_empty() {
            warn!("station '{station_id}' loaded but no protocols connected");
        } else {
            info!("station '{station_id}' connected via {}", active.join(","));
        }

        let tapper = Arc::new(Mutex::new(chain));
        self.cache.insert(station_id.to_string(), Arc::clone(&tapper));
        Ok(tapper)
    }

    /// Drop the cached chain for a station, disconnecting it first.
    pub async fn invalidate(&mut self, station_id: &str) {
        if let Some(tapper) = self.cache.remove(station_id) {
            debug!("invalidating cached tapper for station '{station_id}'");
            let mut chain = tapper.lock().await;
            if let Err(e) = chain.disconnect().await {
                warn!("error disconnecting cached tapper for '{station_id}': {e}");
            }
        }
    }

    pub fn is_cached(&self, station_id: &str) -> bool {
        self.cache.contains_key(station_id)
    }
}
