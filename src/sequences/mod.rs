// MIT License - Copyright (c) 2026 tapper-bridge contributors

//! Card tap sequencing on top of the transport layer.
//!
//! Two generations of sequences exist. The timed sequences (`dual_card`,
//! `calibration`) drive the actuator with explicit millisecond durations and
//! client-side waits; the legacy sequences (`single_card`) use the older
//! start/stop command pairs. All sequence functions are generic over
//! [`TapperProtocol`] so they run unchanged over HTTP, MQTT, or the fallback
//! composite.

pub mod calibration;
pub mod dual_card;
pub mod single_card;

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Result;
use crate::status::TapperStatus;
use crate::transport::TapperProtocol;

/// Measured travel times for the dual-card rig, in milliseconds.
///
/// Return times are deliberately a hair shorter than the outbound times; the
/// mechanism coasts slightly, and symmetric timing accumulates forward drift.
pub const CARD1_EXTEND_MS: u64 = 1000;
pub const CARD1_RETURN_MS: u64 = 995;
pub const CARD2_RETRACT_MS: u64 = 1400;
pub const CARD2_RETURN_MS: u64 = 1395;

/// Full retract from any position (worst-case travel plus margin).
pub const FULL_RETRACT_MS: u64 = 2611;
/// Extend from fully retracted back to the middle rest position.
pub const MIDDLE_FROM_RETRACTED_MS: u64 = 1284;

/// Settle buffer added after each timed motion.
pub const OPERATION_BUFFER_MS: u64 = 50;
/// Reduced buffer for the quick-tap variants.
pub const QUICK_BUFFER_MS: u64 = 25;

/// Poll interval while waiting for the device to report idle.
pub const IDLE_POLL_INTERVAL_MS: u64 = 100;

/// Position hint for [`dual_card::reset_to_middle_timed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    Card1,
    Card2,
    #[default]
    Unknown,
}

/// Wait out a timed motion: the commanded duration plus a settle buffer.
pub async fn wait_for_operation(duration_ms: u64, buffer_ms: u64) {
    tokio::time::sleep(Duration::from_millis(duration_ms + buffer_ms)).await;
}

/// Poll the device until it reports a settled status (idle or middle).
///
/// Returns `Ok(true)` once settled, `Ok(false)` if `max_wait` elapses first.
/// Transient status failures are logged and treated as "not settled yet";
/// the fallback chain may still be recovering mid-sequence.
pub async fn wait_for_idle<P: TapperProtocol>(protocol: &P, max_wait: Duration) -> Result<bool> {
    let interval = Duration::from_millis(IDLE_POLL_INTERVAL_MS);
    let deadline = tokio::time::Instant::now() + max_wait;

    loop {
        match protocol.get_status().await {
            Ok(status) if status.is_settled() => {
                debug!(device_id = %protocol.device_id(), "device settled at '{status}'");
                return Ok(true);
            }
            Ok(status) => {
                debug!(device_id = %protocol.device_id(), "still moving: '{status}'");
            }
            Err(e) => {
                warn!(device_id = %protocol.device_id(), "status poll failed while waiting for idle: {e}");
            }
        }
        if tokio::time::Instant::now() + interval > deadline {
            warn!(
                device_id = %protocol.device_id(),
                "device did not settle within {}ms", max_wait.as_millis()
            );
            return Ok(false);
        }
        tokio::time::sleep(interval).await;
    }
}
