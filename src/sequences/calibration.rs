// MIT License - Copyright (c) 2026 tapper-bridge contributors

//! Drift-compensating timing for the Card 2 return stroke.
//!
//! The retract stroke to Card 2 is mechanically repeatable, but the extend
//! stroke back to middle drifts with supply voltage and temperature. Two
//! tools compensate: [`AdaptiveTimings`] nudges the extend time after each
//! tap based on where the actuator actually ended up, and
//! [`calibrate_extend_time`] sweeps a set of candidate timings to find the
//! ones that land on middle.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::sequences::{wait_for_operation, CARD2_RETRACT_MS, CARD2_RETURN_MS, OPERATION_BUFFER_MS};
use crate::status::{Drift, TapperStatus};
use crate::transport::TapperProtocol;

/// Hard bounds on the adaptive extend time. Outside this window the rig is
/// mis-assembled, not mis-timed.
pub const EXTEND_FLOOR_MS: u64 = 1350;
pub const EXTEND_CEILING_MS: u64 = 1420;
/// Adjustment applied per observed drift.
pub const EXTEND_STEP_MS: u64 = 5;

/// How many recent drift observations to keep for diagnostics.
const DRIFT_HISTORY_LEN: usize = 5;

/// Candidate extend times swept by [`calibrate_extend_time`].
pub const CALIBRATION_CANDIDATES: [u64; 5] = [1375, 1380, 1385, 1390, 1395];

/// Pause between calibration samples.
const SAMPLE_PAUSE: Duration = Duration::from_millis(500);

/// Bang-bang controller for the Card 2 return stroke.
///
/// Overshoot past middle shortens the next extend, undershoot lengthens it,
/// clamped to `[EXTEND_FLOOR_MS, EXTEND_CEILING_MS]`. An indeterminate
/// reading leaves the timing untouched.
#[derive(Debug, Clone)]
pub struct AdaptiveTimings {
    retract_ms: u64,
    extend_ms: u64,
    history: Vec<Drift>,
}

impl Default for AdaptiveTimings {
    fn default() -> Self {
        Self {
            retract_ms: CARD2_RETRACT_MS,
            extend_ms: CARD2_RETURN_MS,
            history: Vec::new(),
        }
    }
}

impl AdaptiveTimings {
    pub fn retract_ms(&self) -> u64 {
        self.retract_ms
    }

    pub fn extend_ms(&self) -> u64 {
        self.extend_ms
    }

    /// Recent drift observations, oldest first.
    pub fn history(&self) -> &[Drift] {
        &self.history
    }

    /// Feed one post-tap status reading into the controller.
    pub fn observe(&mut self, status: &TapperStatus) -> Drift {
        let drift = status.drift();
        match drift {
            Drift::TooFarForward => {
                self.extend_ms = self.extend_ms.saturating_sub(EXTEND_STEP_MS).max(EXTEND_FLOOR_MS);
                debug!("overshoot, extend time reduced to {}ms", self.extend_ms);
            }
            Drift::TooFarBack => {
                self.extend_ms = (self.extend_ms + EXTEND_STEP_MS).min(EXTEND_CEILING_MS);
                debug!("undershoot, extend time increased to {}ms", self.extend_ms);
            }
            Drift::None => debug!("landed on middle, timing unchanged"),
            Drift::Indeterminate => debug!("indeterminate reading, timing unchanged"),
        }

        self.history.push(drift);
        if self.history.len() > DRIFT_HISTORY_LEN {
            self.history.remove(0);
        }
        drift
    }
}

/// One Card 2 tap driven by (and feeding back into) the adaptive timings.
/// Returns the post-tap status for the caller's own drift analysis.
pub async fn adaptive_tap_card2<P: TapperProtocol>(
    protocol: &P,
    timings: &mut AdaptiveTimings,
) -> Result<TapperStatus> {
    info!(
        device_id = %protocol.device_id(),
        "adaptive Card 2 tap: retract {}ms, extend {}ms",
        timings.retract_ms(),
        timings.extend_ms()
    );

    protocol.retract_for_time(timings.retract_ms()).await?;
    wait_for_operation(timings.retract_ms(), OPERATION_BUFFER_MS).await;

    protocol.extend_for_time(timings.extend_ms()).await?;
    wait_for_operation(timings.extend_ms(), OPERATION_BUFFER_MS).await;

    let status = protocol.get_status().await?;
    let drift = timings.observe(&status);
    info!(
        device_id = %protocol.device_id(),
        "adaptive tap complete: landed at '{status}' ({drift:?}), next extend {}ms",
        timings.extend_ms()
    );
    Ok(status)
}

/// Result of one calibration sample.
#[derive(Debug, Clone)]
pub struct CalibrationSample {
    pub extend_ms: u64,
    pub before: TapperStatus,
    pub after: TapperStatus,
    pub drift: Drift,
}

impl CalibrationSample {
    pub fn is_perfect(&self) -> bool {
        self.drift == Drift::None
    }
}

/// Full sweep report.
#[derive(Debug, Clone, Default)]
pub struct CalibrationReport {
    pub samples: Vec<CalibrationSample>,
}

impl CalibrationReport {
    /// First candidate that landed on middle, if any.
    pub fn recommended_extend_ms(&self) -> Option<u64> {
        self.samples.iter().find(|s| s.is_perfect()).map(|s| s.extend_ms)
    }
}

/// Sweep the candidate extend times, one full Card 2 tap per candidate,
/// recording where the actuator lands each time.
pub async fn calibrate_extend_time<P: TapperProtocol>(protocol: &P) -> Result<CalibrationReport> {
    info!(device_id = %protocol.device_id(), "starting extend-time calibration sweep");
    let mut report = CalibrationReport::default();

    for &extend_ms in &CALIBRATION_CANDIDATES {
        info!("testing extend time {extend_ms}ms");
        let before = protocol.get_status().await?;

        protocol.retract_for_time(CARD2_RETRACT_MS).await?;
        wait_for_operation(CARD2_RETRACT_MS, OPERATION_BUFFER_MS).await;

        protocol.extend_for_time(extend_ms).await?;
        wait_for_operation(extend_ms, OPERATION_BUFFER_MS).await;

        let after = protocol.get_status().await?;
        let drift = after.drift();
        info!("result for {extend_ms}ms: landed at '{after}' ({drift:?})");

        report.samples.push(CalibrationSample {
            extend_ms,
            before,
            after,
            drift,
        });
        tokio::time::sleep(SAMPLE_PAUSE).await;
    }

    match report.recommended_extend_ms() {
        Some(ms) => info!("calibration complete, recommended extend time: {ms}ms"),
        None => warn!("no candidate landed on middle, manual adjustment needed"),
    }
    Ok(report)
}
