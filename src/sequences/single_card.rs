// MIT License - Copyright (c) 2026 tapper-bridge contributors

//! Legacy single-card sequences.
//!
//! These predate the timed-motion firmware endpoints: motion is started with
//! a bare `extend`/`retract` command and stopped with `stop` after a
//! client-side delay, and "home" is the fully retracted hard stop rather
//! than the dual-card middle position. Kept for rigs still running the old
//! single-reader fixture.

use std::time::Duration;

use tracing::{debug, info};

use crate::error::Result;
use crate::sequences::wait_for_idle;
use crate::transport::TapperProtocol;

/// Worst-case full retract travel for the legacy rig.
const HOME_RESET_TIME: Duration = Duration::from_secs(3);
/// Extend hold during a simple tap.
const SIMPLE_TAP_EXTEND: Duration = Duration::from_millis(1650);
/// Retract travel after a simple tap.
const SIMPLE_TAP_RETRACT: Duration = Duration::from_secs(2);
/// How long double taps wait for the first tap to finish.
const DOUBLE_TAP_IDLE_WAIT: Duration = Duration::from_secs(10);

/// Drive to the home (fully retracted) position.
pub async fn reset_to_home<P: TapperProtocol>(protocol: &P) -> Result<()> {
    info!(device_id = %protocol.device_id(), "resetting to home position");
    protocol.send_command("retract", None).await?;
    tokio::time::sleep(HOME_RESET_TIME).await;
    protocol.send_command("stop", None).await?;
    info!(device_id = %protocol.device_id(), "at home position");
    Ok(())
}

/// Simple tap: extend, hold, retract, stop.
pub async fn simple_tap<P: TapperProtocol>(protocol: &P) -> Result<()> {
    debug!(device_id = %protocol.device_id(), "starting simple tap");
    protocol.send_command("extend", None).await?;
    tokio::time::sleep(SIMPLE_TAP_EXTEND).await;
    protocol.send_command("retract", None).await?;
    tokio::time::sleep(SIMPLE_TAP_RETRACT).await;
    protocol.send_command("stop", None).await?;
    info!(device_id = %protocol.device_id(), "simple tap complete");
    Ok(())
}

/// Long tap via the firmware's built-in `tap` command.
pub async fn long_tap<P: TapperProtocol>(protocol: &P) -> Result<()> {
    debug!(device_id = %protocol.device_id(), "starting long tap");
    protocol.send_command("tap", None).await?;
    info!(device_id = %protocol.device_id(), "long tap complete");
    Ok(())
}

/// Two firmware taps separated by `delay`, waiting for the first to finish.
pub async fn double_tap<P: TapperProtocol>(protocol: &P, delay: Duration) -> Result<()> {
    info!(
        device_id = %protocol.device_id(),
        "starting double tap with {}ms delay", delay.as_millis()
    );
    protocol.send_command("tap", None).await?;
    wait_for_idle(protocol, DOUBLE_TAP_IDLE_WAIT).await?;
    tokio::time::sleep(delay).await;
    protocol.send_command("tap", None).await?;
    info!(device_id = %protocol.device_id(), "double tap complete");
    Ok(())
}

/// Tap with caller-chosen extend hold and retract travel.
pub async fn custom_sequence<P: TapperProtocol>(
    protocol: &P,
    extend: Duration,
    retract: Duration,
) -> Result<()> {
    info!(
        device_id = %protocol.device_id(),
        "custom sequence: extend {}ms, retract {}ms",
        extend.as_millis(),
        retract.as_millis()
    );
    protocol.send_command("extend", None).await?;
    tokio::time::sleep(extend).await;
    protocol.send_command("retract", None).await?;
    tokio::time::sleep(retract).await;
    protocol.send_command("stop", None).await?;
    info!(device_id = %protocol.device_id(), "custom sequence complete");
    Ok(())
}

pub async fn safe_simple_tap<P: TapperProtocol>(protocol: &P) -> Result<()> {
    reset_to_home(protocol).await?;
    simple_tap(protocol).await
}

pub async fn safe_long_tap<P: TapperProtocol>(protocol: &P) -> Result<()> {
    reset_to_home(protocol).await?;
    long_tap(protocol).await
}

pub async fn safe_double_tap<P: TapperProtocol>(protocol: &P, delay: Duration) -> Result<()> {
    reset_to_home(protocol).await?;
    double_tap(protocol, delay).await
}

pub async fn safe_custom_sequence<P: TapperProtocol>(
    protocol: &P,
    extend: Duration,
    retract: Duration,
) -> Result<()> {
    reset_to_home(protocol).await?;
    custom_sequence(protocol, extend, retract).await
}
