// MIT License - Copyright (c) 2026 tapper-bridge contributors

//! Timed dual-card tap sequences.
//!
//! The rig rests at a middle position between two card readers. Card 1 sits
//! in the extend direction, Card 2 in the retract direction. Every tap is an
//! out-and-back pair of timed motions, with the client waiting out each
//! motion before issuing the next; the firmware does no sequencing of its own
//! for these, so timing discipline lives entirely here.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::sequences::{
    wait_for_idle, wait_for_operation, Position, CARD1_EXTEND_MS, CARD1_RETURN_MS,
    CARD2_RETRACT_MS, CARD2_RETURN_MS, FULL_RETRACT_MS, MIDDLE_FROM_RETRACTED_MS,
    OPERATION_BUFFER_MS, QUICK_BUFFER_MS,
};
use crate::transport::TapperProtocol;

/// Pause between the two taps of a dual-card sequence.
const INTER_CARD_PAUSE: Duration = Duration::from_millis(500);
/// Pause between taps in an alternating run.
const ALTERNATING_PAUSE: Duration = Duration::from_millis(300);
/// Pause between firmware-endpoint operations.
const ENDPOINT_PAUSE: Duration = Duration::from_millis(200);
/// Settle time after a firmware-endpoint reset before tapping.
const ENDPOINT_RESET_SETTLE: Duration = Duration::from_millis(500);
/// Ceiling on the idle wait after a firmware-endpoint motion.
const ENDPOINT_IDLE_WAIT: Duration = Duration::from_secs(5);

/// Drive the actuator back to middle using timed motions.
///
/// With a known starting card the return is a single move. From an unknown
/// position the only safe recovery is a full retract to the hard stop
/// followed by a fixed extend back to middle.
pub async fn reset_to_middle_timed<P: TapperProtocol>(
    protocol: &P,
    from: Position,
) -> Result<()> {
    info!(device_id = %protocol.device_id(), "resetting to middle from {from:?}");

    match from {
        Position::Card1 => {
            debug!("from Card 1: retracting {CARD1_RETURN_MS}ms to middle");
            protocol.retract_for_time(CARD1_RETURN_MS).await?;
            wait_for_operation(CARD1_RETURN_MS, OPERATION_BUFFER_MS).await;
        }
        Position::Card2 => {
            debug!("from Card 2: extending {CARD2_RETURN_MS}ms to middle");
            protocol.extend_for_time(CARD2_RETURN_MS).await?;
            wait_for_operation(CARD2_RETURN_MS, OPERATION_BUFFER_MS).await;
        }
        Position::Unknown => {
            warn!(device_id = %protocol.device_id(), "unknown position, performing full reset");
            protocol.retract_for_time(FULL_RETRACT_MS).await?;
            wait_for_operation(FULL_RETRACT_MS, OPERATION_BUFFER_MS).await;
            protocol.extend_for_time(MIDDLE_FROM_RETRACTED_MS).await?;
            wait_for_operation(MIDDLE_FROM_RETRACTED_MS, OPERATION_BUFFER_MS).await;
        }
    }

    info!(device_id = %protocol.device_id(), "reset to middle complete");
    Ok(())
}

/// Tap Card 1: extend out, wait, return to middle.
pub async fn tap_card1_timed<P: TapperProtocol>(protocol: &P) -> Result<()> {
    tap_card1_with_times(protocol, CARD1_EXTEND_MS, CARD1_RETURN_MS).await
}

pub async fn tap_card1_with_times<P: TapperProtocol>(
    protocol: &P,
    extend_ms: u64,
    return_ms: u64,
) -> Result<()> {
    info!(
        device_id = %protocol.device_id(),
        "tapping Card 1: extend {extend_ms}ms, return {return_ms}ms"
    );

    protocol.extend_for_time(extend_ms).await?;
    wait_for_operation(extend_ms, OPERATION_BUFFER_MS).await;

    protocol.retract_for_time(return_ms).await?;
    wait_for_operation(return_ms, OPERATION_BUFFER_MS).await;

    info!(device_id = %protocol.device_id(), "Card 1 tap complete");
    Ok(())
}

/// Tap Card 2: retract out, wait, return to middle.
pub async fn tap_card2_timed<P: TapperProtocol>(protocol: &P) -> Result<()> {
    tap_card2_with_times(protocol, CARD2_RETRACT_MS, CARD2_RETURN_MS).await
}

pub async fn tap_card2_with_times<P: TapperProtocol>(
    protocol: &P,
    retract_ms: u64,
    return_ms: u64,
) -> Result<()> {
    info!(
        device_id = %protocol.device_id(),
        "tapping Card 2: retract {retract_ms}ms, return {return_ms}ms"
    );

    protocol.retract_for_time(retract_ms).await?;
    wait_for_operation(retract_ms, OPERATION_BUFFER_MS).await;

    protocol.extend_for_time(return_ms).await?;
    wait_for_operation(return_ms, OPERATION_BUFFER_MS).await;

    info!(device_id = %protocol.device_id(), "Card 2 tap complete");
    Ok(())
}

/// Card 1 tap with the reduced settle buffer, for tight tuning loops.
pub async fn quick_tap_card1<P: TapperProtocol>(protocol: &P) -> Result<()> {
    info!(device_id = %protocol.device_id(), "quick Card 1 tap");

    protocol.extend_for_time(CARD1_EXTEND_MS).await?;
    wait_for_operation(CARD1_EXTEND_MS, QUICK_BUFFER_MS).await;

    protocol.retract_for_time(CARD1_RETURN_MS).await?;
    wait_for_operation(CARD1_RETURN_MS, QUICK_BUFFER_MS).await;

    info!(device_id = %protocol.device_id(), "quick tap complete");
    Ok(())
}

/// Card 2 tap with the reduced settle buffer, for tight tuning loops.
pub async fn quick_tap_card2<P: TapperProtocol>(protocol: &P, extend_ms: u64) -> Result<()> {
    info!(device_id = %protocol.device_id(), "quick Card 2 tap, extend {extend_ms}ms");

    protocol.retract_for_time(CARD2_RETRACT_MS).await?;
    wait_for_operation(CARD2_RETRACT_MS, QUICK_BUFFER_MS).await;

    protocol.extend_for_time(extend_ms).await?;
    wait_for_operation(extend_ms, QUICK_BUFFER_MS).await;

    info!(device_id = %protocol.device_id(), "quick tap complete");
    Ok(())
}

/// Tap both cards: Card 1, a brief pause, then Card 2.
pub async fn dual_card_sequence_timed<P: TapperProtocol>(protocol: &P) -> Result<()> {
    info!(device_id = %protocol.device_id(), "starting dual card sequence");
    tap_card1_timed(protocol).await?;
    tokio::time::sleep(INTER_CARD_PAUSE).await;
    tap_card2_timed(protocol).await?;
    info!(device_id = %protocol.device_id(), "dual card sequence complete");
    Ok(())
}

/// Alternate Card 1 / Card 2 taps for `iterations` rounds.
pub async fn alternating_taps_timed<P: TapperProtocol>(
    protocol: &P,
    iterations: usize,
) -> Result<()> {
    info!(device_id = %protocol.device_id(), "starting {iterations} alternating taps");
    for round in 1..=iterations {
        debug!("alternating taps: round {round}/{iterations}");
        tap_card1_timed(protocol).await?;
        tokio::time::sleep(ALTERNATING_PAUSE).await;
        tap_card2_timed(protocol).await?;
        tokio::time::sleep(ALTERNATING_PAUSE).await;
    }
    info!(device_id = %protocol.device_id(), "alternating taps complete");
    Ok(())
}

/// Card 1 tap preceded by a full unknown-position reset.
pub async fn safe_tap_card1_timed<P: TapperProtocol>(protocol: &P) -> Result<()> {
    reset_to_middle_timed(protocol, Position::Unknown).await?;
    tap_card1_timed(protocol).await
}

/// Card 2 tap preceded by a full unknown-position reset.
pub async fn safe_tap_card2_timed<P: TapperProtocol>(protocol: &P) -> Result<()> {
    reset_to_middle_timed(protocol, Position::Unknown).await?;
    tap_card2_timed(protocol).await
}

// Firmware-endpoint variants. The device's built-in tap_card1 / tap_card2 /
// reset_to_middle commands do the motion timing on the ESP32 itself; the
// client paces the commands and confirms completion by polling for idle.

pub async fn simple_tap_card1<P: TapperProtocol>(protocol: &P) -> Result<()> {
    info!(device_id = %protocol.device_id(), "Card 1 tap via firmware endpoint");
    protocol.send_command("tap_card1", None).await?;
    wait_for_idle(protocol, ENDPOINT_IDLE_WAIT).await?;
    Ok(())
}

pub async fn simple_tap_card2<P: TapperProtocol>(protocol: &P) -> Result<()> {
    info!(device_id = %protocol.device_id(), "Card 2 tap via firmware endpoint");
    protocol.send_command("tap_card2", None).await?;
    wait_for_idle(protocol, ENDPOINT_IDLE_WAIT).await?;
    Ok(())
}

pub async fn simple_reset_to_middle<P: TapperProtocol>(protocol: &P) -> Result<()> {
    info!(device_id = %protocol.device_id(), "reset to middle via firmware endpoint");
    protocol.send_command("reset_to_middle", None).await?;
    wait_for_idle(protocol, ENDPOINT_IDLE_WAIT).await?;
    Ok(())
}

/// Full firmware-timed sequence: reset, Card 1, reset, Card 2, reset.
pub async fn simple_dual_card_sequence<P: TapperProtocol>(protocol: &P) -> Result<()> {
    info!(device_id = %protocol.device_id(), "starting firmware-endpoint dual card sequence");

    simple_reset_to_middle(protocol).await?;
    tokio::time::sleep(ENDPOINT_PAUSE).await;

    simple_tap_card1(protocol).await?;
    tokio::time::sleep(ENDPOINT_PAUSE).await;

    simple_reset_to_middle(protocol).await?;
    tokio::time::sleep(ENDPOINT_PAUSE).await;

    simple_tap_card2(protocol).await?;
    tokio::time::sleep(ENDPOINT_PAUSE).await;

    simple_reset_to_middle(protocol).await?;

    info!(device_id = %protocol.device_id(), "firmware-endpoint dual card sequence complete");
    Ok(())
}

pub async fn safe_simple_tap_card1<P: TapperProtocol>(protocol: &P) -> Result<()> {
    simple_reset_to_middle(protocol).await?;
    tokio::time::sleep(ENDPOINT_RESET_SETTLE).await;
    simple_tap_card1(protocol).await
}

pub async fn safe_simple_tap_card2<P: TapperProtocol>(protocol: &P) -> Result<()> {
    simple_reset_to_middle(protocol).await?;
    tokio::time::sleep(ENDPOINT_RESET_SETTLE).await;
    simple_tap_card2(protocol).await
}
