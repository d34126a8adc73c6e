// MIT License - Copyright (c) 2026 tapper-bridge contributors

use std::fmt;

/// Parsed device status.
///
/// The firmware reports status as a loosely formatted string (e.g. `"middle"`,
/// `"Position: card2"`, `"Operation: idle"`). This is the single place that
/// string is interpreted; everything downstream switches on the variant
/// instead of re-deriving substring heuristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapperStatus {
    /// Device is idle (no motion in progress).
    Idle,
    /// Actuator at the middle rest position.
    Middle,
    /// Actuator at the Card 1 (extended) position.
    Card1,
    /// Actuator at the Card 2 (retracted) position.
    Card2,
    /// Actuator extended past middle, not at a card position.
    Extended,
    /// Actuator retracted past middle, not at a card position.
    Retracted,
    /// Status string the parser does not recognize (raw text preserved).
    Unknown(String),
}

/// Positional drift classification relative to the nominal middle position,
/// used by the adaptive timing controller and the calibration sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    /// At middle; no correction needed.
    None,
    /// Overshot toward extension (card1 side); reduce extend time.
    TooFarForward,
    /// Undershot, still toward retraction (card2 side); increase extend time.
    TooFarBack,
    /// Cannot tell from the reported status.
    Indeterminate,
}

impl TapperStatus {
    /// Parse a raw status string from the device.
    ///
    /// Substring matching, case-insensitive. Position reports take precedence
    /// over the idle/operation marker since a settled device reports both
    /// (`"Position: middle, Operation: idle"`).
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lower = trimmed.to_lowercase();

        if lower.contains("middle") {
            Self::Middle
        } else if lower.contains("card1") {
            Self::Card1
        } else if lower.contains("card2") {
            Self::Card2
        } else if lower.contains("extended") {
            Self::Extended
        } else if lower.contains("retracted") {
            Self::Retracted
        } else if lower.contains("idle") {
            Self::Idle
        } else {
            Self::Unknown(trimmed.to_string())
        }
    }

    /// Whether the device has settled (idle or back at middle).
    /// This is the condition the idle-polling loops wait for.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Idle | Self::Middle)
    }

    /// Classify drift away from middle after a return-to-middle move.
    pub fn drift(&self) -> Drift {
        match self {
            Self::Middle => Drift::None,
            Self::Extended | Self::Card1 => Drift::TooFarForward,
            Self::Retracted | Self::Card2 => Drift::TooFarBack,
            Self::Idle | Self::Unknown(_) => Drift::Indeterminate,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::Middle => "middle",
            Self::Card1 => "card1",
            Self::Card2 => "card2",
            Self::Extended => "extended",
            Self::Retracted => "retracted",
            Self::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for TapperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
