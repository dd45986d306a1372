//! Hysteresis phase and per-rule engine state

use serde::{Deserialize, Serialize};

/// The two phases of a repetition cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Waiting for the rule to hold for `confirm_frames`
    #[default]
    WaitingEnter,
    /// In position, waiting for the rule to release for `confirm_frames`
    WaitingExit,
}

impl Phase {
    /// Get ANSI color code for terminal display
    pub fn color_code(&self) -> &'static str {
        match self {
            Phase::WaitingEnter => "\x1b[90m", // Gray
            Phase::WaitingExit => "\x1b[33m",  // Yellow
        }
    }

    /// Reset ANSI color
    pub fn color_reset() -> &'static str {
        "\x1b[0m"
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::WaitingEnter => "WAITING_ENTER",
            Phase::WaitingExit => "WAITING_EXIT",
        };
        write!(f, "{}", name)
    }
}

/// Axis tracking for Direction rules
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionTrack {
    /// Last normalized axis sample
    pub prev_axis_value: Option<f64>,
    /// Signed, direction-corrected movement since the last completed cycle
    pub movement_accumulator: f64,
}

/// Mutable state of one active rule
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineState {
    pub phase: Phase,
    /// Consecutive triggered frames; zero whenever `untriggered_streak` > 0
    pub triggered_streak: u32,
    /// Consecutive untriggered frames; zero whenever `triggered_streak` > 0
    pub untriggered_streak: u32,
    pub motion: MotionTrack,
    /// A non-repeatable rule has produced its single count
    pub counted_once: bool,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to initial values
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_initial(&self) -> bool {
        *self == Self::new()
    }
}
