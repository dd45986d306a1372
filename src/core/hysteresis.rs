//! Hysteresis State Machine: debounced enter/exit cycle detection
//!
//! State transitions:
//! - WAITING_ENTER → WAITING_EXIT: `confirm_frames` consecutive triggered frames
//! - WAITING_EXIT → WAITING_ENTER: `confirm_frames` consecutive untriggered
//!   frames; this is a completed repetition
//!
//! Debouncing both edges rejects single-frame jitter symmetrically. A rule
//! that never becomes evaluable again simply parks in its current phase.

use tracing::debug;

use crate::types::{EngineState, Phase, RepCompleted};

#[derive(Debug, Clone)]
pub struct HysteresisStateMachine {
    confirm_frames: u32,
    state: EngineState,
}

impl HysteresisStateMachine {
    /// `confirm_frames` of 0 behaves like 1
    pub fn new(confirm_frames: u32) -> Self {
        Self {
            confirm_frames: confirm_frames.max(1),
            state: EngineState::new(),
        }
    }

    /// Feed one verdict; returns `Some` exactly once per full cycle
    pub fn observe(&mut self, triggered: bool) -> Option<RepCompleted> {
        let s = &mut self.state;

        if triggered {
            s.triggered_streak = s.triggered_streak.saturating_add(1);
            s.untriggered_streak = 0;

            if s.phase == Phase::WaitingEnter && s.triggered_streak >= self.confirm_frames {
                s.phase = Phase::WaitingExit;
                debug!(streak = s.triggered_streak, "phase WAITING_ENTER -> WAITING_EXIT");
            }
            return None;
        }

        s.untriggered_streak = s.untriggered_streak.saturating_add(1);
        s.triggered_streak = 0;

        if s.phase == Phase::WaitingExit && s.untriggered_streak >= self.confirm_frames {
            s.phase = Phase::WaitingEnter;
            s.motion.movement_accumulator = 0.0;
            debug!(streak = s.untriggered_streak, "phase WAITING_EXIT -> WAITING_ENTER, cycle complete");
            return Some(RepCompleted);
        }
        None
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn confirm_frames(&self) -> u32 {
        self.confirm_frames
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Mutable access for the evaluator's motion track and the counter's flag
    pub fn state_mut(&mut self) -> &mut EngineState {
        &mut self.state
    }

    /// Reset engine to initial state
    pub fn reset(&mut self) {
        self.state.reset();
    }
}

// =============================================================================
// TESTS
// =============================================================================
