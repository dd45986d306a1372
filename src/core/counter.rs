//! Repetition Counter: the externally visible count
//!
//! Wraps the hysteresis machine with the `repeatable` policy. A
//! non-repeatable rule contributes at most one repetition per session.

use tracing::{debug, info};

use crate::core::HysteresisStateMachine;

#[derive(Debug, Clone)]
pub struct RepetitionCounter {
    machine: HysteresisStateMachine,
    repeatable: bool,
    count: u64,
}

impl RepetitionCounter {
    pub fn new(confirm_frames: u32, repeatable: bool) -> Self {
        Self {
            machine: HysteresisStateMachine::new(confirm_frames),
            repeatable,
            count: 0,
        }
    }

    /// Feed one verdict; true when this frame added to the count
    pub fn observe(&mut self, triggered: bool) -> bool {
        match self.machine.observe(triggered) {
            Some(_) => self.on_rep_completed(),
            None => false,
        }
    }

    /// Apply the repeatable policy to a completed cycle
    pub fn on_rep_completed(&mut self) -> bool {
        if self.repeatable {
            self.count += 1;
            info!(count = self.count, "repetition counted");
            return true;
        }

        let state = self.machine.state_mut();
        if state.counted_once {
            debug!("non-repeatable rule already counted, cycle dropped");
            return false;
        }
        state.counted_once = true;
        self.count += 1;
        info!(count = self.count, "repetition counted (non-repeatable)");
        true
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn repeatable(&self) -> bool {
        self.repeatable
    }

    pub fn machine(&self) -> &HysteresisStateMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut HysteresisStateMachine {
        &mut self.machine
    }

    /// Zero the count and the owned engine state, including `counted_once`
    pub fn reset(&mut self) {
        self.count = 0;
        self.machine.reset();
    }
}

// =============================================================================
// TESTS
// =============================================================================
