//! Threshold Controller: auto vs manual thresholds for the remote matcher
//!
//! In AUTO mode the server's thresholds are authoritative and nothing is
//! attached to outgoing frames. In MANUAL mode a committed override rides
//! along with exactly one frame, then the pending flag clears.

use tracing::debug;

use crate::types::{ThresholdMode, Thresholds};

#[derive(Debug, Clone, Default)]
pub struct ThresholdController {
    mode: ThresholdMode,
    /// Last thresholds reported by the server
    server: Option<Thresholds>,
    /// User-adjusted values (kept across commits)
    manual: Option<Thresholds>,
    pending: bool,
}

impl ThresholdController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ThresholdMode {
        self.mode
    }

    /// Adjust the manual values and switch to MANUAL. Nothing is sent until
    /// `commit_override`.
    pub fn set_manual(&mut self, thresholds: Thresholds) {
        self.mode = ThresholdMode::Manual;
        self.manual = Some(thresholds);
    }

    /// Mark the manual values for the next outgoing frame.
    /// Returns false (and does nothing) outside MANUAL mode.
    pub fn commit_override(&mut self) -> bool {
        if self.mode != ThresholdMode::Manual || self.manual.is_none() {
            return false;
        }
        self.pending = true;
        true
    }

    /// The override to attach to the next frame, at most once per commit
    pub fn drain_override_for_next_frame(&mut self) -> Option<Thresholds> {
        if self.mode != ThresholdMode::Manual || !self.pending {
            return None;
        }
        self.pending = false;
        debug!(manual = ?self.manual, "attaching one-shot threshold override");
        self.manual
    }

    /// Back to AUTO: drop any pending override and restore server thresholds
    pub fn set_auto(&mut self) -> Option<Thresholds> {
        self.mode = ThresholdMode::Auto;
        self.pending = false;
        self.server
    }

    /// Record thresholds reported by the server
    pub fn observe_server(&mut self, thresholds: Thresholds) {
        self.server = Some(thresholds);
    }

    pub fn server_thresholds(&self) -> Option<Thresholds> {
        self.server
    }

    /// Thresholds currently in force from the client's point of view
    pub fn active(&self) -> Option<Thresholds> {
        match self.mode {
            ThresholdMode::Auto => self.server,
            ThresholdMode::Manual => self.manual,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }
}
