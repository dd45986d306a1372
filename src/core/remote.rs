//! Remote Rep Tracker: turns remote scorer responses into a count
//!
//! Two interpretations of a `RemoteScore`:
//! - RELAY: adopt the matcher's own `reps` counter (never decreasing locally)
//! - HYSTERESIS: `state == IN` is the trigger signal, debounced through the
//!   same state machine the local rule path uses

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::RepetitionCounter;
use crate::types::{Phase, RemoteScore, RemoteState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteMode {
    #[default]
    Relay,
    Hysteresis,
}

/// Outcome of applying one remote score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RemoteUpdate {
    pub count: u64,
    /// Count grew on this response
    pub completed: bool,
    pub state: RemoteState,
    pub distance: f64,
}

#[derive(Debug, Clone)]
pub struct RemoteRepTracker {
    mode: RemoteMode,
    counter: RepetitionCounter,
    relayed: u64,
    last_distance: Option<f64>,
}

impl RemoteRepTracker {
    /// `confirm_frames` only matters in HYSTERESIS mode
    pub fn new(mode: RemoteMode, confirm_frames: u32) -> Self {
        Self {
            mode,
            counter: RepetitionCounter::new(confirm_frames, true),
            relayed: 0,
            last_distance: None,
        }
    }

    pub fn mode(&self) -> RemoteMode {
        self.mode
    }

    pub fn apply(&mut self, score: &RemoteScore) -> RemoteUpdate {
        self.last_distance = Some(score.distance);

        let completed = match self.mode {
            RemoteMode::Relay => {
                if score.reps < self.relayed {
                    warn!(remote = score.reps, local = self.relayed, "remote reps went backwards, ignored");
                    false
                } else {
                    let grew = score.reps > self.relayed;
                    self.relayed = score.reps;
                    grew
                }
            }
            RemoteMode::Hysteresis => self.counter.observe(score.state == RemoteState::In),
        };

        RemoteUpdate {
            count: self.count(),
            completed,
            state: score.state,
            distance: score.distance,
        }
    }

    pub fn count(&self) -> u64 {
        match self.mode {
            RemoteMode::Relay => self.relayed,
            RemoteMode::Hysteresis => self.counter.count(),
        }
    }

    /// Local phase; relay mode has no local machine and stays WAITING_ENTER
    pub fn phase(&self) -> Phase {
        self.counter.machine().phase()
    }

    pub fn last_distance(&self) -> Option<f64> {
        self.last_distance
    }

    pub fn reset(&mut self) {
        self.counter.reset();
        self.relayed = 0;
        self.last_distance = None;
    }
}
