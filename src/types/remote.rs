//! Remote scorer wire types and threshold values

use serde::{Deserialize, Serialize};

/// Enter/exit distance thresholds of a DTW-style matcher
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub enter: f64,
    pub exit: f64,
}

impl Thresholds {
    pub fn new(enter: f64, exit: f64) -> Self {
        Self { enter, exit }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Server-supplied thresholds are authoritative
    #[default]
    Auto,
    /// User thresholds, sent once per commit
    Manual,
}

/// Matcher-side position verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteState {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

/// Response body of the remote scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteScore {
    /// The matcher's own repetition counter
    pub reps: u64,
    pub distance: f64,
    pub state: RemoteState,
    /// Thresholds currently in force on the server, if it reports them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Thresholds>,
}
