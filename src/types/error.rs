//! Error taxonomy
//!
//! Low confidence and degenerate geometry are not errors: they are
//! reason codes on an `EvalResult` that fails closed.

use thiserror::Error;

use crate::types::{SessionAction, SessionState};

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed rule at activation time; the engine stays inert
    #[error("invalid rule config: {0}")]
    InvalidRuleConfig(String),

    /// Network or HTTP failure on a streamed frame
    #[error("transport failure: {0}")]
    Transport(String),

    /// Result arrived for a stopped or reset session
    #[error("stale session result discarded")]
    StaleSession,

    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: SessionState,
        action: SessionAction,
    },

    /// Frames and scores are only accepted while recording
    #[error("session is {0}, not recording")]
    NotRecording(SessionState),

    #[error("no active rule")]
    NoActiveRule,

    #[error("operation requires the {0} backend")]
    WrongBackend(&'static str),

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Transport(e.to_string())
    }
}
