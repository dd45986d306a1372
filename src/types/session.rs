//! Recording session state machine
//!
//! Allowed transitions:
//! - IDLE → RECORDING: start
//! - RECORDING ⇄ PAUSED: pause / resume
//! - RECORDING ⇄ RESTING: rest / resume
//! - RECORDING | PAUSED | RESTING → COMPLETED: finish
//! - any → IDLE: stop

use serde::{Deserialize, Serialize};

use crate::types::{EngineError, Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    Idle,
    Recording,
    Paused,
    Resting,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionAction {
    Start,
    Pause,
    Resume,
    Rest,
    Finish,
    Stop,
}

impl SessionState {
    /// Next state for `action`, or `InvalidTransition`
    pub fn apply(self, action: SessionAction) -> Result<SessionState, EngineError> {
        use SessionAction as A;
        use SessionState as S;

        let next = match (self, action) {
            (S::Idle, A::Start) => S::Recording,
            (S::Recording, A::Pause) => S::Paused,
            (S::Paused, A::Resume) | (S::Resting, A::Resume) => S::Recording,
            (S::Recording, A::Rest) => S::Resting,
            (S::Recording | S::Paused | S::Resting, A::Finish) => S::Completed,
            (_, A::Stop) => S::Idle,
            (from, action) => return Err(EngineError::InvalidTransition { from, action }),
        };
        Ok(next)
    }

    /// Frames are only delivered while recording
    pub fn accepts_frames(self) -> bool {
        self == SessionState::Recording
    }

    /// Get ANSI color code for terminal display
    pub fn color_code(&self) -> &'static str {
        match self {
            SessionState::Idle => "\x1b[90m",      // Gray
            SessionState::Recording => "\x1b[32m", // Green
            SessionState::Paused => "\x1b[33m",    // Yellow
            SessionState::Resting => "\x1b[36m",   // Cyan
            SessionState::Completed => "\x1b[1m",  // Bold
        }
    }

    /// State name wrapped in its terminal color
    pub fn to_terminal_string(&self) -> String {
        format!("{}{}{}", self.color_code(), self, Phase::color_reset())
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "IDLE",
            SessionState::Recording => "RECORDING",
            SessionState::Paused => "PAUSED",
            SessionState::Resting => "RESTING",
            SessionState::Completed => "COMPLETED",
        };
        write!(f, "{}", name)
    }
}

impl std::fmt::Display for SessionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionAction::Start => "start",
            SessionAction::Pause => "pause",
            SessionAction::Resume => "resume",
            SessionAction::Rest => "rest",
            SessionAction::Finish => "finish",
            SessionAction::Stop => "stop",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for SessionAction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(SessionAction::Start),
            "pause" => Ok(SessionAction::Pause),
            "resume" => Ok(SessionAction::Resume),
            "rest" => Ok(SessionAction::Rest),
            "finish" => Ok(SessionAction::Finish),
            "stop" => Ok(SessionAction::Stop),
            other => Err(EngineError::Config(format!("unknown session action '{}'", other))),
        }
    }
}
