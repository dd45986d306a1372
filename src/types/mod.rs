//! Core types for Repwatch

mod keypoint;
mod rule;
mod state;
mod reason;
mod output;
mod session;
mod remote;
mod error;

pub use keypoint::{Keypoint, KeypointFrame, Joint};
pub use rule::{Rule, RuleSpec, RuleKind, Axis, Direction, Range, JointRef};
pub use state::{Phase, EngineState, MotionTrack};
pub use reason::EvalReason;
pub use output::{EvalResult, RepCompleted, FrameOutput};
pub use session::{SessionState, SessionAction};
pub use remote::{Thresholds, ThresholdMode, RemoteScore, RemoteState};
pub use error::EngineError;
