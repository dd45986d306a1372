//! Core modules for Repwatch

pub mod evaluator;
pub mod hysteresis;
pub mod counter;
pub mod engine;
pub mod remote;
pub mod threshold;
pub mod config;
pub mod streaming;
pub mod session;
pub mod api;

pub use evaluator::{RuleEvaluator, joint_angle};
pub use hysteresis::HysteresisStateMachine;
pub use counter::RepetitionCounter;
pub use engine::{RepEngine, EngineHandle};
pub use remote::{RemoteRepTracker, RemoteMode, RemoteUpdate};
pub use threshold::ThresholdController;
pub use config::EngineConfig;
pub use streaming::{
    StreamingClient, StreamHandle, StreamSnapshot, InFlightGate, InFlightSlot, Liveness,
    FrameSource, CapturedFrame, Scorer, ScoreRequest, HttpScorer, DirectoryFrameSource,
};
pub use session::{RepSession, CountingBackend, BackendKind};
pub use api::{create_router, run_server};
