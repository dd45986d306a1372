//! Rep Session: one recording session and its counting backend
//!
//! The session owns exactly one backend, local rules or a remote matcher,
//! and the tagged session state. Frames only reach the backend while
//! RECORDING, so a pause/resume never moves the count.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{EngineHandle, RemoteMode, RemoteRepTracker, RemoteUpdate, RepEngine, RuleEvaluator};
use crate::types::{
    EngineError, FrameOutput, KeypointFrame, Phase, RemoteScore, Rule, SessionAction, SessionState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Local,
    Remote,
}

#[derive(Debug, Clone)]
pub enum CountingBackend {
    /// Geometric rules evaluated on keypoints
    Local(RepEngine),
    /// Scores from a remote matcher
    Remote(RemoteRepTracker),
}

#[derive(Debug, Clone)]
pub struct RepSession {
    state: SessionState,
    backend: CountingBackend,
    target_reps: Option<u64>,
}

impl RepSession {
    pub fn local(evaluator: RuleEvaluator) -> Self {
        Self::with_backend(CountingBackend::Local(RepEngine::with_evaluator(evaluator)))
    }

    pub fn remote(mode: RemoteMode, confirm_frames: u32) -> Self {
        Self::with_backend(CountingBackend::Remote(RemoteRepTracker::new(mode, confirm_frames)))
    }

    pub fn with_backend(backend: CountingBackend) -> Self {
        Self {
            state: SessionState::Idle,
            backend,
            target_reps: None,
        }
    }

    /// Reaching `target` repetitions completes the session
    pub fn with_target(mut self, target: Option<u64>) -> Self {
        self.target_reps = target.filter(|&t| t > 0);
        self
    }

    /// Switch exercise: fresh engine state, count back to zero
    pub fn activate(&mut self, rule: Rule) -> Result<&mut EngineHandle, EngineError> {
        match &mut self.backend {
            CountingBackend::Local(engine) => Ok(engine.activate(rule)),
            CountingBackend::Remote(_) => Err(EngineError::WrongBackend("local")),
        }
    }

    /// Like `activate`, from JSON. A rejected rule leaves no active rule.
    pub fn activate_json(&mut self, json: &str) -> Result<&mut EngineHandle, EngineError> {
        match &mut self.backend {
            CountingBackend::Local(engine) => engine.activate_json(json),
            CountingBackend::Remote(_) => Err(EngineError::WrongBackend("local")),
        }
    }

    pub fn apply(&mut self, action: SessionAction) -> Result<SessionState, EngineError> {
        let next = self.state.apply(action)?;
        info!(from = %self.state, to = %next, %action, "session transition");
        self.state = next;

        if action == SessionAction::Stop {
            self.reset_backend();
        }
        Ok(next)
    }

    /// Feed one keypoint frame (local backend, RECORDING only)
    pub fn process(&mut self, frame: &KeypointFrame) -> Result<FrameOutput, EngineError> {
        if !self.state.accepts_frames() {
            return Err(EngineError::NotRecording(self.state));
        }
        let CountingBackend::Local(engine) = &mut self.backend else {
            return Err(EngineError::WrongBackend("local"));
        };
        if !engine.is_active() {
            return Err(EngineError::NoActiveRule);
        }

        let output = engine.process(frame);
        self.check_target();
        Ok(output)
    }

    /// Feed one remote score (remote backend, RECORDING only)
    pub fn apply_score(&mut self, score: &RemoteScore) -> Result<RemoteUpdate, EngineError> {
        if !self.state.accepts_frames() {
            return Err(EngineError::NotRecording(self.state));
        }
        let CountingBackend::Remote(tracker) = &mut self.backend else {
            return Err(EngineError::WrongBackend("remote"));
        };

        let update = tracker.apply(score);
        self.check_target();
        Ok(update)
    }

    /// Explicit reset: count and engine state to initial values.
    /// A completed session becomes idle again.
    pub fn reset(&mut self) {
        self.reset_backend();
        if self.state == SessionState::Completed {
            self.state = SessionState::Idle;
        }
    }

    fn reset_backend(&mut self) {
        match &mut self.backend {
            CountingBackend::Local(engine) => engine.reset(),
            CountingBackend::Remote(tracker) => tracker.reset(),
        }
    }

    fn check_target(&mut self) {
        if let Some(target) = self.target_reps {
            if self.count() >= target && self.state == SessionState::Recording {
                info!(target, "target reached, session completed");
                self.state = SessionState::Completed;
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn count(&self) -> u64 {
        match &self.backend {
            CountingBackend::Local(engine) => engine.count(),
            CountingBackend::Remote(tracker) => tracker.count(),
        }
    }

    pub fn phase(&self) -> Phase {
        match &self.backend {
            CountingBackend::Local(engine) => engine.phase(),
            CountingBackend::Remote(tracker) => tracker.phase(),
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        match self.backend {
            CountingBackend::Local(_) => BackendKind::Local,
            CountingBackend::Remote(_) => BackendKind::Remote,
        }
    }

    pub fn active_rule(&self) -> Option<&Rule> {
        match &self.backend {
            CountingBackend::Local(engine) => engine.handle().map(EngineHandle::rule),
            CountingBackend::Remote(_) => None,
        }
    }

    pub fn target_reps(&self) -> Option<u64> {
        self.target_reps
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Axis, Range, RemoteState};

    fn frame(y: f64) -> KeypointFrame {
        KeypointFrame::empty(17, 100.0, 100.0).with_joint(0, 50.0, y, 0.9)
    }

    fn recording_session() -> RepSession {
        let mut s = RepSession::local(RuleEvaluator::new());
        s.activate(Rule::position(0, Axis::Y, Range::new(0.6, 1.0)).unwrap()).unwrap();
        s.apply(SessionAction::Start).unwrap();
        s
    }

    fn one_rep(s: &mut RepSession) {
        for y in [80.0, 80.0, 80.0, 20.0, 20.0, 20.0] {
            s.process(&frame(y)).unwrap();
        }
    }

    #[test]
    fn test_frames_rejected_unless_recording() {
        let mut s = RepSession::local(RuleEvaluator::new());
        s.activate(Rule::position(0, Axis::Y, Range::new(0.6, 1.0)).unwrap()).unwrap();
        assert!(matches!(s.process(&frame(80.0)), Err(EngineError::NotRecording(SessionState::Idle))));
    }

    #[test]
    fn test_pause_preserves_count() {
        let mut s = recording_session();
        for y in [80.0, 80.0, 80.0] {
            s.process(&frame(y)).unwrap();
        }
        s.apply(SessionAction::Pause).unwrap();
        assert!(s.process(&frame(20.0)).is_err());
        s.apply(SessionAction::Resume).unwrap();

        assert_eq!(s.phase(), Phase::WaitingExit);
        for y in [20.0, 20.0, 20.0] {
            s.process(&frame(y)).unwrap();
        }
        assert_eq!(s.count(), 1);
    }

    #[test]
    fn test_stop_resets_engine() {
        let mut s = recording_session();
        one_rep(&mut s);
        s.apply(SessionAction::Stop).unwrap();
        assert_eq!(s.count(), 0);
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.active_rule().is_some(), "rule survives a stop");
    }

    #[test]
    fn test_target_completes_session() {
        let mut s = recording_session().with_target(Some(2));
        one_rep(&mut s);
        assert_eq!(s.state(), SessionState::Recording);
        one_rep(&mut s);
        assert_eq!(s.state(), SessionState::Completed);
        assert!(s.process(&frame(80.0)).is_err());

        s.reset();
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.count(), 0);
    }

    #[test]
    fn test_rule_change_resets_count() {
        let mut s = recording_session();
        one_rep(&mut s);
        s.activate(Rule::position(0, Axis::Y, Range::new(0.0, 0.4)).unwrap()).unwrap();
        assert_eq!(s.count(), 0);
    }

    #[test]
    fn test_no_active_rule() {
        let mut s = RepSession::local(RuleEvaluator::new());
        s.apply(SessionAction::Start).unwrap();
        assert!(matches!(s.process(&frame(80.0)), Err(EngineError::NoActiveRule)));
    }

    #[test]
    fn test_remote_backend() {
        let mut s = RepSession::remote(RemoteMode::Relay, 3);
        assert!(s.activate(Rule::position(0, Axis::Y, Range::new(0.6, 1.0)).unwrap()).is_err());
        s.apply(SessionAction::Start).unwrap();
        let score = RemoteScore { reps: 3, distance: 0.2, state: RemoteState::Out, thresholds: None };
        assert_eq!(s.apply_score(&score).unwrap().count, 3);
        assert!(s.process(&frame(80.0)).is_err());
    }
}
