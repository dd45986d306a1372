//! Rep Engine: rule activation and the per-frame pipeline
//!
//! frame → RuleEvaluator → HysteresisStateMachine → RepetitionCounter
//!
//! Activating a rule discards the previous handle and its state. An invalid
//! rule leaves the engine inert: every frame reports `E004_NO_ACTIVE_RULE`.
//! Unevaluable frames report `triggered = false` but are not fed to the
//! state machine, so lost tracking can neither start nor finish a rep.

use tracing::{info, warn};

use crate::core::{RepetitionCounter, RuleEvaluator};
use crate::types::{
    EngineError, EngineState, EvalReason, EvalResult, FrameOutput, KeypointFrame, Phase, Rule,
};

/// The single owner of one active rule's state
#[derive(Debug, Clone)]
pub struct EngineHandle {
    rule: Rule,
    evaluator: RuleEvaluator,
    counter: RepetitionCounter,
}

impl EngineHandle {
    fn new(rule: Rule, evaluator: RuleEvaluator) -> Self {
        let counter = RepetitionCounter::new(rule.confirm_frames(), rule.repeatable());
        Self { rule, evaluator, counter }
    }

    /// Evaluate one frame and advance the state machine
    pub fn process(&mut self, frame: &KeypointFrame) -> FrameOutput {
        let motion = &mut self.counter.machine_mut().state_mut().motion;
        let eval = self.evaluator.evaluate(&self.rule, frame, motion);

        // No verdict without evidence: the machine holds its phase and streaks
        let completed = !eval.reason.is_unevaluable() && self.counter.observe(eval.triggered);

        FrameOutput::new(eval, self.counter.machine().phase(), self.counter.count(), completed)
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn count(&self) -> u64 {
        self.counter.count()
    }

    pub fn phase(&self) -> Phase {
        self.counter.machine().phase()
    }

    pub fn state(&self) -> &EngineState {
        self.counter.machine().state()
    }

    pub fn reset(&mut self) {
        self.counter.reset();
    }
}

#[derive(Debug, Clone, Default)]
pub struct RepEngine {
    evaluator: RuleEvaluator,
    handle: Option<EngineHandle>,
}

impl RepEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_evaluator(evaluator: RuleEvaluator) -> Self {
        Self { evaluator, handle: None }
    }

    /// Make `rule` the active rule with fresh state
    pub fn activate(&mut self, rule: Rule) -> &mut EngineHandle {
        info!(kind = %rule.kind(), points = ?rule.points(), "rule activated");
        self.handle.insert(EngineHandle::new(rule, self.evaluator.clone()))
    }

    /// Parse, validate and activate a JSON rule.
    /// On rejection the engine is left without an active rule.
    pub fn activate_json(&mut self, json: &str) -> Result<&mut EngineHandle, EngineError> {
        match Rule::from_json(json) {
            Ok(rule) => Ok(self.activate(rule)),
            Err(e) => {
                warn!(error = %e, "rule rejected, engine inert");
                self.handle = None;
                Err(e)
            }
        }
    }

    pub fn deactivate(&mut self) {
        self.handle = None;
    }

    pub fn handle(&self) -> Option<&EngineHandle> {
        self.handle.as_ref()
    }

    pub fn handle_mut(&mut self) -> Option<&mut EngineHandle> {
        self.handle.as_mut()
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Process a frame; inert (never triggered) without an active rule
    pub fn process(&mut self, frame: &KeypointFrame) -> FrameOutput {
        match self.handle.as_mut() {
            Some(handle) => handle.process(frame),
            None => FrameOutput::new(
                EvalResult::unevaluable(EvalReason::E004_NO_ACTIVE_RULE),
                Phase::WaitingEnter,
                0,
                false,
            ),
        }
    }

    pub fn count(&self) -> u64 {
        self.handle.as_ref().map_or(0, EngineHandle::count)
    }

    pub fn phase(&self) -> Phase {
        self.handle.as_ref().map_or(Phase::WaitingEnter, EngineHandle::phase)
    }

    /// Zero the count and engine state; the active rule stays
    pub fn reset(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.reset();
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Axis, Range};

    fn nose_frame(y: f64) -> KeypointFrame {
        KeypointFrame::empty(17, 100.0, 100.0).with_joint(0, 50.0, y, 0.9)
    }

    fn squat_rule() -> Rule {
        Rule::position(0, Axis::Y, Range::new(0.6, 1.0)).unwrap()
    }

    #[test]
    fn test_unevaluable_frames_hold_phase() {
        let mut engine = RepEngine::new();
        engine.activate(squat_rule());
        for y in [80.0, 80.0, 80.0] {
            engine.process(&nose_frame(y));
        }
        let hidden = KeypointFrame::empty(17, 100.0, 100.0).with_joint(0, 50.0, 20.0, 0.05);
        for _ in 0..10 {
            let out = engine.process(&hidden);
            assert!(!out.triggered);
            assert!(!out.completed);
        }
        assert_eq!(engine.phase(), Phase::WaitingExit);
        assert_eq!(engine.handle().unwrap().state().triggered_streak, 3);
    }

    #[test]
    fn test_inert_without_rule() {
        let mut engine = RepEngine::new();
        let out = engine.process(&nose_frame(80.0));
        assert!(!out.triggered);
        assert_eq!(out.reason, EvalReason::E004_NO_ACTIVE_RULE);
        assert_eq!(engine.count(), 0);
    }

    #[test]
    fn test_position_rep() {
        let mut engine = RepEngine::new();
        engine.activate(squat_rule());
        for y in [80.0, 80.0, 80.0, 20.0, 20.0] {
            assert!(!engine.process(&nose_frame(y)).completed);
        }
        let out = engine.process(&nose_frame(20.0));
        assert!(out.completed);
        assert_eq!(out.count, 1);
    }

    #[test]
    fn test_reactivation_discards_state() {
        let mut engine = RepEngine::new();
        engine.activate(squat_rule());
        for y in [80.0, 80.0, 80.0, 20.0, 20.0, 20.0] {
            engine.process(&nose_frame(y));
        }
        assert_eq!(engine.count(), 1);

        let handle = engine.activate(squat_rule());
        assert_eq!(handle.count(), 0);
        assert!(handle.state().is_initial());
    }

    #[test]
    fn test_invalid_json_leaves_engine_inert() {
        let mut engine = RepEngine::new();
        engine.activate(squat_rule());
        let err = engine.activate_json(r#"{"kind":"angle","points":[1]}"#).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRuleConfig(_)));
        assert!(!engine.is_active());
        assert_eq!(engine.process(&nose_frame(80.0)).reason, EvalReason::E004_NO_ACTIVE_RULE);
    }
}
