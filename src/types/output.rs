//! Evaluation and per-frame output structures

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::types::{EvalReason, Phase};

/// Verdict of one rule on one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub triggered: bool,
    /// Degrees for angles, normalized frame units otherwise; None if unevaluable
    pub metric: Option<f64>,
    pub reason: EvalReason,
}

impl EvalResult {
    /// Evaluated metric checked against a predicate
    pub fn measured(metric: f64, triggered: bool, reason: EvalReason) -> Self {
        Self { triggered, metric: Some(metric), reason }
    }

    /// Fail closed: missing evidence never counts as progress
    pub fn unevaluable(reason: EvalReason) -> Self {
        Self { triggered: false, metric: None, reason }
    }
}

/// Emitted once per full enter→exit cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepCompleted;

/// Output of the engine for one processed frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameOutput {
    pub timestamp: DateTime<Utc>,
    pub triggered: bool,
    pub metric: Option<f64>,
    pub reason: EvalReason,
    /// Phase after this frame
    pub phase: Phase,
    /// Count after this frame
    pub count: u64,
    /// This frame closed a cycle that was counted
    pub completed: bool,
}

impl FrameOutput {
    pub fn new(eval: EvalResult, phase: Phase, count: u64, completed: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            triggered: eval.triggered,
            metric: eval.metric,
            reason: eval.reason,
            phase,
            count,
            completed,
        }
    }

    fn metric_display(&self) -> String {
        match self.metric {
            Some(m) => format!("{:.3}", m),
            None => "-".to_string(),
        }
    }

    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let color = self.phase.color_code();
        let reset = Phase::color_reset();
        let mark = if self.completed { " +1" } else { "" };

        format!(
            "{}metric={} | phase={} | reps={}{} | {}{}",
            color,
            self.metric_display(),
            self.phase,
            self.count,
            mark,
            self.reason.code(),
            reset
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        format!(
            "metric={} | triggered={} | phase={} | reps={} | reason={}",
            self.metric_display(),
            self.triggered,
            self.phase,
            self.count,
            self.reason.code()
        )
    }
}
