//! Rule Evaluator: geometric predicate over one keypoint frame
//!
//! Angles are measured in pixel space (degrees). Distance, position and
//! direction work on coordinates normalized by the frame extent, so
//! thresholds are resolution-independent.
//!
//! Any referenced joint below the confidence floor makes the frame
//! unevaluable: `triggered = false`, `metric = None`.

use crate::{CONFIDENCE_FLOOR, MIN_VECTOR_NORM};
use crate::types::{
    Axis, EvalReason, EvalResult, KeypointFrame, MotionTrack, Rule, RuleKind,
};

/// Stateless evaluator; Direction rules carry their state in a `MotionTrack`
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    confidence_floor: f64,
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEvaluator {
    /// Create evaluator with the default confidence floor
    pub fn new() -> Self {
        Self { confidence_floor: CONFIDENCE_FLOOR }
    }

    pub fn with_confidence_floor(confidence_floor: f64) -> Self {
        Self { confidence_floor }
    }

    pub fn confidence_floor(&self) -> f64 {
        self.confidence_floor
    }

    /// Evaluate `rule` against `frame`.
    ///
    /// `motion` is only read and written for Direction rules, and only when
    /// the frame is evaluable.
    pub fn evaluate(&self, rule: &Rule, frame: &KeypointFrame, motion: &mut MotionTrack) -> EvalResult {
        if let Err(reason) = self.gate(rule.points(), frame) {
            return EvalResult::unevaluable(reason);
        }

        match rule.kind() {
            RuleKind::Angle => self.eval_angle(rule, frame),
            RuleKind::Distance => self.eval_distance(rule, frame),
            RuleKind::Position => self.eval_position(rule, frame),
            RuleKind::Direction => self.eval_direction(rule, frame, motion),
        }
    }

    /// Presence and confidence of every referenced joint
    fn gate(&self, points: &[usize], frame: &KeypointFrame) -> Result<(), EvalReason> {
        for &index in points {
            let kp = frame.joint(index).ok_or(EvalReason::E002_MISSING_JOINT)?;
            if !(kp.confidence >= self.confidence_floor) {
                return Err(EvalReason::E002_LOW_CONFIDENCE);
            }
        }
        Ok(())
    }

    fn eval_angle(&self, rule: &Rule, frame: &KeypointFrame) -> EvalResult {
        let (Some(range), [a, b, c]) = (rule.range(), rule.points()) else {
            return EvalResult::unevaluable(EvalReason::E004_NO_ACTIVE_RULE);
        };
        let (a, b, c) = (&frame.keypoints[*a], &frame.keypoints[*b], &frame.keypoints[*c]);

        match joint_angle((a.x, a.y), (b.x, b.y), (c.x, c.y)) {
            Some(angle) => in_range(angle, range.contains(angle)),
            None => EvalResult::unevaluable(EvalReason::E002_DEGENERATE_GEOMETRY),
        }
    }

    fn eval_distance(&self, rule: &Rule, frame: &KeypointFrame) -> EvalResult {
        let (Some(range), [a, b]) = (rule.range(), rule.points()) else {
            return EvalResult::unevaluable(EvalReason::E004_NO_ACTIVE_RULE);
        };
        let Some(((ax, ay), (bx, by))) = normalized(frame, *a).zip(normalized(frame, *b)) else {
            return EvalResult::unevaluable(EvalReason::E002_INVALID_DIMENSIONS);
        };

        let d = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();
        in_range(d, range.contains(d))
    }

    fn eval_position(&self, rule: &Rule, frame: &KeypointFrame) -> EvalResult {
        let (Some(range), Some(axis), [p]) = (rule.range(), rule.axis(), rule.points()) else {
            return EvalResult::unevaluable(EvalReason::E004_NO_ACTIVE_RULE);
        };
        let Some(value) = axis_value(frame, *p, axis) else {
            return EvalResult::unevaluable(EvalReason::E002_INVALID_DIMENSIONS);
        };

        in_range(value, range.contains(value))
    }

    fn eval_direction(&self, rule: &Rule, frame: &KeypointFrame, motion: &mut MotionTrack) -> EvalResult {
        let (Some(axis), [p]) = (rule.axis(), rule.points()) else {
            return EvalResult::unevaluable(EvalReason::E004_NO_ACTIVE_RULE);
        };
        let Some(value) = axis_value(frame, *p, axis) else {
            return EvalResult::unevaluable(EvalReason::E002_INVALID_DIMENSIONS);
        };

        let Some(prev) = motion.prev_axis_value.replace(value) else {
            let triggered = motion.movement_accumulator.abs() >= rule.count_threshold();
            return EvalResult::measured(motion.movement_accumulator, triggered, EvalReason::E003_DIRECTION_SEEDED);
        };

        let sign = rule.direction_hint().map_or(1.0, |d| d.sign());
        motion.movement_accumulator += sign * (value - prev);

        let acc = motion.movement_accumulator;
        if acc.abs() >= rule.count_threshold() {
            EvalResult::measured(acc, true, EvalReason::E003_DIRECTION_REACHED)
        } else {
            EvalResult::measured(acc, false, EvalReason::E003_DIRECTION_ACCUMULATING)
        }
    }
}

fn in_range(metric: f64, triggered: bool) -> EvalResult {
    let reason = if triggered {
        EvalReason::E001_IN_RANGE
    } else {
        EvalReason::E001_OUT_OF_RANGE
    };
    EvalResult::measured(metric, triggered, reason)
}

fn normalized(frame: &KeypointFrame, index: usize) -> Option<(f64, f64)> {
    if !frame.has_dimensions() {
        return None;
    }
    frame.normalized(index)
}

fn axis_value(frame: &KeypointFrame, index: usize, axis: Axis) -> Option<f64> {
    normalized(frame, index).map(|p| axis.pick(p))
}

/// Angle at vertex `b` between rays b→a and b→c, in degrees.
/// None when either ray is shorter than `MIN_VECTOR_NORM`.
pub fn joint_angle(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Option<f64> {
    let u = (a.0 - b.0, a.1 - b.1);
    let v = (c.0 - b.0, c.1 - b.1);

    let nu = (u.0 * u.0 + u.1 * u.1).sqrt();
    let nv = (v.0 * v.0 + v.1 * v.1).sqrt();
    if nu < MIN_VECTOR_NORM || nv < MIN_VECTOR_NORM {
        return None;
    }

    let cos = ((u.0 * v.0 + u.1 * v.1) / (nu * nv)).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, Range};

    const SHOULDER: usize = 5;
    const ELBOW: usize = 7;
    const WRIST: usize = 9;

    /// Arm with the elbow at (300, 300) and the given elbow angle
    fn arm_frame(angle_deg: f64, confidence: f64) -> KeypointFrame {
        let rad = angle_deg.to_radians();
        KeypointFrame::empty(17, 640.0, 480.0)
            .with_joint(SHOULDER, 300.0, 200.0, confidence)
            .with_joint(ELBOW, 300.0, 300.0, confidence)
            .with_joint(WRIST, 300.0 + 100.0 * rad.sin(), 300.0 - 100.0 * rad.cos(), confidence)
    }

    fn curl_rule() -> Rule {
        Rule::angle(SHOULDER, ELBOW, WRIST, Range::new(0.0, 60.0)).unwrap()
    }

    #[test]
    fn test_joint_angle_right_and_straight() {
        let right = joint_angle((0.0, 0.0), (1.0, 0.0), (1.0, 1.0)).unwrap();
        assert!((right - 90.0).abs() < 1e-9);
        let straight = joint_angle((0.0, 0.0), (1.0, 0.0), (2.0, 0.0)).unwrap();
        assert!((straight - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_angle_in_and_out_of_range() {
        let eval = RuleEvaluator::new();
        let mut motion = MotionTrack::default();

        let flexed = eval.evaluate(&curl_rule(), &arm_frame(50.0, 0.9), &mut motion);
        assert!(flexed.triggered);
        assert!((flexed.metric.unwrap() - 50.0).abs() < 1e-6);
        assert_eq!(flexed.reason, EvalReason::E001_IN_RANGE);

        let extended = eval.evaluate(&curl_rule(), &arm_frame(170.0, 0.9), &mut motion);
        assert!(!extended.triggered);
        assert_eq!(extended.reason, EvalReason::E001_OUT_OF_RANGE);
    }

    #[test]
    fn test_low_confidence_fails_closed() {
        let eval = RuleEvaluator::new();
        let frame = arm_frame(50.0, 0.9).with_joint(WRIST, 300.0 + 76.6, 300.0 - 64.3, 0.1);
        let result = eval.evaluate(&curl_rule(), &frame, &mut MotionTrack::default());
        assert!(!result.triggered);
        assert_eq!(result.metric, None);
        assert_eq!(result.reason, EvalReason::E002_LOW_CONFIDENCE);
    }

    #[test]
    fn test_confidence_at_floor_is_accepted() {
        let eval = RuleEvaluator::new();
        let result = eval.evaluate(&curl_rule(), &arm_frame(50.0, CONFIDENCE_FLOOR), &mut MotionTrack::default());
        assert!(result.triggered);
    }

    #[test]
    fn test_degenerate_angle() {
        let eval = RuleEvaluator::new();
        let frame = arm_frame(50.0, 0.9).with_joint(SHOULDER, 300.0, 300.0, 0.9);
        let result = eval.evaluate(&curl_rule(), &frame, &mut MotionTrack::default());
        assert!(!result.triggered);
        assert_eq!(result.reason, EvalReason::E002_DEGENERATE_GEOMETRY);
    }

    #[test]
    fn test_missing_joint() {
        let eval = RuleEvaluator::new();
        let frame = KeypointFrame::new(vec![], 640.0, 480.0);
        let result = eval.evaluate(&curl_rule(), &frame, &mut MotionTrack::default());
        assert_eq!(result.reason, EvalReason::E002_MISSING_JOINT);
    }

    #[test]
    fn test_distance_is_normalized() {
        let eval = RuleEvaluator::new();
        let rule = Rule::distance(9, 10, Range::new(0.0, 0.1)).unwrap();
        // 64 px apart horizontally in a 640 px frame = 0.1
        let frame = KeypointFrame::empty(17, 640.0, 480.0)
            .with_joint(9, 100.0, 240.0, 0.9)
            .with_joint(10, 164.0, 240.0, 0.9);
        let result = eval.evaluate(&rule, &frame, &mut MotionTrack::default());
        assert!((result.metric.unwrap() - 0.1).abs() < 1e-12);
        assert!(result.triggered);
    }

    #[test]
    fn test_distance_needs_dimensions() {
        let eval = RuleEvaluator::new();
        let rule = Rule::distance(9, 10, Range::new(0.0, 0.1)).unwrap();
        let frame = KeypointFrame::empty(17, 0.0, 0.0)
            .with_joint(9, 1.0, 1.0, 0.9)
            .with_joint(10, 2.0, 2.0, 0.9);
        let result = eval.evaluate(&rule, &frame, &mut MotionTrack::default());
        assert_eq!(result.reason, EvalReason::E002_INVALID_DIMENSIONS);
    }

    #[test]
    fn test_position_on_x_axis() {
        let eval = RuleEvaluator::new();
        let rule = Rule::position(0, Axis::X, Range::new(0.4, 0.6)).unwrap();
        let frame = KeypointFrame::empty(17, 1000.0, 500.0).with_joint(0, 500.0, 450.0, 0.9);
        let result = eval.evaluate(&rule, &frame, &mut MotionTrack::default());
        assert_eq!(result.metric, Some(0.5));
        assert!(result.triggered);
    }

    #[test]
    fn test_direction_up_accumulates_to_threshold() {
        let eval = RuleEvaluator::new();
        let rule = Rule::direction(0, Axis::Y, Some(Direction::Up), 0.1).unwrap();
        let mut motion = MotionTrack::default();

        let ys = [500.0, 480.0, 460.0, 440.0, 390.0];
        let verdicts: Vec<bool> = ys
            .iter()
            .map(|&y| {
                let frame = KeypointFrame::empty(17, 1000.0, 1000.0).with_joint(0, 500.0, y, 0.9);
                eval.evaluate(&rule, &frame, &mut motion).triggered
            })
            .collect();

        assert_eq!(verdicts, vec![false, false, false, false, true]);
        assert!((motion.movement_accumulator - 0.11).abs() < 1e-9);
    }

    #[test]
    fn test_direction_unevaluable_frame_keeps_baseline() {
        let eval = RuleEvaluator::new();
        let rule = Rule::direction(0, Axis::Y, Some(Direction::Down), 0.1).unwrap();
        let mut motion = MotionTrack::default();

        let seen = KeypointFrame::empty(17, 100.0, 100.0).with_joint(0, 50.0, 50.0, 0.9);
        let hidden = KeypointFrame::empty(17, 100.0, 100.0).with_joint(0, 50.0, 90.0, 0.05);

        eval.evaluate(&rule, &seen, &mut motion);
        let r = eval.evaluate(&rule, &hidden, &mut motion);
        assert_eq!(r.reason, EvalReason::E002_LOW_CONFIDENCE);
        assert_eq!(motion.prev_axis_value, Some(0.5));
        assert_eq!(motion.movement_accumulator, 0.0);
    }

    #[test]
    fn test_direction_without_hint_counts_either_way() {
        let eval = RuleEvaluator::new();
        let rule = Rule::direction(0, Axis::X, None, 0.1).unwrap();
        let mut motion = MotionTrack::default();

        for x in [50.0, 40.0, 30.0] {
            let frame = KeypointFrame::empty(17, 100.0, 100.0).with_joint(0, x, 50.0, 0.9);
            eval.evaluate(&rule, &frame, &mut motion);
        }
        assert!((motion.movement_accumulator + 0.2).abs() < 1e-9);
    }
}
