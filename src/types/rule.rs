//! Declarative geometric rules
//!
//! Rules arrive as JSON and are validated on the way in, so a `Rule`
//! value is always structurally sound:
//! - Angle: 3 points (A, vertex B, C) + range in degrees
//! - Distance: 2 points + range in normalized frame units
//! - Position: 1 point + axis + range in normalized frame units
//! - Direction: 1 point + axis + count_threshold > 0, no range

use serde::{Deserialize, Serialize};

use crate::types::{EngineError, Joint};
use crate::{DEFAULT_CONFIRM_FRAMES, DEFAULT_COUNT_THRESHOLD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Angle,
    Distance,
    Position,
    Direction,
}

impl RuleKind {
    /// Number of joints the kind consumes
    pub fn point_count(self) -> usize {
        match self {
            RuleKind::Angle => 3,
            RuleKind::Distance => 2,
            RuleKind::Position | RuleKind::Direction => 1,
        }
    }

    pub fn uses_range(self) -> bool {
        !matches!(self, RuleKind::Direction)
    }

    pub fn uses_axis(self) -> bool {
        matches!(self, RuleKind::Position | RuleKind::Direction)
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RuleKind::Angle => "angle",
            RuleKind::Distance => "distance",
            RuleKind::Position => "position",
            RuleKind::Direction => "direction",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Pick the coordinate this axis measures
    pub fn pick(self, (x, y): (f64, f64)) -> f64 {
        match self {
            Axis::X => x,
            Axis::Y => y,
        }
    }
}

/// Movement direction in image space (y grows downward)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Sign applied to raw axis deltas before accumulation
    pub fn sign(self) -> f64 {
        match self {
            Direction::Up | Direction::Left => -1.0,
            Direction::Down | Direction::Right => 1.0,
        }
    }
}

/// Inclusive `[low, high]` bound, serialized as a two-element array
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Range {
    pub low: f64,
    pub high: f64,
}

impl Range {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }

    fn is_valid(&self) -> bool {
        self.low.is_finite() && self.high.is_finite() && self.low <= self.high
    }
}

impl From<[f64; 2]> for Range {
    fn from([low, high]: [f64; 2]) -> Self {
        Self { low, high }
    }
}

impl From<Range> for [f64; 2] {
    fn from(r: Range) -> Self {
        [r.low, r.high]
    }
}

/// Joint reference on the wire: either a raw index or a COCO name
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JointRef {
    Index(usize),
    Named(Joint),
}

impl JointRef {
    fn index(self) -> usize {
        match self {
            JointRef::Index(i) => i,
            JointRef::Named(j) => j.index(),
        }
    }
}

/// Unchecked wire shape of a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub kind: RuleKind,
    pub points: Vec<JointRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis: Option<Axis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default = "default_count_threshold")]
    pub count_threshold: f64,
    #[serde(default = "default_repeatable")]
    pub repeatable: bool,
    #[serde(default = "default_confirm_frames")]
    pub confirm_frames: u32,
}

fn default_count_threshold() -> f64 {
    DEFAULT_COUNT_THRESHOLD
}

fn default_repeatable() -> bool {
    true
}

fn default_confirm_frames() -> u32 {
    DEFAULT_CONFIRM_FRAMES
}

/// A validated rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleSpec", into = "RuleSpec")]
pub struct Rule {
    kind: RuleKind,
    points: Vec<usize>,
    range: Option<Range>,
    axis: Option<Axis>,
    direction: Option<Direction>,
    count_threshold: f64,
    repeatable: bool,
    confirm_frames: u32,
}

impl Rule {
    /// Elbow-style angle at `vertex` between rays to `a` and `c`
    pub fn angle(a: usize, vertex: usize, c: usize, range: Range) -> Result<Self, EngineError> {
        Self::validate(Self {
            range: Some(range),
            ..Self::bare(RuleKind::Angle, vec![a, vertex, c])
        })
    }

    pub fn distance(a: usize, b: usize, range: Range) -> Result<Self, EngineError> {
        Self::validate(Self {
            range: Some(range),
            ..Self::bare(RuleKind::Distance, vec![a, b])
        })
    }

    pub fn position(point: usize, axis: Axis, range: Range) -> Result<Self, EngineError> {
        Self::validate(Self {
            range: Some(range),
            axis: Some(axis),
            ..Self::bare(RuleKind::Position, vec![point])
        })
    }

    pub fn direction(
        point: usize,
        axis: Axis,
        direction: Option<Direction>,
        count_threshold: f64,
    ) -> Result<Self, EngineError> {
        Self::validate(Self {
            axis: Some(axis),
            direction,
            count_threshold,
            ..Self::bare(RuleKind::Direction, vec![point])
        })
    }

    /// Parse and validate a JSON rule record
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::InvalidRuleConfig(e.to_string()))
    }

    pub fn with_confirm_frames(self, confirm_frames: u32) -> Result<Self, EngineError> {
        Self::validate(Self { confirm_frames, ..self })
    }

    pub fn with_repeatable(mut self, repeatable: bool) -> Self {
        self.repeatable = repeatable;
        self
    }

    fn bare(kind: RuleKind, points: Vec<usize>) -> Self {
        Self {
            kind,
            points,
            range: None,
            axis: None,
            direction: None,
            count_threshold: DEFAULT_COUNT_THRESHOLD,
            repeatable: true,
            confirm_frames: DEFAULT_CONFIRM_FRAMES,
        }
    }

    fn validate(rule: Self) -> Result<Self, EngineError> {
        let kind = rule.kind;
        let invalid = |msg: String| Err(EngineError::InvalidRuleConfig(msg));

        if rule.points.len() != kind.point_count() {
            return invalid(format!(
                "{} rule needs {} point(s), got {}",
                kind,
                kind.point_count(),
                rule.points.len()
            ));
        }

        match (kind.uses_range(), rule.range) {
            (true, None) => return invalid(format!("{} rule requires a range", kind)),
            (true, Some(r)) if !r.is_valid() => {
                return invalid(format!("range [{}, {}] must be finite with low <= high", r.low, r.high))
            }
            (false, Some(_)) => return invalid(format!("{} rule must not carry a range", kind)),
            _ => {}
        }

        if kind.uses_axis() && rule.axis.is_none() {
            return invalid(format!("{} rule requires an axis", kind));
        }

        if kind == RuleKind::Direction
            && !(rule.count_threshold.is_finite() && rule.count_threshold > 0.0)
        {
            return invalid(format!("count_threshold must be > 0, got {}", rule.count_threshold));
        }

        if rule.confirm_frames == 0 {
            return invalid("confirm_frames must be at least 1".to_string());
        }

        Ok(rule)
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn points(&self) -> &[usize] {
        &self.points
    }

    pub fn range(&self) -> Option<Range> {
        self.range
    }

    pub fn axis(&self) -> Option<Axis> {
        self.axis
    }

    pub fn direction_hint(&self) -> Option<Direction> {
        self.direction
    }

    pub fn count_threshold(&self) -> f64 {
        self.count_threshold
    }

    pub fn repeatable(&self) -> bool {
        self.repeatable
    }

    pub fn confirm_frames(&self) -> u32 {
        self.confirm_frames
    }
}

impl TryFrom<RuleSpec> for Rule {
    type Error = EngineError;

    fn try_from(wire: RuleSpec) -> Result<Self, Self::Error> {
        Self::validate(Self {
            kind: wire.kind,
            points: wire.points.into_iter().map(JointRef::index).collect(),
            range: wire.range,
            axis: wire.axis,
            direction: wire.direction,
            count_threshold: wire.count_threshold,
            repeatable: wire.repeatable,
            confirm_frames: wire.confirm_frames,
        })
    }
}

impl From<Rule> for RuleSpec {
    fn from(rule: Rule) -> Self {
        Self {
            kind: rule.kind,
            points: rule.points.into_iter().map(JointRef::Index).collect(),
            range: rule.range,
            axis: rule.axis,
            direction: rule.direction,
            count_threshold: rule.count_threshold,
            repeatable: rule.repeatable,
            confirm_frames: rule.confirm_frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_rule_from_json_with_joint_names() {
        let rule = Rule::from_json(
            r#"{"kind":"angle","points":["left_shoulder","left_elbow","left_wrist"],"range":[0,60]}"#,
        )
        .unwrap();
        assert_eq!(rule.kind(), RuleKind::Angle);
        assert_eq!(rule.points(), &[5, 7, 9]);
        assert_eq!(rule.range(), Some(Range::new(0.0, 60.0)));
        assert_eq!(rule.confirm_frames(), DEFAULT_CONFIRM_FRAMES);
        assert!(rule.repeatable());
    }

    #[test]
    fn test_defaults_for_direction_rule() {
        let rule = Rule::from_json(r#"{"kind":"direction","points":[0],"axis":"y","direction":"up"}"#).unwrap();
        assert_eq!(rule.count_threshold(), DEFAULT_COUNT_THRESHOLD);
        assert_eq!(rule.direction_hint(), Some(Direction::Up));
    }

    #[test]
    fn test_rejects_missing_range() {
        let err = Rule::from_json(r#"{"kind":"distance","points":[9,10]}"#).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRuleConfig(_)));
    }

    #[test]
    fn test_rejects_inverted_range() {
        assert!(Rule::angle(5, 7, 9, Range::new(90.0, 10.0)).is_err());
    }

    #[test]
    fn test_rejects_wrong_point_count() {
        assert!(Rule::from_json(r#"{"kind":"angle","points":[5,7],"range":[0,60]}"#).is_err());
        assert!(Rule::from_json(r#"{"kind":"position","points":[5,7],"axis":"x","range":[0,1]}"#).is_err());
    }

    #[test]
    fn test_direction_rejects_range_and_zero_threshold() {
        assert!(Rule::from_json(
            r#"{"kind":"direction","points":[0],"axis":"y","range":[0,1]}"#
        )
        .is_err());
        assert!(Rule::direction(0, Axis::Y, None, 0.0).is_err());
    }

    #[test]
    fn test_position_requires_axis() {
        assert!(Rule::from_json(r#"{"kind":"position","points":[0],"range":[0,1]}"#).is_err());
    }

    #[test]
    fn test_rejects_unknown_kind_and_fields() {
        assert!(Rule::from_json(r#"{"kind":"velocity","points":[0]}"#).is_err());
        assert!(Rule::from_json(r#"{"kind":"position","points":[0],"axis":"x","range":[0,1],"speed":2}"#).is_err());
    }

    #[test]
    fn test_zero_confirm_frames_rejected() {
        let rule = Rule::position(0, Axis::X, Range::new(0.0, 0.5)).unwrap();
        assert!(rule.with_confirm_frames(0).is_err());
    }

    #[test]
    fn test_serializes_back_to_wire_shape() {
        let rule = Rule::angle(5, 7, 9, Range::new(0.0, 60.0)).unwrap();
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["kind"], "angle");
        assert_eq!(json["range"][1], 60.0);
        let back: Rule = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);
    }
}
