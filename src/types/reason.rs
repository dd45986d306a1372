//! Reason codes attached to every rule evaluation
//! Doubles as the debug label of an `EvalResult`

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum EvalReason {
    // =========================================================================
    // E001: Range checks
    // =========================================================================
    /// Metric inside the rule range
    E001_IN_RANGE,
    /// Metric outside the rule range
    E001_OUT_OF_RANGE,

    // =========================================================================
    // E002: Unevaluable frames (fail closed)
    // =========================================================================
    /// A referenced joint is below the confidence floor
    E002_LOW_CONFIDENCE,
    /// Angle ray too short to define a direction
    E002_DEGENERATE_GEOMETRY,
    /// A referenced joint is not present in the frame
    E002_MISSING_JOINT,
    /// Frame width/height unusable for normalization
    E002_INVALID_DIMENSIONS,

    // =========================================================================
    // E003: Direction accumulation
    // =========================================================================
    /// First sample, nothing to compare against yet
    E003_DIRECTION_SEEDED,
    /// Movement below count_threshold
    E003_DIRECTION_ACCUMULATING,
    /// Movement at or above count_threshold
    E003_DIRECTION_REACHED,

    // =========================================================================
    // E004: Engine
    // =========================================================================
    /// No rule is active, every frame is inert
    E004_NO_ACTIVE_RULE,
}

impl EvalReason {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::E001_IN_RANGE => "E001_IN_RANGE",
            Self::E001_OUT_OF_RANGE => "E001_OUT_OF_RANGE",
            Self::E002_LOW_CONFIDENCE => "E002_LOW_CONFIDENCE",
            Self::E002_DEGENERATE_GEOMETRY => "E002_DEGENERATE_GEOMETRY",
            Self::E002_MISSING_JOINT => "E002_MISSING_JOINT",
            Self::E002_INVALID_DIMENSIONS => "E002_INVALID_DIMENSIONS",
            Self::E003_DIRECTION_SEEDED => "E003_DIRECTION_SEEDED",
            Self::E003_DIRECTION_ACCUMULATING => "E003_DIRECTION_ACCUMULATING",
            Self::E003_DIRECTION_REACHED => "E003_DIRECTION_REACHED",
            Self::E004_NO_ACTIVE_RULE => "E004_NO_ACTIVE_RULE",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::E001_IN_RANGE => "Metric in range",
            Self::E001_OUT_OF_RANGE => "Metric out of range",
            Self::E002_LOW_CONFIDENCE => "Joint confidence below floor",
            Self::E002_DEGENERATE_GEOMETRY => "Degenerate angle geometry",
            Self::E002_MISSING_JOINT => "Joint missing from frame",
            Self::E002_INVALID_DIMENSIONS => "Frame dimensions unusable",
            Self::E003_DIRECTION_SEEDED => "Direction baseline seeded",
            Self::E003_DIRECTION_ACCUMULATING => "Accumulating movement",
            Self::E003_DIRECTION_REACHED => "Movement threshold reached",
            Self::E004_NO_ACTIVE_RULE => "No active rule",
        }
    }

    /// True for codes where the frame could not be evaluated at all
    pub fn is_unevaluable(&self) -> bool {
        matches!(
            self,
            Self::E002_LOW_CONFIDENCE
                | Self::E002_DEGENERATE_GEOMETRY
                | Self::E002_MISSING_JOINT
                | Self::E002_INVALID_DIMENSIONS
                | Self::E004_NO_ACTIVE_RULE
        )
    }
}

impl std::fmt::Display for EvalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}
