//! Repwatch: real-time repetition detection from pose keypoints
//!
//! KeypointFrame → RuleEvaluator → HysteresisStateMachine → RepetitionCounter.
//! The streaming client is the parallel path for remote (DTW) scorers.

pub mod core;
pub mod types;

// =============================================================================
// EVALUATION [C]
// =============================================================================

/// Joints below this confidence make a rule unevaluable for the frame
pub const CONFIDENCE_FLOOR: f64 = 0.2;

/// Angle rays shorter than this (pixels) are degenerate
pub const MIN_VECTOR_NORM: f64 = 1e-3;

// =============================================================================
// HYSTERESIS [C]
// =============================================================================

/// Consecutive same-verdict frames required to change phase
pub const DEFAULT_CONFIRM_FRAMES: u32 = 3;

/// Accumulated normalized movement that triggers a Direction rule
pub const DEFAULT_COUNT_THRESHOLD: f64 = 0.1;

// =============================================================================
// STREAMING [C]
// =============================================================================

/// Capture tick (milliseconds), domain range is 100-200
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 150;

/// Maximum outstanding scorer requests
pub const DEFAULT_IN_FLIGHT_CAP: usize = 2;

/// Per-request timeout for the remote scorer (milliseconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";

/// Install the stderr tracing subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A second init (tests, embedding) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
