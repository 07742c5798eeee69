//! Error taxonomy for the swarm engine.
//!
//! Configuration errors are fatal and surface before the step loop starts.
//! Precondition violations are fatal at runtime. Policy edge cases (no
//! reachable leader, disconnected graph, empty failure queue) are handled
//! locally and never show up here.

use thiserror::Error;

/// Invalid or contradictory parameters.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("swarm must contain at least one agent")]
    NoAgents,

    #[error("{field} must be positive and finite, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} must be non-negative and finite, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("failure #{index} has non-positive duration {duration}")]
    InvalidFailureDuration { index: usize, duration: i64 },

    #[error("failure #{index} has non-finite magnitude")]
    InvalidFailureMagnitude { index: usize },

    #[error("random subset fraction {0} must be in (0, 1]")]
    InvalidSubsetFraction(f64),

    #[error("trust bounds [{min}, {max}] are empty or non-finite")]
    InvalidTrustBounds { min: f64, max: f64 },

    #[error("trust {field} = {value} lies outside [{min}, {max}]")]
    TrustOutOfBounds { field: &'static str, value: f64, min: f64, max: f64 },

    #[error("goal lies outside the world")]
    GoalOutsideWorld,

    #[error("obstacle #{index} has a non-positive or non-finite extent")]
    InvalidObstacle { index: usize },

    #[error("expected {expected} initial positions, got {actual}")]
    PositionCountMismatch { expected: usize, actual: usize },

    #[error("initial position #{index} ({x}, {y}) is non-finite or outside the world")]
    InvalidPosition { index: usize, x: f64, y: f64 },

    #[error("could not place agent #{agent} outside obstacles")]
    SpawnBlocked { agent: usize },

    #[error("local articulation scope needs at least one hop")]
    ZeroLocalHops,

    #[error("unrecognized goal: {0}")]
    UnrecognizedGoal(String),

    #[error("malformed parameter set: {0}")]
    Malformed(String),
}

impl ConfigError {
    pub(crate) fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(ConfigError::NonPositive { field, value })
        }
    }

    pub(crate) fn require_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
        if value.is_finite() && value >= 0.0 {
            Ok(())
        } else {
            Err(ConfigError::Negative { field, value })
        }
    }
}

/// Errors that abort a run.
#[derive(Debug, Error, PartialEq)]
pub enum SwarmError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Continuing would silently corrupt connectivity analysis.
    #[error("agent {agent} has a non-finite position")]
    NonFinitePosition { agent: usize },

    #[error("population changed from {expected} to {actual} agents")]
    PopulationMismatch { expected: usize, actual: usize },
}
