//! Operator trust model.
//!
//! Trust is a scalar clamped to `[min, max]` on every update. Failures knock
//! it down, quiet stretches let it creep back up, and the operator confirms
//! (or corrects) it through acknowledgments.

use crate::error::ConfigError;
use crate::failure::FailureKind;

use serde::{Deserialize, Serialize};

/// Trust model settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustParams {
    pub initial: f64,
    pub min: f64,
    pub max: f64,

    /// Subtracted when a failure activates
    pub failure_penalty: f64,

    /// Added per failure-free step once recovery starts
    pub recovery_rate: f64,

    /// Failure-free steps before recovery starts
    pub recovery_delay: u64,

    /// Below this, an override is requested
    pub low_threshold: f64,
}

impl Default for TrustParams {
    fn default() -> Self {
        Self {
            initial: 1.0,
            min: 0.0,
            max: 1.0,
            failure_penalty: 0.3,
            recovery_rate: 0.005,
            recovery_delay: 20,
            low_threshold: 0.5,
        }
    }
}

impl TrustParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min >= self.max {
            return Err(ConfigError::InvalidTrustBounds { min: self.min, max: self.max });
        }
        let within = |field: &'static str, value: f64| {
            if value.is_finite() && value >= self.min && value <= self.max {
                Ok(())
            } else {
                Err(ConfigError::TrustOutOfBounds { field, value, min: self.min, max: self.max })
            }
        };
        within("initial", self.initial)?;
        within("low_threshold", self.low_threshold)?;
        ConfigError::require_non_negative("failure_penalty", self.failure_penalty)?;
        ConfigError::require_non_negative("recovery_rate", self.recovery_rate)?;
        Ok(())
    }

    fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// What the operator is being asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingCommand {
    #[default]
    None,
    GoalChange,
    LowTrustOverride,
}

/// Trust as seen by the operator interface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustState {
    pub level: f64,
    pub pending: PendingCommand,

    /// Whether the operator has acknowledged the current level
    pub verified: bool,
}

/// Updates `TrustState` from failure transitions and operator events.
#[derive(Debug, Clone)]
pub struct TrustEstimator {
    params: TrustParams,
    state: TrustState,
    quiet_steps: u64,
}

impl TrustEstimator {
    pub fn new(params: TrustParams) -> Self {
        Self {
            state: Self::initial_state(&params),
            params,
            quiet_steps: 0,
        }
    }

    fn initial_state(params: &TrustParams) -> TrustState {
        TrustState {
            level: params.clamp(params.initial),
            pending: PendingCommand::None,
            verified: true,
        }
    }

    pub fn params(&self) -> &TrustParams {
        &self.params
    }

    pub fn state(&self) -> TrustState {
        self.state
    }

    pub fn level(&self) -> f64 {
        self.state.level
    }

    pub fn is_low(&self) -> bool {
        self.state.level < self.params.low_threshold
    }

    /// Applies the penalty for a newly active failure.
    ///
    /// Returns true if this drop took trust below the low threshold.
    pub fn on_failure_activated(&mut self, kind: FailureKind) -> bool {
        self.quiet_steps = 0;
        if !kind.is_effective() {
            return false;
        }

        let was_low = self.is_low();
        self.state.level = self.params.clamp(self.state.level - self.params.failure_penalty);
        self.state.verified = false;

        if self.is_low() {
            self.state.pending = PendingCommand::LowTrustOverride;
        }
        self.is_low() && !was_low
    }

    /// End-of-step bookkeeping; recovers trust after enough quiet steps.
    pub fn on_step(&mut self, failure_active: bool) {
        if failure_active {
            self.quiet_steps = 0;
            return;
        }
        self.quiet_steps += 1;
        if self.quiet_steps > self.params.recovery_delay {
            self.state.level = self.params.clamp(self.state.level + self.params.recovery_rate);
        }
    }

    /// Operator acknowledgment, optionally reporting their own trust level.
    pub fn acknowledge(&mut self, reported: Option<f64>) {
        if let Some(level) = reported.filter(|l| l.is_finite()) {
            self.state.level = self.params.clamp(level);
        }
        self.state.verified = true;
        self.state.pending = PendingCommand::None;
    }

    /// Flags a goal change awaiting confirmation. An override request takes precedence.
    pub fn request_goal_change(&mut self) {
        if self.state.pending != PendingCommand::LowTrustOverride {
            self.state.pending = PendingCommand::GoalChange;
        }
    }

    /// Explicit operator reset back to the initial state.
    pub fn reset(&mut self) {
        self.state = Self::initial_state(&self.params);
        self.quiet_steps = 0;
    }
}

impl Default for TrustEstimator {
    fn default() -> Self {
        Self::new(TrustParams::default())
    }
}
