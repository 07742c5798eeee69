//! Run configuration.
//!
//! `SwarmParams` is the structured parameter set consumed by the engine.
//! Every field has a default so partial JSON files deserialize cleanly;
//! `validate()` rejects contradictory values before the step loop starts.

use crate::behavior::BehaviorWeights;
use crate::connectivity::ArticulationScope;
use crate::error::ConfigError;
use crate::failure::{FailureSpec, FailureTarget, RandomFailurePlan};
use crate::leader::LeaderParams;
use crate::trust::TrustParams;
use crate::world::{Goal, Obstacle, Target};

use serde::{Deserialize, Serialize};

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmParams {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of agents (fixed for the whole run)
    pub num_agents: usize,

    /// Edge length of the square world, centered on the origin
    pub world_size: f64,

    /// Edge length of the square agents spawn in
    pub start_region: f64,

    /// Explicit spawn positions; overrides random spawning when non-empty
    pub initial_positions: Vec<[f64; 2]>,

    /// Maximum distance at which two agents are neighbors
    pub sensing_radius: f64,

    /// Distance below which neighbors repel each other
    pub separation_radius: f64,

    pub max_speed: f64,

    /// Maximum velocity change per step
    pub max_accel: f64,

    /// Integration time step
    pub dt: f64,

    pub weights: BehaviorWeights,

    /// Distance from an obstacle at which avoidance kicks in
    pub obstacle_margin: f64,

    pub goal: Goal,

    /// Distance from a goal point counted as arrived
    pub arrival_radius: f64,

    /// Mean-heading error (radians) counted as on course for heading goals
    pub heading_tolerance: f64,

    pub obstacles: Vec<Obstacle>,

    /// Extra obstacles placed at random (kept clear of the spawn region)
    pub random_obstacles: usize,

    pub targets: Vec<Target>,

    pub random_targets: usize,

    /// Failure queue, in activation order
    pub failures: Vec<FailureSpec>,

    /// Used to generate the queue when `failures` is empty
    pub random_failures: Option<RandomFailurePlan>,

    pub failure_target: FailureTarget,

    pub leader: LeaderParams,

    pub articulation: ArticulationScope,

    pub trust: TrustParams,

    /// Edge length of occupancy/explored grid cells
    pub grid_cell_size: f64,

    /// Steps before the run ends (0 = unlimited)
    pub max_steps: u64,

    /// End the run as soon as the goal is reached
    pub stop_on_goal: bool,
}

impl Default for SwarmParams {
    fn default() -> Self {
        Self {
            seed: 42,
            num_agents: 64,
            world_size: 200.0,
            start_region: 40.0,
            initial_positions: Vec::new(),
            sensing_radius: 12.0,
            separation_radius: 4.0,
            max_speed: 2.0,
            max_accel: 0.5,
            dt: 1.0,
            weights: BehaviorWeights::default(),
            obstacle_margin: 5.0,
            goal: Goal::default(),
            arrival_radius: 5.0,
            heading_tolerance: 0.15,
            obstacles: Vec::new(),
            random_obstacles: 0,
            targets: Vec::new(),
            random_targets: 0,
            failures: Vec::new(),
            random_failures: None,
            failure_target: FailureTarget::All,
            leader: LeaderParams::default(),
            articulation: ArticulationScope::default(),
            trust: TrustParams::default(),
            grid_cell_size: 2.0,
            max_steps: 1000,
            stop_on_goal: false,
        }
    }
}

impl SwarmParams {
    /// Parses a JSON parameter set and validates it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let params: SwarmParams = serde_json::from_str(json)
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Rejects invalid or contradictory values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_agents == 0 {
            return Err(ConfigError::NoAgents);
        }
        if !self.initial_positions.is_empty() && self.initial_positions.len() != self.num_agents {
            return Err(ConfigError::PositionCountMismatch {
                expected: self.num_agents,
                actual: self.initial_positions.len(),
            });
        }

        ConfigError::require_positive("world_size", self.world_size)?;
        ConfigError::require_positive("start_region", self.start_region)?;
        ConfigError::require_positive("sensing_radius", self.sensing_radius)?;
        ConfigError::require_positive("max_speed", self.max_speed)?;
        ConfigError::require_positive("max_accel", self.max_accel)?;
        ConfigError::require_positive("dt", self.dt)?;
        ConfigError::require_positive("arrival_radius", self.arrival_radius)?;
        ConfigError::require_positive("grid_cell_size", self.grid_cell_size)?;
        ConfigError::require_non_negative("separation_radius", self.separation_radius)?;
        ConfigError::require_non_negative("obstacle_margin", self.obstacle_margin)?;
        ConfigError::require_non_negative("heading_tolerance", self.heading_tolerance)?;

        let half = self.world_size / 2.0;
        for (index, &[x, y]) in self.initial_positions.iter().enumerate() {
            if !(x.is_finite() && y.is_finite() && x.abs() <= half && y.abs() <= half) {
                return Err(ConfigError::InvalidPosition { index, x, y });
            }
        }

        self.weights.validate()?;
        self.goal.validate(self.world_size)?;

        for (index, obstacle) in self.obstacles.iter().enumerate() {
            if !obstacle.is_valid() {
                return Err(ConfigError::InvalidObstacle { index });
            }
        }
        for (index, spec) in self.failures.iter().enumerate() {
            spec.validate(index)?;
        }
        if let Some(plan) = &self.random_failures {
            plan.validate()?;
        }

        self.failure_target.validate()?;
        self.articulation.validate()?;
        self.trust.validate()?;
        Ok(())
    }
}
