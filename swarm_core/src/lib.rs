//! Swarm Core - per-step engine for a simulated agent swarm
//!
//! Each step runs strictly ordered, internally parallel phases:
//! 1. **Neighbor graph**: symmetric sensing links from the current positions
//! 2. **Connectivity**: multi-hop reach ranking and articulation points
//! 3. **Leaders**: one leader per component, held in place by a countdown
//! 4. **Failures**: a FIFO of scheduled perturbations, at most one active
//! 5. **Behavior**: flocking / rendezvous / obstacle avoidance into a back buffer
//! 6. **Trust**: operator confidence reacting to failures and acknowledgments
//!
//! [`Simulation`] owns the whole context and drives the phases.

pub mod behavior;
pub mod connectivity;
pub mod error;
pub mod failure;
pub mod graph;
pub mod grid;
pub mod leader;
pub mod metrics;
pub mod params;
pub mod scheduler;
pub mod trust;
pub mod world;

// Re-export key types for convenience
pub use behavior::{BehaviorInput, BehaviorKernel, BehaviorWeights};
pub use connectivity::{
    ArticulationScope, ArticulationSet, ConnectivityAnalysis, ConnectivityAnalyzer, ConnectivitySummary,
};
pub use error::{ConfigError, SwarmError};
pub use failure::{
    ActiveFailure, FailureInjector, FailureKind, FailureSpec, FailureTarget, FailureTransition,
    FailureTrigger, RandomFailurePlan,
};
pub use graph::{ComponentMap, NeighborGraph};
pub use grid::{ExploredGrid, OccupancyGrid};
pub use leader::{LeaderAssignment, LeaderElector, LeaderParams};
pub use metrics::SwarmMetrics;
pub use params::SwarmParams;
pub use scheduler::{
    ActiveFailureRecord, AgentRecord, FinishReason, OperatorEvent, RunSummary, Simulation, StepOutcome,
    StepRecord,
};
pub use trust::{PendingCommand, TrustEstimator, TrustParams, TrustState};
pub use world::{Agent, AgentMode, Goal, Obstacle, Target, WorldState};
