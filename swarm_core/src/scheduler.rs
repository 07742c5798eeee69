//! Step scheduler: runs the phases of one simulation step in order.
//!
//! ```text
//! operator events ─► pause gate ─► neighbor graph ─► connectivity ─► leaders
//!                                                                      │
//!   grids/targets ◄─ trust ◄─ swap buffers ◄─ behavior ◄─ failure/trust ◄┘
//! ```
//!
//! Each phase completes before the next starts. Operator events queued with
//! [`Simulation::submit`] are applied at the next step boundary, so no phase
//! ever sees a half-applied command. While paused, the events are still
//! applied but every phase is skipped.

use crate::behavior::{BehaviorInput, BehaviorKernel};
use crate::connectivity::{ConnectivityAnalysis, ConnectivityAnalyzer, HOP_LIMIT};
use crate::error::SwarmError;
use crate::failure::{ActiveFailure, FailureInjector, FailureKind, FailureSpec, FailureTransition};
use crate::graph::NeighborGraph;
use crate::leader::{LeaderAssignment, LeaderElector};
use crate::metrics::SwarmMetrics;
use crate::params::SwarmParams;
use crate::trust::{TrustEstimator, TrustState};
use crate::world::{AgentMode, Goal, WorldState};

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use swarm_env::RunId;
use tracing::{debug, info, warn};

/// External command, applied at the next step boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OperatorEvent {
    Pause,
    Resume,
    TogglePause,
    ChangeGoal { goal: Goal },
    /// Confirms the current trust level, optionally reporting a new one
    AcknowledgeTrust { reported: Option<f64> },
    ResetTrust,
    ScheduleFailure { spec: FailureSpec },
    Stop,
}

/// Per-agent state exposed to presentation and logging layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub position: [f64; 3],
    pub color: f32,
    pub velocity: [f64; 3],
    pub mode: AgentMode,
    pub is_leader: bool,
    pub is_articulation: bool,
    pub nearest_leader: Option<usize>,
    pub leader_countdown: u32,
    pub reach: [u32; HOP_LIMIT],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveFailureRecord {
    pub kind: FailureKind,
    pub magnitude: f64,
    pub commands_since_failure: u32,
    pub commands_remove_failure: u32,
    pub started_at: u64,
}

impl From<&ActiveFailure> for ActiveFailureRecord {
    fn from(failure: &ActiveFailure) -> Self {
        Self {
            kind: failure.kind,
            magnitude: failure.magnitude,
            commands_since_failure: failure.commands_since_failure,
            commands_remove_failure: failure.commands_remove_failure,
            started_at: failure.started_at,
        }
    }
}

/// Everything observable about one completed step.
///
/// Leader and articulation flags come from the graph at the start of the
/// step; agent states are the committed result of the step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: u64,
    pub goal: Goal,
    pub agents: Vec<AgentRecord>,
    pub leaders: Vec<usize>,
    pub articulation: Vec<usize>,
    pub failure: Option<ActiveFailureRecord>,
    pub trust: TrustState,
    pub metrics: SwarmMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    MaxSteps,
    GoalReached,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Advanced(StepRecord),
    /// Paused: events were applied, no phase ran
    Paused,
    Finished(FinishReason),
}

/// Final record produced by [`Simulation::finish`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub seed: u64,
    pub steps: u64,
    pub reason: Option<FinishReason>,
    pub failures_activated: usize,
    pub failures_completed: usize,
    pub failures_pending: usize,
    pub leader_changes: usize,
    pub min_trust: f64,
    pub trust: TrustState,
    pub goal_reached_at: Option<u64>,
    pub metrics: SwarmMetrics,
}

/// Owns the whole simulation context and advances it one step at a time.
pub struct Simulation {
    run_id: RunId,
    params: SwarmParams,
    world: WorldState,
    goal: Goal,
    analyzer: ConnectivityAnalyzer,
    elector: LeaderElector,
    kernel: BehaviorKernel,
    injector: FailureInjector,
    trust: TrustEstimator,
    leaders: LeaderAssignment,
    analysis: Option<ConnectivityAnalysis>,
    metrics: SwarmMetrics,
    events: VecDeque<OperatorEvent>,
    step: u64,
    paused: bool,
    finished: Option<FinishReason>,
    failures_activated: usize,
    leader_changes: usize,
    min_trust: f64,
    goal_reached_at: Option<u64>,
}

impl Simulation {
    /// Validates `params`, generates the world and prepares the phases.
    ///
    /// # Errors
    /// `SwarmError::Config` for any invalid or contradictory parameter.
    pub fn new(params: SwarmParams) -> Result<Self, SwarmError> {
        params.validate()?;
        let world = WorldState::generate(&params)?;

        let failures = match (&params.random_failures, params.failures.is_empty()) {
            (Some(plan), true) => plan.generate(params.seed),
            _ => params.failures.clone(),
        };
        let injector = FailureInjector::new(failures, params.failure_target, params.seed)?;
        let trust = TrustEstimator::new(params.trust);

        info!(
            "Simulation ready: {} agents, {} obstacles, {} targets, {} failures queued",
            world.len(),
            world.obstacles().len(),
            world.targets().len(),
            injector.queue().len()
        );

        Ok(Self {
            run_id: RunId::from_seed(params.seed),
            goal: params.goal,
            analyzer: ConnectivityAnalyzer::new(params.articulation),
            elector: LeaderElector::new(params.leader),
            kernel: BehaviorKernel::from_params(&params),
            leaders: LeaderAssignment::empty(world.len()),
            min_trust: trust.level(),
            injector,
            trust,
            world,
            params,
            analysis: None,
            metrics: SwarmMetrics::default(),
            events: VecDeque::new(),
            step: 0,
            paused: false,
            finished: None,
            failures_activated: 0,
            leader_changes: 0,
            goal_reached_at: None,
        })
    }

    /// Queues an operator event for the next step boundary.
    pub fn submit(&mut self, event: OperatorEvent) {
        self.events.push_back(event);
    }

    /// Runs one step.
    ///
    /// # Errors
    /// `SwarmError::NonFinitePosition` if an agent's state has been corrupted.
    pub fn step(&mut self) -> Result<StepOutcome, SwarmError> {
        self.apply_events();

        if let Some(reason) = self.finished {
            return Ok(StepOutcome::Finished(reason));
        }
        if self.paused {
            return Ok(StepOutcome::Paused);
        }

        let step = self.step;

        let graph = NeighborGraph::build(&self.world.positions(), self.params.sensing_radius)?;
        let analysis = self.analyzer.analyze(&graph);
        let leaders = self.elector.elect(&graph, &analysis, &self.leaders);
        self.track_leader_changes(step, &leaders);

        match self.injector.advance(step, self.world.len()) {
            Some(FailureTransition::Activated { kind, magnitude, step }) => {
                self.failures_activated += 1;
                info!("Failure activated at step {}: {} (magnitude {:.3})", step, kind, magnitude);
                if self.trust.on_failure_activated(kind) {
                    warn!(
                        "Trust dropped to {:.2}, below threshold {:.2}; override requested",
                        self.trust.level(),
                        self.trust.params().low_threshold
                    );
                }
            }
            Some(FailureTransition::Cleared { kind, step, active_steps }) => {
                info!("Failure cleared at step {}: {} after {} steps", step, kind, active_steps);
            }
            None => {}
        }

        let (front, obstacles, back) = self.world.buffers_mut();
        let input = BehaviorInput {
            agents: front,
            graph: &graph,
            leaders: &leaders,
            goal: &self.goal,
            obstacles,
            failure: self.injector.active(),
        };
        self.kernel.run(&input, back)?;
        self.world.swap_buffers()?;

        self.trust.on_step(self.injector.is_active());
        self.min_trust = self.min_trust.min(self.trust.level());

        self.world.update_explored(self.params.sensing_radius);
        let found = self.world.update_targets(self.params.sensing_radius);
        if found > 0 {
            info!("Step {}: {} new target(s) found", step, found);
        }

        self.metrics = SwarmMetrics::compute(&self.world, &analysis, &leaders, &self.goal);
        let record = self.record(step, &analysis, &leaders);

        debug!(
            "step={} components={} leaders={} articulation={} trust={:.2}",
            step,
            self.metrics.component_count,
            self.metrics.leader_count,
            self.metrics.articulation_count,
            self.trust.level()
        );

        self.leaders = leaders;
        self.analysis = Some(analysis);
        self.step += 1;
        self.check_finished();

        Ok(StepOutcome::Advanced(record))
    }

    /// Steps until the run finishes, handing every record to `on_step`.
    ///
    /// A paused simulation with no queued events cannot resume on its own,
    /// so it is stopped.
    pub fn run_until_finished(
        &mut self,
        mut on_step: impl FnMut(&StepRecord),
    ) -> Result<FinishReason, SwarmError> {
        loop {
            match self.step()? {
                StepOutcome::Advanced(record) => on_step(&record),
                StepOutcome::Finished(reason) => return Ok(reason),
                StepOutcome::Paused if self.events.is_empty() => {
                    warn!("Paused with no pending operator events; stopping at step {}", self.step);
                    self.finished = Some(FinishReason::Stopped);
                }
                StepOutcome::Paused => {}
            }
        }
    }

    /// Consumes the simulation and returns its final summary.
    pub fn finish(self) -> RunSummary {
        let summary = RunSummary {
            run_id: self.run_id,
            seed: self.params.seed,
            steps: self.step,
            reason: self.finished,
            failures_activated: self.failures_activated,
            failures_completed: self.injector.completed(),
            failures_pending: self.injector.queue().len(),
            leader_changes: self.leader_changes,
            min_trust: self.min_trust,
            trust: self.trust.state(),
            goal_reached_at: self.goal_reached_at,
            metrics: self.metrics,
        };
        info!(
            "Run {} finished after {} steps ({:?}); trust {:.2}, {} targets found",
            summary.run_id, summary.steps, summary.reason, summary.trust.level, summary.metrics.targets_found
        );
        summary
    }

    fn apply_events(&mut self) {
        while let Some(event) = self.events.pop_front() {
            debug!("Operator event at step {}: {:?}", self.step, event);
            match event {
                OperatorEvent::Pause => self.paused = true,
                OperatorEvent::Resume => self.paused = false,
                OperatorEvent::TogglePause => self.paused = !self.paused,
                OperatorEvent::ChangeGoal { goal } => {
                    if let Err(e) = goal.validate(self.params.world_size) {
                        warn!("Rejected goal change: {}", e);
                        continue;
                    }
                    info!("Goal changed at step {}: {:?}", self.step, goal);
                    self.goal = goal;
                    self.goal_reached_at = None;
                    self.trust.request_goal_change();
                    self.injector.record_command();
                }
                OperatorEvent::AcknowledgeTrust { reported } => {
                    self.trust.acknowledge(reported);
                    self.min_trust = self.min_trust.min(self.trust.level());
                }
                OperatorEvent::ResetTrust => self.trust.reset(),
                OperatorEvent::ScheduleFailure { spec } => {
                    if let Err(e) = self.injector.schedule(spec) {
                        warn!("Rejected failure: {}", e);
                    }
                }
                OperatorEvent::Stop => {
                    self.finished.get_or_insert(FinishReason::Stopped);
                }
            }
        }
    }

    fn track_leader_changes(&mut self, step: u64, next: &LeaderAssignment) {
        let promoted: Vec<usize> = next
            .leaders()
            .into_iter()
            .filter(|&l| !self.leaders.is_leader(l))
            .collect();
        if !promoted.is_empty() && step > 0 {
            info!("Step {}: new leader(s) {:?}", step, promoted);
        }
        self.leader_changes += promoted.len();
    }

    fn check_finished(&mut self) {
        let reached = self.metrics.goal_reached(
            &self.goal,
            self.world.agents(),
            self.params.arrival_radius,
            self.params.heading_tolerance,
        );
        if reached && self.goal_reached_at.is_none() {
            info!("Goal reached at step {}", self.step);
            self.goal_reached_at = Some(self.step);
        }

        if reached && self.params.stop_on_goal {
            self.finished.get_or_insert(FinishReason::GoalReached);
        } else if self.params.max_steps > 0 && self.step >= self.params.max_steps {
            self.finished.get_or_insert(FinishReason::MaxSteps);
        }
    }

    fn record(&self, step: u64, analysis: &ConnectivityAnalysis, leaders: &LeaderAssignment) -> StepRecord {
        let agents = self
            .world
            .agents()
            .iter()
            .enumerate()
            .map(|(i, a)| AgentRecord {
                position: a.position.into(),
                color: a.color,
                velocity: a.velocity.into(),
                mode: a.mode,
                is_leader: leaders.is_leader(i),
                is_articulation: analysis.articulation.contains(i),
                nearest_leader: a.nearest_leader,
                leader_countdown: a.leader_countdown,
                reach: analysis.summaries[i].reach,
            })
            .collect();

        StepRecord {
            step,
            goal: self.goal,
            agents,
            leaders: leaders.leaders(),
            articulation: analysis.articulation.members(),
            failure: self.injector.active().map(ActiveFailureRecord::from),
            trust: self.trust.state(),
            metrics: self.metrics,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn params(&self) -> &SwarmParams {
        &self.params
    }

    /// Steps completed so far.
    pub fn current_step(&self) -> u64 {
        self.step
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    pub fn leaders(&self) -> &LeaderAssignment {
        &self.leaders
    }

    /// Analysis from the most recent step.
    pub fn analysis(&self) -> Option<&ConnectivityAnalysis> {
        self.analysis.as_ref()
    }

    pub fn metrics(&self) -> &SwarmMetrics {
        &self.metrics
    }

    pub fn injector(&self) -> &FailureInjector {
        &self.injector
    }

    pub fn trust(&self) -> TrustState {
        self.trust.state()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finished
    }
}
