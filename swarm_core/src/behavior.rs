//! Per-agent motion update.
//!
//! Every agent's next state is a pure function of the previous step's
//! buffer, the neighbor graph, the leader assignment, the goal and the
//! active failure. Agents are updated in parallel into a separate output
//! buffer.
//!
//! The nominal update blends separation, cohesion and alignment with a goal
//! term (heading pursuit, leader following, or rendezvous) and obstacle
//! repulsion, then limits acceleration and speed. Failure effects are
//! applied on top of the nominal velocity. The committed position is finally
//! clamped to the world bounds and pushed out of any obstacle it entered.

use crate::error::{ConfigError, SwarmError};
use crate::failure::{ActiveFailure, FailureKind};
use crate::graph::NeighborGraph;
use crate::leader::LeaderAssignment;
use crate::params::SwarmParams;
use crate::world::{Agent, AgentMode, Goal, Obstacle};

use nalgebra::{Rotation2, Vector2, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Distances below this are treated as coincident.
const EPSILON: f64 = 1e-9;

/// Color channel value for leaders.
pub const LEADER_COLOR: f32 = 1.0;

/// Relative weight of each steering term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorWeights {
    pub separation: f64,
    pub cohesion: f64,
    pub alignment: f64,
    pub goal: f64,
    /// Followers matching their leader's velocity
    pub leader: f64,
    pub obstacle: f64,
}

impl Default for BehaviorWeights {
    fn default() -> Self {
        Self {
            separation: 1.5,
            cohesion: 0.6,
            alignment: 1.0,
            goal: 1.0,
            leader: 0.8,
            obstacle: 2.0,
        }
    }
}

impl BehaviorWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::require_non_negative("weights.separation", self.separation)?;
        ConfigError::require_non_negative("weights.cohesion", self.cohesion)?;
        ConfigError::require_non_negative("weights.alignment", self.alignment)?;
        ConfigError::require_non_negative("weights.goal", self.goal)?;
        ConfigError::require_non_negative("weights.leader", self.leader)?;
        ConfigError::require_non_negative("weights.obstacle", self.obstacle)?;
        Ok(())
    }
}

/// Everything the behavior phase reads.
#[derive(Debug, Clone, Copy)]
pub struct BehaviorInput<'a> {
    /// Previous step's committed agents
    pub agents: &'a [Agent],
    pub graph: &'a NeighborGraph,
    pub leaders: &'a LeaderAssignment,
    pub goal: &'a Goal,
    pub obstacles: &'a [Obstacle],
    pub failure: Option<&'a ActiveFailure>,
}

/// Motion update rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BehaviorKernel {
    pub weights: BehaviorWeights,
    pub max_speed: f64,
    pub max_accel: f64,
    pub dt: f64,
    pub sensing_radius: f64,
    pub separation_radius: f64,
    pub obstacle_margin: f64,
    pub arrival_radius: f64,
    pub half_size: f64,
}

impl BehaviorKernel {
    pub fn from_params(params: &SwarmParams) -> Self {
        Self {
            weights: params.weights,
            max_speed: params.max_speed,
            max_accel: params.max_accel,
            dt: params.dt,
            sensing_radius: params.sensing_radius,
            separation_radius: params.separation_radius,
            obstacle_margin: params.obstacle_margin,
            arrival_radius: params.arrival_radius,
            half_size: params.world_size / 2.0,
        }
    }

    /// Writes every agent's next state into `out`.
    ///
    /// # Errors
    /// `SwarmError::PopulationMismatch` if `out` and the input differ in length.
    pub fn run(&self, input: &BehaviorInput<'_>, out: &mut [Agent]) -> Result<(), SwarmError> {
        if out.len() != input.agents.len() {
            return Err(SwarmError::PopulationMismatch {
                expected: input.agents.len(),
                actual: out.len(),
            });
        }
        out.par_iter_mut()
            .enumerate()
            .for_each(|(i, slot)| *slot = self.update_agent(i, input));
        Ok(())
    }

    /// Next state of agent `i`.
    pub fn update_agent(&self, i: usize, input: &BehaviorInput<'_>) -> Agent {
        let agent = &input.agents[i];
        let (nominal, mut mode) = self.nominal_velocity(i, input);

        let (velocity, heading_bias) = match input.failure {
            Some(failure) if failure.targets(i, input.leaders) => {
                self.apply_failure(i, input, failure, nominal)
            }
            _ => (nominal, 0.0),
        };
        let mut velocity = clamp_norm(velocity, self.max_speed);

        let mut position = agent.xy() + velocity * self.dt;

        // World bounds
        for axis in 0..2 {
            if position[axis].abs() > self.half_size {
                position[axis] = position[axis].clamp(-self.half_size, self.half_size);
                velocity[axis] = 0.0;
                mode = AgentMode::Returning;
            }
        }

        // Obstacles
        for obstacle in input.obstacles {
            if obstacle.contains(position) {
                let (corrected, axis) = obstacle.push_out(position);
                position = corrected;
                velocity[axis] = 0.0;
            }
        }

        let is_leader = input.leaders.is_leader(i);
        Agent {
            position: Vector3::new(position.x, position.y, agent.position.z),
            color: if is_leader { LEADER_COLOR } else { mode.color() },
            velocity: Vector3::new(velocity.x, velocity.y, 0.0),
            mode,
            nearest_leader: input.leaders.nearest_leader(i),
            leader_countdown: input.leaders.countdowns.get(i).copied().unwrap_or(0),
            heading_bias,
        }
    }

    /// Unperturbed velocity and mode.
    ///
    /// Works on commanded velocities, so a drift bias committed last step
    /// never feeds back into this step's command.
    fn nominal_velocity(&self, i: usize, input: &BehaviorInput<'_>) -> (Vector2<f64>, AgentMode) {
        let agent = &input.agents[i];
        let p = agent.xy();
        let v = agent.commanded_vxy();
        let w = &self.weights;
        let mut steer = Vector2::<f64>::zeros();
        // Velocity-matching terms (alignment, goal, leader) and their summed gain
        let mut matching = Vector2::<f64>::zeros();
        let mut matching_gain = 0.0;

        let neighbors = input.graph.neighbors(i);
        if !neighbors.is_empty() {
            let mut separation = Vector2::<f64>::zeros();
            let mut centroid = Vector2::<f64>::zeros();
            let mut mean_velocity = Vector2::<f64>::zeros();

            for &j in neighbors {
                let other = &input.agents[j];
                let offset = p - other.xy();
                let d = offset.norm();
                if d > EPSILON && d < self.separation_radius {
                    separation += offset / d * (1.0 - d / self.separation_radius);
                }
                centroid += other.xy();
                mean_velocity += other.commanded_vxy();
            }

            let k = neighbors.len() as f64;
            centroid /= k;
            mean_velocity /= k;

            steer += separation * self.max_speed * w.separation;
            steer += (centroid - p) / self.sensing_radius * self.max_speed * w.cohesion;
            matching += (mean_velocity - v) * w.alignment;
            matching_gain += w.alignment;
        }

        let mode = match *input.goal {
            Goal::Heading { .. } => {
                let desired = clamp_norm(input.goal.heading_vector().unwrap_or_else(Vector2::zeros), self.max_speed);
                match input.leaders.nearest_leader(i) {
                    Some(leader) if leader != i => {
                        matching += (input.agents[leader].commanded_vxy() - v) * w.leader;
                        matching_gain += w.leader;
                    }
                    _ => {
                        matching += (desired - v) * w.goal;
                        matching_gain += w.goal;
                    }
                }
                AgentMode::Flocking
            }
            Goal::Point { .. } | Goal::Region { .. } => {
                if input.goal.is_arrived(p, self.arrival_radius) {
                    matching -= v * w.goal;
                    matching_gain += w.goal;
                    AgentMode::Idle
                } else {
                    let anchor = input.goal.anchor().unwrap_or(p);
                    let to_anchor = anchor - p;
                    let distance = to_anchor.norm();
                    let desired = if distance > EPSILON {
                        to_anchor / distance * self.max_speed
                    } else {
                        Vector2::zeros()
                    };
                    matching += (desired - v) * w.goal;
                    matching_gain += w.goal;
                    AgentMode::Rendezvous
                }
            }
        };

        // Above unit gain the matched velocity overshoots and alternates step to step
        if matching_gain > 1.0 {
            matching /= matching_gain;
        }
        steer += matching;
        steer += self.obstacle_repulsion(p, input.obstacles) * w.obstacle;

        let dv = clamp_norm(steer, self.max_accel * self.dt);
        (clamp_norm(v + dv, self.max_speed), mode)
    }

    /// Push away from obstacles closer than the margin.
    fn obstacle_repulsion(&self, p: Vector2<f64>, obstacles: &[Obstacle]) -> Vector2<f64> {
        let mut push = Vector2::<f64>::zeros();
        if self.obstacle_margin <= 0.0 {
            return push;
        }
        for obstacle in obstacles {
            let offset = p - obstacle.closest_point(p);
            let d = offset.norm();
            if d >= self.obstacle_margin {
                continue;
            }
            let away = if d > EPSILON {
                offset / d
            } else {
                let center = Vector2::new(obstacle.x + obstacle.w / 2.0, obstacle.y + obstacle.h / 2.0);
                (p - center).try_normalize(EPSILON).unwrap_or_else(Vector2::zeros)
            };
            push += away * (1.0 - d / self.obstacle_margin) * self.max_speed;
        }
        push
    }

    /// Perturbed velocity plus the heading bias it carries.
    ///
    /// Drift offsets the commanded heading by a fixed angle. The bias is
    /// recorded on the agent and removed again by `commanded_vxy`, so it
    /// stays constant instead of compounding step after step.
    fn apply_failure(
        &self,
        i: usize,
        input: &BehaviorInput<'_>,
        failure: &ActiveFailure,
        velocity: Vector2<f64>,
    ) -> (Vector2<f64>, f64) {
        match failure.kind {
            FailureKind::HeadingDrift => {
                let bias = failure.heading_bias();
                (Rotation2::new(bias) * velocity, bias)
            }
            FailureKind::Spread => {
                let outward = (input.agents[i].xy() - local_centroid(i, input))
                    .try_normalize(EPSILON)
                    .unwrap_or_else(Vector2::zeros);
                (velocity + outward * failure.magnitude * self.max_speed, 0.0)
            }
            FailureKind::Milling => {
                let radial = input.agents[i].xy() - local_centroid(i, input);
                match radial.try_normalize(EPSILON) {
                    Some(r) => (Vector2::new(-r.y, r.x) * failure.magnitude * self.max_speed, 0.0),
                    None => (velocity, 0.0),
                }
            }
            FailureKind::None => (velocity, 0.0),
        }
    }
}

/// Mean position of an agent and its neighbors.
fn local_centroid(i: usize, input: &BehaviorInput<'_>) -> Vector2<f64> {
    let neighbors = input.graph.neighbors(i);
    let sum = neighbors
        .iter()
        .fold(input.agents[i].xy(), |acc, &j| acc + input.agents[j].xy());
    sum / (neighbors.len() + 1) as f64
}

fn clamp_norm(v: Vector2<f64>, max: f64) -> Vector2<f64> {
    let norm = v.norm();
    if norm > max && norm > 0.0 {
        v * (max / norm)
    } else {
        v
    }
}
