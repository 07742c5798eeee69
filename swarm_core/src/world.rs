//! World state: the agent population and the static environment.
//!
//! Agent positions and velocities are double-buffered. The behavior phase
//! reads the front buffer and writes the back buffer, then the buffers are
//! swapped, so no agent ever observes a half-updated neighbor.

use crate::error::{ConfigError, SwarmError};
use crate::grid::{ExploredGrid, OccupancyGrid};
use crate::params::SwarmParams;

use nalgebra::{Rotation2, Vector2, Vector3};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use swarm_env::stream_rng;

/// RNG stream used for world generation.
const WORLD_STREAM: u64 = 1;

/// Spawn attempts per agent before giving up on an obstacle-free spot.
const MAX_SPAWN_ATTEMPTS: usize = 256;

/// Behavioral state of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// Holding position (goal reached, or not yet moved)
    #[default]
    Idle,
    /// Flocking under a heading goal
    Flocking,
    /// Converging on a goal point or region
    Rendezvous,
    /// Pushed back from the world boundary
    Returning,
}

impl AgentMode {
    /// Color channel value handed to the presentation layer.
    pub fn color(&self) -> f32 {
        match self {
            AgentMode::Idle => 0.0,
            AgentMode::Flocking => 0.25,
            AgentMode::Rendezvous => 0.5,
            AgentMode::Returning => 0.75,
        }
    }
}

/// One swarm member. Identity is its index in the population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Position [x, y, z]; motion happens in the xy plane
    pub position: Vector3<f64>,

    /// Render color channel packed alongside the position
    pub color: f32,

    /// Velocity [vx, vy, vz]
    pub velocity: Vector3<f64>,

    pub mode: AgentMode,

    /// Index of the leader this agent follows, if any is reachable
    pub nearest_leader: Option<usize>,

    /// Ticks before a leader may be displaced
    pub leader_countdown: u32,

    /// Heading bias (radians) baked into `velocity` by an active drift failure
    #[serde(default)]
    pub heading_bias: f64,
}

impl Agent {
    /// Creates a stationary agent at (x, y).
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            position: Vector3::new(x, y, 0.0),
            color: AgentMode::Idle.color(),
            velocity: Vector3::zeros(),
            mode: AgentMode::Idle,
            nearest_leader: None,
            leader_countdown: 0,
            heading_bias: 0.0,
        }
    }

    /// Planar position.
    pub fn xy(&self) -> Vector2<f64> {
        Vector2::new(self.position.x, self.position.y)
    }

    /// Planar velocity.
    pub fn vxy(&self) -> Vector2<f64> {
        Vector2::new(self.velocity.x, self.velocity.y)
    }

    /// Planar velocity with any drift bias removed: what the agent meant to fly.
    pub fn commanded_vxy(&self) -> Vector2<f64> {
        if self.heading_bias == 0.0 {
            self.vxy()
        } else {
            Rotation2::new(-self.heading_bias) * self.vxy()
        }
    }

    /// Heading in radians, measured from +x.
    pub fn heading(&self) -> f64 {
        self.velocity.y.atan2(self.velocity.x)
    }

    pub fn speed(&self) -> f64 {
        self.vxy().norm()
    }
}

/// Axis-aligned rectangular obstacle (min corner plus extent).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Obstacle {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.w, self.h].iter().all(|v| v.is_finite()) && self.w > 0.0 && self.h > 0.0
    }

    pub fn contains(&self, p: Vector2<f64>) -> bool {
        p.x >= self.x && p.x <= self.x + self.w && p.y >= self.y && p.y <= self.y + self.h
    }

    /// Closest point of the rectangle to `p` (p itself when inside).
    pub fn closest_point(&self, p: Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            p.x.clamp(self.x, self.x + self.w),
            p.y.clamp(self.y, self.y + self.h),
        )
    }

    /// Moves a point that lies inside the rectangle onto its nearest edge.
    ///
    /// Returns the corrected point and the axis that was clamped
    /// (0 = x, 1 = y).
    pub fn push_out(&self, p: Vector2<f64>) -> (Vector2<f64>, usize) {
        let left = p.x - self.x;
        let right = self.x + self.w - p.x;
        let bottom = p.y - self.y;
        let top = self.y + self.h - p.y;

        let min = left.min(right).min(bottom).min(top);
        if min == left {
            (Vector2::new(self.x, p.y), 0)
        } else if min == right {
            (Vector2::new(self.x + self.w, p.y), 0)
        } else if min == bottom {
            (Vector2::new(p.x, self.y), 1)
        } else {
            (Vector2::new(p.x, self.y + self.h), 1)
        }
    }
}

/// A point of interest agents can discover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub found: bool,
}

impl Target {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, found: false }
    }

    pub fn xy(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

/// The single active goal of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Goal {
    /// Fly on a heading (radians) at a speed
    Heading { heading: f64, speed: f64 },
    /// Rendezvous at a point
    Point { x: f64, y: f64 },
    /// Gather inside a rectangle (min corner plus extent)
    Region { x: f64, y: f64, w: f64, h: f64 },
}

impl Default for Goal {
    fn default() -> Self {
        Goal::Heading { heading: 0.0, speed: 1.0 }
    }
}

impl Goal {
    /// Commanded velocity for heading goals.
    pub fn heading_vector(&self) -> Option<Vector2<f64>> {
        match *self {
            Goal::Heading { heading, speed } => Some(Vector2::new(heading.cos(), heading.sin()) * speed),
            _ => None,
        }
    }

    /// Point the swarm converges on, for point and region goals.
    pub fn anchor(&self) -> Option<Vector2<f64>> {
        match *self {
            Goal::Heading { .. } => None,
            Goal::Point { x, y } => Some(Vector2::new(x, y)),
            Goal::Region { x, y, w, h } => Some(Vector2::new(x + w / 2.0, y + h / 2.0)),
        }
    }

    /// True if `p` counts as arrived.
    pub fn is_arrived(&self, p: Vector2<f64>, arrival_radius: f64) -> bool {
        match *self {
            Goal::Heading { .. } => false,
            Goal::Point { x, y } => (p - Vector2::new(x, y)).norm() <= arrival_radius,
            Goal::Region { x, y, w, h } => p.x >= x && p.x <= x + w && p.y >= y && p.y <= y + h,
        }
    }

    pub fn is_finite(&self) -> bool {
        match *self {
            Goal::Heading { heading, speed } => heading.is_finite() && speed.is_finite(),
            Goal::Point { x, y } => x.is_finite() && y.is_finite(),
            Goal::Region { x, y, w, h } => [x, y, w, h].iter().all(|v| v.is_finite()),
        }
    }

    /// Checks the goal against the world extent.
    pub fn validate(&self, world_size: f64) -> Result<(), ConfigError> {
        if !self.is_finite() {
            return Err(ConfigError::GoalOutsideWorld);
        }
        let half = world_size / 2.0;
        let inside = |x: f64, y: f64| x.abs() <= half && y.abs() <= half;
        match *self {
            Goal::Heading { speed, .. } => ConfigError::require_non_negative("goal speed", speed),
            Goal::Point { x, y } if inside(x, y) => Ok(()),
            Goal::Region { x, y, w, h } if w > 0.0 && h > 0.0 && inside(x, y) && inside(x + w, y + h) => Ok(()),
            _ => Err(ConfigError::GoalOutsideWorld),
        }
    }

    /// Random heading goal at the given speed.
    pub fn random_heading<R: Rng>(rng: &mut R, speed: f64) -> Self {
        Goal::Heading {
            heading: rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI),
            speed,
        }
    }

    /// Random point goal inside the middle 80% of the world.
    pub fn random_point<R: Rng>(rng: &mut R, world_size: f64) -> Self {
        let half = world_size * 0.4;
        Goal::Point {
            x: rng.gen_range(-half..half),
            y: rng.gen_range(-half..half),
        }
    }
}

impl FromStr for Goal {
    type Err = ConfigError;

    /// Parses `heading:<rad>,<speed>`, `point:<x>,<y>` or
    /// `region:<x>,<y>,<w>,<h>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unrecognized = || ConfigError::UnrecognizedGoal(s.to_string());
        let (kind, rest) = s.split_once(':').ok_or_else(unrecognized)?;
        let values = rest
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|_| unrecognized())?;

        match (kind.trim().to_lowercase().as_str(), values.as_slice()) {
            ("heading", [heading, speed]) => Ok(Goal::Heading { heading: *heading, speed: *speed }),
            ("point", [x, y]) => Ok(Goal::Point { x: *x, y: *y }),
            ("region", [x, y, w, h]) => Ok(Goal::Region { x: *x, y: *y, w: *w, h: *h }),
            _ => Err(unrecognized()),
        }
    }
}

/// Owns the agent buffers and the static environment.
#[derive(Debug, Clone)]
pub struct WorldState {
    front: Vec<Agent>,
    back: Vec<Agent>,
    obstacles: Vec<Obstacle>,
    targets: Vec<Target>,
    world_size: f64,
    occupancy: OccupancyGrid,
    explored: ExploredGrid,
}

impl WorldState {
    /// Generates the world from validated parameters.
    ///
    /// All randomness comes from the `WORLD_STREAM` derived from the seed.
    pub fn generate(params: &SwarmParams) -> Result<Self, ConfigError> {
        let mut rng = stream_rng(params.seed, WORLD_STREAM);
        let half = params.world_size / 2.0;
        let spawn_half = (params.start_region / 2.0).min(half);

        let mut obstacles = params.obstacles.clone();
        if params.random_obstacles > 0 {
            let size = Uniform::new_inclusive(params.world_size * 0.02, params.world_size * 0.08);
            let mut placed = 0;
            let mut attempts = 0;
            while placed < params.random_obstacles && attempts < params.random_obstacles * MAX_SPAWN_ATTEMPTS {
                attempts += 1;
                let (w, h) = (size.sample(&mut rng), size.sample(&mut rng));
                let x = rng.gen_range(-half..(half - w));
                let y = rng.gen_range(-half..(half - h));
                let candidate = Obstacle::new(x, y, w, h);
                // Keep the spawn square clear
                let clears_spawn = x > spawn_half || x + w < -spawn_half || y > spawn_half || y + h < -spawn_half;
                if clears_spawn {
                    obstacles.push(candidate);
                    placed += 1;
                }
            }
        }

        let occupancy = OccupancyGrid::new(params.world_size, params.grid_cell_size, &obstacles);
        let explored = ExploredGrid::new(params.world_size, params.grid_cell_size);
        let blocked = |p: Vector2<f64>| obstacles.iter().any(|o| o.contains(p));

        let mut targets: Vec<Target> = params.targets.clone();
        for _ in 0..params.random_targets {
            for _ in 0..MAX_SPAWN_ATTEMPTS {
                let p = Vector2::new(rng.gen_range(-half..half), rng.gen_range(-half..half));
                if !blocked(p) {
                    targets.push(Target::new(p.x, p.y));
                    break;
                }
            }
        }

        let agents = if params.initial_positions.is_empty() {
            let spawn = Uniform::new_inclusive(-spawn_half, spawn_half);
            let mut agents = Vec::with_capacity(params.num_agents);
            for agent in 0..params.num_agents {
                let position = (0..MAX_SPAWN_ATTEMPTS)
                    .map(|_| Vector2::new(spawn.sample(&mut rng), spawn.sample(&mut rng)))
                    .find(|p| !blocked(*p))
                    .ok_or(ConfigError::SpawnBlocked { agent })?;
                agents.push(Agent::at(position.x, position.y));
            }
            agents
        } else {
            params
                .initial_positions
                .iter()
                .map(|[x, y]| Agent::at(*x, *y))
                .collect()
        };

        Ok(Self::from_parts(agents, obstacles, targets, params.world_size, occupancy, explored))
    }

    fn from_parts(
        agents: Vec<Agent>,
        obstacles: Vec<Obstacle>,
        targets: Vec<Target>,
        world_size: f64,
        occupancy: OccupancyGrid,
        explored: ExploredGrid,
    ) -> Self {
        Self {
            back: agents.clone(),
            front: agents,
            obstacles,
            targets,
            world_size,
            occupancy,
            explored,
        }
    }

    /// Current (committed) agent states.
    pub fn agents(&self) -> &[Agent] {
        &self.front
    }

    pub fn len(&self) -> usize {
        self.front.len()
    }

    pub fn is_empty(&self) -> bool {
        self.front.is_empty()
    }

    pub fn positions(&self) -> Vec<Vector3<f64>> {
        self.front.iter().map(|a| a.position).collect()
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn world_size(&self) -> f64 {
        self.world_size
    }

    pub fn half_size(&self) -> f64 {
        self.world_size / 2.0
    }

    pub fn occupancy(&self) -> &OccupancyGrid {
        &self.occupancy
    }

    pub fn explored(&self) -> &ExploredGrid {
        &self.explored
    }

    /// True if (x, y) is outside the world or inside an obstacle.
    pub fn check_collision(&self, x: f64, y: f64) -> bool {
        let half = self.half_size();
        if x.abs() > half || y.abs() > half {
            return true;
        }
        let p = Vector2::new(x, y);
        self.obstacles.iter().any(|o| o.contains(p))
    }

    /// Read buffer, static obstacles and write buffer for the behavior phase.
    pub fn buffers_mut(&mut self) -> (&[Agent], &[Obstacle], &mut [Agent]) {
        (&self.front, &self.obstacles, &mut self.back)
    }

    /// Publishes the back buffer as the new state.
    pub fn swap_buffers(&mut self) -> Result<(), SwarmError> {
        if self.back.len() != self.front.len() {
            return Err(SwarmError::PopulationMismatch {
                expected: self.front.len(),
                actual: self.back.len(),
            });
        }
        std::mem::swap(&mut self.front, &mut self.back);
        Ok(())
    }

    /// Counts visits to every grid cell an agent can sense.
    pub fn update_explored(&mut self, radius: f64) {
        let positions: Vec<Vector2<f64>> = self.front.iter().map(|a| a.xy()).collect();
        self.explored.update(&positions, radius);
    }

    /// Marks targets within sensing range of any agent as found.
    ///
    /// Returns the number of targets newly found this step.
    pub fn update_targets(&mut self, radius: f64) -> usize {
        let agents = &self.front;
        let radius_sq = radius * radius;
        let newly: Vec<bool> = self
            .targets
            .par_iter()
            .map(|t| {
                !t.found && agents.iter().any(|a| (a.xy() - t.xy()).norm_squared() <= radius_sq)
            })
            .collect();

        let mut count = 0;
        for (target, found) in self.targets.iter_mut().zip(newly) {
            if found {
                target.found = true;
                count += 1;
            }
        }
        count
    }

    pub fn targets_found(&self) -> usize {
        self.targets.iter().filter(|t| t.found).count()
    }

    /// Overwrites the committed agent states (scenario setup and tests).
    pub fn set_agents(&mut self, agents: Vec<Agent>) -> Result<(), SwarmError> {
        if agents.len() != self.front.len() {
            return Err(SwarmError::PopulationMismatch {
                expected: self.front.len(),
                actual: agents.len(),
            });
        }
        self.back = agents.clone();
        self.front = agents;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(num_agents: usize) -> SwarmParams {
        SwarmParams {
            num_agents,
            ..Default::default()
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = WorldState::generate(&params(20)).unwrap();
        let b = WorldState::generate(&params(20)).unwrap();
        assert_eq!(a.agents(), b.agents());
    }

    #[test]
    fn test_spawn_inside_start_region() {
        let p = params(50);
        let world = WorldState::generate(&p).unwrap();
        let half = p.start_region / 2.0;
        for agent in world.agents() {
            assert!(agent.position.x.abs() <= half);
            assert!(agent.position.y.abs() <= half);
            assert_eq!(agent.position.z, 0.0);
        }
    }

    #[test]
    fn test_explicit_positions() {
        let p = SwarmParams {
            num_agents: 2,
            initial_positions: vec![[1.0, 2.0], [3.0, 4.0]],
            ..Default::default()
        };
        let world = WorldState::generate(&p).unwrap();
        assert_relative_eq!(world.agents()[1].position.y, 4.0);
    }

    #[test]
    fn test_random_obstacles_clear_spawn() {
        let p = SwarmParams {
            num_agents: 30,
            random_obstacles: 10,
            ..Default::default()
        };
        let world = WorldState::generate(&p).unwrap();
        assert_eq!(world.obstacles().len(), 10);
        for agent in world.agents() {
            assert!(!world.check_collision(agent.position.x, agent.position.y));
        }
    }

    #[test]
    fn test_check_collision_bounds_and_obstacles() {
        let p = SwarmParams {
            num_agents: 1,
            world_size: 100.0,
            obstacles: vec![Obstacle::new(10.0, 10.0, 5.0, 5.0)],
            ..Default::default()
        };
        let world = WorldState::generate(&p).unwrap();
        assert!(world.check_collision(60.0, 0.0));
        assert!(world.check_collision(12.0, 12.0));
        assert!(!world.check_collision(0.0, 0.0));
    }

    #[test]
    fn test_push_out_nearest_edge() {
        let o = Obstacle::new(0.0, 0.0, 10.0, 10.0);
        let (p, axis) = o.push_out(Vector2::new(1.0, 5.0));
        assert_eq!(axis, 0);
        assert_relative_eq!(p.x, 0.0);
        let (p, axis) = o.push_out(Vector2::new(5.0, 9.5));
        assert_eq!(axis, 1);
        assert_relative_eq!(p.y, 10.0);
    }

    #[test]
    fn test_goal_parse() {
        assert_eq!("point:1,2".parse::<Goal>().unwrap(), Goal::Point { x: 1.0, y: 2.0 });
        assert_eq!(
            "heading:0.5, 2".parse::<Goal>().unwrap(),
            Goal::Heading { heading: 0.5, speed: 2.0 }
        );
        assert!(matches!("orbit:1".parse::<Goal>(), Err(ConfigError::UnrecognizedGoal(_))));
        assert!("region:1,2".parse::<Goal>().is_err());
    }

    #[test]
    fn test_goal_validation() {
        assert!(Goal::Point { x: 10.0, y: 0.0 }.validate(100.0).is_ok());
        assert_eq!(Goal::Point { x: 80.0, y: 0.0 }.validate(100.0), Err(ConfigError::GoalOutsideWorld));
        assert!(Goal::Region { x: 0.0, y: 0.0, w: 60.0, h: 1.0 }.validate(100.0).is_err());
    }

    #[test]
    fn test_targets_found_by_proximity() {
        let p = SwarmParams {
            num_agents: 1,
            initial_positions: vec![[0.0, 0.0]],
            targets: vec![Target::new(1.0, 0.0), Target::new(40.0, 0.0)],
            sensing_radius: 2.0,
            ..Default::default()
        };
        let mut world = WorldState::generate(&p).unwrap();
        assert_eq!(world.update_targets(p.sensing_radius), 1);
        assert_eq!(world.update_targets(p.sensing_radius), 0);
        assert_eq!(world.targets_found(), 1);
    }

    #[test]
    fn test_swap_buffers() {
        let mut world = WorldState::generate(&params(3)).unwrap();
        {
            let (front, _, back) = world.buffers_mut();
            for (out, a) in back.iter_mut().zip(front) {
                *out = a.clone();
                out.position.x += 1.0;
            }
        }
        let before = world.agents()[0].position.x;
        world.swap_buffers().unwrap();
        assert_relative_eq!(world.agents()[0].position.x, before + 1.0);
    }
}
