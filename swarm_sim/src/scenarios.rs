//! Named scenarios for the simulation harness.

use swarm_core::{
    ArticulationScope, FailureKind, FailureSpec, FailureTrigger, Goal, OperatorEvent, SwarmParams,
};

/// Operator event delivered at the boundary before `at_step` runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedEvent {
    pub at_step: u64,
    pub event: OperatorEvent,
}

impl ScriptedEvent {
    pub fn new(at_step: u64, event: OperatorEvent) -> Self {
        Self { at_step, event }
    }
}

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Ten agents in a chain; every interior agent is a cut vertex
    Line,

    /// Two triangles sharing one agent
    Bowtie,

    /// Everyone within range of everyone
    FullMesh,

    /// Scheduled heading drift on a flocking swarm
    HeadingDrift,

    /// Milling failure, trust penalty and operator acknowledgment
    MillingTrust,

    /// Larger flock with obstacles and targets
    Flocking,

    /// Converge on a point and stop there
    Rendezvous,

    /// Gather inside a region, exploring on the way
    RegionCoverage,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Line,
            ScenarioId::Bowtie,
            ScenarioId::FullMesh,
            ScenarioId::HeadingDrift,
            ScenarioId::MillingTrust,
            ScenarioId::Flocking,
            ScenarioId::Rendezvous,
            ScenarioId::RegionCoverage,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Line => "line",
            ScenarioId::Bowtie => "bowtie",
            ScenarioId::FullMesh => "full_mesh",
            ScenarioId::HeadingDrift => "heading_drift",
            ScenarioId::MillingTrust => "milling_trust",
            ScenarioId::Flocking => "flocking",
            ScenarioId::Rendezvous => "rendezvous",
            ScenarioId::RegionCoverage => "region_coverage",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Line => "10 agents, adjacent-only sensing: articulation set is agents 1..8",
            ScenarioId::Bowtie => "Two triangles joined at agent 2: exactly one cut vertex",
            ScenarioId::FullMesh => "8 agents all in range: no cut vertices, one leader",
            ScenarioId::HeadingDrift => "0.2 rad heading drift active from step 5 to step 14",
            ScenarioId::MillingTrust => "Milling drops trust 1.0 -> 0.7; operator acknowledges",
            ScenarioId::Flocking => "40 agents flocking on a heading around random obstacles",
            ScenarioId::Rendezvous => "30 agents converge on a point, run stops on arrival",
            ScenarioId::RegionCoverage => "30 agents gather in a region while exploring the grid",
        }
    }

    /// Parameters for this scenario.
    pub fn params(&self, seed: u64) -> SwarmParams {
        let base = SwarmParams { seed, ..Default::default() };
        match self {
            ScenarioId::Line => SwarmParams {
                num_agents: 10,
                initial_positions: (0..10).map(|i| [i as f64 - 4.5, 0.0]).collect(),
                sensing_radius: 1.05,
                separation_radius: 0.0,
                max_speed: 0.01,
                max_accel: 0.005,
                goal: Goal::Heading { heading: 0.0, speed: 0.01 },
                max_steps: 10,
                ..base
            },
            ScenarioId::Bowtie => SwarmParams {
                num_agents: 5,
                initial_positions: vec![[-1.0, 0.6], [-1.0, -0.6], [0.0, 0.0], [1.0, 0.6], [1.0, -0.6]],
                sensing_radius: 1.5,
                separation_radius: 0.0,
                max_speed: 0.01,
                max_accel: 0.005,
                goal: Goal::Heading { heading: 0.0, speed: 0.01 },
                articulation: ArticulationScope::Local { hops: 2 },
                max_steps: 10,
                ..base
            },
            ScenarioId::FullMesh => SwarmParams {
                num_agents: 8,
                initial_positions: (0..8)
                    .map(|i| {
                        let a = i as f64 * std::f64::consts::TAU / 8.0;
                        [2.0 * a.cos(), 2.0 * a.sin()]
                    })
                    .collect(),
                sensing_radius: 10.0,
                separation_radius: 1.0,
                max_steps: 20,
                ..base
            },
            ScenarioId::HeadingDrift => SwarmParams {
                num_agents: 12,
                initial_positions: grid_positions(4, 3, 3.0),
                sensing_radius: 8.0,
                separation_radius: 2.0,
                goal: Goal::Heading { heading: 0.0, speed: 1.0 },
                failures: vec![FailureSpec {
                    kind: FailureKind::HeadingDrift,
                    trigger: FailureTrigger::Step { at: 5 },
                    duration: 10,
                    magnitude: 0.2,
                }],
                max_steps: 30,
                ..base
            },
            ScenarioId::MillingTrust => SwarmParams {
                num_agents: 12,
                initial_positions: grid_positions(4, 3, 3.0),
                sensing_radius: 8.0,
                separation_radius: 2.0,
                goal: Goal::Heading { heading: 0.5, speed: 1.0 },
                failures: vec![FailureSpec {
                    kind: FailureKind::Milling,
                    trigger: FailureTrigger::Step { at: 3 },
                    duration: 8,
                    magnitude: 0.5,
                }],
                max_steps: 20,
                ..base
            },
            ScenarioId::Flocking => SwarmParams {
                num_agents: 40,
                goal: Goal::Heading { heading: 0.8, speed: 1.5 },
                random_obstacles: 4,
                random_targets: 6,
                max_steps: 200,
                ..base
            },
            ScenarioId::Rendezvous => SwarmParams {
                num_agents: 30,
                goal: Goal::Point { x: 40.0, y: 30.0 },
                arrival_radius: 6.0,
                stop_on_goal: true,
                max_steps: 400,
                ..base
            },
            ScenarioId::RegionCoverage => SwarmParams {
                num_agents: 30,
                goal: Goal::Region { x: 20.0, y: -60.0, w: 50.0, h: 50.0 },
                random_targets: 8,
                max_steps: 300,
                ..base
            },
        }
    }

    /// Operator events the scenario injects.
    pub fn script(&self) -> Vec<ScriptedEvent> {
        match self {
            ScenarioId::MillingTrust => vec![
                ScriptedEvent::new(4, OperatorEvent::ChangeGoal { goal: Goal::Heading { heading: -0.5, speed: 1.0 } }),
                ScriptedEvent::new(6, OperatorEvent::AcknowledgeTrust { reported: None }),
            ],
            ScenarioId::Flocking => vec![
                ScriptedEvent::new(50, OperatorEvent::Pause),
                ScriptedEvent::new(50, OperatorEvent::Resume),
                ScriptedEvent::new(100, OperatorEvent::ScheduleFailure {
                    spec: FailureSpec {
                        kind: FailureKind::Spread,
                        trigger: FailureTrigger::Step { at: 100 },
                        duration: 20,
                        magnitude: 0.3,
                    },
                }),
            ],
            _ => Vec::new(),
        }
    }
}

/// `cols x rows` agents on a square lattice centered on the origin.
fn grid_positions(cols: usize, rows: usize, spacing: f64) -> Vec<[f64; 2]> {
    let x0 = -(cols as f64 - 1.0) * spacing / 2.0;
    let y0 = -(rows as f64 - 1.0) * spacing / 2.0;
    (0..rows)
        .flat_map(|r| (0..cols).map(move |c| [x0 + c as f64 * spacing, y0 + r as f64 * spacing]))
        .collect()
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "line" => Ok(ScenarioId::Line),
            "bowtie" => Ok(ScenarioId::Bowtie),
            "full_mesh" | "fullmesh" | "mesh" => Ok(ScenarioId::FullMesh),
            "heading_drift" | "headingdrift" | "drift" => Ok(ScenarioId::HeadingDrift),
            "milling_trust" | "millingtrust" | "trust" => Ok(ScenarioId::MillingTrust),
            "flocking" | "flock" => Ok(ScenarioId::Flocking),
            "rendezvous" => Ok(ScenarioId::Rendezvous),
            "region_coverage" | "regioncoverage" | "coverage" => Ok(ScenarioId::RegionCoverage),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
