//! Swarm-level statistics reported with every step.

use crate::connectivity::ConnectivityAnalysis;
use crate::leader::LeaderAssignment;
use crate::world::{Agent, Goal, WorldState};

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Agents slower than this have no meaningful heading.
const MIN_HEADING_SPEED: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SwarmMetrics {
    pub centroid: [f64; 2],

    /// Circular mean heading of moving agents (radians)
    pub mean_heading: f64,

    /// Circular variance in [0, 1]; 0 means perfectly aligned
    pub heading_variance: f64,

    pub mean_speed: f64,
    pub component_count: usize,
    pub largest_component: usize,
    pub leader_count: usize,
    pub articulation_count: usize,
    pub explored_fraction: f64,
    pub targets_found: usize,

    /// |goal heading - mean heading| for heading goals
    pub goal_heading_error: Option<f64>,
}

impl SwarmMetrics {
    pub fn compute(
        world: &WorldState,
        analysis: &ConnectivityAnalysis,
        leaders: &LeaderAssignment,
        goal: &Goal,
    ) -> Self {
        let agents = world.agents();
        let (mean_heading, heading_variance) = circular_heading(agents);
        let mean_speed = if agents.is_empty() {
            0.0
        } else {
            agents.iter().map(Agent::speed).sum::<f64>() / agents.len() as f64
        };

        let goal_heading_error = match *goal {
            Goal::Heading { heading, .. } => Some(angle_between(heading, mean_heading)),
            _ => None,
        };

        Self {
            centroid: centroid(agents).into(),
            mean_heading,
            heading_variance,
            mean_speed,
            component_count: analysis.components.count(),
            largest_component: analysis.components.largest(),
            leader_count: leaders.leader_count(),
            articulation_count: analysis.articulation.count(),
            explored_fraction: world.explored().explored_fraction(world.occupancy()),
            targets_found: world.targets_found(),
            goal_heading_error,
        }
    }

    /// Whether the swarm has achieved `goal`.
    ///
    /// Heading goals need a moving swarm whose mean heading is within
    /// `heading_tolerance`; point goals need the centroid within
    /// `arrival_radius`; region goals need every agent inside the region.
    pub fn goal_reached(
        &self,
        goal: &Goal,
        agents: &[Agent],
        arrival_radius: f64,
        heading_tolerance: f64,
    ) -> bool {
        match goal {
            Goal::Heading { .. } => {
                self.mean_speed > MIN_HEADING_SPEED
                    && self.goal_heading_error.is_some_and(|e| e <= heading_tolerance)
            }
            Goal::Point { .. } => goal.is_arrived(Vector2::from(self.centroid), arrival_radius),
            Goal::Region { .. } => {
                !agents.is_empty() && agents.iter().all(|a| goal.is_arrived(a.xy(), arrival_radius))
            }
        }
    }
}

pub fn centroid(agents: &[Agent]) -> Vector2<f64> {
    if agents.is_empty() {
        return Vector2::zeros();
    }
    agents.iter().map(Agent::xy).sum::<Vector2<f64>>() / agents.len() as f64
}

/// Circular mean and variance of the headings of moving agents.
pub fn circular_heading(agents: &[Agent]) -> (f64, f64) {
    let (sum, count) = agents
        .iter()
        .filter(|a| a.speed() > MIN_HEADING_SPEED)
        .fold((Vector2::<f64>::zeros(), 0usize), |(sum, count), a| {
            (sum + a.vxy() / a.speed(), count + 1)
        });
    if count == 0 {
        return (0.0, 1.0);
    }
    let resultant = sum / count as f64;
    (resultant.y.atan2(resultant.x), 1.0 - resultant.norm())
}

/// Smallest absolute difference between two angles, in [0, pi].
pub fn angle_between(a: f64, b: f64) -> f64 {
    ((a - b + PI).rem_euclid(2.0 * PI) - PI).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn moving(x: f64, y: f64, heading: f64) -> Agent {
        let mut agent = Agent::at(x, y);
        agent.velocity = Vector3::new(heading.cos(), heading.sin(), 0.0);
        agent
    }

    #[test]
    fn test_aligned_swarm_has_zero_variance() {
        let agents = vec![moving(0.0, 0.0, 0.4), moving(2.0, 2.0, 0.4)];
        let (heading, variance) = circular_heading(&agents);
        assert_relative_eq!(heading, 0.4, epsilon = 1e-12);
        assert_relative_eq!(variance, 0.0, epsilon = 1e-12);
        assert_relative_eq!(centroid(&agents), Vector2::new(1.0, 1.0));
    }

    #[test]
    fn test_opposed_swarm_has_full_variance() {
        let agents = vec![moving(0.0, 0.0, 0.0), moving(0.0, 0.0, PI)];
        let (_, variance) = circular_heading(&agents);
        assert_relative_eq!(variance, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_stationary_swarm_has_no_heading() {
        let agents = vec![Agent::at(0.0, 0.0)];
        assert_eq!(circular_heading(&agents), (0.0, 1.0));
    }

    #[test]
    fn test_angle_between_wraps() {
        assert_relative_eq!(angle_between(PI - 0.1, -PI + 0.1), 0.2, epsilon = 1e-12);
        assert_relative_eq!(angle_between(0.3, -0.2), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_goal_reached() {
        let agents = vec![moving(1.0, 1.0, 0.05), moving(3.0, 1.0, -0.05)];
        let (mean_heading, _) = circular_heading(&agents);
        let metrics = SwarmMetrics {
            centroid: centroid(&agents).into(),
            mean_heading,
            mean_speed: 1.0,
            goal_heading_error: Some(angle_between(0.0, mean_heading)),
            ..Default::default()
        };

        assert!(metrics.goal_reached(&Goal::Heading { heading: 0.0, speed: 1.0 }, &agents, 5.0, 0.1));
        assert!(metrics.goal_reached(&Goal::Point { x: 2.0, y: 0.0 }, &agents, 1.5, 0.1));
        assert!(!metrics.goal_reached(&Goal::Point { x: 20.0, y: 0.0 }, &agents, 1.5, 0.1));
        assert!(metrics.goal_reached(&Goal::Region { x: 0.0, y: 0.0, w: 4.0, h: 2.0 }, &agents, 1.5, 0.1));
        assert!(!metrics.goal_reached(&Goal::Region { x: 0.0, y: 0.0, w: 2.0, h: 2.0 }, &agents, 1.5, 0.1));
    }
}
