//! Leader election with countdown hysteresis.
//!
//! One leader per connected component (of at least `min_cluster_size`
//! agents). A sitting leader whose countdown has not run out keeps the post
//! even when a better-ranked candidate appears, which stops leadership from
//! flapping every step while the swarm reshuffles.

use crate::connectivity::{rank_cmp, ConnectivityAnalysis};
use crate::graph::NeighborGraph;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Leader election settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderParams {
    /// Countdown given to a newly elected leader
    pub countdown_reset: u32,

    /// Components smaller than this elect no leader
    pub min_cluster_size: usize,

    /// Skip cut vertices as new leaders when the component has another choice
    pub prefer_non_articulation: bool,
}

impl Default for LeaderParams {
    fn default() -> Self {
        Self {
            countdown_reset: 30,
            min_cluster_size: 2,
            prefer_non_articulation: false,
        }
    }
}

/// Leadership state after one election.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeaderAssignment {
    pub is_leader: Vec<bool>,

    /// Leader each agent follows (leaders point at themselves)
    pub nearest_leader: Vec<Option<usize>>,

    /// Hop distance to `nearest_leader`
    pub leader_hops: Vec<Option<u32>>,

    pub countdowns: Vec<u32>,
}

impl LeaderAssignment {
    /// No leaders yet.
    pub fn empty(n: usize) -> Self {
        Self {
            is_leader: vec![false; n],
            nearest_leader: vec![None; n],
            leader_hops: vec![None; n],
            countdowns: vec![0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.is_leader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.is_leader.is_empty()
    }

    pub fn is_leader(&self, agent: usize) -> bool {
        self.is_leader.get(agent).copied().unwrap_or(false)
    }

    /// Leader indices, ascending.
    pub fn leaders(&self) -> Vec<usize> {
        self.is_leader
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.then_some(i))
            .collect()
    }

    pub fn leader_count(&self) -> usize {
        self.is_leader.iter().filter(|l| **l).count()
    }

    pub fn nearest_leader(&self, agent: usize) -> Option<usize> {
        self.nearest_leader.get(agent).copied().flatten()
    }
}

/// Runs the leader election phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeaderElector {
    params: LeaderParams,
}

impl LeaderElector {
    pub fn new(params: LeaderParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &LeaderParams {
        &self.params
    }

    /// Elects leaders for this step.
    ///
    /// `previous` is the assignment from the last step; a fresh population
    /// should pass `LeaderAssignment::empty(n)`.
    pub fn elect(
        &self,
        graph: &NeighborGraph,
        analysis: &ConnectivityAnalysis,
        previous: &LeaderAssignment,
    ) -> LeaderAssignment {
        let n = graph.len();
        let was_leader = |i: usize| previous.is_leader(i);
        let prev_countdown = |i: usize| previous.countdowns.get(i).copied().unwrap_or(0);
        let rank = |a: &usize, b: &usize| {
            rank_cmp(*a, &analysis.summaries[*a], *b, &analysis.summaries[*b])
        };

        let mut next = LeaderAssignment::empty(n);

        for members in analysis.components.groups() {
            if members.len() < self.params.min_cluster_size.max(1) {
                continue;
            }

            // Incumbents still inside their countdown cannot be displaced.
            let locked = members
                .iter()
                .copied()
                .filter(|&i| was_leader(i) && prev_countdown(i) > 0)
                .max_by(|a, b| rank(a, b));

            let chosen = match locked {
                Some(incumbent) => incumbent,
                None => {
                    let eligible: Vec<usize> = if self.params.prefer_non_articulation {
                        members
                            .iter()
                            .copied()
                            .filter(|&i| !analysis.articulation.contains(i))
                            .collect()
                    } else {
                        Vec::new()
                    };
                    let pool = if eligible.is_empty() { members.as_slice() } else { eligible.as_slice() };
                    match pool.iter().copied().max_by(|a, b| rank(a, b)) {
                        Some(best) => best,
                        None => continue,
                    }
                }
            };

            next.is_leader[chosen] = true;
            next.countdowns[chosen] = if was_leader(chosen) {
                prev_countdown(chosen).saturating_sub(1)
            } else {
                self.params.countdown_reset
            };
        }

        self.assign_nearest(graph, &mut next);
        next
    }

    /// Points every agent at the closest reachable leader by hop count.
    fn assign_nearest(&self, graph: &NeighborGraph, assignment: &mut LeaderAssignment) {
        let leaders = assignment.leaders();
        let distances: Vec<(usize, Vec<Option<u32>>)> = leaders
            .par_iter()
            .map(|&leader| (leader, graph.hop_distances(leader, None, None, None)))
            .collect();

        for agent in 0..graph.len() {
            // Leaders come in ascending order, so ties go to the lower index.
            let best = distances
                .iter()
                .filter_map(|(leader, dist)| dist[agent].map(|d| (d, *leader)))
                .min();
            if let Some((hops, leader)) = best {
                assignment.nearest_leader[agent] = Some(leader);
                assignment.leader_hops[agent] = Some(hops);
            }
        }
    }
}
