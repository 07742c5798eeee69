//! Connectivity analysis: per-agent network value and cut vertices.
//!
//! # Connectivity summary
//!
//! Each agent gets the number of agents it reaches within 1, 2, 3 and 4
//! hops. Comparing these tuples lexicographically (then preferring the lower
//! index) gives a total, reproducible ranking of leader candidates.
//!
//! # Articulation points
//!
//! The classical Hopcroft-Tarjan detector depends on a single depth-first
//! traversal order and does not split across workers. Instead every
//! candidate is tested independently: remove it, flood-fill from one of its
//! neighbors, and check whether every other neighbor was reached. The
//! candidate's component splits exactly when some neighbor is left
//! unreached, so this is an exact cut-vertex test. It costs one traversal
//! per candidate (O(V * (V + E)) overall) but candidates run in parallel with
//! no shared state.

use crate::error::ConfigError;
use crate::graph::{ComponentMap, NeighborGraph};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Hop depth of the connectivity summary.
pub const HOP_LIMIT: usize = 4;

/// Agents reachable within 1..=HOP_LIMIT hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ConnectivitySummary {
    pub reach: [u32; HOP_LIMIT],
}

impl ConnectivitySummary {
    /// Direct degree.
    pub fn degree(&self) -> u32 {
        self.reach[0]
    }
}

/// Orders two agents by network value. `Greater` means `a` ranks higher.
///
/// Higher 1-hop reach wins, then 2-, 3- and 4-hop reach; remaining ties go
/// to the lower index.
pub fn rank_cmp(
    a: usize,
    a_summary: &ConnectivitySummary,
    b: usize,
    b_summary: &ConnectivitySummary,
) -> Ordering {
    a_summary.reach.cmp(&b_summary.reach).then_with(|| b.cmp(&a))
}

/// How far the cut-vertex test looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ArticulationScope {
    /// Removal must disconnect the whole graph's component
    Global,
    /// Removal must disconnect the ball of `hops` hops around the agent
    Local { hops: u32 },
}

impl Default for ArticulationScope {
    fn default() -> Self {
        ArticulationScope::Global
    }
}

impl ArticulationScope {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ArticulationScope::Local { hops: 0 } => Err(ConfigError::ZeroLocalHops),
            _ => Ok(()),
        }
    }
}

/// Per-agent cut-vertex flags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArticulationSet {
    flags: Vec<bool>,
}

impl ArticulationSet {
    pub fn from_flags(flags: Vec<bool>) -> Self {
        Self { flags }
    }

    pub fn contains(&self, agent: usize) -> bool {
        self.flags.get(agent).copied().unwrap_or(false)
    }

    /// Flagged agents, ascending.
    pub fn members(&self) -> Vec<usize> {
        self.flags
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.then_some(i))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.flags.iter().filter(|f| **f).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn flags(&self) -> &[bool] {
        &self.flags
    }
}

/// Everything derived from one neighbor graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectivityAnalysis {
    pub summaries: Vec<ConnectivitySummary>,
    pub articulation: ArticulationSet,
    pub components: ComponentMap,
}

impl ConnectivityAnalysis {
    /// Best-ranked member of `members`, if any.
    pub fn best_of(&self, members: impl IntoIterator<Item = usize>) -> Option<usize> {
        members
            .into_iter()
            .max_by(|&a, &b| rank_cmp(a, &self.summaries[a], b, &self.summaries[b]))
    }
}

/// Runs the connectivity phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectivityAnalyzer {
    scope: ArticulationScope,
}

impl ConnectivityAnalyzer {
    pub fn new(scope: ArticulationScope) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> ArticulationScope {
        self.scope
    }

    pub fn analyze(&self, graph: &NeighborGraph) -> ConnectivityAnalysis {
        ConnectivityAnalysis {
            summaries: summarize(graph),
            articulation: articulation_points(graph, self.scope),
            components: graph.components(),
        }
    }
}

/// Hop-limited reach for every agent.
pub fn summarize(graph: &NeighborGraph) -> Vec<ConnectivitySummary> {
    (0..graph.len())
        .into_par_iter()
        .map(|agent| {
            let dist = graph.hop_distances(agent, Some(HOP_LIMIT as u32), None, None);
            let mut per_hop = [0u32; HOP_LIMIT];
            for d in dist.iter().flatten() {
                if *d >= 1 {
                    per_hop[*d as usize - 1] += 1;
                }
            }
            let mut reach = [0u32; HOP_LIMIT];
            let mut total = 0;
            for (k, count) in per_hop.iter().enumerate() {
                total += count;
                reach[k] = total;
            }
            ConnectivitySummary { reach }
        })
        .collect()
}

/// Flags every agent whose removal splits its component (or local ball).
pub fn articulation_points(graph: &NeighborGraph, scope: ArticulationScope) -> ArticulationSet {
    let flags = (0..graph.len())
        .into_par_iter()
        .map(|agent| is_cut_vertex(graph, agent, scope))
        .collect();
    ArticulationSet { flags }
}

/// Exact cut-vertex test for a single candidate.
pub fn is_cut_vertex(graph: &NeighborGraph, agent: usize, scope: ArticulationScope) -> bool {
    let neighbors = graph.neighbors(agent);
    if neighbors.len() < 2 {
        return false;
    }

    let ball: Option<Vec<bool>> = match scope {
        ArticulationScope::Global => None,
        ArticulationScope::Local { hops } => Some(
            graph
                .hop_distances(agent, Some(hops), None, None)
                .iter()
                .map(|d| d.is_some())
                .collect(),
        ),
    };

    let reached = graph.hop_distances(neighbors[0], None, Some(agent), ball.as_deref());
    neighbors[1..].iter().any(|&n| reached[n].is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use proptest::prelude::*;

    fn bowtie() -> NeighborGraph {
        // Two triangles sharing agent 2
        NeighborGraph::from_edges(5, &[(0, 1), (1, 2), (0, 2), (2, 3), (3, 4), (2, 4)])
    }

    fn line(n: usize) -> NeighborGraph {
        let edges: Vec<(usize, usize)> = (0..n - 1).map(|i| (i, i + 1)).collect();
        NeighborGraph::from_edges(n, &edges)
    }

    #[test]
    fn test_bowtie_has_single_cut_vertex() {
        for scope in [ArticulationScope::Global, ArticulationScope::Local { hops: 2 }] {
            let set = articulation_points(&bowtie(), scope);
            assert_eq!(set.members(), vec![2]);
        }
    }

    #[test]
    fn test_full_mesh_has_no_cut_vertex() {
        let positions: Vec<Vector3<f64>> =
            (0..8).map(|i| Vector3::new(i as f64 * 0.1, 0.0, 0.0)).collect();
        let graph = NeighborGraph::build(&positions, 10.0).unwrap();
        assert!(articulation_points(&graph, ArticulationScope::Global).is_empty());
    }

    #[test]
    fn test_line_interior_agents_are_cut_vertices() {
        let set = articulation_points(&line(10), ArticulationScope::Global);
        assert_eq!(set.members(), (1..=8).collect::<Vec<_>>());
    }

    #[test]
    fn test_local_scope_flags_long_cycles() {
        let n = 10;
        let mut edges: Vec<(usize, usize)> = (0..n - 1).map(|i| (i, i + 1)).collect();
        edges.push((n - 1, 0));
        let ring = NeighborGraph::from_edges(n, &edges);

        assert!(articulation_points(&ring, ArticulationScope::Global).is_empty());
        // Within two hops a ring looks like a path
        assert_eq!(articulation_points(&ring, ArticulationScope::Local { hops: 2 }).count(), n);
    }

    #[test]
    fn test_summary_reach_is_cumulative() {
        let summaries = summarize(&line(7));
        assert_eq!(summaries[0].reach, [1, 2, 3, 4]);
        assert_eq!(summaries[3].reach, [2, 4, 6, 6]);
        assert_eq!(summaries[3].degree(), 2);
    }

    #[test]
    fn test_rank_prefers_reach_then_low_index() {
        let hub = ConnectivitySummary { reach: [3, 4, 4, 4] };
        let spoke = ConnectivitySummary { reach: [1, 4, 4, 4] };
        assert_eq!(rank_cmp(5, &hub, 0, &spoke), Ordering::Greater);
        assert_eq!(rank_cmp(1, &hub, 4, &hub), Ordering::Greater);
        assert_eq!(rank_cmp(4, &hub, 1, &hub), Ordering::Less);
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let analyzer = ConnectivityAnalyzer::new(ArticulationScope::Global);
        assert_eq!(analyzer.analyze(&bowtie()), analyzer.analyze(&bowtie()));
    }

    #[test]
    fn test_best_of_component() {
        let analysis = ConnectivityAnalyzer::default().analyze(&bowtie());
        assert_eq!(analysis.best_of(0..5), Some(2));
        assert_eq!(analysis.best_of([0, 1]), Some(0));
        assert_eq!(analysis.best_of(std::iter::empty()), None);
    }

    proptest! {
        #[test]
        fn prop_matches_component_counting(
            n in 1usize..12,
            raw_edges in prop::collection::vec((0usize..12, 0usize..12), 0..30),
        ) {
            let graph = NeighborGraph::from_edges(n, &raw_edges);
            let base = graph.components().count();
            let set = articulation_points(&graph, ArticulationScope::Global);

            for v in 0..n {
                // Components of the graph with v deleted
                let kept: Vec<(usize, usize)> = raw_edges
                    .iter()
                    .copied()
                    .filter(|&(a, b)| a < n && b < n && a != v && b != v)
                    .collect();
                let without = NeighborGraph::from_edges(n, &kept).components().count() - 1;
                prop_assert_eq!(set.contains(v), without > base);
            }
        }
    }
}
