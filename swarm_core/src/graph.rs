//! Neighbor graph: who can sense whom this step.
//!
//! Every unordered pair is tested exactly once and the result is written to
//! both directions, so the relation is symmetric by construction even when
//! floating-point evaluation is not.

use crate::error::SwarmError;

use nalgebra::Vector3;
use rayon::prelude::*;
use std::collections::VecDeque;

/// Symmetric adjacency between agents, rebuilt from scratch every step.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborGraph {
    /// Number of agents
    n: usize,

    /// Sorted neighbor lists
    adjacency: Vec<Vec<usize>>,

    /// Dense `n x n` matrix for O(1) edge queries
    matrix: Vec<bool>,
}

impl NeighborGraph {
    /// Builds the graph of all pairs within `radius` of each other.
    ///
    /// # Errors
    /// `SwarmError::NonFinitePosition` if any coordinate is NaN or infinite.
    pub fn build(positions: &[Vector3<f64>], radius: f64) -> Result<Self, SwarmError> {
        if let Some(agent) = positions.iter().position(|p| !p.iter().all(|c| c.is_finite())) {
            return Err(SwarmError::NonFinitePosition { agent });
        }

        let n = positions.len();
        let radius_sq = radius * radius;

        // Row i holds the upper triangle j > i; each pair is measured once.
        let rows: Vec<Vec<usize>> = (0..n)
            .into_par_iter()
            .map(|i| {
                ((i + 1)..n)
                    .filter(|&j| (positions[i] - positions[j]).norm_squared() <= radius_sq)
                    .collect()
            })
            .collect();

        Ok(Self::from_upper_rows(n, rows))
    }

    /// Builds a graph from an explicit edge list (scenario setup and tests).
    ///
    /// Self-loops and out-of-range endpoints are ignored.
    pub fn from_edges(n: usize, edges: &[(usize, usize)]) -> Self {
        let mut rows = vec![Vec::new(); n];
        for &(a, b) in edges {
            if a == b || a >= n || b >= n {
                continue;
            }
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            rows[lo].push(hi);
        }
        for row in rows.iter_mut() {
            row.sort_unstable();
            row.dedup();
        }
        Self::from_upper_rows(n, rows)
    }

    fn from_upper_rows(n: usize, rows: Vec<Vec<usize>>) -> Self {
        let mut adjacency = vec![Vec::new(); n];
        let mut matrix = vec![false; n * n];

        // Rows are visited in ascending order, which keeps every list sorted.
        for (i, row) in rows.into_iter().enumerate() {
            for j in row {
                matrix[i * n + j] = true;
                matrix[j * n + i] = true;
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }

        Self { n, adjacency, matrix }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        a < self.n && b < self.n && self.matrix[a * self.n + b]
    }

    pub fn neighbors(&self, agent: usize) -> &[usize] {
        self.adjacency.get(agent).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn degree(&self, agent: usize) -> usize {
        self.neighbors(agent).len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(|v| v.len()).sum::<usize>() / 2
    }

    /// Breadth-first hop distances from `source`.
    ///
    /// * `max_hops` - stop expanding past this depth
    /// * `removed` - vertex treated as absent
    /// * `allowed` - when set, only vertices flagged `true` are visited
    pub fn hop_distances(
        &self,
        source: usize,
        max_hops: Option<u32>,
        removed: Option<usize>,
        allowed: Option<&[bool]>,
    ) -> Vec<Option<u32>> {
        let mut dist = vec![None; self.n];
        if source >= self.n || Some(source) == removed {
            return dist;
        }

        dist[source] = Some(0);
        let mut queue = VecDeque::from([source]);

        while let Some(u) = queue.pop_front() {
            let d = dist[u].unwrap_or(0);
            if max_hops.is_some_and(|m| d >= m) {
                continue;
            }
            for &v in &self.adjacency[u] {
                if dist[v].is_some() || Some(v) == removed {
                    continue;
                }
                if allowed.is_some_and(|mask| !mask[v]) {
                    continue;
                }
                dist[v] = Some(d + 1);
                queue.push_back(v);
            }
        }

        dist
    }

    /// Labels connected components (labels ordered by lowest member index).
    pub fn components(&self) -> ComponentMap {
        let mut labels = vec![usize::MAX; self.n];
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for start in 0..self.n {
            if labels[start] != usize::MAX {
                continue;
            }
            let label = groups.len();
            let mut members = Vec::new();
            let mut queue = VecDeque::from([start]);
            labels[start] = label;

            while let Some(u) = queue.pop_front() {
                members.push(u);
                for &v in &self.adjacency[u] {
                    if labels[v] == usize::MAX {
                        labels[v] = label;
                        queue.push_back(v);
                    }
                }
            }

            members.sort_unstable();
            groups.push(members);
        }

        ComponentMap { labels, groups }
    }
}

/// Connected-component membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentMap {
    labels: Vec<usize>,
    groups: Vec<Vec<usize>>,
}

impl ComponentMap {
    pub fn count(&self) -> usize {
        self.groups.len()
    }

    pub fn label_of(&self, agent: usize) -> usize {
        self.labels[agent]
    }

    pub fn same_component(&self, a: usize, b: usize) -> bool {
        self.labels[a] == self.labels[b]
    }

    /// Members of a component, ascending.
    pub fn members(&self, label: usize) -> &[usize] {
        &self.groups[label]
    }

    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    pub fn largest(&self) -> usize {
        self.groups.iter().map(|g| g.len()).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(n: usize, spacing: f64) -> Vec<Vector3<f64>> {
        (0..n).map(|i| Vector3::new(i as f64 * spacing, 0.0, 0.0)).collect()
    }

    #[test]
    fn test_line_topology() {
        let graph = NeighborGraph::build(&line(5, 1.0), 1.0).unwrap();
        assert_eq!(graph.neighbors(0), &[1]);
        assert_eq!(graph.neighbors(2), &[1, 3]);
        assert_eq!(graph.edge_count(), 4);
        assert!(!graph.has_edge(0, 2));
    }

    #[test]
    fn test_rejects_nan_position() {
        let mut positions = line(3, 1.0);
        positions[1].y = f64::NAN;
        assert_eq!(
            NeighborGraph::build(&positions, 1.0),
            Err(SwarmError::NonFinitePosition { agent: 1 })
        );

        positions[1].y = f64::NEG_INFINITY;
        assert!(NeighborGraph::build(&positions, 1.0).is_err());
    }

    #[test]
    fn test_hop_distances_respect_limits() {
        let graph = NeighborGraph::build(&line(6, 1.0), 1.0).unwrap();
        let all = graph.hop_distances(0, None, None, None);
        assert_eq!(all[5], Some(5));

        let capped = graph.hop_distances(0, Some(2), None, None);
        assert_eq!(capped[2], Some(2));
        assert_eq!(capped[3], None);

        let cut = graph.hop_distances(0, None, Some(3), None);
        assert_eq!(cut[2], Some(2));
        assert_eq!(cut[4], None);
    }

    #[test]
    fn test_components() {
        let graph = NeighborGraph::from_edges(6, &[(0, 1), (1, 2), (4, 5)]);
        let components = graph.components();
        assert_eq!(components.count(), 3);
        assert_eq!(components.members(0), &[0, 1, 2]);
        assert_eq!(components.members(1), &[3]);
        assert!(components.same_component(4, 5));
        assert_eq!(components.largest(), 3);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let positions: Vec<Vector3<f64>> = (0..40)
            .map(|i| Vector3::new((i * 7 % 13) as f64, (i * 5 % 11) as f64, 0.0))
            .collect();
        let a = NeighborGraph::build(&positions, 3.0).unwrap();
        let b = NeighborGraph::build(&positions, 3.0).unwrap();
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn prop_graph_is_symmetric(
            coords in prop::collection::vec((-50.0f64..50.0, -50.0f64..50.0), 1..60),
            radius in 0.1f64..30.0,
        ) {
            let positions: Vec<Vector3<f64>> =
                coords.iter().map(|(x, y)| Vector3::new(*x, *y, 0.0)).collect();
            let graph = NeighborGraph::build(&positions, radius).unwrap();
            for i in 0..graph.len() {
                prop_assert!(!graph.has_edge(i, i));
                for j in 0..graph.len() {
                    prop_assert_eq!(graph.has_edge(i, j), graph.has_edge(j, i));
                }
                for &j in graph.neighbors(i) {
                    prop_assert!(graph.neighbors(j).contains(&i));
                }
            }
        }
    }
}
