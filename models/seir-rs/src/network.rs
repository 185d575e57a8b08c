//! Contact network provider and the degree statistics derived from it.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeirError};

/// Undirected simple graph over node ids `0..order`.
///
/// Adjacency lists are kept sorted, so iteration order is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactNetwork {
    adjacency: Vec<Vec<usize>>,
}

impl ContactNetwork {
    pub fn with_nodes(order: usize) -> Self {
        Self {
            adjacency: vec![Vec::new(); order],
        }
    }

    /// Builds a network from an edge list. Node ids past `order` grow the
    /// network; duplicate edges are collapsed.
    pub fn from_edges(order: usize, edges: impl IntoIterator<Item = (usize, usize)>) -> Result<Self> {
        let mut network = Self::with_nodes(order);
        for (u, v) in edges {
            network.add_edge(u, v)?;
        }
        Ok(network)
    }

    /// Each node is joined to its `degree / 2` nearest neighbours on either side.
    pub fn ring_lattice(order: usize, degree: usize) -> Result<Self> {
        if degree % 2 != 0 {
            return Err(SeirError::invalid("degree", "ring lattice degree must be even"));
        }
        if order > 0 && degree >= order {
            return Err(SeirError::invalid(
                "degree",
                format!("ring lattice degree {degree} needs more than {order} nodes"),
            ));
        }
        let mut network = Self::with_nodes(order);
        for node in 0..order {
            for offset in 1..=degree / 2 {
                network.add_edge(node, (node + offset) % order)?;
            }
        }
        Ok(network)
    }

    pub fn complete(order: usize) -> Self {
        let adjacency = (0..order)
            .map(|node| (0..order).filter(|&other| other != node).collect())
            .collect();
        Self { adjacency }
    }

    /// G(n, p) random graph: every pair is joined independently with probability `p`.
    pub fn erdos_renyi<R: Rng>(order: usize, p: f64, rng: &mut R) -> Result<Self> {
        crate::parameters::check_fraction("p", p)?;
        let mut network = Self::with_nodes(order);
        for u in 0..order {
            for v in (u + 1)..order {
                if rng.random::<f64>() < p {
                    network.add_edge(u, v)?;
                }
            }
        }
        Ok(network)
    }

    /// Returns whether a new edge was inserted.
    pub fn add_edge(&mut self, u: usize, v: usize) -> Result<bool> {
        if u == v {
            return Err(SeirError::GraphInconsistency(format!(
                "self-loop on node {u}"
            )));
        }
        let needed = u.max(v) + 1;
        if self.adjacency.len() < needed {
            self.adjacency.resize_with(needed, Vec::new);
        }
        let inserted = insert_sorted(&mut self.adjacency[u], v);
        if inserted {
            insert_sorted(&mut self.adjacency[v], u);
        }
        Ok(inserted)
    }

    pub fn order(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of undirected edges.
    pub fn size(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }

    pub fn has_node(&self, node: usize) -> bool {
        node < self.adjacency.len()
    }

    pub fn degree(&self, node: usize) -> usize {
        self.adjacency.get(node).map_or(0, Vec::len)
    }

    pub fn neighbors(&self, node: usize) -> &[usize] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn degrees(&self) -> impl Iterator<Item = usize> + '_ {
        self.adjacency.iter().map(Vec::len)
    }
}

fn insert_sorted(list: &mut Vec<usize>, value: usize) -> bool {
    match list.binary_search(&value) {
        Ok(_) => false,
        Err(position) => {
            list.insert(position, value);
            true
        }
    }
}

/// Proportion of nodes with each degree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DegreeDistribution {
    proportions: BTreeMap<usize, f64>,
}

impl DegreeDistribution {
    pub fn from_degrees(degrees: impl IntoIterator<Item = usize>) -> Self {
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        let mut order = 0usize;
        for k in degrees {
            *counts.entry(k).or_default() += 1;
            order += 1;
        }
        let proportions = counts
            .into_iter()
            .map(|(k, count)| (k, count as f64 / order as f64))
            .collect();
        Self { proportions }
    }

    /// Builds a distribution from explicit `(k, Pk)` pairs, e.g. `{4: 1.0}`.
    pub fn from_proportions(proportions: impl IntoIterator<Item = (usize, f64)>) -> Self {
        Self {
            proportions: proportions.into_iter().collect(),
        }
    }

    pub fn probability(&self, k: usize) -> f64 {
        self.proportions.get(&k).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.proportions.iter().map(|(&k, &p)| (k, p))
    }

    pub fn total(&self) -> f64 {
        self.proportions.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.proportions.is_empty()
    }
}

/// Degree statistics of a network, computed once and shared by every model
/// run against that network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    order: usize,
    /// `degree_counts[k]` is the number of nodes with degree `k`, for `k` in `0..=max_degree`.
    degree_counts: Vec<usize>,
    distribution: DegreeDistribution,
}

impl NetworkSummary {
    pub fn from_network(network: &ContactNetwork) -> Self {
        let mut degree_counts = Vec::new();
        for k in network.degrees() {
            if degree_counts.len() <= k {
                degree_counts.resize(k + 1, 0);
            }
            degree_counts[k] += 1;
        }
        let summary = Self {
            order: network.order(),
            degree_counts,
            distribution: DegreeDistribution::from_degrees(network.degrees()),
        };
        tracing::debug!(
            order = summary.order,
            degree_classes = summary.degree_counts.len(),
            mean_degree = summary.mean_degree(),
            "summarized contact network"
        );
        summary
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn degree_counts(&self) -> &[usize] {
        &self.degree_counts
    }

    pub fn max_degree(&self) -> usize {
        self.degree_counts.len().saturating_sub(1)
    }

    pub fn distribution(&self) -> &DegreeDistribution {
        &self.distribution
    }

    pub fn mean_degree(&self) -> f64 {
        if self.order == 0 {
            return 0.0;
        }
        let stubs: usize = self
            .degree_counts
            .iter()
            .enumerate()
            .map(|(k, count)| k * count)
            .sum();
        stubs as f64 / self.order as f64
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn test_from_edges_collapses_duplicates_and_grows() {
        let network = ContactNetwork::from_edges(2, [(0, 1), (1, 0), (1, 4)]).unwrap();
        assert_eq!(network.order(), 5);
        assert_eq!(network.size(), 2);
        assert_eq!(network.neighbors(1), &[0, 4]);
        assert_eq!(network.degree(3), 0);
        assert!(network.has_node(4));
        assert!(!network.has_node(5));
    }

    #[test]
    fn test_self_loop_rejected() {
        assert!(matches!(
            ContactNetwork::from_edges(3, [(2, 2)]),
            Err(SeirError::GraphInconsistency(_))
        ));
    }

    #[test]
    fn test_ring_lattice_is_regular() {
        let network = ContactNetwork::ring_lattice(20, 4).unwrap();
        assert!(network.degrees().all(|k| k == 4));
        assert_eq!(network.size(), 40);
        assert!(ContactNetwork::ring_lattice(20, 3).is_err());
        assert!(ContactNetwork::ring_lattice(4, 4).is_err());
    }

    #[test]
    fn test_complete_graph() {
        let network = ContactNetwork::complete(5);
        assert_eq!(network.size(), 10);
        assert!(network.degrees().all(|k| k == 4));
    }

    #[test]
    fn test_erdos_renyi_is_seeded() {
        let a = ContactNetwork::erdos_renyi(50, 0.1, &mut StdRng::seed_from_u64(11)).unwrap();
        let b = ContactNetwork::erdos_renyi(50, 0.1, &mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.order(), 50);
        assert!(a.size() > 0);
    }

    #[test]
    fn test_summary_counts() {
        // star with 3 leaves plus an isolated node
        let network = ContactNetwork::from_edges(5, [(0, 1), (0, 2), (0, 3)]).unwrap();
        let summary = NetworkSummary::from_network(&network);
        assert_eq!(summary.order(), 5);
        assert_eq!(summary.degree_counts(), &[1, 3, 0, 1]);
        assert_eq!(summary.max_degree(), 3);
        assert!((summary.mean_degree() - 6.0 / 5.0).abs() < 1e-12);
        assert!((summary.distribution().probability(1) - 0.6).abs() < 1e-12);
        assert_eq!(summary.distribution().probability(2), 0.0);
    }

    #[test]
    fn test_empty_network_summary() {
        let summary = NetworkSummary::from_network(&ContactNetwork::default());
        assert_eq!(summary.order(), 0);
        assert_eq!(summary.max_degree(), 0);
        assert_eq!(summary.mean_degree(), 0.0);
        assert!(summary.distribution().is_empty());
    }

    proptest! {
        #[test]
        fn degree_distribution_sums_to_one(degrees in proptest::collection::vec(0usize..40, 1..500)) {
            let distribution = DegreeDistribution::from_degrees(degrees);
            prop_assert!((distribution.total() - 1.0).abs() < 1e-9);
        }
    }
}
