//! Continuous-time event simulation of node statuses on a contact network.
//!
//! Direct-method Gillespie: per-node total rates live in a Fenwick tree so
//! the next event is located in `O(log n)`, and only the nodes touched by an
//! event (and their neighbours) are re-rated.

use rand::{Rng, distr::Distribution};
use rand_distr::Exp;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, SeirError},
    network::ContactNetwork,
    output::CompartmentTimeSeries,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Status {
    S,
    E,
    I,
    R,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::S, Status::E, Status::I, Status::R];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// A node moves `from -> to` on its own.
    Spontaneous { from: Status, to: Status, rate: f64 },
    /// A `from` node moves to `to` at `rate` per neighbour in status
    /// `inducer`; that neighbour simultaneously moves to `to_inducer`.
    Induced {
        inducer: Status,
        from: Status,
        to_inducer: Status,
        to: Status,
        rate: f64,
    },
}

impl Transition {
    pub fn rate(&self) -> f64 {
        match *self {
            Transition::Spontaneous { rate, .. } | Transition::Induced { rate, .. } => rate,
        }
    }

    /// Status of the node this transition can fire on.
    pub fn source(&self) -> Status {
        match *self {
            Transition::Spontaneous { from, .. } | Transition::Induced { from, .. } => from,
        }
    }

    /// New status of a node currently in `status`; unchanged when the
    /// transition does not apply to it.
    pub fn apply(&self, status: Status) -> Status {
        match *self {
            Transition::Spontaneous { from, to, .. } | Transition::Induced { from, to, .. }
                if status == from =>
            {
                to
            }
            _ => status,
        }
    }

    /// Rate at which this transition fires on a node in `status` whose
    /// neighbours are tallied in `neighbor_counts`.
    fn node_rate(&self, status: Status, neighbor_counts: &[u32; 4]) -> f64 {
        if status != self.source() {
            return 0.0;
        }
        match *self {
            Transition::Spontaneous { rate, .. } => rate,
            Transition::Induced { inducer, rate, .. } => {
                rate * f64::from(neighbor_counts[inducer.index()])
            }
        }
    }
}

/// Spontaneous and neighbour-induced transitions, fixed for a simulation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionGraph {
    spontaneous: Vec<Transition>,
    induced: Vec<Transition>,
}

impl TransitionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, transition: Transition) -> Self {
        match transition {
            Transition::Spontaneous { .. } => self.spontaneous.push(transition),
            Transition::Induced { .. } => self.induced.push(transition),
        }
        self
    }

    /// E -> I at `alpha`, I -> R at `gamma`, and S -> E at `beta` per
    /// infectious neighbour.
    pub fn seir(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self::new()
            .with(Transition::Spontaneous {
                from: Status::E,
                to: Status::I,
                rate: alpha,
            })
            .with(Transition::Spontaneous {
                from: Status::I,
                to: Status::R,
                rate: gamma,
            })
            .with(Transition::Induced {
                inducer: Status::I,
                from: Status::S,
                to_inducer: Status::I,
                to: Status::E,
                rate: beta,
            })
    }

    pub fn spontaneous(&self) -> &[Transition] {
        &self.spontaneous
    }

    pub fn induced(&self) -> &[Transition] {
        &self.induced
    }

    fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.spontaneous.iter().chain(&self.induced)
    }

    fn validate(&self) -> Result<()> {
        if self.iter().all(|t| t.rate().is_finite() && t.rate() >= 0.0) {
            Ok(())
        } else {
            Err(SeirError::invalid(
                "transitions",
                "transition rates must be finite and non-negative",
            ))
        }
    }
}

/// Marks `initial_infecteds` as I and `initial_recovereds` as R; everything
/// else starts susceptible.
pub fn initial_status(
    network: &ContactNetwork,
    initial_infecteds: &[usize],
    initial_recovereds: &[usize],
) -> Result<Vec<Status>> {
    let mut status = vec![Status::S; network.order()];
    for &node in initial_infecteds {
        if !network.has_node(node) {
            return Err(SeirError::GraphInconsistency(format!(
                "initially infected node {node} is not in the network"
            )));
        }
        status[node] = Status::I;
    }
    for &node in initial_recovereds {
        if !network.has_node(node) {
            return Err(SeirError::GraphInconsistency(format!(
                "initially recovered node {node} is not in the network"
            )));
        }
        if status[node] == Status::I {
            return Err(SeirError::GraphInconsistency(format!(
                "node {node} is both initially infected and initially recovered"
            )));
        }
        status[node] = Status::R;
    }
    Ok(status)
}

/// Status counts after every event, starting with the initial counts at t = 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSeries {
    pub times: Vec<f64>,
    pub counts: Vec<[usize; 4]>,
}

impl EventSeries {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn count(&self, status: Status) -> Vec<f64> {
        self.counts
            .iter()
            .map(|c| c[status.index()] as f64)
            .collect()
    }

    pub fn to_series(&self) -> CompartmentTimeSeries {
        CompartmentTimeSeries {
            t: self.times.clone(),
            s: self.count(Status::S),
            e: self.count(Status::E),
            i: self.count(Status::I),
            r: self.count(Status::R),
        }
    }
}

/// Runs the jump process until `tmax` or until no transition is enabled.
pub fn gillespie<R: Rng>(
    network: &ContactNetwork,
    transitions: &TransitionGraph,
    initial: &[Status],
    tmax: f64,
    rng: &mut R,
) -> Result<EventSeries> {
    transitions.validate()?;
    if initial.len() != network.order() {
        return Err(SeirError::DimensionMismatch {
            what: "initial status",
            expected: network.order(),
            actual: initial.len(),
        });
    }

    let mut sim = Simulation::new(network, transitions, initial.to_vec());
    let mut series = EventSeries {
        times: vec![0.0],
        counts: vec![sim.counts],
    };
    let mut t = 0.0;
    while sim.enabled > 0 {
        let total = sim.rates.total();
        if total <= 0.0 {
            break;
        }
        let delay = Exp::new(total)
            .map_err(|e| SeirError::ModelInstability(format!("bad total rate {total}: {e}")))?
            .sample(rng);
        t += delay;
        if t >= tmax {
            break;
        }
        let node = sim.pick_node(rng.random::<f64>() * total);
        sim.fire(node, rng);
        series.times.push(t);
        series.counts.push(sim.counts);
    }
    tracing::debug!(
        nodes = network.order(),
        events = series.len() - 1,
        end = t.min(tmax),
        "stochastic simulation finished"
    );
    Ok(series)
}

struct Simulation<'a> {
    network: &'a ContactNetwork,
    transitions: &'a TransitionGraph,
    status: Vec<Status>,
    neighbor_counts: Vec<[u32; 4]>,
    node_rates: Vec<f64>,
    rates: RateTree,
    /// Nodes with a positive rate.
    enabled: usize,
    counts: [usize; 4],
}

impl<'a> Simulation<'a> {
    fn new(
        network: &'a ContactNetwork,
        transitions: &'a TransitionGraph,
        status: Vec<Status>,
    ) -> Self {
        let n = network.order();
        let mut counts = [0usize; 4];
        let mut neighbor_counts = vec![[0u32; 4]; n];
        for (node, s) in status.iter().enumerate() {
            counts[s.index()] += 1;
            for &neighbor in network.neighbors(node) {
                neighbor_counts[neighbor][s.index()] += 1;
            }
        }
        let mut sim = Self {
            network,
            transitions,
            status,
            neighbor_counts,
            node_rates: vec![0.0; n],
            rates: RateTree::new(n),
            enabled: 0,
            counts,
        };
        for node in 0..n {
            sim.rerate(node);
        }
        sim
    }

    fn rate_of(&self, node: usize) -> f64 {
        let counts = &self.neighbor_counts[node];
        self.transitions
            .iter()
            .map(|t| t.node_rate(self.status[node], counts))
            .sum()
    }

    fn rerate(&mut self, node: usize) {
        let old = self.node_rates[node];
        let new = self.rate_of(node);
        if old > 0.0 {
            self.enabled -= 1;
        }
        if new > 0.0 {
            self.enabled += 1;
        }
        self.node_rates[node] = new;
        self.rates.add(node, new - old);
    }

    fn pick_node(&self, target: f64) -> usize {
        // Accumulated rounding in the tree can land on a disabled node.
        nearest_enabled(&self.node_rates, self.rates.find(target))
    }

    fn fire<R: Rng>(&mut self, node: usize, rng: &mut R) {
        let status = self.status[node];
        let counts = self.neighbor_counts[node];
        let mut target = rng.random::<f64>() * self.node_rates[node];
        let mut chosen = None;
        for transition in self.transitions.iter() {
            let rate = transition.node_rate(status, &counts);
            if rate <= 0.0 {
                continue;
            }
            chosen = Some(*transition);
            if target < rate {
                break;
            }
            target -= rate;
        }
        let Some(transition) = chosen else {
            return;
        };

        if let Transition::Induced {
            inducer,
            to_inducer,
            ..
        } = transition
        {
            if to_inducer != inducer {
                let candidates: Vec<usize> = self
                    .network
                    .neighbors(node)
                    .iter()
                    .copied()
                    .filter(|&w| self.status[w] == inducer)
                    .collect();
                if !candidates.is_empty() {
                    let partner = candidates[rng.random_range(0..candidates.len())];
                    self.set_status(partner, to_inducer);
                }
            }
        }
        self.set_status(node, transition.apply(status));
    }

    fn set_status(&mut self, node: usize, new: Status) {
        let old = self.status[node];
        if old == new {
            return;
        }
        self.status[node] = new;
        self.counts[old.index()] -= 1;
        self.counts[new.index()] += 1;
        for &neighbor in self.network.neighbors(node) {
            self.neighbor_counts[neighbor][old.index()] -= 1;
            self.neighbor_counts[neighbor][new.index()] += 1;
            self.rerate(neighbor);
        }
        self.rerate(node);
    }
}

/// `node` if it has a positive rate, else the first enabled node after it,
/// else the last one before it.
fn nearest_enabled(rates: &[f64], node: usize) -> usize {
    if rates.get(node).is_some_and(|&r| r > 0.0) {
        return node;
    }
    let start = node.min(rates.len());
    rates[start..]
        .iter()
        .position(|&r| r > 0.0)
        .map(|offset| start + offset)
        .or_else(|| rates[..start].iter().rposition(|&r| r > 0.0))
        .unwrap_or(node)
}

/// Fenwick tree over non-negative weights supporting prefix-sum search.
#[derive(Debug, Clone)]
struct RateTree {
    tree: Vec<f64>,
    total: f64,
}

impl RateTree {
    fn new(n: usize) -> Self {
        Self {
            tree: vec![0.0; n + 1],
            total: 0.0,
        }
    }

    fn add(&mut self, index: usize, delta: f64) {
        if delta == 0.0 {
            return;
        }
        self.total += delta;
        let mut i = index + 1;
        while i < self.tree.len() {
            self.tree[i] += delta;
            i += i & i.wrapping_neg();
        }
    }

    fn total(&self) -> f64 {
        self.total.max(0.0)
    }

    /// Smallest index whose inclusive prefix sum exceeds `target`.
    fn find(&self, mut target: f64) -> usize {
        let n = self.tree.len() - 1;
        if n == 0 {
            return 0;
        }
        let mut position = 0;
        let mut step = n.next_power_of_two();
        while step > 0 {
            let next = position + step;
            if next <= n && self.tree[next] <= target {
                position = next;
                target -= self.tree[next];
            }
            step >>= 1;
        }
        position.min(n - 1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn test_transition_apply() {
        let graph = TransitionGraph::seir(0.1, 0.2, 0.3);
        assert_eq!(graph.spontaneous().len(), 2);
        assert_eq!(graph.induced().len(), 1);
        let infection = graph.induced()[0];
        assert_eq!(infection.apply(Status::S), Status::E);
        assert_eq!(infection.apply(Status::R), Status::R);
        assert_eq!(graph.spontaneous()[0].apply(Status::E), Status::I);
        assert_eq!(infection.rate(), 0.2);
    }

    #[test]
    fn test_node_rate_scales_with_inducers() {
        let infection = TransitionGraph::seir(0.1, 0.2, 0.3).induced()[0];
        assert!((infection.node_rate(Status::S, &[1, 0, 3, 0]) - 0.6).abs() < 1e-12);
        assert_eq!(infection.node_rate(Status::E, &[1, 0, 3, 0]), 0.0);
    }

    #[test]
    fn test_rate_tree_find() {
        let mut tree = RateTree::new(5);
        for (i, w) in [1.0, 0.0, 2.0, 0.5, 1.5].into_iter().enumerate() {
            tree.add(i, w);
        }
        assert!((tree.total() - 5.0).abs() < 1e-12);
        assert_eq!(tree.find(0.0), 0);
        assert_eq!(tree.find(0.99), 0);
        assert_eq!(tree.find(1.0), 2);
        assert_eq!(tree.find(2.9), 2);
        assert_eq!(tree.find(3.2), 3);
        assert_eq!(tree.find(4.9), 4);
        tree.add(2, -2.0);
        assert_eq!(tree.find(1.2), 3);
    }

    #[test]
    fn test_nearest_enabled() {
        let rates = [0.0, 1.0, 0.0, 0.0, 2.0, 0.0];
        assert_eq!(nearest_enabled(&rates, 1), 1);
        assert_eq!(nearest_enabled(&rates, 2), 4);
        assert_eq!(nearest_enabled(&rates, 0), 1);
        assert_eq!(nearest_enabled(&rates, 5), 4);
        assert_eq!(nearest_enabled(&[0.0, 0.0], 1), 1);
    }

    #[test]
    fn test_pick_past_total_takes_last_enabled() {
        let network = ContactNetwork::with_nodes(6);
        let graph = TransitionGraph::new().with(Transition::Spontaneous {
            from: Status::E,
            to: Status::I,
            rate: 0.5,
        });
        let mut status = vec![Status::S; 6];
        status[1] = Status::E;
        status[3] = Status::E;
        let sim = Simulation::new(&network, &graph, status);
        assert_eq!(sim.enabled, 2);
        assert_eq!(sim.pick_node(0.2), 1);
        assert_eq!(sim.pick_node(0.7), 3);
        // a draw at or beyond the total lands on node 5, which is disabled
        assert_eq!(sim.pick_node(1.0), 3);
        assert_eq!(sim.pick_node(1.5), 3);
    }

    #[test]
    fn test_initial_status_validation() {
        let network = ContactNetwork::ring_lattice(10, 2).unwrap();
        let status = initial_status(&network, &[0, 1], &[5]).unwrap();
        assert_eq!(status[0], Status::I);
        assert_eq!(status[5], Status::R);
        assert_eq!(status[9], Status::S);
        assert!(matches!(
            initial_status(&network, &[10], &[]),
            Err(SeirError::GraphInconsistency(_))
        ));
        assert!(matches!(
            initial_status(&network, &[3], &[3]),
            Err(SeirError::GraphInconsistency(_))
        ));
        assert!(initial_status(&network, &[], &[42]).is_err());
    }

    #[test]
    fn test_counts_conserved_and_time_ordered() {
        let network = ContactNetwork::ring_lattice(200, 4).unwrap();
        let status = initial_status(&network, &[0, 50, 100], &[]).unwrap();
        let mut rng = StdRng::seed_from_u64(8675309);
        let graph = TransitionGraph::seir(0.3, 0.5, 0.1);
        let series = gillespie(&network, &graph, &status, 200.0, &mut rng).unwrap();
        assert!(series.len() > 1);
        assert_eq!(series.times[0], 0.0);
        assert!(series.times.windows(2).all(|w| w[1] > w[0]));
        assert!(series.times.iter().all(|&t| t < 200.0));
        assert!(series.counts.iter().all(|c| c.iter().sum::<usize>() == 200));
        // every event moves exactly one node
        for w in series.counts.windows(2) {
            let moved: usize = (0..4).map(|k| w[0][k].abs_diff(w[1][k])).sum();
            assert_eq!(moved, 2);
        }
    }

    #[test]
    fn test_pair_transition_moves_both_nodes() {
        // S-I pair where the infecting node recovers as it transmits
        let network = ContactNetwork::from_edges(2, [(0, 1)]).unwrap();
        let graph = TransitionGraph::new().with(Transition::Induced {
            inducer: Status::I,
            from: Status::S,
            to_inducer: Status::R,
            to: Status::E,
            rate: 1.0,
        });
        let status = initial_status(&network, &[0], &[]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let series = gillespie(&network, &graph, &status, 1e9, &mut rng).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.counts[1], [0, 1, 0, 1]);
    }

    #[test]
    fn test_no_enabled_transitions() {
        let network = ContactNetwork::ring_lattice(10, 2).unwrap();
        let status = vec![Status::S; 10];
        let mut rng = StdRng::seed_from_u64(3);
        let series = gillespie(
            &network,
            &TransitionGraph::seir(0.1, 0.5, 0.1),
            &status,
            100.0,
            &mut rng,
        )
        .unwrap();
        assert_eq!(series.times, vec![0.0]);
        assert_eq!(series.counts, vec![[10, 0, 0, 0]]);
    }

    #[test]
    fn test_status_length_mismatch() {
        let network = ContactNetwork::with_nodes(3);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(
            gillespie(
                &network,
                &TransitionGraph::seir(0.1, 0.1, 0.1),
                &[Status::S],
                1.0,
                &mut rng
            ),
            Err(SeirError::DimensionMismatch { .. })
        ));
    }
}
