use rand::{SeedableRng, rngs::StdRng};

use crate::{
    error::Result,
    gillespie::{self, Status, TransitionGraph},
    network::ContactNetwork,
    output::CompartmentTimeSeries,
    parameters::StochasticParameters,
    resample,
};

/// SEIR jump process on an explicit contact network.
#[derive(Debug, Clone, Copy)]
pub struct StochasticNetworkModel<'a> {
    network: &'a ContactNetwork,
}

impl<'a> StochasticNetworkModel<'a> {
    pub fn new(network: &'a ContactNetwork) -> Self {
        Self { network }
    }

    pub fn network(&self) -> &ContactNetwork {
        self.network
    }

    pub fn transitions(parameters: &StochasticParameters) -> TransitionGraph {
        TransitionGraph::seir(parameters.alpha, parameters.beta, parameters.gamma)
    }

    /// The first `floor(rho * N)` node ids.
    pub fn seed_nodes(&self, rho: f64) -> Vec<usize> {
        let count = (rho * self.network.order() as f64).floor() as usize;
        (0..count.min(self.network.order())).collect()
    }

    /// Seeds `floor(rho * N)` infectious nodes and resamples the run onto
    /// days `0..tmax`.
    pub fn simulate(&self, parameters: &StochasticParameters) -> Result<CompartmentTimeSeries> {
        parameters.validate()?;
        let seeds = self.seed_nodes(parameters.rho);
        self.simulate_with(parameters, &seeds, &[])
    }

    /// Like [`simulate`](Self::simulate) with explicit initially infectious
    /// and recovered nodes; `rho` is ignored.
    pub fn simulate_with(
        &self,
        parameters: &StochasticParameters,
        initial_infecteds: &[usize],
        initial_recovereds: &[usize],
    ) -> Result<CompartmentTimeSeries> {
        parameters.validate()?;
        let status =
            gillespie::initial_status(self.network, initial_infecteds, initial_recovereds)?;
        if !status.contains(&Status::I) {
            tracing::warn!(
                nodes = self.network.order(),
                "no infectious seeds; the run stays at its initial state"
            );
        }
        let mut rng = StdRng::seed_from_u64(parameters.seed);
        let events = gillespie::gillespie(
            self.network,
            &Self::transitions(parameters),
            &status,
            parameters.tmax as f64,
            &mut rng,
        )?;
        resample::resample(&events.to_series(), parameters.tmax)
    }
}
