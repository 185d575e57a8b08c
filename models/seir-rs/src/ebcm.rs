//! Edge-based compartmental model.
//!
//! `theta` is the probability that a random edge has not yet transmitted to
//! its end node; `phi` and `psi` are the probabilities that it has not
//! transmitted and its partner is exposed or infectious respectively.

use nalgebra::{DMatrix, DVector};

use crate::{
    error::{Result, SeirError},
    network::{ContactNetwork, DegreeDistribution, NetworkSummary},
    ode::{self, OdeOptions, OdeSystem},
    output::CompartmentTimeSeries,
    parameters::{EpidemicRates, NetworkParameters},
    pgf::{pgf, pgf_prime, pgf_prime_prime},
};

/// Initial `phi` and `psi`.
const EDGE_SEED: f64 = 1e-2;

/// State layout: `[theta, phi, psi, E, I]`, with E and I as population fractions.
pub struct EbcmVectorField<'a> {
    pub rates: EpidemicRates,
    pub distribution: &'a DegreeDistribution,
    /// `PGF'(1)`, the mean degree.
    pub mean_degree: f64,
}

impl OdeSystem for EbcmVectorField<'_> {
    fn dimension(&self) -> usize {
        5
    }

    fn derivative(&self, _t: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
        let EpidemicRates { alpha, beta, gamma } = self.rates;
        let (theta, phi, psi, e, i) = (y[0], y[1], y[2], y[3], y[4]);
        dy[0] = -beta * psi;
        dy[1] = -alpha * phi
            + pgf_prime_prime(self.distribution, theta) * beta / self.mean_degree * psi;
        dy[2] = alpha * phi - (beta + gamma) * psi;
        dy[3] = beta * psi * pgf_prime(self.distribution, theta) - alpha * e;
        dy[4] = alpha * e - gamma * i;
    }
}

#[derive(Debug, Clone)]
pub struct EbcmModel {
    order: usize,
    distribution: DegreeDistribution,
}

impl EbcmModel {
    pub fn new(network: &ContactNetwork) -> Self {
        Self::from_summary(&NetworkSummary::from_network(network))
    }

    pub fn from_summary(summary: &NetworkSummary) -> Self {
        Self {
            order: summary.order(),
            distribution: summary.distribution().clone(),
        }
    }

    /// A population of `order` nodes whose degrees follow `distribution`.
    pub fn from_distribution(distribution: DegreeDistribution, order: usize) -> Self {
        Self {
            order,
            distribution,
        }
    }

    pub fn distribution(&self) -> &DegreeDistribution {
        &self.distribution
    }

    pub fn simulate(&self, parameters: &NetworkParameters) -> Result<CompartmentTimeSeries> {
        parameters.validate()?;
        if self.order == 0 {
            return Err(SeirError::invalid("network", "contact network has no nodes"));
        }
        let mean_degree = pgf_prime(&self.distribution, 1.0);
        if mean_degree <= 0.0 {
            return Err(SeirError::invalid(
                "network",
                "edge-based model needs a positive mean degree",
            ));
        }

        let rho = parameters.rho;
        let y0 = DVector::from_vec(vec![1.0 - rho, EDGE_SEED, EDGE_SEED, 0.0, rho]);
        let times = ode::linspace(
            parameters.tmin as f64,
            parameters.tmax as f64,
            parameters.num_points(),
        );
        let field = EbcmVectorField {
            rates: parameters.rates(),
            distribution: &self.distribution,
            mean_degree,
        };
        tracing::debug!(
            order = self.order,
            mean_degree,
            points = times.len(),
            "integrating edge-based model"
        );
        let trajectory = ode::integrate(&field, &y0, &times, &OdeOptions::default())?;
        reconstruct(&times, &trajectory, self.order as f64, &self.distribution)
    }
}

/// Recovers compartment sizes from `theta`, `E` and `I`; `R` closes the
/// population.
fn reconstruct(
    times: &[f64],
    trajectory: &DMatrix<f64>,
    order: f64,
    distribution: &DegreeDistribution,
) -> Result<CompartmentTimeSeries> {
    let mut series = CompartmentTimeSeries::new(times.len());
    for (row, &t) in times.iter().enumerate() {
        let s = order * pgf(distribution, trajectory[(row, 0)]);
        let e = order * trajectory[(row, 3)];
        let i = order * trajectory[(row, 4)];
        if i < -1e-6 * order {
            return Err(SeirError::ModelInstability(format!(
                "infectious compartment went negative ({i}) at t = {t}"
            )));
        }
        series.t[row] = t;
        series.s[row] = s;
        series.e[row] = e;
        series.i[row] = i;
        series.r[row] = order - s - e - i;
    }
    Ok(series)
}

#[cfg(test)]
mod test {
    use super::*;

    fn regular(beta: f64) -> (EbcmModel, NetworkParameters) {
        let model = EbcmModel::from_distribution(
            DegreeDistribution::from_proportions([(4, 1.0)]),
            10_000,
        );
        let parameters = NetworkParameters {
            alpha: 0.1,
            beta,
            gamma: 0.1,
            rho: 0.001,
            tmin: 0,
            tmax: 500,
        };
        (model, parameters)
    }

    #[test]
    fn test_grid_and_conservation() {
        let (model, parameters) = regular(0.3);
        let output = model.simulate(&parameters).unwrap();
        assert_eq!(output.len(), 501);
        assert_eq!(output.t[0], 0.0);
        assert_eq!(output.t[500], 500.0);
        output.check_conservation(10_000.0, 1e-6).unwrap();
        assert!(output.s.windows(2).all(|w| w[1] <= w[0] + 1e-9));
    }

    #[test]
    fn test_supercritical_outbreak() {
        // transmissibility 0.75 over 3 excess edges
        let (model, parameters) = regular(0.3);
        let output = model.simulate(&parameters).unwrap();
        let final_recovered = output.r.last().unwrap() / 10_000.0;
        assert!(final_recovered > 0.5, "final size {final_recovered}");
        let (peak, _) = output.peak().unwrap();
        assert!(peak > 0);
    }

    #[test]
    fn test_subcritical_fizzles() {
        let (model, parameters) = regular(0.01);
        let output = model.simulate(&parameters).unwrap();
        let final_recovered = output.r.last().unwrap() / 10_000.0;
        assert!(final_recovered < 0.05, "final size {final_recovered}");
    }

    #[test]
    fn test_regular_network_tracks_mixed_model_with_scaled_beta() {
        // Pk = {4: 1} against a mixed population with beta * 4. The mixed model
        // ignores that an infected node's parent edge is used up, so it grows
        // faster and infects more. Only the regime is compared in general; above
        // threshold the mixed peak comes first and its final size is at least
        // the network's, with 1% slack.
        use crate::{compartmental::CompartmentalModel, parameters::CompartmentalParameters};

        let order = 10_000;
        for (beta, supercritical) in [(0.005, false), (0.01, false), (0.2, true), (0.3, true)] {
            let (model, parameters) = regular(beta);
            let network = model.simulate(&parameters).unwrap();
            let mixed = CompartmentalModel::simulate(&CompartmentalParameters {
                population: order as f64,
                alpha: parameters.alpha,
                beta: 4.0 * beta,
                gamma: parameters.gamma,
                init_inf_frac: parameters.rho,
                init_rec_frac: 0.0,
                tmax: parameters.tmax,
            })
            .unwrap();

            let network_final = network.r.last().unwrap() / order as f64;
            let mixed_final = mixed.r.last().unwrap() / order as f64;
            if supercritical {
                assert!(network_final > 0.5, "beta {beta}: network final size {network_final}");
                assert!(mixed_final > 0.5, "beta {beta}: mixed final size {mixed_final}");
                let (network_peak, _) = network.peak().unwrap();
                let (mixed_peak, _) = mixed.peak().unwrap();
                assert!(mixed.t[mixed_peak] <= network.t[network_peak], "beta {beta}");
                assert!(mixed_final >= network_final - 0.01, "beta {beta}");
            } else {
                assert!(network_final < 0.05, "beta {beta}: network final size {network_final}");
                assert!(mixed_final < 0.05, "beta {beta}: mixed final size {mixed_final}");
            }
        }
    }

    #[test]
    fn test_network_summary_construction() {
        let network = ContactNetwork::ring_lattice(200, 4).unwrap();
        let model = EbcmModel::new(&network);
        assert_eq!(model.distribution().probability(4), 1.0);
        let output = model
            .simulate(&NetworkParameters {
                tmax: 30,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(output.len(), 31);
        assert!((output.i[0] - 200.0 * 0.005).abs() < 1e-9);
    }

    #[test]
    fn test_network_without_edges() {
        let model = EbcmModel::new(&ContactNetwork::with_nodes(10));
        assert!(matches!(
            model.simulate(&NetworkParameters::default()),
            Err(SeirError::InvalidParameter { name: "network", .. })
        ));
        let model = EbcmModel::new(&ContactNetwork::default());
        assert!(model.simulate(&NetworkParameters::default()).is_err());
    }

    #[test]
    fn test_negative_infectious_is_instability() {
        let distribution = DegreeDistribution::from_proportions([(2, 1.0)]);
        let trajectory = DMatrix::from_row_slice(
            2,
            5,
            &[
                0.99, 0.01, 0.01, 0.0, 0.01, //
                0.98, 0.01, 0.01, 0.0, -0.5,
            ],
        );
        let err = reconstruct(&[0.0, 1.0], &trajectory, 100.0, &distribution).unwrap_err();
        assert!(matches!(err, SeirError::ModelInstability(_)));
    }
}
