//! Degree-stratified heterogeneous mean-field SEIR.
//!
//! Susceptibles of degree `k` follow the closure `Sk = Sk(0) * theta^k`; the
//! integrated state is `[theta, E0..Ekmax, R0..Rkmax]` and `Ik` closes each
//! degree class.

use nalgebra::{DMatrix, DVector};

use crate::{
    error::{Result, SeirError},
    network::{ContactNetwork, NetworkSummary},
    ode::{self, OdeOptions, OdeSystem},
    output::CompartmentTimeSeries,
    parameters::{EpidemicRates, NetworkParameters, check_fraction},
    resample::resample,
};

/// Per-degree compartment sizes, indexed by degree `0..=max_degree`.
#[derive(Debug, Clone, PartialEq)]
pub struct DegreeStratifiedState {
    pub sk: Vec<f64>,
    pub ek: Vec<f64>,
    pub ik: Vec<f64>,
    pub rk: Vec<f64>,
}

impl DegreeStratifiedState {
    pub fn num_classes(&self) -> usize {
        self.sk.len()
    }

    /// `Nk = Sk + Ek + Ik + Rk`.
    pub fn class_sizes(&self) -> Vec<f64> {
        (0..self.num_classes())
            .map(|k| self.sk[k] + self.ek[k] + self.ik[k] + self.rk[k])
            .collect()
    }

    fn check_dimensions(&self) -> Result<()> {
        let expected = self.sk.len();
        for (what, len) in [("Ek0", self.ek.len()), ("Ik0", self.ik.len()), ("Rk0", self.rk.len())] {
            if len != expected {
                return Err(SeirError::DimensionMismatch {
                    what,
                    expected,
                    actual: len,
                });
            }
        }
        Ok(())
    }
}

pub struct MeanFieldVectorField<'a> {
    pub rates: EpidemicRates,
    pub s0: &'a [f64],
    pub nk: &'a [f64],
}

impl MeanFieldVectorField<'_> {
    fn classes(&self) -> usize {
        self.nk.len()
    }

    /// `Σ k Ik / Σ k Nk`, or 0 when no node has an edge.
    fn infectious_pressure(&self, ik: impl Iterator<Item = f64>) -> f64 {
        let stubs: f64 = self.nk.iter().enumerate().map(|(k, n)| k as f64 * n).sum();
        if stubs <= 0.0 {
            return 0.0;
        }
        let infectious_stubs: f64 = ik.enumerate().map(|(k, i)| k as f64 * i).sum();
        infectious_stubs / stubs
    }
}

impl OdeSystem for MeanFieldVectorField<'_> {
    fn dimension(&self) -> usize {
        1 + 2 * self.classes()
    }

    fn derivative(&self, _t: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
        let EpidemicRates {
            alpha,
            beta: tau,
            gamma,
        } = self.rates;
        let n = self.classes();
        let theta = y[0];
        let ek = y.rows(1, n);
        let rk = y.rows(1 + n, n);

        let sk = |k: usize| self.s0[k] * theta.powi(k as i32);
        let ik = |k: usize| self.nk[k] - sk(k) - ek[k] - rk[k];
        let pi_i = self.infectious_pressure((0..n).map(&ik));

        dy[0] = -tau * pi_i * theta;
        for k in 0..n {
            dy[1 + k] = sk(k) * k as f64 * tau * pi_i * theta.powi(k as i32) - alpha * ek[k];
            dy[1 + n + k] = gamma * ik(k);
        }
    }
}

/// Degree-stratified trajectory; rows are time points, columns degree classes.
#[derive(Debug, Clone)]
pub struct StratifiedTrajectory {
    pub t: Vec<f64>,
    pub sk: DMatrix<f64>,
    pub ek: DMatrix<f64>,
    pub ik: DMatrix<f64>,
    pub rk: DMatrix<f64>,
}

impl StratifiedTrajectory {
    /// Sums every compartment across degree classes.
    pub fn aggregate(&self) -> CompartmentTimeSeries {
        let row_sums = |m: &DMatrix<f64>| -> Vec<f64> { m.row_iter().map(|row| row.sum()).collect() };
        CompartmentTimeSeries {
            t: self.t.clone(),
            s: row_sums(&self.sk),
            e: row_sums(&self.ek),
            i: row_sums(&self.ik),
            r: row_sums(&self.rk),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeanFieldModel {
    summary: NetworkSummary,
}

impl MeanFieldModel {
    pub fn new(network: &ContactNetwork) -> Self {
        Self::from_summary(NetworkSummary::from_network(network))
    }

    pub fn from_summary(summary: NetworkSummary) -> Self {
        Self { summary }
    }

    pub fn summary(&self) -> &NetworkSummary {
        &self.summary
    }

    /// One initially infectious node's worth of the population.
    pub fn default_rho(&self) -> f64 {
        if self.summary.order() == 0 {
            0.0
        } else {
            1.0 / self.summary.order() as f64
        }
    }

    /// `Sk = (1 - rho) Nk`, `Ik = rho Nk`, `Ek = Rk = 0`.
    pub fn initial_state(&self, rho: f64) -> Result<DegreeStratifiedState> {
        check_fraction("rho", rho)?;
        let nk: Vec<f64> = self
            .summary
            .degree_counts()
            .iter()
            .map(|&n| n as f64)
            .collect();
        Ok(DegreeStratifiedState {
            sk: nk.iter().map(|n| (1.0 - rho) * n).collect(),
            ek: vec![0.0; nk.len()],
            ik: nk.iter().map(|n| rho * n).collect(),
            rk: vec![0.0; nk.len()],
        })
    }

    /// Runs the model and resamples the aggregate onto days `0..tmax`.
    pub fn simulate(&self, parameters: &NetworkParameters) -> Result<CompartmentTimeSeries> {
        parameters.validate()?;
        if self.summary.order() == 0 {
            return Err(SeirError::invalid("network", "contact network has no nodes"));
        }
        let initial = self.initial_state(parameters.rho)?;
        let trajectory = simulate_stratified(&initial, parameters)?;
        resample(&trajectory.aggregate(), parameters.tmax)
    }
}

/// Integrates from an explicit degree-stratified initial state over the
/// integer grid `tmin..=tmax`.
pub fn simulate_stratified(
    initial: &DegreeStratifiedState,
    parameters: &NetworkParameters,
) -> Result<StratifiedTrajectory> {
    initial.check_dimensions()?;
    parameters.validate()?;
    let n = initial.num_classes();
    let nk = initial.class_sizes();

    let mut y0 = DVector::zeros(1 + 2 * n);
    y0[0] = 1.0;
    y0.rows_mut(1, n).copy_from_slice(&initial.ek);
    y0.rows_mut(1 + n, n).copy_from_slice(&initial.rk);

    let times = ode::linspace(
        parameters.tmin as f64,
        parameters.tmax as f64,
        parameters.num_points(),
    );
    let field = MeanFieldVectorField {
        rates: parameters.rates(),
        s0: &initial.sk,
        nk: &nk,
    };
    tracing::debug!(
        degree_classes = n,
        state_size = field.dimension(),
        points = times.len(),
        "integrating mean-field model"
    );
    let x = ode::integrate(&field, &y0, &times, &OdeOptions::default())?;

    let ek = x.columns(1, n).into_owned();
    let rk = x.columns(1 + n, n).into_owned();
    let sk = DMatrix::from_fn(times.len(), n, |row, k| {
        initial.sk[k] * x[(row, 0)].powi(k as i32)
    });
    let ik = DMatrix::from_fn(times.len(), n, |row, k| {
        nk[k] - sk[(row, k)] - ek[(row, k)] - rk[(row, k)]
    });
    Ok(StratifiedTrajectory {
        t: times,
        sk,
        ek,
        ik,
        rk,
    })
}
