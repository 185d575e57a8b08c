use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeirError};
use crate::incidence;

/// Compartment sizes aligned index-for-index with `t`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompartmentTimeSeries {
    pub t: Vec<f64>,
    pub s: Vec<f64>,
    pub e: Vec<f64>,
    pub i: Vec<f64>,
    pub r: Vec<f64>,
}

impl CompartmentTimeSeries {
    pub fn new(len: usize) -> CompartmentTimeSeries {
        CompartmentTimeSeries {
            t: vec![0.0; len],
            s: vec![0.0; len],
            e: vec![0.0; len],
            i: vec![0.0; len],
            r: vec![0.0; len],
        }
    }

    pub fn from_columns(
        t: Vec<f64>,
        s: Vec<f64>,
        e: Vec<f64>,
        i: Vec<f64>,
        r: Vec<f64>,
    ) -> Result<CompartmentTimeSeries> {
        for (what, len) in [("S", s.len()), ("E", e.len()), ("I", i.len()), ("R", r.len())] {
            if len != t.len() {
                return Err(SeirError::DimensionMismatch {
                    what,
                    expected: t.len(),
                    actual: len,
                });
            }
        }
        Ok(CompartmentTimeSeries { t, s, e, i, r })
    }

    /// Builds a series from a trajectory whose columns are S, E, I, R.
    pub(crate) fn from_trajectory(t: &[f64], trajectory: &DMatrix<f64>, scale: f64) -> Self {
        let column = |c: usize| -> Vec<f64> { trajectory.column(c).iter().map(|v| v * scale).collect() };
        CompartmentTimeSeries {
            t: t.to_vec(),
            s: column(0),
            e: column(1),
            i: column(2),
            r: column(3),
        }
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// `S + E + I + R` at every index.
    pub fn totals(&self) -> Vec<f64> {
        (0..self.len())
            .map(|k| self.s[k] + self.e[k] + self.i[k] + self.r[k])
            .collect()
    }

    /// Index and size of the largest infectious compartment.
    pub fn peak(&self) -> Option<(usize, f64)> {
        self.i
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub fn check_conservation(&self, expected: f64, tolerance: f64) -> Result<()> {
        for (k, total) in self.totals().into_iter().enumerate() {
            if (total - expected).abs() > tolerance {
                return Err(SeirError::ModelInstability(format!(
                    "compartments sum to {total} at t = {}, expected {expected}",
                    self.t[k]
                )));
            }
        }
        Ok(())
    }

    pub fn incidence(&self) -> Result<EpidemicOutput> {
        EpidemicOutput::from_series(self, false)
    }
}

/// Incidence statistics derived from a [`CompartmentTimeSeries`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpidemicOutput {
    pub daily_incidence: Vec<f64>,
    pub weekly_incidence: Vec<f64>,
    pub rt: Option<Vec<f64>>,
}

impl EpidemicOutput {
    pub fn from_series(series: &CompartmentTimeSeries, with_rt: bool) -> Result<EpidemicOutput> {
        let (daily_incidence, weekly_incidence) = incidence::compute_incidence(&series.s, &series.e)?;
        let rt = if with_rt {
            Some(incidence::compute_rt(&daily_incidence, &series.r)?)
        } else {
            None
        };
        Ok(EpidemicOutput {
            daily_incidence,
            weekly_incidence,
            rt,
        })
    }
}
