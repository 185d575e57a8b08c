use serde::{Deserialize, Serialize};

use crate::error::{Result, SeirError};

/// Per-day transition rates shared by every model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpidemicRates {
    /// Progression rate E -> I.
    pub alpha: f64,
    /// Transmission rate.
    pub beta: f64,
    /// Recovery rate I -> R.
    pub gamma: f64,
}

impl EpidemicRates {
    pub fn validate(&self) -> Result<()> {
        check_rate("alpha", self.alpha)?;
        check_rate("beta", self.beta)?;
        check_rate("gamma", self.gamma)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompartmentalParameters {
    pub population: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    /// Fraction of the population initially infectious.
    pub init_inf_frac: f64,
    /// Fraction of the population initially recovered.
    pub init_rec_frac: f64,
    /// Number of evaluation points, spread evenly over `[0, tmax]`.
    pub tmax: usize,
}

impl Default for CompartmentalParameters {
    fn default() -> Self {
        Self {
            population: 1e6,
            alpha: 0.1,
            beta: 0.01,
            gamma: 0.1,
            init_inf_frac: 0.0005,
            init_rec_frac: 0.0,
            tmax: 150,
        }
    }
}

impl CompartmentalParameters {
    pub fn rates(&self) -> EpidemicRates {
        EpidemicRates {
            alpha: self.alpha,
            beta: self.beta,
            gamma: self.gamma,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.rates().validate()?;
        if !(self.population.is_finite() && self.population > 0.0) {
            return Err(SeirError::invalid(
                "population",
                format!("must be positive, got {}", self.population),
            ));
        }
        check_fraction("init_inf_frac", self.init_inf_frac)?;
        check_fraction("init_rec_frac", self.init_rec_frac)?;
        if self.init_inf_frac + self.init_rec_frac > 1.0 {
            return Err(SeirError::invalid(
                "init_rec_frac",
                "initial infectious and recovered fractions exceed 1",
            ));
        }
        check_horizon(0, self.tmax)
    }
}

/// Parameters for the deterministic network models (EBCM and mean-field).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkParameters {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    /// Initial infectious fraction.
    pub rho: f64,
    pub tmin: usize,
    pub tmax: usize,
}

impl Default for NetworkParameters {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            beta: 0.02,
            gamma: 0.1,
            rho: 0.005,
            tmin: 0,
            tmax: 150,
        }
    }
}

impl NetworkParameters {
    pub fn rates(&self) -> EpidemicRates {
        EpidemicRates {
            alpha: self.alpha,
            beta: self.beta,
            gamma: self.gamma,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.rates().validate()?;
        check_fraction("rho", self.rho)?;
        check_horizon(self.tmin, self.tmax)
    }

    /// Integer evaluation grid `tmin, tmin + 1, ..., tmax`.
    pub fn num_points(&self) -> usize {
        self.tmax - self.tmin + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StochasticParameters {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    /// Fraction of nodes seeded infectious, taken from the lowest node ids.
    pub rho: f64,
    pub tmax: usize,
    pub seed: u64,
}

impl Default for StochasticParameters {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            beta: 0.02,
            gamma: 0.1,
            rho: 0.005,
            tmax: 150,
            seed: 0,
        }
    }
}

impl StochasticParameters {
    pub fn rates(&self) -> EpidemicRates {
        EpidemicRates {
            alpha: self.alpha,
            beta: self.beta,
            gamma: self.gamma,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.rates().validate()?;
        check_fraction("rho", self.rho)?;
        check_horizon(0, self.tmax)
    }
}

fn check_rate(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SeirError::invalid(
            name,
            format!("rate must be finite and non-negative, got {value}"),
        ))
    }
}

pub(crate) fn check_fraction(name: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SeirError::invalid(
            name,
            format!("fraction must lie in [0, 1], got {value}"),
        ))
    }
}

fn check_horizon(tmin: usize, tmax: usize) -> Result<()> {
    if tmax == 0 {
        return Err(SeirError::invalid("tmax", "must be positive"));
    }
    if tmin >= tmax {
        return Err(SeirError::invalid(
            "tmin",
            format!("must be below tmax ({tmin} >= {tmax})"),
        ));
    }
    Ok(())
}
