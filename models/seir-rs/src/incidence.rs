//! Daily and weekly incidence derived from compartment sizes.
//!
//! The final week is zero-padded when the daily series is not a whole number
//! of weeks, so its total covers fewer than seven observed days.

use crate::error::{Result, SeirError};

pub const DAYS_PER_WEEK: usize = 7;

/// Per-step incidence `(E[i-1] - E[i]) - (S[i] - S[i-1])`: the outflow from
/// S net of the growth of E. Index 0 is always 0.
pub fn daily_incidence(s: &[f64], e: &[f64]) -> Result<Vec<f64>> {
    check_lengths("E", s.len(), e.len())?;
    Ok((0..s.len())
        .map(|i| {
            if i == 0 {
                0.0
            } else {
                (e[i - 1] - e[i]) - (s[i] - s[i - 1])
            }
        })
        .collect())
}

pub fn pad_to_multiple_of_seven(daily: &[f64]) -> Vec<f64> {
    let padded_len = daily.len().div_ceil(DAYS_PER_WEEK) * DAYS_PER_WEEK;
    let mut padded = daily.to_vec();
    padded.resize(padded_len, 0.0);
    padded
}

/// Sums of consecutive 7-day groups; length is `ceil(daily.len() / 7)`.
pub fn weekly_incidence(daily: &[f64]) -> Vec<f64> {
    pad_to_multiple_of_seven(daily)
        .chunks_exact(DAYS_PER_WEEK)
        .map(|week| week.iter().sum())
        .collect()
}

/// Weekly sums over complete weeks only; a trailing partial week is dropped.
pub fn weekly_incidence_unpadded(daily: &[f64]) -> Vec<f64> {
    daily
        .chunks_exact(DAYS_PER_WEEK)
        .map(|week| week.iter().sum())
        .collect()
}

pub fn compute_incidence(s: &[f64], e: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    let daily = daily_incidence(s, e)?;
    let weekly = weekly_incidence(&daily);
    Ok((daily, weekly))
}

/// Ratio of incidence to new recoveries at each index; NaN where no one
/// recovered. Noisy at small counts and only meant as a rough indicator.
pub fn compute_rt(incidence: &[f64], r: &[f64]) -> Result<Vec<f64>> {
    check_lengths("R", incidence.len(), r.len())?;
    let rt: Vec<f64> = (0..r.len())
        .map(|i| {
            let new_recoveries = if i == 0 { 0.0 } else { r[i] - r[i - 1] };
            if new_recoveries != 0.0 {
                incidence[i] / new_recoveries
            } else {
                f64::NAN
            }
        })
        .collect();
    if !rt.is_empty() && rt.iter().all(|v| !v.is_finite()) {
        tracing::warn!(len = rt.len(), "Rt series has no finite values");
    }
    Ok(rt)
}

fn check_lengths(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SeirError::DimensionMismatch {
            what,
            expected,
            actual,
        })
    }
}
