//! Probability generating function of a degree distribution and its first
//! two derivatives. Terms whose coefficient vanishes are skipped, so every
//! evaluator is finite at `x = 0`.

use crate::network::DegreeDistribution;

/// `Σ Pk x^k`
pub fn pgf(distribution: &DegreeDistribution, x: f64) -> f64 {
    distribution
        .iter()
        .map(|(k, p)| p * x.powi(k as i32))
        .sum()
}

/// `Σ k Pk x^(k-1)`
pub fn pgf_prime(distribution: &DegreeDistribution, x: f64) -> f64 {
    distribution
        .iter()
        .filter(|&(k, _)| k >= 1)
        .map(|(k, p)| k as f64 * p * x.powi(k as i32 - 1))
        .sum()
}

/// `Σ k (k-1) Pk x^(k-2)`
pub fn pgf_prime_prime(distribution: &DegreeDistribution, x: f64) -> f64 {
    distribution
        .iter()
        .filter(|&(k, _)| k >= 2)
        .map(|(k, p)| (k * (k - 1)) as f64 * p * x.powi(k as i32 - 2))
        .sum()
}
