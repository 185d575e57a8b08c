//! Adaptive ODE integration service.
//!
//! Dormand-Prince 5(4) embedded Runge-Kutta with local error control. The
//! integrator steps freely between evaluation times but never steps past the
//! next one, so every requested time is hit exactly.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SeirError};

/// A first-order system `dy/dt = f(t, y)`.
///
/// Implementors carry their parameters as plain fields; `derivative` must not
/// depend on anything but `t`, `y` and those fields.
pub trait OdeSystem {
    fn dimension(&self) -> usize;

    fn derivative(&self, t: f64, y: &DVector<f64>, dy: &mut DVector<f64>);
}

#[derive(Debug, Clone, Copy)]
pub struct OdeOptions {
    pub rtol: f64,
    pub atol: f64,
    /// Step budget between two consecutive evaluation times.
    pub max_steps: usize,
    /// Initial step; chosen from the first derivative when `None`.
    pub first_step: Option<f64>,
}

impl Default for OdeOptions {
    fn default() -> Self {
        Self {
            rtol: 1.49012e-8,
            atol: 1.49012e-8,
            max_steps: 500_000,
            first_step: None,
        }
    }
}

/// `num` evenly spaced points over `[start, stop]`, endpoints included.
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num)
                .map(|i| if i == num - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}

// Dormand-Prince tableau
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
const A71: f64 = 35.0 / 384.0;
const A73: f64 = 500.0 / 1113.0;
const A74: f64 = 125.0 / 192.0;
const A75: f64 = -2187.0 / 6784.0;
const A76: f64 = 11.0 / 84.0;

// Difference between the 5th and 4th order weights
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

/// Stage buffers reused across steps.
struct Workspace {
    k: [DVector<f64>; 7],
    ytmp: DVector<f64>,
    ynew: DVector<f64>,
}

impl Workspace {
    fn new(n: usize) -> Self {
        Self {
            k: std::array::from_fn(|_| DVector::zeros(n)),
            ytmp: DVector::zeros(n),
            ynew: DVector::zeros(n),
        }
    }
}

/// Integrates `system` from `y0` at `times[0]`, returning one row per
/// evaluation time and one column per state dimension.
pub fn integrate<S: OdeSystem + ?Sized>(
    system: &S,
    y0: &DVector<f64>,
    times: &[f64],
    options: &OdeOptions,
) -> Result<DMatrix<f64>> {
    let n = system.dimension();
    if y0.len() != n {
        return Err(SeirError::DimensionMismatch {
            what: "initial state",
            expected: n,
            actual: y0.len(),
        });
    }
    if times.windows(2).any(|w| w[1] < w[0] || w[1].is_nan()) {
        return Err(SeirError::invalid(
            "times",
            "evaluation times must be non-decreasing",
        ));
    }

    let mut trajectory = DMatrix::zeros(times.len(), n);
    let Some(&t0) = times.first() else {
        return Ok(trajectory);
    };
    trajectory.row_mut(0).copy_from(&y0.transpose());

    let mut ws = Workspace::new(n);
    let mut t = t0;
    let mut y = y0.clone();
    system.derivative(t, &y, &mut ws.k[0]);
    let mut h = options
        .first_step
        .unwrap_or_else(|| initial_step(&y, &ws.k[0], options));

    let mut total_steps = 0usize;
    for (row, &target) in times.iter().enumerate().skip(1) {
        let mut steps = 0usize;
        while t < target {
            if steps >= options.max_steps {
                return Err(SeirError::ModelInstability(format!(
                    "step budget of {} exhausted before t = {target}",
                    options.max_steps
                )));
            }
            steps += 1;

            let remaining = target - t;
            let hit_target = h >= remaining;
            let step = if hit_target { remaining } else { h };
            if step <= f64::EPSILON * t.abs().max(1.0) && !hit_target {
                return Err(SeirError::ModelInstability(format!(
                    "step size underflow at t = {t}"
                )));
            }

            let err = try_step(system, t, &y, step, &mut ws, options);
            if !err.is_finite() {
                // Shrink and retry; a non-finite state at a tiny step is fatal.
                if step <= 1e-12 {
                    return Err(SeirError::ModelInstability(format!(
                        "non-finite state near t = {t}"
                    )));
                }
                h = step * MIN_FACTOR;
                continue;
            }

            let factor = if err == 0.0 {
                MAX_FACTOR
            } else {
                (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
            };

            if err <= 1.0 {
                t = if hit_target { target } else { t + step };
                std::mem::swap(&mut y, &mut ws.ynew);
                // FSAL: the last stage is the derivative at the new point.
                ws.k.swap(0, 6);
                // Keep the free-running step when the target clipped it.
                h = if hit_target { h.max(step * factor) } else { step * factor };
                total_steps += 1;
            } else {
                h = step * factor.min(1.0);
            }
        }
        trajectory.row_mut(row).copy_from(&y.transpose());
    }

    tracing::trace!(
        dimension = n,
        points = times.len(),
        steps = total_steps,
        "integration finished"
    );
    Ok(trajectory)
}

/// Evaluates one Dormand-Prince step into `ws.ynew` and returns the scaled
/// error norm. `ws.k[0]` must hold `f(t, y)` on entry.
fn try_step<S: OdeSystem + ?Sized>(
    system: &S,
    t: f64,
    y: &DVector<f64>,
    h: f64,
    ws: &mut Workspace,
    options: &OdeOptions,
) -> f64 {
    let Workspace { k, ytmp, ynew } = ws;

    stage(ytmp, y, h, &[(A21, &k[0])]);
    system.derivative(t + C2 * h, ytmp, &mut k[1]);

    stage(ytmp, y, h, &[(A31, &k[0]), (A32, &k[1])]);
    system.derivative(t + C3 * h, ytmp, &mut k[2]);

    stage(ytmp, y, h, &[(A41, &k[0]), (A42, &k[1]), (A43, &k[2])]);
    system.derivative(t + C4 * h, ytmp, &mut k[3]);

    stage(
        ytmp,
        y,
        h,
        &[(A51, &k[0]), (A52, &k[1]), (A53, &k[2]), (A54, &k[3])],
    );
    system.derivative(t + C5 * h, ytmp, &mut k[4]);

    stage(
        ytmp,
        y,
        h,
        &[
            (A61, &k[0]),
            (A62, &k[1]),
            (A63, &k[2]),
            (A64, &k[3]),
            (A65, &k[4]),
        ],
    );
    system.derivative(t + h, ytmp, &mut k[5]);

    stage(
        ynew,
        y,
        h,
        &[
            (A71, &k[0]),
            (A73, &k[2]),
            (A74, &k[3]),
            (A75, &k[4]),
            (A76, &k[5]),
        ],
    );
    system.derivative(t + h, ynew, &mut k[6]);

    if y.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..y.len() {
        let local = h
            * (E1 * k[0][i] + E3 * k[2][i] + E4 * k[3][i] + E5 * k[4][i] + E6 * k[5][i]
                + E7 * k[6][i]);
        let scale = options.atol + options.rtol * y[i].abs().max(ynew[i].abs());
        sum += (local / scale).powi(2);
    }
    let err = (sum / y.len() as f64).sqrt();
    if ynew.iter().all(|v| v.is_finite()) {
        err
    } else {
        f64::NAN
    }
}

fn stage(out: &mut DVector<f64>, y: &DVector<f64>, h: f64, terms: &[(f64, &DVector<f64>)]) {
    out.copy_from(y);
    for &(a, k) in terms {
        out.axpy(h * a, k, 1.0);
    }
}

fn initial_step(y: &DVector<f64>, dy: &DVector<f64>, options: &OdeOptions) -> f64 {
    let scale = |v: f64| options.atol + options.rtol * v.abs();
    let d0 = y.iter().map(|&v| (v / scale(v)).powi(2)).sum::<f64>().sqrt();
    let d1 = y
        .iter()
        .zip(dy.iter())
        .map(|(&v, &dv)| (dv / scale(v)).powi(2))
        .sum::<f64>()
        .sqrt();
    if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        (0.01 * d0 / d1).min(1.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Decay {
        rate: f64,
    }

    impl OdeSystem for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn derivative(&self, _t: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
            dy[0] = -self.rate * y[0];
        }
    }

    struct Oscillator;

    impl OdeSystem for Oscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn derivative(&self, _t: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
            dy[0] = y[1];
            dy[1] = -y[0];
        }
    }

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(0.0, 4.0, 5), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(linspace(2.0, 3.0, 1), vec![2.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
        let grid = linspace(0.0, 150.0, 150);
        assert_eq!(grid.len(), 150);
        assert_eq!(grid[149], 150.0);
    }

    #[test]
    fn test_exponential_decay() {
        let times = linspace(0.0, 10.0, 11);
        let y0 = DVector::from_vec(vec![2.0]);
        let trajectory =
            integrate(&Decay { rate: 0.3 }, &y0, &times, &OdeOptions::default()).unwrap();
        assert_eq!(trajectory.nrows(), 11);
        for (row, t) in times.iter().enumerate() {
            let exact = 2.0 * (-0.3 * t).exp();
            assert!((trajectory[(row, 0)] - exact).abs() < 1e-7);
        }
    }

    #[test]
    fn test_oscillator_period() {
        let period = 2.0 * std::f64::consts::PI;
        let times = [0.0, period / 4.0, period];
        let y0 = DVector::from_vec(vec![1.0, 0.0]);
        let trajectory = integrate(&Oscillator, &y0, &times, &OdeOptions::default()).unwrap();
        assert!(trajectory[(1, 0)].abs() < 1e-6);
        assert!((trajectory[(1, 1)] + 1.0).abs() < 1e-6);
        assert!((trajectory[(2, 0)] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch() {
        let y0 = DVector::from_vec(vec![1.0, 2.0]);
        let err = integrate(&Decay { rate: 1.0 }, &y0, &[0.0, 1.0], &OdeOptions::default())
            .unwrap_err();
        assert!(matches!(err, SeirError::DimensionMismatch { expected: 1, actual: 2, .. }));
    }

    #[test]
    fn test_times_must_be_ordered() {
        let y0 = DVector::from_vec(vec![1.0]);
        let err = integrate(&Decay { rate: 1.0 }, &y0, &[0.0, 2.0, 1.0], &OdeOptions::default())
            .unwrap_err();
        assert!(matches!(err, SeirError::InvalidParameter { name: "times", .. }));
    }

    #[test]
    fn test_step_budget() {
        let options = OdeOptions {
            max_steps: 2,
            first_step: Some(1e-3),
            ..Default::default()
        };
        let y0 = DVector::from_vec(vec![1.0]);
        let err = integrate(&Decay { rate: 1.0 }, &y0, &[0.0, 100.0], &options).unwrap_err();
        assert!(matches!(err, SeirError::ModelInstability(_)));
    }
}
