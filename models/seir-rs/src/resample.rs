//! Nearest-neighbour resampling of event-indexed series onto integer days.

use crate::error::{Result, SeirError};
use crate::output::CompartmentTimeSeries;

/// Index of the first element of `t` closest to `target`. NaN times are
/// never selected.
pub fn nearest_index(t: &[f64], target: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, &value) in t.iter().enumerate() {
        let distance = (value - target).abs();
        if distance.is_nan() {
            continue;
        }
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((index, distance)),
        }
    }
    best.map(|(index, _)| index)
}

/// Picks, for every day `0..tmax`, the sample nearest to that day. The
/// returned `t` holds the source times, not the day numbers.
pub fn resample(series: &CompartmentTimeSeries, tmax: usize) -> Result<CompartmentTimeSeries> {
    if series.is_empty() {
        return Err(SeirError::invalid(
            "series",
            "cannot resample an empty time series",
        ));
    }
    let mut out = CompartmentTimeSeries::new(tmax);
    for day in 0..tmax {
        let index = nearest_index(&series.t, day as f64).ok_or_else(|| {
            SeirError::invalid("series", "time points are not comparable")
        })?;
        out.t[day] = series.t[index];
        out.s[day] = series.s[index];
        out.e[day] = series.e[index];
        out.i[day] = series.i[index];
        out.r[day] = series.r[index];
    }
    Ok(out)
}
