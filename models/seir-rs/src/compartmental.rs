use nalgebra::DVector;

use crate::{
    error::Result,
    ode::{self, OdeOptions, OdeSystem},
    output::CompartmentTimeSeries,
    parameters::{CompartmentalParameters, EpidemicRates},
};

/// Fully mixed SEIR on the unit-population scale.
#[derive(Debug, Clone, Copy)]
pub struct SeirVectorField {
    pub rates: EpidemicRates,
}

impl OdeSystem for SeirVectorField {
    fn dimension(&self) -> usize {
        4
    }

    fn derivative(&self, _t: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
        let EpidemicRates { alpha, beta, gamma } = self.rates;
        let (s, e, i) = (y[0], y[1], y[2]);
        let infection = beta * s * i;
        dy[0] = -infection;
        dy[1] = infection - alpha * e;
        dy[2] = alpha * e - gamma * i;
        dy[3] = gamma * i;
    }
}

pub struct CompartmentalModel {}

impl CompartmentalModel {
    pub fn simulate(parameters: &CompartmentalParameters) -> Result<CompartmentTimeSeries> {
        parameters.validate()?;
        let i0 = parameters.init_inf_frac;
        let r0 = parameters.init_rec_frac;
        let y0 = DVector::from_vec(vec![1.0 - i0 - r0, 0.0, i0, r0]);

        let tmax = parameters.tmax;
        let times = ode::linspace(0.0, tmax as f64, tmax);
        let field = SeirVectorField {
            rates: parameters.rates(),
        };
        tracing::debug!(
            points = times.len(),
            population = parameters.population,
            "integrating compartmental model"
        );
        let trajectory = ode::integrate(&field, &y0, &times, &OdeOptions::default())?;
        Ok(CompartmentTimeSeries::from_trajectory(
            &times,
            &trajectory,
            parameters.population,
        ))
    }
}
