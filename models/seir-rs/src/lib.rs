//! SEIR epidemic simulation under four modelling assumptions: a fully mixed
//! ODE, an edge-based compartmental model, a degree-stratified mean-field
//! model and a stochastic jump process on an explicit contact network.

pub mod compartmental;
pub mod ebcm;
pub mod error;
pub mod gillespie;
pub mod incidence;
pub mod meanfield;
pub mod network;
pub mod ode;
pub mod output;
pub mod parameters;
pub mod pgf;
pub mod resample;
pub mod stochastic;

pub use compartmental::CompartmentalModel;
pub use ebcm::EbcmModel;
pub use error::{Result, SeirError};
pub use meanfield::MeanFieldModel;
pub use network::{ContactNetwork, DegreeDistribution, NetworkSummary};
pub use output::{CompartmentTimeSeries, EpidemicOutput};
pub use parameters::{CompartmentalParameters, NetworkParameters, StochasticParameters};
pub use stochastic::StochasticNetworkModel;
