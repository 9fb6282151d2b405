//! Model construction: builders, weighting, priors, substitution tables,
//! and score-distribution calibration.

pub mod builder;
pub mod calibrate;
pub mod matrices;
pub mod prior;
pub mod weighting;

pub use builder::{Architecture, Builder, EffectiveNumber, Weighting};
pub use calibrate::{calibrate, CalibrationConfig};
pub use prior::{Prior, PriorScheme};
