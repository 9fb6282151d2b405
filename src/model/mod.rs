//! The model family: the probabilistic HMM, its null model, the log-odds
//! profile, the striped/quantized profile, and per-model metadata views.

pub mod background;
pub mod hmm;
pub mod optimized;
pub mod params;
pub mod profile;
pub mod scoredata;

pub use background::Background;
pub use hmm::Hmm;
pub use optimized::OptimizedProfile;
pub use params::{BitCutoffSelector, Cutoffs, EvalueParameters, Offsets};
pub use profile::{Profile, ProfileConfig};
pub use scoredata::ScoreData;
