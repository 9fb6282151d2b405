//! Search results: state paths, the hit hierarchy, and the accumulator.

pub mod hits;
pub mod tophits;
pub mod trace;

pub use hits::{Alignment, Domain, Domains, Hit};
pub use tophits::{SearchMode, SortKey, Strand, Thresholds, TopHits};
pub use trace::{Trace, TraceState, TraceStep, Traces};
