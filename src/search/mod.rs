//! The search engine: filter kernels, the float DP core, domain
//! definition, and the two pipeline front-ends.

pub mod domaindef;
pub mod fwdback;
pub mod long_targets;
pub mod msv;
pub mod null2;
pub mod pipeline;
pub mod vitfilter;

pub use long_targets::{LongTargetsConfig, LongTargetsPipeline};
pub use pipeline::{Pipeline, PipelineConfig, PipelineQuery};
