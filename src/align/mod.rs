//! Trace-based alignment of sequences against a model.

pub mod trace_aligner;

pub use trace_aligner::TraceAligner;
