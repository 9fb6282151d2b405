//! Integration test harness, organized by component:
//! - `model` - the HMM / Profile / OptimizedProfile family
//! - `stats` - score distributions
//! - `builder` - model construction
//! - `pipeline` - the search cascade, both loop directions
//! - `tophits` - aggregation, sorting, merging, thresholds
//! - `iterate` - the search-and-rebuild driver
//! - `io` - text and pressed formats
//! - `long_targets` - windowed nucleotide search

mod helpers;

mod builder;
mod io;
mod iterate;
mod long_targets;
mod model;
mod pipeline;
mod stats;
mod tophits;
