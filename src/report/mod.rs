//! Result rendering.

pub mod tables;

pub use tables::TableFormat;
