//! On-disk model formats: the text HMM format and the pressed database.

pub mod hmmfile;
pub mod pressed;

pub use hmmfile::{write_hmm, HmmFile};
pub use pressed::{is_pressed, press, HmmPressedFile};
