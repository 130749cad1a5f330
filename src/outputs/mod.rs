//! Output generation.
//!
//! - [`json`]: writes the per-run result tree for the serving layer

pub mod json;
