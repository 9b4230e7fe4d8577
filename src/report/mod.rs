//! Terminal reporting of analyses.

pub mod format;

pub use format::*;
