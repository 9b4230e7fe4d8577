//! Input/output helpers.
//!
//! - CSV sweep ingest (`ingest`)
//! - fitted-curve CSV and result JSON (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
