//! Measurement preparation and synthetic data.
//!
//! - [`precondition`]: validates a raw sweep and converts it to the internal
//!   units and sign convention
//! - [`synthetic`]: seeded diode curves for tests, demos and noise trials

pub mod precondition;
pub mod synthetic;

pub use precondition::*;
pub use synthetic::*;
