//! Curve fitting.
//!
//! Responsibilities:
//!
//! - map between search vectors and diode parameters (`objective`)
//! - global search by Differential Evolution (`evolution`)
//! - local refinement by Levenberg–Marquardt (`refine`)
//! - two-stage orchestration for one sweep (`solver`)

pub mod evolution;
pub mod objective;
pub mod refine;
pub mod solver;

pub use evolution::*;
pub use objective::*;
pub use refine::*;
pub use solver::*;
