//! Equivalent-circuit diode models.
//!
//! The implicit diode equation is solved per sample by a bounded Newton
//! iteration; the optimizers only ever see explicit `V → I` evaluations.

pub mod diode;

pub use diode::*;
