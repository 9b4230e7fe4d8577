//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the input sweep and its metadata (`Measurement`, `MeasurementKind`, `CurrentUnit`)
//! - analysis configuration (`ModelConfiguration`, bounds tables, `Tolerances`)
//! - fit outputs (`DiodeParameters`, `FittedParameters`, `DerivedMetrics`, `FitResult`)
//! - diagnostics (`ResidualAnalysis`, `NoiseStability`, `BoundaryStress`, `DiagnosticReport`)

pub mod types;

pub use types::*;
