//! `pv-fit` library crate.
//!
//! The binary (`pvfit`) is a thin wrapper around this library so that:
//!
//! - the fitting core is testable without spawning processes
//! - other front-ends (batch jobs, services) can call [`analyze`] directly
//!
//! [`analyze`] is a pure function of its inputs: no global state, no
//! process-wide seed, safe to call from many threads at once.

pub mod app;
pub mod cli;
pub mod data;
pub mod determinism;
pub mod diagnostics;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod metrics;
pub mod models;
pub mod physics;
pub mod plot;
pub mod report;

pub use app::pipeline::{LightDarkAnalysis, analyze, analyze_light_dark};
pub use domain::{Analysis, DiagnosticReport, FitResult, Measurement, ModelConfiguration};
pub use error::{AnalysisError, AppError};
