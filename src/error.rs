//! Error types.
//!
//! Two layers:
//!
//! - [`AnalysisError`]: the error taxonomy of the fitting core. These never
//!   escape `analyze`; they are folded into a status + message on the result.
//! - [`AppError`]: what the command-line layer returns, carrying a process
//!   exit code.

use crate::domain::FitStatus;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failure modes of a single analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Malformed or insufficient input; no fit is attempted.
    Validation(String),
    /// The local refiner did not converge within its budget.
    Convergence(String),
    /// The diode evaluator produced non-finite values even after clamping.
    Numerical(String),
    /// The fit converged but its parameters or metrics are not physical.
    PhysicalImplausibility(String),
}

impl AnalysisError {
    /// Result status this error maps to.
    ///
    /// A persistent numerical error is treated like a convergence failure.
    pub fn status(&self) -> FitStatus {
        match self {
            AnalysisError::Validation(_) | AnalysisError::PhysicalImplausibility(_) => {
                FitStatus::Invalid
            }
            AnalysisError::Convergence(_) | AnalysisError::Numerical(_) => FitStatus::Failed,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            AnalysisError::Validation(_) => "validation",
            AnalysisError::Convergence(_) => "convergence",
            AnalysisError::Numerical(_) => "numerical",
            AnalysisError::PhysicalImplausibility(_) => "physical_implausibility",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AnalysisError::Validation(m)
            | AnalysisError::Convergence(m)
            | AnalysisError::Numerical(m)
            | AnalysisError::PhysicalImplausibility(m) => m,
        }
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error: {}", self.kind_name(), self.message())
    }
}

impl std::error::Error for AnalysisError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status() {
        assert_eq!(AnalysisError::Validation("x".into()).status(), FitStatus::Invalid);
        assert_eq!(
            AnalysisError::PhysicalImplausibility("x".into()).status(),
            FitStatus::Invalid
        );
        assert_eq!(AnalysisError::Convergence("x".into()).status(), FitStatus::Failed);
        assert_eq!(AnalysisError::Numerical("x".into()).status(), FitStatus::Failed);
    }

    #[test]
    fn display_includes_kind() {
        let e = AnalysisError::Convergence("budget exhausted".into());
        assert_eq!(e.to_string(), "convergence error: budget exhausted");
    }
}
