//! Linear least squares via SVD.
//!
//! Two places in this crate reduce to small dense least-squares problems:
//!
//! ```text
//! minimize ‖A x − b‖²
//! ```
//!
//! - every Levenberg–Marquardt step (the damped system is solved in augmented
//!   form `[J; sqrt(λ)·D] δ = [−r; 0]`)
//! - the polynomial trend fits of the residual classifier
//!
//! Both are tall (more rows than columns) and can be badly conditioned: the
//! Jacobian columns for `I0` and `n` are close to collinear on a clean diode
//! curve. SVD handles both cases; nalgebra's `QR::solve` is intended for
//! square systems and panics on non-square input.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if a.nrows() == 0 || a.ncols() == 0 || a.nrows() != b.len() {
        return None;
    }
    let svd = a.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(x) = svd.solve(b, tol) {
            if x.iter().all(|v| v.is_finite()) {
                return Some(x);
            }
        }
    }

    None
}

/// Sum of squared residuals of `a x − b`.
pub fn residual_sum_of_squares(a: &DMatrix<f64>, x: &DVector<f64>, b: &DVector<f64>) -> f64 {
    (a * x - b).norm_squared()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let b = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let x = solve_least_squares(&a, &b).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-10);
        assert!((x[1] - 3.0).abs() < 1e-10);
        assert!(residual_sum_of_squares(&a, &x, &b) < 1e-20);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let a = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0, 3.0]);
        assert!(solve_least_squares(&a, &b).is_none());
    }
}
