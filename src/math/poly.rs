//! Polynomial least-squares fits.
//!
//! Used by the residual classifier, which fits low-order trends to residuals
//! over a voltage axis normalized to `[-1, 1]`.

use nalgebra::{DMatrix, DVector};

use super::ols::{residual_sum_of_squares, solve_least_squares};

/// A fitted polynomial `c0 + c1 x + c2 x² + ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct PolyFit {
    pub coefficients: Vec<f64>,
    /// Residual sum of squares of the fit.
    pub rss: f64,
}

impl PolyFit {
    pub fn order(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn eval(&self, x: f64) -> f64 {
        // Horner
        self.coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }
}

/// Fit a polynomial of the given order.
///
/// Returns `None` when there are not more points than coefficients or the
/// design matrix cannot be solved.
pub fn polyfit(x: &[f64], y: &[f64], order: usize) -> Option<PolyFit> {
    let cols = order + 1;
    if x.len() != y.len() || x.len() <= cols {
        return None;
    }
    let a = DMatrix::from_fn(x.len(), cols, |r, c| x[r].powi(c as i32));
    let b = DVector::from_column_slice(y);
    let beta = solve_least_squares(&a, &b)?;
    let rss = residual_sum_of_squares(&a, &beta, &b);
    Some(PolyFit {
        coefficients: beta.iter().copied().collect(),
        rss,
    })
}

/// Map values linearly onto `[-1, 1]`.
///
/// A constant input maps to all zeros.
pub fn normalize_unit_interval(x: &[f64]) -> Vec<f64> {
    let lo = x.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = hi - lo;
    if !(span > 0.0) || !span.is_finite() {
        return vec![0.0; x.len()];
    }
    x.iter().map(|v| 2.0 * (v - lo) / span - 1.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_is_recovered() {
        let x: Vec<f64> = (0..20).map(|i| -1.0 + i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.0 - 2.0 * v + 0.5 * v * v).collect();
        let fit = polyfit(&x, &y, 2).unwrap();
        assert_eq!(fit.order(), 2);
        assert!((fit.coefficients[0] - 1.0).abs() < 1e-9);
        assert!((fit.coefficients[1] + 2.0).abs() < 1e-9);
        assert!((fit.coefficients[2] - 0.5).abs() < 1e-9);
        assert!((fit.eval(0.5) - (1.0 - 1.0 + 0.125)).abs() < 1e-9);
    }

    #[test]
    fn too_few_points_is_none() {
        assert!(polyfit(&[0.0, 1.0, 2.0], &[1.0, 2.0, 3.0], 3).is_none());
    }

    #[test]
    fn normalize_spans_unit_interval() {
        let z = normalize_unit_interval(&[0.0, 0.25, 1.0]);
        assert_eq!(z, vec![-1.0, -0.5, 1.0]);
        assert_eq!(normalize_unit_interval(&[3.0, 3.0]), vec![0.0, 0.0]);
    }
}
