//! Natural cubic spline interpolation.
//!
//! The metric extractor fits a spline through the power samples `P = V·I` and
//! needs the global maximum of the interpolant, so besides evaluation this
//! module can locate the critical points of each cubic piece analytically.

/// Natural cubic spline through strictly increasing knots.
#[derive(Debug, Clone)]
pub struct NaturalCubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at the knots (zero at both ends).
    m: Vec<f64>,
}

impl NaturalCubicSpline {
    /// Build the spline.
    ///
    /// Returns `None` for fewer than two knots, mismatched lengths, or knots
    /// that are not strictly increasing.
    pub fn new(x: &[f64], y: &[f64]) -> Option<Self> {
        let n = x.len();
        if n < 2 || y.len() != n {
            return None;
        }
        if x.windows(2).any(|w| !(w[1] > w[0])) {
            return None;
        }

        let mut m = vec![0.0; n];
        if n > 2 {
            // Tridiagonal system for the interior second derivatives (Thomas).
            let k = n - 2;
            let mut diag = vec![0.0; k];
            let mut upper = vec![0.0; k];
            let mut rhs = vec![0.0; k];
            for j in 0..k {
                let i = j + 1;
                let h0 = x[i] - x[i - 1];
                let h1 = x[i + 1] - x[i];
                diag[j] = 2.0 * (h0 + h1);
                upper[j] = h1;
                rhs[j] = 6.0 * ((y[i + 1] - y[i]) / h1 - (y[i] - y[i - 1]) / h0);
            }
            for j in 1..k {
                let lower = x[j + 1] - x[j];
                let w = lower / diag[j - 1];
                diag[j] -= w * upper[j - 1];
                rhs[j] -= w * rhs[j - 1];
            }
            let mut sol = vec![0.0; k];
            sol[k - 1] = rhs[k - 1] / diag[k - 1];
            for j in (0..k - 1).rev() {
                sol[j] = (rhs[j] - upper[j] * sol[j + 1]) / diag[j];
            }
            m[1..n - 1].copy_from_slice(&sol);
        }

        Some(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            m,
        })
    }

    fn segment(&self, t: f64) -> usize {
        let last = self.x.len() - 2;
        match self.x.partition_point(|&k| k <= t) {
            0 => 0,
            p => (p - 1).min(last),
        }
    }

    /// Evaluate the spline (extrapolates the end pieces outside the knots).
    pub fn eval(&self, t: f64) -> f64 {
        let i = self.segment(t);
        let (x0, x1) = (self.x[i], self.x[i + 1]);
        let (m0, m1) = (self.m[i], self.m[i + 1]);
        let h = x1 - x0;
        let a = x1 - t;
        let b = t - x0;
        m0 * a.powi(3) / (6.0 * h)
            + m1 * b.powi(3) / (6.0 * h)
            + (self.y[i] / h - m0 * h / 6.0) * a
            + (self.y[i + 1] / h - m1 * h / 6.0) * b
    }

    /// Critical points strictly inside piece `i`.
    fn interior_critical_points(&self, i: usize) -> Vec<f64> {
        let (x0, x1) = (self.x[i], self.x[i + 1]);
        let (m0, m1) = (self.m[i], self.m[i + 1]);
        let h = x1 - x0;
        // S'(x0 + s) = qa s² + qb s + qc
        let qa = (m1 - m0) / (2.0 * h);
        let qb = m0;
        let qc = (self.y[i + 1] - self.y[i]) / h - (m1 - m0) * h / 6.0 - m0 * h / 2.0;

        let mut roots = Vec::with_capacity(2);
        if qa.abs() < 1e-300 {
            if qb.abs() > 1e-300 {
                roots.push(-qc / qb);
            }
        } else {
            let disc = qb * qb - 4.0 * qa * qc;
            if disc >= 0.0 {
                let sq = disc.sqrt();
                roots.push((-qb + sq) / (2.0 * qa));
                roots.push((-qb - sq) / (2.0 * qa));
            }
        }
        roots
            .into_iter()
            .filter(|s| s.is_finite() && *s > 0.0 && *s < h)
            .map(|s| x0 + s)
            .collect()
    }

    /// Global maximum over `[x_first, x_last]` as `(x, value)`.
    ///
    /// Candidates are the knots plus every interior critical point.
    pub fn maximum(&self) -> (f64, f64) {
        let mut best = (self.x[0], self.y[0]);
        for (&xk, &yk) in self.x.iter().zip(&self.y) {
            if yk > best.1 {
                best = (xk, yk);
            }
        }
        for i in 0..self.x.len() - 1 {
            for c in self.interior_critical_points(i) {
                let v = self.eval(c);
                if v.is_finite() && v > best.1 {
                    best = (c, v);
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_knots() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [0.0, 1.0, 0.0, 1.0];
        let s = NaturalCubicSpline::new(&x, &y).unwrap();
        for (xi, yi) in x.iter().zip(y.iter()) {
            assert!((s.eval(*xi) - yi).abs() < 1e-12);
        }
    }

    #[test]
    fn finds_interior_maximum_of_parabola_samples() {
        let x: Vec<f64> = (0..=10).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|v| v * (1.0 - v)).collect();
        let s = NaturalCubicSpline::new(&x, &y).unwrap();
        let (xm, ym) = s.maximum();
        assert!((xm - 0.5).abs() < 1e-3);
        assert!((ym - 0.25).abs() < 1e-4);
    }

    #[test]
    fn rejects_non_increasing_knots() {
        assert!(NaturalCubicSpline::new(&[0.0, 0.0, 1.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(NaturalCubicSpline::new(&[0.0], &[1.0]).is_none());
    }
}
