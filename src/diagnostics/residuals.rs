//! Residual pattern classification.
//!
//! The residuals are regressed on the sweep voltage, normalized to `[-1, 1]`,
//! with polynomials of order 1, 2 and 3. Each added order is tested with a
//! partial F statistic and must also explain a minimum share of the residual
//! variance before it counts. A Wald–Wolfowitz runs test on the residual signs
//! catches structure the low-order fits miss.
//!
//! | finding                                   | pattern                | level           |
//! |-------------------------------------------|------------------------|-----------------|
//! | cubic significant and dominant            | `s_shaped`             | HIGH / CRITICAL |
//! | quadratic significant                     | `systematic_curvature` | HIGH            |
//! | runs test fails, cubic share dominant     | `s_shaped`             | HIGH / CRITICAL |
//! | linear significant                        | `linear_trend`         | MEDIUM          |
//! | only the runs test fails                  | `systematic_curvature` | MEDIUM          |
//! | nothing                                   | `random`               | LOW             |
//!
//! A significant cubic S-shape is CRITICAL when the runs test also fails. An
//! S-shape found through the runs test alone needs the cubic term to explain
//! at least the minimum variance share and no less than the quadratic term;
//! it is CRITICAL below twice the runs threshold.

use crate::domain::{ResidualAnalysis, ResidualPattern, WarningLevel};
use crate::math::{autocorrelation, normalize_unit_interval, polyfit, rms, runs_test_z};

pub const F_THRESHOLD: f64 = 10.0;
pub const SHARE_THRESHOLD: f64 = 0.05;
pub const RUNS_Z_THRESHOLD: f64 = -3.0;
/// Fewer residuals than this are not classified.
pub const MIN_CLASSIFY_POINTS: usize = 8;
/// Residual RMS below this fraction of the peak current is rounding noise.
pub const NOISE_FLOOR: f64 = 1e-9;

/// Classify `residuals` (measured − modeled) over `voltage`.
pub fn classify_residuals(voltage: &[f64], residuals: &[f64], measured: &[f64]) -> ResidualAnalysis {
    let n = residuals.len();
    let r_rms = rms(residuals);
    let peak = measured.iter().fold(0.0_f64, |a, i| a.max(i.abs()));

    let random = |message: &str| ResidualAnalysis {
        pattern: ResidualPattern::Random,
        warning: WarningLevel::Low,
        message: message.to_string(),
        rms: r_rms,
        slope: 0.0,
        r_squared: 0.0,
        quadratic_strength: 0.0,
        cubic_strength: 0.0,
        runs_z: 0.0,
        confidence: 0.0,
    };

    if n < MIN_CLASSIFY_POINTS || voltage.len() != n {
        return random("too few residuals to classify");
    }
    if r_rms <= NOISE_FLOOR * peak {
        return ResidualAnalysis {
            confidence: 100.0,
            ..random("residuals at the numerical noise floor (exact fit)")
        };
    }

    let x = normalize_unit_interval(voltage);
    let mean_r = residuals.iter().sum::<f64>() / n as f64;
    let tss: f64 = residuals.iter().map(|r| (r - mean_r).powi(2)).sum();
    let fits: Vec<_> = (1..=3).map(|k| polyfit(&x, residuals, k)).collect();
    let (Some(p1), Some(p2), Some(p3)) = (&fits[0], &fits[1], &fits[2]) else {
        return random("trend fits unavailable");
    };
    if !(tss > 0.0) {
        return random("residuals are constant");
    }

    let rss = [tss, p1.rss, p2.rss, p3.rss];
    let mut f_stat = [0.0; 4];
    let mut share = [0.0; 4];
    for k in 1..=3 {
        let dof = n as f64 - k as f64 - 1.0;
        let gain = (rss[k - 1] - rss[k]).max(0.0);
        f_stat[k] = if rss[k] > 0.0 { gain / (rss[k] / dof) } else { f64::INFINITY };
        share[k] = gain / tss;
    }
    let significant = |k: usize| f_stat[k] > F_THRESHOLD && share[k] > SHARE_THRESHOLD;

    let runs_z = runs_test_z(residuals).unwrap_or(0.0);
    let span = voltage[n - 1] - voltage[0];
    let slope = if span > 0.0 { p1.coefficients[1] * 2.0 / span } else { 0.0 };

    let (pattern, warning, message) = if significant(3) && share[3] >= share[2] {
        let level = if runs_z < RUNS_Z_THRESHOLD {
            WarningLevel::Critical
        } else {
            WarningLevel::High
        };
        (
            ResidualPattern::SShaped,
            level,
            "S-shaped residuals indicate carrier injection/extraction barriers",
        )
    } else if significant(2) {
        (
            ResidualPattern::SystematicCurvature,
            WarningLevel::High,
            "Systematic curvature suggests model mismatch",
        )
    } else if runs_z < RUNS_Z_THRESHOLD && share[3] > SHARE_THRESHOLD && share[3] >= share[2] {
        let level = if runs_z < 2.0 * RUNS_Z_THRESHOLD {
            WarningLevel::Critical
        } else {
            WarningLevel::High
        };
        (
            ResidualPattern::SShaped,
            level,
            "S-shaped residuals indicate carrier injection/extraction barriers",
        )
    } else if significant(1) {
        (
            ResidualPattern::LinearTrend,
            WarningLevel::Medium,
            "Linear trend indicates a series or shunt resistance error",
        )
    } else if runs_z < RUNS_Z_THRESHOLD {
        (
            ResidualPattern::SystematicCurvature,
            WarningLevel::Medium,
            "Residual signs cluster into long runs; unmodeled structure likely",
        )
    } else {
        (
            ResidualPattern::Random,
            WarningLevel::Low,
            "Residuals appear random (good fit)",
        )
    };

    // Fast autocorrelation decay supports "random", slow decay supports a pattern.
    let decay = (1..=4).map(|lag| autocorrelation(residuals, lag).abs()).sum::<f64>() / 4.0;
    let confidence = match pattern {
        ResidualPattern::Random => 100.0 * (1.0 - decay),
        _ => 100.0 * decay,
    }
    .clamp(0.0, 100.0);

    ResidualAnalysis {
        pattern,
        warning,
        message: message.to_string(),
        rms: r_rms,
        slope,
        r_squared: share[1],
        quadratic_strength: share[2],
        cubic_strength: share[3],
        runs_z,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::StdRng;
    use rand_distr::Normal;

    fn axis(n: usize) -> Vec<f64> {
        (0..n).map(|k| k as f64 * 0.01).collect()
    }

    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1e-4).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    #[test]
    fn white_noise_is_random() {
        let v = axis(60);
        let r = noise(60, 3);
        let out = classify_residuals(&v, &r, &vec![0.03; 60]);
        assert_eq!(out.pattern, ResidualPattern::Random);
        assert_eq!(out.warning, WarningLevel::Low);
    }

    #[test]
    fn exact_fit_is_random_low() {
        let v = axis(60);
        let r = vec![1e-16; 60];
        let out = classify_residuals(&v, &r, &vec![0.03; 60]);
        assert_eq!(out.pattern, ResidualPattern::Random);
        assert_eq!(out.warning, WarningLevel::Low);
    }

    #[test]
    fn ramp_is_linear_trend() {
        let v = axis(60);
        let r: Vec<f64> = v.iter().zip(noise(60, 4)).map(|(x, e)| 2e-3 * (x - 0.3) + e).collect();
        let out = classify_residuals(&v, &r, &vec![0.03; 60]);
        assert_eq!(out.pattern, ResidualPattern::LinearTrend);
        assert_eq!(out.warning, WarningLevel::Medium);
        assert!(out.slope > 0.0);
    }

    #[test]
    fn bowl_is_systematic_curvature() {
        let v = axis(60);
        let r: Vec<f64> = v
            .iter()
            .zip(noise(60, 5))
            .map(|(x, e)| 5e-3 * ((x - 0.3) * (x - 0.3) - 0.03) + e)
            .collect();
        let out = classify_residuals(&v, &r, &vec![0.03; 60]);
        assert_eq!(out.pattern, ResidualPattern::SystematicCurvature);
        assert_eq!(out.warning, WarningLevel::High);
    }

    #[test]
    fn sine_period_is_s_shaped() {
        let v = axis(60);
        let span = v[59] - v[0];
        let r: Vec<f64> = v
            .iter()
            .map(|x| 5e-4 * (2.0 * std::f64::consts::PI * x / span).sin())
            .collect();
        let out = classify_residuals(&v, &r, &vec![0.03; 60]);
        assert_eq!(out.pattern, ResidualPattern::SShaped);
        assert!(matches!(out.warning, WarningLevel::High | WarningLevel::Critical));
        assert!(out.confidence > 50.0);
    }

    #[test]
    fn clustered_signs_with_cubic_share_are_s_shaped() {
        // Blocks of five same-sign residuals on an odd cubic: the cubic term
        // alone stays below the F threshold, the runs test does not.
        let v = axis(60);
        let x = normalize_unit_interval(&v);
        let r: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(k, x)| {
                let block = if (k / 5) % 2 == 0 { 1.0 } else { -1.0 };
                1e-3 * (block - 0.2 * (5.0 * x.powi(3) - 3.0 * x) / 2.0)
            })
            .collect();
        let out = classify_residuals(&v, &r, &vec![0.03; 60]);
        assert!(out.runs_z < RUNS_Z_THRESHOLD, "z={}", out.runs_z);
        assert!(out.cubic_strength > SHARE_THRESHOLD);
        assert_eq!(out.pattern, ResidualPattern::SShaped);
        assert_eq!(out.warning, WarningLevel::High);
    }

    #[test]
    fn clustered_signs_without_cubic_share_stay_curvature() {
        let v = axis(60);
        let r: Vec<f64> = (0..60).map(|k| if (k / 4) % 2 == 0 { 1e-3 } else { -1e-3 }).collect();
        let out = classify_residuals(&v, &r, &vec![0.03; 60]);
        assert_eq!(out.pattern, ResidualPattern::SystematicCurvature);
        assert_eq!(out.warning, WarningLevel::Medium);
    }
}
