//! Seeded synthetic IV curves.
//!
//! Used for three things:
//!
//! - demo data (`pvfit synth`)
//! - ground-truth curves in tests
//! - Gaussian perturbations for the noise-stability trials
//!
//! Noise is relative and per-sample: `σ_i = level·|I_i|`. Everything is driven
//! by `StdRng::seed_from_u64`, so a given seed always yields the same curve.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{CurrentUnit, DEFAULT_TEMPERATURE_K, DiodeParameters, Measurement};
use crate::error::AppError;
use crate::models::DiodeModel;

/// Parameters of a generated sweep.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub params: DiodeParameters,
    pub area_cm2: f64,
    pub temperature_k: f64,
    pub points: usize,
    pub v_min: f64,
    pub v_max: f64,
    /// Relative Gaussian noise level (0 = noise-free).
    pub noise: f64,
    pub seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            params: DiodeParameters::OneDiode {
                iph: 0.030,
                i0: 1e-10,
                n: 1.1,
                rs: 0.5,
                rsh: 2000.0,
            },
            area_cm2: 1.0,
            temperature_k: DEFAULT_TEMPERATURE_K,
            points: 61,
            v_min: -0.1,
            v_max: 0.60,
            noise: 0.0,
            seed: 7,
        }
    }
}

/// Generate a measurement (amps, generator convention).
pub fn generate_curve(config: &SynthConfig) -> Result<Measurement, AppError> {
    if config.points < 2 {
        return Err(AppError::new(2, "Point count must be >= 2."));
    }
    if !(config.v_min.is_finite() && config.v_max.is_finite() && config.v_max > config.v_min) {
        return Err(AppError::new(2, "Invalid voltage range for synthetic sweep."));
    }
    if !(config.noise.is_finite() && config.noise >= 0.0) {
        return Err(AppError::new(2, "Noise level must be >= 0."));
    }

    let step = (config.v_max - config.v_min) / (config.points - 1) as f64;
    let voltage: Vec<f64> = (0..config.points)
        .map(|k| config.v_min + step * k as f64)
        .collect();

    let model = DiodeModel::new(config.params, config.temperature_k);
    let clean = model
        .curve(&voltage)
        .ok_or_else(|| AppError::new(4, "Diode model could not be evaluated for these parameters."))?;

    let current = if config.noise > 0.0 {
        let mut rng = StdRng::seed_from_u64(config.seed);
        add_relative_noise(&clean, config.noise, &mut rng)
            .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?
    } else {
        clean
    };

    Ok(Measurement::new("synthetic", voltage, current)
        .with_area(config.area_cm2)
        .with_temperature(config.temperature_k)
        .with_current_unit(CurrentUnit::Amps))
}

/// Perturb each sample by `N(0, (level·|I_i|)²)`.
///
/// Draws happen in sample order, so the output depends only on the rng state.
pub fn add_relative_noise<R: Rng>(
    current: &[f64],
    level: f64,
    rng: &mut R,
) -> Result<Vec<f64>, rand_distr::NormalError> {
    let normal = Normal::new(0.0, 1.0)?;
    Ok(current
        .iter()
        .map(|i| i + level * i.abs() * normal.sample(rng))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_curve() {
        let cfg = SynthConfig {
            noise: 0.01,
            ..SynthConfig::default()
        };
        let a = generate_curve(&cfg).unwrap();
        let b = generate_curve(&cfg).unwrap();
        assert_eq!(a.current, b.current);
        assert_eq!(a.fingerprint, b.fingerprint);

        let c = generate_curve(&SynthConfig { seed: 8, ..cfg }).unwrap();
        assert_ne!(a.current, c.current);
    }

    #[test]
    fn noise_free_curve_starts_near_photocurrent() {
        let m = generate_curve(&SynthConfig::default()).unwrap();
        assert_eq!(m.len(), 61);
        assert!((m.current[0] - 0.030).abs() < 1e-3);
        assert!(*m.current.last().unwrap() < 0.0);
    }

    #[test]
    fn relative_noise_scales_with_magnitude() {
        let mut rng = StdRng::seed_from_u64(1);
        let noisy = add_relative_noise(&[0.0, 1.0], 0.01, &mut rng).unwrap();
        assert_eq!(noisy[0], 0.0);
        assert!((noisy[1] - 1.0).abs() < 0.1);
    }

    #[test]
    fn rejects_bad_ranges() {
        let cfg = SynthConfig {
            v_min: 1.0,
            v_max: 0.0,
            ..SynthConfig::default()
        };
        assert_eq!(generate_curve(&cfg).unwrap_err().exit_code(), 2);
    }
}
