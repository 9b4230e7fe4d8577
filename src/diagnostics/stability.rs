//! Noise-stability trials.
//!
//! Each trial perturbs the preconditioned current with independent Gaussian
//! noise `σ_i = level·|I_i|`, refits, and records the relative drift of the
//! tracked quantities from the clean fit. Trial `k` draws its noise and its
//! optimizer seed from `derive_seed(base, k)`, so trials are independent of
//! scheduling; they may run on the rayon pool but are aggregated in trial
//! order.
//!
//! The stability score averages, over the tracked quantities, how far each
//! mean drift stays below `SCORE_ZERO_FACTOR` noise levels, and scales the
//! result by the share of trials that completed.

use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::data::{Preconditioned, add_relative_noise};
use crate::determinism::derive_seed;
use crate::domain::{DerivedMetrics, FittedParameters, NoiseStability, ParameterDrift};
use crate::math::{mean, std_dev};

/// A parameter is stable when its mean drift is within this many noise levels.
pub const STABLE_DRIFT_FACTOR: f64 = 2.0;
/// Mean drift at which a quantity stops contributing to the score, in noise levels.
pub const SCORE_ZERO_FACTOR: f64 = 5.0;

/// Named quantities tracked across trials.
pub type Tracked = Vec<(&'static str, f64)>;

/// Jsc, Voc, FF, PCE (light only), n, Rs, Rsh.
pub fn tracked_values(params: &FittedParameters, metrics: Option<&DerivedMetrics>) -> Tracked {
    let mut out = Vec::with_capacity(7);
    if let Some(m) = metrics {
        out.push(("jsc", m.jsc_ma_cm2));
        out.push(("voc", m.voc_v));
        out.push(("ff", m.fill_factor));
        out.push(("pce", m.pce_percent));
    }
    out.push(("n", params.n));
    out.push(("rs", params.rs_ohm_cm2));
    out.push(("rsh", params.rsh_ohm_cm2));
    out
}

/// Run `trials` perturbed refits and summarize the drift.
///
/// `refit` returns the tracked values of one perturbed sweep, or `None` when
/// that fit did not produce a valid result.
pub fn noise_stability<F>(
    data: &Preconditioned,
    baseline: &Tracked,
    trials: usize,
    noise_level: f64,
    base_seed: u64,
    parallel: bool,
    refit: F,
) -> NoiseStability
where
    F: Fn(&Preconditioned, u64) -> Option<Tracked> + Sync,
{
    let run_trial = |k: usize| -> Option<Tracked> {
        let seed = derive_seed(base_seed, k as u64);
        let mut rng = StdRng::seed_from_u64(seed);
        let noisy = add_relative_noise(&data.current, noise_level, &mut rng).ok()?;
        refit(&data.with_current(noisy), seed)
    };
    let outcomes: Vec<Option<Tracked>> = if parallel {
        (0..trials).into_par_iter().map(run_trial).collect()
    } else {
        (0..trials).map(run_trial).collect()
    };

    let completed: Vec<&Tracked> = outcomes.iter().flatten().collect();
    let failed_trials = trials - completed.len();

    let mut drifts = Vec::with_capacity(baseline.len());
    for (name, base) in baseline {
        if *base == 0.0 || !base.is_finite() {
            continue;
        }
        let rel: Vec<f64> = completed
            .iter()
            .filter_map(|t| t.iter().find(|(n, _)| n == name))
            .map(|(_, v)| ((v - base) / base).abs())
            .collect();
        if rel.is_empty() {
            continue;
        }
        let mean_drift = mean(&rel);
        drifts.push(ParameterDrift {
            parameter: (*name).to_string(),
            mean: mean_drift,
            std: std_dev(&rel),
            max: rel.iter().copied().fold(0.0, f64::max),
            stable: mean_drift <= STABLE_DRIFT_FACTOR * noise_level,
        });
    }

    let (stability_score, worst_case_drift) = if drifts.is_empty() {
        (0.0, 0.0)
    } else {
        let per_quantity: Vec<f64> = drifts
            .iter()
            .map(|d| 1.0 - (d.mean / (SCORE_ZERO_FACTOR * noise_level)).min(1.0))
            .collect();
        let completion = completed.len() as f64 / trials as f64;
        let score = 100.0 * mean(&per_quantity) * completion;
        (score, drifts.iter().map(|d| d.max).fold(0.0, f64::max))
    };
    let stable = !drifts.is_empty() && drifts.iter().all(|d| d.stable);

    info!(
        "noise stability: {}/{} trials completed, score {:.1}, worst drift {:.2}%",
        completed.len(),
        trials,
        stability_score,
        worst_case_drift * 100.0
    );

    NoiseStability {
        noise_level,
        trials,
        failed_trials,
        drifts,
        stability_score,
        worst_case_drift,
        stable,
    }
}
