//! Trustworthiness checks on a finished fit.
//!
//! Everything here reads a completed [`FitResult`] and never changes it:
//!
//! - [`classify_residuals`]: structure left in `measured − modeled`
//! - [`noise_stability`]: parameter drift under re-measured noise
//! - [`boundary_stress`]: fitted values sitting on the edge of the plausible
//! - [`aggregate_risk`]: one 0–100 score over the checks that ran

pub mod boundary;
pub mod residuals;
pub mod risk;
pub mod stability;

pub use boundary::*;
pub use residuals::*;
pub use risk::*;
pub use stability::*;

use log::debug;

use crate::data::Preconditioned;
use crate::determinism::ModeProfile;
use crate::domain::{
    DiagnosticReport, FitResult, FittedParameters, ModelConfiguration, PhysicsInsight,
    ResidualAnalysis, ResidualPattern,
};
use crate::physics::{RecombinationMechanism, ideal_fill_factor, ideality_from_slope};

/// Stability below this score earns a recommendation.
pub const LOW_STABILITY_SCORE: f64 = 80.0;
/// Stability below this score fails validation whatever the aggregate risk.
pub const MIN_STABILITY_SCORE: f64 = 20.0;
/// Fill factors this far above the ideal-diode value are suspicious.
pub const FF_EXCESS_TOLERANCE: f64 = 0.02;
/// Slope and fitted ideality factors disagreeing by more than this are reported.
pub const IDEALITY_MISMATCH: f64 = 0.3;

/// Build the diagnostic report for `fit`.
///
/// `data` is the preconditioned sweep the fit was run on; noise trials
/// perturb it and hand each perturbed copy to `refit` with a trial seed.
/// Stability only runs for valid fits with a positive trial count and noise
/// level.
pub fn diagnose<F>(
    fit: &FitResult,
    data: Option<&Preconditioned>,
    config: &ModelConfiguration,
    profile: &ModeProfile,
    refit: F,
) -> DiagnosticReport
where
    F: Fn(&Preconditioned, u64) -> Option<Tracked> + Sync,
{
    let Some(params) = fit.parameters.as_ref() else {
        return DiagnosticReport {
            residuals: None,
            noise_stability: None,
            boundary_stress: None,
            physics: None,
            risk_score: 100.0,
            validation_passed: false,
            recommendations: fit.message.iter().cloned().collect(),
        };
    };

    let residuals = (!fit.residuals.is_empty())
        .then(|| classify_residuals(&fit.voltage, &fit.residuals, &fit.current));

    let noise_level = config.stability.noise_level;
    let noise = match data {
        Some(data) if fit.is_valid() && profile.stability_trials > 0 && noise_level > 0.0 => {
            Some(noise_stability(
                data,
                &tracked_values(params, fit.metrics.as_ref()),
                profile.stability_trials,
                noise_level,
                profile.seed,
                profile.tolerances.parallel,
                refit,
            ))
        }
        _ => None,
    };

    let boundary = boundary_stress(params, fit.metrics.as_ref(), &config.boundary, config.boundary_margin);
    let physics = physics_insight(fit, params);

    let risk_score = aggregate_risk(
        residuals.as_ref().map(|r| residual_risk(r.warning)),
        noise.as_ref().map(|s| stability_risk(s.stability_score)),
        Some(boundary_risk(&boundary)),
        &config.risk,
    )
    .unwrap_or(100.0);
    let stability_ok = noise.as_ref().is_none_or(|s| s.stability_score >= MIN_STABILITY_SCORE);
    let validation_passed = fit.is_valid() && stability_ok && risk_score < config.risk.pass_threshold;

    let mut recommendations = Vec::new();
    if let Some(message) = fit.message.as_ref().filter(|_| !fit.is_valid()) {
        recommendations.push(message.clone());
    }
    if let Some(text) = residuals.as_ref().and_then(residual_recommendation) {
        recommendations.push(text.to_string());
    }
    if let Some(s) = noise.as_ref().filter(|s| s.stability_score < LOW_STABILITY_SCORE) {
        recommendations.push(format!(
            "Low noise stability ({:.0}%). Parameters may be poorly constrained. Collect more data points near MPP.",
            s.stability_score
        ));
    }
    recommendations.extend(boundary.recommendations.iter().cloned());
    recommendations.extend(physics_recommendations(fit, params, &physics));

    debug!(
        "diagnostics: risk {:.1}, passed {}, {} recommendation(s)",
        risk_score,
        validation_passed,
        recommendations.len()
    );

    DiagnosticReport {
        residuals,
        noise_stability: noise,
        boundary_stress: Some(boundary),
        physics: Some(physics),
        risk_score,
        validation_passed,
        recommendations,
    }
}

fn residual_recommendation(r: &ResidualAnalysis) -> Option<&'static str> {
    match r.pattern {
        ResidualPattern::SShaped => Some(
            "S-shaped residuals detected. Consider: 1) Check for voltage-dependent photogeneration, 2) Analyze injection barriers, 3) Test two-diode model",
        ),
        ResidualPattern::SystematicCurvature => Some(
            "Systematic curvature in residuals. Try: 1) Two-diode model, 2) Check for series resistance variation, 3) Verify illumination uniformity",
        ),
        ResidualPattern::LinearTrend => Some(
            "Linear trend in residuals. Check series and shunt resistance estimates.",
        ),
        ResidualPattern::Random => None,
    }
}

fn physics_insight(fit: &FitResult, params: &FittedParameters) -> PhysicsInsight {
    let is_light = fit.metrics.is_some();
    let isc = fit.metrics.as_ref().map(|m| m.jsc_ma_cm2 * params.area_cm2 / 1000.0);
    PhysicsInsight {
        ideality_from_slope: ideality_from_slope(&fit.voltage, &fit.current, fit.temperature_k, is_light, isc),
        recombination: RecombinationMechanism::classify(params.n).description().to_string(),
        ideal_fill_factor: fit
            .metrics
            .as_ref()
            .and_then(|m| ideal_fill_factor(m.voc_v, params.n, fit.temperature_k)),
    }
}

fn physics_recommendations(fit: &FitResult, params: &FittedParameters, physics: &PhysicsInsight) -> Vec<String> {
    let mut out = Vec::new();
    if let (Some(m), Some(ff0)) = (fit.metrics.as_ref(), physics.ideal_fill_factor) {
        if m.fill_factor > ff0 + FF_EXCESS_TOLERANCE {
            out.push(format!(
                "Fill factor {:.3} exceeds the ideal-diode limit {:.3} for n={:.2}. Verify device area and calibration.",
                m.fill_factor, ff0, params.n
            ));
        }
    }
    if let Some(n_slope) = physics.ideality_from_slope {
        if (n_slope - params.n).abs() > IDEALITY_MISMATCH {
            out.push(format!(
                "Slope ideality factor (n={:.2}) differs from the fitted n={:.2}. Series resistance may dominate the forward region.",
                n_slope, params.n
            ));
        }
    }
    out
}
