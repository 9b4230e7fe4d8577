//! The analysis pipeline shared by the library entry point and the CLI.
//!
//! precondition -> global search -> local refinement -> metrics ->
//! plausibility -> hash -> diagnostics
//!
//! Jsc, Voc, the maximum power point and everything derived from them are read
//! off the measured samples; the fitted curve only supplies Jsc in reference
//! mode and the MPP sensitivities.
//!
//! [`analyze`] never fails: every [`AnalysisError`] is folded into the status
//! and message of the returned [`FitResult`], and the diagnostic report is
//! always well-formed.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::data::{Preconditioned, precondition};
use crate::determinism::{ModeProfile, result_hash};
use crate::diagnostics::{Tracked, diagnose, tracked_values};
use crate::domain::{
    Analysis, AnalysisMode, DerivedMetrics, DiodeParameters, FitResult, FitStatus,
    FittedParameters, Measurement, ModelConfiguration, MppSensitivity, PhysicalBounds,
    RefinementSummary,
};
use crate::error::AnalysisError;
use crate::fit::{CurveFit, fit_curve};
use crate::math::rms;
use crate::metrics::{extract_metrics, mpp_sensitivity};
use crate::models::DiodeModel;
use crate::physics::{LightDarkComparison, compare_light_dark};

/// Fit `measurement` and assess the result.
pub fn analyze(measurement: &Measurement, config: &ModelConfiguration) -> Analysis {
    let profile = ModeProfile::resolve(config);

    let data = match precondition(measurement) {
        Ok(data) => data,
        Err(error) => {
            warn!("{}: {}", measurement.device_label, error.message());
            let fit = rejected(measurement, config, &profile, None, error, None);
            let diagnostics = diagnose(&fit, None, config, &profile, |_, _| None);
            return Analysis { fit, diagnostics };
        }
    };

    let fit = match evaluate(&data, config, &profile, profile.seed) {
        Ok(evaluated) => assemble(measurement, config, &profile, &data, evaluated),
        Err((error, candidate)) => rejected(measurement, config, &profile, Some(&data), error, candidate),
    };
    info!(
        "{}: status {:?}{}",
        fit.device_label,
        fit.status,
        fit.message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default()
    );

    let refit = |perturbed: &Preconditioned, seed: u64| -> Option<Tracked> {
        let trial = evaluate(perturbed, config, &profile, seed).ok()?;
        trial
            .implausible
            .is_none()
            .then(|| tracked_values(&trial.parameters, trial.metrics.as_ref()))
    };
    let diagnostics = diagnose(&fit, Some(&data), config, &profile, refit);

    Analysis { fit, diagnostics }
}

/// Light and dark analyses of the same device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightDarkAnalysis {
    pub light: Analysis,
    pub dark: Analysis,
    /// Present when both fits produced parameters.
    pub comparison: Option<LightDarkComparison>,
}

/// Analyze a light and a dark sweep and relate their diode parameters.
pub fn analyze_light_dark(light: &Measurement, dark: &Measurement, config: &ModelConfiguration) -> LightDarkAnalysis {
    let light = analyze(light, config);
    let dark = analyze(dark, config);
    let comparison = match (&light.fit.parameters, &dark.fit.parameters) {
        (Some(l), Some(d)) => Some(compare_light_dark(l, d)),
        _ => None,
    };
    LightDarkAnalysis {
        light,
        dark,
        comparison,
    }
}

/// A converged fit with its derived quantities.
struct Evaluated {
    curve: CurveFit,
    parameters: FittedParameters,
    metrics: Option<DerivedMetrics>,
    sensitivity: Option<MppSensitivity>,
    /// Set when the fit converged to something unphysical.
    implausible: Option<AnalysisError>,
}

type Rejection = (AnalysisError, Option<DiodeParameters>);

fn evaluate(
    data: &Preconditioned,
    config: &ModelConfiguration,
    profile: &ModeProfile,
    seed: u64,
) -> Result<Evaluated, Rejection> {
    let curve = fit_curve(data, config, profile, seed).map_err(|f| (f.error, f.global_candidate))?;
    let parameters = FittedParameters::from_device(curve.params, data.area_cm2);
    let model = DiodeModel::new(curve.params, data.temperature_k);

    let mut implausible = check_parameters(&curve.params, &config.physical).err();
    let mut metrics = None;
    let mut sensitivity = None;

    if !data.kind.is_dark() {
        let jsc_model = (profile.mode == AnalysisMode::Reference).then_some(&model);
        match extract_metrics(
            &data.voltage,
            &data.current,
            data.area_cm2,
            config.irradiance_mw_cm2,
            jsc_model,
        ) {
            Ok(m) => {
                sensitivity = mpp_sensitivity(&model, &m, data.area_cm2);
                if implausible.is_none() {
                    implausible = check_metrics(&m, sensitivity.as_ref(), &config.physical).err();
                }
                metrics = Some(m);
            }
            Err(e) => {
                if implausible.is_none() {
                    implausible = Some(e);
                }
            }
        }
    }

    Ok(Evaluated {
        curve,
        parameters,
        metrics,
        sensitivity,
        implausible,
    })
}

fn check_parameters(params: &DiodeParameters, physical: &PhysicalBounds) -> Result<(), AnalysisError> {
    let implausible = |msg: String| Err(AnalysisError::PhysicalImplausibility(msg));
    if !params.is_finite() {
        return Err(AnalysisError::Numerical("fitted parameters are not finite".to_string()));
    }
    if params.rs() < 0.0 || params.rsh() < 0.0 {
        return implausible(format!(
            "negative resistance (Rs={:.4e} Ω, Rsh={:.4e} Ω)",
            params.rs(),
            params.rsh()
        ));
    }
    let outside = |n: f64, (lo, hi): (f64, f64)| !(lo..=hi).contains(&n);
    match *params {
        DiodeParameters::OneDiode { n, .. } if outside(n, physical.ideality) => implausible(format!(
            "ideality factor n={n:.3} outside [{}, {}]",
            physical.ideality.0, physical.ideality.1
        )),
        DiodeParameters::TwoDiode { n1, n2, .. }
            if outside(n1, physical.ideality_two_diode) || outside(n2, physical.ideality_two_diode) =>
        {
            implausible(format!(
                "ideality factors n1={n1:.3}, n2={n2:.3} outside [{}, {}]",
                physical.ideality_two_diode.0, physical.ideality_two_diode.1
            ))
        }
        _ => Ok(()),
    }
}

fn check_metrics(
    m: &DerivedMetrics,
    sensitivity: Option<&MppSensitivity>,
    physical: &PhysicalBounds,
) -> Result<(), AnalysisError> {
    let implausible = |msg: String| Err(AnalysisError::PhysicalImplausibility(msg));
    if !(m.fill_factor > 0.0 && m.fill_factor < physical.fill_factor_max) {
        return implausible(format!(
            "fill factor {:.4} outside (0, {})",
            m.fill_factor, physical.fill_factor_max
        ));
    }
    if !(m.pce_percent > 0.0 && m.pce_percent <= physical.pce_max) {
        return implausible(format!("efficiency {:.3}% outside (0, {}]", m.pce_percent, physical.pce_max));
    }
    if let Some(s) = sensitivity.filter(|s| s.d_pce_d_rs > 0.0) {
        return implausible(format!(
            "efficiency increases with series resistance (∂PCE/∂Rs = {:.4e})",
            s.d_pce_d_rs
        ));
    }
    Ok(())
}

fn assemble(
    measurement: &Measurement,
    config: &ModelConfiguration,
    profile: &ModeProfile,
    data: &Preconditioned,
    evaluated: Evaluated,
) -> FitResult {
    let Evaluated {
        curve,
        parameters,
        metrics,
        sensitivity,
        implausible,
    } = evaluated;

    let (status, message, error_kind) = match &implausible {
        None => (FitStatus::Valid, None, None),
        Some(e) => (e.status(), Some(e.message().to_string()), Some(e.kind_name().to_string())),
    };
    let residuals: Vec<f64> = data.current.iter().zip(&curve.modeled).map(|(m, f)| m - f).collect();
    let hash = result_hash(
        &measurement.fingerprint,
        config,
        Some(&parameters),
        metrics.as_ref(),
        status,
    );

    FitResult {
        status,
        message,
        error_kind,
        device_label: measurement.device_label.clone(),
        model: config.model,
        mode: config.mode,
        measurement_kind: data.kind,
        temperature_k: data.temperature_k,
        parameters: Some(parameters),
        global_candidate: Some(curve.global_candidate),
        voltage: data.voltage.clone(),
        current: data.current.clone(),
        modeled_current: curve.modeled,
        refinement: Some(RefinementSummary {
            global_objective: curve.global_energy,
            global_generations: curve.generations,
            iterations: curve.refinement.iterations,
            termination: curve.refinement.termination,
            sse: curve.refinement.sse,
            rmse: rms(&residuals),
        }),
        residuals,
        metrics,
        sensitivity,
        preconditioning: Some(data.notes.clone()),
        hash,
        hash_stable: profile.hash_stable(),
    }
}

fn rejected(
    measurement: &Measurement,
    config: &ModelConfiguration,
    profile: &ModeProfile,
    data: Option<&Preconditioned>,
    error: AnalysisError,
    global_candidate: Option<DiodeParameters>,
) -> FitResult {
    let status = error.status();
    FitResult {
        status,
        message: Some(error.message().to_string()),
        error_kind: Some(error.kind_name().to_string()),
        device_label: measurement.device_label.clone(),
        model: config.model,
        mode: config.mode,
        measurement_kind: measurement.kind,
        temperature_k: data.map_or_else(|| measurement.temperature_or_default(), |d| d.temperature_k),
        parameters: None,
        global_candidate,
        voltage: data.map(|d| d.voltage.clone()).unwrap_or_default(),
        current: data.map(|d| d.current.clone()).unwrap_or_default(),
        modeled_current: Vec::new(),
        residuals: Vec::new(),
        metrics: None,
        refinement: None,
        sensitivity: None,
        preconditioning: data.map(|d| d.notes.clone()),
        hash: result_hash(&measurement.fingerprint, config, None, None, status),
        hash_stable: profile.hash_stable(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SynthConfig, generate_curve};
    use crate::domain::{MeasurementKind, ModelKind};

    fn quick(model: ModelKind) -> ModelConfiguration {
        ModelConfiguration::exploration(model).with_stability_trials(0)
    }

    #[test]
    fn reference_cell_is_valid() {
        let m = generate_curve(&SynthConfig::default()).unwrap();
        let a = analyze(&m, &quick(ModelKind::OneDiode));
        assert_eq!(a.fit.status, FitStatus::Valid, "{:?}", a.fit.message);
        let metrics = a.fit.metrics.unwrap();
        assert!((metrics.jsc_ma_cm2 - 30.0).abs() < 0.1);
        assert!(a.fit.sensitivity.unwrap().d_pce_d_rs <= 0.0);
        assert_eq!(a.fit.residuals.len(), a.fit.voltage.len());
        assert!(a.diagnostics.noise_stability.is_none());
    }

    #[test]
    fn metrics_follow_the_measured_samples() {
        // A kink the diode model cannot follow separates measured and modeled.
        let mut m = generate_curve(&SynthConfig::default()).unwrap();
        for (i, v) in m.current.iter_mut().zip(&m.voltage) {
            *i -= 3e-3 * (1.0 + ((v - 0.45) / 0.03).tanh());
        }
        let config = quick(ModelKind::OneDiode);
        let a = analyze(&m, &config);
        let got = a.fit.metrics.expect("metrics");

        let area = a.fit.parameters.as_ref().unwrap().area_cm2;
        let from_samples =
            extract_metrics(&a.fit.voltage, &a.fit.current, area, config.irradiance_mw_cm2, None).unwrap();
        let from_model =
            extract_metrics(&a.fit.voltage, &a.fit.modeled_current, area, config.irradiance_mw_cm2, None).unwrap();
        assert_eq!(got, from_samples);
        assert_ne!(got.pmax_w, from_model.pmax_w);
    }

    #[test]
    fn too_few_points_is_invalid_without_parameters() {
        let m = Measurement::new("short", vec![0.0, 0.1, 0.2], vec![0.03, 0.029, 0.0]);
        let a = analyze(&m, &quick(ModelKind::OneDiode));
        assert_eq!(a.fit.status, FitStatus::Invalid);
        assert_eq!(a.fit.error_kind.as_deref(), Some("validation"));
        assert!(a.fit.parameters.is_none());
        assert!(!a.diagnostics.validation_passed);
        assert_eq!(a.diagnostics.risk_score, 100.0);
    }

    #[test]
    fn dark_sweep_has_no_light_metrics() {
        let cfg = SynthConfig {
            params: DiodeParameters::OneDiode {
                iph: 0.0,
                i0: 1e-10,
                n: 1.3,
                rs: 0.5,
                rsh: 5000.0,
            },
            ..SynthConfig::default()
        };
        let m = generate_curve(&cfg).unwrap().with_kind(MeasurementKind::Dark);
        let a = analyze(&m, &quick(ModelKind::OneDiode));
        assert_eq!(a.fit.status, FitStatus::Valid, "{:?}", a.fit.message);
        assert!(a.fit.metrics.is_none());
        assert!(a.fit.sensitivity.is_none());
        assert_eq!(a.fit.parameters.unwrap().jph_ma_cm2, 0.0);
    }

    #[test]
    fn unphysical_ideality_is_invalid() {
        let physical = PhysicalBounds {
            ideality: (0.8, 1.05),
            ..PhysicalBounds::default()
        };
        let err = check_parameters(&SynthConfig::default().params, &physical).unwrap_err();
        assert!(matches!(err, AnalysisError::PhysicalImplausibility(_)));
        assert!(check_parameters(&SynthConfig::default().params, &PhysicalBounds::default()).is_ok());
    }
}
