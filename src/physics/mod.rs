//! Physics heuristics around the fit.
//!
//! None of this feeds the fitted values directly:
//!
//! - [`initial_guess`] is the second starting point of the local refinement
//! - [`ideality_from_slope`], [`RecombinationMechanism`] and
//!   [`ideal_fill_factor`] are cross-checks reported by the diagnostics
//! - [`compare_light_dark`] relates a light fit to a dark fit of the same cell

use serde::{Deserialize, Serialize};

use crate::data::Preconditioned;
use crate::domain::{DiodeParameters, FittedParameters, ModelKind, ParameterBounds};
use crate::math::{mean, polyfit};
use crate::metrics::interpolate_at;
use crate::models::thermal_voltage;

/// Ideality factor from the slope of `ln I_diode` versus `V`.
///
/// For light curves the diode current is approximated as `Isc − I − G·V`,
/// with the shunt conductance `G` taken from the low-bias slope; when `isc`
/// is not given it is estimated from samples with `|V| < 50 mV`. The fit uses
/// the window `0.7·Voc ..= 0.95·Voc` where the diode term dominates, falling
/// back to all forward bias above `3·Vt` when that window holds fewer than
/// five points. Dark curves use `|I|` above `3·Vt`. Points with a diode
/// current below 1 nA are dropped. Returns `None` with fewer than five usable
/// points, a non-positive slope, or an implausible `n ≥ 10`.
pub fn ideality_from_slope(
    voltage: &[f64],
    current: &[f64],
    temperature_k: f64,
    is_light: bool,
    isc: Option<f64>,
) -> Option<f64> {
    let vt = thermal_voltage(temperature_k);
    let forward = |v: f64| v > 3.0 * vt;

    let usable = |diode: &[f64], in_window: &dyn Fn(f64) -> bool| -> (Vec<f64>, Vec<f64>) {
        voltage
            .iter()
            .zip(diode)
            .filter(|(v, i)| in_window(**v) && **i > 1e-9)
            .map(|(v, i)| (*v, i.ln()))
            .unzip()
    };

    let (v_fit, ln_i) = if is_light {
        let isc = isc.unwrap_or_else(|| {
            let near_zero: Vec<f64> = voltage
                .iter()
                .zip(current)
                .filter(|(v, _)| v.abs() < 0.05)
                .map(|(_, i)| *i)
                .collect();
            if near_zero.is_empty() {
                current.first().copied().unwrap_or(0.0)
            } else {
                mean(&near_zero)
            }
        });
        let g = low_bias_shunt(voltage, current).map_or(0.0, |rsh| 1.0 / rsh);
        let diode: Vec<f64> = voltage.iter().zip(current).map(|(v, i)| isc - i - g * v).collect();

        let windowed = open_circuit_crossing(voltage, current)
            .map(|(voc, _)| usable(&diode, &|v: f64| forward(v) && v >= 0.7 * voc && v <= 0.95 * voc))
            .filter(|(v, _)| v.len() >= 5);
        windowed.unwrap_or_else(|| usable(&diode, &forward))
    } else {
        let diode: Vec<f64> = current.iter().map(|i| i.abs()).collect();
        usable(&diode, &forward)
    };
    if v_fit.len() < 5 {
        return None;
    }

    let fit = polyfit(&v_fit, &ln_i, 1)?;
    let slope = fit.coefficients[1];
    if !(slope > 0.0) {
        return None;
    }
    let n = 1.0 / (slope * vt);
    (n.is_finite() && n < 10.0).then_some(n)
}

/// Dominant recombination pathway suggested by an ideality factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecombinationMechanism {
    Unreliable,
    SubUnityArtifact,
    Radiative,
    SrhDepletion,
    SrhDiffusion,
    ComplexOrBarrier,
}

impl RecombinationMechanism {
    pub fn classify(n: f64) -> Self {
        if !(n > 0.0) || !n.is_finite() {
            RecombinationMechanism::Unreliable
        } else if n < 0.8 {
            RecombinationMechanism::SubUnityArtifact
        } else if n <= 1.2 {
            RecombinationMechanism::Radiative
        } else if n < 1.8 {
            RecombinationMechanism::SrhDepletion
        } else if n <= 2.2 {
            RecombinationMechanism::SrhDiffusion
        } else {
            RecombinationMechanism::ComplexOrBarrier
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            RecombinationMechanism::Unreliable => "invalid or unreliable ideality factor",
            RecombinationMechanism::SubUnityArtifact => "below unity (likely a measurement artifact)",
            RecombinationMechanism::Radiative => "radiative / band-to-band",
            RecombinationMechanism::SrhDepletion => "SRH trap-assisted (depletion region)",
            RecombinationMechanism::SrhDiffusion => "SRH diffusion-limited (quasi-neutral region)",
            RecombinationMechanism::ComplexOrBarrier => "complex (tunneling, multi-level traps or barriers)",
        }
    }
}

/// Empirical ideal-diode fill factor `FF₀ = (voc − ln(voc + 0.72))/(voc + 1)`
/// with `voc = Voc/(n·Vt)`.
///
/// Only meaningful as an upper sanity bound for a fitted fill factor.
pub fn ideal_fill_factor(voc_v: f64, n: f64, temperature_k: f64) -> Option<f64> {
    let voc = voc_v / (n * thermal_voltage(temperature_k));
    if !(voc.is_finite() && voc > 0.0) {
        return None;
    }
    let ff = (voc - (voc + 0.72).ln()) / (voc + 1.0);
    (ff.is_finite() && ff > 0.0).then_some(ff)
}

/// Light versus dark fit of the same device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightDarkComparison {
    pub n_light: f64,
    pub n_dark: f64,
    /// `n_light − n_dark`; a large positive value points at
    /// illumination-dependent recombination.
    pub delta_n: f64,
    pub dark_j0_ma_cm2: f64,
    pub dark_rs_ohm_cm2: f64,
    pub dark_rsh_ohm_cm2: f64,
    pub light_mechanism: RecombinationMechanism,
    pub dark_mechanism: RecombinationMechanism,
}

pub fn compare_light_dark(light: &FittedParameters, dark: &FittedParameters) -> LightDarkComparison {
    LightDarkComparison {
        n_light: light.n,
        n_dark: dark.n,
        delta_n: light.n - dark.n,
        dark_j0_ma_cm2: dark.j0_ma_cm2,
        dark_rs_ohm_cm2: dark.rs_ohm_cm2,
        dark_rsh_ohm_cm2: dark.rsh_ohm_cm2,
        light_mechanism: RecombinationMechanism::classify(light.n),
        dark_mechanism: RecombinationMechanism::classify(dark.n),
    }
}

/// Rough starting point for the optimizers, read off the curve shape.
///
/// Light curves:
/// - `Iph ≈ I(V=0)`
/// - `Rsh` from the reverse/low-bias slope
/// - `n` from the slope method (1.5 when unavailable)
/// - `I0 ≈ Isc / exp(Voc/(n·Vt))`
/// - `Rs` from the dynamic resistance at Voc minus the diode part `n·Vt/Isc`
///
/// Dark curves use the largest forward-bias sample for `I0`. The result is
/// clipped into `bounds`.
pub fn initial_guess(data: &Preconditioned, model: ModelKind, bounds: &ParameterBounds) -> DiodeParameters {
    let v = &data.voltage;
    let i = &data.current;
    let vt = thermal_voltage(data.temperature_k);
    let dark = data.kind.is_dark();
    let clip = |x: f64, (lo, hi): (f64, f64)| if x.is_finite() { x.clamp(lo, hi) } else { lo };

    let isc = if dark { 0.0 } else { interpolate_at(v, i, 0.0).unwrap_or(i[0]) };
    let n = ideality_from_slope(v, i, data.temperature_k, !dark, (!dark).then_some(isc))
        .unwrap_or(1.5)
        .clamp(1.0, 2.0);

    let rsh = low_bias_shunt(v, i).unwrap_or(1e4);

    let (i0, rs) = if dark {
        let (vk, ik) = v
            .iter()
            .zip(i)
            .filter(|(vv, _)| **vv > 0.0)
            .map(|(a, b)| (*a, b.abs()))
            .fold((0.0, 0.0), |acc, p| if p.1 > acc.1 { p } else { acc });
        let i0 = if ik > 0.0 { ik / (vk / (n * vt)).exp() } else { 1e-12 };
        (i0, 1e-3)
    } else {
        match open_circuit_crossing(v, i) {
            Some((voc, k)) => {
                let i0 = isc / (voc / (n * vt)).exp();
                let dv_di = (v[k + 1] - v[k]) / (i[k + 1] - i[k]);
                let rs = (-dv_di - n * vt / isc.max(1e-12)).max(0.0);
                (i0, rs)
            }
            None => (1e-12, 1.0),
        }
    };

    let iph = if dark { 0.0 } else { clip(isc, bounds.iph) };
    let i0 = clip(i0, bounds.i0);
    let rs = clip(rs, bounds.rs);
    let rsh = clip(rsh, bounds.rsh);
    match model {
        ModelKind::OneDiode => DiodeParameters::OneDiode {
            iph,
            i0,
            n: clip(n, bounds.n),
            rs,
            rsh,
        },
        ModelKind::TwoDiode => DiodeParameters::TwoDiode {
            iph,
            i01: clip(i0 * 0.1, bounds.i0),
            n1: clip(1.0, bounds.n),
            i02: clip(i0, bounds.i02),
            n2: clip(2.0, bounds.n2),
            rs,
            rsh,
        },
    }
}

/// First voltage where the current changes sign (positive → non-positive)
/// and the index of the bracketing pair.
fn open_circuit_crossing(v: &[f64], i: &[f64]) -> Option<(f64, usize)> {
    (0..v.len().saturating_sub(1)).find_map(|k| {
        (i[k] > 0.0 && i[k + 1] <= 0.0).then(|| (v[k] + (v[k + 1] - v[k]) * i[k] / (i[k] - i[k + 1]), k))
    })
}

/// `−1/slope` of the lowest-voltage third of the sweep.
fn low_bias_shunt(v: &[f64], i: &[f64]) -> Option<f64> {
    let take = (v.len() / 3).max(3).min(v.len());
    let fit = polyfit(&v[..take], &i[..take], 1)?;
    let slope = fit.coefficients[1];
    (slope < 0.0).then(|| -1.0 / slope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SynthConfig, generate_curve, precondition};
    use crate::domain::{MeasurementKind, ModelKind};

    #[test]
    fn slope_method_recovers_dark_ideality() {
        let vt = thermal_voltage(298.15);
        let v: Vec<f64> = (0..30).map(|k| 0.1 + k as f64 * 0.01).collect();
        let i: Vec<f64> = v.iter().map(|x| -1e-10 * ((x / (1.3 * vt)).exp() - 1.0)).collect();
        let n = ideality_from_slope(&v, &i, 298.15, false, None).unwrap();
        assert!((n - 1.3).abs() < 0.02, "n={n}");
    }

    #[test]
    fn slope_method_recovers_light_ideality_despite_shunt_and_series_loss() {
        let d = precondition(&generate_curve(&SynthConfig::default()).unwrap()).unwrap();
        let n = ideality_from_slope(&d.voltage, &d.current, d.temperature_k, true, None).unwrap();
        assert!((n - 1.1).abs() < 0.25, "n={n}");
    }

    #[test]
    fn slope_method_rejects_too_few_points() {
        assert!(ideality_from_slope(&[0.1, 0.2, 0.3], &[1e-6, 1e-5, 1e-4], 298.15, false, None).is_none());
    }

    #[test]
    fn recombination_classes() {
        assert_eq!(RecombinationMechanism::classify(1.0), RecombinationMechanism::Radiative);
        assert_eq!(RecombinationMechanism::classify(1.5), RecombinationMechanism::SrhDepletion);
        assert_eq!(RecombinationMechanism::classify(2.0), RecombinationMechanism::SrhDiffusion);
        assert_eq!(RecombinationMechanism::classify(3.0), RecombinationMechanism::ComplexOrBarrier);
        assert_eq!(RecombinationMechanism::classify(0.5), RecombinationMechanism::SubUnityArtifact);
        assert_eq!(RecombinationMechanism::classify(0.0), RecombinationMechanism::Unreliable);
    }

    #[test]
    fn ideal_fill_factor_is_in_typical_range() {
        let ff = ideal_fill_factor(0.55, 1.1, 298.15).unwrap();
        assert!(ff > 0.78 && ff < 0.86, "ff={ff}");
        assert!(ideal_fill_factor(-0.1, 1.0, 298.15).is_none());
    }

    #[test]
    fn initial_guess_lands_near_truth() {
        let m = generate_curve(&SynthConfig::default()).unwrap();
        let data = precondition(&m).unwrap();
        let g = initial_guess(&data, ModelKind::OneDiode, &ParameterBounds::one_diode());
        assert!((g.iph() - 0.030).abs() < 1e-3);
        assert!(g.rsh() > 500.0);
        assert!(g.i0() > 1e-14 && g.i0() < 1e-6);
        assert!((g.n() - 1.1).abs() < 0.25, "n={}", g.n());
    }

    #[test]
    fn dark_guess_has_no_photocurrent() {
        let cfg = SynthConfig {
            params: DiodeParameters::OneDiode {
                iph: 0.0,
                i0: 1e-10,
                n: 1.2,
                rs: 0.5,
                rsh: 5000.0,
            },
            ..SynthConfig::default()
        };
        let m = generate_curve(&cfg).unwrap().with_kind(MeasurementKind::Dark);
        let data = precondition(&m).unwrap();
        let g = initial_guess(&data, ModelKind::OneDiode, &ParameterBounds::one_diode());
        assert_eq!(g.iph(), 0.0);
        assert!(g.i0() > 0.0);
    }

    #[test]
    fn delta_n_is_light_minus_dark() {
        let mk = |n| {
            FittedParameters::from_device(
                DiodeParameters::OneDiode {
                    iph: 0.03,
                    i0: 1e-10,
                    n,
                    rs: 0.5,
                    rsh: 2000.0,
                },
                1.0,
            )
        };
        let c = compare_light_dark(&mk(1.4), &mk(1.1));
        assert!((c.delta_n - 0.3).abs() < 1e-12);
        assert_eq!(c.light_mechanism, RecombinationMechanism::SrhDepletion);
    }
}
