//! Figures of merit from a fitted light curve.
//!
//! - Jsc: `|I(V=0)|` from the fitted model when one is supplied (reference
//!   mode), otherwise by linear interpolation between the bracketing samples
//! - Voc: first `I = 0` crossing, linearly interpolated
//! - MPP: natural cubic spline of `P = V·I` over the power quadrant
//!   (`V > 0`, `P > 0`); the maximum is searched over knots and interior
//!   critical points, so it never leaves the quadrant
//! - `FF = Pmax/(Voc·Isc)`, `PCE = Pmax/(A·Pin)·100`
//!
//! Currents are in amps and generator-referenced; densities are reported in
//! mA/cm².

use crate::domain::{DerivedMetrics, DiodeParameters, MppSensitivity, ParameterSensitivity};
use crate::error::AnalysisError;
use crate::math::NaturalCubicSpline;
use crate::models::DiodeModel;

/// Extract light metrics from a sweep.
pub fn extract_metrics(
    voltage: &[f64],
    current: &[f64],
    area_cm2: f64,
    pin_mw_cm2: f64,
    fitted: Option<&DiodeModel>,
) -> Result<DerivedMetrics, AnalysisError> {
    let implausible = |msg: &str| AnalysisError::PhysicalImplausibility(msg.to_string());

    let isc = fitted
        .and_then(|m| m.current(0.0))
        .or_else(|| interpolate_at(voltage, current, 0.0))
        .map(f64::abs)
        .ok_or_else(|| implausible("short-circuit current undefined (sweep does not cover 0 V)"))?;

    let voc = open_circuit_voltage(voltage, current)
        .ok_or_else(|| implausible("curve does not cross I = 0; open-circuit voltage undefined"))?
        .abs();

    let (vmpp, pmax) = maximum_power_point(voltage, current)
        .ok_or_else(|| implausible("no samples in the power-producing quadrant"))?;

    if !(isc > 0.0 && isc.is_finite()) {
        return Err(implausible("short-circuit current is not positive"));
    }
    if !(voc > 0.0 && voc.is_finite()) {
        return Err(implausible("open-circuit voltage is not positive"));
    }

    let fill_factor = pmax / (voc * isc);
    let pce_percent = pmax / (area_cm2 * pin_mw_cm2 * 1e-3) * 100.0;

    Ok(DerivedMetrics {
        jsc_ma_cm2: isc * 1000.0 / area_cm2,
        voc_v: voc,
        fill_factor,
        pce_percent,
        pmax_w: pmax,
        vmpp_v: vmpp,
        impp_a: pmax / vmpp,
        pin_mw_cm2,
    })
}

/// Linear interpolation of `y` at `x0` between bracketing samples.
pub fn interpolate_at(x: &[f64], y: &[f64], x0: f64) -> Option<f64> {
    x.windows(2).zip(y.windows(2)).find_map(|(xw, yw)| {
        (xw[0] <= x0 && x0 <= xw[1]).then(|| yw[0] + (yw[1] - yw[0]) * (x0 - xw[0]) / (xw[1] - xw[0]))
    })
}

/// Voltage of the first positive → non-positive current crossing.
pub fn open_circuit_voltage(voltage: &[f64], current: &[f64]) -> Option<f64> {
    voltage.windows(2).zip(current.windows(2)).find_map(|(v, i)| {
        (i[0] > 0.0 && i[1] <= 0.0).then(|| v[0] + (v[1] - v[0]) * i[0] / (i[0] - i[1]))
    })
}

/// `(Vmpp, Pmax)` restricted to the power-producing quadrant.
pub fn maximum_power_point(voltage: &[f64], current: &[f64]) -> Option<(f64, f64)> {
    let (v, p): (Vec<f64>, Vec<f64>) = voltage
        .iter()
        .zip(current)
        .map(|(v, i)| (*v, v * i))
        .filter(|(v, p)| *v > 0.0 && *p > 0.0)
        .unzip();

    let best_sample = v
        .iter()
        .zip(&p)
        .fold(None, |acc: Option<(f64, f64)>, (v, p)| match acc {
            Some((_, bp)) if bp >= *p => acc,
            _ => Some((*v, *p)),
        })?;
    if v.len() < 3 {
        return Some(best_sample);
    }

    let spline = NaturalCubicSpline::new(&v, &p)?;
    let (vm, pm) = spline.maximum();
    if vm > 0.0 && pm.is_finite() && pm >= best_sample.1 {
        Some((vm, pm))
    } else {
        Some(best_sample)
    }
}

/// Sensitivity of the fitted curve at the maximum-power voltage.
///
/// `∂PCE/∂Rs` uses the envelope theorem: at the MPP, `dPmax/dRs` equals the
/// partial derivative at fixed `Vmpp`, i.e. `Vmpp·∂I/∂Rs`.
pub fn mpp_sensitivity(model: &DiodeModel, metrics: &DerivedMetrics, area_cm2: f64) -> Option<MppSensitivity> {
    let v = metrics.vmpp_v;
    let i = model.current(v)?;
    let sens = model.sensitivities(v, i)?;
    let names = DiodeParameters::names(model.params().kind());

    let rs_index = names.iter().position(|n| *n == "rs")?;
    let d_pce_d_rs = v * sens[rs_index] / (area_cm2 * metrics.pin_mw_cm2 * 1e-3) * 100.0;

    Some(MppSensitivity {
        voltage_v: v,
        d_current: names
            .iter()
            .zip(&sens)
            .map(|(n, d)| ParameterSensitivity {
                parameter: (*n).to_string(),
                d_current: *d,
            })
            .collect(),
        d_pce_d_rs,
    })
}
