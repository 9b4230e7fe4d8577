//! Validation and normalization of raw IV sweeps.
//!
//! Output invariants:
//!
//! - voltage strictly increasing, in volts
//! - current in amps, generator-referenced (photocurrent positive, so the
//!   power-producing quadrant has `P = V·I > 0`)
//! - at least [`MIN_POINTS`] samples, all finite
//!
//! The input [`Measurement`] is only borrowed; everything we change is
//! recorded in [`PreconditionNotes`].

use log::{debug, info};

use crate::domain::{CurrentUnit, Measurement, MeasurementKind, PreconditionNotes};
use crate::error::AnalysisError;
use crate::math::median;

/// Minimum number of samples (after deduplication) we are willing to fit.
pub const MIN_POINTS: usize = 5;

/// A validated sweep ready for fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct Preconditioned {
    pub voltage: Vec<f64>,
    pub current: Vec<f64>,
    pub area_cm2: f64,
    pub temperature_k: f64,
    pub kind: MeasurementKind,
    pub notes: PreconditionNotes,
}

impl Preconditioned {
    pub fn len(&self) -> usize {
        self.voltage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltage.is_empty()
    }

    /// Same sweep with a different current vector (noise trials).
    pub fn with_current(&self, current: Vec<f64>) -> Self {
        Self {
            current,
            ..self.clone()
        }
    }
}

/// Validate and normalize a measurement.
pub fn precondition(m: &Measurement) -> Result<Preconditioned, AnalysisError> {
    if m.voltage.len() != m.current.len() {
        return Err(AnalysisError::Validation(format!(
            "voltage and current lengths differ ({} vs {})",
            m.voltage.len(),
            m.current.len()
        )));
    }
    if m.voltage.len() < MIN_POINTS {
        return Err(AnalysisError::Validation(format!(
            "need at least {MIN_POINTS} points, got {}",
            m.voltage.len()
        )));
    }
    if let Some(idx) = m
        .voltage
        .iter()
        .zip(&m.current)
        .position(|(v, i)| !(v.is_finite() && i.is_finite()))
    {
        return Err(AnalysisError::Validation(format!(
            "non-finite sample at index {idx}"
        )));
    }
    if !(m.area_cm2.is_finite() && m.area_cm2 > 0.0) {
        return Err(AnalysisError::Validation(format!(
            "device area must be positive, got {}",
            m.area_cm2
        )));
    }
    let temperature_k = m.temperature_or_default();
    if !(temperature_k.is_finite() && temperature_k > 0.0) {
        return Err(AnalysisError::Validation(format!(
            "temperature must be positive kelvin, got {temperature_k}"
        )));
    }

    let mut notes = PreconditionNotes::default();
    let mut voltage = m.voltage.clone();
    let mut current = m.current.clone();

    // Descending sweeps are common on source-measure units.
    if voltage[voltage.len() - 1] < voltage[0] {
        voltage.reverse();
        current.reverse();
        notes.reversed = true;
        notes.notes.push("sweep reversed to ascending voltage".to_string());
    }

    let (voltage, current, merged) = merge_duplicate_voltages(&voltage, &current);
    if merged > 0 {
        notes.duplicates_merged = merged;
        notes
            .notes
            .push(format!("{merged} duplicate voltage samples averaged"));
    }
    if voltage.windows(2).any(|w| !(w[1] > w[0])) {
        return Err(AnalysisError::Validation(
            "voltage sweep is not monotonic".to_string(),
        ));
    }
    if voltage.len() < MIN_POINTS {
        return Err(AnalysisError::Validation(format!(
            "need at least {MIN_POINTS} distinct voltages, got {}",
            voltage.len()
        )));
    }

    let (scale, inferred) = resolve_current_scale(m.current_unit, &current, m.area_cm2);
    notes.current_scale = scale;
    notes.unit_inferred = inferred;
    if inferred {
        notes.notes.push(format!(
            "current unit inferred as {}",
            unit_for_scale(scale).label()
        ));
    }
    let mut current: Vec<f64> = current.iter().map(|i| i * scale).collect();

    if needs_sign_flip(m.kind, &voltage, &current) {
        current.iter_mut().for_each(|i| *i = -*i);
        notes.sign_flipped = true;
        notes
            .notes
            .push("current sign flipped to generator convention".to_string());
    }

    for note in &notes.notes {
        info!("precondition {}: {}", m.device_label, note);
    }
    debug!(
        "precondition {}: {} samples, V in [{:.4}, {:.4}]",
        m.device_label,
        voltage.len(),
        voltage[0],
        voltage[voltage.len() - 1]
    );

    Ok(Preconditioned {
        voltage,
        current,
        area_cm2: m.area_cm2,
        temperature_k,
        kind: m.kind,
        notes,
    })
}

/// Average runs of identical consecutive voltages.
///
/// Returns the merged arrays and the number of samples removed.
fn merge_duplicate_voltages(voltage: &[f64], current: &[f64]) -> (Vec<f64>, Vec<f64>, usize) {
    let mut v_out = Vec::with_capacity(voltage.len());
    let mut i_out = Vec::with_capacity(current.len());
    let mut k = 0;
    while k < voltage.len() {
        let v = voltage[k];
        let mut sum = current[k];
        let mut count = 1usize;
        while k + count < voltage.len() && voltage[k + count] == v {
            sum += current[k + count];
            count += 1;
        }
        v_out.push(v);
        i_out.push(sum / count as f64);
        k += count;
    }
    let merged = voltage.len() - v_out.len();
    (v_out, i_out, merged)
}

/// Scale factor to amps and whether it was inferred.
fn resolve_current_scale(unit: CurrentUnit, current: &[f64], area_cm2: f64) -> (f64, bool) {
    if let Some(scale) = unit.scale_to_amps() {
        return (scale, false);
    }
    let peak = current.iter().fold(0.0_f64, |acc, i| acc.max(i.abs())) / area_cm2;
    let scale = if peak <= 1.0 {
        1.0
    } else if peak <= 1000.0 {
        1e-3
    } else {
        1e-6
    };
    (scale, true)
}

fn unit_for_scale(scale: f64) -> CurrentUnit {
    if scale == 1.0 {
        CurrentUnit::Amps
    } else if scale == 1e-3 {
        CurrentUnit::Milliamps
    } else {
        CurrentUnit::Microamps
    }
}

/// Detect sink-referenced data.
fn needs_sign_flip(kind: MeasurementKind, voltage: &[f64], current: &[f64]) -> bool {
    match kind {
        MeasurementKind::Illuminated | MeasurementKind::SunsVoc => {
            let v_max = voltage.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let window: Vec<f64> = voltage
                .iter()
                .zip(current)
                .filter(|(v, _)| **v > 0.0 && **v < 0.9 * v_max)
                .map(|(_, i)| *i)
                .collect();
            median(&window).is_some_and(|m| m < 0.0)
        }
        MeasurementKind::Dark => {
            // Forward-biased dark current is negative in generator convention.
            let forward: Vec<f64> = voltage
                .iter()
                .zip(current)
                .filter(|(v, _)| **v > 0.0)
                .map(|(_, i)| *i)
                .collect();
            median(&forward).is_some_and(|m| m > 0.0)
        }
    }
}
