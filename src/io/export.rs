//! Result exports.
//!
//! - sweep CSV: a raw measurement (used for synthetic curves), readable by
//!   the ingest module
//! - fitted-curve CSV: one row per sweep sample, easy to pull into a
//!   spreadsheet or plotting script
//! - result JSON: the full [`Analysis`] in an envelope that records the tool
//!   and when the file was written; `pvfit report` reads it back

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Analysis, FitResult, Measurement};
use crate::error::AppError;

/// Envelope around an exported analysis.
///
/// `generated_at` is file metadata only; it is not part of the result hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFile {
    pub tool: String,
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub analysis: Analysis,
}

impl ResultFile {
    pub fn new(analysis: Analysis) -> Self {
        Self {
            tool: "pvfit".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
            analysis,
        }
    }
}

/// Write a sweep as `Voltage (V),Current (<unit>)`.
pub fn write_sweep_csv(path: &Path, measurement: &Measurement) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create sweep CSV '{}': {e}", path.display())))?;
    let current_header = match measurement.current_unit.scale_to_amps() {
        Some(_) => format!("Current ({})", measurement.current_unit.label()),
        None => "Current".to_string(),
    };
    writer
        .write_record(["Voltage (V)".to_string(), current_header])
        .map_err(|e| AppError::new(2, format!("Failed to write sweep CSV header: {e}")))?;
    for (v, i) in measurement.voltage.iter().zip(&measurement.current) {
        writer
            .write_record([v.to_string(), i.to_string()])
            .map_err(|e| AppError::new(2, format!("Failed to write sweep CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush sweep CSV: {e}")))?;
    Ok(())
}

/// Write measured, modeled and residual current per sample.
pub fn write_curve_csv(path: &Path, fit: &FitResult) -> Result<(), AppError> {
    if fit.modeled_current.is_empty() {
        return Err(AppError::new(
            4,
            format!("No fitted curve to export for '{}' (status {:?})", fit.device_label, fit.status),
        ));
    }
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create curve CSV '{}': {e}", path.display())))?;

    writer
        .write_record(["voltage_v", "current_a", "modeled_a", "residual_a"])
        .map_err(|e| AppError::new(2, format!("Failed to write curve CSV header: {e}")))?;
    for (((v, i), m), r) in fit
        .voltage
        .iter()
        .zip(&fit.current)
        .zip(&fit.modeled_current)
        .zip(&fit.residuals)
    {
        writer
            .write_record([
                format!("{v:.6}"),
                format!("{i:.9e}"),
                format!("{m:.9e}"),
                format!("{r:.6e}"),
            ])
            .map_err(|e| AppError::new(2, format!("Failed to write curve CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush curve CSV: {e}")))?;
    Ok(())
}

pub fn write_result_json(path: &Path, analysis: &Analysis) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create result JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, &ResultFile::new(analysis.clone()))
        .map_err(|e| AppError::new(2, format!("Failed to write result JSON: {e}")))?;
    Ok(())
}

pub fn read_result_json(path: &Path) -> Result<ResultFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open result JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid result JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::analyze;
    use crate::data::{SynthConfig, generate_curve};
    use crate::domain::{ModelConfiguration, ModelKind};

    fn analysis() -> Analysis {
        let m = generate_curve(&SynthConfig {
            points: 31,
            ..SynthConfig::default()
        })
        .unwrap();
        analyze(&m, &ModelConfiguration::exploration(ModelKind::OneDiode).with_stability_trials(0))
    }

    #[test]
    fn result_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        let a = analysis();
        write_result_json(&path, &a).unwrap();
        let back = read_result_json(&path).unwrap();
        assert_eq!(back.tool, "pvfit");
        assert_eq!(back.analysis.fit.hash, a.fit.hash);
        assert_eq!(back.analysis.fit.status, a.fit.status);
    }

    #[test]
    fn curve_csv_has_one_row_per_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curve.csv");
        let a = analysis();
        write_curve_csv(&path, &a.fit).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "voltage_v,current_a,modeled_a,residual_a");
        assert_eq!(lines.len(), a.fit.voltage.len() + 1);
    }

    #[test]
    fn sweep_csv_reads_back_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.csv");
        let m = generate_curve(&SynthConfig::default()).unwrap();
        write_sweep_csv(&path, &m).unwrap();
        let back = crate::io::load_measurement(&crate::io::IngestSpec::new(&path)).unwrap();
        assert_eq!(back.measurement.voltage, m.voltage);
        assert_eq!(back.measurement.current, m.current);
        assert_eq!(back.measurement.current_unit, m.current_unit);
    }

    #[test]
    fn missing_result_file_is_exit_code_2() {
        let err = read_result_json(Path::new("/nonexistent/result.json")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
