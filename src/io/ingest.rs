//! CSV ingest for IV sweeps.
//!
//! Turns a two-column (or wider) CSV export from a source-measure unit into a
//! [`Measurement`].
//!
//! - an optional header row is detected by whether the first record parses
//!   as numbers
//! - columns are found by name (`v`, `volt…` / `i`, `j`, `curr…`), falling
//!   back to the first two columns when there is no header
//! - a unit suffix in the current header (`Current (mA)`, `J [mA/cm2]`) sets
//!   the current unit; a `/cm²` density is multiplied back by the area
//! - unparseable rows are skipped and reported, never fatal on their own
//! - the fingerprint is the SHA-256 of the raw file bytes

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use log::debug;

use crate::determinism::sha256_hex;
use crate::domain::{CurrentUnit, Measurement, MeasurementKind};
use crate::error::AppError;

/// How to interpret a CSV sweep.
#[derive(Debug, Clone)]
pub struct IngestSpec {
    pub path: PathBuf,
    pub area_cm2: f64,
    pub temperature_k: Option<f64>,
    pub kind: MeasurementKind,
    /// Overrides any unit found in the header unless `Auto`.
    pub current_unit: CurrentUnit,
    /// Defaults to the file stem.
    pub label: Option<String>,
}

impl IngestSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            area_cm2: 1.0,
            temperature_k: None,
            kind: MeasurementKind::Illuminated,
            current_unit: CurrentUnit::Auto,
            label: None,
        }
    }
}

/// A row that could not be used.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: the measurement plus bookkeeping for the report.
#[derive(Debug, Clone)]
pub struct IngestedCurve {
    pub measurement: Measurement,
    pub rows_read: usize,
    pub row_errors: Vec<RowError>,
    /// How the current column's unit was resolved, if not plain amps.
    pub unit_note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ColumnUnit {
    unit: CurrentUnit,
    per_cm2: bool,
}

/// Load a sweep from CSV.
pub fn load_measurement(spec: &IngestSpec) -> Result<IngestedCurve, AppError> {
    let bytes = std::fs::read(&spec.path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", spec.path.display())))?;
    if !(spec.area_cm2 > 0.0 && spec.area_cm2.is_finite()) {
        return Err(AppError::new(2, format!("Device area must be positive, got {}", spec.area_cm2)));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(bytes.as_slice());

    let mut records = reader.records().enumerate().peekable();
    let first = match records.peek() {
        Some((_, Ok(r))) => r.clone(),
        Some((_, Err(e))) => return Err(AppError::new(2, format!("Failed to read CSV: {e}"))),
        None => return Err(AppError::new(3, format!("CSV '{}' is empty", spec.path.display()))),
    };

    let has_header = first.iter().any(|f| !f.is_empty() && parse_f64(f).is_none());
    let (v_col, i_col, column_unit) = if has_header {
        records.next();
        resolve_columns(&first)?
    } else {
        (0, 1, None)
    };

    let mut voltage = Vec::new();
    let mut current = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in records {
        let line = idx + 1;
        rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };
        match (field(&record, v_col), field(&record, i_col)) {
            (Some(v), Some(i)) => {
                voltage.push(v);
                current.push(i);
            }
            _ => row_errors.push(RowError {
                line,
                message: format!("expected numbers in columns {} and {}", v_col + 1, i_col + 1),
            }),
        }
    }

    if voltage.is_empty() {
        return Err(AppError::new(
            3,
            format!("No numeric rows in CSV '{}'", spec.path.display()),
        ));
    }

    let mut unit_note = None;
    let unit = match (spec.current_unit, column_unit) {
        (CurrentUnit::Auto, Some(c)) => {
            if c.per_cm2 {
                for i in current.iter_mut() {
                    *i *= spec.area_cm2;
                }
            }
            unit_note = Some(format!(
                "unit: {}{} from header",
                c.unit.label(),
                if c.per_cm2 { "/cm² ×area" } else { "" }
            ));
            c.unit
        }
        (unit, _) => unit,
    };

    let label = spec.label.clone().unwrap_or_else(|| file_label(&spec.path));
    let mut measurement = Measurement::new(label, voltage, current)
        .with_area(spec.area_cm2)
        .with_kind(spec.kind)
        .with_current_unit(unit)
        .with_fingerprint(sha256_hex(&bytes));
    if let Some(t) = spec.temperature_k {
        measurement = measurement.with_temperature(t);
    }

    debug!(
        "ingested {} rows ({} skipped) from {}",
        measurement.len(),
        row_errors.len(),
        spec.path.display()
    );

    Ok(IngestedCurve {
        measurement,
        rows_read,
        row_errors,
        unit_note,
    })
}

fn resolve_columns(headers: &StringRecord) -> Result<(usize, usize, Option<ColumnUnit>), AppError> {
    let parsed: Vec<(String, Option<String>)> = headers.iter().map(split_header).collect();
    let by_name: HashMap<&str, usize> = parsed
        .iter()
        .enumerate()
        .map(|(idx, (name, _))| (name.as_str(), idx))
        .collect();

    let find = |exact: &[&str], prefixes: &[&str]| -> Option<usize> {
        exact
            .iter()
            .find_map(|n| by_name.get(n).copied())
            .or_else(|| {
                parsed
                    .iter()
                    .position(|(name, _)| prefixes.iter().any(|p| name.starts_with(p)))
            })
    };

    let v_col = find(&["v", "u"], &["volt", "bias"])
        .ok_or_else(|| AppError::new(2, "Missing voltage column (expected `V` or `Voltage…`)"))?;
    let i_col = find(&["i", "j"], &["curr", "jsc", "density"])
        .ok_or_else(|| AppError::new(2, "Missing current column (expected `I`, `J` or `Current…`)"))?;
    if v_col == i_col {
        return Err(AppError::new(2, "Voltage and current resolve to the same column"));
    }

    let unit = match &parsed[i_col].1 {
        Some(suffix) => Some(parse_unit_suffix(suffix).ok_or_else(|| {
            AppError::new(2, format!("Unknown current unit `{suffix}` in header"))
        })?),
        None => None,
    };
    Ok((v_col, i_col, unit))
}

/// `"Current (mA)"` -> `("current", Some("mA"))`.
fn split_header(raw: &str) -> (String, Option<String>) {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    let raw = raw.trim().trim_start_matches('\u{feff}');
    let open = raw.find(['(', '[']);
    let close = raw.rfind([')', ']']);
    match (open, close) {
        (Some(o), Some(c)) if c > o => (
            raw[..o].trim().to_lowercase(),
            Some(raw[o + 1..c].trim().to_string()),
        ),
        _ => (raw.to_lowercase(), None),
    }
}

fn parse_unit_suffix(suffix: &str) -> Option<ColumnUnit> {
    let (unit, per) = match suffix.split_once('/') {
        Some((u, p)) => (u, Some(p.trim().to_lowercase())),
        None => (suffix, None),
    };
    let per_cm2 = match per.as_deref() {
        None => false,
        Some(p) if p.starts_with("cm") => true,
        Some(_) => return None,
    };
    Some(ColumnUnit {
        unit: CurrentUnit::from_suffix(unit)?,
        per_cm2,
    })
}

fn field(record: &StringRecord, idx: usize) -> Option<f64> {
    record.get(idx).and_then(parse_f64)
}

fn parse_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

fn file_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "device".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn header_with_unit_suffix() {
        let f = write_csv("Voltage (V),Current (mA)\n0.0,30\n0.1,29.9\nbad,row\n0.2,29.5\n");
        let out = load_measurement(&IngestSpec::new(f.path())).unwrap();
        assert_eq!(out.measurement.voltage, vec![0.0, 0.1, 0.2]);
        assert_eq!(out.measurement.current_unit, CurrentUnit::Milliamps);
        assert_eq!(out.rows_read, 4);
        assert_eq!(out.row_errors.len(), 1);
        assert_eq!(out.row_errors[0].line, 4);
        assert_eq!(out.measurement.fingerprint.len(), 64);
    }

    #[test]
    fn headerless_uses_first_two_columns() {
        let f = write_csv("0.0,0.03\n0.1,0.029\n");
        let out = load_measurement(&IngestSpec::new(f.path())).unwrap();
        assert_eq!(out.measurement.current, vec![0.03, 0.029]);
        assert_eq!(out.measurement.current_unit, CurrentUnit::Auto);
        assert!(out.unit_note.is_none());
    }

    #[test]
    fn density_column_is_scaled_by_area() {
        let f = write_csv("time,V,J [mA/cm2]\n0,0.0,30\n1,0.1,29\n");
        let spec = IngestSpec {
            area_cm2: 0.5,
            ..IngestSpec::new(f.path())
        };
        let out = load_measurement(&spec).unwrap();
        assert_eq!(out.measurement.current, vec![15.0, 14.5]);
        assert_eq!(out.measurement.current_unit, CurrentUnit::Milliamps);
    }

    #[test]
    fn fingerprint_follows_file_bytes() {
        let a = write_csv("V,I\n0.0,0.03\n0.1,0.029\n");
        let b = write_csv("V,I\n0.0,0.03\n0.1,0.0290\n");
        let fa = load_measurement(&IngestSpec::new(a.path())).unwrap().measurement.fingerprint;
        let fb = load_measurement(&IngestSpec::new(b.path())).unwrap().measurement.fingerprint;
        assert_ne!(fa, fb);
    }

    #[test]
    fn missing_current_column_is_exit_code_2() {
        let f = write_csv("V,temperature\n0.0,300\n");
        let err = load_measurement(&IngestSpec::new(f.path())).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
