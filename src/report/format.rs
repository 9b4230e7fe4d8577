//! Formatted terminal output.
//!
//! Formatting lives in one place so:
//! - the fitting code stays free of presentation concerns
//! - output changes are localized (important for snapshot-style tests)

use crate::domain::{Analysis, DiagnosticReport, FitResult, FitStatus, FittedParameters};
use crate::io::ingest::IngestedCurve;

/// Source file, rows and unit handling of an ingested sweep.
pub fn format_ingest_summary(ingest: &IngestedCurve) -> String {
    let m = &ingest.measurement;
    let mut out = String::new();
    out.push_str(&format!(
        "Input: {} | rows={} used={} | area={} cm² | kind={:?}\n",
        m.device_label,
        ingest.rows_read,
        m.len(),
        m.area_cm2,
        m.kind
    ));
    if let Some(note) = &ingest.unit_note {
        out.push_str(&format!("- {note}\n"));
    }
    for e in ingest.row_errors.iter().take(5) {
        out.push_str(&format!("- skipped line {}: {}\n", e.line, e.message));
    }
    if ingest.row_errors.len() > 5 {
        out.push_str(&format!("- … {} more skipped rows\n", ingest.row_errors.len() - 5));
    }
    out
}

/// Fit summary, metrics and diagnostics of one analysis.
pub fn format_analysis(analysis: &Analysis) -> String {
    let fit = &analysis.fit;
    let mut out = String::new();

    out.push_str("=== pvfit - IV curve fit ===\n");
    out.push_str(&format!(
        "Device: {} | model={} | mode={:?} | T={:.2} K\n",
        fit.device_label,
        fit.model.display_name(),
        fit.mode,
        fit.temperature_k
    ));
    out.push_str(&format!("Status: {}", status_label(fit.status)));
    if let Some(msg) = &fit.message {
        out.push_str(&format!(" ({msg})"));
    }
    out.push('\n');

    if let Some(notes) = &fit.preconditioning {
        for note in &notes.notes {
            out.push_str(&format!("- {note}\n"));
        }
    }

    if let Some(p) = &fit.parameters {
        out.push_str("\nParameters:\n");
        out.push_str(&format_parameters(p));
    } else if let Some(candidate) = &fit.global_candidate {
        out.push_str(&format!("\nGlobal candidate (not refined): {:?}\n", candidate.values()));
    }

    if let Some(m) = &fit.metrics {
        out.push_str("\nMetrics:\n");
        out.push_str(&format!("- Jsc  : {:.3} mA/cm²\n", m.jsc_ma_cm2));
        out.push_str(&format!("- Voc  : {:.4} V\n", m.voc_v));
        out.push_str(&format!("- FF   : {:.4}\n", m.fill_factor));
        out.push_str(&format!("- PCE  : {:.3} % (Pin {} mW/cm²)\n", m.pce_percent, m.pin_mw_cm2));
        out.push_str(&format!("- MPP  : {:.4} V, {:.4e} W\n", m.vmpp_v, m.pmax_w));
    }
    if let Some(s) = &fit.sensitivity {
        out.push_str(&format!("- ∂PCE/∂Rs: {:.4e} %/Ω\n", s.d_pce_d_rs));
    }
    if let Some(r) = &fit.refinement {
        out.push_str(&format!(
            "\nFit: DE {} generations | LM {} iterations ({:?}) | RMSE {:.3e} A\n",
            r.global_generations, r.iterations, r.termination, r.rmse
        ));
    }

    out.push_str(&format_diagnostics(&analysis.diagnostics));
    out.push_str(&format!(
        "\nHash: {}{}\n",
        fit.hash,
        if fit.hash_stable { "" } else { " (exploration, not reproducible)" }
    ));
    out
}

fn format_parameters(p: &FittedParameters) -> String {
    let mut rows = vec![
        ("Jph", format!("{:.4} mA/cm²", p.jph_ma_cm2)),
        ("J0", format!("{:.4e} mA/cm²", p.j0_ma_cm2)),
        ("n", format!("{:.4}", p.n)),
    ];
    if let (Some(j02), Some(n2)) = (p.j02_ma_cm2, p.n2) {
        rows.push(("J02", format!("{j02:.4e} mA/cm²")));
        rows.push(("n2", format!("{n2:.4}")));
    }
    rows.push(("Rs", format!("{:.4} Ω·cm²", p.rs_ohm_cm2)));
    rows.push(("Rsh", format!("{:.4e} Ω·cm²", p.rsh_ohm_cm2)));

    rows.into_iter()
        .map(|(name, value)| format!("- {name:<4} : {value}\n"))
        .collect()
}

fn format_diagnostics(d: &DiagnosticReport) -> String {
    let mut out = String::from("\nDiagnostics:\n");
    if let Some(r) = &d.residuals {
        out.push_str(&format!(
            "- residuals: {} [{}] {} (confidence {:.0}%)\n",
            r.pattern.as_str(),
            r.warning.as_str(),
            r.message,
            r.confidence
        ));
    }
    if let Some(s) = &d.noise_stability {
        out.push_str(&format!(
            "- noise stability: score {:.1} | worst drift {:.2}% | {}/{} trials ok\n",
            s.stability_score,
            s.worst_case_drift * 100.0,
            s.trials - s.failed_trials,
            s.trials
        ));
    }
    if let Some(b) = &d.boundary_stress {
        for hit in &b.hits {
            out.push_str(&format!(
                "- bound: {} = {:.4e} near {:?} bound {:.4e} ({:?})\n",
                hit.parameter, hit.value, hit.direction, hit.bound, hit.severity
            ));
        }
    }
    if let Some(p) = &d.physics {
        out.push_str(&format!("- recombination: {}\n", p.recombination));
        if let Some(n) = p.ideality_from_slope {
            out.push_str(&format!("- slope ideality: {n:.3}\n"));
        }
    }
    out.push_str(&format!(
        "- risk score: {:.1} | validation {}\n",
        d.risk_score,
        if d.validation_passed { "PASSED" } else { "FAILED" }
    ));
    if !d.recommendations.is_empty() {
        out.push_str("\nRecommendations:\n");
        for (k, rec) in d.recommendations.iter().enumerate() {
            out.push_str(&format!("{}. {rec}\n", k + 1));
        }
    }
    out
}

fn status_label(status: FitStatus) -> &'static str {
    match status {
        FitStatus::Valid => "VALID",
        FitStatus::Invalid => "INVALID",
        FitStatus::Failed => "FAILED",
    }
}

/// One line per analysis, for batch output.
pub fn format_one_line(fit: &FitResult) -> String {
    match (&fit.parameters, &fit.metrics) {
        (Some(p), Some(m)) => format!(
            "{} {}: Jsc={:.3} Voc={:.4} FF={:.4} PCE={:.3}% n={:.3} Rs={:.3} Rsh={:.3e}",
            fit.device_label,
            status_label(fit.status),
            m.jsc_ma_cm2,
            m.voc_v,
            m.fill_factor,
            m.pce_percent,
            p.n,
            p.rs_ohm_cm2,
            p.rsh_ohm_cm2
        ),
        (Some(p), None) => format!(
            "{} {}: J0={:.3e} n={:.3} Rs={:.3} Rsh={:.3e}",
            fit.device_label,
            status_label(fit.status),
            p.j0_ma_cm2,
            p.n,
            p.rs_ohm_cm2,
            p.rsh_ohm_cm2
        ),
        _ => format!(
            "{} {}: {}",
            fit.device_label,
            status_label(fit.status),
            fit.message.as_deref().unwrap_or("no parameters")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::analyze;
    use crate::data::{SynthConfig, generate_curve};
    use crate::domain::{Measurement, ModelConfiguration, ModelKind};

    #[test]
    fn valid_summary_lists_metrics_and_hash() {
        let m = generate_curve(&SynthConfig::default()).unwrap();
        let a = analyze(&m, &ModelConfiguration::exploration(ModelKind::OneDiode).with_stability_trials(0));
        let txt = format_analysis(&a);
        assert!(txt.contains("Status: VALID"));
        assert!(txt.contains("Jsc"));
        assert!(txt.contains(&a.fit.hash));
        assert!(format_one_line(&a.fit).contains("PCE="));
    }

    #[test]
    fn invalid_summary_carries_message() {
        let m = Measurement::new("tiny", vec![0.0, 0.1], vec![0.01, 0.0]);
        let a = analyze(&m, &ModelConfiguration::default().with_stability_trials(0));
        let txt = format_analysis(&a);
        assert!(txt.contains("Status: INVALID"));
        assert!(txt.contains("validation FAILED"));
        assert!(!txt.contains("Metrics:"));
    }
}
