//! Aggregate risk score.
//!
//! Component risks (0–100, higher is worse):
//!
//! - residuals: LOW 10, MEDIUM 40, HIGH 70, CRITICAL 90
//! - noise stability: `100 − stability_score`
//! - boundary stress: `min(100, 20·warnings + 40·errors)`
//!
//! The aggregate is the weighted mean over the components that were
//! computed, renormalized so missing components do not count as zero risk.

use crate::domain::{BoundaryStress, RiskWeights, Severity, WarningLevel};

pub fn residual_risk(level: WarningLevel) -> f64 {
    match level {
        WarningLevel::Low => 10.0,
        WarningLevel::Medium => 40.0,
        WarningLevel::High => 70.0,
        WarningLevel::Critical => 90.0,
    }
}

pub fn stability_risk(stability_score: f64) -> f64 {
    (100.0 - stability_score).clamp(0.0, 100.0)
}

pub fn boundary_risk(stress: &BoundaryStress) -> f64 {
    let points: f64 = stress
        .hits
        .iter()
        .map(|h| match h.severity {
            Severity::Warning => 20.0,
            Severity::Error => 40.0,
        })
        .sum();
    points.min(100.0)
}

/// Weighted mean of the available components, or `None` if there are none.
pub fn aggregate_risk(
    residual: Option<f64>,
    stability: Option<f64>,
    boundary: Option<f64>,
    weights: &RiskWeights,
) -> Option<f64> {
    let parts = [
        (residual, weights.residual),
        (stability, weights.stability),
        (boundary, weights.boundary),
    ];
    let (sum, total) = parts
        .iter()
        .filter_map(|(v, w)| v.map(|v| (v, *w)))
        .filter(|(_, w)| *w > 0.0)
        .fold((0.0, 0.0), |(s, t), (v, w)| (s + v * w, t + w));
    (total > 0.0).then(|| (sum / total).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BoundDirection, BoundaryHit};

    #[test]
    fn missing_components_are_renormalized() {
        let w = RiskWeights::default();
        assert_eq!(aggregate_risk(Some(10.0), None, Some(0.0), &w), Some(5.0));
        assert_eq!(aggregate_risk(Some(90.0), None, None, &w), Some(90.0));
        assert_eq!(aggregate_risk(None, None, None, &w), None);
    }

    #[test]
    fn weights_shift_the_mean() {
        let w = RiskWeights {
            residual: 3.0,
            ..RiskWeights::default()
        };
        assert_eq!(aggregate_risk(Some(40.0), Some(0.0), None, &w), Some(30.0));
    }

    #[test]
    fn boundary_risk_caps_at_100() {
        let hit = |severity| BoundaryHit {
            parameter: "n".into(),
            value: 0.0,
            bound: 0.0,
            direction: BoundDirection::Lower,
            distance_percent: 0.0,
            severity,
        };
        let stress = BoundaryStress {
            hits: vec![hit(Severity::Error), hit(Severity::Error), hit(Severity::Warning)],
            recommendations: vec![],
        };
        assert_eq!(boundary_risk(&stress), 100.0);
        assert_eq!(residual_risk(WarningLevel::Medium), 40.0);
        assert_eq!(stability_risk(85.0), 15.0);
    }
}
