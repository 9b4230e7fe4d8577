//! Boundary-stress check.
//!
//! A fitted value within `margin·|bound|` of a limit in the boundary table is
//! a hit: WARNING while still inside, ERROR at or beyond the limit. Hits on
//! particular parameters come with a targeted recommendation.

use crate::domain::{
    BoundDirection, BoundaryHit, BoundaryStress, BoundaryTable, DerivedMetrics, FittedParameters,
    Severity,
};

fn check(name: &str, value: f64, (lower, upper): (f64, f64), margin: f64) -> Option<BoundaryHit> {
    let distance = |bound: f64| {
        if bound != 0.0 {
            ((value - bound) / bound).abs() * 100.0
        } else {
            0.0
        }
    };
    if value <= lower + margin * lower.abs() {
        Some(BoundaryHit {
            parameter: name.to_string(),
            value,
            bound: lower,
            direction: BoundDirection::Lower,
            distance_percent: distance(lower),
            severity: if value <= lower { Severity::Error } else { Severity::Warning },
        })
    } else if value >= upper - margin * upper.abs() {
        Some(BoundaryHit {
            parameter: name.to_string(),
            value,
            bound: upper,
            direction: BoundDirection::Upper,
            distance_percent: distance(upper),
            severity: if value >= upper { Severity::Error } else { Severity::Warning },
        })
    } else {
        None
    }
}

fn recommendation(hit: &BoundaryHit) -> Option<String> {
    match (hit.parameter.as_str(), hit.direction) {
        ("n", BoundDirection::Lower) => Some(format!(
            "Ideality factor below the diode range (n={:.2}). Check for measurement artifacts.",
            hit.value
        )),
        ("n", BoundDirection::Upper) => Some(format!(
            "High ideality factor (n={:.2}). Multiple recombination pathways likely.",
            hit.value
        )),
        ("rsh", BoundDirection::Lower) => Some(format!(
            "Low shunt resistance ({:.1} Ω·cm²). Check for shunts or degradation.",
            hit.value
        )),
        ("rs", BoundDirection::Upper) => Some(format!(
            "High series resistance ({:.1} Ω·cm²). Check contacts and grid design.",
            hit.value
        )),
        ("ff", BoundDirection::Upper) => Some(format!(
            "Fill factor {:.3} close to the ideal limit. Verify device area and illumination.",
            hit.value
        )),
        _ => None,
    }
}

/// Compare fitted values with the boundary table.
pub fn boundary_stress(
    params: &FittedParameters,
    metrics: Option<&DerivedMetrics>,
    table: &BoundaryTable,
    margin: f64,
) -> BoundaryStress {
    let mut candidates = vec![
        ("n", params.n, table.n),
        ("rs", params.rs_ohm_cm2, table.rs_ohm_cm2),
        ("rsh", params.rsh_ohm_cm2, table.rsh_ohm_cm2),
    ];
    if let Some(m) = metrics {
        candidates.push(("ff", m.fill_factor, table.fill_factor));
    }

    let hits: Vec<BoundaryHit> = candidates
        .into_iter()
        .filter_map(|(name, value, bounds)| check(name, value, bounds, margin))
        .collect();
    let mut recommendations = Vec::new();
    if !hits.is_empty() {
        let names: Vec<&str> = hits.iter().map(|h| h.parameter.as_str()).collect();
        recommendations.push(format!(
            "Parameters hitting bounds: {}. Consider relaxing bounds or collecting higher-quality data.",
            names.join(", ")
        ));
    }
    recommendations.extend(hits.iter().filter_map(recommendation));

    BoundaryStress {
        hits,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DiodeParameters;

    fn params(n: f64, rs: f64, rsh: f64) -> FittedParameters {
        FittedParameters::from_device(
            DiodeParameters::OneDiode {
                iph: 0.03,
                i0: 1e-10,
                n,
                rs,
                rsh,
            },
            1.0,
        )
    }

    #[test]
    fn typical_cell_has_no_hits() {
        let s = boundary_stress(&params(1.1, 0.5, 2000.0), None, &BoundaryTable::default(), 0.1);
        assert!(s.hits.is_empty());
        assert!(s.recommendations.is_empty());
    }

    #[test]
    fn near_and_beyond_limits() {
        let s = boundary_stress(&params(2.4, 0.5, 5.0), None, &BoundaryTable::default(), 0.1);
        assert_eq!(s.hits.len(), 1);
        let n_hit = &s.hits[0];
        assert_eq!(n_hit.parameter, "n");
        assert_eq!(n_hit.direction, BoundDirection::Upper);
        assert_eq!(n_hit.severity, Severity::Warning);
        assert!((n_hit.distance_percent - 4.0).abs() < 1e-9);

        let s = boundary_stress(&params(1.1, 0.5, 1.0), None, &BoundaryTable::default(), 0.1);
        assert_eq!(s.hits[0].parameter, "rsh");
        assert_eq!(s.hits[0].severity, Severity::Error);
        assert_eq!(s.recommendations.len(), 2);
        assert!(s.recommendations[0].contains("rsh"));
    }

    #[test]
    fn zero_series_resistance_is_an_error_hit() {
        let s = boundary_stress(&params(1.1, 0.0, 2000.0), None, &BoundaryTable::default(), 0.1);
        assert_eq!(s.hits.len(), 1);
        assert_eq!(s.hits[0].severity, Severity::Error);
        assert_eq!(s.hits[0].distance_percent, 0.0);
    }
}
