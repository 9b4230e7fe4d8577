//! Search-space layout and the least-squares objective.
//!
//! The optimizers work on a plain `&[f64]` search vector. This module owns the
//! mapping between that vector and [`DiodeParameters`]:
//!
//! - saturation currents and `Rsh` live in log10 space (they span many
//!   decades), everything else is linear
//! - dark measurements fix `Iph = 0` and drop it from the vector
//!
//! The objective is the (optionally weighted) sum of squared residuals
//! `r_i = sqrt(w_i)·(I_model(V_i) − I_meas(V_i))`. A model that cannot be
//! evaluated gets a large finite penalty, never NaN.

use nalgebra::{DMatrix, DVector};

use crate::data::Preconditioned;
use crate::domain::{DiodeParameters, ModelKind, ObjectiveWeighting, ParameterBounds};
use crate::error::AnalysisError;
use crate::math::median;
use crate::models::DiodeModel;

use super::refine::LeastSquaresProblem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Linear,
    Log10,
}

/// One coordinate of the search vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub name: &'static str,
    /// Index into the canonical physical parameter order.
    pub physical: usize,
    pub scale: Scale,
    /// Bounds in search space (log10 already applied).
    pub lower: f64,
    pub upper: f64,
}

/// Mapping between search vectors and physical parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSpace {
    model: ModelKind,
    fixed_iph: Option<f64>,
    coords: Vec<Coordinate>,
}

impl SearchSpace {
    /// Build the layout for a model; `dark` fixes the photocurrent at zero.
    pub fn new(model: ModelKind, dark: bool, bounds: &ParameterBounds) -> Result<Self, AnalysisError> {
        let linear = |name, physical, (lo, hi): (f64, f64)| Coordinate {
            name,
            physical,
            scale: Scale::Linear,
            lower: lo,
            upper: hi,
        };
        let log = |name, physical, (lo, hi): (f64, f64)| Coordinate {
            name,
            physical,
            scale: Scale::Log10,
            lower: lo.log10(),
            upper: hi.log10(),
        };

        let mut coords = Vec::with_capacity(model.param_count());
        if !dark {
            coords.push(linear("iph", 0, bounds.iph));
        }
        match model {
            ModelKind::OneDiode => {
                coords.push(log("i0", 1, bounds.i0));
                coords.push(linear("n", 2, bounds.n));
                coords.push(linear("rs", 3, bounds.rs));
                coords.push(log("rsh", 4, bounds.rsh));
            }
            ModelKind::TwoDiode => {
                coords.push(log("i01", 1, bounds.i0));
                coords.push(linear("n1", 2, bounds.n));
                coords.push(log("i02", 3, bounds.i02));
                coords.push(linear("n2", 4, bounds.n2));
                coords.push(linear("rs", 5, bounds.rs));
                coords.push(log("rsh", 6, bounds.rsh));
            }
        }

        for c in &coords {
            if !(c.lower.is_finite() && c.upper.is_finite() && c.lower < c.upper) {
                return Err(AnalysisError::Validation(format!(
                    "invalid search bounds for {}",
                    c.name
                )));
            }
        }

        Ok(Self {
            model,
            fixed_iph: dark.then_some(0.0),
            coords,
        })
    }

    pub fn dim(&self) -> usize {
        self.coords.len()
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coords
    }

    pub fn lower(&self) -> Vec<f64> {
        self.coords.iter().map(|c| c.lower).collect()
    }

    pub fn upper(&self) -> Vec<f64> {
        self.coords.iter().map(|c| c.upper).collect()
    }

    /// Clamp a search vector into the bounds in place.
    pub fn project(&self, x: &mut [f64]) {
        for (v, c) in x.iter_mut().zip(&self.coords) {
            *v = v.clamp(c.lower, c.upper);
        }
    }

    /// Physical parameters for a search vector.
    pub fn to_params(&self, x: &[f64]) -> DiodeParameters {
        let mut p = vec![self.fixed_iph.unwrap_or(0.0); self.model.param_count()];
        for (v, c) in x.iter().zip(&self.coords) {
            p[c.physical] = match c.scale {
                Scale::Linear => *v,
                Scale::Log10 => 10f64.powf(*v),
            };
        }
        params_from_values(self.model, &p)
    }

    /// Search vector for physical parameters, clipped into the bounds.
    pub fn from_params(&self, params: &DiodeParameters) -> Vec<f64> {
        let values = params.values();
        let mut x: Vec<f64> = self
            .coords
            .iter()
            .map(|c| {
                let v = values.get(c.physical).copied().unwrap_or(0.0);
                match c.scale {
                    Scale::Linear => v,
                    // Zero or negative values land on the lower bound.
                    Scale::Log10 if v > 0.0 => v.log10(),
                    Scale::Log10 => c.lower,
                }
            })
            .collect();
        self.project(&mut x);
        x
    }

    /// `∂p_phys/∂x` for each coordinate (chain rule through log10).
    pub fn chain_factors(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(&self.coords)
            .map(|(v, c)| match c.scale {
                Scale::Linear => 1.0,
                Scale::Log10 => 10f64.powf(*v) * std::f64::consts::LN_10,
            })
            .collect()
    }
}

/// Rebuild a tagged parameter set from canonical-order values.
pub fn params_from_values(model: ModelKind, p: &[f64]) -> DiodeParameters {
    match model {
        ModelKind::OneDiode => DiodeParameters::OneDiode {
            iph: p[0],
            i0: p[1],
            n: p[2],
            rs: p[3],
            rsh: p[4],
        },
        ModelKind::TwoDiode => DiodeParameters::TwoDiode {
            iph: p[0],
            i01: p[1],
            n1: p[2],
            i02: p[3],
            n2: p[4],
            rs: p[5],
            rsh: p[6],
        },
    }
}

/// Per-sample weights (mean one).
pub fn observation_weights(weighting: ObjectiveWeighting, voltage: &[f64], current: &[f64]) -> Vec<f64> {
    let n = voltage.len();
    match weighting {
        ObjectiveWeighting::Uniform => vec![1.0; n],
        ObjectiveWeighting::KneeDeemphasis => {
            if n < 3 {
                return vec![1.0; n];
            }
            let slopes: Vec<f64> = (0..n)
                .map(|k| {
                    let (a, b) = (k.saturating_sub(1), (k + 1).min(n - 1));
                    ((current[b] - current[a]) / (voltage[b] - voltage[a])).abs()
                })
                .collect();
            let typical = median(&slopes).unwrap_or(0.0);
            if !(typical > 0.0) {
                return vec![1.0; n];
            }
            let raw: Vec<f64> = slopes.iter().map(|s| 1.0 / (1.0 + s / typical)).collect();
            let mean = raw.iter().sum::<f64>() / n as f64;
            raw.iter().map(|w| w / mean).collect()
        }
    }
}

/// Least-squares objective over a preconditioned sweep.
#[derive(Debug, Clone)]
pub struct CurveObjective<'a> {
    space: &'a SearchSpace,
    voltage: &'a [f64],
    current: &'a [f64],
    sqrt_w: Vec<f64>,
    temperature_k: f64,
    penalty: f64,
}

impl<'a> CurveObjective<'a> {
    pub fn new(space: &'a SearchSpace, data: &'a Preconditioned, weighting: ObjectiveWeighting) -> Self {
        let w = observation_weights(weighting, &data.voltage, &data.current);
        let scale: f64 = data
            .current
            .iter()
            .zip(&w)
            .map(|(i, w)| w * i * i)
            .sum();
        Self {
            space,
            voltage: &data.voltage,
            current: &data.current,
            sqrt_w: w.iter().map(|w| w.sqrt()).collect(),
            temperature_k: data.temperature_k,
            penalty: 1e6 * (scale + 1.0),
        }
    }

    pub fn model_at(&self, x: &[f64]) -> DiodeModel {
        DiodeModel::new(self.space.to_params(x), self.temperature_k)
    }

    /// Modeled currents, or `None` if any sample cannot be evaluated.
    pub fn modeled(&self, x: &[f64]) -> Option<Vec<f64>> {
        self.model_at(x).curve(self.voltage)
    }

    fn weighted_residuals(&self, modeled: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            modeled.len(),
            modeled
                .iter()
                .zip(self.current)
                .zip(&self.sqrt_w)
                .map(|((m, y), sw)| sw * (m - y)),
        )
    }

    /// Objective value; non-finite evaluations map to the penalty.
    pub fn value(&self, x: &[f64]) -> f64 {
        match self.modeled(x) {
            Some(m) => {
                let s = self.weighted_residuals(&m).norm_squared();
                if s.is_finite() { s } else { self.penalty }
            }
            None => self.penalty,
        }
    }

    /// SSE level at which a fit counts as exact (rounding floor of the solver).
    pub fn exact_floor(&self) -> f64 {
        let peak = self.current.iter().fold(0.0_f64, |a, i| a.max(i.abs()));
        self.current.len() as f64 * (1e-12 * peak).powi(2)
    }
}

impl LeastSquaresProblem for CurveObjective<'_> {
    fn residuals(&self, x: &[f64]) -> Option<DVector<f64>> {
        let m = self.modeled(x)?;
        let r = self.weighted_residuals(&m);
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn jacobian(&self, x: &[f64]) -> Option<DMatrix<f64>> {
        let model = self.model_at(x);
        let modeled = model.curve(self.voltage)?;
        let chain = self.space.chain_factors(x);
        let coords = self.space.coordinates();

        let mut j = DMatrix::<f64>::zeros(self.voltage.len(), coords.len());
        for (row, (&v, &i)) in self.voltage.iter().zip(&modeled).enumerate() {
            let sens = model.sensitivities(v, i)?;
            for (col, c) in coords.iter().enumerate() {
                j[(row, col)] = self.sqrt_w[row] * sens[c.physical] * chain[col];
            }
        }
        j.iter().all(|v| v.is_finite()).then_some(j)
    }

    fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
        (self.space.lower(), self.space.upper())
    }

    fn exact_floor(&self) -> f64 {
        CurveObjective::exact_floor(self)
    }
}
