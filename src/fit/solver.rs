//! Two-stage fit of one preconditioned sweep.
//!
//! 1. Differential Evolution over the whole search box from a purely random
//!    population; the heuristic guess is not injected into it.
//! 2. Levenberg–Marquardt polish, started from the DE best and from the
//!    heuristic guess; the converged start with the lowest SSE wins (ties go
//!    to the DE start).
//!
//! Only a converged refinement produces parameters. Otherwise the DE best is
//! handed back as diagnostic context together with the error.

use log::{info, warn};

use crate::data::Preconditioned;
use crate::determinism::ModeProfile;
use crate::domain::{DiodeParameters, ModelConfiguration};
use crate::error::AnalysisError;
use crate::physics::initial_guess;

use super::evolution::{EvolutionConfig, differential_evolution};
use super::objective::{CurveObjective, SearchSpace};
use super::refine::{RefineConfig, RefineOutcome, levenberg_marquardt};

/// A converged two-stage fit.
#[derive(Debug, Clone)]
pub struct CurveFit {
    pub params: DiodeParameters,
    pub global_candidate: DiodeParameters,
    pub global_energy: f64,
    pub generations: usize,
    pub refinement: RefineOutcome,
    /// Model currents at the sweep voltages.
    pub modeled: Vec<f64>,
}

/// Why a fit produced no parameters.
#[derive(Debug, Clone)]
pub struct FitFailure {
    pub error: AnalysisError,
    pub global_candidate: Option<DiodeParameters>,
}

impl FitFailure {
    fn new(error: AnalysisError, global_candidate: Option<DiodeParameters>) -> Self {
        Self {
            error,
            global_candidate,
        }
    }
}

/// Fit `data` with the model and bounds of `config` under `profile`.
pub fn fit_curve(
    data: &Preconditioned,
    config: &ModelConfiguration,
    profile: &ModeProfile,
    seed: u64,
) -> Result<CurveFit, FitFailure> {
    let space = SearchSpace::new(config.model, data.kind.is_dark(), &config.bounds)
        .map_err(|e| FitFailure::new(e, None))?;
    let objective = CurveObjective::new(&space, data, config.weighting);
    let tol = &profile.tolerances;

    let guess = space.from_params(&initial_guess(data, config.model, &config.bounds));

    let de = differential_evolution(
        &|x: &[f64]| objective.value(x),
        &space.lower(),
        &space.upper(),
        &[],
        &EvolutionConfig {
            popsize: tol.de_popsize,
            max_generations: tol.de_max_generations,
            tol: tol.de_tol,
            mutation: tol.de_mutation,
            recombination: tol.de_recombination,
            seed,
            parallel: tol.parallel,
        },
    );
    let global_candidate = space.to_params(&de.best);

    let lm_config = RefineConfig {
        xtol: tol.lm_xtol,
        ftol: tol.lm_ftol,
        gtol: tol.lm_gtol,
        max_iterations: tol.lm_max_iterations,
    };
    let mut starts = vec![de.best.clone()];
    if guess != de.best {
        starts.push(guess);
    }
    let outcomes: Vec<RefineOutcome> = starts
        .iter()
        .map(|x0| levenberg_marquardt(&objective, x0, &lm_config))
        .collect();

    let best = outcomes
        .iter()
        .filter(|o| o.converged())
        .fold(None, |acc: Option<&RefineOutcome>, o| match acc {
            Some(b) if b.sse <= o.sse => Some(b),
            _ => Some(o),
        });

    let Some(refinement) = best.cloned() else {
        let first = &outcomes[0];
        warn!(
            "refinement did not converge: {:?} after {} iterations",
            first.termination, first.iterations
        );
        return Err(FitFailure::new(
            AnalysisError::Convergence(format!(
                "local refinement stopped without converging ({:?} after {} iterations)",
                first.termination, first.iterations
            )),
            Some(global_candidate),
        ));
    };

    let params = space.to_params(&refinement.x);
    let modeled = objective.modeled(&refinement.x).ok_or_else(|| {
        FitFailure::new(
            AnalysisError::Numerical("fitted model cannot be evaluated on the sweep".to_string()),
            Some(global_candidate),
        )
    })?;

    info!(
        "{} fit: DE {} generations (energy {:.3e}), LM {:?} after {} iterations (sse {:.3e})",
        config.model.display_name(),
        de.generations,
        de.energy,
        refinement.termination,
        refinement.iterations,
        refinement.sse
    );

    Ok(CurveFit {
        params,
        global_candidate,
        global_energy: de.energy,
        generations: de.generations,
        refinement,
        modeled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SynthConfig, generate_curve, precondition};
    use crate::domain::{MeasurementKind, ModelKind};

    #[test]
    fn recovers_noise_free_one_diode_parameters() {
        let truth = SynthConfig::default().params;
        let data = precondition(&generate_curve(&SynthConfig::default()).unwrap()).unwrap();
        let config = ModelConfiguration::exploration(ModelKind::OneDiode);
        let profile = ModeProfile::resolve(&config);
        let fit = fit_curve(&data, &config, &profile, 42).unwrap();
        for (got, want) in fit.params.values().iter().zip(truth.values()) {
            assert!(((got - want) / want).abs() < 1e-3, "got {got}, want {want}");
        }
        assert!(fit.refinement.converged());
        assert_eq!(fit.modeled.len(), data.len());
    }

    #[test]
    fn reference_tolerances_recover_parameters() {
        let truth = SynthConfig::default().params;
        let data = precondition(&generate_curve(&SynthConfig::default()).unwrap()).unwrap();
        let config = ModelConfiguration::reference(ModelKind::OneDiode);
        let fit = fit_curve(&data, &config, &ModeProfile::resolve(&config), 42).unwrap();
        for (got, want) in fit.params.values().iter().zip(truth.values()) {
            assert!(((got - want) / want).abs() < 1e-3, "got {got}, want {want}");
        }
    }

    #[test]
    fn dark_fit_keeps_zero_photocurrent() {
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
        let data = precondition(&m).unwrap();
        let config = ModelConfiguration::exploration(ModelKind::OneDiode);
        let fit = fit_curve(&data, &config, &ModeProfile::resolve(&config), 42).unwrap();
        assert_eq!(fit.params.iph(), 0.0);
        assert!((fit.params.n() - 1.3).abs() < 0.01);
    }

    #[test]
    fn exhausted_budget_keeps_global_candidate() {
        let data = precondition(&generate_curve(&SynthConfig::default()).unwrap()).unwrap();
        let mut config = ModelConfiguration::exploration(ModelKind::OneDiode);
        let mut tol = ModeProfile::tolerances_for(config.mode);
        tol.de_max_generations = 1;
        tol.lm_max_iterations = 1;
        tol.lm_xtol = 0.0;
        tol.lm_ftol = 0.0;
        tol.lm_gtol = 0.0;
        config.tolerances = Some(tol);
        let err = fit_curve(&data, &config, &ModeProfile::resolve(&config), 42).unwrap_err();
        assert!(matches!(err.error, AnalysisError::Convergence(_)));
        assert!(err.global_candidate.is_some());
    }
}
