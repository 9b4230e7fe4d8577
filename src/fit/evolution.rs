//! Differential Evolution global search (`best1bin`).
//!
//! - population of `popsize × dim` members, initialized uniformly inside the
//!   box; caller-supplied seed vectors replace the first members
//! - per generation the mutation factor is dithered in `mutation.0..mutation.1`
//! - mutant `best + F·(x_r1 − x_r2)`, binomial crossover with rate `CR`
//! - coordinates that leave the box are re-drawn uniformly
//! - deferred updating: a whole generation of trials is built and evaluated
//!   before any member is replaced
//! - stop when `std(E) ≤ tol·|mean(E)|` or after `max_generations`
//!
//! Determinism: every random draw comes from one `StdRng` in a fixed order,
//! and trial energies are collected in member order whether they were
//! evaluated on the rayon pool or sequentially. The search itself never
//! declares success or failure; that is the refiner's job.

use log::debug;
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::math::{mean, std_dev};

#[derive(Debug, Clone)]
pub struct EvolutionConfig {
    pub popsize: usize,
    pub max_generations: usize,
    pub tol: f64,
    pub mutation: (f64, f64),
    pub recombination: f64,
    pub seed: u64,
    pub parallel: bool,
}

#[derive(Debug, Clone)]
pub struct EvolutionOutcome {
    pub best: Vec<f64>,
    pub energy: f64,
    pub generations: usize,
    /// True when the population-spread criterion was met.
    pub converged: bool,
    pub evaluations: usize,
}

fn draw(rng: &mut StdRng, lo: f64, hi: f64) -> f64 {
    if hi > lo { rng.gen_range(lo..hi) } else { lo }
}

fn evaluate<F>(objective: &F, members: &[Vec<f64>], parallel: bool) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let sanitize = |e: f64| if e.is_nan() { f64::MAX } else { e };
    if parallel {
        members.par_iter().map(|m| sanitize(objective(m))).collect()
    } else {
        members.iter().map(|m| sanitize(objective(m))).collect()
    }
}

/// Lowest energy; ties go to the lowest index.
fn argmin(energies: &[f64]) -> usize {
    let mut best = 0;
    for (k, e) in energies.iter().enumerate().skip(1) {
        if *e < energies[best] {
            best = k;
        }
    }
    best
}

fn spread_converged(energies: &[f64], tol: f64) -> bool {
    let m = mean(energies);
    let s = std_dev(energies);
    s.is_finite() && m.is_finite() && s <= tol * m.abs()
}

/// Minimize `objective` over the box `[lower, upper]`.
pub fn differential_evolution<F>(
    objective: &F,
    lower: &[f64],
    upper: &[f64],
    seeds: &[Vec<f64>],
    config: &EvolutionConfig,
) -> EvolutionOutcome
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let dim = lower.len();
    let np = (config.popsize * dim).max(5);
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut population: Vec<Vec<f64>> = (0..np)
        .map(|_| (0..dim).map(|k| draw(&mut rng, lower[k], upper[k])).collect())
        .collect();
    for (slot, seed) in population.iter_mut().zip(seeds) {
        *slot = seed
            .iter()
            .enumerate()
            .map(|(k, v)| v.clamp(lower[k], upper[k]))
            .collect();
    }

    let mut energies = evaluate(objective, &population, config.parallel);
    let mut evaluations = np;
    let mut best = argmin(&energies);
    let mut generations = 0;
    let mut converged = spread_converged(&energies, config.tol);

    while !converged && generations < config.max_generations {
        generations += 1;
        let f = draw(&mut rng, config.mutation.0, config.mutation.1);

        let trials: Vec<Vec<f64>> = (0..np)
            .map(|j| {
                let r1 = pick_other(&mut rng, np, &[j]);
                let r2 = pick_other(&mut rng, np, &[j, r1]);
                let jrand = rng.gen_range(0..dim);
                (0..dim)
                    .map(|k| {
                        let cross = rng.r#gen::<f64>() < config.recombination || k == jrand;
                        let v = if cross {
                            population[best][k] + f * (population[r1][k] - population[r2][k])
                        } else {
                            population[j][k]
                        };
                        if v < lower[k] || v > upper[k] || !v.is_finite() {
                            draw(&mut rng, lower[k], upper[k])
                        } else {
                            v
                        }
                    })
                    .collect()
            })
            .collect();

        let trial_energies = evaluate(objective, &trials, config.parallel);
        evaluations += np;

        for (j, (trial, e)) in trials.into_iter().zip(trial_energies).enumerate() {
            if e < energies[j] {
                population[j] = trial;
                energies[j] = e;
            }
        }
        best = argmin(&energies);
        converged = spread_converged(&energies, config.tol);
    }

    debug!(
        "differential evolution: {} generations, best energy {:.3e}, converged={}",
        generations, energies[best], converged
    );

    EvolutionOutcome {
        best: population[best].clone(),
        energy: energies[best],
        generations,
        converged,
        evaluations,
    }
}

/// Uniform index in `0..np` not contained in `exclude`.
fn pick_other(rng: &mut StdRng, np: usize, exclude: &[usize]) -> usize {
    loop {
        let k = rng.gen_range(0..np);
        if !exclude.contains(&k) {
            return k;
        }
    }
}
