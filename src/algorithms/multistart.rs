//! Independent chains run in parallel

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::algorithms::metropolis::{FormulationOptimizer, OptimizationRun};
use crate::error::FormulationError;
use crate::routines::evaluation::{Objective, Surrogate};
use crate::structs::formulation::Formulation;

/// Run `n_chains` independent chains of `n_iterations` each
///
/// Chain `k` draws from a generator seeded with `seed + k`, so the first chain reproduces [FormulationOptimizer::optimize].
/// Runs are returned in chain order. All chains share the stop signal of the optimizer.
pub fn run<S, O>(
    optimizer: &FormulationOptimizer<S, O>,
    n_chains: usize,
    initial: Option<Formulation>,
    n_iterations: usize,
    burn_in: usize,
) -> Result<Vec<OptimizationRun>, FormulationError>
where
    S: Surrogate + Sync,
    O: Objective + Sync,
{
    tracing::info!(
        "Running {} chains of {} iterations",
        n_chains,
        n_iterations
    );
    (0..n_chains)
        .into_par_iter()
        .map(|k| {
            let mut rng = StdRng::seed_from_u64(optimizer.seed().wrapping_add(k as u64));
            optimizer.optimize_with_rng(initial.clone(), n_iterations, burn_in, &mut rng)
        })
        .collect()
}

/// The run with the lowest best objective, the first one on ties
pub fn best_run(runs: &[OptimizationRun]) -> Option<&OptimizationRun> {
    runs.iter().reduce(|best, run| {
        if run.result.best_objective < best.result.best_objective {
            run
        } else {
            best
        }
    })
}
