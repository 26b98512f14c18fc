//! # Metropolis-Hastings formulation optimizer
//!
//! A single Markov chain over the bounded simplex searching for the formulation with the lowest cost.
//!
//! Every iteration draws a proposal from the [ProposalEngine]. Proposals violating the bounds are rejected
//! without calling the surrogate model. Feasible proposals are evaluated and accepted with probability
//! `min(1, exp(-Δ / T))`, where `Δ` is the change in cost and `T` the (constant) temperature.
//! The chain records the state after every decision, rejected or not.
//!
//! Runs never share state: each call returns its own [OptimizationRun].

use std::collections::BTreeMap;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_derive::Serialize;

use crate::algorithms::{Status, StopSignal};
use crate::error::FormulationError;
use crate::routines::evaluation::{evaluate, Evaluation, Objective, Surrogate};
use crate::routines::initialization::Seeding;
use crate::routines::proposal::{Move, ProposalEngine};
use crate::routines::settings::Settings;
use crate::structs::bounds::BoundsTable;
use crate::structs::chain::{Chain, Transition};
use crate::structs::formulation::Formulation;

/// Number of iterations between progress reports
const PROGRESS_INTERVAL: usize = 1000;
/// Upper limit on the number of chain entries allocated up front
const MAX_PREALLOCATION: usize = 100_000;
/// Seed used when none is configured
pub const DEFAULT_SEED: u64 = 347;

/// Probability of accepting a change in cost of `delta` at `temperature`
///
/// Improvements are always accepted. An undefined change, which arises when both costs are infinite, is never accepted.
pub fn acceptance_probability(delta: f64, temperature: f64) -> f64 {
    if delta.is_nan() {
        return 0.0;
    }
    if delta <= 0.0 {
        return 1.0;
    }
    (-delta / temperature).exp().min(1.0)
}

/// Best point of a run and summary statistics
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub best_formulation: Formulation,
    pub best_objective: f64,
    pub best_predictions: Option<Vec<f64>>,
    /// Accepted proposals divided by the number of completed iterations
    pub acceptance_rate: f64,
    pub iterations: usize,
    pub status: Status,
}

/// Counters for a single move type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MoveStats {
    pub proposed: usize,
    pub constraint_rejected: usize,
    pub accepted: usize,
}

impl MoveStats {
    pub fn acceptance_rate(&self) -> f64 {
        if self.proposed == 0 {
            0.0
        } else {
            self.accepted as f64 / self.proposed as f64
        }
    }
}

/// Per-run bookkeeping used to judge the behaviour of the chain
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub moves: BTreeMap<Move, MoveStats>,
    pub evaluation_failures: usize,
    pub elapsed_seconds: f64,
}

impl Diagnostics {
    /// Fraction of proposals rejected for violating the bounds
    pub fn constraint_rejection_rate(&self) -> f64 {
        let (proposed, rejected) = self.moves.values().fold((0, 0), |(p, r), stats| {
            (p + stats.proposed, r + stats.constraint_rejected)
        });
        if proposed == 0 {
            0.0
        } else {
            rejected as f64 / proposed as f64
        }
    }
}

/// Everything produced by a single run
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationRun {
    pub result: OptimizationResult,
    pub chain: Chain,
    pub diagnostics: Diagnostics,
    /// The temperature of the run
    pub temperature: f64,
    /// Burn-in requested by the caller
    ///
    /// The chain is not trimmed, use [Chain::after_burn_in] to discard the prefix.
    pub burn_in: usize,
}

/// Metropolis-Hastings search for the formulation minimizing `objective(surrogate(x))`
#[derive(Debug, Clone)]
pub struct FormulationOptimizer<S, O> {
    bounds: BoundsTable,
    engine: ProposalEngine,
    surrogate: S,
    objective: O,
    temperature: f64,
    seed: u64,
    seeding: Seeding,
    collect_predictions: bool,
    stop: StopSignal,
}

impl<S: Surrogate, O: Objective> FormulationOptimizer<S, O> {
    /// Create an optimizer using every proposal move
    ///
    /// Fails if the temperature is not positive or if no valid formulation exists within `bounds`.
    pub fn new(
        bounds: BoundsTable,
        surrogate: S,
        objective: O,
        temperature: f64,
    ) -> Result<Self, FormulationError> {
        validate_temperature(temperature)?;
        bounds.check_feasible()?;
        Ok(FormulationOptimizer {
            engine: ProposalEngine::new(bounds.clone()),
            bounds,
            surrogate,
            objective,
            temperature,
            seed: DEFAULT_SEED,
            seeding: Seeding::default(),
            collect_predictions: true,
            stop: StopSignal::default(),
        })
    }

    /// Create an optimizer from the configuration file
    pub fn from_settings(
        settings: &Settings,
        surrogate: S,
        objective: O,
    ) -> Result<Self, FormulationError> {
        let optimizer = FormulationOptimizer::new(
            settings.bounds_table()?,
            surrogate,
            objective,
            settings.config.temperature,
        )?
        .with_moves(&settings.proposal.moves)?
        .with_dirichlet(settings.proposal.locality_factor, settings.proposal.epsilon)
        .with_seed(settings.config.seed)
        .with_seeding(settings.config.seeding.clone())
        .with_predictions(settings.config.collect_predictions);

        let stop = match &settings.config.stop_file {
            Some(path) => StopSignal::new().with_file(path),
            None => StopSignal::new(),
        };
        Ok(optimizer.with_stop_signal(stop))
    }

    pub fn with_moves(mut self, moves: &[Move]) -> Result<Self, FormulationError> {
        self.engine = self.engine.with_moves(moves)?;
        Ok(self)
    }

    pub fn with_dirichlet(mut self, locality_factor: f64, epsilon: f64) -> Self {
        self.engine = self.engine.with_dirichlet(locality_factor, epsilon);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// How the starting point is chosen when none is passed to [FormulationOptimizer::optimize]
    pub fn with_seeding(mut self, seeding: Seeding) -> Self {
        self.seeding = seeding;
        self
    }

    pub fn with_predictions(mut self, collect: bool) -> Self {
        self.collect_predictions = collect;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn bounds(&self) -> &BoundsTable {
        &self.bounds
    }

    pub fn engine(&self) -> &ProposalEngine {
        &self.engine
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Run `n_iterations` Metropolis-Hastings steps using the configured seed
    ///
    /// Starts from `initial` when given, which must satisfy the bounds, and from the configured [Seeding] otherwise.
    /// `burn_in` is stored on the returned run but does not alter the chain or the best point.
    pub fn optimize(
        &self,
        initial: Option<Formulation>,
        n_iterations: usize,
        burn_in: usize,
    ) -> Result<OptimizationRun, FormulationError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        self.optimize_with_rng(initial, n_iterations, burn_in, &mut rng)
    }

    /// Same as [FormulationOptimizer::optimize], drawing from the given random number generator
    pub fn optimize_with_rng<R: Rng + ?Sized>(
        &self,
        initial: Option<Formulation>,
        n_iterations: usize,
        burn_in: usize,
        rng: &mut R,
    ) -> Result<OptimizationRun, FormulationError> {
        let seeding = match initial {
            Some(point) => Seeding::Formulation(point.into_inner()),
            None => self.seeding.clone(),
        };
        self.run(&seeding, self.temperature, n_iterations, burn_in, rng)
    }

    /// Chain runs at decreasing temperatures, each starting from the best point of the previous one
    ///
    /// Every stage performs `n_iterations` steps at a constant temperature, and all stages draw from a single generator seeded with the configured seed.
    pub fn anneal(
        &self,
        temperatures: &[f64],
        initial: Option<Formulation>,
        n_iterations: usize,
        burn_in: usize,
    ) -> Result<Vec<OptimizationRun>, FormulationError> {
        for &temperature in temperatures {
            validate_temperature(temperature)?;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut seeding = match initial {
            Some(point) => Seeding::Formulation(point.into_inner()),
            None => self.seeding.clone(),
        };

        let mut runs: Vec<OptimizationRun> = Vec::with_capacity(temperatures.len());
        for (stage, &temperature) in temperatures.iter().enumerate() {
            tracing::info!("Annealing stage {} at T = {}", stage + 1, temperature);
            let run = self.run(&seeding, temperature, n_iterations, burn_in, &mut rng)?;
            seeding = Seeding::Formulation(run.result.best_formulation.values().to_vec());
            if run.result.status == Status::ManualStop {
                runs.push(run);
                break;
            }
            runs.push(run);
        }
        Ok(runs)
    }

    fn run<R: Rng + ?Sized>(
        &self,
        seeding: &Seeding,
        temperature: f64,
        n_iterations: usize,
        burn_in: usize,
        rng: &mut R,
    ) -> Result<OptimizationRun, FormulationError> {
        let start = Instant::now();
        let mut current = seeding.initial_point(&self.bounds, rng)?;
        let mut current_eval = self.evaluate(&current);
        tracing::debug!(
            "Initial formulation {:?} with objective {}",
            current.values(),
            current_eval.objective
        );

        let mut diagnostics = Diagnostics::default();
        if current_eval.failed {
            diagnostics.evaluation_failures += 1;
            tracing::warn!("Initial formulation could not be evaluated, starting from an infinite objective");
        }

        let mut best = current.clone();
        let mut best_eval = current_eval.clone();
        let mut chain = Chain::with_capacity(n_iterations.min(MAX_PREALLOCATION), self.collect_predictions);
        let mut n_accepted = 0;
        let mut status = Status::Completed;

        for iteration in 0..n_iterations {
            if self.stop.is_stopped() {
                tracing::info!("Stop requested after {} iterations", iteration);
                status = Status::ManualStop;
                break;
            }

            let (proposal, proposed) = self.engine.propose(&current, rng);
            let stats = diagnostics.moves.entry(proposal).or_default();
            stats.proposed += 1;

            let transition = if !self.bounds.is_valid(&proposed) {
                stats.constraint_rejected += 1;
                Transition::ConstraintRejected { proposal }
            } else {
                let evaluation = self.evaluate(&proposed);
                if evaluation.failed {
                    diagnostics.evaluation_failures += 1;
                }

                let delta = evaluation.objective - current_eval.objective;
                let draw = rng.random::<f64>();
                let accepted = draw < acceptance_probability(delta, temperature);
                let objective = evaluation.objective;

                if accepted {
                    stats.accepted += 1;
                    n_accepted += 1;
                    current = proposed;
                    current_eval = evaluation;
                    if current_eval.objective < best_eval.objective {
                        best = current.clone();
                        best_eval = current_eval.clone();
                    }
                }

                Transition::Evaluated {
                    proposal,
                    objective,
                    draw,
                    accepted,
                }
            };

            chain.push(
                current.clone(),
                current_eval.objective,
                current_eval.predictions.as_ref(),
                transition,
            );

            if (iteration + 1) % PROGRESS_INTERVAL == 0 {
                tracing::info!(
                    "Iteration {}/{}, best objective: {:.4}, acceptance rate: {:.3}",
                    iteration + 1,
                    n_iterations,
                    best_eval.objective,
                    n_accepted as f64 / (iteration + 1) as f64
                );
            }
        }

        let iterations = chain.len();
        let acceptance_rate = if iterations == 0 {
            0.0
        } else {
            n_accepted as f64 / iterations as f64
        };
        diagnostics.elapsed_seconds = start.elapsed().as_secs_f64();

        tracing::info!(
            "Run finished ({}): best objective {:.6} after {} iterations, acceptance rate {:.3}",
            status,
            best_eval.objective,
            iterations,
            acceptance_rate
        );

        Ok(OptimizationRun {
            result: OptimizationResult {
                best_formulation: best,
                best_objective: best_eval.objective,
                best_predictions: best_eval.predictions,
                acceptance_rate,
                iterations,
                status,
            },
            chain,
            diagnostics,
            temperature,
            burn_in,
        })
    }

    fn evaluate(&self, formulation: &Formulation) -> Evaluation {
        evaluate(&self.surrogate, &self.objective, formulation.values())
    }
}

fn validate_temperature(temperature: f64) -> Result<(), FormulationError> {
    if !temperature.is_finite() || temperature <= 0.0 {
        return Err(FormulationError::InvalidTemperature(temperature));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::Result;

    fn surrogate(x: &[f64]) -> Result<Vec<f64>> {
        Ok(vec![2.0 * x[0] + x[1]])
    }

    fn objective(p: &[f64]) -> Result<f64> {
        Ok(-p[0])
    }

    fn bounds() -> BoundsTable {
        BoundsTable::from_entries([("A", 0.1, 0.5), ("B", 0.0, 0.6), ("C", 0.0, 1.0)]).unwrap()
    }

    #[test]
    fn test_acceptance_probability() {
        assert_eq!(acceptance_probability(-1.0, 1.0), 1.0);
        assert_eq!(acceptance_probability(0.0, 1.0), 1.0);
        assert!((acceptance_probability(1.0, 1.0) - (-1.0f64).exp()).abs() < 1e-15);
        assert!((acceptance_probability(1.0, 2.0) - (-0.5f64).exp()).abs() < 1e-15);
        assert_eq!(acceptance_probability(f64::INFINITY, 1.0), 0.0);
        assert_eq!(acceptance_probability(f64::NEG_INFINITY, 1.0), 1.0);
        assert_eq!(acceptance_probability(f64::NAN, 1.0), 0.0);
    }

    #[test]
    fn test_invalid_temperature() {
        for temperature in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = FormulationOptimizer::new(bounds(), surrogate, objective, temperature);
            assert!(matches!(
                result,
                Err(FormulationError::InvalidTemperature(_))
            ));
        }
    }

    #[test]
    fn test_chain_length_and_diagnostics() {
        let optimizer = FormulationOptimizer::new(bounds(), surrogate, objective, 1.0)
            .unwrap()
            .with_seed(1);
        let run = optimizer.optimize(None, 500, 50).unwrap();

        assert_eq!(run.chain.len(), 500);
        assert_eq!(run.chain.objectives().len(), 500);
        assert_eq!(run.chain.predictions().len(), 500);
        assert_eq!(run.result.iterations, 500);
        assert_eq!(run.result.status, Status::Completed);
        assert_eq!(run.burn_in, 50);

        let proposed: usize = run.diagnostics.moves.values().map(|s| s.proposed).sum();
        let accepted: usize = run.diagnostics.moves.values().map(|s| s.accepted).sum();
        assert_eq!(proposed, 500);
        assert_eq!(accepted, run.chain.accepted());
        assert!((run.result.acceptance_rate - accepted as f64 / 500.0).abs() < 1e-12);
    }

    #[test]
    fn test_predictions_can_be_skipped() {
        let optimizer = FormulationOptimizer::new(bounds(), surrogate, objective, 1.0)
            .unwrap()
            .with_predictions(false);
        let run = optimizer.optimize(None, 100, 0).unwrap();
        assert!(run.chain.predictions().is_empty());
        assert!(run.result.best_predictions.is_some());
    }

    #[test]
    fn test_zero_iterations() {
        let optimizer = FormulationOptimizer::new(bounds(), surrogate, objective, 1.0).unwrap();
        let start = Formulation::new(vec![0.1, 0.0, 0.9]);
        let run = optimizer.optimize(Some(start.clone()), 0, 0).unwrap();
        assert!(run.chain.is_empty());
        assert_eq!(run.result.acceptance_rate, 0.0);
        assert_eq!(run.result.best_formulation, start);
        assert!((run.result.best_objective + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_stop_signal() {
        let stop = StopSignal::new();
        stop.stop();
        let optimizer = FormulationOptimizer::new(bounds(), surrogate, objective, 1.0)
            .unwrap()
            .with_stop_signal(stop);
        let run = optimizer.optimize(None, 100, 0).unwrap();
        assert_eq!(run.result.status, Status::ManualStop);
        assert!(run.chain.is_empty());
    }

    #[test]
    fn test_anneal_stages_continue_from_best() {
        let optimizer = FormulationOptimizer::new(bounds(), surrogate, objective, 1.0)
            .unwrap()
            .with_seed(3);
        let runs = optimizer.anneal(&[1.0, 0.1, 0.01], None, 300, 0).unwrap();
        assert_eq!(runs.len(), 3);
        for pair in runs.windows(2) {
            assert!(pair[1].result.best_objective <= pair[0].result.best_objective);
            assert!(pair[1].temperature < pair[0].temperature);
        }
        assert!(optimizer.anneal(&[1.0, 0.0], None, 10, 0).is_err());
    }
}
