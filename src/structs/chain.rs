use ndarray::{Array1, Array2, Axis};
use ndarray_stats::QuantileExt;
use serde_derive::Serialize;

use crate::routines::proposal::Move;
use crate::structs::formulation::Formulation;

/// What happened to the proposal drawn in a single iteration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Transition {
    /// The proposal violated the constraints and was never evaluated
    ConstraintRejected { proposal: Move },
    /// The proposal was evaluated and passed through the Metropolis rule
    ///
    /// `draw` is the uniform random number compared against the acceptance probability.
    Evaluated {
        proposal: Move,
        objective: f64,
        draw: f64,
        accepted: bool,
    },
}

impl Transition {
    pub fn proposal(&self) -> Move {
        match self {
            Transition::ConstraintRejected { proposal } => *proposal,
            Transition::Evaluated { proposal, .. } => *proposal,
        }
    }

    pub fn accepted(&self) -> bool {
        matches!(self, Transition::Evaluated { accepted: true, .. })
    }
}

/// The states visited by a single Metropolis-Hastings run
///
/// Entry `t` holds the state after the decision of iteration `t`; rejected iterations repeat the previous state.
/// Predictions are only recorded when the run was configured to collect them.
#[derive(Debug, Clone, Serialize)]
pub struct Chain {
    formulations: Vec<Formulation>,
    objectives: Vec<f64>,
    predictions: Vec<Option<Vec<f64>>>,
    transitions: Vec<Transition>,
    collect_predictions: bool,
}

impl Chain {
    pub fn new(collect_predictions: bool) -> Self {
        Chain {
            formulations: Vec::new(),
            objectives: Vec::new(),
            predictions: Vec::new(),
            transitions: Vec::new(),
            collect_predictions,
        }
    }

    pub(crate) fn with_capacity(capacity: usize, collect_predictions: bool) -> Self {
        Chain {
            formulations: Vec::with_capacity(capacity),
            objectives: Vec::with_capacity(capacity),
            predictions: Vec::with_capacity(if collect_predictions { capacity } else { 0 }),
            transitions: Vec::with_capacity(capacity),
            collect_predictions,
        }
    }

    pub(crate) fn push(
        &mut self,
        formulation: Formulation,
        objective: f64,
        predictions: Option<&Vec<f64>>,
        transition: Transition,
    ) {
        self.formulations.push(formulation);
        self.objectives.push(objective);
        if self.collect_predictions {
            self.predictions.push(predictions.cloned());
        }
        self.transitions.push(transition);
    }

    pub fn len(&self) -> usize {
        self.formulations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulations.is_empty()
    }

    pub fn formulations(&self) -> &[Formulation] {
        &self.formulations
    }

    pub fn objectives(&self) -> &[f64] {
        &self.objectives
    }

    /// Surrogate predictions per iteration, empty if they were not collected
    ///
    /// An entry is `None` when the state of that iteration could not be evaluated by the surrogate model.
    pub fn predictions(&self) -> &[Option<Vec<f64>>] {
        &self.predictions
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn collects_predictions(&self) -> bool {
        self.collect_predictions
    }

    /// Number of accepted proposals
    pub fn accepted(&self) -> usize {
        self.transitions.iter().filter(|t| t.accepted()).count()
    }

    /// The formulations after discarding the first `burn_in` iterations
    ///
    /// The optimizer never trims its chain, discarding the burn-in prefix is left to the caller.
    pub fn after_burn_in(&self, burn_in: usize) -> &[Formulation] {
        &self.formulations[burn_in.min(self.len())..]
    }

    /// The chain as a matrix, one row per iteration and one column per ingredient
    pub fn matrix(&self) -> Array2<f64> {
        let ncols = self.formulations.first().map(|f| f.len()).unwrap_or(0);
        Array2::from_shape_fn((self.len(), ncols), |(i, j)| self.formulations[i][j])
    }

    /// Mean mass fraction of each ingredient after the first `burn_in` iterations
    pub fn ingredient_means(&self, burn_in: usize) -> Option<Array1<f64>> {
        let start = burn_in.min(self.len());
        self.matrix()
            .slice_axis(Axis(0), (start..).into())
            .mean_axis(Axis(0))
    }

    /// Index of the iteration with the lowest objective value
    pub fn best_index(&self) -> Option<usize> {
        Array1::from(self.objectives.clone()).argmin().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Chain {
        let mut chain = Chain::new(true);
        let moves = [Move::PairwiseTransfer, Move::Dirichlet, Move::Rebalance];
        let states = [
            (vec![0.2, 0.8], 3.0, true),
            (vec![0.4, 0.6], 2.0, true),
            (vec![0.4, 0.6], 2.0, false),
        ];
        for ((state, objective, accepted), proposal) in states.into_iter().zip(moves) {
            let preds = vec![objective * 10.0];
            chain.push(
                Formulation::new(state),
                objective,
                Some(&preds),
                Transition::Evaluated {
                    proposal,
                    objective,
                    draw: 0.5,
                    accepted,
                },
            );
        }
        chain
    }

    #[test]
    fn test_chain_bookkeeping() {
        let chain = chain();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.accepted(), 2);
        assert_eq!(chain.predictions().len(), 3);
        assert_eq!(chain.best_index(), Some(1));
        assert_eq!(chain.after_burn_in(1).len(), 2);
        assert_eq!(chain.after_burn_in(10).len(), 0);
    }

    #[test]
    fn test_matrix_and_means() {
        let chain = chain();
        let matrix = chain.matrix();
        assert_eq!(matrix.dim(), (3, 2));
        assert_eq!(matrix[[0, 1]], 0.8);

        let means = chain.ingredient_means(1).unwrap();
        assert!((means[0] - 0.4).abs() < 1e-12);
        assert!((means[1] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_predictions_not_collected() {
        let mut chain = Chain::new(false);
        chain.push(
            Formulation::new(vec![1.0]),
            0.0,
            Some(&vec![1.0]),
            Transition::ConstraintRejected {
                proposal: Move::Dirichlet,
            },
        );
        assert!(chain.predictions().is_empty());
        assert_eq!(chain.accepted(), 0);
    }
}
