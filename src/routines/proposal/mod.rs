use rand::Rng;
use serde_derive::{Deserialize, Serialize};

use crate::error::FormulationError;
use crate::structs::bounds::BoundsTable;
use crate::structs::formulation::Formulation;

pub mod local;
pub mod support;

/// Default concentration multiplier of the [Move::Dirichlet] proposal
pub const DEFAULT_LOCALITY_FACTOR: f64 = 100.0;
/// Default additive concentration of the [Move::Dirichlet] proposal
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// The kinds of proposal moves used to explore the constrained simplex
///
/// [PairwiseTransfer](Move::PairwiseTransfer) and [Rebalance](Move::Rebalance) mix locally,
/// [Dirichlet](Move::Dirichlet) changes many ingredients at once,
/// and the remaining moves change which ingredients are present in the formulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Move {
    PairwiseTransfer,
    Dirichlet,
    Rebalance,
    AddIngredient,
    RemoveIngredient,
    SwapIngredients,
}

impl Move {
    pub const ALL: [Move; 6] = [
        Move::PairwiseTransfer,
        Move::Dirichlet,
        Move::Rebalance,
        Move::AddIngredient,
        Move::RemoveIngredient,
        Move::SwapIngredients,
    ];

    /// Moves that keep the set of ingredients present in the formulation
    pub const LOCAL: [Move; 3] = [Move::PairwiseTransfer, Move::Dirichlet, Move::Rebalance];
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Move::PairwiseTransfer => write!(f, "pairwise_transfer"),
            Move::Dirichlet => write!(f, "dirichlet"),
            Move::Rebalance => write!(f, "rebalance"),
            Move::AddIngredient => write!(f, "add_ingredient"),
            Move::RemoveIngredient => write!(f, "remove_ingredient"),
            Move::SwapIngredients => write!(f, "swap_ingredients"),
        }
    }
}

/// Generates candidate formulations from the current state of a chain
///
/// Proposals are not guaranteed to satisfy the bounds, the caller is expected to validate them.
#[derive(Debug, Clone)]
pub struct ProposalEngine {
    bounds: BoundsTable,
    moves: Vec<Move>,
    locality_factor: f64,
    epsilon: f64,
}

impl ProposalEngine {
    /// Create an engine using every move type and the default Dirichlet parameters
    pub fn new(bounds: BoundsTable) -> Self {
        ProposalEngine {
            bounds,
            moves: Move::ALL.to_vec(),
            locality_factor: DEFAULT_LOCALITY_FACTOR,
            epsilon: DEFAULT_EPSILON,
        }
    }

    /// Restrict the engine to the given moves, duplicates are removed
    pub fn with_moves(mut self, moves: &[Move]) -> Result<Self, FormulationError> {
        let mut enabled: Vec<Move> = Vec::with_capacity(moves.len());
        for mv in moves {
            if !enabled.contains(mv) {
                enabled.push(*mv);
            }
        }
        if enabled.is_empty() {
            return Err(FormulationError::EmptyMoveSet);
        }
        self.moves = enabled;
        Ok(self)
    }

    pub fn with_dirichlet(mut self, locality_factor: f64, epsilon: f64) -> Self {
        self.locality_factor = locality_factor;
        self.epsilon = epsilon;
        self
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn bounds(&self) -> &BoundsTable {
        &self.bounds
    }

    pub fn locality_factor(&self) -> f64 {
        self.locality_factor
    }

    /// Pick one of the enabled moves uniformly and apply it to `current`
    pub fn propose<R: Rng + ?Sized>(&self, current: &Formulation, rng: &mut R) -> (Move, Formulation) {
        let mv = self.moves[rng.random_range(0..self.moves.len())];
        (mv, self.apply(mv, current, rng))
    }

    /// Apply a specific move to `current`
    ///
    /// A formulation whose length differs from the bounds table is returned unchanged.
    pub fn apply<R: Rng + ?Sized>(&self, mv: Move, current: &Formulation, rng: &mut R) -> Formulation {
        if current.len() != self.bounds.len() {
            tracing::debug!(
                "Skipping {} on a formulation of {} ingredients, expected {}",
                mv,
                current.len(),
                self.bounds.len()
            );
            return current.clone();
        }
        let x = current.values();
        let proposed = match mv {
            Move::PairwiseTransfer => local::pairwise_transfer(x, rng),
            Move::Dirichlet => local::dirichlet(x, self.locality_factor, self.epsilon, rng),
            Move::Rebalance => local::rebalance(x, rng),
            Move::AddIngredient => support::add_ingredient(x, &self.bounds, rng),
            Move::RemoveIngredient => support::remove_ingredient(x, &self.bounds, rng),
            Move::SwapIngredients => support::swap_ingredients(x, &self.bounds, rng),
        };
        Formulation::new(proposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_empty_move_set() {
        let engine = ProposalEngine::new(BoundsTable::with_dimensions(3));
        assert_eq!(
            engine.with_moves(&[]).unwrap_err(),
            FormulationError::EmptyMoveSet
        );
    }

    #[test]
    fn test_restricted_moves_are_respected() {
        let engine = ProposalEngine::new(BoundsTable::with_dimensions(3))
            .with_moves(&[Move::Rebalance, Move::Rebalance])
            .unwrap();
        assert_eq!(engine.moves(), &[Move::Rebalance]);

        let mut rng = StdRng::seed_from_u64(7);
        let current = Formulation::new(vec![0.2, 0.3, 0.5]);
        for _ in 0..50 {
            let (mv, _) = engine.propose(&current, &mut rng);
            assert_eq!(mv, Move::Rebalance);
        }
    }

    #[test]
    fn test_mismatched_length_is_returned_unchanged() {
        let engine = ProposalEngine::new(BoundsTable::with_dimensions(4));
        let mut rng = StdRng::seed_from_u64(11);
        for current in [
            Formulation::new(vec![0.5, 0.5]),
            Formulation::new(vec![0.1, 0.2, 0.3, 0.2, 0.2]),
        ] {
            for mv in Move::ALL {
                assert_eq!(engine.apply(mv, &current, &mut rng), current, "{}", mv);
            }
            let (_, proposed) = engine.propose(&current, &mut rng);
            assert_eq!(proposed, current);
        }
    }

    #[test]
    fn test_move_serialization() {
        let json = serde_json::to_string(&Move::SwapIngredients).unwrap();
        assert_eq!(json, "\"swap_ingredients\"");
        let mv: Move = serde_json::from_str("\"add_ingredient\"").unwrap();
        assert_eq!(mv, Move::AddIngredient);
    }
}
