use thiserror::Error;

/// Errors raised while building bounds, sampling the constrained simplex or
/// starting an optimization run
///
/// Constraint violations of individual proposals and failing surrogate
/// evaluations are not represented here, as they never abort a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulationError {
    #[error("Bound for '{ingredient}' is malformed: [{min}, {max}] must satisfy 0 <= min <= max <= 1")]
    MalformedBound {
        ingredient: String,
        min: f64,
        max: f64,
    },

    #[error("Ingredient '{0}' is not part of the formulation")]
    UnknownIngredient(String),

    #[error("Ingredient '{0}' is listed more than once")]
    DuplicateIngredient(String),

    #[error("Sum of lower bounds ({0}) exceeds 1, no valid formulation exists")]
    LowerBoundsExceedOne(f64),

    #[error("Sum of upper bounds ({0}) is below 1, no valid formulation exists")]
    UpperBoundsBelowOne(f64),

    #[error("Could not find a feasible formulation after {attempts} attempts, the bounds may be over-constrained")]
    Exhausted { attempts: usize },

    #[error("Expected a formulation with {expected} ingredients, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Initial formulation {0:?} violates the constraints")]
    InvalidInitial(Vec<f64>),

    #[error("Temperature must be finite and positive, got {0}")]
    InvalidTemperature(f64),

    #[error("At least one proposal move must be enabled")]
    EmptyMoveSet,
}
