//! fmcore provides the building blocks to explore and optimize formulations,
//! mixtures of ingredients whose mass fractions are bounded and sum to one.
//!
//! - [routines::initialization] draws feasible formulations from the bounded simplex
//! - [routines::proposal] generates candidate moves on the simplex
//! - [algorithms::metropolis] searches for the formulation minimizing an objective over the predictions of a surrogate model
//!
//! The [entrypoints] read their configuration from [routines::settings::Settings] and write their results to the output folder.

pub mod algorithms;
pub mod entrypoints;
pub mod error;

pub mod routines {
    pub mod dataset;
    pub mod evaluation;
    pub mod initialization;
    pub mod logger;
    pub mod output;
    pub mod proposal;
    pub mod settings;
}

pub mod structs {
    pub mod bounds;
    pub mod chain;
    pub mod formulation;
}

pub use error::FormulationError;

pub mod prelude {
    pub use crate::algorithms::metropolis::{
        Diagnostics, FormulationOptimizer, MoveStats, OptimizationResult, OptimizationRun,
    };
    pub use crate::algorithms::multistart;
    pub use crate::algorithms::{Status, StopSignal};
    pub use crate::entrypoints;
    pub use crate::error::FormulationError;
    pub use crate::routines::evaluation::{Objective, Surrogate};
    pub use crate::routines::initialization::{gibbs, simplex, Seeding};
    pub use crate::routines::proposal::{Move, ProposalEngine};
    pub use crate::routines::settings::{self, Settings};
    pub use crate::routines::*;
    pub use crate::structs::bounds::{is_valid, Bound, BoundsTable};
    pub use crate::structs::chain::{Chain, Transition};
    pub use crate::structs::formulation::Formulation;
}
