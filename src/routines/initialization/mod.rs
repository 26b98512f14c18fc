use rand::Rng;
use serde_derive::{Deserialize, Serialize};

use crate::error::FormulationError;
use crate::structs::bounds::BoundsTable;
use crate::structs::formulation::Formulation;

pub mod gibbs;
pub mod simplex;

/// Where the starting point of an optimization run comes from
///
/// - `Simplex`: a random point drawn with [simplex::sample]
/// - `Deterministic`: the headroom-proportional point from [gibbs::seed_point]
/// - `Formulation`: a caller-supplied point, validated before use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Seeding {
    #[default]
    Simplex,
    Deterministic,
    Formulation(Vec<f64>),
}

impl Seeding {
    /// Produce the initial point for a run
    ///
    /// Infeasible bounds and caller-supplied points violating the constraints are reported before any iteration takes place.
    pub fn initial_point<R: Rng + ?Sized>(
        &self,
        bounds: &BoundsTable,
        rng: &mut R,
    ) -> Result<Formulation, FormulationError> {
        bounds.check_feasible()?;
        match self {
            Seeding::Simplex => simplex::sample(bounds, rng),
            Seeding::Deterministic => gibbs::seed_point(bounds),
            Seeding::Formulation(values) => {
                let point = Formulation::from(values.clone());
                bounds.check_dimensions(&point)?;
                if !bounds.is_valid(&point) {
                    return Err(FormulationError::InvalidInitial(values.clone()));
                }
                Ok(point)
            }
        }
    }
}
