use serde_derive::{Deserialize, Serialize};

use crate::error::FormulationError;
use crate::structs::formulation::Formulation;

/// Maximum deviation of the sum of a formulation from one accepted by [BoundsTable::is_valid]
pub const SUM_TOLERANCE: f64 = 1e-6;
/// Rounding slack allowed when comparing the sums of the bounds against one
pub const FEASIBILITY_TOLERANCE: f64 = 1e-12;

/// Inclusive `[min, max]` mass fraction range of a single ingredient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
}

impl Bound {
    pub fn new(min: f64, max: f64) -> Self {
        Bound { min, max }
    }

    /// The unconstrained range `[0, 1]`
    pub fn unit() -> Self {
        Bound { min: 0.0, max: 1.0 }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    fn is_well_formed(&self) -> bool {
        self.min.is_finite()
            && self.max.is_finite()
            && self.min >= 0.0
            && self.max <= 1.0
            && self.min <= self.max
    }
}

impl Default for Bound {
    fn default() -> Self {
        Bound::unit()
    }
}

/// Ordered ingredients together with their mass fraction bounds
///
/// The order of the ingredients defines the order of the entries in every [Formulation] sampled or optimized against this table.
/// Ingredients without an explicit bound are allowed the full range `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundsTable {
    names: Vec<String>,
    bounds: Vec<Bound>,
}

impl BoundsTable {
    /// Create a table where every ingredient is unconstrained
    pub fn new<I, S>(names: I) -> Result<Self, FormulationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = BoundsTable {
            names: Vec::new(),
            bounds: Vec::new(),
        };
        for name in names {
            let name = name.into();
            if table.names.contains(&name) {
                return Err(FormulationError::DuplicateIngredient(name));
            }
            table.names.push(name);
            table.bounds.push(Bound::unit());
        }
        Ok(table)
    }

    /// Create an unconstrained table with `n` ingredients named `x_1` to `x_n`
    pub fn with_dimensions(n: usize) -> Self {
        BoundsTable {
            names: (1..=n).map(|i| format!("x_{}", i)).collect(),
            bounds: vec![Bound::unit(); n],
        }
    }

    /// Create a table from `(name, min, max)` entries, in order
    pub fn from_entries<S: Into<String>>(
        entries: impl IntoIterator<Item = (S, f64, f64)>,
    ) -> Result<Self, FormulationError> {
        let entries: Vec<(String, f64, f64)> = entries
            .into_iter()
            .map(|(name, min, max)| (name.into(), min, max))
            .collect();
        let mut table = BoundsTable::new(entries.iter().map(|(name, _, _)| name.clone()))?;
        for (name, min, max) in entries {
            table = table.set(name, min, max)?;
        }
        Ok(table)
    }

    /// Constrain an ingredient to `[min, max]`
    pub fn set(mut self, name: impl Into<String>, min: f64, max: f64) -> Result<Self, FormulationError> {
        let name = name.into();
        let index = self
            .index_of(&name)
            .ok_or_else(|| FormulationError::UnknownIngredient(name.clone()))?;
        let bound = Bound::new(min, max);
        if !bound.is_well_formed() {
            return Err(FormulationError::MalformedBound {
                ingredient: name,
                min,
                max,
            });
        }
        self.bounds[index] = bound;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn bounds(&self) -> &[Bound] {
        &self.bounds
    }

    pub fn bound(&self, index: usize) -> Bound {
        self.bounds[index]
    }

    pub fn get(&self, name: &str) -> Option<Bound> {
        self.index_of(name).map(|i| self.bounds[i])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn min_sum(&self) -> f64 {
        self.bounds.iter().map(|b| b.min).sum()
    }

    pub fn max_sum(&self) -> f64 {
        self.bounds.iter().map(|b| b.max).sum()
    }

    /// Check that at least one valid formulation exists
    ///
    /// An empty table is trivially feasible.
    pub fn check_feasible(&self) -> Result<(), FormulationError> {
        if self.is_empty() {
            return Ok(());
        }
        let min_sum = self.min_sum();
        if min_sum > 1.0 + FEASIBILITY_TOLERANCE {
            return Err(FormulationError::LowerBoundsExceedOne(min_sum));
        }
        let max_sum = self.max_sum();
        if max_sum < 1.0 - FEASIBILITY_TOLERANCE {
            return Err(FormulationError::UpperBoundsBelowOne(max_sum));
        }
        Ok(())
    }

    /// Whether `formulation` sums to one, has no negative entries and respects every bound
    pub fn is_valid(&self, formulation: &[f64]) -> bool {
        is_valid(formulation, self)
    }

    /// Check the dimension of a formulation against this table
    pub fn check_dimensions(&self, formulation: &Formulation) -> Result<(), FormulationError> {
        if formulation.len() != self.len() {
            return Err(FormulationError::DimensionMismatch {
                expected: self.len(),
                found: formulation.len(),
            });
        }
        Ok(())
    }
}

/// Constraint checker used by every sampler and by the optimizer
///
/// Returns `false` when the length does not match the table, the sum deviates from one by more than [SUM_TOLERANCE],
/// any entry is negative (or not finite), or any entry lies outside its bound.
pub fn is_valid(formulation: &[f64], bounds: &BoundsTable) -> bool {
    if formulation.len() != bounds.len() {
        return false;
    }
    if formulation.is_empty() {
        return true;
    }
    let sum: f64 = formulation.iter().sum();
    if !sum.is_finite() || (sum - 1.0).abs() > SUM_TOLERANCE {
        return false;
    }
    formulation
        .iter()
        .zip(bounds.bounds())
        .all(|(&x, bound)| x.is_finite() && x >= 0.0 && bound.contains(x))
}
