use serde_derive::{Deserialize, Serialize};
use std::ops::{Deref, Index};

/// Ingredients below this mass fraction are considered absent from a formulation
pub const ZERO_THRESHOLD: f64 = 1e-8;

/// A vector of per-ingredient mass fractions
///
/// Entries follow the ingredient order of the [BoundsTable](crate::structs::bounds::BoundsTable) the formulation was created for.
/// A valid formulation has non-negative entries summing to one, see [BoundsTable::is_valid](crate::structs::bounds::BoundsTable::is_valid).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Formulation(Vec<f64>);

impl Formulation {
    pub fn new(values: Vec<f64>) -> Self {
        Formulation(values)
    }

    /// An empty formulation, i.e. one without ingredients
    pub fn empty() -> Self {
        Formulation(Vec::new())
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    /// Total mass of the formulation
    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    /// Indices of the ingredients currently present
    pub fn active(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, &x)| x > ZERO_THRESHOLD)
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of the ingredients currently absent
    pub fn inactive(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, &x)| x <= ZERO_THRESHOLD)
            .map(|(i, _)| i)
            .collect()
    }
}

impl Deref for Formulation {
    type Target = [f64];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Index<usize> for Formulation {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl From<Vec<f64>> for Formulation {
    fn from(values: Vec<f64>) -> Self {
        Formulation(values)
    }
}

impl From<&[f64]> for Formulation {
    fn from(values: &[f64]) -> Self {
        Formulation(values.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_and_inactive() {
        let f = Formulation::new(vec![0.5, 0.0, 0.5, 1e-10]);
        assert_eq!(f.active(), vec![0, 2]);
        assert_eq!(f.inactive(), vec![1, 3]);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let f = Formulation::new(vec![0.25, 0.75]);
        let json = serde_json::to_string(&f).unwrap();
        assert_eq!(json, "[0.25,0.75]");
    }
}
