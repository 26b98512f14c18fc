//! Proposal moves that change which ingredients are present in a formulation
//!
//! Local moves cannot introduce or eliminate an ingredient without crossing zero, these moves add, remove or swap whole ingredients instead.
//! Every move returns the unmodified input when no legal change exists.

use rand::seq::IndexedRandom;
use rand::Rng;

use crate::structs::bounds::BoundsTable;
use crate::structs::formulation::ZERO_THRESHOLD;

/// Smallest amount of an ingredient worth adding
const MIN_ADD_AMOUNT: f64 = 1e-4;
/// Largest amount of an ingredient added in a single move
const MAX_ADD_AMOUNT: f64 = 0.2;
/// Largest share of the existing mass given up to make room for a new ingredient
const MAX_REDISTRIBUTED_SHARE: f64 = 0.3;

fn within_bounds(formulation: &[f64], bounds: &BoundsTable) -> bool {
    formulation
        .iter()
        .zip(bounds.bounds())
        .all(|(&x, bound)| bound.contains(x))
}

/// Whether the lower bound of an ingredient allows it to be absent
fn removable(bounds: &BoundsTable, index: usize) -> bool {
    bounds.bound(index).min <= ZERO_THRESHOLD
}

/// Add an absent ingredient and scale the present ones down to make room
pub fn add_ingredient<R: Rng + ?Sized>(
    current: &[f64],
    bounds: &BoundsTable,
    rng: &mut R,
) -> Vec<f64> {
    let absent: Vec<usize> = (0..current.len())
        .filter(|&i| current[i] <= ZERO_THRESHOLD)
        .collect();
    let Some(&k) = absent.choose(rng) else {
        return current.to_vec();
    };

    let bound = bounds.bound(k);
    let total: f64 = current.iter().sum();
    let min_amount = MIN_ADD_AMOUNT.max(bound.min);
    let max_amount = MAX_ADD_AMOUNT
        .min(bound.max)
        .min(total * MAX_REDISTRIBUTED_SHARE);
    if max_amount < min_amount || total <= ZERO_THRESHOLD {
        return current.to_vec();
    }
    let amount = rng.random_range(min_amount..=max_amount);

    let scale = (1.0 - amount) / total;
    let mut new = current.to_vec();
    for (i, x) in new.iter_mut().enumerate() {
        if i == k {
            *x = amount;
        } else if *x > ZERO_THRESHOLD {
            *x *= scale;
        }
    }

    if !within_bounds(&new, bounds) {
        return current.to_vec();
    }
    new
}

/// Remove a present ingredient and scale the remaining ones up to restore unit sum
///
/// Only ingredients with a zero lower bound can be removed, and at least two ingredients must be present.
pub fn remove_ingredient<R: Rng + ?Sized>(
    current: &[f64],
    bounds: &BoundsTable,
    rng: &mut R,
) -> Vec<f64> {
    let present: Vec<usize> = (0..current.len())
        .filter(|&i| current[i] > ZERO_THRESHOLD)
        .collect();
    if present.len() < 2 {
        return current.to_vec();
    }

    let candidates: Vec<usize> = present
        .iter()
        .copied()
        .filter(|&i| removable(bounds, i))
        .collect();
    let Some(&r) = candidates.choose(rng) else {
        return current.to_vec();
    };

    let mut new = current.to_vec();
    new[r] = 0.0;
    let remaining: f64 = new.iter().sum();
    if remaining <= ZERO_THRESHOLD {
        return current.to_vec();
    }

    let scale = 1.0 / remaining;
    for (i, x) in new.iter_mut().enumerate() {
        if i != r && *x > ZERO_THRESHOLD {
            *x *= scale;
        }
    }

    if !within_bounds(&new, bounds) {
        return current.to_vec();
    }
    new
}

/// Move the entire quantity of a removable present ingredient to an absent one
///
/// All other ingredients are left untouched.
pub fn swap_ingredients<R: Rng + ?Sized>(
    current: &[f64],
    bounds: &BoundsTable,
    rng: &mut R,
) -> Vec<f64> {
    let outgoing: Vec<usize> = (0..current.len())
        .filter(|&i| current[i] > ZERO_THRESHOLD && removable(bounds, i))
        .collect();
    let incoming: Vec<usize> = (0..current.len())
        .filter(|&i| current[i] <= ZERO_THRESHOLD)
        .collect();

    let (Some(&out), Some(&into)) = (outgoing.choose(rng), incoming.choose(rng)) else {
        return current.to_vec();
    };

    let quantity = current[out];
    if !bounds.bound(into).contains(quantity) {
        return current.to_vec();
    }

    let mut new = current.to_vec();
    new[out] = 0.0;
    new[into] = quantity;
    new
}
