use rand::Rng;

use crate::error::FormulationError;
use crate::routines::proposal::local::distinct_pair;
use crate::structs::bounds::BoundsTable;
use crate::structs::formulation::Formulation;

/// Mass left to distribute below which the seed point is considered complete
const MASS_TOLERANCE: f64 = 1e-12;
/// Maximum number of redistribution rounds when building the seed point
const MAX_SEED_ROUNDS: usize = 100;
/// Transfer ranges narrower than this are skipped
const MIN_RANGE: f64 = 1e-12;

/// Build a feasible point by starting every ingredient at its minimum
///
/// The remaining mass `1 - sum(min)` is handed out proportionally to the headroom `max - x` of each ingredient,
/// repeating until no mass is left. Running out of headroom with mass left is reported as infeasible.
pub fn seed_point(bounds: &BoundsTable) -> Result<Formulation, FormulationError> {
    seed_point_with_rounds(bounds, MAX_SEED_ROUNDS)
}

/// [seed_point] with an explicit number of redistribution rounds before [FormulationError::Exhausted] is returned
pub(crate) fn seed_point_with_rounds(
    bounds: &BoundsTable,
    rounds: usize,
) -> Result<Formulation, FormulationError> {
    if bounds.is_empty() {
        return Ok(Formulation::empty());
    }
    bounds.check_feasible()?;

    let mut x: Vec<f64> = bounds.bounds().iter().map(|b| b.min).collect();
    let mut remaining = 1.0 - bounds.min_sum();

    for _ in 0..rounds {
        if remaining <= MASS_TOLERANCE {
            return Ok(Formulation::new(x));
        }

        let headroom: Vec<f64> = x
            .iter()
            .zip(bounds.bounds())
            .map(|(v, b)| (b.max - v).max(0.0))
            .collect();
        let total: f64 = headroom.iter().sum();
        if total <= MASS_TOLERANCE {
            return Err(FormulationError::UpperBoundsBelowOne(bounds.max_sum()));
        }

        let share = remaining.min(total);
        let mut added = 0.0;
        for (i, room) in headroom.iter().enumerate() {
            let amount = (share * room / total).min(*room);
            x[i] = bounds.bound(i).clamp(x[i] + amount);
            added += amount;
        }
        remaining -= added;
    }

    if remaining <= MASS_TOLERANCE {
        return Ok(Formulation::new(x));
    }
    Err(FormulationError::Exhausted { attempts: rounds })
}

/// Explore the bounded simplex with a chain of pairwise mass transfers
///
/// Starting from [seed_point], each iteration performs one transfer sub-step per ingredient.
/// A sub-step picks two distinct ingredients `i` and `j` and moves a uniformly drawn amount from `j` to `i`,
/// chosen within the range that keeps both ingredients inside their bounds, so every state is feasible by construction.
///
/// The first `burn_in` iterations are discarded, the following `n_samples` states are returned in order.
pub fn sample<R: Rng + ?Sized>(
    bounds: &BoundsTable,
    n_samples: usize,
    burn_in: usize,
    rng: &mut R,
) -> Result<Vec<Formulation>, FormulationError> {
    let mut x = seed_point(bounds)?.into_inner();
    let n = x.len();
    let mut samples = Vec::with_capacity(n_samples);

    for iteration in 0..(burn_in + n_samples) {
        if n >= 2 {
            for _ in 0..n {
                transfer(&mut x, bounds, rng);
            }
        }
        if iteration >= burn_in {
            samples.push(Formulation::new(x.clone()));
        }
    }

    tracing::debug!(
        "Gibbs sampler produced {} samples after {} burn-in iterations",
        samples.len(),
        burn_in
    );
    Ok(samples)
}

/// A single feasibility-preserving transfer sub-step
fn transfer<R: Rng + ?Sized>(x: &mut [f64], bounds: &BoundsTable, rng: &mut R) {
    let (i, j) = distinct_pair(x.len(), rng);
    let (bi, bj) = (bounds.bound(i), bounds.bound(j));

    let lower = (bi.min - x[i]).max(x[j] - bj.max);
    let upper = (bi.max - x[i]).min(x[j] - bj.min);
    if upper - lower <= MIN_RANGE {
        return;
    }

    let amount = rng.random_range(lower..=upper);
    x[i] = bi.clamp(x[i] + amount);
    x[j] = bj.clamp(x[j] - amount);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::bounds::is_valid;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn bounds() -> BoundsTable {
        BoundsTable::from_entries([("A", 0.1, 0.5), ("B", 0.0, 0.6), ("C", 0.0, 1.0)]).unwrap()
    }

    #[test]
    fn test_seed_point_is_feasible() {
        let bounds = bounds();
        let seed = seed_point(&bounds).unwrap();
        assert!(is_valid(&seed, &bounds));
        // Remaining 0.9 is shared by headroom 0.4 / 0.6 / 1.0
        assert_abs_diff_eq!(seed[0], 0.1 + 0.9 * 0.4 / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(seed[1], 0.9 * 0.6 / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(seed[2], 0.9 * 1.0 / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_seed_point_infeasible() {
        let bounds = BoundsTable::from_entries([("A", 0.0, 0.4), ("B", 0.0, 0.4)]).unwrap();
        assert!(matches!(
            seed_point(&bounds),
            Err(FormulationError::UpperBoundsBelowOne(_))
        ));
    }

    #[test]
    fn test_seed_point_exhaustion_reports_the_round_count() {
        let bounds = bounds();
        assert_eq!(
            seed_point_with_rounds(&bounds, 0),
            Err(FormulationError::Exhausted { attempts: 0 })
        );
        assert_eq!(seed_point_with_rounds(&bounds, 1), seed_point(&bounds));

        // Minimums summing to one need no redistribution at all
        let full = BoundsTable::from_entries([("A", 0.4, 0.5), ("B", 0.6, 0.9)]).unwrap();
        assert!(seed_point_with_rounds(&full, 0).is_ok());
    }

    #[test]
    fn test_samples_are_feasible() {
        let bounds = bounds();
        let mut rng = StdRng::seed_from_u64(347);
        let samples = sample(&bounds, 1000, 100, &mut rng).unwrap();
        assert_eq!(samples.len(), 1000);
        for s in &samples {
            assert!(is_valid(s, &bounds), "{:?}", s);
        }
    }

    #[test]
    fn test_chain_moves() {
        let bounds = BoundsTable::with_dimensions(4);
        let mut rng = StdRng::seed_from_u64(1);
        let samples = sample(&bounds, 50, 0, &mut rng).unwrap();
        let distinct = samples.windows(2).filter(|w| w[0] != w[1]).count();
        assert!(distinct > 40);
    }

    #[test]
    fn test_coverage_of_unit_simplex() {
        // Every ingredient of the unconstrained simplex should get close to both of its extremes
        let bounds = BoundsTable::with_dimensions(3);
        let mut rng = StdRng::seed_from_u64(9);
        let samples = sample(&bounds, 5000, 100, &mut rng).unwrap();
        for i in 0..3 {
            let lo = samples.iter().map(|s| s[i]).fold(f64::INFINITY, f64::min);
            let hi = samples.iter().map(|s| s[i]).fold(f64::NEG_INFINITY, f64::max);
            assert!(lo < 0.05, "ingredient {} min {}", i, lo);
            assert!(hi > 0.9, "ingredient {} max {}", i, hi);
        }
    }

    #[test]
    fn test_single_ingredient() {
        let bounds = BoundsTable::with_dimensions(1);
        let mut rng = StdRng::seed_from_u64(2);
        let samples = sample(&bounds, 3, 1, &mut rng).unwrap();
        assert_eq!(samples, vec![Formulation::new(vec![1.0]); 3]);
    }
}
