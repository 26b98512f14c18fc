use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::FormulationError;
use crate::structs::bounds::BoundsTable;
use crate::structs::formulation::Formulation;

/// Number of fresh draws before giving up
pub const MAX_ATTEMPTS: usize = 1000;
/// Maximum deviation of the sum from one for an accepted point
const SUM_TOLERANCE: f64 = 1e-10;

/// Draws a single random point from the bounded simplex
///
/// An unconstrained uniform vector is normalized to unit sum and then repaired: ingredients below their minimum pull the deficit from ingredients with slack above their own minimum,
/// and ingredients above their maximum push the excess to ingredients with room below their own maximum, in both cases proportionally.
/// Up to `2N` repair passes are made per draw, and up to [MAX_ATTEMPTS] draws before the bounds are reported as over-constrained.
///
/// An empty table yields an empty formulation.
pub fn sample<R: Rng + ?Sized>(
    bounds: &BoundsTable,
    rng: &mut R,
) -> Result<Formulation, FormulationError> {
    sample_with_budget(bounds, rng, MAX_ATTEMPTS)
}

/// [sample] with an explicit number of draws before [FormulationError::Exhausted] is returned
pub(crate) fn sample_with_budget<R: Rng + ?Sized>(
    bounds: &BoundsTable,
    rng: &mut R,
    attempts: usize,
) -> Result<Formulation, FormulationError> {
    if bounds.is_empty() {
        return Ok(Formulation::empty());
    }
    bounds.check_feasible()?;

    for attempt in 0..attempts {
        if let Some(point) = attempt_draw(bounds, rng) {
            if attempt > 0 {
                tracing::trace!("Simplex point found after {} attempts", attempt + 1);
            }
            return Ok(Formulation::new(point));
        }
    }

    Err(FormulationError::Exhausted { attempts })
}

/// Generate `n_points` independent points from the bounded simplex using a seeded generator
pub fn generate(
    bounds: &BoundsTable,
    n_points: usize,
    seed: u64,
) -> Result<Vec<Formulation>, FormulationError> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n_points).map(|_| sample(bounds, &mut rng)).collect()
}

fn attempt_draw<R: Rng + ?Sized>(bounds: &BoundsTable, rng: &mut R) -> Option<Vec<f64>> {
    let n = bounds.len();
    let mut x: Vec<f64> = (0..n).map(|_| rng.random::<f64>()).collect();
    normalize(&mut x)?;

    for _ in 0..(2 * n) {
        let modified = repair(&mut x, bounds)?;
        normalize(&mut x)?;

        // Values within rounding of a bound are snapped onto it
        let clamped: Vec<f64> = x
            .iter()
            .zip(bounds.bounds())
            .map(|(&v, b)| b.clamp(v))
            .collect();
        let sum: f64 = clamped.iter().sum();
        if (sum - 1.0).abs() < SUM_TOLERANCE {
            return Some(clamped);
        }

        if !modified {
            break;
        }
    }
    None
}

/// One pass over every ingredient, moving mass to satisfy its bound
///
/// Returns `None` when a violated bound has no partner to trade mass with.
fn repair(x: &mut [f64], bounds: &BoundsTable) -> Option<bool> {
    let mut modified = false;
    for i in 0..x.len() {
        let bound = bounds.bound(i);
        if x[i] < bound.min {
            let deficit = bound.min - x[i];
            let slack: Vec<(usize, f64)> = (0..x.len())
                .filter(|&j| j != i)
                .map(|j| (j, x[j] - bounds.bound(j).min))
                .filter(|(_, s)| *s > 0.0)
                .collect();
            let total: f64 = slack.iter().map(|(_, s)| s).sum();
            if total <= 0.0 {
                return None;
            }
            let taken = deficit.min(total);
            for (j, s) in slack {
                x[j] -= taken * s / total;
            }
            x[i] += taken;
            modified = true;
        } else if x[i] > bound.max {
            let excess = x[i] - bound.max;
            let room: Vec<(usize, f64)> = (0..x.len())
                .filter(|&j| j != i)
                .map(|j| (j, bounds.bound(j).max - x[j]))
                .filter(|(_, r)| *r > 0.0)
                .collect();
            let total: f64 = room.iter().map(|(_, r)| r).sum();
            if total <= 0.0 {
                return None;
            }
            let given = excess.min(total);
            for (j, r) in room {
                x[j] += given * r / total;
            }
            x[i] -= given;
            modified = true;
        }
    }
    Some(modified)
}

fn normalize(x: &mut [f64]) -> Option<()> {
    let sum: f64 = x.iter().sum();
    if !(sum > 0.0) || !sum.is_finite() {
        return None;
    }
    x.iter_mut().for_each(|v| *v /= sum);
    Some(())
}
