use rand::Rng;
use rand_distr::{Distribution, Gamma};

/// Minimum transferable amount for a pairwise transfer to be attempted
const MIN_TRANSFER: f64 = 1e-6;
/// Maximum change of a single ingredient in a rebalance move
const REBALANCE_STEP: f64 = 0.1;
/// No single ingredient is rebalanced above this fraction
const REBALANCE_CEILING: f64 = 0.95;

/// Pick two distinct indices in `0..n` uniformly, `n` must be at least two
pub(crate) fn distinct_pair<R: Rng + ?Sized>(n: usize, rng: &mut R) -> (usize, usize) {
    let i = rng.random_range(0..n);
    let mut j = rng.random_range(0..n - 1);
    if j >= i {
        j += 1;
    }
    (i, j)
}

/// Transfer a signed random amount of mass from ingredient `i` to ingredient `j`
///
/// The amount is drawn uniformly from `[-m, m]` with `m = min(x_i, 1 - x_j)`.
/// The sum is preserved exactly, the bounds are not.
pub fn pairwise_transfer<R: Rng + ?Sized>(current: &[f64], rng: &mut R) -> Vec<f64> {
    let mut new = current.to_vec();
    if current.len() < 2 {
        return new;
    }

    let (i, j) = distinct_pair(current.len(), rng);
    let max_transfer = current[i].min(1.0 - current[j]);
    if max_transfer > MIN_TRANSFER {
        let amount = rng.random_range(-max_transfer..=max_transfer);
        new[i] -= amount;
        new[j] += amount;
    }
    new
}

/// Redraw the whole formulation from a Dirichlet distribution centered on `current`
///
/// The concentration of ingredient `i` is `x_i * locality_factor + epsilon`, so larger locality factors keep proposals closer to `current`.
/// The Dirichlet draw is built from independent Gamma draws normalized to unit sum.
pub fn dirichlet<R: Rng + ?Sized>(
    current: &[f64],
    locality_factor: f64,
    epsilon: f64,
    rng: &mut R,
) -> Vec<f64> {
    let mut draws = Vec::with_capacity(current.len());
    for &x in current {
        let alpha = x.max(0.0) * locality_factor + epsilon;
        match Gamma::new(alpha, 1.0) {
            Ok(gamma) => draws.push(gamma.sample(rng)),
            Err(_) => return current.to_vec(),
        }
    }

    let total: f64 = draws.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        return current.to_vec();
    }
    draws.iter().map(|g| g / total).collect()
}

/// Redraw a single ingredient near its current value and rescale the others to keep the sum at one
pub fn rebalance<R: Rng + ?Sized>(current: &[f64], rng: &mut R) -> Vec<f64> {
    let mut new = current.to_vec();
    if current.is_empty() {
        return new;
    }

    let i = rng.random_range(0..current.len());
    let old = current[i];
    let lower = (old - REBALANCE_STEP).max(0.0);
    let upper = (old + REBALANCE_STEP).min(REBALANCE_CEILING);
    if lower > upper {
        return new;
    }
    let value = rng.random_range(lower..=upper);

    let others: f64 = current
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != i)
        .map(|(_, x)| x)
        .sum();
    // Nothing to rescale against
    if others <= MIN_TRANSFER {
        return new;
    }

    let scale = (1.0 - value) / others;
    for (j, x) in new.iter_mut().enumerate() {
        if j == i {
            *x = value;
        } else {
            *x *= scale;
        }
    }
    new
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_distinct_pair() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let (i, j) = distinct_pair(4, &mut rng);
            assert_ne!(i, j);
            assert!(i < 4 && j < 4);
        }
    }

    #[test]
    fn test_pairwise_transfer_preserves_sum() {
        let mut rng = StdRng::seed_from_u64(2);
        let current = vec![0.1, 0.2, 0.3, 0.4];
        for _ in 0..500 {
            let new = pairwise_transfer(&current, &mut rng);
            assert_abs_diff_eq!(new.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
            let changed = new
                .iter()
                .zip(&current)
                .filter(|(a, b)| (*a - *b).abs() > 0.0)
                .count();
            assert!(changed == 0 || changed == 2);
        }
    }

    #[test]
    fn test_pairwise_transfer_single_ingredient() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(pairwise_transfer(&[1.0], &mut rng), vec![1.0]);
    }

    #[test]
    fn test_dirichlet_lies_on_simplex() {
        let mut rng = StdRng::seed_from_u64(4);
        let current = vec![0.0, 0.25, 0.75];
        for _ in 0..200 {
            let new = dirichlet(&current, 100.0, 1e-6, &mut rng);
            assert_eq!(new.len(), 3);
            assert!(new.iter().all(|&x| x >= 0.0));
            assert_abs_diff_eq!(new.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_dirichlet_locality() {
        // A large locality factor keeps proposals close to the current point
        let mut rng = StdRng::seed_from_u64(5);
        let current = vec![0.5, 0.3, 0.2];
        let n = 500;
        let mut mean = vec![0.0; 3];
        for _ in 0..n {
            let new = dirichlet(&current, 1e5, 1e-6, &mut rng);
            for (m, x) in mean.iter_mut().zip(&new) {
                *m += x / n as f64;
            }
        }
        for (m, x) in mean.iter().zip(&current) {
            assert_abs_diff_eq!(m, x, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_rebalance_preserves_sum() {
        let mut rng = StdRng::seed_from_u64(6);
        let current = vec![0.05, 0.15, 0.3, 0.5];
        for _ in 0..500 {
            let new = rebalance(&current, &mut rng);
            assert_abs_diff_eq!(new.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
            assert!(new.iter().all(|&x| x >= 0.0 && x <= 1.0));
        }
    }

    #[test]
    fn test_rebalance_step_size() {
        let mut rng = StdRng::seed_from_u64(8);
        let current = vec![0.5, 0.5];
        for _ in 0..200 {
            let new = rebalance(&current, &mut rng);
            assert!(new.iter().all(|&x| (x - 0.5).abs() <= REBALANCE_STEP + 1e-12));
        }
    }

    #[test]
    fn test_rebalance_single_ingredient_is_unchanged() {
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(rebalance(&[1.0], &mut rng), vec![1.0]);
    }
}
