use eyre::Result;
use fmcore::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn tight_bounds() -> BoundsTable {
    BoundsTable::from_entries([
        ("water", 0.30, 0.70),
        ("ethanol", 0.05, 0.25),
        ("glycerol", 0.00, 0.15),
        ("polymer", 0.10, 0.40),
        ("salt", 0.00, 0.02),
    ])
    .unwrap()
}

#[test]
fn test_projector_points_are_feasible() -> Result<()> {
    let bounds = tight_bounds();
    let points = simplex::generate(&bounds, 500, 22)?;
    assert_eq!(points.len(), 500);
    for point in &points {
        assert!(is_valid(point, &bounds), "{:?}", point);
        assert!((point.total() - 1.0).abs() <= 1e-10);
    }
    Ok(())
}

#[test]
fn test_projector_is_reproducible() -> Result<()> {
    let bounds = tight_bounds();
    assert_eq!(
        simplex::generate(&bounds, 20, 7)?,
        simplex::generate(&bounds, 20, 7)?
    );
    assert_ne!(
        simplex::generate(&bounds, 20, 7)?,
        simplex::generate(&bounds, 20, 8)?
    );
    Ok(())
}

#[test]
fn test_infeasible_bounds_fail_loudly() {
    let mut rng = StdRng::seed_from_u64(0);
    let bounds = BoundsTable::from_entries([("a", 0.5, 1.0), ("b", 0.6, 1.0)]).unwrap();
    assert!(matches!(
        simplex::sample(&bounds, &mut rng),
        Err(FormulationError::LowerBoundsExceedOne(_))
    ));
    assert!(matches!(
        gibbs::sample(&bounds, 10, 0, &mut rng),
        Err(FormulationError::LowerBoundsExceedOne(_))
    ));
}

#[test]
fn test_bounds_just_past_one_fail_loudly() {
    let mut rng = StdRng::seed_from_u64(0);
    let bounds = BoundsTable::from_entries([("a", 0.5, 1.0), ("b", 0.5000005, 1.0)]).unwrap();
    assert!(matches!(
        simplex::sample(&bounds, &mut rng),
        Err(FormulationError::LowerBoundsExceedOne(_))
    ));
    assert!(matches!(
        gibbs::sample(&bounds, 10, 0, &mut rng),
        Err(FormulationError::LowerBoundsExceedOne(_))
    ));
}

#[test]
fn test_gibbs_samples_are_feasible() -> Result<()> {
    let bounds = tight_bounds();
    let mut rng = StdRng::seed_from_u64(347);
    let samples = gibbs::sample(&bounds, 2000, 200, &mut rng)?;
    assert_eq!(samples.len(), 2000);
    for sample in &samples {
        assert!(is_valid(sample, &bounds), "{:?}", sample);
    }
    Ok(())
}

#[test]
fn test_gibbs_is_reproducible() -> Result<()> {
    let bounds = tight_bounds();
    let a = gibbs::sample(&bounds, 100, 10, &mut StdRng::seed_from_u64(1))?;
    let b = gibbs::sample(&bounds, 100, 10, &mut StdRng::seed_from_u64(1))?;
    assert_eq!(a, b);
    Ok(())
}

/// Proposals may leave the feasible region, but the moves that preserve the sum always do so
#[test]
fn test_proposals_preserve_the_sum() -> Result<()> {
    let bounds = tight_bounds();
    let engine = ProposalEngine::new(bounds.clone());
    let mut rng = StdRng::seed_from_u64(5);
    let mut current = simplex::sample(&bounds, &mut rng)?;

    for _ in 0..1000 {
        let (proposal, proposed) = engine.propose(&current, &mut rng);
        assert_eq!(proposed.len(), bounds.len());
        if matches!(proposal, Move::PairwiseTransfer | Move::Rebalance) {
            assert!((proposed.total() - 1.0).abs() < 1e-9, "{}: {:?}", proposal, proposed);
        }
        if is_valid(&proposed, &bounds) {
            current = proposed;
        }
    }
    Ok(())
}
