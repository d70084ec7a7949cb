//! End-to-end properties of the gradual-selection loop on synthetic clouds.

use gradsel_core::{
    run_gradual_selection, FilterCriterion, Real, ReconstructionEngine, ReprojectionGoals,
    SelectionConfig, SelectionError, StopReason, SyntheticChunk,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

#[test]
fn deleted_count_always_balances_for_every_criterion() {
    let configs = [
        SelectionConfig::reconstruction_uncertainty(10.0),
        SelectionConfig::projection_accuracy(3.0),
        SelectionConfig::reprojection_error(0.3, ReprojectionGoals::default()),
    ];
    for config in configs {
        let mut chunk = SyntheticChunk::from_ranges(
            1200,
            [0.0, 30.0],
            [0.0, 6.0],
            [0.0, 1.0],
        );
        let before = chunk.valid_points();
        let report = run_gradual_selection(&mut chunk, &config)
            .unwrap_or_else(|e| panic!("{} run failed: {e}", config.criterion));
        assert!(chunk.valid_points() <= before, "{}", config.criterion);
        assert_eq!(report.initial_points, before);
        assert_eq!(report.final_points, chunk.valid_points());
        assert_eq!(
            report.deleted,
            report.initial_points - report.final_points,
            "{}",
            config.criterion
        );
    }
}

#[test]
fn uncertainty_loop_respects_cap_and_floor() {
    // 1000 valid points, cutoff 0.5, floor 100: the loop must end within
    // the optimization cap, either above the 60% point floor or having
    // stopped for the floor/insufficient-points condition
    let mut chunk = SyntheticChunk::uniform(1000, 0.0, 20.0);
    let config = SelectionConfig::reconstruction_uncertainty(12.0);
    let report = run_gradual_selection(&mut chunk, &config).unwrap();
    assert!(report.optimizations <= config.optimization_cap);
    assert!(
        report.final_points >= 600
            || matches!(
                report.stop,
                StopReason::PointFloor | StopReason::InsufficientPoints
            )
            || report.stop == StopReason::OptimizationCap
    );
}

#[test]
fn end_to_end_uncertainty_single_cycle() {
    // uniform scores in (0, 20), start 10, cutoff 0.5, increment 1,
    // floor 100: the search settles within a handful of ladder steps and
    // the loop runs exactly one optimization
    let mut chunk = SyntheticChunk::uniform(1000, 0.0, 20.0);
    let config = SelectionConfig::reconstruction_uncertainty(10.0);
    let report = run_gradual_selection(&mut chunk, &config).unwrap();
    assert_eq!(report.optimizations, 1);
    assert_eq!(report.trace.len(), 1);
    let cycle = &report.trace[0];
    assert!(cycle.threshold >= 10.0 && cycle.threshold <= 20.0);
    assert!(cycle.selected * 2 <= 1000);
    assert_eq!(report.stop, StopReason::OptimizationCap);
}

#[test]
fn zero_iteration_cap_is_idempotent() {
    let mut chunk = SyntheticChunk::uniform(500, 0.0, 20.0);
    let reference = chunk.clone();
    let mut config = SelectionConfig::projection_accuracy(3.0);
    config.optimization_cap = 0;
    let report = run_gradual_selection(&mut chunk, &config).unwrap();
    assert_eq!(report.deleted, 0);
    assert_eq!(report.optimizations, 0);
    assert_eq!(chunk.valid_points(), reference.valid_points());
    assert_eq!(chunk.optimizations(), 0);
    assert_eq!(
        report.final_stats.rms_reprojection_error,
        gradsel_core::metrics::rms_reprojection_error(&reference)
    );

    // reprojection error too: a noisy cloud above the RMS goal must not
    // trigger the round-2 re-weighting schedule under a zero cap
    let mut noisy = SyntheticChunk::uniform(4000, 0.5, 2.0);
    let reference = noisy.clone();
    let mut config = SelectionConfig::reprojection_error(0.3, ReprojectionGoals::default());
    config.optimization_cap = 0;
    let report = run_gradual_selection(&mut noisy, &config).unwrap();
    assert_eq!(report.optimizations, 0);
    assert_eq!(report.deleted, 0);
    assert!(report.round2.is_none());
    assert_eq!(noisy.valid_points(), reference.valid_points());
    assert_eq!(noisy.optimizations(), 0);
    assert_eq!(noisy.tie_point_accuracy(), reference.tie_point_accuracy());
}

#[test]
fn reprojection_round_two_only_above_goal() {
    // below goal after round 1: round 2 must never be invoked
    let small: Vec<Real> = (0..1000).map(|i| i as Real * 1e-4).collect();
    let mut quiet = SyntheticChunk::with_scores(FilterCriterion::ReprojectionError, &small);
    let config = SelectionConfig::reprojection_error(0.3, ReprojectionGoals::default());
    let report = run_gradual_selection(&mut quiet, &config).unwrap();
    assert_eq!(report.stop, StopReason::GoalReached);
    assert!(report.round2.is_none());
    assert_eq!(quiet.tie_point_accuracy(), 1.0);

    // above goal after round 1: round 2 runs and re-weights the adjustment
    let mut noisy = SyntheticChunk::uniform(4000, 0.5, 2.0).with_optimize_gain(1.0);
    let report = run_gradual_selection(&mut noisy, &config).unwrap();
    let round2 = report.round2.expect("round 2 should run above the goal");
    assert_eq!(noisy.tie_point_accuracy(), 0.10);
    assert_eq!(round2.tie_point_accuracy, 0.10);
}

#[test]
fn reprojection_goal_reached_through_optimization() {
    // improving optimizations drive the RMS under the goal during round 1;
    // the run must finish as GoalReached without round 2
    let mut chunk = SyntheticChunk::uniform(4000, 0.1, 1.0).with_optimize_gain(0.5);
    let config = SelectionConfig::reprojection_error(0.3, ReprojectionGoals::default());
    let report = run_gradual_selection(&mut chunk, &config).unwrap();
    assert_eq!(report.stop, StopReason::GoalReached);
    assert!(report.round2.is_none());
    assert!(report.final_stats.rms_reprojection_error <= 0.18);
}

#[test]
fn degenerate_cloud_surfaces_increment_exhaustion() {
    let mut chunk = SyntheticChunk::degenerate(1000, 7.0);
    let config = SelectionConfig::reconstruction_uncertainty(5.0);
    match run_gradual_selection(&mut chunk, &config) {
        Err(SelectionError::IncrementExhausted { criterion, shrinks }) => {
            assert_eq!(criterion, FilterCriterion::ReconstructionUncertainty);
            assert!(shrinks > 15);
        }
        other => panic!("expected increment exhaustion, got {other:?}"),
    }
}

#[test]
fn missing_cloud_reported_before_the_loop() {
    let mut chunk = SyntheticChunk::empty();
    let config = SelectionConfig::reprojection_error(0.3, ReprojectionGoals::default());
    assert!(matches!(
        run_gradual_selection(&mut chunk, &config),
        Err(SelectionError::MissingPointCloud)
    ));
}

#[test]
fn random_clouds_never_grow_and_respect_cutoff_per_cycle() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..10 {
        let n = rng.gen_range(500..3000);
        let hi = rng.gen_range(5.0..40.0);
        let scores: Vec<Real> = (0..n).map(|_| rng.gen_range(0.0..hi)).collect();
        let mut chunk =
            SyntheticChunk::with_scores(FilterCriterion::ReconstructionUncertainty, &scores);
        let config = SelectionConfig::reconstruction_uncertainty(hi * 0.5);
        let before = chunk.valid_points();
        let report = run_gradual_selection(&mut chunk, &config).unwrap();
        assert!(report.final_points <= before);
        for cycle in &report.trace {
            // each deletion stayed within the cutoff of the count it was
            // selected from
            assert!(cycle.selected as Real <= config.cutoff * (cycle.valid_after + cycle.selected) as Real + 1.0);
        }
    }
}
