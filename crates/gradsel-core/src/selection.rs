//! The gradual-selection convergence loop.
//!
//! One invocation repeatedly scores tie points against a quality criterion,
//! finds a threshold that removes a bounded fraction of the cloud, deletes
//! the selection, re-optimizes the cameras, and evaluates the stop
//! conditions. The reconstruction-uncertainty and projection-accuracy
//! criteria deliberately run very few cycles (over-filtering on them is
//! known to over-constrain the model); the reprojection-error criterion
//! additionally runs a second adaptive round that re-weights the bundle
//! adjustment through a lower tie-point accuracy and keeps cycling until
//! the RMS goal is met or a cap fires.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::criterion::FilterCriterion;
use crate::engine::{EngineError, ReconstructionEngine};
use crate::math::Real;
use crate::metrics::{self, QualitySnapshot};
use crate::params::CameraOptParams;
use crate::threshold::{SearchOutcome, ShrinkBudget, ThresholdSearch};

/// Fatal failure of one gradual-selection run.
///
/// Running out of points is *not* an error; the loop ends normally with a
/// [`StopReason`] instead.
#[derive(Debug, Error)]
pub enum SelectionError {
    /// Alignment was never run on this chunk.
    #[error("chunk has no tie point cloud; run alignment first")]
    MissingPointCloud,
    /// The threshold-search increment was reduced past its cap without ever
    /// selecting a point. Safety valve against pathological score
    /// distributions.
    #[error("{criterion} filter increment reduced {shrinks} times without selecting points, stopping execution")]
    IncrementExhausted {
        criterion: FilterCriterion,
        shrinks: usize,
    },
    /// An engine call failed. State after a failed delete or optimize is
    /// ambiguous, so the run stops rather than continue.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Why a run (or one of its rounds) stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The RMS reprojection goal was met.
    GoalReached,
    /// Valid point count fell to the configured fraction of the initial
    /// count.
    PointFloor,
    /// The optimization cap for the round was reached.
    OptimizationCap,
    /// Fewer points than the search floor were selected at the starting
    /// threshold.
    InsufficientPoints,
    /// Sigma-naught moved away from 1.0 (only with
    /// [`SelectionConfig::unit_weight_divergence_break`]).
    UnitWeightDiverged,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::GoalReached => write!(f, "RMS goal reached"),
            StopReason::PointFloor => write!(f, "point count floor reached"),
            StopReason::OptimizationCap => write!(f, "optimization cap reached"),
            StopReason::InsufficientPoints => write!(f, "insufficient points selected"),
            StopReason::UnitWeightDiverged => write!(f, "unit weight statistic diverged"),
        }
    }
}

/// Goal and round-2 strategy for reprojection-error refinement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ReprojectionGoals {
    /// Target RMS reprojection error (pixels). Round 2 is entered only
    /// when round 1 ends above this.
    pub rms_goal: Real,
    /// Maximum delete/optimize cycles in round 2.
    pub round2_cap: usize,
    /// Tie-point accuracy the bundle adjustment is re-weighted with at the
    /// start of round 2.
    pub round2_tie_point_accuracy: Real,
    /// How far below the round-1 starting threshold round 2 starts.
    pub round2_threshold_drop: Real,
}

impl Default for ReprojectionGoals {
    fn default() -> Self {
        Self {
            rms_goal: 0.18,
            round2_cap: 12,
            round2_tie_point_accuracy: 0.10,
            round2_threshold_drop: 0.25,
        }
    }
}

/// Wider parameter set enabled once the selection threshold drops below a
/// level, reflecting the practice of not fitting a high-order lens model on
/// a noisy tie-point set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdaptiveWidening {
    /// Threshold below which the widened set takes over.
    pub below_threshold: Real,
    /// The widened parameter set.
    pub params: CameraOptParams,
}

/// Configuration of one gradual-selection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    pub criterion: FilterCriterion,
    /// Threshold every search episode starts from.
    pub start_threshold: Real,
    /// Maximum fraction of valid points removed per cycle.
    pub cutoff: Real,
    /// Threshold increment for the search.
    pub increment: Real,
    /// Absolute minimum selected count to keep cycling.
    pub search_floor: usize,
    /// Fraction of the initial valid count the loop may not shrink below.
    pub point_floor_fraction: Real,
    /// Maximum delete/optimize cycles (round 1 for reprojection error).
    pub optimization_cap: usize,
    /// Camera terms participating in optimization.
    pub params: CameraOptParams,
    /// RMS goal and round-2 strategy; reprojection error only.
    pub goals: Option<ReprojectionGoals>,
    /// Optional adaptive parameter widening.
    pub adaptive: Option<AdaptiveWidening>,
    /// Cap on threshold-search increment reductions for the whole run.
    pub max_shrinks: usize,
    /// Increment reduction factor.
    pub shrink_factor: Real,
    /// Stop round 2 when sigma-naught moves away from 1.0. Off by default;
    /// convergence is judged by the RMS goal and the caps.
    pub unit_weight_divergence_break: bool,
}

impl SelectionConfig {
    fn preset(criterion: FilterCriterion, level: Real) -> Self {
        Self {
            criterion,
            start_threshold: level,
            cutoff: 0.5,
            increment: 1.0,
            search_floor: 100,
            point_floor_fraction: 0.6,
            optimization_cap: 1,
            params: CameraOptParams::default(),
            goals: None,
            adaptive: None,
            max_shrinks: 15,
            shrink_factor: 0.25,
            unit_weight_divergence_break: false,
        }
    }

    /// Production defaults for the reconstruction-uncertainty criterion.
    /// Useful levels are 10 to 15.
    pub fn reconstruction_uncertainty(level: Real) -> Self {
        Self::preset(FilterCriterion::ReconstructionUncertainty, level)
    }

    /// Production defaults for the projection-accuracy criterion. Useful
    /// levels are 2 to 4.
    pub fn projection_accuracy(level: Real) -> Self {
        Self {
            increment: 0.2,
            ..Self::preset(FilterCriterion::ProjectionAccuracy, level)
        }
    }

    /// Production defaults for the two-round reprojection-error criterion.
    pub fn reprojection_error(level: Real, goals: ReprojectionGoals) -> Self {
        Self {
            cutoff: 0.10,
            increment: 0.01,
            point_floor_fraction: 0.25,
            optimization_cap: 30,
            goals: Some(goals),
            ..Self::preset(FilterCriterion::ReprojectionError, level)
        }
    }
}

/// One delete/optimize cycle of the trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    /// 1 or 2.
    pub round: usize,
    /// Cycle number within the round, starting at 1.
    pub cycle: usize,
    /// Threshold the deletion happened at.
    pub threshold: Real,
    /// Points deleted this cycle.
    pub selected: usize,
    /// Valid points remaining after the cycle.
    pub valid_after: usize,
    /// Statistics captured after the cycle's optimization.
    pub stats: QualitySnapshot,
}

/// Summary of the second reprojection-error round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoundTwoSummary {
    /// Delete/optimize cycles completed inside the round-2 loop.
    pub optimizations: usize,
    /// Points deleted in round 2.
    pub deleted: usize,
    /// Tie-point accuracy the round re-weighted the adjustment with.
    pub tie_point_accuracy: Real,
    /// Why the round stopped.
    pub stop: StopReason,
}

/// Result of one gradual-selection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionReport {
    pub criterion: FilterCriterion,
    /// Valid points when the run started.
    pub initial_points: usize,
    /// Valid points when the run ended.
    pub final_points: usize,
    /// Total points deleted; always `initial_points - final_points`.
    pub deleted: usize,
    /// Camera optimizations run, all rounds included.
    pub optimizations: usize,
    /// Threshold of the last deletion (the starting threshold if no cycle
    /// ran).
    pub final_threshold: Real,
    /// Why the run stopped.
    pub stop: StopReason,
    /// Present when the second reprojection-error round ran.
    pub round2: Option<RoundTwoSummary>,
    /// Statistics at the end of the run.
    pub final_stats: QualitySnapshot,
    /// Per-cycle trace for the processing log.
    pub trace: Vec<CycleRecord>,
}

/// Counters owned by one run, discarded at its end.
struct RunState {
    deleted: usize,
    optimizations: usize,
    final_threshold: Real,
    trace: Vec<CycleRecord>,
}

/// Run gradual selection on a chunk's tie-point cloud.
///
/// The upward interface of the core: the orchestrator calls this once per
/// refinement stage. Point deletions are irreversible within a run; an
/// `optimization_cap` of 0 performs no delete/optimize cycle at all and
/// returns the initial statistics unchanged.
///
/// # Errors
///
/// [`SelectionError::MissingPointCloud`] when alignment never ran,
/// [`SelectionError::IncrementExhausted`] when the threshold search runs
/// out of increment reductions, and [`SelectionError::Engine`] when an
/// engine call fails.
pub fn run_gradual_selection<E: ReconstructionEngine + ?Sized>(
    engine: &mut E,
    config: &SelectionConfig,
) -> Result<SelectionReport, SelectionError> {
    if !engine.has_tie_points() {
        return Err(SelectionError::MissingPointCloud);
    }

    let initial = engine.valid_points();
    let mut budget = ShrinkBudget::new(config.max_shrinks, config.shrink_factor);
    let mut state = RunState {
        deleted: 0,
        optimizations: 0,
        final_threshold: config.start_threshold,
        trace: Vec::new(),
    };

    info!(
        "gradual-selection: {} starting at threshold {} with {} valid points",
        config.criterion, config.start_threshold, initial
    );

    let mut stop = run_round_one(engine, config, initial, &mut budget, &mut state)?;

    let mut round2 = None;
    // a zero cap means no cycles at all, round 2 included
    if let Some(goals) = config.goals.filter(|_| config.optimization_cap > 0) {
        let rms = metrics::rms_reprojection_error(engine);
        if rms <= goals.rms_goal {
            info!(
                "gradual-selection: RMS {:.4} already within goal {:.4}, skipping round 2",
                rms, goals.rms_goal
            );
            stop = StopReason::GoalReached;
        } else {
            let summary = run_round_two(engine, config, &goals, initial, &mut budget, &mut state)?;
            stop = summary.stop;
            round2 = Some(summary);
        }
    }

    let final_points = engine.valid_points();
    let final_stats = QualitySnapshot::capture(engine);
    info!(
        "gradual-selection: {} completed, {} of {} points removed in {} optimizations ({})",
        config.criterion, state.deleted, initial, state.optimizations, stop
    );

    Ok(SelectionReport {
        criterion: config.criterion,
        initial_points: initial,
        final_points,
        deleted: state.deleted,
        optimizations: state.optimizations,
        final_threshold: state.final_threshold,
        stop,
        round2,
        final_stats,
        trace: state.trace,
    })
}

/// Parameter set for a round-1 optimization, applying adaptive widening
/// when the current threshold is low enough. Corrections fitting is always
/// suppressed in round 1.
fn round_params(config: &SelectionConfig, threshold: Real) -> CameraOptParams {
    match &config.adaptive {
        Some(widening) if threshold < widening.below_threshold => widening.params,
        _ => config.params,
    }
}

fn run_round_one<E: ReconstructionEngine + ?Sized>(
    engine: &mut E,
    config: &SelectionConfig,
    initial: usize,
    budget: &mut ShrinkBudget,
    state: &mut RunState,
) -> Result<StopReason, SelectionError> {
    let search = ThresholdSearch {
        criterion: config.criterion,
        start: config.start_threshold,
        increment: config.increment,
        cutoff: config.cutoff,
        floor: config.search_floor,
    };

    loop {
        if state.optimizations >= config.optimization_cap {
            return Ok(StopReason::OptimizationCap);
        }
        if engine.valid_points() as Real <= initial as Real * config.point_floor_fraction {
            return Ok(StopReason::PointFloor);
        }

        let filter = engine.init_filter(config.criterion)?;
        let (threshold, selected) = match search.run(engine, filter, budget)? {
            SearchOutcome::Insufficient { selected } => {
                debug!(
                    "gradual-selection: {} selected only {} points at the starting threshold",
                    config.criterion.tag(),
                    selected
                );
                return Ok(StopReason::InsufficientPoints);
            }
            SearchOutcome::Found {
                threshold,
                selected,
            } => (threshold, selected),
        };

        let removed = engine.delete_selected(filter)?;
        state.deleted += removed;
        state.final_threshold = threshold;
        debug!(
            "gradual-selection: {} {:.4} deleted {} points",
            config.criterion.tag(),
            threshold,
            removed
        );

        let params = round_params(config, threshold).without_corrections();
        engine.optimize_cameras(&params)?;
        state.optimizations += 1;

        state.trace.push(CycleRecord {
            round: 1,
            cycle: state.optimizations,
            threshold,
            selected,
            valid_after: engine.valid_points(),
            stats: QualitySnapshot::capture(engine),
        });
    }
}

fn run_round_two<E: ReconstructionEngine + ?Sized>(
    engine: &mut E,
    config: &SelectionConfig,
    goals: &ReprojectionGoals,
    initial: usize,
    budget: &mut ShrinkBudget,
    state: &mut RunState,
) -> Result<RoundTwoSummary, SelectionError> {
    info!(
        "gradual-selection: round 2 re-weighting with tie point accuracy {:.2}",
        goals.round2_tie_point_accuracy
    );
    engine.set_tie_point_accuracy(goals.round2_tie_point_accuracy);
    engine.optimize_cameras(&config.params.without_corrections())?;
    state.optimizations += 1;

    let search = ThresholdSearch {
        criterion: config.criterion,
        start: config.start_threshold - goals.round2_threshold_drop,
        increment: config.increment,
        cutoff: config.cutoff,
        floor: config.search_floor,
    };

    let mut cycles = 0usize;
    let mut deleted = 0usize;
    let mut prev_deviation = metrics::unit_weight_sigma(engine).map(|s| (s - 1.0).abs());

    let stop = loop {
        let rms = metrics::rms_reprojection_error(engine);
        if rms <= goals.rms_goal {
            break StopReason::GoalReached;
        }
        if engine.valid_points() as Real <= initial as Real * config.point_floor_fraction {
            break StopReason::PointFloor;
        }
        if cycles >= goals.round2_cap {
            break StopReason::OptimizationCap;
        }
        if config.unit_weight_divergence_break {
            if let Some(sigma) = metrics::unit_weight_sigma(engine) {
                let deviation = (sigma - 1.0).abs();
                if prev_deviation.is_some_and(|prev| deviation > prev) {
                    break StopReason::UnitWeightDiverged;
                }
                prev_deviation = Some(deviation);
            }
        }

        let filter = engine.init_filter(config.criterion)?;
        let (threshold, selected) = match search.run(engine, filter, budget)? {
            SearchOutcome::Insufficient { .. } => break StopReason::InsufficientPoints,
            SearchOutcome::Found {
                threshold,
                selected,
            } => (threshold, selected),
        };

        let removed = engine.delete_selected(filter)?;
        deleted += removed;
        state.deleted += removed;
        state.final_threshold = threshold;

        // in-loop optimizations honor the caller's corrections flag
        engine.optimize_cameras(&config.params)?;
        state.optimizations += 1;
        cycles += 1;

        state.trace.push(CycleRecord {
            round: 2,
            cycle: cycles,
            threshold,
            selected,
            valid_after: engine.valid_points(),
            stats: QualitySnapshot::capture(engine),
        });
    };

    // cleanup pass: drop any leftover selection and settle the adjustment
    let filter = engine.init_filter(config.criterion)?;
    engine.reset_selection(filter)?;
    engine.optimize_cameras(&config.params)?;
    state.optimizations += 1;

    info!(
        "gradual-selection: round 2 completed after {} cycles ({})",
        cycles, stop
    );

    Ok(RoundTwoSummary {
        optimizations: cycles,
        deleted,
        tie_point_accuracy: goals.round2_tie_point_accuracy,
        stop,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticChunk;

    #[test]
    fn missing_point_cloud_is_a_precondition_failure() {
        let mut chunk = SyntheticChunk::empty();
        let config = SelectionConfig::reconstruction_uncertainty(10.0);
        let err = run_gradual_selection(&mut chunk, &config).unwrap_err();
        assert!(matches!(err, SelectionError::MissingPointCloud));
    }

    #[test]
    fn zero_cap_runs_zero_cycles() {
        let mut chunk = SyntheticChunk::uniform(1000, 0.0, 20.0);
        let mut config = SelectionConfig::reconstruction_uncertainty(10.0);
        config.optimization_cap = 0;
        let report = run_gradual_selection(&mut chunk, &config).unwrap();
        assert_eq!(report.stop, StopReason::OptimizationCap);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.optimizations, 0);
        assert_eq!(report.initial_points, 1000);
        assert_eq!(report.final_points, 1000);
        assert_eq!(report.final_threshold, 10.0);
        assert!(report.trace.is_empty());
        assert_eq!(chunk.optimizations(), 0);
    }

    #[test]
    fn zero_cap_skips_round_two_entirely() {
        // noisy cloud whose RMS is far above the goal: round 2 would
        // re-weight and optimize if the cap did not gate it
        let mut chunk = SyntheticChunk::uniform(4000, 0.5, 2.0);
        let mut config = SelectionConfig::reprojection_error(0.3, ReprojectionGoals::default());
        config.optimization_cap = 0;
        let report = run_gradual_selection(&mut chunk, &config).unwrap();
        assert_eq!(report.stop, StopReason::OptimizationCap);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.optimizations, 0);
        assert!(report.round2.is_none());
        assert!(report.trace.is_empty());
        assert_eq!(chunk.optimizations(), 0);
        assert_eq!(chunk.tie_point_accuracy(), 1.0);
    }

    #[test]
    fn uncertainty_single_pass_policy() {
        // uniform scores in (0, 20), start 10, cutoff 0.5: the search keeps
        // the starting threshold and the loop runs exactly one cycle
        let mut chunk = SyntheticChunk::uniform(1000, 0.0, 20.0);
        let config = SelectionConfig::reconstruction_uncertainty(10.0);
        let report = run_gradual_selection(&mut chunk, &config).unwrap();
        assert_eq!(report.optimizations, 1);
        assert_eq!(report.stop, StopReason::OptimizationCap);
        assert_eq!(report.deleted, 500);
        assert_eq!(report.final_points, 500);
        assert_eq!(report.deleted, report.initial_points - report.final_points);
    }

    #[test]
    fn insufficient_points_ends_the_run_normally() {
        let mut chunk = SyntheticChunk::uniform(1000, 0.0, 20.0);
        // starting threshold above every score
        let config = SelectionConfig::reconstruction_uncertainty(30.0);
        let report = run_gradual_selection(&mut chunk, &config).unwrap();
        assert_eq!(report.stop, StopReason::InsufficientPoints);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.final_points, 1000);
    }

    #[test]
    fn search_exhaustion_is_fatal() {
        let mut chunk = SyntheticChunk::degenerate(1000, 5.0);
        let config = SelectionConfig::reconstruction_uncertainty(4.0);
        let err = run_gradual_selection(&mut chunk, &config).unwrap_err();
        assert!(matches!(err, SelectionError::IncrementExhausted { .. }));
    }

    #[test]
    fn round_two_skipped_when_goal_already_met() {
        // scores well below: RMS = sqrt(mean(score^2)) stays under the goal
        let scores: Vec<Real> = (0..1000).map(|i| 0.001 + i as Real * 0.0001).collect();
        let mut chunk = SyntheticChunk::with_scores(FilterCriterion::ReprojectionError, &scores);
        let config =
            SelectionConfig::reprojection_error(0.3, ReprojectionGoals::default());
        let accuracy_before = chunk.tie_point_accuracy();
        let report = run_gradual_selection(&mut chunk, &config).unwrap();
        assert_eq!(report.stop, StopReason::GoalReached);
        assert!(report.round2.is_none());
        // round 2 would have re-weighted the adjustment
        assert_eq!(chunk.tie_point_accuracy(), accuracy_before);
    }

    #[test]
    fn round_two_entered_when_goal_missed() {
        // large residuals that optimization does not improve keep the RMS
        // above the goal through round 1
        let mut chunk = SyntheticChunk::uniform(4000, 0.5, 2.0).with_optimize_gain(1.0);
        let goals = ReprojectionGoals::default();
        let config = SelectionConfig::reprojection_error(0.3, goals);
        let report = run_gradual_selection(&mut chunk, &config).unwrap();
        let round2 = report.round2.expect("round 2 should have run");
        assert_eq!(round2.tie_point_accuracy, goals.round2_tie_point_accuracy);
        assert_eq!(chunk.tie_point_accuracy(), goals.round2_tie_point_accuracy);
        assert!(matches!(
            round2.stop,
            StopReason::GoalReached
                | StopReason::PointFloor
                | StopReason::OptimizationCap
                | StopReason::InsufficientPoints
        ));
        assert_eq!(report.deleted, report.initial_points - report.final_points);
    }

    #[test]
    fn point_count_never_increases() {
        let mut chunk = SyntheticChunk::uniform(1500, 0.0, 5.0);
        let config = SelectionConfig::projection_accuracy(3.0);
        let before = chunk.valid_points();
        let report = run_gradual_selection(&mut chunk, &config).unwrap();
        assert!(chunk.valid_points() <= before);
        assert_eq!(report.deleted, before - chunk.valid_points());
    }

    #[test]
    fn presets_carry_production_defaults() {
        let ru = SelectionConfig::reconstruction_uncertainty(10.0);
        assert_eq!(ru.cutoff, 0.5);
        assert_eq!(ru.increment, 1.0);
        assert_eq!(ru.optimization_cap, 1);
        assert_eq!(ru.point_floor_fraction, 0.6);

        let pa = SelectionConfig::projection_accuracy(3.0);
        assert_eq!(pa.increment, 0.2);
        assert_eq!(pa.cutoff, 0.5);

        let re = SelectionConfig::reprojection_error(0.3, ReprojectionGoals::default());
        assert_eq!(re.cutoff, 0.10);
        assert_eq!(re.increment, 0.01);
        assert_eq!(re.point_floor_fraction, 0.25);
        assert_eq!(re.optimization_cap, 30);
        let goals = re.goals.unwrap();
        assert_eq!(goals.rms_goal, 0.18);
        assert_eq!(goals.round2_cap, 12);
    }
}
