//! Adaptive threshold search for gradual-selection filters.
//!
//! One search episode locates a criterion threshold whose selection stays
//! within the caller's per-iteration removal budget. The search only ever
//! raises the threshold from the caller-supplied start; a later round
//! wanting a looser threshold passes a smaller start explicitly.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::criterion::FilterCriterion;
use crate::engine::{FilterId, ReconstructionEngine};
use crate::math::Real;
use crate::selection::SelectionError;

/// Parameters of one threshold search episode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThresholdSearch {
    pub criterion: FilterCriterion,
    /// Threshold to start selecting at.
    pub start: Real,
    /// Amount the threshold is raised per adjustment step.
    pub increment: Real,
    /// Maximum fraction of currently-valid points one deletion may remove.
    pub cutoff: Real,
    /// Absolute minimum selected count for the outer loop to keep going.
    pub floor: usize,
}

/// Outcome of a search episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchOutcome {
    /// A threshold was found; `selected / valid <= cutoff` and the points
    /// are left selected in the engine, ready to delete.
    Found { threshold: Real, selected: usize },
    /// Fewer than `floor` points selected at the starting threshold. Normal
    /// stop signal for the outer loop, not an error.
    Insufficient { selected: usize },
}

/// Increment-reduction budget shared across one gradual-selection run.
///
/// A step that selects zero points overshot the score distribution; the
/// increment is reduced and the step retried. The budget caps the total
/// number of reductions for the whole run so a pathological distribution
/// cannot loop forever.
#[derive(Debug, Clone)]
pub struct ShrinkBudget {
    spent: usize,
    cap: usize,
    factor: Real,
}

impl ShrinkBudget {
    pub fn new(cap: usize, factor: Real) -> Self {
        Self {
            spent: 0,
            cap,
            factor,
        }
    }

    /// Number of reductions taken so far.
    pub fn spent(&self) -> usize {
        self.spent
    }

    /// Record one reduction, failing once the cap is exceeded.
    pub fn spend(&mut self, criterion: FilterCriterion) -> Result<Real, SelectionError> {
        self.spent += 1;
        if self.spent > self.cap {
            return Err(SelectionError::IncrementExhausted {
                criterion,
                shrinks: self.spent,
            });
        }
        Ok(self.factor)
    }
}

impl ThresholdSearch {
    /// Run the search against an initialized filter.
    ///
    /// Selects at `start`, then raises the threshold by the increment until
    /// the selected fraction of valid points is within `cutoff`. A step
    /// that selects zero points restores the last good threshold, reduces
    /// the increment via the shared budget, and retries.
    pub fn run<E: ReconstructionEngine + ?Sized>(
        &self,
        engine: &mut E,
        filter: FilterId,
        budget: &mut ShrinkBudget,
    ) -> Result<SearchOutcome, SelectionError> {
        let mut threshold = self.start;
        let mut increment = self.increment;

        engine.select_points(filter, threshold)?;
        let mut selected = engine.count_selected(filter)?;
        let valid = engine.valid_points();
        debug!(
            "{}: threshold {:.4} selected {} of {} valid points",
            self.criterion.tag(),
            threshold,
            selected,
            valid
        );

        if selected < self.floor {
            return Ok(SearchOutcome::Insufficient { selected });
        }

        while selected as Real > self.cutoff * valid as Real {
            let raised = threshold + increment;
            engine.select_points(filter, raised)?;
            let at_raised = engine.count_selected(filter)?;
            if at_raised == 0 {
                let factor = budget.spend(self.criterion)?;
                increment *= factor;
                debug!(
                    "{}: increment too large, reducing to {} (reduction #{})",
                    self.criterion.tag(),
                    increment,
                    budget.spent()
                );
                // restore the last good selection before retrying finer
                engine.select_points(filter, threshold)?;
                continue;
            }
            threshold = raised;
            selected = at_raised;
            debug!(
                "{}: threshold {:.4} selected {} / {} ({:.2}%), adjusting",
                self.criterion.tag(),
                threshold,
                selected,
                valid,
                selected as Real / valid as Real * 100.0
            );
        }

        Ok(SearchOutcome::Found {
            threshold,
            selected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticChunk;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const RE: FilterCriterion = FilterCriterion::ReprojectionError;

    fn budget() -> ShrinkBudget {
        ShrinkBudget::new(15, 0.25)
    }

    fn search(start: Real, increment: Real, cutoff: Real, floor: usize) -> ThresholdSearch {
        ThresholdSearch {
            criterion: RE,
            start,
            increment,
            cutoff,
            floor,
        }
    }

    #[test]
    fn start_threshold_within_cutoff_is_kept() {
        // scores evenly spread over (0, 20); start at 10 selects half
        let mut chunk = SyntheticChunk::uniform(1000, 0.0, 20.0);
        let filter = chunk.init_filter(RE).unwrap();
        let out = search(10.0, 1.0, 0.5, 100)
            .run(&mut chunk, filter, &mut budget())
            .unwrap();
        match out {
            SearchOutcome::Found {
                threshold,
                selected,
            } => {
                assert_eq!(threshold, 10.0);
                assert_eq!(selected, 500);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn threshold_is_raised_until_fraction_within_cutoff() {
        let mut chunk = SyntheticChunk::uniform(1000, 0.0, 20.0);
        let filter = chunk.init_filter(RE).unwrap();
        // start at 2 selects 90%; cutoff 0.5 forces the search upward
        let out = search(2.0, 1.0, 0.5, 100)
            .run(&mut chunk, filter, &mut budget())
            .unwrap();
        match out {
            SearchOutcome::Found {
                threshold,
                selected,
            } => {
                assert!(threshold >= 10.0);
                assert!(selected > 0);
                assert!(selected as Real <= 0.5 * chunk.valid_points() as Real);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn insufficient_points_signalled_below_floor() {
        let mut chunk = SyntheticChunk::uniform(1000, 0.0, 20.0);
        let filter = chunk.init_filter(RE).unwrap();
        // start above the score range: nothing selected
        let out = search(25.0, 1.0, 0.5, 100)
            .run(&mut chunk, filter, &mut budget())
            .unwrap();
        assert_eq!(out, SearchOutcome::Insufficient { selected: 0 });
    }

    #[test]
    fn degenerate_distribution_exhausts_the_budget() {
        // every point shares one score; any raised threshold selects zero
        let mut chunk = SyntheticChunk::degenerate(1000, 5.0);
        let filter = chunk.init_filter(RE).unwrap();
        let err = search(4.0, 1.0, 0.5, 100)
            .run(&mut chunk, filter, &mut budget())
            .unwrap_err();
        match err {
            SelectionError::IncrementExhausted { criterion, shrinks } => {
                assert_eq!(criterion, RE);
                assert_eq!(shrinks, 16);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn exit_invariant_holds_over_random_distributions() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let n = rng.gen_range(200..2000);
            let hi = rng.gen_range(1.0..50.0);
            let scores: Vec<Real> = (0..n).map(|_| rng.gen_range(0.0..hi)).collect();
            let mut chunk = SyntheticChunk::with_scores(RE, &scores);
            let filter = chunk.init_filter(RE).unwrap();
            let cutoff = rng.gen_range(0.1..0.9);
            let out = search(hi * 0.05, hi * 0.02, cutoff, 10)
                .run(&mut chunk, filter, &mut budget())
                .expect("search should succeed on a spread distribution");
            if let SearchOutcome::Found {
                threshold,
                selected,
            } = out
            {
                assert!(threshold >= hi * 0.05);
                assert!(selected > 0);
                assert!(
                    selected as Real <= cutoff * chunk.valid_points() as Real,
                    "selected {selected} of {} exceeds cutoff {cutoff}",
                    chunk.valid_points()
                );
                assert_eq!(chunk.count_selected(filter).unwrap(), selected);
            }
        }
    }
}
