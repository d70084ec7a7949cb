//! Tie-point quality criteria recognized by gradual-selection filters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality criterion a tie-point filter can be initialized with.
///
/// The reconstruction engine assigns each valid point a scalar score for the
/// chosen criterion when the filter is initialized; raising the selection
/// threshold always selects fewer points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterCriterion {
    /// Base-to-height geometry uncertainty of the triangulated point.
    ReconstructionUncertainty,
    /// Image-space measurement precision of the point's projections.
    ProjectionAccuracy,
    /// Pixel residual between observed and predicted projections.
    ReprojectionError,
}

impl FilterCriterion {
    /// Short tag used in chunk labels and log lines (`RU`, `PA`, `RE`).
    pub fn tag(&self) -> &'static str {
        match self {
            FilterCriterion::ReconstructionUncertainty => "RU",
            FilterCriterion::ProjectionAccuracy => "PA",
            FilterCriterion::ReprojectionError => "RE",
        }
    }
}

impl fmt::Display for FilterCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterCriterion::ReconstructionUncertainty => write!(f, "Reconstruction Uncertainty"),
            FilterCriterion::ProjectionAccuracy => write!(f, "Projection Accuracy"),
            FilterCriterion::ReprojectionError => write!(f, "Reprojection Error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_stable() {
        assert_eq!(FilterCriterion::ReconstructionUncertainty.tag(), "RU");
        assert_eq!(FilterCriterion::ProjectionAccuracy.tag(), "PA");
        assert_eq!(FilterCriterion::ReprojectionError.tag(), "RE");
    }

    #[test]
    fn serde_round_trip() {
        let json = serde_json::to_string(&FilterCriterion::ReprojectionError).unwrap();
        let back: FilterCriterion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FilterCriterion::ReprojectionError);
    }
}
