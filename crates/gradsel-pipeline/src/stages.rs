//! Workflow stages and the stage plan.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One stage of the refinement workflow, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Align,
    ReconstructionUncertainty,
    ProjectionAccuracy,
    ReprojectionError,
    DenseCloud,
    Products,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Align => write!(f, "Alignment"),
            Stage::ReconstructionUncertainty => write!(f, "Reconstruction Uncertainty"),
            Stage::ProjectionAccuracy => write!(f, "Projection Accuracy"),
            Stage::ReprojectionError => write!(f, "Reprojection Error"),
            Stage::DenseCloud => write!(f, "Dense Cloud"),
            Stage::Products => write!(f, "Products"),
        }
    }
}

/// Which stages a workflow run executes. Stage flags map 1:1 to the CLI;
/// an empty plan is normalized to "run everything" by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagePlan {
    pub align: bool,
    pub reconstruction_uncertainty: bool,
    pub projection_accuracy: bool,
    pub reprojection_error: bool,
    pub dense_cloud: bool,
    pub products: bool,
}

impl StagePlan {
    /// Every stage enabled.
    pub fn all() -> Self {
        Self {
            align: true,
            reconstruction_uncertainty: true,
            projection_accuracy: true,
            reprojection_error: true,
            dense_cloud: true,
            products: true,
        }
    }

    /// Only the three gradual-selection stages.
    pub fn refinement() -> Self {
        Self {
            reconstruction_uncertainty: true,
            projection_accuracy: true,
            reprojection_error: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The enabled stages in execution order.
    pub fn stages(&self) -> Vec<Stage> {
        let all = [
            (self.align, Stage::Align),
            (
                self.reconstruction_uncertainty,
                Stage::ReconstructionUncertainty,
            ),
            (self.projection_accuracy, Stage::ProjectionAccuracy),
            (self.reprojection_error, Stage::ReprojectionError),
            (self.dense_cloud, Stage::DenseCloud),
            (self.products, Stage::Products),
        ];
        all.iter()
            .filter(|(on, _)| *on)
            .map(|(_, stage)| *stage)
            .collect()
    }
}
