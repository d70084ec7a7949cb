//! Workflow configuration.
//!
//! [`RefinementConfig`] carries the per-criterion gradual-selection knobs
//! plus the call-through options of the peripheral stages. Defaults are
//! the production values of the drone-survey workflow this pipeline
//! drives.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use gradsel_core::{
    AdaptiveWidening, CameraOptParams, Real, ReprojectionGoals, SelectionConfig,
};

use crate::project::{AlignmentOptions, DenseCloudOptions, ExportOptions, RasterOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Reconstruction-uncertainty level (useful range 10-15).
    pub ru_level: Real,
    pub ru_cutoff: Real,
    pub ru_increment: Real,

    /// Projection-accuracy level (useful range 2-4).
    pub pa_level: Real,
    pub pa_cutoff: Real,
    pub pa_increment: Real,

    /// Reprojection-error level.
    pub re_level: Real,
    pub re_cutoff: Real,
    pub re_increment: Real,
    pub re_round1_cap: usize,
    pub re_round2_cap: usize,
    pub re_rms_goal: Real,
    pub re_round2_tie_point_accuracy: Real,
    pub re_round2_threshold_drop: Real,
    /// Enable the widened parameter set once the reprojection threshold
    /// drops below `re_adaptive_level`.
    pub re_adaptive: bool,
    pub re_adaptive_level: Real,

    /// Absolute minimum selected count for every criterion.
    pub search_floor: usize,
    pub max_shrinks: usize,
    pub shrink_factor: Real,

    pub camera_optimization: CameraOptParams,

    pub alignment: AlignmentOptions,
    pub dense_cloud: DenseCloudOptions,
    /// Dense points with confidence in `[0, max_confidence]` are removed.
    pub max_confidence: u32,
    pub raster: RasterOptions,
    pub export: Option<ExportOptions>,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            ru_level: 10.0,
            ru_cutoff: 0.50,
            ru_increment: 1.0,
            pa_level: 3.0,
            pa_cutoff: 0.50,
            pa_increment: 0.2,
            re_level: 0.3,
            re_cutoff: 0.10,
            re_increment: 0.01,
            re_round1_cap: 30,
            re_round2_cap: 12,
            re_rms_goal: 0.18,
            re_round2_tie_point_accuracy: 0.10,
            re_round2_threshold_drop: 0.25,
            re_adaptive: false,
            re_adaptive_level: 0.16,
            search_floor: 100,
            max_shrinks: 15,
            shrink_factor: 0.25,
            camera_optimization: CameraOptParams::default(),
            alignment: AlignmentOptions::default(),
            dense_cloud: DenseCloudOptions::default(),
            max_confidence: 2,
            raster: RasterOptions::default(),
            export: None,
        }
    }
}

impl RefinementConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("parsing config {}", path.display()))
    }

    /// Selection config for the reconstruction-uncertainty stage.
    pub fn ru_selection(&self) -> SelectionConfig {
        SelectionConfig {
            start_threshold: self.ru_level,
            cutoff: self.ru_cutoff,
            increment: self.ru_increment,
            search_floor: self.search_floor,
            max_shrinks: self.max_shrinks,
            shrink_factor: self.shrink_factor,
            params: self.camera_optimization,
            ..SelectionConfig::reconstruction_uncertainty(self.ru_level)
        }
    }

    /// Selection config for the projection-accuracy stage.
    pub fn pa_selection(&self) -> SelectionConfig {
        SelectionConfig {
            start_threshold: self.pa_level,
            cutoff: self.pa_cutoff,
            increment: self.pa_increment,
            search_floor: self.search_floor,
            max_shrinks: self.max_shrinks,
            shrink_factor: self.shrink_factor,
            params: self.camera_optimization,
            ..SelectionConfig::projection_accuracy(self.pa_level)
        }
    }

    /// Selection config for the two-round reprojection-error stage.
    pub fn re_selection(&self) -> SelectionConfig {
        let goals = ReprojectionGoals {
            rms_goal: self.re_rms_goal,
            round2_cap: self.re_round2_cap,
            round2_tie_point_accuracy: self.re_round2_tie_point_accuracy,
            round2_threshold_drop: self.re_round2_threshold_drop,
        };
        let adaptive = self.re_adaptive.then(|| AdaptiveWidening {
            below_threshold: self.re_adaptive_level,
            params: CameraOptParams::widened(),
        });
        SelectionConfig {
            cutoff: self.re_cutoff,
            increment: self.re_increment,
            optimization_cap: self.re_round1_cap,
            search_floor: self.search_floor,
            max_shrinks: self.max_shrinks,
            shrink_factor: self.shrink_factor,
            params: self.camera_optimization,
            adaptive,
            ..SelectionConfig::reprojection_error(self.re_level, goals)
        }
    }
}
