//! Quality metric provider.
//!
//! Pure, side-effect-free aggregations over the engine's current camera and
//! tie-point state. Nothing here is cached: delete and optimize calls change
//! the underlying state, so callers re-query after every mutation.

use serde::{Deserialize, Serialize};

use crate::engine::{EngineStat, ReconstructionEngine};
use crate::math::Real;

/// Root mean square of the per-observation reprojection residual norms over
/// valid points and cameras with a resolved pose.
///
/// Returns 0.0 when no observations exist; a chunk with nothing to measure
/// is degenerate, not an error.
pub fn rms_reprojection_error<E: ReconstructionEngine + ?Sized>(engine: &E) -> Real {
    let residuals = engine.reprojection_residuals();
    if residuals.is_empty() {
        return 0.0;
    }
    let sum_sq: Real = residuals.iter().map(|r| r * r).sum();
    (sum_sq / residuals.len() as Real).sqrt()
}

/// RMS of the vertical component of (measured camera position − estimated
/// camera position), over cameras with a resolved pose and an enabled
/// reference. Returns 0.0 if no camera qualifies.
pub fn rms_vertical_camera_error<E: ReconstructionEngine + ?Sized>(engine: &E) -> Real {
    let mut sum_sq = 0.0;
    let mut num = 0usize;
    for cam in engine.camera_records() {
        let (Some(estimated), Some(reference)) = (cam.estimated, cam.reference) else {
            continue;
        };
        if !reference.enabled {
            continue;
        }
        let dz = reference.location.z - estimated.z;
        sum_sq += dz * dz;
        num += 1;
    }
    if num > 0 {
        (sum_sq / num as Real).sqrt()
    } else {
        0.0
    }
}

/// Mean declared vertical accuracy of the camera position references, over
/// the same eligible cameras as [`rms_vertical_camera_error`] that also
/// declare an accuracy. Returns 0.0 if none qualify.
pub fn mean_vertical_accuracy<E: ReconstructionEngine + ?Sized>(engine: &E) -> Real {
    let mut sum = 0.0;
    let mut num = 0usize;
    for cam in engine.camera_records() {
        let (Some(_), Some(reference)) = (cam.estimated, cam.reference) else {
            continue;
        };
        if !reference.enabled {
            continue;
        }
        let Some(accuracy) = reference.accuracy else {
            continue;
        };
        sum += accuracy.z;
        num += 1;
    }
    if num > 0 {
        sum / num as Real
    } else {
        0.0
    }
}

/// Bundle-adjustment scale of unit weight (sigma-naught) from the latest
/// optimization. `None` before the first optimization.
pub fn unit_weight_sigma<E: ReconstructionEngine + ?Sized>(engine: &E) -> Option<Real> {
    engine.statistic(EngineStat::UnitWeightSigma)
}

/// One-shot capture of every quality statistic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualitySnapshot {
    pub rms_reprojection_error: Real,
    pub unit_weight_sigma: Option<Real>,
    pub vertical_camera_error: Real,
    pub vertical_camera_accuracy: Real,
}

impl QualitySnapshot {
    pub fn capture<E: ReconstructionEngine + ?Sized>(engine: &E) -> Self {
        Self {
            rms_reprojection_error: rms_reprojection_error(engine),
            unit_weight_sigma: unit_weight_sigma(engine),
            vertical_camera_error: rms_vertical_camera_error(engine),
            vertical_camera_accuracy: mean_vertical_accuracy(engine),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CameraRecord, CameraReference};
    use crate::math::Vec3;
    use crate::synthetic::SyntheticChunk;
    use approx::assert_relative_eq;

    fn camera(estimated_z: Real, reference_z: Real, accuracy_z: Option<Real>) -> CameraRecord {
        CameraRecord {
            estimated: Some(Vec3::new(0.0, 0.0, estimated_z)),
            reference: Some(CameraReference {
                location: Vec3::new(0.0, 0.0, reference_z),
                enabled: true,
                accuracy: accuracy_z.map(|a| Vec3::new(0.05, 0.05, a)),
            }),
        }
    }

    #[test]
    fn rms_over_known_residuals() {
        let chunk = SyntheticChunk::with_scores(
            crate::FilterCriterion::ReprojectionError,
            &[3.0, 4.0],
        );
        // sqrt((9 + 16) / 2)
        assert_relative_eq!(rms_reprojection_error(&chunk), 12.5f64.sqrt());
    }

    #[test]
    fn rms_is_zero_without_observations() {
        let chunk = SyntheticChunk::empty();
        assert_eq!(rms_reprojection_error(&chunk), 0.0);
    }

    #[test]
    fn vertical_error_uses_z_component_only() {
        let chunk = SyntheticChunk::uniform(10, 0.0, 1.0)
            .with_cameras(vec![camera(120.0, 120.3, None), camera(80.0, 79.6, None)]);
        let expected = ((0.3f64 * 0.3 + 0.4 * 0.4) / 2.0).sqrt();
        assert_relative_eq!(rms_vertical_camera_error(&chunk), expected, epsilon = 1e-12);
    }

    #[test]
    fn vertical_error_skips_disabled_and_unposed_cameras() {
        let mut disabled = camera(100.0, 101.0, None);
        disabled.reference.as_mut().unwrap().enabled = false;
        let unposed = CameraRecord {
            estimated: None,
            reference: camera(100.0, 105.0, None).reference,
        };
        let chunk = SyntheticChunk::uniform(10, 0.0, 1.0).with_cameras(vec![disabled, unposed]);
        assert_eq!(rms_vertical_camera_error(&chunk), 0.0);
    }

    #[test]
    fn mean_accuracy_skips_cameras_without_declared_accuracy() {
        let chunk = SyntheticChunk::uniform(10, 0.0, 1.0).with_cameras(vec![
            camera(100.0, 100.0, Some(0.10)),
            camera(100.0, 100.0, Some(0.30)),
            camera(100.0, 100.0, None),
        ]);
        assert_relative_eq!(mean_vertical_accuracy(&chunk), 0.20);
    }

    #[test]
    fn sigma_is_none_before_first_optimization() {
        let chunk = SyntheticChunk::uniform(10, 0.0, 1.0);
        assert!(unit_weight_sigma(&chunk).is_none());
        let snap = QualitySnapshot::capture(&chunk);
        assert!(snap.unit_weight_sigma.is_none());
    }
}
