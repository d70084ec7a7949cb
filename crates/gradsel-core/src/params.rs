//! Camera optimization parameter set.
//!
//! A structured record of which camera-model terms the optimizer is allowed
//! to adjust, threaded by value through every `optimize_cameras` call. The
//! second round of reprojection-error refinement may switch to a wider set
//! once the error has dropped far enough to support a higher-order lens
//! model.

use serde::{Deserialize, Serialize};

/// Toggles for the camera-model terms participating in optimization, plus
/// the scalar fitting options of one bundle-adjustment invocation.
///
/// `Default` is the production toggle set: focal length, principal point,
/// the first three radial terms and the two decentering terms enabled; the
/// affine and higher-order terms held fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraOptParams {
    /// Focal length.
    pub fit_f: bool,
    /// Principal point x.
    pub fit_cx: bool,
    /// Principal point y.
    pub fit_cy: bool,
    /// Affine/skew coefficients.
    pub fit_b1: bool,
    pub fit_b2: bool,
    /// Radial distortion coefficients.
    pub fit_k1: bool,
    pub fit_k2: bool,
    pub fit_k3: bool,
    pub fit_k4: bool,
    /// Decentering distortion coefficients.
    pub fit_p1: bool,
    pub fit_p2: bool,
    pub fit_p3: bool,
    pub fit_p4: bool,
    /// Let the engine pick the parameter subset itself.
    pub adaptive_fitting: bool,
    /// Estimate tie-point covariance during adjustment.
    pub tiepoint_covariance: bool,
    /// Fit additional corrections (rolling shutter etc.).
    pub fit_corrections: bool,
}

impl Default for CameraOptParams {
    fn default() -> Self {
        Self {
            fit_f: true,
            fit_cx: true,
            fit_cy: true,
            fit_b1: false,
            fit_b2: false,
            fit_k1: true,
            fit_k2: true,
            fit_k3: true,
            fit_k4: false,
            fit_p1: true,
            fit_p2: true,
            fit_p3: false,
            fit_p4: false,
            adaptive_fitting: false,
            tiepoint_covariance: true,
            fit_corrections: true,
        }
    }
}

impl CameraOptParams {
    /// Every lens term enabled. Used by adaptive widening once the
    /// reprojection threshold is low enough to support the full model.
    pub fn widened() -> Self {
        Self {
            fit_b1: true,
            fit_b2: true,
            fit_k4: true,
            fit_p3: true,
            fit_p4: true,
            ..Self::default()
        }
    }

    /// Same toggle set with corrections fitting suppressed.
    ///
    /// Round-1 optimizations and the round-2 re-weighting pass always run
    /// without corrections; only the in-loop and cleanup optimizations of
    /// round 2 honor the caller's `fit_corrections` flag.
    pub fn without_corrections(self) -> Self {
        Self {
            fit_corrections: false,
            ..self
        }
    }

    /// Names of the enabled lens terms, for log output.
    pub fn enabled_terms(&self) -> Vec<&'static str> {
        let flags = [
            (self.fit_f, "f"),
            (self.fit_cx, "cx"),
            (self.fit_cy, "cy"),
            (self.fit_b1, "b1"),
            (self.fit_b2, "b2"),
            (self.fit_k1, "k1"),
            (self.fit_k2, "k2"),
            (self.fit_k3, "k3"),
            (self.fit_k4, "k4"),
            (self.fit_p1, "p1"),
            (self.fit_p2, "p2"),
            (self.fit_p3, "p3"),
            (self.fit_p4, "p4"),
        ];
        flags
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, name)| *name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_production_toggles() {
        let p = CameraOptParams::default();
        assert!(p.fit_f && p.fit_cx && p.fit_cy);
        assert!(p.fit_k1 && p.fit_k2 && p.fit_k3 && !p.fit_k4);
        assert!(p.fit_p1 && p.fit_p2 && !p.fit_p3 && !p.fit_p4);
        assert!(!p.fit_b1 && !p.fit_b2);
        assert!(p.tiepoint_covariance && p.fit_corrections && !p.adaptive_fitting);
    }

    #[test]
    fn widened_enables_all_lens_terms() {
        let p = CameraOptParams::widened();
        assert!(p.fit_b1 && p.fit_b2 && p.fit_k4 && p.fit_p3 && p.fit_p4);
    }

    #[test]
    fn without_corrections_only_touches_corrections() {
        let p = CameraOptParams::default().without_corrections();
        assert!(!p.fit_corrections);
        assert_eq!(
            CameraOptParams {
                fit_corrections: true,
                ..p
            },
            CameraOptParams::default()
        );
    }

    #[test]
    fn enabled_terms_lists_defaults() {
        let terms = CameraOptParams::default().enabled_terms();
        assert_eq!(terms, vec!["f", "cx", "cy", "k1", "k2", "k3", "p1", "p2"]);
    }

    #[test]
    fn serde_round_trip_with_partial_input() {
        let p: CameraOptParams = serde_json::from_str(r#"{"fit_k4": true}"#).unwrap();
        assert!(p.fit_k4);
        assert!(p.fit_f);
        let json = serde_json::to_string(&p).unwrap();
        let back: CameraOptParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
