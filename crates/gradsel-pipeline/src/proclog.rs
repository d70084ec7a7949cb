//! Append-only processing log.
//!
//! A plain-text record of the workflow mirroring the banner/section format
//! downstream consumers of the original driver expect. Write failures are
//! logged and swallowed; a broken log file must not abort a workflow that
//! is minutes or hours into dense reconstruction.

use log::warn;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use gradsel_core::{CameraOptParams, CycleRecord, SelectionReport};

pub struct ProcessingLog {
    path: PathBuf,
}

impl ProcessingLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Banner section header.
    pub fn section(&mut self, title: &str) {
        self.append(&format!(
            "\n============= {} =============\n",
            title.to_uppercase()
        ));
    }

    pub fn line(&mut self, text: &str) {
        self.append(&format!("{text}\n"));
    }

    /// One delete/optimize cycle.
    pub fn cycle(&mut self, record: &CycleRecord) {
        self.line(&format!(
            "Round {} iteration #{}",
            record.round, record.cycle
        ));
        self.line(&format!(
            "     -threshold: {:.4} deleted {} points ({} valid left)",
            record.threshold, record.selected, record.valid_after
        ));
        if let Some(sigma) = record.stats.unit_weight_sigma {
            self.line(&format!("     -SEUW: {sigma:.4}"));
        }
        self.line(&format!(
            "     -RMSE: {:.4}",
            record.stats.rms_reprojection_error
        ));
        self.line(&format!(
            "     -Camera Vertical Error: {:.2}",
            record.stats.vertical_camera_error
        ));
        self.line(&format!(
            "     -Camera Vertical Accuracy: {:.2}",
            record.stats.vertical_camera_accuracy
        ));
    }

    /// Stage summary after one gradual-selection run.
    pub fn selection_summary(
        &mut self,
        chunk: &str,
        report: &SelectionReport,
        params: &CameraOptParams,
        seconds: f64,
    ) {
        self.section(&format!("{} optimization", report.criterion));
        self.line(&format!("Chunk: {chunk}"));
        self.line(&format!(
            "{} of {} removed in {} optimizations.",
            report.deleted, report.initial_points, report.optimizations
        ));
        self.line(&format!("Final point count: {}", report.final_points));
        self.line(&format!(
            "Final {}: {:.4} ({})",
            report.criterion.tag(),
            report.final_threshold,
            report.stop
        ));
        if let Some(round2) = &report.round2 {
            self.line(&format!(
                "Round 2: {} optimizations at tie point accuracy {:.2} ({})",
                round2.optimizations, round2.tie_point_accuracy, round2.stop
            ));
        }
        if let Some(sigma) = report.final_stats.unit_weight_sigma {
            self.line(&format!("Final SEUW: {sigma:.3}"));
        }
        self.line(&format!(
            "Final RMSE: {:.4}",
            report.final_stats.rms_reprojection_error
        ));
        self.line(&format!(
            "Final camera lens calibration parameters: {}",
            params.enabled_terms().join(", ")
        ));
        self.line(&format!("Processing duration: {seconds:.1}s"));
        self.line(&format!("Logged at: {}", Self::timestamp()));
    }

    fn append(&mut self, text: &str) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(text.as_bytes()));
        if let Err(err) = result {
            warn!(
                "processing log: failed to write {}: {err}",
                self.path.display()
            );
        }
    }

    /// Unix seconds; enough for ordering entries across a run.
    fn timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradsel_core::{
        run_gradual_selection, SelectionConfig, SyntheticChunk,
    };
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn sections_and_summaries_are_appended() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ProcessingLog.txt");
        let mut log = ProcessingLog::new(&path);

        let mut chunk = SyntheticChunk::uniform(1000, 0.0, 20.0);
        let config = SelectionConfig::reconstruction_uncertainty(10.0);
        let report = run_gradual_selection(&mut chunk, &config).unwrap();

        log.section("Reconstruction Uncertainty");
        for cycle in &report.trace {
            log.cycle(cycle);
        }
        log.selection_summary("Raw_Photos_RU10", &report, &config.params, 12.34);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("============= RECONSTRUCTION UNCERTAINTY ============="));
        assert!(text.contains("Chunk: Raw_Photos_RU10"));
        assert!(text.contains("500 of 1000 removed in 1 optimizations."));
        assert!(text.contains("Final point count: 500"));
        assert!(text.contains("f, cx, cy, k1, k2, k3, p1, p2"));
        assert!(text.contains("Processing duration: 12.3s"));
    }

    #[test]
    fn unwritable_path_does_not_panic() {
        let mut log = ProcessingLog::new("/no/such/dir/ProcessingLog.txt");
        log.section("Alignment");
        log.line("still alive");
    }
}
