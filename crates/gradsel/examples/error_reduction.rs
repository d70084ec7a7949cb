//! Gradual-selection error reduction on a synthetic sparse cloud.
//!
//! Runs the three selection criteria in their usual order on one chunk:
//! 1. Reconstruction uncertainty (one deletion pass, one optimization)
//! 2. Projection accuracy
//! 3. Reprojection error (two-round schedule with an RMS goal)
//!
//! Run with: `cargo run -p gradsel --example error_reduction`

use anyhow::Result;
use gradsel::metrics::QualitySnapshot;
use gradsel::prelude::*;

fn print_report(report: &SelectionReport) {
    println!("  criterion:     {}", report.criterion);
    println!(
        "  points:        {} -> {} ({} deleted)",
        report.initial_points, report.final_points, report.deleted
    );
    println!("  optimizations: {}", report.optimizations);
    println!("  threshold:     {:.3}", report.final_threshold);
    println!("  stopped:       {}\n", report.stop);
}

fn main() -> Result<()> {
    env_logger::init();

    let mut chunk = SyntheticChunk::from_ranges(4000, [0.0, 30.0], [0.0, 6.0], [0.0, 1.0])
        .with_initial_sigma(1.6)
        .with_optimize_gain(0.6);

    println!("=== Gradual Selection (Synthetic Data) ===\n");
    let before = QualitySnapshot::capture(&chunk);
    println!("RMS reprojection error before: {:.4} px\n", before.rms_reprojection_error);

    println!("--- Reconstruction Uncertainty ---");
    let config = SelectionConfig::reconstruction_uncertainty(10.0);
    print_report(&run_gradual_selection(&mut chunk, &config)?);

    println!("--- Projection Accuracy ---");
    let config = SelectionConfig::projection_accuracy(3.0);
    print_report(&run_gradual_selection(&mut chunk, &config)?);

    println!("--- Reprojection Error ---");
    let config = SelectionConfig::reprojection_error(0.3, ReprojectionGoals::default());
    print_report(&run_gradual_selection(&mut chunk, &config)?);

    let after = QualitySnapshot::capture(&chunk);
    println!("RMS reprojection error after:  {:.4} px", after.rms_reprojection_error);
    if let Some(sigma) = after.unit_weight_sigma {
        println!("Unit-weight sigma:             {sigma:.3}");
    }
    Ok(())
}
