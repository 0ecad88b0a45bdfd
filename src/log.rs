use crate::field::GriddedField;
use crate::input::JobConfig;
use std::time::Duration;

pub fn show_greeting(config_source: &str) {
    println!("=== UKV Regrid & Extract ===");
    println!("Configuration: {}", config_source);
}

pub fn config_echo(config: &JobConfig) {
    println!("\nConfiguration:");
    println!("  Source: {}", config.source);
    println!("  Cache directory: {}", config.cache_dir);
    println!(
        "  Variable: {}",
        config.variable.as_deref().unwrap_or("(first 2D variable)")
    );
    println!("  Target grid (lat:lat:n,lon:lon:n): {}", config.target_grid);
    println!("  Region (min_lon,min_lat,max_lon,max_lat): {}", config.region);
    println!("  Output: {}", config.output);
    if let Some(plots) = &config.plots_dir {
        println!("  Plots: {}", plots);
    }
}

/// One block per pipeline stage.
pub fn show_field_summary(stage: &str, field: &GriddedField) {
    let (rows, cols) = field.shape();
    println!("\n{}:", stage);
    println!("  Field: {} [{}]", field.name, field.units);
    println!("  Shape: {} x {} ({} x {})", rows, cols, field.y.name, field.x.name);
    if let Some((lo, hi)) = field.y.point_range() {
        println!("  {}: {:.4} .. {:.4} {}", field.y.name, lo, hi, field.y.units);
    }
    if let Some((lo, hi)) = field.x.point_range() {
        println!("  {}: {:.4} .. {:.4} {}", field.x.name, lo, hi, field.x.units);
    }
    match &field.crs {
        Some(crs) => println!("  Frame: {}", crs),
        None => println!("  Frame: unknown"),
    }
    match field.valid_range() {
        Some((lo, hi)) => println!("  Values: {:.3} .. {:.3}", lo, hi),
        None => println!("  Values: none valid"),
    }
    if field.masked_count() > 0 {
        println!("  Masked cells: {}", field.masked_count());
    }
}

pub fn show_saved(what: &str, destination: &str) {
    println!("  Saved {} to {}", what, destination);
}

pub fn show_farewell_with_timing(elapsed: Duration) {
    println!("\n=== Completed in {:.2}s ===", elapsed.as_secs_f64());
}
