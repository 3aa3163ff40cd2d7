//! riskalloc CLI - deforestation risk allocation

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use riskalloc_algorithms::allocation::{
    run_fit, run_prediction, ConvergenceStatus, FitPaths, PredictionOutcome, PredictionPaths,
    PredictionTarget, DEFAULT_MAX_ITERATIONS,
};
use riskalloc_algorithms::evaluation::{
    run_evaluation, EvaluationParams, EvaluationPaths, DEFAULT_CELL_AREA_HA, DEFAULT_FIDELITY,
};
use riskalloc_algorithms::vulnerability::{
    geometric_classification, natural_risk_threshold, quantile_classification, NrtPolicy,
    VulnerabilityParams, DEFAULT_NRT_PERCENTILE,
};
use riskalloc_core::io::{read_geotiff, write_geotiff, GeoTiffOptions};
use riskalloc_core::Raster;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "riskalloc")]
#[command(author, version, about = "Deforestation risk allocation", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Vulnerability zoning of a distance-to-forest-edge raster
    Vulnerability {
        #[command(subcommand)]
        method: VulnerabilityCommands,
    },
    /// Fit relative frequencies and a density map (CAL/HRP)
    Fit {
        #[command(flatten)]
        inputs: RegionArgs,
        /// Binary deforestation map of the fitting period
        #[arg(long)]
        deforestation: PathBuf,
        /// Output relative-frequency table (CSV)
        #[arg(long)]
        frequency_table: PathBuf,
        /// Output fitted density map
        #[arg(long)]
        density: PathBuf,
    },
    /// Allocate the observed deforestation of the confirmation period (CNF)
    Confirm {
        #[command(flatten)]
        inputs: RegionArgs,
        /// Binary deforestation map of the confirmation period
        #[arg(long)]
        deforestation: PathBuf,
        /// Relative-frequency table from the fitting run
        #[arg(long)]
        frequency_table: PathBuf,
        /// Output adjusted density map
        #[arg(long)]
        density: PathBuf,
        /// Rescaling passes allowed before giving up
        #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
        max_iterations: usize,
    },
    /// Allocate an expected deforestation area over the validity period (VP)
    Predict {
        #[command(flatten)]
        inputs: RegionArgs,
        /// Expected deforestation over the whole period, in hectares
        #[arg(long)]
        expected_ha: f64,
        /// Length of the period in years
        #[arg(long, default_value = "1")]
        years: f64,
        /// Relative-frequency table from the fitting run
        #[arg(long)]
        frequency_table: PathBuf,
        /// Output annual density map
        #[arg(long)]
        density: PathBuf,
        /// Rescaling passes allowed before giving up
        #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
        max_iterations: usize,
    },
    /// Compare a density map with observed deforestation over Thiessen cells
    Evaluate {
        /// Jurisdiction mask (1 inside)
        #[arg(long)]
        mask: PathBuf,
        /// Binary map of observed deforestation
        #[arg(long)]
        actual: PathBuf,
        /// Predicted density map
        #[arg(long)]
        density: PathBuf,
        /// Output performance chart table (CSV)
        #[arg(long)]
        chart: PathBuf,
        /// Output Thiessen cells (GeoJSON)
        #[arg(long)]
        cells: Option<PathBuf>,
        /// Output jurisdiction boundary (GeoJSON)
        #[arg(long)]
        boundary: Option<PathBuf>,
        /// Output per-pixel residual map
        #[arg(long)]
        residuals: Option<PathBuf>,
        /// Assessment cell area in hectares
        #[arg(long, default_value_t = DEFAULT_CELL_AREA_HA)]
        cell_area: f64,
        /// Minimum share of its area a boundary cell must keep
        #[arg(long, default_value_t = DEFAULT_FIDELITY)]
        fidelity: f64,
        /// Add a residual column to the chart table
        #[arg(long)]
        residual_column: bool,
    },
}

/// Inputs and bin output shared by the allocation runs
#[derive(clap::Args)]
struct RegionArgs {
    /// Vulnerability class map
    #[arg(long)]
    vulnerability: PathBuf,
    /// Administrative subdivision map (ids 0..999)
    #[arg(long)]
    subdivisions: PathBuf,
    /// Output modeling-region map
    #[arg(long)]
    modeling_regions: PathBuf,
}

// ─── Vulnerability subcommands ──────────────────────────────────────────

#[derive(Subcommand)]
enum VulnerabilityCommands {
    /// Geometric classes up to the Natural Risk Threshold
    Geometric {
        /// Distance-to-forest-edge raster
        distance: PathBuf,
        /// Jurisdiction mask (1 inside)
        jurisdiction: PathBuf,
        /// Output class map
        output: PathBuf,
        /// Natural Risk Threshold, in distance units
        #[arg(long, conflicts_with = "deforestation", required_unless_present = "deforestation")]
        nrt: Option<f64>,
        /// Fit the threshold from this historical deforestation map
        #[arg(long)]
        deforestation: Option<PathBuf>,
        /// Share of historical deforestation closer than the fitted threshold
        #[arg(long, default_value_t = DEFAULT_NRT_PERCENTILE)]
        percentile: f64,
        /// Number of classes
        #[arg(short, long, default_value = "30")]
        classes: usize,
        /// Width ratio between consecutive classes (derived from the threshold if omitted)
        #[arg(long)]
        ratio: Option<f64>,
    },
    /// Equal-count classes of in-forest distances
    Quantile {
        /// Distance-to-forest-edge raster
        distance: PathBuf,
        /// Forest mask (1 = forest)
        forest: PathBuf,
        /// Jurisdiction mask (1 inside)
        jurisdiction: PathBuf,
        /// Output class map
        output: PathBuf,
        /// Number of classes
        #[arg(short, long, default_value = "30")]
        classes: usize,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn progress_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.green/white}] {pos:>3}%")
            .unwrap()
            .progress_chars("=> "),
    );
    pb.set_message(msg.to_string());
    pb
}

fn read_f64(path: &PathBuf) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path, None)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn read_u8(path: &PathBuf) -> Result<Raster<u8>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<u8> = read_geotiff(path, None)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    Ok(raster)
}

fn write_result_i32(raster: &Raster<i32>, path: &PathBuf) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path, Some(GeoTiffOptions::default()))
        .context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &PathBuf, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

/// Report a prediction run, failing if it ran out of iterations
fn finish_prediction(outcome: &PredictionOutcome, density: &PathBuf, elapsed: std::time::Duration) -> Result<()> {
    if !outcome.imputed.is_empty() {
        warn!(
            "{} bins were missing from the frequency table and imputed: {:?}",
            outcome.imputed.len(),
            outcome.imputed
        );
    }
    if let Some(backup) = &outcome.backup {
        println!("Original frequency table kept at: {}", backup.display());
    }
    if outcome.status == ConvergenceStatus::Exhausted {
        warn!(
            "Adjustment did not converge after {} iterations (ratio {:.6}); the last candidate was written to {}",
            outcome.iterations,
            outcome.ratio,
            density.display()
        );
        anyhow::bail!(
            "Maximum number of iterations reached. Please reset the maximum number of iterations \
             (--max-iterations)."
        );
    }
    println!(
        "Target {:.3} ha reached in {} iterations (ratio {:.6})",
        outcome.target_ha, outcome.iterations, outcome.ratio
    );
    done("Density", density, elapsed);
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        // ── Vulnerability ────────────────────────────────────────────
        Commands::Vulnerability { method } => match method {
            VulnerabilityCommands::Geometric {
                distance,
                jurisdiction,
                output,
                nrt,
                deforestation,
                percentile,
                classes,
                ratio,
            } => {
                let distance = read_f64(&distance)?;
                let jurisdiction = read_u8(&jurisdiction)?;
                let start = Instant::now();

                let nrt = match (nrt, deforestation) {
                    // A fixed threshold never reads the deforestation grid
                    (Some(v), _) => {
                        natural_risk_threshold(&distance, &jurisdiction, &jurisdiction, NrtPolicy::Fixed(v))
                    }
                    (None, Some(path)) => {
                        let deforestation = read_u8(&path)?;
                        natural_risk_threshold(
                            &distance,
                            &deforestation,
                            &jurisdiction,
                            NrtPolicy::DeforestationPercentile(percentile),
                        )
                    }
                    (None, None) => anyhow::bail!("Either --nrt or --deforestation is required"),
                }
                .context("Failed to determine the Natural Risk Threshold")?;
                info!("Natural Risk Threshold: {:.3}", nrt);

                let result = geometric_classification(
                    &distance,
                    &jurisdiction,
                    nrt,
                    VulnerabilityParams { n_classes: classes, ratio },
                )
                .context("Failed to classify vulnerability")?;
                let elapsed = start.elapsed();
                write_result_i32(&result, &output)?;
                done("Vulnerability classes", &output, elapsed);
            }

            VulnerabilityCommands::Quantile {
                distance,
                forest,
                jurisdiction,
                output,
                classes,
            } => {
                let distance = read_f64(&distance)?;
                let forest = read_u8(&forest)?;
                let jurisdiction = read_u8(&jurisdiction)?;
                let start = Instant::now();
                let result = quantile_classification(&distance, &forest, &jurisdiction, classes)
                    .context("Failed to classify vulnerability")?;
                let elapsed = start.elapsed();
                write_result_i32(&result, &output)?;
                done("Vulnerability classes", &output, elapsed);
            }
        },

        // ── Allocation ───────────────────────────────────────────────
        Commands::Fit {
            inputs,
            deforestation,
            frequency_table,
            density,
        } => {
            let paths = FitPaths {
                vulnerability: inputs.vulnerability,
                subdivisions: inputs.subdivisions,
                deforestation,
                frequency_table,
                modeling_regions: inputs.modeling_regions,
                density,
            };
            let pb = progress_bar("Fitting");
            let start = Instant::now();
            let outcome = run_fit(&paths, &mut |pct: u8| pb.set_position(pct as u64))
                .context("Failed to fit relative frequencies")?;
            pb.finish_and_clear();
            let elapsed = start.elapsed();

            println!(
                "{} bins; modeled deforestation {:.3} ha",
                outcome.table.len(),
                outcome.modeled_ha
            );
            println!("Frequency table saved to: {}", paths.frequency_table.display());
            done("Density", &paths.density, elapsed);
        }

        Commands::Confirm {
            inputs,
            deforestation,
            frequency_table,
            density,
            max_iterations,
        } => {
            let paths = PredictionPaths {
                vulnerability: inputs.vulnerability,
                subdivisions: inputs.subdivisions,
                frequency_table,
                modeling_regions: inputs.modeling_regions,
                density,
            };
            let target = PredictionTarget::Observed { deforestation };
            let pb = progress_bar("Confirming");
            let start = Instant::now();
            let outcome = run_prediction(&paths, &target, max_iterations, &mut |pct: u8| {
                pb.set_position(pct as u64)
            })
            .context("Failed to allocate confirmation-period deforestation")?;
            pb.finish_and_clear();
            finish_prediction(&outcome, &paths.density, start.elapsed())?;
        }

        Commands::Predict {
            inputs,
            expected_ha,
            years,
            frequency_table,
            density,
            max_iterations,
        } => {
            let paths = PredictionPaths {
                vulnerability: inputs.vulnerability,
                subdivisions: inputs.subdivisions,
                frequency_table,
                modeling_regions: inputs.modeling_regions,
                density,
            };
            let target = PredictionTarget::Expected {
                area_ha: expected_ha,
                years,
            };
            let pb = progress_bar("Predicting");
            let start = Instant::now();
            let outcome = run_prediction(&paths, &target, max_iterations, &mut |pct: u8| {
                pb.set_position(pct as u64)
            })
            .context("Failed to allocate validity-period deforestation")?;
            pb.finish_and_clear();
            finish_prediction(&outcome, &paths.density, start.elapsed())?;
        }

        // ── Evaluation ───────────────────────────────────────────────
        Commands::Evaluate {
            mask,
            actual,
            density,
            chart,
            cells,
            boundary,
            residuals,
            cell_area,
            fidelity,
            residual_column,
        } => {
            let paths = EvaluationPaths {
                mask,
                actual,
                density,
                chart,
                cells,
                boundary,
                residuals,
            };
            let params = EvaluationParams {
                cell_area_ha: cell_area,
                fidelity,
                include_residuals: residual_column,
                ..Default::default()
            };
            let pb = progress_bar("Evaluating");
            let start = Instant::now();
            let evaluation = run_evaluation(&paths, &params, None, &mut |pct: u8| {
                pb.set_position(pct as u64)
            })
            .context("Failed to evaluate the density map")?;
            pb.finish_and_clear();
            let elapsed = start.elapsed();

            let stats = evaluation.stats;
            println!("Cells: {}", stats.samples);
            println!("  Slope: {:.4}", stats.slope);
            println!("  Intercept: {:.4}", stats.intercept);
            println!("  R²: {:.4}", stats.r_squared);
            println!(
                "  MedAE: {:.3} ha ({:.3}% of cell area)",
                stats.median_absolute_error, stats.median_absolute_error_pct
            );
            done("Performance chart", &paths.chart, elapsed);
        }
    }

    Ok(())
}
