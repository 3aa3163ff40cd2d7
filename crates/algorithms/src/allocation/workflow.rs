//! Fitting, confirmation and validity runs over raster and table files.
//!
//! Every output is staged and only moved into place once the whole run
//! has succeeded, so a failed run leaves no partial files behind.

use super::adjustment::{confirmation_target, converge, AdjustmentParams, ConvergenceStatus};
use super::density::density_map;
use super::frequency::{observed_bins, stage_table_update, FrequencyTable};
use super::modeling_region::modeling_regions;
use crate::outputs::{stage_raster, to_float32};
use crate::progress::Progress;
use riskalloc_core::io::{read_geotiff, OutputStage};
use riskalloc_core::raster::Raster;
use riskalloc_core::{Error, Result};
use std::path::PathBuf;
use tracing::info;

/// Files of a fitting (CAL/HRP) run
#[derive(Debug, Clone)]
pub struct FitPaths {
    /// Vulnerability class map of the fitting period
    pub vulnerability: PathBuf,
    /// Administrative subdivision map
    pub subdivisions: PathBuf,
    /// Binary deforestation map of the fitting period
    pub deforestation: PathBuf,
    /// Output: relative-frequency table (CSV)
    pub frequency_table: PathBuf,
    /// Output: modeling-region (bin id) map
    pub modeling_regions: PathBuf,
    /// Output: fitted density map
    pub density: PathBuf,
}

/// Summary of a fitting run
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub table: FrequencyTable,
    /// Sum of the fitted density map, in hectares
    pub modeled_ha: f64,
}

/// Fit a relative-frequency table and density map.
///
/// Progress milestones: 0, 10, 50, 75, 100.
pub fn run_fit(paths: &FitPaths, progress: &mut dyn Progress) -> Result<FitOutcome> {
    progress.report(0);
    let classes: Raster<i32> = read_geotiff(&paths.vulnerability, None)?;
    let subdivisions: Raster<i32> = read_geotiff(&paths.subdivisions, None)?;
    let deforestation: Raster<u8> = read_geotiff(&paths.deforestation, None)?;
    classes.ensure_same_grid(&deforestation)?;
    progress.report(10);

    let bins = modeling_regions(&classes, &subdivisions)?;
    progress.report(50);

    let table = FrequencyTable::fit(&bins, &deforestation)?;
    progress.report(75);

    let density = density_map(&bins, &table, classes.pixel_area_ha())?;
    let modeled_ha = density.valid_sum();

    let mut stage = OutputStage::new();
    stage_raster(&mut stage, &bins, &paths.modeling_regions)?;
    let staged_table = stage.stage(&paths.frequency_table)?;
    table.write_csv(&staged_table)?;
    stage_raster(&mut stage, &to_float32(&density), &paths.density)?;
    stage.commit()?;

    info!(
        "Fitted {} bins; modeled deforestation {:.3} ha",
        table.len(),
        modeled_ha
    );
    progress.report(100);
    Ok(FitOutcome { table, modeled_ha })
}

/// Where the deforestation target of a prediction run comes from
#[derive(Debug, Clone)]
pub enum PredictionTarget {
    /// Confirmation (CNF): observed deforestation in this binary map; not annualized
    Observed { deforestation: PathBuf },
    /// Validity (VP): an expected area over `years` years; the result is annualized
    Expected { area_ha: f64, years: f64 },
}

/// Files of a confirmation or validity run
#[derive(Debug, Clone)]
pub struct PredictionPaths {
    /// Vulnerability class map of the prediction period
    pub vulnerability: PathBuf,
    /// Administrative subdivision map
    pub subdivisions: PathBuf,
    /// Relative-frequency table from the fitting run; rewritten if bins are imputed
    pub frequency_table: PathBuf,
    /// Output: modeling-region (bin id) map
    pub modeling_regions: PathBuf,
    /// Output: adjusted density map
    pub density: PathBuf,
}

/// Summary of a confirmation or validity run
#[derive(Debug, Clone)]
pub struct PredictionOutcome {
    pub target_ha: f64,
    pub iterations: usize,
    pub ratio: f64,
    pub status: ConvergenceStatus,
    /// Bins added to the frequency table
    pub imputed: Vec<i32>,
    /// Backup of the original table, when it was rewritten
    pub backup: Option<PathBuf>,
}

/// Allocate a target deforestation area over the prediction-period bins.
///
/// Bins missing from the frequency table are imputed; the original table
/// is then kept as `<stem>_backup.csv` and replaced by the merged one. An
/// exhausted convergence still writes its best candidate; check
/// [`PredictionOutcome::status`].
///
/// Progress milestones: 0, 10, 30, 50, 75, 100.
pub fn run_prediction(
    paths: &PredictionPaths,
    target: &PredictionTarget,
    max_iterations: usize,
    progress: &mut dyn Progress,
) -> Result<PredictionOutcome> {
    progress.report(0);
    let classes: Raster<i32> = read_geotiff(&paths.vulnerability, None)?;
    let subdivisions: Raster<i32> = read_geotiff(&paths.subdivisions, None)?;
    let (target_ha, years) = resolve_target(target, &classes)?;
    progress.report(10);

    let bins = modeling_regions(&classes, &subdivisions)?;
    progress.report(30);

    let fitted = FrequencyTable::read_csv(&paths.frequency_table)?;
    let imputation = fitted.impute(observed_bins(&bins));
    let density = density_map(&bins, &imputation.table, classes.pixel_area_ha())?;
    progress.report(50);

    let params = AdjustmentParams {
        target_ha,
        max_iterations,
        max_pixel_density: classes.pixel_area_ha(),
        elapsed_years: years,
    };
    progress.report(75);
    let adjustment = converge(&density, params)?;

    let mut stage = OutputStage::new();
    stage_raster(&mut stage, &bins, &paths.modeling_regions)?;
    stage_raster(&mut stage, &to_float32(&adjustment.density), &paths.density)?;
    let backup = if imputation.is_empty() {
        None
    } else {
        Some(stage_table_update(&mut stage, &paths.frequency_table, &imputation.table)?)
    };
    stage.commit()?;
    progress.report(100);

    Ok(PredictionOutcome {
        target_ha,
        iterations: adjustment.iterations,
        ratio: adjustment.ratio,
        status: adjustment.status,
        imputed: imputation.imputed,
        backup,
    })
}

/// Target area in hectares and the period length it is spread over
fn resolve_target(target: &PredictionTarget, classes: &Raster<i32>) -> Result<(f64, f64)> {
    match target {
        PredictionTarget::Observed { deforestation } => {
            let observed: Raster<u8> = read_geotiff(deforestation, None)?;
            classes.ensure_same_grid(&observed)?;
            let area = confirmation_target(&observed);
            info!("Observed deforestation: {:.3} ha", area);
            Ok((area, 1.0))
        }
        PredictionTarget::Expected { area_ha, years } => {
            if !(years.is_finite() && *years > 0.0) {
                return Err(Error::InvalidParameter {
                    name: "years",
                    value: years.to_string(),
                    reason: "must be positive".into(),
                });
            }
            Ok((*area_ha, *years))
        }
    }
}
