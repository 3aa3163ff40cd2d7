//! Spatial evaluation of a predicted density map against observed
//! deforestation

use super::lattice::{lattice_pitch, systematic_lattice};
use super::polygonize::jurisdiction_polygon;
use super::regression::{accuracy_statistics, AccuracyStats};
use super::report::{
    boundary_features, cell_features, residual_grid, write_performance_chart, CellRecord, ChartRenderer,
};
use super::tessellation::{clip_to_boundary, voronoi_cells, ThiessenCell, DEFAULT_FIDELITY};
use super::zonal::zonal_sum;
use crate::outputs::{stage_raster, to_float32};
use crate::progress::Progress;
use geo::Polygon;
use riskalloc_core::io::{read_geotiff, write_geojson, OutputStage};
use riskalloc_core::raster::Raster;
use riskalloc_core::Result;
use std::path::PathBuf;
use tracing::info;

/// Default assessment cell area (ha)
pub const DEFAULT_CELL_AREA_HA: f64 = 100_000.0;

/// Parameters for the spatial evaluation
#[derive(Debug, Clone)]
pub struct EvaluationParams {
    /// Target area of one assessment cell (ha)
    pub cell_area_ha: f64,
    /// Minimum share of its full area a clipped cell must keep
    pub fidelity: f64,
    /// Add a residual column to the performance chart
    pub include_residuals: bool,
    /// Title passed to the chart renderer
    pub title: String,
}

impl Default for EvaluationParams {
    fn default() -> Self {
        Self {
            cell_area_ha: DEFAULT_CELL_AREA_HA,
            fidelity: DEFAULT_FIDELITY,
            include_residuals: false,
            title: "Actual vs. predicted deforestation".into(),
        }
    }
}

/// Result of an evaluation
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub boundary: Polygon<f64>,
    pub cells: Vec<ThiessenCell>,
    /// One record per cell, in cell ID order
    pub records: Vec<CellRecord>,
    pub stats: AccuracyStats,
}

/// Compare a predicted density map with observed deforestation over
/// Thiessen cells of a systematic lattice clipped to the jurisdiction.
///
/// `actual` is a binary map (1 = deforested); `predicted` holds hectares
/// per pixel. Progress milestones: 20, 30, 40, 60, 70, 80, 90.
pub fn evaluate(
    mask: &Raster<u8>,
    actual: &Raster<u8>,
    predicted: &Raster<f64>,
    params: &EvaluationParams,
    progress: &mut dyn Progress,
) -> Result<Evaluation> {
    mask.ensure_same_grid(actual)?;
    mask.ensure_same_grid(predicted)?;
    let pitch = lattice_pitch(params.cell_area_ha, mask.transform().pixel_width)?;

    let boundary = jurisdiction_polygon(mask)?;
    progress.report(20);

    let (rows, cols) = mask.shape();
    let sites = systematic_lattice(rows, cols, mask.transform(), pitch);
    let voronoi = voronoi_cells(&sites);
    progress.report(30);

    let cells = clip_to_boundary(&voronoi, &boundary, params.fidelity)?;
    progress.report(40);

    let actual_nodata = actual.nodata();
    let deforested = actual.map(move |v| {
        if Some(v) == actual_nodata {
            f64::NAN
        } else if v == 1 {
            1.0
        } else {
            0.0
        }
    });
    let actual_pixels: Vec<f64> = cells.iter().map(|c| zonal_sum(&deforested, &c.geometry)).collect();
    progress.report(60);

    let pixel_area = mask.pixel_area_ha();
    let actual_ha: Vec<f64> = actual_pixels.iter().map(|n| n * pixel_area).collect();
    progress.report(70);

    let predicted_ha: Vec<f64> = cells.iter().map(|c| zonal_sum(predicted, &c.geometry)).collect();
    progress.report(80);

    let records: Vec<CellRecord> = cells
        .iter()
        .zip(actual_ha.iter().zip(&predicted_ha))
        .map(|(cell, (&actual_ha, &predicted_ha))| CellRecord {
            id: cell.id,
            area_ha: cell.area_ha,
            actual_ha,
            predicted_ha,
        })
        .collect();
    let stats = accuracy_statistics(&actual_ha, &predicted_ha, params.cell_area_ha)?;
    progress.report(90);

    info!(
        "Evaluated {} cells: slope {:.4}, intercept {:.4}, R² {:.4}, MedAE {:.3} ha ({:.3}%)",
        stats.samples,
        stats.slope,
        stats.intercept,
        stats.r_squared,
        stats.median_absolute_error,
        stats.median_absolute_error_pct
    );
    Ok(Evaluation { boundary, cells, records, stats })
}

/// Files of an evaluation run
#[derive(Debug, Clone)]
pub struct EvaluationPaths {
    /// Jurisdiction mask (1 inside)
    pub mask: PathBuf,
    /// Binary map of observed deforestation
    pub actual: PathBuf,
    /// Predicted density map
    pub density: PathBuf,
    /// Output: performance chart table (CSV)
    pub chart: PathBuf,
    /// Output: Thiessen cells with their attributes (GeoJSON)
    pub cells: Option<PathBuf>,
    /// Output: jurisdiction boundary (GeoJSON)
    pub boundary: Option<PathBuf>,
    /// Output: per-pixel residual map
    pub residuals: Option<PathBuf>,
}

/// Run [`evaluate`] over files and write its outputs.
///
/// Progress milestones: 0, 10, 20, 30, 40, 60, 70, 80, 90, 100.
pub fn run_evaluation(
    paths: &EvaluationPaths,
    params: &EvaluationParams,
    renderer: Option<&mut dyn ChartRenderer>,
    progress: &mut dyn Progress,
) -> Result<Evaluation> {
    progress.report(0);
    let mask: Raster<u8> = read_geotiff(&paths.mask, None)?;
    let actual: Raster<u8> = read_geotiff(&paths.actual, None)?;
    let predicted: Raster<f64> = read_geotiff(&paths.density, None)?;
    progress.report(10);

    let evaluation = evaluate(&mask, &actual, &predicted, params, progress)?;

    let mut stage = OutputStage::new();
    let chart = stage.stage(&paths.chart)?;
    write_performance_chart(&evaluation.records, &chart, params.include_residuals)?;
    if let Some(target) = &paths.cells {
        let tmp = stage.stage(target)?;
        write_geojson(&cell_features(&evaluation.cells, &evaluation.records), &tmp)?;
    }
    if let Some(target) = &paths.boundary {
        let tmp = stage.stage(target)?;
        write_geojson(&boundary_features(&evaluation.boundary), &tmp)?;
    }
    if let Some(target) = &paths.residuals {
        let residuals = residual_grid(&actual, &predicted)?;
        stage_raster(&mut stage, &to_float32(&residuals), target)?;
    }

    if let Some(renderer) = renderer {
        renderer.render(&evaluation.records, &evaluation.stats, &params.title)?;
    }
    stage.commit()?;

    progress.report(100);
    Ok(evaluation)
}
