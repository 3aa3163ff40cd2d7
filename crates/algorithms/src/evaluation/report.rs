//! Evaluation outputs: performance chart table, cell and boundary
//! features, residual grid

use super::regression::AccuracyStats;
use super::tessellation::ThiessenCell;
use crate::maybe_rayon::*;
use geo::{Geometry, Polygon};
use ndarray::Array2;
use riskalloc_core::raster::Raster;
use riskalloc_core::vector::{AttributeValue, Feature, FeatureCollection};
use riskalloc_core::{Error, Result};
use std::path::Path;

/// Actual and predicted deforestation of one assessment cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRecord {
    pub id: usize,
    pub area_ha: f64,
    pub actual_ha: f64,
    pub predicted_ha: f64,
}

impl CellRecord {
    /// Predicted minus actual
    pub fn residual_ha(&self) -> f64 {
        self.predicted_ha - self.actual_ha
    }
}

/// Renders the actual/predicted scatter of an evaluation.
///
/// Called by the evaluation workflow when one is supplied.
pub trait ChartRenderer {
    fn render(&mut self, records: &[CellRecord], stats: &AccuracyStats, title: &str) -> Result<()>;
}

const CHART_HEADERS: [&str; 4] = [
    "ID",
    "ActualDeforestation(ha)",
    "PredictedDeforestation(ha)",
    "Residuals(ha)",
];

/// Write the performance chart table, sorted by ID
pub fn write_performance_chart<P: AsRef<Path>>(records: &[CellRecord], path: P, with_residuals: bool) -> Result<()> {
    let mut sorted = records.to_vec();
    sorted.sort_by_key(|r| r.id);

    let columns = if with_residuals { 4 } else { 3 };
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| Error::Table(e.to_string()))?;
    writer
        .write_record(&CHART_HEADERS[..columns])
        .map_err(|e| Error::Table(e.to_string()))?;

    for r in &sorted {
        let mut row = vec![r.id.to_string(), r.actual_ha.to_string(), r.predicted_ha.to_string()];
        if with_residuals {
            row.push(r.residual_ha().to_string());
        }
        writer.write_record(&row).map_err(|e| Error::Table(e.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Cell polygons with their ID, area and deforestation attributes.
///
/// Records are matched to cells by ID; cells without a record are skipped.
pub fn cell_features(cells: &[ThiessenCell], records: &[CellRecord]) -> FeatureCollection {
    cells
        .iter()
        .filter_map(|cell| {
            let record = records.iter().find(|r| r.id == cell.id)?;
            Some(
                Feature::new(Geometry::MultiPolygon(cell.geometry.clone()))
                    .with_property("ID", AttributeValue::Int(cell.id as i64))
                    .with_property("Area_ha", AttributeValue::Float(cell.area_ha))
                    .with_property("ActualDef", AttributeValue::Float(record.actual_ha))
                    .with_property("PredDef", AttributeValue::Float(record.predicted_ha))
                    .with_property("Residual", AttributeValue::Float(record.residual_ha())),
            )
        })
        .collect()
}

/// The jurisdiction outline as a single feature
pub fn boundary_features(boundary: &Polygon<f64>) -> FeatureCollection {
    std::iter::once(Feature::new(Geometry::Polygon(boundary.clone())).with_property("ID", AttributeValue::Int(1)))
        .collect()
}

/// Per-pixel `predicted - actual * pixel_area_ha`.
///
/// Nodata (-1) wherever either input is nodata.
pub fn residual_grid(actual: &Raster<u8>, predicted: &Raster<f64>) -> Result<Raster<f64>> {
    actual.ensure_same_grid(predicted)?;
    let (rows, cols) = predicted.shape();
    let pixel_area = predicted.pixel_area_ha();
    const NODATA: f64 = -1.0;

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![NODATA; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let a = unsafe { actual.get_unchecked(row, col) };
                let p = unsafe { predicted.get_unchecked(row, col) };
                if actual.is_nodata(a) || predicted.is_nodata(p) || p.is_nan() {
                    continue;
                }
                let observed = if a == 1 { pixel_area } else { 0.0 };
                *out = p - observed;
            }
            row_data
        })
        .collect();

    let mut output = predicted.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(NODATA));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}
