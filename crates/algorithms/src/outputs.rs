//! Shared helpers for writing workflow outputs through an [`OutputStage`]

use riskalloc_core::io::{write_geotiff, IoElement, OutputStage};
use riskalloc_core::raster::Raster;
use riskalloc_core::Result;
use std::path::Path;

/// Write `raster` to a staged temporary for `target`
pub(crate) fn stage_raster<T: IoElement>(stage: &mut OutputStage, raster: &Raster<T>, target: &Path) -> Result<()> {
    let tmp = stage.stage(target)?;
    write_geotiff(raster, &tmp, None)
}

/// Float32 copy of a density grid, keeping its nodata value
pub(crate) fn to_float32(density: &Raster<f64>) -> Raster<f32> {
    let mut out = density.map(|v| v as f32);
    out.set_nodata(density.nodata().map(|v| v as f32));
    out
}
