//! I/O operations for reading and writing geospatial data

#[cfg(feature = "gdal")]
mod gdal_io;
mod native;
mod stage;

#[cfg(feature = "gdal")]
pub use gdal_io::{read_geotiff, write_geotiff, GeoTiffOptions};

#[cfg(not(feature = "gdal"))]
pub use native::{read_geotiff, write_geotiff, GeoTiffOptions};

pub use stage::OutputStage;

use crate::error::{Error, Result};
use crate::raster::RasterElement;
use crate::vector::FeatureCollection;
use std::path::Path;

/// Element types the active raster backend can read and write
#[cfg(feature = "gdal")]
pub trait IoElement: RasterElement + gdal::raster::GdalType {}
#[cfg(feature = "gdal")]
impl<T: RasterElement + gdal::raster::GdalType> IoElement for T {}

/// Element types the active raster backend can read and write
#[cfg(not(feature = "gdal"))]
pub trait IoElement: RasterElement {}
#[cfg(not(feature = "gdal"))]
impl<T: RasterElement> IoElement for T {}

/// Rewrite `dst` so it carries the geotransform and CRS of `src`.
///
/// Pixel values, nodata and sample type of `dst` are unchanged; `T` must
/// be the element type `dst` was written with.
pub fn copy_reference_descriptor<T, P, Q>(src: P, dst: Q) -> Result<()>
where
    T: IoElement,
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let reference = read_geotiff::<f32, _>(src.as_ref(), None)?;
    let mut target = read_geotiff::<T, _>(dst.as_ref(), None)?;
    target.set_transform(*reference.transform());
    target.set_crs(reference.crs().cloned());
    write_geotiff(&target, dst.as_ref(), None)
}

/// Write features as a GeoJSON FeatureCollection
pub fn write_geojson<P: AsRef<Path>>(collection: &FeatureCollection, path: P) -> Result<()> {
    let text = geojson::GeoJson::FeatureCollection(collection.to_geojson()).to_string();
    std::fs::write(path.as_ref(), text)
        .map_err(|e| Error::Vector(format!("{}: {}", path.as_ref().display(), e)))
}
