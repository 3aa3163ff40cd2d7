//! Raster data structures and operations

mod element;
mod geotransform;
mod grid;

pub use element::{RasterElement, SampleFormat};
pub use geotransform::{GeoTransform, SQUARE_METRES_PER_HECTARE};
pub use grid::Raster;
