//! Native GeoTIFF reading/writing (without GDAL dependency)
//!
//! Uses the `tiff` crate for basic TIFF I/O. Georeferencing is limited to
//! the pixel-scale and tie-point tags plus GDAL's nodata tag; for CRS
//! persistence enable the `gdal` feature.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement, SampleFormat};
use num_traits::NumCast;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{
    ColorType, Gray16, Gray32Float, Gray64Float, Gray8, GrayI16, GrayI32,
};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind, TiffValue};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    /// Compression (not supported in native mode)
    pub compression: String,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            compression: "NONE".to_string(),
        }
    }
}

/// Resolve a numeric tag to the decoder's own representation, named or not
fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Read a GeoTIFF file into a Raster
///
/// Only the first band is read in native mode.
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    if let Some(b) = band {
        if b != 1 {
            return Err(Error::InvalidParameter {
                name: "band",
                value: b.to_string(),
                reason: "native reader only supports band 1".into(),
            });
        }
    }
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

fn cast_all<S: NumCast + Copy, T: RasterElement>(buf: Vec<S>) -> Vec<T> {
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

/// Internal: decode a GeoTIFF from any `Read + Seek` source
fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder =
        Decoder::new(reader).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;

    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I8(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }

    if let Ok(text) = decoder.get_tag_ascii_string(tag(GDAL_NODATA)) {
        let parsed = text.trim_matches(char::from(0)).trim().parse::<f64>().ok();
        raster.set_nodata(parsed.and_then(num_traits::cast));
    }

    Ok(raster)
}

/// Read the transform from ModelPixelScale + ModelTiepoint, if present
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

/// Write a Raster to a GeoTIFF file
///
/// The sample type follows the element type, so bin-id grids stay integral
/// and densities stay floating point.
pub fn write_geotiff<T, P>(
    raster: &Raster<T>,
    path: P,
    _options: Option<GeoTiffOptions>,
) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    encode_geotiff(raster, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Internal: encode a Raster as GeoTIFF into any `Write + Seek` sink
fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer)
        .map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    match T::sample_format() {
        SampleFormat::UInt8 => encode_image::<Gray8, _, _>(&mut encoder, raster),
        SampleFormat::UInt16 => encode_image::<Gray16, _, _>(&mut encoder, raster),
        SampleFormat::Int16 => encode_image::<GrayI16, _, _>(&mut encoder, raster),
        SampleFormat::Int32 => encode_image::<GrayI32, _, _>(&mut encoder, raster),
        SampleFormat::Float32 => encode_image::<Gray32Float, _, _>(&mut encoder, raster),
        SampleFormat::Float64 => encode_image::<Gray64Float, _, _>(&mut encoder, raster),
    }
}

fn encode_image<C, T, W>(encoder: &mut TiffEncoder<W>, raster: &Raster<T>) -> Result<()>
where
    C: ColorType,
    C::Inner: NumCast + Copy + Default,
    [C::Inner]: TiffValue,
    T: RasterElement,
    W: Write + Seek,
{
    let (rows, cols) = raster.shape();

    let data: Vec<C::Inner> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or_default())
        .collect();

    let mut image = encoder
        .new_image::<C>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    write_geo_tags(image.encoder(), raster)?;

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

fn write_geo_tags<W, K, T>(dir: &mut DirectoryEncoder<'_, W, K>, raster: &Raster<T>) -> Result<()>
where
    W: Write + Seek,
    K: TiffKind,
    T: RasterElement,
{
    let gt = raster.transform();

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    dir.write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    dir.write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;

    // Version 1.1.0 with two keys: projected model, pixel-is-area
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];
    dir.write_tag(tag(GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    if let Some(nd) = raster.nodata().and_then(|v| v.to_f64()) {
        let text = format!("{}", nd);
        dir.write_tag(tag(GDAL_NODATA), text.as_str())
            .map_err(|e| Error::Other(format!("Cannot write nodata tag: {}", e)))?;
    }

    Ok(())
}
