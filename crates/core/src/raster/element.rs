//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// On-disk sample layout of a raster element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    UInt8,
    UInt16,
    Int16,
    Int32,
    Float32,
    Float64,
}

/// Trait for types that can be stored in a raster cell.
///
/// Binary masks are read as `u8`, class and bin-id grids as `i32` and
/// distances or densities as `f64`.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Default no-data value for this type
    fn default_nodata() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Sample layout used when the element is written to disk
    fn sample_format() -> SampleFormat;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_raster_element_int {
    ($t:ty, $fmt:ident) => {
        impl RasterElement for $t {
            fn sample_format() -> SampleFormat {
                SampleFormat::$fmt
            }

            fn default_nodata() -> Self {
                <$t>::MIN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                match nodata {
                    Some(nd) => *self == nd,
                    None => false,
                }
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty, $fmt:ident) => {
        impl RasterElement for $t {
            fn sample_format() -> SampleFormat {
                SampleFormat::$fmt
            }

            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) => (self - nd).abs() < <$t>::EPSILON * 100.0,
                    None => false,
                }
            }
        }
    };
}

impl_raster_element_int!(i16, Int16);
impl_raster_element_int!(i32, Int32);
impl_raster_element_int!(u8, UInt8);
impl_raster_element_int!(u16, UInt16);
impl_raster_element_float!(f32, Float32);
impl_raster_element_float!(f64, Float64);
