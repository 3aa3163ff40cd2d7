//! Error types for riskalloc

use thiserror::Error;

/// Main error type for riskalloc operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Raster resolution mismatch: expected {expected:?}, got {actual:?}")]
    ResolutionMismatch {
        expected: (f64, f64),
        actual: (f64, f64),
    },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("GDAL error: {0}")]
    #[cfg(feature = "gdal")]
    Gdal(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid natural risk threshold: {value} (must be > 0)")]
    InvalidThreshold { value: f64 },

    #[error("Maximum number of iterations reached ({iterations}); adjustment ratio is still {ratio}")]
    ConvergenceExhausted { iterations: usize, ratio: f64 },

    #[error("Modeled deforestation is zero; the adjustment ratio is undefined")]
    ZeroModeledDeforestation,

    /// An evaluation input that cannot be assessed: an empty mask, too few
    /// usable cells, or cell values that leave the regression undefined
    #[error("Degenerate evaluation input: {cells} usable cell(s), {reason}")]
    DegenerateGeometry { cells: usize, reason: String },

    #[error("Bin {id} is missing from the relative frequency table")]
    MissingBin { id: i32 },

    #[error("Table error: {0}")]
    Table(String),

    #[error("Vector error: {0}")]
    Vector(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for Error {
    fn from(e: gdal::errors::GdalError) -> Self {
        Error::Gdal(e.to_string())
    }
}

/// Result type alias for riskalloc operations
pub type Result<T> = std::result::Result<T, Error>;
