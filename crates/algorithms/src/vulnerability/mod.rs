//! Vulnerability zoning of a distance-to-forest-edge raster
//!
//! - **nrt**: Natural Risk Threshold fitting
//! - **classify**: geometric-interval and quantile classification

mod classify;
mod nrt;

pub use classify::{
    geometric_classification, quantile_classification, ClassBreaks, GeometricClassification,
    QuantileClassification, QuantileParams, VulnerabilityParams,
};
pub use nrt::{natural_risk_threshold, NrtPolicy, DEFAULT_NRT_PERCENTILE};

/// Whether a distance value can be classified
pub(crate) fn is_valid_distance(value: f64, nodata: Option<f64>) -> bool {
    use riskalloc_core::RasterElement;
    value.is_finite() && value >= 0.0 && !value.is_nodata(nodata)
}

/// `p`-quantile of an ascending slice, interpolating linearly between
/// order statistics. `p` must lie in [0, 1] and `sorted` must be non-empty.
pub(crate) fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let last = sorted.len() - 1;
    let pos = p * last as f64;
    let lo = pos.floor() as usize;
    if lo >= last {
        return sorted[last];
    }
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[lo + 1] - sorted[lo])
}
