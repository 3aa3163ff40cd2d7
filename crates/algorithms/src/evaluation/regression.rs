//! Accuracy statistics of predicted against actual deforestation

use riskalloc_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Goodness of fit of per-cell predictions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyStats {
    /// Number of cells compared
    pub samples: usize,
    /// Slope of the least-squares line of predicted on actual
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination
    pub r_squared: f64,
    /// Median absolute error (ha)
    pub median_absolute_error: f64,
    /// Median absolute error as a percentage of the cell area
    pub median_absolute_error_pct: f64,
}

/// Regress `predicted` on `actual` (both in ha).
///
/// # Errors
/// - `InvalidParameter` if the slices differ in length or `cell_area_ha` is not positive
/// - `DegenerateGeometry` with fewer than two cells or no spread in `actual`
pub fn accuracy_statistics(actual: &[f64], predicted: &[f64], cell_area_ha: f64) -> Result<AccuracyStats> {
    if actual.len() != predicted.len() {
        return Err(Error::InvalidParameter {
            name: "predicted",
            value: predicted.len().to_string(),
            reason: format!("expected {} values to match actual", actual.len()),
        });
    }
    if !(cell_area_ha > 0.0) {
        return Err(Error::InvalidParameter {
            name: "cell_area_ha",
            value: cell_area_ha.to_string(),
            reason: "must be positive".into(),
        });
    }

    let n = actual.len();
    if n < 2 {
        return Err(Error::DegenerateGeometry {
            cells: n,
            reason: "at least two cells are needed to fit a regression".into(),
        });
    }

    let mean_x = actual.iter().sum::<f64>() / n as f64;
    let mean_y = predicted.iter().sum::<f64>() / n as f64;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (&x, &y) in actual.iter().zip(predicted) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx <= 0.0 {
        return Err(Error::DegenerateGeometry {
            cells: n,
            reason: "actual deforestation is identical in every cell, so the regression slope is undefined".into(),
        });
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let r_squared = if syy > 0.0 { sxy * sxy / (sxx * syy) } else { 0.0 };

    let mut errors: Vec<f64> = actual.iter().zip(predicted).map(|(x, y)| (y - x).abs()).collect();
    errors.sort_by(f64::total_cmp);
    let median_absolute_error = if n % 2 == 1 {
        errors[n / 2]
    } else {
        (errors[n / 2 - 1] + errors[n / 2]) / 2.0
    };

    Ok(AccuracyStats {
        samples: n,
        slope,
        intercept,
        r_squared,
        median_absolute_error,
        median_absolute_error_pct: 100.0 * median_absolute_error / cell_area_ha,
    })
}
