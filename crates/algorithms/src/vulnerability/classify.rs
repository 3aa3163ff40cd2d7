//! Vulnerability classification
//!
//! Distances from the forest edge are binned into ordered classes `1..=n`.
//! Class 0 is reserved for pixels outside the mask or without a valid
//! distance.

use super::{is_valid_distance, quantile_sorted};
use crate::maybe_rayon::*;
use ndarray::Array2;
use riskalloc_core::raster::Raster;
use riskalloc_core::{Algorithm, Error, Result};
use tracing::info;

/// Ascending class upper bounds. A distance `d` falls in class
/// `1 + #{u : u <= d}`, so anything at or past the last bound is in the
/// top class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassBreaks {
    upper: Vec<f64>,
}

impl ClassBreaks {
    /// Geometric-interval breaks over [0, NRT].
    ///
    /// The `n_classes - 1` bounds are `NRT * (r^k - 1) / (r^(n-1) - 1)`, so
    /// each interval is `r` times wider than the previous one and the last
    /// bound is the NRT itself. Without an explicit ratio,
    /// `r = NRT^(1/(n-1))` (or 1 when NRT <= 1, giving equal intervals).
    pub fn geometric(nrt: f64, n_classes: usize, ratio: Option<f64>) -> Result<Self> {
        if !(nrt.is_finite() && nrt > 0.0) {
            return Err(Error::InvalidThreshold { value: nrt });
        }
        check_class_count(n_classes)?;

        let steps = (n_classes - 1) as f64;
        let r = match ratio {
            Some(r) if r.is_finite() && r > 0.0 => r,
            Some(r) => {
                return Err(Error::InvalidParameter {
                    name: "ratio",
                    value: r.to_string(),
                    reason: "must be a positive number".into(),
                })
            }
            None if nrt > 1.0 => nrt.powf(1.0 / steps),
            None => 1.0,
        };

        let upper = (1..n_classes)
            .map(|k| {
                if k == n_classes - 1 {
                    nrt
                } else if (r - 1.0).abs() < 1e-12 {
                    nrt * k as f64 / steps
                } else {
                    nrt * (r.powi(k as i32) - 1.0) / (r.powf(steps) - 1.0)
                }
            })
            .collect();

        Ok(Self { upper })
    }

    /// Quantile breaks: the `k/n` quantiles (k = 1..n-1) of `sorted`.
    pub fn quantile(sorted: &[f64], n_classes: usize) -> Result<Self> {
        check_class_count(n_classes)?;
        if sorted.is_empty() {
            return Err(Error::InvalidParameter {
                name: "distance",
                value: "0 pixels".into(),
                reason: "no valid distance inside both masks".into(),
            });
        }
        let upper = (1..n_classes)
            .map(|k| quantile_sorted(sorted, k as f64 / n_classes as f64))
            .collect();
        Ok(Self { upper })
    }

    /// Number of classes, excluding class 0
    pub fn n_classes(&self) -> usize {
        self.upper.len() + 1
    }

    /// Class upper bounds
    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper
    }

    /// Class of a valid distance
    pub fn class_of(&self, distance: f64) -> i32 {
        1 + self.upper.partition_point(|&u| u <= distance) as i32
    }

    /// Classify every pixel where all `masks` are 1 and the distance is valid
    fn classify(&self, distance: &Raster<f64>, masks: &[&Raster<u8>]) -> Result<Raster<i32>> {
        for mask in masks {
            distance.ensure_same_grid(*mask)?;
        }
        let (rows, cols) = distance.shape();
        let nodata = distance.nodata();

        let data: Vec<i32> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![0i32; cols];
                for col in 0..cols {
                    let inside = masks
                        .iter()
                        .all(|m| unsafe { m.get_unchecked(row, col) } == 1);
                    if !inside {
                        continue;
                    }
                    let d = unsafe { distance.get_unchecked(row, col) };
                    if is_valid_distance(d, nodata) {
                        row_data[col] = self.class_of(d);
                    }
                }
                row_data
            })
            .collect();

        let mut output = distance.with_same_meta::<i32>(rows, cols);
        *output.data_mut() =
            Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
        Ok(output)
    }
}

fn check_class_count(n_classes: usize) -> Result<()> {
    if n_classes < 2 || n_classes > i32::MAX as usize / 1000 {
        return Err(Error::InvalidParameter {
            name: "n_classes",
            value: n_classes.to_string(),
            reason: "must be at least 2 and keep class * 1000 within i32".into(),
        });
    }
    Ok(())
}

/// Parameters for geometric-interval classification
#[derive(Debug, Clone)]
pub struct VulnerabilityParams {
    /// Total number of classes, the last one being "beyond NRT"
    pub n_classes: usize,
    /// Ratio between consecutive interval widths; derived from the NRT when `None`
    pub ratio: Option<f64>,
}

impl Default for VulnerabilityParams {
    fn default() -> Self {
        Self {
            n_classes: 30,
            ratio: None,
        }
    }
}

/// Classify a distance raster into geometric-interval vulnerability classes.
///
/// # Arguments
/// * `distance` - Distance to forest edge, in map units
/// * `jurisdiction` - Binary mask; pixels not equal to 1 get class 0
/// * `nrt` - Natural Risk Threshold
/// * `params` - Class count and interval ratio
pub fn geometric_classification(
    distance: &Raster<f64>,
    jurisdiction: &Raster<u8>,
    nrt: f64,
    params: VulnerabilityParams,
) -> Result<Raster<i32>> {
    distance.ensure_same_grid(jurisdiction)?;
    let breaks = ClassBreaks::geometric(nrt, params.n_classes, params.ratio)?;
    info!(
        "Geometric classification: {} classes up to NRT {:.3}",
        breaks.n_classes(),
        nrt
    );
    breaks.classify(distance, &[jurisdiction])
}

/// Parameters for quantile classification
#[derive(Debug, Clone)]
pub struct QuantileParams {
    pub n_classes: usize,
}

impl Default for QuantileParams {
    fn default() -> Self {
        Self { n_classes: 30 }
    }
}

/// Classify a distance raster into equal-count classes, without an NRT.
///
/// Breaks are the distance quantiles over pixels that are both forest and
/// inside the jurisdiction.
pub fn quantile_classification(
    distance: &Raster<f64>,
    forest: &Raster<u8>,
    jurisdiction: &Raster<u8>,
    n_classes: usize,
) -> Result<Raster<i32>> {
    distance.ensure_same_grid(forest)?;
    distance.ensure_same_grid(jurisdiction)?;

    let nodata = distance.nodata();
    let mut samples: Vec<f64> = distance
        .data()
        .iter()
        .zip(forest.data().iter())
        .zip(jurisdiction.data().iter())
        .filter(|((&d, &f), &j)| f == 1 && j == 1 && is_valid_distance(d, nodata))
        .map(|((&d, _), _)| d)
        .collect();
    samples.sort_by(f64::total_cmp);

    let breaks = ClassBreaks::quantile(&samples, n_classes)?;
    info!(
        "Quantile classification: {} classes over {} forest pixels",
        breaks.n_classes(),
        samples.len()
    );
    breaks.classify(distance, &[forest, jurisdiction])
}

/// Quantile vulnerability classification as a pipeline stage
#[derive(Debug, Clone, Default)]
pub struct QuantileClassification;

impl Algorithm for QuantileClassification {
    /// (distance, forest, jurisdiction)
    type Input = (Raster<f64>, Raster<u8>, Raster<u8>);
    type Output = Raster<i32>;
    type Params = QuantileParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Quantile Vulnerability"
    }

    fn description(&self) -> &'static str {
        "Classify distance to forest edge into equal-count vulnerability classes"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (distance, forest, jurisdiction) = input;
        quantile_classification(&distance, &forest, &jurisdiction, params.n_classes)
    }
}

/// Geometric vulnerability classification as a pipeline stage
#[derive(Debug, Clone)]
pub struct GeometricClassification {
    pub nrt: f64,
}

impl Algorithm for GeometricClassification {
    /// (distance, jurisdiction)
    type Input = (Raster<f64>, Raster<u8>);
    type Output = Raster<i32>;
    type Params = VulnerabilityParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Geometric Vulnerability"
    }

    fn description(&self) -> &'static str {
        "Classify distance to forest edge into geometric-interval classes up to the NRT"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (distance, jurisdiction) = input;
        geometric_classification(&distance, &jurisdiction, self.nrt, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use riskalloc_core::GeoTransform;

    #[test]
    fn test_geometric_widths_grow_by_ratio() {
        let breaks = ClassBreaks::geometric(1000.0, 5, Some(2.0)).unwrap();
        let u = breaks.upper_bounds();
        assert_eq!(u.len(), 4);
        // widths 1, 2, 4, 8 scaled to 1000 / 15
        assert_relative_eq!(u[0], 1000.0 / 15.0, epsilon = 1e-9);
        assert_relative_eq!(u[1], 3000.0 / 15.0, epsilon = 1e-9);
        assert_relative_eq!(u[2], 7000.0 / 15.0, epsilon = 1e-9);
        assert_eq!(u[3], 1000.0);
    }

    #[test]
    fn test_derived_ratio_and_top_class() {
        let breaks = ClassBreaks::geometric(3000.0, 30, None).unwrap();
        assert_eq!(breaks.n_classes(), 30);
        assert_eq!(breaks.class_of(0.0), 1);
        assert_eq!(breaks.class_of(2999.9), 29);
        assert_eq!(breaks.class_of(3000.0), 30);
        assert_eq!(breaks.class_of(1.0e6), 30);
    }

    #[test]
    fn test_small_nrt_uses_equal_intervals() {
        let breaks = ClassBreaks::geometric(0.5, 3, None).unwrap();
        assert_eq!(breaks.upper_bounds(), &[0.25, 0.5]);
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(matches!(
            ClassBreaks::geometric(0.0, 30, None),
            Err(Error::InvalidThreshold { .. })
        ));
        assert!(matches!(
            ClassBreaks::geometric(-5.0, 30, None),
            Err(Error::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_classification_is_monotonic_within_mask() {
        let values: Vec<f64> = (0..100).map(|v| (v * v) as f64 * 0.7).collect();
        let distance = Raster::from_vec(values.clone(), 10, 10).unwrap();
        let mask = Raster::filled(10, 10, 1u8);
        let classes = geometric_classification(&distance, &mask, 2500.0, VulnerabilityParams::default()).unwrap();

        let mut pairs: Vec<(f64, i32)> = values.iter().copied().zip(classes.data().iter().copied()).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        for w in pairs.windows(2) {
            assert!(w[0].1 <= w[1].1);
        }
        assert!(pairs.iter().all(|&(_, c)| (1..=30).contains(&c)));
    }

    #[test]
    fn test_mask_and_invalid_distances_get_class_zero() {
        let mut distance = Raster::from_vec(vec![10.0, -1.0, f64::NAN, 50.0, 9999.0, 20.0], 2, 3).unwrap();
        distance.set_nodata(Some(9999.0));
        let mask = Raster::from_vec(vec![1u8, 1, 1, 0, 1, 1], 2, 3).unwrap();
        let classes = geometric_classification(&distance, &mask, 100.0, VulnerabilityParams::default()).unwrap();
        let c = classes.data();
        assert!(c[(0, 0)] > 0);
        assert_eq!(c[(0, 1)], 0);
        assert_eq!(c[(0, 2)], 0);
        assert_eq!(c[(1, 0)], 0);
        assert_eq!(c[(1, 1)], 0);
        assert!(c[(1, 2)] > 0);
    }

    #[test]
    fn test_mismatched_grids_fail_fast() {
        let distance: Raster<f64> = Raster::new(3, 3);
        let mask: Raster<u8> = Raster::new(3, 4);
        assert!(matches!(
            geometric_classification(&distance, &mask, 100.0, VulnerabilityParams::default()),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_quantile_classes_are_balanced() {
        let mut distance = Raster::from_vec((0..16).map(|v| v as f64).collect(), 4, 4).unwrap();
        distance.set_transform(GeoTransform::new(0.0, 120.0, 30.0, -30.0));
        let forest = Raster::filled(4, 4, 1u8);
        let jurisdiction = Raster::filled(4, 4, 1u8);

        let classes = QuantileClassification
            .execute((distance, forest, jurisdiction), QuantileParams { n_classes: 4 })
            .unwrap();

        for class in 1..=4 {
            assert_eq!(classes.count_equal(class), 4);
        }
        assert_eq!(classes.transform().pixel_width, 30.0);
    }

    #[test]
    fn test_quantile_requires_forest_in_jurisdiction() {
        let distance: Raster<f64> = Raster::filled(2, 2, 5.0);
        let forest = Raster::filled(2, 2, 1u8);
        let jurisdiction: Raster<u8> = Raster::new(2, 2);
        assert!(matches!(
            QuantileClassification.execute_default((distance, forest, jurisdiction)),
            Err(Error::InvalidParameter { .. })
        ));
    }
}
