//! Natural Risk Threshold (NRT) fitting
//!
//! The NRT is the distance from the forest edge beyond which deforestation
//! risk is treated as negligible.

use super::{is_valid_distance, quantile_sorted};
use riskalloc_core::raster::Raster;
use riskalloc_core::{Error, Result};
use tracing::info;

/// Share of historical deforestation expected to fall within the NRT
pub const DEFAULT_NRT_PERCENTILE: f64 = 0.995;

/// How the Natural Risk Threshold is obtained
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NrtPolicy {
    /// A threshold supplied directly, in map units
    Fixed(f64),
    /// The given quantile of distance over deforested pixels in the jurisdiction
    DeforestationPercentile(f64),
}

impl Default for NrtPolicy {
    fn default() -> Self {
        NrtPolicy::DeforestationPercentile(DEFAULT_NRT_PERCENTILE)
    }
}

/// Compute the Natural Risk Threshold.
///
/// For [`NrtPolicy::DeforestationPercentile`] the distances of every
/// deforested pixel (value 1) inside the jurisdiction (value 1) are
/// collected and their quantile is taken with linear interpolation.
///
/// # Errors
/// * `SizeMismatch`/`ResolutionMismatch` if the grids are not co-registered
/// * `InvalidParameter` for a percentile outside (0, 1] or no deforested pixels
/// * `InvalidThreshold` if the resulting NRT is not positive
pub fn natural_risk_threshold(
    distance: &Raster<f64>,
    deforestation: &Raster<u8>,
    jurisdiction: &Raster<u8>,
    policy: NrtPolicy,
) -> Result<f64> {
    let nrt = match policy {
        NrtPolicy::Fixed(value) => value,
        NrtPolicy::DeforestationPercentile(p) => {
            if !(p > 0.0 && p <= 1.0) {
                return Err(Error::InvalidParameter {
                    name: "percentile",
                    value: p.to_string(),
                    reason: "must be in (0, 1]".into(),
                });
            }
            distance.ensure_same_grid(deforestation)?;
            distance.ensure_same_grid(jurisdiction)?;

            let nodata = distance.nodata();
            let mut samples: Vec<f64> = distance
                .data()
                .iter()
                .zip(deforestation.data().iter())
                .zip(jurisdiction.data().iter())
                .filter(|((&d, &def), &jur)| def == 1 && jur == 1 && is_valid_distance(d, nodata))
                .map(|((&d, _), _)| d)
                .collect();

            if samples.is_empty() {
                return Err(Error::InvalidParameter {
                    name: "deforestation",
                    value: "0 pixels".into(),
                    reason: "no deforested pixel inside the jurisdiction".into(),
                });
            }

            samples.sort_by(f64::total_cmp);
            let nrt = quantile_sorted(&samples, p);
            info!(
                "NRT = {:.3} from the {} quantile of {} deforested pixels",
                nrt,
                p,
                samples.len()
            );
            nrt
        }
    };

    if !(nrt.is_finite() && nrt > 0.0) {
        return Err(Error::InvalidThreshold { value: nrt });
    }
    Ok(nrt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grids() -> (Raster<f64>, Raster<u8>, Raster<u8>) {
        let distance = Raster::from_vec((0..16).map(|v| v as f64 * 30.0).collect(), 4, 4).unwrap();
        let mut deforestation: Raster<u8> = Raster::new(4, 4);
        // Distances 30, 60, 90 and 450 are deforested
        for &(r, c) in &[(0, 1), (0, 2), (0, 3), (3, 3)] {
            deforestation.set(r, c, 1).unwrap();
        }
        let jurisdiction = Raster::filled(4, 4, 1u8);
        (distance, deforestation, jurisdiction)
    }

    #[test]
    fn test_fixed_policy() {
        let (d, def, jur) = grids();
        let nrt = natural_risk_threshold(&d, &def, &jur, NrtPolicy::Fixed(1500.0)).unwrap();
        assert_relative_eq!(nrt, 1500.0);
    }

    #[test]
    fn test_fixed_policy_rejects_non_positive() {
        let (d, def, jur) = grids();
        let err = natural_risk_threshold(&d, &def, &jur, NrtPolicy::Fixed(0.0)).unwrap_err();
        assert!(matches!(err, Error::InvalidThreshold { .. }));
    }

    #[test]
    fn test_percentile_policy() {
        let (d, def, jur) = grids();
        let median = natural_risk_threshold(&d, &def, &jur, NrtPolicy::DeforestationPercentile(0.5)).unwrap();
        assert_relative_eq!(median, 75.0);
        let max = natural_risk_threshold(&d, &def, &jur, NrtPolicy::DeforestationPercentile(1.0)).unwrap();
        assert_relative_eq!(max, 450.0);
    }

    #[test]
    fn test_percentile_ignores_pixels_outside_jurisdiction() {
        let (d, def, mut jur) = grids();
        jur.set(3, 3, 0).unwrap();
        let max = natural_risk_threshold(&d, &def, &jur, NrtPolicy::DeforestationPercentile(1.0)).unwrap();
        assert_relative_eq!(max, 90.0);
    }

    #[test]
    fn test_no_deforestation_is_rejected() {
        let (d, _, jur) = grids();
        let none: Raster<u8> = Raster::new(4, 4);
        let err = natural_risk_threshold(&d, &none, &jur, NrtPolicy::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "deforestation", .. }));
    }

    #[test]
    fn test_zero_quantile_is_invalid_threshold() {
        let (mut d, mut def, jur) = grids();
        def.set(0, 0, 1).unwrap();
        d.set(0, 1, 0.0).unwrap();
        // Deforested distances are now [0, 0, 60, 90, 450]
        let err = natural_risk_threshold(&d, &def, &jur, NrtPolicy::DeforestationPercentile(0.2)).unwrap_err();
        assert!(matches!(err, Error::InvalidThreshold { .. }));
    }
}
