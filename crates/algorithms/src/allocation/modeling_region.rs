//! Modeling regions
//!
//! A modeling region (bin) is a vulnerability class inside one
//! administrative subdivision, identified by `class * 1000 + subdivision`.

use crate::maybe_rayon::*;
use ndarray::Array2;
use riskalloc_core::raster::Raster;
use riskalloc_core::{Algorithm, Error, Result};
use tracing::debug;

/// Multiplier separating the vulnerability class from the subdivision id
pub const BIN_FACTOR: i32 = 1000;

/// No-data value written for bin-id grids
pub const BIN_NODATA: i32 = -1;

/// Vulnerability zone of a bin id
pub fn zone_of(bin_id: i32) -> i32 {
    bin_id / BIN_FACTOR
}

/// Largest class whose bin ids still fit in an `i32`
pub const MAX_CLASS: i32 = (i32::MAX - (BIN_FACTOR - 1)) / BIN_FACTOR;

/// Whether a class value takes part in binning
fn is_classified(class: i32, nodata: Option<i32>) -> bool {
    class > 0 && Some(class) != nodata
}

/// Fuse a vulnerability class grid with a subdivision grid into bin ids.
///
/// `bin = class * 1000 + subdivision` wherever `class > 0`, else 0.
/// Pixels where either the class or the subdivision is nodata are also 0.
///
/// # Errors
/// * `SizeMismatch`/`ResolutionMismatch` if the grids are not co-registered
/// * `InvalidParameter` for a class above [`MAX_CLASS`], or for a
///   subdivision id outside `[0, 1000)` under a positive class. Ids are
///   never truncated.
pub fn modeling_regions(classes: &Raster<i32>, subdivisions: &Raster<i32>) -> Result<Raster<i32>> {
    classes.ensure_same_grid(subdivisions)?;
    let (rows, cols) = classes.shape();
    let class_nodata = classes.nodata();
    let sub_nodata = subdivisions.nodata();

    let mut skipped = 0usize;
    for (&class, &sub) in classes.data().iter().zip(subdivisions.data().iter()) {
        if !is_classified(class, class_nodata) {
            continue;
        }
        if class > MAX_CLASS {
            return Err(Error::InvalidParameter {
                name: "class",
                value: class.to_string(),
                reason: format!("vulnerability classes must not exceed {}", MAX_CLASS),
            });
        }
        if Some(sub) == sub_nodata {
            skipped += 1;
            continue;
        }
        if !(0..BIN_FACTOR).contains(&sub) {
            return Err(Error::InvalidParameter {
                name: "subdivision",
                value: sub.to_string(),
                reason: format!("subdivision ids must be in [0, {})", BIN_FACTOR),
            });
        }
    }
    if skipped > 0 {
        debug!("{} classified pixels have no subdivision and are left out", skipped);
    }

    let data: Vec<i32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0i32; cols];
            for col in 0..cols {
                let class = unsafe { classes.get_unchecked(row, col) };
                let sub = unsafe { subdivisions.get_unchecked(row, col) };
                if is_classified(class, class_nodata) && Some(sub) != sub_nodata {
                    row_data[col] = class * BIN_FACTOR + sub;
                }
            }
            row_data
        })
        .collect();

    let mut output = classes.with_same_meta::<i32>(rows, cols);
    output.set_nodata(Some(BIN_NODATA));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Modeling-region construction as a pipeline stage
#[derive(Debug, Clone, Default)]
pub struct ModelingRegions;

impl Algorithm for ModelingRegions {
    /// (vulnerability classes, subdivisions)
    type Input = (Raster<i32>, Raster<i32>);
    type Output = Raster<i32>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Modeling Regions"
    }

    fn description(&self) -> &'static str {
        "Combine vulnerability classes and administrative subdivisions into bin ids"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        modeling_regions(&input.0, &input.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::frequency::FrequencyTable;

    #[test]
    fn test_bin_ids() {
        let classes = Raster::from_vec(vec![0, 1, 29, 30], 2, 2).unwrap();
        let subs = Raster::from_vec(vec![5, 5, 12, 999], 2, 2).unwrap();
        let bins = ModelingRegions.execute_default((classes, subs)).unwrap();
        assert_eq!(bins.data().as_slice().unwrap(), &[0, 1005, 29012, 30999]);
        assert_eq!(bins.nodata(), Some(BIN_NODATA));
        assert_eq!(zone_of(29012), 29);
    }

    #[test]
    fn test_out_of_range_subdivision_is_rejected() {
        let classes = Raster::filled(2, 2, 3);
        let subs = Raster::from_vec(vec![1, 2, 1000, 4], 2, 2).unwrap();
        let err = modeling_regions(&classes, &subs).unwrap_err();
        match err {
            Error::InvalidParameter { name, value, .. } => {
                assert_eq!(name, "subdivision");
                assert_eq!(value, "1000");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_masked_pixels_ignore_subdivision_range() {
        let classes = Raster::from_vec(vec![0, 2], 1, 2).unwrap();
        let subs = Raster::from_vec(vec![-7, 1], 1, 2).unwrap();
        let bins = modeling_regions(&classes, &subs).unwrap();
        assert_eq!(bins.data().as_slice().unwrap(), &[0, 2001]);
    }

    #[test]
    fn test_subdivision_nodata_is_left_out() {
        let classes = Raster::filled(1, 2, 4);
        let mut subs = Raster::from_vec(vec![-9999, 8], 1, 2).unwrap();
        subs.set_nodata(Some(-9999));
        let bins = modeling_regions(&classes, &subs).unwrap();
        assert_eq!(bins.data().as_slice().unwrap(), &[0, 4008]);
    }

    #[test]
    fn test_class_nodata_is_left_out() {
        let mut classes = Raster::from_vec(vec![1, 1, 255, 255], 2, 2).unwrap();
        classes.set_nodata(Some(255));
        let subs = Raster::filled(2, 2, 3);
        let bins = modeling_regions(&classes, &subs).unwrap();
        assert_eq!(bins.data().as_slice().unwrap(), &[1003, 1003, 0, 0]);

        let table = FrequencyTable::fit(&bins, &Raster::new(2, 2)).unwrap();
        let ids: Vec<i32> = table.rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1003]);
    }

    #[test]
    fn test_oversized_class_is_rejected() {
        let subs = Raster::filled(1, 2, 999);
        let classes = Raster::from_vec(vec![1, i32::MAX], 1, 2).unwrap();
        assert!(matches!(
            modeling_regions(&classes, &subs),
            Err(Error::InvalidParameter { name: "class", .. })
        ));

        let classes = Raster::from_vec(vec![MAX_CLASS, MAX_CLASS + 1], 1, 2).unwrap();
        assert!(matches!(
            modeling_regions(&classes, &subs),
            Err(Error::InvalidParameter { name: "class", .. })
        ));

        let classes = Raster::filled(1, 2, MAX_CLASS);
        let bins = modeling_regions(&classes, &subs).unwrap();
        assert_eq!(bins.get(0, 1).unwrap(), MAX_CLASS * BIN_FACTOR + 999);
    }
}
