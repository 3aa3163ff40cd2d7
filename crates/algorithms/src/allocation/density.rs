//! Density maps
//!
//! A density map assigns every pixel its bin's average deforestation,
//! scaled by the pixel area to hectares.

use super::frequency::FrequencyTable;
use crate::maybe_rayon::*;
use ndarray::Array2;
use riskalloc_core::raster::Raster;
use riskalloc_core::{Error, Result};

/// No-data value written for density grids
pub const DENSITY_NODATA: f64 = -1.0;

/// Sorted exact-match lookup from bin ID to average deforestation.
///
/// Bin 0 always maps to 0.
#[derive(Debug, Clone)]
pub struct BinLookup {
    ids: Vec<i32>,
    values: Vec<f64>,
}

impl BinLookup {
    pub fn from_table(table: &FrequencyTable) -> Self {
        let mut ids = Vec::with_capacity(table.len() + 1);
        let mut values = Vec::with_capacity(table.len() + 1);
        ids.push(0);
        values.push(0.0);
        for row in table.rows() {
            // Tables never hold ID 0, but negative IDs sort before it
            ids.push(row.id);
            values.push(row.average);
        }
        let mut order: Vec<usize> = (0..ids.len()).collect();
        order.sort_by_key(|&i| ids[i]);
        Self {
            ids: order.iter().map(|&i| ids[i]).collect(),
            values: order.iter().map(|&i| values[i]).collect(),
        }
    }

    /// Average deforestation of `id`.
    ///
    /// # Errors
    /// `MissingBin` when `id` has no row.
    pub fn get(&self, id: i32) -> Result<f64> {
        self.ids
            .binary_search(&id)
            .map(|i| self.values[i])
            .map_err(|_| Error::MissingBin { id })
    }

    /// Number of entries, including bin 0
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Build a density grid (hectares per pixel) from a bin grid.
///
/// Bin-grid nodata maps to the density nodata value.
///
/// # Errors
/// * `InvalidParameter` if `pixel_area_ha` is not positive
/// * `MissingBin` for the first bin, in scan order, absent from the table
pub fn density_map(bins: &Raster<i32>, table: &FrequencyTable, pixel_area_ha: f64) -> Result<Raster<f64>> {
    if !(pixel_area_ha.is_finite() && pixel_area_ha > 0.0) {
        return Err(Error::InvalidParameter {
            name: "pixel_area_ha",
            value: pixel_area_ha.to_string(),
            reason: "must be positive".into(),
        });
    }

    let lookup = BinLookup::from_table(table);
    let (rows, cols) = bins.shape();
    let nodata = bins.nodata();

    let row_results: Vec<Result<Vec<f64>>> = (0..rows)
        .into_par_iter()
        .map(|row| {
            let mut row_data = vec![0.0; cols];
            for col in 0..cols {
                let id = unsafe { bins.get_unchecked(row, col) };
                row_data[col] = if Some(id) == nodata {
                    DENSITY_NODATA
                } else {
                    lookup.get(id)? * pixel_area_ha
                };
            }
            Ok(row_data)
        })
        .collect();

    let mut data = Vec::with_capacity(rows * cols);
    for row in row_results {
        data.extend(row?);
    }

    let mut output = bins.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(DENSITY_NODATA));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::frequency::FrequencyRow;
    use approx::assert_relative_eq;

    fn table() -> FrequencyTable {
        FrequencyTable::from_rows(vec![
            FrequencyRow::new(1001, 2, 16),
            FrequencyRow::new(2001, 1, 2),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup_is_exact() {
        let lookup = BinLookup::from_table(&table());
        assert_eq!(lookup.len(), 3);
        assert_eq!(lookup.get(0).unwrap(), 0.0);
        assert_relative_eq!(lookup.get(2001).unwrap(), 0.5);
        assert!(matches!(lookup.get(1500), Err(Error::MissingBin { id: 1500 })));
        assert!(matches!(lookup.get(3001), Err(Error::MissingBin { id: 3001 })));
    }

    #[test]
    fn test_density_scales_by_pixel_area() {
        let mut bins = Raster::from_vec(vec![0, 1001, 2001, -1], 2, 2).unwrap();
        bins.set_nodata(Some(-1));
        let density = density_map(&bins, &table(), 0.09).unwrap();
        let d = density.data();
        assert_eq!(d[(0, 0)], 0.0);
        assert_relative_eq!(d[(0, 1)], 0.125 * 0.09);
        assert_relative_eq!(d[(1, 0)], 0.5 * 0.09);
        assert_eq!(d[(1, 1)], DENSITY_NODATA);
        assert_relative_eq!(density.valid_sum(), 0.625 * 0.09);
    }

    #[test]
    fn test_unmapped_bin_is_a_hard_error() {
        let bins = Raster::from_vec(vec![1001, 7003], 1, 2).unwrap();
        assert!(matches!(
            density_map(&bins, &table(), 0.09),
            Err(Error::MissingBin { id: 7003 })
        ));
    }

    #[test]
    fn test_pixel_area_must_be_positive() {
        let bins: Raster<i32> = Raster::new(1, 1);
        assert!(matches!(
            density_map(&bins, &table(), 0.0),
            Err(Error::InvalidParameter { name: "pixel_area_ha", .. })
        ));
    }
}
