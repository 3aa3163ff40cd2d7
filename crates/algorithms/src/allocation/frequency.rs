//! Relative-frequency tables
//!
//! One row per modeling-region bin: how many pixels it covers, how many of
//! them were deforested and the ratio of the two.

use super::modeling_region::zone_of;
use riskalloc_core::io::OutputStage;
use riskalloc_core::raster::Raster;
use riskalloc_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const HEADERS: [&str; 4] = [
    "ID",
    "TotalDeforestation(pixel)",
    "AreaOfBin(pixel)",
    "AverageDeforestation(pixel)",
];

/// One bin of a frequency table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyRow {
    #[serde(rename = "ID")]
    pub id: i32,
    #[serde(rename = "TotalDeforestation(pixel)")]
    pub total_deforestation: u64,
    #[serde(rename = "AreaOfBin(pixel)")]
    pub area: u64,
    #[serde(rename = "AverageDeforestation(pixel)")]
    pub average: f64,
}

impl FrequencyRow {
    /// Build a row, resolving a zero-area bin to an average of 0
    pub fn new(id: i32, total_deforestation: u64, area: u64) -> Self {
        let average = if area == 0 {
            0.0
        } else {
            total_deforestation as f64 / area as f64
        };
        Self {
            id,
            total_deforestation,
            area,
            average,
        }
    }
}

/// A row as found on disk. Counts may be float-formatted and headers may
/// use the spaced spelling of older tables.
#[derive(Debug, Deserialize)]
struct StoredRow {
    #[serde(rename = "ID")]
    id: f64,
    #[serde(rename = "TotalDeforestation(pixel)", alias = "Total Deforestation(pixel)")]
    total_deforestation: f64,
    #[serde(rename = "AreaOfBin(pixel)", alias = "Area of the Bin(pixel)")]
    area: f64,
    #[serde(rename = "AverageDeforestation(pixel)", alias = "Average Deforestation(pixel)")]
    average: f64,
}

impl StoredRow {
    fn into_row(self, line: usize) -> Result<FrequencyRow> {
        let whole = |name: &str, v: f64| -> Result<u64> {
            if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
                Ok(v as u64)
            } else {
                Err(Error::Table(format!("line {}: {} is not a pixel count: {}", line, name, v)))
            }
        };
        if self.id.fract() != 0.0 || self.id.abs() > i32::MAX as f64 {
            return Err(Error::Table(format!("line {}: invalid ID {}", line, self.id)));
        }
        Ok(FrequencyRow {
            id: self.id as i32,
            total_deforestation: whole("total deforestation", self.total_deforestation)?,
            area: whole("area", self.area)?,
            average: self.average,
        })
    }
}

/// Relative-frequency table, sorted ascending by ID, without an ID-0 row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrequencyTable {
    rows: Vec<FrequencyRow>,
}

/// Result of filling a table with rows for unseen bins
#[derive(Debug, Clone)]
pub struct Imputation {
    /// Original rows plus one row per imputed bin, sorted by ID
    pub table: FrequencyTable,
    /// IDs that were added, ascending
    pub imputed: Vec<i32>,
}

impl Imputation {
    pub fn is_empty(&self) -> bool {
        self.imputed.is_empty()
    }
}

impl FrequencyTable {
    /// Tabulate pixel and deforestation counts per bin.
    ///
    /// Bin 0 and the bin grid's nodata are skipped. A pixel counts as
    /// deforested when its deforestation value is exactly 1.
    pub fn fit(bins: &Raster<i32>, deforestation: &Raster<u8>) -> Result<Self> {
        bins.ensure_same_grid(deforestation)?;
        let nodata = bins.nodata();

        let mut counts: BTreeMap<i32, (u64, u64)> = BTreeMap::new();
        for (&id, &def) in bins.data().iter().zip(deforestation.data().iter()) {
            if id == 0 || Some(id) == nodata {
                continue;
            }
            let entry = counts.entry(id).or_default();
            entry.1 += 1;
            if def == 1 {
                entry.0 += 1;
            }
        }

        let rows: Vec<FrequencyRow> = counts
            .into_iter()
            .map(|(id, (total, area))| FrequencyRow::new(id, total, area))
            .collect();
        info!("Frequency table fitted with {} bins", rows.len());
        Ok(Self { rows })
    }

    /// Build a table from rows in any order.
    ///
    /// Rows are sorted by ID; an ID-0 row is dropped and a repeated ID is an error.
    pub fn from_rows(mut rows: Vec<FrequencyRow>) -> Result<Self> {
        rows.retain(|r| r.id != 0);
        rows.sort_by_key(|r| r.id);
        if let Some(w) = rows.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(Error::Table(format!("duplicate bin ID {}", w[0].id)));
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[FrequencyRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row for a bin ID
    pub fn get(&self, id: i32) -> Option<&FrequencyRow> {
        self.rows
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|i| &self.rows[i])
    }

    pub fn contains(&self, id: i32) -> bool {
        self.get(id).is_some()
    }

    /// Add rows for bins observed in a later period but absent here.
    ///
    /// Each missing bin takes the aggregate of the fitted bins in its
    /// vulnerability zone (`id / 1000`): their summed deforestation and
    /// area, so its average is the area-weighted mean of theirs. A zone
    /// without fitted area gets an average of 0.
    pub fn impute<I>(&self, observed_ids: I) -> Imputation
    where
        I: IntoIterator<Item = i32>,
    {
        let mut zones: BTreeMap<i32, (u64, u64)> = BTreeMap::new();
        for row in &self.rows {
            let z = zones.entry(zone_of(row.id)).or_default();
            z.0 += row.total_deforestation;
            z.1 += row.area;
        }

        let missing: BTreeSet<i32> = observed_ids
            .into_iter()
            .filter(|&id| id != 0 && !self.contains(id))
            .collect();

        let mut rows = self.rows.clone();
        for &id in &missing {
            let zone = zone_of(id);
            let (total, area) = zones.get(&zone).copied().unwrap_or_default();
            if area == 0 {
                warn!("Bin {} has no fitted bins in zone {}; its frequency is 0", id, zone);
            }
            rows.push(FrequencyRow::new(id, total, area));
        }
        rows.sort_by_key(|r| r.id);

        let imputed: Vec<i32> = missing.into_iter().collect();
        if !imputed.is_empty() {
            warn!("Imputed {} bins absent from the frequency table: {:?}", imputed.len(), imputed);
        }

        Imputation {
            table: FrequencyTable { rows },
            imputed,
        }
    }

    /// Write the table as CSV
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let table_err = |e: csv::Error| Error::Table(format!("{}: {}", path.as_ref().display(), e));
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path.as_ref())
            .map_err(table_err)?;
        // Header is written explicitly so an empty table still has one
        writer.write_record(HEADERS).map_err(table_err)?;
        for row in &self.rows {
            writer.serialize(row).map_err(table_err)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read a table written by [`FrequencyTable::write_csv`] or by the
    /// original desktop tool
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let table_err = |e: csv::Error| Error::Table(format!("{}: {}", path.as_ref().display(), e));
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path.as_ref())
            .map_err(table_err)?;

        let mut rows = Vec::new();
        for (i, record) in reader.deserialize::<StoredRow>().enumerate() {
            rows.push(record.map_err(table_err)?.into_row(i + 2)?);
        }
        Self::from_rows(rows)
    }
}

/// Distinct non-zero bin IDs of a grid, ignoring its nodata
pub fn observed_bins(bins: &Raster<i32>) -> BTreeSet<i32> {
    let nodata = bins.nodata();
    bins.data()
        .iter()
        .copied()
        .filter(|&id| id != 0 && Some(id) != nodata)
        .collect()
}

/// Path of the backup kept beside a frequency table before it is rewritten
pub fn backup_path(table: &Path) -> PathBuf {
    let stem = table
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frequency".to_string());
    table.with_file_name(format!("{}_backup.csv", stem))
}

/// Stage a backup of the table file at `path`, then stage the merged table
/// over it. Nothing changes on disk until `stage` is committed.
pub fn stage_table_update(stage: &mut OutputStage, path: &Path, merged: &FrequencyTable) -> Result<PathBuf> {
    let backup = backup_path(path);
    let staged_backup = stage.stage(&backup)?;
    std::fs::copy(path, &staged_backup)?;

    let staged_table = stage.stage(path)?;
    merged.write_csv(&staged_table)?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    #[test]
    fn test_single_bin_scenario() {
        let bins = Raster::filled(4, 4, 1001);
        let mut deforestation: Raster<u8> = Raster::new(4, 4);
        deforestation.set(0, 0, 1).unwrap();
        deforestation.set(3, 2, 1).unwrap();

        let table = FrequencyTable::fit(&bins, &deforestation).unwrap();
        assert_eq!(table.len(), 1);
        let row = &table.rows()[0];
        assert_eq!(row.id, 1001);
        assert_eq!(row.total_deforestation, 2);
        assert_eq!(row.area, 16);
        assert_relative_eq!(row.average, 0.125);
    }

    #[test]
    fn test_fit_sorts_and_skips_zero() {
        let bins = Raster::from_vec(vec![2001, 0, 1001, 1001, 2001, 0], 2, 3).unwrap();
        let deforestation = Raster::from_vec(vec![1u8, 1, 0, 1, 0, 1], 2, 3).unwrap();
        let table = FrequencyTable::fit(&bins, &deforestation).unwrap();
        let ids: Vec<i32> = table.rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1001, 2001]);
        assert_relative_eq!(table.get(1001).unwrap().average, 0.5);
        assert_relative_eq!(table.get(2001).unwrap().average, 0.5);
        assert!(table.get(0).is_none());
    }

    #[test]
    fn test_zero_area_resolves_to_zero() {
        let row = FrequencyRow::new(5001, 0, 0);
        assert_eq!(row.average, 0.0);
    }

    #[test]
    fn test_impute_uses_zone_weighted_average() {
        let table = FrequencyTable::from_rows(vec![
            FrequencyRow::new(3001, 1, 10),
            FrequencyRow::new(3002, 9, 30),
            FrequencyRow::new(4001, 2, 4),
        ])
        .unwrap();

        let imputation = table.impute(vec![3001, 3007, 4001, 9002, 0]);
        assert_eq!(imputation.imputed, vec![3007, 9002]);

        let t = &imputation.table;
        assert_eq!(t.len(), 5);
        let new = t.get(3007).unwrap();
        assert_eq!((new.total_deforestation, new.area), (10, 40));
        assert_relative_eq!(new.average, 0.25);
        assert_eq!(t.get(9002).unwrap().average, 0.0);

        let ids: Vec<i32> = t.rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3001, 3002, 3007, 4001, 9002]);
    }

    #[test]
    fn test_every_observed_bin_has_a_row_after_impute() {
        let table = FrequencyTable::from_rows(vec![FrequencyRow::new(1001, 1, 2)]).unwrap();
        let later = Raster::from_vec(vec![1001, 1002, 2001, 0], 2, 2).unwrap();
        let observed = observed_bins(&later);
        let imputation = table.impute(observed.iter().copied());
        assert!(observed.iter().all(|&id| imputation.table.contains(id)));
        assert!(table.impute(vec![1001]).is_empty());
    }

    #[test]
    fn test_csv_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frequency.csv");
        let table = FrequencyTable::from_rows(vec![
            FrequencyRow::new(2003, 7, 9),
            FrequencyRow::new(1001, 1, 3),
        ])
        .unwrap();
        table.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ID,TotalDeforestation(pixel),AreaOfBin(pixel),AverageDeforestation(pixel)"));

        let loaded = FrequencyTable::read_csv(&path).unwrap();
        let pairs: Vec<(i32, f64)> = loaded.rows().iter().map(|r| (r.id, r.average)).collect();
        let expected: Vec<(i32, f64)> = table.rows().iter().map(|r| (r.id, r.average)).collect();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn test_reads_spaced_headers_and_float_counts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.csv");
        std::fs::write(
            &path,
            "ID,Total Deforestation(pixel),Area of the Bin(pixel),Average Deforestation(pixel)\n\
             1001,3.0,12.0,0.25\n\
             1002,0.0,5.0,0.0\n",
        )
        .unwrap();

        let table = FrequencyTable::read_csv(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1001).unwrap().total_deforestation, 3);
        assert_relative_eq!(table.get(1001).unwrap().average, 0.25);
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let err = FrequencyTable::from_rows(vec![FrequencyRow::new(1, 0, 1), FrequencyRow::new(1, 0, 1)]);
        assert!(matches!(err, Err(Error::Table(_))));
    }

    #[test]
    fn test_staged_update_keeps_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("freq.csv");
        let original = FrequencyTable::from_rows(vec![FrequencyRow::new(1001, 1, 4)]).unwrap();
        original.write_csv(&path).unwrap();

        let merged = original.impute(vec![1002]).table;
        let mut stage = OutputStage::new();
        let backup = stage_table_update(&mut stage, &path, &merged).unwrap();
        assert_eq!(backup, dir.path().join("freq_backup.csv"));
        assert!(!backup.exists());
        assert_eq!(FrequencyTable::read_csv(&path).unwrap(), original);

        stage.commit().unwrap();
        assert_eq!(FrequencyTable::read_csv(&backup).unwrap(), original);
        assert_eq!(FrequencyTable::read_csv(&path).unwrap().len(), 2);
    }
}
