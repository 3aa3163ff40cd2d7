//! End-to-end run of the allocation pipeline on synthetic rasters:
//! vulnerability zoning, fitting, confirmation, validity and evaluation.
//!
//! The grid is 60×60 pixels of 100 m (1 ha each). Distance to the forest
//! edge grows eastwards and deforestation thins out with distance.

#![cfg(not(feature = "gdal"))]

use approx::assert_relative_eq;
use riskalloc_algorithms::allocation::{
    backup_path, run_fit, run_prediction, ConvergenceStatus, FitPaths, FrequencyTable, PredictionPaths,
    PredictionTarget,
};
use riskalloc_algorithms::evaluation::{run_evaluation, EvaluationParams, EvaluationPaths};
use riskalloc_algorithms::progress::Silent;
use riskalloc_algorithms::vulnerability::{
    geometric_classification, natural_risk_threshold, NrtPolicy, VulnerabilityParams,
};
use riskalloc_core::io::{read_geotiff, write_geotiff};
use riskalloc_core::{GeoTransform, Raster, RasterElement};
use std::path::{Path, PathBuf};

const SIZE: usize = 60;

fn georef<T: RasterElement>(mut r: Raster<T>) -> Raster<T> {
    r.set_transform(GeoTransform::new(500_000.0, 8_006_000.0, 100.0, -100.0));
    r
}

fn distance() -> Raster<f64> {
    let mut d = georef(Raster::new(SIZE, SIZE));
    for row in 0..SIZE {
        for col in 0..SIZE {
            d.set(row, col, col as f64 * 100.0).unwrap();
        }
    }
    d
}

fn deforestation(shift: usize) -> Raster<u8> {
    let mut def = georef(Raster::new(SIZE, SIZE));
    for row in 0..SIZE {
        for col in 0..SIZE {
            if (row * 7 + col * 3 + shift) % 60 > col + 20 {
                def.set(row, col, 1).unwrap();
            }
        }
    }
    def
}

/// Two subdivisions (north 0, south 1); `extra` adds a third in the
/// south-east corner
fn subdivisions(extra: bool) -> Raster<i32> {
    let mut s = georef(Raster::new(SIZE, SIZE));
    for row in 0..SIZE {
        for col in 0..SIZE {
            let id = if extra && row >= 45 && col < 15 {
                2
            } else if row >= SIZE / 2 {
                1
            } else {
                0
            };
            s.set(row, col, id).unwrap();
        }
    }
    s
}

fn write<T: RasterElement + riskalloc_core::io::IoElement>(raster: &Raster<T>, path: &Path) -> PathBuf {
    write_geotiff(raster, path, None).unwrap();
    path.to_path_buf()
}

#[test]
fn fit_confirm_predict_evaluate() {
    let dir = tempfile::tempdir().unwrap();
    let p = |name: &str| dir.path().join(name);

    let mask = georef(Raster::filled(SIZE, SIZE, 1u8));
    let hrp_def = deforestation(0);
    let cnf_def = deforestation(11);

    // Vulnerability zoning
    let nrt = natural_risk_threshold(&distance(), &hrp_def, &mask, NrtPolicy::default()).unwrap();
    assert!(nrt > 0.0 && nrt <= 3900.0);
    let classes = geometric_classification(&distance(), &mask, nrt, VulnerabilityParams::default()).unwrap();
    assert!(classes.data().iter().all(|&c| (1..=30).contains(&c)));

    let risk = write(&classes, &p("risk.tif"));
    let admin = write(&subdivisions(false), &p("admin.tif"));
    let admin_vp = write(&subdivisions(true), &p("admin_vp.tif"));
    let hrp = write(&hrp_def, &p("def_hrp.tif"));
    let cnf = write(&cnf_def, &p("def_cnf.tif"));
    let mask_path = write(&mask, &p("mask.tif"));

    // Fitting: the fitted density adds up to the observed deforestation
    let fit = run_fit(
        &FitPaths {
            vulnerability: risk.clone(),
            subdivisions: admin.clone(),
            deforestation: hrp,
            frequency_table: p("freq.csv"),
            modeling_regions: p("bins_hrp.tif"),
            density: p("density_hrp.tif"),
        },
        &mut Silent,
    )
    .unwrap();
    assert_relative_eq!(fit.modeled_ha, hrp_def.count_equal(1) as f64, max_relative = 1e-9);
    assert!(fit.table.rows().iter().all(|r| r.id % 1000 < 2));

    // Confirmation: target is the observed CNF deforestation
    let cnf_density = p("density_cnf.tif");
    let confirmation = run_prediction(
        &PredictionPaths {
            vulnerability: risk.clone(),
            subdivisions: admin,
            frequency_table: p("freq.csv"),
            modeling_regions: p("bins_cnf.tif"),
            density: cnf_density.clone(),
        },
        &PredictionTarget::Observed { deforestation: cnf.clone() },
        5,
        &mut Silent,
    )
    .unwrap();
    assert_eq!(confirmation.status, ConvergenceStatus::Converged);
    assert!(confirmation.imputed.is_empty());
    assert!(confirmation.backup.is_none());
    let density: Raster<f32> = read_geotiff(&cnf_density, None).unwrap();
    let total: f64 = density.data().iter().map(|&v| v as f64).sum();
    assert_relative_eq!(total, cnf_def.count_equal(1) as f64, max_relative = 1e-4);
    assert!(density.data().iter().all(|&v| v <= 1.0 + 1e-6));

    // Validity: a new subdivision forces imputation and an annualized result
    let vp = run_prediction(
        &PredictionPaths {
            vulnerability: risk,
            subdivisions: admin_vp,
            frequency_table: p("freq.csv"),
            modeling_regions: p("bins_vp.tif"),
            density: p("density_vp.tif"),
        },
        &PredictionTarget::Expected { area_ha: 400.0, years: 4.0 },
        5,
        &mut Silent,
    )
    .unwrap();
    assert_eq!(vp.status, ConvergenceStatus::Converged);
    assert!(!vp.imputed.is_empty());
    assert!(vp.imputed.iter().all(|id| id % 1000 == 2));
    assert_eq!(vp.backup.as_deref(), Some(backup_path(&p("freq.csv")).as_path()));
    let merged = FrequencyTable::read_csv(p("freq.csv")).unwrap();
    assert_eq!(merged.len(), fit.table.len() + vp.imputed.len());
    let backup = FrequencyTable::read_csv(backup_path(&p("freq.csv"))).unwrap();
    assert_eq!(backup, fit.table);
    let vp_density: Raster<f32> = read_geotiff(p("density_vp.tif"), None).unwrap();
    let annual: f64 = vp_density.data().iter().map(|&v| v as f64).sum();
    assert_relative_eq!(annual, 100.0, max_relative = 1e-4);

    // Evaluation of the confirmation density against observed CNF deforestation
    let mut seen = Vec::new();
    let evaluation = run_evaluation(
        &EvaluationPaths {
            mask: mask_path,
            actual: cnf,
            density: cnf_density,
            chart: p("chart.csv"),
            cells: Some(p("cells.geojson")),
            boundary: Some(p("boundary.geojson")),
            residuals: Some(p("residuals.tif")),
        },
        &EvaluationParams { cell_area_ha: 100.0, include_residuals: true, ..Default::default() },
        None,
        &mut |pct: u8| seen.push(pct),
    )
    .unwrap();
    assert_eq!(seen, vec![0, 10, 20, 30, 40, 60, 70, 80, 90, 100]);
    assert_eq!(evaluation.stats.samples, 25);
    assert!(evaluation.stats.slope > 0.0);
    assert!(evaluation.stats.r_squared > 0.0);

    let chart = std::fs::read_to_string(p("chart.csv")).unwrap();
    let mut lines = chart.lines();
    assert_eq!(
        lines.next(),
        Some("ID,ActualDeforestation(ha),PredictedDeforestation(ha),Residuals(ha)")
    );
    assert_eq!(lines.count(), 25);

    let cells = std::fs::read_to_string(p("cells.geojson")).unwrap();
    assert!(cells.contains("\"PredDef\""));
    assert!(p("boundary.geojson").exists());
    let residuals: Raster<f32> = read_geotiff(p("residuals.tif"), None).unwrap();
    assert_eq!(residuals.shape(), (SIZE, SIZE));
}

#[test]
fn failed_fit_leaves_no_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let p = |name: &str| dir.path().join(name);

    let classes = georef(Raster::filled(SIZE, SIZE, 3i32));
    let mut admin = subdivisions(false);
    admin.set(0, 0, 1000).unwrap();

    let risk = write(&classes, &p("risk.tif"));
    let admin = write(&admin, &p("admin.tif"));
    let def = write(&deforestation(0), &p("def.tif"));

    let result = run_fit(
        &FitPaths {
            vulnerability: risk,
            subdivisions: admin,
            deforestation: def,
            frequency_table: p("freq.csv"),
            modeling_regions: p("bins.tif"),
            density: p("density.tif"),
        },
        &mut Silent,
    );
    assert!(result.is_err());
    assert!(!p("freq.csv").exists());
    assert!(!p("bins.tif").exists());
    assert!(!p("density.tif").exists());

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".riskalloc-"))
        .collect();
    assert!(leftovers.is_empty());
}
