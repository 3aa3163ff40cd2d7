//! Benchmarks for density mapping and adjustment

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use riskalloc_algorithms::allocation::{converge, density_map, AdjustmentParams, FrequencyRow, FrequencyTable};
use riskalloc_core::{GeoTransform, Raster};

/// Bin grid with 30 classes over 4 subdivisions
fn create_bins(size: usize) -> Raster<i32> {
    let mut bins = Raster::new(size, size);
    bins.set_transform(GeoTransform::new(0.0, size as f64 * 30.0, 30.0, -30.0));
    for row in 0..size {
        for col in 0..size {
            let class = 1 + ((row * 7 + col * 13) % 30) as i32;
            let subdivision = ((row * 2 / size) * 2 + col * 2 / size) as i32;
            bins.set(row, col, class * 1000 + subdivision).unwrap();
        }
    }
    bins
}

fn create_table() -> FrequencyTable {
    let rows = (1..=30)
        .flat_map(|class| (0..4).map(move |sub| FrequencyRow::new(class * 1000 + sub, (31 - class) as u64 * 3, 1000)))
        .collect();
    FrequencyTable::from_rows(rows).unwrap()
}

fn bench_density_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("density_map");
    let table = create_table();

    for size in [256, 512, 1024, 2048].iter() {
        let bins = create_bins(*size);
        let area = bins.pixel_area_ha();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| density_map(black_box(&bins), &table, area).unwrap())
        });
    }

    group.finish();
}

fn bench_converge(c: &mut Criterion) {
    let mut group = c.benchmark_group("converge");
    let table = create_table();

    for size in [256, 512, 1024].iter() {
        let bins = create_bins(*size);
        let area = bins.pixel_area_ha();
        let density = density_map(&bins, &table, area).unwrap();
        let params = AdjustmentParams {
            target_ha: density.valid_sum() * 1.3,
            max_pixel_density: area,
            ..Default::default()
        };

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| converge(black_box(&density), params.clone()).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_density_map, bench_converge);
criterion_main!(benches);
