//! Area-weighted zonal sums of a raster over polygons

use super::clip::{clip_segment, ClipRect};
use geo::{Area, BooleanOps, BoundingRect, Contains, Coord, MultiPolygon, Point, Polygon, Rect};
use riskalloc_core::Raster;

/// Sum of `raster` over `zone`.
///
/// Pixels crossed by the zone's outline are weighted by the share of the
/// pixel inside the zone. Every other pixel counts in full when its centre
/// falls inside. Nodata and NaN pixels are skipped.
pub fn zonal_sum(raster: &Raster<f64>, zone: &MultiPolygon<f64>) -> f64 {
    let Some(window) = pixel_window(raster, zone) else {
        return 0.0;
    };
    let (row0, row1, col0, col1) = window;
    let width = col1 - col0;
    let transform = raster.transform();

    let pixel_rect = |row: usize, col: usize| {
        let (x0, y0) = transform.fractional_to_geo(col as f64, row as f64);
        let (x1, y1) = transform.fractional_to_geo(col as f64 + 1.0, row as f64 + 1.0);
        ClipRect::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    };

    // Pixels touched by any ring segment
    let mut on_edge = vec![false; (row1 - row0) * width];
    for polygon in &zone.0 {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            for segment in ring.lines() {
                let (a_col, a_row) = raster.geo_to_pixel(segment.start.x, segment.start.y);
                let (b_col, b_row) = raster.geo_to_pixel(segment.end.x, segment.end.y);
                let r_lo = clamp_index(a_row.min(b_row).floor() - 1.0, row0, row1);
                let r_hi = clamp_index(a_row.max(b_row).floor() + 2.0, row0, row1);
                let c_lo = clamp_index(a_col.min(b_col).floor() - 1.0, col0, col1);
                let c_hi = clamp_index(a_col.max(b_col).floor() + 2.0, col0, col1);
                for row in r_lo..r_hi {
                    for col in c_lo..c_hi {
                        let idx = (row - row0) * width + (col - col0);
                        if !on_edge[idx] && clip_segment(segment.start, segment.end, &pixel_rect(row, col)).is_some() {
                            on_edge[idx] = true;
                        }
                    }
                }
            }
        }
    }

    let nodata = raster.nodata();
    let mut sum = 0.0;
    for row in row0..row1 {
        for col in col0..col1 {
            // SAFETY: window is clamped to the raster shape
            let value = unsafe { raster.get_unchecked(row, col) };
            if value.is_nan() || nodata.is_some_and(|nd| value == nd) {
                continue;
            }

            let weight = if on_edge[(row - row0) * width + (col - col0)] {
                let r = pixel_rect(row, col);
                let pixel = Rect::new(Coord { x: r.min_x, y: r.min_y }, Coord { x: r.max_x, y: r.max_y });
                let full = pixel.unsigned_area();
                if full <= 0.0 {
                    continue;
                }
                let pixel = MultiPolygon::new(vec![Polygon::from(pixel)]);
                (pixel.intersection(zone).unsigned_area() / full).min(1.0)
            } else {
                let (x, y) = raster.pixel_to_geo(col, row);
                if zone.contains(&Point::new(x, y)) {
                    1.0
                } else {
                    0.0
                }
            };
            sum += value * weight;
        }
    }
    sum
}

/// Half-open (row0, row1, col0, col1) range of pixels under the zone's
/// bounding box, or `None` if it misses the raster
fn pixel_window(raster: &Raster<f64>, zone: &MultiPolygon<f64>) -> Option<(usize, usize, usize, usize)> {
    let bbox = zone.bounding_rect()?;
    let (c_a, r_a) = raster.geo_to_pixel(bbox.min().x, bbox.min().y);
    let (c_b, r_b) = raster.geo_to_pixel(bbox.max().x, bbox.max().y);
    let (rows, cols) = raster.shape();

    let row0 = clamp_index(r_a.min(r_b).floor(), 0, rows);
    let row1 = clamp_index(r_a.max(r_b).ceil(), 0, rows);
    let col0 = clamp_index(c_a.min(c_b).floor(), 0, cols);
    let col1 = clamp_index(c_a.max(c_b).ceil(), 0, cols);
    (row0 < row1 && col0 < col1).then_some((row0, row1, col0, col1))
}

fn clamp_index(v: f64, lo: usize, hi: usize) -> usize {
    if !v.is_finite() || v <= lo as f64 {
        lo
    } else if v >= hi as f64 {
        hi
    } else {
        v as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::polygon;
    use riskalloc_core::GeoTransform;

    /// 10 x 10 ones, 10 m pixels, origin (0, 100)
    fn ones() -> Raster<f64> {
        let mut r = Raster::filled(10, 10, 1.0);
        r.set_transform(GeoTransform::new(0.0, 100.0, 10.0, -10.0));
        r
    }

    fn zone(p: Polygon<f64>) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![p])
    }

    #[test]
    fn test_pixel_aligned_square() {
        let z = zone(polygon![(x: 20.0, y: 20.0), (x: 60.0, y: 20.0), (x: 60.0, y: 60.0), (x: 20.0, y: 60.0)]);
        assert_relative_eq!(zonal_sum(&ones(), &z), 16.0, epsilon = 1e-9);
    }

    #[test]
    fn test_partial_pixels_weighted() {
        // 4.5 x 2 pixels
        let z = zone(polygon![(x: 25.0, y: 20.0), (x: 70.0, y: 20.0), (x: 70.0, y: 40.0), (x: 25.0, y: 40.0)]);
        assert_relative_eq!(zonal_sum(&ones(), &z), 9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_triangle_area() {
        let z = zone(polygon![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0), (x: 0.0, y: 100.0)]);
        assert_relative_eq!(zonal_sum(&ones(), &z), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nodata_skipped() {
        let mut r = ones();
        r.set_nodata(Some(-1.0));
        r.set(7, 3, -1.0).unwrap();
        r.set(7, 4, f64::NAN).unwrap();
        let z = zone(polygon![(x: 20.0, y: 20.0), (x: 60.0, y: 20.0), (x: 60.0, y: 60.0), (x: 20.0, y: 60.0)]);
        assert_relative_eq!(zonal_sum(&r, &z), 14.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zone_outside_raster() {
        let z = zone(polygon![(x: 500.0, y: 500.0), (x: 600.0, y: 500.0), (x: 600.0, y: 600.0)]);
        assert_eq!(zonal_sum(&ones(), &z), 0.0);
    }

    #[test]
    fn test_clamps_to_extent() {
        let z = zone(polygon![(x: -50.0, y: -50.0), (x: 150.0, y: -50.0), (x: 150.0, y: 150.0), (x: -50.0, y: 150.0)]);
        assert_relative_eq!(zonal_sum(&ones(), &z), 100.0, epsilon = 1e-9);
    }
}
