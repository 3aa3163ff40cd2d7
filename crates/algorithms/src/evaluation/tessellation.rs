//! Thiessen (Voronoi) tessellation of the sampling lattice, clipped to the
//! jurisdiction boundary

use super::clip::clip_half_plane;
use super::lattice::KdTree;
use geo::{Area, BooleanOps, BoundingRect, Coord, LineString, MultiPolygon, Polygon};
use riskalloc_core::raster::SQUARE_METRES_PER_HECTARE;
use riskalloc_core::{Error, Result};
use tracing::debug;

/// Minimum share of its full area a clipped cell must keep
pub const DEFAULT_FIDELITY: f64 = 0.999;

/// Bounded Voronoi cell of one site
#[derive(Debug, Clone)]
pub struct VoronoiCell {
    /// Index of the site in the lattice
    pub site: usize,
    pub polygon: Polygon<f64>,
}

/// Voronoi cell of a site after clipping to the boundary
#[derive(Debug, Clone)]
pub struct ThiessenCell {
    /// 1-based ID in site order
    pub id: usize,
    pub site: usize,
    pub geometry: MultiPolygon<f64>,
    pub area_ha: f64,
}

/// Voronoi cells of `sites` that are bounded.
///
/// Each cell is the sites' bounding rectangle cut by the perpendicular
/// bisectors towards nearby sites. Neighbours are gathered from a k-d tree
/// with a radius that grows until it covers twice the distance to the
/// farthest cell vertex, past which no site can cut the cell. Cells still
/// touching the bounding rectangle would be unbounded and are dropped.
pub fn voronoi_cells(sites: &[Coord<f64>]) -> Vec<VoronoiCell> {
    if sites.len() < 2 {
        return Vec::new();
    }

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for s in sites {
        min_x = min_x.min(s.x);
        min_y = min_y.min(s.y);
        max_x = max_x.max(s.x);
        max_y = max_y.max(s.y);
    }
    let (width, height) = (max_x - min_x, max_y - min_y);
    if !(width > 0.0 && height > 0.0) {
        return Vec::new();
    }

    let frame = [
        Coord { x: min_x, y: min_y },
        Coord { x: max_x, y: min_y },
        Coord { x: max_x, y: max_y },
        Coord { x: min_x, y: max_y },
    ];
    let eps = 1e-9 * width.max(height);
    let on_frame = |p: &Coord<f64>| {
        (p.x - min_x).abs() <= eps
            || (p.x - max_x).abs() <= eps
            || (p.y - min_y).abs() <= eps
            || (p.y - max_y).abs() <= eps
    };

    let tree = KdTree::build(sites);
    let spacing = (width * height / sites.len() as f64).sqrt();

    let mut cells = Vec::new();
    for (i, &site) in sites.iter().enumerate() {
        let mut radius = 3.0 * spacing;
        let ring = loop {
            let mut neighbors = tree.within_radius(site, radius);
            neighbors.retain(|n| n.index != i && n.distance_sq > 0.0);
            neighbors.sort_by(|a, b| a.distance_sq.total_cmp(&b.distance_sq).then(a.index.cmp(&b.index)));

            let mut ring = frame.to_vec();
            for n in &neighbors {
                ring = clip_half_plane(&ring, site, n.point);
                if ring.len() < 3 {
                    break;
                }
            }

            let reach = ring
                .iter()
                .map(|v| ((v.x - site.x).powi(2) + (v.y - site.y).powi(2)).sqrt())
                .fold(0.0, f64::max);
            if ring.len() < 3 || 2.0 * reach <= radius {
                break ring;
            }
            radius = 2.0 * reach * (1.0 + 1e-9);
        };

        if ring.len() < 3 || ring.iter().any(&on_frame) {
            continue;
        }
        let mut coords = ring;
        coords.dedup_by(|a, b| (a.x - b.x).abs() <= eps && (a.y - b.y).abs() <= eps);
        if coords.len() > 1 && (coords[0].x - coords[coords.len() - 1].x).abs() <= eps
            && (coords[0].y - coords[coords.len() - 1].y).abs() <= eps
        {
            coords.pop();
        }
        if coords.len() < 3 {
            continue;
        }
        coords.push(coords[0]);
        cells.push(VoronoiCell {
            site: i,
            polygon: Polygon::new(LineString::from(coords), vec![]),
        });
    }

    debug!("{} bounded Voronoi cells from {} sites", cells.len(), sites.len());
    cells
}

/// Clip cells to `boundary`, keeping those that retain at least
/// `fidelity` of their full area. IDs are assigned 1.. in site order.
///
/// # Errors
/// `InvalidParameter` if `fidelity` is outside (0, 1].
pub fn clip_to_boundary(cells: &[VoronoiCell], boundary: &Polygon<f64>, fidelity: f64) -> Result<Vec<ThiessenCell>> {
    if !(fidelity > 0.0 && fidelity <= 1.0) {
        return Err(Error::InvalidParameter {
            name: "fidelity",
            value: fidelity.to_string(),
            reason: "must be in (0, 1]".into(),
        });
    }

    let boundary_mp = MultiPolygon::new(vec![boundary.clone()]);
    let Some(bounds) = boundary.bounding_rect() else {
        return Ok(Vec::new());
    };

    let mut kept = Vec::new();
    let mut slivers = 0usize;
    for cell in cells {
        let Some(rect) = cell.polygon.bounding_rect() else {
            continue;
        };
        let overlaps = rect.min().x < bounds.max().x
            && rect.max().x > bounds.min().x
            && rect.min().y < bounds.max().y
            && rect.max().y > bounds.min().y;
        if !overlaps {
            continue;
        }

        let full = cell.polygon.unsigned_area();
        let clipped = MultiPolygon::new(vec![cell.polygon.clone()]).intersection(&boundary_mp);
        let area = clipped.unsigned_area();
        if area <= 0.0 {
            continue;
        }
        if area < fidelity * full {
            slivers += 1;
            continue;
        }
        kept.push(ThiessenCell {
            id: kept.len() + 1,
            site: cell.site,
            geometry: clipped,
            area_ha: area / SQUARE_METRES_PER_HECTARE,
        });
    }

    debug!("{} cells kept, {} boundary slivers dropped", kept.len(), slivers);
    Ok(kept)
}
