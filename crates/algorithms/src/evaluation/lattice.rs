//! Systematic sampling lattice and a 2D k-d tree over its points
//!
//! Reference:
//! Bentley, J.L. (1975). Multidimensional binary search trees used
//! for associative searching. CACM, 18(9).

use geo::Coord;
use riskalloc_core::raster::SQUARE_METRES_PER_HECTARE;
use riskalloc_core::{Error, GeoTransform, Result};

/// Lattice pitch in pixels for assessment cells of `cell_area_ha`.
///
/// `floor(sqrt(cell_area_ha * 10_000) / |pixel_width|)`
pub fn lattice_pitch(cell_area_ha: f64, pixel_width: f64) -> Result<usize> {
    if !(cell_area_ha.is_finite() && cell_area_ha > 0.0) {
        return Err(Error::InvalidParameter {
            name: "cell_area_ha",
            value: cell_area_ha.to_string(),
            reason: "must be positive".into(),
        });
    }
    let pitch = ((cell_area_ha * SQUARE_METRES_PER_HECTARE).sqrt() / pixel_width.abs()).floor();
    if !(pitch >= 1.0) {
        return Err(Error::InvalidParameter {
            name: "cell_area_ha",
            value: cell_area_ha.to_string(),
            reason: format!("assessment cell is smaller than one {} m pixel", pixel_width.abs()),
        });
    }
    Ok(pitch as usize)
}

/// Lattice points at pixel corners every `pitch` pixels, from `-pitch` up
/// to (not including) `rows + pitch` and `cols + pitch`, one margin cell
/// beyond the raster on every side. Points are in row-major order.
pub fn systematic_lattice(rows: usize, cols: usize, transform: &GeoTransform, pitch: usize) -> Vec<Coord<f64>> {
    let p = pitch as isize;
    let offsets = |n: usize| (-p..n as isize + p).step_by(pitch);

    offsets(rows)
        .flat_map(|r| {
            offsets(cols).map(move |c| {
                let (x, y) = transform.fractional_to_geo(c as f64, r as f64);
                Coord { x, y }
            })
        })
        .collect()
}

/// A 2D k-d tree for radius queries on lattice points.
#[derive(Debug)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    points: Vec<Coord<f64>>,
}

#[derive(Debug)]
struct KdNode {
    /// Index into `points`
    point_idx: usize,
    /// Split dimension: 0 = x, 1 = y
    split_dim: u8,
    left: Option<usize>,
    right: Option<usize>,
}

/// A point returned by a query
#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    pub point: Coord<f64>,
    pub distance_sq: f64,
    /// Index of the point in the slice the tree was built from
    pub index: usize,
}

impl KdTree {
    /// Build a k-d tree by median-of-coordinate splitting.
    pub fn build(points: &[Coord<f64>]) -> Self {
        let mut nodes = Vec::with_capacity(points.len());
        if !points.is_empty() {
            let mut indices: Vec<usize> = (0..points.len()).collect();
            build_recursive(points, &mut indices, 0, &mut nodes);
        }
        Self {
            nodes,
            points: points.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All points within `radius` of `q`, in no particular order.
    pub fn within_radius(&self, q: Coord<f64>, radius: f64) -> Vec<Neighbor> {
        if self.nodes.is_empty() || radius <= 0.0 {
            return Vec::new();
        }
        let mut results = Vec::new();
        self.radius_recursive(0, q, radius * radius, &mut results);
        results
    }

    fn radius_recursive(&self, node_idx: usize, q: Coord<f64>, radius_sq: f64, results: &mut Vec<Neighbor>) {
        let node = &self.nodes[node_idx];
        let p = self.points[node.point_idx];

        let dx = q.x - p.x;
        let dy = q.y - p.y;
        let dist_sq = dx * dx + dy * dy;

        if dist_sq <= radius_sq {
            results.push(Neighbor {
                point: p,
                distance_sq: dist_sq,
                index: node.point_idx,
            });
        }

        // Negative when q lies on the low side of the split
        let diff = if node.split_dim == 0 { dx } else { dy };

        if let Some(left) = node.left {
            if diff <= 0.0 || diff * diff <= radius_sq {
                self.radius_recursive(left, q, radius_sq, results);
            }
        }
        if let Some(right) = node.right {
            if diff >= 0.0 || diff * diff <= radius_sq {
                self.radius_recursive(right, q, radius_sq, results);
            }
        }
    }
}

fn build_recursive(points: &[Coord<f64>], indices: &mut [usize], depth: usize, nodes: &mut Vec<KdNode>) -> usize {
    let n = indices.len();
    let split_dim = (depth % 2) as u8;
    let key = |i: usize| if split_dim == 0 { points[i].x } else { points[i].y };

    indices.sort_by(|&a, &b| key(a).total_cmp(&key(b)));

    let median = n / 2;
    let node_idx = nodes.len();
    nodes.push(KdNode {
        point_idx: indices[median],
        split_dim,
        left: None,
        right: None,
    });

    if median > 0 {
        let left_idx = build_recursive(points, &mut indices[..median], depth + 1, nodes);
        nodes[node_idx].left = Some(left_idx);
    }
    if median + 1 < n {
        let right_idx = build_recursive(points, &mut indices[median + 1..], depth + 1, nodes);
        nodes[node_idx].right = Some(right_idx);
    }

    node_idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch() {
        // 100 000 ha cells are 31 622.78 m wide
        assert_eq!(lattice_pitch(100_000.0, 30.0).unwrap(), 1054);
        assert_eq!(lattice_pitch(0.36, -30.0).unwrap(), 2);
        assert!(matches!(
            lattice_pitch(0.01, 30.0),
            Err(Error::InvalidParameter { name: "cell_area_ha", .. })
        ));
        assert!(lattice_pitch(-1.0, 30.0).is_err());
    }

    #[test]
    fn test_lattice_covers_extent_with_margin() {
        let gt = GeoTransform::new(0.0, 100.0, 10.0, -10.0);
        let points = systematic_lattice(10, 10, &gt, 4);
        // offsets -4, 0, 4, 8, 12 along each axis
        assert_eq!(points.len(), 25);
        assert_eq!(points[0], Coord { x: -40.0, y: 140.0 });
        assert_eq!(points[1], Coord { x: 0.0, y: 140.0 });
        assert_eq!(points[24], Coord { x: 120.0, y: -20.0 });
    }

    #[test]
    fn test_within_radius_matches_brute_force() {
        let points: Vec<Coord<f64>> = (0..500)
            .map(|i| Coord {
                x: ((i * 7 + 13) % 100) as f64,
                y: ((i * 11 + 37) % 100) as f64,
            })
            .collect();
        let tree = KdTree::build(&points);
        assert_eq!(tree.len(), 500);

        let q = Coord { x: 50.0, y: 50.0 };
        let mut found: Vec<usize> = tree.within_radius(q, 12.5).iter().map(|n| n.index).collect();
        found.sort_unstable();
        let mut expected: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| (p.x - q.x).powi(2) + (p.y - q.y).powi(2) <= 12.5 * 12.5)
            .map(|(i, _)| i)
            .collect();
        expected.sort_unstable();
        expected.dedup();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::build(&[]);
        assert!(tree.is_empty());
        assert!(tree.within_radius(Coord { x: 0.0, y: 0.0 }, 10.0).is_empty());
    }
}
