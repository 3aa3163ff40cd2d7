//! Jurisdiction boundary from a binary mask
//!
//! The mask's 4-connected regions of value 1 are labelled, the largest is
//! kept and its outer ring is traced along pixel edges. Holes and smaller
//! islands are dropped.

use geo::{Coord, LineString, Polygon};
use riskalloc_core::raster::Raster;
use riskalloc_core::{Error, Result};
use std::collections::HashMap;
use tracing::debug;

/// Pixel corner as (row, col)
type Corner = (isize, isize);

/// Largest 4-connected region of the mask, traced into a polygon in map
/// coordinates.
///
/// Ties between equally large regions go to the one found first in
/// row-major scan order.
///
/// # Errors
/// `DegenerateGeometry` when the mask has no pixel equal to 1.
pub fn jurisdiction_polygon(mask: &Raster<u8>) -> Result<Polygon<f64>> {
    let (rows, cols) = mask.shape();
    let (labels, sizes) = label_regions(mask);

    let largest = sizes
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, usize)>, (label, &size)| match best {
            Some((_, s)) if s >= size => best,
            _ => Some((label, size)),
        })
        .ok_or_else(|| Error::DegenerateGeometry {
            cells: 0,
            reason: "jurisdiction mask has no pixel equal to 1".into(),
        })?;
    debug!(
        "Jurisdiction mask: {} regions, largest has {} pixels",
        sizes.len(),
        largest.1
    );

    let inside = |r: isize, c: isize| -> bool {
        r >= 0
            && c >= 0
            && (r as usize) < rows
            && (c as usize) < cols
            && labels[r as usize * cols + c as usize] == Some(largest.0)
    };

    let ring = trace_outer_ring(rows, cols, &inside);
    let transform = mask.transform();
    let coords: Vec<Coord<f64>> = ring
        .iter()
        .map(|&(r, c)| {
            let (x, y) = transform.fractional_to_geo(c as f64, r as f64);
            Coord { x, y }
        })
        .collect();

    Ok(Polygon::new(LineString::from(coords), vec![]))
}

/// Label 4-connected regions of value 1. Labels follow scan order of each
/// region's first pixel; returns per-pixel labels and region sizes.
fn label_regions(mask: &Raster<u8>) -> (Vec<Option<usize>>, Vec<usize>) {
    let (rows, cols) = mask.shape();
    let data = mask.data();
    let mut labels: Vec<Option<usize>> = vec![None; rows * cols];
    let mut sizes = Vec::new();

    for r in 0..rows {
        for c in 0..cols {
            if data[(r, c)] != 1 || labels[r * cols + c].is_some() {
                continue;
            }
            let label = sizes.len();
            let mut size = 0usize;
            let mut stack = vec![(r, c)];

            while let Some((cr, cc)) = stack.pop() {
                let idx = cr * cols + cc;
                if labels[idx].is_some() || data[(cr, cc)] != 1 {
                    continue;
                }
                labels[idx] = Some(label);
                size += 1;

                if cr > 0 { stack.push((cr - 1, cc)); }
                if cr + 1 < rows { stack.push((cr + 1, cc)); }
                if cc > 0 { stack.push((cr, cc - 1)); }
                if cc + 1 < cols { stack.push((cr, cc + 1)); }
            }
            sizes.push(size);
        }
    }

    (labels, sizes)
}

/// Trace the outer boundary of the region given by `inside`, as a closed
/// ring of pixel corners with collinear vertices removed.
///
/// Edges run with the region on their right, clockwise on screen. Where
/// two diagonal pixels meet at a corner the right turn is taken, so
/// diagonal contact does not join the ring.
fn trace_outer_ring<F>(rows: usize, cols: usize, inside: &F) -> Vec<Corner>
where
    F: Fn(isize, isize) -> bool,
{
    let mut edges: HashMap<Corner, Vec<Corner>> = HashMap::new();
    let mut start: Option<(Corner, Corner)> = None;

    for r in 0..rows as isize {
        for c in 0..cols as isize {
            if !inside(r, c) {
                continue;
            }
            if !inside(r - 1, c) {
                edges.entry((r, c)).or_default().push((r, c + 1));
                // First boundary pixel in scan order: its top edge is on the outer ring
                start.get_or_insert(((r, c), (r, c + 1)));
            }
            if !inside(r, c + 1) {
                edges.entry((r, c + 1)).or_default().push((r + 1, c + 1));
            }
            if !inside(r + 1, c) {
                edges.entry((r + 1, c + 1)).or_default().push((r + 1, c));
            }
            if !inside(r, c - 1) {
                edges.entry((r + 1, c)).or_default().push((r, c));
            }
        }
    }

    let Some((first, second)) = start else {
        return Vec::new();
    };

    let mut ring = vec![first];
    let (mut from, mut to) = (first, second);
    loop {
        ring.push(to);
        let heading = (to.0 - from.0, to.1 - from.1);
        let next = match edges.get(&to).map(Vec::as_slice) {
            Some([only]) => *only,
            Some(candidates) => {
                let right = (heading.1, -heading.0);
                candidates
                    .iter()
                    .copied()
                    .find(|n| (n.0 - to.0, n.1 - to.1) == right)
                    .unwrap_or(candidates[0])
            }
            None => break,
        };
        from = to;
        to = next;
        if (from, to) == (first, second) {
            break;
        }
    }

    simplify_collinear(ring)
}

/// Drop vertices lying on a straight run; the ring stays closed
fn simplify_collinear(ring: Vec<Corner>) -> Vec<Corner> {
    // ring is closed: last == first
    let open = &ring[..ring.len().saturating_sub(1)];
    let n = open.len();
    if n < 3 {
        return ring;
    }
    let direction = |a: Corner, b: Corner| ((b.0 - a.0).signum(), (b.1 - a.1).signum());

    let mut out: Vec<Corner> = (0..n)
        .filter(|&i| {
            let prev = open[(i + n - 1) % n];
            let next = open[(i + 1) % n];
            direction(prev, open[i]) != direction(open[i], next)
        })
        .map(|i| open[i])
        .collect();
    if let Some(&first) = out.first() {
        out.push(first);
    }
    out
}
