//! Low-level clipping primitives
//!
//! Cohen-Sutherland segment clipping against an axis-aligned rectangle and
//! a Sutherland-Hodgman step against an arbitrary half-plane.

use geo::Coord;

/// An axis-aligned rectangle, bounds inclusive
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClipRect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl ClipRect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }
}

const INSIDE: u8 = 0b0000;
const LEFT: u8 = 0b0001;
const RIGHT: u8 = 0b0010;
const BOTTOM: u8 = 0b0100;
const TOP: u8 = 0b1000;

fn outcode(p: Coord<f64>, rect: &ClipRect) -> u8 {
    let mut code = INSIDE;
    if p.x < rect.min_x { code |= LEFT; }
    if p.x > rect.max_x { code |= RIGHT; }
    if p.y < rect.min_y { code |= BOTTOM; }
    if p.y > rect.max_y { code |= TOP; }
    code
}

/// Part of segment p0-p1 inside `rect`, or `None` if they do not meet
pub(crate) fn clip_segment(
    mut p0: Coord<f64>,
    mut p1: Coord<f64>,
    rect: &ClipRect,
) -> Option<(Coord<f64>, Coord<f64>)> {
    let mut code0 = outcode(p0, rect);
    let mut code1 = outcode(p1, rect);

    loop {
        if (code0 | code1) == 0 {
            return Some((p0, p1));
        }
        if (code0 & code1) != 0 {
            return None;
        }

        let code_out = if code0 != 0 { code0 } else { code1 };
        let dx = p1.x - p0.x;
        let dy = p1.y - p0.y;

        let new_point = if code_out & TOP != 0 {
            let t = (rect.max_y - p0.y) / dy;
            Coord { x: p0.x + t * dx, y: rect.max_y }
        } else if code_out & BOTTOM != 0 {
            let t = (rect.min_y - p0.y) / dy;
            Coord { x: p0.x + t * dx, y: rect.min_y }
        } else if code_out & RIGHT != 0 {
            let t = (rect.max_x - p0.x) / dx;
            Coord { x: rect.max_x, y: p0.y + t * dy }
        } else {
            let t = (rect.min_x - p0.x) / dx;
            Coord { x: rect.min_x, y: p0.y + t * dy }
        };

        if code_out == code0 {
            p0 = new_point;
            code0 = outcode(p0, rect);
        } else {
            p1 = new_point;
            code1 = outcode(p1, rect);
        }
    }
}

/// Keep the part of a convex ring (open, no repeated closing vertex) on
/// the side of `site` of the perpendicular bisector between `site` and
/// `other`.
pub(crate) fn clip_half_plane(vertices: &[Coord<f64>], site: Coord<f64>, other: Coord<f64>) -> Vec<Coord<f64>> {
    if vertices.is_empty() {
        return Vec::new();
    }

    let normal = Coord { x: other.x - site.x, y: other.y - site.y };
    let mid = Coord { x: (site.x + other.x) / 2.0, y: (site.y + other.y) / 2.0 };
    // <= 0 on the site's side
    let side = |p: &Coord<f64>| (p.x - mid.x) * normal.x + (p.y - mid.y) * normal.y;

    let mut output = Vec::with_capacity(vertices.len() + 1);
    let n = vertices.len();

    for i in 0..n {
        let current = vertices[i];
        let next = vertices[(i + 1) % n];
        let fc = side(&current);
        let fn_ = side(&next);

        let crossing = || {
            let t = fc / (fc - fn_);
            Coord {
                x: current.x + t * (next.x - current.x),
                y: current.y + t * (next.y - current.y),
            }
        };

        match (fc <= 0.0, fn_ <= 0.0) {
            (true, true) => output.push(next),
            (true, false) => output.push(crossing()),
            (false, true) => {
                output.push(crossing());
                output.push(next);
            }
            (false, false) => {}
        }
    }

    output
}
