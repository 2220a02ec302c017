//! Geometry engine: SVG path parsing, polygon tests and ink cost.
//!
//! Only a subset of SVG path data is understood: `M`, `L`, `H`, `V` and `Z`,
//! with lowercase forms relative to the current point. Everything else is
//! rejected with [`CanvasError::InvalidShapeSvgString`].

use serde::{Deserialize, Serialize};

use crate::error::CanvasError;

/// Longest accepted path string, in characters.
pub const MAX_SVG_LENGTH: usize = 128;

/// Tolerance for float comparisons.
pub const EPSILON: f64 = 1e-9;

/// A canvas coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    /// Equal within [`EPSILON`].
    pub fn approx_eq(&self, other: &Point) -> bool {
        (self.x - other.x).abs() <= EPSILON && (self.y - other.y).abs() <= EPSILON
    }
}

/// A directed segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub start: Point,
    pub end: Point,
}

impl Edge {
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        (self.end.x - self.start.x).hypot(self.end.y - self.start.y)
    }

    /// Same segment regardless of direction.
    pub fn same_segment(&self, other: &Edge) -> bool {
        (self.start.approx_eq(&other.start) && self.end.approx_eq(&other.end))
            || (self.start.approx_eq(&other.end) && self.end.approx_eq(&other.start))
    }

    fn has_endpoint(&self, p: &Point) -> bool {
        self.start.approx_eq(p) || self.end.approx_eq(p)
    }
}

/// The drawable outline of a parsed path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    /// Edges in drawing order. Zero-length moves are dropped.
    pub edges: Vec<Edge>,
    /// The path ends back at its start, by `Z` or by construction.
    pub closed: bool,
    /// Number of `M`/`m` commands.
    pub subpaths: usize,
}

impl Outline {
    /// Every distinct vertex, in drawing order.
    pub fn vertices(&self) -> Vec<Point> {
        let mut out: Vec<Point> = Vec::with_capacity(self.edges.len() + 1);
        for edge in &self.edges {
            for p in [edge.start, edge.end] {
                if !out.iter().any(|q| q.approx_eq(&p)) {
                    out.push(p);
                }
            }
        }
        out
    }

    /// A single closed loop, the only shape that can hold fill.
    pub fn is_fillable(&self) -> bool {
        self.closed && self.subpaths == 1 && is_simple_polygon(&self.edges)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Command(char),
    Number(f64),
}

fn tokenize(svg: &str) -> Result<Vec<Token>, CanvasError> {
    let invalid = || CanvasError::InvalidShapeSvgString(svg.to_string());
    let mut tokens = Vec::new();
    let mut number = String::new();

    let flush = |number: &mut String, tokens: &mut Vec<Token>| -> Result<(), CanvasError> {
        if number.is_empty() {
            return Ok(());
        }
        let value: f64 = number.parse().map_err(|_| invalid())?;
        if !value.is_finite() {
            return Err(invalid());
        }
        tokens.push(Token::Number(value));
        number.clear();
        Ok(())
    };

    for c in svg.chars() {
        match c {
            c if c.is_whitespace() || c == ',' => flush(&mut number, &mut tokens)?,
            'e' | 'E' if !number.is_empty() => number.push(c),
            '-' | '+' if !number.is_empty() && !number.ends_with(['e', 'E']) => {
                flush(&mut number, &mut tokens)?;
                number.push(c);
            }
            c if c.is_ascii_digit() || c == '.' || c == '-' || c == '+' => number.push(c),
            c if c.is_ascii_alphabetic() => {
                flush(&mut number, &mut tokens)?;
                tokens.push(Token::Command(c));
            }
            _ => return Err(invalid()),
        }
    }
    flush(&mut number, &mut tokens)?;
    Ok(tokens)
}

/// Parse SVG path data into an [`Outline`].
///
/// The length limit is enforced before any tokenising happens.
pub fn parse_path(svg: &str) -> Result<Outline, CanvasError> {
    if svg.chars().count() > MAX_SVG_LENGTH {
        return Err(CanvasError::ShapeSvgStringTooLong(svg.to_string()));
    }
    let invalid = || CanvasError::InvalidShapeSvgString(svg.to_string());

    let tokens = tokenize(svg)?;
    let mut edges = Vec::new();
    let mut current = Point::ORIGIN;
    let mut subpath_start = Point::ORIGIN;
    let mut path_start: Option<Point> = None;
    let mut subpaths = 0usize;
    let mut ended_with_close = false;

    let mut i = 0;
    while i < tokens.len() {
        let command = match tokens[i] {
            Token::Command(c) => c,
            Token::Number(_) => return Err(invalid()),
        };
        i += 1;

        if path_start.is_none() && !matches!(command, 'M' | 'm') {
            return Err(invalid());
        }

        let arity = match command {
            'M' | 'm' | 'L' | 'l' => 2,
            'H' | 'h' | 'V' | 'v' => 1,
            'Z' | 'z' => 0,
            _ => return Err(invalid()),
        };

        if arity == 0 {
            if !current.approx_eq(&subpath_start) {
                edges.push(Edge::new(current, subpath_start));
            }
            current = subpath_start;
            ended_with_close = true;
            continue;
        }

        // A command may repeat its argument group; extra pairs after a move
        // are implicit line-tos.
        let mut first_group = true;
        loop {
            let mut args = [0.0f64; 2];
            for slot in args.iter_mut().take(arity) {
                match tokens.get(i) {
                    Some(Token::Number(v)) => *slot = *v,
                    _ => return Err(invalid()),
                }
                i += 1;
            }

            let relative = command.is_ascii_lowercase();
            let base = if relative { current } else { Point::ORIGIN };
            let target = match command.to_ascii_uppercase() {
                'M' | 'L' => Point::new(base.x + args[0], base.y + args[1]),
                'H' => Point::new(base.x + args[0], current.y),
                'V' => Point::new(current.x, base.y + args[0]),
                _ => unreachable!("arity checked above"),
            };

            if matches!(command, 'M' | 'm') && first_group {
                current = target;
                subpath_start = target;
                path_start.get_or_insert(target);
                subpaths += 1;
            } else {
                if !current.approx_eq(&target) {
                    edges.push(Edge::new(current, target));
                }
                current = target;
            }
            ended_with_close = false;
            first_group = false;

            if !matches!(tokens.get(i), Some(Token::Number(_))) {
                break;
            }
        }
    }

    if edges.is_empty() {
        return Err(invalid());
    }

    let returns_to_start = path_start.map_or(false, |p| p.approx_eq(&current));
    Ok(Outline {
        edges,
        closed: ended_with_close || returns_to_start,
        subpaths,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Measurements
// ─────────────────────────────────────────────────────────────────────────────

/// Shoelace signed area of a closed ring of edges.
pub fn signed_area(edges: &[Edge]) -> f64 {
    edges
        .iter()
        .map(|e| e.start.x * e.end.y - e.end.x * e.start.y)
        .sum::<f64>()
        / 2.0
}

/// Sum of edge lengths.
pub fn perimeter(edges: &[Edge]) -> f64 {
    edges.iter().map(Edge::length).sum()
}

/// Ink needed to draw an outline: area when filled, length otherwise.
///
/// Rounded up so the network never under-charges.
pub fn ink_cost(outline: &Outline, filled: bool) -> u64 {
    let raw = if filled {
        signed_area(&outline.edges).abs()
    } else {
        perimeter(&outline.edges)
    };
    let rounded = (raw - EPSILON).ceil();
    if rounded <= 0.0 {
        0
    } else {
        rounded as u64
    }
}

/// Every vertex lies within `[0, width] x [0, height]`.
pub fn bounds_check(edges: &[Edge], width: u32, height: u32) -> Result<(), CanvasError> {
    let (w, h) = (f64::from(width), f64::from(height));
    let inside = |p: &Point| {
        p.x >= -EPSILON && p.y >= -EPSILON && p.x <= w + EPSILON && p.y <= h + EPSILON
    };
    if edges.iter().all(|e| inside(&e.start) && inside(&e.end)) {
        Ok(())
    } else {
        Err(CanvasError::OutOfBounds)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Intersection and containment
// ─────────────────────────────────────────────────────────────────────────────

/// Cross product of `b - a` and `c - a`, reduced to its sign.
fn orientation(a: &Point, b: &Point, c: &Point) -> i8 {
    let v = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    if v > EPSILON {
        1
    } else if v < -EPSILON {
        -1
    } else {
        0
    }
}

/// `q` lies within the bounding box of `p`..`r`. Callers check collinearity.
fn within_box(p: &Point, q: &Point, r: &Point) -> bool {
    q.x <= p.x.max(r.x) + EPSILON
        && q.x >= p.x.min(r.x) - EPSILON
        && q.y <= p.y.max(r.y) + EPSILON
        && q.y >= p.y.min(r.y) - EPSILON
}

fn collinear_overlap(e1: &Edge, e2: &Edge, endpoints_only_ok: bool) -> bool {
    // Project on whichever axis e1 spans more of.
    let use_x = (e1.end.x - e1.start.x).abs() >= (e1.end.y - e1.start.y).abs();
    let key = |p: &Point| if use_x { p.x } else { p.y };

    let (a0, a1) = min_max(key(&e1.start), key(&e1.end));
    let (b0, b1) = min_max(key(&e2.start), key(&e2.end));
    let overlap = a1.min(b1) - a0.max(b0);

    if overlap > EPSILON {
        true
    } else if overlap < -EPSILON {
        false
    } else {
        // Touching in a single point, which is an endpoint of both.
        !endpoints_only_ok
    }
}

fn min_max(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Whether two segments share any point.
///
/// With `endpoints_only_ok`, contact made only at a point that is an endpoint
/// of both segments does not count. Collinear overlap always counts.
pub fn segments_intersect(e1: &Edge, e2: &Edge, endpoints_only_ok: bool) -> bool {
    let (p1, p2) = (&e1.start, &e1.end);
    let (p3, p4) = (&e2.start, &e2.end);

    let d1 = orientation(p3, p4, p1);
    let d2 = orientation(p3, p4, p2);
    let d3 = orientation(p1, p2, p3);
    let d4 = orientation(p1, p2, p4);

    // Proper crossing
    if d1 * d2 < 0 && d3 * d4 < 0 {
        return true;
    }

    if d1 == 0 && d2 == 0 && d3 == 0 && d4 == 0 {
        // Both collinear, but the boxes may not meet at all.
        if !within_box(p1, p3, p2)
            && !within_box(p1, p4, p2)
            && !within_box(p3, p1, p4)
            && !within_box(p3, p2, p4)
        {
            return false;
        }
        return collinear_overlap(e1, e2, endpoints_only_ok);
    }

    let mut contacts = Vec::with_capacity(4);
    if d1 == 0 && within_box(p3, p1, p4) {
        contacts.push(*p1);
    }
    if d2 == 0 && within_box(p3, p2, p4) {
        contacts.push(*p2);
    }
    if d3 == 0 && within_box(p1, p3, p2) {
        contacts.push(*p3);
    }
    if d4 == 0 && within_box(p1, p4, p2) {
        contacts.push(*p4);
    }

    if contacts.is_empty() {
        return false;
    }
    if !endpoints_only_ok {
        return true;
    }
    contacts
        .iter()
        .any(|c| !(e1.has_endpoint(c) && e2.has_endpoint(c)))
}

/// A closed ring of at least three edges whose only contacts are the shared
/// endpoints of neighbouring edges.
pub fn is_simple_polygon(edges: &[Edge]) -> bool {
    let n = edges.len();
    if n < 3 {
        return false;
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if segments_intersect(&edges[i], &edges[j], adjacent) {
                return false;
            }
        }
    }
    true
}

/// Even-odd ray casting with a ray towards +x.
pub fn point_in_polygon(p: &Point, edges: &[Edge]) -> bool {
    let mut inside = false;
    for edge in edges {
        let (a, b) = (&edge.start, &edge.end);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

fn on_boundary(p: &Point, edges: &[Edge]) -> bool {
    edges
        .iter()
        .any(|e| orientation(&e.start, &e.end, p) == 0 && within_box(&e.start, p, &e.end))
}

fn strictly_inside(p: &Point, edges: &[Edge]) -> bool {
    !on_boundary(p, edges) && point_in_polygon(p, edges)
}

/// Whether any part of `inner` lies strictly inside the closed `outer`.
///
/// Only called once no edges cross, so each inner edge touches the outer
/// boundary at its endpoints at most and its midpoint decides for the rest
/// of it. That catches a chord whose vertices all sit on the boundary.
fn reaches_inside(outer: &Outline, inner: &Outline) -> bool {
    if !outer.closed {
        return false;
    }
    inner.vertices().iter().any(|v| strictly_inside(v, &outer.edges))
        || inner.edges.iter().any(|edge| {
            let mid = Point::new(
                (edge.start.x + edge.end.x) / 2.0,
                (edge.start.y + edge.end.y) / 2.0,
            );
            strictly_inside(&mid, &outer.edges)
        })
}

/// Whether two outlines share ink.
///
/// True when edges cross or overlap (a shared endpoint alone is fine), or when
/// a vertex or edge of one lies strictly inside the other closed outline.
pub fn shapes_overlap(a: &Outline, b: &Outline) -> bool {
    for ea in &a.edges {
        for eb in &b.edges {
            if segments_intersect(ea, eb, true) {
                return true;
            }
        }
    }
    reaches_inside(b, a) || reaches_inside(a, b)
}
