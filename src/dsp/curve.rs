//! Curve nodes — editable control points of a single-cycle shape.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Amplitude bound of a node (and of every authored table).
pub const MAX_AMPLITUDE: f64 = 0.5;

/// A 2-D point or offset in (time, amplitude) space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

impl std::ops::Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

/// A control point on the cycle-shape curve.
///
/// `x` is the position within the cycle [0, 1], `y` the amplitude
/// [-0.5, 0.5]. The handles are offsets relative to the node and define the
/// tangents of the Bezier segments entering and leaving it. They are
/// independent; see [`mirror_handle`] for the editor's symmetric mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveNode {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub handle_in: Point,
    #[serde(default)]
    pub handle_out: Point,
}

impl CurveNode {
    /// A node with zero-length handles (a corner).
    pub fn new(x: f64, y: f64) -> Self {
        CurveNode {
            x,
            y,
            handle_in: Point::ZERO,
            handle_out: Point::ZERO,
        }
    }

    pub fn with_handles(x: f64, y: f64, handle_in: Point, handle_out: Point) -> Self {
        CurveNode {
            x,
            y,
            handle_in,
            handle_out,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Absolute position of the incoming tangent handle.
    pub fn in_control(&self) -> Point {
        self.position() + self.handle_in
    }

    /// Absolute position of the outgoing tangent handle.
    pub fn out_control(&self) -> Point {
        self.position() + self.handle_out
    }

    /// Copy with `x` clamped to [0, 1] and `y` to the amplitude bound.
    pub fn clamped(&self) -> Self {
        CurveNode {
            x: clamp_or_zero(self.x, 0.0, 1.0),
            y: clamp_or_zero(self.y, -MAX_AMPLITUDE, MAX_AMPLITUDE),
            ..*self
        }
    }
}

fn clamp_or_zero(v: f64, lo: f64, hi: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(lo, hi) }
}

/// The handle opposite `moved`, pointing the other way with the same length.
pub fn mirror_handle(moved: Point) -> Point {
    -moved
}

/// The handle opposite `moved`, pointing the other way but keeping the
/// opposite handle's own length. A zero-length `moved` leaves it unchanged.
pub fn align_handle(moved: Point, opposite: Point) -> Point {
    let moved_len = moved.x.hypot(moved.y);
    if moved_len < f64::EPSILON {
        return opposite;
    }
    let opposite_len = opposite.x.hypot(opposite.y);
    let scale = -opposite_len / moved_len;
    Point::new(moved.x * scale, moved.y * scale)
}

/// Five nodes whose Bezier segments approximate one cycle of a sine at full
/// amplitude: zero crossings at 0, 0.5 and 1, peak at 0.25, trough at 0.75.
pub fn sine_curve() -> Vec<CurveNode> {
    // One third of a quarter cycle gives the usual cubic approximation of a
    // sine quadrant; the zero-crossing slope is 2π·A.
    let dx = 0.25 / 3.0;
    let dy = 2.0 * PI * MAX_AMPLITUDE * dx;
    let rising = Point::new(dx, dy);
    let falling = Point::new(dx, -dy);
    let flat = Point::new(dx, 0.0);

    vec![
        CurveNode::with_handles(0.0, 0.0, -rising, rising),
        CurveNode::with_handles(0.25, MAX_AMPLITUDE, -flat, flat),
        CurveNode::with_handles(0.5, 0.0, -falling, falling),
        CurveNode::with_handles(0.75, -MAX_AMPLITUDE, -flat, flat),
        CurveNode::with_handles(1.0, 0.0, -rising, rising),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_points_opposite() {
        let h = Point::new(0.1, -0.2);
        assert_eq!(mirror_handle(h), Point::new(-0.1, 0.2));
    }

    #[test]
    fn align_keeps_opposite_length() {
        let moved = Point::new(0.3, 0.4); // length 0.5
        let opposite = Point::new(0.0, 0.1); // length 0.1
        let aligned = align_handle(moved, opposite);
        assert!((aligned.x + 0.06).abs() < 1e-12);
        assert!((aligned.y + 0.08).abs() < 1e-12);
        assert_eq!(align_handle(Point::ZERO, opposite), opposite);
    }

    #[test]
    fn clamped_bounds_amplitude() {
        let n = CurveNode::new(1.4, -0.9).clamped();
        assert_eq!(n.x, 1.0);
        assert_eq!(n.y, -0.5);
        assert_eq!(CurveNode::new(f64::NAN, 0.2).clamped().x, 0.0);
    }

    #[test]
    fn sine_curve_landmarks() {
        let nodes = sine_curve();
        assert_eq!(nodes.len(), 5);
        assert_eq!(nodes[1].y, MAX_AMPLITUDE);
        assert_eq!(nodes[3].y, -MAX_AMPLITUDE);
        for n in &nodes {
            assert_eq!(n.handle_in, mirror_handle(n.handle_out));
        }
    }

    #[test]
    fn deserializes_camel_case() {
        let n: CurveNode = serde_json::from_str(
            r#"{ "x": 0.5, "y": 0.1, "handleOut": { "x": 0.05, "y": 0.0 } }"#,
        )
        .expect("node should parse");
        assert_eq!(n.handle_in, Point::ZERO);
        assert_eq!(n.out_control(), Point::new(0.55, 0.1));
    }
}
