//! Curve sampler — converts curve nodes into a single-cycle table.
//!
//! Each pair of neighbouring nodes bounds a cubic Bezier segment. The curve
//! parameter `t` does not advance linearly with time, so every target
//! position is mapped back to `t` with Newton–Raphson before evaluating the
//! amplitude.

use super::curve::{CurveNode, Point};
use super::wavetable::WaveTable;

/// Maximum Newton–Raphson steps per sample.
const MAX_ITERATIONS: usize = 10;
/// Residual / derivative magnitude below which iteration stops.
const TOLERANCE: f64 = 1e-4;
/// Nodes closer than this horizontally are treated as a vertical step.
const COINCIDENT_X: f64 = 1e-4;

/// One cubic Bezier segment between two nodes.
#[derive(Debug, Clone, Copy)]
struct Segment {
    p0: Point,
    p1: Point,
    p2: Point,
    p3: Point,
}

impl Segment {
    fn between(n0: &CurveNode, n1: &CurveNode) -> Self {
        Segment {
            p0: n0.position(),
            p1: n0.out_control(),
            p2: n1.in_control(),
            p3: n1.position(),
        }
    }

    fn x(&self, t: f64) -> f64 {
        bezier(self.p0.x, self.p1.x, self.p2.x, self.p3.x, t)
    }

    fn y(&self, t: f64) -> f64 {
        bezier(self.p0.y, self.p1.y, self.p2.y, self.p3.y, t)
    }

    fn dx(&self, t: f64) -> f64 {
        bezier_derivative(self.p0.x, self.p1.x, self.p2.x, self.p3.x, t)
    }

    /// Solve `x(t) = target` for `t` in [0, 1].
    fn solve_t(&self, target: f64) -> f64 {
        let span = self.p3.x - self.p0.x;
        let mut t = ((target - self.p0.x) / span).clamp(0.0, 1.0);
        for _ in 0..MAX_ITERATIONS {
            let residual = self.x(t) - target;
            if residual.abs() < TOLERANCE {
                break;
            }
            let slope = self.dx(t);
            if slope.abs() < TOLERANCE {
                break;
            }
            t = (t - residual / slope).clamp(0.0, 1.0);
        }
        t
    }
}

/// Cubic Bezier in Bernstein form.
fn bezier(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let u = 1.0 - t;
    u * u * u * p0 + 3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t * p3
}

fn bezier_derivative(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let u = 1.0 - t;
    3.0 * u * u * (p1 - p0) + 6.0 * u * t * (p2 - p1) + 3.0 * t * t * (p3 - p2)
}

/// Sample `nodes` into a table of `output_length` samples. Sample `i` sits
/// at `x = i / (output_length - 1)`, so both ends of the cycle are included.
///
/// No nodes gives silence, a single node a flat line at its amplitude.
pub fn sample(nodes: &[CurveNode], output_length: usize) -> WaveTable {
    match nodes {
        [] => return WaveTable::silence(output_length),
        [only] => return WaveTable::new(vec![only.clamped().y; output_length]),
        _ => {}
    }

    let mut sorted: Vec<CurveNode> = nodes.iter().map(CurveNode::clamped).collect();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x));

    let denom = output_length.saturating_sub(1).max(1) as f64;
    let mut out = Vec::with_capacity(output_length);
    let mut pair = 0;

    for i in 0..output_length {
        let x = i as f64 / denom;
        let first = &sorted[0];
        let last = &sorted[sorted.len() - 1];

        let value = if x <= first.x {
            first.y
        } else if x >= last.x {
            last.y
        } else {
            // targets ascend, so the bounding pair only moves forward
            while pair + 2 < sorted.len() && sorted[pair + 1].x < x {
                pair += 1;
            }
            eval_pair(&sorted[pair], &sorted[pair + 1], x)
        };
        out.push(value);
    }

    WaveTable::new(out)
}

fn eval_pair(n0: &CurveNode, n1: &CurveNode, x: f64) -> f64 {
    if (n1.x - n0.x).abs() < COINCIDENT_X {
        return (n0.y + n1.y) * 0.5;
    }
    let segment = Segment::between(n0, n1);
    let t = segment.solve_t(x);
    segment.y(t)
}
