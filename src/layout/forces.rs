//! Force kernels
//!
//! Each kernel adds to body velocities (link, repulsion) or shifts positions
//! (centering); none of them integrates. Pinned bodies receive forces like any
//! other, integration then snaps them back onto their pin.

use rayon::prelude::*;

use crate::graph::GraphModel;

/// `d²` floor for repulsion, keeps the kick finite for near-coincident bodies
const DISTANCE_MIN2: f64 = 1.0;

/// Offset used when two bodies are too close to have a direction
const TIE_BREAK: f64 = 1e-6;

/// Kinematic state of one wallet
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Body {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub fx: Option<f64>,
    pub fy: Option<f64>,
}

impl Body {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            ..Default::default()
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.fx.is_some() || self.fy.is_some()
    }
}

/// A spring between two wallets, weighted by their degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    pub source: usize,
    pub target: usize,
    /// `1 / min(degree(source), degree(target))`
    pub strength: f64,
    /// Share of the correction applied to the target
    pub bias: f64,
}

/// Springs for every transfer, in edge order. Self-loops carry no force.
pub fn build_links(graph: &GraphModel) -> Vec<Link> {
    let mut count = vec![0usize; graph.node_count()];
    let pairs: Vec<(usize, usize)> = graph
        .edges()
        .filter(|e| e.source != e.target)
        .map(|e| (e.source, e.target))
        .collect();
    for &(s, t) in &pairs {
        count[s] += 1;
        count[t] += 1;
    }

    pairs
        .into_iter()
        .map(|(source, target)| {
            let (cs, ct) = (count[source] as f64, count[target] as f64);
            Link {
                source,
                target,
                strength: 1.0 / cs.min(ct),
                bias: cs / (cs + ct),
            }
        })
        .collect()
}

/// Direction for coincident bodies, stable for a given pair order
fn tie_break(a: usize, b: usize) -> f64 {
    if a < b {
        TIE_BREAK
    } else {
        -TIE_BREAK
    }
}

/// Pull linked bodies toward `distance` apart, using positions one step ahead.
pub fn apply_links(bodies: &mut [Body], links: &[Link], distance: f64, alpha: f64) {
    for link in links {
        let (s, t) = (bodies[link.source], bodies[link.target]);
        let mut dx = t.x + t.vx - s.x - s.vx;
        let mut dy = t.y + t.vy - s.y - s.vy;
        let mut len = (dx * dx + dy * dy).sqrt();
        // Coincident, or close enough that the square underflows
        if len == 0.0 {
            dx = tie_break(link.source, link.target);
            dy = 0.0;
            len = TIE_BREAK;
        }

        let k = (len - distance) / len * alpha * link.strength;
        dx *= k;
        dy *= k;

        let target = &mut bodies[link.target];
        target.vx -= dx * link.bias;
        target.vy -= dy * link.bias;
        let source = &mut bodies[link.source];
        source.vx += dx * (1.0 - link.bias);
        source.vy += dy * (1.0 - link.bias);
    }
}

/// Velocity kick on body `i` from every other body
fn repulsion_on(bodies: &[Body], i: usize, strength: f64, alpha: f64) -> (f64, f64) {
    let me = bodies[i];
    let mut kick = (0.0, 0.0);
    for (j, other) in bodies.iter().enumerate() {
        if j == i {
            continue;
        }
        let mut dx = other.x - me.x;
        let mut dy = other.y - me.y;
        let mut l2 = dx * dx + dy * dy;
        if l2 == 0.0 {
            dx = tie_break(i, j);
            dy = 0.0;
            l2 = dx * dx;
        }
        if l2 < DISTANCE_MIN2 {
            l2 = (DISTANCE_MIN2 * l2).sqrt();
        }
        kick.0 -= dx * strength * alpha / l2;
        kick.1 -= dy * strength * alpha / l2;
    }
    kick
}

/// Exact pairwise repulsion. Each body's kick is summed in body order on one
/// thread, so the parallel path gives bit-identical results.
pub fn apply_repulsion(bodies: &mut [Body], strength: f64, alpha: f64, parallel: bool) {
    if strength == 0.0 || bodies.len() < 2 {
        return;
    }
    let snapshot: &[Body] = bodies;
    let kicks: Vec<(f64, f64)> = if parallel {
        (0..snapshot.len())
            .into_par_iter()
            .map(|i| repulsion_on(snapshot, i, strength, alpha))
            .collect()
    } else {
        (0..snapshot.len())
            .map(|i| repulsion_on(snapshot, i, strength, alpha))
            .collect()
    };
    for (body, (kx, ky)) in bodies.iter_mut().zip(kicks) {
        body.vx += kx;
        body.vy += ky;
    }
}

/// Shift every body so the centroid moves `strength` of the way to `center`.
pub fn apply_centering(bodies: &mut [Body], center: (f64, f64), strength: f64) {
    if bodies.is_empty() || strength == 0.0 {
        return;
    }
    let n = bodies.len() as f64;
    let (sx, sy) = bodies
        .iter()
        .fold((0.0, 0.0), |(sx, sy), b| (sx + b.x, sy + b.y));
    let shift_x = (sx / n - center.0) * strength;
    let shift_y = (sy / n - center.1) * strength;
    for body in bodies.iter_mut() {
        body.x -= shift_x;
        body.y -= shift_y;
    }
}

/// Apply friction and move; pinned axes snap to their pin with zero velocity.
pub fn integrate(bodies: &mut [Body], velocity_decay: f64) {
    let keep = 1.0 - velocity_decay;
    for body in bodies.iter_mut() {
        match body.fx {
            Some(fx) => {
                body.x = fx;
                body.vx = 0.0;
            }
            None => {
                body.vx *= keep;
                body.x += body.vx;
            }
        }
        match body.fy {
            Some(fy) => {
                body.y = fy;
                body.vy = 0.0;
            }
            None => {
                body.vy *= keep;
                body.y += body.vy;
            }
        }
    }
}
