//! Externally ticked force simulation
//!
//! Alpha (temperature) scales every force. Each tick moves it toward
//! `alpha_target`:
//!
//! ```text
//! alpha += (alpha_target - alpha) * alpha_decay
//! ```
//!
//! With the target at 0 the simulation settles once alpha drops below
//! `alpha_min`; ticks are no-ops from then on until a pin or `reheat`.
//! Pinning raises the target to `pin_alpha_target` so the rest of the graph
//! keeps moving while a wallet is dragged.

use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::forces::{apply_centering, apply_links, apply_repulsion, build_links, integrate, Body, Link};
use super::LayoutParams;
use crate::errors::ConfigError;
use crate::graph::GraphModel;
use crate::models::NodePosition;

const INITIAL_RADIUS: f64 = 10.0;

/// Spread applied to wallets supplied on an already occupied spot
const COINCIDENT_JITTER: f64 = 2.0;

/// Pin axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Transient kinematic state, rebuilt whenever a graph is attached
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    pub alpha: f64,
    pub alpha_target: f64,
    pub iterations: u64,
    bodies: Vec<Body>,
}

impl SimulationState {
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }
}

#[derive(Debug, Clone)]
pub struct LayoutSimulator {
    params: LayoutParams,
    ids: Vec<String>,
    links: Vec<Link>,
    state: SimulationState,
}

impl LayoutSimulator {
    pub fn new(graph: &GraphModel, params: LayoutParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            ids: graph.node_ids().map(str::to_string).collect(),
            links: build_links(graph),
            state: SimulationState {
                alpha: 1.0,
                alpha_target: 0.0,
                iterations: 0,
                bodies: initial_bodies(graph, &params),
            },
            params,
        })
    }

    pub fn params(&self) -> &LayoutParams {
        &self.params
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn alpha(&self) -> f64 {
        self.state.alpha
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_settled(&self) -> bool {
        self.state.alpha < self.params.alpha_min && self.state.alpha_target < self.params.alpha_min
    }

    /// Advance one step. Returns false (and does nothing) when settled.
    pub fn tick(&mut self) -> bool {
        if self.is_settled() {
            return false;
        }

        let state = &mut self.state;
        state.alpha += (state.alpha_target - state.alpha) * self.params.alpha_decay;
        let alpha = state.alpha;
        let parallel = state.bodies.len() >= self.params.parallel_threshold;

        apply_links(&mut state.bodies, &self.links, self.params.link_distance, alpha);
        apply_repulsion(&mut state.bodies, self.params.repulsion, alpha, parallel);
        apply_centering(&mut state.bodies, self.params.center(), self.params.center_strength);
        integrate(&mut state.bodies, self.params.velocity_decay);
        state.iterations += 1;

        if self.is_settled() {
            debug!("Layout settled after {} ticks", self.state.iterations);
        }
        true
    }

    /// Tick until settled or `max_ticks` steps ran. Returns the steps taken.
    pub fn run_until_settled(&mut self, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while ticks < max_ticks && self.tick() {
            ticks += 1;
        }
        ticks
    }

    /// Restart the simulation at `alpha`
    pub fn reheat(&mut self, alpha: f64) -> Result<(), ConfigError> {
        ConfigError::check_range("alpha", alpha, 0.0, 1.0)?;
        self.state.alpha = alpha;
        Ok(())
    }

    /// Fix a wallet at `(x, y)` until unpinned. Returns false for an unknown index.
    pub fn pin(&mut self, index: usize, x: f64, y: f64) -> bool {
        self.pin_axis(index, Axis::X, x) && self.pin_axis(index, Axis::Y, y)
    }

    /// Fix a single axis of a wallet
    pub fn pin_axis(&mut self, index: usize, axis: Axis, value: f64) -> bool {
        let Some(body) = self.state.bodies.get_mut(index) else {
            return false;
        };
        match axis {
            Axis::X => {
                body.fx = Some(value);
                body.x = value;
                body.vx = 0.0;
            }
            Axis::Y => {
                body.fy = Some(value);
                body.y = value;
                body.vy = 0.0;
            }
        }
        self.state.alpha_target = self.params.pin_alpha_target;
        true
    }

    /// Release both axes. The alpha target drops back to 0 once nothing is pinned.
    pub fn unpin(&mut self, index: usize) -> bool {
        let Some(body) = self.state.bodies.get_mut(index) else {
            return false;
        };
        body.fx = None;
        body.fy = None;
        if !self.state.bodies.iter().any(Body::is_pinned) {
            self.state.alpha_target = 0.0;
        }
        true
    }

    pub fn is_pinned(&self, index: usize) -> bool {
        self.state.bodies.get(index).is_some_and(Body::is_pinned)
    }

    pub fn position(&self, index: usize) -> Option<(f64, f64)> {
        self.state.bodies.get(index).map(|b| (b.x, b.y))
    }

    /// Read-only copy of every position, in insertion order
    pub fn positions(&self) -> Vec<NodePosition> {
        self.ids
            .iter()
            .zip(&self.state.bodies)
            .map(|(id, body)| NodePosition {
                id: id.clone(),
                x: body.x,
                y: body.y,
                pinned: body.is_pinned(),
            })
            .collect()
    }
}

/// Supplied positions where present (jittered apart when they coincide),
/// otherwise a phyllotaxis spiral around the center.
fn initial_bodies(graph: &GraphModel, params: &LayoutParams) -> Vec<Body> {
    let (cx, cy) = params.center();
    let golden_angle = PI * (3.0 - 5f64.sqrt());
    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut occupied: FxHashMap<(u64, u64), usize> = FxHashMap::default();

    (0..graph.node_count())
        .map(|i| match graph.wallet(i).initial_position {
            Some((x, y)) => {
                let seen = occupied.entry((x.to_bits(), y.to_bits())).or_insert(0);
                *seen += 1;
                if *seen == 1 {
                    Body::at(x, y)
                } else {
                    let jx = (rng.random::<f64>() - 0.5) * COINCIDENT_JITTER;
                    let jy = (rng.random::<f64>() - 0.5) * COINCIDENT_JITTER;
                    Body::at(x + jx, y + jy)
                }
            }
            None => {
                let radius = INITIAL_RADIUS * (0.5 + i as f64).sqrt();
                let angle = i as f64 * golden_angle;
                Body::at(cx + radius * angle.cos(), cy + radius * angle.sin())
            }
        })
        .collect()
}
