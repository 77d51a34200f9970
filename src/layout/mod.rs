//! Force-directed layout
//!
//! A discrete-time simulation with three forces:
//!
//! - **Link**: springs of rest length `link_distance` along every transfer
//! - **Repulsion**: exact pairwise push, `strength * alpha / d²`
//! - **Centering**: shifts the centroid toward the configured center
//!
//! The simulator owns all kinematic state. Callers read positions through
//! snapshots and change them only through pin / unpin.

pub mod forces;
mod params;
mod simulator;

pub use forces::Body;
pub use params::LayoutParams;
pub use simulator::{Axis, LayoutSimulator, SimulationState};
