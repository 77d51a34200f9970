//! GraphGuard - transaction risk graph engine
//!
//! Analyzes a directed graph of wallets and transfers for money-laundering
//! indicators and lays it out in 2-D for inspection.
//!
//! - [`graph`]: the transaction graph, flow features and pattern detectors
//! - [`scoring`]: interchangeable risk strategies and per-wallet priors
//! - [`layout`]: an externally ticked force-directed simulator
//! - [`engine`]: [`GraphEngine`], owning one graph with its scores and layout
//!
//! ```no_run
//! use graphguard::{EngineConfig, GraphEngine, GraphSource, RiskMode, RiskPriors};
//!
//! let source = GraphSource::from_ids(&["A", "B", "C"], &[("A", "B"), ("B", "C")]);
//! let priors = RiskPriors::from_values([("A".to_string(), 0.9)]);
//!
//! let mut engine = GraphEngine::new(EngineConfig::default())?;
//! engine.attach(&source, priors)?;
//! engine.set_risk_mode(RiskMode::Propagation)?;
//! let positions = engine.tick();
//! let snapshot = engine.snapshot();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod layout;
pub mod models;
pub mod scoring;

pub use engine::{EngineConfig, GraphEngine};
pub use errors::{ConfigError, EngineError, StructuralError};
pub use graph::GraphModel;
pub use models::{EdgePattern, EdgeSpec, GraphSource, NodePosition, NodeSpec, RiskBand, RiskRecord, Snapshot};
pub use scoring::{RiskMode, RiskPriors, RiskScorer};
