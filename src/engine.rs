//! Engine orchestrating graph, scorer and layout
//!
//! One engine owns one graph at a time, together with its priors, the active
//! scorer, the current risk records and the layout state. Risk records are
//! recomputed synchronously on attach and on every mode switch, so a
//! snapshot never mixes a new graph with old scores.

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::errors::{ConfigError, EngineError};
use crate::graph::GraphModel;
use crate::layout::{Axis, LayoutParams, LayoutSimulator};
use crate::models::{GraphSource, NodePosition, RiskRecord, Snapshot};
use crate::scoring::{build_scorer, RiskConfig, RiskMode, RiskPriors, RiskScorer};

/// Engine settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub risk: RiskConfig,
    pub layout: LayoutParams,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk.validate()?;
        self.layout.validate()
    }
}

impl From<&crate::config::ProjectConfig> for EngineConfig {
    fn from(config: &crate::config::ProjectConfig) -> Self {
        Self {
            risk: config.risk.clone(),
            layout: config.layout.clone(),
        }
    }
}

pub struct GraphEngine {
    config: EngineConfig,
    model: GraphModel,
    priors: RiskPriors,
    mode: RiskMode,
    scorer: Box<dyn RiskScorer>,
    simulator: LayoutSimulator,
    records: IndexMap<String, RiskRecord>,
}

impl GraphEngine {
    /// An engine with an empty graph, scoring in `config.risk.mode`.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mode = config.risk.mode;
        let scorer = build_scorer(mode, &config.risk)?;
        let model = GraphModel::empty();
        let simulator = LayoutSimulator::new(&model, config.layout.clone())?;

        Ok(Self {
            config,
            model,
            priors: RiskPriors::default(),
            mode,
            scorer,
            simulator,
            records: IndexMap::new(),
        })
    }

    /// Replace the graph and priors, reset the layout and rescore.
    ///
    /// On error the engine keeps its previous graph, scores and layout.
    pub fn attach(&mut self, source: &GraphSource, priors: RiskPriors) -> Result<(), EngineError> {
        let model = GraphModel::build(source)?;
        self.attach_model(model, priors)
    }

    /// Like [`attach`](Self::attach) for an already built model
    pub fn attach_model(&mut self, model: GraphModel, priors: RiskPriors) -> Result<(), EngineError> {
        let simulator = LayoutSimulator::new(&model, self.config.layout.clone())?;
        let unknown = priors.wallets().filter(|w| !model.contains(&w.id)).count();
        if unknown > 0 {
            debug!("Ignoring {} priors for wallets outside the graph", unknown);
        }

        self.records = self.scorer.score(&model, &priors);
        self.model = model;
        self.priors = priors;
        self.simulator = simulator;

        let summary = self.model.summary();
        info!(
            "Attached graph: {} wallets, {} transfers, {} isolated ({} mode)",
            summary.num_nodes, summary.num_edges, summary.num_isolated_nodes, self.mode
        );
        Ok(())
    }

    /// Swap the scoring strategy and rescore. Layout state is untouched.
    pub fn set_risk_mode(&mut self, mode: RiskMode) -> Result<(), ConfigError> {
        let scorer = build_scorer(mode, &self.config.risk)?;
        self.records = scorer.score(&self.model, &self.priors);
        self.scorer = scorer;
        self.mode = mode;
        debug!("Risk mode set to {}", mode);
        Ok(())
    }

    /// Advance the layout one step and return the new positions.
    pub fn tick(&mut self) -> Vec<NodePosition> {
        self.simulator.tick();
        self.simulator.positions()
    }

    /// Tick until settled or `max_ticks` steps ran; returns steps taken.
    pub fn run_until_settled(&mut self, max_ticks: usize) -> usize {
        self.simulator.run_until_settled(max_ticks)
    }

    /// Positions and risk records for rendering
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            mode: self.mode,
            alpha: self.simulator.alpha(),
            settled: self.simulator.is_settled(),
            positions: self.simulator.positions(),
            risk_records: self.records.values().cloned().collect(),
        }
    }

    /// Fix a wallet at `(x, y)`; reheats the layout.
    pub fn pin(&mut self, node_id: &str, x: f64, y: f64) -> Result<(), EngineError> {
        let index = self.resolve(node_id)?;
        check_coordinate(x)?;
        check_coordinate(y)?;
        self.simulator.pin(index, x, y);
        Ok(())
    }

    /// Fix one axis of a wallet
    pub fn pin_axis(&mut self, node_id: &str, axis: Axis, value: f64) -> Result<(), EngineError> {
        let index = self.resolve(node_id)?;
        check_coordinate(value)?;
        self.simulator.pin_axis(index, axis, value);
        Ok(())
    }

    pub fn unpin(&mut self, node_id: &str) -> Result<(), EngineError> {
        let index = self.resolve(node_id)?;
        self.simulator.unpin(index);
        Ok(())
    }

    /// Restart a settled layout at `alpha`
    pub fn reheat(&mut self, alpha: f64) -> Result<(), ConfigError> {
        self.simulator.reheat(alpha)
    }

    fn resolve(&self, node_id: &str) -> Result<usize, EngineError> {
        self.model
            .index_of(node_id)
            .ok_or_else(|| EngineError::UnknownNode(node_id.to_string()))
    }

    pub fn mode(&self) -> RiskMode {
        self.mode
    }

    pub fn is_settled(&self) -> bool {
        self.simulator.is_settled()
    }

    pub fn model(&self) -> &GraphModel {
        &self.model
    }

    pub fn priors(&self) -> &RiskPriors {
        &self.priors
    }

    pub fn risk_records(&self) -> &IndexMap<String, RiskRecord> {
        &self.records
    }

    pub fn risk_of(&self, node_id: &str) -> Option<&RiskRecord> {
        self.records.get(node_id)
    }
}

fn check_coordinate(value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter(format!(
            "pin coordinate must be finite, got {}",
            value
        )))
    }
}
