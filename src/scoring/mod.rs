//! Risk scoring strategies
//!
//! Every strategy implements [`RiskScorer`] and is total over the node set:
//! wallets without a prior score from 0, never an error.
//!
//! # Strategies
//!
//! - **Rule** ([`RuleBased`]): `value = base`, flagged by a one-node
//!   fan-in / fan-out gate. No cross-node influence.
//! - **Propagation** ([`Propagation`]): max-relaxation along directed
//!   transfers, `value[t] = max(value[t], value[s] * decay)`, until a fixed
//!   point or the iteration cap.
//! - **Blended** ([`Blended`]): `alpha * base + (1 - alpha) * propagated`.
//!
//! Scorers hold only their parameters. Switching mode builds a fresh scorer,
//! so no state carries over between strategies.

mod blended;
pub mod priors;
mod propagation;
mod rule_based;

use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ConfigError;
use crate::graph::GraphModel;
use crate::models::RiskRecord;

pub use blended::{BlendConfig, Blended};
pub use priors::{derive_priors, synthetic_priors, RiskComponents, RiskPriors, WalletPrior};
pub use propagation::{Propagation, PropagationConfig, PropagationOutcome, PropagationStats};
pub use rule_based::{RuleBased, RuleThresholds};

/// A per-wallet risk strategy
pub trait RiskScorer: Send + Sync {
    /// Short name used in logs and output
    fn name(&self) -> &'static str;

    /// Score every wallet of `graph`, keyed by id in insertion order.
    fn score(&self, graph: &GraphModel, priors: &RiskPriors) -> IndexMap<String, RiskRecord>;
}

/// Which strategy the engine runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskMode {
    #[default]
    Rule,
    Propagation,
    Blended,
}

impl RiskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskMode::Rule => "rule",
            RiskMode::Propagation => "propagation",
            RiskMode::Blended => "blended",
        }
    }
}

impl std::fmt::Display for RiskMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rule" | "rule-based" | "rule_based" => Ok(RiskMode::Rule),
            "propagation" | "diffusion" => Ok(RiskMode::Propagation),
            "blended" | "blend" => Ok(RiskMode::Blended),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

/// `[risk]` section: active mode plus parameters for every strategy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub mode: RiskMode,
    pub rule: RuleThresholds,
    pub propagation: PropagationConfig,
    pub blended: BlendConfig,
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rule.validate()?;
        self.propagation.validate()?;
        self.blended.validate()
    }
}

/// Build the scorer for `mode`, validating its parameters first.
pub fn build_scorer(mode: RiskMode, config: &RiskConfig) -> Result<Box<dyn RiskScorer>, ConfigError> {
    let scorer: Box<dyn RiskScorer> = match mode {
        RiskMode::Rule => Box::new(RuleBased::new(config.rule.clone())?),
        RiskMode::Propagation => Box::new(Propagation::new(config.propagation.clone())?),
        RiskMode::Blended => Box::new(Blended::new(config.blended.clone(), config.propagation.clone())?),
    };
    debug!("Selected {} risk scorer", scorer.name());
    Ok(scorer)
}
