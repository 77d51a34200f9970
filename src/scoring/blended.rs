//! Prior and propagated risk fused into one score

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::propagation::inherited_reason;
use super::{Propagation, PropagationConfig, RiskPriors, RiskScorer};
use crate::errors::ConfigError;
use crate::graph::GraphModel;
use crate::models::RiskRecord;

/// `[risk.blended]` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    /// Weight of the prior; `1 - alpha` goes to the propagated value
    pub alpha: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self { alpha: 0.6 }
    }
}

impl BlendConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_range("blended.alpha", self.alpha, 0.0, 1.0)
    }
}

/// `value = alpha * base + (1 - alpha) * propagated`
#[derive(Debug, Clone)]
pub struct Blended {
    blend: BlendConfig,
    propagation: Propagation,
}

impl Blended {
    pub fn new(blend: BlendConfig, propagation: PropagationConfig) -> Result<Self, ConfigError> {
        blend.validate()?;
        Ok(Self {
            blend,
            propagation: Propagation::new(propagation)?,
        })
    }
}

impl RiskScorer for Blended {
    fn name(&self) -> &'static str {
        "blended"
    }

    fn score(&self, graph: &GraphModel, priors: &RiskPriors) -> IndexMap<String, RiskRecord> {
        let base: Vec<f64> = graph.node_ids().map(|id| priors.base_risk(id)).collect();
        let outcome = self.propagation.propagate(graph, &base);
        let alpha = self.blend.alpha;
        let flag_threshold = self.propagation.config().flag_threshold;

        graph
            .node_ids()
            .enumerate()
            .map(|(i, id)| {
                let propagated = outcome.values[i];
                let value = (alpha * base[i] + (1.0 - alpha) * propagated).clamp(0.0, 1.0);
                let mut reasons = priors.reasons(id).to_vec();
                if propagated > base[i] {
                    reasons.extend(inherited_reason(graph, outcome.upstream[i], propagated));
                }
                let record = RiskRecord {
                    node_id: id.to_string(),
                    value,
                    reasons,
                    base_value: Some(base[i]),
                    flagged: value > flag_threshold,
                };
                (id.to_string(), record)
            })
            .collect()
    }
}
