//! Per-wallet risk priors
//!
//! Priors come from an external source (`{ wallets: [{ id, baseRisk, reasons? }] }`)
//! or are derived from the graph itself by [`derive_priors`]. Either way every
//! value is clamped into [0, 1] and wallets without a prior score 0.

use std::collections::VecDeque;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::graph::features::{extract_node_features, min_max_normalize};
use crate::graph::{GraphModel, PatternReport};

/// Raw-count thresholds for the structural component
const STRUCTURAL_FAN_OUT: usize = 3;
const STRUCTURAL_FAN_IN: usize = 3;

/// Pass-through: at least this many inflows and one outflow, nearly balanced
const FLOW_MIN_IN: usize = 2;
const FLOW_MIN_OUT: usize = 1;
const FLOW_MAX_IMBALANCE: f64 = 0.2;

const TEMPORAL_MIN_TX: usize = 3;
const TEMPORAL_MAX_SPAN: f64 = 0.3;

const PROXIMITY_MAX_HOPS: usize = 3;

/// structural, flow, temporal, proximity
const COMPONENT_WEIGHTS: [f64; 4] = [0.4, 0.3, 0.2, 0.1];

/// Breakdown of a derived prior
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskComponents {
    pub structural: f64,
    pub flow: f64,
    pub temporal: f64,
    pub proximity: f64,
}

/// One wallet's prior
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletPrior {
    pub id: String,
    #[serde(alias = "baseRisk", default)]
    pub base_risk: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<RiskComponents>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PriorsFile {
    #[serde(default)]
    wallets: Vec<WalletPrior>,
}

/// Priors keyed by wallet id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "PriorsFile", into = "PriorsFile")]
pub struct RiskPriors {
    wallets: IndexMap<String, WalletPrior>,
}

impl From<PriorsFile> for RiskPriors {
    fn from(file: PriorsFile) -> Self {
        let mut priors = RiskPriors::default();
        for wallet in file.wallets {
            priors.insert(wallet);
        }
        priors
    }
}

impl From<RiskPriors> for PriorsFile {
    fn from(priors: RiskPriors) -> Self {
        PriorsFile {
            wallets: priors.wallets.into_values().collect(),
        }
    }
}

impl RiskPriors {
    /// Build from bare `(id, base_risk)` pairs
    pub fn from_values(values: impl IntoIterator<Item = (String, f64)>) -> Self {
        let mut priors = RiskPriors::default();
        for (id, base_risk) in values {
            priors.insert(WalletPrior {
                id,
                base_risk,
                ..Default::default()
            });
        }
        priors
    }

    /// Add or replace a prior, clamping its value into [0, 1].
    pub fn insert(&mut self, mut wallet: WalletPrior) {
        let clamped = clamp_unit(wallet.base_risk);
        if clamped != wallet.base_risk {
            warn!(
                "Prior for '{}' out of range ({}), clamped to {}",
                wallet.id, wallet.base_risk, clamped
            );
            wallet.base_risk = clamped;
        }
        if self.wallets.contains_key(&wallet.id) {
            warn!("Duplicate prior for '{}', keeping the last one", wallet.id);
        }
        self.wallets.insert(wallet.id.clone(), wallet);
    }

    /// Base risk of a wallet, 0 when unknown
    pub fn base_risk(&self, id: &str) -> f64 {
        self.wallets.get(id).map_or(0.0, |w| w.base_risk)
    }

    /// Reasons attached to a wallet's prior (empty when unknown)
    pub fn reasons(&self, id: &str) -> &[String] {
        self.wallets
            .get(id)
            .map(|w| w.reasons.as_slice())
            .unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<&WalletPrior> {
        self.wallets.get(id)
    }

    pub fn wallets(&self) -> impl Iterator<Item = &WalletPrior> + '_ {
        self.wallets.values()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Derive priors from graph structure and detected patterns.
///
/// A wallet only scores when it shows a structural (raw fan-out or fan-in of
/// at least 3) or pass-through flow anomaly. Timing and proximity to involved
/// wallets then add to it:
///
/// ```text
/// base = 0.4 * structural + 0.3 * flow + 0.2 * temporal + 0.1 * proximity
/// ```
///
/// capped at 1 and rounded to three decimals.
pub fn derive_priors(graph: &GraphModel, report: &PatternReport) -> RiskPriors {
    let features = extract_node_features(graph);
    let span_norm = min_max_normalize(&features.iter().map(|f| f.active_time_span).collect::<Vec<_>>());
    let involved: Vec<bool> = (0..graph.node_count()).map(|i| report.is_involved(i)).collect();

    let mut priors = RiskPriors::default();

    for (i, feats) in features.iter().enumerate() {
        let structural = if feats.out_degree >= STRUCTURAL_FAN_OUT || feats.in_degree >= STRUCTURAL_FAN_IN {
            1.0
        } else {
            0.0
        };
        let flow = if feats.in_degree >= FLOW_MIN_IN
            && feats.out_degree >= FLOW_MIN_OUT
            && feats.flow_imbalance <= FLOW_MAX_IMBALANCE
        {
            1.0
        } else {
            0.0
        };

        let mut components = RiskComponents {
            structural,
            flow,
            ..Default::default()
        };

        // Hard gate: no structural or flow anomaly means no risk at all
        if structural > 0.0 || flow > 0.0 {
            if feats.tx_count >= TEMPORAL_MIN_TX && span_norm[i] <= TEMPORAL_MAX_SPAN {
                components.temporal = 1.0;
            }
            components.proximity = match nearest_involved(graph, i, &involved) {
                Some(hops) => 1.0 / (hops as f64 + 1.0),
                None => 0.0,
            };
        }

        let weighted = COMPONENT_WEIGHTS[0] * components.structural
            + COMPONENT_WEIGHTS[1] * components.flow
            + COMPONENT_WEIGHTS[2] * components.temporal
            + COMPONENT_WEIGHTS[3] * components.proximity;
        let base_risk = round3(weighted.min(1.0));
        components.proximity = round3(components.proximity);

        let mut reasons = Vec::new();
        if components.structural > 0.0 {
            reasons.push("Suspicious transaction structure (fan-in / fan-out)".to_string());
        }
        if components.flow > 0.0 {
            reasons.push("Pass-through money flow behavior".to_string());
        }
        if components.temporal > 0.0 {
            reasons.push("Highly coordinated transaction timing".to_string());
        }
        if components.proximity > 0.0 {
            reasons.push("Close proximity to suspicious wallets".to_string());
        }

        priors.insert(WalletPrior {
            id: graph.id_at(i).to_string(),
            base_risk,
            reasons,
            components: Some(components),
        });
    }

    debug!(
        "Derived priors for {} wallets ({} non-zero)",
        priors.len(),
        priors.wallets().filter(|w| w.base_risk > 0.0).count()
    );
    priors
}

/// Placeholder priors that fall with insertion order: `1 - i / n`.
///
/// Only meant for fixtures and demos; carries no domain meaning.
pub fn synthetic_priors(graph: &GraphModel) -> RiskPriors {
    let n = graph.node_count() as f64;
    RiskPriors::from_values(
        graph
            .node_ids()
            .enumerate()
            .map(|(i, id)| (id.to_string(), 1.0 - i as f64 / n)),
    )
}

/// Directed hop count to the closest involved wallet (0 if `start` is one)
fn nearest_involved(graph: &GraphModel, start: usize, involved: &[bool]) -> Option<usize> {
    if involved[start] {
        return Some(0);
    }
    let mut dist = vec![usize::MAX; graph.node_count()];
    let mut queue = VecDeque::from([start]);
    dist[start] = 0;

    while let Some(u) = queue.pop_front() {
        if dist[u] == PROXIMITY_MAX_HOPS {
            continue;
        }
        for edge in graph.outgoing(u) {
            let v = edge.target;
            if dist[v] != usize::MAX {
                continue;
            }
            dist[v] = dist[u] + 1;
            if involved[v] {
                return Some(dist[v]);
            }
            queue.push_back(v);
        }
    }
    None
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
