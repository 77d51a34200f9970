//! Laundering pattern detectors
//!
//! Five independent detectors run over the flow features of each wallet:
//!
//! - **Fan-out** (smurfing / splitting): many outgoing, few incoming
//! - **Fan-in** (aggregation): many incoming, few outgoing
//! - **Multi-hop convergence**: funds split and meet again downstream
//! - **Peeling chain**: repeated forwarding with minimal value reduction
//! - **Mule wallet**: balanced pass-through in a short activity window
//!
//! Degree, activity span and transaction count are min-max normalized
//! across the graph before thresholds are applied, so the detectors are
//! relative to the dataset rather than absolute counts.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::features::{extract_edge_features, extract_node_features, min_max_normalize, NodeFeatures};
use super::GraphModel;
use crate::errors::ConfigError;
use crate::models::EdgePattern;

/// Detector thresholds (`[patterns]` in graphguard.toml)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternThresholds {
    pub fan_out_min_out: f64,
    pub fan_out_max_in: f64,
    pub fan_in_min_in: f64,
    pub fan_in_max_out: f64,
    pub convergence_max_hops: usize,
    pub convergence_min_endpoints: usize,
    pub peel_ratio: f64,
    pub mule_max_imbalance: f64,
    pub mule_max_time_span: f64,
    pub mule_min_tx: f64,
}

impl Default for PatternThresholds {
    fn default() -> Self {
        Self {
            fan_out_min_out: 0.6,
            fan_out_max_in: 0.2,
            fan_in_min_in: 0.6,
            fan_in_max_out: 0.2,
            convergence_max_hops: 3,
            convergence_min_endpoints: 3,
            peel_ratio: 0.8,
            mule_max_imbalance: 0.2,
            mule_max_time_span: 0.3,
            mule_min_tx: 0.2,
        }
    }
}

impl PatternThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("patterns.fan_out_min_out", self.fan_out_min_out),
            ("patterns.fan_out_max_in", self.fan_out_max_in),
            ("patterns.fan_in_min_in", self.fan_in_min_in),
            ("patterns.fan_in_max_out", self.fan_in_max_out),
            ("patterns.peel_ratio", self.peel_ratio),
            ("patterns.mule_max_imbalance", self.mule_max_imbalance),
            ("patterns.mule_max_time_span", self.mule_max_time_span),
            ("patterns.mule_min_tx", self.mule_min_tx),
        ] {
            ConfigError::check_range(name, value, 0.0, 1.0)?;
        }
        if self.convergence_max_hops < 2 {
            return Err(ConfigError::InvalidParameter(format!(
                "patterns.convergence_max_hops must be at least 2, got {}",
                self.convergence_max_hops
            )));
        }
        Ok(())
    }
}

/// Patterns detected for one wallet
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodePatterns {
    pub fan_out: bool,
    pub fan_in: bool,
    pub multi_hop_convergence: bool,
    /// Number of outgoing transfers that look like a peel
    pub peeling_transfers: usize,
    pub mule_wallet: bool,
    pub reasons: Vec<String>,
}

impl NodePatterns {
    pub fn peeling_chain(&self) -> bool {
        self.peeling_transfers > 0
    }

    /// True when any detector fired
    pub fn any(&self) -> bool {
        self.fan_out
            || self.fan_in
            || self.multi_hop_convergence
            || self.peeling_chain()
            || self.mule_wallet
    }
}

/// Detector output for a whole graph, indexed by insertion position
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternReport {
    nodes: Vec<NodePatterns>,
}

impl PatternReport {
    pub fn get(&self, position: usize) -> Option<&NodePatterns> {
        self.nodes.get(position)
    }

    pub fn is_involved(&self, position: usize) -> bool {
        self.nodes.get(position).is_some_and(NodePatterns::any)
    }

    /// Positions of wallets flagged by at least one detector
    pub fn involved(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, p)| p.any())
            .map(|(i, _)| i)
    }

    /// Tag for transfers leaving `source`: smurfing beats peeling
    pub fn edge_pattern_for(&self, source: usize) -> EdgePattern {
        match self.nodes.get(source) {
            Some(p) if p.fan_out => EdgePattern::Smurfing,
            Some(p) if p.peeling_chain() => EdgePattern::Peeling,
            _ => EdgePattern::None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Run every detector over the graph.
pub fn detect_patterns(graph: &GraphModel, thresholds: &PatternThresholds) -> PatternReport {
    let n = graph.node_count();
    if n == 0 {
        return PatternReport::default();
    }

    let features = extract_node_features(graph);
    let column = |f: fn(&NodeFeatures) -> f64| {
        min_max_normalize(&features.iter().map(f).collect::<Vec<_>>())
    };
    let in_norm = column(|f| f.in_degree as f64);
    let out_norm = column(|f| f.out_degree as f64);
    let span_norm = column(|f| f.active_time_span);
    let tx_norm = column(|f| f.tx_count as f64);

    let mut nodes = vec![NodePatterns::default(); n];

    for (i, node) in nodes.iter_mut().enumerate() {
        if out_norm[i] >= thresholds.fan_out_min_out && in_norm[i] <= thresholds.fan_out_max_in {
            node.fan_out = true;
            node.reasons
                .push("High out-degree with minimal incoming transactions".to_string());
        }

        if in_norm[i] >= thresholds.fan_in_min_in && out_norm[i] <= thresholds.fan_in_max_out {
            node.fan_in = true;
            node.reasons
                .push("High in-degree with minimal outgoing transactions".to_string());
        }

        if features[i].tx_count > 0
            && features[i].flow_imbalance <= thresholds.mule_max_imbalance
            && span_norm[i] <= thresholds.mule_max_time_span
            && tx_norm[i] >= thresholds.mule_min_tx
        {
            node.mule_wallet = true;
            node.reasons.push(
                "Pass-through wallet with balanced flow and a short activity window".to_string(),
            );
        }
    }

    // Peeling: forwarded share close to (but not above) the largest inflow
    for (edge, feats) in graph.edges().zip(extract_edge_features(graph)) {
        if graph.fan_in_at(edge.source) > 0
            && feats.peeling_ratio >= thresholds.peel_ratio
            && feats.peeling_ratio <= 1.0
        {
            nodes[edge.source].peeling_transfers += 1;
        }
    }
    for node in nodes.iter_mut().filter(|p| p.peeling_chain()) {
        node.reasons.push(format!(
            "Repeated fund forwarding with minimal value reduction ({} peeling transfers)",
            node.peeling_transfers
        ));
    }

    let successors = successor_lists(graph);
    for (i, node) in nodes.iter_mut().enumerate() {
        if converges(&successors, i, thresholds) {
            node.multi_hop_convergence = true;
            node.reasons
                .push("Funds converge on a common downstream wallet within a few hops".to_string());
        }
    }

    let report = PatternReport { nodes };
    debug!(
        "Pattern detection: {} of {} wallets involved",
        report.involved().count(),
        n
    );
    report
}

/// Fill in untagged transfers from the detector output. Returns how many
/// edges were tagged. Topology and metrics are unchanged.
pub fn annotate_edges(graph: &mut GraphModel, report: &PatternReport) -> usize {
    let mut tagged = 0;
    let inner = graph.inner_mut();
    for edge in inner.edge_indices() {
        let Some((source, _)) = inner.edge_endpoints(edge) else {
            continue;
        };
        let pattern = report.edge_pattern_for(source.index());
        let transfer = &mut inner[edge];
        if transfer.pattern == EdgePattern::None && pattern != EdgePattern::None {
            transfer.pattern = pattern;
            tagged += 1;
        }
    }
    tagged
}

/// Deduplicated successor lists, self-loops dropped
fn successor_lists(graph: &GraphModel) -> Vec<Vec<usize>> {
    let mut succ = vec![Vec::new(); graph.node_count()];
    for edge in graph.edges() {
        if edge.source != edge.target && !succ[edge.source].contains(&edge.target) {
            succ[edge.source].push(edge.target);
        }
    }
    succ
}

/// Bounded BFS distances from `start` (usize::MAX = unreached)
fn bounded_distances(successors: &[Vec<usize>], start: usize, max_depth: usize) -> Vec<usize> {
    let mut dist = vec![usize::MAX; successors.len()];
    let mut queue = VecDeque::new();
    dist[start] = 0;
    queue.push_back(start);

    while let Some(u) = queue.pop_front() {
        if dist[u] == max_depth {
            continue;
        }
        for &v in &successors[u] {
            if dist[v] == usize::MAX {
                dist[v] = dist[u] + 1;
                queue.push_back(v);
            }
        }
    }
    dist
}

/// A wallet converges when enough wallets sit 2..=max_hops downstream and at
/// least one of them is reachable through two different first hops.
fn converges(successors: &[Vec<usize>], origin: usize, thresholds: &PatternThresholds) -> bool {
    let max_hops = thresholds.convergence_max_hops;
    let from_origin = bounded_distances(successors, origin, max_hops);

    let endpoints: Vec<usize> = (0..successors.len())
        .filter(|&w| w != origin && (2..=max_hops).contains(&from_origin[w]))
        .collect();
    if endpoints.len() < thresholds.convergence_min_endpoints {
        return false;
    }

    let mut branches_reaching = vec![0usize; successors.len()];
    for &first_hop in &successors[origin] {
        let from_branch = bounded_distances(successors, first_hop, max_hops - 1);
        for &w in &endpoints {
            if from_branch[w] != usize::MAX {
                branches_reaching[w] += 1;
            }
        }
    }

    endpoints.iter().any(|&w| branches_reaching[w] >= 2)
}
