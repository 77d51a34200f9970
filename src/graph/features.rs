//! Per-wallet and per-transfer flow features
//!
//! Inputs to pattern detection and derived priors. Transfers without an
//! amount count as one unit of value; transfers without a timestamp are
//! ignored for timing features.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::GraphModel;

/// Amount assumed for transfers that carry none
const UNIT_AMOUNT: f64 = 1.0;

/// Keeps the imbalance ratio finite for wallets with no value moved
const IMBALANCE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeFeatures {
    pub in_degree: usize,
    pub out_degree: usize,
    pub total_inflow: f64,
    pub total_outflow: f64,
    /// |in - out| / (in + out), 0 = perfect pass-through
    pub flow_imbalance: f64,
    pub tx_count: usize,
    /// Seconds between the first and last timestamped transfer
    pub active_time_span: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EdgeFeatures {
    pub amount: f64,
    /// Seconds since the source's previous outgoing transfer
    pub time_delta: f64,
    /// Share of the source's largest incoming transfer passed forward
    pub peeling_ratio: f64,
}

/// Compute flow features for every wallet, indexed by insertion position.
pub fn extract_node_features(graph: &GraphModel) -> Vec<NodeFeatures> {
    (0..graph.node_count())
        .map(|i| {
            let incoming = graph.incoming(i);
            let outgoing = graph.outgoing(i);

            let total_inflow: f64 = incoming.iter().map(|e| e.transfer.amount.unwrap_or(UNIT_AMOUNT)).sum();
            let total_outflow: f64 = outgoing.iter().map(|e| e.transfer.amount.unwrap_or(UNIT_AMOUNT)).sum();

            let timestamps: Vec<_> = incoming
                .iter()
                .chain(outgoing.iter())
                .filter_map(|e| e.transfer.timestamp)
                .collect();
            let active_time_span = match (timestamps.iter().min(), timestamps.iter().max()) {
                (Some(first), Some(last)) => (*last - *first).num_milliseconds() as f64 / 1000.0,
                _ => 0.0,
            };

            let flow_imbalance = (total_inflow - total_outflow).abs()
                / (total_inflow + total_outflow + IMBALANCE_EPSILON);

            NodeFeatures {
                in_degree: incoming.len(),
                out_degree: outgoing.len(),
                total_inflow,
                total_outflow,
                flow_imbalance,
                tx_count: incoming.len() + outgoing.len(),
                active_time_span,
            }
        })
        .collect()
}

/// Compute features for every transfer, in edge insertion order.
pub fn extract_edge_features(graph: &GraphModel) -> Vec<EdgeFeatures> {
    let n = graph.node_count();

    // Per wallet: largest incoming amount, outgoing timestamps in time order
    let mut largest_incoming: Vec<Option<f64>> = vec![None; n];
    let mut outgoing_times: Vec<Vec<DateTime<Utc>>> = vec![Vec::new(); n];
    for edge in graph.edges() {
        let amount = edge.transfer.amount.unwrap_or(UNIT_AMOUNT);
        let slot = &mut largest_incoming[edge.target];
        *slot = Some(slot.map_or(amount, |m| m.max(amount)));
        if let Some(ts) = edge.transfer.timestamp {
            outgoing_times[edge.source].push(ts);
        }
    }
    for times in &mut outgoing_times {
        times.sort_unstable();
    }

    graph
        .edges()
        .map(|edge| {
            let amount = edge.transfer.amount.unwrap_or(UNIT_AMOUNT);

            let time_delta = edge
                .transfer
                .timestamp
                .and_then(|ts| {
                    let times = &outgoing_times[edge.source];
                    let earlier = times.partition_point(|prev| *prev < ts);
                    earlier
                        .checked_sub(1)
                        .map(|prev| (ts - times[prev]).num_milliseconds() as f64 / 1000.0)
                })
                .unwrap_or(0.0);

            let peeling_ratio = match largest_incoming[edge.source] {
                Some(max_in) => amount / (max_in + IMBALANCE_EPSILON),
                None => 1.0,
            };

            EdgeFeatures {
                amount,
                time_delta,
                peeling_ratio,
            }
        })
        .collect()
}

/// Min-max scale a column to [0, 1]. A constant column maps to all zeros.
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if !range.is_finite() || range == 0.0 {
        return vec![0.0; values.len()];
    }

    values.iter().map(|v| (v - min) / range).collect()
}
