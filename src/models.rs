//! Core data models for GraphGuard
//!
//! Wire-level types exchanged with the graph source and the rendering
//! layer: the raw graph as supplied by upstream, risk records produced by
//! the scorers, and position snapshots produced by the layout simulator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::RiskMode;

/// Presentation tag attached to a transfer
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum EdgePattern {
    Smurfing,
    Peeling,
    #[default]
    None,
}

impl std::fmt::Display for EdgePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgePattern::Smurfing => write!(f, "smurfing"),
            EdgePattern::Peeling => write!(f, "peeling"),
            EdgePattern::None => write!(f, "none"),
        }
    }
}

/// A wallet as supplied by the graph source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    /// Optional initial position; both axes must be present to be used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            x: None,
            y: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    /// Initial position, if both coordinates are finite
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((x, y)),
            _ => None,
        }
    }
}

/// A transfer as supplied by the graph source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub source: String,
    pub target: String,
    /// `null` and a missing field both mean [`EdgePattern::None`]
    #[serde(default, deserialize_with = "nullable_pattern")]
    pub pattern: EdgePattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl EdgeSpec {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn with_pattern(mut self, pattern: EdgePattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

fn nullable_pattern<'de, D>(deserializer: D) -> Result<EdgePattern, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<EdgePattern>::deserialize(deserializer)?.unwrap_or_default())
}

/// Raw graph: `{ nodes: [{id}], edges: [{source, target, pattern?}] }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSource {
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

impl GraphSource {
    pub fn new(nodes: Vec<NodeSpec>, edges: Vec<EdgeSpec>) -> Self {
        Self { nodes, edges }
    }

    /// Convenience constructor from bare ids and (source, target) pairs
    pub fn from_ids(ids: &[&str], edges: &[(&str, &str)]) -> Self {
        Self {
            nodes: ids.iter().map(|id| NodeSpec::new(*id)).collect(),
            edges: edges.iter().map(|(s, t)| EdgeSpec::new(*s, *t)).collect(),
        }
    }
}

/// Coarse risk classification used for display
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    #[default]
    Normal,
    Low,
    Medium,
    High,
}

impl RiskBand {
    pub fn from_value(value: f64) -> Self {
        match value {
            v if v >= 0.85 => RiskBand::High,
            v if v >= 0.6 => RiskBand::Medium,
            v if v >= 0.3 => RiskBand::Low,
            _ => RiskBand::Normal,
        }
    }
}

impl std::fmt::Display for RiskBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskBand::Normal => write!(f, "normal"),
            RiskBand::Low => write!(f, "low"),
            RiskBand::Medium => write!(f, "medium"),
            RiskBand::High => write!(f, "high"),
        }
    }
}

/// Risk assigned to one wallet by a scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RiskRecord {
    pub node_id: String,
    /// Score in [0, 1]
    pub value: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
    /// Pre-propagation score, kept so the UI can show the delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_value: Option<f64>,
    #[serde(default)]
    pub flagged: bool,
}

impl RiskRecord {
    pub fn new(node_id: impl Into<String>, value: f64) -> Self {
        Self {
            node_id: node_id.into(),
            value,
            ..Default::default()
        }
    }

    /// `value - base_value`, when a base value was retained
    pub fn delta(&self) -> Option<f64> {
        self.base_value.map(|base| self.value - base)
    }

    pub fn band(&self) -> RiskBand {
        RiskBand::from_value(self.value)
    }
}

/// Position of one wallet as seen by the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub pinned: bool,
}

/// Everything the rendering layer needs for one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub mode: RiskMode,
    pub alpha: f64,
    pub settled: bool,
    pub positions: Vec<NodePosition>,
    pub risk_records: Vec<RiskRecord>,
}
