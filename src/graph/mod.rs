//! Transaction graph for risk analysis
//!
//! Pure Rust implementation on top of petgraph. The model is built once per
//! analysis run and is read-only afterwards; layout positions live in the
//! simulator, not here.

pub mod features;
pub mod model;
pub mod patterns;

pub use features::{extract_edge_features, extract_node_features, min_max_normalize, EdgeFeatures, NodeFeatures};
pub use model::{EdgeView, GraphModel, GraphSummary, Transfer, Wallet};
pub use patterns::{annotate_edges, detect_patterns, NodePatterns, PatternReport, PatternThresholds};
