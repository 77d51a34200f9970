//! Immutable transaction graph with cached structural metrics
//!
//! Wallets are petgraph nodes, transfers are petgraph edges. Node indices
//! follow insertion order, so every pass over the graph is deterministic.
//! Fan-in / fan-out are counted once at build time (O(E)) and are O(1)
//! lookups afterwards.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use tracing::debug;

use crate::errors::{EdgeEnd, StructuralError};
use crate::models::{EdgePattern, EdgeSpec, GraphSource, NodeSpec};

/// A wallet in the transaction graph
#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    pub id: String,
    /// Position supplied by the graph source, if any
    pub initial_position: Option<(f64, f64)>,
}

/// A directed transfer between two wallets
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transfer {
    pub pattern: EdgePattern,
    pub amount: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<&EdgeSpec> for Transfer {
    fn from(spec: &EdgeSpec) -> Self {
        Self {
            pattern: spec.pattern,
            amount: spec.amount,
            timestamp: spec.timestamp,
        }
    }
}

/// Borrowed view of one edge, addressed by dense node positions
#[derive(Debug, Clone, Copy)]
pub struct EdgeView<'a> {
    pub source: usize,
    pub target: usize,
    pub transfer: &'a Transfer,
}

/// Basic sanity stats for a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphSummary {
    pub num_nodes: usize,
    pub num_edges: usize,
    pub num_isolated_nodes: usize,
}

/// Transaction graph plus cached degree metrics
#[derive(Debug, Clone, Default)]
pub struct GraphModel {
    graph: DiGraph<Wallet, Transfer>,
    index: IndexMap<String, NodeIndex>,
    fan_in: Vec<usize>,
    fan_out: Vec<usize>,
}

impl GraphModel {
    /// A graph with no wallets
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a graph from the raw source.
    ///
    /// # Errors
    /// - `EmptyNodeId` if a node id is the empty string
    /// - `DuplicateNode` if an id appears twice
    /// - `UnknownNode` if an edge references an id not in `nodes`
    pub fn build(source: &GraphSource) -> Result<Self, StructuralError> {
        Self::from_parts(&source.nodes, &source.edges)
    }

    pub fn from_parts(nodes: &[NodeSpec], edges: &[EdgeSpec]) -> Result<Self, StructuralError> {
        let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());
        let mut index = IndexMap::with_capacity(nodes.len());

        for (position, spec) in nodes.iter().enumerate() {
            if spec.id.is_empty() {
                return Err(StructuralError::EmptyNodeId { position });
            }
            if index.contains_key(&spec.id) {
                return Err(StructuralError::DuplicateNode(spec.id.clone()));
            }
            let idx = graph.add_node(Wallet {
                id: spec.id.clone(),
                initial_position: spec.position(),
            });
            index.insert(spec.id.clone(), idx);
        }

        let mut model = Self {
            graph,
            index,
            fan_in: vec![0; nodes.len()],
            fan_out: vec![0; nodes.len()],
        };

        // Validate every edge before inserting any, so a failure leaves nothing half-built
        let resolved = edges
            .iter()
            .enumerate()
            .map(|(i, spec)| model.resolve(i, spec))
            .collect::<Result<Vec<_>, _>>()?;

        for ((src, dst), spec) in resolved.into_iter().zip(edges) {
            model.insert_edge(src, dst, Transfer::from(spec));
        }

        debug!(
            "Built transaction graph: {} wallets, {} transfers",
            model.node_count(),
            model.edge_count()
        );

        Ok(model)
    }

    /// Append a transfer, keeping the cached metrics in sync.
    ///
    /// # Errors
    /// - `UnknownNode` if either end is not in the graph
    pub fn add_edge(&mut self, spec: &EdgeSpec) -> Result<(), StructuralError> {
        let (src, dst) = self.resolve(self.edge_count(), spec)?;
        self.insert_edge(src, dst, Transfer::from(spec));
        Ok(())
    }

    fn resolve(&self, edge: usize, spec: &EdgeSpec) -> Result<(NodeIndex, NodeIndex), StructuralError> {
        let src = self
            .index
            .get(&spec.source)
            .copied()
            .ok_or_else(|| StructuralError::UnknownNode {
                edge,
                role: EdgeEnd::Source,
                node_id: spec.source.clone(),
            })?;
        let dst = self
            .index
            .get(&spec.target)
            .copied()
            .ok_or_else(|| StructuralError::UnknownNode {
                edge,
                role: EdgeEnd::Target,
                node_id: spec.target.clone(),
            })?;
        Ok((src, dst))
    }

    fn insert_edge(&mut self, src: NodeIndex, dst: NodeIndex, transfer: Transfer) -> EdgeIndex {
        self.fan_out[src.index()] += 1;
        self.fan_in[dst.index()] += 1;
        self.graph.add_edge(src, dst, transfer)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Dense position (insertion order) of a wallet id
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).map(|idx| idx.index())
    }

    pub fn wallet(&self, position: usize) -> &Wallet {
        &self.graph[NodeIndex::new(position)]
    }

    /// Id at a dense position
    pub fn id_at(&self, position: usize) -> &str {
        &self.wallet(position).id
    }

    /// Wallet ids in insertion order
    pub fn node_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.index.keys().map(String::as_str)
    }

    /// Edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> + '_ {
        self.graph.edge_references().map(|e| EdgeView {
            source: e.source().index(),
            target: e.target().index(),
            transfer: e.weight(),
        })
    }

    /// Incoming transfers of a wallet, in insertion order
    pub fn incoming(&self, position: usize) -> Vec<EdgeView<'_>> {
        self.edges_directed(position, Direction::Incoming)
    }

    /// Outgoing transfers of a wallet, in insertion order
    pub fn outgoing(&self, position: usize) -> Vec<EdgeView<'_>> {
        self.edges_directed(position, Direction::Outgoing)
    }

    fn edges_directed(&self, position: usize, dir: Direction) -> Vec<EdgeView<'_>> {
        // petgraph walks adjacency lists newest-first; sort back to insertion order
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(NodeIndex::new(position), dir)
            .map(|e| (e.id(), e))
            .collect();
        edges.sort_by_key(|(id, _)| *id);
        edges
            .into_iter()
            .map(|(_, e)| EdgeView {
                source: e.source().index(),
                target: e.target().index(),
                transfer: e.weight(),
            })
            .collect()
    }

    /// Fan-in of a wallet id (0 for unknown or isolated wallets)
    pub fn fan_in_of(&self, id: &str) -> usize {
        self.index_of(id).map_or(0, |i| self.fan_in[i])
    }

    /// Fan-out of a wallet id (0 for unknown or isolated wallets)
    pub fn fan_out_of(&self, id: &str) -> usize {
        self.index_of(id).map_or(0, |i| self.fan_out[i])
    }

    pub fn degree_of(&self, id: &str) -> usize {
        self.fan_in_of(id) + self.fan_out_of(id)
    }

    pub fn fan_in_at(&self, position: usize) -> usize {
        self.fan_in[position]
    }

    pub fn fan_out_at(&self, position: usize) -> usize {
        self.fan_out[position]
    }

    pub fn degree_at(&self, position: usize) -> usize {
        self.fan_in[position] + self.fan_out[position]
    }

    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            num_nodes: self.node_count(),
            num_edges: self.edge_count(),
            num_isolated_nodes: (0..self.node_count())
                .filter(|&i| self.degree_at(i) == 0)
                .count(),
        }
    }

    /// Edge weights may be edited in place; topology must not change
    pub(crate) fn inner_mut(&mut self) -> &mut DiGraph<Wallet, Transfer> {
        &mut self.graph
    }
}
