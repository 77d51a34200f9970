//! Max-relaxation risk diffusion
//!
//! Risk flows downstream along transfers:
//!
//! ```text
//! value[t] = max(value[t], value[s] * decay)   for every edge s -> t
//! ```
//!
//! Each pass reads the previous pass's values (Jacobi style), so one pass is
//! independent of edge order. The update is monotone and bounded by 1, which
//! makes the fixed point unique; the iteration cap only bounds latency.

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RiskPriors, RiskScorer};
use crate::errors::ConfigError;
use crate::graph::GraphModel;
use crate::models::RiskRecord;

/// Node count above which a pass is split across the rayon pool
const PARALLEL_THRESHOLD: usize = 2048;

/// `[risk.propagation]` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Attenuation per hop, in (0, 1]
    pub decay: f64,
    pub max_iterations: usize,
    /// A pass that moves no value by more than this ends the run
    pub epsilon: f64,
    /// Wallets scoring strictly above this are flagged
    pub flag_threshold: f64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            decay: 0.85,
            max_iterations: 100,
            epsilon: 1e-9,
            flag_threshold: 0.6,
        }
    }
}

impl PropagationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.decay > 0.0 && self.decay <= 1.0) {
            return Err(ConfigError::InvalidDecay(self.decay));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidParameter(
                "propagation.max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(ConfigError::InvalidParameter(format!(
                "propagation.epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.flag_threshold < 0.0 {
            return Err(ConfigError::NegativeThreshold {
                name: "propagation.flag_threshold",
                value: self.flag_threshold,
            });
        }
        ConfigError::check_range("propagation.flag_threshold", self.flag_threshold, 0.0, 1.0)
    }
}

/// How a propagation run ended
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PropagationStats {
    pub iterations: usize,
    pub converged: bool,
    /// Largest single change in the last pass
    pub last_delta: f64,
}

/// Values after propagation, by insertion position
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationOutcome {
    pub values: Vec<f64>,
    /// Upstream wallet that last raised each value, if any
    pub upstream: Vec<Option<usize>>,
    pub stats: PropagationStats,
}

#[derive(Debug, Clone)]
pub struct Propagation {
    config: PropagationConfig,
}

impl Propagation {
    pub fn new(config: PropagationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Run max-relaxation from `base` (one value per wallet, insertion order).
    pub fn propagate(&self, graph: &GraphModel, base: &[f64]) -> PropagationOutcome {
        self.propagate_with(graph, base, graph.node_count() >= PARALLEL_THRESHOLD)
    }

    /// Each wallet's relaxation is computed independently, so the parallel
    /// pass gives bit-identical results.
    fn propagate_with(&self, graph: &GraphModel, base: &[f64], parallel: bool) -> PropagationOutcome {
        let n = graph.node_count();
        let decay = self.config.decay;

        // Who pays into each wallet
        let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];
        for edge in graph.edges() {
            if edge.source != edge.target {
                incoming[edge.target].push(edge.source);
            }
        }

        let mut values = base.to_vec();
        values.resize(n, 0.0);
        let mut upstream: Vec<Option<usize>> = vec![None; n];
        let mut stats = PropagationStats {
            iterations: 0,
            converged: n == 0,
            last_delta: 0.0,
        };

        while !stats.converged && stats.iterations < self.config.max_iterations {
            let current = &values;
            let relax = |t: usize| -> (f64, Option<usize>) {
                let mut best = current[t];
                let mut from = None;
                for &s in &incoming[t] {
                    let candidate = current[s] * decay;
                    if candidate > best {
                        best = candidate;
                        from = Some(s);
                    }
                }
                (best, from)
            };

            let next: Vec<(f64, Option<usize>)> = if parallel {
                (0..n).into_par_iter().map(relax).collect()
            } else {
                (0..n).map(relax).collect()
            };

            let mut delta: f64 = 0.0;
            for (t, (value, from)) in next.into_iter().enumerate() {
                if from.is_some() {
                    delta = delta.max(value - values[t]);
                    values[t] = value;
                    upstream[t] = from;
                }
            }

            stats.iterations += 1;
            stats.last_delta = delta;
            stats.converged = delta <= self.config.epsilon;
        }

        debug!(
            "Propagation finished after {} iterations (converged: {}, last delta {:.2e})",
            stats.iterations, stats.converged, stats.last_delta
        );

        PropagationOutcome {
            values,
            upstream,
            stats,
        }
    }
}

/// Reason text for a value raised by an upstream wallet
pub(crate) fn inherited_reason(graph: &GraphModel, upstream: Option<usize>, value: f64) -> Option<String> {
    upstream.map(|s| {
        format!(
            "Inherited risk {:.3} from upstream wallet '{}'",
            value,
            graph.id_at(s)
        )
    })
}

impl RiskScorer for Propagation {
    fn name(&self) -> &'static str {
        "propagation"
    }

    fn score(&self, graph: &GraphModel, priors: &RiskPriors) -> IndexMap<String, RiskRecord> {
        let base: Vec<f64> = graph.node_ids().map(|id| priors.base_risk(id)).collect();
        let outcome = self.propagate(graph, &base);

        graph
            .node_ids()
            .enumerate()
            .map(|(i, id)| {
                let value = outcome.values[i];
                let mut reasons = priors.reasons(id).to_vec();
                if value > base[i] {
                    reasons.extend(inherited_reason(graph, outcome.upstream[i], value));
                }
                let record = RiskRecord {
                    node_id: id.to_string(),
                    value,
                    reasons,
                    base_value: Some(base[i]),
                    flagged: value > self.config.flag_threshold,
                };
                (id.to_string(), record)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EdgeSpec, GraphSource, NodeSpec};

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn default_scorer() -> Propagation {
        Propagation::new(PropagationConfig::default()).unwrap()
    }

    fn priors(values: &[(&str, f64)]) -> RiskPriors {
        RiskPriors::from_values(values.iter().map(|(id, v)| (id.to_string(), *v)))
    }

    #[test]
    fn test_chain_example() {
        let g = GraphModel::build(&GraphSource::from_ids(&["A", "B", "C"], &[("A", "B"), ("B", "C")])).unwrap();
        let records = default_scorer().score(&g, &priors(&[("A", 0.9)]));

        assert!(approx_eq(records["A"].value, 0.9));
        assert!(approx_eq(records["B"].value, 0.765));
        assert!(approx_eq(records["C"].value, 0.65025));
        assert_eq!(records["C"].base_value, Some(0.0));
        assert!(records["B"].flagged);
        assert!(records["C"].flagged);
        assert!(!records["A"].reasons.iter().any(|r| r.contains("upstream")));
        assert!(records["C"].reasons[0].contains("'B'"));
    }

    #[test]
    fn test_parallel_pass_matches_sequential() {
        let n = PARALLEL_THRESHOLD + 500;
        let nodes = (0..n).map(|i| NodeSpec::new(format!("w{i}"))).collect();
        let edges = (0..n)
            .flat_map(|i| {
                [
                    EdgeSpec::new(format!("w{i}"), format!("w{}", (i + 1) % n)),
                    EdgeSpec::new(format!("w{i}"), format!("w{}", (i * 7 + 3) % n)),
                ]
            })
            .collect();
        let g = GraphModel::build(&GraphSource::new(nodes, edges)).unwrap();
        let base: Vec<f64> = (0..n).map(|i| ((i * 37) % 101) as f64 / 100.0).collect();

        let scorer = default_scorer();
        let sequential = scorer.propagate_with(&g, &base, false);
        let parallel = scorer.propagate_with(&g, &base, true);
        assert_eq!(sequential, parallel);
        assert!(sequential.stats.iterations > 1);
        // Large graphs take the parallel path by default
        assert_eq!(scorer.propagate(&g, &base), parallel);
    }

    #[test]
    fn test_higher_base_wins() {
        let g = GraphModel::build(&GraphSource::from_ids(&["A", "B"], &[("A", "B")])).unwrap();
        let records = default_scorer().score(&g, &priors(&[("A", 0.5), ("B", 0.8)]));
        assert!(approx_eq(records["B"].value, 0.8));
        assert!(records["B"].reasons.is_empty());
    }

    #[test]
    fn test_monotone_over_base() {
        let g = GraphModel::build(&GraphSource::from_ids(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("c", "b"), ("b", "d"), ("d", "a")],
        ))
        .unwrap();
        let p = priors(&[("a", 0.3), ("b", 0.1), ("c", 0.95), ("d", 0.2)]);
        let records = default_scorer().score(&g, &p);
        for id in g.node_ids() {
            assert!(records[id].value >= p.base_risk(id));
        }
    }

    #[test]
    fn test_order_invariant() {
        let ids = ["a", "b", "c", "d", "e"];
        let edges = [("a", "b"), ("b", "c"), ("d", "c"), ("c", "e"), ("e", "b")];
        let mut reversed = edges;
        reversed.reverse();

        let p = priors(&[("a", 0.7), ("d", 0.9), ("e", 0.1)]);
        let g1 = GraphModel::build(&GraphSource::from_ids(&ids, &edges)).unwrap();
        let g2 = GraphModel::build(&GraphSource::from_ids(&ids, &reversed)).unwrap();
        let r1 = default_scorer().score(&g1, &p);
        let r2 = default_scorer().score(&g2, &p);
        for id in ids {
            assert!(approx_eq(r1[id].value, r2[id].value), "{id} differs");
        }
    }

    #[test]
    fn test_cycle_terminates() {
        let g = GraphModel::build(&GraphSource::from_ids(
            &["a", "b", "c"],
            &[("a", "b"), ("b", "c"), ("c", "a"), ("a", "a")],
        ))
        .unwrap();
        let base = [0.9, 0.0, 0.0];
        let outcome = default_scorer().propagate(&g, &base);
        assert!(outcome.stats.converged);
        assert!(outcome.stats.iterations <= 100);
        assert!(approx_eq(outcome.values[0], 0.9));
        assert!(approx_eq(outcome.values[2], 0.9 * 0.85 * 0.85));
    }

    #[test]
    fn test_iteration_cap() {
        let g = GraphModel::build(&GraphSource::from_ids(&["A", "B", "C"], &[("A", "B"), ("B", "C")])).unwrap();
        let scorer = Propagation::new(PropagationConfig {
            max_iterations: 1,
            ..Default::default()
        })
        .unwrap();
        let outcome = scorer.propagate(&g, &[0.9, 0.0, 0.0]);
        assert_eq!(outcome.stats.iterations, 1);
        assert!(!outcome.stats.converged);
        assert!(approx_eq(outcome.values[1], 0.765));
        assert_eq!(outcome.values[2], 0.0);
    }

    #[test]
    fn test_chain_converges_in_depth_plus_one() {
        let g = GraphModel::build(&GraphSource::from_ids(&["A", "B", "C"], &[("A", "B"), ("B", "C")])).unwrap();
        let outcome = default_scorer().propagate(&g, &[0.9, 0.0, 0.0]);
        assert_eq!(outcome.stats.iterations, 3);
        assert_eq!(outcome.upstream, vec![None, Some(0), Some(1)]);
    }

    #[test]
    fn test_decay_one_copies_risk() {
        let g = GraphModel::build(&GraphSource::from_ids(&["A", "B"], &[("A", "B")])).unwrap();
        let scorer = Propagation::new(PropagationConfig {
            decay: 1.0,
            ..Default::default()
        })
        .unwrap();
        let outcome = scorer.propagate(&g, &[0.4, 0.0]);
        assert_eq!(outcome.values, vec![0.4, 0.4]);
    }

    #[test]
    fn test_empty_graph() {
        let outcome = default_scorer().propagate(&GraphModel::empty(), &[]);
        assert!(outcome.values.is_empty());
        assert!(outcome.stats.converged);
        assert_eq!(outcome.stats.iterations, 0);
    }

    #[test]
    fn test_invalid_config() {
        for decay in [0.0, -0.5, 1.01, f64::NAN] {
            let config = PropagationConfig {
                decay,
                ..Default::default()
            };
            assert!(matches!(Propagation::new(config), Err(ConfigError::InvalidDecay(_))));
        }
        let zero_cap = PropagationConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(zero_cap.validate().is_err());
        let negative_flag = PropagationConfig {
            flag_threshold: -0.1,
            ..Default::default()
        };
        assert!(matches!(
            negative_flag.validate(),
            Err(ConfigError::NegativeThreshold { .. })
        ));
    }
}
