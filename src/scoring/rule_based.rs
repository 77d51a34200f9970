//! Threshold rules over a single wallet's own counters

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{RiskPriors, RiskScorer};
use crate::errors::ConfigError;
use crate::graph::GraphModel;
use crate::models::RiskRecord;

/// `[risk.rule]` thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    pub fan_out_threshold: i64,
    pub fan_in_threshold: i64,
    /// A wallet must score strictly above this to be flagged
    pub risk_threshold: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            fan_out_threshold: 2,
            fan_in_threshold: 2,
            risk_threshold: 0.6,
        }
    }
}

impl RuleThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("rule.fan_out_threshold", self.fan_out_threshold),
            ("rule.fan_in_threshold", self.fan_in_threshold),
        ] {
            if value < 0 {
                return Err(ConfigError::NegativeThreshold {
                    name,
                    value: value as f64,
                });
            }
        }
        if self.risk_threshold < 0.0 {
            return Err(ConfigError::NegativeThreshold {
                name: "rule.risk_threshold",
                value: self.risk_threshold,
            });
        }
        ConfigError::check_range("rule.risk_threshold", self.risk_threshold, 0.0, 1.0)
    }

    /// The anomaly rule: a high-risk wallet that also fans out or fans in.
    pub fn is_anomalous(&self, value: f64, fan_in: usize, fan_out: usize) -> bool {
        let risky = value > self.risk_threshold;
        let fans_out = fan_out as i64 >= self.fan_out_threshold;
        let fans_in = fan_in as i64 >= self.fan_in_threshold;
        (fans_out && risky) || (fans_in && risky)
    }
}

/// Myopic scorer: each wallet is judged only on its prior and its own degree.
#[derive(Debug, Clone)]
pub struct RuleBased {
    thresholds: RuleThresholds,
}

impl RuleBased {
    pub fn new(thresholds: RuleThresholds) -> Result<Self, ConfigError> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &RuleThresholds {
        &self.thresholds
    }

    fn reasons(&self, fan_in: usize, fan_out: usize) -> Vec<String> {
        let mut reasons = Vec::new();
        if fan_out as i64 >= self.thresholds.fan_out_threshold {
            reasons.push(format!("Fan-out of {} meets threshold {}", fan_out, self.thresholds.fan_out_threshold));
        }
        if fan_in as i64 >= self.thresholds.fan_in_threshold {
            reasons.push(format!("Fan-in of {} meets threshold {}", fan_in, self.thresholds.fan_in_threshold));
        }
        reasons
    }
}

impl RiskScorer for RuleBased {
    fn name(&self) -> &'static str {
        "rule"
    }

    fn score(&self, graph: &GraphModel, priors: &RiskPriors) -> IndexMap<String, RiskRecord> {
        let mut records = IndexMap::with_capacity(graph.node_count());

        for (i, id) in graph.node_ids().enumerate() {
            let value = priors.base_risk(id);
            let (fan_in, fan_out) = (graph.fan_in_at(i), graph.fan_out_at(i));
            let flagged = self.thresholds.is_anomalous(value, fan_in, fan_out);

            let mut reasons = priors.reasons(id).to_vec();
            if flagged {
                reasons.extend(self.reasons(fan_in, fan_out));
            }

            records.insert(
                id.to_string(),
                RiskRecord {
                    node_id: id.to_string(),
                    value,
                    reasons,
                    base_value: Some(value),
                    flagged,
                },
            );
        }

        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GraphSource;

    fn priors(values: &[(&str, f64)]) -> RiskPriors {
        RiskPriors::from_values(values.iter().map(|(id, v)| (id.to_string(), *v)))
    }

    #[test]
    fn test_fan_out_gate() {
        // D pays three wallets, E pays one
        let g = GraphModel::build(&GraphSource::from_ids(
            &["D", "x", "y", "z", "E", "w"],
            &[("D", "x"), ("D", "y"), ("D", "z"), ("E", "w")],
        ))
        .unwrap();
        let scorer = RuleBased::new(RuleThresholds::default()).unwrap();
        let records = scorer.score(&g, &priors(&[("D", 0.7), ("E", 0.9)]));

        assert!(records["D"].flagged);
        assert!(!records["E"].flagged);
        assert_eq!(records["E"].value, 0.9);
        assert!(records["D"].reasons.iter().any(|r| r.contains("Fan-out of 3")));
    }

    #[test]
    fn test_risk_threshold_is_strict() {
        let t = RuleThresholds::default();
        assert!(!t.is_anomalous(0.6, 0, 5));
        assert!(t.is_anomalous(0.61, 0, 5));
        assert!(t.is_anomalous(0.61, 2, 0));
        assert!(!t.is_anomalous(0.99, 1, 1));
    }

    #[test]
    fn test_no_cross_node_influence() {
        // Same counters and prior for "b" whatever its neighbours score
        let g = GraphModel::build(&GraphSource::from_ids(
            &["a", "b", "c"],
            &[("a", "b"), ("c", "b")],
        ))
        .unwrap();
        let scorer = RuleBased::new(RuleThresholds::default()).unwrap();
        let low = scorer.score(&g, &priors(&[("a", 0.0), ("b", 0.7), ("c", 0.0)]));
        let high = scorer.score(&g, &priors(&[("a", 1.0), ("b", 0.7), ("c", 1.0)]));
        assert_eq!(low["b"], high["b"]);
        assert!(low["b"].flagged);
    }

    #[test]
    fn test_missing_prior_defaults_to_zero() {
        let g = GraphModel::build(&GraphSource::from_ids(&["a"], &[])).unwrap();
        let scorer = RuleBased::new(RuleThresholds::default()).unwrap();
        let records = scorer.score(&g, &RiskPriors::default());
        assert_eq!(records["a"].value, 0.0);
        assert!(!records["a"].flagged);
    }

    #[test]
    fn test_validate() {
        let negative = RuleThresholds {
            fan_in_threshold: -1,
            ..Default::default()
        };
        assert_eq!(
            RuleBased::new(negative).unwrap_err(),
            ConfigError::NegativeThreshold {
                name: "rule.fan_in_threshold",
                value: -1.0
            }
        );

        let too_high = RuleThresholds {
            risk_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(too_high.validate(), Err(ConfigError::OutOfRange { .. })));
    }
}
