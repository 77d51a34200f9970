//! Error types for the risk graph engine
//!
//! All engine operations return `Result<T, _>` with one of these enums
//! instead of silently dropping bad input. Missing optional data (priors,
//! reasons, transfer amounts) is never an error; defaults are applied.

use thiserror::Error;

/// Which end of an edge failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeEnd {
    Source,
    Target,
}

impl std::fmt::Display for EdgeEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeEnd::Source => write!(f, "source"),
            EdgeEnd::Target => write!(f, "target"),
        }
    }
}

/// The supplied graph cannot be analyzed as-is.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructuralError {
    #[error("edge #{edge} references unknown {role} node '{node_id}'")]
    UnknownNode {
        edge: usize,
        role: EdgeEnd,
        node_id: String,
    },

    #[error("node id '{0}' appears more than once")]
    DuplicateNode(String),

    #[error("node #{position} has an empty id")]
    EmptyNodeId { position: usize },
}

/// Invalid scorer, layout or detector parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("decay must be in (0, 1], got {0}")]
    InvalidDecay(f64),

    #[error("{name} must be non-negative, got {value}")]
    NegativeThreshold { name: &'static str, value: f64 },

    #[error("{name} must be in [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unknown risk mode '{0}' (expected rule, propagation or blended)")]
    UnknownMode(String),
}

impl ConfigError {
    /// Check that `value` is finite and within `[min, max]`.
    pub(crate) fn check_range(
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    ) -> Result<(), ConfigError> {
        if value.is_finite() && (min..=max).contains(&value) {
            Ok(())
        } else {
            Err(ConfigError::OutOfRange {
                name,
                value,
                min,
                max,
            })
        }
    }
}

/// Errors surfaced by [`crate::engine::GraphEngine`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("node '{0}' is not part of the attached graph")]
    UnknownNode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_node_message() {
        let err = StructuralError::UnknownNode {
            edge: 3,
            role: EdgeEnd::Target,
            node_id: "ghost".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "edge #3 references unknown target node 'ghost'"
        );
    }

    #[test]
    fn test_check_range() {
        assert!(ConfigError::check_range("alpha", 0.5, 0.0, 1.0).is_ok());
        assert!(ConfigError::check_range("alpha", 1.5, 0.0, 1.0).is_err());
        assert!(ConfigError::check_range("alpha", f64::NAN, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_engine_error_wraps_structural() {
        let err: EngineError = StructuralError::DuplicateNode("a".into()).into();
        assert!(matches!(err, EngineError::Structural(_)));
        assert_eq!(err.to_string(), "node id 'a' appears more than once");
    }
}
