//! Layout simulator parameters (`[layout]` in graphguard.toml)

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Alpha falls from 1 to `alpha_min` in this many ticks
const DEFAULT_SETTLE_TICKS: f64 = 300.0;
const DEFAULT_ALPHA_MIN: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParams {
    /// Viewport size; the default center is its midpoint
    pub width: f64,
    pub height: f64,
    /// Explicit center point, overriding the viewport midpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center_y: Option<f64>,
    /// Rest length of every link
    pub link_distance: f64,
    /// Pairwise repulsion magnitude
    pub repulsion: f64,
    /// Fraction of the centroid offset removed each tick
    pub center_strength: f64,
    pub alpha_min: f64,
    pub alpha_decay: f64,
    /// Alpha target while any wallet is pinned
    pub pin_alpha_target: f64,
    /// Friction: share of velocity lost each tick
    pub velocity_decay: f64,
    /// Seed for separating wallets that start on the same spot
    pub seed: u64,
    /// Wallet count from which repulsion runs on the rayon pool
    pub parallel_threshold: usize,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            width: 960.0,
            height: 600.0,
            center_x: None,
            center_y: None,
            link_distance: 140.0,
            repulsion: 420.0,
            center_strength: 0.1,
            alpha_min: DEFAULT_ALPHA_MIN,
            alpha_decay: 1.0 - DEFAULT_ALPHA_MIN.powf(1.0 / DEFAULT_SETTLE_TICKS),
            pin_alpha_target: 0.3,
            velocity_decay: 0.4,
            seed: 42,
            parallel_threshold: 256,
        }
    }
}

impl LayoutParams {
    /// Point the centroid is pulled toward
    pub fn center(&self) -> (f64, f64) {
        (
            self.center_x.unwrap_or(self.width / 2.0),
            self.center_y.unwrap_or(self.height / 2.0),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("layout.width", self.width), ("layout.height", self.height)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidParameter(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        for (name, value) in [
            ("layout.link_distance", self.link_distance),
            ("layout.repulsion", self.repulsion),
        ] {
            if value < 0.0 {
                return Err(ConfigError::NegativeThreshold { name, value });
            }
            if !value.is_finite() {
                return Err(ConfigError::InvalidParameter(format!("{} must be finite", name)));
            }
        }
        for (name, value) in [("layout.center_x", self.center_x), ("layout.center_y", self.center_y)] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(ConfigError::InvalidParameter(format!("{} must be finite", name)));
            }
        }
        ConfigError::check_range("layout.center_strength", self.center_strength, 0.0, 1.0)?;
        ConfigError::check_range("layout.pin_alpha_target", self.pin_alpha_target, 0.0, 1.0)?;
        ConfigError::check_range("layout.velocity_decay", self.velocity_decay, 0.0, 1.0)?;

        if !(self.alpha_min > 0.0 && self.alpha_min < 1.0) {
            return Err(ConfigError::InvalidParameter(format!(
                "layout.alpha_min must be in (0, 1), got {}",
                self.alpha_min
            )));
        }
        if !(self.alpha_decay > 0.0 && self.alpha_decay <= 1.0) {
            return Err(ConfigError::InvalidDecay(self.alpha_decay));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = LayoutParams::default();
        assert_eq!(params.center(), (480.0, 300.0));
        assert!((params.alpha_decay - 0.0228).abs() < 1e-4);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_explicit_center() {
        let params = LayoutParams {
            center_x: Some(0.0),
            center_y: Some(0.0),
            ..Default::default()
        };
        assert_eq!(params.center(), (0.0, 0.0));
    }

    #[test]
    fn test_validate() {
        let negative = LayoutParams {
            repulsion: -1.0,
            ..Default::default()
        };
        assert!(matches!(negative.validate(), Err(ConfigError::NegativeThreshold { .. })));

        let no_decay = LayoutParams {
            alpha_decay: 0.0,
            ..Default::default()
        };
        assert_eq!(no_decay.validate(), Err(ConfigError::InvalidDecay(0.0)));

        let flat = LayoutParams {
            height: 0.0,
            ..Default::default()
        };
        assert!(flat.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let params: LayoutParams = toml::from_str("link_distance = 80.0\nseed = 7").unwrap();
        assert_eq!(params.link_distance, 80.0);
        assert_eq!(params.seed, 7);
        assert_eq!(params.repulsion, 420.0);
    }
}
