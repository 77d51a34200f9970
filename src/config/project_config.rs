//! Project-level configuration support
//!
//! Loads configuration from `graphguard.toml` or `.graphguardrc.json` in the
//! working directory, or from an explicit path.
//!
//! # Configuration Format
//!
//! ```toml
//! # graphguard.toml
//!
//! [risk]
//! mode = "propagation"
//!
//! [risk.rule]
//! fan_out_threshold = 2
//! fan_in_threshold = 2
//! risk_threshold = 0.6
//!
//! [risk.propagation]
//! decay = 0.85
//! max_iterations = 100
//!
//! [layout]
//! link_distance = 140.0
//! repulsion = 420.0
//!
//! [patterns]
//! peel_ratio = 0.8
//!
//! [defaults]
//! format = "text"
//! top = 20
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::ConfigError;
use crate::graph::PatternThresholds;
use crate::layout::LayoutParams;
use crate::scoring::RiskConfig;

/// File names searched by [`load_project_config`], in order
pub const CONFIG_FILE_NAMES: [&str; 2] = ["graphguard.toml", ".graphguardrc.json"];

/// Complete project configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub risk: RiskConfig,
    pub layout: LayoutParams,
    pub patterns: PatternThresholds,
    pub defaults: CliDefaults,
}

/// Defaults for CLI flags the user did not pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliDefaults {
    /// Output format for `analyze` (text, json)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Rows shown by `analyze` in text mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<usize>,

    /// Tick cap for `layout`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ticks: Option<usize>,
}

impl ProjectConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk.validate()?;
        self.layout.validate()?;
        self.patterns.validate()
    }
}

/// Load project configuration from `dir`.
///
/// Falls back to defaults when no file exists or the file found cannot be
/// parsed; the latter is logged.
pub fn load_project_config(dir: &Path) -> ProjectConfig {
    for name in CONFIG_FILE_NAMES {
        let path = dir.join(name);
        if !path.exists() {
            continue;
        }
        match load_config_file(&path) {
            Ok(config) => {
                debug!("Loaded project config from {}", path.display());
                return config;
            }
            Err(e) => {
                warn!("Failed to load {}: {:#}", path.display(), e);
            }
        }
    }

    debug!("No project config found, using defaults");
    ProjectConfig::default()
}

/// Load and validate one config file; the format follows the extension.
pub fn load_config_file(path: &Path) -> anyhow::Result<ProjectConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let config: ProjectConfig = if is_json {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))?
    } else {
        toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))?
    };

    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

/// Commented template written by `graphguard init`
pub fn config_template() -> String {
    let defaults = ProjectConfig::default();
    format!(
        r#"# graphguard configuration

[risk]
# rule | propagation | blended
mode = "{mode}"

[risk.rule]
fan_out_threshold = {fan_out}
fan_in_threshold = {fan_in}
risk_threshold = {risk_threshold}

[risk.propagation]
decay = {decay}
max_iterations = {max_iterations}
epsilon = {epsilon:e}
flag_threshold = {flag_threshold}

[risk.blended]
alpha = {alpha}

[layout]
width = {width:.1}
height = {height:.1}
link_distance = {link_distance:.1}
repulsion = {repulsion:.1}
center_strength = {center_strength}
velocity_decay = {velocity_decay}
seed = {seed}

[patterns]
peel_ratio = {peel_ratio}
convergence_max_hops = {max_hops}

[defaults]
format = "text"
top = 20
"#,
        mode = defaults.risk.mode,
        fan_out = defaults.risk.rule.fan_out_threshold,
        fan_in = defaults.risk.rule.fan_in_threshold,
        risk_threshold = defaults.risk.rule.risk_threshold,
        decay = defaults.risk.propagation.decay,
        max_iterations = defaults.risk.propagation.max_iterations,
        epsilon = defaults.risk.propagation.epsilon,
        flag_threshold = defaults.risk.propagation.flag_threshold,
        alpha = defaults.risk.blended.alpha,
        width = defaults.layout.width,
        height = defaults.layout.height,
        link_distance = defaults.layout.link_distance,
        repulsion = defaults.layout.repulsion,
        center_strength = defaults.layout.center_strength,
        velocity_decay = defaults.layout.velocity_decay,
        seed = defaults.layout.seed,
        peel_ratio = defaults.patterns.peel_ratio,
        max_hops = defaults.patterns.convergence_max_hops,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::RiskMode;

    #[test]
    fn test_template_parses_to_defaults() {
        let parsed: ProjectConfig = toml::from_str(&config_template()).unwrap();
        let defaults = ProjectConfig::default();
        assert_eq!(parsed.risk, defaults.risk);
        assert_eq!(parsed.layout, defaults.layout);
        assert_eq!(parsed.patterns, defaults.patterns);
        assert_eq!(parsed.defaults.top, Some(20));
    }

    #[test]
    fn test_missing_dir_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_project_config(dir.path()), ProjectConfig::default());
    }

    #[test]
    fn test_toml_preferred_over_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("graphguard.toml"), "[risk]\nmode = \"blended\"\n").unwrap();
        std::fs::write(
            dir.path().join(".graphguardrc.json"),
            r#"{"risk": {"mode": "propagation"}}"#,
        )
        .unwrap();
        assert_eq!(load_project_config(dir.path()).risk.mode, RiskMode::Blended);
    }

    #[test]
    fn test_broken_toml_falls_back_to_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("graphguard.toml"), "[risk\nmode =").unwrap();
        std::fs::write(
            dir.path().join(".graphguardrc.json"),
            r#"{"risk": {"mode": "propagation", "propagation": {"decay": 0.5}}}"#,
        )
        .unwrap();
        let config = load_project_config(dir.path());
        assert_eq!(config.risk.mode, RiskMode::Propagation);
        assert_eq!(config.risk.propagation.decay, 0.5);
    }

    #[test]
    fn test_explicit_file_must_be_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[risk.propagation]\ndecay = 1.5\n").unwrap();
        let err = load_config_file(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("decay must be in (0, 1]"));

        assert!(load_config_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("graphguard.toml"), "[risk.rule]\nfan_in_threshold = -3\n").unwrap();
        assert_eq!(load_project_config(dir.path()), ProjectConfig::default());
    }
}
