//! Configuration module for GraphGuard
//!
//! This module handles:
//! - Project-level configuration (graphguard.toml)
//! - Scorer, layout and pattern detector parameters
//! - CLI defaults

mod project_config;

pub use project_config::{
    config_template, load_config_file, load_project_config, CliDefaults, ProjectConfig,
    CONFIG_FILE_NAMES,
};
