//! CLI command definitions and handlers

mod analyze;
mod init;
mod layout;
mod stats;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use graphguard::config::{load_config_file, load_project_config, ProjectConfig};
use graphguard::{GraphSource, RiskPriors};

/// A `--pin id:x:y` argument
#[derive(Debug, Clone, PartialEq)]
pub struct PinArg {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// Parse `id:x:y`. The id may itself contain colons.
fn parse_pin(s: &str) -> Result<PinArg, String> {
    let mut parts = s.rsplitn(3, ':');
    let (Some(y), Some(x), Some(id)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("'{}' is not in id:x:y form", s));
    };
    if id.is_empty() {
        return Err("pin id must not be empty".to_string());
    }
    let coord = |v: &str| -> Result<f64, String> {
        v.trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .ok_or_else(|| format!("'{}' is not a valid coordinate", v))
    };
    Ok(PinArg {
        id: id.to_string(),
        x: coord(x)?,
        y: coord(y)?,
    })
}

/// GraphGuard - transaction risk graph analysis
#[derive(Parser, Debug)]
#[command(name = "graphguard")]
#[command(
    version,
    about = "Score wallets for money-laundering risk and lay transaction graphs out for inspection",
    after_help = "\
Examples:
  graphguard init                                     Write a graphguard.toml template
  graphguard stats graph.json                         Graph size and busiest wallets
  graphguard analyze graph.json --derive-priors       Rule-based risk from graph structure
  graphguard analyze graph.json --priors priors.json --mode propagation --format json
  graphguard layout graph.json --pin 0xabc:100:200    Settled positions as JSON"
)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Config file (default: graphguard.toml or .graphguardrc.json in the current directory)
    #[arg(long, global = true, env = "GRAPHGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a graphguard.toml with every default spelled out
    Init {
        /// Directory to write into
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing graphguard.toml
        #[arg(long)]
        force: bool,
    },

    /// Print graph size, isolated wallets and the busiest wallets
    Stats {
        /// Graph file: {"nodes": [{"id"}], "edges": [{"source", "target"}]}
        graph: PathBuf,

        /// Wallets listed per ranking
        #[arg(long, default_value = "5")]
        top: usize,

        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Score every wallet and report the riskiest
    #[command(after_help = "\
Examples:
  graphguard analyze graph.json --derive-priors
  graphguard analyze graph.json --priors priors.json --mode propagation
  graphguard analyze graph.json --derive-priors --mode blended --format json -o report.json")]
    Analyze {
        graph: PathBuf,

        /// Priors file: {"wallets": [{"id", "baseRisk", "reasons"?}]}
        #[arg(long, conflicts_with = "derive_priors")]
        priors: Option<PathBuf>,

        /// Derive priors from graph structure and detected patterns
        #[arg(long)]
        derive_priors: bool,

        /// Risk mode: rule, propagation, blended (default: from config)
        #[arg(long, short = 'm', value_parser = ["rule", "propagation", "blended"])]
        mode: Option<String>,

        /// Output format: text, json (default: from config, else text)
        #[arg(long, short = 'f', value_parser = ["text", "json"])]
        format: Option<String>,

        /// Rows shown in text output (default: from config, else 20)
        #[arg(long)]
        top: Option<usize>,

        /// Only report flagged wallets
        #[arg(long)]
        flagged_only: bool,

        /// Output file path (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Run the layout simulation and print a JSON snapshot
    Layout {
        graph: PathBuf,

        /// Priors file, so the snapshot carries risk records
        #[arg(long)]
        priors: Option<PathBuf>,

        /// Run exactly this many ticks (default: until settled)
        #[arg(long)]
        ticks: Option<usize>,

        /// Pin a wallet before ticking, as id:x:y (repeatable)
        #[arg(long, value_parser = parse_pin)]
        pin: Vec<PinArg>,

        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,

        /// Output file path (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { path, force } => init::run(&path, force),

        Commands::Stats { graph, top, format } => {
            let config = load_config(cli.config.as_deref())?;
            stats::run(&graph, &config, top, &format)
        }

        Commands::Analyze {
            graph,
            priors,
            derive_priors,
            mode,
            format,
            top,
            flagged_only,
            output,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let source = if derive_priors {
                analyze::PriorSource::Derived
            } else if let Some(path) = priors {
                analyze::PriorSource::File(path)
            } else {
                analyze::PriorSource::None
            };
            analyze::run(analyze::AnalyzeOptions {
                graph_path: graph,
                priors: source,
                mode,
                format,
                top,
                flagged_only,
                output,
                config,
            })
        }

        Commands::Layout {
            graph,
            priors,
            ticks,
            pin,
            quiet,
            output,
        } => {
            let config = load_config(cli.config.as_deref())?;
            layout::run(&graph, priors.as_deref(), ticks, &pin, quiet, output.as_deref(), &config)
        }
    }
}

/// Explicit `--config` must load; auto-discovery falls back to defaults.
fn load_config(explicit: Option<&Path>) -> Result<ProjectConfig> {
    match explicit {
        Some(path) => load_config_file(path),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            let config = load_project_config(&cwd);
            config
                .validate()
                .context("Invalid project configuration")?;
            Ok(config)
        }
    }
}

pub(crate) fn read_graph(path: &Path) -> Result<GraphSource> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read graph {}", path.display()))?;
    let source: GraphSource = serde_json::from_str(&content)
        .with_context(|| format!("Invalid graph JSON in {}", path.display()))?;
    debug!(
        "Read {} nodes and {} edges from {}",
        source.nodes.len(),
        source.edges.len(),
        path.display()
    );
    Ok(source)
}

pub(crate) fn read_priors(path: &Path) -> Result<RiskPriors> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read priors {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid priors JSON in {}", path.display()))
}

/// Write to `output`, or stdout when none is given
pub(crate) fn write_output(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Report written to {}", path.display());
            Ok(())
        }
        None => {
            println!("{}", content);
            Ok(())
        }
    }
}
