//! Layout command - run the force simulation and print a snapshot

use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use graphguard::config::ProjectConfig;
use graphguard::{EngineConfig, GraphEngine, RiskPriors};

use super::PinArg;

/// Upper bound on ticks when running until settled
const DEFAULT_MAX_TICKS: usize = 10_000;

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░  ")
}

/// Ticks needed for alpha to fall from its current value below `alpha_min`
fn expected_ticks(alpha: f64, alpha_min: f64, alpha_decay: f64) -> u64 {
    if alpha < alpha_min || alpha_decay >= 1.0 {
        return 1;
    }
    ((alpha_min / alpha).ln() / (1.0 - alpha_decay).ln()).ceil().max(1.0) as u64
}

pub fn run(
    graph_path: &Path,
    priors_path: Option<&Path>,
    ticks: Option<usize>,
    pins: &[PinArg],
    quiet: bool,
    output: Option<&Path>,
    config: &ProjectConfig,
) -> Result<()> {
    let source = super::read_graph(graph_path)?;
    let priors = match priors_path {
        Some(path) => super::read_priors(path)?,
        None => RiskPriors::default(),
    };

    let mut engine = GraphEngine::new(EngineConfig::from(config))?;
    engine
        .attach(&source, priors)
        .with_context(|| format!("Cannot attach graph from {}", graph_path.display()))?;

    for pin in pins {
        engine
            .pin(&pin.id, pin.x, pin.y)
            .with_context(|| format!("Cannot pin '{}'", pin.id))?;
    }

    let max_ticks = config.defaults.max_ticks.unwrap_or(DEFAULT_MAX_TICKS);
    let (limit, until_settled) = match ticks {
        Some(n) => (n, false),
        None => (max_ticks, true),
    };
    if until_settled && !pins.is_empty() {
        warn!("Pinned wallets keep the layout warm; running the full {} ticks", limit);
    }

    let total = if until_settled && pins.is_empty() {
        let params = &config.layout;
        expected_ticks(engine.snapshot().alpha, params.alpha_min, params.alpha_decay).min(limit as u64)
    } else {
        limit as u64
    };
    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total)
    };
    bar.set_style(bar_style());
    bar.set_message("simulating");

    let mut ran = 0;
    while ran < limit {
        if until_settled && engine.is_settled() {
            break;
        }
        engine.tick();
        ran += 1;
        bar.inc(1);
    }
    bar.finish_and_clear();

    let snapshot = engine.snapshot();
    info!(
        "Layout ran {} ticks (alpha {:.4}, settled: {})",
        ran, snapshot.alpha, snapshot.settled
    );
    if until_settled && !snapshot.settled && pins.is_empty() {
        warn!("Layout did not settle within {} ticks", limit);
    }

    let content = serde_json::to_string_pretty(&snapshot)?;
    super::write_output(output, &content)
}
