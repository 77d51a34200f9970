//! Analyze command - score every wallet and report the riskiest

use std::path::PathBuf;

use anyhow::{Context, Result};
use console::style;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{info, warn};

use graphguard::config::ProjectConfig;
use graphguard::graph::{annotate_edges, detect_patterns, GraphSummary, NodePatterns};
use graphguard::scoring::derive_priors;
use graphguard::{EngineConfig, GraphEngine, GraphModel, RiskBand, RiskMode, RiskPriors, RiskRecord};

/// Where wallet priors come from
#[derive(Debug, Clone)]
pub enum PriorSource {
    File(PathBuf),
    Derived,
    None,
}

#[derive(Debug)]
pub struct AnalyzeOptions {
    pub graph_path: PathBuf,
    pub priors: PriorSource,
    pub mode: Option<String>,
    pub format: Option<String>,
    pub top: Option<usize>,
    pub flagged_only: bool,
    pub output: Option<PathBuf>,
    pub config: ProjectConfig,
}

#[derive(Debug, Serialize)]
struct RecordRow<'a> {
    #[serde(flatten)]
    record: &'a RiskRecord,
    band: RiskBand,
    fan_in: usize,
    fan_out: usize,
}

#[derive(Debug, Serialize)]
struct AnalyzeReport<'a> {
    mode: RiskMode,
    summary: GraphSummary,
    flagged: usize,
    edges_tagged: usize,
    records: Vec<RecordRow<'a>>,
    /// Detector output for wallets where at least one pattern fired
    patterns: IndexMap<&'a str, &'a NodePatterns>,
}

pub fn run(options: AnalyzeOptions) -> Result<()> {
    let AnalyzeOptions {
        graph_path,
        priors,
        mode,
        format,
        top,
        flagged_only,
        output,
        config,
    } = options;

    let mode: RiskMode = match mode {
        Some(m) => m.parse()?,
        None => config.risk.mode,
    };
    let format = format
        .or_else(|| config.defaults.format.clone())
        .unwrap_or_else(|| "text".to_string());
    let top = top.or(config.defaults.top).unwrap_or(20);

    let source = super::read_graph(&graph_path)?;
    let mut graph = GraphModel::build(&source)
        .with_context(|| format!("Cannot build graph from {}", graph_path.display()))?;

    let patterns = detect_patterns(&graph, &config.patterns);
    let edges_tagged = annotate_edges(&mut graph, &patterns);

    let priors = match &priors {
        PriorSource::File(path) => super::read_priors(path)?,
        PriorSource::Derived => derive_priors(&graph, &patterns),
        PriorSource::None => {
            warn!("No priors given (--priors or --derive-priors); every wallet starts at 0");
            RiskPriors::default()
        }
    };

    let mut engine_config = EngineConfig::from(&config);
    engine_config.risk.mode = mode;
    let mut engine = GraphEngine::new(engine_config)?;
    engine.attach_model(graph, priors)?;

    let graph = engine.model();
    let mut rows: Vec<RecordRow> = engine
        .risk_records()
        .values()
        .filter(|r| !flagged_only || r.flagged)
        .map(|record| RecordRow {
            record,
            band: record.band(),
            fan_in: graph.fan_in_of(&record.node_id),
            fan_out: graph.fan_out_of(&record.node_id),
        })
        .collect();
    // Riskiest first; ties keep insertion order
    rows.sort_by(|a, b| b.record.value.total_cmp(&a.record.value));

    let flagged = engine.risk_records().values().filter(|r| r.flagged).count();
    info!("{} of {} wallets flagged", flagged, graph.node_count());

    let involved: IndexMap<&str, &NodePatterns> = patterns
        .involved()
        .filter_map(|i| patterns.get(i).map(|p| (graph.id_at(i), p)))
        .collect();

    let report = AnalyzeReport {
        mode,
        summary: graph.summary(),
        flagged,
        edges_tagged,
        records: rows,
        patterns: involved,
    };

    let content = match format.as_str() {
        "json" => serde_json::to_string_pretty(&report)?,
        _ => format_text(&report, top),
    };
    super::write_output(output.as_deref(), &content)
}

fn band_label(band: RiskBand) -> String {
    let label = format!("{:<6}", band.to_string());
    match band {
        RiskBand::High => style(label).red().bold().to_string(),
        RiskBand::Medium => style(label).yellow().to_string(),
        RiskBand::Low => style(label).cyan().to_string(),
        RiskBand::Normal => style(label).dim().to_string(),
    }
}

fn format_text(report: &AnalyzeReport, top: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n{} Risk analysis ({} mode)\n\n",
        style("🔎").bold(),
        style(report.mode).cyan()
    ));
    out.push_str(&format!(
        "  {} wallets, {} transfers, {} flagged, {} wallets with patterns\n\n",
        report.summary.num_nodes,
        report.summary.num_edges,
        style(report.flagged).yellow(),
        report.patterns.len()
    ));

    out.push_str(&format!(
        "  {:<42} {:>6} {:>7} {:<6} {:>4} {:>4}  {}\n",
        "WALLET", "RISK", "DELTA", "BAND", "IN", "OUT", "REASON"
    ));
    for row in report.records.iter().take(top) {
        let record = row.record;
        let delta = record
            .delta()
            .map(|d| format!("{:+.3}", d))
            .unwrap_or_else(|| "-".to_string());
        let flag = if record.flagged { "⚠ " } else { "" };
        out.push_str(&format!(
            "  {:<42} {:>6.3} {:>7} {} {:>4} {:>4}  {}{}\n",
            record.node_id,
            record.value,
            delta,
            band_label(row.band),
            row.fan_in,
            row.fan_out,
            flag,
            record.reasons.first().map(String::as_str).unwrap_or("")
        ));
    }
    if report.records.len() > top {
        out.push_str(&format!("  ... and {} more\n", report.records.len() - top));
    }
    out
}
