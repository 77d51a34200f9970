//! Stats command - graph size, busiest wallets and detected patterns

use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use std::path::Path;

use graphguard::config::ProjectConfig;
use graphguard::graph::{detect_patterns, GraphSummary};
use graphguard::GraphModel;

#[derive(Debug, Serialize)]
struct WalletCount {
    id: String,
    count: usize,
}

#[derive(Debug, Serialize)]
struct StatsReport {
    summary: GraphSummary,
    top_fan_out: Vec<WalletCount>,
    top_fan_in: Vec<WalletCount>,
    wallets_with_patterns: usize,
}

/// Highest `count` first, ties in insertion order; zero counts dropped
fn ranked(graph: &GraphModel, top: usize, count: impl Fn(usize) -> usize) -> Vec<WalletCount> {
    let mut ranked: Vec<WalletCount> = (0..graph.node_count())
        .map(|i| WalletCount {
            id: graph.id_at(i).to_string(),
            count: count(i),
        })
        .filter(|w| w.count > 0)
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(top);
    ranked
}

pub fn run(graph_path: &Path, config: &ProjectConfig, top: usize, format: &str) -> Result<()> {
    let source = super::read_graph(graph_path)?;
    let graph = GraphModel::build(&source)
        .with_context(|| format!("Cannot build graph from {}", graph_path.display()))?;
    let patterns = detect_patterns(&graph, &config.patterns);

    let report = StatsReport {
        summary: graph.summary(),
        top_fan_out: ranked(&graph, top, |i| graph.fan_out_at(i)),
        top_fan_in: ranked(&graph, top, |i| graph.fan_in_at(i)),
        wallets_with_patterns: patterns.involved().count(),
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n{} Transaction graph\n", style("📊").bold());
    println!("  Wallets:    {}", style(report.summary.num_nodes).cyan());
    println!("  Transfers:  {}", style(report.summary.num_edges).cyan());
    println!("  Isolated:   {}", style(report.summary.num_isolated_nodes).cyan());
    println!(
        "  Patterns:   {} wallets involved",
        style(report.wallets_with_patterns).yellow()
    );

    for (title, rows) in [("Fan-out", &report.top_fan_out), ("Fan-in", &report.top_fan_in)] {
        println!("\n  {}", style(title).bold());
        if rows.is_empty() {
            println!("    (none)");
        }
        for row in rows.iter() {
            println!("    {:>4}  {}", row.count, row.id);
        }
    }
    println!();
    Ok(())
}
