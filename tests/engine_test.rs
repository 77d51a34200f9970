//! Engine integration tests
//!
//! Exercise the public API end to end: attach, scoring modes, layout
//! ticking and pinning.

use graphguard::graph::{detect_patterns, PatternThresholds};
use graphguard::scoring::{derive_priors, synthetic_priors};
use graphguard::{
    EdgeSpec, EngineConfig, EngineError, GraphEngine, GraphModel, GraphSource, NodeSpec, RiskMode, RiskPriors,
    StructuralError,
};

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn engine_with(source: &GraphSource, priors: RiskPriors) -> GraphEngine {
    let mut engine = GraphEngine::new(EngineConfig::default()).unwrap();
    engine.attach(source, priors).unwrap();
    engine
}

fn priors(values: &[(&str, f64)]) -> RiskPriors {
    RiskPriors::from_values(values.iter().map(|(id, v)| (id.to_string(), *v)))
}

/// A small laundering-shaped graph: a hub splits funds, mules forward them,
/// a collector aggregates, plus an unrelated pair.
fn laundering_graph() -> GraphSource {
    GraphSource::from_ids(
        &["hub", "m1", "m2", "m3", "collector", "cash_out", "x", "y"],
        &[
            ("hub", "m1"),
            ("hub", "m2"),
            ("hub", "m3"),
            ("m1", "collector"),
            ("m2", "collector"),
            ("m3", "collector"),
            ("collector", "cash_out"),
            ("x", "y"),
        ],
    )
}

#[test]
fn test_degree_identity_holds_everywhere() {
    let model = GraphModel::build(&laundering_graph()).unwrap();
    for id in model.node_ids() {
        assert_eq!(model.degree_of(id), model.fan_in_of(id) + model.fan_out_of(id));
    }
    assert_eq!(model.fan_out_of("hub"), 3);
    assert_eq!(model.fan_in_of("collector"), 3);
}

#[test]
fn test_propagation_chain_example() {
    let source = GraphSource::from_ids(&["A", "B", "C"], &[("A", "B"), ("B", "C")]);
    let mut engine = engine_with(&source, priors(&[("A", 0.9)]));
    engine.set_risk_mode(RiskMode::Propagation).unwrap();

    let records = engine.risk_records();
    assert!(approx_eq(records["B"].value, 0.765));
    assert!(approx_eq(records["C"].value, 0.65025));
    assert!(approx_eq(records["C"].delta().unwrap(), 0.65025));
}

#[test]
fn test_rule_based_fan_out_example() {
    let source = GraphSource::from_ids(
        &["D", "d1", "d2", "d3", "E", "e1"],
        &[("D", "d1"), ("D", "d2"), ("D", "d3"), ("E", "e1")],
    );
    let engine = engine_with(&source, priors(&[("D", 0.7), ("E", 0.9)]));
    assert_eq!(engine.mode(), RiskMode::Rule);
    assert!(engine.risk_of("D").unwrap().flagged);
    assert!(!engine.risk_of("E").unwrap().flagged);
}

#[test]
fn test_attach_ghost_edge_fails() {
    let mut engine = GraphEngine::new(EngineConfig::default()).unwrap();
    let source = GraphSource::from_ids(&["A", "B"], &[("A", "ghost")]);
    let err = engine.attach(&source, RiskPriors::default()).unwrap_err();
    match err {
        EngineError::Structural(StructuralError::UnknownNode { node_id, .. }) => assert_eq!(node_id, "ghost"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(engine.model().is_empty());
}

#[test]
fn test_rule_scores_independent_of_edge_order() {
    let forward = laundering_graph();
    let mut reversed = forward.clone();
    reversed.edges.reverse();

    let p = synthetic_priors(&GraphModel::build(&forward).unwrap());
    let a = engine_with(&forward, p.clone());
    let b = engine_with(&reversed, p);
    for (id, record) in a.risk_records() {
        assert_eq!(record, &b.risk_records()[id]);
    }
}

#[test]
fn test_propagation_monotone_and_order_invariant() {
    let forward = laundering_graph();
    let mut reversed = forward.clone();
    reversed.edges.reverse();
    let p = priors(&[("hub", 0.8), ("m2", 0.95), ("x", 0.3)]);

    let mut a = engine_with(&forward, p.clone());
    let mut b = engine_with(&reversed, p.clone());
    a.set_risk_mode(RiskMode::Propagation).unwrap();
    b.set_risk_mode(RiskMode::Propagation).unwrap();

    for (id, record) in a.risk_records() {
        assert!(record.value >= p.base_risk(id));
        assert!(approx_eq(record.value, b.risk_records()[id].value));
    }
    // m2 (0.95) reaches collector at 0.8075, above the path from hub (0.578)
    assert!(approx_eq(a.risk_records()["collector"].value, 0.95 * 0.85));
}

#[test]
fn test_propagation_terminates_on_cycles() {
    let source = GraphSource::from_ids(
        &["a", "b", "c", "d"],
        &[("a", "b"), ("b", "c"), ("c", "a"), ("c", "d"), ("d", "d")],
    );
    let mut engine = engine_with(&source, priors(&[("b", 1.0)]));
    engine.set_risk_mode(RiskMode::Propagation).unwrap();
    let records = engine.risk_records();
    assert!(approx_eq(records["c"].value, 0.85));
    assert!(approx_eq(records["a"].value, 0.85 * 0.85));
    assert!(approx_eq(records["b"].value, 1.0));
}

#[test]
fn test_mode_switch_round_trip_restores_scores() {
    let source = laundering_graph();
    let p = priors(&[("hub", 0.8)]);
    let mut engine = engine_with(&source, p);
    let rule = engine.risk_records().clone();

    engine.set_risk_mode(RiskMode::Blended).unwrap();
    assert_ne!(engine.risk_records(), &rule);
    engine.set_risk_mode(RiskMode::Rule).unwrap();
    assert_eq!(engine.risk_records(), &rule);
}

#[test]
fn test_snapshot_serializes() {
    let engine = engine_with(&laundering_graph(), RiskPriors::default());
    let json = serde_json::to_value(engine.snapshot()).unwrap();
    assert_eq!(json["mode"], "rule");
    assert_eq!(json["positions"].as_array().unwrap().len(), 8);
    assert_eq!(json["risk_records"].as_array().unwrap().len(), 8);
}

#[test]
fn test_layout_pin_and_release() {
    let mut engine = engine_with(&laundering_graph(), RiskPriors::default());
    engine.pin("collector", 300.0, 300.0).unwrap();
    let before = engine.snapshot().positions;

    let after = engine.tick();
    let collector = after.iter().find(|p| p.id == "collector").unwrap();
    assert_eq!((collector.x, collector.y), (300.0, 300.0));
    // Dragging one wallet does not freeze the rest
    assert!(after.iter().zip(&before).any(|(a, b)| a.id != "collector" && (a.x, a.y) != (b.x, b.y)));

    engine.unpin("collector").unwrap();
    engine.run_until_settled(10_000);
    assert!(engine.is_settled());
    let frozen = engine.snapshot().positions;
    assert_eq!(engine.tick(), frozen);
}

#[test]
fn test_layout_deterministic_across_engines() {
    let source = GraphSource::new(
        vec![
            NodeSpec::new("a").at(100.0, 100.0),
            NodeSpec::new("b").at(100.0, 100.0),
            NodeSpec::new("c"),
        ],
        vec![EdgeSpec::new("a", "b"), EdgeSpec::new("b", "c")],
    );
    let mut first = engine_with(&source, RiskPriors::default());
    let mut second = engine_with(&source, RiskPriors::default());
    for _ in 0..100 {
        assert_eq!(first.tick(), second.tick());
    }
}

#[test]
fn test_layout_near_coincident_positions_stay_finite() {
    let source = GraphSource::new(
        vec![
            NodeSpec::new("a").at(0.0, 0.0),
            NodeSpec::new("b").at(1e-200, 0.0),
            NodeSpec::new("c").at(50.0, 50.0),
        ],
        vec![EdgeSpec::new("a", "c"), EdgeSpec::new("a", "b")],
    );
    let mut engine = engine_with(&source, RiskPriors::default());
    for _ in 0..50 {
        let positions = engine.tick();
        assert!(positions.iter().all(|p| p.x.is_finite() && p.y.is_finite()));
    }
    engine.run_until_settled(10_000);
    assert!(engine.is_settled());
}

#[test]
fn test_derived_priors_feed_the_engine() {
    let source = laundering_graph();
    let model = GraphModel::build(&source).unwrap();
    let report = detect_patterns(&model, &PatternThresholds::default());
    let derived = derive_priors(&model, &report);

    // hub fans out to three mules, collector aggregates three
    assert!(derived.base_risk("hub") >= 0.4);
    assert!(derived.base_risk("collector") >= 0.4);
    assert_eq!(derived.base_risk("x"), 0.0);

    let mut engine = engine_with(&source, derived);
    engine.set_risk_mode(RiskMode::Propagation).unwrap();
    assert!(engine.risk_of("cash_out").unwrap().value > 0.0);
}
