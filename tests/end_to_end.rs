//! End-to-end scenarios against the public API, using `serde_json::json!` for
//! fixtures the way lang-pt's own integration tests build trees from JSON.

use cfgraph::{Cursor, Node, Options, Orchestrator, Scalar};
use serde_json::Value;

/// Test-only bridge from a `serde_json::Value` tree to [Node], so fixtures
/// read like ordinary JSON instead of hand-built `BTreeMap`s.
fn node_from_json(value: &Value) -> Node {
    match value {
        Value::Null => Node::null(),
        Value::Bool(b) => Node::Scalar(Scalar::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Node::Scalar(Scalar::Int(i))
            } else {
                Node::Scalar(Scalar::Float(n.as_f64().unwrap()))
            }
        }
        Value::String(s) => Node::string(s.clone()),
        Value::Array(items) => Node::Sequence(items.iter().map(node_from_json).collect()),
        Value::Object(map) => {
            let mut out = std::collections::BTreeMap::new();
            for (k, v) in map {
                out.insert(k.clone(), node_from_json(v));
            }
            Node::Mapping(out)
        }
    }
}

fn scalar_str(node: &Node) -> &str {
    node.as_str().expect("expected a scalar string")
}

#[test]
fn scenario_simple_grab_and_concat() {
    let tree = node_from_json(&serde_json::json!({
        "meta": { "base": "app", "ver": "1.0" },
        "name": r#"(( concat meta.base "-" meta.ver ))"#,
        "full": "(( grab name ))",
    }));

    let orchestrator = Orchestrator::new(Options::default()).unwrap();
    let result = orchestrator.evaluate(tree).unwrap();
    let m = result.as_mapping().unwrap();
    assert_eq!(scalar_str(m.get("name").unwrap()), "app-1.0");
    assert_eq!(scalar_str(m.get("full").unwrap()), "app-1.0");
}

#[test]
fn scenario_fallback_chain() {
    let tree = node_from_json(&serde_json::json!({
        "password": r#"(( grab secrets.db || "default" ))"#,
    }));

    let orchestrator = Orchestrator::new(Options::default()).unwrap();
    let result = orchestrator.evaluate(tree).unwrap();
    assert_eq!(
        scalar_str(result.as_mapping().unwrap().get("password").unwrap()),
        "default"
    );
}

#[test]
fn scenario_cherry_pick_prunes_irrelevant_error() {
    let tree = node_from_json(&serde_json::json!({
        "a": "(( grab b ))",
        "b": "hi",
        "bad": "(( grab nonexistent ))",
    }));

    let mut options = Options::default();
    options.cherry_pick_paths = vec![Cursor::parse("a")];
    let orchestrator = Orchestrator::new(options).unwrap();
    let result = orchestrator.evaluate(tree).unwrap();
    let m = result.as_mapping().unwrap();
    assert_eq!(scalar_str(m.get("a").unwrap()), "hi");
    assert!(m.get("bad").is_none());
    assert_eq!(m.len(), 1);
}

#[test]
fn scenario_cycle_detection_names_both_sides() {
    let tree = node_from_json(&serde_json::json!({
        "a": "(( grab b ))",
        "b": "(( grab a ))",
    }));

    let orchestrator = Orchestrator::new(Options::default()).unwrap();
    let err = orchestrator.evaluate(tree).unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.contains("CycleError"));
    assert!(rendered.contains('a') && rendered.contains('b'));
}

#[test]
fn scenario_array_by_name_addressing() {
    let tree = node_from_json(&serde_json::json!({
        "jobs": [
            { "name": "web", "port": "(( grab defaults.port ))" }
        ],
        "defaults": { "port": 8080 },
    }));

    let mut options = Options::default();
    options.cherry_pick_paths = vec![Cursor::parse("jobs.web")];
    let orchestrator = Orchestrator::new(options).unwrap();
    let result = orchestrator.evaluate(tree).unwrap();
    let jobs = result.as_mapping().unwrap().get("jobs").unwrap().as_sequence().unwrap();
    assert_eq!(
        jobs[0].as_mapping().unwrap().get("port").unwrap(),
        &Node::Scalar(Scalar::Int(8080))
    );
}

#[test]
fn scenario_defer_passes_through_unchanged() {
    let tree = node_from_json(&serde_json::json!({
        "t": "(( defer concat a b ))",
    }));

    let orchestrator = Orchestrator::new(Options::default()).unwrap();
    let result = orchestrator.evaluate(tree).unwrap();
    assert_eq!(
        scalar_str(result.as_mapping().unwrap().get("t").unwrap()),
        "(( concat a b ))"
    );
}

#[test]
fn determinism_across_repeated_runs() {
    let fixture = || {
        node_from_json(&serde_json::json!({
            "meta": { "base": "app", "ver": "1.0" },
            "name": r#"(( concat meta.base "-" meta.ver ))"#,
            "jobs": [
                { "name": "b", "port": 2 },
                { "name": "a", "port": 1 },
            ],
        }))
    };

    let mut options = Options::default();
    options.sort_paths = vec![(Cursor::parse("jobs"), "name".to_string())];

    let run = || {
        let orchestrator = Orchestrator::new(options.clone()).unwrap();
        orchestrator.evaluate(fixture()).unwrap()
    };

    assert_eq!(run(), run());
}

#[test]
fn unknown_operator_passes_through_unchanged() {
    let tree = node_from_json(&serde_json::json!({
        "x": "(( totally-unregistered a b ))",
    }));

    let orchestrator = Orchestrator::new(Options::default()).unwrap();
    let result = orchestrator.evaluate(tree).unwrap();
    assert_eq!(
        scalar_str(result.as_mapping().unwrap().get("x").unwrap()),
        "(( totally-unregistered a b ))"
    );
}

#[test]
fn prune_and_sort_are_commutative_on_disjoint_paths() {
    let fixture = || {
        node_from_json(&serde_json::json!({
            "drop_me": "gone",
            "jobs": [
                { "name": "b" },
                { "name": "a" },
            ],
        }))
    };

    let mut a = Options::default();
    a.prune_paths = vec![Cursor::parse("drop_me")];
    a.sort_paths = vec![(Cursor::parse("jobs"), "name".to_string())];

    let orchestrator = Orchestrator::new(a).unwrap();
    let result = orchestrator.evaluate(fixture()).unwrap();
    let m = result.as_mapping().unwrap();
    assert!(m.get("drop_me").is_none());
    let jobs = m.get("jobs").unwrap().as_sequence().unwrap();
    assert_eq!(jobs[0].as_mapping().unwrap().get("name").unwrap().as_str(), Some("a"));
}
