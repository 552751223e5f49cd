use std::path::Path;

use coursecast::api::{optimize_payload, simulate_payload, PayloadError};
use coursecast::config::Settings;
use coursecast::data::registry::DataRegistry;
use coursecast::optimizer::{MonteCarloAggregator, ScheduleOptimizer};

fn optimizer() -> ScheduleOptimizer {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/sample");
    let settings = Settings {
        courses_path: root.join("courses.csv"),
        z_table_path: root.join("z_table.csv"),
        ..Settings::default()
    };
    let registry = DataRegistry::load(&settings).expect("sample data should load");
    ScheduleOptimizer::new(&registry)
}

#[test]
fn optimize_payload_returns_selection_and_totals() {
    let body = r#"{"budget": 4000, "max_credit_weight": 3.0, "seed": 7,
        "items": [{"id": 1, "utility": 80}, {"id": 3, "utility": 95}, {"id": 10, "utility": 40}]}"#;
    let json = optimize_payload(&optimizer(), body).unwrap();
    let payload: serde_json::Value = serde_json::from_str(&json).expect("valid json");

    assert_eq!(payload["status"], "Optimal");
    assert_eq!(payload["seed"], 7);
    let selection = payload["selection"].as_array().expect("selection array");
    assert_eq!(selection.len(), 3);
    assert_eq!(selection[0]["id"], 1);
    for item in selection {
        assert!(item["price"].as_f64().is_some());
        assert!(item["selected"].is_boolean());
    }
    let cost = payload["total_cost"].as_f64().unwrap();
    assert!(cost <= 4000.0);
    assert!(payload["total_credit_weight"].as_f64().unwrap() <= 3.0);
    assert!(payload["message"].as_str().unwrap().starts_with("selected "));
}

#[test]
fn optimize_payload_reports_every_validation_issue() {
    let body = r#"{"budget": -1, "max_credit_weight": 11, "seed": 1,
        "items": [{"id": 1, "utility": 150}, {"id": 1, "utility": 10}]}"#;
    let err = optimize_payload(&optimizer(), body).unwrap_err();
    let response = match &err {
        PayloadError::Validation(response) => response,
        other => panic!("expected validation error, got {other}"),
    };

    let fields: Vec<&str> = response.errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["budget", "max_credit_weight", "items"]);
    let payload: serde_json::Value = serde_json::from_str(&err.to_json()).unwrap();
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["errors"][2]["messages"].as_array().map(Vec::len), Some(2));
}

#[test]
fn malformed_body_is_a_parse_error() {
    let err = optimize_payload(&optimizer(), "{\"budget\": 10").unwrap_err();
    assert!(matches!(err, PayloadError::Parse(_)));

    let body = r#"{"budget": 10, "max_credit_weight": 1, "seed": -3, "items": []}"#;
    let err = optimize_payload(&optimizer(), body).unwrap_err();
    assert!(matches!(err, PayloadError::Parse(_)));
}

#[test]
fn unknown_course_is_reported_with_its_kind() {
    let body = r#"{"budget": 4000, "max_credit_weight": 3.0, "seed": 7, "items": [{"id": 404, "utility": 1}]}"#;
    let err = optimize_payload(&optimizer(), body).unwrap_err();
    let payload: serde_json::Value = serde_json::from_str(&err.to_json()).unwrap();
    assert_eq!(payload["kind"], "data");
}

#[test]
fn simulate_payload_returns_probabilities() {
    let aggregator = MonteCarloAggregator::new(optimizer());
    let body = r#"{"budget": 4000, "max_credit_weight": 3.0, "num_runs": 12, "base_seed": 5,
        "items": [{"id": 1, "utility": 80}, {"id": 2, "utility": 60}, {"id": 3, "utility": 95},
                  {"id": 7, "utility": 90}, {"id": 8, "utility": 85}]}"#;
    let json = simulate_payload(&aggregator, body).unwrap();
    let payload: serde_json::Value = serde_json::from_str(&json).expect("valid json");

    assert_eq!(payload["total_runs"], 12);
    assert_eq!(payload["successful_runs"], 12);
    assert_eq!(payload["failed_runs"], 0);
    assert!(payload["simulation_id"].as_str().is_some());
    assert!(payload.get("runs").is_none());
    assert!(payload.get("message").is_none());

    let per_item = payload["per_item"].as_array().unwrap();
    assert_eq!(per_item.len(), 5);
    let negotiations: f64 = per_item[3]["probability"].as_f64().unwrap()
        + per_item[4]["probability"].as_f64().unwrap();
    assert!(negotiations <= 1.0 + 1e-9, "cross-listed sections are exclusive");

    let total: f64 = payload["per_schedule"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["probability"].as_f64().unwrap())
        .sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn simulate_payload_includes_runs_and_failure_message_on_request() {
    let aggregator = MonteCarloAggregator::new(optimizer());
    // Seeds 48..=53 run past the 50 seeds of the sample table.
    let body = r#"{"budget": 4000, "max_credit_weight": 3.0, "num_runs": 6, "base_seed": 48,
        "include_runs": true, "items": [{"id": 1, "utility": 80}]}"#;
    let json = simulate_payload(&aggregator, body).unwrap();
    let payload: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(payload["failed_runs"], 3);
    assert_eq!(payload["failures_by_kind"]["configuration"], 3);
    let runs = payload["runs"].as_array().expect("runs included");
    assert_eq!(runs.len(), 6);
    assert_eq!(runs[0]["outcome"], "success");
    assert_eq!(runs[5]["outcome"], "failure");
    assert_eq!(
        payload["message"],
        "3 of 6 runs failed and were excluded from the probabilities"
    );
}
