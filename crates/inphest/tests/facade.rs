//! The facade exposes a complete simulation through its prelude.

use inphest::prelude::*;

const SINGLE_LINEAGE: &str = r#"[{
    "lineages": [
        {"lineage_id": 1, "lineage_start_time": 0.0, "lineage_end_time": 2.0,
         "lineage_start_distribution_bitstring": "10",
         "lineage_end_distribution_bitstring": "11",
         "is_seed_node": true, "is_leaf": true, "is_extant_leaf": true}
    ],
    "events": [
        {"event_time": 1.0, "lineage_id": 1, "event_type": "anagenesis",
         "event_subtype": "area_gain", "area_idx": 1}
    ],
    "end_time": 2.0
}]"#;

#[test]
fn single_host_run_produces_trees() {
    let histories = HostHistorySamples::from_json_str(SINGLE_LINEAGE, true, false).unwrap();
    let model = InphestModel::parse_definition(
        &serde_json::json!({"diversification": {"mean_symbiont_lineage_birth_rate": 1.0}}),
        None,
    )
    .unwrap();
    let config = RunnerConfig {
        num_replicates: 3,
        seed: 4,
        ..Default::default()
    };
    let summary = Runner::new(model, histories, config).unwrap().run().unwrap();
    assert_eq!(summary.completed, 3);
    for report in &summary.reports {
        // one host, so every label ends in its single occurrence bit
        assert!(report.lineages.iter().all(|l| l.label.ends_with("^1")));
    }
}

#[test]
fn registered_closure_drives_a_weight() {
    let mut registry = RateFunctionRegistry::new();
    registry.register("never", |_: &RateContext| 0.0);
    let model = InphestModel::parse_definition(
        &serde_json::json!({
            "diversification": {
                "mean_symbiont_lineage_birth_rate": 5.0,
                "symbiont_lineage_birth_weight": {
                    "definition_type": "function_object",
                    "definition": "never"
                }
            }
        }),
        Some(&registry),
    )
    .unwrap();
    let histories = HostHistorySamples::from_json_str(SINGLE_LINEAGE, true, false).unwrap();
    let summary = Runner::new(model, histories, RunnerConfig::default()).unwrap().run().unwrap();
    assert_eq!(summary.reports[0].lineages.len(), 1);
}
