//! Model and host history files on disk.

use inphest_core::prelude::*;

const MISMATCHED_END: &str = r#"[{
    "lineages": [
        {"lineage_id": 4, "lineage_start_time": 0.0, "lineage_end_time": 3.0,
         "lineage_start_distribution_bitstring": "01",
         "lineage_end_distribution_bitstring": "01",
         "is_seed_node": true, "is_leaf": true, "is_extant_leaf": true}
    ],
    "events": [
        {"event_time": 1.0, "lineage_id": 4, "event_type": "anagenesis",
         "event_subtype": "area_gain", "area_idx": 0},
        {"event_time": 2.0, "lineage_id": 4, "event_type": "trait_evolution"}
    ],
    "end_time": 3.0
}]"#;

#[test]
fn model_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    let model = InphestModel::parse_definition(
        &serde_json::json!({
            "model_id": "Kestrel",
            "host_to_symbiont_time_scale_factor": 0.5,
            "anagenetic_geographical_range_evolution": {
                "mean_symbiont_lineage_area_loss_rate": 0.2,
                "symbiont_lineage_area_loss_weight": {
                    "definition_type": "formula",
                    "definition": "num_areas / 2"
                }
            }
        }),
        None,
    )
    .unwrap();
    model.write_model_to_path(&path).unwrap();

    let reread = InphestModel::from_path(&path, None).unwrap();
    assert_eq!(reread.model_id, "Kestrel");
    assert_eq!(reread.host_to_symbiont_time_scale_factor, 0.5);
    assert_eq!(reread.as_definition(), model.as_definition());
}

#[test]
fn histories_from_disk_respect_validation_flags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("histories.json");
    std::fs::write(&path, MISMATCHED_END).unwrap();

    // the replayed end distribution "11" disagrees with the declared "01"
    assert!(HostHistorySamples::from_path(&path, true, false).is_err());

    let kept = HostHistorySamples::from_path(&path, true, true).unwrap();
    assert_eq!(kept.len(), 1);
    // non-biogeographic events are skipped at load
    assert_eq!(kept.get(0).unwrap().events().len(), 1);

    let unchecked = HostHistorySamples::from_path(&path, false, false).unwrap();
    assert_eq!(unchecked.len(), 1);
}

#[test]
fn empty_sample_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("none.json");
    std::fs::write(&path, "[]").unwrap();
    assert!(HostHistorySamples::from_path(&path, true, false).is_err());
}
