//! Shared host history fixture for integration tests.

use inphest_core::history::HostHistorySamples;

/// Three areas, five host lineages:
///
/// ```text
///        15 [0,1]
///       /        \
///    3 [1,2]    12 [1,4]  loses area 1 at 3.0
///    /     \
/// 1 [2,4]  2 [2,3.5]  (2 is an extinct leaf)
/// gains area 2 at 2.5
/// ```
pub const FOUR_TIP_HISTORY: &str = r#"[{
    "lineages": [
        {"lineage_id": 15, "lineage_parent_id": null, "leafset_bitstring": "111",
         "lineage_start_time": 0.0, "lineage_end_time": 1.0,
         "lineage_start_distribution_bitstring": "110",
         "lineage_end_distribution_bitstring": "110",
         "is_seed_node": true},
        {"lineage_id": 3, "lineage_parent_id": 15, "leafset_bitstring": "110",
         "lineage_start_time": 1.0, "lineage_end_time": 2.0,
         "lineage_start_distribution_bitstring": "110",
         "lineage_end_distribution_bitstring": "110"},
        {"lineage_id": 12, "lineage_parent_id": 15, "leafset_bitstring": "001",
         "lineage_start_time": 1.0, "lineage_end_time": 4.0,
         "lineage_start_distribution_bitstring": "110",
         "lineage_end_distribution_bitstring": "100",
         "is_leaf": true, "is_extant_leaf": true},
        {"lineage_id": 1, "lineage_parent_id": 3, "leafset_bitstring": "100",
         "lineage_start_time": 2.0, "lineage_end_time": 4.0,
         "lineage_start_distribution_bitstring": "110",
         "lineage_end_distribution_bitstring": "111",
         "is_leaf": true, "is_extant_leaf": true},
        {"lineage_id": 2, "lineage_parent_id": 3, "leafset_bitstring": "010",
         "lineage_start_time": 2.0, "lineage_end_time": 3.5,
         "lineage_start_distribution_bitstring": "110",
         "lineage_end_distribution_bitstring": "110",
         "is_leaf": true, "is_extant_leaf": false}
    ],
    "events": [
        {"event_time": 1.0, "lineage_id": 15, "event_type": "cladogenesis",
         "child0_lineage_id": 3, "child1_lineage_id": 12},
        {"event_time": 2.0, "lineage_id": 3, "event_type": "cladogenesis",
         "child0_lineage_id": 1, "child1_lineage_id": 2},
        {"event_time": 2.5, "lineage_id": 1, "event_type": "anagenesis",
         "event_subtype": "area_gain", "area_idx": 2},
        {"event_time": 3.0, "lineage_id": 12, "event_type": "anagenesis",
         "event_subtype": "area_loss", "area_idx": 1}
    ],
    "end_time": 4.0
}]"#;

pub fn four_tip_samples() -> HostHistorySamples {
    HostHistorySamples::from_json_str(FOUR_TIP_HISTORY, true, false).unwrap()
}
