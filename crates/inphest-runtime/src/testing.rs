//! Shared fixtures for unit tests.

use inphest_core::history::{HostEvent, HostHistory, HostLineageDefinition};
use inphest_core::types::{AreaId, LineageId};

fn lineage(id: u64, parent: Option<u64>, times: (f64, f64), start: &str, end: &str, leafset: &str, extant: bool) -> HostLineageDefinition {
    HostLineageDefinition {
        lineage_id: LineageId(id),
        lineage_parent_id: parent.map(LineageId),
        leafset_bitstring: leafset.to_string(),
        split_bitstring: leafset.to_string(),
        lineage_start_time: times.0,
        lineage_end_time: times.1,
        lineage_start_distribution_bitstring: start.parse().unwrap(),
        lineage_end_distribution_bitstring: end.parse().unwrap(),
        is_seed_node: parent.is_none(),
        is_leaf: extant,
        is_extant_leaf: extant,
    }
}

/// Three areas, a root (lineage 7) alive on `[0, 1]` splitting into leaves
/// 1 and 6 alive on `[1, 3]`. Leaf 1 loses area 2 at 1.5; leaf 6 gains
/// area 0 at 2.0.
pub(crate) fn cherry_history() -> HostHistory {
    let lineages = vec![
        lineage(7, None, (0.0, 1.0), "011", "011", "11", false),
        lineage(1, Some(7), (1.0, 3.0), "011", "010", "10", true),
        lineage(6, Some(7), (1.0, 3.0), "011", "111", "01", true),
    ];
    let events = vec![
        HostEvent::cladogenesis(LineageId(7), 1.0, [LineageId(1), LineageId(6)]),
        HostEvent::area_loss(LineageId(1), 1.5, AreaId(2)),
        HostEvent::area_gain(LineageId(6), 2.0, AreaId(0)),
    ];
    HostHistory::compile(lineages, events, 0.0, 3.0).unwrap()
}

/// The cherry topology with leaf 1 gaining area 0 at the split time, listed
/// ahead of the split.
pub(crate) fn split_time_gain_history() -> HostHistory {
    let lineages = vec![
        lineage(7, None, (0.0, 1.0), "011", "011", "11", false),
        lineage(1, Some(7), (1.0, 3.0), "011", "111", "10", true),
        lineage(6, Some(7), (1.0, 3.0), "011", "011", "01", true),
    ];
    let events = vec![
        HostEvent::area_gain(LineageId(1), 1.0, AreaId(0)),
        HostEvent::cladogenesis(LineageId(7), 1.0, [LineageId(1), LineageId(6)]),
    ];
    HostHistory::compile(lineages, events, 0.0, 3.0).unwrap()
}
