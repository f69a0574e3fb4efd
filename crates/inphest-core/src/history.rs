//! Host histories — the fixed, time-stamped host phylogeny and biogeography a
//! symbiont replicate is conditioned on.
//!
//! A [`HostHistory`] is compiled once from lineage definitions and host
//! events, then shared read-only by every replicate that draws it.
//! [`HostHistory::validate`] replays each lineage's events against its
//! declared start distribution and reports the first biological
//! inconsistency it finds.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use petgraph::algo::dijkstra;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, HistoryError, Result};
use crate::types::{is_in_range, AreaId, Distribution, LineageId, SimTime};

fn unit_weight() -> f64 {
    1.0
}

/// Immutable description of one host lineage (one edge of the host tree).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostLineageDefinition {
    pub lineage_id: LineageId,
    #[serde(default)]
    pub lineage_parent_id: Option<LineageId>,
    #[serde(default)]
    pub leafset_bitstring: String,
    #[serde(default)]
    pub split_bitstring: String,
    pub lineage_start_time: SimTime,
    pub lineage_end_time: SimTime,
    pub lineage_start_distribution_bitstring: Distribution,
    pub lineage_end_distribution_bitstring: Distribution,
    #[serde(default)]
    pub is_seed_node: bool,
    #[serde(default)]
    pub is_leaf: bool,
    #[serde(default)]
    pub is_extant_leaf: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnageneticSubtype {
    AreaGain,
    AreaLoss,
}

/// Type-specific payload of a host event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum HostEventKind {
    Anagenesis {
        event_subtype: AnageneticSubtype,
        #[serde(alias = "state_idx")]
        area_idx: AreaId,
    },
    Cladogenesis {
        #[serde(default)]
        event_subtype: String,
        child0_lineage_id: LineageId,
        child1_lineage_id: LineageId,
    },
}

/// A single time-stamped event on the host side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEvent {
    pub event_time: SimTime,
    /// Probability of the event; 1.0 when the history is taken as truth.
    #[serde(default = "unit_weight")]
    pub weight: f64,
    pub lineage_id: LineageId,
    #[serde(flatten)]
    pub kind: HostEventKind,
}

impl HostEvent {
    pub fn area_gain(lineage_id: LineageId, event_time: SimTime, area: AreaId) -> Self {
        Self {
            event_time,
            weight: 1.0,
            lineage_id,
            kind: HostEventKind::Anagenesis {
                event_subtype: AnageneticSubtype::AreaGain,
                area_idx: area,
            },
        }
    }

    pub fn area_loss(lineage_id: LineageId, event_time: SimTime, area: AreaId) -> Self {
        Self {
            event_time,
            weight: 1.0,
            lineage_id,
            kind: HostEventKind::Anagenesis {
                event_subtype: AnageneticSubtype::AreaLoss,
                area_idx: area,
            },
        }
    }

    pub fn cladogenesis(lineage_id: LineageId, event_time: SimTime, children: [LineageId; 2]) -> Self {
        Self {
            event_time,
            weight: 1.0,
            lineage_id,
            kind: HostEventKind::Cladogenesis {
                event_subtype: String::new(),
                child0_lineage_id: children[0],
                child1_lineage_id: children[1],
            },
        }
    }

    pub fn is_cladogenesis(&self) -> bool {
        matches!(self.kind, HostEventKind::Cladogenesis { .. })
    }

    /// Replay order: by time, cladogenesis first at equal times so that
    /// daughters exist before their own events apply.
    pub fn replay_order(&self, other: &Self) -> std::cmp::Ordering {
        self.event_time
            .total_cmp(&other.event_time)
            .then_with(|| other.is_cladogenesis().cmp(&self.is_cladogenesis()))
    }

    /// The same event with its time multiplied by `factor`.
    pub fn rescaled(&self, factor: f64) -> Self {
        Self {
            event_time: self.event_time * factor,
            ..self.clone()
        }
    }
}

/// A compiled, read-only host history.
#[derive(Debug, Clone)]
pub struct HostHistory {
    lineages: BTreeMap<LineageId, HostLineageDefinition>,
    events: Vec<HostEvent>,
    start_time: SimTime,
    end_time: SimTime,
    num_areas: usize,
    seed_lineage: LineageId,
    tree: DiGraph<LineageId, f64>,
    nodes: HashMap<LineageId, NodeIndex>,
    distance_matrix: BTreeMap<LineageId, BTreeMap<LineageId, f64>>,
    extant_leaf_lineages: BTreeSet<LineageId>,
    area_assemblage_leaf_sets: Vec<BTreeSet<LineageId>>,
}

impl HostHistory {
    /// Build the host tree, the patristic distance matrix and the area
    /// assemblages, and sort the events by time.
    ///
    /// Fails if a lineage is defined twice, a parent or child id does not
    /// resolve, the lineage records do not form a single rooted tree,
    /// distribution widths disagree, or an event lies outside
    /// `[start_time, end_time]`.
    pub fn compile(
        lineage_definitions: Vec<HostLineageDefinition>,
        mut events: Vec<HostEvent>,
        start_time: SimTime,
        end_time: SimTime,
    ) -> Result<Self> {
        let mut lineages = BTreeMap::new();
        for def in lineage_definitions {
            if def.lineage_start_time > def.lineage_end_time {
                return Err(HistoryError::InvertedLifespan {
                    lineage: def.lineage_id,
                    start: def.lineage_start_time,
                    end: def.lineage_end_time,
                }
                .into());
            }
            if lineages.contains_key(&def.lineage_id) {
                return Err(HistoryError::DuplicateLineage(def.lineage_id).into());
            }
            lineages.insert(def.lineage_id, def);
        }

        let num_areas = check_widths(&lineages)?;
        let (tree, nodes, seed_lineage) = build_tree(&lineages)?;

        events.sort_by(|a, b| a.replay_order(b));
        for event in &events {
            let def = lineages
                .get(&event.lineage_id)
                .ok_or(HistoryError::MissingLineage(event.lineage_id))?;
            if !is_in_range(event.event_time, start_time, end_time) {
                return Err(HistoryError::EventOutOfRange {
                    lineage: event.lineage_id,
                    time: event.event_time,
                    start: start_time,
                    end: end_time,
                }
                .into());
            }
            match &event.kind {
                HostEventKind::Anagenesis { area_idx, .. } => {
                    if area_idx.0 >= num_areas {
                        return Err(HistoryError::AreaOutOfRange {
                            lineage: event.lineage_id,
                            area: area_idx.0,
                            num_areas,
                        }
                        .into());
                    }
                }
                HostEventKind::Cladogenesis {
                    child0_lineage_id,
                    child1_lineage_id,
                    ..
                } => {
                    for child in [child0_lineage_id, child1_lineage_id] {
                        let child_def = lineages.get(child).ok_or(HistoryError::MissingLineage(*child))?;
                        if child_def.lineage_parent_id != Some(def.lineage_id) {
                            return Err(HistoryError::TopologyMismatch(format!(
                                "cladogenesis on lineage {} names child {}, whose parent is {:?}",
                                def.lineage_id, child, child_def.lineage_parent_id
                            ))
                            .into());
                        }
                    }
                }
            }
        }

        let distance_matrix = patristic_distances(&tree, &nodes, seed_lineage, &lineages);

        let extant_leaf_lineages: BTreeSet<LineageId> = lineages
            .values()
            .filter(|def| def.is_extant_leaf)
            .map(|def| def.lineage_id)
            .collect();
        let mut area_assemblage_leaf_sets = vec![BTreeSet::new(); num_areas];
        for id in &extant_leaf_lineages {
            for area in lineages[id].lineage_end_distribution_bitstring.presences() {
                area_assemblage_leaf_sets[area.0].insert(*id);
            }
        }

        debug!(
            lineages = lineages.len(),
            events = events.len(),
            num_areas,
            "Compiled host history"
        );

        Ok(Self {
            lineages,
            events,
            start_time,
            end_time,
            num_areas,
            seed_lineage,
            tree,
            nodes,
            distance_matrix,
            extant_leaf_lineages,
            area_assemblage_leaf_sets,
        })
    }

    /// Replay every lineage's events against its declared start distribution.
    pub fn validate(&self) -> Result<()> {
        for (id, def) in &self.lineages {
            let replayed = self.replay_lineage(*id)?;
            if replayed != def.lineage_end_distribution_bitstring {
                return Err(HistoryError::EndDistributionMismatch {
                    lineage: *id,
                    replayed: replayed.to_string(),
                    declared: def.lineage_end_distribution_bitstring.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// The distribution implied at the end of `lineage_id` by replaying its
    /// own events in time order from its start distribution.
    pub fn replay_lineage(&self, lineage_id: LineageId) -> Result<Distribution> {
        let def = self
            .lineages
            .get(&lineage_id)
            .ok_or(HistoryError::MissingLineage(lineage_id))?;
        let mut distribution = def.lineage_start_distribution_bitstring.clone();

        for event in self.events.iter().filter(|e| e.lineage_id == lineage_id) {
            if !is_in_range(event.event_time, def.lineage_start_time, def.lineage_end_time) {
                return Err(HistoryError::EventOutOfRange {
                    lineage: lineage_id,
                    time: event.event_time,
                    start: def.lineage_start_time,
                    end: def.lineage_end_time,
                }
                .into());
            }
            match &event.kind {
                HostEventKind::Anagenesis {
                    event_subtype: AnageneticSubtype::AreaGain,
                    area_idx,
                } => {
                    if distribution.has(*area_idx) {
                        return Err(HistoryError::DoubleAreaGain {
                            lineage: lineage_id,
                            time: event.event_time,
                            area: area_idx.0,
                            distribution: distribution.to_string(),
                        }
                        .into());
                    }
                    distribution.set(*area_idx, true);
                }
                HostEventKind::Anagenesis {
                    event_subtype: AnageneticSubtype::AreaLoss,
                    area_idx,
                } => {
                    if !distribution.has(*area_idx) {
                        return Err(HistoryError::AbsentAreaLoss {
                            lineage: lineage_id,
                            time: event.event_time,
                            area: area_idx.0,
                            distribution: distribution.to_string(),
                        }
                        .into());
                    }
                    distribution.set(*area_idx, false);
                }
                HostEventKind::Cladogenesis { .. } => {
                    if distribution != def.lineage_start_distribution_bitstring {
                        return Err(HistoryError::CladogenesisDistributionChanged {
                            lineage: lineage_id,
                            time: event.event_time,
                            expected: def.lineage_start_distribution_bitstring.to_string(),
                            found: distribution.to_string(),
                        }
                        .into());
                    }
                }
            }
        }
        Ok(distribution)
    }

    pub fn lineages(&self) -> impl Iterator<Item = &HostLineageDefinition> {
        self.lineages.values()
    }

    pub fn lineage(&self, id: LineageId) -> Option<&HostLineageDefinition> {
        self.lineages.get(&id)
    }

    pub fn num_lineages(&self) -> usize {
        self.lineages.len()
    }

    /// Events in ascending time order.
    pub fn events(&self) -> &[HostEvent] {
        &self.events
    }

    pub fn start_time(&self) -> SimTime {
        self.start_time
    }

    pub fn end_time(&self) -> SimTime {
        self.end_time
    }

    /// Width of every distribution bitstring in the history.
    pub fn num_areas(&self) -> usize {
        self.num_areas
    }

    pub fn seed_lineage(&self) -> LineageId {
        self.seed_lineage
    }

    pub fn children(&self, id: LineageId) -> Vec<LineageId> {
        let Some(&node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let mut children: Vec<LineageId> = self
            .tree
            .neighbors_directed(node, Direction::Outgoing)
            .map(|n| self.tree[n])
            .collect();
        children.sort();
        children
    }

    /// Path length between two lineages divided by the total tree length.
    pub fn patristic_distance(&self, a: LineageId, b: LineageId) -> Option<f64> {
        self.distance_matrix.get(&a).and_then(|row| row.get(&b)).copied()
    }

    pub fn extant_leaf_lineages(&self) -> &BTreeSet<LineageId> {
        &self.extant_leaf_lineages
    }

    /// Extant leaf lineages whose end distribution includes `area`.
    pub fn area_assemblage_leaf_set(&self, area: AreaId) -> Option<&BTreeSet<LineageId>> {
        self.area_assemblage_leaf_sets.get(area.0)
    }
}

fn check_widths(lineages: &BTreeMap<LineageId, HostLineageDefinition>) -> Result<usize> {
    let mut expected: Option<usize> = None;
    for def in lineages.values() {
        for bits in [
            &def.lineage_start_distribution_bitstring,
            &def.lineage_end_distribution_bitstring,
        ] {
            match expected {
                None => expected = Some(bits.width()),
                Some(width) if width != bits.width() => {
                    return Err(HistoryError::WidthMismatch {
                        lineage: def.lineage_id,
                        bitstring: bits.to_string(),
                        expected: width,
                        found: bits.width(),
                    }
                    .into())
                }
                Some(_) => {}
            }
        }
    }
    match expected {
        Some(width) if width > 0 => Ok(width),
        _ => Err(HistoryError::TopologyMismatch("host history defines no areas".to_string()).into()),
    }
}

type HostTree = (DiGraph<LineageId, f64>, HashMap<LineageId, NodeIndex>, LineageId);

fn build_tree(lineages: &BTreeMap<LineageId, HostLineageDefinition>) -> Result<HostTree> {
    let mut tree = DiGraph::new();
    let mut nodes = HashMap::new();
    for id in lineages.keys() {
        nodes.insert(*id, tree.add_node(*id));
    }

    let mut roots = Vec::new();
    for def in lineages.values() {
        match def.lineage_parent_id {
            None => roots.push(def.lineage_id),
            Some(parent) => {
                let parent_node = *nodes.get(&parent).ok_or(HistoryError::MissingLineage(parent))?;
                let duration = def.lineage_end_time - def.lineage_start_time;
                tree.add_edge(parent_node, nodes[&def.lineage_id], duration);
            }
        }
    }
    let seed = match roots.as_slice() {
        [seed] => *seed,
        [] => return Err(HistoryError::TopologyMismatch("no seed lineage".to_string()).into()),
        many => {
            return Err(HistoryError::TopologyMismatch(format!(
                "{} lineages have no parent: {:?}",
                many.len(),
                many
            ))
            .into())
        }
    };
    if let Some(flagged) = lineages.values().find(|d| d.is_seed_node && d.lineage_id != seed) {
        return Err(HistoryError::TopologyMismatch(format!(
            "lineage {} is flagged as seed but has parent {:?}",
            flagged.lineage_id, flagged.lineage_parent_id
        ))
        .into());
    }

    let mut bfs = Bfs::new(&tree, nodes[&seed]);
    let mut reachable = 0;
    while bfs.next(&tree).is_some() {
        reachable += 1;
    }
    if reachable != lineages.len() {
        return Err(HistoryError::TopologyMismatch(format!(
            "{} of {} lineages are not reachable from seed lineage {}",
            lineages.len() - reachable,
            lineages.len(),
            seed
        ))
        .into());
    }
    Ok((tree, nodes, seed))
}

fn patristic_distances(
    tree: &DiGraph<LineageId, f64>,
    nodes: &HashMap<LineageId, NodeIndex>,
    seed: LineageId,
    lineages: &BTreeMap<LineageId, HostLineageDefinition>,
) -> BTreeMap<LineageId, BTreeMap<LineageId, f64>> {
    let root_distance = dijkstra(tree, nodes[&seed], None, |e| *e.weight());
    let tree_length: f64 = lineages
        .values()
        .map(|d| d.lineage_end_time - d.lineage_start_time)
        .sum();

    let ancestors = |id: LineageId| -> Vec<LineageId> {
        let mut path = vec![id];
        let mut current = id;
        while let Some(parent) = lineages[&current].lineage_parent_id {
            path.push(parent);
            current = parent;
        }
        path
    };

    let mut matrix = BTreeMap::new();
    for a in lineages.keys() {
        let a_path = ancestors(*a);
        let mut row = BTreeMap::new();
        for b in lineages.keys() {
            let b_path: BTreeSet<LineageId> = ancestors(*b).into_iter().collect();
            let mrca = a_path.iter().find(|x| b_path.contains(x)).copied().unwrap_or(seed);
            let d = |x: LineageId| root_distance.get(&nodes[&x]).copied().unwrap_or(0.0);
            let raw = d(*a) + d(*b) - 2.0 * d(mrca);
            let value = if tree_length > 0.0 { raw / tree_length } else { 0.0 };
            row.insert(*b, value);
        }
        matrix.insert(*a, row);
    }
    matrix
}

/// On-disk shape of one compiled host history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostHistoryRecord {
    pub lineages: Vec<HostLineageDefinition>,
    pub events: Vec<Value>,
    #[serde(default)]
    pub start_time: SimTime,
    #[serde(default)]
    pub end_time: Option<SimTime>,
    #[serde(default)]
    pub tree: Option<TreeRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeRecord {
    pub end_time: SimTime,
}

impl HostHistoryRecord {
    /// Compile this record. Events of types other than anagenesis and
    /// cladogenesis (e.g. trait evolution) are skipped.
    pub fn compile(self) -> Result<HostHistory> {
        let end_time = self
            .end_time
            .or(self.tree.map(|t| t.end_time))
            .ok_or_else(|| ConfigError::MissingField("end_time".to_string()))?;
        let mut events = Vec::with_capacity(self.events.len());
        for raw in self.events {
            match raw.get("event_type").and_then(Value::as_str) {
                Some("anagenesis") | Some("cladogenesis") => events.push(serde_json::from_value(raw)?),
                other => debug!("Skipping host event of type {:?}", other),
            }
        }
        HostHistory::compile(self.lineages, events, self.start_time, end_time)
    }
}

/// Alternative host histories; each replicate draws one.
///
/// Histories are held behind `Arc` so replicates share them read-only.
#[derive(Debug, Clone, Default)]
pub struct HostHistorySamples {
    host_histories: Vec<Arc<HostHistory>>,
}

impl HostHistorySamples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, history: HostHistory) {
        self.host_histories.push(Arc::new(history));
    }

    pub fn len(&self) -> usize {
        self.host_histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host_histories.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Arc<HostHistory>> {
        self.host_histories.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<HostHistory>> {
        self.host_histories.iter()
    }

    /// Parse a JSON array of host history records.
    ///
    /// With `validate`, each history is replayed after compilation. A
    /// validation failure is returned unless `ignore_validation_errors` is
    /// set, in which case it is logged and the sample kept.
    pub fn from_json_str(s: &str, validate: bool, ignore_validation_errors: bool) -> Result<Self> {
        let records: Vec<HostHistoryRecord> = serde_json::from_str(s)?;
        Self::from_records(records, validate, ignore_validation_errors)
    }

    pub fn from_path(path: impl AsRef<Path>, validate: bool, ignore_validation_errors: bool) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let records: Vec<HostHistoryRecord> = serde_json::from_reader(reader)?;
        info!("Reading {} host histories from '{}'", records.len(), path.display());
        Self::from_records(records, validate, ignore_validation_errors)
    }

    pub fn from_records(
        records: Vec<HostHistoryRecord>,
        validate: bool,
        ignore_validation_errors: bool,
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(HistoryError::NoSamples.into());
        }
        let mut samples = Self::new();
        for (idx, record) in records.into_iter().enumerate() {
            let history = record.compile()?;
            if validate {
                if let Err(e) = history.validate() {
                    if !ignore_validation_errors {
                        return Err(e);
                    }
                    warn!("Host history {} failed validation (kept): {}", idx + 1, e);
                }
            }
            samples.push(history);
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(
        id: u64,
        parent: Option<u64>,
        times: (f64, f64),
        dists: (&str, &str),
        extant_leaf: bool,
    ) -> HostLineageDefinition {
        HostLineageDefinition {
            lineage_id: LineageId(id),
            lineage_parent_id: parent.map(LineageId),
            leafset_bitstring: String::new(),
            split_bitstring: String::new(),
            lineage_start_time: times.0,
            lineage_end_time: times.1,
            lineage_start_distribution_bitstring: dists.0.parse().unwrap(),
            lineage_end_distribution_bitstring: dists.1.parse().unwrap(),
            is_seed_node: parent.is_none(),
            is_leaf: extant_leaf,
            is_extant_leaf: extant_leaf,
        }
    }

    /// Root 7 splits at t=1 into leaves 1 and 6.
    fn cherry() -> (Vec<HostLineageDefinition>, Vec<HostEvent>) {
        let lineages = vec![
            def(7, None, (0.0, 1.0), ("011", "011"), false),
            def(1, Some(7), (1.0, 3.0), ("011", "010"), true),
            def(6, Some(7), (1.0, 3.0), ("011", "111"), true),
        ];
        let events = vec![
            HostEvent::area_gain(LineageId(6), 2.0, AreaId(0)),
            HostEvent::cladogenesis(LineageId(7), 1.0, [LineageId(1), LineageId(6)]),
            HostEvent::area_loss(LineageId(1), 1.5, AreaId(2)),
        ];
        (lineages, events)
    }

    #[test]
    fn compile_sorts_events_and_builds_assemblages() {
        let (lineages, events) = cherry();
        let history = HostHistory::compile(lineages, events, 0.0, 3.0).unwrap();
        let times: Vec<f64> = history.events().iter().map(|e| e.event_time).collect();
        assert_eq!(times, vec![1.0, 1.5, 2.0]);
        assert_eq!(history.num_areas(), 3);
        assert_eq!(history.seed_lineage(), LineageId(7));
        assert_eq!(history.children(LineageId(7)), vec![LineageId(1), LineageId(6)]);

        let area0 = history.area_assemblage_leaf_set(AreaId(0)).unwrap();
        assert_eq!(area0.iter().copied().collect::<Vec<_>>(), vec![LineageId(6)]);
        let area1 = history.area_assemblage_leaf_set(AreaId(1)).unwrap();
        assert_eq!(area1.len(), 2);
        assert!(history.validate().is_ok());
    }

    #[test]
    fn patristic_distance_is_normalised_by_tree_length() {
        let (lineages, events) = cherry();
        let history = HostHistory::compile(lineages, events, 0.0, 3.0).unwrap();
        // tree length = 1 + 2 + 2; leaf-to-leaf path = 2 + 2
        let d = history.patristic_distance(LineageId(1), LineageId(6)).unwrap();
        assert!((d - 0.8).abs() < 1e-12);
        assert_eq!(history.patristic_distance(LineageId(1), LineageId(1)), Some(0.0));
        let d = history.patristic_distance(LineageId(7), LineageId(6)).unwrap();
        assert!((d - 0.4).abs() < 1e-12);
    }

    #[test]
    fn replay_gain_then_loss() {
        let lineages = vec![def(1, None, (0.0, 1.0), ("010", "100"), true)];
        let events = vec![
            HostEvent::area_gain(LineageId(1), 0.25, AreaId(0)),
            HostEvent::area_loss(LineageId(1), 0.5, AreaId(1)),
        ];
        let history = HostHistory::compile(lineages, events, 0.0, 1.0).unwrap();
        assert!(history.validate().is_ok());
        assert_eq!(history.replay_lineage(LineageId(1)).unwrap().to_string(), "100");
    }

    #[test]
    fn double_gain_is_rejected() {
        let lineages = vec![def(1, None, (0.0, 1.0), ("010", "010"), true)];
        let events = vec![HostEvent::area_gain(LineageId(1), 0.25, AreaId(1))];
        let history = HostHistory::compile(lineages, events, 0.0, 1.0).unwrap();
        let msg = history.validate().unwrap_err().to_string();
        assert!(msg.contains("already has area"), "{}", msg);
        assert!(msg.contains("0.25"), "{}", msg);
    }

    #[test]
    fn cladogenesis_after_change_is_rejected() {
        let lineages = vec![
            def(7, None, (0.0, 1.0), ("011", "001"), false),
            def(1, Some(7), (1.0, 2.0), ("011", "011"), true),
            def(6, Some(7), (1.0, 2.0), ("011", "011"), true),
        ];
        let events = vec![
            HostEvent::area_loss(LineageId(7), 0.5, AreaId(1)),
            HostEvent::cladogenesis(LineageId(7), 1.0, [LineageId(1), LineageId(6)]),
        ];
        let history = HostHistory::compile(lineages, events, 0.0, 2.0).unwrap();
        let err = history.validate().unwrap_err();
        assert!(err.to_string().contains("cladogenesis"));
    }

    #[test]
    fn cladogenesis_sorts_ahead_of_daughter_events_at_split_time() {
        let lineages = vec![
            def(7, None, (0.0, 1.0), ("011", "011"), false),
            def(1, Some(7), (1.0, 2.0), ("011", "111"), true),
            def(6, Some(7), (1.0, 2.0), ("011", "011"), true),
        ];
        let events = vec![
            HostEvent::area_gain(LineageId(1), 1.0, AreaId(0)),
            HostEvent::cladogenesis(LineageId(7), 1.0, [LineageId(1), LineageId(6)]),
        ];
        let history = HostHistory::compile(lineages, events, 0.0, 2.0).unwrap();
        assert!(history.events()[0].is_cladogenesis());
        assert!(!history.events()[1].is_cladogenesis());
        history.validate().unwrap();
    }

    #[test]
    fn end_distribution_must_match_replay() {
        let lineages = vec![def(1, None, (0.0, 1.0), ("010", "011"), true)];
        let history = HostHistory::compile(lineages, Vec::new(), 0.0, 1.0).unwrap();
        let err = history.validate().unwrap_err();
        assert!(err.to_string().contains("declared end distribution"));
    }

    #[test]
    fn event_outside_lineage_lifespan_is_rejected() {
        let (mut lineages, _) = cherry();
        lineages[1].lineage_end_distribution_bitstring = "011".parse().unwrap();
        let events = vec![HostEvent::area_gain(LineageId(1), 0.5, AreaId(0))];
        let history = HostHistory::compile(lineages, events, 0.0, 3.0).unwrap();
        assert!(history.replay_lineage(LineageId(1)).is_err());
    }

    #[test]
    fn compile_rejects_structural_errors() {
        let (lineages, mut events) = cherry();
        events.push(HostEvent::area_gain(LineageId(99), 1.0, AreaId(0)));
        assert!(HostHistory::compile(lineages, events, 0.0, 3.0).is_err());

        let (mut lineages, events) = cherry();
        lineages[2].lineage_parent_id = None;
        assert!(HostHistory::compile(lineages, events, 0.0, 3.0).is_err());

        let (mut lineages, events) = cherry();
        lineages[1].lineage_start_distribution_bitstring = "01".parse().unwrap();
        assert!(HostHistory::compile(lineages, events, 0.0, 3.0).is_err());

        let (lineages, events) = cherry();
        assert!(HostHistory::compile(lineages, events, 0.0, 1.75).is_err());
    }

    #[test]
    fn samples_load_from_json() {
        let json = r#"[{
            "lineages": [
                {"lineage_id": 3, "lineage_parent_id": null,
                 "lineage_start_time": 0.0, "lineage_end_time": 2.0,
                 "lineage_start_distribution_bitstring": "10",
                 "lineage_end_distribution_bitstring": "11",
                 "is_seed_node": true, "is_leaf": true, "is_extant_leaf": true}
            ],
            "events": [
                {"event_time": 1.0, "lineage_id": 3, "event_type": "anagenesis",
                 "event_subtype": "area_gain", "state_idx": 1},
                {"event_time": 1.5, "lineage_id": 3, "event_type": "trait_evolution"}
            ],
            "tree": {"end_time": 2.0}
        }]"#;
        let samples = HostHistorySamples::from_json_str(json, true, false).unwrap();
        assert_eq!(samples.len(), 1);
        let history = samples.get(0).unwrap();
        assert_eq!(history.events().len(), 1);
        assert_eq!(history.end_time(), 2.0);
        assert_eq!(history.events()[0].weight, 1.0);
    }

    #[test]
    fn invalid_samples_can_be_kept() {
        let json = r#"[{
            "lineages": [
                {"lineage_id": 1, "lineage_start_time": 0.0, "lineage_end_time": 1.0,
                 "lineage_start_distribution_bitstring": "10",
                 "lineage_end_distribution_bitstring": "01", "is_extant_leaf": true}
            ],
            "events": [],
            "end_time": 1.0
        }]"#;
        assert!(HostHistorySamples::from_json_str(json, true, false).is_err());
        let samples = HostHistorySamples::from_json_str(json, true, true).unwrap();
        assert_eq!(samples.len(), 1);
        assert!(HostHistorySamples::from_json_str("[]", true, false).is_err());
    }
}
