//! Host system — the per-replicate projection of a host history.
//!
//! A [`HostSystem`] owns every [`Area`] and [`HostLineage`] of one replicate.
//! Relations between them are index based: a host lineage records the
//! [`AreaId`]s it occupies, an area records the [`HostId`]s and
//! [`SymbiontId`]s occupying it. Both directions are only ever changed
//! together, through the mutators here and in `symbiont`.
//!
//! Host lineages follow a strict `pre -> current -> post` life cycle driven
//! by the replicate's replay of the host event schedule.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use inphest_core::error::{ConsistencyError, DistributionError, HistoryError, Result};
use inphest_core::model::check_time_scale_factor;
use inphest_core::history::{HostEvent, HostEventKind, HostHistory, HostLineageDefinition};
use inphest_core::types::{is_in_range, AreaId, Distribution, Extancy, HostId, LineageId, SimTime, SymbiontId, TIME_EPSILON};
use tracing::warn;

/// A geographic area and the lineages currently occupying it.
#[derive(Debug, Clone)]
pub struct Area {
    pub index: AreaId,
    host_lineages: BTreeSet<HostId>,
    symbiont_lineages: BTreeSet<SymbiontId>,
}

impl Area {
    fn new(index: AreaId) -> Self {
        Self {
            index,
            host_lineages: BTreeSet::new(),
            symbiont_lineages: BTreeSet::new(),
        }
    }

    pub fn host_lineages(&self) -> &BTreeSet<HostId> {
        &self.host_lineages
    }

    pub fn symbiont_lineages(&self) -> &BTreeSet<SymbiontId> {
        &self.symbiont_lineages
    }

    pub fn has_host(&self, host: HostId) -> bool {
        self.host_lineages.contains(&host)
    }

    pub fn has_symbiont(&self, symbiont: SymbiontId) -> bool {
        self.symbiont_lineages.contains(&symbiont)
    }
}

/// Mutable, replicate-private state of one host lineage.
#[derive(Debug, Clone)]
pub struct HostLineage {
    pub index: HostId,
    pub lineage_id: LineageId,
    pub lineage_parent_id: Option<LineageId>,
    pub leafset_bitstring: String,
    /// Start time in symbiont time units.
    pub start_time: SimTime,
    /// End time in symbiont time units.
    pub end_time: SimTime,
    pub start_distribution: Distribution,
    pub end_distribution: Distribution,
    pub is_seed_node: bool,
    pub is_leaf: bool,
    pub is_extant_leaf: bool,
    current_areas: BTreeSet<AreaId>,
    extancy: Extancy,
    debug_distribution: Option<Distribution>,
}

impl HostLineage {
    fn new(index: HostId, def: &HostLineageDefinition, time_scale_factor: f64) -> Self {
        Self {
            index,
            lineage_id: def.lineage_id,
            lineage_parent_id: def.lineage_parent_id,
            leafset_bitstring: def.leafset_bitstring.clone(),
            start_time: def.lineage_start_time * time_scale_factor,
            end_time: def.lineage_end_time * time_scale_factor,
            start_distribution: def.lineage_start_distribution_bitstring.clone(),
            end_distribution: def.lineage_end_distribution_bitstring.clone(),
            is_seed_node: def.is_seed_node || def.lineage_parent_id.is_none(),
            is_leaf: def.is_leaf,
            is_extant_leaf: def.is_extant_leaf,
            current_areas: BTreeSet::new(),
            extancy: Extancy::Pre,
            debug_distribution: None,
        }
    }

    pub fn extancy(&self) -> Extancy {
        self.extancy
    }

    pub fn is_current(&self) -> bool {
        self.extancy == Extancy::Current
    }

    /// `pre -> current`, seeding occupancy from the start distribution.
    ///
    /// Bit `i` of the start distribution is area `i` of `areas`; a width
    /// mismatch is a configuration error.
    pub fn activate(&mut self, areas: &mut [Area], time: Option<SimTime>, debug_mode: bool) -> Result<()> {
        if self.extancy != Extancy::Pre {
            return Err(ConsistencyError::InvalidTransition {
                lineage: self.lineage_id,
                from: self.extancy,
                to: Extancy::Current,
            }
            .into());
        }
        if let Some(t) = time {
            if !is_in_range(t, self.start_time, self.end_time) {
                return Err(ConsistencyError::ActivationOutOfRange {
                    lineage: self.lineage_id,
                    time: t,
                    start: self.start_time,
                    end: self.end_time,
                }
                .into());
            }
        }
        if self.start_distribution.width() != areas.len() {
            return Err(HistoryError::WidthMismatch {
                lineage: self.lineage_id,
                bitstring: self.start_distribution.to_string(),
                expected: areas.len(),
                found: self.start_distribution.width(),
            }
            .into());
        }
        let start: Vec<AreaId> = self.start_distribution.presences().collect();
        for area in start {
            self.occupy(areas, area)?;
        }
        self.debug_distribution = debug_mode.then(|| self.start_distribution.clone());
        self.extancy = Extancy::Current;
        Ok(())
    }

    /// `current -> post`, releasing every area.
    pub fn deactivate(&mut self, areas: &mut [Area]) -> Result<()> {
        if self.extancy != Extancy::Current {
            return Err(ConsistencyError::InvalidTransition {
                lineage: self.lineage_id,
                from: self.extancy,
                to: Extancy::Post,
            }
            .into());
        }
        self.clear_areas(areas);
        self.debug_distribution = None;
        self.extancy = Extancy::Post;
        Ok(())
    }

    fn ensure_current(&self) -> Result<()> {
        if self.extancy != Extancy::Current {
            return Err(ConsistencyError::HostNotCurrent {
                lineage: self.lineage_id,
                extancy: self.extancy,
            }
            .into());
        }
        Ok(())
    }

    /// Gain `area`. Only a current host changes its areas.
    pub fn add_area(&mut self, areas: &mut [Area], area: AreaId) -> Result<()> {
        self.ensure_current()?;
        self.occupy(areas, area)
    }

    fn occupy(&mut self, areas: &mut [Area], area: AreaId) -> Result<()> {
        let slot = areas.get_mut(area.0).ok_or(DistributionError::UnknownArea(area))?;
        if !self.current_areas.insert(area) {
            return Err(ConsistencyError::AreaAlreadyOccupied {
                lineage: self.lineage_id,
                area,
            }
            .into());
        }
        slot.host_lineages.insert(self.index);
        if let Some(bits) = self.debug_distribution.as_mut() {
            bits.set(area, true);
        }
        Ok(())
    }

    /// Lose `area`. Only a current host changes its areas.
    pub fn remove_area(&mut self, areas: &mut [Area], area: AreaId) -> Result<()> {
        self.ensure_current()?;
        let slot = areas.get_mut(area.0).ok_or(DistributionError::UnknownArea(area))?;
        if !self.current_areas.remove(&area) {
            return Err(ConsistencyError::AreaNotOccupied {
                lineage: self.lineage_id,
                area,
            }
            .into());
        }
        slot.host_lineages.remove(&self.index);
        if let Some(bits) = self.debug_distribution.as_mut() {
            bits.set(area, false);
        }
        Ok(())
    }

    pub fn clear_areas(&mut self, areas: &mut [Area]) {
        for area in std::mem::take(&mut self.current_areas) {
            if let Some(slot) = areas.get_mut(area.0) {
                slot.host_lineages.remove(&self.index);
            }
        }
    }

    pub fn has_area(&self, area: AreaId) -> bool {
        self.current_areas.contains(&area)
    }

    pub fn current_area_iter(&self) -> impl Iterator<Item = AreaId> + '_ {
        self.current_areas.iter().copied()
    }

    pub fn num_current_areas(&self) -> usize {
        self.current_areas.len()
    }

    fn extancy_error(&self, time: SimTime) -> ConsistencyError {
        ConsistencyError::ExtancyMismatch {
            lineage: self.lineage_id,
            leafset: self.leafset_bitstring.clone(),
            start: self.start_time,
            end: self.end_time,
            time,
            extancy: self.extancy,
        }
    }

    /// Check that this host may carry symbionts at `time`: the time lies in
    /// its lifespan and the lineage is current.
    ///
    /// With `ignore_fail`, failures are logged and `Ok` is returned.
    pub fn assert_correctly_extant(&self, time: SimTime, ignore_fail: bool) -> Result<()> {
        let checks = [
            ("prematurely active host", time > self.start_time || (time - self.start_time).abs() < TIME_EPSILON),
            ("extinct host", time < self.end_time || (time - self.end_time).abs() < TIME_EPSILON),
            ("host not current", self.extancy == Extancy::Current),
        ];
        for (label, ok) in checks {
            if ok {
                continue;
            }
            let err = self.extancy_error(time);
            if ignore_fail {
                warn!("{}: {}", label, err);
            } else {
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Check the extancy state against `time`.
    ///
    /// At a boundary (within epsilon of start or end) either adjacent state
    /// is accepted.
    pub fn debug_check_extancy_state(&self, time: SimTime) -> Result<()> {
        let diff_start = time - self.start_time;
        let diff_end = time - self.end_time;
        let ok = if diff_start < -TIME_EPSILON {
            self.extancy == Extancy::Pre
        } else if diff_end > TIME_EPSILON {
            self.extancy == Extancy::Post
        } else if diff_start.abs() < TIME_EPSILON {
            matches!(self.extancy, Extancy::Current | Extancy::Pre)
        } else if diff_end.abs() < TIME_EPSILON {
            matches!(self.extancy, Extancy::Current | Extancy::Post)
        } else {
            self.extancy == Extancy::Current
        };
        if ok {
            Ok(())
        } else {
            Err(self.extancy_error(time).into())
        }
    }

    fn debug_check_distribution(&self, areas: &[Area], time: Option<SimTime>) -> Result<()> {
        let back_reference = |msg: String| -> Result<()> { Err(ConsistencyError::BackReference(msg).into()) };
        if self.extancy == Extancy::Current {
            if let Some(t) = time {
                if !is_in_range(t, self.start_time, self.end_time) {
                    return Err(self.extancy_error(t).into());
                }
            }
            if let Some(bits) = &self.debug_distribution {
                let current: Distribution = Distribution::from_bits(
                    (0..areas.len()).map(|i| self.current_areas.contains(&AreaId(i))).collect(),
                );
                if &current != bits {
                    return back_reference(format!(
                        "host lineage {} occupies {}, replayed distribution is {}",
                        self.lineage_id, current, bits
                    ));
                }
            }
            for area in areas {
                let occupies = self.current_areas.contains(&area.index);
                if occupies != area.has_host(self.index) {
                    return back_reference(format!(
                        "host lineage {} occupancy of {} is {}, area lists host: {}",
                        self.lineage_id,
                        area.index,
                        occupies,
                        area.has_host(self.index)
                    ));
                }
            }
        } else {
            if let Some(t) = time {
                let ok = match self.extancy {
                    Extancy::Pre => t <= self.start_time + TIME_EPSILON,
                    _ => t >= self.end_time - TIME_EPSILON,
                };
                if !ok {
                    return Err(self.extancy_error(t).into());
                }
            }
            if !self.current_areas.is_empty() {
                return back_reference(format!(
                    "host lineage {} is '{}' but occupies {} areas",
                    self.lineage_id,
                    self.extancy,
                    self.current_areas.len()
                ));
            }
            if let Some(area) = areas.iter().find(|a| a.has_host(self.index)) {
                return back_reference(format!(
                    "host lineage {} is '{}' but {} lists it",
                    self.lineage_id, self.extancy, area.index
                ));
            }
        }
        Ok(())
    }

    pub fn debug_check(&self, areas: &[Area], time: Option<SimTime>) -> Result<()> {
        if let Some(t) = time {
            self.debug_check_extancy_state(t)?;
        }
        self.debug_check_distribution(areas, time)
    }
}

/// All host-side state of one replicate.
#[derive(Debug, Clone)]
pub struct HostSystem {
    history: Arc<HostHistory>,
    time_scale_factor: f64,
    start_time: SimTime,
    end_time: SimTime,
    areas: Vec<Area>,
    host_lineages: Vec<HostLineage>,
    hosts_by_lineage: HashMap<LineageId, HostId>,
    seed_host: HostId,
    host_events: Vec<HostEvent>,
    debug_mode: bool,
}

impl HostSystem {
    /// Project `history` onto symbiont time.
    ///
    /// Host lineages are indexed in ascending lineage-id order; that order
    /// is the fixed host ordering of every occupancy bitstring.
    pub fn new(history: Arc<HostHistory>, time_scale_factor: f64, debug_mode: bool) -> Result<Self> {
        check_time_scale_factor(time_scale_factor)?;
        let areas: Vec<Area> = (0..history.num_areas()).map(|i| Area::new(AreaId(i))).collect();

        let mut host_lineages = Vec::with_capacity(history.num_lineages());
        let mut hosts_by_lineage = HashMap::new();
        for (idx, def) in history.lineages().enumerate() {
            if def.lineage_start_distribution_bitstring.width() != areas.len() {
                return Err(HistoryError::WidthMismatch {
                    lineage: def.lineage_id,
                    bitstring: def.lineage_start_distribution_bitstring.to_string(),
                    expected: areas.len(),
                    found: def.lineage_start_distribution_bitstring.width(),
                }
                .into());
            }
            host_lineages.push(HostLineage::new(HostId(idx), def, time_scale_factor));
            hosts_by_lineage.insert(def.lineage_id, HostId(idx));
        }
        let seed_host = *hosts_by_lineage
            .get(&history.seed_lineage())
            .ok_or(HistoryError::MissingLineage(history.seed_lineage()))?;

        let host_events = history.events().iter().map(|e| e.rescaled(time_scale_factor)).collect();

        Ok(Self {
            start_time: history.start_time() * time_scale_factor,
            end_time: history.end_time() * time_scale_factor,
            history,
            time_scale_factor,
            areas,
            host_lineages,
            hosts_by_lineage,
            seed_host,
            host_events,
            debug_mode,
        })
    }

    pub fn history(&self) -> &Arc<HostHistory> {
        &self.history
    }

    pub fn time_scale_factor(&self) -> f64 {
        self.time_scale_factor
    }

    pub fn start_time(&self) -> SimTime {
        self.start_time
    }

    pub fn end_time(&self) -> SimTime {
        self.end_time
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub fn area(&self, area: AreaId) -> Result<&Area> {
        Ok(self.areas.get(area.0).ok_or(DistributionError::UnknownArea(area))?)
    }

    pub fn num_areas(&self) -> usize {
        self.areas.len()
    }

    pub fn host_lineages(&self) -> &[HostLineage] {
        &self.host_lineages
    }

    pub fn host(&self, host: HostId) -> Result<&HostLineage> {
        Ok(self.host_lineages.get(host.0).ok_or(DistributionError::UnknownHost(host))?)
    }

    pub fn num_hosts(&self) -> usize {
        self.host_lineages.len()
    }

    pub fn host_by_lineage(&self, lineage: LineageId) -> Result<HostId> {
        Ok(*self
            .hosts_by_lineage
            .get(&lineage)
            .ok_or(HistoryError::MissingLineage(lineage))?)
    }

    pub fn seed_host(&self) -> HostId {
        self.seed_host
    }

    /// Host events with times in symbiont units, ascending.
    pub fn host_events(&self) -> &[HostEvent] {
        &self.host_events
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    /// Normalised patristic distance between two host lineages.
    pub fn patristic_distance(&self, a: HostId, b: HostId) -> Option<f64> {
        let (a, b) = (self.host(a).ok()?, self.host(b).ok()?);
        self.history.patristic_distance(a.lineage_id, b.lineage_id)
    }

    pub fn activate_host(&mut self, host: HostId, time: Option<SimTime>) -> Result<()> {
        let debug_mode = self.debug_mode;
        let lineage = self.host_lineages.get_mut(host.0).ok_or(DistributionError::UnknownHost(host))?;
        lineage.activate(&mut self.areas, time, debug_mode)
    }

    pub fn deactivate_host(&mut self, host: HostId) -> Result<()> {
        let lineage = self.host_lineages.get_mut(host.0).ok_or(DistributionError::UnknownHost(host))?;
        lineage.deactivate(&mut self.areas)
    }

    pub fn add_host_area(&mut self, host: HostId, area: AreaId) -> Result<()> {
        let lineage = self.host_lineages.get_mut(host.0).ok_or(DistributionError::UnknownHost(host))?;
        lineage.add_area(&mut self.areas, area)
    }

    pub fn remove_host_area(&mut self, host: HostId, area: AreaId) -> Result<()> {
        let lineage = self.host_lineages.get_mut(host.0).ok_or(DistributionError::UnknownHost(host))?;
        lineage.remove_area(&mut self.areas, area)
    }

    pub fn clear_host_areas(&mut self, host: HostId) -> Result<()> {
        let lineage = self.host_lineages.get_mut(host.0).ok_or(DistributionError::UnknownHost(host))?;
        lineage.clear_areas(&mut self.areas);
        Ok(())
    }

    pub(crate) fn register_symbiont(&mut self, area: AreaId, symbiont: SymbiontId) -> Result<()> {
        let slot = self.areas.get_mut(area.0).ok_or(DistributionError::UnknownArea(area))?;
        slot.symbiont_lineages.insert(symbiont);
        Ok(())
    }

    pub(crate) fn unregister_symbiont(&mut self, area: AreaId, symbiont: SymbiontId) -> Result<()> {
        let slot = self.areas.get_mut(area.0).ok_or(DistributionError::UnknownArea(area))?;
        slot.symbiont_lineages.remove(&symbiont);
        Ok(())
    }

    /// Hosts whose `[start, end]` interval contains `time`.
    ///
    /// Linear scan; an interval index would pay off only if this is queried
    /// far more often than once per event.
    pub fn extant_host_lineages_at_current_time(&self, time: SimTime) -> Vec<HostId> {
        self.host_lineages
            .iter()
            .filter(|h| h.start_time <= time && h.end_time >= time)
            .map(|h| h.index)
            .collect()
    }

    /// Hosts currently in the `current` state.
    pub fn current_host_iter(&self) -> impl Iterator<Item = &HostLineage> {
        self.host_lineages.iter().filter(|h| h.is_current())
    }

    pub fn debug_check(&self, time: Option<SimTime>) -> Result<()> {
        for host in &self.host_lineages {
            host.debug_check(&self.areas, time)?;
        }
        for area in &self.areas {
            for host in &area.host_lineages {
                if !self.host(*host)?.has_area(area.index) {
                    return Err(ConsistencyError::BackReference(format!(
                        "{} lists {} which does not occupy it",
                        area.index, host
                    ))
                    .into());
                }
            }
        }
        for event in &self.host_events {
            if let HostEventKind::Anagenesis { area_idx, .. } = &event.kind {
                self.area(*area_idx)?;
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn host_mut_for_test(&mut self, host: HostId) -> &mut HostLineage {
        &mut self.host_lineages[host.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::cherry_history;

    fn system() -> HostSystem {
        HostSystem::new(Arc::new(cherry_history()), 2.0, true).unwrap()
    }

    #[test]
    fn times_are_rescaled() {
        let system = system();
        assert_eq!(system.end_time(), 6.0);
        let seed = system.host(system.seed_host()).unwrap();
        assert_eq!(seed.end_time, 2.0);
        let times: Vec<f64> = system.host_events().iter().map(|e| e.event_time).collect();
        assert_eq!(times, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn activation_seeds_areas_and_back_references() {
        let mut system = system();
        let seed = system.seed_host();
        system.activate_host(seed, Some(0.0)).unwrap();
        let host = system.host(seed).unwrap();
        assert_eq!(host.extancy(), Extancy::Current);
        assert_eq!(host.current_area_iter().collect::<Vec<_>>(), vec![AreaId(1), AreaId(2)]);
        assert!(system.area(AreaId(1)).unwrap().has_host(seed));
        assert!(!system.area(AreaId(0)).unwrap().has_host(seed));
        system.debug_check(Some(1.0)).unwrap();

        system.deactivate_host(seed).unwrap();
        assert!(system.area(AreaId(1)).unwrap().host_lineages().is_empty());
        assert_eq!(system.host(seed).unwrap().extancy(), Extancy::Post);
    }

    #[test]
    fn extancy_never_reenters() {
        let mut system = system();
        let seed = system.seed_host();
        assert!(system.deactivate_host(seed).is_err());
        system.activate_host(seed, None).unwrap();
        assert!(system.activate_host(seed, None).is_err());
        system.deactivate_host(seed).unwrap();
        assert!(system.activate_host(seed, None).is_err());
        assert!(system.deactivate_host(seed).is_err());
    }

    #[test]
    fn activation_outside_lifespan_is_rejected() {
        let mut system = system();
        let leaf = system.host_by_lineage(LineageId(1)).unwrap();
        let err = system.activate_host(leaf, Some(0.5)).unwrap_err();
        assert!(err.to_string().contains("outside lifespan"));
        assert_eq!(system.host(leaf).unwrap().extancy(), Extancy::Pre);
    }

    #[test]
    fn boundary_extancy_is_tolerated() {
        let mut system = system();
        let seed = system.seed_host();
        system.activate_host(seed, None).unwrap();
        let host = system.host(seed).unwrap();
        assert!(host.debug_check_extancy_state(2.0 + 1e-9).is_ok());
        assert!(host.debug_check_extancy_state(2.5).is_err());
        assert!(host.assert_correctly_extant(2.5, true).is_ok());
        assert!(host.assert_correctly_extant(2.5, false).is_err());
    }

    #[test]
    fn area_mutators_are_symmetric() {
        let mut system = system();
        let seed = system.seed_host();
        system.activate_host(seed, None).unwrap();
        system.add_host_area(seed, AreaId(0)).unwrap();
        assert!(system.area(AreaId(0)).unwrap().has_host(seed));
        assert!(system.add_host_area(seed, AreaId(0)).is_err());
        system.remove_host_area(seed, AreaId(1)).unwrap();
        assert!(system.remove_host_area(seed, AreaId(1)).is_err());
        system.debug_check(None).unwrap();

        // bypassing the mutators is caught by the audit
        system.host_mut_for_test(seed).current_areas.insert(AreaId(1));
        assert!(system.debug_check(None).is_err());
    }

    #[test]
    fn only_current_hosts_change_areas() {
        let mut system = system();
        let leaf = system.host_by_lineage(LineageId(1)).unwrap();
        let err = system.add_host_area(leaf, AreaId(0)).unwrap_err();
        assert!(err.to_string().contains("'pre'"), "{}", err);
        assert!(system.remove_host_area(leaf, AreaId(1)).is_err());
        assert!(system.area(AreaId(0)).unwrap().host_lineages().is_empty());
        system.debug_check(None).unwrap();

        let seed = system.seed_host();
        system.activate_host(seed, None).unwrap();
        system.deactivate_host(seed).unwrap();
        assert!(system.add_host_area(seed, AreaId(0)).is_err());
        assert!(system.area(AreaId(0)).unwrap().host_lineages().is_empty());
    }

    #[test]
    fn non_positive_time_scale_is_rejected() {
        for factor in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = HostSystem::new(Arc::new(cherry_history()), factor, false).unwrap_err();
            assert!(err.is_config(), "{}", err);
        }
    }

    #[test]
    fn extant_hosts_by_interval() {
        let system = system();
        let seed = system.seed_host();
        assert_eq!(system.extant_host_lineages_at_current_time(1.0), vec![seed]);
        assert_eq!(system.extant_host_lineages_at_current_time(2.0).len(), 3);
        assert_eq!(system.extant_host_lineages_at_current_time(5.0).len(), 2);
    }
}
