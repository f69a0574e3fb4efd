//! Symbiont lineages and their host × area association caches.
//!
//! Each [`SymbiontLineage`] owns a dense occupancy matrix over every
//! (host, area) cell of its [`HostSystem`], plus two derived indices (the
//! set of infected hosts and the set of occupied areas) and a count of
//! occupied cells. The matrix, the indices, the count and each
//! [`Area`](crate::host::Area)'s symbiont registry agree after every public
//! mutation. Queries walk the indices, never the whole matrix.
//!
//! A live lineage must occupy at least one cell. Removals that would leave
//! it with none fail with a null-distribution error *before* anything is
//! changed.

use std::collections::BTreeSet;

use inphest_core::error::{ConsistencyError, DistributionError, InphestError, Result};
use inphest_core::types::{AreaId, HostId, SimTime, SymbiontId};

use crate::host::HostSystem;

/// One (host, area) occupancy cell.
pub type Cell = (HostId, AreaId);

#[derive(Debug, Clone)]
pub struct SymbiontLineage {
    index: SymbiontId,
    num_hosts: usize,
    num_areas: usize,
    host_area_distribution: Vec<bool>,
    num_occupied_cells: usize,
    infected_hosts: BTreeSet<HostId>,
    infected_areas: BTreeSet<AreaId>,
    is_extant: bool,
    edge_length: f64,
}

impl SymbiontLineage {
    /// A lineage with an empty distribution. Callers populate it before
    /// handing it to the running process.
    pub fn new(index: SymbiontId, system: &HostSystem) -> Self {
        let (num_hosts, num_areas) = (system.num_hosts(), system.num_areas());
        Self {
            index,
            num_hosts,
            num_areas,
            host_area_distribution: vec![false; num_hosts * num_areas],
            num_occupied_cells: 0,
            infected_hosts: BTreeSet::new(),
            infected_areas: BTreeSet::new(),
            is_extant: true,
            edge_length: 0.0,
        }
    }

    pub fn index(&self) -> SymbiontId {
        self.index
    }

    pub fn is_extant(&self) -> bool {
        self.is_extant
    }

    pub(crate) fn set_extant(&mut self, extant: bool) {
        self.is_extant = extant;
    }

    pub fn edge_length(&self) -> f64 {
        self.edge_length
    }

    pub(crate) fn add_edge_length(&mut self, dt: f64) {
        self.edge_length += dt;
    }

    fn slot(&self, host: HostId, area: AreaId) -> Option<usize> {
        (host.0 < self.num_hosts && area.0 < self.num_areas).then(|| host.0 * self.num_areas + area.0)
    }

    fn set_cell(&mut self, host: HostId, area: AreaId, present: bool) {
        let Some(i) = self.slot(host, area) else {
            return;
        };
        if self.host_area_distribution[i] != present {
            self.host_area_distribution[i] = present;
            if present {
                self.num_occupied_cells += 1;
            } else {
                self.num_occupied_cells -= 1;
            }
        }
    }

    /// Infect `host` in `area`, or in every area the host currently occupies
    /// when `area` is `None`.
    ///
    /// The host must be current and must occupy the area.
    pub fn add_host_in_area(&mut self, system: &mut HostSystem, host: HostId, area: Option<AreaId>) -> Result<()> {
        let lineage = system.host(host)?;
        if !lineage.is_current() {
            return Err(DistributionError::HostNotExtant {
                host,
                extancy: lineage.extancy(),
            }
            .into());
        }
        let areas: Vec<AreaId> = match area {
            Some(a) => {
                system.area(a)?;
                if !lineage.has_area(a) {
                    return Err(DistributionError::HostNotInArea { host, area: a }.into());
                }
                vec![a]
            }
            None => lineage.current_area_iter().collect(),
        };
        for a in areas {
            self.set_cell(host, a, true);
            self.infected_areas.insert(a);
            system.register_symbiont(a, self.index)?;
            self.infected_hosts.insert(host);
        }
        Ok(())
    }

    /// Remove `host` from `area`, or from every area when `area` is `None`.
    pub fn remove_host_in_area(&mut self, system: &mut HostSystem, host: HostId, area: Option<AreaId>) -> Result<()> {
        let Some(a) = area else {
            return self.remove_host(system, host);
        };
        if !system.host(host)?.has_area(a) {
            return Err(DistributionError::HostNotInArea { host, area: a }.into());
        }
        if !self.has_host_in_area(host, a) {
            return Err(DistributionError::NotAssociated {
                lineage: self.index,
                host,
                area: a,
            }
            .into());
        }
        self.ensure_survives(&[(host, a)])?;
        self.set_cell(host, a, false);
        self.sync_area_cache(system, a, false)?;
        self.sync_host_cache(system, host, false)?;
        self.check_for_null_distribution()
    }

    /// Remove every association with `host`.
    pub fn remove_host(&mut self, system: &mut HostSystem, host: HostId) -> Result<()> {
        if !self.has_host(host) {
            return Err(DistributionError::HostNotInfected {
                lineage: self.index,
                host,
            }
            .into());
        }
        let cells: Vec<Cell> = self.areas_in_host_iter(host).map(|a| (host, a)).collect();
        self.ensure_survives(&cells)?;
        for (h, a) in &cells {
            self.set_cell(*h, *a, false);
        }
        for (_, a) in &cells {
            self.sync_area_cache(system, *a, false)?;
        }
        self.infected_hosts.remove(&host);
        self.check_for_null_distribution()
    }

    /// Remove every association in `area`, across all hosts.
    pub fn remove_area(&mut self, system: &mut HostSystem, area: AreaId) -> Result<()> {
        if !self.has_area(area) {
            return Err(DistributionError::AreaNotOccupied {
                lineage: self.index,
                area,
            }
            .into());
        }
        let cells: Vec<Cell> = self
            .infected_hosts
            .iter()
            .filter(|h| self.has_host_in_area(**h, area))
            .map(|h| (*h, area))
            .collect();
        self.ensure_survives(&cells)?;
        for (h, a) in &cells {
            self.set_cell(*h, *a, false);
        }
        for (h, _) in &cells {
            self.sync_host_cache(system, *h, false)?;
        }
        self.infected_areas.remove(&area);
        system.unregister_symbiont(area, self.index)?;
        self.check_for_null_distribution()
    }

    /// Whether some occupied cell remains once `removing` is cleared.
    pub fn survives_removal(&self, removing: &[Cell]) -> bool {
        self.cell_iter().any(|cell| !removing.contains(&cell))
    }

    fn ensure_survives(&self, removing: &[Cell]) -> Result<()> {
        if self.survives_removal(removing) {
            Ok(())
        } else {
            Err(InphestError::null_distribution(self.index))
        }
    }

    /// Re-derive membership of `area` in the occupied-area set.
    ///
    /// Scans the hosts listed on the area, or every host in the system when
    /// `search_all_hosts` is set.
    pub fn sync_area_cache(&mut self, system: &mut HostSystem, area: AreaId, search_all_hosts: bool) -> Result<()> {
        let occupied = if search_all_hosts {
            (0..self.num_hosts).any(|h| self.has_host_in_area(HostId(h), area))
        } else {
            system
                .area(area)?
                .host_lineages()
                .iter()
                .any(|h| self.has_host_in_area(*h, area))
        };
        if occupied {
            self.infected_areas.insert(area);
            system.register_symbiont(area, self.index)
        } else {
            self.infected_areas.remove(&area);
            system.unregister_symbiont(area, self.index)
        }
    }

    /// Re-derive membership of `host` in the infected-host set.
    ///
    /// Scans the areas the host currently occupies, or every area when
    /// `search_all_areas` is set.
    pub fn sync_host_cache(&mut self, system: &HostSystem, host: HostId, search_all_areas: bool) -> Result<()> {
        let infected = if search_all_areas {
            (0..self.num_areas).any(|a| self.has_host_in_area(host, AreaId(a)))
        } else {
            system
                .host(host)?
                .current_area_iter()
                .any(|a| self.has_host_in_area(host, a))
        };
        if infected {
            self.infected_hosts.insert(host);
        } else {
            self.infected_hosts.remove(&host);
        }
        Ok(())
    }

    pub fn check_for_null_distribution(&self) -> Result<()> {
        if self.infected_hosts.is_empty() || self.infected_areas.is_empty() {
            Err(InphestError::null_distribution(self.index))
        } else {
            Ok(())
        }
    }

    pub fn has_host(&self, host: HostId) -> bool {
        self.infected_hosts.contains(&host)
    }

    pub fn has_host_in_area(&self, host: HostId, area: AreaId) -> bool {
        self.slot(host, area)
            .map(|i| self.host_area_distribution[i])
            .unwrap_or(false)
    }

    pub fn has_area(&self, area: AreaId) -> bool {
        self.infected_areas.contains(&area)
    }

    pub fn host_iter(&self) -> impl Iterator<Item = HostId> + '_ {
        self.infected_hosts.iter().copied()
    }

    pub fn area_iter(&self) -> impl Iterator<Item = AreaId> + '_ {
        self.infected_areas.iter().copied()
    }

    /// Areas in which this lineage is associated with `host`.
    pub fn areas_in_host_iter(&self, host: HostId) -> impl Iterator<Item = AreaId> + '_ {
        self.infected_areas
            .iter()
            .copied()
            .filter(move |a| self.has_host_in_area(host, *a))
    }

    /// Occupied cells, grouped by infected host.
    pub fn cell_iter(&self) -> impl Iterator<Item = Cell> + '_ {
        self.infected_hosts
            .iter()
            .flat_map(move |h| self.areas_in_host_iter(*h).map(move |a| (*h, a)))
    }

    pub fn num_hosts(&self) -> usize {
        self.infected_hosts.len()
    }

    pub fn num_areas(&self) -> usize {
        self.infected_areas.len()
    }

    pub fn num_cells(&self) -> usize {
        self.num_occupied_cells
    }

    /// Zero every cell and detach from every area.
    ///
    /// Leaves the lineage null; only valid on a lineage being retired or
    /// about to be repopulated.
    pub fn clear_distribution(&mut self, system: &mut HostSystem) -> Result<()> {
        self.host_area_distribution.iter_mut().for_each(|c| *c = false);
        self.num_occupied_cells = 0;
        for area in std::mem::take(&mut self.infected_areas) {
            system.unregister_symbiont(area, self.index)?;
        }
        self.infected_hosts.clear();
        Ok(())
    }

    /// Add every occupied cell of `other` to this lineage. Existing cells
    /// are kept.
    pub fn update_distribution(&mut self, system: &mut HostSystem, other: &SymbiontLineage) -> Result<()> {
        let cells: Vec<Cell> = other.cell_iter().collect();
        self.add_cells(system, &cells)
    }

    pub(crate) fn add_cells(&mut self, system: &mut HostSystem, cells: &[Cell]) -> Result<()> {
        for (h, a) in cells {
            if !self.has_host_in_area(*h, *a) {
                self.add_host_in_area(system, *h, Some(*a))?;
            }
        }
        Ok(())
    }

    /// One bit per host lineage of the system, in host order.
    pub fn host_occurrences_bitstring(&self) -> String {
        (0..self.num_hosts)
            .map(|h| if self.has_host(HostId(h)) { '1' } else { '0' })
            .collect()
    }

    /// `s<index>^<host occurrences>`.
    pub fn encoded_label(&self) -> String {
        format!("s{}^{}", self.index.0, self.host_occurrences_bitstring())
    }

    /// Full-matrix audit of the caches and area registries.
    ///
    /// With `time`, every infected host must also be correctly extant; with
    /// `ignore_nonextant_host_check_fail` those failures are only logged.
    pub fn debug_check(
        &self,
        system: &HostSystem,
        time: Option<SimTime>,
        ignore_nonextant_host_check_fail: bool,
    ) -> Result<()> {
        let out_of_sync = |detail: String| -> Result<()> {
            Err(ConsistencyError::CacheOutOfSync {
                lineage: self.index,
                detail,
            }
            .into())
        };

        let mut infected_hosts = BTreeSet::new();
        let mut infected_areas = BTreeSet::new();
        let mut num_cells = 0;
        for h in 0..self.num_hosts {
            for a in 0..self.num_areas {
                let (host, area) = (HostId(h), AreaId(a));
                if !self.has_host_in_area(host, area) {
                    continue;
                }
                num_cells += 1;
                infected_hosts.insert(host);
                infected_areas.insert(area);
                let slot = system.area(area)?;
                if !slot.has_host(host) {
                    return Err(ConsistencyError::BackReference(format!(
                        "{} occupies ({}, {}) but {} does not list the host",
                        self.index, host, area, area
                    ))
                    .into());
                }
                if !slot.has_symbiont(self.index) {
                    return Err(ConsistencyError::BackReference(format!(
                        "{} occupies ({}, {}) but {} does not list the symbiont",
                        self.index, host, area, area
                    ))
                    .into());
                }
            }
        }
        if infected_hosts.is_empty() {
            return Err(InphestError::null_distribution(self.index));
        }
        if infected_hosts != self.infected_hosts {
            return out_of_sync(format!(
                "infected hosts {:?} != cached {:?}",
                infected_hosts, self.infected_hosts
            ));
        }
        if infected_areas != self.infected_areas {
            return out_of_sync(format!(
                "infected areas {:?} != cached {:?}",
                infected_areas, self.infected_areas
            ));
        }
        if num_cells != self.num_occupied_cells {
            return out_of_sync(format!(
                "{} occupied cells != cached count {}",
                num_cells, self.num_occupied_cells
            ));
        }
        for area in system.areas() {
            if !infected_areas.contains(&area.index) && area.has_symbiont(self.index) {
                return Err(ConsistencyError::BackReference(format!(
                    "{} lists {} which does not occupy it",
                    area.index, self.index
                ))
                .into());
            }
        }
        if let Some(t) = time {
            for host in &self.infected_hosts {
                system
                    .host(*host)?
                    .assert_correctly_extant(t, ignore_nonextant_host_check_fail)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::cherry_history;
    use inphest_core::types::LineageId;
    use std::sync::Arc;

    /// Cherry history at t=1, with both leaves activated so two hosts share
    /// areas 1 and 2.
    fn split_system() -> (HostSystem, HostId, HostId) {
        let mut system = HostSystem::new(Arc::new(cherry_history()), 1.0, false).unwrap();
        let a = system.host_by_lineage(LineageId(1)).unwrap();
        let b = system.host_by_lineage(LineageId(6)).unwrap();
        system.activate_host(a, Some(1.0)).unwrap();
        system.activate_host(b, Some(1.0)).unwrap();
        (system, a, b)
    }

    #[test]
    fn add_host_in_all_areas() {
        let (mut system, a, _) = split_system();
        let mut s = SymbiontLineage::new(SymbiontId(0), &system);
        s.add_host_in_area(&mut system, a, None).unwrap();
        assert!(s.has_host(a));
        assert_eq!(s.area_iter().collect::<Vec<_>>(), vec![AreaId(1), AreaId(2)]);
        assert!(system.area(AreaId(2)).unwrap().has_symbiont(SymbiontId(0)));
        s.debug_check(&system, Some(1.5), false).unwrap();
    }

    #[test]
    fn add_rejects_unoccupied_area_and_inactive_host() {
        let (mut system, a, _) = split_system();
        let mut s = SymbiontLineage::new(SymbiontId(0), &system);
        let err = s.add_host_in_area(&mut system, a, Some(AreaId(0))).unwrap_err();
        assert!(matches!(err, InphestError::Distribution(DistributionError::HostNotInArea { .. })));

        let seed = system.seed_host();
        let err = s.add_host_in_area(&mut system, seed, None).unwrap_err();
        assert!(err.to_string().contains("not current"));
    }

    #[test]
    fn removal_resyncs_caches() {
        let (mut system, a, b) = split_system();
        let mut s = SymbiontLineage::new(SymbiontId(0), &system);
        s.add_host_in_area(&mut system, a, None).unwrap();
        s.add_host_in_area(&mut system, b, Some(AreaId(1))).unwrap();

        // area 1 still occupied through host b
        s.remove_host_in_area(&mut system, a, Some(AreaId(1))).unwrap();
        assert!(s.has_area(AreaId(1)));
        assert!(s.has_host(a));
        s.debug_check(&system, None, false).unwrap();

        // host a loses its last cell
        s.remove_host_in_area(&mut system, a, Some(AreaId(2))).unwrap();
        assert!(!s.has_host(a));
        assert!(!s.has_area(AreaId(2)));
        assert!(!system.area(AreaId(2)).unwrap().has_symbiont(SymbiontId(0)));
        s.debug_check(&system, None, false).unwrap();
    }

    #[test]
    fn null_distribution_is_refused_without_mutation() {
        let (mut system, a, _) = split_system();
        let mut s = SymbiontLineage::new(SymbiontId(4), &system);
        s.add_host_in_area(&mut system, a, Some(AreaId(1))).unwrap();

        let err = s.remove_host_in_area(&mut system, a, Some(AreaId(1))).unwrap_err();
        assert_eq!(err.null_distribution_lineage(), Some(SymbiontId(4)));
        assert!(s.has_host_in_area(a, AreaId(1)));
        s.debug_check(&system, None, false).unwrap();

        assert!(s.remove_host(&mut system, a).is_err());
        assert!(s.remove_area(&mut system, AreaId(1)).is_err());
        s.debug_check(&system, None, false).unwrap();
    }

    #[test]
    fn remove_area_across_hosts() {
        let (mut system, a, b) = split_system();
        let mut s = SymbiontLineage::new(SymbiontId(0), &system);
        s.add_host_in_area(&mut system, a, None).unwrap();
        s.add_host_in_area(&mut system, b, None).unwrap();
        s.remove_area(&mut system, AreaId(1)).unwrap();
        assert!(!s.has_area(AreaId(1)));
        assert!(s.has_host(a) && s.has_host(b));
        assert_eq!(s.num_cells(), 2);
        s.debug_check(&system, None, false).unwrap();
    }

    #[test]
    fn update_distribution_is_additive() {
        let (mut system, a, b) = split_system();
        let mut parent = SymbiontLineage::new(SymbiontId(0), &system);
        parent.add_host_in_area(&mut system, a, None).unwrap();
        let mut child = SymbiontLineage::new(SymbiontId(1), &system);
        child.add_host_in_area(&mut system, b, Some(AreaId(1))).unwrap();
        child.update_distribution(&mut system, &parent).unwrap();
        assert_eq!(child.num_cells(), 3);
        assert_eq!(child.num_hosts(), 2);
        child.debug_check(&system, None, false).unwrap();

        child.clear_distribution(&mut system).unwrap();
        assert_eq!(child.num_cells(), 0);
        assert!(!system.area(AreaId(2)).unwrap().has_symbiont(SymbiontId(1)));
        assert!(system.area(AreaId(1)).unwrap().has_symbiont(SymbiontId(0)));
    }

    #[test]
    fn cell_count_tracks_every_mutation() {
        let (mut system, a, b) = split_system();
        let mut s = SymbiontLineage::new(SymbiontId(0), &system);
        assert_eq!(s.num_cells(), 0);
        s.add_host_in_area(&mut system, a, None).unwrap();
        assert_eq!(s.num_cells(), 2);
        // re-adding an occupied cell is not double counted
        s.add_host_in_area(&mut system, a, Some(AreaId(1))).unwrap();
        assert_eq!(s.num_cells(), 2);
        s.add_host_in_area(&mut system, b, None).unwrap();
        assert_eq!(s.num_cells(), 4);
        s.remove_host_in_area(&mut system, b, Some(AreaId(2))).unwrap();
        assert_eq!(s.num_cells(), 3);
        s.remove_host(&mut system, a).unwrap();
        assert_eq!(s.num_cells(), 1);
        assert_eq!(s.cell_iter().collect::<Vec<_>>(), vec![(b, AreaId(1))]);
        assert_eq!(s.areas_in_host_iter(a).count(), 0);
        s.debug_check(&system, None, false).unwrap();

        // refused removals leave the count alone
        assert!(s.remove_area(&mut system, AreaId(1)).is_err());
        assert_eq!(s.num_cells(), 1);
    }

    #[test]
    fn label_encodes_host_occurrences() {
        let (mut system, _, b) = split_system();
        let mut s = SymbiontLineage::new(SymbiontId(3), &system);
        s.add_host_in_area(&mut system, b, None).unwrap();
        // hosts are ordered by lineage id: 1, 6, 7
        assert_eq!(s.encoded_label(), "s3^010");
    }

    #[test]
    fn debug_check_flags_nonextant_host() {
        let (mut system, a, _) = split_system();
        let mut s = SymbiontLineage::new(SymbiontId(0), &system);
        s.add_host_in_area(&mut system, a, None).unwrap();
        assert!(s.debug_check(&system, Some(10.0), false).is_err());
        assert!(s.debug_check(&system, Some(10.0), true).is_ok());
    }
}
