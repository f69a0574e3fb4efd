//! Cladogenetic inheritance — how a speciating symbiont lineage's cells are
//! divided between its two daughters.
//!
//! A split partitions either the infected hosts (host-assemblage process) or
//! the occupied areas (geographical-range process). Within a process the
//! daughters are formed by one of four modes:
//!
//! - **sympatric subset**: one daughter keeps the full range, the other
//!   takes a single unit of it. Needs at least two units.
//! - **single-unit vicariance**: one unit versus the rest. Needs two units.
//! - **widespread vicariance**: a random split leaving at least two units on
//!   each side. Needs four units.
//! - **founder event**: one daughter keeps the full range, the other jumps
//!   to a unit the parent does not use. Needs a reachable unit.
//!
//! Every eligible (process, mode) pair competes with its configured weight;
//! founder weights are further scaled by the lineage's gain weight.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use inphest_core::model::{CladogeneticProcess, InphestModel, SpeciationMode};
use inphest_core::types::{AreaId, HostId};

use crate::host::HostSystem;
use crate::sampling::weighted_index;
use crate::symbiont::{Cell, SymbiontLineage};

/// A chosen speciation mode and the cells each daughter receives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CladogeneticSplit {
    pub process: CladogeneticProcess,
    pub mode: SpeciationMode,
    pub daughters: [Vec<Cell>; 2],
}

/// One side of the range a process partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Host(HostId),
    Area(AreaId),
}

impl Unit {
    fn contains(self, (host, area): Cell) -> bool {
        match self {
            Unit::Host(h) => h == host,
            Unit::Area(a) => a == area,
        }
    }
}

/// Lineage-specific inputs to mode selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitWeights {
    /// Host-gain weight of the lineage; scales the host-side founder weight.
    pub host_gain_weight: f64,
    /// Area-gain weight of the lineage; scales the area-side founder weight.
    pub area_gain_weight: f64,
}

impl Default for SplitWeights {
    fn default() -> Self {
        Self {
            host_gain_weight: 1.0,
            area_gain_weight: 1.0,
        }
    }
}

fn units(process: CladogeneticProcess, lineage: &SymbiontLineage) -> Vec<Unit> {
    match process {
        CladogeneticProcess::HostAssemblage => lineage.host_iter().map(Unit::Host).collect(),
        CladogeneticProcess::GeographicalRange => lineage.area_iter().map(Unit::Area).collect(),
    }
}

/// Cells a founder daughter could jump to, grouped per target unit.
fn founder_targets(process: CladogeneticProcess, system: &HostSystem, lineage: &SymbiontLineage) -> Vec<Vec<Cell>> {
    match process {
        // a current host the lineage does not infect, in every area it occupies
        CladogeneticProcess::HostAssemblage => system
            .current_host_iter()
            .filter(|h| !lineage.has_host(h.index) && h.num_current_areas() > 0)
            .map(|h| h.current_area_iter().map(|a| (h.index, a)).collect())
            .collect(),
        // a new area reached through an already infected host
        CladogeneticProcess::GeographicalRange => {
            let mut targets = Vec::new();
            for host in lineage.host_iter().filter_map(|h| system.host(h).ok()) {
                for area in host.current_area_iter() {
                    if !lineage.has_area(area) {
                        targets.push(vec![(host.index, area)]);
                    }
                }
            }
            targets
        }
    }
}

fn is_eligible(mode: SpeciationMode, num_units: usize, num_founder_targets: usize) -> bool {
    match mode {
        SpeciationMode::SympatricSubset | SpeciationMode::SingleUnitVicariance => num_units >= 2,
        SpeciationMode::WidespreadVicariance => num_units >= 4,
        SpeciationMode::FounderEvent => num_founder_targets > 0,
    }
}

/// Choose a speciation mode for `lineage` and build the daughter
/// distributions. `None` when no mode is eligible or every eligible mode has
/// zero weight.
pub fn choose_split<R: Rng + ?Sized>(
    rng: &mut R,
    model: &InphestModel,
    system: &HostSystem,
    lineage: &SymbiontLineage,
    weights: SplitWeights,
) -> Option<CladogeneticSplit> {
    let processes = [CladogeneticProcess::HostAssemblage, CladogeneticProcess::GeographicalRange];
    let mut candidates = Vec::new();
    let mut candidate_weights = Vec::new();
    for process in processes {
        let units = units(process, lineage);
        let targets = founder_targets(process, system, lineage);
        let gain_weight = match process {
            CladogeneticProcess::HostAssemblage => weights.host_gain_weight,
            CladogeneticProcess::GeographicalRange => weights.area_gain_weight,
        };
        let configured = model.cladogenesis(process);
        for mode in SpeciationMode::ALL {
            if !is_eligible(mode, units.len(), targets.len()) {
                continue;
            }
            let mut weight = configured.weight(mode);
            if mode == SpeciationMode::FounderEvent {
                weight *= gain_weight;
            }
            if weight.is_finite() && weight > 0.0 {
                candidates.push((process, mode, units.clone(), targets.clone()));
                candidate_weights.push(weight);
            }
        }
    }

    let idx = weighted_index(rng, &candidate_weights)?;
    let (process, mode, units, targets) = candidates.swap_remove(idx);
    let daughters = partition(rng, mode, lineage, &units, targets)?;
    Some(CladogeneticSplit {
        process,
        mode,
        daughters,
    })
}

fn cells_in(lineage: &SymbiontLineage, units: &[Unit]) -> Vec<Cell> {
    lineage
        .cell_iter()
        .filter(|cell| units.iter().any(|u| u.contains(*cell)))
        .collect()
}

fn partition<R: Rng + ?Sized>(
    rng: &mut R,
    mode: SpeciationMode,
    lineage: &SymbiontLineage,
    units: &[Unit],
    mut targets: Vec<Vec<Cell>>,
) -> Option<[Vec<Cell>; 2]> {
    let full: Vec<Cell> = lineage.cell_iter().collect();
    let mut daughters = match mode {
        SpeciationMode::SympatricSubset => {
            let unit = units.choose(rng)?;
            [full, cells_in(lineage, &[*unit])]
        }
        SpeciationMode::SingleUnitVicariance => {
            let i = rng.gen_range(0..units.len());
            let rest: Vec<Unit> = units.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, u)| *u).collect();
            [cells_in(lineage, &units[i..=i]), cells_in(lineage, &rest)]
        }
        SpeciationMode::WidespreadVicariance => {
            let mut shuffled = units.to_vec();
            shuffled.shuffle(rng);
            let k = rng.gen_range(2..=shuffled.len() - 2);
            let (left, right) = shuffled.split_at(k);
            [cells_in(lineage, left), cells_in(lineage, right)]
        }
        SpeciationMode::FounderEvent => {
            let i = rng.gen_range(0..targets.len());
            [full, targets.swap_remove(i)]
        }
    };
    if rng.gen_bool(0.5) {
        daughters.swap(0, 1);
    }
    Some(daughters)
}
