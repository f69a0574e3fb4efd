//! Symbiont phylogeny — the growing tree of symbiont lineages.
//!
//! Lineage records live in an arena indexed by [`SymbiontId`]; the tree
//! topology is a separate `petgraph` graph over those ids. Extinct
//! lineages are pruned from the topology (suppressing the unifurcation
//! left behind) but keep their arena slot, so ids stay stable.

use std::collections::{BTreeSet, HashMap};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use tracing::debug;

use inphest_core::error::{ConsistencyError, DistributionError, InphestError, Result};
use inphest_core::types::{SimTime, SymbiontId};

use crate::host::HostSystem;
use crate::symbiont::{Cell, SymbiontLineage};

#[derive(Debug, Clone)]
pub struct SymbiontPhylogeny {
    lineages: Vec<SymbiontLineage>,
    tree: StableDiGraph<SymbiontId, ()>,
    nodes: HashMap<SymbiontId, NodeIndex>,
    root: SymbiontId,
    current_lineages: BTreeSet<SymbiontId>,
}

impl SymbiontPhylogeny {
    /// Seed the phylogeny with one lineage infecting the seed host in every
    /// area it occupies. The seed host must already be active.
    pub fn new(system: &mut HostSystem) -> Result<Self> {
        let root = SymbiontId(0);
        let seed_host = system.seed_host();
        let mut seed = SymbiontLineage::new(root, system);
        seed.add_host_in_area(system, seed_host, None)?;
        seed.check_for_null_distribution()?;

        let mut tree = StableDiGraph::new();
        let mut nodes = HashMap::new();
        nodes.insert(root, tree.add_node(root));

        Ok(Self {
            lineages: vec![seed],
            tree,
            nodes,
            root,
            current_lineages: BTreeSet::from([root]),
        })
    }

    pub fn root(&self) -> SymbiontId {
        self.root
    }

    pub fn lineage(&self, id: SymbiontId) -> Option<&SymbiontLineage> {
        self.lineages.get(id.0)
    }

    fn ensure_current(&self, id: SymbiontId) -> Result<()> {
        if self.current_lineages.contains(&id) && self.nodes.contains_key(&id) {
            Ok(())
        } else {
            Err(DistributionError::NotCurrent(id).into())
        }
    }

    pub fn current_lineage(&self, id: SymbiontId) -> Result<&SymbiontLineage> {
        self.ensure_current(id)?;
        self.lineages
            .get(id.0)
            .ok_or_else(|| DistributionError::NotCurrent(id).into())
    }

    /// A current lineage, mutably.
    pub fn current_lineage_mut(&mut self, id: SymbiontId) -> Result<&mut SymbiontLineage> {
        self.ensure_current(id)?;
        self.lineages
            .get_mut(id.0)
            .ok_or_else(|| DistributionError::NotCurrent(id).into())
    }

    pub fn current_lineage_ids(&self) -> Vec<SymbiontId> {
        self.current_lineages.iter().copied().collect()
    }

    pub fn current_lineage_iter(&self) -> impl Iterator<Item = &SymbiontLineage> {
        self.current_lineages.iter().filter_map(|id| self.lineages.get(id.0))
    }

    pub fn num_current_lineages(&self) -> usize {
        self.current_lineages.len()
    }

    /// Lineages ever created, extinct ones included.
    pub fn num_lineages_created(&self) -> usize {
        self.lineages.len()
    }

    pub fn children(&self, id: SymbiontId) -> Vec<SymbiontId> {
        let Some(&node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let mut children: Vec<SymbiontId> = self
            .tree
            .neighbors_directed(node, Direction::Outgoing)
            .map(|n| self.tree[n])
            .collect();
        children.sort();
        children
    }

    pub fn parent(&self, id: SymbiontId) -> Option<SymbiontId> {
        let node = *self.nodes.get(&id)?;
        self.tree
            .neighbors_directed(node, Direction::Incoming)
            .next()
            .map(|n| self.tree[n])
    }

    /// Whether `id` is still part of the pruned topology.
    pub fn in_tree(&self, id: SymbiontId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Grow every current lineage's branch by `dt`.
    pub fn grow(&mut self, dt: SimTime) {
        for id in &self.current_lineages {
            if let Some(lineage) = self.lineages.get_mut(id.0) {
                lineage.add_edge_length(dt);
            }
        }
    }

    /// Split `id` into two daughters that each inherit the full parent
    /// distribution.
    pub fn split_lineage(&mut self, system: &mut HostSystem, id: SymbiontId) -> Result<[SymbiontId; 2]> {
        let cells: Vec<Cell> = self.current_lineage_mut(id)?.cell_iter().collect();
        self.split_lineage_with(system, id, [cells.clone(), cells])
    }

    /// Split `id` into two daughters with the given distributions.
    ///
    /// Each daughter needs at least one cell, and every cell must pair a
    /// current host with an area it occupies. Nothing is changed if either
    /// condition fails.
    pub fn split_lineage_with(
        &mut self,
        system: &mut HostSystem,
        id: SymbiontId,
        daughters: [Vec<Cell>; 2],
    ) -> Result<[SymbiontId; 2]> {
        self.ensure_current(id)?;
        let next = self.lineages.len();
        let child_ids = [SymbiontId(next), SymbiontId(next + 1)];
        for (child, cells) in child_ids.iter().zip(&daughters) {
            if cells.is_empty() {
                return Err(InphestError::null_distribution(*child));
            }
            for (host, area) in cells {
                let lineage = system.host(*host)?;
                if !lineage.is_current() {
                    return Err(DistributionError::HostNotExtant {
                        host: *host,
                        extancy: lineage.extancy(),
                    }
                    .into());
                }
                if !lineage.has_area(*area) {
                    return Err(DistributionError::HostNotInArea {
                        host: *host,
                        area: *area,
                    }
                    .into());
                }
            }
        }

        let mut children = Vec::with_capacity(2);
        for (child, cells) in child_ids.iter().zip(&daughters) {
            let mut lineage = SymbiontLineage::new(*child, system);
            lineage.add_cells(system, cells)?;
            children.push(lineage);
        }

        let parent = &mut self.lineages[id.0];
        parent.set_extant(false);
        parent.clear_distribution(system)?;
        self.current_lineages.remove(&id);

        let parent_node = *self.nodes.get(&id).ok_or(DistributionError::NotCurrent(id))?;
        for child in children {
            let child_id = child.index();
            let node = self.tree.add_node(child_id);
            self.tree.add_edge(parent_node, node, ());
            self.nodes.insert(child_id, node);
            self.current_lineages.insert(child_id);
            self.lineages.push(child);
        }
        debug!("Split {} into {} and {}", id, child_ids[0], child_ids[1]);
        Ok(child_ids)
    }

    /// Retire `id` and prune it from the tree.
    ///
    /// Extinguishing the last current lineage is total extinction: the
    /// error is returned and the phylogeny is left untouched.
    pub fn extinguish_lineage(&mut self, system: &mut HostSystem, id: SymbiontId) -> Result<()> {
        self.ensure_current(id)?;
        if self.current_lineages.len() == 1 {
            return Err(InphestError::total_extinction("no extant lineages remaining"));
        }
        let lineage = &mut self.lineages[id.0];
        lineage.set_extant(false);
        lineage.clear_distribution(system)?;
        self.current_lineages.remove(&id);
        self.prune_subtree(id);
        debug!("Extinguished {}", id);
        Ok(())
    }

    /// Remove `id` and any ancestors left childless, then suppress the
    /// unifurcation at the surviving parent.
    fn prune_subtree(&mut self, id: SymbiontId) {
        let mut target = id;
        loop {
            let parent = self.parent(target);
            if let Some(node) = self.nodes.remove(&target) {
                self.tree.remove_node(node);
            }
            match parent {
                Some(p) if self.children(p).is_empty() => target = p,
                Some(p) => {
                    self.suppress_unifurcation(p);
                    return;
                }
                None => return,
            }
        }
    }

    /// Merge a node with one child into that child, summing branch lengths.
    fn suppress_unifurcation(&mut self, id: SymbiontId) {
        let children = self.children(id);
        let [child] = children.as_slice() else {
            return;
        };
        let child = *child;
        let grandparent = self.parent(id);
        let inherited = self.lineages[id.0].edge_length();
        self.lineages[child.0].add_edge_length(inherited);

        if let Some(node) = self.nodes.remove(&id) {
            self.tree.remove_node(node);
        }
        match grandparent {
            Some(gp) => {
                if let (Some(&gp_node), Some(&child_node)) = (self.nodes.get(&gp), self.nodes.get(&child)) {
                    self.tree.add_edge(gp_node, child_node, ());
                }
            }
            None => self.root = child,
        }
    }

    /// Audit every current lineage against the host system.
    pub fn debug_check(
        &self,
        system: &HostSystem,
        time: Option<SimTime>,
        ignore_nonextant_host_check_fail: bool,
    ) -> Result<()> {
        for lineage in self.current_lineage_iter() {
            lineage.debug_check(system, time, ignore_nonextant_host_check_fail)?;
        }
        for area in system.areas() {
            for symbiont in area.symbiont_lineages() {
                if !self.current_lineages.contains(symbiont) {
                    return Err(ConsistencyError::BackReference(format!(
                        "{} lists retired symbiont lineage {}",
                        area.index, symbiont
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
}
