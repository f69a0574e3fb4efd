//! Symbiont tree export — Newick strings with encoded leaf labels.
//!
//! Leaves are labelled `s<index>^<host-occurrence-bitstring>`; internal
//! nodes are unlabelled. Every non-root node carries its branch length.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use inphest_core::types::SymbiontId;

use crate::host::HostSystem;
use crate::phylogeny::SymbiontPhylogeny;

/// Newick representation of the pruned symbiont tree, terminated with `;`.
pub fn to_newick(phylogeny: &SymbiontPhylogeny) -> String {
    fn build(phylogeny: &SymbiontPhylogeny, newick: &mut String, id: SymbiontId, is_root: bool) {
        let Some(lineage) = phylogeny.lineage(id) else {
            return;
        };
        let children = phylogeny.children(id);
        if children.is_empty() {
            newick.push_str(&lineage.encoded_label());
        } else {
            newick.push('(');
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    newick.push(',');
                }
                build(phylogeny, newick, *child, false);
            }
            newick.push(')');
        }
        if !is_root {
            newick.push(':');
            newick.push_str(&lineage.edge_length().to_string());
        }
    }

    let mut newick = String::new();
    build(phylogeny, &mut newick, phylogeny.root(), true);
    newick.push(';');
    newick
}

/// Write one tree per line.
pub fn write_newick_file(path: impl AsRef<Path>, trees: &[String]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for tree in trees {
        writer.write_all(tree.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Label and host/area occupancy of one extant symbiont lineage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageSnapshot {
    pub index: SymbiontId,
    pub label: String,
    pub num_hosts: usize,
    pub num_areas: usize,
    pub host_lineages: Vec<u64>,
    pub areas: Vec<usize>,
}

/// Snapshot every current lineage, in index order.
pub fn lineage_snapshots(phylogeny: &SymbiontPhylogeny, system: &HostSystem) -> Vec<LineageSnapshot> {
    phylogeny
        .current_lineage_iter()
        .map(|l| LineageSnapshot {
            index: l.index(),
            label: l.encoded_label(),
            num_hosts: l.num_hosts(),
            num_areas: l.num_areas(),
            host_lineages: l
                .host_iter()
                .filter_map(|h| system.host(h).ok())
                .map(|h| h.lineage_id.0)
                .collect(),
            areas: l.area_iter().map(|a| a.0).collect(),
        })
        .collect()
}
