//! Invariants of host systems, symbiont lineages and whole replicates.

mod common;

use std::sync::Arc;

use inphest_runtime::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use common::four_tip_samples;

fn history() -> Arc<HostHistory> {
    four_tip_samples().get(0).unwrap().clone()
}

/// Host system at t=2.5 with hosts 1, 2 and 12 current.
fn tips_system() -> HostSystem {
    let mut system = HostSystem::new(history(), 1.0, true).unwrap();
    for id in [15, 3] {
        let host = system.host_by_lineage(LineageId(id)).unwrap();
        system.activate_host(host, None).unwrap();
        system.deactivate_host(host).unwrap();
    }
    for id in [1, 2, 12] {
        let host = system.host_by_lineage(LineageId(id)).unwrap();
        system.activate_host(host, Some(2.0)).unwrap();
    }
    system
}

#[test]
fn random_mutations_keep_caches_consistent_and_non_null() {
    let mut system = tips_system();
    let hosts: Vec<HostId> = system.current_host_iter().map(|h| h.index).collect();
    let mut lineage = SymbiontLineage::new(SymbiontId(0), &system);
    lineage.add_host_in_area(&mut system, hosts[0], None).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    for _ in 0..500 {
        let host = hosts[rng.gen_range(0..hosts.len())];
        let area = AreaId(rng.gen_range(0..system.num_areas()));
        if rng.gen_bool(0.5) {
            let result = lineage.add_host_in_area(&mut system, host, Some(area));
            // hosts only occupy areas 0 and 1
            assert_eq!(result.is_ok(), area.0 < 2);
        } else if lineage.has_host_in_area(host, area) {
            let last = lineage.num_cells() == 1;
            let result = lineage.remove_host_in_area(&mut system, host, Some(area));
            assert_eq!(result.is_err(), last);
            if let Err(e) = result {
                assert_eq!(e.null_distribution_lineage(), Some(SymbiontId(0)));
            }
        }
        assert!(lineage.num_hosts() > 0 && lineage.num_areas() > 0);
        lineage.debug_check(&system, Some(2.5), false).unwrap();
        system.debug_check(Some(2.5)).unwrap();

        for h in &hosts {
            for a in 0..system.num_areas() {
                let a = AreaId(a);
                if lineage.has_host_in_area(*h, a) {
                    assert!(lineage.has_host(*h) && lineage.has_area(a));
                    assert!(system.area(a).unwrap().has_symbiont(SymbiontId(0)));
                    assert!(system.area(a).unwrap().has_host(*h));
                }
            }
        }
    }
}

#[test]
fn split_children_inherit_the_full_distribution() {
    let mut system = HostSystem::new(history(), 1.0, false).unwrap();
    let seed = system.seed_host();
    system.activate_host(seed, Some(0.0)).unwrap();
    let mut phylogeny = SymbiontPhylogeny::new(&mut system).unwrap();
    let before: Vec<Cell> = phylogeny.lineage(SymbiontId(0)).unwrap().cell_iter().collect();

    let [a, b] = phylogeny.split_lineage(&mut system, SymbiontId(0)).unwrap();
    for child in [a, b] {
        let child = phylogeny.lineage(child).unwrap();
        assert!(child.num_hosts() > 0 && child.num_areas() > 0);
        assert_eq!(child.cell_iter().collect::<Vec<_>>(), before);
    }
    assert!(!phylogeny.lineage(SymbiontId(0)).unwrap().is_extant());
    phylogeny.debug_check(&system, Some(0.5), false).unwrap();
}

#[test]
fn total_extinction_leaves_live_set_untouched() {
    let mut system = HostSystem::new(history(), 1.0, false).unwrap();
    let seed = system.seed_host();
    system.activate_host(seed, None).unwrap();
    let mut phylogeny = SymbiontPhylogeny::new(&mut system).unwrap();
    let [a, b] = phylogeny.split_lineage(&mut system, SymbiontId(0)).unwrap();
    phylogeny.extinguish_lineage(&mut system, a).unwrap();

    let err = phylogeny.extinguish_lineage(&mut system, b).unwrap_err();
    assert!(err.is_failed_simulation());
    assert_eq!(phylogeny.current_lineage_ids(), vec![b]);
    assert!(phylogeny.lineage(b).unwrap().is_extant());
    phylogeny.debug_check(&system, None, false).unwrap();
}

#[test]
fn host_extancy_is_monotone_over_a_replicate() {
    let model = Arc::new(
        InphestModel::parse_definition(
            &serde_json::json!({
                "diversification": {"mean_symbiont_lineage_birth_rate": 0.5},
                "anagenetic_host_assemblage_evolution": {"mean_symbiont_lineage_host_gain_rate": 0.5}
            }),
            None,
        )
        .unwrap(),
    );
    let config = ReplicateConfig {
        debug_mode: true,
        ..Default::default()
    };
    let mut replicate = Replicate::new(model, history(), config, 8).unwrap();
    let num_hosts = replicate.system().num_hosts();
    let mut observed: Vec<Vec<Extancy>> = vec![Vec::new(); num_hosts];

    loop {
        for host in replicate.system().host_lineages() {
            observed[host.index.0].push(host.extancy());
        }
        match replicate.step() {
            Ok(true) => continue,
            Ok(false) => break,
            Err(e) => {
                assert!(e.is_failed_simulation(), "{}", e);
                break;
            }
        }
    }

    let rank = |e: &Extancy| match e {
        Extancy::Pre => 0,
        Extancy::Current => 1,
        Extancy::Post => 2,
    };
    for states in observed {
        assert!(states.windows(2).all(|w| rank(&w[0]) <= rank(&w[1])), "{:?}", states);
    }
}

#[test]
fn extinct_leaf_takes_its_private_symbionts_with_it() {
    let model = Arc::new(
        InphestModel::parse_definition(
            &serde_json::json!({
                "diversification": {"mean_symbiont_lineage_birth_rate": 0.0},
                "anagenetic_host_assemblage_evolution": {"mean_symbiont_lineage_host_gain_rate": 0.0},
                "anagenetic_geographical_range_evolution": {"mean_symbiont_lineage_area_gain_rate": 0.0}
            }),
            None,
        )
        .unwrap(),
    );
    let config = ReplicateConfig {
        debug_mode: true,
        ..Default::default()
    };
    let mut replicate = Replicate::new(model, history(), config, 1).unwrap();
    let stats = replicate.run().unwrap();
    assert_eq!(stats.host_events, 5);

    let system = replicate.system();
    let extinct = system.host_by_lineage(LineageId(2)).unwrap();
    assert_eq!(system.host(extinct).unwrap().extancy(), Extancy::Post);

    // the single symbiont lineage followed every host split
    let root = replicate.phylogeny().lineage(replicate.phylogeny().root()).unwrap();
    let tip = system.host_by_lineage(LineageId(1)).unwrap();
    let other = system.host_by_lineage(LineageId(12)).unwrap();
    assert!(root.has_host(tip) && root.has_host(other));
    assert!(!root.has_host(extinct));
    assert!(!root.has_host_in_area(other, AreaId(1)));
    // hosts ordered 1, 2, 3, 12, 15
    assert_eq!(root.encoded_label(), "s0^10010");
}

#[test]
fn runner_over_loaded_samples() {
    let model = InphestModel::parse_definition(
        &serde_json::json!({
            "diversification": {
                "mean_symbiont_lineage_birth_rate": 0.6,
                "mean_symbiont_lineage_death_rate": 0.1
            },
            "cladogenetic_host_assemblage_evolution": {"founder_event_speciation_weight": 1.0},
            "cladogenetic_geographical_range_evolution": {"founder_event_speciation_weight": 1.0}
        }),
        None,
    )
    .unwrap();
    let config = RunnerConfig {
        num_replicates: 10,
        seed: 31,
        replicate: ReplicateConfig {
            debug_mode: true,
            ..Default::default()
        },
    };
    let runner = Runner::new(model, four_tip_samples(), config).unwrap();
    let summary = runner.run().unwrap();
    assert_eq!(summary.completed + summary.failed, 10);
    assert_eq!(summary.trees().len(), summary.completed);
    for report in &summary.reports {
        match report.status {
            ReplicateStatus::Completed => {
                let newick = report.newick.as_deref().unwrap();
                assert_eq!(newick.matches("s").count(), report.lineages.len());
            }
            ReplicateStatus::Failed => assert!(report.failure.is_some()),
        }
    }

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["num_replicates"], 10);
}
