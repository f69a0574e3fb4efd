//! Replicate — one stochastic realisation of the symbiont process over a
//! host history.
//!
//! Each step:
//! 1. Every current symbiont lineage offers a rate for each event channel
//!    (mean rate times the channel's weight function; zero when the event
//!    is impossible for that lineage)
//! 2. An exponential waiting time is drawn from the total rate
//! 3. If the next scheduled host event comes first, time advances to it and
//!    the host event is replayed, carrying symbiont associations along
//! 4. Otherwise time advances by the waiting time and one symbiont event is
//!    chosen in proportion to its rate and applied
//! 5. Optionally, the full host and symbiont state is audited
//!
//! The replicate ends at the host system's end time. Total extinction and a
//! failed focal-area check end it early with a simulation-outcome error.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use inphest_core::error::{Result, SimulationOutcome};
use inphest_core::history::{AnageneticSubtype, HostEvent, HostEventKind, HostHistory};
use inphest_core::model::{CladogeneticProcess, EventChannel, InphestModel, SpeciationMode};
use inphest_core::rate::RateContext;
use inphest_core::types::{AreaId, HostId, LineageId, SimTime, SymbiontId, TIME_EPSILON};

use crate::cladogenesis::{choose_split, SplitWeights};
use crate::host::HostSystem;
use crate::phylogeny::SymbiontPhylogeny;
use crate::sampling::{waiting_time, weighted_index};
use crate::symbiont::{Cell, SymbiontLineage};

/// Per-replicate switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicateConfig {
    /// Audit the full host and symbiont state after every step.
    pub debug_mode: bool,
    /// Log, instead of failing on, symbionts found on hosts that are not
    /// extant at the audit time.
    pub ignore_nonextant_host_check_fail: bool,
    /// When set, at least two symbiont lineages must occupy one of these
    /// areas at termination.
    pub focal_areas: Option<Vec<AreaId>>,
}

/// Event recorded during a replicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReplicateEvent {
    /// A symbiont lineage split. `mode` is `None` for a full-copy split.
    Speciation {
        lineage: SymbiontId,
        children: [SymbiontId; 2],
        process: Option<CladogeneticProcess>,
        mode: Option<SpeciationMode>,
    },
    /// A symbiont lineage went extinct.
    Extinction { lineage: SymbiontId },
    HostGain { lineage: SymbiontId, host: HostId, area: AreaId },
    HostLoss { lineage: SymbiontId, host: HostId },
    AreaGain { lineage: SymbiontId, host: HostId, area: AreaId },
    AreaLoss { lineage: SymbiontId, area: AreaId },
    /// A host lineage gained an area.
    HostAreaGain { host_lineage: LineageId, area: AreaId },
    /// A host lineage lost an area; symbionts left with nothing died with it.
    HostAreaLoss {
        host_lineage: LineageId,
        area: AreaId,
        symbionts_extinguished: usize,
    },
    /// A host lineage split into two daughter lineages.
    HostSpeciation {
        host_lineage: LineageId,
        children: [LineageId; 2],
    },
    /// An extinct host leaf reached the end of its lifespan.
    HostExtinction {
        host_lineage: LineageId,
        symbionts_extinguished: usize,
    },
}

/// Counters describing a replicate run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplicateStats {
    pub elapsed_time: SimTime,
    pub steps: usize,
    pub host_events: usize,
    pub speciations: usize,
    pub extinctions: usize,
    pub host_gains: usize,
    pub host_losses: usize,
    pub area_gains: usize,
    pub area_losses: usize,
    pub lineages_created: usize,
    pub extant_lineages: usize,
}

/// Host-side changes replayed in time order.
#[derive(Debug, Clone)]
enum Scheduled {
    Host(HostEvent),
    /// Deactivate a host leaf that does not survive to the present.
    Retire(HostId),
}

impl Scheduled {
    /// Order at equal times: host splits, then anagenesis, then retirements.
    fn rank(&self) -> u8 {
        match self {
            Scheduled::Host(event) if event.is_cladogenesis() => 0,
            Scheduled::Host(_) => 1,
            Scheduled::Retire(_) => 2,
        }
    }
}

pub struct Replicate {
    model: Arc<InphestModel>,
    config: ReplicateConfig,
    system: HostSystem,
    phylogeny: SymbiontPhylogeny,
    rng: ChaCha8Rng,
    time: SimTime,
    schedule: Vec<(SimTime, Scheduled)>,
    next_scheduled: usize,
    stats: ReplicateStats,
    event_history: Vec<(SimTime, ReplicateEvent)>,
}

impl Replicate {
    /// Set up a replicate: project the host history onto symbiont time,
    /// activate the seed host and seed one symbiont lineage on it.
    pub fn new(
        model: Arc<InphestModel>,
        history: Arc<HostHistory>,
        config: ReplicateConfig,
        seed: u64,
    ) -> Result<Self> {
        let mut system = HostSystem::new(history, model.host_to_symbiont_time_scale_factor, config.debug_mode)?;
        let seed_host = system.seed_host();
        let time = system.host(seed_host)?.start_time;
        system.activate_host(seed_host, Some(time))?;
        let phylogeny = SymbiontPhylogeny::new(&mut system)?;

        let mut schedule: Vec<(SimTime, Scheduled)> = system
            .host_events()
            .iter()
            .map(|e| (e.event_time, Scheduled::Host(e.clone())))
            .collect();
        schedule.extend(
            system
                .host_lineages()
                .iter()
                .filter(|h| h.is_leaf && !h.is_extant_leaf)
                .map(|h| (h.end_time, Scheduled::Retire(h.index))),
        );
        schedule.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.rank().cmp(&b.1.rank())));

        Ok(Self {
            model,
            config,
            system,
            phylogeny,
            rng: ChaCha8Rng::seed_from_u64(seed),
            time,
            schedule,
            next_scheduled: 0,
            stats: ReplicateStats::default(),
            event_history: Vec::new(),
        })
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn model(&self) -> &InphestModel {
        &self.model
    }

    pub fn system(&self) -> &HostSystem {
        &self.system
    }

    pub fn phylogeny(&self) -> &SymbiontPhylogeny {
        &self.phylogeny
    }

    pub fn event_history(&self) -> &[(SimTime, ReplicateEvent)] {
        &self.event_history
    }

    pub fn stats(&self) -> ReplicateStats {
        ReplicateStats {
            elapsed_time: self.time,
            lineages_created: self.phylogeny.num_lineages_created(),
            extant_lineages: self.phylogeny.num_current_lineages(),
            ..self.stats.clone()
        }
    }

    /// Run to the end of the host history.
    #[instrument(skip(self), fields(hosts = self.system.num_hosts(), areas = self.system.num_areas()))]
    pub fn run(&mut self) -> Result<ReplicateStats> {
        info!(
            "Starting replicate at t={} (end t={}, {} scheduled host changes)",
            self.time,
            self.system.end_time(),
            self.schedule.len()
        );
        while self.step()? {}
        self.check_focal_areas()?;
        let stats = self.stats();
        info!(
            "Replicate complete: {} extant symbiont lineages, {} created, {} steps",
            stats.extant_lineages, stats.lineages_created, stats.steps
        );
        Ok(stats)
    }

    /// Advance by one event. Returns `false` once the end time is reached.
    pub fn step(&mut self) -> Result<bool> {
        let end_time = self.system.end_time();
        let rates = self.channel_rates();
        let weights: Vec<f64> = rates.iter().map(|(_, _, r)| *r).collect();
        let wait = waiting_time(&mut self.rng, weights.iter().sum());

        let next_host_time = self
            .schedule
            .get(self.next_scheduled)
            .map(|(t, _)| *t)
            .filter(|t| *t <= end_time + TIME_EPSILON);
        let horizon = next_host_time.unwrap_or(end_time);

        if self.time + wait < horizon {
            self.advance(wait);
            if let Some(i) = weighted_index(&mut self.rng, &weights) {
                let (lineage, channel, _) = rates[i];
                self.apply_symbiont_event(lineage, channel)?;
            }
        } else {
            self.advance(horizon - self.time);
            if next_host_time.is_none() {
                return Ok(false);
            }
            let (_, scheduled) = self.schedule[self.next_scheduled].clone();
            self.next_scheduled += 1;
            self.apply_scheduled(scheduled)?;
        }
        self.stats.steps += 1;

        if self.config.debug_mode {
            self.debug_check()?;
        }
        Ok(true)
    }

    fn advance(&mut self, dt: SimTime) {
        let dt = dt.max(0.0);
        self.phylogeny.grow(dt);
        self.time += dt;
    }

    fn record(&mut self, event: ReplicateEvent) {
        debug!("t={}: {:?}", self.time, event);
        self.event_history.push((self.time, event));
    }

    fn rate_context(&self, lineage: &SymbiontLineage) -> RateContext {
        RateContext {
            time: self.time,
            num_hosts: lineage.num_hosts(),
            num_areas: lineage.num_areas(),
            num_cells: lineage.num_cells(),
            num_lineages: self.phylogeny.num_current_lineages(),
            num_extant_hosts: self.system.current_host_iter().count(),
        }
    }

    fn is_possible(&self, lineage: &SymbiontLineage, channel: EventChannel) -> bool {
        match channel {
            EventChannel::Birth | EventChannel::Death => true,
            EventChannel::HostGain => !host_gain_targets(&self.system, lineage).is_empty(),
            EventChannel::HostLoss => lineage.num_hosts() >= 2,
            EventChannel::AreaGain => !area_gain_targets(&self.system, lineage).is_empty(),
            EventChannel::AreaLoss => lineage.num_areas() >= 2,
        }
    }

    /// `(lineage, channel, rate)` for every current lineage and channel.
    fn channel_rates(&self) -> Vec<(SymbiontId, EventChannel, f64)> {
        let mut rates = Vec::new();
        for lineage in self.phylogeny.current_lineage_iter() {
            let ctx = self.rate_context(lineage);
            for channel in EventChannel::ALL {
                let configured = self.model.channel(channel);
                if configured.mean_rate <= 0.0 || !self.is_possible(lineage, channel) {
                    continue;
                }
                let rate = configured.mean_rate * configured.weight.evaluate(&ctx);
                if rate.is_finite() && rate > 0.0 {
                    rates.push((lineage.index(), channel, rate));
                }
            }
        }
        rates
    }

    fn apply_symbiont_event(&mut self, id: SymbiontId, channel: EventChannel) -> Result<()> {
        match channel {
            EventChannel::Birth => self.speciate(id)?,
            EventChannel::Death => {
                self.phylogeny.extinguish_lineage(&mut self.system, id)?;
                self.stats.extinctions += 1;
                self.record(ReplicateEvent::Extinction { lineage: id });
            }
            EventChannel::HostGain => {
                let targets = host_gain_targets(&self.system, self.phylogeny.current_lineage(id)?);
                if let Some(&(host, area)) = targets.choose(&mut self.rng) {
                    self.phylogeny
                        .current_lineage_mut(id)?
                        .add_host_in_area(&mut self.system, host, Some(area))?;
                    self.stats.host_gains += 1;
                    self.record(ReplicateEvent::HostGain { lineage: id, host, area });
                }
            }
            EventChannel::HostLoss => {
                let hosts: Vec<HostId> = self.phylogeny.current_lineage(id)?.host_iter().collect();
                if let Some(&host) = hosts.choose(&mut self.rng) {
                    self.phylogeny
                        .current_lineage_mut(id)?
                        .remove_host(&mut self.system, host)?;
                    self.stats.host_losses += 1;
                    self.record(ReplicateEvent::HostLoss { lineage: id, host });
                }
            }
            EventChannel::AreaGain => {
                let targets = area_gain_targets(&self.system, self.phylogeny.current_lineage(id)?);
                if let Some(&(host, area)) = targets.choose(&mut self.rng) {
                    self.phylogeny
                        .current_lineage_mut(id)?
                        .add_host_in_area(&mut self.system, host, Some(area))?;
                    self.stats.area_gains += 1;
                    self.record(ReplicateEvent::AreaGain { lineage: id, host, area });
                }
            }
            EventChannel::AreaLoss => {
                let areas: Vec<AreaId> = self.phylogeny.current_lineage(id)?.area_iter().collect();
                if let Some(&area) = areas.choose(&mut self.rng) {
                    self.phylogeny
                        .current_lineage_mut(id)?
                        .remove_area(&mut self.system, area)?;
                    self.stats.area_losses += 1;
                    self.record(ReplicateEvent::AreaLoss { lineage: id, area });
                }
            }
        }
        Ok(())
    }

    fn speciate(&mut self, id: SymbiontId) -> Result<()> {
        let lineage = self.phylogeny.current_lineage(id)?;
        let ctx = self.rate_context(lineage);
        let weights = SplitWeights {
            host_gain_weight: self.model.host_gain.weight.evaluate(&ctx),
            area_gain_weight: self.model.area_gain.weight.evaluate(&ctx),
        };
        let split = choose_split(&mut self.rng, &self.model, &self.system, lineage, weights);

        let (children, process, mode) = match split {
            Some(split) => {
                let children = self.phylogeny.split_lineage_with(&mut self.system, id, split.daughters)?;
                (children, Some(split.process), Some(split.mode))
            }
            None => (self.phylogeny.split_lineage(&mut self.system, id)?, None, None),
        };
        self.stats.speciations += 1;
        self.record(ReplicateEvent::Speciation {
            lineage: id,
            children,
            process,
            mode,
        });
        Ok(())
    }

    fn apply_scheduled(&mut self, scheduled: Scheduled) -> Result<()> {
        self.stats.host_events += 1;
        match scheduled {
            Scheduled::Host(event) => self.apply_host_event(event),
            Scheduled::Retire(host) => self.retire_host(host),
        }
    }

    fn apply_host_event(&mut self, event: HostEvent) -> Result<()> {
        let host = self.system.host_by_lineage(event.lineage_id)?;
        match event.kind {
            HostEventKind::Anagenesis {
                event_subtype: AnageneticSubtype::AreaGain,
                area_idx,
            } => {
                self.system.add_host_area(host, area_idx)?;
                self.record(ReplicateEvent::HostAreaGain {
                    host_lineage: event.lineage_id,
                    area: area_idx,
                });
            }
            HostEventKind::Anagenesis {
                event_subtype: AnageneticSubtype::AreaLoss,
                area_idx,
            } => {
                let extinguished = self.evict_symbionts(host, Some(area_idx))?;
                self.system.remove_host_area(host, area_idx)?;
                self.record(ReplicateEvent::HostAreaLoss {
                    host_lineage: event.lineage_id,
                    area: area_idx,
                    symbionts_extinguished: extinguished,
                });
            }
            HostEventKind::Cladogenesis {
                child0_lineage_id,
                child1_lineage_id,
                ..
            } => {
                let children = [child0_lineage_id, child1_lineage_id];
                self.apply_host_cladogenesis(host, children)?;
                self.record(ReplicateEvent::HostSpeciation {
                    host_lineage: event.lineage_id,
                    children,
                });
            }
        }
        Ok(())
    }

    /// Activate both daughter hosts and move every symbiont off the parent
    /// onto them.
    ///
    /// A symbiont keeps the parent's areas wherever a daughter also occupies
    /// them; a daughter sharing none of them is infected in all its areas.
    fn apply_host_cladogenesis(&mut self, parent: HostId, children: [LineageId; 2]) -> Result<()> {
        let child_hosts = [
            self.system.host_by_lineage(children[0])?,
            self.system.host_by_lineage(children[1])?,
        ];
        for child in child_hosts {
            self.system.activate_host(child, Some(self.time))?;
        }

        for id in self.phylogeny.current_lineage_ids() {
            let lineage = self.phylogeny.current_lineage(id)?;
            if !lineage.has_host(parent) {
                continue;
            }
            let parent_areas: Vec<AreaId> = lineage.areas_in_host_iter(parent).collect();
            let mut inherited: Vec<Cell> = Vec::new();
            for child in child_hosts {
                let host = self.system.host(child)?;
                let shared: Vec<Cell> = parent_areas
                    .iter()
                    .filter(|a| host.has_area(**a))
                    .map(|a| (child, *a))
                    .collect();
                if shared.is_empty() {
                    inherited.extend(host.current_area_iter().map(|a| (child, a)));
                } else {
                    inherited.extend(shared);
                }
            }
            let lineage = self.phylogeny.current_lineage_mut(id)?;
            lineage.add_cells(&mut self.system, &inherited)?;
            lineage.remove_host(&mut self.system, parent)?;
        }
        self.system.deactivate_host(parent)
    }

    fn retire_host(&mut self, host: HostId) -> Result<()> {
        let lineage = self.system.host(host)?;
        let host_lineage = lineage.lineage_id;
        if !lineage.is_current() {
            debug!("Host lineage {} is '{}' at its end time, nothing to retire", host_lineage, lineage.extancy());
            return Ok(());
        }
        let extinguished = self.evict_symbionts(host, None)?;
        self.system.deactivate_host(host)?;
        self.record(ReplicateEvent::HostExtinction {
            host_lineage,
            symbionts_extinguished: extinguished,
        });
        Ok(())
    }

    /// Remove every symbiont association with `host` (in `area` only, when
    /// given). A symbiont left with no cells is extinguished instead.
    /// Returns the number of symbionts extinguished.
    fn evict_symbionts(&mut self, host: HostId, area: Option<AreaId>) -> Result<usize> {
        let mut extinguished = 0;
        for id in self.phylogeny.current_lineage_ids() {
            let lineage = self.phylogeny.current_lineage(id)?;
            let cells: Vec<Cell> = match area {
                Some(a) if lineage.has_host_in_area(host, a) => vec![(host, a)],
                Some(_) => Vec::new(),
                None => lineage.areas_in_host_iter(host).map(|a| (host, a)).collect(),
            };
            if cells.is_empty() {
                continue;
            }
            if lineage.survives_removal(&cells) {
                let lineage = self.phylogeny.current_lineage_mut(id)?;
                match area {
                    Some(a) => lineage.remove_host_in_area(&mut self.system, host, Some(a))?,
                    None => lineage.remove_host(&mut self.system, host)?,
                }
            } else {
                debug!("{} loses its last cell with {}", id, host);
                self.phylogeny.extinguish_lineage(&mut self.system, id)?;
                self.stats.extinctions += 1;
                extinguished += 1;
                self.record(ReplicateEvent::Extinction { lineage: id });
            }
        }
        Ok(extinguished)
    }

    fn check_focal_areas(&self) -> Result<()> {
        let Some(focal) = &self.config.focal_areas else {
            return Ok(());
        };
        let count = self
            .phylogeny
            .current_lineage_iter()
            .filter(|l| focal.iter().any(|a| l.has_area(*a)))
            .count();
        if count < 2 {
            return Err(SimulationOutcome::InsufficientFocalAreaLineages(format!(
                "{} lineage(s) in focal areas at termination, at least 2 required",
                count
            ))
            .into());
        }
        Ok(())
    }

    /// Audit hosts, areas and every current symbiont lineage at the current
    /// time.
    pub fn debug_check(&self) -> Result<()> {
        let time = Some(self.time);
        self.system.debug_check(time)?;
        self.phylogeny
            .debug_check(&self.system, time, self.config.ignore_nonextant_host_check_fail)
    }
}

/// `(host, area)` pairs where `lineage` could infect a new host: the area
/// is already occupied and the host is not yet infected.
fn host_gain_targets(system: &HostSystem, lineage: &SymbiontLineage) -> Vec<Cell> {
    let mut targets = Vec::new();
    for area in lineage.area_iter() {
        if let Ok(slot) = system.area(area) {
            targets.extend(
                slot.host_lineages()
                    .iter()
                    .filter(|h| !lineage.has_host(**h))
                    .map(|h| (*h, area)),
            );
        }
    }
    targets
}

/// `(host, area)` pairs where `lineage` could expand its range: an
/// infected host occupies an area the lineage does not.
fn area_gain_targets(system: &HostSystem, lineage: &SymbiontLineage) -> Vec<Cell> {
    let mut targets = Vec::new();
    for host in lineage.host_iter() {
        if let Ok(h) = system.host(host) {
            targets.extend(h.current_area_iter().filter(|a| !lineage.has_area(*a)).map(|a| (host, a)));
        }
    }
    targets
}
