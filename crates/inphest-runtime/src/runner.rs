//! Multi-replicate runner.
//!
//! Each replicate draws one host history from the sample set and a private
//! seed from a master generator, so a run is reproducible from its seed
//! alone. Simulation outcomes (total extinction, too few focal-area
//! lineages) fail only their replicate; any other error aborts the run.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use inphest_core::error::{HistoryError, Result};
use inphest_core::history::HostHistorySamples;
use inphest_core::model::InphestModel;

use crate::export::{lineage_snapshots, to_newick, LineageSnapshot};
use crate::simulation::{Replicate, ReplicateConfig, ReplicateStats};

/// Configuration for a multi-replicate run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Number of replicates (default: 1).
    pub num_replicates: usize,
    /// Master random seed (default: 0).
    pub seed: u64,
    pub replicate: ReplicateConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            num_replicates: 1,
            seed: 0,
            replicate: ReplicateConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicateStatus {
    Completed,
    Failed,
}

/// Outcome of one replicate.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicateReport {
    /// 1-based replicate number.
    pub replicate: usize,
    pub seed: u64,
    pub history_index: usize,
    pub status: ReplicateStatus,
    pub failure: Option<String>,
    pub stats: Option<ReplicateStats>,
    pub newick: Option<String>,
    pub lineages: Vec<LineageSnapshot>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub model_id: String,
    pub seed: u64,
    pub num_replicates: usize,
    pub completed: usize,
    pub failed: usize,
    pub reports: Vec<ReplicateReport>,
}

impl RunSummary {
    /// Newick trees of the completed replicates, in replicate order.
    pub fn trees(&self) -> Vec<String> {
        self.reports.iter().filter_map(|r| r.newick.clone()).collect()
    }
}

pub struct Runner {
    model: Arc<InphestModel>,
    histories: HostHistorySamples,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(model: InphestModel, histories: HostHistorySamples, config: RunnerConfig) -> Result<Self> {
        if histories.is_empty() {
            return Err(HistoryError::NoSamples.into());
        }
        Ok(Self {
            model: Arc::new(model),
            histories,
            config,
        })
    }

    pub fn model(&self) -> &InphestModel {
        &self.model
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn run(&self) -> Result<RunSummary> {
        self.run_with(|_| {})
    }

    /// Run every replicate, calling `on_replicate` after each one.
    pub fn run_with<F: FnMut(&ReplicateReport)>(&self, mut on_replicate: F) -> Result<RunSummary> {
        let mut master = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut reports = Vec::with_capacity(self.config.num_replicates);
        info!(
            "Running {} replicate(s) of model '{}' over {} host history sample(s)",
            self.config.num_replicates,
            self.model.model_id,
            self.histories.len()
        );

        for n in 1..=self.config.num_replicates {
            let seed: u64 = master.gen();
            let history_index = master.gen_range(0..self.histories.len());
            let history = self
                .histories
                .get(history_index)
                .cloned()
                .ok_or(HistoryError::NoSamples)?;

            let mut replicate = Replicate::new(self.model.clone(), history, self.config.replicate.clone(), seed)?;
            let report = match replicate.run() {
                Ok(stats) => {
                    info!("Replicate {} completed with {} extant lineages", n, stats.extant_lineages);
                    ReplicateReport {
                        replicate: n,
                        seed,
                        history_index,
                        status: ReplicateStatus::Completed,
                        failure: None,
                        stats: Some(stats),
                        newick: Some(to_newick(replicate.phylogeny())),
                        lineages: lineage_snapshots(replicate.phylogeny(), replicate.system()),
                    }
                }
                Err(e) if e.is_failed_simulation() => {
                    warn!("replicate {} failed: {}", n, e);
                    ReplicateReport {
                        replicate: n,
                        seed,
                        history_index,
                        status: ReplicateStatus::Failed,
                        failure: Some(e.to_string()),
                        stats: Some(replicate.stats()),
                        newick: None,
                        lineages: Vec::new(),
                    }
                }
                Err(e) => return Err(e),
            };
            on_replicate(&report);
            reports.push(report);
        }

        let completed = reports.iter().filter(|r| r.status == ReplicateStatus::Completed).count();
        Ok(RunSummary {
            model_id: self.model.model_id.clone(),
            seed: self.config.seed,
            num_replicates: self.config.num_replicates,
            completed,
            failed: reports.len() - completed,
            reports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::cherry_history;

    fn samples() -> HostHistorySamples {
        let mut samples = HostHistorySamples::new();
        samples.push(cherry_history());
        samples
    }

    #[test]
    fn empty_sample_set_is_rejected() {
        let err = Runner::new(InphestModel::default(), HostHistorySamples::new(), RunnerConfig::default());
        assert!(err.is_err());
    }

    #[test]
    fn failed_replicates_do_not_stop_the_run() {
        let doomed = InphestModel::parse_definition(
            &serde_json::json!({"diversification": {"mean_symbiont_lineage_death_rate": 100.0}}),
            None,
        )
        .unwrap();
        let config = RunnerConfig {
            num_replicates: 4,
            ..Default::default()
        };
        let runner = Runner::new(doomed, samples(), config).unwrap();
        let mut seen = 0;
        let summary = runner.run_with(|_| seen += 1).unwrap();
        assert_eq!(seen, 4);
        assert_eq!(summary.failed, 4);
        assert!(summary.trees().is_empty());
        assert!(summary.reports[0].failure.as_deref().unwrap_or("").contains("Total extinction"));
    }

    #[test]
    fn completed_replicates_carry_trees() {
        let config = RunnerConfig {
            num_replicates: 3,
            seed: 17,
            ..Default::default()
        };
        let runner = Runner::new(InphestModel::default(), samples(), config).unwrap();
        let summary = runner.run().unwrap();
        assert_eq!(summary.completed, 3);
        for tree in summary.trees() {
            assert!(tree.ends_with(';'));
            assert!(tree.contains("s"));
        }
        let again = runner.run().unwrap();
        assert_eq!(summary.trees(), again.trees());
    }
}
