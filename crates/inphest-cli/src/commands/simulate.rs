//! Run replicates of a model over a set of host histories.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use inphest::prelude::*;
use tracing::info;

use crate::config::Config;

pub fn run(histories_path: &str, model_path: Option<&str>, config: &Config, verbose: bool) -> Result<()> {
    if config.run.nreps == 0 {
        bail!("Nothing to do: {} is 0", "nreps".cyan());
    }

    println!("{} Loading host histories...", "→".blue());
    let histories = HostHistorySamples::from_path(
        histories_path,
        config.histories.validate,
        config.histories.ignore_validation_errors,
    )
    .with_context(|| format!("Failed to load host histories: {}", histories_path))?;
    println!("  Loaded: {} sample(s)", histories.len().to_string().cyan());

    let model = match model_path {
        Some(path) => InphestModel::from_path(path, None)
            .with_context(|| format!("Failed to load model: {}", path))?,
        None => {
            info!("No model given, using defaults");
            InphestModel::default()
        }
    };

    if config.output.write_model {
        let path = config.output_path("model.json");
        model
            .write_model_to_path(&path)
            .with_context(|| format!("Failed to write model: {}", path.display()))?;
    }

    let runner = Runner::new(model, histories, config.runner_config())?;
    println!(
        "{} Running {} replicate(s) of model '{}'...",
        "→".blue(),
        config.run.nreps.to_string().cyan(),
        runner.model().model_id.cyan()
    );

    let pb = ProgressBar::new(config.run.nreps as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} replicates")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let summary = runner.run_with(|report| {
        match (&report.status, &report.failure) {
            (ReplicateStatus::Failed, Some(reason)) => {
                pb.println(format!("  {} Replicate {} failed: {}", "✗".red(), report.replicate, reason));
            }
            _ if verbose => {
                pb.println(format!(
                    "  Replicate {}: {} lineage(s)",
                    report.replicate,
                    report.lineages.len()
                ));
            }
            _ => {}
        }
        pb.inc(1);
    })?;
    pb.finish_with_message("done");

    let trees_path = config.output_path("trees.nwk");
    write_newick_file(&trees_path, &summary.trees())
        .with_context(|| format!("Failed to write trees: {}", trees_path.display()))?;

    let summary_path = config.output_path("summary.json");
    let json = serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
    std::fs::write(&summary_path, json)
        .with_context(|| format!("Failed to write summary: {}", summary_path.display()))?;

    println!();
    println!("{} Simulation complete!", "✓".green().bold());
    println!(
        "  Replicates: {} completed, {} failed",
        summary.completed.to_string().green(),
        summary.failed.to_string().yellow()
    );
    println!("  Trees: {}", trees_path.display());
    println!("  Summary: {}", summary_path.display());

    Ok(())
}
