//! Write a model definition with every parameter at its default.

use anyhow::{Context, Result};
use colored::Colorize;
use inphest::prelude::*;

pub fn run(output: Option<&str>) -> Result<()> {
    let model = InphestModel::default();
    match output {
        Some(path) => {
            model
                .write_model_to_path(path)
                .with_context(|| format!("Failed to write model: {}", path))?;
            eprintln!("{} Wrote example model to {}", "✓".green().bold(), path.cyan());
        }
        None => model
            .write_model(std::io::stdout().lock())
            .context("Failed to write model")?,
    }
    Ok(())
}
