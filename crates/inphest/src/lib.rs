//! # Inphest
//!
//! Simulation of symbiont lineages diversifying across a fixed host
//! phylogeny whose lineages themselves move between geographic areas.
//!
//! The host side is given: a compiled host history records every host
//! lineage, when it lives, which areas it occupies and when it gains,
//! loses or splits. The symbiont side is simulated: lineages are born, die,
//! gain and lose hosts and areas, and ride host speciation events onto the
//! daughter hosts.
//!
//! ## Quick Start
//!
//! ```rust
//! use inphest::prelude::*;
//!
//! let histories = HostHistorySamples::from_json_str(r#"[{
//!     "lineages": [
//!         {"lineage_id": 1, "lineage_start_time": 0.0, "lineage_end_time": 2.0,
//!          "lineage_start_distribution_bitstring": "10",
//!          "lineage_end_distribution_bitstring": "11",
//!          "is_seed_node": true, "is_leaf": true, "is_extant_leaf": true}
//!     ],
//!     "events": [
//!         {"event_time": 1.0, "lineage_id": 1, "event_type": "anagenesis",
//!          "event_subtype": "area_gain", "area_idx": 1}
//!     ],
//!     "end_time": 2.0
//! }]"#, true, false).unwrap();
//!
//! let model = InphestModel::parse_definition(&serde_json::json!({
//!     "diversification": {"mean_symbiont_lineage_birth_rate": 0.5}
//! }), None).unwrap();
//!
//! let runner = Runner::new(model, histories, RunnerConfig::default()).unwrap();
//! let summary = runner.run().unwrap();
//! for tree in summary.trees() {
//!     println!("{}", tree);
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`inphest_core`] - identifiers, errors, rate functions, the model and
//!   host histories (read-only, shareable across replicates)
//! - [`inphest_runtime`] - host systems, symbiont lineages and phylogenies,
//!   cladogenetic inheritance, the event driver and the replicate runner
//!
//! ## Model Definitions
//!
//! A model is a closed JSON object; every key is optional and any key the
//! parser does not recognise is an error:
//!
//! | Block | Keys |
//! |-------|------|
//! | `diversification` | birth and death mean rates and weights |
//! | `anagenetic_host_assemblage_evolution` | host gain and loss |
//! | `cladogenetic_host_assemblage_evolution` | speciation-mode weights over hosts |
//! | `anagenetic_geographical_range_evolution` | area gain and loss |
//! | `cladogenetic_geographical_range_evolution` | speciation-mode weights over areas |
//!
//! Weights are `fixed_value`, `formula` (over `time`, `num_hosts`,
//! `num_areas`, `num_cells`, `num_lineages`, `num_extant_hosts`) or
//! `function_object` (a closure registered in a `RateFunctionRegistry`).

// Re-export all subcrates
pub use inphest_core as core;
pub use inphest_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust
/// use inphest::prelude::*;
/// ```
pub mod prelude {
    pub use inphest_runtime::prelude::*;
}
