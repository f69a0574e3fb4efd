//! # Inphest Core
//!
//! Read-only inputs of the inphest host/symbiont co-diversification
//! simulator:
//!
//! - **HostHistory** — a compiled, validated host phylogeny with its
//!   time-stamped area gain/loss and cladogenesis events
//! - **HostHistorySamples** — alternative host histories, one per replicate
//! - **RateFunction** — per-lineage weight modifiers (constant, formula,
//!   or a registered Rust closure)
//! - **InphestModel** — base event rates, weight functions and
//!   cladogenetic speciation-mode weights
//!
//! Everything here is immutable after construction and may be shared across
//! concurrently running replicates. Mutable per-replicate state lives in
//! `inphest-runtime`.
//!
//! ## Quick Start
//!
//! ```rust
//! use inphest_core::prelude::*;
//!
//! let model = InphestModel::parse_definition(&serde_json::json!({
//!     "diversification": {"mean_symbiont_lineage_birth_rate": 0.1}
//! }), None).unwrap();
//! assert_eq!(model.birth.mean_rate, 0.1);
//! ```

pub mod types;
pub mod error;
pub mod rate;
pub mod model;
pub mod history;
pub mod prelude;
