//! Inphest Runtime Prelude — convenient imports for common usage.
//!
//! ```rust
//! use inphest_runtime::prelude::*;
//! ```

// Re-export host-side state
pub use crate::host::{Area, HostLineage, HostSystem};

// Re-export symbiont-side state
pub use crate::symbiont::{Cell, SymbiontLineage};
pub use crate::phylogeny::SymbiontPhylogeny;
pub use crate::cladogenesis::{choose_split, CladogeneticSplit, SplitWeights};

// Re-export the event driver and runner
pub use crate::simulation::{Replicate, ReplicateConfig, ReplicateEvent, ReplicateStats};
pub use crate::runner::{ReplicateReport, ReplicateStatus, RunSummary, Runner, RunnerConfig};

// Re-export export helpers
pub use crate::export::{lineage_snapshots, to_newick, write_newick_file, LineageSnapshot};

// Re-export from core
pub use inphest_core::prelude::*;
