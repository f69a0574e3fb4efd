//! # Inphest Runtime
//!
//! Mutable, replicate-private simulation state and the event driver.
//!
//! A replicate projects a read-only host history onto a [`HostSystem`]
//! (areas plus host lineages with their `pre -> current -> post` life
//! cycle), seeds a [`SymbiontPhylogeny`] on the seed host, and then races
//! symbiont birth, death, host and area gain/loss events against the replay
//! of the host event schedule until the end of the host history.
//!
//! [`HostSystem`]: host::HostSystem
//! [`SymbiontPhylogeny`]: phylogeny::SymbiontPhylogeny

pub mod host;
pub mod symbiont;
pub mod phylogeny;
pub mod sampling;
pub mod cladogenesis;
pub mod simulation;
pub mod runner;
pub mod export;
pub mod prelude;

#[cfg(test)]
pub(crate) mod testing;
