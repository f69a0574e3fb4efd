//! CLI command implementations.

pub mod example_model;
pub mod init;
pub mod simulate;
