//! Error types for inphest operations.
//!
//! Errors fall into four families with different handling policies:
//!
//! - [`ConfigError`]: malformed model definitions, raised at load time
//!   before any simulation state exists.
//! - [`HistoryError`] and [`DistributionError`]: biological-validity
//!   failures. They point at a broken host history or a bug in event
//!   application and are never recovered mid-replicate.
//! - [`ConsistencyError`]: failures of the optional `debug_check` audits.
//! - [`SimulationOutcome`]: expected terminal outcomes of the stochastic
//!   process. The replicate runner catches these and moves on.

use thiserror::Error;

use crate::types::{AreaId, Extancy, HostId, LineageId, SimTime, SymbiontId};

/// Result type for inphest operations.
pub type Result<T> = std::result::Result<T, InphestError>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum InphestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Host history error: {0}")]
    History(#[from] HistoryError),

    #[error("Distribution error: {0}")]
    Distribution(#[from] DistributionError),

    #[error("Consistency check failed: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Simulation failed: {0}")]
    Simulation(#[from] SimulationOutcome),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl InphestError {
    /// Whether this error is an expected stochastic outcome (total
    /// extinction, too few focal-area lineages) rather than a bug or a
    /// bad input.
    pub fn is_failed_simulation(&self) -> bool {
        matches!(self, InphestError::Simulation(_))
    }

    pub fn is_config(&self) -> bool {
        matches!(self, InphestError::Config(_))
    }

    /// The offending symbiont lineage when this is a null-distribution error.
    pub fn null_distribution_lineage(&self) -> Option<SymbiontId> {
        match self {
            InphestError::Distribution(DistributionError::NullDistribution { lineage }) => Some(*lineage),
            _ => None,
        }
    }
}

/// Model definition errors.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Unsupported keywords in {block}: {}", keys.join(", "))]
    UnsupportedKeys { block: String, keys: Vec<String> },

    #[error("Expected {expected} for '{field}', found: {found}")]
    InvalidType {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for '{field}': {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: &'static str,
    },

    #[error("Unrecognized function definition type: '{0}'")]
    UnknownDefinitionType(String),

    #[error("Invalid formula '{formula}' at position {position}: {reason}")]
    InvalidFormula {
        formula: String,
        position: usize,
        reason: String,
    },

    #[error("No external rate function registered under '{0}'")]
    UnknownFunction(String),
}

/// Structural and biological-replay errors in a host history.
#[derive(Debug, Clone, Error)]
pub enum HistoryError {
    #[error("Lineage {0} referenced but not defined")]
    MissingLineage(LineageId),

    #[error("Lineage {0} defined more than once")]
    DuplicateLineage(LineageId),

    #[error("Host tree topology mismatch: {0}")]
    TopologyMismatch(String),

    #[error("Lineage {lineage}: start time {start} is after end time {end}")]
    InvertedLifespan {
        lineage: LineageId,
        start: SimTime,
        end: SimTime,
    },

    #[error("Event on lineage {lineage} at time {time} lies outside [{start}, {end}]")]
    EventOutOfRange {
        lineage: LineageId,
        time: SimTime,
        start: SimTime,
        end: SimTime,
    },

    #[error("Lineage {lineage}: distribution '{bitstring}' has {found} areas, expected {expected}")]
    WidthMismatch {
        lineage: LineageId,
        bitstring: String,
        expected: usize,
        found: usize,
    },

    #[error("Event on lineage {lineage} references area index {area}, but the history has {num_areas} areas")]
    AreaOutOfRange {
        lineage: LineageId,
        area: usize,
        num_areas: usize,
    },

    #[error("Lineage {lineage} at time {time}: trying to add area with index {area} to distribution that already has area: {distribution}")]
    DoubleAreaGain {
        lineage: LineageId,
        time: SimTime,
        area: usize,
        distribution: String,
    },

    #[error("Lineage {lineage} at time {time}: trying to remove area with index {area} from distribution that does not have area: {distribution}")]
    AbsentAreaLoss {
        lineage: LineageId,
        time: SimTime,
        area: usize,
        distribution: String,
    },

    #[error("Lineage {lineage} at time {time}: cladogenesis with distribution {found}, expected start distribution {expected}")]
    CladogenesisDistributionChanged {
        lineage: LineageId,
        time: SimTime,
        expected: String,
        found: String,
    },

    #[error("Lineage {lineage}: replayed events end in {replayed}, declared end distribution is {declared}")]
    EndDistributionMismatch {
        lineage: LineageId,
        replayed: String,
        declared: String,
    },

    #[error("Host history sample set is empty")]
    NoSamples,
}

/// Violations of the symbiont/host association contracts.
#[derive(Debug, Clone, Error)]
pub enum DistributionError {
    #[error("Symbiont lineage {lineage} has a null distribution (no hosts or no areas)")]
    NullDistribution { lineage: SymbiontId },

    #[error("{host} does not occupy {area}")]
    HostNotInArea { host: HostId, area: AreaId },

    #[error("{host} is not current (extancy '{extancy}')")]
    HostNotExtant { host: HostId, extancy: Extancy },

    #[error("Symbiont lineage {lineage} is not associated with {host} in {area}")]
    NotAssociated {
        lineage: SymbiontId,
        host: HostId,
        area: AreaId,
    },

    #[error("Symbiont lineage {lineage} does not occupy {area}")]
    AreaNotOccupied { lineage: SymbiontId, area: AreaId },

    #[error("Symbiont lineage {lineage} does not infect {host}")]
    HostNotInfected { lineage: SymbiontId, host: HostId },

    #[error("Symbiont lineage {0} is not a current lineage")]
    NotCurrent(SymbiontId),

    #[error("Unknown {0}")]
    UnknownHost(HostId),

    #[error("Unknown {0}")]
    UnknownArea(AreaId),
}

/// Failures reported by the `debug_check` family of audits.
#[derive(Debug, Clone, Error)]
pub enum ConsistencyError {
    #[error("Host lineage {lineage}: invalid extancy transition from '{from}' to '{to}'")]
    InvalidTransition {
        lineage: LineageId,
        from: Extancy,
        to: Extancy,
    },

    #[error("Host lineage {lineage}: activation time {time} outside lifespan [{start}, {end}]")]
    ActivationOutOfRange {
        lineage: LineageId,
        time: SimTime,
        start: SimTime,
        end: SimTime,
    },

    #[error("Host lineage {lineage} ({leafset}): times = {start} to {end}, current simulation elapsed time = {time}: designated as '{extancy}'")]
    ExtancyMismatch {
        lineage: LineageId,
        leafset: String,
        start: SimTime,
        end: SimTime,
        time: SimTime,
        extancy: Extancy,
    },

    #[error("Host lineage {lineage} is '{extancy}' and cannot change its areas")]
    HostNotCurrent { lineage: LineageId, extancy: Extancy },

    #[error("Host lineage {lineage} already occupies {area}")]
    AreaAlreadyOccupied { lineage: LineageId, area: AreaId },

    #[error("Host lineage {lineage} does not occupy {area}")]
    AreaNotOccupied { lineage: LineageId, area: AreaId },

    #[error("Back-reference mismatch: {0}")]
    BackReference(String),

    #[error("Symbiont lineage {lineage}: cache out of sync: {detail}")]
    CacheOutOfSync { lineage: SymbiontId, detail: String },
}

/// Expected terminal outcomes of a stochastic replicate.
#[derive(Debug, Clone, Error)]
pub enum SimulationOutcome {
    #[error("Total extinction: {0}")]
    TotalExtinction(String),

    #[error("Insufficient focal area lineages: {0}")]
    InsufficientFocalAreaLineages(String),
}

// Convenience constructors
impl InphestError {
    pub fn total_extinction(reason: impl Into<String>) -> Self {
        InphestError::Simulation(SimulationOutcome::TotalExtinction(reason.into()))
    }

    pub fn null_distribution(lineage: SymbiontId) -> Self {
        InphestError::Distribution(DistributionError::NullDistribution { lineage })
    }

    pub fn unsupported_keys(block: impl Into<String>, keys: Vec<String>) -> Self {
        InphestError::Config(ConfigError::UnsupportedKeys {
            block: block.into(),
            keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_keys_names_the_key() {
        let err = InphestError::unsupported_keys("diversification", vec!["bogus_rate".to_string()]);
        let msg = err.to_string();
        assert!(msg.contains("diversification"));
        assert!(msg.contains("bogus_rate"));
        assert!(err.is_config());
    }

    #[test]
    fn simulation_outcomes_are_classified() {
        let err = InphestError::total_extinction("no extant lineages remaining");
        assert!(err.is_failed_simulation());
        assert!(err.to_string().contains("no extant lineages remaining"));

        let err = InphestError::null_distribution(SymbiontId(3));
        assert!(!err.is_failed_simulation());
        assert_eq!(err.null_distribution_lineage(), Some(SymbiontId(3)));
    }

    #[test]
    fn replay_errors_name_lineage_time_and_area() {
        let err = HistoryError::DoubleAreaGain {
            lineage: LineageId(12),
            time: 0.5,
            area: 1,
            distribution: "010".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("12"));
        assert!(msg.contains("0.5"));
        assert!(msg.contains("index 1"));
        assert!(msg.contains("010"));
    }
}
