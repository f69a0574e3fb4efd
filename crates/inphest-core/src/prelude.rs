//! Inphest Core Prelude — convenient imports for common usage.
//!
//! ```rust
//! use inphest_core::prelude::*;
//! ```

pub use crate::types::{
    AreaId, Distribution, Extancy, HostId, LineageId, SimTime, SymbiontId,
    TIME_EPSILON, is_almost_equal, is_in_range,
};

pub use crate::error::{
    ConfigError, ConsistencyError, DistributionError, HistoryError,
    InphestError, Result, SimulationOutcome,
};

pub use crate::rate::{RateContext, RateFunction, RateFunctionRegistry};

pub use crate::model::{
    ChannelRate, CladogeneticProcess, CladogeneticWeights, EventChannel,
    InphestModel, SpeciationMode,
};

pub use crate::history::{
    AnageneticSubtype, HostEvent, HostEventKind, HostHistory,
    HostHistorySamples, HostLineageDefinition,
};
