//! Model configuration: base rates, per-lineage weight functions, and
//! cladogenetic speciation-mode weights.
//!
//! The definition format is a closed, nested JSON object:
//!
//! ```json
//! {
//!     "model_id": "Model1",
//!     "host_to_symbiont_time_scale_factor": 1.0,
//!     "diversification": { ... },
//!     "anagenetic_host_assemblage_evolution": { ... },
//!     "cladogenetic_host_assemblage_evolution": { ... },
//!     "anagenetic_geographical_range_evolution": { ... },
//!     "cladogenetic_geographical_range_evolution": { ... }
//! }
//! ```
//!
//! Every field is optional and defaulted. Any key not consumed by the parser
//! is an error naming the block and the key.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{ConfigError, InphestError, Result};
use crate::rate::{RateFunction, RateFunctionRegistry};

const DEFAULT_MODEL_ID: &str = "Model1";

/// The anagenetic and diversification event channels a symbiont lineage races.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventChannel {
    Birth,
    Death,
    HostGain,
    HostLoss,
    AreaGain,
    AreaLoss,
}

impl EventChannel {
    pub const ALL: [EventChannel; 6] = [
        EventChannel::Birth,
        EventChannel::Death,
        EventChannel::HostGain,
        EventChannel::HostLoss,
        EventChannel::AreaGain,
        EventChannel::AreaLoss,
    ];

    fn stem(self) -> &'static str {
        match self {
            EventChannel::Birth => "birth",
            EventChannel::Death => "death",
            EventChannel::HostGain => "host_gain",
            EventChannel::HostLoss => "host_loss",
            EventChannel::AreaGain => "area_gain",
            EventChannel::AreaLoss => "area_loss",
        }
    }

    fn mean_rate_key(self) -> String {
        format!("mean_symbiont_lineage_{}_rate", self.stem())
    }

    fn weight_key(self) -> String {
        format!("symbiont_lineage_{}_weight", self.stem())
    }

    fn default_mean_rate(self) -> f64 {
        match self {
            EventChannel::Birth | EventChannel::HostGain | EventChannel::AreaGain => 0.03,
            EventChannel::Death | EventChannel::HostLoss | EventChannel::AreaLoss => 0.0,
        }
    }
}

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

/// Which side of the symbiont's range a cladogenetic process partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CladogeneticProcess {
    /// Partitions the infected host set.
    HostAssemblage,
    /// Partitions the occupied area set.
    GeographicalRange,
}

impl CladogeneticProcess {
    fn block(self) -> &'static str {
        match self {
            CladogeneticProcess::HostAssemblage => "cladogenetic_host_assemblage_evolution",
            CladogeneticProcess::GeographicalRange => "cladogenetic_geographical_range_evolution",
        }
    }

    fn single_unit_vicariance_key(self) -> &'static str {
        match self {
            CladogeneticProcess::HostAssemblage => "single_host_vicariance_speciation_weight",
            CladogeneticProcess::GeographicalRange => "single_area_vicariance_speciation_weight",
        }
    }
}

/// Speciation sub-modes a cladogenetic process chooses among.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeciationMode {
    SympatricSubset,
    SingleUnitVicariance,
    WidespreadVicariance,
    FounderEvent,
}

impl SpeciationMode {
    pub const ALL: [SpeciationMode; 4] = [
        SpeciationMode::SympatricSubset,
        SpeciationMode::SingleUnitVicariance,
        SpeciationMode::WidespreadVicariance,
        SpeciationMode::FounderEvent,
    ];
}

impl fmt::Display for SpeciationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpeciationMode::SympatricSubset => "sympatric_subset",
            SpeciationMode::SingleUnitVicariance => "single_unit_vicariance",
            SpeciationMode::WidespreadVicariance => "widespread_vicariance",
            SpeciationMode::FounderEvent => "founder_event",
        };
        f.write_str(s)
    }
}

/// Relative base weights of the speciation sub-modes of one cladogenetic process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CladogeneticWeights {
    pub sympatric_subset: f64,
    pub single_unit_vicariance: f64,
    pub widespread_vicariance: f64,
    /// Jump dispersal. The effective weight for a lineage is this value times
    /// the lineage's host-gain (or area-gain) weight.
    pub founder_event: f64,
}

impl Default for CladogeneticWeights {
    fn default() -> Self {
        Self {
            sympatric_subset: 1.0,
            single_unit_vicariance: 1.0,
            widespread_vicariance: 1.0,
            founder_event: 0.0,
        }
    }
}

impl CladogeneticWeights {
    pub fn weight(&self, mode: SpeciationMode) -> f64 {
        match mode {
            SpeciationMode::SympatricSubset => self.sympatric_subset,
            SpeciationMode::SingleUnitVicariance => self.single_unit_vicariance,
            SpeciationMode::WidespreadVicariance => self.widespread_vicariance,
            SpeciationMode::FounderEvent => self.founder_event,
        }
    }
}

/// Base mean rate plus per-lineage weight function for one event channel.
#[derive(Debug, Clone)]
pub struct ChannelRate {
    pub mean_rate: f64,
    pub weight: RateFunction,
}

/// Process-wide, read-only event-rate configuration.
#[derive(Debug, Clone)]
pub struct InphestModel {
    pub model_id: String,
    /// One unit of host time equals this many units of symbiont time.
    pub host_to_symbiont_time_scale_factor: f64,
    pub birth: ChannelRate,
    pub death: ChannelRate,
    pub host_gain: ChannelRate,
    pub host_loss: ChannelRate,
    pub area_gain: ChannelRate,
    pub area_loss: ChannelRate,
    pub host_cladogenesis: CladogeneticWeights,
    pub area_cladogenesis: CladogeneticWeights,
}

impl Default for InphestModel {
    fn default() -> Self {
        let channel = |c: EventChannel| ChannelRate {
            mean_rate: c.default_mean_rate(),
            weight: RateFunction::default(),
        };
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            host_to_symbiont_time_scale_factor: 1.0,
            birth: channel(EventChannel::Birth),
            death: channel(EventChannel::Death),
            host_gain: channel(EventChannel::HostGain),
            host_loss: channel(EventChannel::HostLoss),
            area_gain: channel(EventChannel::AreaGain),
            area_loss: channel(EventChannel::AreaLoss),
            host_cladogenesis: CladogeneticWeights::default(),
            area_cladogenesis: CladogeneticWeights::default(),
        }
    }
}

impl InphestModel {
    pub fn channel(&self, channel: EventChannel) -> &ChannelRate {
        match channel {
            EventChannel::Birth => &self.birth,
            EventChannel::Death => &self.death,
            EventChannel::HostGain => &self.host_gain,
            EventChannel::HostLoss => &self.host_loss,
            EventChannel::AreaGain => &self.area_gain,
            EventChannel::AreaLoss => &self.area_loss,
        }
    }

    fn channel_mut(&mut self, channel: EventChannel) -> &mut ChannelRate {
        match channel {
            EventChannel::Birth => &mut self.birth,
            EventChannel::Death => &mut self.death,
            EventChannel::HostGain => &mut self.host_gain,
            EventChannel::HostLoss => &mut self.host_loss,
            EventChannel::AreaGain => &mut self.area_gain,
            EventChannel::AreaLoss => &mut self.area_loss,
        }
    }

    pub fn cladogenesis(&self, process: CladogeneticProcess) -> &CladogeneticWeights {
        match process {
            CladogeneticProcess::HostAssemblage => &self.host_cladogenesis,
            CladogeneticProcess::GeographicalRange => &self.area_cladogenesis,
        }
    }

    /// Parse a model definition. `Value::Null` yields the defaults.
    ///
    /// `function_object` weight definitions are resolved against `registry`.
    pub fn parse_definition(definition: &Value, registry: Option<&RateFunctionRegistry>) -> Result<Self> {
        let mut root = match definition {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(ConfigError::InvalidType {
                    field: "model definition".to_string(),
                    expected: "an object",
                    found: other.to_string(),
                }
                .into())
            }
        };
        let mut model = InphestModel::default();

        match root.remove("model_id") {
            None | Some(Value::Null) => {
                warn!("Model identifier not specified: defaulting to '{}'", DEFAULT_MODEL_ID);
            }
            Some(Value::String(id)) => model.model_id = id,
            Some(other) => {
                return Err(ConfigError::InvalidType {
                    field: "model_id".to_string(),
                    expected: "a string",
                    found: other.to_string(),
                }
                .into())
            }
        }
        info!("Setting up model with identifier: '{}'", model.model_id);

        if let Some(value) = root.remove("host_to_symbiont_time_scale_factor") {
            let factor = as_f64("host_to_symbiont_time_scale_factor", &value)?;
            check_time_scale_factor(factor)?;
            model.host_to_symbiont_time_scale_factor = factor;
        }
        info!(
            "(TIME SCALE) 1 unit of host time is equal to {} unit(s) of symbiont time",
            model.host_to_symbiont_time_scale_factor
        );

        let channel_blocks: [(&str, &str, [EventChannel; 2]); 3] = [
            ("diversification", "DIVERSIFICATION", [EventChannel::Birth, EventChannel::Death]),
            (
                "anagenetic_host_assemblage_evolution",
                "ANAGENETIC HOST ASSEMBLAGE EVOLUTION",
                [EventChannel::HostGain, EventChannel::HostLoss],
            ),
            (
                "anagenetic_geographical_range_evolution",
                "ANAGENETIC GEOGRAPHICAL RANGE EVOLUTION",
                [EventChannel::AreaGain, EventChannel::AreaLoss],
            ),
        ];
        for (name, tag, channels) in channel_blocks {
            let mut block = Block::take(&mut root, name)?;
            for channel in channels {
                let mean_rate = block.take_f64(&channel.mean_rate_key(), channel.default_mean_rate())?;
                let weight = block.take_rate_function(&channel.weight_key(), registry)?;
                info!("({}) Mean symbiont lineage {} rate: {}", tag, channel, mean_rate);
                info!(
                    "({}) Symbiont lineage-specific {} weight function: {}",
                    tag,
                    channel,
                    weight.description()
                );
                *model.channel_mut(channel) = ChannelRate { mean_rate, weight };
            }
            block.finish()?;
        }

        for process in [CladogeneticProcess::HostAssemblage, CladogeneticProcess::GeographicalRange] {
            let mut block = Block::take(&mut root, process.block())?;
            let defaults = CladogeneticWeights::default();
            let weights = CladogeneticWeights {
                sympatric_subset: block.take_f64("sympatric_subset_speciation_weight", defaults.sympatric_subset)?,
                single_unit_vicariance: block
                    .take_f64(process.single_unit_vicariance_key(), defaults.single_unit_vicariance)?,
                widespread_vicariance: block
                    .take_f64("widespread_vicariance_speciation_weight", defaults.widespread_vicariance)?,
                founder_event: block.take_f64("founder_event_speciation_weight", defaults.founder_event)?,
            };
            block.finish()?;
            for mode in SpeciationMode::ALL {
                info!(
                    "({}) Base weight of {} speciation mode: {}",
                    process.block(),
                    mode,
                    weights.weight(mode)
                );
            }
            match process {
                CladogeneticProcess::HostAssemblage => model.host_cladogenesis = weights,
                CladogeneticProcess::GeographicalRange => model.area_cladogenesis = weights,
            }
        }

        if !root.is_empty() {
            return Err(InphestError::unsupported_keys("model", root.keys().cloned().collect()));
        }
        Ok(model)
    }

    pub fn from_json_str(s: &str, registry: Option<&RateFunctionRegistry>) -> Result<Self> {
        let value: Value = serde_json::from_str(s)?;
        Self::parse_definition(&value, registry)
    }

    pub fn from_path(path: impl AsRef<Path>, registry: Option<&RateFunctionRegistry>) -> Result<Self> {
        let file = File::open(path)?;
        let value: Value = serde_json::from_reader(std::io::BufReader::new(file))?;
        Self::parse_definition(&value, registry)
    }

    /// The nested definition `parse_definition` consumes.
    pub fn as_definition(&self) -> Value {
        let mut root = Map::new();
        root.insert("model_id".to_string(), Value::from(self.model_id.as_str()));
        root.insert(
            "host_to_symbiont_time_scale_factor".to_string(),
            Value::from(self.host_to_symbiont_time_scale_factor),
        );

        let channel_blocks = [
            ("diversification", [EventChannel::Birth, EventChannel::Death]),
            ("anagenetic_host_assemblage_evolution", [EventChannel::HostGain, EventChannel::HostLoss]),
            ("anagenetic_geographical_range_evolution", [EventChannel::AreaGain, EventChannel::AreaLoss]),
        ];
        let mut blocks: Vec<(&str, Value)> = channel_blocks
            .iter()
            .map(|(name, channels)| {
                let mut d = Map::new();
                for channel in channels {
                    let rate = self.channel(*channel);
                    d.insert(channel.mean_rate_key(), Value::from(rate.mean_rate));
                    d.insert(channel.weight_key(), rate.weight.as_definition());
                }
                (*name, Value::Object(d))
            })
            .collect();

        for process in [CladogeneticProcess::HostAssemblage, CladogeneticProcess::GeographicalRange] {
            let weights = self.cladogenesis(process);
            let mut d = Map::new();
            d.insert("sympatric_subset_speciation_weight".to_string(), Value::from(weights.sympatric_subset));
            d.insert(
                process.single_unit_vicariance_key().to_string(),
                Value::from(weights.single_unit_vicariance),
            );
            d.insert(
                "widespread_vicariance_speciation_weight".to_string(),
                Value::from(weights.widespread_vicariance),
            );
            d.insert("founder_event_speciation_weight".to_string(), Value::from(weights.founder_event));
            blocks.push((process.block(), Value::Object(d)));
        }

        // keep the documented block order
        let order = [
            "diversification",
            "anagenetic_host_assemblage_evolution",
            "cladogenetic_host_assemblage_evolution",
            "anagenetic_geographical_range_evolution",
            "cladogenetic_geographical_range_evolution",
        ];
        for name in order {
            if let Some(pos) = blocks.iter().position(|(n, _)| *n == name) {
                let (_, value) = blocks.swap_remove(pos);
                root.insert(name.to_string(), value);
            }
        }
        Value::Object(root)
    }

    /// Write the model definition as indented JSON.
    pub fn write_model<W: Write>(&self, mut out: W) -> Result<()> {
        serde_json::to_writer_pretty(&mut out, &self.as_definition())?;
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }

    pub fn write_model_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        self.write_model(BufWriter::new(file))
    }
}

/// One named sub-block of the definition being consumed key by key.
struct Block {
    name: &'static str,
    entries: Map<String, Value>,
}

impl Block {
    fn take(root: &mut Map<String, Value>, name: &'static str) -> Result<Self> {
        let entries = match root.remove(name) {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(ConfigError::InvalidType {
                    field: name.to_string(),
                    expected: "an object",
                    found: other.to_string(),
                }
                .into())
            }
        };
        Ok(Self { name, entries })
    }

    fn take_f64(&mut self, key: &str, default: f64) -> Result<f64> {
        match self.entries.remove(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => as_f64(key, &value),
        }
    }

    fn take_rate_function(&mut self, key: &str, registry: Option<&RateFunctionRegistry>) -> Result<RateFunction> {
        match self.entries.remove(key) {
            None | Some(Value::Null) => Ok(RateFunction::default()),
            Some(value) => RateFunction::parse_definition(&value, registry),
        }
    }

    fn finish(self) -> Result<()> {
        if self.entries.is_empty() {
            Ok(())
        } else {
            Err(InphestError::unsupported_keys(
                self.name,
                self.entries.keys().cloned().collect(),
            ))
        }
    }
}

fn as_f64(field: &str, value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        ConfigError::InvalidType {
            field: field.to_string(),
            expected: "a number",
            found: value.to_string(),
        }
        .into()
    })
}

/// Host time is multiplied by this factor; it must be finite and positive
/// so scheduled host events keep their order.
pub fn check_time_scale_factor(factor: f64) -> Result<()> {
    if factor.is_finite() && factor > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: "host_to_symbiont_time_scale_factor".to_string(),
            value: factor.to_string(),
            reason: "must be finite and greater than 0",
        }
        .into())
    }
}
