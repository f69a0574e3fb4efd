//! Shared types used across the host and symbiont sides of the simulation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Tolerance used when comparing simulation times.
///
/// Host event times are rescaled by the host-to-symbiont time scale factor,
/// so lineage boundaries rarely compare exactly equal.
pub const TIME_EPSILON: f64 = 1e-6;

/// Simulation time, in symbiont time units.
pub type SimTime = f64;

/// Identifier of a host lineage as recorded in a host history.
///
/// Host histories key lineages by the integer value of the lineage's
/// split bitmask, so identifiers are stable across replicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineageId(pub u64);

impl fmt::Display for LineageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a host lineage inside one host system.
///
/// This is the fixed, system-wide host ordering used for occupancy
/// matrices and label bitstrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId(pub usize);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host#{}", self.0)
    }
}

/// Index of a geographic area. Equal to the bit position in every
/// distribution bitstring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaId(pub usize);

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Area{}", self.0)
    }
}

/// Index of a symbiont lineage in the phylogeny's lineage arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbiontId(pub usize);

impl fmt::Display for SymbiontId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Temporal activity state of a host lineage.
///
/// Transitions are strictly `Pre -> Current -> Post`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extancy {
    Pre,
    Current,
    Post,
}

impl fmt::Display for Extancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Extancy::Pre => "pre",
            Extancy::Current => "current",
            Extancy::Post => "post",
        };
        f.write_str(s)
    }
}

/// Presence/absence of a lineage in each area, written as a `0`/`1` string
/// whose position `i` corresponds to `AreaId(i)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Distribution {
    bits: Vec<bool>,
}

impl Distribution {
    /// An all-absent distribution over `width` areas.
    pub fn empty(width: usize) -> Self {
        Self { bits: vec![false; width] }
    }

    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    /// Number of areas covered (bitstring width).
    pub fn width(&self) -> usize {
        self.bits.len()
    }

    pub fn has(&self, area: AreaId) -> bool {
        self.bits.get(area.0).copied().unwrap_or(false)
    }

    pub fn set(&mut self, area: AreaId, present: bool) {
        if let Some(bit) = self.bits.get_mut(area.0) {
            *bit = present;
        }
    }

    /// Areas present in the distribution, in index order.
    pub fn presences(&self) -> impl Iterator<Item = AreaId> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, present)| **present)
            .map(|(idx, _)| AreaId(idx))
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|b| *b)
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.bits {
            f.write_str(if *bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Error returned when a bitstring contains something other than `0`/`1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidBitstring(pub String);

impl fmt::Display for InvalidBitstring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid distribution bitstring '{}'", self.0)
    }
}

impl std::error::Error for InvalidBitstring {}

impl FromStr for Distribution {
    type Err = InvalidBitstring;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bits = s
            .chars()
            .map(|c| match c {
                '1' => Ok(true),
                '0' => Ok(false),
                _ => Err(InvalidBitstring(s.to_string())),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { bits })
    }
}

impl Serialize for Distribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Distribution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Whether two times are equal within [`TIME_EPSILON`].
pub fn is_almost_equal(a: SimTime, b: SimTime) -> bool {
    (a - b).abs() < TIME_EPSILON
}

/// Whether `t` lies in `[start, end]`, treating boundary values within
/// [`TIME_EPSILON`] as inside.
pub fn is_in_range(t: SimTime, start: SimTime, end: SimTime) -> bool {
    (t > start || is_almost_equal(t, start)) && (t < end || is_almost_equal(t, end))
}
