//! Reading identifiers and the per-cycle snapshot.
//!
//! A [`Snapshot`] always holds a value for every [`ReadingName`]. It is built
//! once per poll cycle and never mutated afterwards, so sinks can hold a
//! reference to it without observing a half-updated cycle.

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

/// Identifier of one of the eleven Enviro+ readings.
///
/// The string form (`"temperature"`, `"pm25"`, ...) is used for lookup when
/// parsing exporter output and as the label/field name in every sink.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, EnumIter, EnumCount,
)]
#[strum(serialize_all = "lowercase")]
pub enum ReadingName {
    Temperature,
    Humidity,
    Pressure,
    Oxidising,
    Reducing,
    Nh3,
    Lux,
    Proximity,
    Pm1,
    Pm25,
    Pm10,
}

impl ReadingName {
    /// All readings, in snapshot order.
    pub const ALL: [ReadingName; ReadingName::COUNT] = [
        ReadingName::Temperature,
        ReadingName::Humidity,
        ReadingName::Pressure,
        ReadingName::Oxidising,
        ReadingName::Reducing,
        ReadingName::Nh3,
        ReadingName::Lux,
        ReadingName::Proximity,
        ReadingName::Pm1,
        ReadingName::Pm25,
        ReadingName::Pm10,
    ];

    pub fn as_str(self) -> &'static str {
        self.into()
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A single named value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    pub name: ReadingName,
    pub value: f64,
}

/// Immutable set of all eleven readings captured in one cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    values: [f64; ReadingName::COUNT],
    taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// The snapshot that precedes the first cycle: every reading is 0.0.
    pub fn initial() -> Self {
        Self {
            values: [0.0; ReadingName::COUNT],
            taken_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Value of a reading.
    pub fn get(&self, name: ReadingName) -> f64 {
        self.values[name.index()]
    }

    /// When the snapshot was assembled.
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Iterate over all readings in [`ReadingName::ALL`] order.
    pub fn readings(&self) -> impl Iterator<Item = Reading> + '_ {
        ReadingName::ALL.into_iter().map(|name| Reading {
            name,
            value: self.get(name),
        })
    }
}

/// Accumulates values for the next snapshot, starting from the previous one.
///
/// Only the aggregator builds snapshots; everything else sees the frozen
/// [`Snapshot`].
#[derive(Debug)]
pub struct SnapshotBuilder {
    values: [f64; ReadingName::COUNT],
}

impl SnapshotBuilder {
    /// Start from the previous cycle's values so unset readings carry forward.
    pub fn from_previous(previous: &Snapshot) -> Self {
        Self {
            values: previous.values,
        }
    }

    pub fn set(&mut self, name: ReadingName, value: f64) {
        self.values[name.index()] = value;
    }

    pub fn build(self, taken_at: DateTime<Utc>) -> Snapshot {
        Snapshot {
            values: self.values,
            taken_at,
        }
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 1))?;
        map.serialize_entry("taken_at", &self.taken_at)?;
        for reading in self.readings() {
            map.serialize_entry(reading.name.as_str(), &reading.value)?;
        }
        map.end()
    }
}
