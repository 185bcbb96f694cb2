//! Sensor sources feeding the aggregator.
//!
//! A [`SensorSource`] owns a fixed set of readings and returns its latest
//! [`Sample`] on request. Sources fail independently; the aggregator turns a
//! failure into carried-forward values for the readings that source owns.
//!
//! Implementations:
//! - [`CachedSource`]: backed by a [`SensorWorker`] that polls a
//!   [`SensorDriver`] in its own task
//! - [`ExporterSource`]: scrapes the text output of an Enviro+ Prometheus
//!   exporter

pub mod exporter;
pub mod simulation;
pub mod worker;

pub use exporter::ExporterSource;
pub use worker::{CachedSource, SensorWorker};

use crate::error::SensorError;
use crate::snapshot::ReadingName;
use async_trait::async_trait;

/// Unit a raw value is reported in. The aggregator normalises these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    /// Already in the snapshot's unit (°C, %RH, hPa, ohms, lux, µg/m³, ...).
    Native,
    /// Pressure in pascals.
    Pascals,
    /// BME280 compensated humidity: %RH in Q22.10 fixed point (1/1024 %RH).
    RelativeHumidityQ10,
}

/// One raw value as delivered by a driver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawValue {
    pub name: ReadingName,
    pub value: f64,
    pub unit: Unit,
}

/// The set of values a source produced in one read.
///
/// A sample may be partial: readings the source owns but could not produce
/// are simply absent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sample {
    values: Vec<RawValue>,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value already in snapshot units.
    pub fn with(mut self, name: ReadingName, value: f64) -> Self {
        self.push(name, value, Unit::Native);
        self
    }

    /// Add a value in a raw driver unit.
    pub fn with_unit(mut self, name: ReadingName, value: f64, unit: Unit) -> Self {
        self.push(name, value, unit);
        self
    }

    pub fn push(&mut self, name: ReadingName, value: f64, unit: Unit) {
        self.values.retain(|v| v.name != name);
        self.values.push(RawValue { name, value, unit });
    }

    pub fn get(&self, name: ReadingName) -> Option<RawValue> {
        self.values.iter().find(|v| v.name == name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Asynchronous read access to one sensor family.
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Human readable name used in log messages.
    fn name(&self) -> &str;

    /// Readings this source is responsible for.
    fn provides(&self) -> &[ReadingName];

    /// Latest value(s) for [`provides`](Self::provides).
    async fn read(&self) -> Result<Sample, SensorError>;
}

/// Blocking driver for one physical sensor family.
///
/// Drivers talk to hardware (or simulate it) and may block; they are only
/// ever called from a [`SensorWorker`] task.
pub trait SensorDriver: Send + 'static {
    fn name(&self) -> &str;

    fn provides(&self) -> &'static [ReadingName];

    fn sample(&mut self) -> Result<Sample, SensorError>;
}
