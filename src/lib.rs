//! Enviro+ bridge library.
//!
//! Polls the Enviro+ sensor families, assembles one snapshot per cycle,
//! derives air quality, gas estimates and motion, and fans the result out to
//! a smart-home accessory, a Prometheus endpoint and InfluxDB.

pub mod aggregator;
pub mod config;
pub mod derived;
pub mod error;
pub mod scheduler;
pub mod sensors;
pub mod sinks;
pub mod snapshot;

pub use aggregator::{Collection, ReadFailure, ReadingAggregator};
pub use derived::{AirQuality, DerivedValues};
pub use scheduler::{CycleOutcome, Scheduler, SchedulerState};
pub use sinks::{Sink, SinkDispatcher};
pub use snapshot::{Reading, ReadingName, Snapshot};
