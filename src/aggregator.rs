//! One poll cycle across every sensor source.
//!
//! All sources are read concurrently and joined before the snapshot is
//! built. Any reading that could not be obtained keeps its previous value and
//! is reported as a [`ReadFailure`]; nothing here aborts a cycle.

use crate::error::SensorError;
use crate::sensors::{RawValue, Sample, SensorSource, Unit};
use crate::snapshot::{ReadingName, Snapshot, SnapshotBuilder};
use chrono::Utc;
use futures_util::future::join_all;
use log::warn;
use rand::Rng;
use std::fmt;
use std::time::Duration;

const PASCALS_PER_HECTOPASCAL: f64 = 100.0;
const HUMIDITY_Q10_SCALE: f64 = 1024.0;

/// Range of the development-mode temperature, in °C.
const DEV_TEMPERATURE_RANGE: std::ops::Range<f64> = 15.0..30.0;

/// Why a reading kept its previous value this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    Source(SensorError),
    Missing,
    NotFinite(f64),
    Unowned,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Source(e) => write!(f, "{e}"),
            FailureReason::Missing => write!(f, "missing from sample"),
            FailureReason::NotFinite(v) => write!(f, "implausible value {v}"),
            FailureReason::Unowned => write!(f, "no source provides it"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadFailure {
    pub name: ReadingName,
    pub reason: FailureReason,
}

/// Result of one collection pass.
#[derive(Debug, Clone)]
pub struct Collection {
    pub snapshot: Snapshot,
    pub failures: Vec<ReadFailure>,
}

/// Convert a raw driver value into snapshot units.
pub fn normalize(raw: RawValue) -> f64 {
    match raw.unit {
        Unit::Native => raw.value,
        Unit::Pascals => raw.value / PASCALS_PER_HECTOPASCAL,
        Unit::RelativeHumidityQ10 => raw.value / HUMIDITY_Q10_SCALE,
    }
}

pub struct ReadingAggregator {
    sources: Vec<Box<dyn SensorSource>>,
    read_timeout: Duration,
    dev_mode: bool,
}

impl ReadingAggregator {
    pub fn new(sources: Vec<Box<dyn SensorSource>>, read_timeout: Duration) -> Self {
        Self {
            sources,
            read_timeout,
            dev_mode: false,
        }
    }

    /// Overwrite temperature with a random value after every collection.
    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    async fn read_source(&self, source: &dyn SensorSource) -> Result<Sample, SensorError> {
        match tokio::time::timeout(self.read_timeout, source.read()).await {
            Ok(result) => result,
            Err(_) => Err(SensorError::Timeout(self.read_timeout)),
        }
    }

    /// Build the next snapshot, carrying forward values from `previous`
    /// wherever a reading could not be obtained.
    pub async fn collect(&self, previous: &Snapshot) -> Collection {
        let dev_mode = self.dev_mode;

        let results = join_all(
            self.sources
                .iter()
                .map(|source| self.read_source(source.as_ref())),
        )
        .await;

        let mut builder = SnapshotBuilder::from_previous(previous);
        let mut failures = Vec::new();

        for name in ReadingName::ALL {
            let owner = self
                .sources
                .iter()
                .position(|source| source.provides().contains(&name));

            let outcome = match owner {
                None => Err(FailureReason::Unowned),
                Some(index) => match &results[index] {
                    Err(e) => Err(FailureReason::Source(e.clone())),
                    Ok(sample) => match sample.get(name).map(normalize) {
                        None => Err(FailureReason::Missing),
                        Some(value) if !value.is_finite() => Err(FailureReason::NotFinite(value)),
                        Some(value) => Ok(value),
                    },
                },
            };

            match outcome {
                Ok(value) => builder.set(name, value),
                Err(reason) => failures.push(ReadFailure { name, reason }),
            }
        }

        for (source, result) in self.sources.iter().zip(&results) {
            if let Err(e) = result {
                warn!("[Sensors] {} read failed, keeping previous values: {}", source.name(), e);
            }
        }
        for failure in &failures {
            if !matches!(failure.reason, FailureReason::Source(_)) {
                warn!("[Sensors] {} kept previous value: {}", failure.name, failure.reason);
            }
        }

        if dev_mode {
            let temperature = rand::thread_rng().gen_range(DEV_TEMPERATURE_RANGE);
            builder.set(ReadingName::Temperature, temperature);
        }

        Collection {
            snapshot: builder.build(Utc::now()),
            failures,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Source returning a scripted result per call; repeats the last one.
    pub(crate) struct ScriptedSource {
        provides: Vec<ReadingName>,
        script: Mutex<Vec<Result<Sample, SensorError>>>,
    }

    impl ScriptedSource {
        pub(crate) fn new(
            provides: &[ReadingName],
            script: Vec<Result<Sample, SensorError>>,
        ) -> Self {
            let mut script = script;
            script.reverse();
            Self {
                provides: provides.to_vec(),
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl SensorSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        fn provides(&self) -> &[ReadingName] {
            &self.provides
        }

        async fn read(&self) -> Result<Sample, SensorError> {
            let mut script = self.script.lock();
            if script.len() > 1 {
                script.pop().unwrap()
            } else {
                script.last().cloned().unwrap()
            }
        }
    }

    struct HangingSource;

    #[async_trait]
    impl SensorSource for HangingSource {
        fn name(&self) -> &str {
            "hanging"
        }

        fn provides(&self) -> &[ReadingName] {
            &[ReadingName::Lux]
        }

        async fn read(&self) -> Result<Sample, SensorError> {
            std::future::pending().await
        }
    }

    fn fail() -> Result<Sample, SensorError> {
        Err(SensorError::ReadFailed("i2c nack".into()))
    }

    #[tokio::test]
    async fn test_every_name_present_when_all_sources_fail() {
        let aggregator = ReadingAggregator::new(
            vec![Box::new(ScriptedSource::new(&ReadingName::ALL, vec![fail()]))],
            Duration::from_secs(1),
        );
        let collection = aggregator.collect(&Snapshot::initial()).await;

        assert_eq!(collection.snapshot.readings().count(), 11);
        assert!(collection.snapshot.readings().all(|r| r.value == 0.0));
        assert_eq!(collection.failures.len(), 11);
    }

    #[tokio::test]
    async fn test_failed_read_carries_previous_value() {
        let source = ScriptedSource::new(
            &[ReadingName::Temperature, ReadingName::Lux],
            vec![
                Ok(Sample::new()
                    .with(ReadingName::Temperature, 21.0)
                    .with(ReadingName::Lux, 300.0)),
                fail(),
            ],
        );
        let aggregator = ReadingAggregator::new(vec![Box::new(source)], Duration::from_secs(1));

        let first = aggregator.collect(&Snapshot::initial()).await.snapshot;
        let second = aggregator.collect(&first).await;

        assert_eq!(second.snapshot.get(ReadingName::Temperature), 21.0);
        assert_eq!(second.snapshot.get(ReadingName::Lux), 300.0);
        assert!(second.failures.iter().any(|f| f.name == ReadingName::Lux
            && matches!(f.reason, FailureReason::Source(_))));
    }

    #[tokio::test]
    async fn test_unowned_readings_are_failures_at_zero() {
        let source = ScriptedSource::new(
            &[ReadingName::Lux],
            vec![Ok(Sample::new().with(ReadingName::Lux, 5.0))],
        );
        let aggregator = ReadingAggregator::new(vec![Box::new(source)], Duration::from_secs(1));
        let collection = aggregator.collect(&Snapshot::initial()).await;

        assert_eq!(collection.snapshot.get(ReadingName::Lux), 5.0);
        assert_eq!(collection.snapshot.get(ReadingName::Pm10), 0.0);
        assert_eq!(collection.failures.len(), 10);
        assert!(collection
            .failures
            .iter()
            .all(|f| f.reason == FailureReason::Unowned));
    }

    #[tokio::test]
    async fn test_non_finite_values_are_rejected() {
        let source = ScriptedSource::new(
            &[ReadingName::Pm1, ReadingName::Pm25],
            vec![
                Ok(Sample::new()
                    .with(ReadingName::Pm1, 2.0)
                    .with(ReadingName::Pm25, 4.0)),
                Ok(Sample::new()
                    .with(ReadingName::Pm1, f64::NAN)
                    .with(ReadingName::Pm25, f64::INFINITY)),
            ],
        );
        let aggregator = ReadingAggregator::new(vec![Box::new(source)], Duration::from_secs(1));

        let first = aggregator.collect(&Snapshot::initial()).await.snapshot;
        let second = aggregator.collect(&first).await;

        assert_eq!(second.snapshot.get(ReadingName::Pm1), 2.0);
        assert_eq!(second.snapshot.get(ReadingName::Pm25), 4.0);
        assert!(second
            .failures
            .iter()
            .any(|f| f.name == ReadingName::Pm25 && f.reason == FailureReason::NotFinite(f64::INFINITY)));
    }

    #[tokio::test]
    async fn test_partial_sample_keeps_missing_reading() {
        let source = ScriptedSource::new(
            &[ReadingName::Pm1, ReadingName::Pm10],
            vec![Ok(Sample::new().with(ReadingName::Pm1, 7.0))],
        );
        let aggregator = ReadingAggregator::new(vec![Box::new(source)], Duration::from_secs(1));
        let collection = aggregator.collect(&Snapshot::initial()).await;

        assert_eq!(collection.snapshot.get(ReadingName::Pm1), 7.0);
        assert!(collection.failures.contains(&ReadFailure {
            name: ReadingName::Pm10,
            reason: FailureReason::Missing,
        }));
    }

    #[tokio::test]
    async fn test_units_are_normalized() {
        let source = ScriptedSource::new(
            &[ReadingName::Humidity, ReadingName::Pressure],
            vec![Ok(Sample::new()
                .with_unit(ReadingName::Humidity, 46_080.0, Unit::RelativeHumidityQ10)
                .with_unit(ReadingName::Pressure, 101_325.0, Unit::Pascals))],
        );
        let aggregator = ReadingAggregator::new(vec![Box::new(source)], Duration::from_secs(1));
        let snapshot = aggregator.collect(&Snapshot::initial()).await.snapshot;

        assert_eq!(snapshot.get(ReadingName::Humidity), 45.0);
        assert!((snapshot.get(ReadingName::Pressure) - 1013.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_hanging_source_times_out() {
        let aggregator = ReadingAggregator::new(
            vec![
                Box::new(HangingSource),
                Box::new(ScriptedSource::new(
                    &[ReadingName::Pm1],
                    vec![Ok(Sample::new().with(ReadingName::Pm1, 1.0))],
                )),
            ],
            Duration::from_millis(20),
        );
        let collection = aggregator.collect(&Snapshot::initial()).await;

        assert_eq!(collection.snapshot.get(ReadingName::Pm1), 1.0);
        assert!(collection.failures.contains(&ReadFailure {
            name: ReadingName::Lux,
            reason: FailureReason::Source(SensorError::Timeout(Duration::from_millis(20))),
        }));
    }

    #[tokio::test]
    async fn test_dev_mode_overrides_temperature() {
        let source = ScriptedSource::new(
            &[ReadingName::Temperature],
            vec![Ok(Sample::new().with(ReadingName::Temperature, -40.0))],
        );
        let aggregator = ReadingAggregator::new(vec![Box::new(source)], Duration::from_secs(1))
            .with_dev_mode(true);

        for _ in 0..20 {
            let snapshot = aggregator.collect(&Snapshot::initial()).await.snapshot;
            let temperature = snapshot.get(ReadingName::Temperature);
            assert!((15.0..30.0).contains(&temperature));
        }
    }
}
