//! Simulated Enviro+ drivers for development without hardware.
//!
//! Each driver mimics one sensor family and reports in that chip's raw units
//! (the BME280 reports pascals and Q22.10 humidity), so the aggregator's
//! normalisation is exercised exactly as with real drivers.

use super::{Sample, SensorDriver, SensorSource, SensorWorker, Unit};
use crate::error::SensorError;
use crate::snapshot::ReadingName;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Random walk clamped to a range.
struct Drift {
    value: f64,
    step: f64,
    min: f64,
    max: f64,
}

impl Drift {
    fn new(value: f64, step: f64, min: f64, max: f64) -> Self {
        Self {
            value,
            step,
            min,
            max,
        }
    }

    fn next(&mut self, rng: &mut StdRng) -> f64 {
        let delta = rng.gen_range(-self.step..=self.step);
        self.value = (self.value + delta).clamp(self.min, self.max);
        self.value
    }
}

/// Temperature, humidity and pressure (BME280).
pub struct SimulatedBme280 {
    rng: StdRng,
    temperature: Drift,
    humidity: Drift,
    pressure: Drift,
}

impl SimulatedBme280 {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            temperature: Drift::new(21.0, 0.2, -10.0, 45.0),
            humidity: Drift::new(45.0, 0.5, 0.0, 100.0),
            pressure: Drift::new(101_325.0, 20.0, 95_000.0, 105_000.0),
        }
    }
}

impl Default for SimulatedBme280 {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorDriver for SimulatedBme280 {
    fn name(&self) -> &str {
        "BME280"
    }

    fn provides(&self) -> &'static [ReadingName] {
        &[
            ReadingName::Temperature,
            ReadingName::Humidity,
            ReadingName::Pressure,
        ]
    }

    fn sample(&mut self) -> Result<Sample, SensorError> {
        let temperature = self.temperature.next(&mut self.rng);
        let humidity = self.humidity.next(&mut self.rng);
        let pressure = self.pressure.next(&mut self.rng);
        Ok(Sample::new()
            .with(ReadingName::Temperature, temperature)
            .with_unit(
                ReadingName::Humidity,
                (humidity * 1024.0).round(),
                Unit::RelativeHumidityQ10,
            )
            .with_unit(ReadingName::Pressure, pressure, Unit::Pascals))
    }
}

/// Oxidising, reducing and NH3 gas resistances (MICS6814).
pub struct SimulatedMics6814 {
    rng: StdRng,
    oxidising: Drift,
    reducing: Drift,
    nh3: Drift,
}

impl SimulatedMics6814 {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            oxidising: Drift::new(20_000.0, 500.0, 5_000.0, 100_000.0),
            reducing: Drift::new(500_000.0, 5_000.0, 100_000.0, 1_500_000.0),
            nh3: Drift::new(100_000.0, 2_000.0, 10_000.0, 2_000_000.0),
        }
    }
}

impl Default for SimulatedMics6814 {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorDriver for SimulatedMics6814 {
    fn name(&self) -> &str {
        "MICS6814"
    }

    fn provides(&self) -> &'static [ReadingName] {
        &[
            ReadingName::Oxidising,
            ReadingName::Reducing,
            ReadingName::Nh3,
        ]
    }

    fn sample(&mut self) -> Result<Sample, SensorError> {
        Ok(Sample::new()
            .with(ReadingName::Oxidising, self.oxidising.next(&mut self.rng))
            .with(ReadingName::Reducing, self.reducing.next(&mut self.rng))
            .with(ReadingName::Nh3, self.nh3.next(&mut self.rng)))
    }
}

/// Ambient light and proximity (LTR-559).
pub struct SimulatedLtr559 {
    rng: StdRng,
    lux: Drift,
}

impl SimulatedLtr559 {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            lux: Drift::new(150.0, 10.0, 0.0, 2_000.0),
        }
    }
}

impl Default for SimulatedLtr559 {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorDriver for SimulatedLtr559 {
    fn name(&self) -> &str {
        "LTR-559"
    }

    fn provides(&self) -> &'static [ReadingName] {
        &[ReadingName::Lux, ReadingName::Proximity]
    }

    fn sample(&mut self) -> Result<Sample, SensorError> {
        // Someone walks past roughly one sample in ten.
        let proximity = if self.rng.gen_bool(0.1) {
            self.rng.gen_range(50.0..1500.0)
        } else {
            self.rng.gen_range(0.0..3.0)
        };
        Ok(Sample::new()
            .with(ReadingName::Lux, self.lux.next(&mut self.rng))
            .with(ReadingName::Proximity, proximity))
    }
}

/// Particulate matter (PMS5003).
pub struct SimulatedPms5003 {
    rng: StdRng,
    pm1: Drift,
}

impl SimulatedPms5003 {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            pm1: Drift::new(4.0, 1.0, 0.0, 80.0),
        }
    }
}

impl Default for SimulatedPms5003 {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorDriver for SimulatedPms5003 {
    fn name(&self) -> &str {
        "PMS5003"
    }

    fn provides(&self) -> &'static [ReadingName] {
        &[ReadingName::Pm1, ReadingName::Pm25, ReadingName::Pm10]
    }

    fn sample(&mut self) -> Result<Sample, SensorError> {
        // Larger particle classes include the smaller ones.
        let pm1 = self.pm1.next(&mut self.rng).round();
        let pm25 = pm1 + self.rng.gen_range(0.0..6.0_f64).round();
        let pm10 = pm25 + self.rng.gen_range(0.0..8.0_f64).round();
        Ok(Sample::new()
            .with(ReadingName::Pm1, pm1)
            .with(ReadingName::Pm25, pm25)
            .with(ReadingName::Pm10, pm10))
    }
}

/// Spawn workers for all four simulated sensor families.
///
/// Returns the cached sources for the aggregator and the worker handles.
pub fn spawn_simulated_sources(
    period: Duration,
    max_age: Duration,
    cancel: &CancellationToken,
) -> (Vec<Box<dyn SensorSource>>, Vec<JoinHandle<()>>) {
    let mut sources: Vec<Box<dyn SensorSource>> = Vec::new();
    let mut handles = Vec::new();

    let (source, handle) =
        SensorWorker::spawn(SimulatedBme280::new(), period, max_age, cancel.clone());
    sources.push(Box::new(source));
    handles.push(handle);

    let (source, handle) =
        SensorWorker::spawn(SimulatedMics6814::new(), period, max_age, cancel.clone());
    sources.push(Box::new(source));
    handles.push(handle);

    let (source, handle) =
        SensorWorker::spawn(SimulatedLtr559::new(), period, max_age, cancel.clone());
    sources.push(Box::new(source));
    handles.push(handle);

    let (source, handle) =
        SensorWorker::spawn(SimulatedPms5003::new(), period, max_age, cancel.clone());
    sources.push(Box::new(source));
    handles.push(handle);

    (sources, handles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bme280_reports_raw_units() {
        let mut driver = SimulatedBme280::new();
        let sample = driver.sample().unwrap();

        let pressure = sample.get(ReadingName::Pressure).unwrap();
        assert_eq!(pressure.unit, Unit::Pascals);
        assert!(pressure.value > 90_000.0);

        let humidity = sample.get(ReadingName::Humidity).unwrap();
        assert_eq!(humidity.unit, Unit::RelativeHumidityQ10);
    }

    #[test]
    fn test_pms5003_sizes_are_cumulative() {
        let mut driver = SimulatedPms5003::new();
        for _ in 0..50 {
            let sample = driver.sample().unwrap();
            let pm1 = sample.get(ReadingName::Pm1).unwrap().value;
            let pm25 = sample.get(ReadingName::Pm25).unwrap().value;
            let pm10 = sample.get(ReadingName::Pm10).unwrap().value;
            assert!(pm1 <= pm25 && pm25 <= pm10);
        }
    }

    #[test]
    fn test_drivers_cover_every_reading_once() {
        let drivers: Vec<Box<dyn SensorDriver>> = vec![
            Box::new(SimulatedBme280::new()),
            Box::new(SimulatedMics6814::new()),
            Box::new(SimulatedLtr559::new()),
            Box::new(SimulatedPms5003::new()),
        ];
        let mut covered: Vec<ReadingName> = drivers
            .iter()
            .flat_map(|d| d.provides().iter().copied())
            .collect();
        covered.sort_by_key(|n| *n as usize);
        assert_eq!(covered, ReadingName::ALL.to_vec());
    }
}
