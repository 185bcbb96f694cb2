//! Secondary metrics computed from a [`Snapshot`].
//!
//! Everything here is a pure function. Out-of-range or NaN inputs produce
//! NaN or nonsensical outputs rather than errors; sinks clamp what they
//! display.

use crate::snapshot::{ReadingName, Snapshot};
use serde::Serialize;

/// Proximity above which motion is reported.
pub const MOTION_PROXIMITY_THRESHOLD: f64 = 5.0;

/// Lower bounds (inclusive) of particulate buckets 2 through 5, in µg/m³.
const PARTICULATE_THRESHOLDS: [f64; 4] = [27.0, 62.0, 97.0, 370.0];

/// Air quality category, 1 (excellent) to 5 (poor).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct AirQuality(u8);

impl AirQuality {
    pub const EXCELLENT: AirQuality = AirQuality(1);
    pub const GOOD: AirQuality = AirQuality(2);
    pub const FAIR: AirQuality = AirQuality(3);
    pub const INFERIOR: AirQuality = AirQuality(4);
    pub const POOR: AirQuality = AirQuality(5);

    pub fn value(self) -> u8 {
        self.0
    }
}

/// Values derived from one snapshot. Discarded after dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DerivedValues {
    pub air_quality: AirQuality,
    pub carbon_monoxide: f64,
    pub nitrogen_dioxide: f64,
    pub motion_detected: bool,
}

impl DerivedValues {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            air_quality: classify_air_quality(
                snapshot.get(ReadingName::Pm25),
                snapshot.get(ReadingName::Pm10),
            ),
            carbon_monoxide: estimate_carbon_monoxide(snapshot.get(ReadingName::Reducing)),
            nitrogen_dioxide: estimate_nitrogen_dioxide(snapshot.get(ReadingName::Oxidising)),
            motion_detected: detect_motion(snapshot.get(ReadingName::Proximity)),
        }
    }
}

fn particulate_bucket(concentration: f64) -> u8 {
    // NaN compares false against every threshold and lands in bucket 1.
    let above = PARTICULATE_THRESHOLDS
        .iter()
        .filter(|&&threshold| concentration >= threshold)
        .count();
    above as u8 + 1
}

/// Bucket PM2.5 and PM10 independently and report the worse of the two.
pub fn classify_air_quality(pm25: f64, pm10: f64) -> AirQuality {
    AirQuality(particulate_bucket(pm25).max(particulate_bucket(pm10)))
}

/// Rough CO estimate from the reducing-gas resistance (ohms).
///
/// Resistance falls as CO rises, hence the inverse form. The result is not
/// clamped here.
pub fn estimate_carbon_monoxide(reducing_ohms: f64) -> f64 {
    (1000.0 - reducing_ohms / 1000.0) / 100.0
}

/// Rough NO2 estimate from the oxidising-gas resistance (ohms).
pub fn estimate_nitrogen_dioxide(oxidising_ohms: f64) -> f64 {
    oxidising_ohms / 10000.0
}

pub fn detect_motion(proximity: f64) -> bool {
    proximity > MOTION_PROXIMITY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotBuilder;
    use chrono::Utc;

    #[test]
    fn test_air_quality_takes_worse_channel() {
        assert_eq!(classify_air_quality(10.0, 200.0), AirQuality::INFERIOR);
        assert_eq!(classify_air_quality(400.0, 5.0), AirQuality::POOR);
        assert_eq!(classify_air_quality(0.0, 0.0), AirQuality::EXCELLENT);
        assert_eq!(classify_air_quality(70.0, 30.0), AirQuality::FAIR);
    }

    #[test]
    fn test_air_quality_boundaries() {
        assert_eq!(classify_air_quality(27.0, 0.0).value(), 2);
        assert_eq!(classify_air_quality(26.999, 0.0).value(), 1);
        assert_eq!(classify_air_quality(62.0, 0.0).value(), 3);
        assert_eq!(classify_air_quality(61.999, 0.0).value(), 2);
        assert_eq!(classify_air_quality(97.0, 0.0).value(), 4);
        assert_eq!(classify_air_quality(370.0, 0.0).value(), 5);
        assert_eq!(classify_air_quality(369.999, 0.0).value(), 4);
        assert_eq!(classify_air_quality(0.0, 370.0).value(), 5);
    }

    #[test]
    fn test_air_quality_nan_is_lowest_bucket() {
        assert_eq!(classify_air_quality(f64::NAN, f64::NAN), AirQuality::EXCELLENT);
        assert_eq!(classify_air_quality(f64::NAN, 100.0), AirQuality::INFERIOR);
    }

    #[test]
    fn test_carbon_monoxide_estimate() {
        assert_eq!(estimate_carbon_monoxide(0.0), 10.0);
        assert_eq!(estimate_carbon_monoxide(1_000_000.0), 0.0);
        assert!((estimate_carbon_monoxide(500_000.0) - 5.0).abs() < 1e-9);
        assert!((estimate_carbon_monoxide(550_000.0) - 4.5).abs() < 1e-9);

        let mut last = f64::INFINITY;
        for ohms in (0..2_000_000).step_by(50_000) {
            let estimate = estimate_carbon_monoxide(ohms as f64);
            assert!(estimate < last);
            last = estimate;
        }
    }

    #[test]
    fn test_nitrogen_dioxide_estimate() {
        assert_eq!(estimate_nitrogen_dioxide(50_000.0), 5.0);
        assert_eq!(estimate_nitrogen_dioxide(0.0), 0.0);
    }

    #[test]
    fn test_motion_threshold() {
        assert!(detect_motion(6.0));
        assert!(!detect_motion(5.0));
        assert!(detect_motion(5.0001));
        assert!(!detect_motion(f64::NAN));
    }

    #[test]
    fn test_from_snapshot() {
        let mut builder = SnapshotBuilder::from_previous(&Snapshot::initial());
        builder.set(ReadingName::Temperature, 20.0);
        builder.set(ReadingName::Pm25, 30.0);
        builder.set(ReadingName::Pm10, 50.0);
        builder.set(ReadingName::Reducing, 500_000.0);
        builder.set(ReadingName::Oxidising, 20_000.0);
        builder.set(ReadingName::Proximity, 10.0);
        let derived = DerivedValues::from_snapshot(&builder.build(Utc::now()));

        assert_eq!(derived.air_quality, AirQuality::GOOD);
        assert!((derived.carbon_monoxide - 5.0).abs() < 1e-9);
        assert_eq!(derived.nitrogen_dioxide, 2.0);
        assert!(derived.motion_detected);
    }
}
