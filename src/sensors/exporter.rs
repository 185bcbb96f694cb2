//! Scrape-based source reading an Enviro+ Prometheus exporter.
//!
//! The exporter publishes one gauge per reading in text exposition format
//! (`temperature 21.5`, `NH3 81234.5`, ...). Values are already in snapshot
//! units. A line whose value does not parse only drops that reading; the rest
//! of the payload still applies.

use super::{Sample, SensorSource, Unit};
use crate::config::SourceConfig;
use crate::error::SensorError;
use crate::snapshot::ReadingName;
use async_trait::async_trait;
use log::debug;
use std::str::FromStr;
use std::time::Duration;

pub struct ExporterSource {
    client: reqwest::Client,
    url: String,
}

impl ExporterSource {
    pub fn new(config: &SourceConfig, timeout: Duration) -> Result<Self, SensorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SensorError::Exporter(e.to_string()))?;
        Ok(Self {
            client,
            url: format!("{}:{}", config.exporter_host, config.exporter_port),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SensorSource for ExporterSource {
    fn name(&self) -> &str {
        "enviroplus-exporter"
    }

    fn provides(&self) -> &[ReadingName] {
        &ReadingName::ALL
    }

    async fn read(&self) -> Result<Sample, SensorError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SensorError::Exporter(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| SensorError::Exporter(e.to_string()))?;
        Ok(parse_exposition(&body))
    }
}

/// Extract every known reading from exposition text.
///
/// Metric names are matched case-insensitively against [`ReadingName`];
/// comments, labelled series and unknown metrics are ignored.
pub fn parse_exposition(text: &str) -> Sample {
    let mut sample = Sample::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let (Some(metric), Some(raw_value)) = (parts.next(), parts.next()) else {
            continue;
        };
        if metric.contains('{') {
            continue;
        }
        let Ok(name) = ReadingName::from_str(&metric.to_ascii_lowercase()) else {
            continue;
        };

        match raw_value.parse::<f64>() {
            Ok(value) => sample.push(name, value, Unit::Native),
            Err(e) => debug!("[Sensors] ignoring malformed {} value '{}': {}", name, raw_value, e),
        }
    }

    sample
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = "\
# HELP temperature Temperature measured (*C)
# TYPE temperature gauge
temperature 17.62804726392642
humidity 48.2
pressure 1012.5
oxidising 21000.0
reducing 480000.0
NH3 95000.0
lux 12.5
proximity 1.0
PM1 3.0
PM25 oops
PM10 9.0
oxidising_measurements_bucket{le=\"10000.0\"} 0.0
python_gc_objects_collected_total{generation=\"0\"} 371.0
";

    #[test]
    fn test_parses_known_readings() {
        let sample = parse_exposition(PAYLOAD);
        let value = |name| sample.get(name).map(|v| v.value);

        assert_eq!(value(ReadingName::Temperature), Some(17.62804726392642));
        assert_eq!(value(ReadingName::Pressure), Some(1012.5));
        assert_eq!(value(ReadingName::Nh3), Some(95000.0));
        assert_eq!(value(ReadingName::Pm1), Some(3.0));
        assert_eq!(value(ReadingName::Pm10), Some(9.0));
        assert_eq!(
            sample.get(ReadingName::Humidity).map(|v| v.unit),
            Some(Unit::Native)
        );
    }

    #[test]
    fn test_malformed_field_only_drops_that_field() {
        let sample = parse_exposition(PAYLOAD);
        assert!(sample.get(ReadingName::Pm25).is_none());
        assert!(sample.get(ReadingName::Lux).is_some());
    }

    #[test]
    fn test_empty_payload_yields_empty_sample() {
        assert!(parse_exposition("").is_empty());
        assert!(parse_exposition("# only comments\n").is_empty());
    }

    #[test]
    fn test_url_from_config() {
        let config = SourceConfig {
            exporter_host: "http://10.0.0.5".into(),
            exporter_port: 1006,
            ..SourceConfig::default()
        };
        let source = ExporterSource::new(&config, Duration::from_secs(1)).unwrap();
        assert_eq!(source.url(), "http://10.0.0.5:1006");
    }
}
