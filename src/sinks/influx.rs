//! InfluxDB v2 sink.
//!
//! Each cycle writes one line-protocol point per reading, measured under the
//! configured sensor name: `enviroplus temperature=21.500000`. The points of
//! a cycle go out in a single write request.

use super::Sink;
use crate::config::InfluxConfig;
use crate::derived::DerivedValues;
use crate::error::{ConfigError, SinkError};
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::fmt::Write as _;
use std::time::Duration;

/// Validated connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfluxSettings {
    pub url: String,
    pub token: String,
    pub org_id: String,
    pub bucket: String,
    pub sensor_name: String,
}

impl TryFrom<&InfluxConfig> for InfluxSettings {
    type Error = ConfigError;

    fn try_from(config: &InfluxConfig) -> Result<Self, Self::Error> {
        let required = |value: &Option<String>, key: &'static str| {
            value.clone().ok_or(ConfigError::Missing(key))
        };
        Ok(Self {
            url: required(&config.url, "INFLUXDB_URL")?,
            token: required(&config.token, "INFLUXDB_TOKEN")?,
            org_id: required(&config.org_id, "INFLUXDB_ORG_ID")?,
            bucket: required(&config.bucket, "INFLUXDB_BUCKET")?,
            sensor_name: config.sensor_name.clone(),
        })
    }
}

/// Escape a measurement name for line protocol.
fn escape_measurement(name: &str) -> String {
    name.replace(',', "\\,").replace(' ', "\\ ")
}

/// Render one point per reading.
pub fn line_protocol(sensor_name: &str, snapshot: &Snapshot) -> String {
    let measurement = escape_measurement(sensor_name);
    let mut body = String::new();
    for reading in snapshot.readings() {
        // Writing to a String cannot fail
        let _ = writeln!(body, "{} {}={:.6}", measurement, reading.name, reading.value);
    }
    body
}

pub struct InfluxSink {
    client: reqwest::Client,
    settings: InfluxSettings,
    write_url: String,
}

impl InfluxSink {
    /// Fails when any of url, token, org id or bucket is missing.
    pub fn new(config: &InfluxConfig, timeout: Duration) -> Result<Self, ConfigError> {
        let settings = InfluxSettings::try_from(config)?;
        let write_url = format!("{}/api/v2/write", settings.url.trim_end_matches('/'));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        info!(
            "[Influx] Writing to {} (bucket {}, measurement {})",
            settings.url, settings.bucket, settings.sensor_name
        );
        Ok(Self {
            client,
            settings,
            write_url,
        })
    }

    pub fn settings(&self) -> &InfluxSettings {
        &self.settings
    }
}

#[async_trait]
impl Sink for InfluxSink {
    fn name(&self) -> &str {
        "influxdb"
    }

    async fn publish(&self, snapshot: &Snapshot, _derived: &DerivedValues) -> Result<(), SinkError> {
        let body = line_protocol(&self.settings.sensor_name, snapshot);

        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.settings.org_id.as_str()),
                ("bucket", self.settings.bucket.as_str()),
                ("precision", "s"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.settings.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::InfluxRejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("[Influx] Wrote {} points", snapshot.readings().count());
        Ok(())
    }
}
