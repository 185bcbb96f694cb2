use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use strum::{Display, EnumString};

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = unquote(value.trim());

            // Variables already in the environment win
            if std::env::var(key).is_err() {
                // SAFETY: called from main before the runtime starts any threads
                unsafe { std::env::set_var(key, value) };
            }
        }
    }
}

/// Strip one pair of matching surrounding quotes, if present.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && matches!(bytes[0], b'"' | b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Parse a duration such as `500ms`, `5s`, `2m` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let input = input.trim();
    let invalid = || ConfigError::InvalidDuration(input.to_string());

    let (number, scale_ms) = if let Some(n) = input.strip_suffix("ms") {
        (n, 1.0)
    } else if let Some(n) = input.strip_suffix('s') {
        (n, 1_000.0)
    } else if let Some(n) = input.strip_suffix('m') {
        (n, 60_000.0)
    } else if let Some(n) = input.strip_suffix('h') {
        (n, 3_600_000.0)
    } else {
        (input, 1_000.0)
    };

    let value: f64 = number.trim().parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(value * scale_ms / 1_000.0).map_err(|_| invalid())
}

fn env_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub poll: PollConfig,
    pub source: SourceConfig,
    pub accessory: AccessoryConfig,
    pub metrics: MetricsConfig,
    pub influx: InfluxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Sleep between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Replace the temperature reading with a random value every cycle.
    pub dev_mode: bool,
    pub read_timeout: Duration,
    pub publish_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Scrape a running Enviro+ Prometheus exporter.
    Exporter,
    /// Simulated drivers, no hardware required.
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub exporter_host: String,
    pub exporter_port: u16,
    /// Driver polling period for worker-backed sources.
    pub sample_period: Duration,
    /// Cached samples older than this count as failed reads.
    pub max_sample_age: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessoryConfig {
    pub name: String,
    pub serial_number: String,
    pub manufacturer: String,
    pub model: String,
    pub firmware_revision: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub token: Option<String>,
    pub org_id: Option<String>,
    pub bucket: Option<String>,
    /// Measurement name every point is written under.
    pub sensor_name: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Exporter,
            exporter_host: "http://0.0.0.0".to_string(),
            exporter_port: 1006,
            sample_period: Duration::from_secs(1),
            max_sample_age: Duration::from_secs(30),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll: PollConfig {
                interval: Duration::from_secs(5),
                dev_mode: false,
                read_timeout: Duration::from_secs(2),
                publish_timeout: Duration::from_secs(5),
            },
            source: SourceConfig::default(),
            accessory: AccessoryConfig {
                name: "Enviro+".to_string(),
                serial_number: "PIM486".to_string(),
                manufacturer: "Pimoroni".to_string(),
                model: "Enviro+".to_string(),
                firmware_revision: "1.0.0".to_string(),
            },
            metrics: MetricsConfig {
                enabled: false,
                address: "0.0.0.0:1007".to_string(),
            },
            influx: InfluxConfig {
                enabled: false,
                url: None,
                token: None,
                org_id: None,
                bucket: None,
                sensor_name: "enviroplus".to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Polling
        if let Some(interval) = env_string("ENVIRO_POLL_INTERVAL") {
            config.poll.interval = parse_duration(&interval)?;
        }
        if let Some(dev) = env_string("ENVIRO_DEV_MODE") {
            config.poll.dev_mode = env_flag(&dev);
        }
        if let Some(timeout) = env_string("ENVIRO_READ_TIMEOUT") {
            config.poll.read_timeout = parse_duration(&timeout)?;
        }
        if let Some(timeout) = env_string("ENVIRO_PUBLISH_TIMEOUT") {
            config.poll.publish_timeout = parse_duration(&timeout)?;
        }

        // Sensor source
        if let Some(kind) = env_string("ENVIRO_SOURCE") {
            config.source.kind = kind
                .parse()
                .map_err(|_| ConfigError::UnknownSource(kind.clone()))?;
        }
        if let Some(host) = env_string("ENVIRO_EXPORTER_HOST") {
            config.source.exporter_host = host;
        }
        if let Some(port) = env_string("ENVIRO_EXPORTER_PORT")
            && let Ok(p) = port.parse()
        {
            config.source.exporter_port = p;
        }

        // Accessory identity
        if let Some(name) = env_string("ACCESSORY_NAME") {
            config.accessory.name = name;
        }
        if let Some(serial) = env_string("ACCESSORY_SERIAL") {
            config.accessory.serial_number = serial;
        }

        // Metrics endpoint
        if let Some(enabled) = env_string("ENVIRO_METRICS_ENABLED") {
            config.metrics.enabled = env_flag(&enabled);
        }
        if let Some(address) = env_string("ENVIRO_METRICS_ADDRESS") {
            config.metrics.address = address;
        }

        // InfluxDB
        if let Some(enabled) = env_string("INFLUXDB_ENABLED") {
            config.influx.enabled = env_flag(&enabled);
        }
        config.influx.url = env_string("INFLUXDB_URL");
        config.influx.token = env_string("INFLUXDB_TOKEN");
        config.influx.org_id = env_string("INFLUXDB_ORG_ID");
        config.influx.bucket = env_string("INFLUXDB_BUCKET");
        if let Some(name) = env_string("INFLUXDB_SENSOR_NAME") {
            config.influx.sensor_name = name;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("10"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("1e300").is_err());
        assert!(parse_duration("1e300h").is_err());
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"quoted value\""), "quoted value");
        assert_eq!(unquote("'single'"), "single");
        assert_eq!(unquote("\"\""), "");
        assert_eq!(unquote("\""), "\"");
        assert_eq!(unquote("'"), "'");
        assert_eq!(unquote("\"mismatched'"), "\"mismatched'");
        assert_eq!(unquote("plain"), "plain");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll.interval, Duration::from_secs(5));
        assert!(!config.poll.dev_mode);
        assert_eq!(config.source.exporter_host, "http://0.0.0.0");
        assert_eq!(config.source.exporter_port, 1006);
        assert!(config.poll.read_timeout < config.poll.interval);
    }

    #[test]
    fn test_source_kind_parses() {
        assert_eq!("simulated".parse::<SourceKind>(), Ok(SourceKind::Simulated));
        assert_eq!("exporter".parse::<SourceKind>(), Ok(SourceKind::Exporter));
        assert!("i2c".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_env_flag() {
        assert!(env_flag("true"));
        assert!(env_flag(" YES "));
        assert!(!env_flag("0"));
        assert!(!env_flag("off"));
    }
}
