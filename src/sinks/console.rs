//! Log sink: one summary line per cycle, full detail at debug level.

use super::Sink;
use crate::derived::DerivedValues;
use crate::error::SinkError;
use crate::snapshot::{ReadingName, Snapshot};
use async_trait::async_trait;
use log::{debug, info, log_enabled};
use serde_json::json;

#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }

    pub fn summary(snapshot: &Snapshot, derived: &DerivedValues) -> String {
        format!(
            "Temperature: {:.2}°C, Humidity: {:.1}%, Pressure: {:.1} hPa, Air quality: {}, Motion: {}",
            snapshot.get(ReadingName::Temperature),
            snapshot.get(ReadingName::Humidity),
            snapshot.get(ReadingName::Pressure),
            derived.air_quality.value(),
            derived.motion_detected,
        )
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn publish(&self, snapshot: &Snapshot, derived: &DerivedValues) -> Result<(), SinkError> {
        info!("{}", Self::summary(snapshot, derived));

        if log_enabled!(log::Level::Debug) {
            let detail = json!({ "readings": snapshot, "derived": derived });
            debug!("{}", serde_json::to_string(&detail).map_err(|e| SinkError::Other(e.to_string()))?);
        }
        Ok(())
    }
}
