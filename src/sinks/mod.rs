//! Presentation sinks and the dispatcher that fans a cycle out to them.
//!
//! Every sink receives the same immutable snapshot and derived values. A
//! failing or slow sink is logged and skipped for that cycle; the others are
//! still called and the next cycle is unaffected.

pub mod accessory;
pub mod console;
pub mod influx;
pub mod metrics;

pub use accessory::{AccessorySink, AccessoryState};
pub use console::ConsoleSink;
pub use influx::InfluxSink;
pub use metrics::MetricsSink;

use crate::derived::DerivedValues;
use crate::error::SinkError;
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;

/// A destination for each cycle's readings.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Publish one cycle. Must not retain references to its arguments.
    async fn publish(&self, snapshot: &Snapshot, derived: &DerivedValues) -> Result<(), SinkError>;
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fixed list of sinks, called in registration order.
pub struct SinkDispatcher {
    sinks: Vec<Box<dyn Sink>>,
    publish_timeout: Duration,
}

impl SinkDispatcher {
    pub fn new(sinks: Vec<Box<dyn Sink>>, publish_timeout: Duration) -> Self {
        Self {
            sinks,
            publish_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Publish to every sink. Failures are logged and reported, never raised.
    pub async fn dispatch(&self, snapshot: &Snapshot, derived: &DerivedValues) -> DispatchReport {
        let mut report = DispatchReport::default();

        for sink in &self.sinks {
            let result =
                match tokio::time::timeout(self.publish_timeout, sink.publish(snapshot, derived))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(SinkError::Timeout(self.publish_timeout)),
                };

            match result {
                Ok(()) => {
                    debug!("[Sink] {} published", sink.name());
                    report.delivered.push(sink.name().to_string());
                }
                Err(e) => {
                    warn!("[Sink] {} failed, skipping this cycle: {}", sink.name(), e);
                    report.failed.push(sink.name().to_string());
                }
            }
        }

        report
    }
}
