//! Prometheus metrics sink and its scrape endpoint.
//!
//! The sink owns its registry, so several independent instances can coexist
//! (in tests, for example). The HTTP endpoint runs as its own task and only
//! reads the registry; a scrape never waits on the poll cycle.

use super::Sink;
use crate::derived::DerivedValues;
use crate::error::{BridgeError, Result, SinkError};
use crate::snapshot::{ReadingName, Snapshot};
use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use log::info;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const OXIDISING_BUCKETS: &[f64] = &[
    0.0, 10000.0, 15000.0, 20000.0, 25000.0, 30000.0, 35000.0, 40000.0, 45000.0, 50000.0, 55000.0,
    60000.0, 65000.0, 70000.0, 75000.0, 80000.0, 85000.0, 90000.0, 100000.0,
];
const REDUCING_BUCKETS: &[f64] = &[
    0.0, 100000.0, 200000.0, 300000.0, 400000.0, 500000.0, 600000.0, 700000.0, 800000.0,
    900000.0, 1000000.0, 1100000.0, 1200000.0, 1300000.0, 1400000.0, 1500000.0,
];
const NH3_BUCKETS: &[f64] = &[
    0.0, 10000.0, 110000.0, 210000.0, 310000.0, 410000.0, 510000.0, 610000.0, 710000.0, 810000.0,
    910000.0, 1010000.0, 1110000.0, 1210000.0, 1310000.0, 1410000.0, 1510000.0, 1610000.0,
    1710000.0, 1810000.0, 1910000.0, 2000000.0,
];
const PARTICULATE_BUCKETS: &[f64] = &[
    0.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 55.0, 60.0, 65.0, 70.0, 75.0,
    80.0, 85.0, 90.0, 95.0, 100.0,
];

const INDEX_PAGE: &str = r#"<!doctype html>
<title>Enviro+ Prometheus Exporter</title>
<h1>Enviro+ Prometheus Exporter</h1>
<a href="/metrics">Metrics</a>
"#;

type FloatGauge = Gauge<f64, AtomicU64>;

fn gauge_help(name: ReadingName) -> &'static str {
    match name {
        ReadingName::Temperature => "Temperature measured (*C)",
        ReadingName::Humidity => "Relative humidity measured (%)",
        ReadingName::Pressure => "Pressure measured (hPa)",
        ReadingName::Oxidising => {
            "Mostly nitrogen dioxide but could include NO and Hydrogen (Ohms)"
        }
        ReadingName::Reducing => {
            "Mostly carbon monoxide but could include H2S, Ammonia, Ethanol, Hydrogen, Methane, Propane, Iso-butane (Ohms)"
        }
        ReadingName::Nh3 => {
            "Mostly Ammonia but could also include Hydrogen, Ethanol, Propane, Iso-butane (Ohms)"
        }
        ReadingName::Lux => "Current ambient light level (lux)",
        ReadingName::Proximity => {
            "Proximity, with larger numbers being closer proximity and vice versa"
        }
        ReadingName::Pm1 => "Particulate Matter of diameter less than 1 micron (ug/m3)",
        ReadingName::Pm25 => "Particulate Matter of diameter less than 2.5 microns (ug/m3)",
        ReadingName::Pm10 => "Particulate Matter of diameter less than 10 microns (ug/m3)",
    }
}

struct Histograms {
    oxidising: Histogram,
    reducing: Histogram,
    nh3: Histogram,
    pm1: Histogram,
    pm25: Histogram,
    pm10: Histogram,
}

/// Gauges for every reading plus histograms for gas and particulates.
pub struct MetricsSink {
    registry: Arc<Registry>,
    gauges: Vec<(ReadingName, FloatGauge)>,
    histograms: Histograms,
}

impl MetricsSink {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let gauges: Vec<(ReadingName, FloatGauge)> = ReadingName::ALL
            .into_iter()
            .map(|name| {
                let gauge = FloatGauge::default();
                registry.register(name.as_str(), gauge_help(name), gauge.clone());
                (name, gauge)
            })
            .collect();

        let mut histogram = |name: &str, help: &str, buckets: &[f64]| {
            let histogram = Histogram::new(buckets.iter().copied());
            registry.register(name, help, histogram.clone());
            histogram
        };
        let histograms = Histograms {
            oxidising: histogram(
                "oxidising_measurements",
                "Histogram of oxidising measurements",
                OXIDISING_BUCKETS,
            ),
            reducing: histogram(
                "reducing_measurements",
                "Histogram of reducing measurements",
                REDUCING_BUCKETS,
            ),
            nh3: histogram("nh3_measurements", "Histogram of nh3 measurements", NH3_BUCKETS),
            pm1: histogram(
                "pm1_measurements",
                "Histogram of Particulate Matter of diameter less than 1 micron measurements",
                PARTICULATE_BUCKETS,
            ),
            pm25: histogram(
                "pm25_measurements",
                "Histogram of Particulate Matter of diameter less than 2.5 micron measurements",
                PARTICULATE_BUCKETS,
            ),
            pm10: histogram(
                "pm10_measurements",
                "Histogram of Particulate Matter of diameter less than 10 micron measurements",
                PARTICULATE_BUCKETS,
            ),
        };

        Self {
            registry: Arc::new(registry),
            gauges,
            histograms,
        }
    }

    /// Registry to hand to [`serve_metrics`].
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn render(&self) -> std::result::Result<String, SinkError> {
        render(&self.registry)
    }
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

fn render(registry: &Registry) -> std::result::Result<String, SinkError> {
    let mut body = String::new();
    encode(&mut body, registry)?;
    Ok(body)
}

#[async_trait]
impl Sink for MetricsSink {
    fn name(&self) -> &str {
        "prometheus"
    }

    async fn publish(
        &self,
        snapshot: &Snapshot,
        _derived: &DerivedValues,
    ) -> std::result::Result<(), SinkError> {
        for (name, gauge) in &self.gauges {
            gauge.set(snapshot.get(*name));
        }

        let pm1 = snapshot.get(ReadingName::Pm1);
        let h = &self.histograms;
        h.oxidising.observe(snapshot.get(ReadingName::Oxidising));
        h.reducing.observe(snapshot.get(ReadingName::Reducing));
        h.nh3.observe(snapshot.get(ReadingName::Nh3));
        h.pm1.observe(pm1);
        // Larger size classes include PM1; observe only the coarser fraction.
        h.pm25.observe(snapshot.get(ReadingName::Pm25) - pm1);
        h.pm10.observe(snapshot.get(ReadingName::Pm10) - pm1);
        Ok(())
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> Response {
    match render(&registry) {
        Ok(body) => (
            [(
                header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(registry)
}

/// Bind the scrape endpoint so an unusable address fails at startup.
pub async fn bind_metrics(address: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(address).await?;
    info!("[Metrics] Prometheus exporter listening on {}", address);
    Ok(listener)
}

/// Serve `GET /metrics` and an index page until `cancel` fires.
pub async fn serve_metrics(
    listener: TcpListener,
    registry: Arc<Registry>,
    cancel: CancellationToken,
) -> Result<()> {
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| BridgeError::MetricsServer(e.to_string()))?;

    info!("[Metrics] Prometheus exporter stopped");
    Ok(())
}
