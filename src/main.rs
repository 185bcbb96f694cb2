use clap::Parser;
use enviroplus_bridge::config::{Config, SourceKind, load_dotenv, parse_duration};
use enviroplus_bridge::error::{BridgeError, ConfigError, Result};
use enviroplus_bridge::scheduler::Scheduler;
use enviroplus_bridge::sensors::simulation::spawn_simulated_sources;
use enviroplus_bridge::sensors::{ExporterSource, SensorSource};
use enviroplus_bridge::sinks::accessory::{AccessoryInfo, AccessorySink, AccessoryState, Characteristic};
use enviroplus_bridge::sinks::metrics::{bind_metrics, serve_metrics};
use enviroplus_bridge::sinks::{ConsoleSink, InfluxSink, MetricsSink, Sink, SinkDispatcher};
use enviroplus_bridge::ReadingAggregator;
use log::{debug, error, info};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "enviroplus-bridge")]
#[command(about = "Publish Enviro+ sensor readings to HomeKit-style accessories, Prometheus and InfluxDB")]
struct Cli {
    /// Enviro+ exporter host, including scheme
    #[arg(long)]
    host: Option<String>,

    /// Enviro+ exporter port
    #[arg(long)]
    port: Option<u16>,

    /// Time between sensor readings (e.g. 5s, 500ms, 1m)
    #[arg(long, value_parser = parse_duration)]
    sleep: Option<Duration>,

    /// Development mode: report a random temperature between 15 and 30°C
    #[arg(long)]
    dev: bool,

    /// Sensor source: exporter or simulated
    #[arg(long)]
    source: Option<SourceKind>,

    /// Serve Prometheus metrics
    #[arg(long)]
    metrics: bool,

    /// Address for the Prometheus endpoint
    #[arg(long)]
    metrics_address: Option<String>,

    /// Write readings to InfluxDB (requires INFLUXDB_URL, INFLUXDB_TOKEN, INFLUXDB_ORG_ID, INFLUXDB_BUCKET)
    #[arg(long)]
    influx: bool,

    /// Measurement name used for InfluxDB points
    #[arg(long)]
    sensor_name: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.source.exporter_host = host;
        }
        if let Some(port) = self.port {
            config.source.exporter_port = port;
        }
        if let Some(sleep) = self.sleep {
            config.poll.interval = sleep;
        }
        if self.dev {
            config.poll.dev_mode = true;
        }
        if let Some(source) = self.source {
            config.source.kind = source;
        }
        if self.metrics {
            config.metrics.enabled = true;
        }
        if let Some(address) = self.metrics_address {
            config.metrics.address = address;
        }
        if self.influx {
            config.influx.enabled = true;
        }
        if let Some(name) = self.sensor_name {
            config.influx.sensor_name = name;
        }
    }
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn build_sources(
    config: &Config,
    cancel: &CancellationToken,
) -> Result<(Vec<Box<dyn SensorSource>>, Vec<JoinHandle<()>>)> {
    match config.source.kind {
        SourceKind::Exporter => {
            let source = ExporterSource::new(&config.source, config.poll.read_timeout)
                .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
            info!("[Sensors] Reading from exporter at {}", source.url());
            let sources: Vec<Box<dyn SensorSource>> = vec![Box::new(source)];
            Ok((sources, Vec::new()))
        }
        SourceKind::Simulated => {
            info!("[Sensors] Using simulated sensor drivers");
            Ok(spawn_simulated_sources(
                config.source.sample_period,
                config.source.max_sample_age,
                cancel,
            ))
        }
    }
}

/// Stand-in for the accessory framework's push loop.
fn watch_accessory(state: Arc<AccessoryState>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let changed = state.changed();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = changed.notified() => {
                    let versions: Vec<String> = state
                        .characteristics()
                        .iter()
                        .map(|c| format!("{}@{}", c.name(), c.version()))
                        .collect();
                    debug!("[Accessory] {} updated: {}", state.info().name, versions.join(", "));
                }
            }
        }
    })
}

async fn run(config: Config) -> Result<()> {
    let cancel = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let (sources, workers) = build_sources(&config, &cancel)?;
    tasks.extend(workers);

    let accessory = Arc::new(AccessoryState::new(AccessoryInfo::from(&config.accessory)));
    tasks.push(watch_accessory(accessory.clone(), cancel.clone()));

    let mut sinks: Vec<Box<dyn Sink>> = vec![
        Box::new(ConsoleSink::new()),
        Box::new(AccessorySink::new(accessory)),
    ];

    let mut metrics_server = None;
    if config.metrics.enabled {
        let listener = bind_metrics(&config.metrics.address).await?;
        let sink = MetricsSink::new();
        let registry = sink.registry();
        let cancel = cancel.clone();
        metrics_server = Some(tokio::spawn(async move {
            let result = serve_metrics(listener, registry, cancel).await;
            if let Err(e) = &result {
                error!("[Metrics] Prometheus exporter failed: {}", e);
            }
            result
        }));
        sinks.push(Box::new(sink));
    }

    if config.influx.enabled {
        let sink = InfluxSink::new(&config.influx, config.poll.publish_timeout)?;
        sinks.push(Box::new(sink));
    }

    let aggregator = ReadingAggregator::new(sources, config.poll.read_timeout)
        .with_dev_mode(config.poll.dev_mode);
    let dispatcher = SinkDispatcher::new(sinks, config.poll.publish_timeout);
    let scheduler = Arc::new(Scheduler::new(aggregator, dispatcher, config.poll.interval));

    if config.poll.dev_mode {
        info!("Development mode on, ignoring sensor and returning random temperatures...");
    }

    let scheduler_task = {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    info!("Enviro+ bridge is running, press Ctrl+C to exit");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
    cancel.cancel();

    if let Err(e) = scheduler_task.await {
        error!("Scheduler task failed: {}", e);
    }
    for task in tasks {
        let _ = task.await;
    }
    if let Some(server) = metrics_server {
        match server.await {
            Ok(result) => result?,
            Err(e) => return Err(BridgeError::MetricsServer(e.to_string())),
        }
    }

    info!("Enviro+ bridge stopped");
    Ok(())
}

fn main() -> ExitCode {
    // Before the runtime exists, so setting variables is single-threaded
    load_dotenv();
    init_logger();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    Cli::parse().apply(&mut config);

    info!("Starting Enviro+ bridge");
    info!("  Source: {}", config.source.kind);
    info!("  Interval: {:?}", config.poll.interval);
    info!("  Metrics: {}", config.metrics.enabled);
    info!("  InfluxDB: {}", config.influx.enabled);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
