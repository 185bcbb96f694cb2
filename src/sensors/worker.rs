//! Background polling of blocking sensor drivers.
//!
//! Each [`SensorWorker`] owns one driver and runs it in its own task, storing
//! the latest result in a shared cache. The paired [`CachedSource`] only
//! reads that cache, so the aggregation cycle never waits on a driver.

use super::{Sample, SensorDriver, SensorSource};
use crate::error::SensorError;
use crate::snapshot::ReadingName;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct CachedSample {
    result: Result<Sample, SensorError>,
    at: Instant,
}

/// Latest driver result plus a version counter bumped on every store.
#[derive(Default)]
struct SampleCache {
    latest: RwLock<Option<CachedSample>>,
    version: AtomicU32,
}

impl SampleCache {
    fn store(&self, result: Result<Sample, SensorError>) {
        *self.latest.write() = Some(CachedSample {
            result,
            at: Instant::now(),
        });
        self.version.fetch_add(1, Ordering::SeqCst);
    }
}

/// Read accessor over a worker's cache.
#[derive(Clone)]
pub struct CachedSource {
    name: String,
    provides: &'static [ReadingName],
    cache: Arc<SampleCache>,
    max_age: Duration,
}

impl CachedSource {
    /// Number of results the worker has stored so far.
    pub fn version(&self) -> u32 {
        self.cache.version.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SensorSource for CachedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn provides(&self) -> &[ReadingName] {
        self.provides
    }

    async fn read(&self) -> Result<Sample, SensorError> {
        let latest = self.cache.latest.read();
        let Some(cached) = latest.as_ref() else {
            return Err(SensorError::NoSample);
        };

        let age = cached.at.elapsed();
        if age > self.max_age {
            return Err(SensorError::Stale(age));
        }
        cached.result.clone()
    }
}

/// Spawns the polling task for one driver.
pub struct SensorWorker;

impl SensorWorker {
    /// Start polling `driver` every `period` until `cancel` fires.
    ///
    /// Samples older than `max_age` are reported as stale by the returned
    /// source. The driver runs on the blocking pool.
    pub fn spawn<D: SensorDriver>(
        driver: D,
        period: Duration,
        max_age: Duration,
        cancel: CancellationToken,
    ) -> (CachedSource, JoinHandle<()>) {
        let cache = Arc::new(SampleCache::default());
        let source = CachedSource {
            name: driver.name().to_string(),
            provides: driver.provides(),
            cache: cache.clone(),
            max_age,
        };

        let name = source.name.clone();
        let handle = tokio::spawn(async move {
            info!("[Sensors] {} worker started ({:?} period)", name, period);
            let mut driver = driver;
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let polled = tokio::task::spawn_blocking(move || {
                    let result = driver.sample();
                    (driver, result)
                })
                .await;

                match polled {
                    Ok((returned, result)) => {
                        driver = returned;
                        match &result {
                            Ok(_) => debug!("[Sensors] {} sampled", name),
                            Err(e) => warn!("[Sensors] {} sample failed: {}", name, e),
                        }
                        cache.store(result);
                    }
                    Err(e) => {
                        error!("[Sensors] {} driver panicked: {}", name, e);
                        break;
                    }
                }
            }
            info!("[Sensors] {} worker stopped", name);
        });

        (source, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingDriver {
        calls: u32,
        fail_after: Option<u32>,
    }

    impl SensorDriver for CountingDriver {
        fn name(&self) -> &str {
            "counting"
        }

        fn provides(&self) -> &'static [ReadingName] {
            &[ReadingName::Lux]
        }

        fn sample(&mut self) -> Result<Sample, SensorError> {
            self.calls += 1;
            match self.fail_after {
                Some(limit) if self.calls > limit => {
                    Err(SensorError::ReadFailed("bus error".into()))
                }
                _ => Ok(Sample::new().with(ReadingName::Lux, self.calls as f64)),
            }
        }
    }

    async fn wait_for_version(source: &CachedSource, version: u32) {
        for _ in 0..200 {
            if source.version() >= version {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("worker never reached version {version}");
    }

    #[tokio::test]
    async fn test_no_sample_before_first_poll() {
        let cache = Arc::new(SampleCache::default());
        let source = CachedSource {
            name: "empty".into(),
            provides: &[ReadingName::Lux],
            cache,
            max_age: Duration::from_secs(1),
        };
        assert_eq!(source.read().await, Err(SensorError::NoSample));
    }

    #[tokio::test]
    async fn test_worker_fills_cache() {
        let cancel = CancellationToken::new();
        let driver = CountingDriver {
            calls: 0,
            fail_after: None,
        };
        let (source, handle) = SensorWorker::spawn(
            driver,
            Duration::from_millis(10),
            Duration::from_secs(5),
            cancel.clone(),
        );

        wait_for_version(&source, 2).await;
        let sample = source.read().await.unwrap();
        assert!(sample.get(ReadingName::Lux).unwrap().value >= 1.0);
        assert_eq!(source.provides(), &[ReadingName::Lux]);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_driver_error_is_cached() {
        let cancel = CancellationToken::new();
        let driver = CountingDriver {
            calls: 0,
            fail_after: Some(0),
        };
        let (source, handle) = SensorWorker::spawn(
            driver,
            Duration::from_millis(10),
            Duration::from_secs(5),
            cancel.clone(),
        );

        wait_for_version(&source, 1).await;
        assert!(matches!(
            source.read().await,
            Err(SensorError::ReadFailed(_))
        ));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_sample_is_rejected() {
        let cache = Arc::new(SampleCache::default());
        cache.store(Ok(Sample::new().with(ReadingName::Lux, 1.0)));
        let source = CachedSource {
            name: "stale".into(),
            provides: &[ReadingName::Lux],
            cache,
            max_age: Duration::from_millis(1),
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(source.read().await, Err(SensorError::Stale(_))));
    }
}
