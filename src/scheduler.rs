//! Drives the collect → derive → dispatch cycle on a fixed interval.
//!
//! Cycles never overlap: the sleep starts only once dispatch has finished, so
//! a slow cycle delays the next one instead of queueing work. Cancellation is
//! observed at the sleep boundary only; an in-flight cycle always completes.

use crate::aggregator::{ReadFailure, ReadingAggregator};
use crate::derived::DerivedValues;
use crate::sinks::{DispatchReport, SinkDispatcher};
use crate::snapshot::Snapshot;
use log::{debug, info};
use parking_lot::RwLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

/// Everything one cycle produced.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub snapshot: Snapshot,
    pub derived: DerivedValues,
    pub failures: Vec<ReadFailure>,
    pub report: DispatchReport,
}

pub struct Scheduler {
    aggregator: ReadingAggregator,
    dispatcher: SinkDispatcher,
    interval: Duration,
    previous: RwLock<Snapshot>,
    state: RwLock<SchedulerState>,
}

impl Scheduler {
    pub fn new(aggregator: ReadingAggregator, dispatcher: SinkDispatcher, interval: Duration) -> Self {
        Self {
            aggregator,
            dispatcher,
            interval,
            previous: RwLock::new(Snapshot::initial()),
            state: RwLock::new(SchedulerState::Stopped),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.read()
    }

    /// Snapshot produced by the most recent cycle.
    pub fn latest(&self) -> Snapshot {
        self.previous.read().clone()
    }

    /// Run exactly one collect → derive → dispatch cycle.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let previous = self.latest();
        let collection = self.aggregator.collect(&previous).await;
        let derived = DerivedValues::from_snapshot(&collection.snapshot);
        *self.previous.write() = collection.snapshot.clone();

        let report = self.dispatcher.dispatch(&collection.snapshot, &derived).await;
        debug!(
            "Cycle done: {} read failures, {} sinks delivered, {} failed",
            collection.failures.len(),
            report.delivered.len(),
            report.failed.len()
        );

        CycleOutcome {
            snapshot: collection.snapshot,
            derived,
            failures: collection.failures,
            report,
        }
    }

    /// Repeat cycles until `cancel` fires, then return in the stopped state.
    pub async fn run(&self, cancel: CancellationToken) {
        *self.state.write() = SchedulerState::Running;
        info!(
            "Scheduler running: every {:?}, {} sinks, dev mode {}",
            self.interval,
            self.dispatcher.len(),
            self.aggregator.dev_mode()
        );

        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        *self.state.write() = SchedulerState::Stopped;
        info!("Scheduler stopped");
    }
}
