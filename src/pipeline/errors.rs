//! Error aggregation: one thread owns the shared error stream and builds the batch failure report.

use anyhow::{Result, anyhow};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::types::{BatchFailureReport, FailureRecord};

use super::observer::RunObserver;

/// Handle to the running aggregator. The report is handed back exactly once, by [`Self::finish`].
pub struct ErrorAggregator {
    handle: JoinHandle<BatchFailureReport>,
}

impl ErrorAggregator {
    /// Wait for the error stream to close and return the finished report.
    /// Only returns once every sender (every stage worker and the composer) is gone.
    pub fn finish(self) -> Result<BatchFailureReport> {
        self.handle
            .join()
            .map_err(|_| anyhow!("error aggregator panicked"))
    }
}

/// Start the aggregator. Must run before any stage can produce a failure: error sends are
/// rendezvous, so an unread error stream would stall the stage that failed.
pub fn spawn_error_aggregator(
    err_rx: Receiver<FailureRecord>,
    observer: Arc<dyn RunObserver>,
) -> ErrorAggregator {
    ErrorAggregator {
        handle: thread::spawn(move || collect_failures(err_rx, observer.as_ref())),
    }
}

/// Drain `err_rx` until it disconnects, tagging each failure with its item identifier.
pub fn collect_failures(
    err_rx: Receiver<FailureRecord>,
    observer: &dyn RunObserver,
) -> BatchFailureReport {
    let mut report = BatchFailureReport::default();
    for record in err_rx.iter() {
        report.push(record.item_id.clone());
        observer.item_failed(&record, report.len());
    }
    report
}
