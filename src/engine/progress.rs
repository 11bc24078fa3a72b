//! Progress counter for the orchestrator's running dispatch total.

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

use crate::pipeline::observer::{LogObserver, RunObserver};
use crate::pipeline::stage::StageStats;
use crate::types::{FailureRecord, Shard};

// Progress bar type alias
pub type ProgressBar = Arc<Mutex<Bar>>;

/// Create a counter for unknown total (shows count without percentage)
pub fn create_counter(desc: &'static str) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = 0,
        desc = desc,
        animation = Animation::Classic,
        position = 0,
        unit = " keys"
    )))
}

/// Move the counter to `n`. Uses try_lock so a contended bar never blocks the aggregator;
/// the next update catches up.
pub fn set_counter(pb: &ProgressBar, n: usize) {
    if let Ok(mut bar) = pb.try_lock() {
        let _ = bar.update_to(n);
    }
}

/// Force a refresh of the bar (e.g. so counter shows "0 keys" immediately).
pub fn refresh_bar(pb: &ProgressBar) {
    if let Ok(mut bar) = pb.try_lock() {
        let _ = bar.refresh();
    }
}

/// Observer that drives a counter for the running total and logs everything else.
pub struct ProgressObserver {
    bar: ProgressBar,
    log: LogObserver,
}

impl ProgressObserver {
    pub fn new(desc: &'static str) -> Self {
        let bar = create_counter(desc);
        refresh_bar(&bar);
        ProgressObserver {
            bar,
            log: LogObserver,
        }
    }

    /// Final position once the total is known (the aggregator only reports every N items).
    pub fn finish(&self, total: u64) {
        set_counter(&self.bar, total as usize);
        refresh_bar(&self.bar);
        eprintln!();
    }
}

impl RunObserver for ProgressObserver {
    fn progress(&self, count: u64) {
        set_counter(&self.bar, count as usize);
    }

    fn shard_failed(&self, shard: &Shard, err: &anyhow::Error) {
        self.log.shard_failed(shard, err);
    }

    fn item_failed(&self, record: &FailureRecord, failures: usize) {
        self.log.item_failed(record, failures);
    }

    fn stage_finished(&self, stats: &StageStats) {
        self.log.stage_finished(stats);
    }
}
