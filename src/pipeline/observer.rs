//! Run observer: the components report progress and failures through an injected observer instead
//! of printing. The CLI passes a [`LogObserver`] (or a progress-bar observer); tests pass a recorder.

use log::{debug, info, warn};

use crate::types::{FailureRecord, Shard};

use super::stage::StageStats;

pub trait RunObserver: Send + Sync {
    /// Running dispatch total, reported by the count aggregator.
    fn progress(&self, _count: u64) {}

    /// A shard's listing failed; pages already forwarded stand.
    fn shard_failed(&self, _shard: &Shard, _err: &anyhow::Error) {}

    /// One item failed. `failures` is the running failure count including this one.
    fn item_failed(&self, _record: &FailureRecord, _failures: usize) {}

    /// A stage's barrier fired.
    fn stage_finished(&self, _stats: &StageStats) {}
}

/// Observer that forwards everything to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn progress(&self, count: u64) {
        info!("{count} items dispatched");
    }

    fn shard_failed(&self, shard: &Shard, err: &anyhow::Error) {
        warn!("failed to list objects under {shard}: {err:#}");
    }

    fn item_failed(&self, record: &FailureRecord, failures: usize) {
        warn!("error #{failures}: {record}");
    }

    fn stage_finished(&self, stats: &StageStats) {
        debug!(
            "{}: {} ok, {} failed ({} workers)",
            stats.name, stats.succeeded, stats.failed, stats.workers
        );
    }
}
