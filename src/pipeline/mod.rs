//! Concurrent engine: worker-pool stages, composition, aggregators, sharded enumeration and the
//! two run paths built from them.

pub mod compose;
pub mod count;
pub mod dispatch;
pub mod errors;
pub mod observer;
pub mod orchestrator;
pub mod processor;
pub mod shard;
pub mod stage;

pub use compose::{ComposedPipeline, PipelineBuilder, StageFn, compose};
pub use count::{CountHandle, spawn_count_aggregator};
pub use dispatch::{DispatchBarrier, DispatchStats, spawn_dispatch_workers};
pub use errors::{ErrorAggregator, collect_failures, spawn_error_aggregator};
pub use observer::{LogObserver, RunObserver};
pub use orchestrator::run_orchestrator;
pub use processor::{ProcessorContext, build_image_pipeline, fetch_pool_size, run_processor};
pub use shard::{
    EnumerationHandle, EnumerationStats, ShardOutcome, list_shard, make_shards, spawn_enumerators,
};
pub use stage::{Identified, StageBarrier, StageHandle, StageStats, Tracked, spawn_stage};
