//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived file names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    spool_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
                spool_filename: format!("{pkg}.queue.jsonl"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Optional settings file looked up in the working directory.
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Default queue spool when no queue target is configured.
    pub fn spool_filename(&self) -> &str {
        &self.spool_filename
    }
}

// ---- Worker threads ----

/// Pool sizing for the processor stages.
/// Use [`WorkerThreadLimits::current()`] to fill `all_threads` from rayon.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Floor for the default pool size.
    pub floor: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            floor: Self::FLOOR_THREADS,
        }
    }
}

impl WorkerThreadLimits {
    pub const FLOOR_THREADS: usize = 2;
    /// Ceiling for the fetch stage, which otherwise runs one worker per batch record.
    pub const MAX_FETCH_WORKERS: usize = 64;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }

    /// Stages are I/O bound, so never go below the floor even on a single core.
    pub fn default_pool_size(&self) -> usize {
        self.all_threads.max(self.floor)
    }
}

// ---- Streams ----

/// Capacity of every stage-to-stage, page and count stream. Zero makes each send a rendezvous
/// with a receiver, which is the only backpressure in the system.
pub const STAGE_CHANNEL_CAP: usize = 0;

// ---- Enumeration ----

/// Shard generation and listing.
pub struct ShardConsts;

impl ShardConsts {
    /// Alphabet of a shard suffix, in lexicographic order.
    pub const HEX_CHARSET: &'static [u8; 16] = b"0123456789abcdef";
    /// Two hex characters: 256 shards, matching the two-character object key levels.
    pub const DEFAULT_WIDTH: usize = 2;
    /// One thread per shard, so cap at 4096.
    pub const MAX_WIDTH: usize = 3;
    /// Keys per listing page (object-store default).
    pub const DEFAULT_PAGE_SIZE: usize = 1000;
    /// Running count is reported every this many dispatched keys.
    pub const PROGRESS_EVERY: u64 = 10_000;
}

// ---- Output naming ----

/// Output key convention.
pub struct KeyConsts;

impl KeyConsts {
    /// Characters of the second path segment lifted into their own level.
    pub const SHARD_LEVEL_CHARS: usize = 2;
    /// Suffix stripped from source keys before building metadata keys.
    pub const SOURCE_SUFFIX: &'static str = ".jpg";
    /// Extension of the metadata document.
    pub const METADATA_EXT: &'static str = ".json";
}

// ---- Image processing ----

/// Resize defaults for the transform stage.
pub struct ResizeDefaults;

impl ResizeDefaults {
    pub const WIDTH: u32 = 256;
    pub const HEIGHT: u32 = 256;
    pub const QUALITY: u8 = 70;
}

/// Palette defaults for the analyze stage.
pub struct PaletteDefaults;

impl PaletteDefaults {
    pub const NUM_COLORS: usize = 5;
    pub const MAX_ITERATIONS: usize = 100;
}
