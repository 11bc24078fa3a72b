//! Environment configuration: `.env` in the working directory → process environment → `Opts`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::Opts;

pub struct EnvKeys;

impl EnvKeys {
    pub const DATA_BUCKET: &'static str = "DATA_BUCKET";
    pub const OUTPUT_BUCKET: &'static str = "OUTPUT_BUCKET";
    pub const SPLIT: &'static str = "SPLIT";
    pub const QUEUE: &'static str = "SQS_URL";
    pub const NUM_WORKERS: &'static str = "NUM_WORKERS";
    pub const NUM_COLORS: &'static str = "NUM_COLORS";
    pub const MAX_ITERATIONS: &'static str = "MAX_ITERATIONS";
    pub const SHARD_WIDTH: &'static str = "SHARD_WIDTH";
    pub const PAGE_SIZE: &'static str = "PAGE_SIZE";
}

/// Load `.env` from `dir` if present. Variables already set in the process win.
pub fn load_dotenv(dir: &Path) -> Result<()> {
    let env_path = dir.join(".env");
    if env_path.is_file() {
        dotenvy::from_path(&env_path).with_context(|| format!("load {}", env_path.display()))?;
    }
    Ok(())
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{name}={raw:?} is not a valid value")),
        None => Ok(None),
    }
}

/// Apply variables found by `lookup` on top of `opts`. Empty values count as unset.
pub fn apply_env_with(opts: &mut Opts, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = lookup(EnvKeys::DATA_BUCKET) {
        opts.data_bucket = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup(EnvKeys::OUTPUT_BUCKET) {
        opts.output_bucket = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup(EnvKeys::SPLIT) {
        opts.split = v;
    }
    if let Some(v) = lookup(EnvKeys::QUEUE) {
        opts.queue = Some(PathBuf::from(v));
    }
    if let Some(n) = parse_var(&lookup, EnvKeys::NUM_WORKERS)? {
        opts.num_workers = n;
    }
    if let Some(n) = parse_var(&lookup, EnvKeys::NUM_COLORS)? {
        opts.num_colors = n;
    }
    if let Some(n) = parse_var(&lookup, EnvKeys::MAX_ITERATIONS)? {
        opts.max_iterations = n;
    }
    if let Some(n) = parse_var(&lookup, EnvKeys::SHARD_WIDTH)? {
        opts.shard_width = n;
    }
    if let Some(n) = parse_var(&lookup, EnvKeys::PAGE_SIZE)? {
        opts.page_size = n;
    }
    Ok(())
}

/// Apply the process environment on top of `opts`.
pub fn apply_env_to_opts(opts: &mut Opts) -> Result<()> {
    apply_env_with(opts, |name| std::env::var(name).ok())
}
