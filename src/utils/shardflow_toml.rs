//! Load `.shardflow.toml` from a directory (CLI only). The library takes everything through `Opts`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::Opts;
use crate::engine::imaging::{ExtendMode, Interpolation};
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub struct ShardflowToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    data_bucket: Option<String>,
    output_bucket: Option<String>,
    split: Option<String>,
    queue: Option<String>,
    shard_width: Option<usize>,
    page_size: Option<usize>,
    workers: Option<usize>,
    colors: Option<usize>,
    iterations: Option<usize>,
    progress_every: Option<u64>,
    verbose: Option<bool>,
    #[serde(default)]
    resize: ResizeSection,
}

#[derive(Debug, Default, Deserialize)]
struct ResizeSection {
    width: Option<u32>,
    height: Option<u32>,
    crop: Option<bool>,
    extend: Option<ExtendMode>,
    interpolation: Option<Interpolation>,
    quality: Option<u8>,
}

/// Parse settings text. Unknown keys are ignored.
pub fn parse_shardflow_toml(s: &str) -> Result<ShardflowToml, toml::de::Error> {
    toml::from_str(s)
}

/// Load `.shardflow.toml` from `dir`. `Ok(None)` when there is no such file; an unreadable or
/// malformed file is an error naming the path.
pub fn load_shardflow_toml(dir: &Path) -> Result<Option<ShardflowToml>> {
    let path = dir.join(PackagePaths::get().config_filename());
    if !path.is_file() {
        return Ok(None);
    }
    let s = std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let file = parse_shardflow_toml(&s).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(file))
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $sec_field:ident => $($opts_field:ident).+) => {
        if let Some(v) = $sec.$sec_field.clone() {
            $opts.$($opts_field).+ = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before env and CLI.
/// dry_run is never in the file.
pub fn apply_file_to_opts(file: &ShardflowToml, opts: &mut Opts) {
    let s = &file.settings;
    if let Some(ref p) = s.data_bucket {
        opts.data_bucket = Some(PathBuf::from(p));
    }
    if let Some(ref p) = s.output_bucket {
        opts.output_bucket = Some(PathBuf::from(p));
    }
    if let Some(ref p) = s.queue {
        opts.queue = Some(PathBuf::from(p));
    }
    apply_file_opt!(s, opts, split => split);
    apply_file_opt!(s, opts, shard_width => shard_width);
    apply_file_opt!(s, opts, page_size => page_size);
    apply_file_opt!(s, opts, workers => num_workers);
    apply_file_opt!(s, opts, colors => num_colors);
    apply_file_opt!(s, opts, iterations => max_iterations);
    apply_file_opt!(s, opts, progress_every => progress_every);
    apply_file_opt!(s, opts, verbose => verbose);

    let r = &s.resize;
    apply_file_opt!(r, opts, width => resize.width);
    apply_file_opt!(r, opts, height => resize.height);
    apply_file_opt!(r, opts, crop => resize.crop);
    apply_file_opt!(r, opts, extend => resize.extend);
    apply_file_opt!(r, opts, interpolation => resize.interpolation);
    apply_file_opt!(r, opts, quality => resize.quality);
}
