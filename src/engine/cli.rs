//! CLI command handlers: layer the configuration, run a command, print its result.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::sync::Arc;

use crate::engine::arg_parser::{Cli, Commands, CommonArgs, OrchestrateArgs, ProcessArgs};
use crate::engine::progress::ProgressObserver;
use crate::engine::queue::load_batch;
use crate::utils::{
    apply_env_to_opts, apply_file_to_opts, load_dotenv, load_shardflow_toml, setup_logging,
};
use crate::{LogObserver, Opts, orchestrate, process_batch};

/// Overwrite opts field from a CLI flag when given.
macro_rules! apply_cli_opt {
    ($args:expr, $opts:expr, $arg_field:ident => $($opts_field:ident).+) => {
        if let Some(v) = $args.$arg_field.clone() {
            $opts.$($opts_field).+ = v;
        }
    };
}

/// Layered options plus the config files that were skipped. Logging is not set up while the
/// layers are read, so the caller reports `skipped` once it is.
pub struct LayeredOpts {
    pub opts: Opts,
    pub skipped: Vec<anyhow::Error>,
}

/// Defaults → `.shardflow.toml` → `.env` / environment → common flags.
///
/// A broken settings or `.env` file is skipped, not fatal. A bad environment value is fatal.
pub fn layer_opts(common: &CommonArgs) -> Result<LayeredOpts> {
    let mut opts = Opts::default();
    let mut skipped = Vec::new();
    match load_shardflow_toml(&common.config_dir) {
        Ok(Some(file)) => apply_file_to_opts(&file, &mut opts),
        Ok(None) => {}
        Err(e) => skipped.push(e),
    }
    if let Err(e) = load_dotenv(&common.config_dir) {
        skipped.push(e);
    }
    apply_env_to_opts(&mut opts)?;
    if let Some(v) = common.verbose {
        opts.verbose = v;
    }
    Ok(LayeredOpts { opts, skipped })
}

fn orchestrate_opts(mut opts: Opts, args: &OrchestrateArgs) -> Opts {
    if let Some(ref p) = args.data_bucket {
        opts.data_bucket = Some(p.clone());
    }
    if let Some(ref p) = args.queue {
        opts.queue = Some(p.clone());
    }
    apply_cli_opt!(args, opts, split => split);
    apply_cli_opt!(args, opts, shard_width => shard_width);
    apply_cli_opt!(args, opts, page_size => page_size);
    opts.dry_run = args.dry_run;
    opts
}

fn process_opts(mut opts: Opts, args: &ProcessArgs) -> Opts {
    if let Some(ref p) = args.data_bucket {
        opts.data_bucket = Some(p.clone());
    }
    if let Some(ref p) = args.output_bucket {
        opts.output_bucket = Some(p.clone());
    }
    apply_cli_opt!(args, opts, workers => num_workers);
    apply_cli_opt!(args, opts, colors => num_colors);
    apply_cli_opt!(args, opts, iterations => max_iterations);
    apply_cli_opt!(args, opts, width => resize.width);
    apply_cli_opt!(args, opts, height => resize.height);
    apply_cli_opt!(args, opts, quality => resize.quality);
    apply_cli_opt!(args, opts, crop => resize.crop);
    apply_cli_opt!(args, opts, extend => resize.extend);
    apply_cli_opt!(args, opts, interpolation => resize.interpolation);
    opts
}

fn handle_orchestrate(opts: Opts) -> Result<()> {
    if opts.dry_run {
        warn!("RUNNING IN DRY-RUN MODE. NO MESSAGES WILL BE PUBLISHED.");
    }
    let observer = Arc::new(ProgressObserver::new("Dispatched"));
    let summary = orchestrate(&opts, observer.clone())?;
    observer.finish(summary.dispatched);

    for shard in &summary.failed_shards {
        warn!("shard {shard} was only partially listed");
    }
    if !summary.failures.is_empty() {
        warn!(
            "{} of {} keys could not be published",
            summary.failures.len(),
            summary.items_seen
        );
    }
    debug!(
        "{} shards, {} pages, {} keys seen",
        summary.shards, summary.pages, summary.items_seen
    );
    println!("Success");
    println!("Total objects processed: {}", summary.dispatched);
    Ok(())
}

fn handle_process(opts: Opts, args: &ProcessArgs) -> Result<()> {
    let records = load_batch(&args.batch)?;
    let summary = process_batch(records, &opts, Arc::new(LogObserver))?;
    let json = serde_json::to_string_pretty(&summary.report)?;
    match args.report {
        Some(ref path) => std::fs::write(path, format!("{json}\n"))
            .with_context(|| format!("write report {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

/// Run the parsed command.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let LayeredOpts { opts, skipped } = layer_opts(&cli.common)?;
    setup_logging(opts.verbose);
    for e in &skipped {
        warn!("skipped config: {e:#}");
    }
    match cli.command {
        Commands::Orchestrate(ref args) => handle_orchestrate(orchestrate_opts(opts, args)),
        Commands::Process(ref args) => handle_process(process_opts(opts, args), args),
    }
}
