//! Shardflow CLI: `orchestrate` a bucket into the queue, or `process` one batch.

use anyhow::Result;
use clap::Parser;
use shardflow::engine::arg_parser::Cli;
use shardflow::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
