//! Command-line interface module.
//!
//! This module handles:
//! - Argument parsing via clap
//! - Replaying a capture file through the pipeline
//! - Call list output (table, CSV)

mod args;
mod output;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use sipscope_core::pcap::PcapReader;
use sipscope_core::pipeline::{Pipeline, PipelineStats};
use sipscope_core::storage::{CallRef, Storage};

pub use args::{parse_filter, Args, RetransArg};
pub use output::{OutputFormat, OutputFormatter};

/// Replay the capture named by `args` and write its call list.
pub fn run<W: Write>(args: &Args, writer: &mut W) -> Result<PipelineStats> {
    let storage = Storage::new(args.storage_config()).context("Invalid --match expression")?;
    let storage = Arc::new(storage);
    let query = args.query().context("Invalid --filter expression")?;

    let mut reader = PcapReader::open(&args.file)
        .with_context(|| format!("Failed to open capture file: {}", args.file.display()))?;
    debug!(
        compression = %reader.compression(),
        format = ?reader.format(),
        "capture opened"
    );

    let mut pipeline = Pipeline::new(args.dissector_config(), Arc::clone(&storage));
    let stats = pipeline
        .run(&mut reader)
        .with_context(|| format!("Failed to read capture file: {}", args.file.display()))?;

    let calls: Vec<CallRef> = match &args.related {
        Some(call_id) => {
            let call = storage
                .find(call_id)
                .with_context(|| format!("No call with Call-ID {call_id}"))?;
            let index = call.read().index();
            std::iter::once(call).chain(storage.related(index)).collect()
        }
        None => storage.query(&query),
    };

    let formatter = OutputFormatter::new(args.format, args.columns.clone(), args.display_settings());
    formatter
        .write(&calls, writer)
        .context("Failed to write call list")?;

    Ok(stats)
}
