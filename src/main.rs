//! sipscope CLI entry point.

use std::io;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sipscope::cli::{self, Args};

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();

    let mut stdout = io::stdout().lock();
    let stats = cli::run(&args, &mut stdout)?;

    if args.verbose > 0 {
        eprintln!(
            "{} packets, {} SIP messages ({} stored), {} media, {} unrecognized",
            stats.packets, stats.sip, stats.stored, stats.media, stats.unrecognized
        );
    }
    Ok(())
}
