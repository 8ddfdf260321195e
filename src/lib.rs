//! sipscope - list the SIP calls in a packet capture.
//!
//! This library holds the command-line front end on top of
//! [`sipscope_core`]: argument parsing, the replay driver and call list
//! output.
//!
//! # Example
//!
//! ```no_run
//! use clap::Parser;
//! use sipscope::cli::{self, Args};
//!
//! let args = Args::parse_from(["sipscope", "--format", "csv", "calls.pcap"]);
//! let mut stdout = std::io::stdout();
//! cli::run(&args, &mut stdout)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod cli;

pub use sipscope_core as core;
