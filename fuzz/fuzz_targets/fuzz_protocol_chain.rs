//! Fuzz target for the link/IP/transport parsing chain.
//!
//! Exercises every link type the dissector accepts, header bounds checks
//! and fragment field extraction.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sipscope_core::{default_registry, parse_packet};

fuzz_target!(|data: &[u8]| {
    let registry = default_registry();

    // Ethernet, BSD loopback, raw IP, Linux SLL
    for link_type in [1, 0, 101, 113] {
        let _ = parse_packet(&registry, link_type, data);
    }
});
