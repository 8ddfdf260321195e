//! Fuzz target for capture file parsing.
//!
//! Tests handling of malformed PCAP/PCAPNG files including:
//! - Compression and magic detection
//! - Global header and interface blocks
//! - Record headers (caplen, origlen, timestamps)

#![no_main]

use libfuzzer_sys::fuzz_target;
use sipscope_core::pcap::PcapReader;

fuzz_target!(|data: &[u8]| {
    if let Ok(reader) = PcapReader::from_bytes(data.to_vec()) {
        // Read all packets - should never panic
        for packet in reader {
            if packet.is_err() {
                break;
            }
        }
    }
});
