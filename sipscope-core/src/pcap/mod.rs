//! Capture file reading.
//!
//! The main types are:
//! - [`PcapReader`] - file or in-memory reader with gzip detection
//! - [`GenericPcapReader`] - PCAP/PCAPNG record reader over any `Read`
//! - [`RawPacket`] / [`PacketRef`] - owned and borrowed captured records

mod decompress;
mod packet;
mod reader;
mod stream;

pub use decompress::{Compression, DecompressReader};
pub use packet::{PacketRef, RawPacket};
pub use reader::PcapReader;
pub use stream::{GenericPcapReader, PcapFormat};

#[cfg(test)]
pub(crate) mod testdata;
