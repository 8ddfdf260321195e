//! Minimal capture files for reader tests.

/// Broadcast Ethernet header carrying IPv4, no payload.
pub(crate) const ETH_FRAME: [u8; 14] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // Dst MAC
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, // Src MAC
    0x08, 0x00, // EtherType (IPv4)
];

/// Little-endian legacy PCAP with one [`ETH_FRAME`] record.
pub(crate) fn legacy_pcap(nanos: bool, ts_sec: u32, ts_frac: u32) -> Vec<u8> {
    let magic: u32 = if nanos { 0xa1b23c4d } else { 0xa1b2c3d4 };

    let mut data = Vec::new();
    data.extend_from_slice(&magic.to_le_bytes());
    data.extend_from_slice(&2u16.to_le_bytes()); // Version major
    data.extend_from_slice(&4u16.to_le_bytes()); // Version minor
    data.extend_from_slice(&0i32.to_le_bytes()); // Thiszone
    data.extend_from_slice(&0u32.to_le_bytes()); // Sigfigs
    data.extend_from_slice(&65535u32.to_le_bytes()); // Snaplen
    data.extend_from_slice(&1u32.to_le_bytes()); // Network (Ethernet)

    data.extend_from_slice(&ts_sec.to_le_bytes());
    data.extend_from_slice(&ts_frac.to_le_bytes());
    data.extend_from_slice(&(ETH_FRAME.len() as u32).to_le_bytes());
    data.extend_from_slice(&(ETH_FRAME.len() as u32).to_le_bytes());
    data.extend_from_slice(&ETH_FRAME);
    data
}

/// Little-endian PCAPNG: section header, one Ethernet interface with
/// microsecond timestamps, one enhanced packet block.
pub(crate) fn pcapng(ts_us: u64) -> Vec<u8> {
    let mut data = pcapng_header();
    push_epb(&mut data, ts_us, &ETH_FRAME);
    data
}

/// PCAPNG with one `frame` in an enhanced (or simple) packet block.
pub(crate) fn pcapng_frame(frame: &[u8], simple: bool) -> Vec<u8> {
    let mut data = pcapng_header();
    if simple {
        push_spb(&mut data, frame);
    } else {
        push_epb(&mut data, 0, frame);
    }
    data
}

/// Enhanced Packet Block, data padded to 32 bits.
fn push_epb(data: &mut Vec<u8>, ts_us: u64, frame: &[u8]) {
    let padded = frame.len().div_ceil(4) * 4;
    let block_len = (32 + padded) as u32;
    data.extend_from_slice(&6u32.to_le_bytes());
    data.extend_from_slice(&block_len.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes()); // Interface id
    data.extend_from_slice(&((ts_us >> 32) as u32).to_le_bytes());
    data.extend_from_slice(&(ts_us as u32).to_le_bytes());
    data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
    data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
    data.extend_from_slice(frame);
    data.resize(data.len() + padded - frame.len(), 0);
    data.extend_from_slice(&block_len.to_le_bytes());
}

/// Simple Packet Block, data padded to 32 bits.
fn push_spb(data: &mut Vec<u8>, frame: &[u8]) {
    let padded = frame.len().div_ceil(4) * 4;
    let block_len = (16 + padded) as u32;
    data.extend_from_slice(&3u32.to_le_bytes());
    data.extend_from_slice(&block_len.to_le_bytes());
    data.extend_from_slice(&(frame.len() as u32).to_le_bytes()); // Original length
    data.extend_from_slice(frame);
    data.resize(data.len() + padded - frame.len(), 0);
    data.extend_from_slice(&block_len.to_le_bytes());
}

/// Section header and one Ethernet interface with microsecond timestamps.
fn pcapng_header() -> Vec<u8> {
    let mut data = Vec::new();

    // Section Header Block
    data.extend_from_slice(&0x0a0d0d0au32.to_le_bytes());
    data.extend_from_slice(&28u32.to_le_bytes());
    data.extend_from_slice(&0x1a2b3c4du32.to_le_bytes()); // Byte-order magic
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&(-1i64).to_le_bytes()); // Section length unknown
    data.extend_from_slice(&28u32.to_le_bytes());

    // Interface Description Block
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&20u32.to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes()); // LINKTYPE_ETHERNET
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&65535u32.to_le_bytes());
    data.extend_from_slice(&20u32.to_le_bytes());
    data
}
