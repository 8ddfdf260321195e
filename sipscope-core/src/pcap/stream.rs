//! Generic PCAP/PCAPNG reader over any `Read` source, on top of
//! `pcap_parser`.

use std::io::{BufReader, Read};

use pcap_parser::pcapng::Block;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError as ParserError, PcapNGReader};
use tracing::{debug, warn};

use crate::error::{CaptureError, Error};
use crate::pcap::{PacketRef, RawPacket};

/// Buffer size for pcap_parser readers (256KB).
const BUFFER_SIZE: usize = 262144;

/// Link type assumed before any header names one.
const LINKTYPE_ETHERNET: u16 = 1;

fn invalid(reason: String) -> Error {
    Error::Capture(CaptureError::InvalidFormat { reason })
}

/// Format of the capture file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PcapFormat {
    /// Classic PCAP (little-endian, microseconds)
    LegacyLeMicro,
    /// Classic PCAP (big-endian, microseconds)
    LegacyBeMicro,
    /// Classic PCAP (little-endian, nanoseconds)
    LegacyLeNano,
    /// Classic PCAP (big-endian, nanoseconds)
    LegacyBeNano,
    PcapNg,
}

impl PcapFormat {
    /// Detect the format from the first four bytes of the file.
    pub fn detect(data: &[u8]) -> Result<Self, Error> {
        let [a, b, c, d, ..] = *data else {
            return Err(invalid("Data too small for PCAP magic".into()));
        };

        match u32::from_le_bytes([a, b, c, d]) {
            0xa1b2c3d4 => Ok(PcapFormat::LegacyLeMicro),
            0xd4c3b2a1 => Ok(PcapFormat::LegacyBeMicro),
            0xa1b23c4d => Ok(PcapFormat::LegacyLeNano),
            0x4d3cb2a1 => Ok(PcapFormat::LegacyBeNano),
            0x0a0d0d0a => Ok(PcapFormat::PcapNg),
            magic => Err(invalid(format!("Unknown PCAP magic: 0x{:08x}", magic))),
        }
    }

    pub fn is_pcapng(&self) -> bool {
        matches!(self, PcapFormat::PcapNg)
    }

    /// Legacy formats whose sub-second field counts nanoseconds.
    pub fn is_nanosecond(&self) -> bool {
        matches!(self, PcapFormat::LegacyLeNano | PcapFormat::LegacyBeNano)
    }
}

/// PCAPNG interface: link type plus timestamp units per second.
#[derive(Debug, Clone, Copy)]
struct Interface {
    link_type: u16,
    units_per_sec: u64,
    /// 0 means unlimited.
    snaplen: u32,
}

/// Units per second for an `if_tsresol` value.
///
/// The high bit selects a power of two, otherwise a power of ten.
fn ts_units_per_sec(tsresol: u8) -> u64 {
    let exp = u32::from(tsresol & 0x7f);
    let units = if tsresol & 0x80 == 0 {
        10u64.checked_pow(exp)
    } else {
        1u64.checked_shl(exp)
    };
    units.filter(|u| *u > 0).unwrap_or(1_000_000)
}

fn ticks_to_us(ticks: u64, units_per_sec: u64) -> i64 {
    (u128::from(ticks) * 1_000_000 / u128::from(units_per_sec)) as i64
}

/// Packet bytes without the block's 32-bit alignment padding.
fn captured(data: &[u8], caplen: u32) -> &[u8] {
    &data[..(caplen as usize).min(data.len())]
}

/// Reading state shared by both formats.
#[derive(Debug)]
struct ReadState {
    frame_number: u64,
    link_type: u16,
    nanos: bool,
    interfaces: Vec<Interface>,
}

/// PCAP/PCAPNG reader over any `Read` source.
pub struct GenericPcapReader<R: Read> {
    inner: ReaderInner<R>,
    state: ReadState,
}

enum ReaderInner<R: Read> {
    Legacy(LegacyPcapReader<BufReader<R>>),
    Ng(PcapNGReader<BufReader<R>>),
}

impl<R: Read> GenericPcapReader<R> {
    /// Create a reader with known format.
    ///
    /// Use [`PcapFormat::detect`] on the first bytes to find the format.
    pub fn with_format(source: R, format: PcapFormat) -> Result<Self, Error> {
        let buf_reader = BufReader::with_capacity(BUFFER_SIZE, source);

        let inner = if format.is_pcapng() {
            let reader = PcapNGReader::new(BUFFER_SIZE, buf_reader)
                .map_err(|e| invalid(format!("Failed to parse PCAPNG: {}", e)))?;
            ReaderInner::Ng(reader)
        } else {
            let reader = LegacyPcapReader::new(BUFFER_SIZE, buf_reader)
                .map_err(|e| invalid(format!("Failed to parse legacy PCAP: {}", e)))?;
            ReaderInner::Legacy(reader)
        };

        Ok(GenericPcapReader {
            inner,
            state: ReadState {
                frame_number: 0,
                link_type: LINKTYPE_ETHERNET,
                nanos: format.is_nanosecond(),
                interfaces: Vec::new(),
            },
        })
    }

    /// Read the next packet, copying its bytes.
    ///
    /// Returns `Ok(None)` at end of file.
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>, Error> {
        let mut next = None;
        self.process_packets(1, |packet| {
            next = Some(packet.to_raw());
            Ok(())
        })?;
        Ok(next)
    }

    /// Link type of the last header seen (e.g., 1 = Ethernet).
    pub fn link_type(&self) -> u16 {
        self.state.link_type
    }

    pub fn frame_count(&self) -> u64 {
        self.state.frame_number
    }

    /// Process up to `max` packets with borrowed data.
    ///
    /// The borrow is valid only during the callback. Returns the number
    /// of packets processed; fewer than `max` means end of file.
    pub fn process_packets<F>(&mut self, max: usize, f: F) -> Result<usize, Error>
    where
        F: FnMut(PacketRef<'_>) -> Result<(), Error>,
    {
        match &mut self.inner {
            ReaderInner::Legacy(reader) => process_legacy_packets(reader, max, &mut self.state, f),
            ReaderInner::Ng(reader) => process_pcapng_packets(reader, max, &mut self.state, f),
        }
    }
}

fn process_legacy_packets<S: Read, F>(
    reader: &mut LegacyPcapReader<S>,
    max: usize,
    state: &mut ReadState,
    mut f: F,
) -> Result<usize, Error>
where
    F: FnMut(PacketRef<'_>) -> Result<(), Error>,
{
    let mut count = 0;
    while count < max {
        match reader.next() {
            Ok((offset, PcapBlockOwned::Legacy(packet))) => {
                state.frame_number += 1;

                let subsec = if state.nanos {
                    i64::from(packet.ts_usec) / 1000
                } else {
                    i64::from(packet.ts_usec)
                };
                let packet_ref = PacketRef {
                    frame_number: state.frame_number,
                    timestamp_us: i64::from(packet.ts_sec) * 1_000_000 + subsec,
                    captured_len: packet.caplen,
                    original_len: packet.origlen,
                    link_type: state.link_type,
                    data: captured(packet.data, packet.caplen),
                };

                // Consume only after the callback is done with the buffer
                f(packet_ref)?;
                reader.consume(offset);
                count += 1;
            }
            Ok((offset, PcapBlockOwned::LegacyHeader(header))) => {
                state.link_type = header.network.0 as u16;
                debug!(link_type = state.link_type, "legacy PCAP header");
                reader.consume(offset);
            }
            Ok((offset, _)) => reader.consume(offset),
            Err(ParserError::Eof) => break,
            Err(ParserError::UnexpectedEof) => {
                warn!(frames = state.frame_number, "capture ends inside a record");
                break;
            }
            Err(ParserError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| invalid(format!("Legacy PCAP refill error: {}", e)))?;
            }
            Err(e) => return Err(invalid(format!("Legacy PCAP parse error: {}", e))),
        }
    }
    Ok(count)
}

fn process_pcapng_packets<S: Read, F>(
    reader: &mut PcapNGReader<S>,
    max: usize,
    state: &mut ReadState,
    mut f: F,
) -> Result<usize, Error>
where
    F: FnMut(PacketRef<'_>) -> Result<(), Error>,
{
    let mut count = 0;
    while count < max {
        match reader.next() {
            Ok((offset, PcapBlockOwned::NG(block))) => {
                let packet_ref = match block {
                    Block::SectionHeader(_) => {
                        // Interface ids restart with every section
                        state.interfaces.clear();
                        None
                    }
                    Block::InterfaceDescription(idb) => {
                        let interface = Interface {
                            link_type: idb.linktype.0 as u16,
                            units_per_sec: ts_units_per_sec(idb.if_tsresol),
                            snaplen: idb.snaplen,
                        };
                        state.link_type = interface.link_type;
                        state.interfaces.push(interface);
                        None
                    }
                    Block::EnhancedPacket(epb) => {
                        let interface = state.interfaces.get(epb.if_id as usize).copied();
                        let (link_type, units) = interface
                            .map(|i| (i.link_type, i.units_per_sec))
                            .unwrap_or((state.link_type, 1_000_000));
                        let ticks = (u64::from(epb.ts_high) << 32) | u64::from(epb.ts_low);

                        state.frame_number += 1;
                        Some(PacketRef {
                            frame_number: state.frame_number,
                            timestamp_us: ticks_to_us(ticks, units),
                            captured_len: epb.caplen,
                            original_len: epb.origlen,
                            link_type,
                            data: captured(epb.data, epb.caplen),
                        })
                    }
                    Block::SimplePacket(spb) => {
                        let (link_type, snaplen) = state
                            .interfaces
                            .first()
                            .map_or((state.link_type, 0), |i| (i.link_type, i.snaplen));
                        // No caplen field: the original length bounded by the snaplen
                        let caplen = match snaplen {
                            0 => spb.origlen,
                            n => spb.origlen.min(n),
                        };
                        let data = captured(spb.data, caplen);

                        state.frame_number += 1;
                        Some(PacketRef {
                            frame_number: state.frame_number,
                            timestamp_us: 0,
                            captured_len: data.len() as u32,
                            original_len: spb.origlen,
                            link_type,
                            data,
                        })
                    }
                    _ => None,
                };

                if let Some(packet_ref) = packet_ref {
                    f(packet_ref)?;
                    count += 1;
                }
                reader.consume(offset);
            }
            Ok((offset, _)) => reader.consume(offset),
            Err(ParserError::Eof) => break,
            Err(ParserError::UnexpectedEof) => {
                warn!(frames = state.frame_number, "capture ends inside a block");
                break;
            }
            Err(ParserError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| invalid(format!("PCAPNG refill error: {}", e)))?;
            }
            Err(e) => return Err(invalid(format!("PCAPNG parse error: {}", e))),
        }
    }
    Ok(count)
}
