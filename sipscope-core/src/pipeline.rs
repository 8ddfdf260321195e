//! Capture-to-storage driver.
//!
//! A [`Pipeline`] feeds captured records through a [`Dissector`] and stores
//! every SIP message it yields. It runs on one thread; readers use the
//! shared [`Storage`] concurrently.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::config::DissectorConfig;
use crate::dissect::{Dissected, Dissector};
use crate::error::Error;
use crate::pcap::{PacketRef, PcapReader};
use crate::storage::Storage;

/// Pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Captured records processed.
    pub packets: u64,
    /// SIP messages dissected.
    pub sip: u64,
    /// SIP messages accepted by storage.
    pub stored: u64,
    /// RTP/RTCP datagrams.
    pub media: u64,
    /// Frames or stream messages the dissector could not classify.
    pub unrecognized: u64,
}

pub struct Pipeline {
    dissector: Dissector,
    storage: Arc<Storage>,
    stop: Arc<AtomicBool>,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(config: DissectorConfig, storage: Arc<Storage>) -> Self {
        Self {
            dissector: Dissector::new(config),
            storage,
            stop: Arc::new(AtomicBool::new(false)),
            stats: PipelineStats::default(),
        }
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn dissector(&self) -> &Dissector {
        &self.dissector
    }

    /// Flag another thread sets to stop [`run`](Self::run).
    ///
    /// Checked between packets only: a packet is either fully applied to
    /// storage or not read at all.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Dissect one captured record and store its SIP messages.
    ///
    /// Returns how many messages storage accepted.
    pub fn process(&mut self, packet: &PacketRef<'_>) -> usize {
        self.stats.packets += 1;
        trace!(frame = packet.frame_number, len = packet.data.len(), "packet");

        let mut stored = 0;
        for dissected in self
            .dissector
            .dissect(packet.link_type, packet.header(), packet.data)
        {
            match dissected {
                Dissected::Sip { packet: sip_packet, sip } => {
                    self.stats.sip += 1;
                    if self.storage.check_packet(sip_packet, sip).is_some() {
                        stored += 1;
                    } else {
                        debug!(frame = packet.frame_number, "SIP message filtered out");
                    }
                }
                Dissected::Media(_) => self.stats.media += 1,
            }
        }

        self.stats.stored += stored as u64;
        stored
    }

    /// Drain `reader` until end of file or until stopped.
    pub fn run<S: Read>(&mut self, reader: &mut PcapReader<S>) -> Result<PipelineStats, Error> {
        while !self.is_stopped() {
            let read = reader.process_packets(1, |packet| {
                self.process(&packet);
                Ok(())
            })?;
            if read == 0 {
                break;
            }
        }

        let stats = self.stats();
        info!(
            packets = stats.packets,
            sip = stats.sip,
            stored = stats.stored,
            calls = self.storage.count(),
            stopped = self.is_stopped(),
            "capture processed"
        );
        Ok(stats)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            unrecognized: self.dissector.stats().unrecognized,
            ..self.stats
        }
    }
}
