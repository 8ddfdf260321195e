//! Capture reader with gzip and format detection.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use bytes::Bytes;
use tracing::debug;

use crate::error::{CaptureError, Error};
use crate::pcap::{Compression, DecompressReader, GenericPcapReader, PacketRef, PcapFormat, RawPacket};

/// Reader for PCAP and PCAPNG captures, gzip-compressed or not.
///
/// ```no_run
/// use sipscope_core::pcap::PcapReader;
///
/// let mut reader = PcapReader::open("calls.pcap.gz")?;
/// while let Some(packet) = reader.next_packet()? {
///     println!("Frame {}: {} bytes", packet.frame_number, packet.data.len());
/// }
/// # Ok::<(), sipscope_core::Error>(())
/// ```
pub struct PcapReader<S: Read = File> {
    inner: GenericPcapReader<DecompressReader<S>>,
    compression: Compression,
    format: PcapFormat,
}

impl PcapReader<File> {
    /// Open a capture file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        Self::from_source(|| {
            File::open(path).map_err(|_| {
                Error::Capture(CaptureError::FileNotFound {
                    path: path.display().to_string(),
                })
            })
        })
    }
}

impl PcapReader<Cursor<Bytes>> {
    /// Read a capture held in memory.
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self, Error> {
        let data = data.into();
        Self::from_source(|| Ok(Cursor::new(data.clone())))
    }
}

impl<S: Read> PcapReader<S> {
    /// Sniff compression, then the capture magic, then hand a fresh source
    /// to the record reader. `open` is called once per pass.
    fn from_source<F>(mut open: F) -> Result<Self, Error>
    where
        F: FnMut() -> Result<S, Error>,
    {
        let mut header = [0u8; 6];
        let bytes_read = open()?.read(&mut header)?;
        if bytes_read < 4 {
            return Err(Error::Capture(CaptureError::InvalidFormat {
                reason: "File too short".to_string(),
            }));
        }
        let compression = Compression::detect(&header[..bytes_read]);

        let mut magic = [0u8; 4];
        DecompressReader::new(open()?, compression)
            .read_exact(&mut magic)
            .map_err(|_| {
                Error::Capture(CaptureError::InvalidFormat {
                    reason: "File too short to read magic number".to_string(),
                })
            })?;
        let format = PcapFormat::detect(&magic)?;
        debug!(%compression, ?format, "opening capture");

        let decoder = DecompressReader::new(open()?, compression);
        let inner = GenericPcapReader::with_format(decoder, format)?;

        Ok(Self {
            inner,
            compression,
            format,
        })
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn format(&self) -> PcapFormat {
        self.format
    }

    /// Link type of the capture (e.g., 1 = Ethernet).
    #[inline]
    pub fn link_type(&self) -> u16 {
        self.inner.link_type()
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.inner.frame_count()
    }

    /// Read the next packet.
    ///
    /// Returns `Ok(None)` at end of file.
    #[inline]
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>, Error> {
        self.inner.next_packet()
    }

    /// Process up to `max` packets with borrowed data.
    ///
    /// The borrow is valid only during the callback. Returns the number of
    /// packets processed.
    #[inline]
    pub fn process_packets<F>(&mut self, max: usize, f: F) -> Result<usize, Error>
    where
        F: FnMut(PacketRef<'_>) -> Result<(), Error>,
    {
        self.inner.process_packets(max, f)
    }
}

impl<S: Read> Iterator for PcapReader<S> {
    type Item = Result<RawPacket, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}
