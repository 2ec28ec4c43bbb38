//! Ogg page codec.
//!
//! ```text
//! offset  size  field
//!      0     4  capture pattern "OggS"
//!      4     1  stream structure version (always 0)
//!      5     1  header type flags (continued / first / last)
//!      6     8  granule position            (LE)
//!     14     4  bitstream serial number     (LE)
//!     18     4  page sequence number        (LE)
//!     22     4  CRC-32 of the whole page with this field zeroed (LE)
//!     26     1  number of segments
//!     27     n  segment table (lacing values)
//!   27+n     …  payload, sum(lacing values) bytes
//! ```

use std::io::{self, Read, Write};

use byteorder::{ByteOrder, LittleEndian};
use log::warn;

use crate::crc::{checksum, Crc32};
use crate::error::{DataError, Error, Result};

pub const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
pub const HEADER_SIZE:     usize    = 27;
/// Most segments a single page can carry.
pub const MAX_SEGMENTS:    usize    = 255;
/// Largest lacing value; a segment this long continues its packet.
pub const MAX_SEGMENT_LEN: usize    = 255;
pub const MAX_PAYLOAD:     usize    = MAX_SEGMENTS * MAX_SEGMENT_LEN;
pub const MAX_PAGE_SIZE:   usize    = HEADER_SIZE + MAX_SEGMENTS + MAX_PAYLOAD;

pub const FLAG_CONTINUED: u8 = 0x01;
pub const FLAG_FIRST:     u8 = 0x02;
pub const FLAG_LAST:      u8 = 0x04;

/// Granule position of a page on which no packet ends.
pub const GRANULE_NONE: u64 = u64::MAX;

const CHECKSUM_RANGE: std::ops::Range<usize> = 22..26;

// ── Header ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageHeader {
    pub flags:            u8,
    pub granule_position: u64,
    pub serial:           u32,
    pub sequence:         u32,
    /// Checksum as stored on disk.  Ignored when serialising.
    pub checksum:         u32,
}

impl PageHeader {
    pub fn new(serial: u32, sequence: u32) -> Self {
        Self { serial, sequence, ..Default::default() }
    }

    pub fn is_continued(&self) -> bool { self.flags & FLAG_CONTINUED != 0 }
    pub fn is_first(&self)     -> bool { self.flags & FLAG_FIRST != 0 }
    pub fn is_last(&self)      -> bool { self.flags & FLAG_LAST != 0 }

    pub fn set_flag(&mut self, flag: u8, on: bool) {
        if on { self.flags |= flag } else { self.flags &= !flag }
    }
}

// ── Page ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub header:   PageHeader,
    /// Lacing values; their sum is `payload.len()`.
    segments:     Vec<u8>,
    payload:      Vec<u8>,
}

impl Page {
    /// Build a page holding `payload` as one complete packet.
    ///
    /// Returns `None` when the payload needs more than 255 segments.
    pub fn with_payload(header: PageHeader, payload: &[u8]) -> Option<Self> {
        let segments = lacing(payload.len());
        if segments.len() > MAX_SEGMENTS {
            return None;
        }
        Some(Self { header, segments, payload: payload.to_vec() })
    }

    /// Assemble a page from a lacing table and matching payload.
    pub(crate) fn from_parts(header: PageHeader, segments: Vec<u8>, payload: Vec<u8>) -> Self {
        debug_assert!(segments.len() <= MAX_SEGMENTS);
        debug_assert_eq!(segments.iter().map(|&s| s as usize).sum::<usize>(), payload.len());
        Self { header, segments, payload }
    }

    pub fn segments(&self) -> &[u8] { &self.segments }
    pub fn payload(&self)  -> &[u8] { &self.payload }

    /// Size of this page on disk.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.segments.len() + self.payload.len()
    }

    /// True when the final segment closes a packet (or the page is empty).
    pub fn ends_on_packet_boundary(&self) -> bool {
        self.segments.last().map_or(true, |&s| (s as usize) < MAX_SEGMENT_LEN)
    }

    /// Number of packets that end on this page.
    pub fn completed_packets(&self) -> usize {
        self.segments.iter().filter(|&&s| (s as usize) < MAX_SEGMENT_LEN).count()
    }

    /// Serialise with a freshly computed checksum.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_SIZE];
        out[..4].copy_from_slice(CAPTURE_PATTERN);
        out[4] = 0;
        out[5] = self.header.flags;
        LittleEndian::write_u64(&mut out[6..14], self.header.granule_position);
        LittleEndian::write_u32(&mut out[14..18], self.header.serial);
        LittleEndian::write_u32(&mut out[18..22], self.header.sequence);
        out[26] = self.segments.len() as u8;
        out.extend_from_slice(&self.segments);
        out.extend_from_slice(&self.payload);

        let crc = checksum(&out);
        LittleEndian::write_u32(&mut out[CHECKSUM_RANGE], crc);
        out
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// Read the page starting at the reader's position.
    ///
    /// Returns `Ok(None)` on a clean end of input.  `offset` is only used in
    /// error reports.
    pub fn read<R: Read>(reader: &mut R, offset: u64) -> Result<Option<Self>> {
        let mut pattern = [0u8; 4];
        match read_full(reader, &mut pattern)? {
            0 => return Ok(None),
            4 => {}
            _ => return Err(DataError::TruncatedPage(offset).into()),
        }
        if &pattern != CAPTURE_PATTERN {
            return Err(DataError::BadCapturePattern(pattern, offset).into());
        }
        Self::read_after_capture(reader, offset).map(Some)
    }

    /// Read the rest of a page whose capture pattern was already consumed.
    pub(crate) fn read_after_capture<R: Read>(reader: &mut R, offset: u64) -> Result<Self> {
        let mut head = [0u8; HEADER_SIZE];
        head[..4].copy_from_slice(CAPTURE_PATTERN);
        read_exact_or_truncated(reader, &mut head[4..], offset)?;

        let version = head[4];
        if version != 0 {
            return Err(DataError::UnsupportedVersion(version).into());
        }
        // Reserved flag bits are carried through untouched.
        let header = PageHeader {
            flags:            head[5],
            granule_position: LittleEndian::read_u64(&head[6..14]),
            serial:           LittleEndian::read_u32(&head[14..18]),
            sequence:         LittleEndian::read_u32(&head[18..22]),
            checksum:         LittleEndian::read_u32(&head[CHECKSUM_RANGE]),
        };

        let mut segments = vec![0u8; head[26] as usize];
        read_exact_or_truncated(reader, &mut segments, offset)?;
        let body_len: usize = segments.iter().map(|&s| s as usize).sum();
        let mut payload = vec![0u8; body_len];
        read_exact_or_truncated(reader, &mut payload, offset)?;

        head[CHECKSUM_RANGE].copy_from_slice(&[0u8; 4]);
        let mut crc = Crc32::new();
        crc.update(&head);
        crc.update(&segments);
        crc.update(&payload);
        let computed = crc.finalize();

        if computed != header.checksum {
            warn!(
                "page {} of stream {:#010x} at offset {}: crc mismatch (stored {:#010x}, computed {:#010x})",
                header.sequence, header.serial, offset, header.checksum, computed
            );
            return Err(DataError::ChecksumMismatch { stored: header.checksum, computed }.into());
        }

        Ok(Self { header, segments, payload })
    }
}

/// Lacing values for a complete packet of `len` bytes.
///
/// A length that is an exact multiple of 255 ends with a zero-length segment
/// so the packet is not mistaken for one that continues.
pub fn lacing(len: usize) -> Vec<u8> {
    let mut table = vec![MAX_SEGMENT_LEN as u8; len / MAX_SEGMENT_LEN];
    table.push((len % MAX_SEGMENT_LEN) as u8);
    table
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Read until `buf` is full or the input ends; returns bytes read.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8], offset: u64) -> Result<()> {
    if read_full(reader, buf)? < buf.len() {
        return Err(Error::InvalidData(DataError::TruncatedPage(offset)));
    }
    Ok(())
}
