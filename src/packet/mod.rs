//! Packet reassembly and pagination.
//!
//! # Reader
//! [`PacketReader`] pulls pages from any `Read`, follows the logical stream
//! whose page comes first, and joins lacing segments into packets.  Pages of
//! other logical streams are recorded in [`PacketReader::pages`] but never
//! reassembled.  A sequence gap, a continuation flag that does not match
//! the open packet, or a packet left open at the end of the stream is
//! reported as corrupt data rather than skipped.
//!
//! # Writer
//! [`PacketWriter`] lays packets out on consecutive pages, filling each page
//! up to 255 segments before starting the next.  A packet that does not fit
//! spills onto a continuation page.

use std::collections::VecDeque;
use std::io::Read;

use log::{debug, trace, warn};

use crate::error::{DataError, Result};
use crate::page::{
    lacing, read_full, Page, PageHeader, CAPTURE_PATTERN, FLAG_CONTINUED, FLAG_FIRST, FLAG_LAST,
    GRANULE_NONE, MAX_SEGMENTS, MAX_SEGMENT_LEN,
};

/// How far into the input the first capture pattern may appear.
pub const MAX_SYNC_SCAN: usize = 40 * 1024;

// ── Types ────────────────────────────────────────────────────────────────────

/// A reassembled packet of the followed logical stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data:             Vec<u8>,
    /// Index into [`PacketReader::pages`] of the page the packet starts on.
    pub first_page:       usize,
    /// Index of the page the packet ends on.
    pub last_page:        usize,
    /// Granule position of the page the packet ends on.
    pub granule_position: u64,
}

/// A page as it was found in the input.
#[derive(Debug, Clone)]
pub struct PageRecord {
    /// Absolute byte offset of the capture pattern.
    pub offset: u64,
    pub page:   Page,
}

impl PageRecord {
    pub fn end(&self) -> u64 {
        self.offset + self.page.encoded_len() as u64
    }
}

struct Partial {
    data:       Vec<u8>,
    first_page: usize,
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct PacketReader<R: Read> {
    reader:        R,
    offset:        u64,
    prefix_len:    u64,
    synced:        bool,
    serial:        Option<u32>,
    next_sequence: Option<u32>,
    pages:         Vec<PageRecord>,
    partial:       Option<Partial>,
    ready:         VecDeque<Packet>,
    ended:         bool,
}

impl<R: Read> PacketReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            offset:        0,
            prefix_len:    0,
            synced:        false,
            serial:        None,
            next_sequence: None,
            pages:         Vec::new(),
            partial:       None,
            ready:         VecDeque::new(),
            ended:         false,
        }
    }

    /// Serial number of the followed stream, once its first page is read.
    pub fn serial(&self) -> Option<u32> { self.serial }

    /// Bytes skipped before the first capture pattern.
    pub fn prefix_len(&self) -> u64 { self.prefix_len }

    /// Bytes consumed from the input so far.
    pub fn offset(&self) -> u64 { self.offset }

    /// Every page read so far, in input order, whatever its stream.
    pub fn pages(&self) -> &[PageRecord] { &self.pages }

    /// True when packets already completed on the current page are queued.
    pub fn has_buffered_packets(&self) -> bool { !self.ready.is_empty() }

    /// True once the followed stream's last page has been read.
    pub fn stream_ended(&self) -> bool { self.ended }

    pub fn into_inner(self) -> R { self.reader }

    /// Next packet of the followed stream, or `None` once it is exhausted.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            if let Some(packet) = self.ready.pop_front() {
                return Ok(Some(packet));
            }
            if self.ended {
                return Ok(None);
            }
            match self.next_page()? {
                Some(index) => self.ingest(index)?,
                None => {
                    if self.partial.is_some() {
                        warn!("input ended inside a packet at offset {}", self.offset);
                        return Err(DataError::UnterminatedPacket.into());
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn next_page(&mut self) -> Result<Option<usize>> {
        let page = if self.synced {
            match Page::read(&mut self.reader, self.offset)? {
                Some(page) => page,
                None       => return Ok(None),
            }
        } else {
            self.sync()?
        };

        let offset = self.offset;
        self.offset += page.encoded_len() as u64;
        trace!(
            "page seq={} serial={:#010x} flags={:#04x} segments={} at offset {}",
            page.header.sequence, page.header.serial, page.header.flags,
            page.segments().len(), offset
        );
        self.pages.push(PageRecord { offset, page });
        Ok(Some(self.pages.len() - 1))
    }

    /// Find the first capture pattern and read the page it starts.
    fn sync(&mut self) -> Result<Page> {
        let mut window = [0u8; 4];
        let mut seen   = 0usize;
        let mut byte   = [0u8; 1];

        while &window != CAPTURE_PATTERN {
            if seen >= MAX_SYNC_SCAN + CAPTURE_PATTERN.len() || read_full(&mut self.reader, &mut byte)? == 0 {
                return Err(DataError::NoCapturePattern(seen.min(MAX_SYNC_SCAN)).into());
            }
            window.copy_within(1.., 0);
            window[3] = byte[0];
            seen += 1;
        }

        self.prefix_len = (seen - CAPTURE_PATTERN.len()) as u64;
        if self.prefix_len > 0 {
            debug!("skipped {} bytes before the first page", self.prefix_len);
        }
        self.offset = self.prefix_len;
        self.synced = true;
        Page::read_after_capture(&mut self.reader, self.offset)
    }

    fn ingest(&mut self, index: usize) -> Result<()> {
        let page   = &self.pages[index].page;
        let header = page.header;

        match self.serial {
            None => self.serial = Some(header.serial),
            Some(serial) if serial != header.serial => {
                trace!("page of stream {:#010x} passed through", header.serial);
                return Ok(());
            }
            Some(_) => {}
        }

        if let Some(expected) = self.next_sequence {
            if header.sequence != expected {
                warn!(
                    "stream {:#010x}: page sequence gap, expected {} found {}",
                    header.serial, expected, header.sequence
                );
                return Err(DataError::SequenceGap { expected, found: header.sequence }.into());
            }
        }
        self.next_sequence = Some(header.sequence.wrapping_add(1));

        let fault = match (self.partial.is_some(), header.is_continued()) {
            (false, true) => Some(DataError::UnexpectedContinuation(header.sequence)),
            (true, false) => Some(DataError::MissingContinuation(header.sequence)),
            _             => None,
        };
        if let Some(fault) = fault {
            warn!("stream {:#010x}: {}", header.serial, fault);
            return Err(fault.into());
        }

        let payload = page.payload();
        let mut start = 0usize;
        for &seg in page.segments() {
            let end = start + seg as usize;
            self.partial
                .get_or_insert_with(|| Partial { data: Vec::new(), first_page: index })
                .data
                .extend_from_slice(&payload[start..end]);
            start = end;

            if (seg as usize) < MAX_SEGMENT_LEN {
                if let Some(done) = self.partial.take() {
                    self.ready.push_back(Packet {
                        data:             done.data,
                        first_page:       done.first_page,
                        last_page:        index,
                        granule_position: header.granule_position,
                    });
                }
            }
        }

        if header.is_last() {
            self.ended = true;
            if self.partial.is_some() {
                warn!("stream {:#010x}: end of stream inside a packet", header.serial);
                return Err(DataError::UnterminatedPacket.into());
            }
        }
        Ok(())
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct PacketWriter {
    serial:         u32,
    next_sequence:  u32,
    mark_first:     bool,
    pages:          Vec<Page>,
    segments:       Vec<u8>,
    payload:        Vec<u8>,
    continued:      bool,
    page_granule:   u64,
}

impl PacketWriter {
    /// Start a run of pages for stream `serial`, numbered from `first_sequence`.
    pub fn new(serial: u32, first_sequence: u32) -> Self {
        Self {
            serial,
            next_sequence: first_sequence,
            mark_first:    false,
            pages:         Vec::new(),
            segments:      Vec::new(),
            payload:       Vec::new(),
            continued:     false,
            page_granule:  GRANULE_NONE,
        }
    }

    /// Flag the first emitted page as the beginning of the stream.
    pub fn beginning_of_stream(mut self, on: bool) -> Self {
        self.mark_first = on;
        self
    }

    /// Append one packet.  `granule_position` is recorded on the page where
    /// the packet ends.
    pub fn write_packet(&mut self, data: &[u8], granule_position: u64) {
        let mut start = 0usize;
        for seg in lacing(data.len()) {
            if self.segments.len() == MAX_SEGMENTS {
                self.emit_page();
            }
            let end = start + seg as usize;
            self.segments.push(seg);
            self.payload.extend_from_slice(&data[start..end]);
            start = end;
        }
        self.page_granule = granule_position;
    }

    /// Close the current page so the next packet starts a fresh one.
    pub fn flush(&mut self) {
        if !self.segments.is_empty() {
            self.emit_page();
        }
    }

    /// Close the last page and return every page written.
    pub fn finish(mut self, end_of_stream: bool) -> Vec<Page> {
        self.flush();
        if end_of_stream {
            if let Some(last) = self.pages.last_mut() {
                last.header.set_flag(FLAG_LAST, true);
            }
        }
        self.pages
    }

    fn emit_page(&mut self) {
        let mut header = PageHeader::new(self.serial, self.next_sequence);
        header.granule_position = self.page_granule;
        header.set_flag(FLAG_CONTINUED, self.continued);
        header.set_flag(FLAG_FIRST, self.mark_first);

        let page = Page::from_parts(
            header,
            std::mem::take(&mut self.segments),
            std::mem::take(&mut self.payload),
        );
        self.continued    = !page.ends_on_packet_boundary();
        self.mark_first   = false;
        self.page_granule = GRANULE_NONE;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.pages.push(page);
    }
}
