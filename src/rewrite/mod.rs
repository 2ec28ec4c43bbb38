//! Stream rewriter.
//!
//! A rewrite runs in fixed stages:
//!
//! ```text
//! Locate ─▶ Decode ─▶ Mutate ─▶ Encode ─▶ Splice ─▶ Reframe ─▶ Commit
//! ```
//!
//! Everything up to and including Reframe happens in memory
//! ([`rewrite_bytes`]); a failure there leaves the file alone.  Commit writes
//! a temporary file next to the original and renames it into place
//! ([`update_file`]).
//!
//! # Header region
//! Only the pages that carry the comment packet are regenerated: the
//! smallest run of the stream's pages that contains the comment packet and
//! starts and ends on packet boundaries.  When the comment shares its first
//! page with the identification packet, the identification packet is pulled
//! into the region and given a page of its own.  Pages before the region
//! and pages of other logical streams are copied byte for byte; later pages
//! of the same stream are renumbered (and re-checksummed) only when the
//! region's page count changed, up to the first bytes that are not a page.

use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::Path;

use log::{debug, info, warn};

use crate::codec::{CodecId, CommentPacket};
use crate::comment::CommentBlock;
use crate::error::{DataError, Error, Result};
use crate::fields::FieldStore;
use crate::packet::{Packet, PacketReader, PacketWriter};
use crate::page::Page;

// ── Options ──────────────────────────────────────────────────────────────────

/// Rewrite configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Replacement vendor string.  `None` keeps the file's own.
    pub vendor:               Option<String>,
    /// Give the replacement file the original's permission bits.
    pub preserve_permissions: bool,
    /// fsync the temporary file before renaming it.
    pub sync:                 bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self { vendor: None, preserve_permissions: true, sync: true }
    }
}

impl RewriteOptions {
    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn preserve_permissions(mut self, on: bool) -> Self {
        self.preserve_permissions = on;
        self
    }

    pub fn sync(mut self, on: bool) -> Self {
        self.sync = on;
        self
    }
}

// ── Read path ────────────────────────────────────────────────────────────────

fn read_headers<R: Read>(reader: &mut PacketReader<R>) -> Result<(CodecId, Packet, Packet)> {
    let ident = reader.next_packet()?.ok_or(DataError::MissingPacket("identification"))?;
    let codec = CodecId::detect(&ident.data)?;
    let comment = reader.next_packet()?.ok_or(DataError::MissingPacket("comment"))?;
    debug!(
        "{} stream: comment packet of {} bytes on pages {}..={}",
        codec, comment.data.len(), comment.first_page, comment.last_page
    );
    Ok((codec, ident, comment))
}

/// Decode the comment packet of the stream read from `reader`.
///
/// Reading stops right after the comment packet.
pub fn read_comment<R: Read>(reader: R) -> Result<CommentPacket> {
    let mut packets = PacketReader::new(reader);
    let (codec, _, comment) = read_headers(&mut packets)?;
    Ok(CommentPacket::parse(codec, &comment.data)?)
}

pub fn read_fields<R: Read>(reader: R) -> Result<FieldStore> {
    read_comment(reader).map(|packet| packet.block.to_field_store())
}

/// [`read_comment`] on the file at `path`.
pub fn read_file(path: &Path) -> Result<CommentPacket> {
    let file = File::open(path).map_err(|source| Error::Open { path: path.to_owned(), source })?;
    read_comment(BufReader::new(file)).map_err(|e| e.with_path(path))
}

// ── Rewrite ──────────────────────────────────────────────────────────────────

/// Rewrite the comment header of the Ogg stream in `input`.
///
/// `mutate` receives the decoded fields.  Returns the new stream and the
/// fields that were written.
pub fn rewrite_bytes<F>(input: &[u8], options: &RewriteOptions, mutate: F) -> Result<(Vec<u8>, FieldStore)>
where
    F: FnOnce(&mut FieldStore),
{
    // Locate + Decode
    let mut reader = PacketReader::new(input);
    let (codec, ident, comment) = read_headers(&mut reader)?;
    let mut packet = CommentPacket::parse(codec, &comment.data)?;

    // Mutate
    let mut fields = packet.block.to_field_store();
    mutate(&mut fields);

    // Encode
    let vendor = match &options.vendor {
        Some(vendor) => vendor.as_bytes().to_vec(),
        None         => std::mem::take(&mut packet.block.vendor),
    };
    packet.block = CommentBlock::from_fields(vendor, &fields);
    let replacement = packet.to_bytes()?;

    // Extend the region to the next packet boundary.
    let mut trailing = Vec::new();
    let mut last_index = comment.last_page;
    while reader.has_buffered_packets() || !reader.pages()[last_index].page.ends_on_packet_boundary() {
        let next = reader.next_packet()?.ok_or(DataError::UnterminatedPacket)?;
        last_index = next.last_page;
        trailing.push(next);
    }

    let include_ident = ident.last_page == comment.first_page;
    let first_index = if include_ident { ident.first_page } else { comment.first_page };

    let pages  = reader.pages();
    let first  = &pages[first_index];
    let last   = &pages[last_index];
    let serial = first.page.header.serial;
    let old_count = pages[first_index..=last_index]
        .iter()
        .filter(|r| r.page.header.serial == serial)
        .count() as u32;

    // Splice + Reframe
    let mut writer = PacketWriter::new(serial, first.page.header.sequence)
        .beginning_of_stream(first.page.header.is_first());
    if include_ident {
        writer.write_packet(&ident.data, ident.granule_position);
        writer.flush();
    }
    writer.write_packet(&replacement, comment.granule_position);
    for p in &trailing {
        writer.write_packet(&p.data, p.granule_position);
    }
    let stream_ended = last.page.header.is_last();
    let region = writer.finish(stream_ended);
    let delta = (region.len() as u32).wrapping_sub(old_count);

    debug!(
        "header region: pages {}..={} ({} of stream {:#010x}) rewritten as {} pages{}",
        first_index, last_index, old_count, serial, region.len(),
        if include_ident { ", identification packet isolated" } else { "" }
    );

    let mut out = Vec::with_capacity(input.len() + replacement.len());
    out.extend_from_slice(&input[..first.offset as usize]);
    for page in &region {
        out.extend_from_slice(&page.to_bytes());
    }
    // Other streams' pages that were interleaved with the region follow it.
    for record in &pages[first_index + 1..=last_index] {
        if record.page.header.serial != serial {
            out.extend_from_slice(&input[record.offset as usize..record.end() as usize]);
        }
    }

    let consumed = reader.offset() as usize;
    if delta == 0 || stream_ended {
        out.extend_from_slice(&input[consumed..]);
    } else {
        renumber_tail(input, consumed, serial, delta, &mut out);
    }

    Ok((out, fields))
}

/// Copy `input[start..]`, shifting the sequence numbers of `serial`'s pages
/// by `delta` up to its last page.
///
/// Renumbering stops at the first bytes that do not parse as a page (a cut
/// final page, an appended ID3v1 tag); those and everything after them are
/// copied verbatim.
fn renumber_tail(input: &[u8], start: usize, serial: u32, delta: u32, out: &mut Vec<u8>) {
    let mut pos = start;
    let mut renumbered = 0usize;
    while pos < input.len() {
        let mut cursor = &input[pos..];
        let mut page = match Page::read(&mut cursor, pos as u64) {
            Ok(Some(page)) => page,
            Ok(None)       => break,
            Err(e)         => {
                warn!("stopped renumbering at offset {}: {}", pos, e);
                break;
            }
        };
        let len = page.encoded_len();

        if page.header.serial == serial {
            page.header.sequence = page.header.sequence.wrapping_add(delta);
            out.extend_from_slice(&page.to_bytes());
            renumbered += 1;
            if page.header.is_last() {
                pos += len;
                break;
            }
        } else {
            out.extend_from_slice(&input[pos..pos + len]);
        }
        pos += len;
    }
    out.extend_from_slice(&input[pos..]);
    debug!("renumbered {} later pages by {}", renumbered, delta as i32);
}

// ── Commit ───────────────────────────────────────────────────────────────────

/// Rewrite the comment header of the file at `path` in place.
pub fn update_file<F>(path: &Path, options: &RewriteOptions, mutate: F) -> Result<FieldStore>
where
    F: FnOnce(&mut FieldStore),
{
    let input = fs::read(path).map_err(|source| Error::Open { path: path.to_owned(), source })?;
    let (output, fields) = rewrite_bytes(&input, options, mutate)?;
    commit(path, &output, options)?;
    Ok(fields)
}

/// Atomically replace `path` with `bytes`.
fn commit(path: &Path, bytes: &[u8], options: &RewriteOptions) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(Error::TempFile)?;
    tmp.write_all(bytes).map_err(Error::TempFile)?;
    tmp.flush().map_err(Error::TempFile)?;
    if options.sync {
        tmp.as_file().sync_all().map_err(Error::TempFile)?;
    }
    if options.preserve_permissions {
        let perms = fs::metadata(path).map_err(Error::TempFile)?.permissions();
        tmp.as_file().set_permissions(perms).map_err(Error::TempFile)?;
    }

    // On failure the temporary file is dropped, which deletes it.
    tmp.persist(path).map_err(|e| Error::Commit { path: path.to_owned(), source: e.error })?;
    info!("rewrote comment header of {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
