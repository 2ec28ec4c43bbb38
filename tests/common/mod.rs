//! Ogg stream fixtures, assembled page by page.
#![allow(dead_code)]

use std::io::Write;

use oggcomment::codec::CodecId;
use oggcomment::packet::{PacketReader, PacketWriter};
use oggcomment::page::Page;
use tempfile::NamedTempFile;

pub const SERIAL: u32       = 0x5EED_0001;
pub const OTHER_SERIAL: u32 = 0x5EED_0002;
pub const VENDOR: &str      = "Xiph.Org libVorbis I 20020717";

// ── Identification packets ───────────────────────────────────────────────────

pub fn vorbis_ident() -> Vec<u8> {
    let mut p = b"\x01vorbis".to_vec();
    p.extend_from_slice(&0u32.to_le_bytes());
    p.push(2);
    p.extend_from_slice(&44_100u32.to_le_bytes());
    p.extend_from_slice(&[0u8; 12]);
    p.push(0xB8);
    p.push(1);
    p
}

pub fn flac_ident() -> Vec<u8> {
    let mut p = b"\x7fFLAC".to_vec();
    p.extend_from_slice(&[1, 0, 0, 1]);
    p.extend_from_slice(b"fLaC");
    p.extend_from_slice(&[0x00, 0, 0, 34]);
    p.extend_from_slice(&[0u8; 34]);
    p
}

pub fn speex_ident() -> Vec<u8> {
    let mut p = b"Speex   1.2.0".to_vec();
    p.resize(80, 0);
    p
}

pub fn opus_ident() -> Vec<u8> {
    let mut p = b"OpusHead".to_vec();
    p.extend_from_slice(&[1, 2, 0x38, 0x01, 0x80, 0xBB, 0, 0, 0, 0, 0]);
    p
}

pub fn ident(codec: CodecId) -> Vec<u8> {
    match codec {
        CodecId::Vorbis => vorbis_ident(),
        CodecId::Flac   => flac_ident(),
        CodecId::Speex  => speex_ident(),
        CodecId::Opus   => opus_ident(),
    }
}

// ── Comment packets ──────────────────────────────────────────────────────────

/// A bare comment block with entries in exactly the given order.
pub fn raw_block(vendor: &[u8], comments: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    out.extend_from_slice(vendor);
    out.extend_from_slice(&(comments.len() as u32).to_le_bytes());
    for c in comments {
        out.extend_from_slice(&(c.len() as u32).to_le_bytes());
        out.extend_from_slice(c);
    }
    out
}

/// Wrap a block in the codec's comment-packet framing.
pub fn wrap_block(codec: CodecId, block: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    match codec {
        CodecId::Vorbis => out.extend_from_slice(b"\x03vorbis"),
        CodecId::Opus   => out.extend_from_slice(b"OpusTags"),
        CodecId::Speex  => {}
        CodecId::Flac   => {
            let len = block.len() as u32;
            out.extend_from_slice(&[0x84, (len >> 16) as u8, (len >> 8) as u8, len as u8]);
        }
    }
    out.extend_from_slice(block);
    if codec == CodecId::Vorbis {
        out.push(1);
    }
    out
}

pub fn comment_packet(codec: CodecId, comments: &[&str]) -> Vec<u8> {
    let raw: Vec<&[u8]> = comments.iter().map(|c| c.as_bytes()).collect();
    wrap_block(codec, &raw_block(VENDOR.as_bytes(), &raw))
}

pub fn vorbis_setup() -> Vec<u8> {
    let mut p = b"\x05vorbis".to_vec();
    p.extend((0..900u32).map(|i| (i * 31 + 7) as u8));
    p
}

pub fn audio_packet(i: usize) -> Vec<u8> {
    (0..1500 + i * 37).map(|j| (j ^ i) as u8).collect()
}

// ── Streams ──────────────────────────────────────────────────────────────────

/// Pages of a stream: identification page, header page(s), `audio` audio
/// pages.
pub fn stream_pages(codec: CodecId, serial: u32, comment: &[u8], audio: usize) -> Vec<Page> {
    let mut w = PacketWriter::new(serial, 0).beginning_of_stream(true);
    w.write_packet(&ident(codec), 0);
    w.flush();
    w.write_packet(comment, 0);
    if codec == CodecId::Vorbis {
        w.write_packet(&vorbis_setup(), 0);
    }
    w.flush();
    for i in 0..audio {
        w.write_packet(&audio_packet(i), (i as u64 + 1) * 960);
        w.flush();
    }
    w.finish(true)
}

pub fn serialise(pages: &[Page]) -> Vec<u8> {
    pages.iter().flat_map(Page::to_bytes).collect()
}

pub fn stream(codec: CodecId, comment: &[u8], audio: usize) -> Vec<u8> {
    serialise(&stream_pages(codec, SERIAL, comment, audio))
}

pub fn vorbis_stream(comments: &[&str]) -> Vec<u8> {
    stream(CodecId::Vorbis, &comment_packet(CodecId::Vorbis, comments), 3)
}

/// Alternate pages of two streams, starting with `a`.
pub fn interleave(a: &[Page], b: &[Page]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut a = a.iter();
    let mut b = b.iter();
    loop {
        match (a.next(), b.next()) {
            (None, None) => break,
            (x, y) => {
                for page in x.into_iter().chain(y) {
                    out.extend_from_slice(&page.to_bytes());
                }
            }
        }
    }
    out
}

// ── Inspection ───────────────────────────────────────────────────────────────

/// Every page, checksums verified.
pub fn pages(bytes: &[u8]) -> Vec<Page> {
    let mut cursor = bytes;
    let mut out = Vec::new();
    while let Some(page) = Page::read(&mut cursor, 0).unwrap() {
        out.push(page);
    }
    out
}

pub fn pages_of(bytes: &[u8], serial: u32) -> Vec<Page> {
    pages(bytes).into_iter().filter(|p| p.header.serial == serial).collect()
}

/// Every packet of the first stream.
pub fn packets(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut reader = PacketReader::new(bytes);
    let mut out = Vec::new();
    while let Some(p) = reader.next_packet().unwrap() {
        out.push(p.data);
    }
    out
}

pub fn fixture(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}
