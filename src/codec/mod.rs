//! Codec mappings: how each codec wraps its comment block.
//!
//! The identification packet (the first packet of the stream) names the
//! codec.  The comment packet (the second) carries the comment block inside
//! codec-specific framing:
//!
//! | Codec  | Identification packet       | Comment packet                                   |
//! |--------|-----------------------------|--------------------------------------------------|
//! | Vorbis | `0x01 "vorbis"` …           | `0x03 "vorbis"` + block + framing byte          |
//! | FLAC   | `0x7F "FLAC"` 1.x `"fLaC"` … | type-4 metadata block header (BE length) + block |
//! | Speex  | `"Speex   "` …              | block                                            |
//! | Opus   | `"OpusHead"` …              | `"OpusTags"` + block + extension data            |
//!
//! Anything after the last comment is kept as an opaque trailer and written
//! back unchanged.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::debug;

use crate::comment::CommentBlock;
use crate::error::{CommentError, DataError};

// ── Magic values ─────────────────────────────────────────────────────────────

pub const VORBIS_IDENT_MAGIC:   &[u8] = b"\x01vorbis";
pub const VORBIS_COMMENT_MAGIC: &[u8] = b"\x03vorbis";
pub const FLAC_IDENT_MAGIC:     &[u8] = b"\x7fFLAC";
pub const FLAC_NATIVE_MAGIC:    &[u8] = b"fLaC";
pub const SPEEX_MAGIC:          &[u8] = b"Speex   ";
pub const OPUS_IDENT_MAGIC:     &[u8] = b"OpusHead";
pub const OPUS_COMMENT_MAGIC:   &[u8] = b"OpusTags";

const VORBIS_IDENT_LEN: usize = 30;
const FLAC_IDENT_LEN:   usize = 51;
const SPEEX_IDENT_LEN:  usize = 80;
const OPUS_IDENT_LEN:   usize = 19;

/// FLAC metadata block type of a VORBIS_COMMENT block.
const FLAC_VORBIS_COMMENT: u8 = 4;
const FLAC_LAST_BLOCK:     u8 = 0x80;
/// Largest body a FLAC metadata block header can describe.
pub const FLAC_MAX_BLOCK_LEN: usize = (1 << 24) - 1;

// ── CodecId ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    Vorbis,
    Flac,
    Speex,
    Opus,
}

impl CodecId {
    /// Identify the codec from the stream's first packet.
    pub fn detect(ident: &[u8]) -> Result<Self, DataError> {
        if ident.starts_with(VORBIS_IDENT_MAGIC) {
            check_vorbis_ident(ident)?;
            Ok(CodecId::Vorbis)
        } else if ident.starts_with(FLAC_IDENT_MAGIC) {
            check_flac_ident(ident)?;
            Ok(CodecId::Flac)
        } else if ident.starts_with(SPEEX_MAGIC) {
            if ident.len() < SPEEX_IDENT_LEN {
                return Err(malformed(CodecId::Speex, "identification header"));
            }
            Ok(CodecId::Speex)
        } else if ident.starts_with(OPUS_IDENT_MAGIC) {
            // Only the major version (upper nibble) has to be understood.
            if ident.len() < OPUS_IDENT_LEN || ident[8] >= 16 || ident[9] == 0 {
                return Err(malformed(CodecId::Opus, "identification header"));
            }
            Ok(CodecId::Opus)
        } else {
            Err(DataError::UnknownCodec)
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CodecId::Vorbis => "Vorbis",
            CodecId::Flac   => "FLAC",
            CodecId::Speex  => "Speex",
            CodecId::Opus   => "Opus",
        }
    }
}

impl std::fmt::Display for CodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn malformed(codec: CodecId, what: &'static str) -> DataError {
    DataError::MalformedHeader { codec: codec.name(), what }
}

fn check_vorbis_ident(p: &[u8]) -> Result<(), DataError> {
    let bad = || malformed(CodecId::Vorbis, "identification header");
    if p.len() < VORBIS_IDENT_LEN {
        return Err(bad());
    }
    let version  = LittleEndian::read_u32(&p[7..11]);
    let channels = p[11];
    let rate     = LittleEndian::read_u32(&p[12..16]);
    let bs0      = p[28] & 0x0F;
    let bs1      = p[28] >> 4;
    let framing  = p[29] & 1;
    if version != 0 || channels == 0 || rate == 0 || !(6..=13).contains(&bs0) || !(bs0..=13).contains(&bs1) || framing == 0 {
        return Err(bad());
    }
    Ok(())
}

fn check_flac_ident(p: &[u8]) -> Result<(), DataError> {
    if p.len() < FLAC_IDENT_LEN || p[5] != 1 || &p[9..13] != FLAC_NATIVE_MAGIC {
        return Err(malformed(CodecId::Flac, "identification header"));
    }
    Ok(())
}

// ── Comment packet ───────────────────────────────────────────────────────────

/// A comment packet split into its comment block and codec framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentPacket {
    pub codec:   CodecId,
    pub block:   CommentBlock,
    /// Bytes after the last comment, written back verbatim.
    pub trailer: Vec<u8>,
    /// First byte of the FLAC metadata block header.
    flac_header: u8,
}

impl CommentPacket {
    /// Wrap a block built from scratch.
    pub fn new(codec: CodecId, block: CommentBlock) -> Self {
        let trailer = if codec == CodecId::Vorbis { vec![1] } else { Vec::new() };
        Self { codec, block, trailer, flac_header: FLAC_VORBIS_COMMENT }
    }

    pub fn parse(codec: CodecId, packet: &[u8]) -> Result<Self, DataError> {
        let mut flac_header = FLAC_VORBIS_COMMENT;
        let body = match codec {
            CodecId::Vorbis => packet
                .strip_prefix(VORBIS_COMMENT_MAGIC)
                .ok_or_else(|| malformed(codec, "comment header"))?,
            CodecId::Opus => packet
                .strip_prefix(OPUS_COMMENT_MAGIC)
                .ok_or_else(|| malformed(codec, "comment header"))?,
            CodecId::Speex => packet,
            CodecId::Flac => {
                if packet.len() < 4 || packet[0] & 0x7F != FLAC_VORBIS_COMMENT {
                    return Err(malformed(codec, "comment header"));
                }
                flac_header = packet[0];
                let declared = BigEndian::read_u24(&packet[1..4]) as usize;
                if declared > packet.len() - 4 {
                    return Err(DataError::Truncated { offset: 4, needed: declared, available: packet.len() - 4 });
                }
                if declared < packet.len() - 4 {
                    return Err(malformed(codec, "metadata block length"));
                }
                &packet[4..]
            }
        };

        let (block, used) = CommentBlock::decode(body)?;
        // A FLAC block carries nothing after the comments.
        if codec == CodecId::Flac && used != body.len() {
            return Err(malformed(codec, "metadata block length"));
        }
        let trailer = body[used..].to_vec();

        if codec == CodecId::Vorbis && trailer.first().map_or(true, |b| b & 1 == 0) {
            return Err(malformed(codec, "framing bit"));
        }
        if !trailer.is_empty() {
            debug!("{} comment packet carries {} trailing bytes", codec, trailer.len());
        }

        Ok(Self { codec, block, trailer, flac_header })
    }

    /// Serialise the packet around a freshly encoded block.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CommentError> {
        let block = self.block.encode()?;
        let mut out = Vec::with_capacity(8 + block.len() + self.trailer.len());
        match self.codec {
            CodecId::Vorbis => out.extend_from_slice(VORBIS_COMMENT_MAGIC),
            CodecId::Opus   => out.extend_from_slice(OPUS_COMMENT_MAGIC),
            CodecId::Speex  => {}
            CodecId::Flac   => {
                if block.len() > FLAC_MAX_BLOCK_LEN {
                    return Err(CommentError::TooLarge {
                        what:  "FLAC comment block",
                        len:   block.len(),
                        limit: FLAC_MAX_BLOCK_LEN as u64,
                    });
                }
                let mut header = [0u8; 4];
                header[0] = (self.flac_header & FLAC_LAST_BLOCK) | FLAC_VORBIS_COMMENT;
                BigEndian::write_u24(&mut header[1..], block.len() as u32);
                out.extend_from_slice(&header);
            }
        }
        out.extend_from_slice(&block);
        out.extend_from_slice(&self.trailer);
        Ok(out)
    }
}
