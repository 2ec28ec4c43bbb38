//! Comment block codec.
//!
//! ```text
//! size  field
//!    4  vendor string length        (LE)
//!    n  vendor string
//!    4  comment count N             (LE)
//!  N × {
//!    4  comment length              (LE)
//!    m  "KEY=value", split at the first '='
//!  }
//! ```
//!
//! The block says nothing about its own end: whatever follows the last
//! comment belongs to the codec framing and is handed back to the caller.

use std::borrow::Cow;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{CommentError, DataError};
use crate::fields::{validate_key, FieldStore, FieldValue};

/// Vendor string written when a block is built from nothing.
pub const DEFAULT_VENDOR: &str = concat!("oggcomment ", env!("CARGO_PKG_VERSION"));

/// A decoded comment block.  `comments` keeps wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentBlock {
    /// Kept as raw bytes so a rewrite reproduces it exactly.
    pub vendor:   Vec<u8>,
    pub comments: Vec<(String, FieldValue)>,
}

impl Default for CommentBlock {
    fn default() -> Self {
        Self { vendor: DEFAULT_VENDOR.as_bytes().to_vec(), comments: Vec::new() }
    }
}

impl CommentBlock {
    /// Build a block from `fields` in their deterministic order.
    pub fn from_fields(vendor: impl Into<Vec<u8>>, fields: &FieldStore) -> Self {
        let comments = fields
            .entries()
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value.clone()))
            .collect();
        Self { vendor: vendor.into(), comments }
    }

    pub fn vendor_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.vendor)
    }

    pub fn to_field_store(&self) -> FieldStore {
        let mut store = FieldStore::new();
        for (key, value) in &self.comments {
            store.add(key, value);
        }
        store
    }

    // ── Decode ───────────────────────────────────────────────────────────────

    /// Decode a block from the start of `buf`.
    ///
    /// Returns the block and the number of bytes it occupied.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), DataError> {
        let mut cur = Cursor { buf, pos: 0 };

        let vendor_len = cur.u32()? as usize;
        let vendor = cur.take(vendor_len)?.to_vec();

        let count = cur.u32()?;
        let remaining = cur.remaining();
        // Each comment needs at least its 4-byte length.
        if count as u64 * 4 > remaining as u64 {
            return Err(DataError::ImplausibleCount { count, remaining });
        }

        let mut comments = Vec::with_capacity(count as usize);
        for index in 0..count as usize {
            let len = cur.u32()? as usize;
            let raw = cur.take(len)?;
            let eq = raw
                .iter()
                .position(|&b| b == b'=')
                .ok_or(DataError::MissingSeparator(index))?;
            if eq == 0 {
                return Err(DataError::EmptyKey(index));
            }
            let key = std::str::from_utf8(&raw[..eq]).map_err(|_| DataError::InvalidUtf8(index))?;
            let value = std::str::from_utf8(&raw[eq + 1..]).map_err(|_| DataError::InvalidUtf8(index))?;
            comments.push((key.to_owned(), FieldValue::new(value)));
        }

        Ok((Self { vendor, comments }, cur.pos))
    }

    // ── Encode ───────────────────────────────────────────────────────────────

    /// Encode the block, validating every key and value first.
    pub fn encode(&self) -> Result<Vec<u8>, CommentError> {
        for (key, value) in &self.comments {
            validate_key(key)?;
            if value.as_str().is_none() {
                return Err(CommentError::InvalidValue { key: key.clone() });
            }
        }

        let body: usize = self.comments.iter().map(|(k, v)| 4 + k.len() + 1 + v.as_bytes().len()).sum();
        let mut out = Vec::with_capacity(8 + self.vendor.len() + body);

        put_len(&mut out, self.vendor.len(), "vendor string")?;
        out.extend_from_slice(&self.vendor);
        put_len(&mut out, self.comments.len(), "comment count")?;
        for (key, value) in &self.comments {
            put_len(&mut out, key.len() + 1 + value.as_bytes().len(), "comment")?;
            out.extend_from_slice(key.as_bytes());
            out.push(b'=');
            out.extend_from_slice(value.as_bytes());
        }
        Ok(out)
    }
}

// ── helpers ──────────────────────────────────────────────────────────────────

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DataError> {
        if n > self.remaining() {
            return Err(DataError::Truncated { offset: self.pos, needed: n, available: self.remaining() });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, DataError> {
        self.take(4).map(LittleEndian::read_u32)
    }
}

fn put_len(out: &mut Vec<u8>, len: usize, what: &'static str) -> Result<(), CommentError> {
    let len32 = u32::try_from(len).map_err(|_| CommentError::TooLarge {
        what,
        len,
        limit: u32::MAX as u64,
    })?;
    let mut word = [0u8; 4];
    LittleEndian::write_u32(&mut word, len32);
    out.extend_from_slice(&word);
    Ok(())
}
