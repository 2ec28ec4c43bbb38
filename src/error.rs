//! Error taxonomy.
//!
//! Three kinds matter to callers:
//!
//! | Kind | Meaning |
//! |------|---------|
//! | [`ErrorKind::Open`] | the file is missing or unreadable |
//! | [`ErrorKind::InvalidData`] | the file is not a well-formed Ogg stream with a comment header |
//! | [`ErrorKind::InvalidComment`] | caller-supplied fields cannot be encoded |
//!
//! Failures while writing the replacement file are [`ErrorKind::Write`].
//! Every error that can happen before the commit step leaves the original
//! file untouched.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ── Corrupt input ────────────────────────────────────────────────────────────

/// A structural fault in the file being read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("no Ogg capture pattern in the first {0} bytes")]
    NoCapturePattern(usize),
    #[error("bad capture pattern {0:02x?} at offset {1}")]
    BadCapturePattern([u8; 4], u64),
    #[error("unsupported Ogg version {0}")]
    UnsupportedVersion(u8),
    #[error("page checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("truncated page at offset {0}")]
    TruncatedPage(u64),
    #[error("page sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u32, found: u32 },
    #[error("page {0} is flagged as continued but no packet is open")]
    UnexpectedContinuation(u32),
    #[error("page {0} is not flagged as continued but a packet is open")]
    MissingContinuation(u32),
    #[error("packet does not terminate before the end of the stream")]
    UnterminatedPacket,
    #[error("stream has no {0} packet")]
    MissingPacket(&'static str),
    #[error("unrecognised identification header")]
    UnknownCodec,
    #[error("malformed {codec} {what}")]
    MalformedHeader { codec: &'static str, what: &'static str },
    #[error("comment block truncated: {needed} bytes needed at offset {offset}, {available} available")]
    Truncated { offset: usize, needed: usize, available: usize },
    #[error("comment count {count} cannot fit in the remaining {remaining} bytes")]
    ImplausibleCount { count: u32, remaining: usize },
    #[error("comment {0} has no '=' separator")]
    MissingSeparator(usize),
    #[error("comment {0} has an empty key")]
    EmptyKey(usize),
    #[error("comment {0} is not valid UTF-8")]
    InvalidUtf8(usize),
}

// ── Caller input ─────────────────────────────────────────────────────────────

/// A field that cannot be written to the comment header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommentError {
    #[error("empty field key")]
    EmptyKey,
    #[error("field key {key:?} contains forbidden byte {byte:#04x}")]
    InvalidKey { key: String, byte: u8 },
    #[error("value of field {key:?} is not valid UTF-8")]
    InvalidValue { key: String },
    #[error("{what} of {len} bytes exceeds the {limit}-byte limit")]
    TooLarge { what: &'static str, len: usize, limit: u64 },
}

// ── Top level ────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid data: {0}")]
    InvalidData(#[from] DataError),
    #[error("invalid comment: {0}")]
    InvalidComment(#[from] CommentError),
    #[error("cannot write temporary file: {0}")]
    TempFile(#[source] io::Error),
    #[error("cannot replace {}: {source}", path.display())]
    Commit {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Open,
    InvalidData,
    InvalidComment,
    Write,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Open { .. } | Error::Io(_)       => ErrorKind::Open,
            Error::InvalidData(_)                   => ErrorKind::InvalidData,
            Error::InvalidComment(_)                => ErrorKind::InvalidComment,
            Error::TempFile(_) | Error::Commit { .. } => ErrorKind::Write,
        }
    }

    pub fn is_open(&self) -> bool {
        self.kind() == ErrorKind::Open
    }

    pub fn is_invalid_data(&self) -> bool {
        self.kind() == ErrorKind::InvalidData
    }

    pub fn is_invalid_comment(&self) -> bool {
        self.kind() == ErrorKind::InvalidComment
    }

    /// Attach `path` to a bare I/O error raised while reading it.
    pub(crate) fn with_path(self, path: &std::path::Path) -> Self {
        match self {
            Error::Io(source) => Error::Open { path: path.to_owned(), source },
            other             => other,
        }
    }
}
