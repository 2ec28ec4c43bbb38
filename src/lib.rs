//! Read and rewrite the comment header of Ogg Vorbis, FLAC, Speex and Opus
//! streams.
//!
//! Layers, bottom up: [`crc`] → [`page`] → [`packet`] → [`codec`] /
//! [`comment`] → [`fields`] → [`rewrite`] → [`file`].

pub mod crc;
pub mod error;
pub mod page;
pub mod packet;
pub mod codec;
pub mod comment;
pub mod fields;
pub mod rewrite;
pub mod file;

pub use error::{CommentError, DataError, Error, ErrorKind, Result};
pub use codec::{CodecId, CommentPacket};
pub use comment::{CommentBlock, DEFAULT_VENDOR};
pub use fields::{Field, FieldStore, FieldValue, IntoFieldValue, IntoFieldValues};
pub use rewrite::{read_comment, read_fields, rewrite_bytes, update_file, RewriteOptions};
pub use file::CommentFile;
