//! High-level [`CommentFile`] API.
//!
//! ```no_run
//! use oggcomment::CommentFile;
//!
//! let mut file = CommentFile::open("track.ogg");
//! println!("{}", file.pretty_print());
//!
//! file.update(|fields| {
//!     fields.set("TITLE", "Silence");
//!     fields.add("ARTIST", ["One", "Two"]);
//! })?;
//! assert!(file.exists()?);
//! # Ok::<(), oggcomment::Error>(())
//! ```

use std::path::{Path, PathBuf};

use log::debug;

use crate::codec::CodecId;
use crate::error::Result;
use crate::fields::FieldStore;
use crate::rewrite::{read_file, update_file, RewriteOptions};

/// Shown by [`CommentFile::pretty_print`] when the file cannot be read.
pub const FILE_NOT_FOUND: &str = "FILE NOT FOUND!";
/// Shown by [`CommentFile::pretty_print`] when the comment header is unusable.
pub const CORRUPT_TAG: &str = "CORRUPT TAG!";

/// A handle on one Ogg file's comment header.
///
/// Opening never touches the file; errors surface on first access.
#[derive(Debug, Clone)]
pub struct CommentFile {
    path:    PathBuf,
    options: RewriteOptions,
    fields:  Option<FieldStore>,
}

impl CommentFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self::with_options(path, RewriteOptions::default())
    }

    pub fn with_options<P: AsRef<Path>>(path: P, options: RewriteOptions) -> Self {
        Self { path: path.as_ref().to_owned(), options, fields: None }
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn options(&self) -> &RewriteOptions { &self.options }

    /// The decoded fields, read on first call and cached afterwards.
    pub fn fields(&mut self) -> Result<&FieldStore> {
        if self.fields.is_none() {
            let packet = read_file(&self.path)?;
            debug!("{}: {} comment with {} fields", self.path.display(), packet.codec, packet.block.comments.len());
            self.fields = Some(packet.block.to_field_store());
        }
        Ok(self.fields.get_or_insert_with(FieldStore::new))
    }

    /// Codec of the stream, read from the file.
    pub fn codec(&self) -> Result<CodecId> {
        read_file(&self.path).map(|packet| packet.codec)
    }

    /// Vendor string of the comment header, decoded lossily.
    pub fn vendor(&self) -> Result<String> {
        read_file(&self.path).map(|packet| packet.block.vendor_lossy().into_owned())
    }

    /// Let `mutate` edit the fields, then rewrite the file.
    ///
    /// The file is read afresh, so edits made by others since the last
    /// [`fields`](Self::fields) call are kept.  Nothing is written unless
    /// every field passes validation.
    pub fn update<F>(&mut self, mutate: F) -> Result<&FieldStore>
    where
        F: FnOnce(&mut FieldStore),
    {
        let written = update_file(&self.path, &self.options, mutate)?;
        Ok(self.fields.insert(written))
    }

    /// Remove every field.
    pub fn remove(&mut self) -> Result<&FieldStore> {
        self.update(FieldStore::clear)
    }

    /// Whether the file has a readable comment header.
    ///
    /// A corrupt or missing header is `false`; an unreadable file is still
    /// an error.
    pub fn exists(&mut self) -> Result<bool> {
        match self.fields() {
            Ok(_) => Ok(true),
            Err(e) if e.is_invalid_data() => {
                debug!("{}: no usable comment header: {}", self.path.display(), e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// `key: value1, value2` per field, one per line.
    pub fn pretty_print(&mut self) -> String {
        match self.fields() {
            Ok(fields) => fields.to_string(),
            Err(e) if e.is_open() => FILE_NOT_FOUND.to_owned(),
            Err(_) => CORRUPT_TAG.to_owned(),
        }
    }

    /// Forget the cached fields so the next access re-reads the file.
    pub fn reload(&mut self) {
        self.fields = None;
    }
}
