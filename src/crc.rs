//! Ogg page checksum.
//!
//! Ogg uses a plain CRC-32: generator polynomial `0x04C11DB7`, initial value
//! 0, no bit reflection and no final XOR.  This is *not* the zlib/IEEE CRC
//! (which is reflected and inverted), so a general-purpose CRC-32 crate
//! cannot be used here.
//!
//! ```
//! use oggcomment::crc::{checksum, Crc32};
//!
//! let mut crc = Crc32::new();
//! crc.update(b"1234");
//! crc.update(b"56789");
//! assert_eq!(crc.finalize(), checksum(b"123456789"));
//! ```

/// Generator polynomial (MSB-first).
pub const POLYNOMIAL: u32 = 0x04C1_1DB7;

const fn table_entry(index: u32) -> u32 {
    let mut r = index << 24;
    let mut i = 0;
    while i < 8 {
        r = if r & 0x8000_0000 != 0 { (r << 1) ^ POLYNOMIAL } else { r << 1 };
        i += 1;
    }
    r
}

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = table_entry(i as u32);
        i += 1;
    }
    table
}

static TABLE: [u32; 256] = build_table();

/// Incremental Ogg CRC-32.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crc32 {
    state: u32,
}

impl Crc32 {
    pub fn new() -> Self {
        Self { state: 0 }
    }

    pub fn update(&mut self, buf: &[u8]) {
        let mut crc = self.state;
        for &b in buf {
            crc = (crc << 8) ^ TABLE[((crc >> 24) as u8 ^ b) as usize];
        }
        self.state = crc;
    }

    pub fn finalize(self) -> u32 {
        self.state
    }
}

/// One-shot checksum of `buf`.
pub fn checksum(buf: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(buf);
    crc.finalize()
}
