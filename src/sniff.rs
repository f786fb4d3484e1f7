//! Classify the head of a file

/// Compression detected from the leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    /// Not a known compression; the content may still be a JSON document
    Unknown,
}

const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Number of bytes [classify] wants to see
pub const HEADER_LEN: usize = 10;

/// Check the magic number of known compressions
///
/// Input shorter than the magic number is never an error, it is just [Compression::Unknown].
pub fn classify(header: &[u8]) -> Compression {
    if header.starts_with(&GZIP_MAGIC) {
        Compression::Gzip
    } else {
        Compression::Unknown
    }
}
