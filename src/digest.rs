use crate::error::*;
use regex::Regex;
use sha2::{Digest as _, Sha256};
use std::{fmt, io, str::FromStr};

/// Digest of contents
///
/// Digest is defined in [OCI image spec](https://github.com/opencontainers/image-spec/blob/v1.0.1/descriptor.md#digests)
/// as a string satisfies following EBNF:
///
/// ```text
/// digest                ::= algorithm ":" encoded
/// algorithm             ::= algorithm-component (algorithm-separator algorithm-component)*
/// algorithm-component   ::= [a-z0-9]+
/// algorithm-separator   ::= [+._-]
/// encoded               ::= [a-zA-Z0-9=_-]+
/// ```
///
/// Two digests are equal only if both the algorithm and the encoded part are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    pub algorithm: String,
    pub encoded: String,
}

lazy_static::lazy_static! {
    static ref ALGORITHM_RE: Regex = Regex::new(r"^[a-z0-9]+([+._-][a-z0-9]+)*$").unwrap();
    static ref ENCODED_RE: Regex = Regex::new(r"^[a-zA-Z0-9=_-]+$").unwrap();
}

/// Algorithm used for every digest this crate computes
pub const CANONICAL_ALGORITHM: &str = "sha256";

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl FromStr for Digest {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Digest::new(s)
    }
}

impl Digest {
    pub fn new(input: &str) -> Result<Self> {
        let mut iter = input.split(':');
        match (iter.next(), iter.next(), iter.next()) {
            (Some(algorithm), Some(encoded), None)
                if ALGORITHM_RE.is_match(algorithm) && ENCODED_RE.is_match(encoded) =>
            {
                Ok(Digest {
                    algorithm: algorithm.to_string(),
                    encoded: encoded.to_string(),
                })
            }
            _ => Err(Error::InvalidDigest(input.to_string())),
        }
    }

    /// Calc digest using SHA-256 algorithm
    pub fn from_buf_sha256(buf: &[u8]) -> Self {
        let mut digester = Digester::new();
        digester.update(buf);
        digester.finish()
    }
}

/// Incremental SHA-256 accumulator
#[derive(Clone, Default)]
pub struct Digester {
    hasher: Sha256,
}

impl Digester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, buf: &[u8]) {
        self.hasher.update(buf);
    }

    pub fn finish(self) -> Digest {
        let hash = self.hasher.finalize();
        Digest {
            algorithm: CANONICAL_ALGORITHM.to_string(),
            encoded: base16ct::lower::encode_string(&hash),
        }
    }
}

/// Writer adapter which hashes and counts every byte passed to the inner writer
///
/// Hashing happens in the same pass as writing, so the payload is never buffered as a whole.
///
/// ```
/// use ocicat::digest::{Digest, HashingWriter};
/// use std::io::Write;
///
/// let mut w = HashingWriter::new(Vec::new());
/// w.write_all(b"test string").unwrap();
/// let (buf, digest, size) = w.finish();
/// assert_eq!(buf, b"test string");
/// assert_eq!(digest, Digest::from_buf_sha256(b"test string"));
/// assert_eq!(size, 11);
/// ```
pub struct HashingWriter<W> {
    inner: W,
    digester: Digester,
    written: u64,
}

impl<W: io::Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        HashingWriter {
            inner,
            digester: Digester::new(),
            written: 0,
        }
    }

    pub fn finish(self) -> (W, Digest, u64) {
        (self.inner, self.digester.finish(), self.written)
    }
}

impl<W: io::Write> io::Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        // Only the bytes the inner writer accepted are hashed
        self.digester.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse() -> Result<()> {
        let digest = Digest::new(
            "sha256:5ac2b0f3a1d7c8b1b4a4e0a7f35a6a9e07f0f35e2f2cf0e2ebc9b6e7b1e6a8b0",
        )?;
        assert_eq!(digest.algorithm, "sha256");
        assert_eq!(
            digest.to_string(),
            "sha256:5ac2b0f3a1d7c8b1b4a4e0a7f35a6a9e07f0f35e2f2cf0e2ebc9b6e7b1e6a8b0"
        );

        assert!(Digest::new("sha256").is_err());
        assert!(Digest::new("sha256:").is_err());
        assert!(Digest::new("sha256:abc:def").is_err());
        assert!(Digest::new("SHA256:abc").is_err());
        assert!(Digest::new("sha256:ab/cd").is_err());
        assert!(Digest::new("manifest.json").is_err());
        Ok(())
    }

    #[test]
    fn equality_is_exact() -> Result<()> {
        let a = Digest::new("sha256:abcd")?;
        assert_eq!(a, Digest::new("sha256:abcd")?);
        assert_ne!(a, Digest::new("sha512:abcd")?);
        assert_ne!(a, Digest::new("sha256:ABCD")?);
        Ok(())
    }

    #[test]
    fn sha256_of_empty() {
        assert_eq!(
            Digest::from_buf_sha256(b"").to_string(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn incremental_equals_oneshot() -> Result<()> {
        let mut w = HashingWriter::new(io::sink());
        w.write_all(b"hello ")?;
        w.write_all(b"world")?;
        let (_, digest, size) = w.finish();
        assert_eq!(digest, Digest::from_buf_sha256(b"hello world"));
        assert_eq!(size, 11);
        Ok(())
    }
}
