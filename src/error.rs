use crate::Digest;
use oci_spec::distribution::ErrorResponse;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    //
    // Invalid user input
    //
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),
    #[error("Invalid name for repository: {0}")]
    InvalidName(String),
    #[error(transparent)]
    InvalidPort(#[from] std::num::ParseIntError),
    #[error("Invalid reference to image: {0}")]
    InvalidReference(String),
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("Directory is not supported: {0}")]
    IsDirectory(PathBuf),
    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),
    #[error("Empty content cannot be pushed")]
    EmptyContent,
    #[error("Could not determine media type, specify it explicitly")]
    UndeterminedMediaType,
    #[error("Size changed while hashing: expected {expected} bytes, read {actual} bytes")]
    SizeMismatch { expected: u64, actual: u64 },

    //
    // Content integrity
    //
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: Digest, actual: Digest },
    #[error("Commit does not match written content: expected {expected} ({expected_size} bytes), got {actual} ({actual_size} bytes)")]
    CommitMismatch {
        expected: Digest,
        expected_size: u64,
        actual: Digest,
        actual_size: u64,
    },
    #[error(transparent)]
    InvalidJson(#[from] serde_json::error::Error),

    //
    // Error from OCI registry
    //
    #[error(transparent)]
    NetworkError(Box<ureq::Transport>),
    #[error(transparent)]
    RegistryError(#[from] ErrorResponse),
    #[error("Authorization failed: {0}")]
    Unauthorized(url::Url),
    #[error("Unsupported WWW-Authentication header: {0}")]
    UnSupportedAuthHeader(String),
    #[error("Not found in registry: {0}")]
    BlobNotFound(url::Url),
    #[error("Content already exists: {0}")]
    AlreadyExists(Digest),
    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: url::Url },
    #[error("Header {header} is lacked in response from {url}")]
    MissingHeader { header: &'static str, url: url::Url },
    #[error("Operation cancelled")]
    Cancelled,

    //
    // System error
    //
    #[error(transparent)]
    UnknownIo(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the registry rejected the credentials (or their absence) for this request
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::BlobNotFound(_))
    }
}

impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(status, res) => {
                let url = url::Url::parse(res.get_url());
                match res.into_json::<ErrorResponse>() {
                    Ok(err) => Error::RegistryError(err),
                    Err(_) => match url {
                        Ok(url) => Error::UnexpectedStatus { status, url },
                        Err(e) => Error::InvalidUrl(e),
                    },
                }
            }
            ureq::Error::Transport(e) => Error::NetworkError(e.into()),
        }
    }
}
