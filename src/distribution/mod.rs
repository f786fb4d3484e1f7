//! Push and fetch content to OCI registry based on [OCI distribution specification](https://github.com/opencontainers/distribution-spec)

mod auth;
mod authorizer;
mod client;
mod name;
mod reference;

pub use auth::*;
pub use authorizer::*;
pub use client::Client;
pub use name::Name;
pub use reference::Reference;

use crate::{error::*, Descriptor, Digest};
use std::{
    fmt,
    io::{Read, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Resource and actions an authorization token must cover
///
/// ```
/// use ocicat::{distribution::Scope, ImageName};
///
/// let image = ImageName::parse("ghcr.io/termoshtt/ocicat:latest")?;
/// assert_eq!(Scope::new(&image, false).to_string(), "repository:termoshtt/ocicat:pull,push");
/// assert_eq!(Scope::new(&image, true).to_string(), "repository(plugin):termoshtt/ocicat:pull,push");
/// # Ok::<(), ocicat::error::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    repository: Name,
    /// Docker plugins live in their own namespace
    plugin: bool,
}

impl Scope {
    pub fn new(image: &crate::ImageName, plugin: bool) -> Self {
        Scope {
            repository: image.name.clone(),
            plugin,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = if self.plugin { "(plugin)" } else { "" };
        write!(f, "repository{}:{}:pull,push", class, self.repository)
    }
}

/// Cancellation flag shared between the caller and the transport
///
/// The transport checks it before every request. Requests in flight are not interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Context passed to every [Transport] call
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Scope requested from the token server instead of the one in the challenge
    pub scope: Option<Scope>,
    pub cancel: CancelToken,
}

impl RequestContext {
    pub fn new(cancel: CancelToken) -> Self {
        RequestContext { scope: None, cancel }
    }

    pub fn with_scope(&self, scope: Scope) -> Self {
        RequestContext {
            scope: Some(scope),
            cancel: self.cancel.clone(),
        }
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Supplies credentials when the transport meets an authentication challenge
pub trait Authorize {
    fn credentials(&mut self, host: &str) -> Result<Credential>;
}

/// Writer opened by [Transport::push]
pub trait BlobWriter: Write {
    /// Finish the upload. Fails if `size` or `digest` does not match what was written.
    fn commit(self: Box<Self>, size: u64, digest: &Digest) -> Result<()>;
}

/// Resolve, fetch and push content of a single repository
///
/// Authorization rejections must be reported as [Error::Unauthorized], unknown content as
/// [Error::BlobNotFound], and content already present at push as [Error::AlreadyExists],
/// since the transfer workflow in [crate::transfer] retries on these.
pub trait Transport {
    /// Descriptor of the content the image reference points to
    fn resolve(&mut self, ctx: &RequestContext, auth: &mut dyn Authorize) -> Result<Descriptor>;

    fn fetch(
        &mut self,
        ctx: &RequestContext,
        auth: &mut dyn Authorize,
        desc: &Descriptor,
    ) -> Result<Box<dyn Read + '_>>;

    fn push(
        &mut self,
        ctx: &RequestContext,
        auth: &mut dyn Authorize,
        desc: &Descriptor,
    ) -> Result<Box<dyn BlobWriter + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImageName;

    #[test]
    fn scope() -> Result<()> {
        let image = ImageName::parse("localhost:5000/test_repo:tag1")?;
        assert_eq!(
            Scope::new(&image, false).to_string(),
            "repository:test_repo:pull,push"
        );
        let image = ImageName::parse("vieux/sshfs")?;
        assert_eq!(
            Scope::new(&image, true).to_string(),
            "repository(plugin):vieux/sshfs:pull,push"
        );
        Ok(())
    }

    #[test]
    fn cancel() {
        let ctx = RequestContext::default();
        assert!(ctx.check_cancelled().is_ok());
        let scoped = ctx.with_scope(Scope::new(&ImageName::parse("alpine").unwrap(), false));
        ctx.cancel.cancel();
        assert!(matches!(scoped.check_cancelled(), Err(Error::Cancelled)));
    }
}
