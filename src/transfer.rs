//! Push and fetch workflows on top of a [Transport]
//!
//! Both workflows are bounded retry loops. A rejected request is retried first with
//! credentials and then with an explicit [Scope], and never more often than that.

use crate::{
    digest::HashingWriter,
    distribution::{AuthOutcome, Authorizer, CredentialStore, Prompt, RequestContext, Scope, Transport},
    error::*,
    media_types, Descriptor, Digest,
};
use oci_spec::image::MediaType;
use std::io::{self, Read, Write};

const COPY_BUFFER_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Number of bytes sent
    Uploaded(u64),
    /// The registry already has the content, nothing is sent
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushState {
    /// Credentials are asked at the first challenge
    ForcedAuth,
    /// Token is requested with the explicit scope
    Scoped,
}

/// Push `content` described by `desc`
///
/// `content` must yield exactly the bytes `desc` was computed from,
/// see [Descriptor::from_file]. Otherwise the commit fails with [Error::CommitMismatch].
pub fn push<T, S, P, R>(
    transport: &mut T,
    authorizer: &mut Authorizer<S, P>,
    ctx: &RequestContext,
    scope: &Scope,
    desc: &Descriptor,
    mut content: R,
) -> Result<PushOutcome>
where
    T: Transport + ?Sized,
    S: CredentialStore,
    P: Prompt,
    R: Read,
{
    // Anonymous push never succeeds
    authorizer.expect_rejection();

    let mut ctx = ctx.clone();
    let mut state = PushState::ForcedAuth;
    let mut writer = loop {
        match transport.push(&ctx, authorizer, desc) {
            Ok(writer) => break writer,
            Err(Error::AlreadyExists(digest)) => {
                log::info!("Already exists: {}", digest);
                return Ok(PushOutcome::AlreadyExists);
            }
            Err(e) if e.is_unauthorized() && state == PushState::ForcedAuth => {
                log::debug!("Push rejected, retry with scope {}", scope);
                ctx = ctx.with_scope(scope.clone());
                state = PushState::Scoped;
            }
            Err(e) => return Err(e),
        }
    };

    let mut buf = vec![0_u8; COPY_BUFFER_SIZE];
    let mut sent = 0_u64;
    loop {
        let n = content.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        sent += n as u64;
    }
    writer.commit(desc.size, &desc.digest)?;

    authorizer.record(AuthOutcome::Granted);
    Ok(PushOutcome::Uploaded(sent))
}

/// What to fetch in addition to the image reference
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    /// Fetch this digest instead of what the reference resolves to
    pub digest: Option<Digest>,
    /// Media type of the content. Unknown digests are fetched as blobs.
    pub media_type: Option<MediaType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolveState {
    /// Anonymous, or with stored credentials
    Initial,
    ForcedAuth,
    Scoped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchAttempt {
    First,
    /// Retry as a manifest after the first attempt was not found
    AsManifest,
}

/// Fetch content into `sink` and verify its digest
///
/// Returns the descriptor of fetched content. When the digest does not match, the bytes
/// already written to `sink` are not retracted, and [Error::DigestMismatch] is returned.
pub fn fetch<T, S, P, W>(
    transport: &mut T,
    authorizer: &mut Authorizer<S, P>,
    ctx: &RequestContext,
    scope: &Scope,
    request: &FetchRequest,
    mut sink: W,
) -> Result<Descriptor>
where
    T: Transport + ?Sized,
    S: CredentialStore,
    P: Prompt,
    W: Write,
{
    let (ctx, mut desc) = resolve(transport, authorizer, ctx, scope)?;
    log::debug!("Resolved: {:?}", desc);
    if let Some(digest) = &request.digest {
        desc.digest = digest.clone();
        desc.media_type = request.media_type.clone();
    } else if request.media_type.is_some() {
        desc.media_type = request.media_type.clone();
    }

    let mut attempt = FetchAttempt::First;
    let (actual, size) = loop {
        match transport.fetch(&ctx, authorizer, &desc) {
            Ok(mut reader) => {
                let mut hashing = HashingWriter::new(&mut sink);
                io::copy(&mut reader, &mut hashing)?;
                let (_, actual, size) = hashing.finish();
                break (actual, size);
            }
            Err(e)
                if e.is_not_found()
                    && request.media_type.is_none()
                    && attempt == FetchAttempt::First =>
            {
                log::debug!("{} not found, retry as manifest", desc.digest);
                desc.media_type = Some(media_types::image_manifest());
                attempt = FetchAttempt::AsManifest;
            }
            Err(e) => return Err(e),
        }
    };
    sink.flush()?;

    if actual != desc.digest {
        return Err(Error::DigestMismatch {
            expected: desc.digest,
            actual,
        });
    }
    authorizer.record(AuthOutcome::Granted);
    desc.size = size;
    Ok(desc)
}

/// Resolve the reference, returning the context the registry accepted
fn resolve<T, S, P>(
    transport: &mut T,
    authorizer: &mut Authorizer<S, P>,
    ctx: &RequestContext,
    scope: &Scope,
) -> Result<(RequestContext, Descriptor)>
where
    T: Transport + ?Sized,
    S: CredentialStore,
    P: Prompt,
{
    let mut ctx = ctx.clone();
    let mut state = ResolveState::Initial;
    loop {
        match transport.resolve(&ctx, authorizer) {
            Ok(desc) => return Ok((ctx, desc)),
            Err(e) if e.is_unauthorized() => {
                state = match state {
                    ResolveState::Initial => {
                        authorizer.expect_rejection();
                        ResolveState::ForcedAuth
                    }
                    ResolveState::ForcedAuth => {
                        ctx = ctx.with_scope(scope.clone());
                        ResolveState::Scoped
                    }
                    ResolveState::Scoped => return Err(e),
                };
                log::debug!("Resolve rejected, retry in {:?}", state);
            }
            Err(e) => return Err(e),
        }
    }
}
