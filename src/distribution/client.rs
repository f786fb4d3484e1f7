use super::{
    auth::Token, AuthChallenge, Authorize, BlobWriter, CancelToken, Credential, Name, Reference,
    RequestContext, Scope, Transport,
};
use crate::{digest::HashingWriter, error::*, media_types, Descriptor, Digest, ImageName};
use oci_spec::image::MediaType;
use std::io::{self, Read, Write};
use url::Url;

/// A client for `/v2/<name>/` API endpoint
pub struct Client {
    agent: ureq::Agent,
    /// URL to registry server
    url: Url,
    /// Registry host with port, to look up credentials
    host: String,
    /// Name of repository
    name: Name,
    /// Tag or digest to be resolved, and where a pushed manifest is put
    reference: Reference,
    /// Cached value of `Authorization` header
    authorization: Option<String>,
}

impl Client {
    pub fn new(url: Url, host: &str, name: Name, reference: Reference) -> Self {
        Client {
            agent: ureq::Agent::new(),
            url,
            host: host.to_string(),
            name,
            reference,
            authorization: None,
        }
    }

    pub fn from_image_name(image: &ImageName, allow_http: bool) -> Result<Self> {
        Ok(Self::new(
            image.registry_url(allow_http)?,
            &image.host(),
            image.name.clone(),
            image.reference.clone(),
        ))
    }

    fn get(&self, url: &Url) -> ureq::Request {
        log::debug!("GET {}", url);
        self.agent.get(url.as_str())
    }

    fn head(&self, url: &Url) -> ureq::Request {
        log::debug!("HEAD {}", url);
        self.agent.head(url.as_str())
    }

    fn put(&self, url: &Url) -> ureq::Request {
        log::debug!("PUT {}", url);
        self.agent.put(url.as_str())
    }

    fn post(&self, url: &Url) -> ureq::Request {
        log::debug!("POST {}", url);
        self.agent.post(url.as_str())
    }

    fn authorized(&self, req: ureq::Request) -> ureq::Request {
        match &self.authorization {
            Some(value) => req.set("Authorization", value),
            None => req,
        }
    }

    /// Scope for push requests when the context does not specify one
    fn push_scope(&self, ctx: &RequestContext) -> String {
        ctx.scope
            .clone()
            .unwrap_or_else(|| Scope {
                repository: self.name.clone(),
                plugin: false,
            })
            .to_string()
    }

    /// Send a request, answering an authentication challenge once
    ///
    /// `scope` overrides the scope requested from the token server. The context's scope,
    /// if any, takes precedence over it.
    fn call(
        &mut self,
        ctx: &RequestContext,
        auth: &mut dyn Authorize,
        url: &Url,
        req: ureq::Request,
        scope: Option<String>,
    ) -> Result<ureq::Response> {
        ctx.check_cancelled()?;
        let challenge = match self.authorized(req.clone()).call() {
            Ok(res) => return Ok(res),
            Err(ureq::Error::Status(401, res)) => match res.header("WWW-Authenticate") {
                Some(header) => AuthChallenge::from_header(header)?,
                // Nothing to answer, the registry just rejects
                None => return Err(Error::Unauthorized(url.clone())),
            },
            Err(e) => return Err(status_error(e, url)),
        };

        let scope = ctx.scope.as_ref().map(|s| s.to_string()).or(scope);
        self.authorization = Some(self.challenge(ctx, auth, url, &challenge, scope)?);

        ctx.check_cancelled()?;
        log::debug!("Retry with authorization: {}", url);
        self.authorized(req).call().map_err(|e| status_error(e, url))
    }

    /// Get the value of `Authorization` header based on WWW-Authentication header
    fn challenge(
        &self,
        ctx: &RequestContext,
        auth: &mut dyn Authorize,
        url: &Url,
        challenge: &AuthChallenge,
        scope: Option<String>,
    ) -> Result<String> {
        let cred = auth.credentials(&self.host)?;
        match challenge {
            AuthChallenge::Basic => {
                if cred.is_absent() {
                    return Err(Error::Unauthorized(url.clone()));
                }
                Ok(format!("Basic {}", basic_octet(&cred)))
            }
            AuthChallenge::Bearer {
                url: realm,
                service,
                scope: challenged,
            } => {
                let token_url = Url::parse(realm)?;
                ctx.check_cancelled()?;
                let mut req = self.get(&token_url).set("Accept", "application/json");
                if !cred.is_absent() {
                    req = req.set("Authorization", &format!("Basic {}", basic_octet(&cred)));
                }
                if let Some(service) = service {
                    req = req.query("service", service);
                }
                if let Some(scope) = scope.as_ref().or(challenged.as_ref()) {
                    log::debug!("Request token for {}", scope);
                    req = req.query("scope", scope);
                }
                match req.call() {
                    Ok(res) => match res.into_json::<Token>()?.into_token() {
                        Some(token) => Ok(format!("Bearer {}", token)),
                        None => Err(Error::Unauthorized(token_url)),
                    },
                    Err(ureq::Error::Status(..)) => Err(Error::Unauthorized(token_url)),
                    Err(ureq::Error::Transport(e)) => Err(Error::NetworkError(e.into())),
                }
            }
        }
    }

    /// `Err(AlreadyExists)` if the registry answers to HEAD of `url`
    fn ensure_absent(
        &mut self,
        ctx: &RequestContext,
        auth: &mut dyn Authorize,
        url: &Url,
        digest: &Digest,
        scope: String,
    ) -> Result<()> {
        let req = self.head(url);
        match self.call(ctx, auth, url, req, Some(scope)) {
            Ok(_) => Err(Error::AlreadyExists(digest.clone())),
            Err(Error::BlobNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn manifest_url(&self, reference: &str) -> Result<Url> {
        Ok(self
            .url
            .join(&format!("/v2/{}/manifests/{}", self.name, reference))?)
    }

    fn blob_url(&self, digest: &Digest) -> Result<Url> {
        Ok(self
            .url
            .join(&format!("/v2/{}/blobs/{}", self.name, digest))?)
    }
}

impl Transport for Client {
    /// Get descriptor of manifest for the reference
    ///
    /// ```text
    /// HEAD /v2/<name>/manifests/<reference>
    /// ```
    ///
    /// Falls back to `GET` and hashes the manifest when the registry omits
    /// `Docker-Content-Digest` or `Content-Length`.
    ///
    /// See [corresponding OCI distribution spec document](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#checking-if-content-exists-in-the-registry) for detail.
    fn resolve(&mut self, ctx: &RequestContext, auth: &mut dyn Authorize) -> Result<Descriptor> {
        let url = self.manifest_url(&self.reference.to_string())?;
        let req = self.head(&url).set("Accept", &media_types::manifest_accept());
        let res = self.call(ctx, auth, &url, req, None)?;
        let media_type = content_type(&res);
        let size = res
            .header("Content-Length")
            .and_then(|len| len.parse::<u64>().ok());
        let digest = match (self.reference.digest(), res.header("Docker-Content-Digest")) {
            (Some(digest), _) => Some(digest.clone()),
            (None, Some(header)) => Some(Digest::new(header)?),
            (None, None) => None,
        };
        if let (Some(digest), Some(size)) = (digest, size) {
            return Ok(Descriptor {
                media_type,
                digest,
                size,
            });
        }

        let req = self.get(&url).set("Accept", &media_types::manifest_accept());
        let res = self.call(ctx, auth, &url, req, None)?;
        let media_type = content_type(&res);
        let mut hashing = HashingWriter::new(io::sink());
        io::copy(&mut res.into_reader(), &mut hashing)?;
        let (_, digest, size) = hashing.finish();
        Ok(Descriptor {
            media_type,
            digest,
            size,
        })
    }

    /// Get manifest or blob for given descriptor
    ///
    /// ```text
    /// GET /v2/<name>/manifests/<digest>
    /// GET /v2/<name>/blobs/<digest>
    /// ```
    ///
    /// Descriptors without media type are fetched as blobs.
    ///
    /// See [corresponding OCI distribution spec document](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#pulling-blobs) for detail.
    fn fetch(
        &mut self,
        ctx: &RequestContext,
        auth: &mut dyn Authorize,
        desc: &Descriptor,
    ) -> Result<Box<dyn Read + '_>> {
        let (url, accept) = match &desc.media_type {
            Some(ty) if media_types::is_manifest(ty) => {
                (self.manifest_url(&desc.digest.to_string())?, Some(ty.to_string()))
            }
            _ => (self.blob_url(&desc.digest)?, None),
        };
        let mut req = self.get(&url);
        if let Some(accept) = accept {
            req = req.set("Accept", &accept);
        }
        let res = self.call(ctx, auth, &url, req, None)?;
        Ok(Box::new(res.into_reader()))
    }

    /// Open an upload of manifest or blob
    ///
    /// ```text
    /// PUT /v2/<name>/manifests/<reference>
    /// ```
    ///
    /// for manifests, and
    ///
    /// ```text
    /// POST /v2/<name>/blobs/uploads/
    /// ```
    ///
    /// and following `PUT` to URL obtained by `POST` for blobs.
    /// The `PUT` is sent at [BlobWriter::commit].
    ///
    /// See [corresponding OCI distribution spec document](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#push) for detail.
    fn push(
        &mut self,
        ctx: &RequestContext,
        auth: &mut dyn Authorize,
        desc: &Descriptor,
    ) -> Result<Box<dyn BlobWriter + '_>> {
        let media_type = desc
            .media_type
            .clone()
            .ok_or(Error::UndeterminedMediaType)?;
        let scope = self.push_scope(ctx);

        if media_types::is_manifest(&media_type) {
            let exists = self.manifest_url(&desc.digest.to_string())?;
            self.ensure_absent(ctx, auth, &exists, &desc.digest, scope)?;
            let url = self.manifest_url(&self.reference.to_string())?;
            return Ok(Box::new(Upload::new(
                self,
                ctx.cancel.clone(),
                url,
                UploadKind::Manifest(media_type),
            )));
        }

        let exists = self.blob_url(&desc.digest)?;
        self.ensure_absent(ctx, auth, &exists, &desc.digest, scope.clone())?;
        let url = self
            .url
            .join(&format!("/v2/{}/blobs/uploads/", self.name))?;
        let req = self.post(&url);
        let res = self.call(ctx, auth, &url, req, Some(scope))?;
        let loc = res.header("Location").ok_or_else(|| Error::MissingHeader {
            header: "Location",
            url: url.clone(),
        })?;
        let location = Url::parse(loc).or_else(|_| self.url.join(loc))?;
        Ok(Box::new(Upload::new(
            self,
            ctx.cancel.clone(),
            location,
            UploadKind::Blob,
        )))
    }
}

enum UploadKind {
    Blob,
    Manifest(MediaType),
}

/// Content is kept in memory and sent by a single `PUT` at commit
struct Upload<'a> {
    client: &'a Client,
    cancel: CancelToken,
    url: Url,
    kind: UploadKind,
    buffer: HashingWriter<Vec<u8>>,
}

impl<'a> Upload<'a> {
    fn new(client: &'a Client, cancel: CancelToken, url: Url, kind: UploadKind) -> Self {
        Upload {
            client,
            cancel,
            url,
            kind,
            buffer: HashingWriter::new(Vec::new()),
        }
    }
}

impl Write for Upload<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.buffer.flush()
    }
}

impl BlobWriter for Upload<'_> {
    fn commit(self: Box<Self>, size: u64, digest: &Digest) -> Result<()> {
        let Upload {
            client,
            cancel,
            url,
            kind,
            buffer,
        } = *self;
        let (buf, actual, actual_size) = buffer.finish();
        if actual_size != size || actual != *digest {
            return Err(Error::CommitMismatch {
                expected: digest.clone(),
                expected_size: size,
                actual,
                actual_size,
            });
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let req = match kind {
            UploadKind::Blob => client
                .put(&url)
                .query("digest", &digest.to_string())
                .set("Content-Type", "application/octet-stream"),
            UploadKind::Manifest(ty) => client.put(&url).set("Content-Type", &ty.to_string()),
        };
        // Authorization must be done while opening the upload
        let res = client
            .authorized(req)
            .send_bytes(&buf)
            .map_err(|e| status_error(e, &url))?;
        log::info!(
            "Pushed {} to {}",
            digest,
            res.header("Location").unwrap_or_else(|| url.as_str())
        );
        Ok(())
    }
}

fn basic_octet(cred: &Credential) -> String {
    base64::encode(format!("{}:{}", cred.username, cred.password))
}

/// `Content-Type` without parameters
fn content_type(res: &ureq::Response) -> Option<MediaType> {
    let ty = res.header("Content-Type")?;
    let ty = ty.split(';').next().unwrap_or(ty).trim();
    if ty.is_empty() {
        None
    } else {
        Some(MediaType::from(ty))
    }
}

/// Classify error statuses the transfer workflow reacts to
fn status_error(e: ureq::Error, url: &Url) -> Error {
    match e {
        ureq::Error::Status(401, _) | ureq::Error::Status(403, _) => {
            Error::Unauthorized(url.clone())
        }
        ureq::Error::Status(404, _) => Error::BlobNotFound(url.clone()),
        e => e.into(),
    }
}
