use crate::{
    distribution::{Name, Reference},
    error::*,
    Digest,
};
use std::fmt;
use url::Url;

const DEFAULT_HOSTNAME: &str = "docker.io";
/// Host actually serving the `/v2/` API of Docker Hub
const DOCKER_HUB_API: &str = "registry-1.docker.io";

/// Image name
///
/// ```text
/// [hostname[:port]/]name[:tag][@digest]
/// ```
///
/// The first path component is a hostname only when it contains `.` or `:`,
/// or is `localhost`, as in docker. Otherwise the image lives on Docker Hub,
/// where single-component names belong to `library/`.
///
/// ```
/// use ocicat::{distribution::{Name, Reference}, ImageName};
///
/// let name = ImageName::parse("ghcr.io/termoshtt/ocicat/testing:v1")?;
/// assert_eq!(name.hostname, "ghcr.io");
/// assert_eq!(name.name, Name::new("termoshtt/ocicat/testing")?);
/// assert_eq!(name.reference, Reference::new("v1")?);
/// # Ok::<(), ocicat::error::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageName {
    pub hostname: String,
    pub port: Option<u16>,
    pub name: Name,
    pub reference: Reference,
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = match self.reference {
            Reference::Tag(_) => ':',
            Reference::Digest(_) => '@',
        };
        write!(f, "{}/{}{}{}", self.host(), self.name, separator, self.reference)
    }
}

impl ImageName {
    pub fn parse(name: &str) -> Result<Self> {
        let (name, digest) = match name.split_once('@') {
            Some((name, digest)) => (name, Some(Digest::new(digest)?)),
            None => (name, None),
        };

        let (hostname, port, name) = match name.split_once('/') {
            Some((host, rest)) if host.contains('.') || host.contains(':') || host == "localhost" => {
                let (hostname, port) = match host.split_once(':') {
                    Some((hostname, port)) => (hostname, Some(str::parse(port)?)),
                    None => (host, None),
                };
                (hostname.to_string(), port, rest.to_string())
            }
            _ => (DEFAULT_HOSTNAME.to_string(), None, name.to_string()),
        };
        let name = if hostname == DEFAULT_HOSTNAME && !name.contains('/') {
            format!("library/{}", name)
        } else {
            name
        };

        // A tag is after the last path component
        let (name, tag) = match name.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => (name.to_string(), Some(tag.to_string())),
            _ => (name.clone(), None),
        };
        let reference = match (digest, tag) {
            (Some(digest), _) => Reference::Digest(digest),
            (None, Some(tag)) => Reference::new(&tag)?,
            (None, None) => Reference::new("latest")?,
        };

        Ok(ImageName {
            hostname,
            port,
            name: Name::new(&name)?,
            reference,
        })
    }

    /// Host with port, as written in the image name
    pub fn host(&self) -> String {
        if let Some(port) = self.port {
            format!("{}:{}", self.hostname, port)
        } else {
            self.hostname.clone()
        }
    }

    /// URL of the registry API server
    ///
    /// `localhost` is always accessed by HTTP, other hosts only when `allow_http` is set.
    pub fn registry_url(&self, allow_http: bool) -> Result<Url> {
        let host = if self.hostname == DEFAULT_HOSTNAME {
            DOCKER_HUB_API.to_string()
        } else {
            self.host()
        };
        let scheme = if allow_http || self.hostname == "localhost" {
            "http"
        } else {
            "https"
        };
        Ok(Url::parse(&format!("{}://{}", scheme, host))?)
    }
}
