use crate::{config, error::*};
use serde::Deserialize;
use std::{collections::HashMap, fmt, fs, io, path::*};

/// Username and password for a registry
///
/// A credential without password is regarded as absent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credential {
    pub fn new(username: &str, password: &str) -> Self {
        Credential {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// `("", "")`, i.e. access anonymously
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_absent(&self) -> bool {
        self.password.is_empty()
    }
}

/// Lookup of credentials saved outside of this process
pub trait CredentialStore {
    /// `host` is already canonicalized, see [crate::distribution::canonical_host]
    fn get(&self, host: &str) -> Result<Option<Credential>>;
}

/// Authentication info stored in filesystem
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoredAuth {
    #[serde(default)]
    auths: HashMap<String, Auth>,
}

impl StoredAuth {
    /// Load authentication info with docker and podman setting
    ///
    /// Entries of later files overwrite earlier ones: docker, podman, then ocicat's own.
    pub fn load_all() -> Self {
        let paths = [docker_auth_path(), podman_auth_path(), config::auth_path()];
        Self::load_paths(paths.into_iter().flatten())
    }

    /// Merge auth files in order. A broken file never prevents anonymous access,
    /// so it is skipped with a warning.
    fn load_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut auth = StoredAuth::default();
        for path in paths {
            match Self::from_path(&path) {
                Ok(new) => auth.append(new),
                Err(e) => log::warn!("Skip unreadable auth file {}: {}", path.display(), e),
            }
        }
        auth
    }

    fn append(&mut self, other: Self) {
        self.auths.extend(other.auths);
    }

    fn from_path(path: &Path) -> Result<Self> {
        if path.is_file() {
            let f = fs::File::open(path)?;
            Ok(serde_json::from_reader(io::BufReader::new(f))?)
        } else {
            Ok(Self::default())
        }
    }

    fn lookup(&self, host: &str) -> Option<&Auth> {
        let mut keys = vec![
            host.to_string(),
            format!("https://{}", host),
            format!("http://{}", host),
        ];
        if host == config::DOCKER_HUB_HOST {
            // docker login still writes this legacy key for Docker Hub
            keys.push(format!("https://{}/v1/", host));
        }
        keys.iter().find_map(|key| self.auths.get(key))
    }
}

impl CredentialStore for StoredAuth {
    fn get(&self, host: &str) -> Result<Option<Credential>> {
        let octet = match self.lookup(host).and_then(|auth| auth.auth.as_ref()) {
            Some(octet) => octet,
            None => return Ok(None),
        };
        let decoded = base64::decode(octet)
            .ok()
            .and_then(|buf| String::from_utf8(buf).ok());
        match decoded.as_deref().and_then(|s| s.split_once(':')) {
            Some((username, password)) => Ok(Some(Credential::new(username, password))),
            None => {
                log::warn!("Malformed stored credential for {}", host);
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Auth {
    /// base64 encoded `username:password`. Entries using credential helpers lack this.
    #[serde(default)]
    auth: Option<String>,
}

fn docker_auth_path() -> Option<PathBuf> {
    let dirs = directories::BaseDirs::new()?;
    Some(dirs.home_dir().join(".docker/config.json"))
}

fn podman_auth_path() -> Option<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "containers")?;
    Some(dirs.runtime_dir()?.join("auth.json"))
}

/// WWW-Authentication challenge
///
/// ```
/// use ocicat::distribution::AuthChallenge;
///
/// let auth = AuthChallenge::from_header(
///   r#"Bearer realm="https://ghcr.io/token",service="ghcr.io",scope="repository:termoshtt/ocicat/rust-lib:pull""#,
/// ).unwrap();
///
/// assert_eq!(auth, AuthChallenge::Bearer {
///   url: "https://ghcr.io/token".to_string(),
///   service: Some("ghcr.io".to_string()),
///   scope: Some("repository:termoshtt/ocicat/rust-lib:pull".to_string()),
/// });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChallenge {
    Bearer {
        url: String,
        service: Option<String>,
        scope: Option<String>,
    },
    Basic,
}

impl AuthChallenge {
    pub fn from_header(header: &str) -> Result<Self> {
        let err = || Error::UnSupportedAuthHeader(header.to_string());
        let (ty, realm) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
        if ty.eq_ignore_ascii_case("basic") {
            return Ok(AuthChallenge::Basic);
        }
        if !ty.eq_ignore_ascii_case("bearer") {
            return Err(err());
        }

        let mut url = None;
        let mut service = None;
        let mut scope = None;
        for param in split_params(realm) {
            let (key, value) = param.split_once('=').ok_or_else(err)?;
            let value = value.trim().trim_matches('"').to_string();
            match key.trim() {
                "realm" => url = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => continue,
            }
        }
        Ok(AuthChallenge::Bearer {
            url: url.ok_or_else(err)?,
            service,
            scope,
        })
    }
}

/// Split `k1="v1",k2="v2"` by commas outside of quotes
///
/// Scopes like `repository:a:pull,push` contain commas.
fn split_params(params: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quote = false;
    let mut start = 0;
    for (i, c) in params.char_indices() {
        match c {
            '"' => in_quote = !in_quote,
            ',' if !in_quote => {
                out.push(&params[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < params.len() {
        out.push(&params[start..]);
    }
    out.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

/// Response of token server
///
/// Docker Hub returns both fields, OAuth2 style servers only `access_token`.
#[derive(Deserialize)]
pub(crate) struct Token {
    token: Option<String>,
    access_token: Option<String>,
}

impl Token {
    pub(crate) fn into_token(self) -> Option<String> {
        self.token.or(self.access_token)
    }
}
