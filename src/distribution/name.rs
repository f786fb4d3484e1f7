use crate::error::*;
use regex::Regex;
use std::fmt;

/// Longest repository name docker accepts, including the `/` separators
const MAX_NAME_LEN: usize = 255;

lazy_static::lazy_static! {
    static ref COMPONENT_RE: Regex = Regex::new(r"^[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*$").unwrap();
}

/// Repository path on a registry, e.g. `library/alpine` or `termoshtt/ocicat`
///
/// Each `/`-separated component is lower-case alphanumerics joined by `.`, `_`, `__` or
/// runs of `-`, following [the OCI distribution spec](https://github.com/opencontainers/distribution-spec/blob/v1.1.0/spec.md#pulling-manifests).
/// The host is never a part of the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name(String);

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Name {
    pub fn new(name: &str) -> Result<Self> {
        let valid = name.len() <= MAX_NAME_LEN
            && name.split('/').all(|component| COMPONENT_RE.is_match(component));
        if valid {
            Ok(Name(name.to_string()))
        } else {
            Err(Error::InvalidName(name.to_string()))
        }
    }
}
