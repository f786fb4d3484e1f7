//! Paths and options shared by the library and the CLI

use std::path::PathBuf;

pub const PROJECT_NAME: &str = "ocicat";

/// Host under which Docker Hub credentials are stored
pub const DOCKER_HUB_HOST: &str = "index.docker.io";

/// Authentication info stored for ocicat itself
///
/// Located in `$XDG_RUNTIME_DIR/ocicat/auth.json`, or `~/.ocicat/config.json`
/// when the system does not provide a runtime directory.
pub fn auth_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", PROJECT_NAME)
        .and_then(|dirs| Some(dirs.runtime_dir()?.join("auth.json")))
        .or_else(|| {
            // Most of container does not set XDG_RUNTIME_DIR,
            // and then this fallback to `~/.ocicat/config.json` like docker.
            let dirs = directories::BaseDirs::new()?;
            Some(dirs.home_dir().join(format!(".{}/config.json", PROJECT_NAME)))
        })
}

/// Switches given on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Access registries other than `localhost` by plain HTTP
    pub allow_http: bool,
    /// The reference is a docker plugin, use `repository(plugin)` scope
    pub plugin: bool,
    pub debug: bool,
}

impl Options {
    pub fn log_level(&self) -> log::LevelFilter {
        if self.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }
}
