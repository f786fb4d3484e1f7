use super::{Authorize, Credential, CredentialStore, StoredAuth};
use crate::{config, error::*};
use std::io::{self, Write};

/// Result of the last authorization attempt, recorded by the transfer workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted,
    InvalidAuthorization,
}

/// How credentials are asked to the user
pub trait Prompt {
    /// Whether asking would reach a user. Never ask when this is false.
    fn is_interactive(&self) -> bool;
    fn ask(&self, host: &str) -> Result<Credential>;
}

/// Ask on the terminal: username from stdin, password without echo from the terminal device
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn is_interactive(&self) -> bool {
        atty::is(atty::Stream::Stdin)
    }

    fn ask(&self, host: &str) -> Result<Credential> {
        log::info!("Login to {}", host);
        let mut stderr = io::stderr();
        write!(stderr, "Username: ")?;
        stderr.flush()?;
        let mut username = String::new();
        io::stdin().read_line(&mut username)?;

        let password = dialoguer::Password::new()
            .with_prompt("Password")
            .allow_empty_password(true)
            .interact()?;
        Ok(Credential::new(
            username.trim_end_matches(&['\r', '\n'][..]),
            &password,
        ))
    }
}

/// Never asks, e.g. in CI
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl Prompt for NoPrompt {
    fn is_interactive(&self) -> bool {
        false
    }

    fn ask(&self, _host: &str) -> Result<Credential> {
        Ok(Credential::absent())
    }
}

/// Registry host under which credentials of `host` are stored
///
/// ```
/// use ocicat::distribution::canonical_host;
///
/// assert_eq!(canonical_host("docker.io"), "index.docker.io");
/// assert_eq!(canonical_host("registry-1.docker.io"), "index.docker.io");
/// assert_eq!(canonical_host("ghcr.io"), "ghcr.io");
/// ```
pub fn canonical_host(host: &str) -> &str {
    match host {
        "docker.io" | "registry-1.docker.io" | config::DOCKER_HUB_HOST => config::DOCKER_HUB_HOST,
        _ => host,
    }
}

/// Decides which credential to answer for each authentication challenge
///
/// Requests go anonymous first, since public content does not need credentials.
/// Only after the registry rejected a request, i.e. [AuthOutcome::InvalidAuthorization]
/// is recorded, the user is asked, at most once per authorizer. Credentials found in
/// the store or entered by the user are kept for the rest of the process.
pub struct Authorizer<S = StoredAuth, P = TerminalPrompt> {
    store: S,
    prompt: P,
    cached: Option<Credential>,
    last_outcome: Option<AuthOutcome>,
}

impl Authorizer {
    /// Authorizer using docker/podman/ocicat auth files and the terminal
    pub fn from_env() -> Self {
        Self::new(StoredAuth::load_all(), TerminalPrompt)
    }
}

impl<S: CredentialStore, P: Prompt> Authorizer<S, P> {
    pub fn new(store: S, prompt: P) -> Self {
        Authorizer {
            store,
            prompt,
            cached: None,
            last_outcome: None,
        }
    }

    pub fn record(&mut self, outcome: AuthOutcome) {
        log::debug!("Authorization outcome: {:?}", outcome);
        self.last_outcome = Some(outcome);
    }

    /// Ask for credentials at the next challenge without waiting for a rejection
    pub fn expect_rejection(&mut self) {
        self.record(AuthOutcome::InvalidAuthorization);
    }

    pub fn last_outcome(&self) -> Option<AuthOutcome> {
        self.last_outcome
    }

    pub fn cached(&self) -> Option<&Credential> {
        self.cached.as_ref()
    }
}

impl<S: CredentialStore, P: Prompt> Authorize for Authorizer<S, P> {
    fn credentials(&mut self, host: &str) -> Result<Credential> {
        if let Some(cred) = &self.cached {
            return Ok(cred.clone());
        }

        let host = canonical_host(host);
        if let Some(cred) = self.store.get(host)? {
            if !cred.is_absent() {
                log::debug!("Use stored credential for {}", host);
                self.cached = Some(cred.clone());
                return Ok(cred);
            }
        }

        if self.last_outcome != Some(AuthOutcome::InvalidAuthorization) {
            log::debug!("Try {} anonymously", host);
            return Ok(Credential::absent());
        }

        if !self.prompt.is_interactive() {
            log::debug!("No terminal to ask credential for {}", host);
            return Ok(Credential::absent());
        }

        self.last_outcome = None;
        let cred = self.prompt.ask(host)?;
        self.cached = Some(cred.clone());
        Ok(cred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Authorize;
    use maplit::hashmap;
    use std::{cell::Cell, collections::HashMap};

    fn no_store() -> HashMap<&'static str, Credential> {
        HashMap::new()
    }

    impl CredentialStore for HashMap<&str, Credential> {
        fn get(&self, host: &str) -> Result<Option<Credential>> {
            Ok(self.get(host).cloned())
        }
    }

    /// Answers a fixed credential and counts how many times it is asked
    struct Scripted {
        interactive: bool,
        answer: Credential,
        asked: Cell<usize>,
    }

    impl Scripted {
        fn new(interactive: bool) -> Self {
            Scripted {
                interactive,
                answer: Credential::new("octocat", "hunter2"),
                asked: Cell::new(0),
            }
        }
    }

    impl Prompt for &Scripted {
        fn is_interactive(&self) -> bool {
            self.interactive
        }

        fn ask(&self, _host: &str) -> Result<Credential> {
            self.asked.set(self.asked.get() + 1);
            Ok(self.answer.clone())
        }
    }

    #[test]
    fn anonymous_then_prompt_then_cached() -> Result<()> {
        let prompt = Scripted::new(true);
        let mut auth = Authorizer::new(no_store(), &prompt);

        // Not rejected yet
        assert_eq!(auth.credentials("registry.example.com")?, Credential::absent());
        assert_eq!(prompt.asked.get(), 0);

        auth.record(AuthOutcome::InvalidAuthorization);
        assert_eq!(
            auth.credentials("registry.example.com")?,
            Credential::new("octocat", "hunter2")
        );
        assert_eq!(prompt.asked.get(), 1);
        assert_eq!(auth.last_outcome(), None);

        // Even after another rejection, the cached one is answered
        auth.record(AuthOutcome::InvalidAuthorization);
        assert_eq!(
            auth.credentials("registry.example.com")?,
            Credential::new("octocat", "hunter2")
        );
        assert_eq!(prompt.asked.get(), 1);
        Ok(())
    }

    #[test]
    fn stored_credential_first() -> Result<()> {
        let prompt = Scripted::new(true);
        let store = hashmap! {
            "index.docker.io" => Credential::new("whale", "secret"),
        };
        let mut auth = Authorizer::new(store, &prompt);
        auth.expect_rejection();
        assert_eq!(
            auth.credentials("docker.io")?,
            Credential::new("whale", "secret")
        );
        assert_eq!(auth.cached(), Some(&Credential::new("whale", "secret")));
        assert_eq!(prompt.asked.get(), 0);
        Ok(())
    }

    #[test]
    fn empty_stored_password_is_absent() -> Result<()> {
        let prompt = Scripted::new(true);
        let store = hashmap! { "empty.example.com" => Credential::new("user", "") };
        let mut auth = Authorizer::new(store, &prompt);
        assert_eq!(auth.credentials("empty.example.com")?, Credential::absent());
        assert!(auth.cached().is_none());

        auth.expect_rejection();
        assert_eq!(
            auth.credentials("empty.example.com")?,
            Credential::new("octocat", "hunter2")
        );
        assert_eq!(prompt.asked.get(), 1);
        Ok(())
    }

    #[test]
    fn never_prompt_without_terminal() -> Result<()> {
        let prompt = Scripted::new(false);
        let mut auth = Authorizer::new(no_store(), &prompt);
        auth.expect_rejection();
        assert_eq!(auth.credentials("registry.example.com")?, Credential::absent());
        assert_eq!(prompt.asked.get(), 0);
        // Stay rejected, nothing is cached
        assert_eq!(auth.last_outcome(), Some(AuthOutcome::InvalidAuthorization));
        assert!(auth.cached().is_none());

        let mut auth = Authorizer::new(no_store(), NoPrompt);
        auth.expect_rejection();
        assert_eq!(auth.credentials("registry.example.com")?, Credential::absent());
        Ok(())
    }

    #[test]
    fn canonical() {
        assert_eq!(canonical_host("index.docker.io"), "index.docker.io");
        assert_eq!(canonical_host("localhost:5000"), "localhost:5000");
    }
}
