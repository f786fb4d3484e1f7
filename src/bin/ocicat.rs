use clap::Parser;
use oci_spec::image::MediaType;
use ocicat::{
    config::Options,
    distribution::{Authorizer, Client, RequestContext, Scope},
    error::*,
    media_types,
    transfer::{self, FetchRequest, PushOutcome},
    Descriptor, Digest, ImageName,
};
use std::{io, panic::Location, path::PathBuf, process};

/// Push a local file to, or fetch content from, an OCI registry
///
/// Fetched content is written to stdout.
#[derive(Debug, Parser)]
#[clap(version)]
struct Opt {
    /// Access the registry by plain HTTP. `localhost` always uses HTTP.
    #[clap(long)]
    allow_http: bool,

    /// Show debug log
    #[clap(long)]
    debug: bool,

    /// The reference is a docker plugin
    #[clap(long)]
    plugin: bool,

    /// Image reference, e.g. `ghcr.io/owner/repo:tag` or `alpine@sha256:...`
    reference: String,

    /// File to push, digest to fetch, or media type of the manifest to fetch
    target: Option<String>,

    /// Media type of the file to push or the digest to fetch
    media_type: Option<String>,
}

impl Opt {
    fn options(&self) -> Options {
        Options {
            allow_http: self.allow_http,
            plugin: self.plugin,
            debug: self.debug,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Push {
        path: PathBuf,
        media_type: Option<String>,
    },
    Fetch(FetchRequest),
}

impl Command {
    fn new(target: Option<&str>, media_type: Option<&str>) -> Result<Self> {
        let target = match target {
            Some(target) => target,
            None => {
                return Ok(Command::Fetch(FetchRequest {
                    digest: None,
                    media_type: media_type.map(MediaType::from),
                }))
            }
        };

        let path = PathBuf::from(target);
        if path.exists() {
            return Ok(Command::Push {
                path,
                media_type: media_type.map(str::to_string),
            });
        }
        if let Ok(digest) = Digest::new(target) {
            return Ok(Command::Fetch(FetchRequest {
                digest: Some(digest),
                media_type: media_type.map(MediaType::from),
            }));
        }
        if media_types::looks_like_media_type(target) {
            if let Some(ignored) = media_type {
                log::warn!("Media type {} is given twice, ignore {}", target, ignored);
            }
            return Ok(Command::Fetch(FetchRequest {
                digest: None,
                media_type: Some(MediaType::from(target)),
            }));
        }
        Err(Error::NotFound(path))
    }
}

/// Exit with the message and where it was reported
#[track_caller]
fn check<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            let loc = Location::caller();
            eprintln!("{}:{} {}", loc.file(), loc.line(), e);
            process::exit(1);
        }
    }
}

fn main() {
    let opt = Opt::parse();
    let options = opt.options();
    env_logger::Builder::new()
        .filter_level(options.log_level())
        .parse_default_env()
        .init();

    let image = check(ImageName::parse(&opt.reference));
    let command = check(Command::new(
        opt.target.as_deref(),
        opt.media_type.as_deref(),
    ));
    let scope = Scope::new(&image, options.plugin);
    let mut client = check(Client::from_image_name(&image, options.allow_http));
    let mut authorizer = Authorizer::from_env();
    let ctx = RequestContext::default();

    match command {
        Command::Push { path, media_type } => {
            let (f, desc) = check(Descriptor::from_file(&path, media_type.as_deref()));
            if let Some(ty) = &desc.media_type {
                println!("Type: {}", ty);
            }
            println!("Size: {}", desc.size);
            println!("Digest: {}", desc.digest);
            match check(transfer::push(
                &mut client,
                &mut authorizer,
                &ctx,
                &scope,
                &desc,
                f,
            )) {
                PushOutcome::Uploaded(size) => {
                    log::info!("Pushed {} bytes to {}", size, image)
                }
                PushOutcome::AlreadyExists => {
                    log::info!("{} already exists in {}", desc.digest, image)
                }
            }
        }
        Command::Fetch(request) => {
            let stdout = io::stdout();
            let sink = io::BufWriter::new(stdout.lock());
            let desc = check(transfer::fetch(
                &mut client,
                &mut authorizer,
                &ctx,
                &scope,
                &request,
                sink,
            ));
            log::debug!("Fetched {:?}", desc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_commands() -> Result<()> {
        assert_eq!(
            Command::new(None, None)?,
            Command::Fetch(FetchRequest::default())
        );

        let digest = Digest::from_buf_sha256(b"manifest");
        assert_eq!(
            Command::new(Some(&digest.to_string()), Some("application/octet-stream"))?,
            Command::Fetch(FetchRequest {
                digest: Some(digest),
                media_type: Some(MediaType::from("application/octet-stream")),
            })
        );

        assert_eq!(
            Command::new(Some("application/vnd.oci.image.index.v1+json"), None)?,
            Command::Fetch(FetchRequest {
                digest: None,
                media_type: Some(MediaType::ImageIndex),
            })
        );
        Ok(())
    }

    #[test]
    fn push_command() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        assert_eq!(
            Command::new(file.path().to_str(), Some("application/octet-stream"))?,
            Command::Push {
                path: file.path().to_owned(),
                media_type: Some("application/octet-stream".to_string()),
            }
        );
        assert!(matches!(
            Command::new(Some("./missing.tar.gz"), None),
            Err(Error::NotFound(_))
        ));
        Ok(())
    }
}
