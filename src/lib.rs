//! ocicat
//! =======
//!
//! Push a local file to, or fetch a content-addressed object from, an OCI registry.
//!
//! - [Descriptor::from_file] computes media type, size and digest of a local file.
//! - [transfer::push] and [transfer::fetch] drive a [distribution::Transport],
//!   retrying with credentials and a narrower scope when the registry rejects a request.
//! - [distribution::Authorizer] decides when to ask for credentials.

pub mod config;
pub mod digest;
pub mod distribution;
pub mod error;
pub mod media_types;
pub mod sniff;
pub mod transfer;

mod descriptor;
mod image_name;

pub use descriptor::Descriptor;
pub use digest::Digest;
pub use image_name::ImageName;
