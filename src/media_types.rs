use oci_spec::image::MediaType;

/// Media type assigned to gzip-compressed files, i.e. an OCI image layer
pub fn layer_tar_gzip() -> MediaType {
    MediaType::ImageLayerGzip
}

/// Media type guessed for a digest which the registry does not know as a blob
pub fn image_manifest() -> MediaType {
    MediaType::ImageManifest
}

const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// Accept header used to resolve a reference
pub fn manifest_accept() -> String {
    [
        MediaType::ImageManifest.to_string(),
        MediaType::ImageIndex.to_string(),
        DOCKER_MANIFEST.to_string(),
        DOCKER_MANIFEST_LIST.to_string(),
    ]
    .join(", ")
}

/// Whether the content of this media type is stored under `/v2/<name>/manifests/`
///
/// Anything else is treated as a blob.
pub fn is_manifest(media_type: &MediaType) -> bool {
    match media_type {
        MediaType::ImageManifest | MediaType::ImageIndex => true,
        MediaType::Other(ty) => {
            ty == DOCKER_MANIFEST || ty == DOCKER_MANIFEST_LIST || ty.ends_with("manifest.v1+json")
        }
        _ => false,
    }
}

/// Whether a command line argument is written like `type/subtype`
pub fn looks_like_media_type(input: &str) -> bool {
    match input.split_once('/') {
        Some((ty, subtype)) => {
            ty.starts_with(|c: char| c.is_ascii_alphanumeric())
                && !subtype.is_empty()
                && !subtype.contains('/')
                && ty.chars().all(|c| c.is_ascii_alphanumeric() || "-.+".contains(c))
        }
        None => false,
    }
}
