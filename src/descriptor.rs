use crate::{
    digest::HashingWriter,
    error::*,
    media_types,
    sniff::{self, Compression},
    Digest,
};
use oci_spec::image::MediaType;
use serde::Deserialize;
use std::{
    fs,
    io::{self, BufRead, Read, Seek, SeekFrom},
    path::Path,
};

/// Media type, size and digest of a content-addressed object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// `None` only while fetching a digest whose type the caller did not tell
    pub media_type: Option<MediaType>,
    pub digest: Digest,
    pub size: u64,
}

/// The only field read from a JSON document to decide its media type
#[derive(Deserialize)]
struct MediaTypeField {
    #[serde(rename = "mediaType", default)]
    media_type: String,
}

impl Descriptor {
    /// Describe a local file to be pushed
    ///
    /// A non-empty `media_type` is used as is. Otherwise it is detected from the content:
    /// gzip-compressed files become OCI layers, and JSON documents must declare `mediaType`.
    /// There is no fallback to a generic type.
    ///
    /// The returned file is rewound to its start.
    pub fn from_file(path: &Path, media_type: Option<&str>) -> Result<(fs::File, Self)> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.to_owned()))
            }
            Err(e) => return Err(e.into()),
        };
        if meta.is_dir() {
            // TODO: detect OCI image layout and push it as an image
            return Err(Error::IsDirectory(path.to_owned()));
        }

        let mut f = fs::File::open(path)?;
        let desc = Self::from_reader(&mut f, meta.len(), media_type).map_err(|e| match e {
            Error::EmptyContent => Error::EmptyFile(path.to_owned()),
            e => e,
        })?;
        log::debug!("{} is {:?}", path.display(), desc);
        Ok((f, desc))
    }

    /// Same as [Descriptor::from_file] for a seekable source of known size
    pub fn from_reader<R: Read + Seek>(
        reader: &mut R,
        size: u64,
        media_type: Option<&str>,
    ) -> Result<Self> {
        if size == 0 {
            return Err(Error::EmptyContent);
        }
        let media_type = match media_type.filter(|ty| !ty.is_empty()) {
            Some(ty) => MediaType::from(ty),
            None => {
                let detected = detect_media_type(&mut *reader);
                reader.seek(SeekFrom::Start(0))?;
                detected.ok_or(Error::UndeterminedMediaType)?
            }
        };

        let mut hashing = HashingWriter::new(io::sink());
        io::copy(reader, &mut hashing)?;
        let (_, digest, hashed) = hashing.finish();
        if hashed != size {
            return Err(Error::SizeMismatch {
                expected: size,
                actual: hashed,
            });
        }
        reader.seek(SeekFrom::Start(0))?;

        Ok(Descriptor {
            media_type: Some(media_type),
            digest,
            size,
        })
    }
}

fn detect_media_type<R: Read>(reader: R) -> Option<MediaType> {
    let mut buffered = io::BufReader::new(reader);
    let compression = {
        let header = buffered.fill_buf().ok()?;
        sniff::classify(&header[..header.len().min(sniff::HEADER_LEN)])
    };
    match compression {
        Compression::Gzip => Some(media_types::layer_tar_gzip()),
        Compression::Unknown => {
            // Only the first JSON value is decoded, trailing bytes are not inspected
            let mut values =
                serde_json::Deserializer::from_reader(buffered).into_iter::<MediaTypeField>();
            match values.next() {
                Some(Ok(MediaTypeField { media_type })) if !media_type.is_empty() => {
                    Some(MediaType::from(media_type.as_str()))
                }
                _ => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression as Level};
    use std::io::Write;

    const MANIFEST: &str = r#"{
  "schemaVersion": 2,
  "mediaType": "application/vnd.oci.image.manifest.v1+json",
  "config": {
    "mediaType": "application/vnd.oci.image.config.v1+json",
    "digest": "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a",
    "size": 2
  },
  "layers": []
}"#;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> Result<std::path::PathBuf> {
        let path = dir.path().join(name);
        fs::write(&path, content)?;
        Ok(path)
    }

    fn gzipped(content: &[u8]) -> Result<Vec<u8>> {
        let mut enc = GzEncoder::new(Vec::new(), Level::default());
        enc.write_all(content)?;
        Ok(enc.finish()?)
    }

    #[test]
    fn gzip_layer() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for content in [&b"layer"[..], b"{\"mediaType\":\"a/b\"}", b"\x00\x01\x02"] {
            let path = write_file(&dir, "layer.tar.gz", &gzipped(content)?)?;
            let (_f, desc) = Descriptor::from_file(&path, None)?;
            assert_eq!(desc.media_type, Some(media_types::layer_tar_gzip()));
        }

        // Only the magic number matters
        let path = write_file(&dir, "fake.gz", b"\x1f\x8b\x08 definitely not deflate")?;
        let (_f, desc) = Descriptor::from_file(&path, None)?;
        assert_eq!(desc.media_type, Some(media_types::layer_tar_gzip()));
        Ok(())
    }

    #[test]
    fn json_media_type() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_file(&dir, "manifest.json", MANIFEST.as_bytes())?;
        let (_f, desc) = Descriptor::from_file(&path, None)?;
        assert_eq!(desc.media_type, Some(media_types::image_manifest()));
        assert_eq!(desc.size, MANIFEST.len() as u64);
        assert_eq!(desc.digest, Digest::from_buf_sha256(MANIFEST.as_bytes()));

        // Custom types are kept as is
        let path = write_file(
            &dir,
            "plugin.json",
            br#"{"mediaType":"application/vnd.docker.plugin.v1+json"} trailing"#,
        )?;
        let (_f, desc) = Descriptor::from_file(&path, None)?;
        assert_eq!(
            desc.media_type.map(|ty| ty.to_string()),
            Some("application/vnd.docker.plugin.v1+json".to_string())
        );
        Ok(())
    }

    #[test]
    fn explicit_media_type_wins() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_file(&dir, "layer.tar.gz", &gzipped(b"layer")?)?;
        let (_f, desc) = Descriptor::from_file(&path, Some("application/vnd.example+gzip"))?;
        assert_eq!(
            desc.media_type,
            Some(MediaType::from("application/vnd.example+gzip"))
        );

        // Empty hint means "detect"
        let (_f, desc) = Descriptor::from_file(&path, Some(""))?;
        assert_eq!(desc.media_type, Some(media_types::layer_tar_gzip()));
        Ok(())
    }

    #[test]
    fn undetermined_media_type() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for content in [
            &b"x"[..],
            b"\x1f\x8b",
            b"hello",
            b"{}",
            br#"{"mediaType":""}"#,
            br#"{"mediaType":1}"#,
            b"[1, 2]",
            br#"{"mediaType": "application/vnd.oci.image"#,
        ] {
            let path = write_file(&dir, "blob", content)?;
            assert!(matches!(
                Descriptor::from_file(&path, None),
                Err(Error::UndeterminedMediaType)
            ));
        }
        Ok(())
    }

    #[test]
    fn rehash_returned_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_file(&dir, "manifest.json", MANIFEST.as_bytes())?;
        let (mut f, desc) = Descriptor::from_file(&path, None)?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        assert_eq!(buf, MANIFEST.as_bytes());
        assert_eq!(Digest::from_buf_sha256(&buf), desc.digest);

        let mut cursor = io::Cursor::new(gzipped(b"layer")?);
        let size = cursor.get_ref().len() as u64;
        let desc = Descriptor::from_reader(&mut cursor, size, None)?;
        assert_eq!(cursor.position(), 0);
        assert_eq!(Digest::from_buf_sha256(cursor.get_ref()), desc.digest);
        Ok(())
    }

    #[test]
    fn invalid_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(matches!(
            Descriptor::from_file(dir.path(), None),
            Err(Error::IsDirectory(_))
        ));
        let empty = write_file(&dir, "empty", b"")?;
        assert!(matches!(
            Descriptor::from_file(&empty, Some("application/octet-stream")),
            Err(Error::EmptyFile(_))
        ));
        assert!(matches!(
            Descriptor::from_file(&dir.path().join("missing"), None),
            Err(Error::NotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn empty_reader() {
        let mut cursor = io::Cursor::new(Vec::new());
        assert!(matches!(
            Descriptor::from_reader(&mut cursor, 0, Some("application/octet-stream")),
            Err(Error::EmptyContent)
        ));
        assert!(matches!(
            Descriptor::from_reader(&mut cursor, 0, None),
            Err(Error::EmptyContent)
        ));
    }

    #[test]
    fn size_must_match() {
        let mut cursor = io::Cursor::new(b"12345".to_vec());
        assert!(matches!(
            Descriptor::from_reader(&mut cursor, 3, Some("text/plain")),
            Err(Error::SizeMismatch {
                expected: 3,
                actual: 5
            })
        ));
    }
}
