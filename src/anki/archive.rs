use std::{
    collections::HashMap,
    fmt,
    io::{
        Cursor,
        Read,
    },
    path::PathBuf,
};

use tracing::{
    debug,
    info,
};
use zip::ZipArchive;

use super::{
    decompress::decompress_media,
    manifest::MediaManifest,
};
use crate::core::{
    http,
    ImportError,
    Progress,
};

const MANIFEST_ENTRY: &str = "media";
const COLLECTION_PREFIX: &str = "collection.anki2";

#[derive(Debug, Clone)]
pub enum ArchiveSource {
    Path(PathBuf),
    Url(String),
    Bytes(Vec<u8>),
}

impl ArchiveSource {
    /// Anything that looks like an http(s) URL is fetched, everything else is a path.
    pub fn parse(input: &str) -> Self {
        if input.starts_with("http://") || input.starts_with("https://") {
            ArchiveSource::Url(input.to_string())
        } else {
            ArchiveSource::Path(PathBuf::from(input))
        }
    }

    pub async fn read(self) -> Result<Vec<u8>, ImportError> {
        match self {
            ArchiveSource::Path(path) => Ok(tokio::fs::read(&path).await.map_err(|e| {
                ImportError::ArchiveFormat(format!("Failed to read {}: {}", path.display(), e))
            })?),
            ArchiveSource::Url(url) => http::fetch_bytes(&http::http_client()?, &url).await,
            ArchiveSource::Bytes(bytes) => Ok(bytes),
        }
    }

    pub fn file_name(&self) -> String {
        match self {
            ArchiveSource::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "deck.apkg".to_string()),
            ArchiveSource::Url(url) => url
                .rsplit('/')
                .next()
                .filter(|name| !name.is_empty())
                .unwrap_or("deck.apkg")
                .to_string(),
            ArchiveSource::Bytes(_) => "deck.apkg".to_string(),
        }
    }
}

impl fmt::Display for ArchiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveSource::Path(path) => write!(f, "{}", path.display()),
            ArchiveSource::Url(url) => write!(f, "{}", url),
            ArchiveSource::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// An opened `.apkg` / `.colpkg` zip container.
pub struct AnkiPackage {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl AnkiPackage {
    pub fn open(bytes: Vec<u8>) -> Result<Self, ImportError> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ImportError::ArchiveFormat(format!("Failed to read zip archive: {}", e)))?;
        debug!("Opened package with {} entries", archive.len());
        Ok(Self { archive })
    }

    fn read_entry(&mut self, name: &str) -> Result<Option<Vec<u8>>, ImportError> {
        let mut file = match self.archive.by_name(name) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(Some(buffer))
    }

    pub fn media_manifest(&mut self) -> Result<MediaManifest, ImportError> {
        match self.read_entry(MANIFEST_ENTRY)? {
            Some(raw) => Ok(MediaManifest::parse(&raw)),
            None => {
                info!("No media file found in archive");
                Ok(MediaManifest::default())
            }
        }
    }

    /// Reads every manifest entry present in the zip, keyed by real filename.
    pub fn load_media(
        &mut self,
        manifest: &MediaManifest,
        progress: &Progress,
    ) -> Result<HashMap<String, Vec<u8>>, ImportError> {
        let total = manifest.len();
        let mut media = HashMap::with_capacity(total);

        for (i, (entry, filename)) in manifest.iter().enumerate() {
            if let Some(blob) = self.read_entry(entry)? {
                media.insert(filename.to_string(), decompress_media(blob));
            } else {
                debug!("Media entry {} ({}) missing from archive", entry, filename);
            }

            if i % 10 == 0 {
                let pct = 20 + ((i * 20) / total.max(1)) as u8;
                progress.report(pct, &format!("Loading media {}/{}...", i + 1, total));
            }
        }

        info!("Loaded {} media files", media.len());
        Ok(media)
    }

    /// Newest collection schema wins when a package carries several.
    pub fn collection_entry(&self) -> Option<String> {
        self.archive
            .file_names()
            .filter(|name| name.starts_with(COLLECTION_PREFIX))
            .max_by_key(|name| collection_priority(name))
            .map(str::to_string)
    }

    /// Raw (possibly compressed) collection database bytes.
    pub fn collection(&mut self) -> Result<Vec<u8>, ImportError> {
        let entry = self.collection_entry().ok_or_else(|| {
            ImportError::ArchiveFormat(
                "Could not find 'collection.anki2*' database".to_string(),
            )
        })?;
        debug!("Using collection entry {}", entry);

        self.read_entry(&entry)?
            .ok_or_else(|| ImportError::ArchiveFormat(format!("Could not read {}", entry)))
    }
}

fn collection_priority(name: &str) -> u8 {
    match &name[COLLECTION_PREFIX.len()..] {
        "1b" => 3,
        "1" => 2,
        "" => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        zip_entries,
        PackageBuilder,
    };

    #[test]
    fn test_missing_collection_is_archive_error() {
        let bytes = zip_entries(&[("media", b"{}".to_vec())]);
        let mut package = AnkiPackage::open(bytes).unwrap();

        match package.collection() {
            Err(ImportError::ArchiveFormat(msg)) => assert!(msg.contains("collection.anki2")),
            other => panic!("Expected ArchiveFormat, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_oversized_header_does_not_preallocate() {
        let mut bytes = zip_entries(&[("media", br#"{"0": "a.mp3"}"#.to_vec())]);
        let central = bytes
            .windows(4)
            .position(|w| w == [0x50, 0x4b, 0x01, 0x02])
            .unwrap();
        bytes[central + 24..central + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());

        let mut package = AnkiPackage::open(bytes).unwrap();
        assert_eq!(package.media_manifest().unwrap().len(), 1);
    }

    #[test]
    fn test_not_a_zip_is_archive_error() {
        assert!(matches!(
            AnkiPackage::open(b"definitely not a zip".to_vec()),
            Err(ImportError::ArchiveFormat(_))
        ));
    }

    #[test]
    fn test_prefers_newest_collection() {
        let bytes = zip_entries(&[
            ("collection.anki2", b"old".to_vec()),
            ("collection.anki21b", b"new".to_vec()),
            ("collection.anki21", b"mid".to_vec()),
        ]);
        let mut package = AnkiPackage::open(bytes).unwrap();
        assert_eq!(package.collection_entry().as_deref(), Some("collection.anki21b"));
        assert_eq!(package.collection().unwrap(), b"new".to_vec());
    }

    #[test]
    fn test_media_resolution_skips_absent_entries() {
        let bytes = zip_entries(&[
            ("media", br#"{"17": "word123.mp3", "18": "gone.mp3"}"#.to_vec()),
            ("17", b"ID3audio".to_vec()),
        ]);
        let mut package = AnkiPackage::open(bytes).unwrap();
        let manifest = package.media_manifest().unwrap();
        let media = package.load_media(&manifest, &Progress::none()).unwrap();

        assert_eq!(media.get("word123.mp3"), Some(&b"ID3audio".to_vec()));
        assert!(!media.contains_key("gone.mp3"));
    }

    #[test]
    fn test_missing_manifest_is_empty() {
        let bytes = PackageBuilder::new().without_manifest().build();
        let mut package = AnkiPackage::open(bytes).unwrap();
        assert!(package.media_manifest().unwrap().is_empty());
    }

    #[test]
    fn test_source_parsing() {
        assert!(matches!(ArchiveSource::parse("https://x.test/deck.apkg"), ArchiveSource::Url(_)));
        assert!(matches!(ArchiveSource::parse("decks/jp.apkg"), ArchiveSource::Path(_)));
        assert_eq!(ArchiveSource::parse("https://x.test/jp.colpkg").file_name(), "jp.colpkg");
        assert_eq!(ArchiveSource::parse("/tmp/core.apkg").file_name(), "core.apkg");
    }
}
