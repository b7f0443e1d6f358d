use crate::archive::path::ArchivePath;
use serde::Deserialize;
use zip::write::SimpleFileOptions;

/// Fixed location of the manifest document
pub const MANIFEST_LOCATION: &str = "manifest.xml";

/// Location used for the metadata document when the archive has none yet
pub const DEFAULT_METADATA_LOCATION: &str = "metadata.rdf";

/// Staged content kept in memory before spilling to a temporary file (4MB)
pub const DEFAULT_SPOOL_LIMIT: usize = 4 * 1024 * 1024;

/// Entries at or above this size need zip64 records
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Compression applied to newly written entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    Stored,
    #[default]
    Deflated,
}

impl CompressionMethod {
    /// Choose compression for a file, keeping already-compressed formats stored
    pub fn choose_for_file(path: &str, preferred: Self) -> Self {
        let extension = path.rsplit('.').next().unwrap_or("").to_lowercase();

        match extension.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "mp3" | "mp4" | "zip" | "gz" | "bz2"
            | "xz" | "7z" | "omex" | "h5" => Self::Stored,
            _ => preferred,
        }
    }

    pub(crate) fn file_options(self, size: u64) -> SimpleFileOptions {
        let method = match self {
            Self::Stored => zip::CompressionMethod::Stored,
            Self::Deflated => zip::CompressionMethod::Deflated,
        };
        SimpleFileOptions::default()
            .compression_method(method)
            .unix_permissions(0o644)
            .large_file(size >= ZIP64_THRESHOLD)
    }
}

/// Normalized view of one physical container entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub path: ArchivePath,
    /// Uncompressed size in bytes
    pub size: u64,
}
