//! Archive configuration
//!
//! ```toml
//! compression = "stored"
//! metadata_location = "meta/metadata.rdf"
//! strict_formats = true
//! spool_limit = 1048576
//! ```

use crate::archive::{ArchivePath, CompressionMethod, DEFAULT_METADATA_LOCATION, DEFAULT_SPOOL_LIMIT};
use crate::error::{CombineError, Result};
use serde::Deserialize;

/// Options controlling how an archive is written
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveOptions {
    /// Compression for newly written entries
    pub compression: CompressionMethod,

    /// Where the metadata document goes when the archive has none yet
    pub metadata_location: String,

    /// Upgrade bare MIME types to media-type URLs on add
    pub convert_mime_types: bool,

    /// Reject format identifiers outside purl.org / identifiers.org on add
    pub strict_formats: bool,

    /// Bytes of staged content held in memory before spilling to disk
    pub spool_limit: usize,

    /// Drop metadata about unknown paths on save
    pub prune_dangling_metadata: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::default(),
            metadata_location: DEFAULT_METADATA_LOCATION.to_string(),
            convert_mime_types: true,
            strict_formats: false,
            spool_limit: DEFAULT_SPOOL_LIMIT,
            prune_dangling_metadata: true,
        }
    }
}

impl ArchiveOptions {
    /// Load options from TOML; missing keys keep their defaults
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let options: ArchiveOptions = toml::from_str(input)?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_compression(mut self, compression: CompressionMethod) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_metadata_location(mut self, location: impl Into<String>) -> Self {
        self.metadata_location = location.into();
        self
    }

    pub fn with_strict_formats(mut self, strict: bool) -> Self {
        self.strict_formats = strict;
        self
    }

    pub fn with_spool_limit(mut self, limit: usize) -> Self {
        self.spool_limit = limit;
        self
    }

    /// Check the settings that are not valid by construction
    pub fn validate(&self) -> Result<()> {
        self.metadata_path().map(|_| ())
    }

    pub(crate) fn metadata_path(&self) -> Result<ArchivePath> {
        let path = ArchivePath::from_location(&self.metadata_location).map_err(|e| {
            CombineError::Config(format!("metadata_location: {}", e))
        })?;
        if path.as_str() == crate::archive::MANIFEST_LOCATION {
            return Err(CombineError::Config(
                "metadata_location cannot be the manifest".to_string(),
            ));
        }
        Ok(path)
    }

    pub(crate) fn metadata_location_matches(&self, path: &ArchivePath) -> bool {
        self.metadata_path().is_ok_and(|location| &location == path)
    }
}
