use crate::error::{CombineError, Result};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Maximum path length in bytes (UTF-8), the limit of a zip name field
pub const MAX_PATH_LENGTH: usize = u16::MAX as usize;

/// Normalized container-internal path.
///
/// Forward-slash separated, no leading slash, no `.`/`..` segments and no empty
/// segments. Comparison is case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchivePath(String);

impl ArchivePath {
    /// Normalize a raw container name.
    ///
    /// Backslashes become forward slashes and `.` segments are dropped. Absolute
    /// paths, drive letters, parent traversal and empty segments are rejected.
    pub fn new(raw: &str) -> Result<Self> {
        let unified = raw.replace('\\', "/");

        if unified.is_empty() {
            return Err(CombineError::invalid_path(raw, "empty path"));
        }
        if unified.len() > MAX_PATH_LENGTH {
            return Err(CombineError::invalid_path(raw, "path too long"));
        }
        if unified.contains('\0') {
            return Err(CombineError::invalid_path(raw, "NUL byte in path"));
        }
        if unified.starts_with('/') {
            return Err(CombineError::invalid_path(raw, "absolute path"));
        }
        let bytes = unified.as_bytes();
        if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            return Err(CombineError::invalid_path(raw, "drive-letter path"));
        }

        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" => return Err(CombineError::invalid_path(raw, "empty path segment")),
                "." => {}
                ".." => return Err(CombineError::invalid_path(raw, "parent traversal")),
                other => segments.push(other),
            }
        }

        if segments.is_empty() {
            return Err(CombineError::invalid_path(raw, "path names the archive root"));
        }

        Ok(Self(segments.join("/")))
    }

    /// Parse a manifest location or caller-supplied path.
    ///
    /// Same rules as [`ArchivePath::new`], except that a single leading `/` is
    /// read as "relative to the archive root" rather than as an absolute path.
    pub fn from_location(location: &str) -> Result<Self> {
        let trimmed = location.trim();
        let relative = trimmed
            .strip_prefix('/')
            .filter(|rest| !rest.starts_with('/'))
            .unwrap_or(trimmed);
        Self::new(relative)
    }

    /// The normalized path text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Location form used in documents (`./` prefixed)
    pub fn to_location(&self) -> String {
        format!("./{}", self.0)
    }

    /// Last path segment
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArchivePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ArchivePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for ArchivePath {
    type Err = CombineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_location(s)
    }
}

/// Anything that names an entry: `&str`, `String` or [`ArchivePath`]
pub trait IntoArchivePath {
    fn into_archive_path(self) -> Result<ArchivePath>;
}

impl IntoArchivePath for &str {
    fn into_archive_path(self) -> Result<ArchivePath> {
        ArchivePath::from_location(self)
    }
}

impl IntoArchivePath for String {
    fn into_archive_path(self) -> Result<ArchivePath> {
        ArchivePath::from_location(&self)
    }
}

impl IntoArchivePath for &String {
    fn into_archive_path(self) -> Result<ArchivePath> {
        ArchivePath::from_location(self)
    }
}

impl IntoArchivePath for ArchivePath {
    fn into_archive_path(self) -> Result<ArchivePath> {
        Ok(self)
    }
}

impl IntoArchivePath for &ArchivePath {
    fn into_archive_path(self) -> Result<ArchivePath> {
        Ok(self.clone())
    }
}
