use crate::archive::ArchivePath;
use crate::metadata::Subject;
use std::fmt;

/// Non-fatal problem found while opening an archive.
///
/// Warnings never fail an operation; they describe what was tolerated, and
/// what (if anything) was dropped from the model because of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Container content that the manifest does not list
    UntrackedEntry { path: ArchivePath },
    /// Manifest entry with no content in the container; the entry was dropped
    MissingContent { path: ArchivePath },
    /// Metadata about a path that is not in the manifest
    DanglingMetadata { subject: Subject },
    /// Timestamp property that could not be read; the property was dropped
    MalformedTimestamp { subject: Subject, value: String },
    /// Metadata document that could not be read at all; it was skipped
    MalformedMetadata { location: ArchivePath, reason: String },
    /// Metadata node the graph does not model; it is kept as written
    UnmodelledNode { about: String, reason: String },
    /// Two records for one subject carried different descriptions; the first was kept
    ConflictingDescription { subject: Subject },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UntrackedEntry { path } => {
                write!(f, "{} is in the container but not in the manifest", path)
            }
            Warning::MissingContent { path } => {
                write!(f, "{} is listed in the manifest but has no content", path)
            }
            Warning::DanglingMetadata { subject } => {
                write!(f, "metadata describes {}, which is not in the manifest", subject)
            }
            Warning::MalformedTimestamp { subject, value } => {
                write!(f, "ignored malformed timestamp {:?} on {}", value, subject)
            }
            Warning::MalformedMetadata { location, reason } => {
                write!(f, "skipped unreadable metadata document {}: {}", location, reason)
            }
            Warning::UnmodelledNode { about, reason } => {
                write!(f, "kept metadata node {:?} as written: {}", about, reason)
            }
            Warning::ConflictingDescription { subject } => {
                write!(f, "conflicting descriptions for {}; kept the first", subject)
            }
        }
    }
}
