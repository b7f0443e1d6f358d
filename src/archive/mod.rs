mod container;
mod format;
mod path;
mod source;
mod writer;

pub use container::Container;
pub use format::{
    CompressionMethod, EntryInfo, DEFAULT_METADATA_LOCATION, DEFAULT_SPOOL_LIMIT,
    MANIFEST_LOCATION,
};
pub use path::{ArchivePath, IntoArchivePath, MAX_PATH_LENGTH};
pub use source::{ByteSource, Target};
