use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Byte store a container is read from
#[derive(Debug)]
pub enum ByteSource {
    File(File),
    Memory(Cursor<Arc<[u8]>>),
}

impl ByteSource {
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Memory(Cursor::new(bytes.into()))
    }

    /// Shared handle to in-memory bytes
    pub fn memory(&self) -> Option<Arc<[u8]>> {
        match self {
            Self::File(_) => None,
            Self::Memory(cursor) => Some(Arc::clone(cursor.get_ref())),
        }
    }
}

impl Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::File(file) => file.read(buf),
            Self::Memory(cursor) => cursor.read(buf),
        }
    }
}

impl Seek for ByteSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::File(file) => file.seek(pos),
            Self::Memory(cursor) => cursor.seek(pos),
        }
    }
}

/// Where a finalized container is committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Atomically replace this file
    File(PathBuf),
    /// Keep the finalized bytes in memory
    Memory,
}

impl Target {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Memory => None,
        }
    }
}
