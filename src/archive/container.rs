use crate::archive::format::{CompressionMethod, EntryInfo, DEFAULT_SPOOL_LIMIT};
use crate::archive::path::ArchivePath;
use crate::archive::source::{ByteSource, Target};
use crate::error::{CombineError, Result};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tempfile::SpooledTempFile;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

/// Where the bytes of an entry currently live
pub(crate) enum EntryContent {
    /// Entry `index` of the opened zip
    Stored(usize),
    /// Written since the last commit, not yet in any zip
    Staged {
        data: SpooledTempFile,
        compression: CompressionMethod,
    },
}

pub(crate) struct ContainerEntry {
    pub(crate) info: EntryInfo,
    pub(crate) content: EntryContent,
}

/// Zip-backed entry store with normalized paths.
///
/// Content of an opened archive stays in the underlying zip until it is
/// replaced; new content is spooled until [`Container::commit`] rewrites the
/// whole container.
pub struct Container {
    pub(crate) zip: Option<ZipArchive<ByteSource>>,
    pub(crate) entries: Vec<ContainerEntry>,
    pub(crate) memory: Option<Arc<[u8]>>,
    pub(crate) target: Target,
    pub(crate) spool_limit: usize,
}

impl Container {
    /// Empty container that commits to `target`
    pub fn create(target: Target) -> Self {
        Self {
            zip: None,
            entries: Vec::new(),
            memory: None,
            target,
            spool_limit: DEFAULT_SPOOL_LIMIT,
        }
    }

    /// Open a zip file on disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_source(ByteSource::File(file), Target::File(path.to_path_buf()))
    }

    /// Open a zip held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_source(ByteSource::from_bytes(bytes), Target::Memory)
    }

    /// Open a zip from any byte source and enumerate its entries
    pub fn from_source(source: ByteSource, target: Target) -> Result<Self> {
        let memory = source.memory();
        let mut zip = ZipArchive::new(source).map_err(corrupt_on_open)?;
        let mut entries: Vec<ContainerEntry> = Vec::with_capacity(zip.len());

        for index in 0..zip.len() {
            let file = zip.by_index_raw(index).map_err(corrupt_on_open)?;
            let raw_name = file.name().to_string();
            let size = file.size();
            let is_dir = file.is_dir() || raw_name.ends_with('\\');
            drop(file);

            // Directories are not first-class; a marker never shadows content.
            if is_dir {
                debug!("Dropping directory marker {:?}", raw_name);
                continue;
            }

            let path = ArchivePath::new(&raw_name)?;
            if entries.iter().any(|entry| entry.info.path == path) {
                return Err(CombineError::CorruptContainer(format!(
                    "duplicate entry {}",
                    path
                )));
            }

            debug!(entry = %path, size, "Found container entry");
            entries.push(ContainerEntry {
                info: EntryInfo { path, size },
                content: EntryContent::Stored(index),
            });
        }

        Ok(Self {
            zip: Some(zip),
            entries,
            memory,
            target,
            spool_limit: DEFAULT_SPOOL_LIMIT,
        })
    }

    /// Set how many bytes of staged content stay in memory
    pub fn with_spool_limit(mut self, limit: usize) -> Self {
        self.spool_limit = limit;
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Get number of entries
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Normalized entries in container order
    pub fn entries(&self) -> impl Iterator<Item = &EntryInfo> {
        self.entries.iter().map(|entry| &entry.info)
    }

    /// Check if an entry exists
    pub fn contains(&self, path: &ArchivePath) -> bool {
        self.position(path).is_some()
    }

    /// Get entry information without reading data
    pub fn get_entry(&self, path: &ArchivePath) -> Option<&EntryInfo> {
        self.position(path).map(|index| &self.entries[index].info)
    }

    /// Stream an entry's content.
    ///
    /// Each call starts again from the first byte.
    pub fn read_entry(&mut self, path: &ArchivePath) -> Result<Box<dyn Read + '_>> {
        let index = self
            .position(path)
            .ok_or_else(|| CombineError::UnknownPath(path.to_string()))?;

        let Self { zip, entries, .. } = self;
        match &mut entries[index].content {
            EntryContent::Stored(zip_index) => {
                let zip = zip.as_mut().ok_or_else(|| {
                    CombineError::CorruptContainer(format!("no backing zip for {}", path))
                })?;
                let file = zip.by_index(*zip_index)?;
                Ok(Box::new(file))
            }
            EntryContent::Staged { data, .. } => {
                data.seek(SeekFrom::Start(0))?;
                Ok(Box::new(data))
            }
        }
    }

    /// Read a whole entry into memory
    pub fn read_to_vec(&mut self, path: &ArchivePath) -> Result<Vec<u8>> {
        let mut reader = self.read_entry(path)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Stage a new entry; fails if the path is taken
    pub fn write_entry<R: Read>(
        &mut self,
        path: &ArchivePath,
        content: R,
        compression: CompressionMethod,
    ) -> Result<u64> {
        if self.contains(path) {
            return Err(CombineError::DuplicatePath(path.to_string()));
        }

        let (data, size) = self.spool(content)?;
        debug!(entry = %path, size, "Staged container entry");
        self.entries.push(ContainerEntry {
            info: EntryInfo {
                path: path.clone(),
                size,
            },
            content: EntryContent::Staged { data, compression },
        });
        Ok(size)
    }

    /// Replace an existing entry's content in place, keeping its position
    pub fn replace_entry<R: Read>(
        &mut self,
        path: &ArchivePath,
        content: R,
        compression: CompressionMethod,
    ) -> Result<u64> {
        let index = self
            .position(path)
            .ok_or_else(|| CombineError::UnknownPath(path.to_string()))?;

        // Spool before touching the entry so a failed read leaves it intact
        let (data, size) = self.spool(content)?;
        let entry = &mut self.entries[index];
        entry.info.size = size;
        entry.content = EntryContent::Staged { data, compression };
        debug!(entry = %path, size, "Replaced container entry");
        Ok(size)
    }

    /// Write or replace, whichever applies
    pub fn put_entry<R: Read>(
        &mut self,
        path: &ArchivePath,
        content: R,
        compression: CompressionMethod,
    ) -> Result<u64> {
        if self.contains(path) {
            self.replace_entry(path, content, compression)
        } else {
            self.write_entry(path, content, compression)
        }
    }

    /// Remove an entry
    pub fn remove_entry(&mut self, path: &ArchivePath) -> Result<()> {
        let index = self
            .position(path)
            .ok_or_else(|| CombineError::UnknownPath(path.to_string()))?;
        self.entries.remove(index);
        debug!(entry = %path, "Removed container entry");
        Ok(())
    }

    /// Copy an entry to a new path; the zip format has no rename primitive
    pub fn copy_entry(
        &mut self,
        from: &ArchivePath,
        to: &ArchivePath,
        compression: CompressionMethod,
    ) -> Result<u64> {
        if self.contains(to) {
            return Err(CombineError::DuplicatePath(to.to_string()));
        }

        let spool_limit = self.spool_limit;
        let (data, size) = {
            let reader = self.read_entry(from)?;
            spool_into(reader, spool_limit)?
        };

        self.entries.push(ContainerEntry {
            info: EntryInfo {
                path: to.clone(),
                size,
            },
            content: EntryContent::Staged { data, compression },
        });
        debug!(from = %from, to = %to, size, "Copied container entry");
        Ok(size)
    }

    fn spool<R: Read>(&self, content: R) -> Result<(SpooledTempFile, u64)> {
        spool_into(content, self.spool_limit)
    }

    fn position(&self, path: &ArchivePath) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.info.path == path)
    }
}

fn spool_into<R: Read>(mut content: R, limit: usize) -> Result<(SpooledTempFile, u64)> {
    let mut data = tempfile::spooled_tempfile(limit);
    let size = io::copy(&mut content, &mut data)?;
    Ok((data, size))
}

/// Anything that stops the central directory from being read means the bytes
/// are not a usable zip at all.
fn corrupt_on_open(err: ZipError) -> CombineError {
    match err {
        ZipError::Io(e)
            if !matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData
            ) =>
        {
            CombineError::Io(e)
        }
        other => CombineError::CorruptContainer(other.to_string()),
    }
}
