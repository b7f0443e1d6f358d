use crate::archive::container::{Container, EntryContent};
use crate::archive::source::{ByteSource, Target};
use crate::error::{CombineError, Result};
use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zip::ZipWriter;

impl Container {
    /// Write every live entry into a fresh zip on `sink`.
    ///
    /// Entries still held by the opened zip are copied raw, without
    /// recompression; staged entries are compressed as requested.
    pub fn write_zip<W: Write + Seek>(&mut self, sink: W) -> Result<W> {
        let mut writer = ZipWriter::new(sink);

        for entry in self.entries.iter_mut() {
            let name = entry.info.path.as_str();
            match &mut entry.content {
                EntryContent::Stored(index) => {
                    let zip = self.zip.as_mut().ok_or_else(|| {
                        CombineError::CorruptContainer(format!("no backing zip for {}", name))
                    })?;
                    let file = zip.by_index_raw(*index)?;
                    writer.raw_copy_file_rename(file, name)?;
                }
                EntryContent::Staged { data, compression } => {
                    writer.start_file(name, compression.file_options(entry.info.size))?;
                    data.seek(SeekFrom::Start(0))?;
                    io::copy(data, &mut writer)?;
                }
            }
            debug!(entry = name, "Wrote container entry");
        }

        Ok(writer.finish()?)
    }

    /// Finalize the container to its target and reopen over the new bytes.
    ///
    /// File targets are written to a temporary file in the same directory and
    /// renamed over the original, so a failure leaves the previous archive
    /// and this container untouched.
    pub fn commit(&mut self) -> Result<()> {
        let source = match self.target.clone() {
            Target::File(path) => ByteSource::File(self.commit_to_file(&path)?),
            Target::Memory => {
                ByteSource::from_bytes(self.write_zip(Cursor::new(Vec::new()))?.into_inner())
            }
        };

        let reopened = Container::from_source(source, self.target.clone())?
            .with_spool_limit(self.spool_limit);
        info!(
            entries = reopened.entry_count(),
            target = ?self.target,
            "Committed container"
        );
        *self = reopened;
        Ok(())
    }

    /// Finalized bytes of an in-memory container
    pub fn bytes(&self) -> Option<&[u8]> {
        self.memory.as_deref()
    }

    fn commit_to_file(&mut self, path: &Path) -> Result<std::fs::File> {
        let dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut staging = NamedTempFile::new_in(dir)?;
        self.write_zip(staging.as_file_mut())?;
        staging.as_file().sync_all()?;

        let file = staging.persist(path).map_err(|e| CombineError::Io(e.error))?;
        Ok(file)
    }
}
