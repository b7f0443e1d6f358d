use crate::archive::{ArchivePath, Container, IntoArchivePath, Target};
use crate::coordinator::{ArchiveState, Coordinator};
use crate::error::{CombineError, Result};
use crate::manifest::EntryDescriptor;
use crate::metadata::{IntoSubject, MetadataPatch, MetadataRecord};
use crate::options::ArchiveOptions;
use crate::warning::Warning;
use regex_lite::Regex;
use std::io::Read;
use std::path::Path;

/// An open COMBINE archive.
///
/// Paths may be given as `&str`, `String` or [`ArchivePath`]; a leading `/` or
/// `./` is accepted. Changes stay in memory until [`CombineArchive::save`].
///
/// # Example
///
/// ```no_run
/// use combine_archive::{format, CombineArchive, Creator, MetadataPatch};
///
/// let mut archive = CombineArchive::create("model.omex")?;
/// archive.add_file("model.xml", &b"<sbml/>"[..], format::SBML, true)?;
/// archive.set_metadata(
///     ".",
///     MetadataPatch::new().creator(Creator::new("Jane", "Doe")),
/// )?;
/// archive.save()?;
///
/// let mut archive = CombineArchive::open("model.omex")?;
/// let model = archive.read_entry_to_vec("model.xml")?;
/// # Ok::<(), combine_archive::CombineError>(())
/// ```
pub struct CombineArchive {
    coordinator: Coordinator,
}

impl CombineArchive {
    /// Start a new archive that will be saved to `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_options(path, ArchiveOptions::default())
    }

    pub fn create_with_options<P: AsRef<Path>>(path: P, options: ArchiveOptions) -> Result<Self> {
        let target = Target::File(path.as_ref().to_path_buf());
        let coordinator = Coordinator::create(Container::create(target), options)?;
        Ok(Self { coordinator })
    }

    /// Start a new archive kept in memory; see [`CombineArchive::bytes`]
    pub fn create_in_memory() -> Result<Self> {
        Self::create_in_memory_with_options(ArchiveOptions::default())
    }

    pub fn create_in_memory_with_options(options: ArchiveOptions) -> Result<Self> {
        let coordinator = Coordinator::create(Container::create(Target::Memory), options)?;
        Ok(Self { coordinator })
    }

    /// Open an archive file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ArchiveOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ArchiveOptions) -> Result<Self> {
        let container = Container::open(path)?;
        let coordinator = Coordinator::load_and_validate(container, options)?;
        Ok(Self { coordinator })
    }

    /// Open an archive held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with_options(bytes, ArchiveOptions::default())
    }

    pub fn from_bytes_with_options(bytes: Vec<u8>, options: ArchiveOptions) -> Result<Self> {
        let container = Container::from_bytes(bytes)?;
        let coordinator = Coordinator::load_and_validate(container, options)?;
        Ok(Self { coordinator })
    }

    /// Write manifest, metadata and content back to the archive's target
    pub fn save(&mut self) -> Result<()> {
        self.coordinator.save()
    }

    /// Release the archive without saving
    pub fn close(self) {
        self.coordinator.close()
    }

    pub fn state(&self) -> ArchiveState {
        self.coordinator.state()
    }

    pub fn is_dirty(&self) -> bool {
        self.state() == ArchiveState::Dirty
    }

    /// Bytes of an in-memory archive as of its last save
    pub fn bytes(&self) -> Option<&[u8]> {
        self.coordinator.bytes()
    }

    pub fn options(&self) -> &ArchiveOptions {
        self.coordinator.options()
    }

    /// Problems tolerated when the archive was opened
    pub fn warnings(&self) -> &[Warning] {
        self.coordinator.warnings()
    }

    /// Tracked entries, in manifest order
    pub fn entries(&self) -> impl Iterator<Item = &EntryDescriptor> {
        self.coordinator.manifest().entries()
    }

    pub fn entry<P>(&self, path: P) -> Result<Option<&EntryDescriptor>>
    where
        P: IntoArchivePath,
    {
        let path = path.into_archive_path()?;
        Ok(self.coordinator.manifest().get(&path))
    }

    pub fn contains<P>(&self, path: P) -> bool
    where
        P: IntoArchivePath,
    {
        path.into_archive_path()
            .is_ok_and(|path| self.coordinator.manifest().contains(&path))
    }

    pub fn master(&self) -> Option<&EntryDescriptor> {
        self.coordinator.manifest().master()
    }

    /// Entries whose format is exactly `format`
    pub fn entries_by_format(&self, format: &str) -> Vec<&EntryDescriptor> {
        self.entries().filter(|entry| entry.format == format).collect()
    }

    /// Entries whose format matches a regular expression
    pub fn entries_matching_format(&self, pattern: &str) -> Result<Vec<&EntryDescriptor>> {
        let regex = Regex::new(pattern)
            .map_err(|e| CombineError::InvalidFormat(format!("bad pattern {:?}: {}", pattern, e)))?;
        Ok(self
            .entries()
            .filter(|entry| regex.is_match(&entry.format))
            .collect())
    }

    /// Container entries that the manifest does not list
    pub fn untracked_entries(&self) -> Vec<ArchivePath> {
        self.coordinator.untracked_entries()
    }

    /// Stream an entry's content; each call starts from the beginning
    pub fn entry_content<P>(&mut self, path: P) -> Result<Box<dyn Read + '_>>
    where
        P: IntoArchivePath,
    {
        let path = path.into_archive_path()?;
        self.coordinator.entry_content(&path)
    }

    pub fn read_entry_to_vec<P>(&mut self, path: P) -> Result<Vec<u8>>
    where
        P: IntoArchivePath,
    {
        let path = path.into_archive_path()?;
        self.coordinator.read_entry_to_vec(&path)
    }

    /// Replace the content of a tracked entry
    pub fn put_entry_content<P, R>(&mut self, path: P, content: R) -> Result<u64>
    where
        P: IntoArchivePath,
        R: Read,
    {
        let path = path.into_archive_path()?;
        self.coordinator.put_entry_content(&path, content)
    }

    /// Add a file with the given format, optionally as the master entry
    pub fn add_file<P, R>(&mut self, path: P, content: R, format: &str, master: bool) -> Result<()>
    where
        P: IntoArchivePath,
        R: Read,
    {
        let path = path.into_archive_path()?;
        self.coordinator.add_file(path, content, format, master, None)
    }

    /// Add a file and describe it in one step
    pub fn add_file_with_metadata<P, R>(
        &mut self,
        path: P,
        content: R,
        format: &str,
        master: bool,
        metadata: MetadataPatch,
    ) -> Result<()>
    where
        P: IntoArchivePath,
        R: Read,
    {
        let path = path.into_archive_path()?;
        self.coordinator
            .add_file(path, content, format, master, Some(metadata))
    }

    pub fn remove_file<P>(&mut self, path: P) -> Result<()>
    where
        P: IntoArchivePath,
    {
        let path = path.into_archive_path()?;
        self.coordinator.remove_file(&path)
    }

    pub fn rename_file<P, Q>(&mut self, from: P, to: Q) -> Result<()>
    where
        P: IntoArchivePath,
        Q: IntoArchivePath,
    {
        let from = from.into_archive_path()?;
        let to = to.into_archive_path()?;
        self.coordinator.rename_file(&from, to)
    }

    /// Add an untracked container entry to the manifest
    pub fn track_entry<P>(&mut self, path: P, format: &str, master: bool) -> Result<()>
    where
        P: IntoArchivePath,
    {
        let path = path.into_archive_path()?;
        self.coordinator.track_entry(path, format, master)
    }

    /// Make `path` the master entry, clearing the previous one
    pub fn set_master<P>(&mut self, path: P) -> Result<()>
    where
        P: IntoArchivePath,
    {
        let path = path.into_archive_path()?;
        self.coordinator.set_master(&path)
    }

    pub fn clear_master(&mut self) {
        self.coordinator.clear_master()
    }

    /// Metadata of the archive (`"."`) or of an entry
    pub fn metadata<S>(&self, subject: S) -> Result<Option<&MetadataRecord>>
    where
        S: IntoSubject,
    {
        let subject = subject.into_subject()?;
        Ok(self.coordinator.metadata(&subject))
    }

    /// Update metadata of the archive (`"."`) or of an entry
    pub fn set_metadata<S>(&mut self, subject: S, patch: MetadataPatch) -> Result<()>
    where
        S: IntoSubject,
    {
        let subject = subject.into_subject()?;
        self.coordinator.set_metadata(subject, patch)
    }

    /// Metadata of a fragment inside the archive or an entry, such as the
    /// `species_1` of `./model.xml#species_1`
    pub fn fragment_metadata<S>(&self, subject: S, fragment: &str) -> Result<Option<&MetadataRecord>>
    where
        S: IntoSubject,
    {
        let subject = subject.into_subject()?;
        Ok(self.coordinator.fragment_metadata(&subject, fragment))
    }

    pub fn set_fragment_metadata<S>(
        &mut self,
        subject: S,
        fragment: &str,
        patch: MetadataPatch,
    ) -> Result<()>
    where
        S: IntoSubject,
    {
        let subject = subject.into_subject()?;
        self.coordinator.set_fragment_metadata(subject, fragment, patch)
    }

    pub fn remove_metadata<S>(&mut self, subject: S) -> Result<Option<MetadataRecord>>
    where
        S: IntoSubject,
    {
        let subject = subject.into_subject()?;
        Ok(self.coordinator.remove_metadata(&subject))
    }

    /// Every metadata record, the archive's first
    pub fn metadata_records(&self) -> impl Iterator<Item = &MetadataRecord> {
        self.coordinator.metadata_graph().records()
    }
}
