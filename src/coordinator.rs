//! Keeps the container, manifest and metadata graph consistent.
//!
//! Every operation that touches more than one store goes through
//! [`Coordinator`]. Operations check everything they can before the first
//! write, and undo earlier steps if a later one fails, so a failed call leaves
//! the model as it was.

use crate::archive::{ArchivePath, CompressionMethod, Container, MANIFEST_LOCATION};
use crate::error::{CombineError, Result};
use crate::format;
use crate::manifest::{EntryDescriptor, Manifest};
use crate::metadata::{MetadataGraph, MetadataPatch, MetadataRecord, Subject};
use crate::options::ArchiveOptions;
use crate::warning::Warning;
use std::io::Read;
use tracing::{debug, info, warn};

/// Whether the in-memory model has unsaved changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    Clean,
    Dirty,
}

pub struct Coordinator {
    container: Container,
    manifest: Manifest,
    metadata: MetadataGraph,
    /// Manifest entries holding metadata documents, in manifest order
    metadata_docs: Vec<EntryDescriptor>,
    warnings: Vec<Warning>,
    options: ArchiveOptions,
    state: ArchiveState,
}

impl Coordinator {
    /// Coordinator for a new, empty archive
    pub fn create(container: Container, options: ArchiveOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            container: container.with_spool_limit(options.spool_limit),
            manifest: Manifest::new(),
            metadata: MetadataGraph::new(),
            metadata_docs: Vec::new(),
            warnings: Vec::new(),
            options,
            // Nothing is on disk until the first save
            state: ArchiveState::Dirty,
        })
    }

    /// Read the manifest and metadata of an opened container and cross-check
    /// them against its entries.
    ///
    /// Only a missing or unreadable manifest and an ambiguous master are
    /// fatal. Everything else is recorded as a [`Warning`].
    pub fn load_and_validate(container: Container, options: ArchiveOptions) -> Result<Self> {
        options.validate()?;
        let mut container = container.with_spool_limit(options.spool_limit);

        let manifest_path = ArchivePath::new(MANIFEST_LOCATION)?;
        if !container.contains(&manifest_path) {
            return Err(CombineError::NotACombineArchive(format!(
                "no {} in container",
                MANIFEST_LOCATION
            )));
        }
        let mut manifest = Manifest::parse(&container.read_to_vec(&manifest_path)?)?;

        let mut warnings = Vec::new();
        let mut metadata_docs = Vec::new();
        let declared: Vec<EntryDescriptor> = manifest.entries().cloned().collect();
        for descriptor in declared {
            if !container.contains(&descriptor.path) {
                warnings.push(Warning::MissingContent {
                    path: descriptor.path.clone(),
                });
                manifest.remove_entry(&descriptor.path)?;
            } else if format::is_metadata_format(&descriptor.format) {
                manifest.remove_entry(&descriptor.path)?;
                metadata_docs.push(descriptor.with_master(false));
            }
        }

        let mut metadata = MetadataGraph::new();
        for doc in &metadata_docs {
            let data = container.read_to_vec(&doc.path)?;
            match metadata.read_document(&data, |path| manifest.contains(path)) {
                Ok(found) => warnings.extend(found),
                Err(CombineError::MalformedMetadata(reason)) => {
                    warnings.push(Warning::MalformedMetadata {
                        location: doc.path.clone(),
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        for info in container.entries() {
            let path = &info.path;
            if path != &manifest_path
                && !manifest.contains(path)
                && !metadata_docs.iter().any(|doc| &doc.path == path)
            {
                warnings.push(Warning::UntrackedEntry { path: path.clone() });
            }
        }

        for warning in &warnings {
            warn!("{}", warning);
        }
        info!(
            entries = manifest.len(),
            metadata_documents = metadata_docs.len(),
            warnings = warnings.len(),
            "Opened COMBINE archive"
        );

        Ok(Self {
            container,
            manifest,
            metadata,
            metadata_docs,
            warnings,
            options,
            state: ArchiveState::Clean,
        })
    }

    pub fn state(&self) -> ArchiveState {
        self.state
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Warnings collected when the archive was opened
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn metadata_graph(&self) -> &MetadataGraph {
        &self.metadata
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Locations of the metadata documents the archive was read with
    pub fn metadata_documents(&self) -> impl Iterator<Item = &ArchivePath> {
        self.metadata_docs.iter().map(|doc| &doc.path)
    }

    /// Container entries that the manifest does not list
    pub fn untracked_entries(&self) -> Vec<ArchivePath> {
        self.container
            .entries()
            .map(|info| &info.path)
            .filter(|path| {
                path.as_str() != MANIFEST_LOCATION
                    && !self.manifest.contains(path)
                    && !self.is_metadata_document(path)
            })
            .cloned()
            .collect()
    }

    /// Stream the content of a tracked entry
    pub fn entry_content(&mut self, path: &ArchivePath) -> Result<Box<dyn Read + '_>> {
        self.check_tracked(path)?;
        self.container.read_entry(path)
    }

    /// Read a tracked entry into memory
    pub fn read_entry_to_vec(&mut self, path: &ArchivePath) -> Result<Vec<u8>> {
        self.check_tracked(path)?;
        self.container.read_to_vec(path)
    }

    /// Add a new entry: content, then manifest, then optional metadata
    pub fn add_file<R: Read>(
        &mut self,
        path: ArchivePath,
        content: R,
        format: &str,
        master: bool,
        patch: Option<MetadataPatch>,
    ) -> Result<()> {
        self.check_content_path(&path)?;
        if self.manifest.contains(&path) || self.container.contains(&path) {
            return Err(CombineError::DuplicatePath(path.to_string()));
        }
        let format = self.normalize_format(format)?;
        if master {
            if let Some(current) = self.manifest.master() {
                return Err(CombineError::ConflictingMaster {
                    requested: path.to_string(),
                    current: current.path.to_string(),
                });
            }
        }
        if let Some(patch) = &patch {
            patch.validate()?;
        }

        let compression = self.compression_for(&path);
        let size = self.container.write_entry(&path, content, compression)?;

        let descriptor = EntryDescriptor::new(path.clone(), format).with_master(master);
        if let Err(e) = self.manifest.add_entry(descriptor) {
            self.rollback_write(&path);
            return Err(e);
        }

        self.metadata.resolve_pending(|known| known == &path);
        if let Some(patch) = patch {
            self.metadata.upsert(Subject::Entry(path.clone()), patch)?;
        }

        debug!(entry = %path, size, master, "Added entry");
        self.mark_dirty();
        Ok(())
    }

    /// Remove an entry from container, manifest and metadata, in that order
    pub fn remove_file(&mut self, path: &ArchivePath) -> Result<()> {
        self.check_tracked(path)?;

        self.container.remove_entry(path)?;
        self.manifest.remove_entry(path)?;
        self.metadata.remove_subject(&Subject::Entry(path.clone()));

        debug!(entry = %path, "Removed entry");
        self.mark_dirty();
        Ok(())
    }

    /// Move an entry to a new path, carrying its manifest entry and metadata
    pub fn rename_file(&mut self, from: &ArchivePath, to: ArchivePath) -> Result<()> {
        self.check_tracked(from)?;
        self.check_content_path(&to)?;
        if from == &to {
            return Ok(());
        }
        if self.manifest.contains(&to) || self.container.contains(&to) {
            return Err(CombineError::DuplicatePath(to.to_string()));
        }

        let compression = self.compression_for(&to);
        self.container.copy_entry(from, &to, compression)?;

        if let Err(e) = self.manifest.rename_entry(from, &to) {
            self.rollback_write(&to);
            return Err(e);
        }
        self.metadata
            .rename_subject(&Subject::Entry(from.clone()), Subject::Entry(to.clone()));
        self.metadata.resolve_pending(|known| known == &to);
        self.container.remove_entry(from)?;

        debug!(from = %from, to = %to, "Renamed entry");
        self.mark_dirty();
        Ok(())
    }

    /// Replace the content of a tracked entry
    pub fn put_entry_content<R: Read>(&mut self, path: &ArchivePath, content: R) -> Result<u64> {
        self.check_tracked(path)?;
        let compression = self.compression_for(path);
        let size = self.container.replace_entry(path, content, compression)?;
        self.mark_dirty();
        Ok(size)
    }

    /// Adopt an untracked container entry into the manifest
    pub fn track_entry(&mut self, path: ArchivePath, format: &str, master: bool) -> Result<()> {
        self.check_content_path(&path)?;
        if self.manifest.contains(&path) {
            return Err(CombineError::DuplicatePath(path.to_string()));
        }
        if !self.container.contains(&path) {
            return Err(CombineError::UnknownPath(path.to_string()));
        }
        let format = self.normalize_format(format)?;

        self.manifest
            .add_entry(EntryDescriptor::new(path.clone(), format).with_master(master))?;
        self.metadata.resolve_pending(|known| known == &path);
        self.warnings
            .retain(|warning| !matches!(warning, Warning::UntrackedEntry { path: p } if p == &path));

        debug!(entry = %path, master, "Tracked entry");
        self.mark_dirty();
        Ok(())
    }

    pub fn set_master(&mut self, path: &ArchivePath) -> Result<()> {
        self.manifest.set_master(path)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn clear_master(&mut self) {
        if self.manifest.master().is_some() {
            self.manifest.clear_master();
            self.mark_dirty();
        }
    }

    pub fn metadata(&self, subject: &Subject) -> Option<&MetadataRecord> {
        self.metadata.record(subject)
    }

    /// Apply a metadata patch to the archive or one of its entries
    pub fn set_metadata(&mut self, subject: Subject, patch: MetadataPatch) -> Result<()> {
        self.check_subject(&subject)?;
        self.metadata.upsert(subject, patch)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn fragment_metadata(&self, subject: &Subject, fragment: &str) -> Option<&MetadataRecord> {
        self.metadata.fragment(subject, fragment)
    }

    /// Apply a metadata patch to a fragment inside the archive or an entry
    pub fn set_fragment_metadata(
        &mut self,
        subject: Subject,
        fragment: &str,
        patch: MetadataPatch,
    ) -> Result<()> {
        self.check_subject(&subject)?;
        self.metadata.upsert_fragment(subject, fragment, patch)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn remove_metadata(&mut self, subject: &Subject) -> Option<MetadataRecord> {
        let removed = self.metadata.remove_subject(subject);
        if removed.is_some() {
            self.mark_dirty();
        }
        removed
    }

    /// Rewrite manifest and metadata and commit the container.
    ///
    /// On failure the model and the archive on disk are unchanged and the
    /// state stays dirty.
    pub fn save(&mut self) -> Result<()> {
        let mut graph = self.metadata.clone();
        if self.options.prune_dangling_metadata {
            let manifest = &self.manifest;
            let pruned = graph.prune_dangling(|path| manifest.contains(path));
            if !pruned.is_empty() {
                debug!(count = pruned.len(), "Pruning dangling metadata on save");
            }
        }

        let metadata_doc = self.metadata_target(&graph)?;

        let mut saved = self.manifest.clone();
        if let Some(doc) = &metadata_doc {
            saved.add_entry(doc.clone())?;
        }

        if let Err(e) = self.stage_and_commit(&saved, &graph, metadata_doc.as_ref()) {
            // A freshly placed metadata document must not block the next save
            if let (None, Some(doc)) = (self.metadata_docs.first(), &metadata_doc) {
                if self.container.contains(&doc.path) {
                    self.rollback_write(&doc.path);
                }
            }
            return Err(e);
        }

        self.metadata = graph;
        self.metadata_docs = metadata_doc.into_iter().collect();
        self.state = ArchiveState::Clean;
        info!(
            entries = self.manifest.len(),
            metadata_subjects = self.metadata.len(),
            target = ?self.container.target(),
            "Saved COMBINE archive"
        );
        Ok(())
    }

    /// Finalized bytes of an in-memory archive after a save
    pub fn bytes(&self) -> Option<&[u8]> {
        self.container.bytes()
    }

    /// Release the archive without saving
    pub fn close(self) {
        if self.state == ArchiveState::Dirty {
            warn!(
                target = ?self.container.target(),
                "Closing COMBINE archive with unsaved changes"
            );
        }
    }

    fn stage_and_commit(
        &mut self,
        manifest: &Manifest,
        graph: &MetadataGraph,
        metadata_doc: Option<&EntryDescriptor>,
    ) -> Result<()> {
        let manifest_path = ArchivePath::new(MANIFEST_LOCATION)?;
        self.container.put_entry(
            &manifest_path,
            &manifest.serialize()[..],
            self.options.compression,
        )?;
        if let Some(doc) = metadata_doc {
            self.container
                .put_entry(&doc.path, &graph.serialize()[..], self.options.compression)?;
        }
        for stale in self.metadata_docs.iter().skip(1) {
            if self.container.contains(&stale.path) {
                self.container.remove_entry(&stale.path)?;
            }
        }

        self.container.commit()
    }

    /// Where the consolidated metadata document is written, if anywhere
    fn metadata_target(&self, graph: &MetadataGraph) -> Result<Option<EntryDescriptor>> {
        if let Some(first) = self.metadata_docs.first() {
            return Ok(Some(first.clone()));
        }
        if graph.is_empty() {
            return Ok(None);
        }

        let path = self.options.metadata_path()?;
        if self.manifest.contains(&path) || self.container.contains(&path) {
            return Err(CombineError::ReservedPath(path.to_string()));
        }
        Ok(Some(EntryDescriptor::new(path, format::OMEX_METADATA)))
    }

    fn is_metadata_document(&self, path: &ArchivePath) -> bool {
        self.metadata_docs.iter().any(|doc| &doc.path == path)
    }

    /// Paths that content operations may not target
    fn check_content_path(&self, path: &ArchivePath) -> Result<()> {
        let reserved = path.as_str() == MANIFEST_LOCATION
            || self.is_metadata_document(path)
            || (self.metadata_docs.is_empty()
                && self.options.metadata_location_matches(path)
                && !self.manifest.contains(path));
        if reserved {
            return Err(CombineError::ReservedPath(path.to_string()));
        }
        Ok(())
    }

    fn check_subject(&self, subject: &Subject) -> Result<()> {
        match subject {
            Subject::Entry(path) if !self.manifest.contains(path) => {
                Err(CombineError::UnknownPath(path.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn check_tracked(&self, path: &ArchivePath) -> Result<()> {
        if path.as_str() == MANIFEST_LOCATION || self.is_metadata_document(path) {
            return Err(CombineError::ReservedPath(path.to_string()));
        }
        if !self.manifest.contains(path) {
            return Err(CombineError::UnknownPath(path.to_string()));
        }
        Ok(())
    }

    fn normalize_format(&self, format: &str) -> Result<String> {
        let format = format.trim();
        if format.is_empty() {
            return Err(CombineError::InvalidFormat("empty format".to_string()));
        }

        let format = if self.options.strict_formats {
            format::check_format(format, self.options.convert_mime_types)?
        } else if self.options.convert_mime_types {
            format::convert_mimetype(format)
        } else {
            format.to_string()
        };

        if format::is_metadata_format(&format) {
            return Err(CombineError::InvalidFormat(format!(
                "{} is managed through the metadata API",
                format
            )));
        }
        Ok(format)
    }

    fn compression_for(&self, path: &ArchivePath) -> CompressionMethod {
        CompressionMethod::choose_for_file(path.as_str(), self.options.compression)
    }

    fn rollback_write(&mut self, path: &ArchivePath) {
        if let Err(e) = self.container.remove_entry(path) {
            warn!(entry = %path, error = %e, "Failed to roll back container write");
        }
    }

    fn mark_dirty(&mut self) {
        self.state = ArchiveState::Dirty;
    }
}
