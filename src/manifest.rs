//! COMBINE archive manifest (`manifest.xml`)
//!
//! # Manifest Scope
//!
//! The manifest lists every tracked entry with its location, a format
//! identifier and an optional master flag:
//!
//! ```text
//! <omexManifest xmlns="http://identifiers.org/combine.specifications/omex-manifest">
//!   <content location="." format="http://identifiers.org/combine.specifications/omex"/>
//!   <content location="./manifest.xml" format="http://identifiers.org/combine.specifications/omex-manifest"/>
//!   <content location="./model.xml" format="http://identifiers.org/combine.specifications/sbml" master="true"/>
//! </omexManifest>
//! ```
//!
//! The `.` declaration and the manifest's own entry are implicit: they are
//! read and written but never exposed as [`EntryDescriptor`]s.
//!
//! Entries keep insertion order. Serialization writes the master entry first,
//! then the rest in that order, so an unmodified manifest round-trips to the
//! same structure (formatting is not preserved).

use crate::archive::{ArchivePath, MANIFEST_LOCATION};
use crate::error::{CombineError, Result};
use crate::format;
use crate::xml::{self, escape_text};

/// Namespace of the manifest document
pub const MANIFEST_NS: &str = "http://identifiers.org/combine.specifications/omex-manifest";

/// One tracked entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDescriptor {
    pub path: ArchivePath,
    pub format: String,
    pub master: bool,
}

impl EntryDescriptor {
    pub fn new(path: ArchivePath, format: impl Into<String>) -> Self {
        Self {
            path,
            format: format.into(),
            master: false,
        }
    }

    pub fn with_master(mut self, master: bool) -> Self {
        self.master = master;
        self
    }
}

/// In-memory manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<EntryDescriptor>,
    archive_format: Option<String>,
}

impl Manifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a manifest document.
    ///
    /// Fails with `MalformedManifest` when the document is not a manifest or a
    /// content element lacks its location or format, and with
    /// `AmbiguousMaster` when more than one entry is flagged master.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| CombineError::MalformedManifest("manifest is not UTF-8".to_string()))?;
        let root = xml::parse_document(text)
            .map_err(|e| CombineError::MalformedManifest(e.to_string()))?;

        if !root.is(MANIFEST_NS, "omexManifest") {
            return Err(CombineError::MalformedManifest(format!(
                "root element is {{{}}}{}, expected omexManifest",
                root.namespace.as_deref().unwrap_or_default(),
                root.local
            )));
        }

        let mut manifest = Manifest::new();
        for content in root.children_named(MANIFEST_NS, "content") {
            let location = content.attr(None, "location").map(str::trim).unwrap_or_default();
            let format = content.attr(None, "format").map(str::trim).unwrap_or_default();
            if location.is_empty() || format.is_empty() {
                return Err(CombineError::MalformedManifest(
                    "content elements need both location and format".to_string(),
                ));
            }

            if matches!(location, "." | "./" | "/") {
                manifest.archive_format = Some(format.to_string());
                continue;
            }

            let path = ArchivePath::from_location(location)
                .map_err(|e| CombineError::MalformedManifest(e.to_string()))?;
            if path.as_str() == MANIFEST_LOCATION {
                continue;
            }
            if manifest.contains(&path) {
                return Err(CombineError::MalformedManifest(format!(
                    "{} is declared more than once",
                    path
                )));
            }

            let master = content
                .attr(None, "master")
                .map(|value| parse_flag(value.trim()))
                .unwrap_or(false);
            manifest.entries.push(EntryDescriptor {
                path,
                format: format.to_string(),
                master,
            });
        }

        let masters: Vec<String> = manifest
            .entries
            .iter()
            .filter(|entry| entry.master)
            .map(|entry| entry.path.to_string())
            .collect();
        if masters.len() > 1 {
            return Err(CombineError::AmbiguousMaster(masters));
        }

        Ok(manifest)
    }

    /// Serialize to a manifest document
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<omexManifest xmlns="http://identifiers.org/combine.specifications/omex-manifest">
"#,
        );

        let archive_format = self.archive_format.as_deref().unwrap_or(format::OMEX);
        out.push_str(&format!(
            "  <content location=\".\" format=\"{}\"/>\n",
            escape_text(archive_format)
        ));
        out.push_str(&format!(
            "  <content location=\"./{}\" format=\"{}\"/>\n",
            MANIFEST_LOCATION,
            format::OMEX_MANIFEST
        ));

        for entry in self.ordered() {
            out.push_str(&format!(
                "  <content location=\"{}\" format=\"{}\"{}/>\n",
                escape_text(&entry.path.to_location()),
                escape_text(&entry.format),
                if entry.master { " master=\"true\"" } else { "" }
            ));
        }

        out.push_str("</omexManifest>\n");
        out.into_bytes()
    }

    /// Add an entry.
    ///
    /// Fails with `DuplicatePath` if the path is listed, `ConflictingMaster`
    /// if the entry is master while another master exists.
    pub fn add_entry(&mut self, entry: EntryDescriptor) -> Result<()> {
        if entry.path.as_str() == MANIFEST_LOCATION {
            return Err(CombineError::ReservedPath(entry.path.to_string()));
        }
        if self.contains(&entry.path) {
            return Err(CombineError::DuplicatePath(entry.path.to_string()));
        }
        if entry.master {
            if let Some(current) = self.master() {
                return Err(CombineError::ConflictingMaster {
                    requested: entry.path.to_string(),
                    current: current.path.to_string(),
                });
            }
        }

        self.entries.push(entry);
        Ok(())
    }

    /// Remove an entry, returning its descriptor
    pub fn remove_entry(&mut self, path: &ArchivePath) -> Result<EntryDescriptor> {
        let index = self
            .position(path)
            .ok_or_else(|| CombineError::UnknownPath(path.to_string()))?;
        Ok(self.entries.remove(index))
    }

    /// Make `path` the master entry, clearing any previous master
    pub fn set_master(&mut self, path: &ArchivePath) -> Result<()> {
        let index = self
            .position(path)
            .ok_or_else(|| CombineError::UnknownPath(path.to_string()))?;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.master = i == index;
        }
        Ok(())
    }

    /// Clear the master flag from every entry
    pub fn clear_master(&mut self) {
        for entry in &mut self.entries {
            entry.master = false;
        }
    }

    /// Move an entry to a new path, keeping its position, format and flag
    pub fn rename_entry(&mut self, from: &ArchivePath, to: &ArchivePath) -> Result<()> {
        if to.as_str() == MANIFEST_LOCATION {
            return Err(CombineError::ReservedPath(to.to_string()));
        }
        if self.contains(to) {
            return Err(CombineError::DuplicatePath(to.to_string()));
        }
        let index = self
            .position(from)
            .ok_or_else(|| CombineError::UnknownPath(from.to_string()))?;
        self.entries[index].path = to.clone();
        Ok(())
    }

    /// Replace the format of an entry
    pub fn set_format(&mut self, path: &ArchivePath, format: impl Into<String>) -> Result<()> {
        let index = self
            .position(path)
            .ok_or_else(|| CombineError::UnknownPath(path.to_string()))?;
        self.entries[index].format = format.into();
        Ok(())
    }

    pub fn get(&self, path: &ArchivePath) -> Option<&EntryDescriptor> {
        self.position(path).map(|index| &self.entries[index])
    }

    pub fn contains(&self, path: &ArchivePath) -> bool {
        self.position(path).is_some()
    }

    /// The master entry, if any
    pub fn master(&self) -> Option<&EntryDescriptor> {
        self.entries.iter().find(|entry| entry.master)
    }

    /// Entries in insertion order
    pub fn entries(&self) -> impl Iterator<Item = &EntryDescriptor> {
        self.entries.iter()
    }

    /// Entries in serialization order: master first, then insertion order
    pub fn ordered(&self) -> impl Iterator<Item = &EntryDescriptor> {
        self.master()
            .into_iter()
            .chain(self.entries.iter().filter(|entry| !entry.master))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Format declared for the archive itself (`.` entry)
    pub fn archive_format(&self) -> Option<&str> {
        self.archive_format.as_deref()
    }

    fn position(&self, path: &ArchivePath) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.path == path)
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}
