//! OMEX metadata graph
//!
//! Metadata documents are RDF/XML with one `rdf:Description` per subject:
//!
//! ```text
//! <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
//!          xmlns:dcterms="http://purl.org/dc/terms/"
//!          xmlns:vCard="http://www.w3.org/2006/vcard/ns#">
//!   <rdf:Description rdf:about="./model.xml">
//!     <dcterms:creator>
//!       <rdf:Bag>
//!         <rdf:li rdf:parseType="Resource">
//!           <vCard:N rdf:parseType="Resource">
//!             <vCard:Family>Doe</vCard:Family>
//!             <vCard:Given>Jane</vCard:Given>
//!           </vCard:N>
//!         </rdf:li>
//!       </rdf:Bag>
//!     </dcterms:creator>
//!     <dcterms:created rdf:parseType="Resource">
//!       <dcterms:W3CDTF>2024-01-01T12:00:00Z</dcterms:W3CDTF>
//!     </dcterms:created>
//!   </rdf:Description>
//! </rdf:RDF>
//! ```
//!
//! Creators, created/modified timestamps and the description are modelled.
//! Every other property is kept as an extension: its original markup, keyed
//! by the property IRI, written back unchanged on save. A prefix the written
//! document would bind differently is re-declared on the fragment itself.
//!
//! Descriptions of fragments (`./model.xml#species_1`) are kept per owning
//! subject and follow it through renames and removal. Other top-level nodes
//! are carried through as written.

use crate::archive::ArchivePath;
use crate::error::{CombineError, Result};
use crate::warning::Warning;
use crate::xml::{self, escape_text, XmlElement};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const DCTERMS_NS: &str = "http://purl.org/dc/terms/";
pub const VCARD_NS: &str = "http://www.w3.org/2006/vcard/ns#";

/// Base of absolute subject IRIs (`http://omex-library.org/<name>.omex/<path>`)
const OMEX_LIBRARY_BASE: &str = "http://omex-library.org/";

/// Prefixes the serializer binds itself
const RESERVED_PREFIXES: [(&str, &str); 3] =
    [("rdf", RDF_NS), ("dcterms", DCTERMS_NS), ("vCard", VCARD_NS)];

/// What a metadata record is about
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subject {
    /// The archive as a whole
    Root,
    Entry(ArchivePath),
}

impl Subject {
    /// `rdf:about` value: `.` or `./path`
    pub fn about(&self) -> String {
        match self {
            Subject::Root => ".".to_string(),
            Subject::Entry(path) => path.to_location(),
        }
    }

    /// Resolve an `rdf:about` value
    pub fn from_about(about: &str) -> std::result::Result<Self, String> {
        let about = about.trim();
        if about.contains('#') {
            return Err(format!("{} names a fragment, not a subject", about));
        }

        let relative = match about.strip_prefix(OMEX_LIBRARY_BASE) {
            Some(rest) => match rest.find(".omex") {
                Some(end) => match &rest[end + ".omex".len()..] {
                    "" | "/" => return Ok(Subject::Root),
                    path => path,
                },
                None => return Err(format!("{} does not name an archive", about)),
            },
            None => about,
        };

        match relative {
            "" => Err("empty subject".to_string()),
            "." | "./" => Ok(Subject::Root),
            location => ArchivePath::from_location(location)
                .map(Subject::Entry)
                .map_err(|e| e.to_string()),
        }
    }

    /// Resolve an `rdf:about` value that may name a fragment inside the
    /// subject, as in `./model.xml#species_1`
    pub fn from_about_with_fragment(
        about: &str,
    ) -> std::result::Result<(Self, Option<String>), String> {
        let about = about.trim();
        match about.split_once('#') {
            None => Self::from_about(about).map(|subject| (subject, None)),
            Some((base, fragment)) if !base.is_empty() && is_fragment_id(fragment) => {
                Ok((Self::from_about(base)?, Some(fragment.to_string())))
            }
            Some(_) => Err(format!("{} does not name a fragment of the archive", about)),
        }
    }

    /// `rdf:about` value of a fragment inside this subject
    pub fn fragment_about(&self, fragment: &str) -> String {
        format!("{}#{}", self.about(), fragment)
    }

    pub fn path(&self) -> Option<&ArchivePath> {
        match self {
            Subject::Root => None,
            Subject::Entry(path) => Some(path),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Root => f.write_str("the archive"),
            Subject::Entry(path) => write!(f, "{}", path),
        }
    }
}

impl From<ArchivePath> for Subject {
    fn from(path: ArchivePath) -> Self {
        Subject::Entry(path)
    }
}

/// Anything that names a metadata subject: `"."` for the archive, an entry
/// path, or a [`Subject`]
pub trait IntoSubject {
    fn into_subject(self) -> Result<Subject>;
}

impl IntoSubject for Subject {
    fn into_subject(self) -> Result<Subject> {
        Ok(self)
    }
}

impl IntoSubject for &Subject {
    fn into_subject(self) -> Result<Subject> {
        Ok(self.clone())
    }
}

impl IntoSubject for &str {
    fn into_subject(self) -> Result<Subject> {
        match self.trim() {
            "." | "./" | "/" => Ok(Subject::Root),
            location => ArchivePath::from_location(location).map(Subject::Entry),
        }
    }
}

impl IntoSubject for String {
    fn into_subject(self) -> Result<Subject> {
        self.as_str().into_subject()
    }
}

impl IntoSubject for ArchivePath {
    fn into_subject(self) -> Result<Subject> {
        Ok(Subject::Entry(self))
    }
}

impl IntoSubject for &ArchivePath {
    fn into_subject(self) -> Result<Subject> {
        Ok(Subject::Entry(self.clone()))
    }
}

/// RFC 3339 date-time with an explicit offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<FixedOffset>);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(Utc::now().fixed_offset())
    }

    /// Parse the canonical form; anything without a full date, time and
    /// offset is rejected
    pub fn parse(text: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(text.trim())
            .map(Timestamp)
            .map_err(|_| CombineError::MalformedTimestamp(text.to_string()))
    }

    pub fn as_datetime(&self) -> &DateTime<FixedOffset> {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl FromStr for Timestamp {
    type Err = CombineError;

    fn from_str(s: &str) -> Result<Self> {
        Timestamp::parse(s)
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Timestamp(value)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Timestamp(value.fixed_offset())
    }
}

/// A person credited as creator (vCard)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Creator {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub organization: Option<String>,
}

impl Creator {
    pub fn new(given_name: impl Into<String>, family_name: impl Into<String>) -> Self {
        Self {
            given_name: Some(given_name.into()),
            family_name: Some(family_name.into()),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.given_name.is_none()
            && self.family_name.is_none()
            && self.email.is_none()
            && self.organization.is_none()
    }
}

/// Canonical metadata of one subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    pub subject: Subject,
    pub created: Option<Timestamp>,
    /// Modification history, oldest first
    pub modified: Vec<Timestamp>,
    pub creators: Vec<Creator>,
    pub description: Option<String>,
    /// Unmodelled properties: property IRI -> original XML fragment(s)
    pub extensions: BTreeMap<String, String>,
}

impl MetadataRecord {
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            created: None,
            modified: Vec::new(),
            creators: Vec::new(),
            description: None,
            extensions: BTreeMap::new(),
        }
    }

    pub fn last_modified(&self) -> Option<&Timestamp> {
        self.modified.last()
    }

    fn apply(&mut self, patch: MetadataPatch) {
        let stamp = patch.modified.unwrap_or_else(Timestamp::now);
        if self.created.is_none() {
            self.created = Some(stamp);
        }
        self.modified.push(stamp);
        for creator in patch.creators {
            push_creator(&mut self.creators, creator);
        }
        if patch.description.is_some() {
            self.description = patch.description;
        }
        self.extensions.extend(patch.extensions);
    }

    /// Merge a second record for the same subject into this one
    fn absorb(&mut self, other: MetadataRecord, warnings: &mut Vec<Warning>) {
        if self.created.is_none() {
            self.created = other.created;
        }
        for stamp in other.modified {
            if !self.modified.contains(&stamp) {
                self.modified.push(stamp);
            }
        }
        for creator in other.creators {
            push_creator(&mut self.creators, creator);
        }
        match (&self.description, other.description) {
            (None, description) => self.description = description,
            (Some(current), Some(description)) if *current != description => {
                warnings.push(Warning::ConflictingDescription {
                    subject: self.subject.clone(),
                });
            }
            _ => {}
        }
        for (property, fragment) in other.extensions {
            join_extension(&mut self.extensions, property, fragment);
        }
    }
}

/// Changes applied by [`MetadataGraph::upsert`]
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    /// Modification time to record; now when unset
    pub modified: Option<Timestamp>,
    pub creators: Vec<Creator>,
    pub description: Option<String>,
    /// Property IRI -> XML fragment for that property
    pub extensions: BTreeMap<String, String>,
}

impl MetadataPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn creator(mut self, creator: Creator) -> Self {
        self.creators.push(creator);
        self
    }

    pub fn modified_at(mut self, timestamp: Timestamp) -> Self {
        self.modified = Some(timestamp);
        self
    }

    /// Add an extension from its raw XML fragment
    pub fn extension(mut self, property: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.extensions.insert(property.into(), fragment.into());
        self
    }

    /// Add an extension holding a plain literal value
    pub fn literal(self, property: &str, value: &str) -> Result<Self> {
        let fragment = literal_fragment(property, value)?;
        Ok(self.extension(property, fragment))
    }

    /// Check that every extension fragment is well-formed XML
    pub fn validate(&self) -> Result<()> {
        for (property, fragment) in &self.extensions {
            check_fragment(property, fragment)?;
        }
        Ok(())
    }
}

/// XML fragment stating `property` with a literal `value`
pub fn literal_fragment(property: &str, value: &str) -> Result<String> {
    let split = property.rfind(['#', '/']).map_or(0, |index| index + 1);
    let (namespace, local) = property.split_at(split);
    if namespace.is_empty() || !is_xml_name(local) {
        return Err(CombineError::MalformedMetadata(format!(
            "{} cannot be written as an XML element",
            property
        )));
    }

    Ok(format!(
        "<ext:{local} xmlns:ext=\"{}\">{}</ext:{local}>",
        escape_text(namespace),
        escape_text(value),
    ))
}

fn is_fragment_id(fragment: &str) -> bool {
    !fragment.is_empty() && !fragment.contains('#') && !fragment.contains(char::is_whitespace)
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Metadata of every subject in one archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataGraph {
    records: BTreeMap<Subject, MetadataRecord>,
    /// Descriptions of fragments inside a subject, keyed by owner and fragment id
    fragments: BTreeMap<(Subject, String), MetadataRecord>,
    /// Top-level nodes that are not modelled, as written
    unmodelled: Vec<String>,
    /// Subjects read from a document that the manifest does not know
    pending: BTreeSet<Subject>,
    /// Extra namespace bindings carried over from the documents read
    namespaces: BTreeMap<String, String>,
}

impl MetadataGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one metadata document.
    ///
    /// `known` says which entry subjects exist; others are kept as pending
    /// and reported as dangling.
    pub fn parse<F>(data: &[u8], known: F) -> Result<(Self, Vec<Warning>)>
    where
        F: Fn(&ArchivePath) -> bool,
    {
        let mut graph = MetadataGraph::new();
        let warnings = graph.read_document(data, known)?;
        Ok((graph, warnings))
    }

    /// Parse a document and merge it into this graph.
    ///
    /// A document that is not RDF/XML fails with `MalformedMetadata` and
    /// leaves the graph unchanged; problems inside descriptions are returned
    /// as warnings.
    pub fn read_document<F>(&mut self, data: &[u8], known: F) -> Result<Vec<Warning>>
    where
        F: Fn(&ArchivePath) -> bool,
    {
        let text = std::str::from_utf8(data)
            .map_err(|_| CombineError::MalformedMetadata("document is not UTF-8".to_string()))?;
        let root = xml::parse_document(text)
            .map_err(|e| CombineError::MalformedMetadata(e.to_string()))?;
        if !root.is(RDF_NS, "RDF") {
            return Err(CombineError::MalformedMetadata(format!(
                "root element is {}, expected rdf:RDF",
                root.local
            )));
        }

        let mut warnings = Vec::new();
        let mut incoming = MetadataGraph::new();
        incoming.adopt_namespaces(&root.declarations);
        let document_scope: BTreeMap<String, String> =
            root.declarations.iter().cloned().collect();

        for node in &root.children {
            let about = node
                .attr(Some(RDF_NS), "about")
                .or_else(|| node.attr(None, "about"));
            let resolved = match about {
                Some(about) if node.is(RDF_NS, "Description") => {
                    Subject::from_about_with_fragment(about)
                }
                Some(_) => Err(format!("{} nodes are not modelled", node.expanded_name())),
                None => Err("node has no rdf:about".to_string()),
            };

            match resolved {
                Ok((subject, fragment)) => {
                    let mut scope = document_scope.clone();
                    scope.extend(node.declarations.iter().cloned());
                    let record =
                        read_description(text, node, subject, &scope, &document_scope, &mut warnings);
                    match fragment {
                        Some(fragment) => incoming.insert_fragment(fragment, record, &mut warnings),
                        None => incoming.insert_merged(record, &mut warnings),
                    }
                }
                Err(reason) => {
                    warnings.push(Warning::UnmodelledNode {
                        about: about.map_or_else(|| node.expanded_name(), str::to_string),
                        reason,
                    });
                    incoming.keep_unmodelled(redeclare(node.source(text), |prefix| {
                        document_scope
                            .get(prefix)
                            .filter(|namespace| {
                                written_binding(prefix, &document_scope) != Some(namespace.as_str())
                            })
                            .cloned()
                    }));
                }
            }
        }

        let owners: BTreeSet<Subject> = incoming
            .records
            .keys()
            .chain(incoming.fragments.keys().map(|(owner, _)| owner))
            .cloned()
            .collect();
        for subject in owners {
            if subject.path().is_some_and(|path| !known(path)) {
                warnings.push(Warning::DanglingMetadata {
                    subject: subject.clone(),
                });
                incoming.pending.insert(subject);
            }
        }

        self.merge(incoming, &mut warnings);
        Ok(warnings)
    }

    /// Merge another graph into this one
    pub fn merge(&mut self, mut other: MetadataGraph, warnings: &mut Vec<Warning>) {
        // Prefixes this graph already binds elsewhere must travel with the
        // fragments that use them
        let shadowed: BTreeMap<String, String> = other
            .namespaces
            .iter()
            .filter(|(prefix, namespace)| {
                self.namespaces.get(*prefix).is_some_and(|kept| kept != *namespace)
            })
            .map(|(prefix, namespace)| (prefix.clone(), namespace.clone()))
            .collect();
        if !shadowed.is_empty() {
            other.redeclare_fragments(&shadowed);
        }

        for (prefix, namespace) in other.namespaces {
            self.bind_namespace(prefix, namespace);
        }
        self.pending.extend(other.pending);
        for record in other.records.into_values() {
            self.insert_merged(record, warnings);
        }
        for ((_, fragment), record) in other.fragments {
            self.insert_fragment(fragment, record, warnings);
        }
        for node in other.unmodelled {
            self.keep_unmodelled(node);
        }
    }

    /// Serialize the whole graph as one RDF/XML document
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rdf:RDF");
        for (prefix, namespace) in RESERVED_PREFIXES {
            out.push_str(&format!("\n    xmlns:{}=\"{}\"", prefix, namespace));
        }
        for (prefix, namespace) in &self.namespaces {
            if prefix.is_empty() {
                out.push_str(&format!("\n    xmlns=\"{}\"", escape_text(namespace)));
            } else {
                out.push_str(&format!("\n    xmlns:{}=\"{}\"", prefix, escape_text(namespace)));
            }
        }
        out.push_str(">\n");

        for record in self.records.values() {
            write_record(&mut out, &record.subject.about(), record);
        }
        for ((owner, fragment), record) in &self.fragments {
            write_record(&mut out, &owner.fragment_about(fragment), record);
        }
        for node in &self.unmodelled {
            out.push_str("  ");
            out.push_str(node);
            out.push('\n');
        }

        out.push_str("</rdf:RDF>\n");
        out.into_bytes()
    }

    pub fn record(&self, subject: &Subject) -> Option<&MetadataRecord> {
        self.records.get(subject)
    }

    pub fn records(&self) -> impl Iterator<Item = &MetadataRecord> {
        self.records.values()
    }

    pub fn subjects(&self) -> impl Iterator<Item = &Subject> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.fragments.is_empty() && self.unmodelled.is_empty()
    }

    /// Metadata of a fragment inside `subject`
    pub fn fragment(&self, subject: &Subject, fragment: &str) -> Option<&MetadataRecord> {
        self.fragments.get(&(subject.clone(), fragment.to_string()))
    }

    /// Fragment records as `(owner, fragment id, record)`
    pub fn fragments(&self) -> impl Iterator<Item = (&Subject, &str, &MetadataRecord)> {
        self.fragments
            .iter()
            .map(|((owner, fragment), record)| (owner, fragment.as_str(), record))
    }

    /// Top-level nodes kept as written because they are not modelled
    pub fn unmodelled(&self) -> impl Iterator<Item = &str> {
        self.unmodelled.iter().map(String::as_str)
    }

    /// Whether the subject was read from a document but is unknown to the manifest
    pub fn is_pending(&self, subject: &Subject) -> bool {
        self.pending.contains(subject)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Subject> {
        self.pending.iter()
    }

    /// Apply a patch, creating the record if needed.
    ///
    /// Appends the patch's modification time (or now) to `modified`, and sets
    /// `created` to that same time only when it is absent. Creators already
    /// present are not repeated. Extension fragments must be well-formed XML;
    /// otherwise the graph is left unchanged.
    pub fn upsert(&mut self, subject: Subject, patch: MetadataPatch) -> Result<&MetadataRecord> {
        patch.validate()?;

        self.pending.remove(&subject);
        let record = self
            .records
            .entry(subject.clone())
            .or_insert_with(|| MetadataRecord::new(subject));
        record.apply(patch);

        Ok(record)
    }

    /// Apply a patch to a fragment inside `subject`, as [`MetadataGraph::upsert`]
    pub fn upsert_fragment(
        &mut self,
        subject: Subject,
        fragment: &str,
        patch: MetadataPatch,
    ) -> Result<&MetadataRecord> {
        if !is_fragment_id(fragment) {
            return Err(CombineError::MalformedMetadata(format!(
                "{:?} is not a fragment identifier",
                fragment
            )));
        }
        patch.validate()?;

        self.pending.remove(&subject);
        let record = self
            .fragments
            .entry((subject.clone(), fragment.to_string()))
            .or_insert_with(|| MetadataRecord::new(subject));
        record.apply(patch);

        Ok(record)
    }

    /// Drop a subject's record together with its fragment records
    pub fn remove_subject(&mut self, subject: &Subject) -> Option<MetadataRecord> {
        self.pending.remove(subject);
        self.fragments.retain(|(owner, _), _| owner != subject);
        self.records.remove(subject)
    }

    /// Re-key a subject's record and fragment records; returns false if it
    /// had none.
    ///
    /// Records already held under `to` are merged into the moved ones, which
    /// take precedence.
    pub fn rename_subject(&mut self, from: &Subject, to: Subject) -> bool {
        let record = self.records.remove(from);
        let moved_fragments: Vec<(String, MetadataRecord)> = {
            let keys: Vec<(Subject, String)> = self
                .fragments
                .keys()
                .filter(|(owner, _)| owner == from)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| self.fragments.remove(&key).map(|record| (key.1, record)))
                .collect()
        };
        if record.is_none() && moved_fragments.is_empty() {
            return false;
        }

        let was_pending = self.pending.remove(from);
        if let Some(record) = record {
            let merged = adopt_stale(record, to.clone(), self.records.remove(&to));
            self.records.insert(to.clone(), merged);
        }
        for (fragment, record) in moved_fragments {
            let key = (to.clone(), fragment);
            let merged = adopt_stale(record, to.clone(), self.fragments.remove(&key));
            self.fragments.insert(key, merged);
        }

        if was_pending {
            self.pending.insert(to);
        }
        true
    }

    /// Drop every pending record and every entry record `known` rejects
    pub fn prune_dangling<F>(&mut self, known: F) -> Vec<Subject>
    where
        F: Fn(&ArchivePath) -> bool,
    {
        let dangling: Vec<Subject> = self
            .records
            .keys()
            .filter(|subject| {
                self.pending.contains(*subject)
                    || subject.path().is_some_and(|path| !known(path))
            })
            .cloned()
            .collect();

        for subject in &dangling {
            self.records.remove(subject);
            debug!(subject = %subject, "Pruned dangling metadata");
        }
        let pending = std::mem::take(&mut self.pending);
        self.fragments.retain(|(owner, fragment), _| {
            let keep = !pending.contains(owner) && owner.path().map_or(true, |path| known(path));
            if !keep {
                debug!(subject = %owner, fragment = %fragment, "Pruned dangling fragment metadata");
            }
            keep
        });
        dangling
    }

    /// Clear the pending flag of subjects that `known` now accepts
    pub fn resolve_pending<F>(&mut self, known: F)
    where
        F: Fn(&ArchivePath) -> bool,
    {
        self.pending
            .retain(|subject| subject.path().is_some_and(|path| !known(path)));
    }

    fn insert_merged(&mut self, record: MetadataRecord, warnings: &mut Vec<Warning>) {
        match self.records.entry(record.subject.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => {
                debug!(subject = %record.subject, "Merging duplicate metadata record");
                slot.get_mut().absorb(record, warnings);
            }
        }
    }

    fn insert_fragment(&mut self, fragment: String, record: MetadataRecord, warnings: &mut Vec<Warning>) {
        match self.fragments.entry((record.subject.clone(), fragment)) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => slot.get_mut().absorb(record, warnings),
        }
    }

    fn keep_unmodelled(&mut self, node: String) {
        if !self.unmodelled.contains(&node) {
            self.unmodelled.push(node);
        }
    }

    /// Declare `bindings` on every stored fragment that uses one of their
    /// prefixes without declaring it
    fn redeclare_fragments(&mut self, bindings: &BTreeMap<String, String>) {
        let needed = |prefix: &str| bindings.get(prefix).cloned();
        for record in self.records.values_mut().chain(self.fragments.values_mut()) {
            for fragment in record.extensions.values_mut() {
                *fragment = redeclare(fragment, needed);
            }
        }
        for node in &mut self.unmodelled {
            *node = redeclare(node, needed);
        }
    }

    fn adopt_namespaces(&mut self, declarations: &[(String, String)]) {
        for (prefix, namespace) in declarations {
            self.bind_namespace(prefix.clone(), namespace.clone());
        }
    }

    fn bind_namespace(&mut self, prefix: String, namespace: String) {
        if matches!(prefix.as_str(), "xml" | "xmlns")
            || RESERVED_PREFIXES.iter().any(|(reserved, _)| *reserved == prefix)
        {
            return;
        }
        match self.namespaces.entry(prefix) {
            Entry::Vacant(slot) => {
                slot.insert(namespace);
            }
            Entry::Occupied(slot) => {
                if *slot.get() != namespace {
                    debug!(
                        prefix = %slot.key(),
                        kept = %slot.get(),
                        dropped = %namespace,
                        "Conflicting namespace binding"
                    );
                }
            }
        }
    }
}

/// Re-key `moved` to `to`, folding in a stale record already held there
fn adopt_stale(mut moved: MetadataRecord, to: Subject, stale: Option<MetadataRecord>) -> MetadataRecord {
    moved.subject = to;
    if let Some(stale) = stale {
        debug!(subject = %moved.subject, "Adopting stale metadata record");
        let mut ignored = Vec::new();
        moved.absorb(stale, &mut ignored);
    }
    moved
}

/// Namespace the serializer binds `prefix` to for a document declaring
/// `document_scope` on its root
fn written_binding<'a>(prefix: &str, document_scope: &'a BTreeMap<String, String>) -> Option<&'a str> {
    RESERVED_PREFIXES
        .iter()
        .find(|(reserved, _)| *reserved == prefix)
        .map(|(_, namespace)| *namespace)
        .or_else(|| document_scope.get(prefix).map(String::as_str))
}

/// Add namespace declarations to each top-level element of `markup` for the
/// prefixes it uses without declaring, as far as `needed` supplies them
fn redeclare<F>(markup: &str, needed: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    const OPEN: &str = "<fragment>";
    let wrapped = format!("{}{}</fragment>", OPEN, markup);
    let Ok(root) = xml::parse_document(&wrapped) else {
        return markup.to_string();
    };

    let mut out = String::with_capacity(markup.len());
    let mut copied = 0;
    for element in &root.children {
        let declarations: Vec<(String, String)> = element
            .free_prefixes()
            .into_iter()
            .filter_map(|prefix| needed(&prefix).map(|namespace| (prefix, namespace)))
            .collect();
        if declarations.is_empty() {
            continue;
        }

        let at = element.name_end - OPEN.len();
        let Some(head) = markup.get(copied..at) else {
            return markup.to_string();
        };
        out.push_str(head);
        for (prefix, namespace) in declarations {
            if prefix.is_empty() {
                out.push_str(&format!(" xmlns=\"{}\"", escape_text(&namespace)));
            } else {
                out.push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape_text(&namespace)));
            }
        }
        copied = at;
    }
    out.push_str(markup.get(copied..).unwrap_or_default());
    out
}

fn push_creator(creators: &mut Vec<Creator>, creator: Creator) {
    if !creator.is_empty() && !creators.contains(&creator) {
        creators.push(creator);
    }
}

fn join_extension(extensions: &mut BTreeMap<String, String>, property: String, fragment: String) {
    match extensions.entry(property) {
        Entry::Vacant(slot) => {
            slot.insert(fragment);
        }
        Entry::Occupied(mut slot) => {
            if !slot.get().contains(&fragment) {
                let joined = slot.get_mut();
                joined.push('\n');
                joined.push_str(&fragment);
            }
        }
    }
}

fn check_fragment(property: &str, fragment: &str) -> Result<()> {
    let wrapped = format!("<fragment>{}</fragment>", fragment);
    let root = xml::parse_document(&wrapped).map_err(|e| {
        CombineError::MalformedMetadata(format!("extension {} is not well-formed: {}", property, e))
    })?;
    if root.children.is_empty() || root.text_content().is_some() {
        return Err(CombineError::MalformedMetadata(format!(
            "extension {} must consist of property elements",
            property
        )));
    }
    Ok(())
}

fn read_description(
    input: &str,
    node: &XmlElement,
    subject: Subject,
    scope: &BTreeMap<String, String>,
    document_scope: &BTreeMap<String, String>,
    warnings: &mut Vec<Warning>,
) -> MetadataRecord {
    let mut record = MetadataRecord::new(subject);
    // Bindings in scope here that the written document will not provide
    let needed = |prefix: &str| {
        scope
            .get(prefix)
            .filter(|namespace| written_binding(prefix, document_scope) != Some(namespace.as_str()))
            .cloned()
    };

    for property in &node.children {
        let is_dcterms = property.namespace.as_deref() == Some(DCTERMS_NS);
        match property.local.as_str() {
            "creator" if is_dcterms => {
                for creator in read_creators(property) {
                    push_creator(&mut record.creators, creator);
                }
            }
            "created" if is_dcterms => {
                if let Some(stamp) = read_timestamp(property, &record.subject, warnings) {
                    record.created.get_or_insert(stamp);
                }
            }
            "modified" if is_dcterms => {
                if let Some(stamp) = read_timestamp(property, &record.subject, warnings) {
                    if !record.modified.contains(&stamp) {
                        record.modified.push(stamp);
                    }
                }
            }
            "description" if is_dcterms => {
                let text = property.text_content().map(str::to_string);
                match (&record.description, text) {
                    (None, text) => record.description = text,
                    (Some(current), Some(text)) if *current != text => {
                        warnings.push(Warning::ConflictingDescription {
                            subject: record.subject.clone(),
                        });
                    }
                    _ => {}
                }
            }
            _ => join_extension(
                &mut record.extensions,
                property.expanded_name(),
                redeclare(property.source(input), needed),
            ),
        }
    }

    record
}

fn read_timestamp(
    property: &XmlElement,
    subject: &Subject,
    warnings: &mut Vec<Warning>,
) -> Option<Timestamp> {
    let value = property
        .child(DCTERMS_NS, "W3CDTF")
        .and_then(XmlElement::text_content)
        .or_else(|| property.text_content())
        .unwrap_or_default();

    match Timestamp::parse(value) {
        Ok(stamp) => Some(stamp),
        Err(_) => {
            warnings.push(Warning::MalformedTimestamp {
                subject: subject.clone(),
                value: value.to_string(),
            });
            None
        }
    }
}

fn read_creators(property: &XmlElement) -> Vec<Creator> {
    let container = property.children.iter().find(|child| {
        child.namespace.as_deref() == Some(RDF_NS)
            && matches!(child.local.as_str(), "Bag" | "Seq" | "Alt")
    });

    let nodes: Vec<&XmlElement> = match container {
        Some(list) => list.children_named(RDF_NS, "li").collect(),
        None => vec![property],
    };

    nodes
        .into_iter()
        .map(|node| node.child(RDF_NS, "Description").unwrap_or(node))
        .filter_map(|node| {
            let creator = read_creator(node);
            if creator.is_empty() {
                debug!("Skipping creator without vCard properties");
                None
            } else {
                Some(creator)
            }
        })
        .collect()
}

fn read_creator(node: &XmlElement) -> Creator {
    let name = vcard_child(node, &["N", "n", "hasName"]);
    let organization = vcard_child(node, &["ORG", "org", "organization-name", "hasOrganizationName"]);

    Creator {
        family_name: name.and_then(|n| vcard_text(n, &["Family", "family-name"])),
        given_name: name.and_then(|n| vcard_text(n, &["Given", "given-name"])),
        email: vcard_child(node, &["EMAIL", "email", "hasEmail"]).and_then(|email| {
            email
                .text_content()
                .or_else(|| email.attr(Some(RDF_NS), "resource"))
                .map(|value| value.trim_start_matches("mailto:").to_string())
        }),
        organization: organization.and_then(|org| {
            vcard_text(org, &["Orgname", "organization-name"])
                .or_else(|| org.text_content().map(str::to_string))
        }),
    }
}

fn vcard_child<'a>(node: &'a XmlElement, names: &[&str]) -> Option<&'a XmlElement> {
    let node = node.child(RDF_NS, "Description").unwrap_or(node);
    names.iter().find_map(|name| node.child(VCARD_NS, name))
}

fn vcard_text(node: &XmlElement, names: &[&str]) -> Option<String> {
    vcard_child(node, names)
        .and_then(XmlElement::text_content)
        .map(str::to_string)
}

fn write_record(out: &mut String, about: &str, record: &MetadataRecord) {
    out.push_str(&format!(
        "  <rdf:Description rdf:about=\"{}\">\n",
        escape_text(about)
    ));

    if let Some(description) = &record.description {
        out.push_str(&format!(
            "    <dcterms:description>{}</dcterms:description>\n",
            escape_text(description)
        ));
    }

    if !record.creators.is_empty() {
        out.push_str("    <dcterms:creator>\n      <rdf:Bag>\n");
        for creator in &record.creators {
            write_creator(out, creator);
        }
        out.push_str("      </rdf:Bag>\n    </dcterms:creator>\n");
    }

    if let Some(created) = &record.created {
        write_timestamp(out, "created", created);
    }
    for modified in &record.modified {
        write_timestamp(out, "modified", modified);
    }

    for fragment in record.extensions.values() {
        out.push_str("    ");
        out.push_str(fragment);
        out.push('\n');
    }

    out.push_str("  </rdf:Description>\n");
}

fn write_creator(out: &mut String, creator: &Creator) {
    out.push_str("        <rdf:li rdf:parseType=\"Resource\">\n");

    if creator.family_name.is_some() || creator.given_name.is_some() {
        out.push_str("          <vCard:N rdf:parseType=\"Resource\">\n");
        if let Some(family) = &creator.family_name {
            out.push_str(&format!(
                "            <vCard:Family>{}</vCard:Family>\n",
                escape_text(family)
            ));
        }
        if let Some(given) = &creator.given_name {
            out.push_str(&format!(
                "            <vCard:Given>{}</vCard:Given>\n",
                escape_text(given)
            ));
        }
        out.push_str("          </vCard:N>\n");
    }
    if let Some(email) = &creator.email {
        out.push_str(&format!("          <vCard:EMAIL>{}</vCard:EMAIL>\n", escape_text(email)));
    }
    if let Some(organization) = &creator.organization {
        out.push_str(&format!(
            "          <vCard:ORG rdf:parseType=\"Resource\">\n            <vCard:Orgname>{}</vCard:Orgname>\n          </vCard:ORG>\n",
            escape_text(organization)
        ));
    }

    out.push_str("        </rdf:li>\n");
}

fn write_timestamp(out: &mut String, property: &str, timestamp: &Timestamp) {
    out.push_str(&format!(
        "    <dcterms:{property} rdf:parseType=\"Resource\">\n      <dcterms:W3CDTF>{timestamp}</dcterms:W3CDTF>\n    </dcterms:{property}>\n"
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:dcterms="http://purl.org/dc/terms/"
         xmlns:vCard="http://www.w3.org/2006/vcard/ns#"
         xmlns:bqbiol="http://biomodels.net/biology-qualifiers/">
  <rdf:Description rdf:about=".">
    <dcterms:description>Example archive</dcterms:description>
    <dcterms:created rdf:parseType="Resource">
      <dcterms:W3CDTF>2014-06-25T10:30:00+02:00</dcterms:W3CDTF>
    </dcterms:created>
  </rdf:Description>
  <rdf:Description rdf:about="./model.xml">
    <dcterms:creator>
      <rdf:Bag>
        <rdf:li rdf:parseType="Resource">
          <vCard:N rdf:parseType="Resource">
            <vCard:Family>Doe</vCard:Family>
            <vCard:Given>Jane</vCard:Given>
          </vCard:N>
          <vCard:EMAIL>jane@example.org</vCard:EMAIL>
          <vCard:ORG rdf:parseType="Resource">
            <vCard:Orgname>Example Lab</vCard:Orgname>
          </vCard:ORG>
        </rdf:li>
      </rdf:Bag>
    </dcterms:creator>
    <dcterms:modified rdf:parseType="Resource">
      <dcterms:W3CDTF>2015-01-01T00:00:00Z</dcterms:W3CDTF>
    </dcterms:modified>
    <bqbiol:is rdf:resource="http://identifiers.org/GO:0007049"/>
  </rdf:Description>
</rdf:RDF>
"#;

    fn path(raw: &str) -> ArchivePath {
        ArchivePath::from_location(raw).unwrap()
    }

    fn entry(raw: &str) -> Subject {
        Subject::Entry(path(raw))
    }

    #[test]
    fn test_parse_sample() {
        let (graph, warnings) = MetadataGraph::parse(SAMPLE.as_bytes(), |_| true).unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);

        let root = graph.record(&Subject::Root).unwrap();
        assert_eq!(root.description.as_deref(), Some("Example archive"));
        assert_eq!(
            root.created.unwrap().to_string(),
            "2014-06-25T10:30:00+02:00"
        );

        let model = graph.record(&entry("model.xml")).unwrap();
        assert_eq!(
            model.creators,
            vec![Creator::new("Jane", "Doe")
                .with_email("jane@example.org")
                .with_organization("Example Lab")]
        );
        assert_eq!(model.modified.len(), 1);
        assert_eq!(
            model.extensions["http://biomodels.net/biology-qualifiers/is"],
            r#"<bqbiol:is rdf:resource="http://identifiers.org/GO:0007049"/>"#
        );
    }

    #[test]
    fn test_serialize_roundtrip_keeps_extensions_verbatim() {
        let (graph, _) = MetadataGraph::parse(SAMPLE.as_bytes(), |_| true).unwrap();
        let (reparsed, warnings) = MetadataGraph::parse(&graph.serialize(), |_| true).unwrap();

        assert!(warnings.is_empty());
        assert_eq!(reparsed.records().collect::<Vec<_>>(), graph.records().collect::<Vec<_>>());

        let text = String::from_utf8(reparsed.serialize()).unwrap();
        assert!(text.contains("xmlns:bqbiol=\"http://biomodels.net/biology-qualifiers/\""));
    }

    #[test]
    fn test_unknown_subjects_are_pending() {
        let (mut graph, warnings) =
            MetadataGraph::parse(SAMPLE.as_bytes(), |p| p.as_str() != "model.xml").unwrap();

        assert_eq!(
            warnings,
            vec![Warning::DanglingMetadata {
                subject: entry("model.xml")
            }]
        );
        assert!(graph.is_pending(&entry("model.xml")));

        let pruned = graph.prune_dangling(|p| p.as_str() != "model.xml");
        assert_eq!(pruned, vec![entry("model.xml")]);
        assert!(graph.record(&entry("model.xml")).is_none());
        assert!(graph.record(&Subject::Root).is_some());
    }

    #[test]
    fn test_malformed_timestamp_drops_only_that_property() {
        let doc = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
                 xmlns:dcterms="http://purl.org/dc/terms/">
  <rdf:Description rdf:about="./a.txt">
    <dcterms:created>2014-06-25</dcterms:created>
    <dcterms:modified>2014-06-26T08:00:00Z</dcterms:modified>
    <dcterms:description>kept</dcterms:description>
  </rdf:Description>
</rdf:RDF>"#;

        let (graph, warnings) = MetadataGraph::parse(doc.as_bytes(), |_| true).unwrap();
        assert_eq!(
            warnings,
            vec![Warning::MalformedTimestamp {
                subject: entry("a.txt"),
                value: "2014-06-25".to_string()
            }]
        );

        let record = graph.record(&entry("a.txt")).unwrap();
        assert!(record.created.is_none());
        assert_eq!(record.modified.len(), 1);
        assert_eq!(record.description.as_deref(), Some("kept"));
    }

    #[test]
    fn test_duplicate_descriptions_are_merged() {
        let doc = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
                 xmlns:dcterms="http://purl.org/dc/terms/">
  <rdf:Description rdf:about="./a.txt">
    <dcterms:created>2014-01-01T00:00:00Z</dcterms:created>
    <dcterms:modified>2014-01-02T00:00:00Z</dcterms:modified>
    <dcterms:description>first</dcterms:description>
  </rdf:Description>
  <rdf:Description rdf:about="a.txt">
    <dcterms:created>2015-01-01T00:00:00Z</dcterms:created>
    <dcterms:modified>2014-01-02T00:00:00Z</dcterms:modified>
    <dcterms:modified>2014-01-03T00:00:00Z</dcterms:modified>
    <dcterms:description>second</dcterms:description>
  </rdf:Description>
</rdf:RDF>"#;

        let (graph, warnings) = MetadataGraph::parse(doc.as_bytes(), |_| true).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(
            warnings,
            vec![Warning::ConflictingDescription {
                subject: entry("a.txt")
            }]
        );

        let record = graph.record(&entry("a.txt")).unwrap();
        assert_eq!(record.created.unwrap().to_string(), "2014-01-01T00:00:00Z");
        assert_eq!(record.modified.len(), 2);
        assert_eq!(record.description.as_deref(), Some("first"));
    }

    #[test]
    fn test_upsert_appends_modified_and_sets_created_once() {
        let mut graph = MetadataGraph::new();
        let first = Timestamp::parse("2020-01-01T00:00:00Z").unwrap();
        let second = Timestamp::parse("2020-02-01T00:00:00Z").unwrap();

        graph
            .upsert(
                Subject::Root,
                MetadataPatch::new().description("one").modified_at(first),
            )
            .unwrap();
        let record = graph
            .upsert(
                Subject::Root,
                MetadataPatch::new().description("two").modified_at(second),
            )
            .unwrap();

        assert_eq!(record.created, Some(first));
        assert_eq!(record.modified, vec![first, second]);
        assert_eq!(record.description.as_deref(), Some("two"));
    }

    #[test]
    fn test_upsert_rejects_broken_extension() {
        let mut graph = MetadataGraph::new();
        let result = graph.upsert(
            Subject::Root,
            MetadataPatch::new().extension("urn:x:p", "<unclosed>"),
        );
        assert!(matches!(result, Err(CombineError::MalformedMetadata(_))));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_literal_extension_roundtrip() {
        let mut graph = MetadataGraph::new();
        let patch = MetadataPatch::new()
            .literal("http://example.org/terms#license", "CC0 & friends")
            .unwrap();
        graph.upsert(Subject::Root, patch).unwrap();

        let (reparsed, _) = MetadataGraph::parse(&graph.serialize(), |_| true).unwrap();
        let record = reparsed.record(&Subject::Root).unwrap();
        assert_eq!(
            record.extensions["http://example.org/terms#license"],
            graph.record(&Subject::Root).unwrap().extensions["http://example.org/terms#license"]
        );
        assert!(literal_fragment("no-namespace", "x").is_err());
    }

    #[test]
    fn test_rename_subject_moves_record() {
        let mut graph = MetadataGraph::new();
        graph
            .upsert(entry("a/b.xml"), MetadataPatch::new().description("model"))
            .unwrap();

        assert!(graph.rename_subject(&entry("a/b.xml"), entry("c/d.xml")));
        assert!(graph.record(&entry("a/b.xml")).is_none());
        let record = graph.record(&entry("c/d.xml")).unwrap();
        assert_eq!(record.subject, entry("c/d.xml"));
        assert_eq!(record.description.as_deref(), Some("model"));
        assert!(!graph.rename_subject(&entry("a/b.xml"), entry("e.xml")));
    }

    #[test]
    fn test_subject_resolution() {
        assert_eq!(Subject::from_about("."), Ok(Subject::Root));
        assert_eq!(Subject::from_about("./dir/x.xml"), Ok(entry("dir/x.xml")));
        assert_eq!(
            Subject::from_about("http://omex-library.org/Model.omex"),
            Ok(Subject::Root)
        );
        assert_eq!(
            Subject::from_about("http://omex-library.org/Model.omex/model.xml"),
            Ok(entry("model.xml"))
        );
        assert!(Subject::from_about("./model.xml#species_1").is_err());
        assert!(Subject::from_about("./../x").is_err());
        assert_eq!(entry("dir/x.xml").about(), "./dir/x.xml");
    }

    #[test]
    fn test_not_rdf_is_malformed() {
        assert!(matches!(
            MetadataGraph::parse(b"<html/>", |_| true),
            Err(CombineError::MalformedMetadata(_))
        ));
        assert!(matches!(
            MetadataGraph::parse(b"<rdf:RDF", |_| true),
            Err(CombineError::MalformedMetadata(_))
        ));
    }

    fn extension_keys(record: &MetadataRecord) -> Vec<&str> {
        record.extensions.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_shadowed_prefix_survives_roundtrip() {
        let doc = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:ex="urn:first#">
  <rdf:Description rdf:about="./a.xml">
    <ex:p>one</ex:p>
  </rdf:Description>
  <rdf:Description rdf:about="./b.xml" xmlns:ex="urn:second#" xmlns="urn:default#">
    <ex:p>two</ex:p>
    <plain>three</plain>
  </rdf:Description>
</rdf:RDF>"#;

        let (graph, _) = MetadataGraph::parse(doc.as_bytes(), |_| true).unwrap();
        assert_eq!(extension_keys(graph.record(&entry("a.xml")).unwrap()), vec!["urn:first#p"]);
        assert_eq!(
            graph.record(&entry("a.xml")).unwrap().extensions["urn:first#p"],
            "<ex:p>one</ex:p>"
        );
        assert_eq!(
            extension_keys(graph.record(&entry("b.xml")).unwrap()),
            vec!["urn:default#plain", "urn:second#p"]
        );

        let (reparsed, _) = MetadataGraph::parse(&graph.serialize(), |_| true).unwrap();
        assert_eq!(
            extension_keys(reparsed.record(&entry("a.xml")).unwrap()),
            vec!["urn:first#p"]
        );
        assert_eq!(
            extension_keys(reparsed.record(&entry("b.xml")).unwrap()),
            vec!["urn:default#plain", "urn:second#p"]
        );
    }

    #[test]
    fn test_merging_documents_with_conflicting_prefixes() {
        let first = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:ex="urn:first#">
  <rdf:Description rdf:about="."><ex:p>one</ex:p></rdf:Description>
</rdf:RDF>"#;
        let second = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:ex="urn:second#">
  <rdf:Description rdf:about="./b.xml"><ex:q>two</ex:q></rdf:Description>
</rdf:RDF>"#;

        let mut graph = MetadataGraph::new();
        graph.read_document(first.as_bytes(), |_| true).unwrap();
        graph.read_document(second.as_bytes(), |_| true).unwrap();
        assert_eq!(
            graph.record(&entry("b.xml")).unwrap().extensions["urn:second#q"],
            r#"<ex:q xmlns:ex="urn:second#">two</ex:q>"#
        );

        let (reparsed, _) = MetadataGraph::parse(&graph.serialize(), |_| true).unwrap();
        assert_eq!(extension_keys(reparsed.record(&Subject::Root).unwrap()), vec!["urn:first#p"]);
        assert_eq!(
            extension_keys(reparsed.record(&entry("b.xml")).unwrap()),
            vec!["urn:second#q"]
        );
    }

    #[test]
    fn test_fragment_and_unmodelled_nodes_are_kept() {
        let doc = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:dcterms="http://purl.org/dc/terms/"
         xmlns:bqbiol="http://biomodels.net/biology-qualifiers/">
  <rdf:Description rdf:about="./model.xml#species_1">
    <bqbiol:is rdf:resource="http://identifiers.org/CHEBI:17234"/>
  </rdf:Description>
  <rdf:Description rdf:nodeID="n1">
    <dcterms:description>blank</dcterms:description>
  </rdf:Description>
</rdf:RDF>"#;

        let (graph, warnings) = MetadataGraph::parse(doc.as_bytes(), |_| true).unwrap();
        assert!(matches!(warnings.as_slice(), [Warning::UnmodelledNode { .. }]));
        assert!(graph.record(&entry("model.xml")).is_none());
        assert!(graph.fragment(&entry("model.xml"), "species_1").is_some());
        assert_eq!(graph.unmodelled().count(), 1);

        let (reparsed, _) = MetadataGraph::parse(&graph.serialize(), |_| true).unwrap();
        assert_eq!(
            reparsed.fragment(&entry("model.xml"), "species_1"),
            graph.fragment(&entry("model.xml"), "species_1")
        );
        assert_eq!(
            reparsed.unmodelled().collect::<Vec<_>>(),
            graph.unmodelled().collect::<Vec<_>>()
        );

        let mut graph = graph;
        graph.remove_subject(&entry("model.xml"));
        assert!(graph.fragment(&entry("model.xml"), "species_1").is_none());
    }

    #[test]
    fn test_pending_fragment_owner_is_pruned() {
        let doc = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:dcterms="http://purl.org/dc/terms/">
  <rdf:Description rdf:about="./gone.xml#x">
    <dcterms:description>orphan</dcterms:description>
  </rdf:Description>
</rdf:RDF>"#;

        let (mut graph, warnings) = MetadataGraph::parse(doc.as_bytes(), |_| false).unwrap();
        assert_eq!(
            warnings,
            vec![Warning::DanglingMetadata {
                subject: entry("gone.xml")
            }]
        );
        graph.prune_dangling(|_| false);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_rename_onto_stale_record_merges() {
        let mut graph = MetadataGraph::new();
        let old = Timestamp::parse("2001-01-01T00:00:00Z").unwrap();
        let new = Timestamp::parse("2002-01-01T00:00:00Z").unwrap();
        graph
            .upsert(entry("stale.xml"), MetadataPatch::new().description("stale").modified_at(old))
            .unwrap();
        graph
            .upsert(entry("a.xml"), MetadataPatch::new().description("live").modified_at(new))
            .unwrap();

        assert!(graph.rename_subject(&entry("a.xml"), entry("stale.xml")));
        let record = graph.record(&entry("stale.xml")).unwrap();
        assert_eq!(record.description.as_deref(), Some("live"));
        assert_eq!(record.modified, vec![new, old]);
        assert_eq!(record.created, Some(new));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_fragment_subject_resolution() {
        assert_eq!(
            Subject::from_about_with_fragment("./model.xml#species_1"),
            Ok((entry("model.xml"), Some("species_1".to_string())))
        );
        assert_eq!(
            Subject::from_about_with_fragment("http://omex-library.org/M.omex/model.xml#s"),
            Ok((entry("model.xml"), Some("s".to_string())))
        );
        assert_eq!(Subject::from_about_with_fragment("."), Ok((Subject::Root, None)));
        assert!(Subject::from_about_with_fragment("#local").is_err());
        assert!(Subject::from_about_with_fragment("./model.xml#").is_err());
        assert_eq!(entry("model.xml").fragment_about("species_1"), "./model.xml#species_1");
    }
}

