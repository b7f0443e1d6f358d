//! combine-archive: read, write and edit COMBINE archives (OMEX)
//!
//! A COMBINE archive is a zip container with three parallel views of its
//! content:
//! - the physical entries of the zip
//! - a manifest (`manifest.xml`) declaring each entry's format and the master file
//! - OMEX metadata (RDF/XML) describing the archive and its entries
//!
//! [`CombineArchive`] keeps the three consistent: adding, removing or renaming
//! a file updates all of them, and opening an archive produced by another tool
//! cross-checks them and reports anything it had to tolerate as a [`Warning`].
//!
//! # Example
//!
//! ```no_run
//! use combine_archive::{format, CombineArchive, Creator, MetadataPatch};
//!
//! let mut archive = CombineArchive::create("example.omex")?;
//! archive.add_file("model.xml", &b"<sbml/>"[..], format::SBML, true)?;
//! archive.add_file("data.csv", &b"t,x\n0,1\n"[..], "text/csv", false)?;
//! archive.set_metadata(
//!     "model.xml",
//!     MetadataPatch::new()
//!         .description("Toy model")
//!         .creator(Creator::new("Jane", "Doe")),
//! )?;
//! archive.save()?;
//!
//! let archive = CombineArchive::open("example.omex")?;
//! assert_eq!(archive.master().unwrap().path.as_str(), "model.xml");
//! assert!(archive.warnings().is_empty());
//! # Ok::<(), combine_archive::CombineError>(())
//! ```

// Core modules
pub mod archive;
pub mod coordinator;
pub mod error;
pub mod format;
pub mod manifest;
pub mod metadata;
pub mod options;
pub mod warning;
pub mod xml;

mod combine;

// Re-export commonly used types
pub use archive::{ArchivePath, CompressionMethod, IntoArchivePath, MANIFEST_LOCATION};
pub use combine::CombineArchive;
pub use coordinator::ArchiveState;
pub use error::{CombineError, Result};
pub use manifest::{EntryDescriptor, Manifest};
pub use metadata::{
    Creator, IntoSubject, MetadataGraph, MetadataPatch, MetadataRecord, Subject, Timestamp,
};
pub use options::ArchiveOptions;
pub use warning::Warning;
