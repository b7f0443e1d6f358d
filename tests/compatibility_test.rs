//! Archives written by other tools
//!
//! These archives are assembled entry by entry with `zip::ZipWriter` so that
//! every quirk (backslash separators, directory markers, stray files, several
//! metadata documents) is under the test's control.

use combine_archive::{format, CombineArchive, CombineError, MetadataPatch, Subject, Warning};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const MANIFEST_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<omexManifest xmlns="http://identifiers.org/combine.specifications/omex-manifest">
  <content location="." format="http://identifiers.org/combine.specifications/omex"/>
  <content location="./manifest.xml" format="http://identifiers.org/combine.specifications/omex-manifest"/>
"#;

fn manifest(contents: &[(&str, &str, bool)]) -> String {
    let mut doc = MANIFEST_HEADER.to_string();
    for (location, format, master) in contents {
        doc.push_str(&format!(
            "  <content location=\"{}\" format=\"{}\" master=\"{}\"/>\n",
            location, format, master
        ));
    }
    doc.push_str("</omexManifest>\n");
    doc
}

fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .unwrap();
        } else {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

const RDF_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:dcterms="http://purl.org/dc/terms/"
         xmlns:vCard="http://www.w3.org/2006/vcard/ns#"
         xmlns:bqmodel="http://biomodels.net/model-qualifiers/">
"#;

#[test]
fn test_missing_content_is_flagged() {
    let manifest = manifest(&[
        ("./model.xml", format::SBML, true),
        ("./data.csv", "http://purl.org/NET/mediatypes/text/csv", false),
    ]);
    let bytes = build_zip(&[
        ("manifest.xml", manifest.as_bytes()),
        ("model.xml", b"<sbml/>"),
    ]);

    let archive = CombineArchive::from_bytes(bytes).unwrap();

    assert!(archive.warnings().contains(&Warning::MissingContent {
        path: "data.csv".parse().unwrap()
    }));
    assert!(!archive.contains("data.csv"));
    assert_eq!(archive.entries().count(), 1);
}

#[test]
fn test_backslashes_and_directory_markers() {
    let manifest = manifest(&[("./model/BIOMD.xml", format::SBML, true)]);
    let bytes = build_zip(&[
        ("model/", b""),
        ("manifest.xml", manifest.as_bytes()),
        ("model\\BIOMD.xml", b"<sbml/>"),
    ]);

    let mut archive = CombineArchive::from_bytes(bytes).unwrap();
    assert!(archive.warnings().is_empty(), "{:?}", archive.warnings());
    assert_eq!(archive.read_entry_to_vec("model/BIOMD.xml").unwrap(), b"<sbml/>");

    // Saving rewrites the name with forward slashes
    archive.save().unwrap();
    let saved = archive.bytes().unwrap().to_vec();
    let zip = zip::ZipArchive::new(Cursor::new(saved)).unwrap();
    let names: Vec<&str> = zip.file_names().collect();
    assert!(names.contains(&"model/BIOMD.xml"));
    assert!(!names.iter().any(|name| name.contains('\\')));
}

#[test]
fn test_untracked_entries_are_reported_and_kept() {
    let manifest = manifest(&[("./model.xml", format::SBML, true)]);
    let bytes = build_zip(&[
        ("manifest.xml", manifest.as_bytes()),
        ("model.xml", b"<sbml/>"),
        ("notes/readme.txt", b"stray"),
    ]);

    let mut archive = CombineArchive::from_bytes(bytes).unwrap();
    let readme: combine_archive::ArchivePath = "notes/readme.txt".parse().unwrap();

    assert_eq!(
        archive.warnings(),
        &[Warning::UntrackedEntry {
            path: readme.clone()
        }]
    );
    assert_eq!(archive.entries().count(), 1);
    assert_eq!(archive.untracked_entries(), vec![readme.clone()]);
    assert!(matches!(
        archive.read_entry_to_vec("notes/readme.txt"),
        Err(CombineError::UnknownPath(_))
    ));

    // Untracked content survives a save
    archive.save().unwrap();
    let mut reopened = CombineArchive::from_bytes(archive.bytes().unwrap().to_vec()).unwrap();
    assert_eq!(reopened.untracked_entries(), vec![readme.clone()]);

    reopened.track_entry("notes/readme.txt", "text/plain", false).unwrap();
    assert!(reopened.untracked_entries().is_empty());
    assert_eq!(reopened.read_entry_to_vec(&readme).unwrap(), b"stray");
    assert_eq!(
        reopened.entry(&readme).unwrap().unwrap().format,
        format::media_type("text/plain")
    );
}

#[test]
fn test_metadata_documents_are_merged_and_consolidated() {
    let manifest = manifest(&[
        ("./model.xml", format::SBML, true),
        ("./metadata.rdf", format::OMEX_METADATA, false),
        ("./extra/more.rdf", format::OMEX_METADATA, false),
    ]);
    let first = format!(
        r#"{RDF_OPEN}  <rdf:Description rdf:about=".">
    <dcterms:description>From the first document</dcterms:description>
  </rdf:Description>
</rdf:RDF>"#
    );
    let second = format!(
        r#"{RDF_OPEN}  <rdf:Description rdf:about="./model.xml">
    <dcterms:modified rdf:parseType="Resource">
      <dcterms:W3CDTF>2016-05-01T10:00:00Z</dcterms:W3CDTF>
    </dcterms:modified>
  </rdf:Description>
</rdf:RDF>"#
    );
    let bytes = build_zip(&[
        ("manifest.xml", manifest.as_bytes()),
        ("model.xml", b"<sbml/>"),
        ("metadata.rdf", first.as_bytes()),
        ("extra/more.rdf", second.as_bytes()),
    ]);

    let mut archive = CombineArchive::from_bytes(bytes).unwrap();
    assert!(archive.warnings().is_empty(), "{:?}", archive.warnings());
    assert_eq!(archive.entries().count(), 1);
    assert!(archive.metadata(".").unwrap().is_some());
    assert_eq!(archive.metadata("model.xml").unwrap().unwrap().modified.len(), 1);

    archive.save().unwrap();
    let saved = archive.bytes().unwrap().to_vec();
    let zip = zip::ZipArchive::new(Cursor::new(saved.clone())).unwrap();
    assert!(zip.file_names().any(|name| name == "metadata.rdf"));
    assert!(!zip.file_names().any(|name| name == "extra/more.rdf"));

    let reopened = CombineArchive::from_bytes(saved).unwrap();
    assert!(reopened.warnings().is_empty(), "{:?}", reopened.warnings());
    assert_eq!(
        reopened.metadata(".").unwrap().unwrap().description.as_deref(),
        Some("From the first document")
    );
    assert_eq!(reopened.metadata("model.xml").unwrap().unwrap().modified.len(), 1);
}

#[test]
fn test_unknown_properties_survive_verbatim() {
    let manifest = manifest(&[
        ("./model.xml", format::SBML, true),
        ("./metadata.rdf", format::OMEX_METADATA, false),
    ]);
    let fragment = r#"<bqmodel:is rdf:resource="http://identifiers.org/biomodels.db/BIOMD0000000012"/>"#;
    let metadata = format!(
        r#"{RDF_OPEN}  <rdf:Description rdf:about="http://omex-library.org/Repressilator.omex/model.xml">
    {fragment}
  </rdf:Description>
</rdf:RDF>"#
    );
    let bytes = build_zip(&[
        ("manifest.xml", manifest.as_bytes()),
        ("model.xml", b"<sbml/>"),
        ("metadata.rdf", metadata.as_bytes()),
    ]);

    let mut archive = CombineArchive::from_bytes(bytes).unwrap();
    let key = "http://biomodels.net/model-qualifiers/is";
    assert_eq!(
        archive.metadata("model.xml").unwrap().unwrap().extensions[key],
        fragment
    );

    archive
        .set_metadata("model.xml", MetadataPatch::new().description("Repressilator"))
        .unwrap();
    archive.save().unwrap();

    let reopened = CombineArchive::from_bytes(archive.bytes().unwrap().to_vec()).unwrap();
    let record = reopened.metadata("model.xml").unwrap().unwrap();
    assert_eq!(record.extensions[key], fragment);
    assert_eq!(record.description.as_deref(), Some("Repressilator"));
}

#[test]
fn test_dangling_metadata_is_pruned_on_save() {
    let manifest = manifest(&[
        ("./model.xml", format::SBML, true),
        ("./metadata.rdf", format::OMEX_METADATA, false),
    ]);
    let metadata = format!(
        r#"{RDF_OPEN}  <rdf:Description rdf:about="./gone.xml">
    <dcterms:description>Nobody home</dcterms:description>
  </rdf:Description>
  <rdf:Description rdf:about="./model.xml#species_1">
    <dcterms:description>Fragment</dcterms:description>
  </rdf:Description>
</rdf:RDF>"#
    );
    let bytes = build_zip(&[
        ("manifest.xml", manifest.as_bytes()),
        ("model.xml", b"<sbml/>"),
        ("metadata.rdf", metadata.as_bytes()),
    ]);

    let mut archive = CombineArchive::from_bytes(bytes).unwrap();
    let gone = Subject::Entry("gone.xml".parse().unwrap());
    assert!(archive
        .warnings()
        .contains(&Warning::DanglingMetadata { subject: gone }));
    assert!(archive.metadata("gone.xml").unwrap().is_some());

    archive.save().unwrap();
    assert!(archive.metadata("gone.xml").unwrap().is_none());

    let reopened = CombineArchive::from_bytes(archive.bytes().unwrap().to_vec()).unwrap();
    assert!(reopened.warnings().is_empty(), "{:?}", reopened.warnings());
    assert_eq!(
        reopened
            .fragment_metadata("model.xml", "species_1")
            .unwrap()
            .and_then(|record| record.description.as_deref()),
        Some("Fragment")
    );
}

#[test]
fn test_fragment_and_typed_nodes_survive_save() {
    let manifest = manifest(&[
        ("./model.xml", format::SBML, true),
        ("./metadata.rdf", format::OMEX_METADATA, false),
    ]);
    let annotation = r#"<bqmodel:isDescribedBy rdf:resource="http://identifiers.org/pubmed/10659856"/>"#;
    let typed = r#"<bqmodel:Publication rdf:about="http://identifiers.org/pubmed/10659856">
    <dcterms:description>Elowitz and Leibler</dcterms:description>
  </bqmodel:Publication>"#;
    let metadata = format!(
        r#"{RDF_OPEN}  <rdf:Description about="./model.xml#species_1">
    {annotation}
  </rdf:Description>
  {typed}
</rdf:RDF>"#
    );
    let bytes = build_zip(&[
        ("manifest.xml", manifest.as_bytes()),
        ("model.xml", b"<sbml/>"),
        ("metadata.rdf", metadata.as_bytes()),
    ]);

    let mut archive = CombineArchive::from_bytes(bytes).unwrap();
    assert!(matches!(
        archive.warnings(),
        [Warning::UnmodelledNode { .. }]
    ));
    archive
        .set_metadata(".", MetadataPatch::new().description("Repressilator"))
        .unwrap();
    archive.save().unwrap();

    let saved = archive.bytes().unwrap().to_vec();
    let mut zip = zip::ZipArchive::new(Cursor::new(saved.clone())).unwrap();
    let mut text = String::new();
    std::io::Read::read_to_string(&mut zip.by_name("metadata.rdf").unwrap(), &mut text).unwrap();
    assert!(text.contains("rdf:about=\"./model.xml#species_1\""));
    assert!(text.contains(typed));

    let reopened = CombineArchive::from_bytes(saved).unwrap();
    let fragment = reopened
        .fragment_metadata("model.xml", "species_1")
        .unwrap()
        .unwrap();
    assert_eq!(
        fragment.extensions["http://biomodels.net/model-qualifiers/isDescribedBy"],
        annotation
    );
}

#[test]
fn test_rebound_prefixes_keep_their_meaning() {
    let manifest = manifest(&[
        ("./a.xml", format::SBML, true),
        ("./b.xml", format::SBML, false),
        ("./metadata.rdf", format::OMEX_METADATA, false),
        ("./more.rdf", format::OMEX_METADATA, false),
    ]);
    let first = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:ex="urn:first#">
  <rdf:Description rdf:about="./a.xml">
    <ex:p>one</ex:p>
  </rdf:Description>
  <rdf:Description rdf:about="./b.xml" xmlns:ex="urn:second#">
    <ex:p>two</ex:p>
  </rdf:Description>
</rdf:RDF>"#;
    let second = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:ex="urn:third#">
  <rdf:Description rdf:about="./b.xml">
    <ex:q>three</ex:q>
  </rdf:Description>
</rdf:RDF>"#;
    let bytes = build_zip(&[
        ("manifest.xml", manifest.as_bytes()),
        ("a.xml", b"<a/>"),
        ("b.xml", b"<b/>"),
        ("metadata.rdf", first.as_bytes()),
        ("more.rdf", second.as_bytes()),
    ]);

    let mut archive = CombineArchive::from_bytes(bytes).unwrap();
    let keys = |archive: &CombineArchive, path: &str| -> Vec<String> {
        archive
            .metadata(path)
            .unwrap()
            .unwrap()
            .extensions
            .keys()
            .cloned()
            .collect()
    };
    assert_eq!(keys(&archive, "a.xml"), vec!["urn:first#p"]);
    assert_eq!(keys(&archive, "b.xml"), vec!["urn:second#p", "urn:third#q"]);

    archive.save().unwrap();
    let reopened = CombineArchive::from_bytes(archive.bytes().unwrap().to_vec()).unwrap();
    assert!(reopened.warnings().is_empty(), "{:?}", reopened.warnings());
    assert_eq!(keys(&reopened, "a.xml"), vec!["urn:first#p"]);
    assert_eq!(keys(&reopened, "b.xml"), vec!["urn:second#p", "urn:third#q"]);
}

#[test]
fn test_deeply_nested_metadata_is_a_warning() {
    let manifest = manifest(&[
        ("./model.xml", format::SBML, true),
        ("./metadata.rdf", format::OMEX_METADATA, false),
    ]);
    let metadata = format!(
        "{RDF_OPEN}  <rdf:Description rdf:about=\"./model.xml\">{}",
        "<x>".repeat(200_000)
    );
    let bytes = build_zip(&[
        ("manifest.xml", manifest.as_bytes()),
        ("model.xml", b"<sbml/>"),
        ("metadata.rdf", metadata.as_bytes()),
    ]);

    let archive = CombineArchive::from_bytes(bytes).unwrap();
    assert!(matches!(
        archive.warnings(),
        [Warning::MalformedMetadata { .. }]
    ));
    assert_eq!(archive.master().unwrap().path.as_str(), "model.xml");
}

#[test]
fn test_unreadable_metadata_is_a_warning() {
    let manifest = manifest(&[
        ("./model.xml", format::SBML, true),
        ("./metadata.rdf", format::OMEX_METADATA, false),
    ]);
    let bytes = build_zip(&[
        ("manifest.xml", manifest.as_bytes()),
        ("model.xml", b"<sbml/>"),
        ("metadata.rdf", b"<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">"),
    ]);

    let archive = CombineArchive::from_bytes(bytes).unwrap();
    assert!(matches!(
        archive.warnings(),
        [Warning::MalformedMetadata { .. }]
    ));
    assert_eq!(archive.master().unwrap().path.as_str(), "model.xml");
}

#[test]
fn test_master_flag_spellings() {
    let doc = format!(
        "{MANIFEST_HEADER}  <content location=\"/model.xml\" format=\"{}\" master=\"1\"/>\n</omexManifest>",
        format::SBML
    );
    let bytes = build_zip(&[("manifest.xml", doc.as_bytes()), ("model.xml", b"<sbml/>")]);

    let archive = CombineArchive::from_bytes(bytes).unwrap();
    assert_eq!(archive.master().unwrap().path.as_str(), "model.xml");
}
