/// Basic example demonstrating archive creation and reading
///
/// Run with: cargo run --example basic
use combine_archive::{format, CombineArchive};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    println!("=== combine-archive Basic Example ===\n");

    // Create an archive
    println!("1. Creating archive...");
    create_archive()?;

    // Read from the archive
    println!("\n2. Reading from archive...");
    read_archive()?;

    // Change it and save again
    println!("\n3. Updating archive...");
    update_archive()?;

    println!("\n✓ Example complete!");
    Ok(())
}

fn create_archive() -> Result<(), Box<dyn Error>> {
    let mut archive = CombineArchive::create("example_basic.omex")?;

    // The master entry is the file a tool should open first
    archive.add_file(
        "model/repressilator.xml",
        &b"<sbml xmlns=\"http://www.sbml.org/sbml/level3/version1/core\"/>"[..],
        format::SBML,
        true,
    )?;
    archive.add_file(
        "simulation.sedml",
        &b"<sedML xmlns=\"http://sed-ml.org/sed-ml/level1/version3\"/>"[..],
        format::SEDML,
        false,
    )?;

    // Bare MIME types are upgraded to purl.org media-type URLs
    archive.add_file("notes.md", &b"# Notes\n\nA toy archive."[..], "text/markdown", false)?;

    archive.save()?;
    println!("   ✓ Archive created: example_basic.omex");

    Ok(())
}

fn read_archive() -> Result<(), Box<dyn Error>> {
    let mut archive = CombineArchive::open("example_basic.omex")?;

    for warning in archive.warnings() {
        println!("   ⚠ {}", warning);
    }

    // List all entries
    println!("   Entries in archive:");
    for entry in archive.entries() {
        let marker = if entry.master { " (master)" } else { "" };
        println!("     - {}{}  [{}]", entry.path, marker, entry.format);
    }

    // Read specific file
    println!("\n   Reading notes.md:");
    let notes = archive.read_entry_to_vec("notes.md")?;
    println!("     {}", String::from_utf8_lossy(&notes));

    Ok(())
}

fn update_archive() -> Result<(), Box<dyn Error>> {
    let mut archive = CombineArchive::open("example_basic.omex")?;

    archive.rename_file("notes.md", "docs/notes.md")?;
    archive.remove_file("simulation.sedml")?;
    archive.save()?;

    let archive = CombineArchive::open("example_basic.omex")?;
    println!("   Entries after update:");
    for entry in archive.entries() {
        println!("     - {}", entry.path);
    }

    Ok(())
}
