/// Metadata example: describing an archive and its entries
///
/// Run with: cargo run --example metadata
use combine_archive::{format, CombineArchive, Creator, MetadataPatch, Timestamp};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    println!("=== combine-archive Metadata Example ===\n");

    let mut archive = CombineArchive::create_in_memory()?;

    let author = Creator::new("Jane", "Doe")
        .with_email("jane.doe@example.org")
        .with_organization("Example Systems Biology Lab");

    // Describe the model while adding it
    archive.add_file_with_metadata(
        "model.xml",
        &b"<sbml/>"[..],
        format::SBML,
        true,
        MetadataPatch::new()
            .description("Repressilator, an oscillating gene network")
            .creator(author.clone()),
    )?;

    // Archive-level metadata uses the "." subject
    archive.set_metadata(
        ".",
        MetadataPatch::new()
            .description("Reproducible simulation of the repressilator")
            .creator(author)
            .literal("http://purl.org/dc/terms/license", "CC0-1.0")?,
    )?;

    // A second update appends to the modification history
    archive.set_metadata(
        "model.xml",
        MetadataPatch::new().modified_at(Timestamp::parse("2024-05-01T12:00:00+02:00")?),
    )?;

    archive.save()?;
    let bytes = archive.bytes().ok_or("in-memory archive has no bytes")?.to_vec();
    println!("1. Saved archive ({} bytes)", bytes.len());

    let reopened = CombineArchive::from_bytes(bytes)?;
    println!("\n2. Metadata after reopening:");
    for record in reopened.metadata_records() {
        println!("   {}", record.subject);
        if let Some(description) = &record.description {
            println!("     description: {}", description);
        }
        for creator in &record.creators {
            println!(
                "     creator:     {} {}",
                creator.given_name.as_deref().unwrap_or_default(),
                creator.family_name.as_deref().unwrap_or_default()
            );
        }
        if let Some(created) = &record.created {
            println!("     created:     {}", created);
        }
        for modified in &record.modified {
            println!("     modified:    {}", modified);
        }
        for property in record.extensions.keys() {
            println!("     extension:   {}", property);
        }
    }

    println!("\n✓ Example complete!");
    Ok(())
}
