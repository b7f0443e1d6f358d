//! Generate seed corpus for fuzzing

use combine_archive::{format, CombineArchive, Creator, MetadataPatch};
use std::fs;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let corpus_dir = "fuzz/corpus/fuzz_archive_parse";
    fs::create_dir_all(corpus_dir)?;

    println!("Generating seed corpus...");

    // Seed 1: Empty archive (manifest only)
    {
        let path = format!("{}/seed_empty.omex", corpus_dir);
        let mut archive = CombineArchive::create(&path)?;
        archive.save()?;
        println!("✓ Generated: {}", path);
    }

    // Seed 2: Single master entry
    {
        let path = format!("{}/seed_single_master.omex", corpus_dir);
        let mut archive = CombineArchive::create(&path)?;
        archive.add_file("model.xml", &b"<sbml/>"[..], format::SBML, true)?;
        archive.save()?;
        println!("✓ Generated: {}", path);
    }

    // Seed 3: Nested entries
    {
        let path = format!("{}/seed_nested.omex", corpus_dir);
        let mut archive = CombineArchive::create(&path)?;
        archive.add_file("model/model.xml", &b"<sbml/>"[..], format::SBML, true)?;
        archive.add_file("sim/sim.sedml", &b"<sedML/>"[..], format::SEDML, false)?;
        archive.add_file("data/results.csv", &b"t,x\n0,1\n"[..], "text/csv", false)?;
        archive.save()?;
        println!("✓ Generated: {}", path);
    }

    // Seed 4: Archive and entry metadata
    {
        let path = format!("{}/seed_metadata.omex", corpus_dir);
        let mut archive = CombineArchive::create(&path)?;
        archive.add_file_with_metadata(
            "model.xml",
            &b"<sbml/>"[..],
            format::SBML,
            true,
            MetadataPatch::new()
                .description("Seed model")
                .creator(Creator::new("Jane", "Doe").with_organization("Example Lab")),
        )?;
        archive.set_metadata(".", MetadataPatch::new().description("Seed archive"))?;
        archive.save()?;
        println!("✓ Generated: {}", path);
    }

    // Seed 5: Empty entry (zero bytes)
    {
        let path = format!("{}/seed_zero_length.omex", corpus_dir);
        let mut archive = CombineArchive::create(&path)?;
        archive.add_file("empty.txt", &b""[..], "text/plain", false)?;
        archive.save()?;
        println!("✓ Generated: {}", path);
    }

    println!("\nGenerated 5 seed files in {}", corpus_dir);
    Ok(())
}
