#![no_main]

use combine_archive::CombineArchive;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Try to open archive - should never panic
    let mut archive = match CombineArchive::from_bytes(data.to_vec()) {
        Ok(a) => a,
        Err(_) => return, // Expected for invalid data
    };

    // Walk the validated view - should never panic
    let paths: Vec<String> = archive.entries().map(|e| e.path.to_string()).collect();
    for path in &paths {
        let _ = archive.read_entry_to_vec(path.as_str());
        let _ = archive.metadata(path.as_str());
    }
    let _ = archive.untracked_entries();
    let _ = archive.metadata(".");

    // Lookups with hostile paths - should never panic
    let _ = archive.entry("");
    let _ = archive.entry("/");
    let _ = archive.entry("../../../etc/passwd");

    // Re-serializing whatever was accepted must succeed and reopen
    if archive.save().is_ok() {
        if let Some(bytes) = archive.bytes() {
            let _ = CombineArchive::from_bytes(bytes.to_vec());
        }
    }
});
