//! Path validation
//!
//! Every path handed to the archive is normalized before use; paths that
//! could escape the archive root are rejected.

use combine_archive::{ArchivePath, CombineArchive, CombineError};

fn assert_invalid(result: combine_archive::Result<()>, raw: &str) {
    match result {
        Err(CombineError::InvalidPath { .. }) => {}
        other => panic!("Expected InvalidPath for {:?}, got: {:?}", raw, other),
    }
}

#[test]
fn test_path_traversal_dot_dot() {
    let mut archive = CombineArchive::create_in_memory().unwrap();

    for raw in ["../../etc/passwd", "a/../../b", "..", "a\\..\\..\\b"] {
        assert_invalid(archive.add_file(raw, &b"malicious"[..], "text/plain", false), raw);
    }
    assert_eq!(archive.entries().count(), 0);
}

#[test]
fn test_single_leading_slash_is_archive_relative() {
    let mut archive = CombineArchive::create_in_memory().unwrap();
    archive
        .add_file("/etc/passwd", &b"data"[..], "text/plain", false)
        .unwrap();

    assert!(archive.contains("etc/passwd"));
    assert_invalid(
        archive.add_file("//server/share", &b"data"[..], "text/plain", false),
        "//server/share",
    );
}

#[test]
fn test_absolute_path_windows() {
    let mut archive = CombineArchive::create_in_memory().unwrap();
    for raw in ["C:\\Windows\\System32\\evil.dll", "c:/temp/x"] {
        assert_invalid(archive.add_file(raw, &b"data"[..], "text/plain", false), raw);
    }
}

#[test]
fn test_path_normalization() {
    let cases = [
        ("./model.xml", "model.xml"),
        ("dir\\sub\\file.txt", "dir/sub/file.txt"),
        ("dir/./file.txt", "dir/file.txt"),
        ("  /padded.txt ", "padded.txt"),
    ];
    for (raw, normalized) in cases {
        assert_eq!(raw.parse::<ArchivePath>().unwrap().as_str(), normalized);
    }
}

#[test]
fn test_path_with_null_bytes() {
    let mut archive = CombineArchive::create_in_memory().unwrap();
    assert_invalid(
        archive.add_file("file\0.txt", &b"data"[..], "text/plain", false),
        "file\\0.txt",
    );
}

#[test]
fn test_path_length_overflow() {
    let mut archive = CombineArchive::create_in_memory().unwrap();
    let long = "a".repeat(combine_archive::archive::MAX_PATH_LENGTH + 1);
    assert_invalid(archive.add_file(long.as_str(), &b"data"[..], "text/plain", false), "long");
}

#[test]
fn test_path_with_special_characters() {
    let mut archive = CombineArchive::create_in_memory().unwrap();
    let names = ["with space.txt", "ünïcödé/файл.txt", "brackets[1].csv", "ampersand&co.xml"];
    for name in names {
        archive
            .add_file(name, name.as_bytes(), "text/plain", false)
            .unwrap();
    }
    archive.save().unwrap();

    let mut reopened = CombineArchive::from_bytes(archive.bytes().unwrap().to_vec()).unwrap();
    assert!(reopened.warnings().is_empty(), "{:?}", reopened.warnings());
    for name in names {
        assert_eq!(reopened.read_entry_to_vec(name).unwrap(), name.as_bytes());
    }
}

#[test]
fn test_path_case_sensitivity() {
    let mut archive = CombineArchive::create_in_memory().unwrap();
    archive.add_file("README.md", &b"upper"[..], "text/markdown", false).unwrap();
    archive.add_file("readme.md", &b"lower"[..], "text/markdown", false).unwrap();

    assert_eq!(archive.entries().count(), 2);
    assert_eq!(archive.read_entry_to_vec("README.md").unwrap(), b"upper");
    assert_eq!(archive.read_entry_to_vec("readme.md").unwrap(), b"lower");
}

#[test]
fn test_empty_path_component() {
    let mut archive = CombineArchive::create_in_memory().unwrap();
    for raw in ["", "a//b.txt", "dir/"] {
        assert_invalid(archive.add_file(raw, &b"data"[..], "text/plain", false), raw);
    }
}
