use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use assert_matches::assert_matches;
use blobstore_digest::{compute_bytes_digest, Sha256};
use blobstore_tar::{convert_zip_to_tar, pack_directory, unpack, PackError};
use filetime::FileTime;
use rstest::rstest;
use walkdir::WalkDir;

/// Creates a directory holding the single 10 byte file `a.txt`, i.e. the
/// contents of `d/` in a `d/a.txt` tree.
fn hello_world_tree() -> tempfile::TempDir {
    let temp_dir = tempfile::tempdir().unwrap();
    std::fs::write(temp_dir.path().join("a.txt"), "helloworld").unwrap();
    temp_dir
}

/// Creates a tree with nested directories, an empty directory, an executable
/// and (on unix) a symlink.
fn nested_tree() -> tempfile::TempDir {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    std::fs::create_dir_all(root.join("sub/deeper")).unwrap();
    std::fs::create_dir_all(root.join("empty")).unwrap();
    std::fs::write(root.join("a.txt"), "helloworld").unwrap();
    std::fs::write(root.join("sub/b.txt"), "second file").unwrap();
    std::fs::write(root.join("sub/deeper/c.bin"), [0u8, 1, 2, 3, 255]).unwrap();
    std::fs::write(root.join("run.sh"), "#!/bin/sh\necho hi\n").unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(root.join("run.sh"), std::fs::Permissions::from_mode(0o700))
            .unwrap();
        std::os::unix::fs::symlink("sub/b.txt", root.join("link")).unwrap();
    }

    temp_dir
}

/// Maps every relative path below `root` to its contents (`None` for
/// directories, the link target for symlinks).
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(Result::unwrap)
        .map(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap().to_path_buf();
            let content = if entry.path_is_symlink() {
                let target = std::fs::read_link(entry.path()).unwrap();
                Some(target.to_string_lossy().as_bytes().to_vec())
            } else if entry.file_type().is_dir() {
                None
            } else {
                Some(std::fs::read(entry.path()).unwrap())
            };
            (relative, content)
        })
        .collect()
}

fn pack(root: &Path) -> Vec<u8> {
    pack_directory(root, Vec::new()).unwrap()
}

#[test]
fn test_single_file_archive() {
    let tree = hello_world_tree();
    let stream = pack(tree.path());

    let mut archive = tar::Archive::new(Cursor::new(stream));
    let entries = archive
        .entries()
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            let header = entry.header();
            (
                entry.path().unwrap().into_owned(),
                header.size().unwrap(),
                header.mtime().unwrap(),
                header.uid().unwrap(),
                header.mode().unwrap(),
            )
        })
        .collect::<Vec<_>>();

    assert_eq!(entries, vec![(PathBuf::from("a.txt"), 10, 0, 0, 0o644)]);
}

/// The address of a directory must not change between releases, every
/// stored directory blob is keyed by it.
#[test]
fn test_pack_digest_is_stable() {
    let tree = hello_world_tree();
    let stream = pack(tree.path());

    // One header block, one data block and the end-of-archive marker.
    assert_eq!(stream.len(), 4 * 512);
    assert_eq!(
        format!("{:x}", compute_bytes_digest::<Sha256>(&stream)),
        "8893796fd7d6738121b677e45ebe57d12daee46d8e4767aeb5158f21ad74074b"
    );
}

#[rstest]
#[case::single_file(hello_world_tree())]
#[case::nested(nested_tree())]
fn test_pack_is_deterministic(#[case] tree: tempfile::TempDir) {
    let first = pack(tree.path());
    let second = pack(tree.path());
    assert_eq!(
        compute_bytes_digest::<Sha256>(&first),
        compute_bytes_digest::<Sha256>(&second)
    );
    assert_eq!(first, second);
}

#[test]
fn test_pack_ignores_timestamps() {
    let tree = nested_tree();
    let before = pack(tree.path());

    let long_ago = FileTime::from_unix_time(86_400, 0);
    filetime::set_file_mtime(tree.path().join("a.txt"), long_ago).unwrap();
    filetime::set_file_mtime(tree.path().join("sub"), long_ago).unwrap();

    let after = pack(tree.path());
    assert_eq!(before, after);
}

#[test]
fn test_pack_depends_on_content() {
    let tree = hello_world_tree();
    let before = pack(tree.path());
    std::fs::write(tree.path().join("a.txt"), "HELLOWORLD").unwrap();
    let after = pack(tree.path());
    assert_ne!(before, after);
}

#[test]
fn test_round_trip() {
    let tree = nested_tree();
    let stream = pack(tree.path());

    let destination = tempfile::tempdir().unwrap();
    unpack(Cursor::new(stream), destination.path()).unwrap();

    assert_eq!(snapshot(tree.path()), snapshot(destination.path()));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(destination.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}

#[test]
fn test_pack_missing_source() {
    let temp_dir = tempfile::tempdir().unwrap();
    let missing = temp_dir.path().join("does-not-exist");

    let mut sink = Vec::new();
    let result = pack_directory(&missing, &mut sink);
    assert_matches!(result, Err(PackError::SourceNotFound { path, .. }) if path == missing);
    assert!(sink.is_empty(), "nothing may be written for a missing source");
}

#[test]
fn test_convert_zip_to_tar() {
    let mut zip_writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    zip_writer.add_directory("sub/", options).unwrap();
    zip_writer.start_file("sub/b.txt", options).unwrap();
    zip_writer.write_all(b"second file").unwrap();
    zip_writer.start_file("a.txt", options).unwrap();
    zip_writer.write_all(b"helloworld").unwrap();
    let zip_bytes = zip_writer.finish().unwrap().into_inner();

    let first = convert_zip_to_tar(Cursor::new(&zip_bytes), Vec::new()).unwrap();
    let second = convert_zip_to_tar(Cursor::new(&zip_bytes), Vec::new()).unwrap();
    assert_eq!(first, second);

    let destination = tempfile::tempdir().unwrap();
    unpack(Cursor::new(first), destination.path()).unwrap();
    assert_eq!(
        std::fs::read_to_string(destination.path().join("a.txt")).unwrap(),
        "helloworld"
    );
    assert_eq!(
        std::fs::read_to_string(destination.path().join("sub/b.txt")).unwrap(),
        "second file"
    );
}
