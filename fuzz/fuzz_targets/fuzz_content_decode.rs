//! Fuzz target for the file content codec.
//!
//! Fixed key and volume config, fuzzed ciphertext. Must never panic.

#![no_main]

use std::path::Path;

use encfs_core::config::{ContentAlgorithm, NameAlgorithm, VolumeConfig};
use encfs_core::content::decode_file;
use libfuzzer_sys::fuzz_target;

const KEY: [u8; 24] = [0x22; 24];

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    let config = VolumeConfig::new(
        "fuzz",
        ContentAlgorithm::Cbc,
        NameAlgorithm::Block,
        192,
        1024,
        true,
        true,
        true,
        false,
        8,
        0,
        1000,
        Vec::new(),
        Vec::new(),
    )
    .unwrap();

    let _ = decode_file(&KEY, &config, "fuzz.bin", Path::new("/fuzz.bin"), data);
});
