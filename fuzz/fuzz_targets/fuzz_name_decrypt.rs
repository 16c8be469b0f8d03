//! Fuzz target for encrypted filename decoding.
//!
//! Fixed key, fuzzed ciphertext name. Must never panic, only ever return
//! `Ok` or `Err`.

#![no_main]

use encfs_core::config::NameAlgorithm;
use encfs_core::name::decrypt_name;
use libfuzzer_sys::fuzz_target;

const KEY: [u8; 24] = [0x11; 24];

fuzz_target!(|data: &[u8]| {
    if data.len() > 4096 {
        return;
    }
    let Ok(encoded) = std::str::from_utf8(data) else {
        return;
    };

    let _ = decrypt_name(&KEY, NameAlgorithm::Block, [0u8; 8], encoded);
    let _ = decrypt_name(&KEY, NameAlgorithm::Stream, [0u8; 8], encoded);
});
