//! Fuzz target for `.encfs6.xml` parsing. Must never panic on arbitrary
//! bytes, valid UTF-8 or not.

#![no_main]

use encfs_core::VolumeConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }
    let _ = VolumeConfig::parse(data);
});
