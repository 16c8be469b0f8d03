//! Filename codec: per-path-component encryption with a path-derived chain
//! IV, a MAC-16 checksum prefix, and base-256→ASCII encoding.
//!
//! The codec never sees a full path — only one segment at a time plus the
//! chain IV its containing directory resolved to. Path splitting, chain-IV
//! propagation down the tree, and the config-file hiding exception all live
//! in [`crate::volume`].

use crate::config::NameAlgorithm;
use crate::crypto;
use crate::error::{EncfsError, Result};

/// EncFS's own base-64 table, index-ordered as the reference `B64ToAscii`
/// array: `,` `-` then `0`-`9`, `A`-`Z`, `a`-`z`. Not RFC 4648 order — the
/// bit packing isn't RFC 4648 either (see [`change_base2`]), so a standard
/// base64 codec with a swapped alphabet does not reproduce this encoding.
const ENCFS_ALPHABET: &[u8; 64] = b",-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

fn symbol_to_value(byte: u8) -> Option<u8> {
    ENCFS_ALPHABET.iter().position(|&b| b == byte).map(|i| i as u8)
}

/// Re-pack a byte stream from `src_bits`-wide elements to `dst_bits`-wide
/// elements, LSB-first, stopping once `out_len` output elements have been
/// produced. This is EncFS's `changeBase2`: encoding calls it with `(8, 6)`
/// to turn raw bytes into 6-bit alphabet indices; decoding calls it with
/// `(6, 8)` to turn indices back into bytes. `out_len` must be passed
/// explicitly — unlike RFC 4648 base64 there's no padding marker, and the
/// trailing partial group's zero-bits would otherwise decode as a
/// spurious extra element.
fn change_base2(input: &[u8], src_bits: u32, dst_bits: u32, out_len: usize) -> Vec<u8> {
    let mask: u32 = (1u32 << dst_bits) - 1;
    let mut work: u32 = 0;
    let mut work_bits: u32 = 0;
    let mut out = Vec::with_capacity(out_len);

    for &byte in input {
        if out.len() >= out_len {
            break;
        }
        work |= (byte as u32) << work_bits;
        work_bits += src_bits;
        while work_bits >= dst_bits && out.len() < out_len {
            out.push((work & mask) as u8);
            work >>= dst_bits;
            work_bits -= dst_bits;
        }
    }
    // A trailing group shorter than dst_bits still carries real (zero-padded)
    // data once, as opposed to being silently dropped: EncFS's own encoding
    // emits it (visible as the trailing `,` in padded filenames).
    if out.len() < out_len {
        out.push((work & mask) as u8);
    }
    out
}

/// Number of 6-bit symbols needed to carry `byte_len` bytes: `ceil(8n/6)`.
fn symbol_count_for(byte_len: usize) -> usize {
    (byte_len * 8 + 5) / 6
}

/// Number of bytes recovered from `symbol_len` 6-bit symbols: `floor(6m/8)`.
/// Unique and exact for any symbol count produced by [`symbol_count_for`].
fn byte_count_for(symbol_len: usize) -> usize {
    (symbol_len * 6) / 8
}

fn encode_b64(bytes: &[u8]) -> String {
    let values = change_base2(bytes, 8, 6, symbol_count_for(bytes.len()));
    values.into_iter().map(|v| ENCFS_ALPHABET[v as usize] as char).collect()
}

fn decode_b64(encoded: &str) -> Result<Vec<u8>> {
    let mut values = Vec::with_capacity(encoded.len());
    for ch in encoded.bytes() {
        let value = symbol_to_value(ch)
            .ok_or_else(|| EncfsError::corrupt(encoded, format!("invalid filename alphabet character {ch:?}")))?;
        values.push(value);
    }
    Ok(change_base2(&values, 6, 8, byte_count_for(values.len())))
}

fn encode_bytes_for_chain(name_algorithm: NameAlgorithm, segment: &str) -> Vec<u8> {
    match name_algorithm {
        NameAlgorithm::Block => crypto::pkcs7_pad_block(segment.as_bytes()),
        NameAlgorithm::Stream | NameAlgorithm::Null => segment.as_bytes().to_vec(),
    }
}

/// Fold one more path segment into a running chain IV, the way a caller
/// descending a directory tree would: `mac64(encode_bytes(segment),
/// parent_chain_iv)`. When `chained_name_iv` is unset, every directory's
/// children start fresh from zero, so this always returns `[0; 8]` in that
/// case regardless of `parent_chain_iv`.
pub fn next_chain_iv(
    key: &[u8],
    name_algorithm: NameAlgorithm,
    chained_name_iv: bool,
    parent_chain_iv: [u8; 8],
    segment: &str,
) -> [u8; 8] {
    if !chained_name_iv {
        return [0u8; 8];
    }
    let encoded = encode_bytes_for_chain(name_algorithm, segment);
    crypto::mac64(key, &encoded, parent_chain_iv)
}

fn pad_for_cipher(name_algorithm: NameAlgorithm, name_bytes: &[u8]) -> Vec<u8> {
    match name_algorithm {
        NameAlgorithm::Block => crypto::pkcs7_pad_block(name_bytes),
        NameAlgorithm::Stream | NameAlgorithm::Null => name_bytes.to_vec(),
    }
}

/// Expand a MAC-16 into the high two bytes of a 64-bit value and XOR it
/// into the chain IV to form the per-file cipher IV seed.
fn file_iv_seed(chain_iv: [u8; 8], mac: [u8; 2]) -> u64 {
    let mut extended = [0u8; 8];
    extended[0] = mac[0];
    extended[1] = mac[1];
    u64::from_be_bytes(chain_iv) ^ u64::from_be_bytes(extended)
}

/// Encrypt one plaintext path segment (must not contain `/`) under the
/// given chain IV, producing the ASCII name stored on disk.
///
/// The `null` algorithm passes the name through unchanged — callers handle
/// the root config-filename hiding exception themselves.
pub fn encrypt_name(key: &[u8], name_algorithm: NameAlgorithm, chain_iv: [u8; 8], name: &str) -> Result<String> {
    if name_algorithm == NameAlgorithm::Null {
        return Ok(name.to_string());
    }

    let padded = pad_for_cipher(name_algorithm, name.as_bytes());
    let mac = crypto::mac16(key, &padded, chain_iv);
    let seed = file_iv_seed(chain_iv, mac);
    let cipher = match name_algorithm {
        NameAlgorithm::Stream => crypto::stream_encrypt(key, seed, &padded)?,
        NameAlgorithm::Block => crypto::block_encrypt(key, seed, &padded)?,
        NameAlgorithm::Null => unreachable!("handled above"),
    };

    let mut framed = Vec::with_capacity(2 + cipher.len());
    framed.extend_from_slice(&mac);
    framed.extend_from_slice(&cipher);
    Ok(encode_b64(&framed))
}

/// Decrypt one on-disk name back to plaintext, verifying its MAC-16.
pub fn decrypt_name(key: &[u8], name_algorithm: NameAlgorithm, chain_iv: [u8; 8], encoded: &str) -> Result<String> {
    if name_algorithm == NameAlgorithm::Null {
        return Ok(encoded.to_string());
    }

    let framed = decode_b64(encoded)?;
    if framed.len() < 2 {
        return Err(EncfsError::corrupt(encoded, "encoded name shorter than its checksum field"));
    }
    let (mac_bytes, cipher) = framed.split_at(2);
    let mut mac = [0u8; 2];
    mac.copy_from_slice(mac_bytes);

    let seed = file_iv_seed(chain_iv, mac);
    let padded = match name_algorithm {
        NameAlgorithm::Stream => crypto::stream_decrypt(key, seed, cipher)?,
        NameAlgorithm::Block => crypto::block_decrypt(key, seed, cipher)?,
        NameAlgorithm::Null => unreachable!("handled above"),
    };

    let recomputed = crypto::mac16(key, &padded, chain_iv);
    if recomputed != mac {
        return Err(EncfsError::checksum_mismatch(encoded, None));
    }

    let name_bytes = match name_algorithm {
        NameAlgorithm::Block => crypto::pkcs7_unpad_block(&padded)?,
        NameAlgorithm::Stream | NameAlgorithm::Null => padded,
    };
    String::from_utf8(name_bytes).map_err(|_| EncfsError::corrupt(encoded, "decrypted name is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KEY: [u8; 24] = [0x37u8; 24];

    #[test]
    fn b64_roundtrip_across_lengths() {
        for len in 0..20 {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let encoded = encode_b64(&data);
            assert!(encoded.is_ascii());
            let decoded = decode_b64(&encoded).unwrap();
            assert_eq!(decoded, data);
        }
    }

    #[test]
    fn b64_alphabet_is_lsb_first_not_rfc4648() {
        // One zero byte (8 bits) packs into two 6-bit groups (6 + 2 padded
        // zero bits), both value 0 — ',' in EncFS's table (index 0), giving
        // ",," rather than the single 'A' a standard base64 codec would
        // produce for a zero byte under RFC 4648's alphabet and padding.
        assert_eq!(encode_b64(&[0u8]), ",,");
    }

    /// S5 references a canned filename `"NKAHbJp9L63D9w,,"` decrypting to
    /// `"file.txt"` under the root chain IV and the default config. That
    /// vector was produced under a specific volume key the scenario text
    /// doesn't carry, so it can't be asserted bit-for-bit here; this test
    /// instead exercises the same shape (root chain IV, block algorithm)
    /// as a round trip.
    #[test]
    fn block_roundtrip_at_root_like_s5() {
        let encoded = encrypt_name(&KEY, NameAlgorithm::Block, [0; 8], "file.txt").unwrap();
        let decoded = decrypt_name(&KEY, NameAlgorithm::Block, [0; 8], &encoded).unwrap();
        assert_eq!(decoded, "file.txt");
    }

    #[test]
    fn stream_roundtrip() {
        let encoded = encrypt_name(&KEY, NameAlgorithm::Stream, [0x11; 8], "a long filename.tar.gz").unwrap();
        let decoded = decrypt_name(&KEY, NameAlgorithm::Stream, [0x11; 8], &encoded).unwrap();
        assert_eq!(decoded, "a long filename.tar.gz");
    }

    #[test]
    fn null_algorithm_passes_through() {
        let encoded = encrypt_name(&KEY, NameAlgorithm::Null, [0; 8], "plain-name.txt").unwrap();
        assert_eq!(encoded, "plain-name.txt");
        let decoded = decrypt_name(&KEY, NameAlgorithm::Null, [0; 8], &encoded).unwrap();
        assert_eq!(decoded, "plain-name.txt");
    }

    #[test]
    fn encoded_names_are_ascii_and_contain_no_slash_by_alphabet_construction() {
        for name in ["x", "a.b.c", "日本語.txt", "reasonably long file name with spaces.bin"] {
            let encoded = encrypt_name(&KEY, NameAlgorithm::Block, [0x99; 8], name).unwrap();
            assert!(encoded.is_ascii());
        }
    }

    #[test]
    fn same_name_differs_across_chain_ivs() {
        let a = encrypt_name(&KEY, NameAlgorithm::Block, [0; 8], "shared.txt").unwrap();
        let b = encrypt_name(&KEY, NameAlgorithm::Block, [1; 8], "shared.txt").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn chained_name_iv_off_always_resets_to_zero() {
        let iv_from_root = next_chain_iv(&KEY, NameAlgorithm::Block, false, [0; 8], "a");
        let iv_from_deep = next_chain_iv(&KEY, NameAlgorithm::Block, false, [0xAB; 8], "b");
        assert_eq!(iv_from_root, [0; 8]);
        assert_eq!(iv_from_deep, [0; 8]);
    }

    #[test]
    fn chained_name_iv_on_folds_cumulatively() {
        let level1 = next_chain_iv(&KEY, NameAlgorithm::Block, true, [0; 8], "a");
        let level2 = next_chain_iv(&KEY, NameAlgorithm::Block, true, level1, "b");
        assert_ne!(level1, [0; 8]);
        assert_ne!(level2, level1);

        // Folding through "a" then "b" must differ from folding through "b"
        // alone starting at zero: the path, not just the leaf name, matters.
        let direct_b = next_chain_iv(&KEY, NameAlgorithm::Block, true, [0; 8], "b");
        assert_ne!(level2, direct_b);
    }

    #[test]
    fn tampered_ciphertext_is_checksum_mismatch() {
        let encoded = encrypt_name(&KEY, NameAlgorithm::Block, [0; 8], "tamper-me.txt").unwrap();
        let mut framed = decode_b64(&encoded).unwrap();
        let last = framed.len() - 1;
        framed[last] ^= 0x01;
        let tampered = encode_b64(&framed);

        let err = decrypt_name(&KEY, NameAlgorithm::Block, [0; 8], &tampered).unwrap_err();
        assert!(matches!(err, EncfsError::ChecksumMismatch { .. }));
    }

    proptest! {
        /// Invariant 1: filename round-trip for any non-empty, `/`-free
        /// segment and any chain IV, under both stream and block algorithms.
        #[test]
        fn prop_roundtrip_block(name in "[^/\u{0}]{1,200}", chain_iv in any::<[u8; 8]>()) {
            let encoded = encrypt_name(&KEY, NameAlgorithm::Block, chain_iv, &name).unwrap();
            let decoded = decrypt_name(&KEY, NameAlgorithm::Block, chain_iv, &encoded).unwrap();
            prop_assert_eq!(decoded, name);
        }

        #[test]
        fn prop_roundtrip_stream(name in "[^/\u{0}]{1,200}", chain_iv in any::<[u8; 8]>()) {
            let encoded = encrypt_name(&KEY, NameAlgorithm::Stream, chain_iv, &name).unwrap();
            let decoded = decrypt_name(&KEY, NameAlgorithm::Stream, chain_iv, &encoded).unwrap();
            prop_assert_eq!(decoded, name);
        }
    }
}
