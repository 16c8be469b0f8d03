//! File content codec: block framing, per-file IV header, per-block MAC,
//! hole preservation, and the block/stream dual-mode tail.
//!
//! A file on disk is `[optional 8-byte encrypted header][block₀][block₁]…`.
//! Every full block is framed as `[mac(macBytes)][rand(randBytes)][cipher]`;
//! the final block of a file that isn't itself block-size-aligned is always
//! encoded in stream mode, even when the volume's content algorithm is CBC
//! block mode — `is_final_partial_block` is how callers force that.

use std::path::Path;

use subtle::ConstantTimeEq;

use crate::config::{ContentAlgorithm, VolumeConfig};
use crate::crypto;
use crate::error::{BlockIndex, EncfsError, Result};

fn header_iv_seed(key: &[u8], name_plaintext: &str) -> u64 {
    u64::from_be_bytes(crypto::mac64(key, name_plaintext.as_bytes(), [0; 8]))
}

/// Generate a fresh random per-file IV base and its encrypted on-disk
/// header, for a file being created under `uniqueIV`.
pub fn generate_file_iv_base(key: &[u8], name_plaintext: &str) -> Result<(u64, [u8; 8])> {
    let mut raw = [0u8; 8];
    rand::fill(&mut raw[..]);
    let header = crypto::stream_encrypt(key, header_iv_seed(key, name_plaintext), &raw)?;
    let mut header_arr = [0u8; 8];
    header_arr.copy_from_slice(&header);
    Ok((u64::from_be_bytes(raw), header_arr))
}

/// Recover the per-file IV base from an on-disk header under `uniqueIV`.
pub fn read_file_iv_base(key: &[u8], name_plaintext: &str, header_bytes: &[u8; 8]) -> Result<u64> {
    let raw = crypto::stream_decrypt(key, header_iv_seed(key, name_plaintext), header_bytes)?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&raw);
    Ok(u64::from_be_bytes(arr))
}

/// Per-block cipher IV seed: the file's IV base XORed with its 0-based
/// block index.
pub fn block_iv_seed(file_iv_base: u64, block_index: BlockIndex) -> u64 {
    file_iv_base ^ block_index
}

/// Encode one plaintext block into its on-disk frame.
///
/// Under `allowHoles`, a full-length all-zero block skips the cipher
/// entirely and is written as literal zero bytes, so the provider (or the
/// host filesystem) is free to store it as a sparse hole.
pub fn encode_block(
    key: &[u8],
    content_algorithm: ContentAlgorithm,
    block_iv_seed: u64,
    mac_bytes: u8,
    rand_bytes: u8,
    allow_holes: bool,
    is_final_partial_block: bool,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    if allow_holes && !is_final_partial_block && !plaintext.is_empty() && plaintext.iter().all(|&b| b == 0) {
        return Ok(vec![0u8; mac_bytes as usize + rand_bytes as usize + plaintext.len()]);
    }

    let mut rand_buf = vec![0u8; rand_bytes as usize];
    if rand_bytes > 0 {
        rand::fill(&mut rand_buf[..]);
    }

    let mac = block_mac(key, mac_bytes, &rand_buf, plaintext);

    let use_stream = is_final_partial_block || content_algorithm == ContentAlgorithm::Cfb;
    let cipher = if use_stream {
        crypto::stream_encrypt(key, block_iv_seed, plaintext)?
    } else {
        crypto::block_encrypt_raw(key, block_iv_seed, plaintext)?
    };

    let mut out = Vec::with_capacity(mac.len() + rand_buf.len() + cipher.len());
    out.extend_from_slice(&mac);
    out.extend_from_slice(&rand_buf);
    out.extend_from_slice(&cipher);
    Ok(out)
}

/// Decode one on-disk frame back into its plaintext block.
pub fn decode_block(
    key: &[u8],
    content_algorithm: ContentAlgorithm,
    block_iv_seed: u64,
    mac_bytes: u8,
    rand_bytes: u8,
    allow_holes: bool,
    is_final_partial_block: bool,
    on_disk: &[u8],
    path: &Path,
    block_index: BlockIndex,
) -> Result<Vec<u8>> {
    if allow_holes && !is_final_partial_block && !on_disk.is_empty() && on_disk.iter().all(|&b| b == 0) {
        let header_len = mac_bytes as usize + rand_bytes as usize;
        return Ok(vec![0u8; on_disk.len().saturating_sub(header_len)]);
    }

    let header_len = mac_bytes as usize + rand_bytes as usize;
    if on_disk.len() < header_len {
        return Err(EncfsError::corrupt_block(path, block_index, "block shorter than its MAC/rand header"));
    }
    let (mac_stored, rest) = on_disk.split_at(mac_bytes as usize);
    let (rand_buf, cipher) = rest.split_at(rand_bytes as usize);

    let use_stream = is_final_partial_block || content_algorithm == ContentAlgorithm::Cfb;
    let plaintext = if use_stream {
        crypto::stream_decrypt(key, block_iv_seed, cipher)?
    } else {
        crypto::block_decrypt_raw(key, block_iv_seed, cipher)?
    };

    if mac_bytes > 0 {
        let recomputed = block_mac(key, mac_bytes, rand_buf, &plaintext);
        if recomputed.ct_eq(mac_stored).unwrap_u8() != 1 {
            return Err(EncfsError::checksum_mismatch(path, Some(block_index)));
        }
    }

    Ok(plaintext)
}

fn block_mac(key: &[u8], mac_bytes: u8, rand_buf: &[u8], plaintext: &[u8]) -> Vec<u8> {
    if mac_bytes == 0 {
        return Vec::new();
    }
    let mut input = Vec::with_capacity(rand_buf.len() + plaintext.len());
    input.extend_from_slice(rand_buf);
    input.extend_from_slice(plaintext);
    crypto::mac_n_from_mac64(crypto::mac64(key, &input, [0; 8]), mac_bytes as usize)
}

/// Encode an entire plaintext buffer into the bytes stored on disk for one
/// file: header (if any) followed by each block's frame in sequence.
pub fn encode_file(key: &[u8], config: &VolumeConfig, name_plaintext: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let file_iv_base = if config.unique_iv {
        let (base, header) = generate_file_iv_base(key, name_plaintext)?;
        out.extend_from_slice(&header);
        base
    } else {
        0
    };

    let block_size = config.block_size as usize;
    for (index, chunk) in plaintext.chunks(block_size.max(1)).enumerate() {
        let is_final_partial = chunk.len() < block_size;
        let seed = block_iv_seed(file_iv_base, index as u64);
        let framed = encode_block(
            key,
            config.content_algorithm,
            seed,
            config.block_mac_bytes,
            config.block_mac_rand_bytes,
            config.allow_holes,
            is_final_partial,
            chunk,
        )?;
        out.extend_from_slice(&framed);
    }
    Ok(out)
}

/// Decode the on-disk bytes for one file back into its plaintext buffer.
pub fn decode_file(
    key: &[u8],
    config: &VolumeConfig,
    name_plaintext: &str,
    path: &Path,
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let (file_iv_base, body) = if config.unique_iv {
        if ciphertext.len() < 8 {
            return Err(EncfsError::corrupt(path, "file shorter than its IV header"));
        }
        let mut header = [0u8; 8];
        header.copy_from_slice(&ciphertext[..8]);
        (read_file_iv_base(key, name_plaintext, &header)?, &ciphertext[8..])
    } else {
        (0u64, ciphertext)
    };

    let frame_overhead = config.block_mac_bytes as usize + config.block_mac_rand_bytes as usize;
    let full_frame_len = frame_overhead + config.block_size as usize;

    let mut out = Vec::with_capacity(body.len());
    let mut pos = 0usize;
    let mut index: u64 = 0;
    while pos < body.len() {
        let remaining = body.len() - pos;
        let (frame_len, is_final_partial) = if remaining >= full_frame_len {
            (full_frame_len, false)
        } else {
            (remaining, true)
        };
        let frame = &body[pos..pos + frame_len];
        let seed = block_iv_seed(file_iv_base, index);
        let plaintext_block = decode_block(
            key,
            config.content_algorithm,
            seed,
            config.block_mac_bytes,
            config.block_mac_rand_bytes,
            config.allow_holes,
            is_final_partial,
            frame,
            path,
            index,
        )?;
        out.extend_from_slice(&plaintext_block);
        pos += frame_len;
        index += 1;
    }
    Ok(out)
}

/// Ciphertext length for a plaintext of `plaintext_len` bytes, for
/// providers that need an upfront total before any bytes are written.
pub fn ciphertext_length(config: &VolumeConfig, plaintext_len: u64) -> u64 {
    let header_len = if config.unique_iv { 8 } else { 0 };
    let block_size = config.block_size as u64;
    let frame_overhead = config.block_mac_bytes as u64 + config.block_mac_rand_bytes as u64;

    let full_blocks = plaintext_len / block_size;
    let remainder = plaintext_len % block_size;
    let mut total = header_len + full_blocks * (frame_overhead + block_size);
    if remainder > 0 {
        total += frame_overhead + remainder;
    }
    total
}
