//! Volume key derivation, wrapping, and unwrapping.
//!
//! The volume key is the single AES key (and its accompanying 16-byte base
//! IV) used for every filename and content cipher operation on an open
//! volume. It never touches disk directly: the config stores it wrapped
//! under a key-encryption key (KEK) derived from the user's password via
//! PBKDF2, using the config's own salt and iteration count.

use secrecy::{ExposeSecret, SecretBox};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::config::VolumeConfig;
use crate::crypto;
use crate::error::{EncfsError, Result};

/// An unlocked AES key plus its 16-byte base IV, erased from memory on drop.
pub struct VolumeKey {
    key: SecretBox<Vec<u8>>,
    iv: SecretBox<[u8; 16]>,
}

impl VolumeKey {
    /// Build a volume key from raw bytes. `key` must be 16, 24, or 32 bytes.
    pub fn new(key: Vec<u8>, iv: [u8; 16]) -> Result<Self> {
        if !matches!(key.len(), 16 | 24 | 32) {
            return Err(EncfsError::unsupported("AES key size", format!("{} bytes", key.len())));
        }
        Ok(VolumeKey {
            key: SecretBox::new(Box::new(key)),
            iv: SecretBox::new(Box::new(iv)),
        })
    }

    /// Generate a fresh random key of the given size, for volume creation.
    pub fn random(key_size_bits: u32) -> Result<Self> {
        let key_bytes = key_size_bytes(key_size_bits)?;
        let mut key = vec![0u8; key_bytes];
        let mut iv = [0u8; 16];
        rand::fill(&mut key[..]);
        rand::fill(&mut iv[..]);
        VolumeKey::new(key, iv)
    }

    /// Expose the AES key to `f`, scoped to the call. The key never escapes
    /// this closure as an owned value.
    pub fn with_key<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self.key.expose_secret())
    }

    /// Expose the base IV to `f`, scoped to the call.
    pub fn with_iv<R>(&self, f: impl FnOnce(&[u8; 16]) -> R) -> R {
        f(self.iv.expose_secret())
    }

    pub fn key_size_bits(&self) -> u32 {
        (self.key.expose_secret().len() * 8) as u32
    }
}

fn key_size_bytes(key_size_bits: u32) -> Result<usize> {
    match key_size_bits {
        128 | 192 | 256 => Ok((key_size_bits / 8) as usize),
        other => Err(EncfsError::unsupported("AES key size", format!("{other} bits"))),
    }
}

/// Derive the password-encryption key (KEK) from a passphrase, using the
/// config's salt and iteration count as-is. The output is `key_size_bytes +
/// 16` bytes: an AES key followed by what would conventionally be a cipher
/// IV, though here it is folded into the checksum/IV-seed computation below
/// rather than used as a literal CFB IV (see `unwrap`).
pub fn derive_password_key(config: &VolumeConfig, password: &str) -> Result<SecretBox<Vec<u8>>> {
    let key_bytes = key_size_bytes(config.key_size_bits)?;
    let out_len = key_bytes + 16;
    let derived = crypto::pbkdf2(password.as_bytes(), &config.salt, config.kdf_iterations, out_len)?;
    Ok(SecretBox::new(Box::new(derived)))
}

/// Derive the IV seed used to stream-encode/decode the wrapped key blob from
/// its stored 4-byte checksum, read as a big-endian integer. The checksum is
/// itself `MAC_32` of the plaintext key+IV, computed before encryption at
/// wrap time and read back from the blob's leading bytes at unwrap time, so
/// it's available identically on both paths without depending on the
/// ciphertext that doesn't exist yet at wrap time.
fn checksum_iv_seed(checksum: [u8; 4]) -> u64 {
    u64::from(u32::from_be_bytes(checksum))
}

/// Recover the volume key from the config's wrapped-key blob.
///
/// Any failure along this path — wrong password, corrupted blob, or
/// deliberate tampering — collapses to [`EncfsError::InvalidPassword`]: the
/// caller cannot distinguish "bad password" from "bad data" here by design.
pub fn unwrap(config: &VolumeConfig, kek: &SecretBox<Vec<u8>>) -> Result<VolumeKey> {
    let key_bytes = key_size_bytes(config.key_size_bits)?;
    let kek_bytes = kek.expose_secret();
    if kek_bytes.len() != key_bytes + 16 {
        return Err(EncfsError::InvalidPassword);
    }
    let kek_key = &kek_bytes[..key_bytes];

    if config.wrapped_key.len() < 4 {
        return Err(EncfsError::invalid_config("wrappedKey", "blob shorter than checksum field"));
    }
    let (checksum_stored, ciphertext_tail) = config.wrapped_key.split_at(4);
    let mut checksum_arr = [0u8; 4];
    checksum_arr.copy_from_slice(checksum_stored);

    let iv_seed = checksum_iv_seed(checksum_arr);
    let mut plaintext = crypto::stream_decrypt(kek_key, iv_seed, ciphertext_tail)?;

    if plaintext.len() != key_bytes + 16 {
        plaintext.zeroize();
        return Err(EncfsError::InvalidPassword);
    }

    let recomputed = crypto::mac4_from_mac64(crypto::mac64(kek_key, &plaintext, [0; 8]));
    if recomputed.ct_eq(checksum_stored).unwrap_u8() != 1 {
        plaintext.zeroize();
        return Err(EncfsError::InvalidPassword);
    }

    let key = plaintext[..key_bytes].to_vec();
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&plaintext[key_bytes..key_bytes + 16]);
    plaintext.zeroize();

    VolumeKey::new(key, iv)
}

/// Wrap a volume key under a KEK, producing the bytes stored as the
/// config's `encodedKeyData`. Exact inverse of [`unwrap`].
pub fn wrap(config: &VolumeConfig, kek: &SecretBox<Vec<u8>>, volume_key: &VolumeKey) -> Result<Vec<u8>> {
    let key_bytes = key_size_bytes(config.key_size_bits)?;
    let kek_bytes = kek.expose_secret();
    if kek_bytes.len() != key_bytes + 16 {
        return Err(EncfsError::invalid_config("derivedKek", "unexpected KEK length"));
    }
    let kek_key = &kek_bytes[..key_bytes];

    let mut plaintext = volume_key.with_key(|k| {
        volume_key.with_iv(|iv| {
            let mut v = Vec::with_capacity(key_bytes + 16);
            v.extend_from_slice(k);
            v.extend_from_slice(iv);
            v
        })
    });

    let checksum = crypto::mac4_from_mac64(crypto::mac64(kek_key, &plaintext, [0; 8]));
    let iv_seed = checksum_iv_seed(checksum);
    let ciphertext_tail = crypto::stream_encrypt(kek_key, iv_seed, &plaintext)?;
    plaintext.zeroize();

    let mut blob = Vec::with_capacity(4 + ciphertext_tail.len());
    blob.extend_from_slice(&checksum);
    blob.extend_from_slice(&ciphertext_tail);
    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(salt: Vec<u8>, wrapped_key: Vec<u8>) -> VolumeConfig {
        VolumeConfig::new(
            "test",
            crate::config::ContentAlgorithm::Cbc,
            crate::config::NameAlgorithm::Block,
            192,
            1024,
            true,
            true,
            true,
            false,
            0,
            0,
            1000,
            salt,
            wrapped_key,
        )
        .unwrap()
    }

    #[test]
    fn wrap_unwrap_roundtrip() {
        let salt = b"some-salt-bytes-".to_vec();
        let mut config = config_with(salt.clone(), Vec::new());
        let kek = derive_password_key(&config, "correct horse battery staple").unwrap();

        let volume_key = VolumeKey::random(192).unwrap();
        let wrapped = wrap(&config, &kek, &volume_key).unwrap();
        config.wrapped_key = wrapped;

        let recovered = unwrap(&config, &kek).unwrap();
        volume_key.with_key(|expected_key| {
            recovered.with_key(|actual_key| assert_eq!(expected_key, actual_key));
        });
        volume_key.with_iv(|expected_iv| {
            recovered.with_iv(|actual_iv| assert_eq!(expected_iv, actual_iv));
        });
    }

    #[test]
    fn wrong_password_is_invalid_password_not_corrupt() {
        let salt = b"another-salt-bya".to_vec();
        let mut config = config_with(salt, Vec::new());
        let kek = derive_password_key(&config, "right password").unwrap();
        let volume_key = VolumeKey::random(192).unwrap();
        config.wrapped_key = wrap(&config, &kek, &volume_key).unwrap();

        let wrong_kek = derive_password_key(&config, "wrong password").unwrap();
        let err = unwrap(&config, &wrong_kek).unwrap_err();
        assert!(matches!(err, EncfsError::InvalidPassword));
    }

    #[test]
    fn tampered_blob_is_invalid_password() {
        let salt = b"yet-another-salt".to_vec();
        let mut config = config_with(salt, Vec::new());
        let kek = derive_password_key(&config, "hunter2").unwrap();
        let volume_key = VolumeKey::random(192).unwrap();
        let mut wrapped = wrap(&config, &kek, &volume_key).unwrap();
        let last = wrapped.len() - 1;
        wrapped[last] ^= 0xFF;
        config.wrapped_key = wrapped;

        let err = unwrap(&config, &kek).unwrap_err();
        assert!(matches!(err, EncfsError::InvalidPassword));
    }

    #[test]
    fn rejects_unsupported_key_size() {
        let err = VolumeKey::new(vec![0u8; 20], [0u8; 16]).unwrap_err();
        assert!(matches!(err, EncfsError::Unsupported { .. }));
    }
}
