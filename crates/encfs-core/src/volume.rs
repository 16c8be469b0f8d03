//! The volume facade: open/create entry points and path-level operations.
//!
//! Construction is a single configuration record plus two top-level
//! functions rather than a staged builder, per the "builder-style volume
//! construction" design note. Path translation is recursive
//! segment-by-segment, reusing each directory's chain IV; content is
//! currently decoded/encoded as whole buffers rather than true
//! block-at-a-time lazy I/O (see [`crate::provider::read_all`]), which is a
//! pragmatic simplification for a provider-backed library rather than a
//! kernel filesystem.

use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use crate::config::{NameAlgorithm, VolumeConfig, CONFIG_FILE_NAME};
use crate::content;
use crate::error::{EncfsError, Result};
use crate::name;
use crate::provider::{self, FileProvider};
use crate::volume_key::{self, VolumeKey};

/// One entry in a plaintext directory listing.
#[derive(Debug, Clone)]
pub struct EncFile {
    pub name: String,
    pub is_directory: bool,
    /// On-disk (ciphertext) size; not the decoded plaintext length.
    pub size: u64,
}

struct ResolvedPath {
    ciphertext: PathBuf,
    /// Chain IV applicable to this path's own children, if it is a
    /// directory; unused when resolving a file path.
    chain_iv: [u8; 8],
}

/// An open EncFS volume: config, unlocked key, and the storage backend.
pub struct Volume<P: FileProvider> {
    config: VolumeConfig,
    key: VolumeKey,
    provider: P,
}

/// Open an existing volume, deriving the key from `password` and the
/// on-disk config's salt/iteration count.
#[tracing::instrument(skip(provider, password), fields(root = %provider.get_root_path().display()))]
pub fn open<P: FileProvider>(provider: P, password: &str) -> Result<Volume<P>> {
    let config_path = Path::new("/").join(CONFIG_FILE_NAME);
    let mut stream = provider.open_input_stream(&config_path)?;
    let bytes = provider::read_all(&mut stream).map_err(|e| EncfsError::io(&config_path, e))?;
    let config = VolumeConfig::parse(&bytes)?;

    let kek = volume_key::derive_password_key(&config, password)?;
    let key = volume_key::unwrap(&config, &kek)?;

    tracing::debug!("volume opened");
    Ok(Volume { config, key, provider })
}

/// Create a new volume: generates a fresh salt and volume key, wraps the
/// key under a KEK derived from `password`, and writes the config.
/// `config`'s own `salt`/`wrapped_key` fields are overwritten.
#[tracing::instrument(skip(provider, config, password))]
pub fn create<P: FileProvider>(provider: P, mut config: VolumeConfig, password: &str) -> Result<Volume<P>> {
    let mut salt = vec![0u8; 20];
    rand::fill(&mut salt[..]);
    config.salt = salt;
    config.wrapped_key = Vec::new();

    let kek = volume_key::derive_password_key(&config, password)?;
    let key = VolumeKey::random(config.key_size_bits)?;
    config.wrapped_key = volume_key::wrap(&config, &kek, &key)?;

    let bytes = config.write()?;
    let config_path = Path::new("/").join(CONFIG_FILE_NAME);
    let mut stream = provider.open_output_stream(&config_path, Some(bytes.len() as u64))?;
    stream.write_all(&bytes).map_err(|e| EncfsError::io(&config_path, e))?;

    tracing::debug!("volume created");
    Ok(Volume { config, key, provider })
}

impl<P: FileProvider> Volume<P> {
    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    fn resolve(&self, path: &Path) -> Result<ResolvedPath> {
        self.key.with_key(|key_bytes| {
            let mut chain_iv = [0u8; 8];
            let mut ciphertext = PathBuf::from("/");
            for component in path.components() {
                let Component::Normal(segment) = component else {
                    continue;
                };
                let segment = segment
                    .to_str()
                    .ok_or_else(|| EncfsError::invalid_config("path", "non-UTF-8 path component"))?;
                let encoded = name::encrypt_name(key_bytes, self.config.name_algorithm, chain_iv, segment)?;
                ciphertext.push(encoded);
                chain_iv = name::next_chain_iv(
                    key_bytes,
                    self.config.name_algorithm,
                    self.config.chained_name_iv,
                    chain_iv,
                    segment,
                );
            }
            Ok(ResolvedPath { ciphertext, chain_iv })
        })
    }

    fn leaf_name(path: &Path) -> Result<&str> {
        path.file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| EncfsError::invalid_config("path", "missing file name"))
    }

    /// List the plaintext contents of a directory. The on-disk config
    /// sidecar is always hidden at the volume root, for every name
    /// algorithm — it is never run through the name codec, so it can't be
    /// meaningfully decrypted, and would otherwise surface as a stray entry.
    #[tracing::instrument(skip(self), fields(dir = %dir.display()))]
    pub fn list(&self, dir: &Path) -> Result<Vec<EncFile>> {
        let resolved = self.resolve(dir)?;
        let entries = self.provider.list_files(&resolved.ciphertext)?;
        let at_root = dir == Path::new("/");

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let encoded_name = entry
                .path
                .file_name()
                .and_then(|s| s.to_str())
                .ok_or_else(|| EncfsError::invalid_config("path", "non-UTF-8 directory entry"))?;
            if at_root && encoded_name == CONFIG_FILE_NAME {
                continue;
            }
            let plaintext_name = self
                .key
                .with_key(|k| name::decrypt_name(k, self.config.name_algorithm, resolved.chain_iv, encoded_name))?;
            out.push(EncFile {
                name: plaintext_name,
                is_directory: entry.is_directory,
                size: entry.size,
            });
        }
        Ok(out)
    }

    pub fn exists(&self, path: &Path) -> Result<bool> {
        let resolved = self.resolve(path)?;
        self.provider.exists(&resolved.ciphertext)
    }

    /// Open a file for reading. Decodes the whole file eagerly and hands
    /// back a `Read` over the plaintext.
    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    pub fn open_read(&self, path: &Path) -> Result<io::Cursor<Vec<u8>>> {
        let resolved = self.resolve(path)?;
        let leaf = Self::leaf_name(path)?;
        let mut stream = self.provider.open_input_stream(&resolved.ciphertext)?;
        let ciphertext = provider::read_all(&mut stream).map_err(|e| EncfsError::io(&resolved.ciphertext, e))?;
        let plaintext = self
            .key
            .with_key(|k| content::decode_file(k, &self.config, leaf, &resolved.ciphertext, &ciphertext))?;
        Ok(io::Cursor::new(plaintext))
    }

    /// Open a file for writing. Writes are buffered in memory; call
    /// [`VolumeWriter::finish`] to encode and commit them. `length_hint`
    /// mirrors the capability providers that need an upfront size would
    /// use — this in-memory writer doesn't need it, but computes it anyway
    /// via [`content::ciphertext_length`] for providers that do.
    pub fn open_write(&self, path: &Path, _length_hint: Option<u64>) -> Result<VolumeWriter<'_, P>> {
        Ok(VolumeWriter {
            volume: self,
            path: path.to_path_buf(),
            buffer: Vec::new(),
        })
    }

    fn write_file_bytes(&self, path: &Path, plaintext: &[u8]) -> Result<()> {
        let resolved = self.resolve(path)?;
        let leaf = Self::leaf_name(path)?;
        let ciphertext = self.key.with_key(|k| content::encode_file(k, &self.config, leaf, plaintext))?;
        let mut stream = self
            .provider
            .open_output_stream(&resolved.ciphertext, Some(ciphertext.len() as u64))?;
        stream.write_all(&ciphertext).map_err(|e| EncfsError::io(&resolved.ciphertext, e))?;
        Ok(())
    }

    /// Create an empty file (still writes a per-file IV header under
    /// `uniqueIV`).
    pub fn create_file(&self, path: &Path) -> Result<()> {
        self.write_file_bytes(path, &[])
    }

    pub fn create_dir(&self, path: &Path) -> Result<()> {
        let resolved = self.resolve(path)?;
        self.provider.create_directory(&resolved.ciphertext)
    }

    /// Rename translates both sides; because `resolve` always re-derives
    /// the chain IV fresh from a path's own ancestry, a cross-directory
    /// rename naturally re-encrypts the name under the destination's chain
    /// IV. File contents are untouched — their IV is file-local.
    #[tracing::instrument(skip(self), fields(src = %src.display(), dst = %dst.display()))]
    pub fn rename(&self, src: &Path, dst: &Path) -> Result<()> {
        let resolved_src = self.resolve(src)?;
        let resolved_dst = self.resolve(dst)?;
        self.provider.rename(&resolved_src.ciphertext, &resolved_dst.ciphertext)
    }

    pub fn delete(&self, path: &Path) -> Result<()> {
        let resolved = self.resolve(path)?;
        self.provider.delete(&resolved.ciphertext)
    }
}

/// A buffered writer returned by [`Volume::open_write`]. Dropping it
/// without calling [`Self::finish`] discards whatever was written, mirroring
/// the "abandoned stream" resource note: nothing is committed until close.
pub struct VolumeWriter<'a, P: FileProvider> {
    volume: &'a Volume<P>,
    path: PathBuf,
    buffer: Vec<u8>,
}

impl<P: FileProvider> Write for VolumeWriter<'_, P> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<P: FileProvider> VolumeWriter<'_, P> {
    /// Encode the buffered plaintext under stream/block/dual-mode-tail
    /// rules and commit it through the provider.
    pub fn finish(self) -> Result<()> {
        self.volume.write_file_bytes(&self.path, &self.buffer)
    }
}
