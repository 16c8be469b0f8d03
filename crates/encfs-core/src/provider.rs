//! The storage capability interface the volume facade is built against,
//! plus a reference implementation backed by the host filesystem.
//!
//! The teacher has no equivalent abstraction — its vault talks to
//! `std::fs` directly behind a handle cache. This is new code kept in the
//! teacher's idiom: `thiserror`'d errors via [`crate::error::EncfsError`]
//! carrying path context, blocking `std::io::{Read, Write}` streams.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{EncfsError, Result};

/// Metadata the facade needs about one entry in a directory listing.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub is_directory: bool,
    pub size: u64,
}

/// Storage backend capability interface. A reference implementation
/// ([`LocalFsProvider`]) maps directly onto the host filesystem; the
/// interface equally admits network or in-memory backends.
pub trait FileProvider: Send + Sync {
    fn get_root_path(&self) -> &Path;
    fn exists(&self, path: &Path) -> Result<bool>;
    fn is_directory(&self, path: &Path) -> Result<bool>;
    fn list_files(&self, path: &Path) -> Result<Vec<FileInfo>>;
    fn open_input_stream(&self, path: &Path) -> Result<Box<dyn Read>>;
    fn open_output_stream(&self, path: &Path, length_hint: Option<u64>) -> Result<Box<dyn Write>>;
    fn create_directory(&self, path: &Path) -> Result<()>;
    fn rename(&self, src: &Path, dst: &Path) -> Result<()>;
    fn delete(&self, path: &Path) -> Result<()>;
    fn get_file_info(&self, path: &Path) -> Result<FileInfo>;
}

/// A [`FileProvider`] backed directly by `std::fs`, rooted at a directory
/// on the host filesystem.
pub struct LocalFsProvider {
    root: PathBuf,
}

impl LocalFsProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFsProvider { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if let Ok(relative) = path.strip_prefix("/") {
            self.root.join(relative)
        } else {
            self.root.join(path)
        }
    }
}

impl FileProvider for LocalFsProvider {
    fn get_root_path(&self) -> &Path {
        &self.root
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.resolve(path).exists())
    }

    fn is_directory(&self, path: &Path) -> Result<bool> {
        Ok(self.resolve(path).is_dir())
    }

    fn list_files(&self, path: &Path) -> Result<Vec<FileInfo>> {
        let dir = self.resolve(path);
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| EncfsError::io(&dir, e))? {
            let entry = entry.map_err(|e| EncfsError::io(&dir, e))?;
            let metadata = entry.metadata().map_err(|e| EncfsError::io(entry.path(), e))?;
            out.push(FileInfo {
                path: entry.path(),
                is_directory: metadata.is_dir(),
                size: metadata.len(),
            });
        }
        Ok(out)
    }

    fn open_input_stream(&self, path: &Path) -> Result<Box<dyn Read>> {
        let resolved = self.resolve(path);
        let file = File::open(&resolved).map_err(|e| EncfsError::io(&resolved, e))?;
        Ok(Box::new(file))
    }

    fn open_output_stream(&self, path: &Path, _length_hint: Option<u64>) -> Result<Box<dyn Write>> {
        let resolved = self.resolve(path);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&resolved)
            .map_err(|e| EncfsError::io(&resolved, e))?;
        Ok(Box::new(file))
    }

    fn create_directory(&self, path: &Path) -> Result<()> {
        let resolved = self.resolve(path);
        fs::create_dir_all(&resolved).map_err(|e| EncfsError::io(&resolved, e))
    }

    fn rename(&self, src: &Path, dst: &Path) -> Result<()> {
        let resolved_src = self.resolve(src);
        let resolved_dst = self.resolve(dst);
        if let Some(parent) = resolved_dst.parent() {
            fs::create_dir_all(parent).map_err(|e| EncfsError::io(parent, e))?;
        }
        fs::rename(&resolved_src, &resolved_dst).map_err(|e| EncfsError::io(&resolved_src, e))
    }

    fn delete(&self, path: &Path) -> Result<()> {
        let resolved = self.resolve(path);
        if resolved.is_dir() {
            fs::remove_dir(&resolved).map_err(|e| EncfsError::io(&resolved, e))
        } else {
            fs::remove_file(&resolved).map_err(|e| EncfsError::io(&resolved, e))
        }
    }

    fn get_file_info(&self, path: &Path) -> Result<FileInfo> {
        let resolved = self.resolve(path);
        let metadata = fs::metadata(&resolved).map_err(|e| EncfsError::io(&resolved, e))?;
        Ok(FileInfo {
            path: resolved,
            is_directory: metadata.is_dir(),
            size: metadata.len(),
        })
    }
}

/// Read an entire input stream to a buffer; a small convenience used by the
/// volume facade, which currently decodes whole files rather than
/// streaming block-by-block (see `volume.rs`'s module doc).
pub fn read_all(stream: &mut dyn Read) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    Ok(buf)
}
