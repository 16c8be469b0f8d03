//! The single error type returned by every public operation in this crate.
//!
//! Unlike a per-module error enum aggregated by a re-export hub, `EncfsError`
//! is one flat discriminated union: every failure mode the volume surface
//! can produce collapses into one of its variants, each carrying whatever
//! context (path, block index, field name) is useful for debugging a corrupt
//! volume without a debugger attached.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Zero-based index of a content block within a file.
pub type BlockIndex = u64;

/// The one error type this crate's public API returns.
#[derive(Debug, Error)]
pub enum EncfsError {
    /// The XML config was structurally unrecognized or a field was out of range.
    #[error("invalid config field `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// A flag or algorithm this core refuses to honor (e.g. `externalIVChaining=1`).
    #[error("unsupported {kind} `{name}`")]
    Unsupported { kind: &'static str, name: String },

    /// The wrapped-key checksum did not verify. Deliberately carries no
    /// further detail: whether the root cause was a wrong password, a
    /// corrupted wrapped-key blob, or tampering is not distinguishable and
    /// must not be leaked to the caller.
    #[error("invalid password")]
    InvalidPassword,

    /// A cipher, padding, or structural error in a block or filename.
    #[error("corrupt data at {path}{}", fmt_block(*block))]
    CorruptData {
        path: PathBuf,
        block: Option<BlockIndex>,
        reason: String,
    },

    /// **[INTEGRITY VIOLATION]** A MAC-16 (filename) or block MAC disagreed
    /// with the recomputed value.
    #[error("checksum mismatch at {path}{}", fmt_block(*block))]
    ChecksumMismatch {
        path: PathBuf,
        block: Option<BlockIndex>,
    },

    /// Underlying file-provider I/O error, propagated with as much path
    /// context as was available at the call site.
    #[error("I/O error{}: {source}", path.as_deref().map(|p| format!(" at {}", p.display())).unwrap_or_default())]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },
}

fn fmt_block(block: Option<BlockIndex>) -> String {
    match block {
        Some(b) => format!(" (block {b})"),
        None => String::new(),
    }
}

impl EncfsError {
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        EncfsError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    pub fn unsupported(kind: &'static str, name: impl Into<String>) -> Self {
        EncfsError::Unsupported {
            kind,
            name: name.into(),
        }
    }

    pub fn corrupt(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        EncfsError::CorruptData {
            path: path.as_ref().to_path_buf(),
            block: None,
            reason: reason.into(),
        }
    }

    pub fn corrupt_block(path: impl AsRef<Path>, block: BlockIndex, reason: impl Into<String>) -> Self {
        EncfsError::CorruptData {
            path: path.as_ref().to_path_buf(),
            block: Some(block),
            reason: reason.into(),
        }
    }

    pub fn checksum_mismatch(path: impl AsRef<Path>, block: Option<BlockIndex>) -> Self {
        let path = path.as_ref().to_path_buf();
        tracing::warn!(path = %path.display(), ?block, "checksum mismatch");
        EncfsError::ChecksumMismatch { path, block }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        EncfsError::Io {
            path: Some(path.as_ref().to_path_buf()),
            source,
        }
    }
}

impl From<std::io::Error> for EncfsError {
    fn from(source: std::io::Error) -> Self {
        EncfsError::Io { path: None, source }
    }
}

pub type Result<T> = std::result::Result<T, EncfsError>;
