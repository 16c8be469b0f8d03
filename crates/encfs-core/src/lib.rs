pub mod config;
pub mod content;
pub mod crypto;
pub mod error;
pub mod name;
pub mod provider;
pub mod volume;
pub mod volume_key;

pub use config::VolumeConfig;
pub use error::{EncfsError, Result};
pub use provider::{FileProvider, LocalFsProvider};
pub use volume::{create, open, EncFile, Volume, VolumeWriter};
