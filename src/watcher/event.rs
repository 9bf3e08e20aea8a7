use std::path::{Path, PathBuf};

/// A change to a watched file, after rule matching.
///
/// Paths are relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A matching file was created or its content changed.
    Modified(PathBuf),
    /// A matching file was removed.
    Deleted(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::Modified(path) | Self::Deleted(path) => path,
        }
    }
}
