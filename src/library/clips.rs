// Clip storage: resolves payload names to files under the clip directory
use std::fs::File;
use std::path::{Component, Path, PathBuf};

use crate::error::PlaybackError;
use crate::library::scanner::DirectoryScanner;

/// Fixed directory prefix that clip names are resolved against
#[derive(Debug, Clone)]
pub struct ClipLibrary {
    root: PathBuf,
}

/// An opened clip. The file is closed when this is dropped.
pub struct OpenClip {
    pub name: String,
    pub path: PathBuf,
    pub file: File,
}

impl ClipLibrary {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a clip name to its storage path.
    ///
    /// Only plain relative names are accepted. Absolute paths, `..` and any other
    /// component that could leave the clip directory resolve to `ClipNotFound`.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, PlaybackError> {
        let relative = Path::new(name);
        let plain = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !plain {
            tracing::warn!("Rejecting clip name outside the clip directory: {:?}", name);
            return Err(PlaybackError::ClipNotFound(name.to_string()));
        }

        Ok(self.root.join(relative))
    }

    /// Open a clip for reading
    pub fn open(&self, name: &str) -> Result<OpenClip, PlaybackError> {
        let path = self.resolve(name)?;

        if !path.is_file() {
            return Err(PlaybackError::ClipNotFound(name.to_string()));
        }

        let file = File::open(&path).map_err(|e| {
            tracing::warn!("Failed to open clip {:?}: {}", path, e);
            PlaybackError::ClipNotFound(name.to_string())
        })?;

        Ok(OpenClip {
            name: name.to_string(),
            path,
            file,
        })
    }

    /// Names of every playable clip currently in storage
    pub fn catalog(&self) -> anyhow::Result<Vec<String>> {
        DirectoryScanner::scan(&self.root)
    }
}

impl OpenClip {
    /// File extension, used as a format hint for the decoder
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }
}
