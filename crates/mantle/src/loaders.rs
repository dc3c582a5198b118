//! File loaders bridging the parser into the analysis core.

use mantle_core::services::{FileLoader, LoadError};
use mantle_core::tree::{NodeId, SourceTree};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Reads build files from disk.
pub struct BuildFileLoader;

impl FileLoader for BuildFileLoader {
    fn load(&self, tree: &mut SourceTree, path: &Path) -> Result<NodeId, LoadError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                LoadError::NotFound
            } else {
                LoadError::Io(e)
            }
        })?;
        mantle_parser::parse_into(tree, path, &source).map_err(|e| LoadError::Parse(e.to_string()))
    }
}

/// Serves build files from an in-memory map, for tests and embedders that
/// analyze unsaved buffers.
#[derive(Default)]
pub struct MemoryLoader {
    files: HashMap<PathBuf, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, source: impl Into<String>) -> &mut Self {
        self.files.insert(path.into(), source.into());
        self
    }
}

impl FileLoader for MemoryLoader {
    fn load(&self, tree: &mut SourceTree, path: &Path) -> Result<NodeId, LoadError> {
        let source = self.files.get(path).ok_or(LoadError::NotFound)?;
        mantle_parser::parse_into(tree, path, source).map_err(|e| LoadError::Parse(e.to_string()))
    }
}
