use crate::tree::{NodeId, SourceTree};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineChoice {
    Build,
    Host,
}

/// What `library()` declarations build when the declaration itself is
/// kind-polymorphic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LibraryKind {
    Shared,
    Static,
    Both,
}

impl std::str::FromStr for LibraryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(LibraryKind::Shared),
            "static" => Ok(LibraryKind::Static),
            "both" => Ok(LibraryKind::Both),
            other => Err(format!("unknown library kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub default_library: LibraryKind,
    /// Directory name (under the source root) searched for nested projects.
    pub subproject_dir: String,
    /// File name of a build description within its directory.
    pub build_filename: String,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            default_library: LibraryKind::Shared,
            subproject_dir: "subprojects".to_string(),
            build_filename: "mantle.build".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found")]
    NotFound,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
}

/// Supplier of parsed build files, by path. The parser lives outside this
/// crate; inclusion parses into the shared arena so node identity stays
/// global across one analysis.
pub trait FileLoader {
    fn load(&self, tree: &mut SourceTree, path: &Path) -> Result<NodeId, LoadError>;
}

/// Loader for contexts that must never touch files (hand-built trees in
/// tests, single-file analyses). Every load fails as missing.
pub struct NoLoader;

impl FileLoader for NoLoader {
    fn load(&self, _tree: &mut SourceTree, _path: &Path) -> Result<NodeId, LoadError> {
        Err(LoadError::NotFound)
    }
}

/// Per-language compiler probing. Detection itself is outside this core;
/// the introspection layer only needs to know whether a declared language
/// requirement can be satisfied.
pub trait ToolchainService {
    fn detect(&self, lang: &str, machine: MachineChoice) -> anyhow::Result<()>;
}

/// Accepts every language. The default for introspection-only runs, where
/// actual compiler discovery would add nothing.
pub struct NoopToolchains;

impl ToolchainService for NoopToolchains {
    fn detect(&self, _lang: &str, _machine: MachineChoice) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Accepts exactly the given language set; everything else fails detection.
pub struct FixedToolchains(pub HashSet<String>);

impl FixedToolchains {
    pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(langs: I) -> Self {
        Self(langs.into_iter().map(Into::into).collect())
    }
}

impl ToolchainService for FixedToolchains {
    fn detect(&self, lang: &str, _machine: MachineChoice) -> anyhow::Result<()> {
        if self.0.contains(lang) {
            Ok(())
        } else {
            anyhow::bail!("no compiler found for language '{lang}'")
        }
    }
}

/// Borrowed handles to everything the evaluator consumes from outside.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub loader: &'a dyn FileLoader,
    pub toolchains: &'a dyn ToolchainService,
}

impl<'a> Services<'a> {
    pub fn new(loader: &'a dyn FileLoader, toolchains: &'a dyn ToolchainService) -> Self {
        Self { loader, toolchains }
    }
}
