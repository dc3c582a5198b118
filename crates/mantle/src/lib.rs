/*! Unified interface for build-description analysis.
 *
 * Single import for everything you need: parsing build files, running the
 * abstract evaluator, and collecting introspection records. The loaders in
 * this crate connect the parser to the analysis core; everything else is
 * re-exported from the member crates.
 */

pub use mantle_core as core;
pub use mantle_parser as parser;

pub use mantle_core::{
    introspect, Analysis, AnalysisOptions, Dependency, Error, FileListEntry, FileRef, FlowGraph,
    FlowNode, FuncValue, FunctionTable, Interp, Introspection, IntrospectionResult, LibraryKind,
    NoopToolchains, ProjectInfo, Result, Services, SourceTree, Target, TargetKind,
    ToolchainService, Value,
};

pub use mantle_parser::{check, parse_into, ParseError};

mod loaders;

pub use loaders::{BuildFileLoader, MemoryLoader};

/// Introspect the project rooted at `source_root`, reading build files from
/// disk and accepting every declared language.
pub fn introspect_root(
    source_root: impl Into<std::path::PathBuf>,
    options: AnalysisOptions,
) -> Result<IntrospectionResult> {
    let loader = BuildFileLoader;
    let toolchains = NoopToolchains;
    mantle_core::introspect(source_root, options, Services::new(&loader, &toolchains))
}
