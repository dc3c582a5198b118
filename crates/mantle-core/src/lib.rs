/*! Static analysis core for mantle build descriptions.
 *
 * Tooling that inspects or rewrites build files cannot run them: the results
 * would depend on one concrete machine, and rewriting needs syntax, not
 * values. This crate evaluates a build description abstractly instead,
 * visiting every branch and loop body once, and produces a value-flow graph,
 * a flow-sensitive variable resolver and structured introspection records in
 * which everything machine-dependent is an explicit unknown.
 */

pub mod analysis;
pub mod graph;
pub mod interp;
pub mod introspect;
pub mod methods;
pub mod scope;
pub mod services;
pub mod tree;
pub mod values;

pub use analysis::{Analysis, FileListEntry, FuncValue};
pub use graph::{FlowGraph, FlowNode, UnknownId};
pub use interp::{Arguments, FunctionTable, Interp, NoFunctions};
pub use introspect::{
    introspect, Dependency, Introspection, IntrospectionResult, ProjectInfo, SubprojectInfo,
    Target, TargetKind,
};
pub use scope::Definitions;
pub use services::{
    AnalysisOptions, FileLoader, FixedToolchains, LibraryKind, LoadError, MachineChoice, NoLoader,
    NoopToolchains, Services, ToolchainService,
};
pub use tree::{ArithOp, CompareOp, FileId, IfArm, Node, NodeId, SourceTree, Span};
pub use values::{DependencyId, FileRef, TargetId, Value};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The analysis contradicted one of its own invariants; always a bug in
    /// the analysis, never in the analyzed project.
    #[error("internal error: {0}")]
    Internal(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("cannot load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: services::LoadError,
    },
    #[error("language '{lang}' is not usable: {message}")]
    Toolchain { lang: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests;
