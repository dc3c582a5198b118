//! Project introspection on top of the abstract evaluator.
//!
//! [`Introspection`] is a [`FunctionTable`] that recognizes the project-shape
//! declarations (`project`, `dependency`, the target family) and accumulates
//! structured records for them while the evaluator drives the traversal.
//! Everything it reports is a static approximation: values the resolver
//! cannot determine show up as unknowns, never as guesses.

use crate::analysis::{Analysis, FileListEntry, FuncValue};
use crate::interp::{Arguments, FunctionTable, Interp};
use crate::services::{AnalysisOptions, LibraryKind, MachineChoice, Services};
use crate::tree::NodeId;
use crate::values::{DependencyId, TargetId, Value};
use crate::{Error, Result};
use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Executable,
    SharedLibrary,
    StaticLibrary,
    BothLibraries,
    SharedModule,
}

/// One declared build target.
#[derive(Debug, Clone, Serialize)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub kind: TargetKind,
    /// Build file the declaration appeared in.
    pub defined_in: PathBuf,
    pub subdir: String,
    pub build_by_default: bool,
    pub installed: bool,
    pub outputs: Vec<String>,
    pub sources: Vec<FileListEntry>,
    pub extra_files: Vec<FileListEntry>,
    pub kwargs: IndexMap<String, Value>,
    /// Tree node of the declaring call, for source-rewriting tools.
    #[serde(skip)]
    pub node: NodeId,
    /// Argument nodes the source list came from, for source-rewriting tools.
    #[serde(skip)]
    pub source_nodes: Vec<NodeId>,
}

/// One declared external dependency lookup.
#[derive(Debug, Clone, Serialize)]
pub struct Dependency {
    pub id: DependencyId,
    pub name: String,
    /// `None` when the `required` argument could not be determined.
    pub required: Option<bool>,
    pub version: Vec<String>,
    pub has_fallback: bool,
    /// Whether the lookup sits inside any `if` arm.
    pub conditional: bool,
    #[serde(skip)]
    pub node: NodeId,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubprojectInfo {
    pub name: String,
    pub descriptive_name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectInfo {
    pub descriptive_name: String,
    pub version: String,
    pub languages: Vec<String>,
    pub subprojects: Vec<SubprojectInfo>,
}

/// Everything one introspection pass produced.
#[derive(Debug)]
pub struct IntrospectionResult {
    pub project: ProjectInfo,
    pub targets: Vec<Target>,
    pub dependencies: Vec<Dependency>,
    pub analysis: Analysis,
}

/// Function table collecting project structure during evaluation.
pub struct Introspection {
    is_subproject: bool,
    project_name: Option<String>,
    project_version: String,
    languages: Vec<String>,
    subprojects: Vec<SubprojectInfo>,
    targets: Vec<Target>,
    dependencies: Vec<Dependency>,
}

impl Introspection {
    pub fn new() -> Self {
        Self::with_kind(false)
    }

    fn subproject() -> Self {
        Self::with_kind(true)
    }

    fn with_kind(is_subproject: bool) -> Self {
        Self {
            is_subproject,
            project_name: None,
            project_version: "undefined".to_string(),
            languages: Vec::new(),
            subprojects: Vec::new(),
            targets: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Consume the accumulator once evaluation finished.
    pub fn finish(self, analysis: Analysis) -> Result<IntrospectionResult> {
        let descriptive_name = self.project_name.ok_or_else(|| {
            Error::InvalidArguments("build description never calls project()".to_string())
        })?;
        Ok(IntrospectionResult {
            project: ProjectInfo {
                descriptive_name,
                version: self.project_version,
                languages: self.languages,
                subprojects: self.subprojects,
            },
            targets: self.targets,
            dependencies: self.dependencies,
            analysis,
        })
    }

    fn func_project(
        &mut self,
        interp: &mut Interp<'_>,
        args: &Arguments,
    ) -> Result<FuncValue> {
        if self.project_name.is_some() {
            return Err(Error::InvalidArguments("second call to project()".to_string()));
        }
        let values = interp.analysis.flatten_args(&args.positional)?;
        let Some(Value::Str(name)) = values.first() else {
            return Err(Error::InvalidArguments(
                "project() expects the project name as its first argument".to_string(),
            ));
        };
        self.project_name = Some(name.clone());
        if let Some(version_node) = args.kwarg("version") {
            if let Value::Str(v) = interp.analysis.runtime_value(version_node)? {
                self.project_version = v;
            }
        }

        let subproject_dir = match args.kwarg("subproject_dir") {
            Some(node) => match interp.analysis.runtime_value(node)? {
                Value::Str(s) => s,
                _ => interp.options.subproject_dir.clone(),
            },
            None => interp.options.subproject_dir.clone(),
        };
        if !self.is_subproject {
            for sub in discover_subprojects(&interp.source_root().join(&subproject_dir)) {
                self.do_subproject(interp, &subproject_dir, &sub);
            }
        }

        // Trailing positional arguments of project() are languages.
        self.add_languages(interp, &values[1..], Some(true), MachineChoice::Host)?;
        Ok(FuncValue::Value(Value::Unknown))
    }

    /// Analyze one nested project with its own evaluation state, sharing the
    /// node arena. A failing subproject is reported and skipped; it must not
    /// sink the analysis of the outer project.
    fn do_subproject(&mut self, interp: &mut Interp<'_>, subproject_dir: &str, name: &str) {
        let tree = std::mem::take(&mut interp.analysis.tree);
        let sub_root = interp.source_root().join(subproject_dir).join(name);
        let mut sub_interp =
            Interp::with_tree(tree, sub_root, interp.options.clone(), interp.services());
        let mut sub_intro = Introspection::subproject();
        let outcome = sub_interp.run(&mut sub_intro);
        interp.analysis.tree = std::mem::take(&mut sub_interp.analysis.tree);
        match outcome {
            Ok(()) => {
                self.subprojects.push(SubprojectInfo {
                    name: name.to_string(),
                    descriptive_name: sub_intro.project_name.clone(),
                    version: Some(sub_intro.project_version.clone()),
                });
                let target_base = self.targets.len() as u32;
                for mut t in sub_intro.targets {
                    t.id = TargetId(target_base + t.id.0);
                    self.targets.push(t);
                }
                let dep_base = self.dependencies.len() as u32;
                for mut d in sub_intro.dependencies {
                    d.id = DependencyId(dep_base + d.id.0);
                    self.dependencies.push(d);
                }
            }
            Err(err) => {
                tracing::warn!(subproject = name, error = %err, "skipping unanalyzable subproject");
                self.subprojects.push(SubprojectInfo {
                    name: name.to_string(),
                    descriptive_name: None,
                    version: None,
                });
            }
        }
    }

    fn func_add_languages(&mut self, interp: &mut Interp<'_>, args: &Arguments) -> Result<FuncValue> {
        let langs = interp.analysis.flatten_args(&args.positional)?;
        let required = match args.kwarg("required") {
            Some(node) => match interp.analysis.runtime_value(node)? {
                Value::Bool(b) => Some(b),
                _ => None,
            },
            None => Some(true),
        };
        let machine = match args.kwarg("native") {
            Some(node) => match interp.analysis.runtime_value(node)? {
                Value::Bool(true) => MachineChoice::Build,
                _ => MachineChoice::Host,
            },
            None => MachineChoice::Host,
        };
        self.add_languages(interp, &langs, required, machine)
            .map(FuncValue::Value)
    }

    fn add_languages(
        &mut self,
        interp: &Interp<'_>,
        langs: &[Value],
        required: Option<bool>,
        machine: MachineChoice,
    ) -> Result<Value> {
        let mut all_known = true;
        let mut all_found = true;
        for lang in langs {
            let lang = match lang {
                Value::Str(s) => s.to_lowercase(),
                Value::Unknown => {
                    all_known = false;
                    continue;
                }
                other => {
                    return Err(Error::InvalidArguments(format!(
                        "language arguments must be strings, not {}",
                        other.type_name()
                    )))
                }
            };
            match interp.services().toolchains.detect(&lang, machine) {
                Ok(()) => {
                    if !self.languages.contains(&lang) {
                        self.languages.push(lang);
                    }
                }
                Err(err) if required == Some(true) => {
                    return Err(Error::Toolchain { lang, message: err.to_string() })
                }
                Err(err) => {
                    tracing::warn!(lang, error = %err, "optional language not available");
                    all_found = false;
                }
            }
        }
        if !all_known {
            Ok(Value::Unknown)
        } else {
            Ok(Value::Bool(all_found))
        }
    }

    fn func_dependency(&mut self, interp: &mut Interp<'_>, node: NodeId, args: &Arguments) -> Result<FuncValue> {
        let values = interp.analysis.flatten_args(&args.positional)?;
        let name = match values.first() {
            Some(Value::Str(s)) => s.clone(),
            // Dynamically named lookups cannot be recorded meaningfully.
            Some(Value::Unknown) | None => return Ok(FuncValue::Value(Value::Unknown)),
            Some(other) => {
                return Err(Error::InvalidArguments(format!(
                    "dependency() name must be a string, not {}",
                    other.type_name()
                )))
            }
        };
        let required = match args.kwarg("required") {
            Some(n) => match interp.analysis.runtime_value(n)? {
                Value::Bool(b) => Some(b),
                _ => None,
            },
            None => Some(true),
        };
        let version = match args.kwarg("version") {
            Some(n) => match interp.analysis.runtime_value(n)? {
                Value::Str(s) => vec![s],
                Value::List(items) => items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect(),
                _ => Vec::new(),
            },
            None => Vec::new(),
        };
        let id = DependencyId(self.dependencies.len() as u32);
        self.dependencies.push(Dependency {
            id,
            name,
            required,
            version,
            has_fallback: args.kwarg("fallback").is_some(),
            conditional: interp.in_conditional(),
            node,
        });
        Ok(FuncValue::Value(Value::Dependency(id)))
    }

    fn build_target(
        &mut self,
        interp: &mut Interp<'_>,
        node: NodeId,
        args: &Arguments,
        kind: TargetKind,
    ) -> Result<FuncValue> {
        let values = interp.analysis.flatten_args(&args.positional)?;
        let name = match values.first() {
            Some(Value::Str(s)) => s.clone(),
            _ => {
                tracing::warn!(node = %node, "skipping target with undeterminable name");
                return Ok(FuncValue::Value(Value::Unknown));
            }
        };

        // Sources are the remaining positional nodes plus the 'sources'
        // keyword node; kept as nodes so rewriting tools can edit them.
        let mut source_nodes: Vec<NodeId> = args.positional[1..].to_vec();
        if let Some(n) = args.kwarg("sources") {
            source_nodes.push(n);
        }
        let root = interp.source_root().to_path_buf();
        let subdir = interp.subdir().to_string();
        let sources = interp.analysis.resolved_file_list(&root, &subdir, &source_nodes)?;
        let extra_files = match args.kwarg("extra_files") {
            Some(n) => interp.analysis.resolved_file_list(&root, &subdir, &[n])?,
            None => Vec::new(),
        };

        let kwargs = interp.analysis.resolved_kwargs(&args.kwargs)?;
        let build_by_default = kwargs
            .get("build_by_default")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let installed = kwargs.get("install").and_then(Value::as_bool).unwrap_or(false);

        let id = TargetId(self.targets.len() as u32);
        self.targets.push(Target {
            id,
            name: name.clone(),
            kind,
            defined_in: root.join(&subdir).join(&interp.options.build_filename),
            subdir,
            build_by_default,
            installed,
            outputs: outputs_for(kind, &name),
            sources,
            extra_files,
            kwargs,
            node,
            source_nodes,
        });
        Ok(FuncValue::Value(Value::Target(id)))
    }

    fn library_kind(&self, interp: &Interp<'_>) -> TargetKind {
        match interp.options.default_library {
            LibraryKind::Shared => TargetKind::SharedLibrary,
            LibraryKind::Static => TargetKind::StaticLibrary,
            LibraryKind::Both => TargetKind::BothLibraries,
        }
    }

    fn func_build_target(
        &mut self,
        interp: &mut Interp<'_>,
        node: NodeId,
        args: &Arguments,
    ) -> Result<FuncValue> {
        let kind = match args.kwarg("target_type") {
            Some(n) => match interp.analysis.runtime_value(n)? {
                Value::Str(s) => match s.as_str() {
                    "executable" => TargetKind::Executable,
                    "shared_library" => TargetKind::SharedLibrary,
                    "static_library" => TargetKind::StaticLibrary,
                    "both_libraries" => TargetKind::BothLibraries,
                    "shared_module" => TargetKind::SharedModule,
                    "library" => self.library_kind(interp),
                    other => {
                        return Err(Error::InvalidArguments(format!(
                            "unknown target_type '{other}'"
                        )))
                    }
                },
                _ => {
                    tracing::warn!(node = %node, "skipping build_target() with undeterminable type");
                    return Ok(FuncValue::Value(Value::Unknown));
                }
            },
            None => {
                return Err(Error::InvalidArguments(
                    "build_target() requires a target_type keyword".to_string(),
                ))
            }
        };
        self.build_target(interp, node, args, kind)
    }
}

impl Default for Introspection {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionTable for Introspection {
    fn call(
        &mut self,
        interp: &mut Interp<'_>,
        node: NodeId,
        name: &str,
        args: &Arguments,
    ) -> Result<Option<FuncValue>> {
        let fv = match name {
            "project" => self.func_project(interp, args)?,
            "add_languages" => self.func_add_languages(interp, args)?,
            "dependency" => self.func_dependency(interp, node, args)?,
            "executable" => self.build_target(interp, node, args, TargetKind::Executable)?,
            "shared_library" => self.build_target(interp, node, args, TargetKind::SharedLibrary)?,
            "static_library" => self.build_target(interp, node, args, TargetKind::StaticLibrary)?,
            "both_libraries" => self.build_target(interp, node, args, TargetKind::BothLibraries)?,
            "shared_module" => self.build_target(interp, node, args, TargetKind::SharedModule)?,
            "library" => {
                let kind = self.library_kind(interp);
                self.build_target(interp, node, args, kind)?
            }
            "build_target" => self.func_build_target(interp, node, args)?,
            _ => return Ok(None),
        };
        Ok(Some(fv))
    }
}

fn outputs_for(kind: TargetKind, name: &str) -> Vec<String> {
    match kind {
        TargetKind::Executable => vec![name.to_string()],
        TargetKind::SharedLibrary | TargetKind::SharedModule => vec![format!("lib{name}.so")],
        TargetKind::StaticLibrary => vec![format!("lib{name}.a")],
        TargetKind::BothLibraries => vec![format!("lib{name}.so"), format!("lib{name}.a")],
    }
}

/// Candidate nested projects: directories under the subprojects directory
/// that carry their own build file is decided later by the loader; here any
/// directory entry qualifies, sorted for deterministic traversal.
fn discover_subprojects(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

/// Run a full introspection pass over the project rooted at `source_root`.
pub fn introspect(
    source_root: impl Into<PathBuf>,
    options: AnalysisOptions,
    services: Services<'_>,
) -> Result<IntrospectionResult> {
    let mut interp = Interp::new(source_root, options, services);
    let mut intro = Introspection::new();
    interp.run(&mut intro)?;
    intro.finish(interp.into_analysis())
}
