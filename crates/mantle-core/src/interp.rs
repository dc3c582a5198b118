//! Abstract evaluation of build descriptions.
//!
//! The evaluator walks every statement of every reachable build file exactly
//! once, visiting all branch arms and loop bodies regardless of conditions.
//! It never executes anything; its outputs are the [`Analysis`] tables: the
//! value-flow graph, the definition tracker, and the call-result side table
//! that the resolver reads from.

use crate::analysis::{Analysis, FuncValue};
use crate::graph::{FlowNode, UnknownId};
use crate::scope::is_implicit;
use crate::services::{AnalysisOptions, Services};
use crate::tree::{ArithOp, IfArm, Node, NodeId, SourceTree};
use crate::values::{FileRef, Value};
use crate::{methods, Error, Result};
use indexmap::IndexSet;
use std::collections::HashSet;
use std::path::PathBuf;

/// Positional and keyword argument nodes of one call, as written.
#[derive(Debug, Clone)]
pub struct Arguments {
    pub positional: Vec<NodeId>,
    pub kwargs: Vec<(String, NodeId)>,
}

impl Arguments {
    /// Node of the given keyword argument, if present.
    pub fn kwarg(&self, name: &str) -> Option<NodeId> {
        self.kwargs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| *v)
    }
}

/// Pluggable handler for function calls the core does not define.
///
/// Consulted before the core builtins, so a table may also override those.
/// Returning `Ok(None)` falls through: first to the builtins, then to the
/// unknown-call default.
pub trait FunctionTable {
    fn call(
        &mut self,
        interp: &mut Interp<'_>,
        node: NodeId,
        name: &str,
        args: &Arguments,
    ) -> Result<Option<FuncValue>>;
}

/// Table with no entries. Core builtins and the unknown-call default still
/// apply; useful for pure dataflow analyses and tests.
pub struct NoFunctions;

impl FunctionTable for NoFunctions {
    fn call(
        &mut self,
        _interp: &mut Interp<'_>,
        _node: NodeId,
        _name: &str,
        _args: &Arguments,
    ) -> Result<Option<FuncValue>> {
        Ok(None)
    }
}

/// Calls that still run when handed a disabled value.
const DISABLER_EXEMPT: [&str; 3] = ["set_variable", "get_variable", "unset_variable"];

/// One evaluation pass over a project.
pub struct Interp<'a> {
    pub analysis: Analysis,
    pub options: AnalysisOptions,
    services: Services<'a>,
    source_root: PathBuf,
    subdir: String,
    /// Branch indices of the `if` clauses currently being traversed; the
    /// control path recorded with each definition.
    nesting: Vec<usize>,
    condition_level: usize,
    unknown_counter: u32,
    /// Build files already included, guarding against inclusion cycles.
    processed_files: HashSet<PathBuf>,
}

impl<'a> Interp<'a> {
    pub fn new(
        source_root: impl Into<PathBuf>,
        options: AnalysisOptions,
        services: Services<'a>,
    ) -> Self {
        Self::with_tree(SourceTree::new(), source_root, options, services)
    }

    /// Like [`Interp::new`], but continues filling an existing arena. Nested
    /// project analysis uses this so node identity stays global.
    pub fn with_tree(
        tree: SourceTree,
        source_root: impl Into<PathBuf>,
        options: AnalysisOptions,
        services: Services<'a>,
    ) -> Self {
        let mut analysis = Analysis::new();
        analysis.tree = tree;
        Self {
            analysis,
            options,
            services,
            source_root: source_root.into(),
            subdir: String::new(),
            nesting: Vec::new(),
            condition_level: 0,
            unknown_counter: 0,
            processed_files: HashSet::new(),
        }
    }

    pub fn source_root(&self) -> &std::path::Path {
        &self.source_root
    }

    /// Subdirectory (relative to the source root) of the build file
    /// currently being evaluated. Empty at the root.
    pub fn subdir(&self) -> &str {
        &self.subdir
    }

    pub fn services(&self) -> Services<'a> {
        self.services
    }

    /// Whether evaluation is currently inside any `if` arm.
    pub fn in_conditional(&self) -> bool {
        self.condition_level > 0
    }

    pub fn into_analysis(self) -> Analysis {
        self.analysis
    }

    /// Mint a flow-graph node standing for a value with no syntactic origin.
    pub fn fresh_unknown(&mut self) -> FlowNode {
        let id = UnknownId(self.unknown_counter);
        self.unknown_counter += 1;
        FlowNode::Unknown(id)
    }

    /// Definition of `var` live at the current control path.
    ///
    /// Implicit identifiers always yield a fresh unknown. A miss yields a
    /// fresh unknown once a dynamic write has tainted the namespace, and is
    /// an error before that.
    pub fn current_definition(&mut self, var: &str) -> Result<FlowNode> {
        if is_implicit(var) {
            return Ok(self.fresh_unknown());
        }
        if let Some(def) = self.analysis.defs.lookup(var, &self.nesting) {
            return Ok(def);
        }
        if self.analysis.tainted {
            return Ok(self.fresh_unknown());
        }
        Err(Error::UndefinedVariable(var.to_string()))
    }

    /// Load and evaluate the root build file, then verify the pass left the
    /// flow graph consistent.
    pub fn run(&mut self, funcs: &mut dyn FunctionTable) -> Result<()> {
        let path = crate::analysis::normalize(self.source_root.join(&self.options.build_filename));
        tracing::debug!(path = %path.display(), "evaluating project");
        self.processed_files.insert(path.clone());
        let root = self
            .services
            .loader
            .load(&mut self.analysis.tree, &path)
            .map_err(|source| Error::Load { path: path.clone(), source })?;
        self.evaluate_statement(funcs, root)?;
        self.sanity_check()
    }

    /// Evaluate an already-parsed block, for callers that bypass the loader.
    pub fn run_block(&mut self, funcs: &mut dyn FunctionTable, root: NodeId) -> Result<()> {
        self.evaluate_statement(funcs, root)?;
        self.sanity_check()
    }

    /// Every identifier use must have gotten exactly one inbound flow edge.
    fn sanity_check(&self) -> Result<()> {
        for (id, node) in self.analysis.tree.iter() {
            if let Node::Id(name) = node {
                if self.analysis.dag.source_count(id.into()) > 1 {
                    return Err(Error::Internal(format!(
                        "identifier '{name}' ({id}) accumulated multiple dataflow sources"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn evaluate_statement(&mut self, funcs: &mut dyn FunctionTable, id: NodeId) -> Result<()> {
        let node = self.analysis.tree.node(id).clone();
        match node {
            Node::Str(_) | Node::FormatStr(_) | Node::Int(_) | Node::Bool(_) => Ok(()),
            // Break and continue carry no data and, since every loop body is
            // traversed exactly once, no control effect either.
            Node::Break | Node::Continue => Ok(()),
            Node::Id(name) => {
                let def = if is_implicit(&name) {
                    self.fresh_unknown()
                } else {
                    self.current_definition(&name)?
                };
                self.analysis.dag.add_edge(def, id.into());
                Ok(())
            }
            Node::Array { items } => {
                for item in &items {
                    self.analysis.dag.add_edge((*item).into(), id.into());
                }
                for item in items {
                    self.evaluate_statement(funcs, item)?;
                }
                Ok(())
            }
            Node::Dict { entries } => {
                for (_, v) in &entries {
                    self.analysis.dag.add_edge((*v).into(), id.into());
                }
                for (k, v) in entries {
                    self.evaluate_statement(funcs, k)?;
                    self.evaluate_statement(funcs, v)?;
                }
                Ok(())
            }
            Node::Paren { inner } => {
                self.analysis.dag.add_edge(inner.into(), id.into());
                self.evaluate_statement(funcs, inner)
            }
            Node::Arith { left, right, .. }
            | Node::Compare { left, right, .. }
            | Node::And { left, right }
            | Node::Or { left, right } => {
                self.analysis.dag.add_edge(left.into(), id.into());
                self.analysis.dag.add_edge(right.into(), id.into());
                self.evaluate_statement(funcs, left)?;
                self.evaluate_statement(funcs, right)
            }
            Node::Not { value } | Node::UMinus { value } => self.evaluate_statement(funcs, value),
            Node::Ternary { condition, when_true, when_false } => {
                self.analysis.dag.add_edge(condition.into(), id.into());
                self.evaluate_statement(funcs, condition)?;
                self.evaluate_statement(funcs, when_true)?;
                self.evaluate_statement(funcs, when_false)
            }
            Node::Index { object, index } => {
                self.analysis.dag.add_edge(object.into(), id.into());
                self.analysis.dag.add_edge(index.into(), id.into());
                self.evaluate_statement(funcs, object)?;
                self.evaluate_statement(funcs, index)
            }
            Node::FunctionCall { name, args, kwargs } => {
                self.function_call(funcs, id, &name, args, kwargs)
            }
            Node::MethodCall { object, name, args, kwargs } => {
                self.method_call(funcs, id, object, &name, args, kwargs)
            }
            Node::Assign { var, value } => self.assignment(funcs, id, &var, value),
            Node::PlusAssign { var, value } => self.plus_assignment(funcs, id, &var, value),
            Node::IfClause { arms, else_block } => self.evaluate_if(funcs, &arms, else_block),
            Node::Foreach { vars, items, block } => {
                self.evaluate_foreach(funcs, id, &vars, items, block)
            }
            Node::Block { statements } => {
                for stmt in statements {
                    self.evaluate_statement(funcs, stmt)?;
                }
                Ok(())
            }
        }
    }

    fn assignment(
        &mut self,
        funcs: &mut dyn FunctionTable,
        node: NodeId,
        var: &str,
        value: NodeId,
    ) -> Result<()> {
        self.evaluate_statement(funcs, value)?;
        self.analysis.defs.record(var, &self.nesting, value.into());
        self.analysis
            .all_assignments
            .entry(var.to_string())
            .or_default()
            .push(node);
        Ok(())
    }

    /// `x += v` is modeled as `x = x + v` over a synthesized addition node,
    /// so the resolver and the flow graph see an ordinary expression.
    fn plus_assignment(
        &mut self,
        funcs: &mut dyn FunctionTable,
        node: NodeId,
        var: &str,
        value: NodeId,
    ) -> Result<()> {
        self.evaluate_statement(funcs, value)?;
        let old = self.current_definition(var)?;
        let lhs = self.analysis.tree.add_synthetic(Node::Id(var.to_string()));
        self.analysis.dag.add_edge(old, lhs.into());
        let sum = self.analysis.tree.add_synthetic(Node::Arith {
            op: ArithOp::Add,
            left: lhs,
            right: value,
        });
        self.analysis.dag.add_edge(lhs.into(), sum.into());
        self.analysis.dag.add_edge(value.into(), sum.into());
        self.analysis.defs.record(var, &self.nesting, sum.into());
        self.analysis
            .all_assignments
            .entry(var.to_string())
            .or_default()
            .push(node);
        Ok(())
    }

    /// Traverse every arm, then join: definitions made inside the arms go
    /// out of scope, and where the arms disagree (or a variable was only
    /// defined conditionally) a merge node with inbound edges from every
    /// candidate replaces them. Conditions are deliberately not traversed;
    /// no value flows out of them.
    fn evaluate_if(
        &mut self,
        funcs: &mut dyn FunctionTable,
        arms: &[IfArm],
        else_block: Option<NodeId>,
    ) -> Result<()> {
        self.nesting.push(0);
        self.condition_level += 1;
        for arm in arms {
            self.evaluate_statement(funcs, arm.block)?;
            *self.nesting.last_mut().unwrap() += 1;
        }
        if let Some(block) = else_block {
            self.evaluate_statement(funcs, block)?;
        }
        self.condition_level -= 1;
        self.nesting.pop();

        let depth = self.nesting.len();
        let vars: Vec<String> = self.analysis.defs.variables().map(String::from).collect();
        for var in vars {
            let outer = self.analysis.defs.lookup(&var, &self.nesting);
            let mut candidates = self.analysis.defs.take_deeper_than(&var, depth);
            if let Some(outer) = outer {
                if !candidates.contains(&outer) {
                    candidates.push(outer);
                }
            }
            if candidates.len() > 1 || (outer.is_none() && !candidates.is_empty()) {
                let merged = self.fresh_unknown();
                for candidate in candidates {
                    self.analysis.dag.add_edge(candidate, merged);
                }
                self.analysis.defs.record(&var, &self.nesting, merged);
            }
        }
        Ok(())
    }

    /// The body is traversed exactly once. Every variable the body might
    /// write is seeded unknown before traversal (an earlier iteration may
    /// already have written it) and again after (the loop may have run zero
    /// times), alongside the loop variables themselves.
    fn evaluate_foreach(
        &mut self,
        funcs: &mut dyn FunctionTable,
        node: NodeId,
        vars: &[String],
        items: NodeId,
        block: NodeId,
    ) -> Result<()> {
        self.analysis.dag.add_edge(items.into(), node.into());
        self.evaluate_statement(funcs, items)?;
        let writes = self.find_potential_writes(block);
        for var in vars {
            let u = self.fresh_unknown();
            self.analysis.defs.record(var, &self.nesting, u);
        }
        for var in &writes {
            let u = self.fresh_unknown();
            self.analysis.defs.record(var, &self.nesting, u);
        }
        self.evaluate_statement(funcs, block)?;
        for var in &writes {
            let u = self.fresh_unknown();
            self.analysis.defs.record(var, &self.nesting, u);
        }
        Ok(())
    }

    /// Variable names a subtree could write to, purely syntactically:
    /// assignment targets, loop variables, and literal-named `set_variable`
    /// calls, at any depth.
    pub fn find_potential_writes(&self, id: NodeId) -> IndexSet<String> {
        let mut out = IndexSet::new();
        self.collect_writes(id, &mut out);
        out
    }

    fn collect_writes(&self, id: NodeId, out: &mut IndexSet<String>) {
        match self.analysis.tree.node(id) {
            Node::Assign { var, value } | Node::PlusAssign { var, value } => {
                out.insert(var.clone());
                self.collect_writes(*value, out);
            }
            Node::Foreach { vars, items, block } => {
                out.extend(vars.iter().cloned());
                self.collect_writes(*items, out);
                self.collect_writes(*block, out);
            }
            Node::FunctionCall { name, args, kwargs } => {
                if name == "set_variable" {
                    if let Some(first) = args.first() {
                        if let Node::Str(var) = self.analysis.tree.node(*first) {
                            out.insert(var.clone());
                        }
                    }
                }
                for arg in args {
                    self.collect_writes(*arg, out);
                }
                for (_, v) in kwargs {
                    self.collect_writes(*v, out);
                }
            }
            Node::MethodCall { object, args, kwargs, .. } => {
                self.collect_writes(*object, out);
                for arg in args {
                    self.collect_writes(*arg, out);
                }
                for (_, v) in kwargs {
                    self.collect_writes(*v, out);
                }
            }
            Node::IfClause { arms, else_block } => {
                for arm in arms {
                    self.collect_writes(arm.condition, out);
                    self.collect_writes(arm.block, out);
                }
                if let Some(block) = else_block {
                    self.collect_writes(*block, out);
                }
            }
            Node::Block { statements } => {
                for stmt in statements {
                    self.collect_writes(*stmt, out);
                }
            }
            Node::Array { items } => {
                for item in items {
                    self.collect_writes(*item, out);
                }
            }
            Node::Dict { entries } => {
                for (k, v) in entries {
                    self.collect_writes(*k, out);
                    self.collect_writes(*v, out);
                }
            }
            Node::Paren { inner } | Node::Not { value: inner } | Node::UMinus { value: inner } => {
                self.collect_writes(*inner, out);
            }
            Node::Arith { left, right, .. }
            | Node::Compare { left, right, .. }
            | Node::And { left, right }
            | Node::Or { left, right }
            | Node::Index { object: left, index: right } => {
                self.collect_writes(*left, out);
                self.collect_writes(*right, out);
            }
            Node::Ternary { condition, when_true, when_false } => {
                self.collect_writes(*condition, out);
                self.collect_writes(*when_true, out);
                self.collect_writes(*when_false, out);
            }
            Node::Str(_)
            | Node::FormatStr(_)
            | Node::Int(_)
            | Node::Bool(_)
            | Node::Id(_)
            | Node::Break
            | Node::Continue => {}
        }
    }

    fn function_call(
        &mut self,
        funcs: &mut dyn FunctionTable,
        id: NodeId,
        name: &str,
        args: Vec<NodeId>,
        kwargs: Vec<(String, NodeId)>,
    ) -> Result<()> {
        for arg in &args {
            self.analysis.dag.add_edge((*arg).into(), id.into());
        }
        for (_, v) in &kwargs {
            self.analysis.dag.add_edge((*v).into(), id.into());
        }
        for arg in &args {
            self.evaluate_statement(funcs, *arg)?;
        }
        for (_, v) in &kwargs {
            self.evaluate_statement(funcs, *v)?;
        }

        let arguments = Arguments { positional: args, kwargs };
        // A disabler argument disables the whole call, except for the
        // variable accessors, which must keep working on disabled values.
        if !DISABLER_EXEMPT.contains(&name) && self.any_arg_disabled(&arguments) {
            self.analysis
                .funcvals
                .insert(id, FuncValue::Value(Value::Disabler));
            return Ok(());
        }
        let result = match funcs.call(self, id, name, &arguments)? {
            Some(fv) => fv,
            None => match name {
                "files" => FuncValue::Value(self.func_files(&arguments)?),
                "subdir" => {
                    self.func_subdir(funcs, &arguments)?;
                    FuncValue::Value(Value::Unknown)
                }
                "set_variable" => {
                    self.func_set_variable(id, &arguments)?;
                    FuncValue::Value(Value::Unknown)
                }
                "get_variable" => self.func_get_variable(id, &arguments)?,
                "unset_variable" => {
                    self.func_unset_variable(&arguments)?;
                    FuncValue::Value(Value::Unknown)
                }
                "disabler" => FuncValue::Value(Value::Disabler),
                other => {
                    tracing::trace!(name = other, node = %id, "opaque function call");
                    FuncValue::Value(Value::Unknown)
                }
            },
        };
        self.analysis.funcvals.insert(id, result);
        Ok(())
    }

    /// Whether any already-evaluated argument resolved to the disabler.
    fn any_arg_disabled(&self, args: &Arguments) -> bool {
        args.positional
            .iter()
            .chain(args.kwargs.iter().map(|(_, v)| v))
            .any(|n| matches!(self.analysis.runtime_value(*n), Ok(v) if v.is_disabler()))
    }

    fn func_files(&mut self, args: &Arguments) -> Result<Value> {
        let values = self.analysis.flatten_args(&args.positional)?;
        let mut out = Vec::with_capacity(values.len());
        for v in values {
            match v {
                Value::Str(rel) => out.push(Value::File(FileRef {
                    subdir: self.subdir.clone(),
                    rel,
                })),
                Value::Unknown => out.push(Value::Unknown),
                other => {
                    return Err(Error::InvalidArguments(format!(
                        "files() expects strings, not {}",
                        other.type_name()
                    )))
                }
            }
        }
        Ok(Value::List(out))
    }

    fn func_subdir(&mut self, funcs: &mut dyn FunctionTable, args: &Arguments) -> Result<()> {
        let values = self.analysis.flatten_args(&args.positional)?;
        let name = match values.as_slice() {
            [Value::Str(s)] => s.clone(),
            [Value::Unknown] => {
                tracing::warn!("skipping subdir() with undeterminable argument");
                return Ok(());
            }
            _ => {
                return Err(Error::InvalidArguments(
                    "subdir() expects exactly one string argument".to_string(),
                ))
            }
        };
        let prev = self.subdir.clone();
        let subdir = if prev.is_empty() { name } else { format!("{prev}/{name}") };
        let build_file = crate::analysis::normalize(
            self.source_root.join(&subdir).join(&self.options.build_filename),
        );
        if !self.processed_files.insert(build_file.clone()) {
            tracing::warn!(subdir, "skipping repeated inclusion");
            return Ok(());
        }
        tracing::debug!(subdir, "entering subdirectory");
        self.subdir = subdir;
        match self.services.loader.load(&mut self.analysis.tree, &build_file) {
            Ok(root) => self.evaluate_statement(funcs, root)?,
            // Analysis of the rest of the project is more useful than
            // failing outright on one broken inclusion.
            Err(err) => {
                tracing::warn!(path = %build_file.display(), error = %err, "unable to include subdirectory");
            }
        }
        self.subdir = prev;
        Ok(())
    }

    fn func_set_variable(&mut self, node: NodeId, args: &Arguments) -> Result<()> {
        if args.positional.len() != 2 {
            return Err(Error::InvalidArguments(
                "set_variable() expects a name and a value".to_string(),
            ));
        }
        match self.analysis.runtime_value(args.positional[0])? {
            Value::Str(var) => {
                self.analysis
                    .defs
                    .record(&var, &self.nesting, args.positional[1].into());
                self.analysis
                    .all_assignments
                    .entry(var)
                    .or_default()
                    .push(node);
                Ok(())
            }
            // A write under a name nobody can determine statically
            // invalidates the whole namespace.
            Value::Unknown => {
                self.analysis.tainted = true;
                Ok(())
            }
            other => Err(Error::InvalidArguments(format!(
                "set_variable() name must be a string, not {}",
                other.type_name()
            ))),
        }
    }

    fn func_get_variable(&mut self, node: NodeId, args: &Arguments) -> Result<FuncValue> {
        let name_node = args.positional.first().ok_or_else(|| {
            Error::InvalidArguments("get_variable() expects a variable name".to_string())
        })?;
        match self.analysis.runtime_value(*name_node)? {
            Value::Str(var) => match self.current_definition(&var) {
                Ok(def) => {
                    self.analysis.dag.add_edge(def, node.into());
                    Ok(FuncValue::Node(def))
                }
                Err(Error::UndefinedVariable(_)) if args.positional.len() == 2 => {
                    let fallback = args.positional[1];
                    self.analysis.dag.add_edge(fallback.into(), node.into());
                    Ok(FuncValue::Node(fallback.into()))
                }
                Err(err) => Err(err),
            },
            Value::Unknown => Ok(FuncValue::Value(Value::Unknown)),
            other => Err(Error::InvalidArguments(format!(
                "get_variable() name must be a string, not {}",
                other.type_name()
            ))),
        }
    }

    fn func_unset_variable(&mut self, args: &Arguments) -> Result<()> {
        let name_node = args.positional.first().ok_or_else(|| {
            Error::InvalidArguments("unset_variable() expects a variable name".to_string())
        })?;
        match self.analysis.runtime_value(*name_node)? {
            // Unsetting is modeled as a rebind to an unknown; later reads
            // stay well-defined for the analysis even though the program
            // would fail on them.
            Value::Str(var) => {
                let u = self.fresh_unknown();
                self.analysis.defs.record(&var, &self.nesting, u);
                Ok(())
            }
            Value::Unknown => {
                self.analysis.tainted = true;
                Ok(())
            }
            other => Err(Error::InvalidArguments(format!(
                "unset_variable() name must be a string, not {}",
                other.type_name()
            ))),
        }
    }

    fn method_call(
        &mut self,
        funcs: &mut dyn FunctionTable,
        id: NodeId,
        object: NodeId,
        name: &str,
        args: Vec<NodeId>,
        kwargs: Vec<(String, NodeId)>,
    ) -> Result<()> {
        self.analysis.dag.add_edge(object.into(), id.into());
        for arg in &args {
            self.analysis.dag.add_edge((*arg).into(), id.into());
        }
        for (_, v) in &kwargs {
            self.analysis.dag.add_edge((*v).into(), id.into());
        }
        self.evaluate_statement(funcs, object)?;
        for arg in &args {
            self.evaluate_statement(funcs, *arg)?;
        }
        for (_, v) in &kwargs {
            self.evaluate_statement(funcs, *v)?;
        }

        let arguments = Arguments { positional: args, kwargs };
        let receiver = self.analysis.runtime_value(object)?;
        // A disabled receiver or argument disables the whole call.
        let result = if receiver.is_disabler() || self.any_arg_disabled(&arguments) {
            Value::Disabler
        } else {
            let mut argv = Vec::with_capacity(arguments.positional.len());
            for arg in &arguments.positional {
                argv.push(self.analysis.runtime_value(*arg)?);
            }
            if receiver.is_unknown() || argv.iter().any(Value::is_unknown) {
                Value::Unknown
            } else {
                match methods::call(&receiver, name, &argv)? {
                    Some(v) => v,
                    None => {
                        tracing::trace!(method = name, node = %id, "opaque method call");
                        Value::Unknown
                    }
                }
            }
        };
        self.analysis.funcvals.insert(id, FuncValue::Value(result));
        Ok(())
    }
}
