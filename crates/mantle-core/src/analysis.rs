use crate::graph::{FlowGraph, FlowNode};
use crate::scope::Definitions;
use crate::tree::{ArithOp, CompareOp, Node, NodeId, SourceTree};
use crate::values::{dict_get, flatten_deep, Value};
use crate::{Error, Result};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Result of evaluating a call node, kept in a side table so the resolver
/// can answer "what did this call produce" later. A `Node` entry points at
/// another tree position (or a synthesized unknown) whose value the call
/// passed through; a `Value` entry is a finished runtime value.
#[derive(Debug, Clone)]
pub enum FuncValue {
    Node(FlowNode),
    Value(Value),
}

/// Everything one traversal pass accumulated, exposed read-only to
/// downstream tools once evaluation finishes: the node arena, the value-flow
/// graph, the definition tracker, the call-result side table and the
/// all-assignments index consumed by source-rewriting tools.
#[derive(Debug, Default, Clone)]
pub struct Analysis {
    pub tree: SourceTree,
    pub dag: FlowGraph,
    pub defs: Definitions,
    pub funcvals: HashMap<NodeId, FuncValue>,
    pub all_assignments: IndexMap<String, Vec<NodeId>>,
    /// Set once a variable is written under a name that is itself not
    /// statically known; from then on lookup misses resolve to `Unknown`
    /// instead of failing.
    pub tainted: bool,
}

/// An entry of a resolved source-file list: either a concrete absolute path
/// or a statically undeterminable one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileListEntry {
    Path(PathBuf),
    Unknown,
}

impl serde::Serialize for FileListEntry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FileListEntry::Path(p) => p.serialize(serializer),
            FileListEntry::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

impl Analysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a tree node to the value it would have at build time, or
    /// `Unknown` where that value depends on runtime-only facts.
    ///
    /// Total over every expression node kind; hitting a statement kind here
    /// is an internal-consistency error, never a silent default. Calling
    /// this twice on the same node without tree mutation in between yields
    /// identical results.
    pub fn runtime_value(&self, id: NodeId) -> Result<Value> {
        match self.tree.node(id) {
            Node::Str(s) => Ok(Value::Str(s.clone())),
            Node::FormatStr(_) => Ok(Value::Unknown),
            Node::Int(i) => Ok(Value::Int(*i)),
            Node::Bool(b) => Ok(Value::Bool(*b)),
            Node::Array { items } => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.runtime_value(*item)?);
                }
                Ok(Value::List(out))
            }
            Node::Dict { entries } => {
                let mut out = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    out.push((self.runtime_value(*k)?, self.runtime_value(*v)?));
                }
                Ok(Value::Dict(out))
            }
            Node::Id(name) => {
                // The evaluator records exactly one inbound flow edge per
                // identifier use: the definition live at that position.
                let mut sources = self.dag.sources_of(FlowNode::Ast(id));
                let (first, second) = (sources.next(), sources.next());
                match (first, second) {
                    (Some(def), None) => self.flow_value(def),
                    _ => Err(Error::Internal(format!(
                        "identifier '{name}' ({id}) must have exactly one dataflow source"
                    ))),
                }
            }
            Node::FunctionCall { name, .. } => match self.funcvals.get(&id) {
                Some(FuncValue::Node(f)) => self.flow_value(*f),
                Some(FuncValue::Value(v)) => Ok(v.clone()),
                None => Err(Error::Internal(format!(
                    "call to '{name}' ({id}) has no recorded result"
                ))),
            },
            Node::MethodCall { name, .. } => match self.funcvals.get(&id) {
                Some(FuncValue::Node(f)) => self.flow_value(*f),
                Some(FuncValue::Value(v)) => Ok(v.clone()),
                None => Err(Error::Internal(format!(
                    "method call '{name}' ({id}) has no recorded result"
                ))),
            },
            Node::Arith { op, left, right } => self.arith_value(*op, *left, *right),
            Node::Compare { op, left, right } => self.compare_value(*op, *left, *right),
            Node::And { left, right } => self.bool_value(*left, *right, |l, r| l && r),
            Node::Or { left, right } => self.bool_value(*left, *right, |l, r| l || r),
            Node::Not { value } => match self.runtime_value(*value)? {
                Value::Unknown => Ok(Value::Unknown),
                Value::Disabler => Ok(Value::Disabler),
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Err(Error::InvalidArguments(format!(
                    "'not' needs a boolean operand, not {}",
                    other.type_name()
                ))),
            },
            Node::UMinus { value } => match self.runtime_value(*value)? {
                Value::Unknown => Ok(Value::Unknown),
                Value::Disabler => Ok(Value::Disabler),
                Value::Int(i) => Ok(Value::Int(-i)),
                other => Err(Error::InvalidArguments(format!(
                    "unary minus needs an integer operand, not {}",
                    other.type_name()
                ))),
            },
            Node::Ternary { condition, when_true, when_false } => {
                match self.runtime_value(*condition)? {
                    Value::Unknown => Ok(Value::Unknown),
                    Value::Disabler => Ok(Value::Disabler),
                    // Only the chosen branch is resolved; both were already
                    // visited for edge registration during traversal.
                    Value::Bool(true) => self.runtime_value(*when_true),
                    Value::Bool(false) => self.runtime_value(*when_false),
                    other => Err(Error::InvalidArguments(format!(
                        "ternary condition must be a boolean, not {}",
                        other.type_name()
                    ))),
                }
            }
            Node::Index { object, index } => self.index_value(*object, *index),
            Node::Paren { inner } => self.runtime_value(*inner),
            Node::Assign { .. }
            | Node::PlusAssign { .. }
            | Node::IfClause { .. }
            | Node::Foreach { .. }
            | Node::Block { .. }
            | Node::Break
            | Node::Continue => Err(Error::Internal(format!(
                "statement node {id} has no runtime value"
            ))),
        }
    }

    pub fn flow_value(&self, f: FlowNode) -> Result<Value> {
        match f {
            FlowNode::Ast(id) => self.runtime_value(id),
            FlowNode::Unknown(_) => Ok(Value::Unknown),
        }
    }

    fn arith_value(&self, op: ArithOp, left: NodeId, right: NodeId) -> Result<Value> {
        let l = self.runtime_value(left)?;
        let r = self.runtime_value(right)?;
        if l.is_disabler() || r.is_disabler() {
            return Ok(Value::Disabler);
        }
        if op == ArithOp::Add {
            // List shape survives an unknown element.
            if let (Value::List(items), Value::Unknown) = (&l, &r) {
                let mut items = items.clone();
                items.push(Value::Unknown);
                return Ok(Value::List(items));
            }
            if let (Value::Unknown, Value::List(items)) = (&l, &r) {
                let mut out = vec![Value::Unknown];
                out.extend(items.iter().cloned());
                return Ok(Value::List(out));
            }
        }
        if l.is_unknown() || r.is_unknown() {
            return Ok(Value::Unknown);
        }
        match op {
            ArithOp::Add => match (l, r) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
                (Value::Dict(a), Value::Dict(b)) => {
                    let mut out = a;
                    for (k, v) in b {
                        if let Some(slot) = out.iter_mut().find(|(ek, _)| *ek == k) {
                            slot.1 = v;
                        } else {
                            out.push((k, v));
                        }
                    }
                    Ok(Value::Dict(out))
                }
                (Value::List(mut a), Value::List(b)) => {
                    a.extend(b);
                    Ok(Value::List(a))
                }
                (Value::List(mut a), scalar) => {
                    a.push(scalar);
                    Ok(Value::List(a))
                }
                (l, r) => Err(Error::InvalidArguments(format!(
                    "cannot add {} and {}",
                    l.type_name(),
                    r.type_name()
                ))),
            },
            ArithOp::Sub => match (l, r) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
                (l, r) => Err(Error::InvalidArguments(format!(
                    "cannot subtract {} from {}",
                    r.type_name(),
                    l.type_name()
                ))),
            },
            ArithOp::Mul => match (l, r) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
                (l, r) => Err(Error::InvalidArguments(format!(
                    "cannot multiply {} and {}",
                    l.type_name(),
                    r.type_name()
                ))),
            },
            ArithOp::Div => match (l, r) {
                (Value::Int(a), Value::Int(b)) => {
                    if b == 0 {
                        return Err(Error::InvalidArguments("division by zero".to_string()));
                    }
                    Ok(Value::Int(floor_div(a, b)))
                }
                // String division is path joining.
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(path_join(&a, &b))),
                (l, r) => Err(Error::InvalidArguments(format!(
                    "cannot divide {} by {}",
                    l.type_name(),
                    r.type_name()
                ))),
            },
            ArithOp::Mod => match (l, r) {
                (Value::Int(a), Value::Int(b)) => {
                    if b == 0 {
                        return Err(Error::InvalidArguments("modulo by zero".to_string()));
                    }
                    Ok(Value::Int(floor_mod(a, b)))
                }
                (l, r) => Err(Error::InvalidArguments(format!(
                    "cannot take {} modulo {}",
                    l.type_name(),
                    r.type_name()
                ))),
            },
        }
    }

    fn compare_value(&self, op: CompareOp, left: NodeId, right: NodeId) -> Result<Value> {
        let l = self.runtime_value(left)?;
        let r = self.runtime_value(right)?;
        if l.is_disabler() || r.is_disabler() {
            return Ok(Value::Disabler);
        }
        if l.is_unknown() || r.is_unknown() {
            return Ok(Value::Unknown);
        }
        match op {
            CompareOp::Eq => Ok(Value::Bool(l == r)),
            CompareOp::Ne => Ok(Value::Bool(l != r)),
            CompareOp::In => Ok(Value::Bool(membership(&l, &r)?)),
            CompareOp::NotIn => Ok(Value::Bool(!membership(&l, &r)?)),
        }
    }

    fn bool_value(&self, left: NodeId, right: NodeId, f: fn(bool, bool) -> bool) -> Result<Value> {
        let l = self.runtime_value(left)?;
        let r = self.runtime_value(right)?;
        if l.is_disabler() || r.is_disabler() {
            return Ok(Value::Disabler);
        }
        // No short-circuiting on the known side: conservative and simple.
        if l.is_unknown() || r.is_unknown() {
            return Ok(Value::Unknown);
        }
        match (l, r) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(f(a, b))),
            (l, r) => Err(Error::InvalidArguments(format!(
                "boolean operators need boolean operands, not {} and {}",
                l.type_name(),
                r.type_name()
            ))),
        }
    }

    fn index_value(&self, object: NodeId, index: NodeId) -> Result<Value> {
        let obj = self.runtime_value(object)?;
        let idx = self.runtime_value(index)?;
        if obj.is_disabler() || idx.is_disabler() {
            return Ok(Value::Disabler);
        }
        if obj.is_unknown() || idx.is_unknown() {
            return Ok(Value::Unknown);
        }
        match (&obj, &idx) {
            (Value::List(items), Value::Int(i)) => {
                let effective = if *i < 0 { i + items.len() as i64 } else { *i };
                // Out-of-range concrete indexing stays fatal: the language
                // disallows truly dynamic indices where this matters, so a
                // miss means the analysis itself mismodeled something.
                if effective < 0 || effective as usize >= items.len() {
                    return Err(Error::Internal(format!(
                        "list index {i} out of range (length {})",
                        items.len()
                    )));
                }
                Ok(items[effective as usize].clone())
            }
            (Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let effective = if *i < 0 { i + chars.len() as i64 } else { *i };
                if effective < 0 || effective as usize >= chars.len() {
                    return Err(Error::Internal(format!(
                        "string index {i} out of range (length {})",
                        chars.len()
                    )));
                }
                Ok(Value::Str(chars[effective as usize].to_string()))
            }
            (Value::Dict(entries), key) => match dict_get(entries, key) {
                Some(v) => Ok(v.clone()),
                None => Err(Error::Internal(format!("key {key} missing from dictionary"))),
            },
            (obj, idx) => Err(Error::InvalidArguments(format!(
                "cannot index {} with {}",
                obj.type_name(),
                idx.type_name()
            ))),
        }
    }

    /// Resolve positional argument nodes into one flat value list (nested
    /// lists spliced).
    pub fn flatten_args(&self, nodes: &[NodeId]) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(nodes.len());
        for node in nodes {
            values.push(self.runtime_value(*node)?);
        }
        Ok(flatten_deep(values))
    }

    /// Resolve keyword-argument nodes; unknowns are kept as values.
    pub fn resolved_kwargs(&self, kwargs: &[(String, NodeId)]) -> Result<IndexMap<String, Value>> {
        let mut out = IndexMap::with_capacity(kwargs.len());
        for (name, node) in kwargs {
            out.insert(name.clone(), self.runtime_value(*node)?);
        }
        Ok(out)
    }

    /// Normalize source-argument nodes into absolute paths, preserving
    /// unknown entries. `subdir` is the subdirectory whose build file
    /// declared the plain-string entries.
    pub fn resolved_file_list(
        &self,
        root: &Path,
        subdir: &str,
        nodes: &[NodeId],
    ) -> Result<Vec<FileListEntry>> {
        let mut values = Vec::with_capacity(nodes.len());
        for node in nodes {
            values.push(self.runtime_value(*node)?);
        }
        let mut out = Vec::new();
        for v in flatten_deep(values) {
            match v {
                Value::Str(s) => out.push(FileListEntry::Path(normalize(root.join(subdir).join(s)))),
                Value::File(fr) => out.push(FileListEntry::Path(normalize(fr.to_abs_path(root)))),
                Value::Unknown => out.push(FileListEntry::Unknown),
                other => {
                    return Err(Error::InvalidArguments(format!(
                        "{} is not a source file entry",
                        other.type_name()
                    )))
                }
            }
        }
        Ok(out)
    }
}

fn membership(needle: &Value, haystack: &Value) -> Result<bool> {
    match haystack {
        Value::List(items) => Ok(items.contains(needle)),
        Value::Dict(entries) => Ok(dict_get(entries, needle).is_some()),
        Value::Str(s) => match needle {
            Value::Str(sub) => Ok(s.contains(sub.as_str())),
            other => Err(Error::InvalidArguments(format!(
                "cannot search a string for {}",
                other.type_name()
            ))),
        },
        other => Err(Error::InvalidArguments(format!(
            "'in' needs a list, dictionary or string, not {}",
            other.type_name()
        ))),
    }
}

/// Floor division, rounding toward negative infinity.
pub fn floor_div(l: i64, r: i64) -> i64 {
    let q = l / r;
    if l % r != 0 && (l < 0) != (r < 0) {
        q - 1
    } else {
        q
    }
}

/// True modulo: the result takes the sign of the divisor.
pub fn floor_mod(l: i64, r: i64) -> i64 {
    let m = l % r;
    if m != 0 && (m < 0) != (r < 0) {
        m + r
    } else {
        m
    }
}

/// Join two path fragments with separator normalization; an absolute right
/// side replaces the left entirely.
pub fn path_join(l: &str, r: &str) -> String {
    let joined = if r.starts_with('/') || l.is_empty() {
        r.to_string()
    } else if l.ends_with('/') {
        format!("{l}{r}")
    } else {
        format!("{l}/{r}")
    };
    joined.replace('\\', "/")
}

pub(crate) fn normalize(path: PathBuf) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}
