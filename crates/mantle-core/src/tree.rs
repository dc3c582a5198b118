use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Stable identity of a node in a [`SourceTree`] arena.
///
/// Identity is positional: two syntactically identical literals at different
/// source positions are distinct ids. Ids stay valid for the lifetime of the
/// analysis because nodes are never removed from the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    /// File id used for nodes synthesized by the evaluator (`+=` expansion,
    /// `set_variable` assignments) that have no source position.
    pub const SYNTHETIC: FileId = FileId(u32::MAX);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub file: FileId,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(file: FileId, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }

    pub fn synthetic() -> Self {
        Self { file: FileId::SYNTHETIC, line: 0, column: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl std::fmt::Display for ArithOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    In,
    NotIn,
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfArm {
    pub condition: NodeId,
    /// A `Node::Block`.
    pub block: NodeId,
}

/// One node kind of the build DSL, the closed union the whole analysis
/// dispatches over. An unhandled variant anywhere downstream is an
/// internal-consistency bug, which is why this is an enum and not a trait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Str(String),
    /// `f'...'` interpolated string; never resolvable statically.
    FormatStr(String),
    Int(i64),
    Bool(bool),
    Id(String),
    Array {
        items: Vec<NodeId>,
    },
    Dict {
        entries: Vec<(NodeId, NodeId)>,
    },
    Paren {
        inner: NodeId,
    },
    Arith {
        op: ArithOp,
        left: NodeId,
        right: NodeId,
    },
    Compare {
        op: CompareOp,
        left: NodeId,
        right: NodeId,
    },
    And {
        left: NodeId,
        right: NodeId,
    },
    Or {
        left: NodeId,
        right: NodeId,
    },
    Not {
        value: NodeId,
    },
    UMinus {
        value: NodeId,
    },
    Ternary {
        condition: NodeId,
        when_true: NodeId,
        when_false: NodeId,
    },
    Index {
        object: NodeId,
        index: NodeId,
    },
    FunctionCall {
        name: String,
        args: Vec<NodeId>,
        kwargs: Vec<(String, NodeId)>,
    },
    MethodCall {
        object: NodeId,
        name: String,
        args: Vec<NodeId>,
        kwargs: Vec<(String, NodeId)>,
    },
    Assign {
        var: String,
        value: NodeId,
    },
    PlusAssign {
        var: String,
        value: NodeId,
    },
    IfClause {
        arms: Vec<IfArm>,
        /// A `Node::Block`, when an `else` arm exists.
        else_block: Option<NodeId>,
    },
    Foreach {
        vars: Vec<String>,
        items: NodeId,
        /// A `Node::Block`.
        block: NodeId,
    },
    Block {
        statements: Vec<NodeId>,
    },
    Break,
    Continue,
}

/// Arena of all nodes seen by one analysis.
///
/// Included sub-files are parsed into the same arena so that node identity is
/// global across one analysis pass, which keeps the value-flow graph keyed by
/// plain `NodeId`.
#[derive(Debug, Default, Clone)]
pub struct SourceTree {
    files: Vec<PathBuf>,
    nodes: Vec<Node>,
    spans: Vec<Span>,
}

impl SourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: PathBuf) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(path);
        id
    }

    pub fn file_path(&self, file: FileId) -> Option<&Path> {
        self.files.get(file.0 as usize).map(|p| p.as_path())
    }

    pub fn add(&mut self, node: Node, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.spans.push(span);
        id
    }

    pub fn add_synthetic(&mut self, node: Node) -> NodeId {
        self.add(node, Span::synthetic())
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.spans[id.0 as usize]
    }

    /// Name of the called function, when `id` is a function-call node.
    pub fn call_name(&self, id: NodeId) -> Option<&str> {
        match self.node(id) {
            Node::FunctionCall { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i as u32), n))
    }
}
