use crate::tree::{Node, NodeId, SourceTree};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Identity of a synthesized unknown-value node in the flow graph. These are
/// minted by the evaluator for branch merges, loop seeds and other points
/// where a value exists at runtime but has no single syntactic origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnknownId(pub u32);

impl std::fmt::Display for UnknownId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// Key type of the value-flow graph: either a real tree node or a
/// synthesized unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FlowNode {
    Ast(NodeId),
    Unknown(UnknownId),
}

impl FlowNode {
    pub fn as_ast(&self) -> Option<NodeId> {
        match self {
            FlowNode::Ast(id) => Some(*id),
            FlowNode::Unknown(_) => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, FlowNode::Unknown(_))
    }
}

impl From<NodeId> for FlowNode {
    fn from(id: NodeId) -> Self {
        FlowNode::Ast(id)
    }
}

impl From<UnknownId> for FlowNode {
    fn from(id: UnknownId) -> Self {
        FlowNode::Unknown(id)
    }
}

/// Calls whose result is the argument value passed through, so closure
/// queries may expand across them. Every other call, and every method call,
/// is an opaque boundary: expanding through incidental string/boolean
/// operations would make almost every node reachable from almost every seed.
const TRANSPARENT_CALLS: [&str; 2] = ["files", "get_variable"];

fn is_boundary(tree: &SourceTree, node: FlowNode) -> bool {
    let Some(id) = node.as_ast() else { return false };
    match tree.node(id) {
        Node::FunctionCall { name, .. } => !TRANSPARENT_CALLS.contains(&name.as_str()),
        Node::MethodCall { .. } => true,
        _ => false,
    }
}

/// Directed value-flow graph over one analysis pass.
///
/// An edge `a -> b` means data flows directly from `a` into `b`. Example: for
/// `var = 'foo' + '123'` followed by `executable(var, 'src.c')`, the graph
/// has an edge from the arithmetic node to the `var` identifier in the second
/// line, which is how the resolver knows that use of `var` is `'foo123'` even
/// if `var` is reassigned later. Edges are only ever added, never removed.
#[derive(Debug, Default, Clone)]
pub struct FlowGraph {
    src_to_tgts: HashMap<FlowNode, HashSet<FlowNode>>,
    tgt_to_srcs: HashMap<FlowNode, HashSet<FlowNode>>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, src: FlowNode, tgt: FlowNode) {
        self.src_to_tgts.entry(src).or_default().insert(tgt);
        self.tgt_to_srcs.entry(tgt).or_default().insert(src);
    }

    pub fn targets_of(&self, src: FlowNode) -> impl Iterator<Item = FlowNode> + '_ {
        self.src_to_tgts.get(&src).into_iter().flatten().copied()
    }

    pub fn sources_of(&self, tgt: FlowNode) -> impl Iterator<Item = FlowNode> + '_ {
        self.tgt_to_srcs.get(&tgt).into_iter().flatten().copied()
    }

    pub fn source_count(&self, tgt: FlowNode) -> usize {
        self.tgt_to_srcs.get(&tgt).map_or(0, |s| s.len())
    }

    /// All nodes that data from `seeds` can flow into (or, with `reverse`,
    /// all nodes whose data can flow into `seeds`). Expansion stops at opaque
    /// call and method nodes; see [`TRANSPARENT_CALLS`].
    pub fn reachable(
        &self,
        tree: &SourceTree,
        seeds: &HashSet<FlowNode>,
        reverse: bool,
    ) -> HashSet<FlowNode> {
        let mut reachable = seeds.clone();
        let mut active = seeds.clone();
        while !active.is_empty() {
            let mut new = HashSet::new();
            if reverse {
                for tgt in &active {
                    new.extend(
                        self.sources_of(*tgt)
                            .filter(|src| !is_boundary(tree, *src))
                            .filter(|src| !reachable.contains(src)),
                    );
                }
            } else {
                for src in &active {
                    if is_boundary(tree, *src) {
                        continue;
                    }
                    new.extend(
                        self.targets_of(*src).filter(|tgt| !reachable.contains(tgt)),
                    );
                }
            }
            reachable.extend(new.iter().copied());
            active = new;
        }
        reachable
    }

    /// Every path from `src` to `target`, honoring the same boundary rule as
    /// [`FlowGraph::reachable`]. Explicit stack, not recursion: path depth is
    /// bounded by the graph, not the call stack.
    pub fn find_all_paths(
        &self,
        tree: &SourceTree,
        src: FlowNode,
        target: FlowNode,
    ) -> Vec<Vec<FlowNode>> {
        let mut stack = vec![(src, vec![src])];
        let mut paths = Vec::new();
        while let Some((cur, path)) = stack.pop() {
            if cur == target {
                paths.push(path.clone());
            }
            if is_boundary(tree, cur) {
                continue;
            }
            for tgt in self.targets_of(cur) {
                // A traversal edge cannot revisit its own path; definitions
                // precede uses so the graph is acyclic in practice, but the
                // guard keeps enumeration finite regardless.
                if path.contains(&tgt) {
                    continue;
                }
                let mut next = path.clone();
                next.push(tgt);
                stack.push((tgt, next));
            }
        }
        paths
    }
}
