//! Tree-building shorthand for evaluation tests.

use crate::analysis::Analysis;
use crate::interp::{FunctionTable, Interp, NoFunctions};
use crate::services::{AnalysisOptions, NoLoader, NoopToolchains, Services};
use crate::tree::{ArithOp, IfArm, Node, NodeId, SourceTree};
use crate::values::Value;
use crate::Error;

pub fn s(t: &mut SourceTree, v: &str) -> NodeId {
    t.add_synthetic(Node::Str(v.to_string()))
}

pub fn int(t: &mut SourceTree, v: i64) -> NodeId {
    t.add_synthetic(Node::Int(v))
}

pub fn boolean(t: &mut SourceTree, v: bool) -> NodeId {
    t.add_synthetic(Node::Bool(v))
}

pub fn ident(t: &mut SourceTree, name: &str) -> NodeId {
    t.add_synthetic(Node::Id(name.to_string()))
}

pub fn arr(t: &mut SourceTree, items: Vec<NodeId>) -> NodeId {
    t.add_synthetic(Node::Array { items })
}

pub fn dict(t: &mut SourceTree, entries: Vec<(NodeId, NodeId)>) -> NodeId {
    t.add_synthetic(Node::Dict { entries })
}

pub fn arith(t: &mut SourceTree, op: ArithOp, left: NodeId, right: NodeId) -> NodeId {
    t.add_synthetic(Node::Arith { op, left, right })
}

pub fn assign(t: &mut SourceTree, var: &str, value: NodeId) -> NodeId {
    t.add_synthetic(Node::Assign { var: var.to_string(), value })
}

pub fn plus_assign(t: &mut SourceTree, var: &str, value: NodeId) -> NodeId {
    t.add_synthetic(Node::PlusAssign { var: var.to_string(), value })
}

pub fn call(t: &mut SourceTree, name: &str, args: Vec<NodeId>) -> NodeId {
    call_kw(t, name, args, vec![])
}

pub fn call_kw(
    t: &mut SourceTree,
    name: &str,
    args: Vec<NodeId>,
    kwargs: Vec<(&str, NodeId)>,
) -> NodeId {
    t.add_synthetic(Node::FunctionCall {
        name: name.to_string(),
        args,
        kwargs: kwargs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
    })
}

pub fn method(t: &mut SourceTree, object: NodeId, name: &str, args: Vec<NodeId>) -> NodeId {
    t.add_synthetic(Node::MethodCall {
        object,
        name: name.to_string(),
        args,
        kwargs: vec![],
    })
}

pub fn block(t: &mut SourceTree, statements: Vec<NodeId>) -> NodeId {
    t.add_synthetic(Node::Block { statements })
}

/// `if <cond> { <then> }` with no further arms.
pub fn if_one(t: &mut SourceTree, cond: NodeId, then: Vec<NodeId>) -> NodeId {
    let then_block = block(t, then);
    t.add_synthetic(Node::IfClause {
        arms: vec![IfArm { condition: cond, block: then_block }],
        else_block: None,
    })
}

pub fn if_else(
    t: &mut SourceTree,
    cond: NodeId,
    then: Vec<NodeId>,
    otherwise: Vec<NodeId>,
) -> NodeId {
    let then_block = block(t, then);
    let else_block = block(t, otherwise);
    t.add_synthetic(Node::IfClause {
        arms: vec![IfArm { condition: cond, block: then_block }],
        else_block: Some(else_block),
    })
}

pub fn foreach(t: &mut SourceTree, vars: &[&str], items: NodeId, body: Vec<NodeId>) -> NodeId {
    let body_block = block(t, body);
    t.add_synthetic(Node::Foreach {
        vars: vars.iter().map(|v| v.to_string()).collect(),
        items,
        block: body_block,
    })
}

/// Evaluate a hand-built tree with the given function table.
pub fn eval_with(tree: SourceTree, root: NodeId, funcs: &mut dyn FunctionTable) -> Analysis {
    try_eval_with(tree, root, funcs).expect("evaluation failed")
}

pub fn try_eval_with(
    tree: SourceTree,
    root: NodeId,
    funcs: &mut dyn FunctionTable,
) -> Result<Analysis, Error> {
    let loader = NoLoader;
    let toolchains = NoopToolchains;
    let services = Services::new(&loader, &toolchains);
    let mut interp = Interp::with_tree(tree, "/project", AnalysisOptions::default(), services);
    interp.run_block(funcs, root)?;
    Ok(interp.into_analysis())
}

pub fn eval(tree: SourceTree, root: NodeId) -> Analysis {
    eval_with(tree, root, &mut NoFunctions)
}

pub fn eval_err(tree: SourceTree, root: NodeId) -> Error {
    try_eval_with(tree, root, &mut NoFunctions).expect_err("evaluation should fail")
}

pub fn resolve(analysis: &Analysis, id: NodeId) -> Value {
    analysis.runtime_value(id).expect("resolution failed")
}
