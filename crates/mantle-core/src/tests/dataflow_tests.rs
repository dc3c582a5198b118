//! Branch joins, loop seeding, namespace taint and the assignment index.

use super::helpers::*;
use crate::graph::FlowNode;
use crate::tree::SourceTree;
use crate::values::{FileRef, Value};
use crate::Error;
use pretty_assertions::assert_eq;

#[test]
fn conflicting_branch_assignments_merge_to_unknown() {
    // x = 1
    // if c { x = 2 } else { x = 3 }
    // y = x
    let mut t = SourceTree::new();
    let one = int(&mut t, 1);
    let a0 = assign(&mut t, "x", one);
    let cond = boolean(&mut t, true);
    let two = int(&mut t, 2);
    let a1 = assign(&mut t, "x", two);
    let three = int(&mut t, 3);
    let a2 = assign(&mut t, "x", three);
    let branch = if_else(&mut t, cond, vec![a1], vec![a2]);
    let use_x = ident(&mut t, "x");
    let a3 = assign(&mut t, "y", use_x);
    let root = block(&mut t, vec![a0, branch, a3]);
    let a = eval(t, root);

    assert_eq!(resolve(&a, use_x), Value::Unknown);
    // The use reads a synthesized merge node fed by both arm definitions.
    let merge = a.dag.sources_of(use_x.into()).next().unwrap();
    assert!(merge.is_unknown());
    let feeds: Vec<FlowNode> = a.dag.sources_of(merge).collect();
    assert!(feeds.contains(&two.into()));
    assert!(feeds.contains(&three.into()));
}

#[test]
fn a_branch_that_assigns_nothing_changes_nothing() {
    // x = 1; if c { }; y = x   -- y is still exactly 1
    let mut t = SourceTree::new();
    let one = int(&mut t, 1);
    let a0 = assign(&mut t, "x", one);
    let cond = boolean(&mut t, true);
    let branch = if_one(&mut t, cond, vec![]);
    let use_x = ident(&mut t, "x");
    let a1 = assign(&mut t, "y", use_x);
    let root = block(&mut t, vec![a0, branch, a1]);
    let a = eval(t, root);
    assert_eq!(resolve(&a, use_x), Value::Int(1));
}

#[test]
fn conditional_only_definition_is_unknown_afterwards() {
    let mut t = SourceTree::new();
    let cond = boolean(&mut t, true);
    let one = int(&mut t, 1);
    let a0 = assign(&mut t, "x", one);
    let branch = if_one(&mut t, cond, vec![a0]);
    let use_x = ident(&mut t, "x");
    let a1 = assign(&mut t, "y", use_x);
    let root = block(&mut t, vec![branch, a1]);
    let a = eval(t, root);
    assert_eq!(resolve(&a, use_x), Value::Unknown);
}

#[test]
fn branch_conditions_are_not_evaluated() {
    // The condition references an undefined variable; since no value flows
    // out of a condition, traversal does not touch it.
    let mut t = SourceTree::new();
    let cond = ident(&mut t, "never_defined");
    let branch = if_one(&mut t, cond, vec![]);
    let root = block(&mut t, vec![branch]);
    eval(t, root);
}

#[test]
fn loop_writes_are_unknown_before_during_and_after() {
    // x = 1
    // foreach i : [1, 2] { y = x; x = 2 }
    // z = x
    let mut t = SourceTree::new();
    let one = int(&mut t, 1);
    let a0 = assign(&mut t, "x", one);
    let use_in_body = ident(&mut t, "x");
    let b0 = assign(&mut t, "y", use_in_body);
    let two = int(&mut t, 2);
    let b1 = assign(&mut t, "x", two);
    let i1 = int(&mut t, 1);
    let i2 = int(&mut t, 2);
    let items = arr(&mut t, vec![i1, i2]);
    let lp = foreach(&mut t, &["i"], items, vec![b0, b1]);
    let use_after = ident(&mut t, "x");
    let a1 = assign(&mut t, "z", use_after);
    let root = block(&mut t, vec![a0, lp, a1]);
    let a = eval(t, root);

    // Inside the body an earlier iteration may already have reassigned x.
    assert_eq!(resolve(&a, use_in_body), Value::Unknown);
    // After the loop, zero iterations may have happened.
    assert_eq!(resolve(&a, use_after), Value::Unknown);
}

#[test]
fn loop_variables_are_unknown_in_the_body() {
    let mut t = SourceTree::new();
    let one = int(&mut t, 1);
    let items = arr(&mut t, vec![one]);
    let use_i = ident(&mut t, "i");
    let b0 = assign(&mut t, "y", use_i);
    let lp = foreach(&mut t, &["i"], items, vec![b0]);
    let root = block(&mut t, vec![lp]);
    let a = eval(t, root);
    assert_eq!(resolve(&a, use_i), Value::Unknown);
    // The loop reads its items expression.
    assert!(a.dag.sources_of(lp.into()).any(|f| f == items.into()));
}

#[test]
fn plus_assign_builds_on_the_previous_value() {
    let mut t = SourceTree::new();
    let base = s(&mut t, "a");
    let a0 = assign(&mut t, "x", base);
    let more = s(&mut t, "b");
    let a1 = plus_assign(&mut t, "x", more);
    let use_x = ident(&mut t, "x");
    let a2 = assign(&mut t, "y", use_x);
    let root = block(&mut t, vec![a0, a1, a2]);
    let a = eval(t, root);
    assert_eq!(resolve(&a, use_x), Value::Str("ab".to_string()));
}

#[test]
fn reading_an_undefined_variable_fails() {
    let mut t = SourceTree::new();
    let use_y = ident(&mut t, "y");
    let a0 = assign(&mut t, "x", use_y);
    let root = block(&mut t, vec![a0]);
    assert!(matches!(eval_err(t, root), Error::UndefinedVariable(name) if name == "y"));
}

#[test]
fn implicit_identifiers_resolve_to_unknown() {
    let mut t = SourceTree::new();
    let use_hm = ident(&mut t, "host_machine");
    let a0 = assign(&mut t, "x", use_hm);
    let root = block(&mut t, vec![a0]);
    let a = eval(t, root);
    assert_eq!(resolve(&a, use_hm), Value::Unknown);
}

#[test]
fn dynamic_variable_write_taints_all_lookups() {
    // set_variable(mystery(), 1) could have written any name, so reading an
    // otherwise undefined variable afterwards degrades to unknown instead of
    // failing.
    let mut t = SourceTree::new();
    let name = call(&mut t, "mystery", vec![]);
    let one = int(&mut t, 1);
    let sv = call(&mut t, "set_variable", vec![name, one]);
    let use_z = ident(&mut t, "z");
    let a0 = assign(&mut t, "x", use_z);
    let root = block(&mut t, vec![sv, a0]);
    let a = eval(t, root);
    assert!(a.tainted);
    assert_eq!(resolve(&a, use_z), Value::Unknown);
}

#[test]
fn set_and_get_variable_round_through_the_tracker() {
    let mut t = SourceTree::new();
    let name = s(&mut t, "x");
    let five = int(&mut t, 5);
    let sv = call(&mut t, "set_variable", vec![name, five]);
    let name2 = s(&mut t, "x");
    let gv = call(&mut t, "get_variable", vec![name2]);
    let a0 = assign(&mut t, "y", gv);
    let root = block(&mut t, vec![sv, a0]);
    let a = eval(t, root);
    assert_eq!(resolve(&a, gv), Value::Int(5));
}

#[test]
fn get_variable_falls_back_when_undefined() {
    let mut t = SourceTree::new();
    let name = s(&mut t, "missing");
    let dflt = int(&mut t, 7);
    let gv = call(&mut t, "get_variable", vec![name, dflt]);
    let a0 = assign(&mut t, "y", gv);
    let root = block(&mut t, vec![a0]);
    let a = eval(t, root);
    assert_eq!(resolve(&a, gv), Value::Int(7));
}

#[test]
fn unset_variable_degrades_later_reads() {
    let mut t = SourceTree::new();
    let five = int(&mut t, 5);
    let a0 = assign(&mut t, "x", five);
    let name = s(&mut t, "x");
    let uv = call(&mut t, "unset_variable", vec![name]);
    let use_x = ident(&mut t, "x");
    let a1 = assign(&mut t, "y", use_x);
    let root = block(&mut t, vec![a0, uv, a1]);
    let a = eval(t, root);
    assert_eq!(resolve(&a, use_x), Value::Unknown);
}

#[test]
fn disabler_arguments_disable_the_whole_call() {
    let mut t = SourceTree::new();
    let d = call(&mut t, "disabler", vec![]);
    let a0 = assign(&mut t, "d", d);
    let use_d = ident(&mut t, "d");
    let c = call(&mut t, "configure_thing", vec![use_d]);
    let a1 = assign(&mut t, "x", c);
    let root = block(&mut t, vec![a0, a1]);
    let a = eval(t, root);
    assert_eq!(resolve(&a, c), Value::Disabler);
}

#[test]
fn files_produces_relative_file_references() {
    let mut t = SourceTree::new();
    let main = s(&mut t, "main.c");
    let util = s(&mut t, "util.c");
    let fc = call(&mut t, "files", vec![main, util]);
    let a0 = assign(&mut t, "srcs", fc);
    let root = block(&mut t, vec![a0]);
    let a = eval(t, root);
    assert_eq!(
        resolve(&a, fc),
        Value::List(vec![
            Value::File(FileRef { subdir: String::new(), rel: "main.c".to_string() }),
            Value::File(FileRef { subdir: String::new(), rel: "util.c".to_string() }),
        ])
    );
}

#[test]
fn every_assignment_is_indexed_by_variable() {
    let mut t = SourceTree::new();
    let one = int(&mut t, 1);
    let a0 = assign(&mut t, "x", one);
    let two = int(&mut t, 2);
    let a1 = plus_assign(&mut t, "x", two);
    let root = block(&mut t, vec![a0, a1]);
    let a = eval(t, root);
    assert_eq!(a.all_assignments.get("x"), Some(&vec![a0, a1]));
}

#[test]
fn potential_writes_cover_assignments_loops_and_set_variable() {
    let mut t = SourceTree::new();
    let one = int(&mut t, 1);
    let a0 = assign(&mut t, "a", one);
    let two = int(&mut t, 2);
    let a1 = plus_assign(&mut t, "b", two);
    let name = s(&mut t, "c");
    let three = int(&mut t, 3);
    let sv = call(&mut t, "set_variable", vec![name, three]);
    let items = arr(&mut t, vec![]);
    let lp = foreach(&mut t, &["d"], items, vec![sv]);
    let cond = boolean(&mut t, true);
    let branch = if_one(&mut t, cond, vec![a1]);
    let root = block(&mut t, vec![a0, branch, lp]);

    let loader = crate::services::NoLoader;
    let toolchains = crate::services::NoopToolchains;
    let services = crate::services::Services::new(&loader, &toolchains);
    let interp = crate::interp::Interp::with_tree(
        t,
        "/project",
        crate::services::AnalysisOptions::default(),
        services,
    );
    let writes = interp.find_potential_writes(root);
    let names: Vec<&str> = writes.iter().map(String::as_str).collect();
    assert_eq!(names, vec!["a", "b", "d", "c"]);
}
