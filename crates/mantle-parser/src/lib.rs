/*! Parser for mantle build descriptions.
 *
 * Build files are parsed straight into the shared analysis arena so that
 * node identity stays global across every file of one analysis pass. The
 * grammar covers the whole statement language: assignments, branch and loop
 * clauses, calls with keyword arguments, and the literal forms.
 */

use pest_derive::Parser;
use thiserror::Error;

mod lower;

pub use lower::parse_into;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct MantleParser;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{0}")]
    Syntax(Box<pest::error::Error<Rule>>),
    #[error("invalid integer literal '{0}'")]
    BadInteger(String),
}

/// Whether `input` is a syntactically valid build description.
pub fn check(input: &str) -> bool {
    use pest::Parser as _;
    MantleParser::parse(Rule::file, input).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mantle_core::tree::{ArithOp, Node, NodeId, SourceTree};
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn parse(input: &str) -> (SourceTree, NodeId) {
        let mut tree = SourceTree::new();
        let root = parse_into(&mut tree, Path::new("mantle.build"), input)
            .unwrap_or_else(|e| panic!("parse failed: {e}"));
        (tree, root)
    }

    fn statements(tree: &SourceTree, root: NodeId) -> Vec<NodeId> {
        match tree.node(root) {
            Node::Block { statements } => statements.clone(),
            other => panic!("root is not a block: {other:?}"),
        }
    }

    #[test]
    fn empty_input_is_an_empty_block() {
        let (tree, root) = parse("");
        assert!(statements(&tree, root).is_empty());
        let (tree, root) = parse("\n\n# only a comment\n");
        assert!(statements(&tree, root).is_empty());
    }

    #[test]
    fn a_realistic_build_file_parses() {
        let input = r"
project('demo', 'c',
        version: '1.0.0',
        default_options: ['warning_level=3'])

zlib = dependency('zlib', required: false)

sources = files('main.c', 'util.c')
if zlib.found()
    sources += files('compress.c')
endif

executable('demo', sources, dependencies: [zlib], install: true)
";
        assert!(check(input));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let (tree, root) = parse("x = 1 + 2 * 3\n");
        let stmts = statements(&tree, root);
        let Node::Assign { value, .. } = tree.node(stmts[0]) else {
            panic!("expected assignment");
        };
        let Node::Arith { op: ArithOp::Add, right, .. } = tree.node(*value) else {
            panic!("expected addition at the top");
        };
        assert!(matches!(tree.node(*right), Node::Arith { op: ArithOp::Mul, .. }));
    }

    #[test]
    fn method_chains_fold_left() {
        let (tree, root) = parse("n = 'a b'.split(' ').length()\n");
        let stmts = statements(&tree, root);
        let Node::Assign { value, .. } = tree.node(stmts[0]) else {
            panic!("expected assignment");
        };
        let Node::MethodCall { object, name, .. } = tree.node(*value) else {
            panic!("expected method call");
        };
        assert_eq!(name, "length");
        let Node::MethodCall { name, .. } = tree.node(*object) else {
            panic!("expected inner method call");
        };
        assert_eq!(name, "split");
    }

    #[test]
    fn branch_clauses_carry_all_arms() {
        let input = "if a\n  x = 1\nelif b\n  x = 2\nelse\n  x = 3\nendif\n";
        let (tree, root) = parse(input);
        let stmts = statements(&tree, root);
        let Node::IfClause { arms, else_block } = tree.node(stmts[0]) else {
            panic!("expected if clause");
        };
        assert_eq!(arms.len(), 2);
        assert!(else_block.is_some());
    }

    #[test]
    fn foreach_clauses_carry_variables_and_items() {
        let input = "foreach k, v : {'a': 1}\n  message(k)\n  break\nendforeach\n";
        let (tree, root) = parse(input);
        let stmts = statements(&tree, root);
        let Node::Foreach { vars, items, block } = tree.node(stmts[0]) else {
            panic!("expected foreach");
        };
        assert_eq!(vars, &["k".to_string(), "v".to_string()]);
        assert!(matches!(tree.node(*items), Node::Dict { .. }));
        let Node::Block { statements } = tree.node(*block) else {
            panic!("expected body block");
        };
        assert_eq!(statements.len(), 2);
        assert!(matches!(tree.node(statements[1]), Node::Break));
    }

    #[test]
    fn calls_separate_positional_and_keyword_arguments() {
        let (tree, root) = parse("executable('app', 'main.c', install: true,)\n");
        let stmts = statements(&tree, root);
        let Node::FunctionCall { name, args, kwargs } = tree.node(stmts[0]) else {
            panic!("expected call");
        };
        assert_eq!(name, "executable");
        assert_eq!(args.len(), 2);
        assert_eq!(kwargs.len(), 1);
        assert_eq!(kwargs[0].0, "install");
    }

    #[test]
    fn comparison_and_membership_operators() {
        assert!(check("x = a == b\n"));
        assert!(check("x = a != b\n"));
        assert!(check("x = 'c' in langs\n"));
        assert!(check("x = 'c' not in langs\n"));
        assert!(check("x = not a and b or c\n"));
    }

    #[test]
    fn string_escapes_are_decoded() {
        let (tree, root) = parse(r"x = 'a\'b\nc'");
        let stmts = statements(&tree, root);
        let Node::Assign { value, .. } = tree.node(stmts[0]) else {
            panic!("expected assignment");
        };
        assert_eq!(tree.node(*value), &Node::Str("a'b\nc".to_string()));
    }

    #[test]
    fn format_and_multiline_strings_have_their_own_kinds() {
        let (tree, root) = parse("x = f'v@0@'\ny = '''raw\n'text'\n'''\n");
        let stmts = statements(&tree, root);
        let Node::Assign { value, .. } = tree.node(stmts[0]) else {
            panic!("expected assignment");
        };
        assert_eq!(tree.node(*value), &Node::FormatStr("v@0@".to_string()));
        let Node::Assign { value, .. } = tree.node(stmts[1]) else {
            panic!("expected assignment");
        };
        assert_eq!(tree.node(*value), &Node::Str("raw\n'text'\n".to_string()));
    }

    #[test]
    fn non_decimal_integer_literals() {
        let (tree, root) = parse("x = 0xff\ny = 0o17\nz = 0b101\n");
        let stmts = statements(&tree, root);
        let values: Vec<&Node> = stmts
            .iter()
            .map(|s| match tree.node(*s) {
                Node::Assign { value, .. } => tree.node(*value),
                other => panic!("expected assignment, got {other:?}"),
            })
            .collect();
        assert_eq!(values, vec![&Node::Int(255), &Node::Int(15), &Node::Int(5)]);
    }

    #[test]
    fn ternaries_and_subscripts() {
        let (tree, root) = parse("x = cond ? a : b\ny = list[0]\n");
        let stmts = statements(&tree, root);
        assert!(matches!(
            tree.node(match tree.node(stmts[0]) {
                Node::Assign { value, .. } => *value,
                _ => panic!(),
            }),
            Node::Ternary { .. }
        ));
        assert!(matches!(
            tree.node(match tree.node(stmts[1]) {
                Node::Assign { value, .. } => *value,
                _ => panic!(),
            }),
            Node::Index { .. }
        ));
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(!check("x = \n"));
        assert!(!check("if x\ny = 1\n")); // missing endif
        assert!(!check("foreach : x\nendforeach\n"));
        assert!(!check("x = 'unterminated\n"));
    }

    #[test]
    fn keywords_cannot_be_identifiers_but_may_prefix_them() {
        assert!(!check("if = 1\n"));
        assert!(check("iffy = 1\nendif_marker = 2\n"));
    }

    #[test]
    fn line_continuations_and_bracket_newlines() {
        let input = "total = 1 + \\\n  2\nlist = [\n  'a',\n  'b',\n]\n";
        assert!(check(input));
    }
}
