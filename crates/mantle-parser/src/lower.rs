//! Lowering of pest parse trees into the analysis arena.

use crate::{MantleParser, ParseError, Rule};
use mantle_core::tree::{ArithOp, CompareOp, FileId, IfArm, Node, NodeId, SourceTree, Span};
use pest::iterators::Pair;
use pest::Parser;
use std::path::Path;

/// Parse `source` and append its nodes to `tree`, returning the root block.
///
/// Nodes are appended, never inserted, so ids handed out by earlier files in
/// the same arena stay valid.
pub fn parse_into(tree: &mut SourceTree, path: &Path, source: &str) -> Result<NodeId, ParseError> {
    let mut pairs = MantleParser::parse(Rule::file, source)
        .map_err(|e| ParseError::Syntax(Box::new(e)))?;
    let file = tree.add_file(path.to_path_buf());
    let mut lowerer = Lowerer { tree, file };
    // The file rule is anchored at SOI/EOI, so a successful parse always
    // yields exactly one pair.
    let root = pairs.next().expect("file rule matched");
    lowerer.file(root)
}

struct Lowerer<'t> {
    tree: &'t mut SourceTree,
    file: FileId,
}

impl Lowerer<'_> {
    fn span(&self, pair: &Pair<'_, Rule>) -> Span {
        let (line, column) = pair.line_col();
        Span::new(self.file, line as u32, column as u32)
    }

    fn file(&mut self, pair: Pair<'_, Rule>) -> Result<NodeId, ParseError> {
        let span = self.span(&pair);
        let mut statements = Vec::new();
        for p in pair.into_inner() {
            if p.as_rule() == Rule::EOI {
                continue;
            }
            statements.push(self.statement(p)?);
        }
        Ok(self.tree.add(Node::Block { statements }, span))
    }

    fn block(&mut self, pair: Pair<'_, Rule>) -> Result<NodeId, ParseError> {
        let span = self.span(&pair);
        let mut statements = Vec::new();
        for p in pair.into_inner() {
            statements.push(self.statement(p)?);
        }
        Ok(self.tree.add(Node::Block { statements }, span))
    }

    fn statement(&mut self, pair: Pair<'_, Rule>) -> Result<NodeId, ParseError> {
        let span = self.span(&pair);
        match pair.as_rule() {
            Rule::assignment | Rule::plus_assignment => {
                let rule = pair.as_rule();
                let mut inner = pair.into_inner();
                let var = inner.next().expect("assignment target").as_str().to_string();
                let value = self.expression(inner.next().expect("assignment value"))?;
                let node = if rule == Rule::assignment {
                    Node::Assign { var, value }
                } else {
                    Node::PlusAssign { var, value }
                };
                Ok(self.tree.add(node, span))
            }
            Rule::if_clause => self.if_clause(pair),
            Rule::foreach_clause => self.foreach_clause(pair),
            Rule::kw_break => Ok(self.tree.add(Node::Break, span)),
            Rule::kw_continue => Ok(self.tree.add(Node::Continue, span)),
            _ => self.expression(pair),
        }
    }

    fn if_clause(&mut self, pair: Pair<'_, Rule>) -> Result<NodeId, ParseError> {
        let span = self.span(&pair);
        let mut arms = Vec::new();
        let mut else_block = None;
        let mut condition = None;
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::kw_if | Rule::kw_endif => {}
                Rule::ternary => condition = Some(self.expression(p)?),
                Rule::block => {
                    let block = self.block(p)?;
                    let condition = condition.take().expect("if arm condition");
                    arms.push(IfArm { condition, block });
                }
                Rule::elif_arm => {
                    let mut inner = p.into_inner();
                    inner.next(); // kw_elif
                    let condition = self.expression(inner.next().expect("elif condition"))?;
                    let block = self.block(inner.next().expect("elif block"))?;
                    arms.push(IfArm { condition, block });
                }
                Rule::else_arm => {
                    let mut inner = p.into_inner();
                    inner.next(); // kw_else
                    else_block = Some(self.block(inner.next().expect("else block"))?);
                }
                _ => unreachable!("unexpected rule in if clause"),
            }
        }
        Ok(self.tree.add(Node::IfClause { arms, else_block }, span))
    }

    fn foreach_clause(&mut self, pair: Pair<'_, Rule>) -> Result<NodeId, ParseError> {
        let span = self.span(&pair);
        let mut vars = Vec::new();
        let mut items = None;
        let mut body = None;
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::kw_foreach | Rule::kw_endforeach => {}
                Rule::identifier => vars.push(p.as_str().to_string()),
                Rule::ternary => items = Some(self.expression(p)?),
                Rule::block => body = Some(self.block(p)?),
                _ => unreachable!("unexpected rule in foreach"),
            }
        }
        let items = items.expect("foreach items");
        let block = body.expect("foreach body");
        Ok(self.tree.add(Node::Foreach { vars, items, block }, span))
    }

    fn expression(&mut self, pair: Pair<'_, Rule>) -> Result<NodeId, ParseError> {
        let span = self.span(&pair);
        match pair.as_rule() {
            Rule::ternary => {
                let mut inner = pair.into_inner();
                let condition = self.expression(inner.next().expect("ternary operand"))?;
                match inner.next() {
                    None => Ok(condition),
                    Some(when_true) => {
                        let when_true = self.expression(when_true)?;
                        let when_false =
                            self.expression(inner.next().expect("ternary else branch"))?;
                        Ok(self
                            .tree
                            .add(Node::Ternary { condition, when_true, when_false }, span))
                    }
                }
            }
            Rule::or_expr => self.fold_logical(pair, span, true),
            Rule::and_expr => self.fold_logical(pair, span, false),
            Rule::not_expr => {
                let mut nots = 0usize;
                let mut operand = None;
                for p in pair.into_inner() {
                    match p.as_rule() {
                        Rule::kw_not => nots += 1,
                        _ => operand = Some(self.expression(p)?),
                    }
                }
                let mut node = operand.expect("negation operand");
                for _ in 0..nots {
                    node = self.tree.add(Node::Not { value: node }, span);
                }
                Ok(node)
            }
            Rule::comparison => {
                let mut inner = pair.into_inner();
                let left = self.expression(inner.next().expect("comparison operand"))?;
                match inner.next() {
                    None => Ok(left),
                    Some(op_pair) => {
                        let op = match op_pair.as_str().trim() {
                            "==" => CompareOp::Eq,
                            "!=" => CompareOp::Ne,
                            "in" => CompareOp::In,
                            _ => CompareOp::NotIn,
                        };
                        let right = self.expression(inner.next().expect("comparison rhs"))?;
                        Ok(self.tree.add(Node::Compare { op, left, right }, span))
                    }
                }
            }
            Rule::additive | Rule::multiplicative => {
                let mut inner = pair.into_inner();
                let mut node = self.expression(inner.next().expect("arithmetic operand"))?;
                while let Some(op_pair) = inner.next() {
                    let op = match op_pair.as_str() {
                        "+" => ArithOp::Add,
                        "-" => ArithOp::Sub,
                        "*" => ArithOp::Mul,
                        "/" => ArithOp::Div,
                        _ => ArithOp::Mod,
                    };
                    let right = self.expression(inner.next().expect("arithmetic rhs"))?;
                    node = self.tree.add(Node::Arith { op, left: node, right }, span);
                }
                Ok(node)
            }
            Rule::unary => {
                let mut negations = 0usize;
                let mut operand = None;
                for p in pair.into_inner() {
                    match p.as_rule() {
                        Rule::neg_op => negations += 1,
                        _ => operand = Some(self.expression(p)?),
                    }
                }
                let mut node = operand.expect("unary operand");
                for _ in 0..negations {
                    node = self.tree.add(Node::UMinus { value: node }, span);
                }
                Ok(node)
            }
            Rule::postfix => {
                let mut inner = pair.into_inner();
                let mut node = self.expression(inner.next().expect("postfix base"))?;
                for p in inner {
                    let span = self.span(&p);
                    match p.as_rule() {
                        Rule::method_call => {
                            let mut mc = p.into_inner();
                            let name = mc.next().expect("method name").as_str().to_string();
                            let (args, kwargs) = match mc.next() {
                                Some(ca) => self.call_args(ca)?,
                                None => (Vec::new(), Vec::new()),
                            };
                            node = self.tree.add(
                                Node::MethodCall { object: node, name, args, kwargs },
                                span,
                            );
                        }
                        Rule::index_op => {
                            let idx_pair = p.into_inner().next().expect("index expression");
                            let index = self.expression(idx_pair)?;
                            node = self.tree.add(Node::Index { object: node, index }, span);
                        }
                        _ => unreachable!("unexpected postfix operator"),
                    }
                }
                Ok(node)
            }
            Rule::function_call => {
                let mut inner = pair.into_inner();
                let name = inner.next().expect("function name").as_str().to_string();
                let (args, kwargs) = match inner.next() {
                    Some(ca) => self.call_args(ca)?,
                    None => (Vec::new(), Vec::new()),
                };
                Ok(self.tree.add(Node::FunctionCall { name, args, kwargs }, span))
            }
            Rule::kw_true => Ok(self.tree.add(Node::Bool(true), span)),
            Rule::kw_false => Ok(self.tree.add(Node::Bool(false), span)),
            Rule::string => {
                let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
                Ok(self.tree.add(Node::Str(unescape(raw)), span))
            }
            Rule::fstring => {
                let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
                Ok(self.tree.add(Node::FormatStr(raw.to_string()), span))
            }
            Rule::multiline_string => {
                let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
                Ok(self.tree.add(Node::Str(raw.to_string()), span))
            }
            Rule::number => {
                let text = pair.as_str();
                let value = if let Some(hex) = text.strip_prefix("0x") {
                    i64::from_str_radix(hex, 16)
                } else if let Some(oct) = text.strip_prefix("0o") {
                    i64::from_str_radix(oct, 8)
                } else if let Some(bin) = text.strip_prefix("0b") {
                    i64::from_str_radix(bin, 2)
                } else {
                    text.parse()
                }
                .map_err(|_| ParseError::BadInteger(text.to_string()))?;
                Ok(self.tree.add(Node::Int(value), span))
            }
            Rule::array => {
                let mut items = Vec::new();
                for p in pair.into_inner() {
                    items.push(self.expression(p)?);
                }
                Ok(self.tree.add(Node::Array { items }, span))
            }
            Rule::dict_lit => {
                let mut entries = Vec::new();
                for p in pair.into_inner() {
                    let mut kv = p.into_inner();
                    let key = self.expression(kv.next().expect("dict key"))?;
                    let value = self.expression(kv.next().expect("dict value"))?;
                    entries.push((key, value));
                }
                Ok(self.tree.add(Node::Dict { entries }, span))
            }
            Rule::paren => {
                let inner_pair = pair.into_inner().next().expect("parenthesized expression");
                let inner = self.expression(inner_pair)?;
                Ok(self.tree.add(Node::Paren { inner }, span))
            }
            Rule::identifier => Ok(self.tree.add(Node::Id(pair.as_str().to_string()), span)),
            other => unreachable!("unexpected expression rule {other:?}"),
        }
    }

    fn fold_logical(
        &mut self,
        pair: Pair<'_, Rule>,
        span: Span,
        is_or: bool,
    ) -> Result<NodeId, ParseError> {
        let mut node = None;
        for p in pair.into_inner() {
            if matches!(p.as_rule(), Rule::kw_or | Rule::kw_and) {
                continue;
            }
            let operand = self.expression(p)?;
            node = Some(match node {
                None => operand,
                Some(left) if is_or => self.tree.add(Node::Or { left, right: operand }, span),
                Some(left) => self.tree.add(Node::And { left, right: operand }, span),
            });
        }
        Ok(node.expect("logical operand"))
    }

    fn call_args(
        &mut self,
        pair: Pair<'_, Rule>,
    ) -> Result<(Vec<NodeId>, Vec<(String, NodeId)>), ParseError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        for p in pair.into_inner() {
            if p.as_rule() == Rule::kwarg {
                let mut kv = p.into_inner();
                let name = kv.next().expect("kwarg name").as_str().to_string();
                let value = self.expression(kv.next().expect("kwarg value"))?;
                kwargs.push((name, value));
            } else {
                args.push(self.expression(p)?);
            }
        }
        Ok((args, kwargs))
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
