//! Built-in expression builder.
//!
//! Compilation parses the source, resolves attribute paths and functions, and
//! precompiles `matches()` patterns. Regex constants are interned in a
//! builder-wide cache, so the same pattern used by several policies of one
//! engine is compiled once.

use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;
use rbac_core::Attributes;

use super::error::{EvalError, ExprError};
use super::eval::{eval, Attr, Node};
use super::parser::{parse, Ast};
use super::value::Value;
use super::{CompiledExpression, ExpressionBuilder};

#[derive(Debug, Default)]
pub struct DefaultExpressionBuilder {
    regexes: DashMap<String, Arc<Regex>>,
}

impl DefaultExpressionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct regex constants compiled so far.
    pub fn cached_regexes(&self) -> usize {
        self.regexes.len()
    }

    fn regex(&self, pattern: &str) -> Result<Arc<Regex>, ExprError> {
        if let Some(re) = self.regexes.get(pattern) {
            return Ok(Arc::clone(re.value()));
        }
        let re = Regex::new(pattern).map_err(|e| ExprError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let re = Arc::new(re);
        self.regexes.insert(pattern.to_string(), Arc::clone(&re));
        Ok(re)
    }

    fn lower(&self, ast: Ast) -> Result<Node, ExprError> {
        let boxed = |a: Box<Ast>| self.lower(*a).map(Box::new);

        Ok(match ast {
            Ast::Literal(v) => Node::Const(v),
            Ast::Ident(name) if name == "metadata" => Node::Attr(Attr::Metadata),
            Ast::Ident(name) => return Err(ExprError::UnknownAttribute(name)),
            Ast::Member(target, field) => {
                if let Ast::Ident(root) = target.as_ref() {
                    if let Some(attr) = Attr::resolve(root, &field) {
                        return Ok(Node::Attr(attr));
                    }
                    if root != "metadata" {
                        return Err(ExprError::UnknownAttribute(format!("{root}.{field}")));
                    }
                }
                Node::Field(boxed(target)?, field)
            }
            Ast::Index(t, k) => Node::Index(boxed(t)?, boxed(k)?),
            Ast::Not(e) => Node::Not(boxed(e)?),
            Ast::Neg(e) => Node::Neg(boxed(e)?),
            Ast::Rel(op, l, r) => Node::Rel(op, boxed(l)?, boxed(r)?),
            Ast::And(l, r) => Node::And(boxed(l)?, boxed(r)?),
            Ast::Or(l, r) => Node::Or(boxed(l)?, boxed(r)?),
            Ast::Call {
                target,
                function,
                args,
            } => self.lower_call(target, &function, args)?,
        })
    }

    /// Method calls (`x.f(a)`) and global calls (`f(x, a)`) share one table.
    fn lower_call(
        &self,
        target: Option<Box<Ast>>,
        function: &str,
        args: Vec<Ast>,
    ) -> Result<Node, ExprError> {
        if function == "[]" {
            let items = args
                .into_iter()
                .map(|a| self.lower(a))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Node::List(items));
        }

        let mut all: Vec<Ast> = target.map(|t| *t).into_iter().collect();
        all.extend(args);

        let (name, expected): (&'static str, usize) = match function {
            "size" => ("size", 1),
            "startsWith" => ("startsWith", 2),
            "endsWith" => ("endsWith", 2),
            "contains" => ("contains", 2),
            "matches" => ("matches", 2),
            other => return Err(ExprError::UnknownFunction(other.to_string())),
        };
        if all.len() != expected {
            return Err(ExprError::Arity {
                function: name,
                expected,
                got: all.len(),
            });
        }

        let mut it = all.into_iter();
        let (Some(first), second) = (it.next(), it.next()) else {
            return Err(ExprError::Arity {
                function: name,
                expected,
                got: 0,
            });
        };
        let first = Box::new(self.lower(first)?);

        if name == "size" {
            return Ok(Node::Size(first));
        }
        let Some(second) = second else {
            return Err(ExprError::Arity {
                function: name,
                expected,
                got: 1,
            });
        };

        if name == "matches" {
            let Ast::Literal(Value::String(pattern)) = second else {
                return Err(ExprError::DynamicRegex);
            };
            return Ok(Node::Matches(first, self.regex(&pattern)?));
        }

        let second = Box::new(self.lower(second)?);
        Ok(match name {
            "startsWith" => Node::StartsWith(first, second),
            "endsWith" => Node::EndsWith(first, second),
            _ => Node::Contains(first, second),
        })
    }
}

impl ExpressionBuilder for DefaultExpressionBuilder {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpression>, ExprError> {
        let ast = parse(source)?;
        let root = self.lower(ast)?;
        Ok(Arc::new(Program { root }))
    }
}

#[derive(Debug)]
struct Program {
    root: Node,
}

impl CompiledExpression for Program {
    fn evaluate(&self, attrs: &Attributes<'_>) -> Result<Value, EvalError> {
        eval(&self.root, attrs)
    }
}
