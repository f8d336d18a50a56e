//! Recursive-descent parser.
//!
//! Precedence, loosest first: `||`, `&&`, relations (`== != < <= > >= in`),
//! unary (`! -`), postfix (member, index, method call).

use super::error::ExprError;
use super::lexer::{tokenize, Tok, Token};
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Ast {
    Literal(Value),
    Ident(String),
    Member(Box<Ast>, String),
    Index(Box<Ast>, Box<Ast>),
    Not(Box<Ast>),
    Neg(Box<Ast>),
    Rel(RelOp, Box<Ast>, Box<Ast>),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    Call {
        target: Option<Box<Ast>>,
        function: String,
        args: Vec<Ast>,
    },
}

/// Bounds the depth of the resulting tree. Parenthesised groups, unary
/// operators and every binary or postfix link in a chain each count one level,
/// so neither parsing nor the recursive passes over the tree can run away.
const MAX_DEPTH: usize = 128;

pub(crate) fn parse(src: &str) -> Result<Ast, ExprError> {
    let tokens = tokenize(src)?;
    let mut p = Parser {
        tokens,
        idx: 0,
        depth: 0,
        end: src.len(),
    };
    let ast = p.or()?;
    if let Some(t) = p.peek_token() {
        return Err(p.err_at(t.pos, format!("unexpected token {:?}", t.tok)));
    }
    Ok(ast)
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.idx).map(|t| &t.tok)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.tokens.get(self.idx)
    }

    fn pos(&self) -> usize {
        self.tokens.get(self.idx).map(|t| t.pos).unwrap_or(self.end)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.tokens.get(self.idx).map(|t| t.tok.clone());
        if t.is_some() {
            self.idx += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), ExprError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.err_at(self.pos(), format!("expected {what}")))
        }
    }

    fn err_at(&self, pos: usize, msg: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            pos,
            msg: msg.into(),
        }
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.err_at(self.pos(), "expression nested too deeply"));
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Ast, ExprError> {
        let base = self.depth;
        let mut lhs = self.and()?;
        while self.eat(&Tok::OrOr) {
            self.enter()?;
            let rhs = self.and()?;
            lhs = Ast::Or(Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Ast, ExprError> {
        let base = self.depth;
        let mut lhs = self.relation()?;
        while self.eat(&Tok::AndAnd) {
            self.enter()?;
            let rhs = self.relation()?;
            lhs = Ast::And(Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn relation(&mut self) -> Result<Ast, ExprError> {
        let base = self.depth;
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::EqEq) => RelOp::Eq,
                Some(Tok::NotEq) => RelOp::Ne,
                Some(Tok::Lt) => RelOp::Lt,
                Some(Tok::Le) => RelOp::Le,
                Some(Tok::Gt) => RelOp::Gt,
                Some(Tok::Ge) => RelOp::Ge,
                Some(Tok::Ident(k)) if k == "in" => RelOp::In,
                _ => {
                    self.depth = base;
                    return Ok(lhs);
                }
            };
            self.idx += 1;
            self.enter()?;
            let rhs = self.unary()?;
            lhs = Ast::Rel(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Ast, ExprError> {
        self.enter()?;
        let out = if self.eat(&Tok::Bang) {
            self.unary().map(|e| Ast::Not(Box::new(e)))
        } else if self.eat(&Tok::Minus) {
            self.unary().map(|e| match e {
                Ast::Literal(Value::Int(i)) => Ast::Literal(Value::Int(-i)),
                Ast::Literal(Value::Double(d)) => Ast::Literal(Value::Double(-d)),
                other => Ast::Neg(Box::new(other)),
            })
        } else {
            self.postfix()
        };
        self.depth -= 1;
        out
    }

    fn postfix(&mut self) -> Result<Ast, ExprError> {
        let base = self.depth;
        let mut e = self.primary()?;
        loop {
            if matches!(self.peek(), Some(Tok::Dot | Tok::LBracket)) {
                self.enter()?;
            }
            if self.eat(&Tok::Dot) {
                let pos = self.pos();
                let Some(Tok::Ident(name)) = self.bump() else {
                    return Err(self.err_at(pos, "expected field or method name after '.'"));
                };
                if self.eat(&Tok::LParen) {
                    let args = self.args()?;
                    e = Ast::Call {
                        target: Some(Box::new(e)),
                        function: name,
                        args,
                    };
                } else {
                    e = Ast::Member(Box::new(e), name);
                }
            } else if self.eat(&Tok::LBracket) {
                let idx = self.or()?;
                self.expect(Tok::RBracket, "']'")?;
                e = Ast::Index(Box::new(e), Box::new(idx));
            } else {
                self.depth = base;
                return Ok(e);
            }
        }
    }

    fn args(&mut self) -> Result<Vec<Ast>, ExprError> {
        let mut args = Vec::new();
        if self.eat(&Tok::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.or()?);
            if self.eat(&Tok::RParen) {
                return Ok(args);
            }
            self.expect(Tok::Comma, "',' or ')'")?;
        }
    }

    fn primary(&mut self) -> Result<Ast, ExprError> {
        let pos = self.pos();
        match self.bump() {
            Some(Tok::Int(i)) => Ok(Ast::Literal(Value::Int(i))),
            Some(Tok::Double(d)) => Ok(Ast::Literal(Value::Double(d))),
            Some(Tok::Str(s)) => Ok(Ast::Literal(Value::String(s))),
            Some(Tok::Ident(id)) => {
                let keyword = match id.as_str() {
                    "true" => Some(Value::Bool(true)),
                    "false" => Some(Value::Bool(false)),
                    "null" => Some(Value::Null),
                    "in" => return Err(self.err_at(pos, "unexpected keyword 'in'")),
                    _ => None,
                };
                if let Some(v) = keyword {
                    return Ok(Ast::Literal(v));
                }
                if self.eat(&Tok::LParen) {
                    let args = self.args()?;
                    return Ok(Ast::Call {
                        target: None,
                        function: id,
                        args,
                    });
                }
                Ok(Ast::Ident(id))
            }
            Some(Tok::LParen) => {
                self.enter()?;
                let e = self.or()?;
                self.depth -= 1;
                self.expect(Tok::RParen, "')'")?;
                Ok(e)
            }
            Some(Tok::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&Tok::RBracket) {
                    loop {
                        items.push(self.or()?);
                        if self.eat(&Tok::RBracket) {
                            break;
                        }
                        self.expect(Tok::Comma, "',' or ']'")?;
                    }
                }
                Ok(Ast::Call {
                    target: None,
                    function: "[]".into(),
                    args: items,
                })
            }
            Some(t) => Err(self.err_at(pos, format!("unexpected token {t:?}"))),
            None => Err(self.err_at(pos, "unexpected end of expression")),
        }
    }
}
