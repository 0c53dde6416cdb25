//! The parser.
//!
//! A hand-written recursive descent over the token vector.  Declarations
//! come first in a block; `if`/`while`/`for` bodies are either a braced
//! block of statements or a single statement.

use std::fmt::Debug;

use crate::common::{id, Id};

use super::ast::*;
use super::lex::{Lexer, Token, TokenKind};

pub struct ParseError {
    pub line: u32,
    message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error at line {}: {}", self.line, self.message)
    }
}

impl Debug for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

pub fn parse(input: &str) -> Result<Program, ParseError> {
    let tokens = Lexer::new(input).tokenize().map_err(|e| ParseError {
        line: e.line,
        message: e.to_string(),
    })?;
    Parser { tokens, pos: 0 }.program()
}

struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().map(|t| t.kind) == Some(kind)
    }

    /// The line of the current token, or of the last one at end of input.
    fn line(&self) -> u32 {
        self.peek()
            .or(self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, ParseError> {
        Err(ParseError {
            line: self.line(),
            message: message.into(),
        })
    }

    fn bump(&mut self) -> Option<Token<'src>> {
        let token = self.peek().copied();
        self.pos += 1;
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'src>, ParseError> {
        match self.peek().copied() {
            Some(token) if token.kind == kind => {
                self.pos += 1;
                Ok(token)
            }
            Some(token) => self.error(format!("expected '{kind}', found '{}'", token.text)),
            None => self.error(format!("expected '{kind}', found end of input")),
        }
    }

    fn ident(&mut self) -> Result<(Id, u32), ParseError> {
        let token = self.expect(TokenKind::Id)?;
        Ok((id(token.text), token.line))
    }

    fn number(&mut self) -> Result<(i64, u32), ParseError> {
        let token = self.expect(TokenKind::Num)?;
        match token.text.parse::<i64>() {
            Ok(value) => Ok((value, token.line)),
            Err(_) => self.error(format!("number out of range: {}", token.text)),
        }
    }

    fn program(mut self) -> Result<Program, ParseError> {
        let mut procedures = Vec::new();
        while self.at(TokenKind::Procedure) {
            procedures.push(self.procedure()?);
        }
        self.expect(TokenKind::Program)?;
        let main = self.block()?;
        if let Some(token) = self.peek() {
            return self.error(format!("unexpected '{}' after the program block", token.text));
        }
        Ok(Program { procedures, main })
    }

    fn procedure(&mut self) -> Result<Procedure, ParseError> {
        let head = self.expect(TokenKind::Procedure)?;
        let (name, _) = self.ident()?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                let (name, line) = self.ident()?;
                let is_array = if self.eat(TokenKind::LBracket) {
                    self.expect(TokenKind::RBracket)?;
                    true
                } else {
                    false
                };
                params.push(Param { name, is_array, line });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.block()?;
        Ok(Procedure {
            name,
            params,
            body,
            line: head.line,
        })
    }

    fn block(&mut self) -> Result<Block, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let mut decls = Vec::new();
        while self.at(TokenKind::Int) {
            decls.push(self.decl()?);
        }
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) {
            stmts.push(self.stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Block { decls, stmts })
    }

    fn decl(&mut self) -> Result<Decl, ParseError> {
        let head = self.expect(TokenKind::Int)?;
        let decl = if self.eat(TokenKind::LBracket) {
            let low = self.bound()?;
            self.expect(TokenKind::Colon)?;
            let high = self.bound()?;
            self.expect(TokenKind::RBracket)?;
            let (name, _) = self.ident()?;
            Decl::Array {
                name,
                low,
                high,
                line: head.line,
            }
        } else {
            let (name, _) = self.ident()?;
            Decl::Scalar {
                name,
                line: head.line,
            }
        };
        self.expect(TokenKind::Semi)?;
        Ok(decl)
    }

    fn bound(&mut self) -> Result<i64, ParseError> {
        let negative = self.eat(TokenKind::Minus);
        let (value, _) = self.number()?;
        Ok(if negative { -value } else { value })
    }

    /// A statement body: `{ ... }` or a single statement.
    fn body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.at(TokenKind::LBrace) {
            self.expect(TokenKind::LBrace)?;
            let mut stmts = Vec::new();
            while !self.at(TokenKind::RBrace) {
                stmts.push(self.stmt()?);
            }
            self.expect(TokenKind::RBrace)?;
            Ok(stmts)
        } else {
            Ok(vec![self.stmt()?])
        }
    }

    fn stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek().map(|t| t.kind) {
            Some(TokenKind::Read) => {
                let head = self.bump().unwrap();
                let target = self.target()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Read {
                    target,
                    line: head.line,
                })
            }
            Some(TokenKind::Write) => {
                let head = self.bump().unwrap();
                let value = self.expr()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Write {
                    value,
                    line: head.line,
                })
            }
            Some(TokenKind::If) => {
                let head = self.bump().unwrap();
                let cond = self.cond()?;
                let then_body = self.body()?;
                let else_body = if self.eat(TokenKind::Else) {
                    self.body()?
                } else {
                    Vec::new()
                };
                Ok(Stmt::If {
                    cond,
                    then_body,
                    else_body,
                    line: head.line,
                })
            }
            Some(TokenKind::While) => {
                let head = self.bump().unwrap();
                let cond = self.cond()?;
                let body = self.body()?;
                Ok(Stmt::While {
                    cond,
                    body,
                    line: head.line,
                })
            }
            Some(TokenKind::Repeat) => {
                let head = self.bump().unwrap();
                let body = self.body()?;
                self.expect(TokenKind::Until)?;
                let cond = self.cond()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Repeat {
                    body,
                    cond,
                    line: head.line,
                })
            }
            Some(TokenKind::For) => {
                let head = self.bump().unwrap();
                let (counter, _) = self.ident()?;
                self.expect(TokenKind::From)?;
                let from = self.expr()?;
                let downto = match self.peek().map(|t| t.kind) {
                    Some(TokenKind::To) => false,
                    Some(TokenKind::Downto) => true,
                    _ => return self.error("expected 'to' or 'downto'"),
                };
                self.pos += 1;
                let to = self.expr()?;
                self.expect(TokenKind::Do)?;
                let body = self.body()?;
                Ok(Stmt::For {
                    counter,
                    from,
                    to,
                    downto,
                    body,
                    line: head.line,
                })
            }
            Some(TokenKind::Id) => {
                let (name, line) = self.ident()?;
                if self.eat(TokenKind::LParen) {
                    let mut args = Vec::new();
                    if !self.at(TokenKind::RParen) {
                        loop {
                            let (name, line) = self.ident()?;
                            args.push(CallArg { name, line });
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    self.expect(TokenKind::Semi)?;
                    Ok(Stmt::Call { name, args, line })
                } else {
                    let index = if self.eat(TokenKind::LBracket) {
                        let index = self.expr()?;
                        self.expect(TokenKind::RBracket)?;
                        Some(index)
                    } else {
                        None
                    };
                    self.expect(TokenKind::Assign)?;
                    let value = self.expr()?;
                    self.expect(TokenKind::Semi)?;
                    Ok(Stmt::Assign {
                        target: Target { name, index, line },
                        value,
                        line,
                    })
                }
            }
            Some(_) => {
                let token = *self.peek().unwrap();
                self.error(format!("expected a statement, found '{}'", token.text))
            }
            None => self.error("expected a statement, found end of input"),
        }
    }

    fn target(&mut self) -> Result<Target, ParseError> {
        let (name, line) = self.ident()?;
        let index = if self.eat(TokenKind::LBracket) {
            let index = self.expr()?;
            self.expect(TokenKind::RBracket)?;
            Some(index)
        } else {
            None
        };
        Ok(Target { name, index, line })
    }

    fn cond(&mut self) -> Result<Cond, ParseError> {
        let lhs = self.expr()?;
        let op = match self.peek().map(|t| t.kind) {
            Some(TokenKind::Eq) => CmpOp::Eq,
            Some(TokenKind::Ne) => CmpOp::Ne,
            Some(TokenKind::Lt) => CmpOp::Lt,
            Some(TokenKind::Gt) => CmpOp::Gt,
            Some(TokenKind::Le) => CmpOp::Le,
            Some(TokenKind::Ge) => CmpOp::Ge,
            _ => return self.error("expected a comparison operator"),
        };
        let line = self.bump().unwrap().line;
        let rhs = self.expr()?;
        Ok(Cond { op, lhs, rhs, line })
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().map(|t| t.kind) {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => break,
            };
            let line = self.bump().unwrap().line;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek().map(|t| t.kind) {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                Some(TokenKind::Percent) => BinOp::Mod,
                _ => break,
            };
            let line = self.bump().unwrap().line;
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        match self.peek().map(|t| t.kind) {
            Some(TokenKind::Num) => {
                let (value, line) = self.number()?;
                Ok(Expr::Literal { value, line })
            }
            Some(TokenKind::Minus) => {
                let line = self.bump().unwrap().line;
                let inner = self.factor()?;
                Ok(match inner {
                    Expr::Literal { value, .. } => Expr::Literal {
                        value: -value,
                        line,
                    },
                    other => Expr::Binary {
                        op: BinOp::Sub,
                        lhs: Box::new(Expr::Literal { value: 0, line }),
                        rhs: Box::new(other),
                        line,
                    },
                })
            }
            Some(TokenKind::LParen) => {
                self.expect(TokenKind::LParen)?;
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            Some(TokenKind::Id) => {
                let (name, line) = self.ident()?;
                if self.eat(TokenKind::LBracket) {
                    let index = self.expr()?;
                    self.expect(TokenKind::RBracket)?;
                    Ok(Expr::Element {
                        name,
                        index: Box::new(index),
                        line,
                    })
                } else {
                    Ok(Expr::Name { name, line })
                }
            }
            Some(_) => {
                let token = *self.peek().unwrap();
                self.error(format!("expected an expression, found '{}'", token.text))
            }
            None => self.error("expected an expression, found end of input"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_main_with_declarations() {
        let program = parse("program { int x; int[1:5] A; read x; A[1] := x; }").unwrap();
        assert!(program.procedures.is_empty());
        assert_eq!(program.main.decls.len(), 2);
        assert_eq!(program.main.stmts.len(), 2);
        match &program.main.decls[1] {
            Decl::Array { low, high, .. } => assert_eq!((*low, *high), (1, 5)),
            other => panic!("expected an array declaration, got {other:?}"),
        }
    }

    #[test]
    fn parses_procedures_and_calls() {
        let program = parse(
            "procedure swap(a, b) { int t; t := a; a := b; b := t; } \
             program { int x; int y; read x; read y; swap(x, y); }",
        )
        .unwrap();
        assert_eq!(program.procedures.len(), 1);
        let swap = &program.procedures[0];
        assert_eq!(swap.name.as_str(), "swap");
        assert_eq!(swap.params.len(), 2);
        assert!(!swap.params[0].is_array);
        match &program.main.stmts[2] {
            Stmt::Call { name, args, .. } => {
                assert_eq!(name.as_str(), "swap");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[test]
    fn array_formals_use_bracket_suffix() {
        let program = parse("procedure fill(A[], n) { } program { }").unwrap();
        let params = &program.procedures[0].params;
        assert!(params[0].is_array);
        assert!(!params[1].is_array);
    }

    #[test]
    fn precedence_and_parentheses() {
        let program = parse("program { int a; a := 1 + 2 * 3; a := (1 + 2) * 3; }").unwrap();
        match &program.main.stmts[0] {
            Stmt::Assign { value: Expr::Binary { op: BinOp::Add, rhs, .. }, .. } => {
                assert!(matches!(**rhs, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("expected addition at the top, got {other:?}"),
        }
        match &program.main.stmts[1] {
            Stmt::Assign { value: Expr::Binary { op: BinOp::Mul, lhs, .. }, .. } => {
                assert!(matches!(**lhs, Expr::Binary { op: BinOp::Add, .. }));
            }
            other => panic!("expected multiplication at the top, got {other:?}"),
        }
    }

    #[test]
    fn negative_literals_fold() {
        let program = parse("program { int a; a := -7; }").unwrap();
        match &program.main.stmts[0] {
            Stmt::Assign { value: Expr::Literal { value, .. }, .. } => assert_eq!(*value, -7),
            other => panic!("expected a folded literal, got {other:?}"),
        }
    }

    #[test]
    fn for_with_single_statement_body() {
        let program =
            parse("program { int[1:5] A; int i; for i from 1 to 5 do A[i] := i; }").unwrap();
        match &program.main.stmts[0] {
            Stmt::For { downto, body, .. } => {
                assert!(!downto);
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected a for loop, got {other:?}"),
        }
    }

    #[test]
    fn reports_line_of_failure() {
        let err = parse("program {\n int x;\n x + 1;\n}").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.to_string().starts_with("Parse error at line 3:"));
    }
}
