//! Recursive-descent parser producing the typed [`crate::ast::Node`] tree.
//!
//! Not part of the original distilled scope (spec.md treats parsing as an
//! external collaborator), but a real binary needs one end to end; kept
//! deliberately thin, grounded on
//! `examples/ajokela-kz80_microperl/src/parser.rs`'s single-struct,
//! one-token-lookahead shape.

mod lexer;
mod token;

use crate::ast::{BinOp, Node, UnOp};
use crate::error::{ParseError, Span};
use crate::value::Value;

use lexer::Lexer;
use token::{Token, TokenKind};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

type PResult<T> = Result<T, ParseError>;

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> PResult<Self> {
        let mut lexer = Lexer::new(src);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    pub fn parse_program(src: &'a str) -> PResult<Node> {
        let mut parser = Self::new(src)?;
        let mut stmts = Vec::new();
        while !parser.at(TokenKind::Eof) {
            stmts.push(parser.statement()?);
        }
        Ok(Node::Program(stmts))
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn bump(&mut self) -> PResult<Token> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.current.kind == kind {
            self.bump()
        } else {
            Err(ParseError {
                message: format!("expected {:?}, found {:?}", kind, self.current.kind),
                line: self.current.span.line,
                column: self.current.span.column,
            })
        }
    }

    fn ident_name(&mut self) -> PResult<(String, Span)> {
        let span = self.current.span;
        match self.bump()?.kind {
            TokenKind::Ident(name) => Ok((name, span)),
            other => Err(ParseError {
                message: format!("expected identifier, found {other:?}"),
                line: span.line,
                column: span.column,
            }),
        }
    }

    // ---- statements ----

    fn block(&mut self) -> PResult<Vec<Node>> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) {
            stmts.push(self.statement()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    fn statement(&mut self) -> PResult<Node> {
        match &self.current.kind {
            TokenKind::Var => self.var_decl(),
            TokenKind::Const => self.const_decl(),
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::Do => self.do_while_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::Return => self.return_stmt(),
            TokenKind::Break => {
                let span = self.current.span;
                self.bump()?;
                self.expect(TokenKind::Semi)?;
                Ok(Node::Break(span))
            }
            TokenKind::Continue => {
                let span = self.current.span;
                self.bump()?;
                self.expect(TokenKind::Semi)?;
                Ok(Node::Continue(span))
            }
            TokenKind::LBrace => Ok(Node::Block(self.block()?)),
            TokenKind::Function => self.func_def_stmt(),
            _ => {
                let expr = self.expression()?;
                self.expect(TokenKind::Semi)?;
                Ok(Node::ExprStmt(Box::new(expr)))
            }
        }
    }

    fn var_decl(&mut self) -> PResult<Node> {
        let span = self.current.span;
        self.bump()?; // var
        let mut decls = Vec::new();
        loop {
            let (name, _) = self.ident_name()?;
            let init = if self.at(TokenKind::Assign) {
                self.bump()?;
                Some(self.assignment_expr()?)
            } else {
                None
            };
            decls.push((name, init));
            if self.at(TokenKind::Comma) {
                self.bump()?;
                continue;
            }
            break;
        }
        self.expect(TokenKind::Semi)?;
        Ok(Node::VarDecl(decls, span))
    }

    fn const_decl(&mut self) -> PResult<Node> {
        let span = self.current.span;
        self.bump()?; // const
        let mut decls = Vec::new();
        loop {
            let (name, _) = self.ident_name()?;
            self.expect(TokenKind::Assign)?;
            let init = self.assignment_expr()?;
            decls.push((name, init));
            if self.at(TokenKind::Comma) {
                self.bump()?;
                continue;
            }
            break;
        }
        self.expect(TokenKind::Semi)?;
        Ok(Node::ConstDecl(decls, span))
    }

    fn if_stmt(&mut self) -> PResult<Node> {
        let span = self.current.span;
        self.bump()?; // if
        self.expect(TokenKind::LParen)?;
        let cond = self.expression()?;
        self.expect(TokenKind::RParen)?;
        let then = self.block()?;
        let r#else = if self.at(TokenKind::Else) {
            self.bump()?;
            if self.at(TokenKind::If) {
                Some(vec![self.if_stmt()?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Node::If { cond: Box::new(cond), then, r#else, span })
    }

    fn while_stmt(&mut self) -> PResult<Node> {
        let span = self.current.span;
        self.bump()?; // while
        self.expect(TokenKind::LParen)?;
        let cond = self.expression()?;
        self.expect(TokenKind::RParen)?;
        let body = self.block()?;
        Ok(Node::While { cond: Box::new(cond), body, span })
    }

    fn do_while_stmt(&mut self) -> PResult<Node> {
        let span = self.current.span;
        self.bump()?; // do
        let body = self.block()?;
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.expression()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semi)?;
        Ok(Node::DoWhile { cond: Box::new(cond), body, span })
    }

    fn for_stmt(&mut self) -> PResult<Node> {
        let span = self.current.span;
        self.bump()?; // for
        self.expect(TokenKind::LParen)?;
        let init = if self.at(TokenKind::Semi) {
            None
        } else if self.at(TokenKind::Var) {
            Some(Box::new(self.var_decl_no_semi()?))
        } else {
            let e = self.expression()?;
            Some(Box::new(Node::ExprStmt(Box::new(e))))
        };
        self.expect(TokenKind::Semi)?;
        let cond = if self.at(TokenKind::Semi) { None } else { Some(Box::new(self.expression()?)) };
        self.expect(TokenKind::Semi)?;
        let incr = if self.at(TokenKind::RParen) { None } else { Some(Box::new(self.expression()?)) };
        self.expect(TokenKind::RParen)?;
        let body = self.block()?;
        Ok(Node::For { init, cond, incr, body, span })
    }

    /// Like `var_decl` but leaves the trailing `;` to the caller (used in
    /// `for (var i = 0; ...)` init position).
    fn var_decl_no_semi(&mut self) -> PResult<Node> {
        let span = self.current.span;
        self.bump()?; // var
        let mut decls = Vec::new();
        loop {
            let (name, _) = self.ident_name()?;
            let init = if self.at(TokenKind::Assign) {
                self.bump()?;
                Some(self.assignment_expr()?)
            } else {
                None
            };
            decls.push((name, init));
            if self.at(TokenKind::Comma) {
                self.bump()?;
                continue;
            }
            break;
        }
        Ok(Node::VarDecl(decls, span))
    }

    fn return_stmt(&mut self) -> PResult<Node> {
        let span = self.current.span;
        self.bump()?; // return
        let value = if self.at(TokenKind::Semi) { None } else { Some(Box::new(self.expression()?)) };
        self.expect(TokenKind::Semi)?;
        Ok(Node::Return(value, span))
    }

    fn func_def_stmt(&mut self) -> PResult<Node> {
        let span = self.current.span;
        self.bump()?; // function
        let name = if let TokenKind::Ident(_) = self.current.kind {
            Some(self.ident_name()?.0)
        } else {
            None
        };
        let params = self.param_list()?;
        let body = self.block()?;
        let def = Node::FuncDef { name: name.clone(), params, body, span };
        if name.is_some() {
            Ok(Node::ExprStmt(Box::new(def)))
        } else {
            self.expect(TokenKind::Semi)?;
            Ok(Node::ExprStmt(Box::new(def)))
        }
    }

    fn param_list(&mut self) -> PResult<Vec<String>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.at(TokenKind::RParen) {
            params.push(self.ident_name()?.0);
            if self.at(TokenKind::Comma) {
                self.bump()?;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    // ---- expressions (precedence climbing) ----

    fn expression(&mut self) -> PResult<Node> {
        self.assignment_expr()
    }

    fn assignment_expr(&mut self) -> PResult<Node> {
        let lhs = self.logic_or_expr()?;
        let span = self.current.span;
        macro_rules! compound {
            ($op:expr) => {{
                self.bump()?;
                let rhs = self.assignment_expr()?;
                return Ok(Node::CompoundAssign { op: $op, target: Box::new(lhs), value: Box::new(rhs), span });
            }};
        }
        match self.current.kind {
            TokenKind::Assign => {
                self.bump()?;
                let rhs = self.assignment_expr()?;
                Ok(Node::Assign { target: Box::new(lhs), value: Box::new(rhs), span })
            }
            TokenKind::PlusEq => compound!(BinOp::Add),
            TokenKind::MinusEq => compound!(BinOp::Sub),
            TokenKind::StarEq => compound!(BinOp::Mul),
            TokenKind::SlashEq => compound!(BinOp::Div),
            TokenKind::PercentEq => compound!(BinOp::Mod),
            TokenKind::DotDotEq => compound!(BinOp::Concat),
            _ => Ok(lhs),
        }
    }

    fn logic_or_expr(&mut self) -> PResult<Node> {
        let mut node = self.logic_and_expr()?;
        while self.at(TokenKind::OrOr) {
            let span = self.current.span;
            self.bump()?;
            let rhs = self.logic_and_expr()?;
            node = Node::BinOp { op: BinOp::LogOr, left: Box::new(node), right: Box::new(rhs), span };
        }
        Ok(node)
    }

    fn logic_and_expr(&mut self) -> PResult<Node> {
        let mut node = self.equality_expr()?;
        while self.at(TokenKind::AndAnd) {
            let span = self.current.span;
            self.bump()?;
            let rhs = self.equality_expr()?;
            node = Node::BinOp { op: BinOp::LogAnd, left: Box::new(node), right: Box::new(rhs), span };
        }
        Ok(node)
    }

    fn equality_expr(&mut self) -> PResult<Node> {
        let mut node = self.relational_expr()?;
        loop {
            let op = match self.current.kind {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::Ne,
                _ => break,
            };
            let span = self.current.span;
            self.bump()?;
            let rhs = self.relational_expr()?;
            node = Node::BinOp { op, left: Box::new(node), right: Box::new(rhs), span };
        }
        Ok(node)
    }

    fn relational_expr(&mut self) -> PResult<Node> {
        let mut node = self.bitor_expr()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            let span = self.current.span;
            self.bump()?;
            let rhs = self.bitor_expr()?;
            node = Node::BinOp { op, left: Box::new(node), right: Box::new(rhs), span };
        }
        Ok(node)
    }

    fn bitor_expr(&mut self) -> PResult<Node> {
        let mut node = self.bitxor_expr()?;
        while self.at(TokenKind::Pipe) {
            let span = self.current.span;
            self.bump()?;
            let rhs = self.bitxor_expr()?;
            node = Node::BinOp { op: BinOp::Or, left: Box::new(node), right: Box::new(rhs), span };
        }
        Ok(node)
    }

    fn bitxor_expr(&mut self) -> PResult<Node> {
        let mut node = self.bitand_expr()?;
        while self.at(TokenKind::Caret) {
            let span = self.current.span;
            self.bump()?;
            let rhs = self.bitand_expr()?;
            node = Node::BinOp { op: BinOp::Xor, left: Box::new(node), right: Box::new(rhs), span };
        }
        Ok(node)
    }

    fn bitand_expr(&mut self) -> PResult<Node> {
        let mut node = self.shift_expr()?;
        while self.at(TokenKind::Amp) {
            let span = self.current.span;
            self.bump()?;
            let rhs = self.shift_expr()?;
            node = Node::BinOp { op: BinOp::And, left: Box::new(node), right: Box::new(rhs), span };
        }
        Ok(node)
    }

    fn shift_expr(&mut self) -> PResult<Node> {
        let mut node = self.concat_expr()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Shl => BinOp::Shl,
                TokenKind::Shr => BinOp::Shr,
                _ => break,
            };
            let span = self.current.span;
            self.bump()?;
            let rhs = self.concat_expr()?;
            node = Node::BinOp { op, left: Box::new(node), right: Box::new(rhs), span };
        }
        Ok(node)
    }

    fn concat_expr(&mut self) -> PResult<Node> {
        let mut node = self.additive_expr()?;
        while self.at(TokenKind::DotDot) {
            let span = self.current.span;
            self.bump()?;
            let rhs = self.additive_expr()?;
            node = Node::BinOp { op: BinOp::Concat, left: Box::new(node), right: Box::new(rhs), span };
        }
        Ok(node)
    }

    fn additive_expr(&mut self) -> PResult<Node> {
        let mut node = self.multiplicative_expr()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let span = self.current.span;
            self.bump()?;
            let rhs = self.multiplicative_expr()?;
            node = Node::BinOp { op, left: Box::new(node), right: Box::new(rhs), span };
        }
        Ok(node)
    }

    fn multiplicative_expr(&mut self) -> PResult<Node> {
        let mut node = self.unary_expr()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            let span = self.current.span;
            self.bump()?;
            let rhs = self.unary_expr()?;
            node = Node::BinOp { op, left: Box::new(node), right: Box::new(rhs), span };
        }
        Ok(node)
    }

    fn unary_expr(&mut self) -> PResult<Node> {
        let span = self.current.span;
        let op = match self.current.kind {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Tilde => Some(UnOp::BitNot),
            TokenKind::Bang => Some(UnOp::LogNot),
            TokenKind::TypeOf => Some(UnOp::TypeOf),
            TokenKind::SizeOf => Some(UnOp::SizeOf),
            _ => None,
        };
        if let Some(op) = op {
            self.bump()?;
            let arg = self.unary_expr()?;
            // constant-fold unary minus of a numeric literal
            if op == UnOp::Neg {
                if let Node::Literal(Value::Int(i), s) = arg {
                    return Ok(Node::Literal(Value::Int(-i), s));
                }
                if let Node::Literal(Value::Float(f), s) = arg {
                    return Ok(Node::Literal(Value::Float(-f), s));
                }
            }
            return Ok(Node::UnOp { op, arg: Box::new(arg), span });
        }
        if matches!(self.current.kind, TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let is_inc = self.current.kind == TokenKind::PlusPlus;
            self.bump()?;
            let target = self.unary_expr()?;
            let op = if is_inc { BinOp::Add } else { BinOp::Sub };
            return Ok(Node::CompoundAssign {
                op,
                target: Box::new(target),
                value: Box::new(Node::Literal(Value::Int(1), span)),
                span,
            });
        }
        self.postfix_expr()
    }

    fn postfix_expr(&mut self) -> PResult<Node> {
        let mut node = self.primary_expr()?;
        loop {
            match self.current.kind {
                TokenKind::LBracket => {
                    let span = self.current.span;
                    self.bump()?;
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket)?;
                    node = Node::Subscript { object: Box::new(node), index: Box::new(index), span };
                }
                TokenKind::Dot => {
                    let span = self.current.span;
                    self.bump()?;
                    let (name, _) = self.ident_name()?;
                    node = Node::Member { object: Box::new(node), name, span };
                }
                TokenKind::LParen => {
                    let span = self.current.span;
                    self.bump()?;
                    let mut args = Vec::new();
                    while !self.at(TokenKind::RParen) {
                        args.push(self.assignment_expr()?);
                        if self.at(TokenKind::Comma) {
                            self.bump()?;
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    node = Node::Call { callee: Box::new(node), args, span };
                }
                TokenKind::PlusPlus => {
                    let span = self.current.span;
                    self.bump()?;
                    node = Node::CompoundAssign {
                        op: BinOp::Add,
                        target: Box::new(node),
                        value: Box::new(Node::Literal(Value::Int(1), span)),
                        span,
                    };
                }
                TokenKind::MinusMinus => {
                    let span = self.current.span;
                    self.bump()?;
                    node = Node::CompoundAssign {
                        op: BinOp::Sub,
                        target: Box::new(node),
                        value: Box::new(Node::Literal(Value::Int(1), span)),
                        span,
                    };
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn primary_expr(&mut self) -> PResult<Node> {
        let span = self.current.span;
        match self.current.kind.clone() {
            TokenKind::Int(v) => {
                self.bump()?;
                Ok(Node::Literal(Value::Int(v), span))
            }
            TokenKind::Float(v) => {
                self.bump()?;
                Ok(Node::Literal(Value::Float(v), span))
            }
            TokenKind::Str(bytes) => {
                self.bump()?;
                Ok(Node::Literal(Value::new_string(bytes), span))
            }
            TokenKind::True => {
                self.bump()?;
                Ok(Node::Literal(Value::Bool(true), span))
            }
            TokenKind::False => {
                self.bump()?;
                Ok(Node::Literal(Value::Bool(false), span))
            }
            TokenKind::Nil => {
                self.bump()?;
                Ok(Node::Literal(Value::Nil, span))
            }
            TokenKind::Ident(name) => {
                self.bump()?;
                Ok(Node::Ident(name, span))
            }
            TokenKind::LParen => {
                self.bump()?;
                let inner = self.expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.bump()?;
                let mut items = Vec::new();
                while !self.at(TokenKind::RBracket) {
                    items.push(self.assignment_expr()?);
                    if self.at(TokenKind::Comma) {
                        self.bump()?;
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Node::ArrayLit(items, span))
            }
            TokenKind::LBrace => {
                self.bump()?;
                let mut pairs = Vec::new();
                while !self.at(TokenKind::RBrace) {
                    let key = if let TokenKind::Ident(name) = self.current.kind.clone() {
                        let key_span = self.current.span;
                        self.bump()?;
                        Node::Literal(Value::new_string(name.into_bytes()), key_span)
                    } else {
                        self.assignment_expr()?
                    };
                    self.expect(TokenKind::Assign)?;
                    let value = self.assignment_expr()?;
                    pairs.push((key, value));
                    if self.at(TokenKind::Comma) {
                        self.bump()?;
                    }
                }
                self.expect(TokenKind::RBrace)?;
                Ok(Node::HashLit(pairs, span))
            }
            TokenKind::Function => {
                self.bump()?;
                let name = if let TokenKind::Ident(_) = self.current.kind {
                    Some(self.ident_name()?.0)
                } else {
                    None
                };
                let params = self.param_list()?;
                let body = self.block()?;
                Ok(Node::FuncDef { name, params, body, span })
            }
            other => Err(ParseError {
                message: format!("unexpected token {other:?}"),
                line: span.line,
                column: span.column,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_precedence() {
        let prog = Parser::parse_program("return 1 + 2 * 3;").unwrap();
        match prog {
            Node::Program(stmts) => {
                assert_eq!(stmts.len(), 1);
                match &stmts[0] {
                    Node::Return(Some(inner), _) => match inner.as_ref() {
                        Node::BinOp { op: BinOp::Add, .. } => {}
                        other => panic!("expected top-level Add, got {other:?}"),
                    },
                    other => panic!("expected Return, got {other:?}"),
                }
            }
            other => panic!("expected Program, got {other:?}"),
        }
    }

    #[test]
    fn parses_concat_assignment() {
        let prog = Parser::parse_program(r#"var s = "foo"; s = s .. "bar"; return s;"#).unwrap();
        let Node::Program(stmts) = prog else { panic!() };
        assert_eq!(stmts.len(), 3);
    }

    #[test]
    fn parses_closure_literal() {
        let prog = Parser::parse_program("var f = function(x) { return x + 1; }; return f(41);").unwrap();
        let Node::Program(stmts) = prog else { panic!() };
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn parses_if_else() {
        let prog = Parser::parse_program(r#"if (0 == 0) { return "y"; } else { return "n"; }"#).unwrap();
        let Node::Program(stmts) = prog else { panic!() };
        assert_eq!(stmts.len(), 1);
    }
}
