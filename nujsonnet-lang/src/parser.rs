//! The Jsonnet parser.
//!
//! Recursive descent with precedence climbing for binary operators.
//! Consumes the token sequence produced by the [lexer](crate::lexer) and
//! builds the [surface AST](crate::ast). Fails with a
//! [`StaticError`] carrying the span of the offending token.

use crate::ast;
use crate::error::StaticError;
use crate::span::{SourceMap, Span};
use crate::token::{Sym, Token, TokenKind};

/// Expression nesting deeper than this is rejected. The parser recurses,
/// so unbounded nesting would otherwise exhaust the native stack.
const MAX_DEPTH: usize = 1000;

pub struct Parser<'a> {
    map: &'a SourceMap,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser over `tokens`, which must end with an end-of-file
    /// token.
    #[must_use]
    pub fn new(map: &'a SourceMap, tokens: Vec<Token>) -> Self {
        assert!(matches!(
            tokens.last(),
            Some(Token {
                kind: TokenKind::EndOfFile,
                ..
            })
        ));
        Self {
            map,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Parses the tokens into a single expression covering the whole input.
    pub fn parse_root_expr(mut self) -> Result<ast::Expr, StaticError> {
        let expr = self.parse_expr()?;
        if matches!(self.peek().kind, TokenKind::EndOfFile) {
            Ok(expr)
        } else {
            Err(self.err_expected("end of file"))
        }
    }

    #[must_use]
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    #[must_use]
    fn peek_at(&self, i: usize) -> &Token {
        let i = (self.pos + i).min(self.tokens.len() - 1);
        &self.tokens[i]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    #[must_use]
    fn peek_sym(&self, sym: Sym) -> bool {
        matches!(self.peek().kind, TokenKind::Sym(s) if s == sym)
    }

    #[must_use]
    fn peek_sym_at(&self, sym: Sym, i: usize) -> bool {
        matches!(self.peek_at(i).kind, TokenKind::Sym(s) if s == sym)
    }

    fn eat_sym(&mut self, sym: Sym) -> Option<Span> {
        if self.peek_sym(sym) {
            Some(self.advance().span)
        } else {
            None
        }
    }

    fn expect_sym(&mut self, sym: Sym) -> Result<Span, StaticError> {
        self.eat_sym(sym)
            .ok_or_else(|| self.err_expected(&format!("\"{}\"", sym.as_str())))
    }

    fn eat_ident(&mut self) -> Option<ast::Ident> {
        if let TokenKind::Ident(ref name) = self.peek().kind {
            let name = name.clone();
            let span = self.advance().span;
            Some(ast::Ident { name, span })
        } else {
            None
        }
    }

    fn expect_ident(&mut self) -> Result<ast::Ident, StaticError> {
        self.eat_ident()
            .ok_or_else(|| self.err_expected("an identifier"))
    }

    #[must_use]
    fn err_expected(&self, what: &str) -> StaticError {
        let token = self.peek();
        StaticError::new(
            self.map,
            token.span,
            format!("expected {what}, got {}", token.kind.describe()),
        )
    }

    fn parse_expr(&mut self) -> Result<ast::Expr, StaticError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            let span = self.peek().span;
            self.depth -= 1;
            return Err(StaticError::new(
                self.map,
                span,
                "exceeded maximum nesting depth".into(),
            ));
        }
        let result = self.parse_binary(0);
        self.depth -= 1;
        result
    }

    /// Binary operator and its precedence (higher binds tighter), if the
    /// current token starts one.
    #[must_use]
    fn peek_binary_op(&self) -> Option<(ast::BinaryOp, u8)> {
        let sym = match self.peek().kind {
            TokenKind::Sym(sym) => sym,
            _ => return None,
        };
        Some(match sym {
            Sym::Star => (ast::BinaryOp::Mul, 10),
            Sym::Slash => (ast::BinaryOp::Div, 10),
            Sym::Percent => (ast::BinaryOp::Rem, 10),
            Sym::Plus => (ast::BinaryOp::Add, 9),
            Sym::Minus => (ast::BinaryOp::Sub, 9),
            Sym::Shl => (ast::BinaryOp::Shl, 8),
            Sym::Shr => (ast::BinaryOp::Shr, 8),
            Sym::Lt => (ast::BinaryOp::Lt, 7),
            Sym::LtEq => (ast::BinaryOp::Le, 7),
            Sym::Gt => (ast::BinaryOp::Gt, 7),
            Sym::GtEq => (ast::BinaryOp::Ge, 7),
            Sym::In => (ast::BinaryOp::In, 7),
            Sym::EqEq => (ast::BinaryOp::Eq, 6),
            Sym::BangEq => (ast::BinaryOp::Ne, 6),
            Sym::Amp => (ast::BinaryOp::BitAnd, 5),
            Sym::Caret => (ast::BinaryOp::BitXor, 4),
            Sym::Pipe => (ast::BinaryOp::BitOr, 3),
            Sym::AmpAmp => (ast::BinaryOp::LogicAnd, 2),
            Sym::PipePipe => (ast::BinaryOp::LogicOr, 1),
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<ast::Expr, StaticError> {
        let mut lhs = self.parse_unary()?;
        while let Some((op, prec)) = self.peek_binary_op() {
            if prec < min_prec {
                break;
            }
            // `e in super` (but not `e in super.f` or `e in super[x]`)
            if op == ast::BinaryOp::In
                && self.peek_sym_at(Sym::Super, 1)
                && !self.peek_sym_at(Sym::Dot, 2)
                && !self.peek_sym_at(Sym::LBracket, 2)
            {
                self.advance();
                let super_span = self.advance().span;
                let span = lhs.span.surrounding(super_span);
                lhs = ast::Expr {
                    kind: ast::ExprKind::InSuper(Box::new(lhs), super_span),
                    span,
                };
                continue;
            }
            self.advance();
            let rhs = self.parse_binary(prec + 1)?;
            let span = lhs.span.surrounding(rhs.span);
            lhs = ast::Expr {
                kind: ast::ExprKind::Binary(Box::new(lhs), op, Box::new(rhs)),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<ast::Expr, StaticError> {
        let op = if let TokenKind::Sym(sym) = self.peek().kind {
            match sym {
                Sym::Minus => Some(ast::UnaryOp::Minus),
                Sym::Plus => Some(ast::UnaryOp::Plus),
                Sym::Tilde => Some(ast::UnaryOp::BitNot),
                Sym::Bang => Some(ast::UnaryOp::LogicNot),
                _ => None,
            }
        } else {
            None
        };
        if let Some(op) = op {
            let op_span = self.advance().span;
            let rhs = self.parse_unary()?;
            let span = op_span.surrounding(rhs.span);
            Ok(ast::Expr {
                kind: ast::ExprKind::Unary(op, Box::new(rhs)),
                span,
            })
        } else {
            self.parse_suffix()
        }
    }

    fn parse_suffix(&mut self) -> Result<ast::Expr, StaticError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_sym(Sym::Dot).is_some() {
                let field = self.expect_ident()?;
                let span = expr.span.surrounding(field.span);
                expr = ast::Expr {
                    kind: ast::ExprKind::Field(Box::new(expr), field),
                    span,
                };
            } else if self.eat_sym(Sym::LBracket).is_some() {
                expr = self.parse_index_suffix(expr)?;
            } else if self.eat_sym(Sym::LParen).is_some() {
                let args = self.parse_args()?;
                let mut end_span = self.expect_sym(Sym::RParen)?;
                let tailstrict = if let Some(span) = self.eat_sym(Sym::Tailstrict) {
                    end_span = span;
                    true
                } else {
                    false
                };
                let span = expr.span.surrounding(end_span);
                expr = ast::Expr {
                    kind: ast::ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                        tailstrict,
                    },
                    span,
                };
            } else if self.peek_sym(Sym::LBrace) {
                self.advance();
                let (inside, end_span) = self.parse_obj_inside()?;
                let span = expr.span.surrounding(end_span);
                expr = ast::Expr {
                    kind: ast::ExprKind::ObjExt(Box::new(expr), inside),
                    span,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Parses `[...]` after the opening bracket has been consumed: either a
    /// plain index or a slice with up to three parts.
    fn parse_index_suffix(&mut self, target: ast::Expr) -> Result<ast::Expr, StaticError> {
        let mut parts: [Option<Box<ast::Expr>>; 3] = [None, None, None];
        let mut part = 0usize;
        let mut saw_colon = false;
        let end_span = loop {
            if let Some(span) = self.eat_sym(Sym::RBracket) {
                break span;
            }
            let colons = if self.eat_sym(Sym::Colon).is_some() {
                1
            } else if self.eat_sym(Sym::ColonColon).is_some() {
                2
            } else {
                0
            };
            if colons > 0 {
                saw_colon = true;
                part += colons;
                if part > 2 {
                    return Err(self.err_expected("\"]\""));
                }
            } else {
                if parts[part].is_some() {
                    return Err(self.err_expected("\":\" or \"]\""));
                }
                parts[part] = Some(Box::new(self.parse_expr()?));
            }
        };
        let span = target.span.surrounding(end_span);
        let [start, end, step] = parts;
        if saw_colon {
            Ok(ast::Expr {
                kind: ast::ExprKind::Slice(Box::new(target), start, end, step),
                span,
            })
        } else {
            let Some(index) = start else {
                return Err(StaticError::new(
                    self.map,
                    span,
                    "an index must not be empty".into(),
                ));
            };
            Ok(ast::Expr {
                kind: ast::ExprKind::Index(Box::new(target), index),
                span,
            })
        }
    }

    fn parse_args(&mut self) -> Result<Vec<ast::Arg>, StaticError> {
        let mut args = Vec::new();
        loop {
            if self.peek_sym(Sym::RParen) {
                return Ok(args);
            }
            if matches!(self.peek().kind, TokenKind::Ident(_)) && self.peek_sym_at(Sym::Eq, 1) {
                let name = self.expect_ident()?;
                self.advance();
                let value = self.parse_expr()?;
                args.push(ast::Arg::Named(name, value));
            } else {
                args.push(ast::Arg::Positional(self.parse_expr()?));
            }
            if self.eat_sym(Sym::Comma).is_none() {
                return Ok(args);
            }
        }
    }

    fn parse_params(&mut self) -> Result<Vec<ast::Param>, StaticError> {
        let mut params = Vec::new();
        loop {
            if self.peek_sym(Sym::RParen) {
                return Ok(params);
            }
            let name = self.expect_ident()?;
            let default = if self.eat_sym(Sym::Eq).is_some() {
                Some(self.parse_expr()?)
            } else {
                None
            };
            params.push(ast::Param { name, default });
            if self.eat_sym(Sym::Comma).is_none() {
                return Ok(params);
            }
        }
    }

    fn parse_bind(&mut self) -> Result<ast::Bind, StaticError> {
        let name = self.expect_ident()?;
        let params = if self.eat_sym(Sym::LParen).is_some() {
            let params = self.parse_params()?;
            self.expect_sym(Sym::RParen)?;
            Some(params)
        } else {
            None
        };
        self.expect_sym(Sym::Eq)?;
        let value = self.parse_expr()?;
        Ok(ast::Bind {
            name,
            params,
            value,
        })
    }

    fn parse_assert(&mut self, assert_span: Span) -> Result<ast::Assert, StaticError> {
        let cond = self.parse_expr()?;
        let (msg, end_span) = if self.eat_sym(Sym::Colon).is_some() {
            let msg = self.parse_expr()?;
            let span = msg.span;
            (Some(msg), span)
        } else {
            (None, cond.span)
        };
        Ok(ast::Assert {
            span: assert_span.surrounding(end_span),
            cond,
            msg,
        })
    }

    fn parse_primary(&mut self) -> Result<ast::Expr, StaticError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number(value) => {
                self.advance();
                Ok(ast::Expr {
                    kind: ast::ExprKind::Number(value),
                    span: token.span,
                })
            }
            TokenKind::Str { value, kind } => {
                self.advance();
                Ok(ast::Expr {
                    kind: ast::ExprKind::Str(value, kind),
                    span: token.span,
                })
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(ast::Expr {
                    kind: ast::ExprKind::Var(ast::Ident {
                        name,
                        span: token.span,
                    }),
                    span: token.span,
                })
            }
            TokenKind::Sym(sym) => self.parse_primary_sym(sym, token.span),
            TokenKind::EndOfFile => Err(self.err_expected("an expression")),
        }
    }

    fn parse_primary_sym(&mut self, sym: Sym, span: Span) -> Result<ast::Expr, StaticError> {
        match sym {
            Sym::Null => {
                self.advance();
                Ok(ast::Expr {
                    kind: ast::ExprKind::Null,
                    span,
                })
            }
            Sym::True => {
                self.advance();
                Ok(ast::Expr {
                    kind: ast::ExprKind::True,
                    span,
                })
            }
            Sym::False => {
                self.advance();
                Ok(ast::Expr {
                    kind: ast::ExprKind::False,
                    span,
                })
            }
            Sym::SelfKw => {
                self.advance();
                Ok(ast::Expr {
                    kind: ast::ExprKind::SelfObj,
                    span,
                })
            }
            Sym::Dollar => {
                self.advance();
                Ok(ast::Expr {
                    kind: ast::ExprKind::Dollar,
                    span,
                })
            }
            Sym::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                let end_span = self.expect_sym(Sym::RParen)?;
                Ok(ast::Expr {
                    kind: ast::ExprKind::Paren(Box::new(inner)),
                    span: span.surrounding(end_span),
                })
            }
            Sym::LBrace => {
                self.advance();
                let (inside, end_span) = self.parse_obj_inside()?;
                Ok(ast::Expr {
                    kind: ast::ExprKind::Object(inside),
                    span: span.surrounding(end_span),
                })
            }
            Sym::LBracket => {
                self.advance();
                self.parse_array(span)
            }
            Sym::Super => {
                self.advance();
                if self.eat_sym(Sym::Dot).is_some() {
                    let field = self.expect_ident()?;
                    let full = span.surrounding(field.span);
                    Ok(ast::Expr {
                        kind: ast::ExprKind::SuperField(span, field),
                        span: full,
                    })
                } else if self.eat_sym(Sym::LBracket).is_some() {
                    let index = self.parse_expr()?;
                    let end_span = self.expect_sym(Sym::RBracket)?;
                    Ok(ast::Expr {
                        kind: ast::ExprKind::SuperIndex(span, Box::new(index)),
                        span: span.surrounding(end_span),
                    })
                } else {
                    Err(self.err_expected("\".\" or \"[\" after \"super\""))
                }
            }
            Sym::Local => {
                self.advance();
                let mut binds = vec![self.parse_bind()?];
                while self.eat_sym(Sym::Comma).is_some() {
                    binds.push(self.parse_bind()?);
                }
                self.expect_sym(Sym::Semicolon)?;
                let body = self.parse_expr()?;
                let full = span.surrounding(body.span);
                Ok(ast::Expr {
                    kind: ast::ExprKind::Local(binds, Box::new(body)),
                    span: full,
                })
            }
            Sym::If => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect_sym(Sym::Then)?;
                let then_body = self.parse_expr()?;
                let else_body = if self.eat_sym(Sym::Else).is_some() {
                    Some(Box::new(self.parse_expr()?))
                } else {
                    None
                };
                let end_span = else_body.as_ref().map_or(then_body.span, |e| e.span);
                Ok(ast::Expr {
                    kind: ast::ExprKind::If(Box::new(cond), Box::new(then_body), else_body),
                    span: span.surrounding(end_span),
                })
            }
            Sym::Function => {
                self.advance();
                self.expect_sym(Sym::LParen)?;
                let params = self.parse_params()?;
                self.expect_sym(Sym::RParen)?;
                let body = self.parse_expr()?;
                let full = span.surrounding(body.span);
                Ok(ast::Expr {
                    kind: ast::ExprKind::Func(params, Box::new(body)),
                    span: full,
                })
            }
            Sym::Assert => {
                self.advance();
                let assert = self.parse_assert(span)?;
                self.expect_sym(Sym::Semicolon)?;
                let rest = self.parse_expr()?;
                let full = span.surrounding(rest.span);
                Ok(ast::Expr {
                    kind: ast::ExprKind::Assert(Box::new(assert), Box::new(rest)),
                    span: full,
                })
            }
            Sym::Error => {
                self.advance();
                let msg = self.parse_expr()?;
                let full = span.surrounding(msg.span);
                Ok(ast::Expr {
                    kind: ast::ExprKind::Error(Box::new(msg)),
                    span: full,
                })
            }
            Sym::Import | Sym::Importstr | Sym::Importbin => {
                self.advance();
                let path = self.parse_expr()?;
                let full = span.surrounding(path.span);
                let kind = match sym {
                    Sym::Import => ast::ExprKind::Import(Box::new(path)),
                    Sym::Importstr => ast::ExprKind::ImportStr(Box::new(path)),
                    _ => ast::ExprKind::ImportBin(Box::new(path)),
                };
                Ok(ast::Expr { kind, span: full })
            }
            _ => Err(self.err_expected("an expression")),
        }
    }

    fn parse_array(&mut self, start_span: Span) -> Result<ast::Expr, StaticError> {
        if let Some(end_span) = self.eat_sym(Sym::RBracket) {
            return Ok(ast::Expr {
                kind: ast::ExprKind::Array(Vec::new()),
                span: start_span.surrounding(end_span),
            });
        }

        let first = self.parse_expr()?;
        let had_comma = self.eat_sym(Sym::Comma).is_some();

        if self.peek_sym(Sym::For) {
            let comp_spec = self.parse_comp_spec()?;
            let end_span = self.expect_sym(Sym::RBracket)?;
            return Ok(ast::Expr {
                kind: ast::ExprKind::ArrayComp(Box::new(first), comp_spec),
                span: start_span.surrounding(end_span),
            });
        }

        let mut items = vec![first];
        let end_span = loop {
            if let Some(end_span) = self.eat_sym(Sym::RBracket) {
                break end_span;
            }
            if !had_comma && items.len() == 1 {
                return Err(self.err_expected("\",\" or \"]\""));
            }
            items.push(self.parse_expr()?);
            if self.eat_sym(Sym::Comma).is_none() {
                break self.expect_sym(Sym::RBracket)?;
            }
        };
        Ok(ast::Expr {
            kind: ast::ExprKind::Array(items),
            span: start_span.surrounding(end_span),
        })
    }

    fn parse_comp_spec(&mut self) -> Result<Vec<ast::CompSpecPart>, StaticError> {
        let mut parts = Vec::new();
        loop {
            if self.eat_sym(Sym::For).is_some() {
                let var = self.expect_ident()?;
                self.expect_sym(Sym::In)?;
                let inner = self.parse_expr()?;
                parts.push(ast::CompSpecPart::For(ast::ForSpec { var, inner }));
            } else if self.eat_sym(Sym::If).is_some() {
                let cond = self.parse_expr()?;
                parts.push(ast::CompSpecPart::If(ast::IfSpec { cond }));
            } else {
                assert!(!parts.is_empty());
                return Ok(parts);
            }
        }
    }

    fn eat_plus_visibility(&mut self) -> Option<(bool, ast::Visibility)> {
        if self.eat_sym(Sym::Colon).is_some() {
            Some((false, ast::Visibility::Default))
        } else if self.eat_sym(Sym::ColonColon).is_some() {
            Some((false, ast::Visibility::Hidden))
        } else if self.eat_sym(Sym::ColonColonColon).is_some() {
            Some((false, ast::Visibility::ForceVisible))
        } else if self.eat_sym(Sym::PlusColon).is_some() {
            Some((true, ast::Visibility::Default))
        } else if self.eat_sym(Sym::PlusColonColon).is_some() {
            Some((true, ast::Visibility::Hidden))
        } else if self.eat_sym(Sym::PlusColonColonColon).is_some() {
            Some((true, ast::Visibility::ForceVisible))
        } else {
            None
        }
    }

    fn parse_field(&mut self) -> Result<ast::Field, StaticError> {
        let name = if let Some(ident) = self.eat_ident() {
            ast::FieldName::Ident(ident)
        } else if let TokenKind::Str { ref value, .. } = self.peek().kind {
            let value = value.clone();
            let span = self.advance().span;
            ast::FieldName::Str(value, span)
        } else if let Some(start_span) = self.eat_sym(Sym::LBracket) {
            let name = self.parse_expr()?;
            let end_span = self.expect_sym(Sym::RBracket)?;
            ast::FieldName::Computed(name, start_span.surrounding(end_span))
        } else {
            return Err(self.err_expected("a field name"));
        };

        let params = if self.eat_sym(Sym::LParen).is_some() {
            let params = self.parse_params()?;
            self.expect_sym(Sym::RParen)?;
            Some(params)
        } else {
            None
        };

        let Some((plus, visibility)) = self.eat_plus_visibility() else {
            return Err(self.err_expected("\":\", \"::\", \":::\", \"+:\", \"+::\" or \"+:::\""));
        };
        if plus && params.is_some() {
            let token_span = self.peek().span;
            return Err(StaticError::new(
                self.map,
                token_span,
                "cannot use \"+:\" on a method".into(),
            ));
        }

        let value = self.parse_expr()?;
        Ok(ast::Field {
            name,
            params,
            plus,
            visibility,
            value,
        })
    }

    fn parse_obj_inside(&mut self) -> Result<(ast::ObjInside, Span), StaticError> {
        let mut members = Vec::new();
        loop {
            if let Some(end_span) = self.eat_sym(Sym::RBrace) {
                return Ok((ast::ObjInside::Members(members), end_span));
            }
            if self.peek_sym(Sym::For) {
                return self.finish_obj_comp(members);
            }

            if let Some(local_span) = self.eat_sym(Sym::Local) {
                // Object-level local; function sugar allowed, no semicolon.
                let _ = local_span;
                let bind = self.parse_bind()?;
                members.push(ast::Member::Local(ast::ObjLocal { bind }));
            } else if let Some(assert_span) = self.eat_sym(Sym::Assert) {
                let assert = self.parse_assert(assert_span)?;
                members.push(ast::Member::Assert(assert));
            } else {
                members.push(ast::Member::Field(self.parse_field()?));
            }

            if self.eat_sym(Sym::Comma).is_none() {
                if self.peek_sym(Sym::For) {
                    return self.finish_obj_comp(members);
                }
                let end_span = self.expect_sym(Sym::RBrace)?;
                return Ok((ast::ObjInside::Members(members), end_span));
            }
        }
    }

    /// The members of an object comprehension have been collected and the
    /// current token is `for`; validates the members and parses the
    /// comprehension spec.
    fn finish_obj_comp(
        &mut self,
        members: Vec<ast::Member>,
    ) -> Result<(ast::ObjInside, Span), StaticError> {
        let comp_span = self.peek().span;
        let comp_spec = self.parse_comp_spec()?;
        let end_span = self.expect_sym(Sym::RBrace)?;

        let mut locals1 = Vec::new();
        let mut locals2 = Vec::new();
        let mut field = None;
        for member in members {
            match member {
                ast::Member::Local(local) => {
                    if field.is_none() {
                        locals1.push(local);
                    } else {
                        locals2.push(local);
                    }
                }
                ast::Member::Assert(assert) => {
                    return Err(StaticError::new(
                        self.map,
                        assert.span,
                        "object comprehension cannot have asserts".into(),
                    ));
                }
                ast::Member::Field(f) => {
                    if field.is_some() {
                        return Err(StaticError::new(
                            self.map,
                            comp_span,
                            "object comprehension can only have one field".into(),
                        ));
                    }
                    field = Some(f);
                }
            }
        }
        let Some(field) = field else {
            return Err(StaticError::new(
                self.map,
                comp_span,
                "object comprehension must have a field".into(),
            ));
        };
        let ast::FieldName::Computed(name, name_span) = field.name else {
            return Err(StaticError::new(
                self.map,
                comp_span,
                "object comprehension field must be computed (\"[expr]: ...\")".into(),
            ));
        };
        if field.params.is_some() {
            return Err(StaticError::new(
                self.map,
                name_span,
                "object comprehension field cannot be a method".into(),
            ));
        }
        if field.plus || field.visibility != ast::Visibility::Default {
            return Err(StaticError::new(
                self.map,
                name_span,
                "object comprehension field must use \":\"".into(),
            ));
        }

        Ok((
            ast::ObjInside::Comp {
                locals1,
                name: Box::new(name),
                name_span,
                body: Box::new(field.value),
                locals2,
                comp_spec,
            },
            end_span,
        ))
    }
}
