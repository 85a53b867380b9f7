// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Hand-written recursive descent parser for model entries: equations,
//! lookup declarations, constant lists, data declarations, subscript ranges,
//! aliases, and mapping clauses.
//!
//! This is the front door for synthesized equations (`add_equation`) and for
//! tests; whole-file model parsing is the lexer/parser collaborator's job.

use crate::ast::{BinaryOp, Expr, LookupTable, UnaryOp};
use crate::common::{EquationError, EquationResult, ErrorCode};
use crate::datamodel::{
    DimensionDef, DirectSubscriptDef, EquationDef, Lhs, MappingDef, ModelEntry, ModernModel, Rhs,
};
use crate::token::{Lexer, Spanned, Token};

/// TokenKind discriminant for peek comparisons without payload matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind {
    Plus,
    Minus,
    Mul,
    Div,
    Exp,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    And,
    Or,
    Not,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Bang,
    DataEq,
    Equiv,
    MapArrow,
    Ident,
    Literal,
    Num,
}

impl<'a> From<&Token<'a>> for TokenKind {
    fn from(token: &Token<'a>) -> Self {
        match token {
            Token::Plus => TokenKind::Plus,
            Token::Minus => TokenKind::Minus,
            Token::Mul => TokenKind::Mul,
            Token::Div => TokenKind::Div,
            Token::Exp => TokenKind::Exp,
            Token::Lt => TokenKind::Lt,
            Token::Lte => TokenKind::Lte,
            Token::Gt => TokenKind::Gt,
            Token::Gte => TokenKind::Gte,
            Token::Eq => TokenKind::Eq,
            Token::Neq => TokenKind::Neq,
            Token::And => TokenKind::And,
            Token::Or => TokenKind::Or,
            Token::Not => TokenKind::Not,
            Token::LParen => TokenKind::LParen,
            Token::RParen => TokenKind::RParen,
            Token::LBracket => TokenKind::LBracket,
            Token::RBracket => TokenKind::RBracket,
            Token::Comma => TokenKind::Comma,
            Token::Colon => TokenKind::Colon,
            Token::Bang => TokenKind::Bang,
            Token::DataEq => TokenKind::DataEq,
            Token::Equiv => TokenKind::Equiv,
            Token::MapArrow => TokenKind::MapArrow,
            Token::Ident(_) => TokenKind::Ident,
            Token::Literal(_) => TokenKind::Literal,
            Token::Num(_) => TokenKind::Num,
        }
    }
}

struct Parser<'input> {
    text: &'input str,
    tokens: Vec<Spanned<Token<'input>>>,
    pos: usize,
}

impl<'input> Parser<'input> {
    fn new(text: &'input str) -> EquationResult<Self> {
        let mut tokens = Vec::new();
        for result in Lexer::new(text) {
            tokens.push(result?);
        }
        Ok(Parser {
            text,
            tokens,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Spanned<Token<'input>>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|(_, tok, _)| TokenKind::from(tok))
    }

    fn peek_kind_at(&self, n: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + n).map(|(_, tok, _)| TokenKind::from(tok))
    }

    fn advance(&mut self) -> Option<&Spanned<Token<'input>>> {
        if self.pos < self.tokens.len() {
            let tok = &self.tokens[self.pos];
            self.pos += 1;
            Some(tok)
        } else {
            None
        }
    }

    fn eof_position(&self) -> usize {
        match self.tokens.last() {
            Some((_, _, end)) => *end,
            None => 0,
        }
    }

    fn err_here<T>(&self, code: ErrorCode) -> EquationResult<T> {
        match self.peek() {
            Some((start, _, end)) => Err(EquationError {
                start: *start as u16,
                end: *end as u16,
                code,
            }),
            None => {
                let pos = self.eof_position();
                Err(EquationError {
                    start: pos as u16,
                    end: (pos + 1) as u16,
                    code: ErrorCode::UnrecognizedEof,
                })
            }
        }
    }

    fn expect(&mut self, expected: TokenKind) -> EquationResult<Spanned<Token<'input>>> {
        if self.peek_kind() == Some(expected) {
            Ok(*self.advance().unwrap())
        } else {
            self.err_here(ErrorCode::UnrecognizedToken)
        }
    }

    fn expect_ident(&mut self) -> EquationResult<&'input str> {
        match self.expect(TokenKind::Ident)? {
            (_, Token::Ident(s), _) => Ok(s),
            _ => unreachable!(),
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn expect_end(&self) -> EquationResult<()> {
        if let Some((start, _, end)) = self.peek() {
            return Err(EquationError {
                start: *start as u16,
                end: *end as u16,
                code: ErrorCode::ExtraToken,
            });
        }
        Ok(())
    }

    // -- entries ----------------------------------------------------------

    fn parse_entry(&mut self) -> EquationResult<ModelEntry> {
        if self.is_at_end() {
            let pos = self.eof_position();
            return Err(EquationError {
                start: pos as u16,
                end: pos as u16,
                code: ErrorCode::EmptyEquation,
            });
        }

        let name = self.expect_ident()?;

        match self.peek_kind() {
            Some(TokenKind::Equiv) => {
                self.advance();
                let family = self.expect_ident()?;
                self.expect_end()?;
                Ok(ModelEntry::Dimension(DimensionDef {
                    name: name.to_string(),
                    alias_of: Some(family.to_string()),
                    ..Default::default()
                }))
            }
            Some(TokenKind::Colon) => {
                self.advance();
                self.parse_dimension(name)
            }
            Some(TokenKind::LBracket) => {
                self.advance();
                let subscripts = self.parse_subscript_names(TokenKind::RBracket)?;
                self.expect(TokenKind::RBracket)?;
                self.parse_equation_tail(name, subscripts)
            }
            _ => self.parse_equation_tail(name, vec![]),
        }
    }

    fn parse_dimension(&mut self, name: &str) -> EquationResult<ModelEntry> {
        // GET DIRECT SUBSCRIPT('file', delimiter, 'firstcell')
        if let Some((_, Token::Ident(word), _)) = self.peek() {
            if word.eq_ignore_ascii_case("GET DIRECT SUBSCRIPT")
                && self.peek_kind_at(1) == Some(TokenKind::LParen)
            {
                self.advance();
                self.advance();
                let file = self.expect_literal()?;
                self.expect(TokenKind::Comma)?;
                let delimiter = self.expect_literal()?;
                self.expect(TokenKind::Comma)?;
                let first_cell = self.expect_literal()?;
                self.expect(TokenKind::RParen)?;
                self.expect_end()?;
                return Ok(ModelEntry::Dimension(DimensionDef {
                    name: name.to_string(),
                    direct: Some(DirectSubscriptDef {
                        file,
                        delimiter,
                        first_cell,
                    }),
                    ..Default::default()
                }));
            }
        }

        let model_value = self.parse_subscript_names(TokenKind::MapArrow)?;
        let mut mappings = Vec::new();
        if self.peek_kind() == Some(TokenKind::MapArrow) {
            self.advance();
            loop {
                mappings.push(self.parse_mapping()?);
                if self.peek_kind() == Some(TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_end()?;
        Ok(ModelEntry::Dimension(DimensionDef {
            name: name.to_string(),
            model_value,
            mappings,
            ..Default::default()
        }))
    }

    fn parse_mapping(&mut self) -> EquationResult<MappingDef> {
        match self.peek_kind() {
            Some(TokenKind::Ident) => {
                let to_dim = self.expect_ident()?.to_string();
                Ok(MappingDef {
                    to_dim,
                    value: vec![],
                })
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let to_dim = self.expect_ident()?.to_string();
                self.expect(TokenKind::Colon)?;
                let value = self.parse_subscript_names(TokenKind::RParen)?;
                self.expect(TokenKind::RParen)?;
                Ok(MappingDef { to_dim, value })
            }
            _ => self.err_here(ErrorCode::UnrecognizedToken),
        }
    }

    /// Comma-separated subscript names, each optionally `!`-suffixed, up to
    /// (not consuming) `stop` or end of input.
    fn parse_subscript_names(&mut self, stop: TokenKind) -> EquationResult<Vec<String>> {
        let mut names = Vec::new();
        loop {
            if self.is_at_end() || self.peek_kind() == Some(stop) {
                break;
            }
            let name = self.expect_ident()?.to_string();
            if self.peek_kind() == Some(TokenKind::Bang) {
                self.advance();
            }
            names.push(name);
            if self.peek_kind() == Some(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(names)
    }

    fn expect_literal(&mut self) -> EquationResult<String> {
        match self.expect(TokenKind::Literal)? {
            (_, Token::Literal(s), _) => Ok(s.to_string()),
            _ => unreachable!(),
        }
    }

    fn parse_equation_tail(
        &mut self,
        name: &str,
        subscripts: Vec<String>,
    ) -> EquationResult<ModelEntry> {
        let lhs = Lhs {
            var_name: name.to_string(),
            subscripts,
        };

        match self.peek_kind() {
            None => Ok(ModelEntry::Equation(EquationDef {
                model_lhs: self.text.trim().to_string(),
                model_formula: String::new(),
                lhs,
                rhs: Rhs::Empty,
            })),
            Some(TokenKind::Eq) | Some(TokenKind::DataEq) => {
                let (_, _, eq_end) = *self.advance().unwrap();
                let model_lhs = self.text[..eq_end - 1].trim_end_matches([':', '=']);
                let model_formula = self.text[eq_end..].trim();
                let rhs = self.parse_rhs()?;
                self.expect_end()?;
                Ok(ModelEntry::Equation(EquationDef {
                    model_lhs: model_lhs.trim().to_string(),
                    model_formula: model_formula.to_string(),
                    lhs,
                    rhs,
                }))
            }
            Some(TokenKind::LParen) => {
                let (lparen_start, _, _) = *self.peek().unwrap();
                let table = self.parse_lookup_table()?;
                self.expect_end()?;
                Ok(ModelEntry::Equation(EquationDef {
                    model_lhs: self.text[..lparen_start].trim().to_string(),
                    model_formula: self.text[lparen_start..].trim().to_string(),
                    lhs,
                    rhs: Rhs::Lookup(table),
                }))
            }
            Some(_) => self.err_here(ErrorCode::UnrecognizedToken),
        }
    }

    fn parse_rhs(&mut self) -> EquationResult<Rhs> {
        let first = self.parse_expr()?;
        if self.peek_kind() != Some(TokenKind::Comma) {
            return Ok(Rhs::Expr(first));
        }

        // a top-level comma means a constant list
        let value = match first.literal_value() {
            Some(n) => n,
            None => return self.err_here(ErrorCode::ExpectedNumber),
        };
        let mut values = vec![(format!("{}", first), value)];
        while self.peek_kind() == Some(TokenKind::Comma) {
            self.advance();
            let (text, n) = self.parse_signed_number()?;
            values.push((text, n));
        }
        Ok(Rhs::ConstList(values))
    }

    // -- expressions ------------------------------------------------------

    fn parse_expr(&mut self) -> EquationResult<Expr> {
        self.parse_logical()
    }

    fn parse_logical(&mut self) -> EquationResult<Expr> {
        let mut left = self.parse_equality()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::And) => BinaryOp::And,
                Some(TokenKind::Or) => BinaryOp::Or,
                _ => break,
            };
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Op2(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> EquationResult<Expr> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Eq) => BinaryOp::Eq,
                Some(TokenKind::Neq) => BinaryOp::Neq,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::Op2(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> EquationResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Lt) => BinaryOp::Lt,
                Some(TokenKind::Lte) => BinaryOp::Lte,
                Some(TokenKind::Gt) => BinaryOp::Gt,
                Some(TokenKind::Gte) => BinaryOp::Gte,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Op2(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> EquationResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Op2(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> EquationResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Mul) => BinaryOp::Mul,
                Some(TokenKind::Div) => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Op2(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> EquationResult<Expr> {
        let op = match self.peek_kind() {
            Some(TokenKind::Plus) => UnaryOp::Positive,
            Some(TokenKind::Minus) => UnaryOp::Negative,
            Some(TokenKind::Not) => UnaryOp::Not,
            _ => return self.parse_exponentiation(),
        };
        self.advance();
        let operand = self.parse_exponentiation()?;
        Ok(Expr::Op1(op, Box::new(operand)))
    }

    /// `^` is left associative, matching the source language.
    fn parse_exponentiation(&mut self) -> EquationResult<Expr> {
        let mut left = self.parse_app()?;
        while self.peek_kind() == Some(TokenKind::Exp) {
            self.advance();
            let right = self.parse_app()?;
            left = Expr::Op2(BinaryOp::Exp, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_app(&mut self) -> EquationResult<Expr> {
        if self.peek_kind() == Some(TokenKind::Ident)
            && self.peek_kind_at(1) == Some(TokenKind::LParen)
        {
            let name = self.expect_ident()?.to_string();
            self.advance(); // consume '('
            let mut args = Vec::new();
            if self.peek_kind() != Some(TokenKind::RParen) {
                loop {
                    args.push(self.parse_arg()?);
                    if self.peek_kind() == Some(TokenKind::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen)?;
            return Ok(Expr::App(name, args));
        }

        self.parse_subscripted()
    }

    /// A function argument: an expression, a string literal, or an inline
    /// lookup table.
    fn parse_arg(&mut self) -> EquationResult<Expr> {
        if self.peek_kind() == Some(TokenKind::Literal) {
            let lit = self.expect_literal()?;
            return Ok(Expr::Str(lit));
        }
        self.parse_expr()
    }

    fn parse_subscripted(&mut self) -> EquationResult<Expr> {
        if self.peek_kind() == Some(TokenKind::Ident)
            && self.peek_kind_at(1) == Some(TokenKind::LBracket)
        {
            let name = self.expect_ident()?.to_string();
            self.advance(); // consume '['
            let subs = self.parse_subscript_names(TokenKind::RBracket)?;
            self.expect(TokenKind::RBracket)?;
            return Ok(Expr::Subscript(name, subs));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> EquationResult<Expr> {
        match self.peek_kind() {
            Some(TokenKind::Num) => {
                let (start, tok, end) = *self.advance().unwrap();
                match tok {
                    Token::Num(s) => match s.parse::<f64>() {
                        Ok(n) => Ok(Expr::Const(s.to_string(), n)),
                        Err(_) => Err(EquationError {
                            start: start as u16,
                            end: end as u16,
                            code: ErrorCode::ExpectedNumber,
                        }),
                    },
                    _ => unreachable!(),
                }
            }
            Some(TokenKind::Ident) => {
                let name = self.expect_ident()?;
                Ok(Expr::Var(name.to_string()))
            }
            Some(TokenKind::Literal) => {
                let lit = self.expect_literal()?;
                Ok(Expr::Str(lit))
            }
            Some(TokenKind::LParen) => {
                // an inline lookup table if it scans as one, otherwise a
                // parenthesized expression
                let save = self.pos;
                match self.parse_lookup_table() {
                    Ok(table) => Ok(Expr::Lookup(table)),
                    Err(_) => {
                        self.pos = save;
                        self.advance(); // consume '('
                        let expr = self.parse_expr()?;
                        self.expect(TokenKind::RParen)?;
                        Ok(expr)
                    }
                }
            }
            _ => self.err_here(ErrorCode::UnrecognizedToken),
        }
    }

    // -- lookup tables ----------------------------------------------------

    /// `( [range,] (x,y), (x,y), ... )` with `range = [(x0,y0)-(x1,y1)]`.
    fn parse_lookup_table(&mut self) -> EquationResult<LookupTable> {
        self.expect(TokenKind::LParen)?;

        let mut range = None;
        if self.peek_kind() == Some(TokenKind::LBracket) {
            self.advance();
            let min = self.parse_point()?;
            self.expect(TokenKind::Minus)?;
            let max = self.parse_point()?;
            self.expect(TokenKind::RBracket)?;
            self.expect(TokenKind::Comma)?;
            range = Some((min, max));
        }

        let mut points = Vec::new();
        loop {
            points.push(self.parse_point()?);
            if self.peek_kind() == Some(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;

        Ok(LookupTable { points, range })
    }

    fn parse_point(&mut self) -> EquationResult<(f64, f64)> {
        self.expect(TokenKind::LParen)?;
        let (_, x) = self.parse_signed_number()?;
        self.expect(TokenKind::Comma)?;
        let (_, y) = self.parse_signed_number()?;
        self.expect(TokenKind::RParen)?;
        Ok((x, y))
    }

    fn parse_signed_number(&mut self) -> EquationResult<(String, f64)> {
        let negative = match self.peek_kind() {
            Some(TokenKind::Minus) => {
                self.advance();
                true
            }
            Some(TokenKind::Plus) => {
                self.advance();
                false
            }
            _ => false,
        };
        let (start, tok, end) = match self.peek_kind() {
            Some(TokenKind::Num) => *self.advance().unwrap(),
            _ => return self.err_here(ErrorCode::ExpectedNumber),
        };
        match tok {
            Token::Num(s) => match s.parse::<f64>() {
                Ok(n) if negative => Ok((format!("-{}", s), -n)),
                Ok(n) => Ok((s.to_string(), n)),
                Err(_) => Err(EquationError {
                    start: start as u16,
                    end: end as u16,
                    code: ErrorCode::ExpectedNumber,
                }),
            },
            _ => unreachable!(),
        }
    }
}

/// Parse one model entry: an equation, a lookup or data declaration, a
/// subscript range, or an alias.
pub fn parse_entry(text: &str) -> EquationResult<ModelEntry> {
    let mut parser = Parser::new(text)?;
    parser.parse_entry()
}

/// Parse a list of entry strings into the modern parse-tree shape.
pub fn parse_model(lines: &[&str]) -> EquationResult<ModernModel> {
    let mut model = ModernModel::default();
    for line in lines {
        match parse_entry(line)? {
            ModelEntry::Dimension(d) => model.dimensions.push(d),
            ModelEntry::Equation(eq) => model.equations.push(eq),
        }
    }
    Ok(model)
}
