// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Lexer for Vensim-style equation and subscript-range text.
//!
//! Identifiers may contain internal spaces (`TIME STEP`, `WITH LOOKUP`);
//! trailing whitespace is trimmed from the token.  Quoted identifiers keep
//! their quotes so canonicalization can strip them uniformly.

use std::str::CharIndices;

use lazy_static::lazy_static;
use unicode_xid::UnicodeXID;

use self::Token::*;
use crate::common::ErrorCode::*;
use crate::common::{EquationError, ErrorCode};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Token<'input> {
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
    DataEq,   // :=
    Equiv,    // <->
    MapArrow, // ->
    Ident(&'input str),
    Literal(&'input str), // single-quoted 'literal', quotes stripped
    Num(&'input str),
}

pub type Spanned<T> = (usize, T, usize);

fn error<T>(code: ErrorCode, start: usize, end: usize) -> Result<T, EquationError> {
    Err(EquationError {
        start: start as u16,
        end: end as u16,
        code,
    })
}

pub struct Lexer<'input> {
    text: &'input str,
    chars: CharIndices<'input>,
    lookahead: Option<(usize, char)>,
    // restores lookahead state after a failed colon-keyword scan (LIFO)
    pushback: Vec<(usize, char)>,
}

const COLON_KEYWORDS: &[(&str, Token<'static>)] = &[("AND", And), ("OR", Or), ("NOT", Not)];

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        let mut t = Lexer {
            text: input,
            chars: input.char_indices(),
            lookahead: None,
            pushback: Vec::new(),
        };
        t.bump();
        t
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.lookahead = match self.pushback.pop() {
            Some(c) => Some(c),
            None => self.chars.next(),
        };
        self.lookahead
    }

    fn push_back(&mut self, pos: usize, ch: char) {
        if let Some(la) = self.lookahead.take() {
            self.pushback.push(la);
        }
        self.lookahead = Some((pos, ch));
    }

    fn take_until<F>(&mut self, mut terminate: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        loop {
            match self.lookahead {
                None => {
                    return None;
                }
                Some((idx1, c)) => {
                    if terminate(c) {
                        return Some(idx1);
                    } else {
                        self.bump();
                    }
                }
            }
        }
    }

    fn identifierish(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        let end = match self.take_until(|c| !is_identifier_continue(c)) {
            Some(end) => end,
            None => self.text.len(),
        };
        let word = self.text[idx0..end].trim_end();
        (idx0, Ident(word), idx0 + word.len())
    }

    fn number(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        use regex::{Match, Regex};

        lazy_static! {
            static ref NUMBER_RE: Regex =
                Regex::new(r"^\d*(\.\d*)?([eE][-+]?\d+)?").unwrap();
        }

        let m: Match = NUMBER_RE.find(&self.text[idx0..]).unwrap();
        for _ in 0..m.end() {
            self.bump();
        }

        let end = idx0 + m.end();
        (idx0, Num(&self.text[idx0..end]), end)
    }

    fn quoted_identifier(&mut self, idx0: usize) -> Result<Spanned<Token<'input>>, EquationError> {
        // eat the opening '"'
        self.bump();

        match self.take_until(|c| c == '"') {
            Some(idx1) => {
                self.bump();
                Ok((idx0, Ident(&self.text[idx0..idx1 + 1]), idx1 + 1))
            }
            None => error(UnclosedQuotedIdent, idx0, self.text.len()),
        }
    }

    fn literal(&mut self, idx0: usize) -> Result<Spanned<Token<'input>>, EquationError> {
        // eat the opening '\''
        self.bump();

        match self.take_until(|c| c == '\'') {
            Some(idx1) => {
                self.bump();
                Ok((idx0, Literal(&self.text[idx0 + 1..idx1]), idx1 + 1))
            }
            None => error(UnclosedLiteral, idx0, self.text.len()),
        }
    }

    fn comment_end(&mut self, idx0: usize) -> Result<(), EquationError> {
        match self.take_until(|c| c == '}') {
            Some(_) => {
                self.bump();
                Ok(())
            }
            None => error(UnclosedComment, idx0, self.text.len()),
        }
    }

    /// After consuming `:`, decide between `:=`, a `:AND:`-style keyword, and
    /// a plain colon.  A failed keyword scan pushes the consumed characters
    /// back so subscript-range colons lex unharmed.
    fn colon(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        match self.lookahead {
            Some((_, '=')) => {
                self.bump();
                (idx0, DataEq, idx0 + 2)
            }
            Some((_, c)) if c.is_ascii_alphabetic() => {
                let mut scanned: Vec<(usize, char)> = Vec::new();
                while let Some((i, c)) = self.lookahead {
                    if c.is_ascii_alphabetic() && scanned.len() < 8 {
                        scanned.push((i, c));
                        self.bump();
                    } else {
                        break;
                    }
                }
                let word: String = scanned.iter().map(|(_, c)| c.to_ascii_uppercase()).collect();
                let keyword = match self.lookahead {
                    Some((_, ':')) => COLON_KEYWORDS
                        .iter()
                        .find(|&&(w, _)| w == word)
                        .map(|&(_, t)| t),
                    _ => None,
                };
                match keyword {
                    Some(tok) => {
                        let (close, _) = self.lookahead.unwrap();
                        self.bump();
                        (idx0, tok, close + 1)
                    }
                    None => {
                        for &(i, c) in scanned.iter().rev() {
                            self.push_back(i, c);
                        }
                        (idx0, Colon, idx0 + 1)
                    }
                }
            }
            _ => (idx0, Colon, idx0 + 1),
        }
    }

    fn consume(
        &mut self,
        i: usize,
        tok: Token<'input>,
        len: usize,
    ) -> Option<Result<Spanned<Token<'input>>, EquationError>> {
        self.bump();
        Some(Ok((i, tok, i + len)))
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Spanned<Token<'input>>, EquationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            return match self.lookahead {
                Some((i, '+')) => self.consume(i, Plus, 1),
                Some((i, '*')) => self.consume(i, Mul, 1),
                Some((i, '/')) => self.consume(i, Div, 1),
                Some((i, '^')) => self.consume(i, Exp, 1),
                Some((i, '=')) => self.consume(i, Eq, 1),
                Some((i, '(')) => self.consume(i, LParen, 1),
                Some((i, ')')) => self.consume(i, RParen, 1),
                Some((i, '[')) => self.consume(i, LBracket, 1),
                Some((i, ']')) => self.consume(i, RBracket, 1),
                Some((i, ',')) => self.consume(i, Comma, 1),
                Some((i, '!')) => self.consume(i, Bang, 1),
                Some((i, '-')) => match self.bump() {
                    Some((_, '>')) => self.consume(i, MapArrow, 2),
                    _ => Some(Ok((i, Minus, i + 1))),
                },
                Some((i, '<')) => match self.bump() {
                    Some((_, '=')) => self.consume(i, Lte, 2),
                    Some((_, '>')) => self.consume(i, Neq, 2),
                    Some((j, '-')) => match self.bump() {
                        Some((_, '>')) => self.consume(i, Equiv, 3),
                        _ => {
                            self.push_back(j, '-');
                            Some(Ok((i, Lt, i + 1)))
                        }
                    },
                    _ => Some(Ok((i, Lt, i + 1))),
                },
                Some((i, '>')) => match self.bump() {
                    Some((_, '=')) => self.consume(i, Gte, 2),
                    _ => Some(Ok((i, Gt, i + 1))),
                },
                Some((i, ':')) => {
                    self.bump();
                    Some(Ok(self.colon(i)))
                }
                Some((i, '{')) => {
                    self.bump();
                    match self.comment_end(i) {
                        Ok(()) => continue,
                        Err(err) => Some(Err(err)),
                    }
                }
                Some((i, '"')) => Some(self.quoted_identifier(i)),
                Some((i, '\'')) => Some(self.literal(i)),
                Some((i, c)) if is_identifier_start(c) => Some(Ok(self.identifierish(i))),
                Some((i, c)) if is_number_start(c) => Some(Ok(self.number(i))),
                Some((_, c)) if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                Some((i, _)) => {
                    self.bump();
                    let end = match self.lookahead {
                        Some((end, _)) => end,
                        None => self.text.len(),
                    };
                    Some(error(UnrecognizedToken, i, end))
                }
                None => None,
            };
        }
    }
}

fn is_number_start(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

fn is_identifier_start(c: char) -> bool {
    UnicodeXID::is_xid_start(c) || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    UnicodeXID::is_xid_continue(c) || c == ' ' || c == '\t' || c == '.' || c == '$'
}
