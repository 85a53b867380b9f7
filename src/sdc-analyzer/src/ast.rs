// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Expression AST for equation right-hand sides.
//!
//! Identifiers are kept in source form; canonicalization happens when
//! equations are read into the variable table.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnaryOp {
    Positive,
    Negative,
    Not,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
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
}

impl BinaryOp {
    fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Exp => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Eq => "=",
            BinaryOp::Neq => "<>",
            BinaryOp::And => ":AND:",
            BinaryOp::Or => ":OR:",
        }
    }
}

/// An inline lookup table: ordered `(x, y)` points with an optional
/// `[(x0,y0)-(x1,y1)]` range prefix.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct LookupTable {
    pub points: Vec<(f64, f64)>,
    pub range: Option<((f64, f64), (f64, f64))>,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Expr {
    Const(String, f64),
    Var(String),
    /// A single-quoted string argument, as in `GET DIRECT DATA('?data', ...)`.
    Str(String),
    Subscript(String, Vec<String>),
    App(String, Vec<Expr>),
    Lookup(LookupTable),
    Op1(UnaryOp, Box<Expr>),
    Op2(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// True for a bare numeric literal, including a sign-prefixed one.
    pub fn is_literal(&self) -> bool {
        match self {
            Expr::Const(_, _) => true,
            Expr::Op1(UnaryOp::Negative, e) | Expr::Op1(UnaryOp::Positive, e) => {
                matches!(**e, Expr::Const(_, _))
            }
            _ => false,
        }
    }

    /// Numeric value of a literal expression, if it is one.
    pub fn literal_value(&self) -> Option<f64> {
        match self {
            Expr::Const(_, n) => Some(*n),
            Expr::Op1(UnaryOp::Negative, e) => e.literal_value().map(|n| -n),
            Expr::Op1(UnaryOp::Positive, e) => e.literal_value(),
            _ => None,
        }
    }
}

fn fmt_operand(f: &mut fmt::Formatter, e: &Expr) -> fmt::Result {
    match e {
        Expr::Op1(_, _) | Expr::Op2(_, _, _) => write!(f, "({})", e),
        _ => write!(f, "{}", e),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Const(s, _) => write!(f, "{}", s),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Str(s) => write!(f, "'{}'", s),
            Expr::Subscript(name, subs) => write!(f, "{}[{}]", name, subs.join(",")),
            Expr::App(func, args) => {
                write!(f, "{}(", func)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Lookup(table) => {
                write!(f, "(")?;
                for (i, (x, y)) in table.points.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "({},{})", x, y)?;
                }
                write!(f, ")")
            }
            Expr::Op1(op, e) => {
                let op = match op {
                    UnaryOp::Positive => "+",
                    UnaryOp::Negative => "-",
                    UnaryOp::Not => ":NOT:",
                };
                write!(f, "{}", op)?;
                fmt_operand(f, e)
            }
            Expr::Op2(op, l, r) => {
                fmt_operand(f, l)?;
                write!(f, "{}", op.as_str())?;
                fmt_operand(f, r)
            }
        }
    }
}
