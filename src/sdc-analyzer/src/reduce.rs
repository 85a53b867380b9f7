// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Algebraic reduction of right-hand sides, gated by configuration.
//!
//! `default` folds literal arithmetic and identity operations; `aggressive`
//! additionally inlines the values of non-input constant variables.  Folded
//! subexpressions are recorded in the constant-expression cache.

use std::collections::HashMap;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::common::{Ident, canonicalize};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ReduceMode {
    #[default]
    Default,
    Aggressive,
    Off,
}

/// Render a folded value the way a modeler would have written it.
pub(crate) fn format_number(n: f64) -> String {
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Reduce an expression, treating input variables as opaque.  `const_values`
/// maps canonical names of non-input `const` variables to their values and is
/// only consulted in aggressive mode.
pub(crate) fn reduce_expr(
    expr: &Expr,
    mode: ReduceMode,
    const_values: &HashMap<Ident, f64>,
    cache: &mut HashMap<String, f64>,
) -> Expr {
    if mode == ReduceMode::Off {
        return expr.clone();
    }

    match expr {
        Expr::Const(_, _) | Expr::Str(_) | Expr::Subscript(_, _) | Expr::Lookup(_) => expr.clone(),
        Expr::Var(name) => {
            if mode == ReduceMode::Aggressive {
                if let Some(&value) = const_values.get(&canonicalize(name)) {
                    return Expr::Const(format_number(value), value);
                }
            }
            expr.clone()
        }
        Expr::Op1(op, e) => {
            let e = reduce_expr(e, mode, const_values, cache);
            match (op, e.literal_value()) {
                (UnaryOp::Negative, Some(n)) => Expr::Const(format_number(-n), -n),
                (UnaryOp::Positive, _) => e,
                _ => Expr::Op1(*op, Box::new(e)),
            }
        }
        Expr::Op2(op, l, r) => {
            let l = reduce_expr(l, mode, const_values, cache);
            let r = reduce_expr(r, mode, const_values, cache);
            reduce_op2(*op, l, r, cache)
        }
        Expr::App(name, args) => {
            let args: Vec<Expr> = args
                .iter()
                .map(|a| reduce_expr(a, mode, const_values, cache))
                .collect();
            if mode == ReduceMode::Aggressive {
                if let Some(value) = fold_pure_fn(name, &args) {
                    let folded = Expr::App(name.clone(), args);
                    cache.insert(format!("{}", folded), value);
                    return Expr::Const(format_number(value), value);
                }
            }
            Expr::App(name.clone(), args)
        }
    }
}

fn reduce_op2(op: BinaryOp, l: Expr, r: Expr, cache: &mut HashMap<String, f64>) -> Expr {
    if let (Some(a), Some(b)) = (l.literal_value(), r.literal_value()) {
        let value = match op {
            BinaryOp::Add => Some(a + b),
            BinaryOp::Sub => Some(a - b),
            BinaryOp::Mul => Some(a * b),
            BinaryOp::Div if b != 0.0 => Some(a / b),
            BinaryOp::Exp => Some(a.powf(b)),
            _ => None,
        };
        if let Some(value) = value {
            let original = Expr::Op2(op, Box::new(l), Box::new(r));
            cache.insert(format!("{}", original), value);
            return Expr::Const(format_number(value), value);
        }
        return Expr::Op2(op, Box::new(l), Box::new(r));
    }

    // identity operations with one side opaque
    let l_val = l.literal_value();
    let r_val = r.literal_value();
    match (op, l_val, r_val) {
        (BinaryOp::Mul, _, Some(n)) if n == 1.0 => l,
        (BinaryOp::Mul, Some(n), _) if n == 1.0 => r,
        (BinaryOp::Mul, _, Some(n)) if n == 0.0 => Expr::Const("0".to_string(), 0.0),
        (BinaryOp::Mul, Some(n), _) if n == 0.0 => Expr::Const("0".to_string(), 0.0),
        (BinaryOp::Div, _, Some(n)) if n == 1.0 => l,
        (BinaryOp::Add, _, Some(n)) if n == 0.0 => l,
        (BinaryOp::Add, Some(n), _) if n == 0.0 => r,
        (BinaryOp::Sub, _, Some(n)) if n == 0.0 => l,
        (BinaryOp::Exp, _, Some(n)) if n == 1.0 => l,
        _ => Expr::Op2(op, Box::new(l), Box::new(r)),
    }
}

fn fold_pure_fn(name: &str, args: &[Expr]) -> Option<f64> {
    let values: Option<Vec<f64>> = args.iter().map(|a| a.literal_value()).collect();
    let values = values?;
    match (canonicalize(name).as_str(), values.as_slice()) {
        ("_abs", [x]) => Some(x.abs()),
        ("_sqrt", [x]) => Some(x.sqrt()),
        ("_exp", [x]) => Some(x.exp()),
        ("_ln", [x]) if *x > 0.0 => Some(x.ln()),
        ("_integer", [x]) => Some(x.trunc()),
        ("_min", [x, y]) => Some(x.min(*y)),
        ("_max", [x, y]) => Some(x.max(*y)),
        ("_power", [x, y]) => Some(x.powf(*y)),
        ("_modulo", [x, y]) if *y != 0.0 => Some(x % y),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::datamodel::{ModelEntry, Rhs};
    use crate::parser::parse_entry;

    fn rhs(text: &str) -> Expr {
        match parse_entry(text).expect("parse error") {
            ModelEntry::Equation(eq) => match eq.rhs {
                Rhs::Expr(e) => e,
                other => panic!("expected expr, got {:?}", other),
            },
            other => panic!("expected equation, got {:?}", other),
        }
    }

    fn reduce(text: &str, mode: ReduceMode) -> (Expr, HashMap<String, f64>) {
        let mut cache = HashMap::new();
        let consts: HashMap<Ident, f64> =
            [("_k".to_string(), 4.0)].into_iter().collect();
        let reduced = reduce_expr(&rhs(text), mode, &consts, &mut cache);
        (reduced, cache)
    }

    #[test]
    fn test_literal_folding() {
        let (e, cache) = reduce("x = 1 + 2 * 3", ReduceMode::Default);
        assert_eq!(Expr::Const("7".to_string(), 7.0), e);
        assert_eq!(Some(&6.0), cache.get("2*3"));
        assert_eq!(Some(&7.0), cache.get("1+6"));
    }

    #[test]
    fn test_identities() {
        let (e, _) = reduce("x = a * 1 + 0", ReduceMode::Default);
        assert_eq!(Expr::Var("a".to_string()), e);
        let (e, _) = reduce("x = 0 * a", ReduceMode::Default);
        assert_eq!(Expr::Const("0".to_string(), 0.0), e);
        let (e, _) = reduce("x = a / 1", ReduceMode::Default);
        assert_eq!(Expr::Var("a".to_string()), e);
    }

    #[test]
    fn test_division_by_zero_left_alone() {
        let (e, cache) = reduce("x = 1 / 0", ReduceMode::Default);
        assert!(matches!(e, Expr::Op2(BinaryOp::Div, _, _)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_default_keeps_vars_opaque() {
        let (e, _) = reduce("x = k + 1", ReduceMode::Default);
        assert!(matches!(e, Expr::Op2(BinaryOp::Add, _, _)));
    }

    #[test]
    fn test_aggressive_inlines_consts() {
        let (e, _) = reduce("x = k + 1", ReduceMode::Aggressive);
        assert_eq!(Expr::Const("5".to_string(), 5.0), e);
    }

    #[test]
    fn test_aggressive_folds_pure_fns() {
        let (e, _) = reduce("x = MIN(3, k)", ReduceMode::Aggressive);
        assert_eq!(Expr::Const("3".to_string(), 3.0), e);
    }

    #[test]
    fn test_off_is_identity() {
        let (e, cache) = reduce("x = 1 + 2", ReduceMode::Off);
        assert!(matches!(e, Expr::Op2(BinaryOp::Add, _, _)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_negative_fold() {
        let (e, _) = reduce("x = -(3)", ReduceMode::Default);
        assert_eq!(Expr::Const("-3".to_string(), -3.0), e);
    }

    #[test]
    fn test_format_number() {
        assert_eq!("7", format_number(7.0));
        assert_eq!("-3", format_number(-3.0));
        assert_eq!("2.5", format_number(2.5));
    }
}
