// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The equation reader: classifies each variable's role from its right-hand
//! side and accumulates its reference and init-reference sets.

use std::collections::HashMap;

use crate::ast::Expr;
use crate::common::{Ident, canonicalize, canonicalize_function_name};
use crate::datamodel::Rhs;
use crate::model::resolve_reference;
use crate::reduce::{ReduceMode, reduce_expr};
use crate::subscript::SubscriptTable;
use crate::variable::{VarType, Variable, VariableTable};

/// Integration intrinsics whose use makes the declaring variable a `level`.
const LEVEL_FNS: &[&str] = &[
    "__integ",
    "__active_initial",
    "__delay_fixed",
    "__delay1",
    "__delay1i",
    "__delay3",
    "__delay3i",
    "__smooth",
    "__smoothi",
    "__smooth3",
    "__smooth3i",
    "__trend",
];

/// Intrinsics whose last argument is an explicit initial expression.
const EXPLICIT_INIT_FNS: &[&str] = &[
    "__integ",
    "__active_initial",
    "__delay_fixed",
    "__delay1i",
    "__delay3i",
    "__smoothi",
    "__smooth3i",
    "__trend",
];

/// Intrinsics with no initial argument: the initial value derives from the
/// normal arguments, so those double as init dependencies.
const IMPLICIT_INIT_FNS: &[&str] = &["__delay1", "__delay3", "__smooth", "__smooth3"];

/// What one equation-reading pass learned about a variable.
#[derive(Clone, PartialEq, Debug)]
pub(crate) struct ReadOutcome {
    pub var_type: VarType,
    pub has_init_value: bool,
    pub references: Vec<Ident>,
    pub init_references: Vec<Ident>,
    pub referenced_lookup_var_names: Vec<Ident>,
    pub referenced_function_names: Vec<Ident>,
    pub points: Option<Vec<(f64, f64)>>,
}

pub(crate) fn read_equation(
    var: &Variable,
    subs: &SubscriptTable,
    vars: &VariableTable,
    expansion: &HashMap<Ident, Vec<bool>>,
    mode: ReduceMode,
    const_values: &HashMap<Ident, f64>,
    cache: &mut HashMap<String, f64>,
) -> ReadOutcome {
    let expr = match &var.rhs {
        Rhs::Expr(e) => e,
        // lookups, data variables, and constant-list variants were fully
        // classified by the variable reader
        _ => {
            return ReadOutcome {
                var_type: var.var_type,
                has_init_value: var.has_init_value,
                references: var.references.clone(),
                init_references: var.init_references.clone(),
                referenced_lookup_var_names: var.referenced_lookup_var_names.clone(),
                referenced_function_names: var.referenced_function_names.clone(),
                points: None,
            };
        }
    };

    let reduced = reduce_expr(expr, mode, const_values, cache);

    let mut walker = Walker {
        subs,
        vars,
        expansion,
        var,
        in_init: false,
        is_level: false,
        has_init_value: false,
        references: vec![],
        init_references: vec![],
        referenced_lookup_var_names: vec![],
        referenced_function_names: vec![],
        points: None,
    };
    walker.walk(&reduced);

    let var_type = match var.var_type {
        // data from GET DIRECT DATA keeps its classification
        VarType::Data => VarType::Data,
        _ if walker.is_level => VarType::Level,
        _ if reduced.is_literal() => VarType::Const,
        _ => VarType::Aux,
    };

    ReadOutcome {
        var_type,
        has_init_value: walker.has_init_value,
        references: walker.references,
        init_references: walker.init_references,
        referenced_lookup_var_names: walker.referenced_lookup_var_names,
        referenced_function_names: walker.referenced_function_names,
        points: walker.points,
    }
}

struct Walker<'a> {
    subs: &'a SubscriptTable,
    vars: &'a VariableTable,
    expansion: &'a HashMap<Ident, Vec<bool>>,
    var: &'a Variable,
    in_init: bool,
    is_level: bool,
    has_init_value: bool,
    references: Vec<Ident>,
    init_references: Vec<Ident>,
    referenced_lookup_var_names: Vec<Ident>,
    referenced_function_names: Vec<Ident>,
    points: Option<Vec<(f64, f64)>>,
}

impl Walker<'_> {
    fn walk(&mut self, e: &Expr) {
        match e {
            Expr::Const(_, _) | Expr::Str(_) | Expr::Lookup(_) => {}
            Expr::Var(name) => self.add_ref(canonicalize(name), &[]),
            Expr::Subscript(name, toks) => {
                let ref_subs: Vec<Ident> = toks.iter().map(|t| canonicalize(t)).collect();
                self.add_ref(canonicalize(name), &ref_subs);
            }
            Expr::Op1(_, e) => self.walk(e),
            Expr::Op2(_, l, r) => {
                self.walk(l);
                self.walk(r);
            }
            Expr::App(name, args) => self.walk_app(name, args),
        }
    }

    fn walk_app(&mut self, name: &str, args: &[Expr]) {
        let fname = canonicalize_function_name(name);
        if !self.referenced_function_names.contains(&fname) {
            self.referenced_function_names.push(fname.clone());
        }

        // a lookup variable called as a function
        let cname = canonicalize(name);
        let is_lookup_call = matches!(
            self.vars.var_with_name(&cname).map(|v| v.var_type),
            Some(VarType::Lookup)
        );
        if is_lookup_call && !self.referenced_lookup_var_names.contains(&cname) {
            self.referenced_lookup_var_names.push(cname);
        }

        if LEVEL_FNS.contains(&fname.as_str()) {
            self.is_level = true;
            self.has_init_value = true;
        }

        match fname.as_str() {
            "__initial" => {
                self.has_init_value = true;
                self.walk_args_init(args);
            }
            "__with_lookup" => {
                if let Some(arg) = args.first() {
                    self.walk(arg);
                }
                if let Some(Expr::Lookup(table)) = args.get(1) {
                    self.points = Some(table.points.clone());
                }
            }
            "__get_direct_data" | "__get_direct_constants" => {}
            _ if EXPLICIT_INIT_FNS.contains(&fname.as_str()) && args.len() >= 2 => {
                let (init, rest) = args.split_last().unwrap();
                for arg in rest {
                    self.walk(arg);
                }
                self.walk_args_init(std::slice::from_ref(init));
            }
            _ if IMPLICIT_INIT_FNS.contains(&fname.as_str()) => {
                for arg in args {
                    self.walk(arg);
                }
                self.walk_args_init(args);
            }
            _ => {
                for arg in args {
                    self.walk(arg);
                }
            }
        }
    }

    fn walk_args_init(&mut self, args: &[Expr]) {
        let saved = self.in_init;
        self.in_init = true;
        for arg in args {
            self.walk(arg);
        }
        self.in_init = saved;
    }

    fn add_ref(&mut self, cname: Ident, ref_subs: &[Ident]) {
        // bare dimension and index names are not variable references
        if self.subs.sub(&cname).is_some() {
            return;
        }
        let ref_ids = resolve_reference(
            self.vars,
            self.subs,
            self.expansion,
            &cname,
            ref_subs,
            Some(self.var),
        );
        let list = if self.in_init {
            &mut self.init_references
        } else {
            &mut self.references
        };
        for id in ref_ids {
            if !list.contains(&id) {
                list.push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::{DimensionDef, DirectData, ModelEntry};
    use crate::parser::parse_entry;
    use crate::read::VariableReader;
    use crate::variable::VariableTable;

    fn setup(lines: &[&str]) -> (SubscriptTable, VariableTable) {
        let mut dims: Vec<DimensionDef> = vec![];
        let mut vars = VariableTable::new();
        let mut eqs = vec![];
        for line in lines {
            match parse_entry(line).expect("parse error") {
                ModelEntry::Dimension(d) => dims.push(d),
                ModelEntry::Equation(eq) => eqs.push(eq),
            }
        }
        let mut subs = SubscriptTable::new();
        let refs: Vec<&DimensionDef> = dims.iter().collect();
        subs.resolve(&refs, &HashMap::new(), None).unwrap();

        let direct = DirectData::new();
        let separation = HashMap::new();
        let reader = VariableReader {
            subs: &subs,
            separation_dims: &separation,
            direct_data: &direct,
        };
        for eq in &eqs {
            for v in reader.read_equation(eq).unwrap() {
                vars.add(v);
            }
        }
        vars.rebuild_ref_ids();
        (subs, vars)
    }

    fn outcome_of(subs: &SubscriptTable, vars: &VariableTable, name: &str) -> ReadOutcome {
        let var = vars.var_with_name(name).expect("missing var");
        let mut cache = HashMap::new();
        read_equation(
            var,
            subs,
            vars,
            &HashMap::new(),
            ReduceMode::Default,
            &HashMap::new(),
            &mut cache,
        )
    }

    #[test]
    fn test_const_classification() {
        let (subs, vars) = setup(&["a = 1", "b = a + 2"]);
        assert_eq!(VarType::Const, outcome_of(&subs, &vars, "_a").var_type);
        let b = outcome_of(&subs, &vars, "_b");
        assert_eq!(VarType::Aux, b.var_type);
        assert_eq!(vec!["_a"], b.references);
    }

    #[test]
    fn test_level_classification_and_init_routing() {
        let (subs, vars) = setup(&["s = INTEG(flow, s0)", "flow = 2", "s0 = 5"]);
        let s = outcome_of(&subs, &vars, "_s");
        assert_eq!(VarType::Level, s.var_type);
        assert!(s.has_init_value);
        assert_eq!(vec!["_flow"], s.references);
        assert_eq!(vec!["_s0"], s.init_references);
        assert!(s.referenced_function_names.contains(&"__integ".to_string()));
    }

    #[test]
    fn test_active_initial() {
        let (subs, vars) = setup(&["x = ACTIVE INITIAL(a + b, c)", "a = 1", "b = 2", "c = 3"]);
        let x = outcome_of(&subs, &vars, "_x");
        assert_eq!(VarType::Level, x.var_type);
        assert_eq!(vec!["_a", "_b"], x.references);
        assert_eq!(vec!["_c"], x.init_references);
    }

    #[test]
    fn test_smooth_without_init_arg() {
        let (subs, vars) = setup(&["y = SMOOTH(input, tau)", "input = 1", "tau = 4"]);
        let y = outcome_of(&subs, &vars, "_y");
        assert_eq!(VarType::Level, y.var_type);
        assert!(y.has_init_value);
        assert_eq!(vec!["_input", "_tau"], y.references);
        assert_eq!(vec!["_input", "_tau"], y.init_references);
    }

    #[test]
    fn test_initial_keeps_aux() {
        let (subs, vars) = setup(&["x = INITIAL(a)", "a = 1"]);
        let x = outcome_of(&subs, &vars, "_x");
        assert_eq!(VarType::Aux, x.var_type);
        assert!(x.has_init_value);
        assert!(x.references.is_empty());
        assert_eq!(vec!["_a"], x.init_references);
    }

    #[test]
    fn test_with_lookup_points() {
        let (subs, vars) = setup(&["g = WITH LOOKUP(Time, ((0,100),(1,110)))", "Time = 0"]);
        let g = outcome_of(&subs, &vars, "_g");
        assert_eq!(VarType::Aux, g.var_type);
        assert_eq!(vec!["_time"], g.references);
        assert_eq!(Some(vec![(0.0, 100.0), (1.0, 110.0)]), g.points);
    }

    #[test]
    fn test_lookup_call_recorded_not_referenced() {
        let (subs, vars) = setup(&["t( (0,0), (1,1) )", "y = t(x)", "x = 1"]);
        let y = outcome_of(&subs, &vars, "_y");
        assert_eq!(vec!["_x"], y.references);
        assert_eq!(vec!["_t"], y.referenced_lookup_var_names);
        assert!(y.referenced_function_names.contains(&"__t".to_string()));
    }

    #[test]
    fn test_dimension_names_are_not_references() {
        let (subs, vars) = setup(&["DimA: a1, a2", "x[DimA] = 10", "y[DimA] = x[DimA] + 1"]);
        let y = outcome_of(&subs, &vars, "_y");
        assert_eq!(vec!["_x"], y.references);
    }
}
