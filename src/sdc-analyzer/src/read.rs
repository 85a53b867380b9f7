// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The variable reader: walks equation definitions and produces one
//! `Variable` record per equation head, one per index for separated arrays,
//! with lookup tables, constant lists, and data declarations recognized up
//! front.

use std::collections::HashMap;

use log::warn;

use crate::ast::Expr;
use crate::common::{Ident, Result, canonicalize, var_detail};
use crate::datamodel::{DirectData, EquationDef, ParsedModel, Rhs};
use crate::subscript::{Subscript, SubscriptTable};
use crate::var_err;
use crate::variable::{VarType, Variable};

pub(crate) struct VariableReader<'a> {
    pub subs: &'a SubscriptTable,
    /// Canonical variable name to the canonical dimension to split on.
    pub separation_dims: &'a HashMap<Ident, Ident>,
    pub direct_data: &'a DirectData,
}

impl<'a> VariableReader<'a> {
    pub fn read_model(&self, parsed: &ParsedModel) -> Result<Vec<Variable>> {
        let mut vars = Vec::new();
        for eq in parsed.equation_defs() {
            vars.extend(self.read_equation(eq)?);
        }
        Ok(vars)
    }

    /// One record per equation head; separated arrays get one record per
    /// index of the separation dimension.
    pub fn read_equation(&self, eq: &EquationDef) -> Result<Vec<Variable>> {
        let var_name = canonicalize(&eq.lhs.var_name);

        let subscripts: Vec<Ident> = eq.lhs.subscripts.iter().map(|s| canonicalize(s)).collect();
        for sub in &subscripts {
            if self.subs.sub(sub).is_none() {
                return var_err!(
                    UnknownSubscript,
                    format!("{} in {}", var_detail(sub), var_detail(&var_name))
                );
            }
        }
        let subscripts = self.subs.normal_order(&subscripts);

        let mut base = Variable::new(var_name.clone());
        base.model_lhs = eq.model_lhs.clone();
        base.model_formula = eq.model_formula.clone();
        base.subscripts = subscripts;
        base.rhs = eq.rhs.clone();

        match &eq.rhs {
            Rhs::Lookup(table) => {
                base.var_type = VarType::Lookup;
                base.points = table.points.clone();
            }
            Rhs::Empty => {
                base.var_type = VarType::Data;
            }
            Rhs::Expr(e) => {
                if let Some(points) = self.direct_data_points(&var_name, e) {
                    base.var_type = VarType::Data;
                    base.points = points;
                }
            }
            Rhs::ConstList(_) => {
                base.var_type = VarType::Const;
            }
        }

        if let Rhs::ConstList(values) = &eq.rhs {
            return self.separate_const_list(base, values);
        }

        if let Some(sep_dim) = self.separation_dims.get(&var_name) {
            if base.subscripts.contains(sep_dim) {
                return Ok(self.separate(base, sep_dim));
            }
        }

        Ok(vec![base])
    }

    /// Split a variable into one variant per index of `dim`.
    fn separate(&self, base: Variable, dim: &Ident) -> Vec<Variable> {
        let indices = match self.subs.dimension(dim) {
            Some(d) => d.value.clone(),
            None => return vec![base],
        };
        let pos = match base.subscripts.iter().position(|s| s == dim) {
            Some(pos) => pos,
            None => return vec![base],
        };

        indices
            .into_iter()
            .map(|index| {
                let mut v = base.clone();
                v.subscripts[pos] = index;
                v.separation_dims = vec![dim.clone()];
                v
            })
            .collect()
    }

    /// A constant list defines one `const` variable per index, with the
    /// matching literal as its formula.
    fn separate_const_list(
        &self,
        base: Variable,
        values: &[(String, f64)],
    ) -> Result<Vec<Variable>> {
        let dim = base.subscripts.iter().find_map(|s| match self.subs.sub(s) {
            Some(Subscript::Dimension(d)) => Some(d.name.clone()),
            _ => None,
        });

        let dim = match dim {
            Some(dim) => dim,
            None => {
                // a scalar head with a trailing list: first value wins
                warn!(
                    "constant list for scalar {}; using the first value",
                    var_detail(&base.var_name)
                );
                let mut v = base;
                v.model_formula = values[0].0.clone();
                return Ok(vec![v]);
            }
        };

        let variants = self.separate(base, &dim);
        if variants.len() != values.len() {
            return var_err!(
                BadConstList,
                format!(
                    "{}: {} values for {} indices",
                    var_detail(&variants[0].var_name),
                    values.len(),
                    variants.len()
                )
            );
        }
        Ok(variants
            .into_iter()
            .zip(values.iter())
            .map(|(mut v, (text, _))| {
                v.model_formula = text.clone();
                v
            })
            .collect())
    }

    /// `GET DIRECT DATA('?tag', ...)` classifies the variable as data and
    /// pulls its series from the direct-data map by tag and variable name.
    fn direct_data_points(&self, var_name: &Ident, e: &Expr) -> Option<Vec<(f64, f64)>> {
        let args = match e {
            Expr::App(name, args) if canonicalize(name) == "_get_direct_data" => args,
            _ => return None,
        };
        let tag = match args.first() {
            Some(Expr::Str(tag)) => tag,
            _ => {
                warn!(
                    "GET DIRECT DATA for {} has no dataset tag",
                    var_detail(var_name)
                );
                return Some(vec![]);
            }
        };
        match self.direct_data.get(tag).and_then(|t| t.get(var_name)) {
            Some(points) => Some(points.clone()),
            None => {
                warn!(
                    "no direct data for {} under tag {}",
                    var_detail(var_name),
                    tag
                );
                Some(vec![])
            }
        }
    }
}
