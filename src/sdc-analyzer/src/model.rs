// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The analyzer context: owns the subscript and variable tables, drives the
//! reading pipeline, and resolves references between variables.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use log::warn;

use crate::common::{
    Error, Ident, Result, canonicalize, decanonicalize, var_detail,
};
use crate::datamodel::{
    DirectData, ExtData, ModelEntry, ParsedModel, Rhs, Spec, base_var_name,
};
use crate::equation::{ReadOutcome, read_equation};
use crate::model_err;
use crate::parser::parse_entry;
use crate::read::VariableReader;
use crate::reduce::ReduceMode;
use crate::subscript::SubscriptTable;
use crate::var_err;
use crate::variable::{VarType, Variable, VariableTable};

#[derive(Clone, Debug, Default)]
pub struct Options {
    pub reduce: ReduceMode,
    /// Directory holding the model, so direct-subscript reads can find
    /// sibling files.
    pub model_dir: Option<PathBuf>,
}

/// The analyzer. One instance per compilation; `reset` clears everything a
/// re-read repopulates so one process can run many compilations.
#[derive(Clone, Debug, Default)]
pub struct Analyzer {
    pub(crate) options: Options,
    pub(crate) subscripts: SubscriptTable,
    pub(crate) vars: VariableTable,
    pub(crate) spec: Spec,
    pub(crate) ext_data: ExtData,
    pub(crate) direct_data: DirectData,
    pub(crate) const_cache: HashMap<String, f64>,
    pub(crate) expansion_flags: HashMap<Ident, Vec<bool>>,
}

impl Analyzer {
    pub fn new(options: Options) -> Analyzer {
        Analyzer {
            options,
            ..Default::default()
        }
    }

    /// Clear the variable list, by-name map, constant-expression cache, and
    /// the non-apply-to-all set.  The dimension table is left alone; it is
    /// reset by re-running resolution on the next read.
    pub fn reset(&mut self) {
        self.vars.clear();
        self.const_cache.clear();
        self.expansion_flags.clear();
    }

    /// Run the full analysis pipeline over a parsed model.
    pub fn read(
        &mut self,
        parsed: &ParsedModel,
        spec: Spec,
        ext_data: ExtData,
        direct_data: DirectData,
    ) -> Result<()> {
        self.reset();
        self.spec = spec.normalize();
        self.ext_data = ext_data;
        self.direct_data = direct_data;

        let dim_defs = parsed.dimension_defs();
        self.subscripts.resolve(
            &dim_defs,
            &self.spec.dimension_families,
            self.options.model_dir.as_deref(),
        )?;

        {
            let reader = VariableReader {
                subs: &self.subscripts,
                separation_dims: &self.spec.special_separation_dims,
                direct_data: &self.direct_data,
            };
            let new_vars = reader.read_model(parsed)?;
            for v in new_vars {
                self.vars.add(v);
            }
        }

        // the time placeholder, added exactly once for either tree shape
        let mut time = Variable::new("_time".to_string());
        time.model_lhs = "Time".to_string();
        self.vars.add(time);

        self.analyze()
    }

    /// Parse an equation and push it through the same reader pipeline as
    /// ordinary equations.  Used for synthesized lookups, exposed for
    /// collaborators.
    pub fn add_equation(&mut self, text: &str) -> Result<()> {
        let entry = parse_entry(text).map_err(Error::from)?;
        let eq = match entry {
            ModelEntry::Equation(eq) => eq,
            ModelEntry::Dimension(_) => {
                return model_err!(Generic, format!("expected an equation: {}", text));
            }
        };
        let new_vars = {
            let reader = VariableReader {
                subs: &self.subscripts,
                separation_dims: &self.spec.special_separation_dims,
                direct_data: &self.direct_data,
            };
            reader.read_equation(&eq)?
        };
        for v in new_vars {
            self.vars.add(v);
        }
        self.detect_non_apply_to_all();
        self.assign_ref_ids();
        self.read_equations();
        Ok(())
    }

    fn analyze(&mut self) -> Result<()> {
        self.detect_non_apply_to_all();
        self.assign_ref_ids();
        self.read_equations();
        self.reconcile_duplicates()?;
        self.check_spec()?;
        self.eliminate_dead_code();
        self.vars.rebuild_ref_ids();
        self.validate_references()?;
        Ok(())
    }

    /// Compare subscripts position-wise across each name's variants; a
    /// position that differs anywhere makes the name non-apply-to-all.
    fn detect_non_apply_to_all(&mut self) {
        self.expansion_flags.clear();
        for name in self.vars.all_var_names() {
            let variants = self.vars.vars_with_name(&name);
            if variants.len() < 2 {
                continue;
            }
            let arity = variants[0].subscripts.len();
            if variants.iter().any(|v| v.subscripts.len() != arity) {
                // mismatched arity surfaces from duplicate reconciliation
                continue;
            }
            let mut flags = vec![false; arity];
            for (pos, flag) in flags.iter_mut().enumerate() {
                let first = &variants[0].subscripts[pos];
                if variants.iter().any(|v| &v.subscripts[pos] != first) {
                    *flag = true;
                }
            }
            if flags.iter().any(|&f| f) {
                self.expansion_flags.insert(name, flags);
            }
        }
    }

    fn assign_ref_ids(&mut self) {
        for i in 0..self.vars.len() {
            let apply_to_all = !self
                .expansion_flags
                .contains_key(&self.vars.get(i).var_name);
            let ref_id = self.vars.get(i).make_ref_id(apply_to_all);
            self.vars.get_mut(i).ref_id = ref_id;
        }
        self.vars.rebuild_ref_ids();
    }

    fn read_equations(&mut self) {
        let base_mode = match self.options.reduce {
            ReduceMode::Off => ReduceMode::Off,
            _ => ReduceMode::Default,
        };
        self.run_equation_pass(base_mode, &HashMap::new());

        if self.options.reduce == ReduceMode::Aggressive {
            let const_values = self.const_values_for_inlining();
            self.run_equation_pass(ReduceMode::Aggressive, &const_values);
        }
    }

    fn run_equation_pass(&mut self, mode: ReduceMode, const_values: &HashMap<Ident, f64>) {
        let mut outcomes: Vec<ReadOutcome> = Vec::with_capacity(self.vars.len());
        for i in 0..self.vars.len() {
            let outcome = read_equation(
                self.vars.get(i),
                &self.subscripts,
                &self.vars,
                &self.expansion_flags,
                mode,
                const_values,
                &mut self.const_cache,
            );
            outcomes.push(outcome);
        }
        for (i, out) in outcomes.into_iter().enumerate() {
            let v = self.vars.get_mut(i);
            v.var_type = out.var_type;
            v.has_init_value = out.has_init_value;
            v.references = out.references;
            v.init_references = out.init_references;
            v.referenced_lookup_var_names = out.referenced_lookup_var_names;
            v.referenced_function_names = out.referenced_function_names;
            if let Some(points) = out.points {
                v.points = points;
            }
        }
    }

    /// Values of single-variant, non-input constants, for aggressive
    /// inlining.
    fn const_values_for_inlining(&self) -> HashMap<Ident, f64> {
        let inputs: HashSet<&Ident> = self.spec.input_vars.iter().collect();
        let mut values = HashMap::new();
        for name in self.vars.all_var_names() {
            if inputs.contains(&name) {
                continue;
            }
            let variants = self.vars.vars_with_name(&name);
            if variants.len() != 1 || variants[0].var_type != VarType::Const {
                continue;
            }
            if let Some(value) = const_value(variants[0]) {
                values.insert(name, value);
            }
        }
        values
    }

    /// A variable declared both `const` and `data` becomes `data` backed by a
    /// flat two-point series at the constant's value.  Other same-ref-id
    /// collisions are fatal.
    fn reconcile_duplicates(&mut self) -> Result<()> {
        let mut promote: Vec<(usize, f64)> = Vec::new();
        let mut remove: HashSet<usize> = HashSet::new();

        for name in self.vars.all_var_names() {
            let idxs = self.vars.indices_with_name(&name).to_vec();
            if idxs.len() < 2 {
                continue;
            }
            let mut by_ref: BTreeMap<Ident, Vec<usize>> = BTreeMap::new();
            for &i in &idxs {
                by_ref
                    .entry(self.vars.get(i).ref_id.clone())
                    .or_default()
                    .push(i);
            }
            for (ref_id, group) in by_ref {
                if group.len() < 2 {
                    continue;
                }
                let const_idx = group
                    .iter()
                    .find(|&&i| self.vars.get(i).var_type == VarType::Const);
                let data_idx = group
                    .iter()
                    .find(|&&i| self.vars.get(i).var_type == VarType::Data);
                match (group.len(), const_idx, data_idx) {
                    (2, Some(&ci), Some(&di)) => {
                        let formula = self.vars.get(ci).model_formula.trim().to_string();
                        match formula.parse::<f64>() {
                            Ok(k) => {
                                promote.push((ci, k));
                                remove.insert(di);
                            }
                            Err(_) => {
                                warn!(
                                    "cannot promote {} to data: {} is not a number",
                                    var_detail(&name),
                                    formula
                                );
                            }
                        }
                    }
                    _ => {
                        let types: HashSet<VarType> =
                            group.iter().map(|&i| self.vars.get(i).var_type).collect();
                        if types.len() == 1 {
                            return var_err!(DuplicateVariable, var_detail(&ref_id));
                        }
                        return var_err!(TypeConflict, var_detail(&ref_id));
                    }
                }
            }
        }

        for (i, k) in promote {
            let v = self.vars.get_mut(i);
            v.var_type = VarType::Data;
            v.points = vec![(-1e308, k), (1e308, k)];
        }
        if !remove.is_empty() {
            let mut i = 0;
            self.vars.retain(|_| {
                let keep = !remove.contains(&i);
                i += 1;
                keep
            });
        }
        Ok(())
    }

    pub(crate) fn validate_references(&self) -> Result<()> {
        for v in self.vars.variables() {
            for r in v.references.iter().chain(v.init_references.iter()) {
                if self.var_with_ref_id(r).is_none() {
                    return var_err!(
                        UnknownReference,
                        format!("{} referenced by {}", r, var_detail(&v.var_name))
                    );
                }
            }
        }
        Ok(())
    }

    // -- query surface ----------------------------------------------------

    pub fn variables(&self) -> &[Variable] {
        self.vars.variables()
    }

    /// Sorted unique canonical variable names.
    pub fn var_names(&self) -> Vec<Ident> {
        self.vars.all_var_names()
    }

    pub fn vars_with_name(&self, name: &str) -> Vec<&Variable> {
        self.vars.vars_with_name(name)
    }

    pub fn var_with_name(&self, name: &str) -> Option<&Variable> {
        self.vars.var_with_name(name)
    }

    pub fn ref_ids_with_name(&self, name: &str) -> Vec<Ident> {
        self.vars.ref_ids_with_name(name)
    }

    /// Locate the variable a textual ref-id names, with subscript-aware
    /// matching for non-apply-to-all variants.
    pub fn var_with_ref_id(&self, ref_id: &str) -> Option<&Variable> {
        find_var_with_ref_id(&self.vars, &self.subscripts, ref_id)
    }

    pub fn subscript_table(&self) -> &SubscriptTable {
        &self.subscripts
    }

    pub fn expansion_flags(&self) -> &HashMap<Ident, Vec<bool>> {
        &self.expansion_flags
    }

    pub fn const_expr_cache(&self) -> &HashMap<String, f64> {
        &self.const_cache
    }

    /// Canonical form of a source name.
    pub fn c_name(&self, source_name: &str) -> Ident {
        canonicalize(source_name)
    }

    /// User-readable source form of a canonical name.
    pub fn vensim_name(&self, cname: &str) -> String {
        decanonicalize(cname)
    }
}

fn const_value(v: &Variable) -> Option<f64> {
    if let Ok(n) = v.model_formula.trim().parse::<f64>() {
        return Some(n);
    }
    match &v.rhs {
        Rhs::Expr(e) => e.literal_value(),
        _ => None,
    }
}

/// Resolve a reference from an equation into the ref-ids it names.  For
/// apply-to-all targets this is the bare name; for non-apply-to-all targets
/// every variant matching the (substituted) subscripts is returned, so a
/// dimension-subscripted read of a separated array depends on all of its
/// variants.  This is intentionally wider than [`find_var_with_ref_id`],
/// which maps one ref-id to at most one record.
pub(crate) fn resolve_reference(
    vars: &VariableTable,
    subs: &SubscriptTable,
    expansion: &HashMap<Ident, Vec<bool>>,
    target: &Ident,
    ref_subs: &[Ident],
    reader: Option<&Variable>,
) -> Vec<Ident> {
    if !expansion.contains_key(target) {
        return vec![target.clone()];
    }

    let mut effective = subs.normal_order(ref_subs);
    if let Some(reader) = reader {
        // inside a separated variant, references over the separated
        // dimension pin to this variant's own index
        for sub in effective.iter_mut() {
            let dim_family = match subs.dimension(sub) {
                Some(d) => d.family.clone(),
                None => continue,
            };
            for rsub in &reader.subscripts {
                if let Some(index) = subs.index(rsub) {
                    if index.family == dim_family {
                        *sub = rsub.clone();
                        break;
                    }
                }
            }
        }
    }

    let mut out = Vec::new();
    for v in vars.vars_with_name(target) {
        if matches_reference(subs, &v.subscripts, &effective) {
            out.push(v.ref_id.clone());
        }
    }
    if out.is_empty() {
        // leave a marker the final validation pass will reject
        if effective.is_empty() {
            vec![target.clone()]
        } else {
            vec![format!("{}[{}]", target, effective.join(","))]
        }
    } else {
        out
    }
}

/// Position-wise match of a definition's subscript pattern against a
/// reference's subscripts, in both containment directions: a reference over
/// a dimension matches every variant indexed within it.  Used only when
/// populating reference lists; ref-id lookup uses the stricter [`covers`].
fn matches_reference(subs: &SubscriptTable, def_subs: &[Ident], ref_subs: &[Ident]) -> bool {
    if def_subs.len() != ref_subs.len() {
        return false;
    }
    def_subs.iter().zip(ref_subs.iter()).all(|(d, r)| {
        if d == r {
            return true;
        }
        match (subs.dimension(d), subs.dimension(r)) {
            (Some(dim), None) => dim.value.contains(r),
            (None, Some(dim)) => dim.value.contains(d),
            _ => false,
        }
    })
}

/// Position-wise coverage of a reference by a definition pattern: equal
/// indices, equal dimensions, or a definition dimension containing the
/// reference index.  A definition index never covers a reference dimension.
fn covers(subs: &SubscriptTable, def_subs: &[Ident], ref_subs: &[Ident]) -> bool {
    if def_subs.len() != ref_subs.len() {
        return false;
    }
    def_subs.iter().zip(ref_subs.iter()).all(|(d, r)| {
        if d == r {
            return true;
        }
        match (subs.dimension(d), subs.dimension(r)) {
            (Some(dim), None) => dim.value.contains(r),
            _ => false,
        }
    })
}

/// Locate a variable by ref-id: exact match, then subscript-aware matching
/// among the base name's variants, then the apply-to-all fallback.
pub(crate) fn find_var_with_ref_id<'a>(
    vars: &'a VariableTable,
    subs: &SubscriptTable,
    ref_id: &str,
) -> Option<&'a Variable> {
    if let Some(v) = vars.var_with_exact_ref_id(ref_id) {
        return Some(v);
    }

    let base = base_var_name(ref_id);
    if base.len() < ref_id.len() && ref_id.ends_with(']') {
        let ref_subs: Vec<Ident> = ref_id[base.len() + 1..ref_id.len() - 1]
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();
        for v in vars.vars_with_name(base) {
            if covers(subs, &v.subscripts, &ref_subs) {
                return Some(v);
            }
        }
    }

    // an apply-to-all array referenced with explicit subscripts
    match vars.var_with_name(base) {
        Some(v) if v.ref_id == base => Some(v),
        _ => None,
    }
}
