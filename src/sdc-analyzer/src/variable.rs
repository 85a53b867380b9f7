// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The analyzed variable record and the variable table.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::common::Ident;
use crate::datamodel::Rhs;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    Const,
    Lookup,
    Data,
    Aux,
    Level,
}

impl Default for VarType {
    fn default() -> Self {
        VarType::Aux
    }
}

/// One analyzed variable: one record per equation head, one per LHS subscript
/// tuple for separated (non-apply-to-all) arrays.
#[derive(Clone, PartialEq, Debug)]
pub struct Variable {
    /// Canonical LHS base name.
    pub var_name: Ident,
    /// Source forms, kept for diagnostics and synthesized lookup emission.
    pub model_lhs: String,
    pub model_formula: String,
    /// Canonical subscripts in normal family order.
    pub subscripts: Vec<Ident>,
    /// Dimensions this variable was split on for non-apply-to-all semantics.
    pub separation_dims: Vec<Ident>,
    pub var_type: VarType,
    pub has_init_value: bool,
    /// `(x, y)` pairs for lookups and data variables.
    pub points: Vec<(f64, f64)>,
    pub references: Vec<Ident>,
    pub init_references: Vec<Ident>,
    pub referenced_lookup_var_names: Vec<Ident>,
    pub referenced_function_names: Vec<Ident>,
    /// Unique record id: `var_name`, or `var_name[subs]` for non-apply-to-all
    /// variants.
    pub ref_id: Ident,
    /// Parsed right-hand side, consumed by the equation reader.
    pub(crate) rhs: Rhs,
}

impl Variable {
    pub fn new(var_name: Ident) -> Variable {
        Variable {
            ref_id: var_name.clone(),
            var_name,
            model_lhs: String::new(),
            model_formula: String::new(),
            subscripts: vec![],
            separation_dims: vec![],
            var_type: VarType::default(),
            has_init_value: false,
            points: vec![],
            references: vec![],
            init_references: vec![],
            referenced_lookup_var_names: vec![],
            referenced_function_names: vec![],
            rhs: Rhs::Empty,
        }
    }

    /// The ref-id this variable gets: the bare name for scalars and
    /// apply-to-all arrays, `name[subs]` for non-apply-to-all variants.
    pub(crate) fn make_ref_id(&self, apply_to_all: bool) -> Ident {
        if self.subscripts.is_empty() || apply_to_all {
            self.var_name.clone()
        } else {
            format!("{}[{}]", self.var_name, self.subscripts.join(","))
        }
    }

    /// Internally generated helpers are omitted from listings.
    pub fn is_helper(&self) -> bool {
        self.ref_id.starts_with("__level") || self.ref_id.starts_with("__aux")
    }
}

/// Variables keyed by canonical name, with multi-valued lookup for
/// non-apply-to-all variants and insertion order preserved for stable
/// iteration.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct VariableTable {
    vars: Vec<Variable>,
    by_name: HashMap<Ident, Vec<usize>>,
    by_ref_id: HashMap<Ident, usize>,
}

impl VariableTable {
    pub fn new() -> VariableTable {
        Default::default()
    }

    pub fn add(&mut self, v: Variable) {
        let idx = self.vars.len();
        self.by_name.entry(v.var_name.clone()).or_default().push(idx);
        self.vars.push(v);
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }

    pub(crate) fn get(&self, idx: usize) -> &Variable {
        &self.vars[idx]
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> &mut Variable {
        &mut self.vars[idx]
    }

    /// All variants declared under a canonical name, in insertion order.
    pub fn vars_with_name(&self, name: &str) -> Vec<&Variable> {
        match self.by_name.get(name) {
            Some(indices) => indices.iter().map(|&i| &self.vars[i]).collect(),
            None => vec![],
        }
    }

    pub(crate) fn indices_with_name(&self, name: &str) -> &[usize] {
        match self.by_name.get(name) {
            Some(indices) => indices,
            None => &[],
        }
    }

    /// The first variant declared under a canonical name.
    pub fn var_with_name(&self, name: &str) -> Option<&Variable> {
        self.by_name
            .get(name)
            .and_then(|indices| indices.first())
            .map(|&i| &self.vars[i])
    }

    pub fn ref_ids_with_name(&self, name: &str) -> Vec<Ident> {
        self.vars_with_name(name)
            .into_iter()
            .map(|v| v.ref_id.clone())
            .collect()
    }

    /// Sorted unique canonical names.
    pub fn all_var_names(&self) -> Vec<Ident> {
        let mut names: Vec<Ident> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Exact ref-id match only; subscript-aware resolution is layered on top
    /// by the analyzer.
    pub(crate) fn var_with_exact_ref_id(&self, ref_id: &str) -> Option<&Variable> {
        self.by_ref_id.get(ref_id).map(|&i| &self.vars[i])
    }

    pub(crate) fn index_with_ref_id(&self, ref_id: &str) -> Option<usize> {
        self.by_ref_id.get(ref_id).copied()
    }

    /// Rebuild the ref-id map after ref-id assignment or any mutation pass.
    pub(crate) fn rebuild_ref_ids(&mut self) {
        self.by_ref_id = self
            .vars
            .iter()
            .enumerate()
            .map(|(i, v)| (v.ref_id.clone(), i))
            .collect();
    }

    /// Drop all variables whose name is not in the keep set and rebuild the
    /// by-name and ref-id maps.
    pub(crate) fn retain_names(&mut self, keep: &HashSet<Ident>) {
        self.vars.retain(|v| keep.contains(&v.var_name));
        self.reindex();
    }

    /// Drop variables by position predicate and rebuild the maps.
    pub(crate) fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&Variable) -> bool,
    {
        self.vars.retain(f);
        self.reindex();
    }

    fn reindex(&mut self) {
        self.by_name.clear();
        for (i, v) in self.vars.iter().enumerate() {
            self.by_name.entry(v.var_name.clone()).or_default().push(i);
        }
        self.rebuild_ref_ids();
    }

    pub(crate) fn clear(&mut self) {
        self.vars.clear();
        self.by_name.clear();
        self.by_ref_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, subs: &[&str]) -> Variable {
        let mut v = Variable::new(name.to_string());
        v.subscripts = subs.iter().map(|s| s.to_string()).collect();
        v
    }

    #[test]
    fn test_ref_ids() {
        let scalar = var("_a", &[]);
        assert_eq!("_a", scalar.make_ref_id(false));

        let a2a = var("_x", &["_dima"]);
        assert_eq!("_x", a2a.make_ref_id(true));

        let variant = var("_v", &["_a1"]);
        assert_eq!("_v[_a1]", variant.make_ref_id(false));
    }

    #[test]
    fn test_table_queries() {
        let mut table = VariableTable::new();
        table.add(var("_a", &[]));
        let mut v1 = var("_v", &["_r1"]);
        v1.ref_id = "_v[_r1]".to_string();
        let mut v2 = var("_v", &["_r2"]);
        v2.ref_id = "_v[_r2]".to_string();
        table.add(v1);
        table.add(v2);
        table.rebuild_ref_ids();

        assert_eq!(2, table.vars_with_name("_v").len());
        assert_eq!("_r1", table.var_with_name("_v").unwrap().subscripts[0]);
        assert_eq!(vec!["_v[_r1]", "_v[_r2]"], table.ref_ids_with_name("_v"));
        assert_eq!(vec!["_a", "_v"], table.all_var_names());
        assert!(table.var_with_exact_ref_id("_v[_r2]").is_some());
        assert!(table.var_with_exact_ref_id("_v").is_none());
    }

    #[test]
    fn test_retain_names_reindexes() {
        let mut table = VariableTable::new();
        table.add(var("_a", &[]));
        table.add(var("_b", &[]));
        table.rebuild_ref_ids();

        let keep: HashSet<Ident> = [("_b".to_string())].into_iter().collect();
        table.retain_names(&keep);
        assert_eq!(1, table.len());
        assert!(table.var_with_name("_a").is_none());
        assert!(table.var_with_exact_ref_id("_b").is_some());
    }

    #[test]
    fn test_helper_detection() {
        let mut v = var("__level1", &[]);
        v.ref_id = "__level1".to_string();
        assert!(v.is_helper());
        assert!(!var("_level_of_detail", &[]).is_helper());
    }
}
