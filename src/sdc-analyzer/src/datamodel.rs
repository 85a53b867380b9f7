// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Plain-data types at the analyzer's boundary: the parsed model handed over
//! by the front-end, the JSON spec document, and the preloaded data maps.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ast::{Expr, LookupTable};
use crate::common::{Ident, canonicalize};

/// A subscript range declaration as parsed: `DimA: a1, a2 -> DimB`.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct DimensionDef {
    pub name: String,
    /// Source-level subscript tokens; may name other dimensions.  Empty for
    /// aliases and direct-subscript dimensions.
    pub model_value: Vec<String>,
    /// `DimA <-> DimB` declares `DimA` as an alias of `DimB`.
    pub alias_of: Option<String>,
    pub mappings: Vec<MappingDef>,
    /// `DimA: GET DIRECT SUBSCRIPT('f.csv', ',', 'A2')`
    pub direct: Option<DirectSubscriptDef>,
}

/// One `-> Target` or `-> (Target: t2, t1)` mapping clause.
#[derive(Clone, PartialEq, Debug)]
pub struct MappingDef {
    pub to_dim: String,
    /// Source tokens mapping each from-dimension position onto the target;
    /// empty when the clause names only the target dimension.
    pub value: Vec<String>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct DirectSubscriptDef {
    pub file: String,
    pub delimiter: String,
    pub first_cell: String,
}

/// The left-hand side of an equation head.
#[derive(Clone, PartialEq, Debug)]
pub struct Lhs {
    pub var_name: String,
    pub subscripts: Vec<String>,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Rhs {
    Expr(Expr),
    /// An inline lookup declaration: `name( (0,0), (1,1) )`.
    Lookup(LookupTable),
    /// A constant list: `x[DimA] = 1, 2, 3` (source text kept per entry).
    ConstList(Vec<(String, f64)>),
    /// No right-hand side: an externally supplied data variable.
    Empty,
}

/// One equation as parsed, with the source text of both sides retained for
/// diagnostics and synthesized-equation emission.
#[derive(Clone, PartialEq, Debug)]
pub struct EquationDef {
    pub model_lhs: String,
    pub model_formula: String,
    pub lhs: Lhs,
    pub rhs: Rhs,
}

#[derive(Clone, PartialEq, Debug)]
pub enum ModelEntry {
    Dimension(DimensionDef),
    Equation(EquationDef),
}

/// Legacy parse-tree shape: a single root whose entries interleave subscript
/// ranges and equations in source order.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct LegacyRoot {
    pub entries: Vec<ModelEntry>,
}

/// Modern parse-tree shape: dimension and equation definitions pre-split.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct ModernModel {
    pub dimensions: Vec<DimensionDef>,
    pub equations: Vec<EquationDef>,
}

/// The tagged parse-tree handed to the analyzer.
#[derive(Clone, PartialEq, Debug)]
pub enum ParsedModel {
    Legacy(LegacyRoot),
    Modern(ModernModel),
}

impl ParsedModel {
    pub fn dimension_defs(&self) -> Vec<&DimensionDef> {
        match self {
            ParsedModel::Legacy(root) => root
                .entries
                .iter()
                .filter_map(|e| match e {
                    ModelEntry::Dimension(d) => Some(d),
                    ModelEntry::Equation(_) => None,
                })
                .collect(),
            ParsedModel::Modern(m) => m.dimensions.iter().collect(),
        }
    }

    pub fn equation_defs(&self) -> Vec<&EquationDef> {
        match self {
            ParsedModel::Legacy(root) => root
                .entries
                .iter()
                .filter_map(|e| match e {
                    ModelEntry::Equation(eq) => Some(eq),
                    ModelEntry::Dimension(_) => None,
                })
                .collect(),
            ParsedModel::Modern(m) => m.equations.iter().collect(),
        }
    }
}

/// The spec document (§6): inputs, outputs, separation and family overrides.
/// Fields ending in `Names` carry source names and are canonicalized by
/// [`Spec::normalize`]; the `Vars` forms are already canonical.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Spec {
    pub input_vars: Vec<Ident>,
    pub input_var_names: Vec<String>,
    pub output_vars: Vec<Ident>,
    pub output_var_names: Vec<String>,
    pub special_separation_dims: HashMap<String, String>,
    pub dimension_families: HashMap<Ident, Ident>,
    /// Pass-through for the code generator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bindings: Option<serde_json::Value>,
}

impl Spec {
    pub fn from_json(text: &str) -> serde_json::Result<Spec> {
        let spec: Spec = serde_json::from_str(text)?;
        Ok(spec.normalize())
    }

    /// Fold the `*Names` fields into their canonical `*Vars` counterparts and
    /// canonicalize the map keys/values.
    pub fn normalize(mut self) -> Spec {
        for name in self.input_var_names.drain(..) {
            let cname = canonicalize(&name);
            if !self.input_vars.contains(&cname) {
                self.input_vars.push(cname);
            }
        }
        for name in self.output_var_names.drain(..) {
            let cname = canonicalize_ref(&name);
            if !self.output_vars.contains(&cname) {
                self.output_vars.push(cname);
            }
        }
        let sep = std::mem::take(&mut self.special_separation_dims);
        self.special_separation_dims = sep
            .into_iter()
            .map(|(var, dim)| (canonicalize(&var), canonicalize(&dim)))
            .collect();
        let families = std::mem::take(&mut self.dimension_families);
        self.dimension_families = families
            .into_iter()
            .map(|(dim, family)| (canonicalize(&dim), canonicalize(&family)))
            .collect();
        self
    }
}

/// Canonicalize a reference that may carry a subscript suffix, e.g.
/// `y[a1]` becomes `_y[_a1]`.
pub fn canonicalize_ref(name: &str) -> Ident {
    match name.find('[') {
        Some(pos) if name.ends_with(']') => {
            let base = canonicalize(&name[..pos]);
            let subs: Vec<Ident> = name[pos + 1..name.len() - 1]
                .split(',')
                .map(canonicalize)
                .collect();
            format!("{}[{}]", base, subs.join(","))
        }
        _ => canonicalize(name),
    }
}

/// Strip a `[subscripts]` suffix off a reference, leaving the base name.
pub fn base_var_name(ref_id: &str) -> &str {
    match ref_id.find('[') {
        Some(pos) => &ref_id[..pos],
        None => ref_id,
    }
}

/// External time series keyed by canonical variable name, used to synthesize
/// lookups for spec variables with no equation.
pub type ExtData = HashMap<Ident, Vec<(f64, f64)>>;

/// Tabular data keyed by dataset tag (e.g. `?data`), then by canonical
/// variable name, consumed by `GET DIRECT DATA`.
pub type DirectData = HashMap<String, HashMap<Ident, Vec<(f64, f64)>>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_from_json() {
        let spec = Spec::from_json(
            r#"{
                "inputVarNames": ["FINAL TIME"],
                "outputVarNames": ["Population", "y[a1]"],
                "specialSeparationDims": {"Holding": "Region"},
                "dimensionFamilies": {"_dima_prime": "_dima"}
            }"#,
        )
        .unwrap();
        assert_eq!(vec!["_final_time"], spec.input_vars);
        assert_eq!(vec!["_population", "_y[_a1]"], spec.output_vars);
        assert_eq!(
            Some(&"_region".to_string()),
            spec.special_separation_dims.get("_holding")
        );
        assert_eq!(
            Some(&"_dima".to_string()),
            spec.dimension_families.get("_dima_prime")
        );
    }

    #[test]
    fn test_spec_names_merge_without_dupes() {
        let spec = Spec {
            input_vars: vec!["_x".to_string()],
            input_var_names: vec!["X".to_string(), "Y".to_string()],
            ..Default::default()
        }
        .normalize();
        assert_eq!(vec!["_x", "_y"], spec.input_vars);
    }

    #[test]
    fn test_canonicalize_ref() {
        assert_eq!("_y[_a1]", canonicalize_ref("y[a1]"));
        assert_eq!("_y[_a1,_b2]", canonicalize_ref("y[a1, b2]"));
        assert_eq!("_y", canonicalize_ref("y"));
        assert_eq!("_y", base_var_name("_y[_a1]"));
    }

    #[test]
    fn test_parsed_model_dispatch() {
        let dim = DimensionDef {
            name: "DimA".to_string(),
            model_value: vec!["a1".to_string()],
            ..Default::default()
        };
        let legacy = ParsedModel::Legacy(LegacyRoot {
            entries: vec![ModelEntry::Dimension(dim.clone())],
        });
        let modern = ParsedModel::Modern(ModernModel {
            dimensions: vec![dim],
            equations: vec![],
        });
        assert_eq!(1, legacy.dimension_defs().len());
        assert_eq!(1, modern.dimension_defs().len());
        assert!(legacy.equation_defs().is_empty());
    }
}
