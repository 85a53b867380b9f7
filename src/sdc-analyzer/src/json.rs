// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The evaluation-order listing, variable index assignment, and the stable
//! JSON projection consumed by downstream tooling.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::common::{Error, ErrorCode, ErrorKind, Ident, Result};
use crate::model::Analyzer;
use crate::variable::{VarType, Variable};

#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonDimension {
    name: Ident,
    family: Ident,
    value: Vec<Ident>,
    size: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    model_value: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    mappings: BTreeMap<Ident, Vec<Option<Ident>>>,
}

#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VarIndexInfo {
    pub var_name: Ident,
    pub var_index: usize,
    pub subscript_count: usize,
}

#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonVariable {
    ref_id: Ident,
    var_name: Ident,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    subscripts: Vec<Ident>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    families: Vec<Ident>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    references: Vec<Ident>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    init_references: Vec<Ident>,
    has_init_value: bool,
    var_type: VarType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    separation_dims: Vec<Ident>,
    #[serde(rename = "modelLHS")]
    model_lhs: String,
    model_formula: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    var_index: Option<usize>,
}

#[derive(Serialize)]
struct JsonModel {
    dimensions: Vec<JsonDimension>,
    variables: Vec<JsonVariable>,
}

impl Analyzer {
    /// Variables in evaluation-order listing: constants, lookups, data, the
    /// time placeholder, then the init and aux orders.  Generated helper
    /// variables are omitted, and a ref-id appears once, at its first slot.
    pub fn listing_order(&self) -> Result<Vec<&Variable>> {
        let init = self.init_order()?;
        let aux = self.aux_order()?;

        let mut out: Vec<&Variable> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for bucket in [VarType::Const, VarType::Lookup, VarType::Data] {
            for v in self.vars.variables() {
                if v.var_type == bucket
                    && v.var_name != "_time"
                    && !v.is_helper()
                    && seen.insert(v.ref_id.as_str())
                {
                    out.push(v);
                }
            }
        }

        if let Some(time) = self.vars.var_with_name("_time") {
            if seen.insert(time.ref_id.as_str()) {
                out.push(time);
            }
        }

        for phase in [&init, &aux] {
            for ref_id in phase {
                if let Some(v) = self.vars.var_with_exact_ref_id(ref_id) {
                    if v.var_name != "_time" && !v.is_helper() && seen.insert(v.ref_id.as_str()) {
                        out.push(v);
                    }
                }
            }
        }

        Ok(out)
    }

    /// 1-based indices for each unique output-eligible variable name (data
    /// and lookup variables are not assigned output slots), in listing
    /// order; the result is sorted by name.
    pub fn var_index_info(&self) -> Result<Vec<VarIndexInfo>> {
        let listing = self.listing_order()?;
        let mut infos: Vec<VarIndexInfo> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut next = 1;
        for v in listing {
            if matches!(v.var_type, VarType::Data | VarType::Lookup) {
                continue;
            }
            if seen.insert(v.var_name.as_str()) {
                infos.push(VarIndexInfo {
                    var_name: v.var_name.clone(),
                    var_index: next,
                    subscript_count: v.subscripts.len(),
                });
                next += 1;
            }
        }
        infos.sort_by(|a, b| a.var_name.cmp(&b.var_name));
        Ok(infos)
    }

    /// Serialized listing: dimensions sorted by name, variables in listing
    /// order, each projecting a fixed field subset.  Byte-stable for
    /// identical inputs.
    pub fn json_list(&self) -> Result<String> {
        let infos = self.var_index_info()?;
        let index_by_name: HashMap<&str, usize> = infos
            .iter()
            .map(|info| (info.var_name.as_str(), info.var_index))
            .collect();

        let dimensions: Vec<JsonDimension> = self
            .subscripts
            .dimensions_for_listing()
            .into_iter()
            .map(|d| JsonDimension {
                name: d.name.clone(),
                family: d.family.clone(),
                value: d.value.clone(),
                size: d.size,
                model_value: d.model_value.clone(),
                mappings: d.mappings.clone(),
            })
            .collect();

        let variables: Vec<JsonVariable> = self
            .listing_order()?
            .into_iter()
            .map(|v| {
                let var_index = if matches!(v.var_type, VarType::Data | VarType::Lookup) {
                    None
                } else {
                    index_by_name.get(v.var_name.as_str()).copied()
                };
                JsonVariable {
                    ref_id: v.ref_id.clone(),
                    var_name: v.var_name.clone(),
                    subscripts: v.subscripts.clone(),
                    families: self.subscripts.families_of(&v.subscripts),
                    references: v.references.clone(),
                    init_references: v.init_references.clone(),
                    has_init_value: v.has_init_value,
                    var_type: v.var_type,
                    separation_dims: v.separation_dims.clone(),
                    model_lhs: v.model_lhs.clone(),
                    model_formula: v.model_formula.clone(),
                    var_index,
                }
            })
            .collect();

        serde_json::to_string(&JsonModel {
            dimensions,
            variables,
        })
        .map_err(|err| Error::new(ErrorKind::Model, ErrorCode::Generic, Some(err.to_string())))
    }
}
