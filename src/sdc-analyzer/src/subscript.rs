// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The subscript table: dimensions, indices, aliases, and inter-dimension
//! mappings, plus the resolution pass that turns declared subscript ranges
//! into families and registered indices.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::common::{Ident, Result, canonicalize, var_detail};
use crate::datamodel::{DimensionDef, DirectSubscriptDef};
use crate::sub_err;

pub trait SubscriptLike {
    fn name(&self) -> &Ident;
    fn family(&self) -> &Ident;
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct Dimension {
    pub name: Ident,
    /// The owning dimension; provisionally `name` until families are
    /// assigned.
    pub family: Ident,
    /// Source-level subscript tokens as declared; empty for aliases.
    pub model_value: Vec<String>,
    /// Canonical index names after expansion.
    pub value: Vec<Ident>,
    pub size: usize,
    /// Mappings as declared: target dimension to the declared tokens.
    pub model_mappings: Vec<(Ident, Vec<Ident>)>,
    /// Inverted mappings: target dimension to the from-dimension index that
    /// maps onto each target position (`None` where unresolved).
    pub mappings: BTreeMap<Ident, Vec<Option<Ident>>>,
}

impl SubscriptLike for Dimension {
    fn name(&self) -> &Ident {
        &self.name
    }
    fn family(&self) -> &Ident {
        &self.family
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Index {
    pub name: Ident,
    /// 0-based position in the family dimension.
    pub value: usize,
    pub family: Ident,
}

impl SubscriptLike for Index {
    fn name(&self) -> &Ident {
        &self.name
    }
    fn family(&self) -> &Ident {
        &self.family
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum Subscript {
    Dimension(Dimension),
    Index(Index),
}

impl Subscript {
    pub fn name(&self) -> &Ident {
        match self {
            Subscript::Dimension(d) => d.name(),
            Subscript::Index(i) => i.name(),
        }
    }

    pub fn family(&self) -> &Ident {
        match self {
            Subscript::Dimension(d) => d.family(),
            Subscript::Index(i) => i.family(),
        }
    }
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct SubscriptTable {
    subs: BTreeMap<Ident, Subscript>,
    /// alias name to its declared target, canonical.
    aliases: BTreeMap<Ident, Ident>,
}

impl SubscriptTable {
    pub fn new() -> SubscriptTable {
        Default::default()
    }

    pub fn sub(&self, name: &str) -> Option<&Subscript> {
        self.subs.get(name)
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        match self.subs.get(name) {
            Some(Subscript::Dimension(d)) => Some(d),
            _ => None,
        }
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        match self.subs.get(name) {
            Some(Subscript::Index(i)) => Some(i),
            _ => None,
        }
    }

    pub fn is_dimension(&self, name: &str) -> bool {
        self.dimension(name).is_some()
    }

    pub fn is_index(&self, name: &str) -> bool {
        self.index(name).is_some()
    }

    /// All non-alias dimensions, sorted by canonical name.
    pub fn all_dimensions(&self) -> Vec<&Dimension> {
        self.subs
            .values()
            .filter_map(|s| match s {
                Subscript::Dimension(d) if !self.aliases.contains_key(&d.name) => Some(d),
                _ => None,
            })
            .collect()
    }

    /// All alias dimensions, sorted by canonical name.
    pub fn all_aliases(&self) -> Vec<&Dimension> {
        self.subs
            .values()
            .filter_map(|s| match s {
                Subscript::Dimension(d) if self.aliases.contains_key(&d.name) => Some(d),
                _ => None,
            })
            .collect()
    }

    /// Every dimension record (aliases included), sorted by canonical name.
    pub fn dimensions_for_listing(&self) -> Vec<&Dimension> {
        self.subs
            .values()
            .filter_map(|s| match s {
                Subscript::Dimension(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    /// Normal family order for a subscript list: sort by each subscript's
    /// family, where indices use their family and dimensions themselves.
    pub fn normal_order(&self, subs: &[Ident]) -> Vec<Ident> {
        let mut sorted: Vec<Ident> = subs.to_vec();
        sorted.sort_by(|a, b| self.sort_key(a).cmp(self.sort_key(b)));
        sorted
    }

    fn sort_key<'a>(&'a self, sub: &'a Ident) -> &'a Ident {
        match self.subs.get(sub) {
            Some(Subscript::Index(i)) => &i.family,
            _ => sub,
        }
    }

    /// The family name for each subscript in a list, where known.
    pub fn families_of(&self, subs: &[Ident]) -> Vec<Ident> {
        subs.iter()
            .map(|s| match self.subs.get(s) {
                Some(sub) => sub.family().clone(),
                None => s.clone(),
            })
            .collect()
    }

    /// Rebuild the table from dimension definitions and run resolution:
    /// expand dimension values to indices, fill aliases, assign families,
    /// register indices, and invert mappings.
    pub fn resolve(
        &mut self,
        defs: &[&DimensionDef],
        families: &HashMap<Ident, Ident>,
        model_dir: Option<&Path>,
    ) -> Result<()> {
        self.subs.clear();
        self.aliases.clear();

        for def in defs {
            let name = canonicalize(&def.name);
            if self.subs.contains_key(&name) {
                return sub_err!(DuplicateDimension, var_detail(&name));
            }
            let mut dim = Dimension {
                name: name.clone(),
                family: name.clone(),
                ..Default::default()
            };
            if let Some(target) = &def.alias_of {
                let target = canonicalize(target);
                dim.family = target.clone();
                self.aliases.insert(name.clone(), target);
            } else if let Some(direct) = &def.direct {
                dim.model_value = read_direct_subscripts(direct, model_dir)?;
                dim.value = dim.model_value.iter().map(|t| canonicalize(t)).collect();
            } else {
                dim.model_value = def.model_value.clone();
                dim.value = def.model_value.iter().map(|t| canonicalize(t)).collect();
            }
            dim.model_mappings = def
                .mappings
                .iter()
                .map(|m| {
                    (
                        canonicalize(&m.to_dim),
                        m.value.iter().map(|t| canonicalize(t)).collect(),
                    )
                })
                .collect();
            self.subs.insert(name, Subscript::Dimension(dim));
        }

        self.expand_values()?;
        self.fill_aliases()?;
        self.assign_families(families)?;
        self.register_indices();
        self.invert_mappings();
        Ok(())
    }

    /// Replace dimension tokens inside dimension values with those
    /// dimensions' values until only index tokens remain.  The dependency
    /// graph among dimensions is a DAG in a valid model; anything still
    /// unexpanded after `n` rounds is part of a cycle.
    fn expand_values(&mut self) -> Result<()> {
        let rounds = self.subs.len() + 1;
        for _ in 0..rounds {
            let snapshot: HashMap<Ident, Vec<Ident>> = self
                .subs
                .values()
                .filter_map(|s| match s {
                    Subscript::Dimension(d) => Some((d.name.clone(), d.value.clone())),
                    _ => None,
                })
                .collect();
            let aliases = self.aliases.clone();

            let mut changed = false;
            for sub in self.subs.values_mut() {
                let dim = match sub {
                    Subscript::Dimension(d) => d,
                    _ => continue,
                };
                if dim.value.iter().all(|t| !snapshot.contains_key(t)) {
                    continue;
                }
                let mut expanded: Vec<Ident> = Vec::with_capacity(dim.value.len());
                for token in &dim.value {
                    // an alias token expands through its (transitive) target
                    let mut token = token;
                    let mut hops = 0;
                    while let Some(next) = aliases.get(token) {
                        token = next;
                        hops += 1;
                        if hops > aliases.len() {
                            break;
                        }
                    }
                    match snapshot.get(token) {
                        Some(inner) => expanded.extend(inner.iter().cloned()),
                        None => expanded.push(token.clone()),
                    }
                }
                changed = true;
                dim.value = expanded;
            }
            if !changed {
                break;
            }
        }

        // anything still containing a dimension token is cyclic
        let names: Vec<Ident> = self
            .subs
            .values()
            .filter_map(|s| match s {
                Subscript::Dimension(d) => Some(d.name.clone()),
                _ => None,
            })
            .collect();
        for sub in self.subs.values() {
            if let Subscript::Dimension(d) = sub {
                if d.value.iter().any(|t| names.contains(t)) {
                    return sub_err!(CircularDimension, var_detail(&d.name));
                }
            }
        }

        for sub in self.subs.values_mut() {
            if let Subscript::Dimension(d) = sub {
                d.size = d.value.len();
            }
        }
        Ok(())
    }

    /// Copy `value`, `size`, and `modelValue` onto each alias from its
    /// (transitively resolved) target.
    fn fill_aliases(&mut self) -> Result<()> {
        let aliases = self.aliases.clone();
        for alias in aliases.keys() {
            let target = self.resolve_alias_target(alias)?;
            let (value, size, model_value) = match self.dimension(&target) {
                Some(d) => (d.value.clone(), d.size, d.model_value.clone()),
                None => return sub_err!(UnknownFamily, var_detail(&target)),
            };
            if let Some(Subscript::Dimension(d)) = self.subs.get_mut(alias) {
                d.value = value;
                d.size = size;
                d.model_value = model_value;
                d.family = target.clone();
            }
        }
        Ok(())
    }

    fn resolve_alias_target(&self, alias: &Ident) -> Result<Ident> {
        let mut seen = vec![alias.clone()];
        let mut current = alias.clone();
        while let Some(next) = self.aliases.get(&current) {
            if seen.contains(next) {
                return sub_err!(CircularDimension, var_detail(alias));
            }
            seen.push(next.clone());
            current = next.clone();
        }
        Ok(current)
    }

    /// Pick a family for each non-alias dimension: an external override wins;
    /// otherwise, among the dimensions containing this dimension's first
    /// index, the largest (ties to the earliest name).
    fn assign_families(&mut self, families: &HashMap<Ident, Ident>) -> Result<()> {
        let dims: Vec<Dimension> = self
            .all_dimensions()
            .into_iter()
            .cloned()
            .collect();

        let mut assigned: Vec<(Ident, Ident)> = Vec::new();
        for dim in &dims {
            if let Some(family) = families.get(&dim.name) {
                if !dims.iter().any(|d| &d.name == family) && !self.aliases.contains_key(family) {
                    return sub_err!(UnknownFamily, var_detail(family));
                }
                assigned.push((dim.name.clone(), family.clone()));
                continue;
            }
            let first = match dim.value.first() {
                Some(first) => first,
                None => continue,
            };
            let mut candidates: Vec<&Dimension> =
                dims.iter().filter(|d| d.value.contains(first)).collect();
            candidates.sort_by(|a, b| a.size.cmp(&b.size).then(b.name.cmp(&a.name)));
            if let Some(family) = candidates.last() {
                assigned.push((dim.name.clone(), family.name.clone()));
            }
        }

        for (name, family) in assigned {
            if let Some(Subscript::Dimension(d)) = self.subs.get_mut(&name) {
                d.family = family;
            }
        }
        Ok(())
    }

    /// Register an `Index` for each position of each family dimension.
    fn register_indices(&mut self) {
        let mut indices: Vec<Index> = Vec::new();
        for dim in self.all_dimensions() {
            if dim.family != dim.name {
                continue;
            }
            for (i, ind_name) in dim.value.iter().enumerate() {
                indices.push(Index {
                    name: ind_name.clone(),
                    value: i,
                    family: dim.name.clone(),
                });
            }
        }
        for index in indices {
            match self.subs.get(&index.name) {
                Some(Subscript::Dimension(_)) => {
                    warn!(
                        "subscript {} is both a dimension and an index",
                        var_detail(&index.name)
                    );
                    continue;
                }
                Some(Subscript::Index(existing)) => {
                    if existing.family != index.family {
                        warn!(
                            "index {} appears in families {} and {}",
                            var_detail(&index.name),
                            existing.family,
                            index.family
                        );
                    }
                    continue;
                }
                None => {}
            }
            self.subs.insert(index.name.clone(), Subscript::Index(index));
        }
    }

    /// Invert each declared mapping so that position `i` of the result names
    /// the from-dimension index mapping onto target index `i`.  Out-of-range
    /// or duplicate target positions are reported and skipped; the inverted
    /// mapping is left sparse.
    fn invert_mappings(&mut self) {
        let dims: HashMap<Ident, Dimension> = self
            .dimensions_for_listing()
            .into_iter()
            .map(|d| (d.name.clone(), d.clone()))
            .collect();

        let mut inverted_all: Vec<(Ident, Ident, Vec<Option<Ident>>)> = Vec::new();
        for from_dim in dims.values() {
            for (to_name, map_value) in &from_dim.model_mappings {
                let to_dim = match dims.get(to_name) {
                    Some(d) => d,
                    None => {
                        warn!(
                            "mapping from {} names unknown dimension {}",
                            var_detail(&from_dim.name),
                            var_detail(to_name)
                        );
                        continue;
                    }
                };

                if map_value.is_empty() {
                    let inverted = from_dim.value.iter().cloned().map(Some).collect();
                    inverted_all.push((from_dim.name.clone(), to_name.clone(), inverted));
                    continue;
                }

                let mut inverted: Vec<Option<Ident>> = vec![None; to_dim.size];
                for (i, from_ind) in from_dim.value.iter().enumerate() {
                    let to_token = match map_value.get(i) {
                        Some(t) => t,
                        None => {
                            warn!(
                                "mapping {} -> {} is shorter than the dimension",
                                var_detail(&from_dim.name),
                                var_detail(to_name)
                            );
                            break;
                        }
                    };
                    let to_indices: Vec<&Ident> = match dims.get(to_token) {
                        Some(d) => d.value.iter().collect(),
                        None => vec![to_token],
                    };
                    for to_ind in to_indices {
                        match to_dim.value.iter().position(|v| v == to_ind) {
                            Some(pos) => {
                                if inverted[pos].is_some() {
                                    warn!(
                                        "mapping {} -> {} writes position {} twice",
                                        var_detail(&from_dim.name),
                                        var_detail(to_name),
                                        pos
                                    );
                                }
                                inverted[pos] = Some(from_ind.clone());
                            }
                            None => {
                                warn!(
                                    "mapping {} -> {}: {} is not in the target",
                                    var_detail(&from_dim.name),
                                    var_detail(to_name),
                                    var_detail(to_ind)
                                );
                            }
                        }
                    }
                }
                inverted_all.push((from_dim.name.clone(), to_name.clone(), inverted));
            }
        }

        for (from, to, inverted) in inverted_all {
            if let Some(Subscript::Dimension(d)) = self.subs.get_mut(&from) {
                d.mappings.insert(to, inverted);
            }
        }
    }
}

/// Read index names for a `GET DIRECT SUBSCRIPT` dimension from a
/// delimiter-separated sibling file of the model directory, starting at the
/// given cell and scanning down the column (or, when the column run is
/// shorter, right along the row).
fn read_direct_subscripts(
    def: &DirectSubscriptDef,
    model_dir: Option<&Path>,
) -> Result<Vec<String>> {
    let path = match model_dir {
        Some(dir) => dir.join(&def.file),
        None => PathBuf::from(&def.file),
    };
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) => {
            return sub_err!(
                DirectSubscriptRead,
                format!("{}: {}", path.display(), err)
            );
        }
    };

    let (col, row) = match parse_cell(&def.first_cell) {
        Some(cell) => cell,
        None => {
            return sub_err!(
                DirectSubscriptRead,
                format!("{}: bad cell {}", path.display(), def.first_cell)
            );
        }
    };

    let delimiter = if def.delimiter.eq_ignore_ascii_case("tab") {
        "\t"
    } else {
        def.delimiter.as_str()
    };
    let rows: Vec<Vec<String>> = content
        .lines()
        .map(|line| line.split(delimiter).map(|c| c.trim().to_string()).collect())
        .collect();

    let cell_at = |r: usize, c: usize| -> Option<&String> {
        rows.get(r).and_then(|row: &Vec<String>| row.get(c)).filter(|s| !s.is_empty())
    };

    let mut down: Vec<String> = Vec::new();
    let mut r = row;
    while let Some(cell) = cell_at(r, col) {
        down.push(cell.clone());
        r += 1;
    }

    let mut right: Vec<String> = Vec::new();
    let mut c = col;
    while let Some(cell) = cell_at(row, c) {
        right.push(cell.clone());
        c += 1;
    }

    let names = if right.len() > down.len() { right } else { down };
    if names.is_empty() {
        return sub_err!(
            DirectSubscriptRead,
            format!("{}: no subscripts at {}", path.display(), def.first_cell)
        );
    }
    Ok(names)
}

/// Parse a spreadsheet-style cell reference like `A2` into 0-based
/// (column, row).
fn parse_cell(cell: &str) -> Option<(usize, usize)> {
    let letters: String = cell.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &cell[letters.len()..];
    if letters.is_empty() || digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut col: usize = 0;
    for c in letters.chars() {
        col = col * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    let row: usize = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((col - 1, row - 1))
}
