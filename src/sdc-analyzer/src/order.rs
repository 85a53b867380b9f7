// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Evaluation ordering: a deterministic topological sort plus the builders
//! for the init, aux, and level phases.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::common::{Ident, Result, var_detail};
use crate::model::Analyzer;
use crate::model_err;
use crate::variable::{VarType, Variable};

/// Kahn's algorithm over ref-id edges.  For every edge `(a, b)`, `a`
/// precedes `b` in the result; ties break by first appearance in the edge
/// list, so insertion order is preserved.  A cycle is fatal and names one
/// node on it.
pub(crate) fn topo_sort(edges: &[(Ident, Ident)]) -> Result<Vec<Ident>> {
    let mut nodes: Vec<Ident> = Vec::new();
    let mut index: HashMap<Ident, usize> = HashMap::new();
    for (a, b) in edges {
        for n in [a, b] {
            if !index.contains_key(n) {
                index.insert(n.clone(), nodes.len());
                nodes.push(n.clone());
            }
        }
    }

    let n = nodes.len();
    let mut succs: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree: Vec<usize> = vec![0; n];
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    for (a, b) in edges {
        let (ia, ib) = (index[a], index[b]);
        if seen.insert((ia, ib)) {
            succs[ia].push(ib);
            indegree[ib] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| indegree[i] == 0)
        .map(Reverse)
        .collect();
    let mut out: Vec<Ident> = Vec::with_capacity(n);
    while let Some(Reverse(i)) = ready.pop() {
        out.push(nodes[i].clone());
        for &j in &succs[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.push(Reverse(j));
            }
        }
    }

    if out.len() != n {
        let stuck = (0..n).find(|&i| indegree[i] > 0).unwrap();
        return model_err!(CircularDependency, var_detail(&nodes[stuck]));
    }
    Ok(out)
}

impl Analyzer {
    /// Aux-phase evaluation order.
    pub fn aux_order(&self) -> Result<Vec<Ident>> {
        self.phase_order(VarType::Aux)
    }

    /// Level-phase evaluation order.  Level-to-level edges are reversed: a
    /// level reads its peers' previous values, so it must be stepped before
    /// them.  Mutually referencing levels impose no usable ordering and
    /// their edge pair cancels.
    pub fn level_order(&self) -> Result<Vec<Ident>> {
        self.phase_order(VarType::Level)
    }

    fn phase_order(&self, var_type: VarType) -> Result<Vec<Ident>> {
        let seed: Vec<&Variable> = self
            .vars
            .variables()
            .iter()
            .filter(|v| v.var_type == var_type && v.var_name != "_time")
            .collect();

        let mut edges: Vec<(Ident, Ident)> = Vec::new();
        for v in &seed {
            for r in &v.references {
                let target = match self.var_with_ref_id(r) {
                    Some(target) => target,
                    None => continue,
                };
                if target.var_type != var_type
                    || target.ref_id == v.ref_id
                    || target.var_name == "_time"
                {
                    continue;
                }
                if var_type == VarType::Level {
                    edges.push((target.ref_id.clone(), v.ref_id.clone()));
                } else {
                    edges.push((v.ref_id.clone(), target.ref_id.clone()));
                }
            }
        }

        if var_type == VarType::Level {
            let all: HashSet<(Ident, Ident)> = edges.iter().cloned().collect();
            edges.retain(|(a, b)| !all.contains(&(b.clone(), a.clone())));
        }

        let sorted = topo_sort(&edges)?;
        let order: Vec<Ident> = sorted.into_iter().rev().collect();

        let in_graph: HashSet<&Ident> = order.iter().collect();
        let mut result: Vec<Ident> = seed
            .iter()
            .filter(|v| !in_graph.contains(&v.ref_id))
            .map(|v| v.ref_id.clone())
            .collect();
        result.sort();
        result.extend(order);
        Ok(result)
    }

    /// Init-phase evaluation order: starts from every variable with an init
    /// value, follows init references (plain references for enqueued helpers),
    /// and excludes constants, lookups, and data variables from the result.
    pub fn init_order(&self) -> Result<Vec<Ident>> {
        let mut queue: Vec<usize> = Vec::new();
        let mut enqueued: HashSet<Ident> = HashSet::new();
        for (i, v) in self.vars.variables().iter().enumerate() {
            if v.has_init_value {
                queue.push(i);
                enqueued.insert(v.ref_id.clone());
            }
        }

        let mut edges: Vec<(Ident, Ident)> = Vec::new();
        let mut qi = 0;
        while qi < queue.len() {
            let v = self.vars.get(queue[qi]);
            qi += 1;
            let refs = if v.has_init_value {
                &v.init_references
            } else {
                &v.references
            };
            for r in refs {
                edges.push((v.ref_id.clone(), r.clone()));
                let target = match self.var_with_ref_id(r) {
                    Some(target) => target,
                    None => continue,
                };
                if target.var_type != VarType::Const && !enqueued.contains(&target.ref_id) {
                    enqueued.insert(target.ref_id.clone());
                    if let Some(idx) = self.vars.index_with_ref_id(&target.ref_id) {
                        queue.push(idx);
                    }
                }
            }
        }

        let sorted = topo_sort(&edges)?;
        let order: Vec<Ident> = sorted
            .into_iter()
            .rev()
            .filter(|ref_id| {
                match self.var_with_ref_id(ref_id).map(|v| v.var_type) {
                    Some(VarType::Const) | Some(VarType::Lookup) | Some(VarType::Data) => false,
                    Some(_) => true,
                    None => false,
                }
            })
            .collect();

        let in_graph: HashSet<&Ident> = order.iter().collect();
        let mut result: Vec<Ident> = Vec::new();
        let edge_nodes: HashSet<&Ident> = edges.iter().flat_map(|(a, b)| [a, b]).collect();
        for v in self.vars.variables() {
            if v.has_init_value && !edge_nodes.contains(&v.ref_id) && !in_graph.contains(&v.ref_id)
            {
                result.push(v.ref_id.clone());
            }
        }
        result.sort();
        result.extend(order);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::datamodel::Spec;
    use crate::testutils::analyze_model;

    fn idents(names: &[&str]) -> Vec<Ident> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_topo_sort_orders_edges() {
        let edges = vec![
            ("_c".to_string(), "_b".to_string()),
            ("_b".to_string(), "_a".to_string()),
        ];
        assert_eq!(idents(&["_c", "_b", "_a"]), topo_sort(&edges).unwrap());
    }

    #[test]
    fn test_topo_sort_tie_break_is_insertion_order() {
        let edges = vec![
            ("_y".to_string(), "_sink".to_string()),
            ("_x".to_string(), "_sink".to_string()),
        ];
        // _y first: it appeared first and both are ready
        assert_eq!(idents(&["_y", "_x", "_sink"]), topo_sort(&edges).unwrap());
    }

    #[test]
    fn test_topo_sort_duplicate_edges() {
        let edges = vec![
            ("_a".to_string(), "_b".to_string()),
            ("_a".to_string(), "_b".to_string()),
        ];
        assert_eq!(idents(&["_a", "_b"]), topo_sort(&edges).unwrap());
    }

    #[test]
    fn test_topo_sort_cycle_is_fatal() {
        let edges = vec![
            ("_a".to_string(), "_b".to_string()),
            ("_b".to_string(), "_a".to_string()),
        ];
        let err = topo_sort(&edges).unwrap_err();
        assert_eq!(ErrorCode::CircularDependency, err.code);
        assert!(err.get_details().unwrap().contains("_a"));
    }

    #[test]
    fn test_aux_order_dependencies_first() {
        let analyzer = analyze_model(&["a = 1", "b = a + 2", "c = b * 3"], Spec::default()).unwrap();
        // a is const, so the aux graph is c -> b reversed into [b, c]
        assert_eq!(idents(&["_b", "_c"]), analyzer.aux_order().unwrap());
    }

    #[test]
    fn test_aux_order_isolated_vars_prepended_sorted() {
        let analyzer = analyze_model(
            &["eps = 1", "w = 2 * eps", "q = w", "z = 1 + q", "iso = eps * 3"],
            Spec::default(),
        )
        .unwrap();
        let order = analyzer.aux_order().unwrap();
        // iso only references a const, so it stands outside the aux graph
        assert_eq!("_iso", order[0]);
        let pos = |name: &str| order.iter().position(|r| r == name).unwrap();
        assert!(pos("_w") < pos("_q"));
        assert!(pos("_q") < pos("_z"));
    }

    #[test]
    fn test_aux_cycle_is_fatal() {
        let err = analyze_model(&["a = b", "b = a"], Spec::default())
            .unwrap()
            .aux_order()
            .unwrap_err();
        assert_eq!(ErrorCode::CircularDependency, err.code);
    }

    #[test]
    fn test_level_order_reversal() {
        let analyzer = analyze_model(
            &["a = INTEG(b, 0)", "b = INTEG(c, 0)", "c = INTEG(z, 0)", "z = 1"],
            Spec::default(),
        )
        .unwrap();
        // a reads b, b reads c: reversed edges order a before b before c
        assert_eq!(idents(&["_a", "_b", "_c"]), analyzer.level_order().unwrap());
    }

    #[test]
    fn test_mutual_levels_no_cycle() {
        let analyzer =
            analyze_model(&["a = INTEG(b, 0)", "b = INTEG(a, 0)"], Spec::default()).unwrap();
        // the contradictory pair cancels; both stand alone in name order
        assert_eq!(idents(&["_a", "_b"]), analyzer.level_order().unwrap());
    }

    #[test]
    fn test_self_referencing_level() {
        let analyzer =
            analyze_model(&["s = INTEG(-s / 2, 10)"], Spec::default()).unwrap();
        assert_eq!(idents(&["_s"]), analyzer.level_order().unwrap());
    }

    #[test]
    fn test_init_order_includes_level_after_its_deps() {
        let analyzer = analyze_model(
            &["s = INTEG(flow, s0 + extra)", "flow = 2", "s0 = 5", "extra = e2 * 2", "e2 = 7"],
            Spec::default(),
        )
        .unwrap();
        let order = analyzer.init_order().unwrap();
        // consts are filtered out; extra is an aux init dependency of s
        let pos = |name: &str| order.iter().position(|r| r == name).unwrap();
        assert!(pos("_extra") < pos("_s"));
        assert!(!order.contains(&"_s0".to_string()));
        assert!(!order.contains(&"_e2".to_string()));
        assert!(!order.contains(&"_flow".to_string()));
    }

    #[test]
    fn test_init_order_no_dep_levels_prepended() {
        let analyzer = analyze_model(
            &["b = INTEG(r, 1)", "a = INTEG(r, s0)", "r = 1", "s0 = 2"],
            Spec::default(),
        )
        .unwrap();
        let order = analyzer.init_order().unwrap();
        // b has a literal init with no references; a's only init ref is const
        assert_eq!(idents(&["_b", "_a"]), order);
    }
}
