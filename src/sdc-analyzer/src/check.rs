// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Spec checking and dead-code elimination: every declared input and output
//! must be backed by a variable (synthesized from external data when
//! possible), and with both inputs and outputs declared, anything
//! unreachable from them is dropped.

use std::collections::HashSet;

use crate::common::{Ident, Result, decanonicalize, var_detail};
use crate::datamodel::base_var_name;
use crate::model::Analyzer;
use crate::reduce::format_number;
use crate::spec_err;
use crate::variable::VarType;

/// Control parameters always kept alive through dead-code elimination.
const PINNED_VAR_NAMES: &[&str] = &["_initial_time", "_final_time", "_saveper", "_time_step"];

impl Analyzer {
    /// Ensure every declared input and output names a variable.  A missing
    /// name backed by external data gets a lookup equation synthesized and
    /// read through the ordinary pipeline; otherwise the mismatch is fatal.
    pub(crate) fn check_spec(&mut self) -> Result<()> {
        let checks = [
            ("inputVars", self.spec.input_vars.clone()),
            ("outputVars", self.spec.output_vars.clone()),
        ];
        for (field, names) in checks {
            for name in names {
                let base = base_var_name(&name).to_string();
                if self.vars.var_with_name(&base).is_some() {
                    continue;
                }
                let points = self.ext_data.get(&base).cloned().unwrap_or_default();
                if points.is_empty() {
                    return spec_err!(
                        SpecMismatch,
                        format!("{} names {}", field, var_detail(&base))
                    );
                }
                let pairs: Vec<String> = points
                    .iter()
                    .map(|(t, v)| format!("({},{})", format_number(*t), format_number(*v)))
                    .collect();
                let text = format!(
                    "{} = WITH LOOKUP(Time, ({}))",
                    decanonicalize(&base),
                    pairs.join(",")
                );
                self.add_equation(&text)?;
            }
        }
        Ok(())
    }

    /// Drop every variable not reachable from the pinned control parameters,
    /// the inputs, and the outputs.  Reachability tracks base names, so all
    /// variants of a referenced array survive together.  Disabled unless both
    /// inputs and outputs are declared.
    pub(crate) fn eliminate_dead_code(&mut self) {
        if self.spec.input_vars.is_empty() || self.spec.output_vars.is_empty() {
            return;
        }

        let mut queue: Vec<Ident> = PINNED_VAR_NAMES.iter().map(|s| s.to_string()).collect();
        for name in &self.spec.input_vars {
            queue.push(base_var_name(name).to_string());
        }
        for name in &self.spec.output_vars {
            queue.push(base_var_name(name).to_string());
        }

        let mut reachable: HashSet<Ident> = HashSet::new();
        while let Some(name) = queue.pop() {
            if !reachable.insert(name.clone()) {
                continue;
            }
            for v in self.vars.vars_with_name(&name) {
                for r in v.references.iter().chain(v.init_references.iter()) {
                    queue.push(base_var_name(r).to_string());
                }
                for lookup in &v.referenced_lookup_var_names {
                    queue.push(lookup.clone());
                }
                // a function name that is a lookup called as a function
                for f in &v.referenced_function_names {
                    if let Some(candidate) = f.strip_prefix('_') {
                        let is_lookup = matches!(
                            self.vars.var_with_name(candidate).map(|lv| lv.var_type),
                            Some(VarType::Lookup)
                        );
                        if is_lookup {
                            queue.push(candidate.to_string());
                        }
                    }
                }
            }
        }

        self.vars.retain_names(&reachable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::datamodel::{ExtData, Spec};
    use crate::model::Options;
    use crate::testutils::{analyze_model, analyze_with, io_spec, output_spec};

    #[test]
    fn test_no_spec_no_elimination() {
        let analyzer = analyze_model(&["a = 1", "orphan = 2"], Spec::default()).unwrap();
        assert!(analyzer.var_with_name("_orphan").is_some());
        assert!(analyzer.var_with_name("_time").is_some());
    }

    #[test]
    fn test_outputs_only_no_elimination() {
        let analyzer = analyze_model(&["a = 1", "orphan = 2"], output_spec(&["a"])).unwrap();
        assert!(analyzer.var_with_name("_orphan").is_some());
    }

    #[test]
    fn test_elimination_drops_unreachable() {
        let analyzer = analyze_model(
            &["a = 1", "b = a + 2", "c = b * 3", "orphan = 4"],
            io_spec(&["a"], &["c"]),
        )
        .unwrap();
        assert!(analyzer.var_with_name("_orphan").is_none());
        assert!(analyzer.var_with_name("_a").is_some());
        assert!(analyzer.var_with_name("_b").is_some());
        assert!(analyzer.var_with_name("_c").is_some());
        // nothing references time here, so the placeholder is dropped too
        assert!(analyzer.var_with_name("_time").is_none());
    }

    #[test]
    fn test_elimination_keeps_pins_and_all_variants() {
        let analyzer = analyze_model(
            &[
                "DimR: r1, r2",
                "INITIAL TIME = 0",
                "FINAL TIME = 10",
                "SAVEPER = 1",
                "TIME STEP = 1",
                "v[r1] = 1",
                "v[r2] = 2",
                "u = v[r1]",
            ],
            io_spec(&["v"], &["u"]),
        )
        .unwrap();
        assert!(analyzer.var_with_name("_final_time").is_some());
        // u references only _v[_r1], but reachability is by base name
        assert_eq!(2, analyzer.vars_with_name("_v").len());
    }

    #[test]
    fn test_elimination_keeps_called_lookups() {
        let analyzer = analyze_model(
            &["t( (0,0), (1,1) )", "x = 1", "y = t(x)"],
            io_spec(&["x"], &["y"]),
        )
        .unwrap();
        assert!(analyzer.var_with_name("_t").is_some());
    }

    #[test]
    fn test_output_with_subscript_suffix() {
        let analyzer = analyze_model(
            &["DimR: r1, r2", "y[r1] = 1", "y[r2] = 2", "x = 1"],
            io_spec(&["x"], &["y[r1]"]),
        )
        .unwrap();
        assert_eq!(2, analyzer.vars_with_name("_y").len());
    }

    #[test]
    fn test_spec_mismatch_is_fatal() {
        let err = analyze_model(&["a = 1"], output_spec(&["gdp"])).unwrap_err();
        assert_eq!(ErrorCode::SpecMismatch, err.code);
        assert!(err.get_details().unwrap().contains("outputVars"));
        assert!(err.get_details().unwrap().contains("gdp"));
    }

    #[test]
    fn test_synthesized_lookup_from_ext_data() {
        let mut ext = ExtData::new();
        ext.insert("_gdp".to_string(), vec![(0.0, 100.0), (1.0, 110.0)]);
        let analyzer =
            analyze_with(&["a = 1"], output_spec(&["gdp"]), ext, Options::default()).unwrap();
        let gdp = analyzer.var_with_name("_gdp").expect("gdp synthesized");
        assert_eq!(VarType::Aux, gdp.var_type);
        assert_eq!(vec!["_time"], gdp.references);
        assert_eq!(vec![(0.0, 100.0), (1.0, 110.0)], gdp.points);
        assert_eq!("GDP = WITH LOOKUP(Time, ((0,100),(1,110)))".to_lowercase(),
                   format!("{} = {}", gdp.model_lhs, gdp.model_formula).to_lowercase());
    }
}
