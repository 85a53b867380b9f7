// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! End-to-end analyzer scenarios over small models.

use float_cmp::approx_eq;

use sdc_analyzer::datamodel::{DirectData, ExtData, LegacyRoot, ParsedModel, Spec};
use sdc_analyzer::parser::{parse_entry, parse_model};
use sdc_analyzer::{Analyzer, Options, VarType, canonicalize, decanonicalize};

fn spec_io(inputs: &[&str], outputs: &[&str]) -> Spec {
    Spec {
        input_var_names: inputs.iter().map(|s| s.to_string()).collect(),
        output_var_names: outputs.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

fn analyze_full(lines: &[&str], spec: Spec, ext_data: ExtData) -> Analyzer {
    let model = ParsedModel::Modern(parse_model(lines).expect("parse error"));
    let mut analyzer = Analyzer::new(Options::default());
    analyzer
        .read(&model, spec, ext_data, DirectData::new())
        .expect("analysis failed");
    analyzer
}

fn analyze(lines: &[&str], spec: Spec) -> Analyzer {
    analyze_full(lines, spec, ExtData::new())
}

fn listing_ids(analyzer: &Analyzer) -> Vec<String> {
    analyzer
        .listing_order()
        .unwrap()
        .iter()
        .map(|v| v.ref_id.clone())
        .collect()
}

#[test]
fn scalar_chain() {
    let analyzer = analyze(
        &["a = 1", "b = a + 2", "c = b * 3"],
        spec_io(&[], &["c"]),
    );

    assert_eq!(VarType::Const, analyzer.var_with_name("_a").unwrap().var_type);
    assert_eq!(VarType::Aux, analyzer.var_with_name("_b").unwrap().var_type);
    assert_eq!(VarType::Aux, analyzer.var_with_name("_c").unwrap().var_type);

    // no inputs declared, so dead-code elimination stays off
    assert!(analyzer.var_with_name("_a").is_some());

    let listing = listing_ids(&analyzer);
    let pos = |name: &str| listing.iter().position(|r| r == name).unwrap();
    assert!(pos("_a") < pos("_b"));
    assert!(pos("_b") < pos("_c"));
    assert_eq!(vec!["_b", "_c"], analyzer.aux_order().unwrap());
}

#[test]
fn apply_to_all_array() {
    let analyzer = analyze(
        &["R: r1, r2", "x[R] = 10", "y[R] = x[R] + 1"],
        spec_io(&[], &["y"]),
    );

    assert_eq!(1, analyzer.vars_with_name("_x").len());
    assert_eq!(1, analyzer.vars_with_name("_y").len());
    let x = analyzer.var_with_name("_x").unwrap();
    assert_eq!("_x", x.ref_id);
    assert_eq!(VarType::Const, x.var_type);
    let y = analyzer.var_with_name("_y").unwrap();
    assert_eq!(vec!["_x"], y.references);

    let listing = listing_ids(&analyzer);
    let pos = |name: &str| listing.iter().position(|r| r == name).unwrap();
    assert!(pos("_x") < pos("_y"));
}

#[test]
fn non_apply_to_all_variants() {
    let analyzer = analyze(&["R: r1, r2", "v[r1] = 1", "v[r2] = 2"], Spec::default());

    assert_eq!(
        vec!["_v[_r1]", "_v[_r2]"],
        analyzer.ref_ids_with_name("_v")
    );
    assert_eq!(Some(&vec![true]), analyzer.expansion_flags().get("_v"));

    // all variants share arity and the flag vector matches it
    for (name, flags) in analyzer.expansion_flags() {
        for v in analyzer.vars_with_name(name) {
            assert_eq!(flags.len(), v.subscripts.len());
        }
    }
}

#[test]
fn level_with_init() {
    let analyzer = analyze(
        &["s = INTEG(flow, s0)", "flow = 2", "s0 = 5"],
        spec_io(&[], &["s"]),
    );

    let s = analyzer.var_with_name("_s").unwrap();
    assert_eq!(VarType::Level, s.var_type);
    assert!(s.has_init_value);
    assert_eq!(vec!["_flow"], s.references);
    assert_eq!(vec!["_s0"], s.init_references);

    // s0 lands in the const bucket, ahead of the init bucket holding s
    let listing = listing_ids(&analyzer);
    let pos = |name: &str| listing.iter().position(|r| r == name).unwrap();
    assert!(pos("_s0") < pos("_s"));
    assert!(pos("_flow") < pos("_s"));
    assert_eq!(vec!["_s"], analyzer.init_order().unwrap());
    assert_eq!(vec!["_s"], analyzer.level_order().unwrap());
}

#[test]
fn mutual_levels_do_not_cycle() {
    let analyzer = analyze(&["a = INTEG(b, 0)", "b = INTEG(a, 0)"], Spec::default());

    assert_eq!(VarType::Level, analyzer.var_with_name("_a").unwrap().var_type);
    assert_eq!(VarType::Level, analyzer.var_with_name("_b").unwrap().var_type);
    // the reversed edge pair cancels, leaving two independent nodes
    assert_eq!(vec!["_a", "_b"], analyzer.level_order().unwrap());
}

#[test]
fn spec_supplied_external_data() {
    let mut ext = ExtData::new();
    ext.insert("_gdp".to_string(), vec![(0.0, 100.0), (1.0, 110.0)]);
    let analyzer = analyze_full(&["a = 1"], spec_io(&[], &["gdp"]), ext);

    let gdp = analyzer.var_with_name("_gdp").expect("gdp synthesized");
    assert_eq!(VarType::Aux, gdp.var_type);
    assert_eq!(vec!["_time"], gdp.references);
    assert_eq!(vec![(0.0, 100.0), (1.0, 110.0)], gdp.points);
    assert!(
        gdp.referenced_function_names
            .contains(&"__with_lookup".to_string())
    );
}

#[test]
fn legacy_and_modern_shapes_agree() {
    let lines = [
        "R: r1, r2",
        "x[R] = 10",
        "y[R] = x[R] + 1",
        "s = INTEG(y[r1], 0)",
    ];
    let modern = ParsedModel::Modern(parse_model(&lines).unwrap());
    let legacy = ParsedModel::Legacy(LegacyRoot {
        entries: lines.iter().map(|l| parse_entry(l).unwrap()).collect(),
    });

    let mut a = Analyzer::new(Options::default());
    a.read(&modern, Spec::default(), ExtData::new(), DirectData::new())
        .unwrap();
    let mut b = Analyzer::new(Options::default());
    b.read(&legacy, Spec::default(), ExtData::new(), DirectData::new())
        .unwrap();

    assert_eq!(a.json_list().unwrap(), b.json_list().unwrap());
}

#[test]
fn const_and_data_declarations_reconcile() {
    let analyzer = analyze(&["price = 42", "price"], Spec::default());

    let variants = analyzer.vars_with_name("_price");
    assert_eq!(1, variants.len());
    assert_eq!(VarType::Data, variants[0].var_type);
    assert_eq!(2, variants[0].points.len());
    let (x0, y0) = variants[0].points[0];
    let (x1, y1) = variants[0].points[1];
    assert!(approx_eq!(f64, -1e308, x0));
    assert!(approx_eq!(f64, 1e308, x1));
    assert!(approx_eq!(f64, 42.0, y0));
    assert!(approx_eq!(f64, 42.0, y1));
}

#[test]
fn alias_dimension_participates_like_its_family() {
    let analyzer = analyze(
        &["DimA: a1, a2", "DimB <-> DimA", "x[DimA] = 1", "y[DimB] = 2"],
        Spec::default(),
    );

    let table = analyzer.subscript_table();
    let alias = table.dimension("_dimb").unwrap();
    assert_eq!(vec!["_a1", "_a2"], alias.value);
    assert_eq!("_dima", alias.family);
    assert!(analyzer.var_with_name("_y").is_some());
}

#[test]
fn every_surviving_ref_resolves() {
    let analyzer = analyze(
        &[
            "R: r1, r2",
            "v[r1] = 1",
            "v[r2] = 2",
            "u[R] = v[R] * 2",
            "s = INTEG(u[r1], v[r2])",
        ],
        Spec::default(),
    );

    for v in analyzer.variables() {
        assert_eq!(
            v.ref_id,
            analyzer.var_with_ref_id(&v.ref_id).unwrap().ref_id
        );
        for r in v.references.iter().chain(v.init_references.iter()) {
            assert!(
                analyzer.var_with_ref_id(r).is_some(),
                "unresolved {} from {}",
                r,
                v.ref_id
            );
        }
    }
}

#[test]
fn canonical_roundtrip_laws() {
    let analyzer = analyze(
        &["DimA: a1, a2", "FINAL TIME = 10", "x[DimA] = 1", "long name here = 2"],
        Spec::default(),
    );

    for name in analyzer.var_names() {
        assert_eq!(name, canonicalize(&decanonicalize(&name)));
        assert_eq!(
            analyzer.c_name(&name),
            analyzer.c_name(&analyzer.vensim_name(&analyzer.c_name(&name)))
        );
    }
}

#[test]
fn json_listing_is_byte_stable_across_instances() {
    let lines = [
        "DimA: a1, a2",
        "x[DimA] = 1, 2",
        "y[DimA] = x[DimA] * 2",
        "s = INTEG(y[a1], 0)",
    ];
    let mut listings = Vec::new();
    for _ in 0..3 {
        let analyzer = analyze(&lines, Spec::default());
        listings.push(analyzer.json_list().unwrap());
    }
    assert_eq!(listings[0], listings[1]);
    assert_eq!(listings[0], listings[2]);
}

#[test]
fn reset_supports_repeated_compilations() {
    let lines = ["a = 1", "b = a + 2"];
    let model = ParsedModel::Modern(parse_model(&lines).unwrap());
    let mut analyzer = Analyzer::new(Options::default());
    analyzer
        .read(&model, Spec::default(), ExtData::new(), DirectData::new())
        .unwrap();
    let first = analyzer.json_list().unwrap();

    analyzer
        .read(&model, Spec::default(), ExtData::new(), DirectData::new())
        .unwrap();
    assert_eq!(first, analyzer.json_list().unwrap());
    assert_eq!(1, analyzer.vars_with_name("_b").len());
}

#[test]
fn separated_constant_lists() {
    let analyzer = analyze(&["DimA: a1, a2", "k[DimA] = 3, 4"], Spec::default());

    let variants = analyzer.vars_with_name("_k");
    assert_eq!(2, variants.len());
    assert_eq!("_k[_a1]", variants[0].ref_id);
    assert_eq!(VarType::Const, variants[0].var_type);
    assert_eq!("3", variants[0].model_formula);
    assert_eq!("4", variants[1].model_formula);
}
