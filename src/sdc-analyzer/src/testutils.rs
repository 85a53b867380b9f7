// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::common::Result;
use crate::datamodel::{DirectData, ExtData, ParsedModel, Spec};
use crate::model::{Analyzer, Options};
use crate::parser::parse_model;

pub(crate) fn analyze_model(lines: &[&str], spec: Spec) -> Result<Analyzer> {
    analyze_with(lines, spec, ExtData::new(), Options::default())
}

pub(crate) fn analyze_with(
    lines: &[&str],
    spec: Spec,
    ext_data: ExtData,
    options: Options,
) -> Result<Analyzer> {
    let model = ParsedModel::Modern(parse_model(lines).expect("parse error"));
    let mut analyzer = Analyzer::new(options);
    analyzer.read(&model, spec, ext_data, DirectData::new())?;
    Ok(analyzer)
}

pub(crate) fn output_spec(outputs: &[&str]) -> Spec {
    Spec {
        output_var_names: outputs.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

pub(crate) fn io_spec(inputs: &[&str], outputs: &[&str]) -> Spec {
    Spec {
        input_var_names: inputs.iter().map(|s| s.to_string()).collect(),
        output_var_names: outputs.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}
