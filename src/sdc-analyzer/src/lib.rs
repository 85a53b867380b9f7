// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Semantic analyzer for Vensim-style system dynamics models.
//!
//! Given a parsed model (subscript range declarations plus equations) and a
//! spec document naming inputs and outputs, the analyzer resolves subscript
//! semantics, classifies every variable (const, lookup, data, aux, level),
//! computes per-equation reference graphs, removes dead computation, and
//! produces the evaluation orders the code generator schedules from.

#![forbid(unsafe_code)]

pub mod ast;
mod check;
pub mod common;
pub mod datamodel;
mod equation;
pub mod json;
mod model;
mod order;
pub mod parser;
mod read;
mod reduce;
pub mod subscript;
#[cfg(test)]
mod testutils;
mod token;
pub mod variable;

pub use self::common::{Error, ErrorCode, ErrorKind, Result, canonicalize, decanonicalize};
pub use self::datamodel::{DirectData, ExtData, ParsedModel, Spec};
pub use self::model::{Analyzer, Options};
pub use self::reduce::ReduceMode;
pub use self::variable::{VarType, Variable};
