// Copyright 2024 The SDC Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

use lazy_static::lazy_static;
use regex::Regex;

/// Canonical identifier: lowercase, underscore-delimited, prefixed with `_`.
pub type Ident = String;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    DoesNotExist,
    InvalidToken,
    UnrecognizedEof,
    UnrecognizedToken,
    ExtraToken,
    UnclosedComment,
    UnclosedQuotedIdent,
    UnclosedLiteral,
    ExpectedNumber,
    EmptyEquation,
    BadLookupTable,
    BadConstList,
    CircularDimension,
    DuplicateDimension,
    UnknownFamily,
    UnknownSubscript,
    BadMappingPosition,
    DirectSubscriptRead,
    UnknownReference,
    SpecMismatch,
    TypeConflict,
    DuplicateVariable,
    CircularDependency,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            DoesNotExist => "does_not_exist",
            InvalidToken => "invalid_token",
            UnrecognizedEof => "unrecognized_eof",
            UnrecognizedToken => "unrecognized_token",
            ExtraToken => "extra_token",
            UnclosedComment => "unclosed_comment",
            UnclosedQuotedIdent => "unclosed_quoted_ident",
            UnclosedLiteral => "unclosed_literal",
            ExpectedNumber => "expected_number",
            EmptyEquation => "empty_equation",
            BadLookupTable => "bad_lookup_table",
            BadConstList => "bad_const_list",
            CircularDimension => "circular_dimension",
            DuplicateDimension => "duplicate_dimension",
            UnknownFamily => "unknown_family",
            UnknownSubscript => "unknown_subscript",
            BadMappingPosition => "bad_mapping_position",
            DirectSubscriptRead => "direct_subscript_read",
            UnknownReference => "unknown_reference",
            SpecMismatch => "spec_mismatch",
            TypeConflict => "type_conflict",
            DuplicateVariable => "duplicate_variable",
            CircularDependency => "circular_dependency",
            Generic => "generic",
        };

        write!(f, "{}", name)
    }
}

/// The pipeline stage an error was raised from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Subscript,
    Variable,
    Equation,
    Spec,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub(crate) details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Subscript => "SubscriptError",
            ErrorKind::Variable => "VariableError",
            ErrorKind::Equation => "EquationError",
            ErrorKind::Spec => "SpecError",
            ErrorKind::Model => "ModelError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

/// A lexer or parser error, with byte offsets into the equation text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EquationError {
    pub start: u16,
    pub end: u16,
    pub code: ErrorCode,
}

impl fmt::Display for EquationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.end, self.code)
    }
}

impl From<EquationError> for Error {
    fn from(err: EquationError) -> Self {
        Error {
            kind: ErrorKind::Equation,
            code: err.code,
            details: Some(format!("at {}..{}", err.start, err.end)),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
pub type EquationResult<T> = result::Result<T, EquationError>;

#[macro_export]
macro_rules! eqn_err(
    ($code:tt, $start:expr, $end:expr) => {{
        use $crate::common::{EquationError, ErrorCode};
        Err(EquationError{ start: $start as u16, end: $end as u16, code: ErrorCode::$code})
    }}
);

#[macro_export]
macro_rules! sub_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Subscript, ErrorCode::$code, Some($str)))
    }}
);

#[macro_export]
macro_rules! var_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Variable, ErrorCode::$code, Some($str)))
    }}
);

#[macro_export]
macro_rules! spec_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Spec, ErrorCode::$code, Some($str)))
    }}
);

#[macro_export]
macro_rules! model_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Model, ErrorCode::$code, Some($str)))
    }}
);

/// Canonicalize a source-level variable or subscript name: strip quoting,
/// collapse runs of non-alphanumerics to a single underscore, lowercase, and
/// prefix with an underscore.  Idempotent.
pub fn canonicalize(name: &str) -> Ident {
    let name = name.trim();

    lazy_static! {
        static ref SEPARATOR_RE: Regex = Regex::new(r"[^\p{L}\p{N}]+").unwrap();
    }

    let name = {
        let bytes = name.as_bytes();
        if bytes.len() >= 2 && bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"' {
            &name[1..name.len() - 1]
        } else {
            name
        }
    };

    let name = SEPARATOR_RE.replace_all(name, "_");
    let name = name.trim_matches('_').to_lowercase();
    format!("_{}", name)
}

/// Canonical form of a function name appearing in call position.  Function
/// names carry one extra leading underscore so that stripping it recovers the
/// canonical name of a lookup variable called as a function.
pub fn canonicalize_function_name(name: &str) -> Ident {
    format!("_{}", canonicalize(name))
}

/// Restore a user-readable source form from a canonical identifier.
pub fn decanonicalize(id: &str) -> String {
    id.strip_prefix('_').unwrap_or(id).replace('_', " ")
}

/// Detail string for user-visible diagnostics: the canonical name followed by
/// the source-level form.
pub(crate) fn var_detail(cname: &str) -> String {
    format!("{} ({})", cname, decanonicalize(cname))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_canonicalize() {
        assert_eq!("_final_time", canonicalize("FINAL TIME"));
        assert_eq!("_a_b", canonicalize("   a b"));
        assert_eq!("_a_b", canonicalize("a \n b"));
        assert_eq!("_a_b", canonicalize("a.b"));
        assert_eq!("_a_d_b_c", canonicalize("\"a/d\".b c"));
        assert_eq!("_quoted", canonicalize("\"quoted\""));
        assert_eq!("_hello_there", canonicalize("Hello, There!"));
        // idempotent
        assert_eq!("_final_time", canonicalize("_final_time"));
        assert_eq!("_x", canonicalize(canonicalize("X").as_str()));
    }

    #[test]
    fn test_canonicalize_function_name() {
        assert_eq!("__integ", canonicalize_function_name("INTEG"));
        assert_eq!("__with_lookup", canonicalize_function_name("WITH LOOKUP"));
        assert_eq!(
            "__demand_curve",
            canonicalize_function_name("Demand Curve")
        );
    }

    #[test]
    fn test_decanonicalize() {
        assert_eq!("final time", decanonicalize("_final_time"));
        assert_eq!("x", decanonicalize("_x"));
        assert_eq!("", decanonicalize("_"));
    }

    #[test]
    fn test_roundtrip() {
        for name in &["TIME STEP", "Population", "a b c", "\"q.v\""] {
            let id = canonicalize(name);
            assert_eq!(id, canonicalize(&decanonicalize(&id)));
        }
    }

    proptest! {
        #[test]
        fn prop_canonical_roundtrip(s in "[a-zA-Z][a-zA-Z0-9 ]{0,24}[a-zA-Z0-9]") {
            let id = canonicalize(&s);
            prop_assert_eq!(id.clone(), canonicalize(&decanonicalize(&id)));
            // idempotence
            prop_assert_eq!(id.clone(), canonicalize(&id));
        }
    }

    #[test]
    fn test_error_display() {
        let err = Error::new(
            ErrorKind::Spec,
            ErrorCode::SpecMismatch,
            Some("outputVars: _gdp (gdp)".to_string()),
        );
        assert_eq!(
            "SpecError{spec_mismatch: outputVars: _gdp (gdp)}",
            format!("{}", err)
        );
    }
}
