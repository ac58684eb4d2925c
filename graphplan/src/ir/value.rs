// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Literal values appearing in query expressions

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A literal value in a query expression.
///
/// The planner only inspects values when a predicate is cheap to classify
/// (e.g. an integer LIMIT that allows a Top operator); everything else is
/// carried through opaquely to the produced plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl Value {
    /// The integer payload, if this is an integer literal.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "'{}'", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::Date(d) => write!(f, "date('{}')", d),
            Value::DateTime(dt) => write!(f, "datetime('{}')", dt.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_payload_extraction() {
        assert_eq!(Value::Integer(7).as_integer(), Some(7));
        assert_eq!(Value::Float(7.0).as_integer(), None);
        assert_eq!(Value::String("7".into()).as_integer(), None);
    }

    #[test]
    fn display_renders_nested_lists() {
        let v = Value::List(vec![Value::Integer(1), Value::String("a".into())]);
        assert_eq!(v.to_string(), "[1, 'a']");
    }
}
