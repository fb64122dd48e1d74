//! Predicate expressions over record fields.

use crate::record::Record;
use keel_common::{FieldValue, KeelError, Result};
use std::cmp::Ordering;

/// Comparison operator of a binary predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn matches(&self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        f.write_str(symbol)
    }
}

/// Immutable filter expression evaluated against materialized records.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `field op value`
    Binary {
        field: String,
        op: CompareOp,
        value: FieldValue,
    },
    /// `field BETWEEN min AND max`, inclusive on both sides.
    Between {
        field: String,
        min: FieldValue,
        max: FieldValue,
    },
}

impl Predicate {
    /// Builds a binary comparison predicate.
    pub fn binary(field: impl Into<String>, op: CompareOp, value: impl Into<FieldValue>) -> Self {
        Predicate::Binary {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Builds an inclusive between predicate.
    pub fn between(
        field: impl Into<String>,
        min: impl Into<FieldValue>,
        max: impl Into<FieldValue>,
    ) -> Self {
        Predicate::Between {
            field: field.into(),
            min: min.into(),
            max: max.into(),
        }
    }

    /// Name of the filtered field.
    pub fn field(&self) -> &str {
        match self {
            Predicate::Binary { field, .. } | Predicate::Between { field, .. } => field,
        }
    }

    /// Evaluates the predicate against one record.
    ///
    /// A record without the field does not match. A value whose type differs
    /// from the field's is a `PredicateTypeMismatch`.
    pub fn evaluate(&self, record: &Record) -> Result<bool> {
        match self {
            Predicate::Binary { field, op, value } => {
                let Some(actual) = record.get(field) else {
                    return Ok(false);
                };
                let ord = self.compare(field, actual, value)?;
                Ok(op.matches(ord))
            }
            Predicate::Between { field, min, max } => {
                let Some(actual) = record.get(field) else {
                    return Ok(false);
                };
                let lo = self.compare(field, actual, min)?;
                let hi = self.compare(field, actual, max)?;
                Ok(lo != Ordering::Less && hi != Ordering::Greater)
            }
        }
    }

    fn compare(&self, field: &str, actual: &FieldValue, expected: &FieldValue) -> Result<Ordering> {
        actual.try_cmp(expected).ok_or_else(|| {
            KeelError::PredicateTypeMismatch {
                field: field.to_string(),
                field_type: actual.type_name().to_string(),
                value_type: expected.type_name().to_string(),
            }
        })
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Binary { field, op, value } => write!(f, "{field} {op} {value}"),
            Predicate::Between { field, min, max } => {
                write!(f, "{field} BETWEEN {min} AND {max}")
            }
        }
    }
}
