use std::borrow::Cow;

use serde::Deserialize;

/// A JSON scalar of uncertain type. The `verifyReceipt` endpoint sends most
/// numbers and booleans as strings, but not consistently.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub(crate) fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s),
            Self::Bool(b) => Cow::Owned(b.to_string()),
            Self::Int(n) => Cow::Owned(n.to_string()),
            Self::Float(f) => Cow::Owned(f.to_string()),
        }
    }

    /// Integer value, reading the leading digits of strings like `parseInt`.
    pub(crate) fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Self::Text(s) => leading_integer(s),
            Self::Float(_) | Self::Bool(_) => None,
        }
    }

    /// Truthiness with a fixed table:
    ///
    /// | input                          | result          |
    /// |--------------------------------|-----------------|
    /// | `true` / `false`               | itself          |
    /// | number                         | non-zero        |
    /// | `"true"` (any case)            | true            |
    /// | string with an integer prefix  | prefix non-zero |
    /// | any other string               | false           |
    pub(crate) fn as_loose_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => !f.is_nan() && *f != 0.0,
            Self::Text(s) => {
                s.eq_ignore_ascii_case("true") || leading_integer(s).is_some_and(|n| n != 0)
            }
        }
    }

    pub(crate) fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

/// `parse_loose_bool` over an optional value. Absent values are false.
pub(crate) fn parse_loose_bool(value: Option<&Scalar>) -> bool {
    value.is_some_and(Scalar::as_loose_bool)
}

fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}
