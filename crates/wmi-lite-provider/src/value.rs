//! Raw property values

use std::fmt;

use serde::{Deserialize, Serialize};

/// Property value as handed over by a provider
///
/// Serialized untagged, so JSON and TOML scalars map directly onto variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Variant {
    /// Property present with no value
    Null,
    /// Boolean
    Bool(bool),
    /// Any integer type
    Int(i64),
    /// Floating point
    Real(f64),
    /// String, datetime and reference properties
    String(String),
    /// Array properties
    Array(Vec<Variant>),
}

impl Variant {
    /// Check for a null value
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    /// Borrow as a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Variant::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Floating point value
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::Real(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean value
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow as an array
    #[must_use]
    pub fn as_array(&self) -> Option<&[Variant]> {
        match self {
            Variant::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => Ok(()),
            Variant::Bool(b) => write!(f, "{b}"),
            Variant::Int(n) => write!(f, "{n}"),
            Variant::Real(n) => write!(f, "{n}"),
            Variant::String(s) => f.write_str(s),
            Variant::Array(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::Int(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::Int(i64::from(value))
    }
}

impl From<u32> for Variant {
    fn from(value: u32) -> Self {
        Variant::Int(i64::from(value))
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Real(value)
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl<T: Into<Variant>> From<Vec<T>> for Variant {
    fn from(values: Vec<T>) -> Self {
        Variant::Array(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Variant>> From<Option<T>> for Variant {
    fn from(value: Option<T>) -> Self {
        value.map_or(Variant::Null, Into::into)
    }
}
