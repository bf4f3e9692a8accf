use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

use crate::core::hash::HashMap;

/// An integer type for WAMP messages.
pub type Integer = u64;

/// Keyword arguments and results, keyed by name.
pub type Dictionary = HashMap<String, Value>;

/// Positional arguments and results.
pub type List = Vec<Value>;

/// A value carried in a WAMP message.
///
/// Non-negative integers are always [`Value::Integer`]. Only negative integers use
/// [`Value::SignedInteger`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(Integer),
    SignedInteger(i64),
    Float(f64),
    String(String),
    List(List),
    Dictionary(Dictionary),
}

impl Value {
    /// Checks if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The value as an [`Integer`].
    pub fn integer(&self) -> Option<Integer> {
        match self {
            Self::Integer(val) => Some(*val),
            Self::SignedInteger(val) => Integer::try_from(*val).ok(),
            _ => None,
        }
    }

    /// The value as a signed integer.
    pub fn signed_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(val) => i64::try_from(*val).ok(),
            Self::SignedInteger(val) => Some(*val),
            _ => None,
        }
    }

    /// The value as a floating point number.
    ///
    /// Integers are converted, possibly losing precision.
    pub fn float(&self) -> Option<f64> {
        match self {
            Self::Float(val) => Some(*val),
            Self::Integer(val) => Some(*val as f64),
            Self::SignedInteger(val) => Some(*val as f64),
            _ => None,
        }
    }

    /// The value as a [`str`].
    pub fn string(&self) -> Option<&str> {
        match self {
            Self::String(val) => Some(val),
            _ => None,
        }
    }

    /// The value as a [`bool`].
    pub fn bool(&self) -> Option<bool> {
        match self {
            Self::Bool(val) => Some(*val),
            _ => None,
        }
    }

    /// The value as a [`Dictionary`].
    pub fn dictionary(&self) -> Option<&Dictionary> {
        match self {
            Self::Dictionary(val) => Some(val),
            _ => None,
        }
    }

    /// The value as a [`List`].
    pub fn list(&self) -> Option<&List> {
        match self {
            Self::List(val) => Some(val),
            _ => None,
        }
    }
}

impl From<Integer> for Value {
    fn from(value: Integer) -> Self {
        Self::Integer(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        match Integer::try_from(value) {
            Ok(value) => Self::Integer(value),
            Err(_) => Self::SignedInteger(value),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Dictionary> for Value {
    fn from(value: Dictionary) -> Self {
        Self::Dictionary(value)
    }
}

impl From<List> for Value {
    fn from(value: List) -> Self {
        Self::List(value)
    }
}

/// Error for a JSON value that has no WAMP representation.
#[derive(Debug, Error)]
#[error("{0} cannot be represented as a WAMP value")]
pub struct InvalidValue(String);

impl TryFrom<serde_json::Value> for Value {
    type Error = InvalidValue;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(val) => Ok(Self::Bool(val)),
            serde_json::Value::String(val) => Ok(Self::String(val)),
            serde_json::Value::Number(number) => {
                if let Some(val) = number.as_u64() {
                    Ok(Self::Integer(val))
                } else if let Some(val) = number.as_i64() {
                    Ok(Self::SignedInteger(val))
                } else {
                    number
                        .as_f64()
                        .map(Self::Float)
                        .ok_or_else(|| InvalidValue(number.to_string()))
                }
            }
            serde_json::Value::Array(values) => Ok(Self::List(
                values
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            )),
            serde_json::Value::Object(_) => dictionary_from_json(value).map(Self::Dictionary),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(val) => Self::Bool(val),
            Value::Integer(val) => Self::from(val),
            Value::SignedInteger(val) => Self::from(val),
            // JSON has no representation for NaN or infinity.
            Value::Float(val) => serde_json::Number::from_f64(val)
                .map(Self::Number)
                .unwrap_or(Self::Null),
            Value::String(val) => Self::String(val),
            Value::List(val) => Self::Array(val.into_iter().map(Self::from).collect()),
            Value::Dictionary(val) => Self::Object(
                val.into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
        }
    }
}

/// Builds keyword arguments from a JSON object.
///
/// Useful for writing request arguments with [`serde_json::json`].
pub fn dictionary_from_json(value: serde_json::Value) -> Result<Dictionary, InvalidValue> {
    match value {
        serde_json::Value::Object(object) => object
            .into_iter()
            .map(|(key, value)| -> Result<(String, Value), InvalidValue> {
                Ok((key, Value::try_from(value)?))
            })
            .collect(),
        value => Err(InvalidValue(value.to_string())),
    }
}
