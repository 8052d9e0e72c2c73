//! Value types for Chronicle
//!
//! This module defines the canonical Value type used by every structural
//! operation in the engine: redaction, diff/patch, and rendering.
//!
//! ## The Seven Types
//!
//! 1. `Null` - JSON null / absence of value
//! 2. `Bool` - Boolean true or false
//! 3. `Int` - 64-bit signed integer
//! 4. `Float` - 64-bit IEEE-754 floating point
//! 5. `String` - UTF-8 encoded string
//! 6. `Array` - Ordered sequence of values
//! 7. `Object` - String-keyed map of values
//!
//! ## Equality Rules
//!
//! - Different types are NEVER equal (no type coercion)
//! - `Int(1)` != `Float(1.0)`
//! - Float uses IEEE-754 equality: `NaN != NaN`, `-0.0 == 0.0`
//!
//! Every payload entering the engine originates as JSON from the client
//! layer, so lossless conversion to and from `serde_json::Value` is part of
//! the contract. JSON integers that fit i64 map to `Int`; everything else
//! numeric maps to `Float`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical Chronicle value type
///
/// This is the ONLY value model engine components operate on. The redactor
/// and the diff/patch algebra are defined over this enum, not over any one
/// serialization library's tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// JSON null / absence of value
    Null,

    /// Boolean true or false
    Bool(bool),

    /// 64-bit signed integer
    Int(i64),

    /// 64-bit IEEE-754 floating point
    Float(f64),

    /// UTF-8 encoded string
    String(String),

    /// Ordered sequence of values
    Array(Vec<Value>),

    /// String-keyed map of values
    Object(HashMap<String, Value>),
}

impl Value {
    /// Returns the type name as a string (for error messages)
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
        }
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as array slice
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to get as object reference
    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Build an empty object value
    pub fn empty_object() -> Self {
        Value::Object(HashMap::new())
    }

    /// Convert from a `serde_json::Value`
    ///
    /// Integers that fit in i64 become `Int`; all other numbers become
    /// `Float`. Lossless for everything the client layer can produce.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert into a `serde_json::Value`
    ///
    /// Non-finite floats render as null, matching what a JSON writer would
    /// otherwise reject.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "Null");
        assert_eq!(Value::Bool(true).type_name(), "Bool");
        assert_eq!(Value::Int(1).type_name(), "Int");
        assert_eq!(Value::Float(1.5).type_name(), "Float");
        assert_eq!(Value::String("x".into()).type_name(), "String");
        assert_eq!(Value::Array(vec![]).type_name(), "Array");
        assert_eq!(Value::empty_object().type_name(), "Object");
    }

    #[test]
    fn test_no_type_coercion() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Bool(false), Value::Int(0));
    }

    #[test]
    fn test_json_round_trip() {
        let json = serde_json::json!({
            "cmd": "login",
            "count": 3,
            "latency": 12.5,
            "ok": true,
            "args": ["a", "b"],
            "nested": {"inner": null}
        });
        let value = Value::from_json(json.clone());
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_large_integers_stay_int() {
        let json = serde_json::json!(i64::MAX);
        assert_eq!(Value::from_json(json), Value::Int(i64::MAX));
    }

    #[test]
    fn test_accessors() {
        let v = Value::from_json(serde_json::json!({"total_runs": 5}));
        let obj = v.as_object().unwrap();
        assert_eq!(obj.get("total_runs").and_then(Value::as_int), Some(5));
        assert!(v.as_array().is_none());
    }
}
