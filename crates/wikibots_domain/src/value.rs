//! A JSON-compatible recursive value used for job parameters and attempt results.
//!
//! The bots this workspace serves need a schema-free bag of structured data that
//! survives a round trip through the job queue's storage layer. `Value` is that
//! bag: a tagged sum isomorphic to `serde_json::Value`, kept as a distinct type so
//! callers get explicit, defaulting getters instead of matching on `serde_json`
//! variants directly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Sequence(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Looks up `key` in a `Map` value, returning `Value::Null` if absent or if
    /// `self` isn't a map.
    pub fn get(&self, key: &str) -> Value {
        self.as_map()
            .and_then(|m| m.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn get_str_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .as_str()
            .map(str::to_owned)
            .unwrap_or_else(|| default.to_owned())
    }

    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get(key).as_i64().unwrap_or(default)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn map() -> Self {
        Value::Map(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        if let Value::Map(m) = self {
            m.insert(key.into(), value);
        }
    }

    /// Removes `key` from a `Map` value, returning its prior value (or `Null`
    /// if absent or if `self` isn't a map).
    pub fn remove(&mut self, key: &str) -> Value {
        match self {
            Value::Map(m) => m.remove(key).unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        // `serde_json::Value` is structurally identical; round-trip through its
        // serializer rather than hand-writing the conversion twice.
        serde_json::to_value(v).unwrap_or(serde_json::Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        serde_json::from_value(v).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_roundtrips() {
        let v = Value::Null;
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "null");
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Null);
    }

    #[test]
    fn map_getters_default_on_missing() {
        let v = Value::map();
        assert_eq!(v.get_str_or("x", "fallback"), "fallback");
        assert_eq!(v.get_i64_or("n", 7), 7);
    }

    #[test]
    fn map_getters_read_present_keys() {
        let mut v = Value::map();
        v.insert("name", Value::from("MyBot"));
        v.insert("count", Value::from(3i64));
        assert_eq!(v.get_str_or("name", ""), "MyBot");
        assert_eq!(v.get_i64_or("count", 0), 3);
    }

    #[test]
    fn sequence_roundtrips_through_json() {
        let v = Value::Sequence(vec![Value::from(1i64), Value::from("two"), Value::Null]);
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn converts_from_serde_json_value_and_back() {
        let sj = serde_json::json!({"a": 1, "b": [true, "x"]});
        let v: Value = sj.clone().into();
        let sj2: serde_json::Value = v.into();
        assert_eq!(sj, sj2);
    }
}
