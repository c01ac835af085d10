//! Literal parameter values and their JSON boundary conversions.

use serde_json::Number;

/// Marker prefix for parameter references (`^other:name`).
pub const REF_MARKER: char = '^';

/// A literal parameter value.
///
/// Integers are carried as `i128`; every value the JSON boundary can produce
/// fits, and fixed-width range checks up to 256 bits reduce to sign checks.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// Convert a decoded JSON value from the front-end into an engine value.
    /// Objects are rejected; they are namespaces, not literals.
    pub fn from_json(v: &serde_json::Value) -> Result<Value, String> {
        match v {
            serde_json::Value::Null => Ok(Value::Nil),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i as i128))
                } else if let Some(u) = n.as_u64() {
                    Ok(Value::Int(u as i128))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Float(f))
                } else {
                    Err(format!("unrepresentable number: {}", n))
                }
            }
            serde_json::Value::String(s) => Ok(Value::Str(s.clone())),
            serde_json::Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Value::from_json(item)?);
                }
                Ok(Value::List(out))
            }
            serde_json::Value::Object(_) => Err("mapping is not a literal value".to_owned()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Nil => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => {
                if let Ok(small) = i64::try_from(*i) {
                    serde_json::Value::Number(small.into())
                } else if let Ok(big) = u64::try_from(*i) {
                    serde_json::Value::Number(big.into())
                } else {
                    // beyond u64: the JSON boundary cannot carry it exactly
                    serde_json::Value::String(i.to_string())
                }
            }
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }

    /// Short kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "NIL",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// The referenced parameter name if this value is a `^name` reference.
    pub fn as_ref_name(&self) -> Option<&str> {
        match self {
            Value::Str(s) => s.strip_prefix(REF_MARKER),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip_preserves_literals() {
        for raw in [json!(null), json!(true), json!(3), json!(2.5), json!("x"), json!([1, 2])] {
            let v = Value::from_json(&raw).unwrap();
            assert_eq!(v.to_json(), raw);
        }
    }

    #[test]
    fn objects_are_rejected() {
        assert!(Value::from_json(&json!({"a": 1})).is_err());
    }

    #[test]
    fn reference_marker_is_detected() {
        assert_eq!(
            Value::Str("^cpu:cores".to_owned()).as_ref_name(),
            Some("cpu:cores")
        );
        assert_eq!(Value::Str("cpu".to_owned()).as_ref_name(), None);
        assert_eq!(Value::Int(1).as_ref_name(), None);
    }
}
