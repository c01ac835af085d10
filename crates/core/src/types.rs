//! Parameter type grammar and the validator registry.
//!
//! Scalar type names map to validators through a fixed registry table;
//! list validators compose over scalar validators. The surface grammar is
//! `T` for scalars and bare lists, `list[U]` for typed lists, and the legacy
//! sized-list spelling `S[ident]` where the bracketed identifier names the
//! driving size parameter (not checked by this layer).

use crate::value::Value;

/// Fixed-width integer widths accepted by the registry.
const INT_WIDTHS: [u16; 6] = [8, 16, 32, 64, 128, 256];

/// A scalar parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Str,
    Int,
    Bool,
    Float,
    File,
    /// Fixed-width signed integer (`i8` .. `i256`).
    Signed(u16),
    /// Fixed-width unsigned integer (`u8` .. `u256`).
    Unsigned(u16),
}

/// A full parameter type: a scalar, or a list composed over one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Scalar(ScalarType),
    /// `None` element type means a heterogeneous `list`.
    List(Option<ScalarType>),
}

/// Registry lookup: scalar type name to validator tag.
fn scalar_from_name(name: &str) -> Option<ScalarType> {
    match name {
        "str" | "string" => return Some(ScalarType::Str),
        "int" | "integer" => return Some(ScalarType::Int),
        "bool" | "boolean" => return Some(ScalarType::Bool),
        "float" => return Some(ScalarType::Float),
        "file" => return Some(ScalarType::File),
        _ => {}
    }
    let (head, width) = name.split_at(1.min(name.len()));
    if let Ok(w) = width.parse::<u16>() {
        if INT_WIDTHS.contains(&w) {
            match head {
                "i" => return Some(ScalarType::Signed(w)),
                "u" => return Some(ScalarType::Unsigned(w)),
                _ => {}
            }
        }
    }
    None
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ScalarType {
    pub fn name(&self) -> String {
        match self {
            ScalarType::Str => "str".to_owned(),
            ScalarType::Int => "int".to_owned(),
            ScalarType::Bool => "bool".to_owned(),
            ScalarType::Float => "float".to_owned(),
            ScalarType::File => "file".to_owned(),
            ScalarType::Signed(w) => format!("i{}", w),
            ScalarType::Unsigned(w) => format!("u{}", w),
        }
    }

    /// Validate a single scalar value, returning the normalized value.
    pub fn check(&self, value: &Value) -> Result<Value, String> {
        match (self, value) {
            (ScalarType::Str, Value::Str(_)) => Ok(value.clone()),
            (ScalarType::Bool, Value::Bool(_)) => Ok(value.clone()),
            (ScalarType::Int, Value::Int(_)) => Ok(value.clone()),
            (ScalarType::Float, Value::Float(_)) => Ok(value.clone()),
            // integers widen to float
            (ScalarType::Float, Value::Int(i)) => Ok(Value::Float(*i as f64)),
            (ScalarType::File, Value::Str(s)) => {
                if s.is_empty() {
                    Err("empty file name".to_owned())
                } else {
                    Ok(value.clone())
                }
            }
            (ScalarType::Signed(w), Value::Int(i)) => {
                if *w >= 128 || (-(1i128 << (w - 1))..(1i128 << (w - 1))).contains(i) {
                    Ok(value.clone())
                } else {
                    Err(format!("{} does not fit in i{}", i, w))
                }
            }
            (ScalarType::Unsigned(w), Value::Int(i)) => {
                if *i < 0 {
                    Err(format!("{} does not fit in u{}", i, w))
                } else if *w >= 128 || u128::try_from(*i).map_or(false, |u| u < (1u128 << w)) {
                    Ok(value.clone())
                } else {
                    Err(format!("{} does not fit in u{}", i, w))
                }
            }
            _ => Err(format!("expected {}, got {}", self.name(), value.kind())),
        }
    }
}

impl ParamType {
    /// Parse a surface type specification through the registry.
    pub fn parse(spec: &str) -> Result<ParamType, String> {
        let spec = spec.trim();
        if let Some((head, rest)) = spec.split_once('[') {
            let inner = rest
                .strip_suffix(']')
                .ok_or_else(|| format!("malformed type '{}'", spec))?;
            if head == "list" {
                let elem = scalar_from_name(inner)
                    .ok_or_else(|| format!("unknown element type '{}' in '{}'", inner, spec))?;
                return Ok(ParamType::List(Some(elem)));
            }
            // legacy sized-list spelling: element type head, size parameter name inner
            if let Some(elem) = scalar_from_name(head) {
                if is_ident(inner) {
                    return Ok(ParamType::List(Some(elem)));
                }
                return Err(format!("invalid size parameter name '{}' in '{}'", inner, spec));
            }
            return Err(format!("unknown type '{}'", spec));
        }
        if spec == "list" {
            return Ok(ParamType::List(None));
        }
        scalar_from_name(spec)
            .map(ParamType::Scalar)
            .ok_or_else(|| format!("unknown type '{}'", spec))
    }

    /// Base type name for the dump format (`int`, `list`, ...).
    pub fn base_name(&self) -> String {
        match self {
            ParamType::Scalar(s) => s.name(),
            ParamType::List(_) => "list".to_owned(),
        }
    }

    /// Full spelling for the dump format (`list[int]`, `str`, ...).
    pub fn full_name(&self) -> String {
        match self {
            ParamType::Scalar(s) => s.name(),
            ParamType::List(None) => "list".to_owned(),
            ParamType::List(Some(elem)) => format!("list[{}]", elem.name()),
        }
    }

    /// Validate a value against this type, returning the normalized value.
    ///
    /// `Nil` passes only when `allow_empty` is set on the declaration.
    pub fn check(&self, value: &Value, allow_empty: bool) -> Result<Value, String> {
        if value.is_nil() {
            return if allow_empty {
                Ok(Value::Nil)
            } else {
                Err(format!("{} value required, got NIL", self.full_name()))
            };
        }
        match self {
            ParamType::Scalar(s) => s.check(value),
            ParamType::List(elem) => match value {
                Value::List(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        match elem {
                            Some(s) => out.push(
                                s.check(item)
                                    .map_err(|e| format!("element {}: {}", i, e))?,
                            ),
                            None => out.push(item.clone()),
                        }
                    }
                    Ok(Value::List(out))
                }
                other => Err(format!("expected {}, got {}", self.full_name(), other.kind())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_knows_all_scalar_names() {
        assert_eq!(ParamType::parse("str").unwrap(), ParamType::Scalar(ScalarType::Str));
        assert_eq!(ParamType::parse("integer").unwrap(), ParamType::Scalar(ScalarType::Int));
        assert_eq!(
            ParamType::parse("u16").unwrap(),
            ParamType::Scalar(ScalarType::Unsigned(16))
        );
        assert_eq!(
            ParamType::parse("i256").unwrap(),
            ParamType::Scalar(ScalarType::Signed(256))
        );
        assert!(ParamType::parse("u12").is_err());
        assert!(ParamType::parse("quux").is_err());
    }

    #[test]
    fn list_grammar_accepts_both_spellings() {
        assert_eq!(ParamType::parse("list").unwrap(), ParamType::List(None));
        assert_eq!(
            ParamType::parse("list[int]").unwrap(),
            ParamType::List(Some(ScalarType::Int))
        );
        // legacy sized-list form: element type, then the size parameter name
        assert_eq!(
            ParamType::parse("str[items]").unwrap(),
            ParamType::List(Some(ScalarType::Str))
        );
        assert!(ParamType::parse("list[").is_err());
        assert!(ParamType::parse("str[0bad]").is_err());
    }

    #[test]
    fn fixed_width_range_checks() {
        let u8t = ParamType::parse("u8").unwrap();
        assert!(u8t.check(&Value::Int(255), false).is_ok());
        assert!(u8t.check(&Value::Int(256), false).is_err());
        assert!(u8t.check(&Value::Int(-1), false).is_err());

        let i8t = ParamType::parse("i8").unwrap();
        assert!(i8t.check(&Value::Int(-128), false).is_ok());
        assert!(i8t.check(&Value::Int(128), false).is_err());

        // widths of 128 and above hold every representable integer
        let u256 = ParamType::parse("u256").unwrap();
        assert!(u256.check(&Value::Int(i128::MAX), false).is_ok());
        assert!(u256.check(&Value::Int(-1), false).is_err());
    }

    #[test]
    fn nil_requires_allow_empty() {
        let t = ParamType::parse("int").unwrap();
        assert!(t.check(&Value::Nil, false).is_err());
        assert_eq!(t.check(&Value::Nil, true).unwrap(), Value::Nil);
    }

    #[test]
    fn int_widens_to_float_but_not_back() {
        let f = ParamType::parse("float").unwrap();
        assert_eq!(f.check(&Value::Int(2), false).unwrap(), Value::Float(2.0));
        let i = ParamType::parse("int").unwrap();
        assert!(i.check(&Value::Float(2.0), false).is_err());
    }

    #[test]
    fn typed_list_checks_elements() {
        let t = ParamType::parse("list[u8]").unwrap();
        let ok = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert!(t.check(&ok, false).is_ok());
        let bad = Value::List(vec![Value::Int(1), Value::Int(300)]);
        let err = t.check(&bad, false).unwrap_err();
        assert!(err.contains("element 1"));
    }
}
