//! Tagged runtime values.
//!
//! Numbers are IEEE-754 doubles and the sole numeric type. Lists and maps
//! are reference values: clones share the underlying storage so composite
//! writes update in place across aliases, and map keys are the string
//! rendering of the key value, which also fixes iteration order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::evaluator::rt_func::Closure;
use crate::util::types::EcalFunction;

pub type ListRef = Arc<RwLock<Vec<Value>>>;
pub type MapRef = Arc<RwLock<BTreeMap<String, Value>>>;

/// A callable value, either an in-language closure or a host function.
#[derive(Clone)]
pub enum FunctionValue {
    Closure(Arc<Closure>),
    Host(Arc<dyn EcalFunction>),
}

impl FunctionValue {
    pub fn doc_string(&self) -> String {
        match self {
            FunctionValue::Closure(c) => c.doc.clone().unwrap_or_default(),
            FunctionValue::Host(h) => h.doc_string(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            FunctionValue::Closure(c) => c.name.clone().unwrap_or_else(|| "anonymous".into()),
            FunctionValue::Host(_) => "external".into(),
        }
    }
}

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    List(ListRef),
    Map(MapRef),
    Func(FunctionValue),
}

// Rendering descends into composites; cyclic objects are cut off here.
const MAX_RENDER_DEPTH: usize = 64;

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(RwLock::new(items)))
    }

    pub fn map(entries: BTreeMap<String, Value>) -> Value {
        Value::Map(Arc::new(RwLock::new(entries)))
    }

    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    /// Truthiness used by guards: everything is true except null, false,
    /// zero, the empty string and empty collections.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.read().is_empty(),
            Value::Map(m) => !m.read().is_empty(),
            Value::Func(_) => true,
        }
    }

    /// Numeric coercion: numbers pass through, strings are parsed as
    /// decimal. Everything else is not a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Func(_) => "function",
        }
    }

    /// The string rendering used for map keys and list index coercion.
    pub fn key_string(&self) -> String {
        self.to_string()
    }

    /// Canonical JSON-like rendering. Integral numbers render without a
    /// fractional part, map keys are sorted, functions render as a tag.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_level(0)
    }

    fn to_json_level(&self, level: usize) -> serde_json::Value {
        if level > MAX_RENDER_DEPTH {
            return serde_json::Value::String("...".into());
        }

        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Value::from(*n)
                }
            }
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(l) => serde_json::Value::Array(
                l.read().iter().map(|v| v.to_json_level(level + 1)).collect(),
            ),
            Value::Map(m) => serde_json::Value::Object(
                m.read()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json_level(level + 1)))
                    .collect(),
            ),
            Value::Func(f) => serde_json::Value::String(format!("ecal.function: {}", f.name())),
        }
    }

    /// Reconstruct a value from its JSON rendering (used by the debugger
    /// when injecting scope snapshots).
    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Str(s) => write!(f, "{}", s),
            v => write!(
                f,
                "{}",
                serde_json::to_string(&v.to_json()).map_err(|_| fmt::Error)?
            ),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            v => write!(f, "{}", v),
        }
    }
}

/// Structural equality for lists and maps, identity for functions.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (Value::Func(a), Value::Func(b)) => match (a, b) {
                (FunctionValue::Closure(x), FunctionValue::Closure(y)) => Arc::ptr_eq(x, y),
                (FunctionValue::Host(x), FunctionValue::Host(y)) => Arc::ptr_eq(x, y),
                _ => false,
            },
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_true());
        assert!(!Value::Bool(false).is_true());
        assert!(!Value::Number(0.0).is_true());
        assert!(!Value::str("").is_true());
        assert!(!Value::list(vec![]).is_true());
        assert!(!Value::map(BTreeMap::new()).is_true());

        assert!(Value::Bool(true).is_true());
        assert!(Value::Number(-1.5).is_true());
        assert!(Value::str("x").is_true());
        assert!(Value::list(vec![Value::Null]).is_true());
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(Value::Number(2.0).as_number(), Some(2.0));
        assert_eq!(Value::str("4.5").as_number(), Some(4.5));
        assert_eq!(Value::str(" 7 ").as_number(), Some(7.0));
        assert_eq!(Value::str("x").as_number(), None);
        assert_eq!(Value::Null.as_number(), None);
    }

    #[test]
    fn test_rendering() {
        assert_eq!(Value::Number(123.0).to_string(), "123");
        assert_eq!(Value::Number(1.25).to_string(), "1.25");
        assert_eq!(Value::str("abc").to_string(), "abc");

        let l = Value::list(vec![Value::Number(1.0), Value::str("a"), Value::Null]);
        assert_eq!(l.to_string(), r#"[1,"a",null]"#);

        let mut entries = BTreeMap::new();
        entries.insert("b".to_string(), Value::Number(123.0));
        assert_eq!(Value::map(entries).to_string(), r#"{"b":123}"#);
    }

    #[test]
    fn test_structural_equality() {
        let a = Value::list(vec![Value::Number(1.0), Value::str("x")]);
        let b = Value::list(vec![Value::Number(1.0), Value::str("x")]);
        assert_eq!(a, b);

        let c = Value::list(vec![Value::Number(2.0)]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_shared_updates() {
        let a = Value::list(vec![Value::Number(1.0)]);
        let b = a.clone();

        if let Value::List(l) = &a {
            l.write().push(Value::Number(2.0));
        }
        assert_eq!(b.to_string(), "[1,2]");
    }
}
