//! Tagged property values carried by graph nodes and edges.
//!
//! Property maps are keyed by term IRIs and hold [`PropertyValue`]s: a
//! small closed set of scalar and list shapes. All cross-type
//! comparisons are explicit; the total order over variants is
//! `Null < Bool < Int < Str < List`.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// A property value attached to a node or an edge.
///
/// Equality is structural. Cloning produces an independent copy; list
/// elements are reference-counted strings, so clones are cheap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PropertyValue {
    /// No value. Distinct from the key being absent only in that the
    /// key is enumerable.
    #[default]
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// String scalar.
    Str(Arc<str>),
    /// Ordered list of strings.
    List(Vec<Arc<str>>),
}

impl PropertyValue {
    /// Builds a string value.
    pub fn string(s: impl AsRef<str>) -> Self {
        PropertyValue::Str(Arc::from(s.as_ref()))
    }

    /// Builds a string-list value.
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        PropertyValue::List(items.into_iter().map(|s| Arc::from(s.as_ref())).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, PropertyValue::Str(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, PropertyValue::List(_))
    }

    /// Returns the boolean value. `Str("true"|"false")` coerces.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::Str(s) => match s.as_ref() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns the integer value. String values parse; everything else
    /// is `None`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            PropertyValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Returns the string slice of a `Str` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Renders the value as a display string. Lists with a single
    /// element render as that element; longer lists render empty.
    pub fn as_string(&self) -> String {
        match self {
            PropertyValue::Null => String::new(),
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::Int(i) => i.to_string(),
            PropertyValue::Str(s) => s.to_string(),
            PropertyValue::List(l) if l.len() == 1 => l[0].to_string(),
            PropertyValue::List(_) => String::new(),
        }
    }

    /// Returns the list elements of a `List` value.
    pub fn as_slice(&self) -> Option<&[Arc<str>]> {
        match self {
            PropertyValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Coerces the value into a string slice: lists pass through,
    /// string scalars become single-element slices, everything else is
    /// empty.
    pub fn must_string_slice(&self) -> Vec<Arc<str>> {
        match self {
            PropertyValue::List(l) => l.clone(),
            PropertyValue::Str(s) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            PropertyValue::Null => 0,
            PropertyValue::Bool(_) => 1,
            PropertyValue::Int(_) => 2,
            PropertyValue::Str(_) => 3,
            PropertyValue::List(_) => 4,
        }
    }

    /// Converts a JSON value into a property value. Objects and nested
    /// arrays are not representable and return `None`. Floats are kept
    /// as their string rendering.
    pub fn from_json(v: &Value) -> Option<PropertyValue> {
        match v {
            Value::Null => Some(PropertyValue::Null),
            Value::Bool(b) => Some(PropertyValue::Bool(*b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => PropertyValue::Int(i),
                None => PropertyValue::string(n.to_string()),
            }),
            Value::String(s) => Some(PropertyValue::string(s)),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => out.push(Arc::from(s.as_str())),
                        Value::Bool(b) => out.push(Arc::from(b.to_string().as_str())),
                        Value::Number(n) => out.push(Arc::from(n.to_string().as_str())),
                        _ => return None,
                    }
                }
                Some(PropertyValue::List(out))
            }
            Value::Object(_) => None,
        }
    }

    /// Renders the value as JSON.
    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::Null => Value::Null,
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Int(i) => Value::from(*i),
            PropertyValue::Str(s) => Value::String(s.to_string()),
            PropertyValue::List(l) => {
                Value::Array(l.iter().map(|s| Value::String(s.to_string())).collect())
            }
        }
    }
}

impl PartialOrd for PropertyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PropertyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use PropertyValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Str(a), Str(b)) => a.cmp(b),
            (List(a), List(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::List(l) => {
                let joined: Vec<&str> = l.iter().map(AsRef::as_ref).collect();
                write!(f, "[{}]", joined.join(", "))
            }
            _ => f.write_str(&self.as_string()),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::string(s)
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Str(Arc::from(s.as_str()))
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int(i)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_order() {
        let values = [
            PropertyValue::Null,
            PropertyValue::Bool(true),
            PropertyValue::Int(7),
            PropertyValue::string("a"),
            PropertyValue::list(["a"]),
        ];
        for (i, a) in values.iter().enumerate() {
            for (j, b) in values.iter().enumerate() {
                assert_eq!(a.cmp(b), i.cmp(&j), "{a:?} vs {b:?}");
            }
        }
        assert!(PropertyValue::Int(2) < PropertyValue::Int(3));
        assert!(PropertyValue::string("a") < PropertyValue::string("b"));
    }

    #[test]
    fn coercions() {
        assert_eq!(PropertyValue::string("42").as_int(), Some(42));
        assert_eq!(PropertyValue::Int(42).as_int(), Some(42));
        assert_eq!(PropertyValue::Bool(true).as_int(), None);
        assert_eq!(
            PropertyValue::string("x").must_string_slice(),
            vec![Arc::from("x")]
        );
        assert!(PropertyValue::Int(1).must_string_slice().is_empty());
    }

    #[test]
    fn json_round_trip() {
        let v = PropertyValue::list(["a", "b"]);
        assert_eq!(PropertyValue::from_json(&v.to_json()), Some(v));
        assert_eq!(
            PropertyValue::from_json(&serde_json::json!(3)),
            Some(PropertyValue::Int(3))
        );
        assert_eq!(PropertyValue::from_json(&serde_json::json!({})), None);
    }
}
