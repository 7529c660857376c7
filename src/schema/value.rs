//! Converted values
//!
//! Raw YAML is lifted into [`Value`] during include expansion; field
//! conversion maps `Value` to `Value`, so every field is idempotent on its own
//! output.

use indexmap::IndexMap;
use std::fmt;

use super::encoded::XmlElement;
use super::model::Entity;

/// Mapping key. YAML allows non-string keys (response codes are integers).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Key {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Key::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The key as a plain value, for running it through a key field
    pub fn to_value(&self) -> Value {
        match self {
            Key::Null => Value::Null,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Null => write!(f, "null"),
            Key::Bool(b) => write!(f, "{}", b),
            Key::Int(i) => write!(f, "{}", i),
            Key::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

/// Insertion-ordered mapping
pub type Mapping = IndexMap<Key, Value>;

/// A raw or converted value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(Mapping),
    /// A nested entity built by a reference field
    Entity(Box<Entity>),
    /// Parsed embedded JSON document
    Json(serde_json::Value),
    /// Parsed embedded XML document
    Xml(XmlElement),
    /// Raw text of an included JSON file, kept with the name it was included as
    IncludedJson { file_name: String, content: String },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value, widening integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Mapping> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Value::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(json) => Some(json),
            _ => None,
        }
    }

    pub fn as_xml(&self) -> Option<&XmlElement> {
        match self {
            Value::Xml(xml) => Some(xml),
            _ => None,
        }
    }

    /// Null or an empty mapping; both mean "declared without a body" in RAML
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Map(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Short name of the value's shape, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "mapping",
            Value::Entity(_) => "entity",
            Value::Json(_) => "json",
            Value::Xml(_) => "xml",
            Value::IncludedJson { .. } => "included json",
        }
    }

    /// Convert a value produced by a key field back into a mapping key
    pub(crate) fn into_key(self) -> Result<Key, String> {
        match self {
            Value::Null => Ok(Key::Null),
            Value::Bool(b) => Ok(Key::Bool(b)),
            Value::Int(i) => Ok(Key::Int(i)),
            Value::Float(f) => Ok(Key::Str(f.to_string())),
            Value::Str(s) => Ok(Key::Str(s)),
            other => Err(format!("{} cannot be used as a mapping key", other)),
        }
    }

    /// Render as JSON for inspection
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
            Value::Entity(entity) => entity.to_json(),
            Value::Json(json) => json.clone(),
            Value::Xml(xml) => xml.to_json(),
            Value::IncludedJson { content, .. } => Json::String(content.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Entity(entity) => write!(f, "<{}>", entity.type_name()),
            Value::Json(json) => write!(f, "{}", json),
            Value::Xml(xml) => write!(f, "<{}/>", xml.name),
            Value::IncludedJson { file_name, .. } => write!(f, "!include {}", file_name),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(items: Vec<V>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// Build a mapping from `(key, value)` pairs, keeping their order
pub fn mapping<K, V, I>(entries: I) -> Value
where
    K: Into<Key>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_compact() {
        let value = mapping([("a", Value::from(vec![1i64, 2])), ("b", Value::from("x"))]);
        assert_eq!(value.to_string(), r#"{a: [1, 2], b: "x"}"#);
    }

    #[test]
    fn test_blank_values() {
        assert!(Value::Null.is_blank());
        assert!(Value::Map(Mapping::new()).is_blank());
        assert!(!Value::from("").is_blank());
    }

    #[test]
    fn test_float_key_becomes_string() {
        assert_eq!(Value::Float(1.5).into_key().unwrap(), Key::from("1.5"));
        assert!(Value::List(vec![]).into_key().is_err());
    }
}
