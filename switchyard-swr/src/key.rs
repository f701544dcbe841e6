//! Structured query keys and their canonical form

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One primitive element of a [`QueryKey`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl KeyPart {
    fn to_value(&self) -> Value {
        match self {
            KeyPart::Null => Value::Null,
            KeyPart::Bool(b) => Value::Bool(*b),
            KeyPart::Int(i) => Value::from(*i),
            // Non-finite floats have no JSON form
            KeyPart::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            KeyPart::Str(s) => Value::String(s.clone()),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Str(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Str(s)
    }
}

impl From<&String> for KeyPart {
    fn from(s: &String) -> Self {
        KeyPart::Str(s.clone())
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

impl From<i32> for KeyPart {
    fn from(i: i32) -> Self {
        KeyPart::Int(i64::from(i))
    }
}

impl From<i64> for KeyPart {
    fn from(i: i64) -> Self {
        KeyPart::Int(i)
    }
}

impl From<u32> for KeyPart {
    fn from(i: u32) -> Self {
        KeyPart::Int(i64::from(i))
    }
}

impl From<u64> for KeyPart {
    fn from(i: u64) -> Self {
        i64::try_from(i)
            .map(KeyPart::Int)
            .unwrap_or(KeyPart::Float(i as f64))
    }
}

impl From<f64> for KeyPart {
    fn from(f: f64) -> Self {
        KeyPart::Float(f)
    }
}

impl From<()> for KeyPart {
    fn from(_: ()) -> Self {
        KeyPart::Null
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(KeyPart::Null)
    }
}

/// Ordered list of primitives identifying a logical query,
/// e.g. `["users", 42]`.
///
/// Two keys address the same cache slot exactly when their
/// [canonical](QueryKey::canonical) forms are equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Append a part
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Compact JSON array, e.g. `["users",42]`
    pub fn canonical(&self) -> String {
        Value::Array(self.0.iter().map(KeyPart::to_value).collect()).to_string()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<Vec<KeyPart>> for QueryKey {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

impl From<&str> for QueryKey {
    fn from(s: &str) -> Self {
        Self(vec![KeyPart::from(s)])
    }
}

impl From<String> for QueryKey {
    fn from(s: String) -> Self {
        Self(vec![KeyPart::from(s)])
    }
}

impl From<&QueryKey> for QueryKey {
    fn from(key: &QueryKey) -> Self {
        key.clone()
    }
}

/// Build a [`QueryKey`] from primitives
///
/// # Examples
///
/// ```
/// use switchyard_swr::query_key;
///
/// let key = query_key!["users", 42, true];
/// assert_eq!(key.canonical(), r#"["users",42,true]"#);
/// ```
#[macro_export]
macro_rules! query_key {
    ($($part:expr),* $(,)?) => {
        $crate::QueryKey::new(vec![$($crate::KeyPart::from($part)),*])
    };
}
