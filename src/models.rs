use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Typed value carried by a decoded record field
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    List(Vec<FieldValue>),
    Null,
}

impl FieldValue {
    /// Temperature or other optional reading; `None` means "not available"
    pub fn optional(value: Option<f64>) -> Self {
        value.map(FieldValue::Float).unwrap_or(FieldValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{:.2}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            FieldValue::Null => f.write_str("n/a"),
        }
    }
}

/// Human-readable interpretation of one message payload
///
/// Diagnostics are ordinary fields (`decode_error`, `decode_warning`) so a
/// caller always has something to log next to the raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub meaning: &'static str,
    pub fields: BTreeMap<&'static str, FieldValue>,
}

impl DecodedRecord {
    pub fn new(meaning: &'static str) -> Self {
        DecodedRecord {
            meaning,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &'static str, value: FieldValue) -> Self {
        self.fields.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &'static str, value: FieldValue) {
        self.fields.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn is_diagnostic(&self) -> bool {
        self.fields.contains_key("decode_error") || self.fields.contains_key("decode_warning")
    }
}

impl Serialize for DecodedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry("meaning", self.meaning)?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// One point of the outdoor temperature -> CH ceiling curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub outdoor_c: f64,
    pub ch_max: f64,
}
