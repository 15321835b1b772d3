//! State snapshots broadcast by the preamp

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{RemoteError, Result};

/// A scalar field value as received on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    Null,
}

impl FieldValue {
    /// Convert a JSON value, returning `None` for arrays and objects
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(FieldValue::Text(s)),
            Value::Number(n) => Some(FieldValue::Number(n)),
            Value::Bool(b) => Some(FieldValue::Bool(b)),
            Value::Null => Some(FieldValue::Null),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// The text written into the panel
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => render_number(n),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Null => "null".to_string(),
        }
    }
}

fn render_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        // -0 renders as 0
        Some(f) if f == 0.0 => "0".to_string(),
        Some(f) if f.abs() >= 1e21 || f.abs() < 1e-6 => render_exponent(f),
        Some(f) if f.fract() == 0.0 => format!("{:.0}", f),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Exponent form with an explicit sign, e.g. `1e+21` and `1.5e-7`
fn render_exponent(f: f64) -> String {
    let raw = format!("{:e}", f);
    match raw.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{}e+{}", mantissa, exponent)
        }
        _ => raw,
    }
}

/// One inbound state message: field name to scalar value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    fields: Vec<(String, FieldValue)>,
}

impl StateSnapshot {
    /// Parse a text frame. The frame must be a JSON object; nested values
    /// are dropped with a warning.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(map) = value else {
            return Err(RemoteError::InvalidPayload(format!(
                "expected a JSON object, got: {}",
                raw
            )));
        };
        Ok(Self::from_map(map))
    }

    fn from_map(map: Map<String, Value>) -> Self {
        let mut fields = Vec::with_capacity(map.len());
        for (key, value) in map {
            match FieldValue::from_json(value) {
                Some(field) => fields.push((key, field)),
                None => warn!("Ignoring non-scalar value for field '{}'", key),
            }
        }
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
