//! Boundary adapter for loosely typed server JSON.
//!
//! Every accessor here is infallible. A field that is absent, `null`, `false`,
//! `0`, `""` or not a number where one is expected falls back to the caller's
//! default, which mirrors how the map server's own web client reads its
//! payloads. Nothing past this module sees a `serde_json::Value`.

use serde_json::Value;

static NULL: Value = Value::Null;

/// JavaScript-style truthiness of a JSON value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map_or(false, |n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    value: &'a Value,
}

impl<'a> RawRecord<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    /// Field value, treating explicit `null` as absent.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.value.get(key).filter(|value| !value.is_null())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn truthy(&self, key: &str) -> bool {
        self.get(key).map_or(false, is_truthy)
    }

    /// Truthy and not the literal string `"false"`. Some boolean settings
    /// arrive stringified.
    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::String(text)) => !text.is_empty() && text != "false",
            Some(value) => is_truthy(value),
            None => false,
        }
    }

    /// Non-empty string, or a number rendered as text.
    pub fn string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(text) if !text.is_empty() => Some(text.clone()),
            Value::Number(number) if number.as_f64().map_or(false, |n| n != 0.0) => {
                Some(number.to_string())
            }
            _ => None,
        }
    }

    pub fn str_or(&self, key: &str, default: &str) -> String {
        self.string(key).unwrap_or_else(|| default.to_string())
    }

    /// Any finite number, zero included.
    pub fn finite(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(as_number)
    }

    /// A finite, non-zero number.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.finite(key).filter(|n| *n != 0.0)
    }

    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.number(key).unwrap_or(default)
    }

    /// A non-zero integer. Large integers keep full precision.
    pub fn integer(&self, key: &str) -> Option<i64> {
        let value = self.get(key)?;
        let integer = match value {
            Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|n| n as i64)),
            _ => as_number(value).map(|n| n as i64),
        }?;
        (integer != 0).then_some(integer)
    }

    pub fn int_or(&self, key: &str, default: i64) -> i64 {
        self.integer(key).unwrap_or(default)
    }

    pub fn i32_or(&self, key: &str, default: i32) -> i32 {
        self.integer(key)
            .map(|n| n.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
            .unwrap_or(default)
    }

    pub fn u32_or(&self, key: &str, default: u32) -> u32 {
        self.integer(key)
            .map(|n| n.clamp(0, u32::MAX as i64) as u32)
            .unwrap_or(default)
    }

    /// Zoom visibility bound: present only when the raw value is a number
    /// greater than -1. Zero is a valid bound.
    pub fn zoom_bound(&self, key: &str) -> Option<i32> {
        self.finite(key)
            .filter(|n| *n > -1.0)
            .map(|n| n.min(i32::MAX as f64) as i32)
    }

    /// Nested object, or an empty record when the field is missing.
    pub fn record(&self, key: &str) -> RawRecord<'a> {
        RawRecord::new(self.get(key).unwrap_or(&NULL))
    }

    pub fn array(&self, key: &str) -> &'a [Value] {
        match self.get(key) {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        }
    }

    /// Numeric array, defaulting when the field is missing or empty.
    /// Non-numeric members become zero.
    pub fn numbers_or(&self, key: &str, default: &[f64]) -> Vec<f64> {
        let items = self.array(key);
        if items.is_empty() {
            return default.to_vec();
        }
        items.iter().map(|item| as_number(item).unwrap_or(0.0)).collect()
    }

    /// 3x3 transform matrix in row-major order, all zero when malformed.
    pub fn matrix(&self, key: &str) -> [f64; 9] {
        let mut matrix = [0.0; 9];
        let items = self.array(key);
        if items.len() == matrix.len() {
            for (slot, item) in matrix.iter_mut().zip(items) {
                *slot = as_number(item).unwrap_or(0.0);
            }
        }
        matrix
    }

    /// Key/record pairs of an object field. Non-object fields yield nothing.
    pub fn entries(&self, key: &str) -> impl Iterator<Item = (&'a str, RawRecord<'a>)> {
        self.get(key)
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|object| object.iter())
            .map(|(key, value)| (key.as_str(), RawRecord::new(value)))
    }
}
