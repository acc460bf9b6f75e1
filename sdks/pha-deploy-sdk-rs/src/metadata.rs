//! Metadata field collections.
//!
//! Operators supply metadata either as a flat JSON object (`{"name": "Widget"}`)
//! or as an array of explicit `{"name": ..., "value": ...}` records. Both shapes
//! normalize into an ordered [`MetadataFields`] collection whose values are one
//! of the four [`MetadataValue`] kinds. Typed access goes through the `pick_*`
//! helpers, which trim, convert, and report field-qualified errors.

use num_bigint::{BigInt, Sign};
use num_traits::{FromPrimitive, Signed, ToPrimitive};
use serde::ser::{Serialize, Serializer};
use serde_json::Value;

use crate::error::ValidationError;

/// Largest integer a plain numeric field accepts (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// A single metadata value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataValue {
    Text(String),
    Integer(i64),
    BigInteger(BigInt),
    Bytes(Vec<u8>),
}

impl MetadataValue {
    /// Human-readable name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            MetadataValue::Text(_) => "text",
            MetadataValue::Integer(_) => "integer",
            MetadataValue::BigInteger(_) => "big integer",
            MetadataValue::Bytes(_) => "bytes",
        }
    }
}

impl Serialize for MetadataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetadataValue::Text(s) => serializer.serialize_str(s),
            MetadataValue::Integer(n) => serializer.serialize_i64(*n),
            MetadataValue::BigInteger(n) => serializer.serialize_str(&n.to_string()),
            MetadataValue::Bytes(b) => serializer.serialize_str(&format!("0x{}", hex::encode(b))),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<BigInt> for MetadataValue {
    fn from(value: BigInt) -> Self {
        MetadataValue::BigInteger(value)
    }
}

impl From<Vec<u8>> for MetadataValue {
    fn from(value: Vec<u8>) -> Self {
        MetadataValue::Bytes(value)
    }
}

/// A named metadata value. The name is never empty after trimming.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct MetadataField {
    pub name: String,
    pub value: MetadataValue,
}

impl MetadataField {
    pub fn new(name: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered collection of metadata fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct MetadataFields(Vec<MetadataField>);

impl MetadataFields {
    pub fn new(fields: Vec<MetadataField>) -> Self {
        Self(fields)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetadataField> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[MetadataField] {
        &self.0
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.iter().find(|f| f.name == key).map(|f| &f.value)
    }

    /// Trimmed text value of `key`.
    ///
    /// Empty text counts as absent. Fails when `mandatory` and absent, or when
    /// the value is not text.
    pub fn pick_string(&self, mandatory: bool, key: &str) -> Result<Option<String>, ValidationError> {
        match self.get(key) {
            None => absent(mandatory, key),
            Some(MetadataValue::Text(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    absent(mandatory, key)
                } else {
                    Ok(Some(trimmed.to_string()))
                }
            }
            Some(_) => Err(ValidationError::WrongKind {
                field: key.to_string(),
                expected: "a string",
            }),
        }
    }

    /// Bytes of `key`, decoding hex text (an optional `0x` prefix is accepted).
    pub fn pick_hex_and_decode(
        &self,
        mandatory: bool,
        key: &str,
    ) -> Result<Option<Vec<u8>>, ValidationError> {
        if let Some(MetadataValue::Bytes(b)) = self.get(key) {
            return Ok(Some(b.clone()));
        }
        let Some(text) = self.pick_string(mandatory, key)? else {
            return Ok(None);
        };
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(&text);
        hex::decode(digits)
            .map(Some)
            .map_err(|e| ValidationError::BadHex {
                field: key.to_string(),
                reason: e.to_string(),
            })
    }

    /// Signed integer value of `key`, accepting integers or numeric text.
    pub fn pick_integer(&self, mandatory: bool, key: &str) -> Result<Option<BigInt>, ValidationError> {
        match self.get(key) {
            None => absent(mandatory, key),
            Some(MetadataValue::Integer(n)) => Ok(Some(BigInt::from(*n))),
            Some(MetadataValue::BigInteger(n)) => Ok(Some(n.clone())),
            Some(MetadataValue::Text(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return absent(mandatory, key);
                }
                parse_integer_text(trimmed)
                    .map(Some)
                    .map_err(|expected| ValidationError::BadNumber {
                        field: key.to_string(),
                        expected,
                        value: trimmed.to_string(),
                    })
            }
            Some(MetadataValue::Bytes(_)) => Err(ValidationError::WrongKind {
                field: key.to_string(),
                expected: "a number",
            }),
        }
    }

    /// Non-negative integer value of `key`, bounded by [`MAX_SAFE_INTEGER`].
    pub fn pick_number(&self, mandatory: bool, key: &str) -> Result<Option<u64>, ValidationError> {
        let Some(n) = self.pick_integer(mandatory, key)? else {
            return Ok(None);
        };
        let bad = |expected| ValidationError::BadNumber {
            field: key.to_string(),
            expected,
            value: n.to_string(),
        };
        if n.is_negative() {
            return Err(bad("a non-negative integer"));
        }
        match n.to_u64() {
            Some(v) if v <= MAX_SAFE_INTEGER => Ok(Some(v)),
            _ => Err(bad("an integer no larger than 2^53 - 1")),
        }
    }
}

impl<'a> IntoIterator for &'a MetadataFields {
    type Item = &'a MetadataField;
    type IntoIter = std::slice::Iter<'a, MetadataField>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<MetadataField> for MetadataFields {
    fn from_iter<I: IntoIterator<Item = MetadataField>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn absent<T>(mandatory: bool, key: &str) -> Result<Option<T>, ValidationError> {
    if mandatory {
        Err(ValidationError::Missing {
            field: key.to_string(),
        })
    } else {
        Ok(None)
    }
}

/// Parse trimmed numeric text into an integer. Returns the expectation that was
/// violated on failure.
fn parse_integer_text(s: &str) -> Result<BigInt, &'static str> {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<BigInt>().map_err(|_| "an integer");
    }
    let Ok(f) = s.parse::<f64>() else {
        return Err("a number");
    };
    if !f.is_finite() {
        return Err("a finite number");
    }
    if f.fract() != 0.0 {
        return Err("an integer");
    }
    BigInt::from_f64(f).ok_or("an integer")
}

/// Normalize raw metadata JSON into an ordered field collection.
///
/// Accepts `null` (empty), an object whose keys become field names, or an
/// array of `{name, value}` records.
pub fn parse_field_collection(raw: &Value) -> Result<MetadataFields, ValidationError> {
    match raw {
        Value::Null => Ok(MetadataFields::default()),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| {
                let location = format!("key '{key}'");
                let name = field_name(key, &location)?;
                Ok(MetadataField {
                    name,
                    value: convert_value(value, &location)?,
                })
            })
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let location = format!("entry {index}");
                let Value::Object(record) = item else {
                    return Err(bad_entry(&location, "expected an object with 'name' and 'value'"));
                };
                let name = match record.get("name") {
                    Some(Value::String(s)) => field_name(s, &location)?,
                    Some(_) => return Err(bad_entry(&location, "'name' must be a string")),
                    None => return Err(bad_entry(&location, "missing 'name'")),
                };
                let location = format!("entry {index} ('{name}')");
                let value = match record.get("value") {
                    Some(v) => convert_value(v, &location)?,
                    None => return Err(bad_entry(&location, "missing 'value'")),
                };
                Ok(MetadataField { name, value })
            })
            .collect(),
        other => Err(ValidationError::BadShape(format!(
            "metadata must be a JSON object or array of {{name, value}} records, got {}",
            json_kind(other)
        ))),
    }
}

fn field_name(raw: &str, location: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(bad_entry(location, "field name must not be empty"));
    }
    Ok(name.to_string())
}

fn convert_value(value: &Value, location: &str) -> Result<MetadataValue, ValidationError> {
    match value {
        Value::String(s) => Ok(MetadataValue::Text(s.clone())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(MetadataValue::Integer(i))
            } else if let Some(u) = n.as_u64() {
                Ok(MetadataValue::BigInteger(BigInt::from(u)))
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 => {
                        match (f.to_i64(), BigInt::from_f64(f)) {
                            (Some(i), _) => Ok(MetadataValue::Integer(i)),
                            (None, Some(b)) => Ok(MetadataValue::BigInteger(b)),
                            (None, None) => Err(bad_entry(location, "number is out of range")),
                        }
                    }
                    _ => Err(bad_entry(location, "number must be an integer")),
                }
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| bad_entry(location, "byte arrays may only hold integers 0..=255"))
            })
            .collect::<Result<Vec<u8>, _>>()
            .map(MetadataValue::Bytes),
        other => Err(bad_entry(
            location,
            &format!(
                "unsupported value type {}; expected string, integer, or byte array",
                json_kind(other)
            ),
        )),
    }
}

fn bad_entry(location: &str, reason: &str) -> ValidationError {
    ValidationError::BadEntry {
        location: location.to_string(),
        reason: reason.to_string(),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Sign flag and little-endian magnitude of `n`.
pub(crate) fn bigint_to_wire(n: &BigInt) -> (bool, Vec<u8>) {
    let (sign, magnitude) = n.to_bytes_le();
    (sign == Sign::Minus, magnitude)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(raw: Value) -> MetadataFields {
        parse_field_collection(&raw).unwrap()
    }

    #[test]
    fn object_form_keeps_key_order() {
        let f = fields(json!({"name": "Widget", "b": 1, "a": "x"}));
        let names: Vec<_> = f.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["name", "b", "a"]);
        assert_eq!(f.get("name"), Some(&MetadataValue::Text("Widget".into())));
    }

    #[test]
    fn array_form_reads_records() {
        let f = fields(json!([{"name": "a", "value": 1}]));
        assert_eq!(f.as_slice(), &[MetadataField::new("a", 1i64)]);
    }

    #[test]
    fn array_record_without_value_names_the_entry() {
        let err = parse_field_collection(&json!([{"name": "a", "value": 1}, {"name": "b"}]))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::BadEntry {
                location: "entry 1 ('b')".into(),
                reason: "missing 'value'".into(),
            }
        );
    }

    #[test]
    fn rejects_unsupported_values() {
        assert!(parse_field_collection(&json!({"flag": true})).is_err());
        assert!(parse_field_collection(&json!({"nested": {"a": 1}})).is_err());
        assert!(parse_field_collection(&json!({"ratio": 1.5})).is_err());
        assert!(parse_field_collection(&json!({"bytes": [1, 256]})).is_err());
        assert!(parse_field_collection(&json!({"  ": "x"})).is_err());
        assert!(parse_field_collection(&json!("text")).is_err());
    }

    #[test]
    fn converts_value_kinds() {
        let f = fields(json!({
            "big": 18446744073709551615u64,
            "whole": 3.0,
            "raw": [1, 2, 255],
        }));
        assert_eq!(
            f.get("big"),
            Some(&MetadataValue::BigInteger(BigInt::from(u64::MAX)))
        );
        assert_eq!(f.get("whole"), Some(&MetadataValue::Integer(3)));
        assert_eq!(f.get("raw"), Some(&MetadataValue::Bytes(vec![1, 2, 255])));
    }

    #[test]
    fn null_is_empty() {
        assert!(fields(Value::Null).is_empty());
    }

    #[test]
    fn pick_string_trims_and_enforces_presence() {
        let f = fields(json!({"name": "  Widget ", "blank": "   ", "n": 4}));
        assert_eq!(f.pick_string(true, "name").unwrap().as_deref(), Some("Widget"));
        assert_eq!(f.pick_string(false, "missing").unwrap(), None);
        assert_eq!(f.pick_string(false, "blank").unwrap(), None);
        assert!(matches!(
            f.pick_string(true, "blank"),
            Err(ValidationError::Missing { .. })
        ));
        assert!(matches!(
            f.pick_string(false, "n"),
            Err(ValidationError::WrongKind { .. })
        ));
    }

    #[test]
    fn pick_number_accepts_equivalent_forms() {
        let f = MetadataFields::new(vec![
            MetadataField::new("text", "42"),
            MetadataField::new("int", 42i64),
            MetadataField::new("big", BigInt::from(42)),
            MetadataField::new("padded", " 42 "),
        ]);
        for key in ["text", "int", "big", "padded"] {
            assert_eq!(f.pick_number(true, key).unwrap(), Some(42), "{key}");
        }
    }

    #[test]
    fn pick_number_rejects_bad_input() {
        let f = MetadataFields::new(vec![
            MetadataField::new("neg", -1i64),
            MetadataField::new("frac", "1.5"),
            MetadataField::new("inf", "Infinity"),
            MetadataField::new("nan", "NaN"),
            MetadataField::new("word", "forty-two"),
            MetadataField::new("huge", BigInt::from(MAX_SAFE_INTEGER) + 1),
            MetadataField::new("bytes", vec![1u8]),
        ]);
        for key in ["neg", "frac", "inf", "nan", "word", "huge", "bytes"] {
            assert!(f.pick_number(false, key).is_err(), "{key}");
        }
        assert!(matches!(
            f.pick_number(true, "absent"),
            Err(ValidationError::Missing { .. })
        ));
        assert_eq!(f.pick_number(false, "absent").unwrap(), None);
    }

    #[test]
    fn pick_hex_and_decode_handles_prefix_and_errors() {
        let f = MetadataFields::new(vec![
            MetadataField::new("plain", "beef"),
            MetadataField::new("prefixed", "0xBEEF"),
            MetadataField::new("odd", "abc"),
            MetadataField::new("raw", vec![9u8, 8]),
        ]);
        assert_eq!(f.pick_hex_and_decode(true, "plain").unwrap(), Some(vec![0xbe, 0xef]));
        assert_eq!(f.pick_hex_and_decode(true, "prefixed").unwrap(), Some(vec![0xbe, 0xef]));
        assert_eq!(f.pick_hex_and_decode(true, "raw").unwrap(), Some(vec![9, 8]));
        assert!(matches!(
            f.pick_hex_and_decode(true, "odd"),
            Err(ValidationError::BadHex { .. })
        ));
    }

    #[test]
    fn serializes_for_display() {
        let f = MetadataFields::new(vec![
            MetadataField::new("a", "x"),
            MetadataField::new("b", vec![0xabu8]),
            MetadataField::new("c", BigInt::from(7)),
        ]);
        assert_eq!(
            serde_json::to_value(&f).unwrap(),
            json!([
                {"name": "a", "value": "x"},
                {"name": "b", "value": "0xab"},
                {"name": "c", "value": "7"},
            ])
        );
    }
}
