//! Token schema descriptors.
//!
//! `token_schemas` describes the struct layouts the chain stores for series
//! metadata, NFT ROM, and NFT RAM. Each layout is an ordered list of
//! `{"name": ..., "type": ...}` entries (optionally wrapped as `{"fields": [...]}`).

use std::fmt;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use num_bigint::BigInt;
use num_traits::One;
use serde::Serialize;
use serde_json::Value;

use crate::error::ValidationError;
use crate::metadata::{json_kind, MetadataField, MetadataFields, MetadataValue};

/// Field names the transaction builder fills in when metadata omits them.
pub const RESERVED_FIELDS: [&str; 3] = ["_i", "mode", "rom"];

/// Primitive field types understood by the chain VM.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum VmType {
    String,
    Int8,
    Int16,
    Int32,
    Int64,
    Int256,
    Bytes,
    Bytes16,
    Bytes32,
    Bytes64,
}

impl VmType {
    const ALL: [VmType; 10] = [
        VmType::String,
        VmType::Int8,
        VmType::Int16,
        VmType::Int32,
        VmType::Int64,
        VmType::Int256,
        VmType::Bytes,
        VmType::Bytes16,
        VmType::Bytes32,
        VmType::Bytes64,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VmType::String => "String",
            VmType::Int8 => "Int8",
            VmType::Int16 => "Int16",
            VmType::Int32 => "Int32",
            VmType::Int64 => "Int64",
            VmType::Int256 => "Int256",
            VmType::Bytes => "Bytes",
            VmType::Bytes16 => "Bytes16",
            VmType::Bytes32 => "Bytes32",
            VmType::Bytes64 => "Bytes64",
        }
    }

    fn int_bits(self) -> Option<u32> {
        match self {
            VmType::Int8 => Some(8),
            VmType::Int16 => Some(16),
            VmType::Int32 => Some(32),
            VmType::Int64 => Some(64),
            VmType::Int256 => Some(256),
            _ => None,
        }
    }

    fn fixed_len(self) -> Option<usize> {
        match self {
            VmType::Bytes16 => Some(16),
            VmType::Bytes32 => Some(32),
            VmType::Bytes64 => Some(64),
            _ => None,
        }
    }
}

impl fmt::Display for VmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown field type '{wanted}'"))
    }
}

/// One named, typed slot of a struct schema.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: VmType,
}

/// Ordered struct layout.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StructSchema {
    pub fields: Vec<SchemaField>,
}

impl StructSchema {
    pub fn from_json(raw: &Value, location: &str) -> Result<Self, ValidationError> {
        let entries = match raw {
            Value::Array(items) => items,
            Value::Object(map) => match map.get("fields") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(ValidationError::BadShape(format!(
                        "{location} must be an array of {{name, type}} entries"
                    )))
                }
            },
            other => {
                return Err(ValidationError::BadShape(format!(
                    "{location} must be an array of {{name, type}} entries, got {}",
                    json_kind(other)
                )))
            }
        };

        let fields = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let at = format!("{location}[{index}]");
                let bad = |reason: String| ValidationError::BadEntry {
                    location: at.clone(),
                    reason,
                };
                let name = entry
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| bad("missing or empty 'name'".into()))?;
                let ty = entry
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| bad("missing 'type'".into()))?
                    .parse::<VmType>()
                    .map_err(bad)?;
                Ok(SchemaField {
                    name: name.to_string(),
                    ty,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(Self { fields })
    }

    /// Check `metadata` against this layout and return values normalized to
    /// each field's type, in schema order.
    ///
    /// Every non-reserved field must be present. Metadata entries that the
    /// layout does not name are rejected.
    pub fn conform(&self, metadata: &MetadataFields) -> Result<MetadataFields, ValidationError> {
        if let Some(extra) = metadata
            .iter()
            .find(|f| !self.fields.iter().any(|s| s.name == f.name))
        {
            return Err(ValidationError::BadEntry {
                location: format!("field '{}'", extra.name),
                reason: "not declared by the schema".into(),
            });
        }

        let mut out = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let mandatory = !RESERVED_FIELDS.contains(&field.name.as_str());
            if let Some(value) = conform_value(metadata, field, mandatory)? {
                out.push(MetadataField {
                    name: field.name.clone(),
                    value,
                });
            }
        }
        Ok(MetadataFields::new(out))
    }
}

fn conform_value(
    metadata: &MetadataFields,
    field: &SchemaField,
    mandatory: bool,
) -> Result<Option<MetadataValue>, ValidationError> {
    let key = field.name.as_str();
    match field.ty {
        VmType::String => Ok(metadata.pick_string(mandatory, key)?.map(MetadataValue::Text)),
        VmType::Bytes | VmType::Bytes16 | VmType::Bytes32 | VmType::Bytes64 => {
            let Some(bytes) = metadata.pick_hex_and_decode(mandatory, key)? else {
                return Ok(None);
            };
            if let Some(expected) = field.ty.fixed_len() {
                if bytes.len() != expected {
                    return Err(ValidationError::BadLength {
                        field: key.to_string(),
                        expected,
                        actual: bytes.len(),
                    });
                }
            }
            Ok(Some(MetadataValue::Bytes(bytes)))
        }
        ty => {
            let Some(n) = metadata.pick_integer(mandatory, key)? else {
                return Ok(None);
            };
            let bits = ty.int_bits().unwrap_or(256);
            let bound = BigInt::one() << (bits - 1);
            if n >= bound || n < -&bound {
                return Err(ValidationError::BadNumber {
                    field: key.to_string(),
                    expected: int_expectation(ty),
                    value: n.to_string(),
                });
            }
            Ok(Some(match i64::try_from(&n) {
                Ok(small) => MetadataValue::Integer(small),
                Err(_) => MetadataValue::BigInteger(n),
            }))
        }
    }
}

fn int_expectation(ty: VmType) -> &'static str {
    match ty {
        VmType::Int8 => "an Int8",
        VmType::Int16 => "an Int16",
        VmType::Int32 => "an Int32",
        VmType::Int64 => "an Int64",
        _ => "an Int256",
    }
}

/// Layouts for the three schema-described payloads of a non-fungible token.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSchemas {
    pub series_metadata: Option<StructSchema>,
    pub rom: Option<StructSchema>,
    pub ram: Option<StructSchema>,
}

impl TokenSchemas {
    pub fn from_json(raw: &Value) -> Result<Self, ValidationError> {
        let Value::Object(map) = raw else {
            return Err(ValidationError::BadShape(format!(
                "token schemas must be a JSON object with seriesMetadata, rom, ram; got {}",
                json_kind(raw)
            )));
        };

        let mut schemas = TokenSchemas::default();
        for (key, value) in map {
            let slot = match key.as_str() {
                "seriesMetadata" | "series_metadata" => &mut schemas.series_metadata,
                "rom" => &mut schemas.rom,
                "ram" => &mut schemas.ram,
                other => {
                    return Err(ValidationError::BadEntry {
                        location: format!("key '{other}'"),
                        reason: "expected one of seriesMetadata, rom, ram".into(),
                    })
                }
            };
            *slot = match value {
                Value::Null => None,
                v => Some(StructSchema::from_json(v, key)?),
            };
        }
        Ok(schemas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::metadata::parse_field_collection;

    fn rom_schema() -> StructSchema {
        StructSchema::from_json(
            &json!([
                {"name": "_i", "type": "Int256"},
                {"name": "rom", "type": "Bytes"},
                {"name": "name", "type": "String"},
                {"name": "royalties", "type": "int32"},
                {"name": "hash", "type": "Bytes16"},
            ]),
            "rom",
        )
        .unwrap()
    }

    #[test]
    fn parses_all_three_layouts() {
        let schemas = TokenSchemas::from_json(&json!({
            "seriesMetadata": {"fields": [{"name": "mode", "type": "Int8"}]},
            "rom": [{"name": "name", "type": "String"}],
            "ram": [],
        }))
        .unwrap();
        assert_eq!(schemas.series_metadata.unwrap().fields[0].ty, VmType::Int8);
        assert_eq!(schemas.rom.unwrap().fields[0].name, "name");
        assert!(schemas.ram.unwrap().fields.is_empty());
    }

    #[test]
    fn rejects_unknown_keys_and_types() {
        assert!(TokenSchemas::from_json(&json!({"romm": []})).is_err());
        assert!(TokenSchemas::from_json(&json!({"rom": [{"name": "a", "type": "Float"}]})).is_err());
        assert!(TokenSchemas::from_json(&json!([])).is_err());
    }

    #[test]
    fn conform_normalizes_values_in_schema_order() {
        let metadata = parse_field_collection(&json!({
            "hash": "0x000102030405060708090a0b0c0d0e0f",
            "royalties": "5",
            "name": " Sword ",
        }))
        .unwrap();
        let out = rom_schema().conform(&metadata).unwrap();
        let names: Vec<_> = out.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["name", "royalties", "hash"]);
        assert_eq!(out.get("name"), Some(&MetadataValue::Text("Sword".into())));
        assert_eq!(out.get("royalties"), Some(&MetadataValue::Integer(5)));
        assert_eq!(out.get("hash"), Some(&MetadataValue::Bytes((0u8..16).collect())));
    }

    #[test]
    fn conform_reports_missing_and_out_of_range() {
        let missing = parse_field_collection(&json!({"royalties": 1, "hash": vec![0u8; 16]})).unwrap();
        assert_eq!(
            rom_schema().conform(&missing).unwrap_err(),
            ValidationError::Missing {
                field: "name".into()
            }
        );

        let too_big = parse_field_collection(&json!({
            "name": "x", "royalties": 2147483648i64, "hash": vec![0u8; 16]
        }))
        .unwrap();
        assert!(matches!(
            rom_schema().conform(&too_big),
            Err(ValidationError::BadNumber { .. })
        ));

        let short = parse_field_collection(&json!({"name": "x", "royalties": 1, "hash": "00"})).unwrap();
        assert!(matches!(
            rom_schema().conform(&short),
            Err(ValidationError::BadLength { expected: 16, actual: 1, .. })
        ));
    }

    #[test]
    fn conform_rejects_undeclared_fields() {
        let extra = parse_field_collection(&json!({
            "name": "x", "royalties": 1, "hash": vec![0u8; 16], "colour": "red"
        }))
        .unwrap();
        assert!(matches!(
            rom_schema().conform(&extra),
            Err(ValidationError::BadEntry { .. })
        ));
    }
}
