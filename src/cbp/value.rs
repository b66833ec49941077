//! Compact binary value tree carried inside CBP frames.
//!
//! A [`StructuredMessage`] is remapped into a [`WireValue`] before
//! serialization: known field names become one-byte [`WireKey::Field`] ids and
//! canonical enum strings become one-byte symbols. Remapping only happens on
//! exact matches, so the reverse mapping always reproduces the original text.

use crate::cbp::schema::{SchemaRegistry, SymbolTable};
use crate::core::{Error, Result, StructuredMessage};
use bincode::Options;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Upper bound on the decoded size of one wire tree.
const DECODE_LIMIT: u64 = 16 * 1024 * 1024;

/// A map key on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireKey {
    /// Schema field id
    Field(u8),
    /// Key with no schema id
    Name(String),
}

impl WireKey {
    /// Remap a field name.
    pub fn from_name(name: &str) -> Self {
        match SchemaRegistry::field_id(name) {
            Some(id) => WireKey::Field(id),
            None => WireKey::Name(name.to_string()),
        }
    }

    /// Resolve back to the field name. Unknown ids are an error.
    pub fn into_name(self) -> Result<String> {
        match self {
            WireKey::Field(id) => SchemaRegistry::field_name(id)
                .map(String::from)
                .ok_or(Error::UnknownFieldId(id)),
            WireKey::Name(name) => Ok(name),
        }
    }
}

/// A value on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Array(Vec<WireValue>),
    Map(Vec<(WireKey, WireValue)>),
    /// One-byte id from a schema table
    Symbol(SymbolTable, u8),
    /// Marks a key removed by a delta
    Tombstone,
    /// Marks a key a delta keeps from its base
    Keep,
}

impl WireValue {
    /// Remap a structured message.
    pub fn from_message(msg: &StructuredMessage) -> Self {
        WireValue::Map(
            msg.iter()
                .map(|(key, value)| {
                    (
                        WireKey::from_name(key),
                        Self::from_json(value, SymbolTable::for_field(key)),
                    )
                })
                .collect(),
        )
    }

    /// Remap a JSON value; `symbols` is the table for direct string values.
    pub fn from_json(value: &Value, symbols: Option<SymbolTable>) -> Self {
        match value {
            Value::Null => WireValue::Null,
            Value::Bool(b) => WireValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    WireValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    WireValue::UInt(u)
                } else {
                    WireValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => symbols
                .and_then(|table| {
                    SchemaRegistry::symbol_id(table, s).map(|id| WireValue::Symbol(table, id))
                })
                .unwrap_or_else(|| WireValue::Str(s.clone())),
            Value::Array(items) => {
                WireValue::Array(items.iter().map(|v| Self::from_json(v, None)).collect())
            }
            Value::Object(map) => Self::from_message(map),
        }
    }

    /// Reverse the remapping of a message.
    pub fn into_message(self) -> Result<StructuredMessage> {
        match self.into_json()? {
            Value::Object(map) => Ok(map),
            other => Err(Error::DeserializationError(format!(
                "expected a map at the top level, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// Reverse the remapping of one value.
    pub fn into_json(self) -> Result<Value> {
        Ok(match self {
            WireValue::Null => Value::Null,
            WireValue::Bool(b) => Value::Bool(b),
            WireValue::Int(i) => Value::from(i),
            WireValue::UInt(u) => Value::from(u),
            WireValue::Float(f) => Number::from_f64(f).map(Value::Number).ok_or_else(|| {
                Error::DeserializationError(format!("non-finite float {} on the wire", f))
            })?,
            WireValue::Str(s) => Value::String(s),
            WireValue::Bytes(bytes) => Value::Array(bytes.into_iter().map(Value::from).collect()),
            WireValue::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(WireValue::into_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            WireValue::Map(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key.into_name()?, value.into_json()?);
                }
                Value::Object(map)
            }
            WireValue::Symbol(table, id) => SchemaRegistry::symbol_name(table, id)
                .map(Value::from)
                .ok_or(Error::UnknownSymbol {
                    table: table.table().name,
                    id,
                })?,
            WireValue::Tombstone | WireValue::Keep => {
                return Err(Error::DeserializationError(
                    "delta marker outside of a delta".to_string(),
                ))
            }
        })
    }

    /// Serialize to the compact binary form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        wire_options()
            .serialize(self)
            .map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Parse the compact binary form. Trailing bytes are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(wire_options().deserialize(bytes)?)
    }
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_varint_encoding()
        .reject_trailing_bytes()
        .with_limit(DECODE_LIMIT)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

/// Remap and serialize a message in one step.
pub fn encode_message(msg: &StructuredMessage) -> Result<Vec<u8>> {
    WireValue::from_message(msg).to_bytes()
}

/// Parse and reverse-remap a message in one step.
pub fn decode_message(bytes: &[u8]) -> Result<StructuredMessage> {
    WireValue::from_bytes(bytes)?.into_message()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(value: Value) -> StructuredMessage {
        match value {
            Value::Object(map) => map,
            _ => panic!("test message must be an object"),
        }
    }

    #[test]
    fn test_known_fields_and_symbols_are_compacted() {
        let msg = message(json!({
            "type": "handoff",
            "sender": "analyzer",
            "receiver": "Strategist",
            "custom": "handoff",
        }));
        let wire = WireValue::from_message(&msg);
        let WireValue::Map(entries) = &wire else {
            panic!("expected map");
        };
        assert_eq!(
            entries[0],
            (WireKey::Field(0x01), WireValue::Symbol(SymbolTable::MessageType, 0x04))
        );
        assert_eq!(
            entries[1],
            (WireKey::Field(0x02), WireValue::Symbol(SymbolTable::Agent, 0x01))
        );
        // Not an exact canonical name, kept verbatim
        assert_eq!(
            entries[2],
            (WireKey::Field(0x03), WireValue::Str("Strategist".into()))
        );
        assert_eq!(
            entries[3],
            (WireKey::Name("custom".into()), WireValue::Str("handoff".into()))
        );
    }

    #[test]
    fn test_round_trip_preserves_types_and_order() {
        let msg = message(json!({
            "content": {"task": "analyze", "confidence": 0.87, "risks": ["churn", "cost"]},
            "zeta": -3,
            "big": u64::MAX,
            "flag": false,
            "none": null,
            "priority": "high",
        }));
        let bytes = encode_message(&msg).unwrap();
        let decoded = decode_message(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(
            decoded.keys().collect::<Vec<_>>(),
            msg.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_binary_is_smaller_than_json() {
        let msg = message(json!({
            "type": "handoff",
            "sender": "analyzer",
            "receiver": "strategist",
            "content": {"task": "analyze", "confidence": 0.9},
        }));
        let json_len = serde_json::to_vec(&msg).unwrap().len();
        assert!(encode_message(&msg).unwrap().len() < json_len / 2);
    }

    #[test]
    fn test_unknown_field_id_is_an_error() {
        let wire = WireValue::Map(vec![(WireKey::Field(0xEE), WireValue::Null)]);
        let bytes = wire.to_bytes().unwrap();
        assert!(matches!(decode_message(&bytes), Err(Error::UnknownFieldId(0xEE))));
    }

    #[test]
    fn test_unknown_symbol_is_an_error() {
        let wire = WireValue::Map(vec![(
            WireKey::Field(0x01),
            WireValue::Symbol(SymbolTable::MessageType, 0x7F),
        )]);
        let err = wire.into_message().unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownSymbol {
                table: "message_type",
                id: 0x7F
            }
        ));
    }

    #[test]
    fn test_bytes_decode_to_number_array() {
        let wire = WireValue::Map(vec![(
            WireKey::Name("blob".into()),
            WireValue::Bytes(vec![1, 2, 255]),
        )]);
        let msg = wire.into_message().unwrap();
        assert_eq!(msg["blob"], json!([1, 2, 255]));
    }

    #[test]
    fn test_rejects_non_map_trailing_and_delta_markers() {
        assert!(WireValue::Int(1).into_message().is_err());
        assert!(WireValue::Float(f64::NAN).into_json().is_err());
        assert!(WireValue::Tombstone.into_json().is_err());
        assert!(WireValue::Keep.into_json().is_err());

        let mut bytes = encode_message(&message(json!({"a": 1}))).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_message(&bytes),
            Err(Error::DeserializationError(_))
        ));
    }
}
