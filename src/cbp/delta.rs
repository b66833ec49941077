//! Field-level deltas against a registered base message.
//!
//! The diff is top-level and non-recursive: a field whose value differs from
//! the base is carried in full, an unchanged field is carried as a one-byte
//! keep marker, and a base field missing from the current message is carried
//! as a tombstone. Entries follow the current message's key order, so the
//! rebuilt message re-encodes to the same bytes and the same content hash the
//! sender registered.

use crate::cbp::registry::SemanticRegistry;
use crate::cbp::schema::SymbolTable;
use crate::cbp::value::{decode_message, encode_message, WireKey, WireValue};
use crate::core::{ContentHash, Error, Result, StructuredMessage};
use serde_json::Map;
use std::sync::Arc;
use tracing::warn;

/// Difference between a message and its base.
#[derive(Clone, Debug, PartialEq)]
pub struct DeltaRecord {
    /// Base the delta applies to; `None` means the delta is the full message
    pub base_hash: Option<ContentHash>,
    /// Fields added or changed relative to the base
    pub changed: StructuredMessage,
    /// Every key of the current message, in order
    pub order: Vec<String>,
    /// Base fields missing from the current message
    pub removed: Vec<String>,
}

impl DeltaRecord {
    /// Whether the record carries the whole message.
    pub fn is_full(&self) -> bool {
        self.base_hash.is_none()
    }

    /// Whether the record changes no value and removes no field.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }

    /// Wire form of the body: fields in order, then tombstones.
    pub fn to_wire(&self) -> WireValue {
        let mut entries: Vec<(WireKey, WireValue)> = self
            .order
            .iter()
            .map(|key| {
                let value = match self.changed.get(key) {
                    Some(value) => WireValue::from_json(value, SymbolTable::for_field(key)),
                    None => WireValue::Keep,
                };
                (WireKey::from_name(key), value)
            })
            .collect();
        entries.extend(
            self.removed
                .iter()
                .map(|key| (WireKey::from_name(key), WireValue::Tombstone)),
        );
        WireValue::Map(entries)
    }

    /// Rebuild a record from its wire body.
    pub fn from_wire(base_hash: Option<ContentHash>, body: WireValue) -> Result<Self> {
        let WireValue::Map(entries) = body else {
            return Err(Error::DeserializationError(
                "delta body must be a map".to_string(),
            ));
        };

        let mut changed = Map::new();
        let mut order = Vec::with_capacity(entries.len());
        let mut removed = Vec::new();
        for (key, value) in entries {
            let name = key.into_name()?;
            match value {
                WireValue::Tombstone => removed.push(name),
                WireValue::Keep => order.push(name),
                other => {
                    changed.insert(name.clone(), other.into_json()?);
                    order.push(name);
                }
            }
        }

        Ok(Self {
            base_hash,
            changed,
            order,
            removed,
        })
    }
}

/// Computes and applies deltas against messages held in a registry.
#[derive(Clone, Debug)]
pub struct DeltaEncoder {
    registry: Arc<SemanticRegistry>,
}

impl DeltaEncoder {
    /// Create an encoder over a shared registry.
    pub fn new(registry: Arc<SemanticRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SemanticRegistry> {
        &self.registry
    }

    /// Store `msg` so it can serve as a base. Returns its content hash.
    pub fn register_base(&self, msg: &StructuredMessage) -> Result<ContentHash> {
        let payload = encode_message(msg)?;
        Ok(self.registry.register(&payload))
    }

    /// Decode the base message stored under `hash`.
    pub fn base_message(&self, hash: ContentHash) -> Result<StructuredMessage> {
        let payload = self.registry.get(hash).ok_or_else(|| {
            warn!(hash = %hash, "delta base not in registry");
            Error::UnknownReference(hash)
        })?;
        decode_message(&payload)
    }

    /// Diff `current` against the base under `base_hash`.
    ///
    /// Without a base the record simply carries the whole message.
    pub fn compute_delta(
        &self,
        current: &StructuredMessage,
        base_hash: Option<ContentHash>,
    ) -> Result<DeltaRecord> {
        let order = current.keys().cloned().collect();
        let Some(hash) = base_hash else {
            return Ok(DeltaRecord {
                base_hash: None,
                changed: current.clone(),
                order,
                removed: Vec::new(),
            });
        };

        let base = self.base_message(hash)?;
        let changed = current
            .iter()
            .filter(|(key, value)| base.get(key.as_str()) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let removed = base
            .keys()
            .filter(|key| !current.contains_key(key.as_str()))
            .cloned()
            .collect();

        Ok(DeltaRecord {
            base_hash: Some(hash),
            changed,
            order,
            removed,
        })
    }

    /// Apply `delta` on top of its base, in the delta's key order.
    ///
    /// Base fields the order does not list are dropped. A kept key the base
    /// lacks is a decode error.
    pub fn reconstruct(&self, delta: &DeltaRecord) -> Result<StructuredMessage> {
        let Some(hash) = delta.base_hash else {
            return Ok(delta.changed.clone());
        };

        let base = self.base_message(hash)?;
        let mut out = Map::with_capacity(delta.order.len());
        for key in &delta.order {
            let value = match delta.changed.get(key) {
                Some(value) => value.clone(),
                None => base.get(key).cloned().ok_or_else(|| {
                    Error::DeserializationError(format!(
                        "delta keeps field {} missing from base {}",
                        key, hash
                    ))
                })?,
            };
            out.insert(key.clone(), value);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn message(value: Value) -> StructuredMessage {
        match value {
            Value::Object(map) => map,
            _ => panic!("test message must be an object"),
        }
    }

    fn base() -> StructuredMessage {
        message(json!({
            "type": "context",
            "sender": "analyzer",
            "content": {"task": "analyze", "target": "q3 revenue"},
            "priority": "normal",
        }))
    }

    #[test]
    fn test_delta_without_base_is_full_message() {
        let encoder = DeltaEncoder::new(SemanticRegistry::shared());
        let msg = base();
        let delta = encoder.compute_delta(&msg, None).unwrap();
        assert!(delta.is_full());
        assert_eq!(encoder.reconstruct(&delta).unwrap(), msg);
    }

    #[test]
    fn test_only_changed_fields_are_carried() {
        let encoder = DeltaEncoder::new(SemanticRegistry::shared());
        let hash = encoder.register_base(&base()).unwrap();

        let mut current = base();
        current.insert("priority".into(), json!("high"));
        current.insert("confidence".into(), json!(0.8));

        let delta = encoder.compute_delta(&current, Some(hash)).unwrap();
        assert_eq!(delta.changed.len(), 2);
        assert_eq!(delta.changed["priority"], json!("high"));
        assert!(delta.removed.is_empty());
        assert_eq!(encoder.reconstruct(&delta).unwrap(), current);
    }

    #[test]
    fn test_nested_change_carries_whole_field() {
        let encoder = DeltaEncoder::new(SemanticRegistry::shared());
        let hash = encoder.register_base(&base()).unwrap();

        let mut current = base();
        current.insert(
            "content".into(),
            json!({"task": "analyze", "target": "q4 revenue"}),
        );

        let delta = encoder.compute_delta(&current, Some(hash)).unwrap();
        assert_eq!(delta.changed.keys().collect::<Vec<_>>(), vec!["content"]);
        assert_eq!(encoder.reconstruct(&delta).unwrap(), current);
    }

    #[test]
    fn test_removed_fields_become_tombstones() {
        let encoder = DeltaEncoder::new(SemanticRegistry::shared());
        let hash = encoder.register_base(&base()).unwrap();

        let mut current = base();
        current.remove("priority");

        let delta = encoder.compute_delta(&current, Some(hash)).unwrap();
        assert_eq!(delta.removed, vec!["priority".to_string()]);

        let rebuilt = encoder.reconstruct(&delta).unwrap();
        assert_eq!(rebuilt, current);
        assert!(!rebuilt.contains_key("priority"));
    }

    #[test]
    fn test_identical_message_gives_empty_delta() {
        let encoder = DeltaEncoder::new(SemanticRegistry::shared());
        let hash = encoder.register_base(&base()).unwrap();
        let delta = encoder.compute_delta(&base(), Some(hash)).unwrap();
        assert!(delta.is_empty());
        assert_eq!(encoder.reconstruct(&delta).unwrap(), base());
    }

    #[test]
    fn test_unknown_base() {
        let encoder = DeltaEncoder::new(SemanticRegistry::shared());
        let missing = ContentHash(0xdead_beef);
        assert!(matches!(
            encoder.compute_delta(&base(), Some(missing)),
            Err(Error::UnknownReference(h)) if h == missing
        ));

        let delta = DeltaRecord {
            base_hash: Some(missing),
            changed: Map::new(),
            order: Vec::new(),
            removed: Vec::new(),
        };
        assert!(encoder.reconstruct(&delta).unwrap_err().needs_full_resend());
    }

    #[test]
    fn test_wire_form_round_trip() {
        let mut changed = Map::new();
        changed.insert("type".into(), json!("delta"));
        changed.insert("notes".into(), json!(["a", "b"]));
        let delta = DeltaRecord {
            base_hash: Some(ContentHash(9)),
            changed,
            order: vec!["sender".into(), "type".into(), "notes".into()],
            removed: vec!["priority".into(), "scratch".into()],
        };

        let bytes = delta.to_wire().to_bytes().unwrap();
        let parsed = DeltaRecord::from_wire(Some(ContentHash(9)), WireValue::from_bytes(&bytes).unwrap())
            .unwrap();
        assert_eq!(parsed, delta);
    }

    #[test]
    fn test_reordered_fields_rebuild_in_current_order() {
        let encoder = DeltaEncoder::new(SemanticRegistry::shared());
        let hash = encoder.register_base(&base()).unwrap();

        let current = message(json!({
            "priority": "high",
            "content": {"task": "analyze", "target": "q3 revenue"},
            "type": "context",
            "sender": "analyzer",
        }));
        let delta = encoder.compute_delta(&current, Some(hash)).unwrap();
        assert_eq!(delta.changed.keys().collect::<Vec<_>>(), vec!["priority"]);

        let bytes = delta.to_wire().to_bytes().unwrap();
        let parsed = DeltaRecord::from_wire(Some(hash), WireValue::from_bytes(&bytes).unwrap())
            .unwrap();
        let rebuilt = encoder.reconstruct(&parsed).unwrap();
        assert_eq!(
            rebuilt.keys().collect::<Vec<_>>(),
            current.keys().collect::<Vec<_>>()
        );
        assert_eq!(
            encode_message(&rebuilt).unwrap(),
            encode_message(&current).unwrap()
        );
    }

    #[test]
    fn test_kept_field_missing_from_base() {
        let encoder = DeltaEncoder::new(SemanticRegistry::shared());
        let hash = encoder.register_base(&base()).unwrap();
        let delta = DeltaRecord {
            base_hash: Some(hash),
            changed: Map::new(),
            order: vec!["type".into(), "deadline".into()],
            removed: Vec::new(),
        };
        assert!(matches!(
            encoder.reconstruct(&delta),
            Err(Error::DeserializationError(_))
        ));
    }
}
