//! Fixed numeric identifiers for the binary protocol.
//!
//! Agents, message types, fields, priorities and tasks each get a small
//! integer. Tables are immutable and append-only; any change to an existing
//! row must bump [`SCHEMA_VERSION`]. Names missing from a table are never an
//! error at this level: callers fall back to sending the plain string.

use serde::{Deserialize, Serialize};

/// Version of every table in this module and of the intent enum tables.
pub const SCHEMA_VERSION: u8 = 0x01;

/// One immutable name/id table.
#[derive(Debug)]
pub struct SchemaTable {
    /// Table name, used in error messages
    pub name: &'static str,
    /// Canonical (name, id) rows
    pub entries: &'static [(&'static str, u8)],
}

impl SchemaTable {
    /// Id of an exact canonical name.
    pub fn id(&self, name: &str) -> Option<u8> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, id)| *id)
    }

    /// Canonical name of an id.
    pub fn name(&self, id: u8) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(_, i)| *i == id)
            .map(|(n, _)| *n)
    }

    /// Number of canonical rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Agent identifiers.
pub static AGENTS: SchemaTable = SchemaTable {
    name: "agent",
    entries: &[
        ("unknown", 0x00),
        ("analyzer", 0x01),
        ("strategist", 0x02),
        ("critic", 0x03),
        ("synthesizer", 0x04),
        ("reflector", 0x05),
        ("orchestrator", 0x10),
        ("researcher", 0x11),
        ("writer", 0x12),
        ("reviewer", 0x13),
        ("nexus", 0x20),
        ("user", 0xFE),
        ("system", 0xFF),
    ],
};

/// Message types.
pub static MESSAGE_TYPES: SchemaTable = SchemaTable {
    name: "message_type",
    entries: &[
        ("request", 0x01),
        ("response", 0x02),
        ("context", 0x03),
        ("handoff", 0x04),
        ("feedback", 0x05),
        ("sync", 0x06),
        ("delta", 0x07),
        ("discover", 0x10),
        ("register", 0x11),
        ("heartbeat", 0x12),
    ],
};

/// Field identifiers.
pub static FIELDS: SchemaTable = SchemaTable {
    name: "field",
    entries: &[
        // header fields
        ("type", 0x01),
        ("sender", 0x02),
        ("receiver", 0x03),
        ("content", 0x04),
        ("metadata", 0x05),
        ("timestamp", 0x06),
        ("message_id", 0x07),
        ("priority", 0x08),
        // protocol fields
        ("hash", 0x10),
        ("delta_ref", 0x11),
        ("delta_payload", 0x12),
        // content fields
        ("task", 0x20),
        ("target", 0x21),
        ("result", 0x22),
        ("confidence", 0x23),
        ("reasoning", 0x24),
        ("recommendations", 0x25),
        ("risks", 0x26),
        ("opportunities", 0x27),
        // agent output fields
        ("analysis", 0x30),
        ("strategies", 0x31),
        ("critique", 0x32),
        ("synthesis", 0x33),
        ("reflection", 0x34),
        // structured output fields
        ("key_factors", 0x40),
        ("next_steps", 0x41),
        ("success_metrics", 0x42),
        ("risk_mitigation", 0x43),
        ("quality_eval", 0x44),
        // CSDL edge keys
        ("T", 0x50),
        ("C", 0x51),
        ("R", 0x52),
        ("cx", 0x53),
        ("p", 0x54),
        ("m", 0x55),
    ],
};

/// Priority levels.
pub static PRIORITIES: SchemaTable = SchemaTable {
    name: "priority",
    entries: &[("low", 1), ("normal", 2), ("high", 3), ("critical", 4)],
};

/// Task identifiers.
pub static TASKS: SchemaTable = SchemaTable {
    name: "task",
    entries: &[
        ("analyze", 0x01),
        ("strategize", 0x02),
        ("critique", 0x03),
        ("synthesize", 0x04),
        ("reflect", 0x05),
        ("research", 0x06),
        ("write", 0x07),
        ("review", 0x08),
        ("execute", 0x09),
        ("validate", 0x0A),
    ],
};

/// Tables whose values can be sent as one-byte symbols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolTable {
    MessageType,
    Agent,
    Priority,
    Task,
}

impl SymbolTable {
    /// Backing table.
    pub fn table(self) -> &'static SchemaTable {
        match self {
            SymbolTable::MessageType => &MESSAGE_TYPES,
            SymbolTable::Agent => &AGENTS,
            SymbolTable::Priority => &PRIORITIES,
            SymbolTable::Task => &TASKS,
        }
    }

    /// The symbol table used for values of `field`, if any.
    pub fn for_field(field: &str) -> Option<Self> {
        match field {
            "type" => Some(SymbolTable::MessageType),
            "sender" | "receiver" => Some(SymbolTable::Agent),
            "priority" => Some(SymbolTable::Priority),
            "task" => Some(SymbolTable::Task),
            _ => None,
        }
    }
}

/// Lookup facade over the static tables.
///
/// Lookups are exact. A name with no id is sent as a plain string by the
/// caller, and an id with no name is a decode error.
#[derive(Clone, Copy, Debug, Default)]
pub struct SchemaRegistry;

impl SchemaRegistry {
    pub fn field_id(name: &str) -> Option<u8> {
        FIELDS.id(name)
    }

    pub fn field_name(id: u8) -> Option<&'static str> {
        FIELDS.name(id)
    }

    pub fn symbol_id(table: SymbolTable, name: &str) -> Option<u8> {
        table.table().id(name)
    }

    pub fn symbol_name(table: SymbolTable, id: u8) -> Option<&'static str> {
        table.table().name(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tables_have_unique_rows() {
        for table in [&AGENTS, &MESSAGE_TYPES, &FIELDS, &PRIORITIES, &TASKS] {
            let names: HashSet<_> = table.entries.iter().map(|(n, _)| *n).collect();
            let ids: HashSet<_> = table.entries.iter().map(|(_, i)| *i).collect();
            assert_eq!(names.len(), table.len(), "{}", table.name);
            assert_eq!(ids.len(), table.len(), "{}", table.name);
        }
    }

    #[test]
    fn test_field_lookup() {
        assert_eq!(SchemaRegistry::field_id("content"), Some(0x04));
        assert_eq!(SchemaRegistry::field_name(0x04), Some("content"));
        assert_eq!(SchemaRegistry::field_id("cx"), Some(0x53));
        assert_eq!(SchemaRegistry::field_id("Content"), None);
        assert_eq!(SchemaRegistry::field_name(0xEE), None);
    }

    #[test]
    fn test_symbol_lookup_is_exact() {
        assert_eq!(SchemaRegistry::symbol_id(SymbolTable::MessageType, "handoff"), Some(0x04));
        assert_eq!(SchemaRegistry::symbol_id(SymbolTable::Agent, "strategist"), Some(0x02));
        assert_eq!(SchemaRegistry::symbol_id(SymbolTable::Agent, "Strategist"), None);
        assert_eq!(SchemaRegistry::symbol_id(SymbolTable::Priority, "medium"), None);
        assert_eq!(SchemaRegistry::symbol_id(SymbolTable::Task, "validate"), Some(0x0A));
        assert_eq!(SchemaRegistry::symbol_name(SymbolTable::Agent, 0xFF), Some("system"));
        assert_eq!(SchemaRegistry::symbol_name(SymbolTable::Priority, 9), None);
        assert_eq!(MESSAGE_TYPES.id("hnd"), None);
        assert_eq!(AGENTS.id("Analyzer"), None);
    }

    #[test]
    fn test_symbol_tables_for_fields() {
        assert_eq!(SymbolTable::for_field("sender"), Some(SymbolTable::Agent));
        assert_eq!(SymbolTable::for_field("receiver"), Some(SymbolTable::Agent));
        assert_eq!(SymbolTable::for_field("content"), None);
        assert_eq!(SymbolTable::Task.table().name, "task");
    }

    #[test]
    fn test_intent_vocabulary_shares_version() {
        assert_eq!(SCHEMA_VERSION, crate::intent::VOCAB_VERSION);
    }
}
