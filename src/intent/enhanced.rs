//! Key and enum compaction on top of translated intents (V2).
//!
//! Top-level field names shrink to single letters and vocabulary codes become
//! small integers. Integer codes are the 1-based position of the code in its
//! vocabulary table, so the tables are append-only: reordering them changes
//! the wire meaning and must bump [`VOCAB_VERSION`].

use crate::core::{round_to, StructuredMessage};
use crate::intent::tokens::TokenCounter;
use crate::intent::translator::{EfficiencyReport, Translator};
use crate::intent::vocabulary::Domain;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version of the integer enum tables.
pub const VOCAB_VERSION: u8 = 1;

/// Long field name to single-letter key.
pub const KEY_MAP: &[(&str, &str)] = &[
    ("task", "t"),
    ("actions", "a"),
    ("tech", "x"),
    ("complexity", "c"),
    ("constraints", "n"),
    ("components", "o"),
    ("success", "s"),
];

/// Fields whose list elements are enum coded, and their domain.
const CODED_FIELDS: &[(&str, Domain)] = &[
    ("actions", Domain::Action),
    ("tech", Domain::Technology),
    ("constraints", Domain::Constraint),
];

/// Short key for a long field name.
pub fn short_key(key: &str) -> Option<&'static str> {
    KEY_MAP.iter().find(|(long, _)| *long == key).map(|(_, short)| *short)
}

/// Long field name for a short key.
pub fn long_key(key: &str) -> Option<&'static str> {
    KEY_MAP.iter().find(|(_, short)| *short == key).map(|(long, _)| *long)
}

/// Integer code for a vocabulary code.
pub fn encode_code(domain: Domain, code: &str) -> Option<u64> {
    domain
        .entries()
        .iter()
        .position(|e| e.code == code)
        .map(|i| i as u64 + 1)
}

/// Vocabulary code for an integer code.
pub fn decode_code(domain: Domain, value: u64) -> Option<&'static str> {
    let index = usize::try_from(value).ok()?.checked_sub(1)?;
    domain.entries().get(index).map(|e| e.code)
}

fn domain_for(long: &str) -> Option<Domain> {
    CODED_FIELDS
        .iter()
        .find(|(field, _)| *field == long)
        .map(|(_, domain)| *domain)
}

/// V2 compressor: a [`Translator`] followed by key/enum compaction.
#[derive(Clone, Debug, Default)]
pub struct EnhancedCompressor {
    translator: Translator,
}

impl EnhancedCompressor {
    /// Create a compressor over a default translator.
    pub fn new() -> Self {
        Self::with_translator(Translator::new())
    }

    /// Create a compressor over an existing translator.
    pub fn with_translator(translator: Translator) -> Self {
        Self { translator }
    }

    /// The underlying V1 translator.
    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// Mutable access to the underlying translator.
    pub fn translator_mut(&mut self) -> &mut Translator {
        &mut self.translator
    }

    /// Translate `text` and compact the result.
    pub fn compress_enhanced(&self, text: &str) -> StructuredMessage {
        self.compress_message(&self.translator.translate_to_agent(text))
    }

    /// Compact an already translated message.
    ///
    /// Keys outside [`KEY_MAP`] and vocabulary values outside the enum tables
    /// pass through unchanged.
    pub fn compress_message(&self, msg: &StructuredMessage) -> StructuredMessage {
        let mut out = Map::with_capacity(msg.len());
        for (key, value) in msg {
            let value = match domain_for(key) {
                Some(domain) => map_list(value, |item| match item {
                    Value::String(code) => encode_code(domain, code)
                        .map(Value::from)
                        .unwrap_or_else(|| item.clone()),
                    other => other.clone(),
                }),
                None => value.clone(),
            };
            let key = short_key(key).map(String::from).unwrap_or_else(|| key.clone());
            out.insert(key, value);
        }
        out
    }

    /// Exact inverse of [`compress_message`](Self::compress_message).
    pub fn decompress_enhanced(&self, msg: &StructuredMessage) -> StructuredMessage {
        let mut out = Map::with_capacity(msg.len());
        for (key, value) in msg {
            let long = long_key(key).map(String::from).unwrap_or_else(|| key.clone());
            let value = match domain_for(&long) {
                Some(domain) => map_list(value, |item| {
                    item.as_u64()
                        .and_then(|n| decode_code(domain, n))
                        .map(Value::from)
                        .unwrap_or_else(|| item.clone())
                }),
                None => value.clone(),
            };
            out.insert(long, value);
        }
        out
    }

    /// Token accounting across the text, V1 and V2 forms.
    pub fn measure_efficiency(&self, text: &str) -> EnhancedEfficiency {
        let counter = self.translator.counter();
        let v1 = self.translator.measure_efficiency(text);
        let v2_msg = self.compress_enhanced(text);
        let v2_tokens = counter.count_structured(&v2_msg);

        EnhancedEfficiency {
            v2_tokens,
            v2_reduction_percent: round_to(
                TokenCounter::reduction(v1.original_tokens, v2_tokens),
                2,
            ),
            v1,
        }
    }
}

/// Token accounting for the V2 form alongside V1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnhancedEfficiency {
    /// V1 accounting
    pub v1: EfficiencyReport,
    /// Tokens in the V2 form
    pub v2_tokens: usize,
    /// Reduction from the original text to V2
    pub v2_reduction_percent: f64,
}

fn map_list(value: &Value, f: impl Fn(&Value) -> Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(f).collect()),
        other => other.clone(),
    }
}
