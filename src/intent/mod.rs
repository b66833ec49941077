//! Text layer: token estimation, vocabulary, and intent translation.
//!
//! Everything here is heuristic and infallible. Operations return a
//! best-effort structure instead of an error.

pub mod enhanced;
pub mod tokens;
pub mod translator;
pub mod vocabulary;

pub use enhanced::{EnhancedCompressor, EnhancedEfficiency, KEY_MAP, VOCAB_VERSION};
pub use tokens::{estimate_tokens, TokenCounter, Tokenizer};
pub use translator::{
    AgentIntent, EfficiencyReport, TranslationExample, Translator, TranslatorStatistics,
};
pub use vocabulary::{Domain, VocabularyEntry, VocabularyMapper};
