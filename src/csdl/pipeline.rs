//! Compression pipeline.
//!
//! Applies one of the compression levels to a text. The orchestration layer
//! picks the level per message; the pipeline only wires the layers together
//! and never owns the registry's lifecycle.

use crate::cbp::{CbpDecoder, CbpEncoder, EncodedFrame, SemanticRegistry};
use crate::core::{ContentHash, CsdlConfig, Result, StructuredMessage};
use crate::intent::{EnhancedCompressor, TokenCounter, Translator, VocabularyMapper};
use crate::semantic::compressor::EMBEDDING_TOKEN_COST;
use crate::semantic::{EmbeddingEnvelope, EmbeddingProvider, LexicalEmbedder, SemanticCompressor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// How far to compress a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionLevel {
    /// Text as is
    None,
    /// Structured intent with long keys
    V1,
    /// Structured intent with short keys and enum codes
    V2Enhanced,
    /// Quantized embedding
    V2Semantic,
    /// Binary frame of the V2 form
    Cbp,
}

/// Result of [`Pipeline::compress`].
#[derive(Clone, Debug)]
pub enum CompressedOutput {
    Text(String),
    Structured(StructuredMessage),
    Embedding(EmbeddingEnvelope),
    Frame(EncodedFrame),
}

impl CompressedOutput {
    /// Size of the output as it would be sent.
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Structured(msg) => serde_json::to_vec(msg).map(|v| v.len()).unwrap_or(0),
            Self::Embedding(envelope) => envelope.to_json().map(|s| s.len()).unwrap_or(0),
            Self::Frame(frame) => frame.bytes.len(),
        }
    }

    /// Estimated token cost; `None` for binary frames, which bypass the tokenizer.
    pub fn token_estimate(&self, counter: &TokenCounter) -> Option<usize> {
        match self {
            Self::Text(text) => Some(counter.count_text(text)),
            Self::Structured(msg) => Some(counter.count_structured(msg)),
            Self::Embedding(_) => Some(EMBEDDING_TOKEN_COST),
            Self::Frame(_) => None,
        }
    }
}

/// Text-to-wire compression across all levels.
pub struct Pipeline {
    enhanced: EnhancedCompressor,
    semantic: SemanticCompressor,
    encoder: CbpEncoder,
    decoder: CbpDecoder,
}

impl Pipeline {
    /// Pipeline with default settings and the offline lexical embedder.
    pub fn new(registry: Arc<SemanticRegistry>) -> Self {
        Self::with_config(
            registry,
            Arc::new(LexicalEmbedder::new()),
            &CsdlConfig::default(),
        )
    }

    /// Pipeline over an injected registry and embedding provider.
    pub fn with_config(
        registry: Arc<SemanticRegistry>,
        provider: Arc<dyn EmbeddingProvider>,
        config: &CsdlConfig,
    ) -> Self {
        let translator = Translator::with_parts(
            Arc::new(VocabularyMapper::new()),
            TokenCounter::new(),
            config.translator.clone(),
        );
        info!(
            model = provider.model_name(),
            dedup = config.cbp.use_dedup,
            lz4 = config.cbp.use_lz4,
            "compression pipeline ready"
        );
        Self {
            enhanced: EnhancedCompressor::with_translator(translator),
            semantic: SemanticCompressor::with_config(provider, config.semantic.clone()),
            encoder: CbpEncoder::with_config(Arc::clone(&registry), &config.cbp),
            decoder: CbpDecoder::new(registry),
        }
    }

    pub fn translator(&self) -> &Translator {
        self.enhanced.translator()
    }

    pub fn encoder(&self) -> &CbpEncoder {
        &self.encoder
    }

    pub fn semantic(&self) -> &SemanticCompressor {
        &self.semantic
    }

    /// Compress `text` at `level`.
    pub async fn compress(&self, text: &str, level: CompressionLevel) -> Result<CompressedOutput> {
        let output = match level {
            CompressionLevel::None => CompressedOutput::Text(text.to_string()),
            CompressionLevel::V1 => {
                CompressedOutput::Structured(self.translator().translate_to_agent(text))
            }
            CompressionLevel::V2Enhanced => {
                CompressedOutput::Structured(self.enhanced.compress_enhanced(text))
            }
            CompressionLevel::V2Semantic => {
                CompressedOutput::Embedding(self.semantic.compress_default(text).await?)
            }
            CompressionLevel::Cbp => {
                CompressedOutput::Frame(self.encode(&self.enhanced.compress_enhanced(text), None)?)
            }
        };

        debug!(
            level = ?level,
            input = text.len(),
            output = output.size_bytes(),
            "compressed text"
        );
        Ok(output)
    }

    /// Encode an already structured message into a frame.
    pub fn encode(
        &self,
        msg: &StructuredMessage,
        delta_base: Option<ContentHash>,
    ) -> Result<EncodedFrame> {
        self.encoder.encode(msg, delta_base)
    }

    /// Recover an instruction from an output.
    ///
    /// Embeddings are lossy and return `None`. Frames are decoded against
    /// the pipeline's registry.
    pub fn expand(&self, output: &CompressedOutput) -> Result<Option<String>> {
        let text = match output {
            CompressedOutput::Text(text) => text.clone(),
            CompressedOutput::Structured(msg) => self.render(msg),
            CompressedOutput::Embedding(_) => return Ok(None),
            CompressedOutput::Frame(frame) => {
                let decoded = self.decoder.decode(&frame.bytes)?;
                self.render(&decoded.message)
            }
        };
        Ok(Some(text))
    }

    fn render(&self, msg: &StructuredMessage) -> String {
        let long = self.enhanced.decompress_enhanced(msg);
        self.translator().translate_to_human(&long)
    }
}
