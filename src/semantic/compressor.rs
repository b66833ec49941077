//! Lossy embedding compression (V2 semantic).
//!
//! Text is embedded by an [`EmbeddingProvider`], each component is clamped to
//! `[-1, 1]` and linearly quantized to a signed `bits`-wide integer with scale
//! `2^(bits-1) - 1`, and the integers are bit-packed little-endian and base64
//! encoded. Providers are expected to return roughly unit-scale vectors;
//! components outside `[-1, 1]` saturate. The result is a searchable proxy
//! for the text, not a reversible encoding of it.

use crate::core::config::SemanticConfig;
use crate::core::{round_to, Error, Result};
use crate::intent::tokens::TokenCounter;
use crate::semantic::embedder::{check_dimensions, EmbeddingProvider};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Narrowest supported quantization.
pub const MIN_BITS: u8 = 2;

/// Widest supported quantization.
pub const MAX_BITS: u8 = 16;

/// Token cost charged for an embedding reference.
pub const EMBEDDING_TOKEN_COST: usize = 5;

/// Serialized quantized embedding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingEnvelope {
    /// Base64 of the packed integers
    pub emb: String,
    /// Number of components
    pub dim: usize,
    /// Bits per component
    pub bits: u8,
    /// Model that produced the vector
    pub model: String,
}

impl EmbeddingEnvelope {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidEnvelope(e.to_string()))
    }
}

/// Something to compare a query against.
#[derive(Clone, Debug)]
pub enum Candidate {
    /// Raw text, embedded on demand
    Text(String),
    /// Previously compressed embedding
    Envelope(EmbeddingEnvelope),
    /// Plain vector
    Vector(Vec<f32>),
}

/// A ranked similarity hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    /// Position in the candidate list
    pub index: usize,
    /// Cosine similarity to the query
    pub score: f32,
}

/// Token accounting for the embedding tier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SemanticCompressionReport {
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    pub reduction_percent: f64,
}

/// Embedding-based compressor.
#[derive(Clone)]
pub struct SemanticCompressor {
    provider: Arc<dyn EmbeddingProvider>,
    config: SemanticConfig,
    counter: TokenCounter,
}

impl SemanticCompressor {
    /// Compressor with default configuration.
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self::with_config(provider, SemanticConfig::default())
    }

    pub fn with_config(provider: Arc<dyn EmbeddingProvider>, config: SemanticConfig) -> Self {
        Self {
            provider,
            config,
            counter: TokenCounter::new(),
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn config(&self) -> &SemanticConfig {
        &self.config
    }

    /// Embed `text`, bounded by the configured timeout.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let timeout = self.config.timeout();
        let vector = tokio::time::timeout(timeout, self.provider.embed(text))
            .await
            .map_err(|_| {
                warn!(?timeout, model = self.provider.model_name(), "embedding timed out");
                Error::EmbeddingTimeout(timeout)
            })??;
        check_dimensions(self.provider.as_ref(), &vector)?;
        Ok(vector)
    }

    /// Embed and quantize `text` to `bits` bits per component.
    pub async fn compress(&self, text: &str, bits: u8) -> Result<EmbeddingEnvelope> {
        check_bits(bits)?;
        let vector = self.embed(text).await?;
        let packed = quantize(&vector, bits)?;

        debug!(dim = vector.len(), bits, bytes = packed.len(), "compressed embedding");

        Ok(EmbeddingEnvelope {
            emb: STANDARD.encode(&packed),
            dim: vector.len(),
            bits,
            model: self.provider.model_name().to_string(),
        })
    }

    /// [`compress`](Self::compress) with the configured default width.
    pub async fn compress_default(&self, text: &str) -> Result<EmbeddingEnvelope> {
        self.compress(text, self.config.default_bits).await
    }

    /// [`compress`](Self::compress), abandoned as soon as `cancel` completes.
    pub async fn compress_until<F>(&self, text: &str, bits: u8, cancel: F) -> Result<EmbeddingEnvelope>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.compress(text, bits) => result,
            _ = cancel => {
                warn!(model = self.provider.model_name(), "embedding cancelled");
                Err(Error::EmbeddingCancelled)
            }
        }
    }

    /// Recover the approximate vector from an envelope.
    pub fn decompress(&self, envelope: &EmbeddingEnvelope) -> Result<Vec<f32>> {
        decompress(envelope)
    }

    /// Rank `candidates` by cosine similarity to `query`.
    ///
    /// Returns at most `top_k` (configured default when `None`) matches
    /// scoring at least `threshold`, best first. Candidates with a zero
    /// vector or a different dimension are skipped.
    pub async fn find_similar(
        &self,
        query: &str,
        candidates: &[Candidate],
        top_k: Option<usize>,
        threshold: f32,
    ) -> Result<Vec<SimilarityMatch>> {
        let query_vector = self.embed(query).await?;
        let vectors = try_join_all(candidates.iter().map(|c| self.candidate_vector(c))).await?;

        let mut matches: Vec<SimilarityMatch> = vectors
            .iter()
            .enumerate()
            .filter_map(|(index, vector)| {
                cosine_similarity(&query_vector, vector).map(|score| SimilarityMatch { index, score })
            })
            .filter(|m| m.score >= threshold)
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
        matches.truncate(top_k.unwrap_or(self.config.top_k));
        Ok(matches)
    }

    /// Token saving from replacing `text` with an embedding reference.
    pub fn measure_compression(&self, text: &str) -> SemanticCompressionReport {
        let original_tokens = self.counter.count_text(text);
        SemanticCompressionReport {
            original_tokens,
            compressed_tokens: EMBEDDING_TOKEN_COST,
            reduction_percent: round_to(
                TokenCounter::reduction(original_tokens, EMBEDDING_TOKEN_COST),
                2,
            ),
        }
    }

    async fn candidate_vector(&self, candidate: &Candidate) -> Result<Vec<f32>> {
        match candidate {
            Candidate::Text(text) => self.embed(text).await,
            Candidate::Envelope(envelope) => decompress(envelope),
            Candidate::Vector(vector) => Ok(vector.clone()),
        }
    }
}

impl std::fmt::Debug for SemanticCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticCompressor")
            .field("model", &self.provider.model_name())
            .field("config", &self.config)
            .finish()
    }
}

fn check_bits(bits: u8) -> Result<()> {
    if (MIN_BITS..=MAX_BITS).contains(&bits) {
        Ok(())
    } else {
        Err(Error::UnsupportedQuantization(bits))
    }
}

fn scale(bits: u8) -> f32 {
    ((1i32 << (bits - 1)) - 1) as f32
}

/// Packed size of `dim` components at `bits` each, or `None` on overflow.
pub fn packed_len(dim: usize, bits: u8) -> Option<usize> {
    dim.checked_mul(bits as usize).map(|total| total.div_ceil(8))
}

/// Quantize and bit-pack a vector.
pub fn quantize(vector: &[f32], bits: u8) -> Result<Vec<u8>> {
    check_bits(bits)?;
    let scale = scale(bits);
    let mask = (1u32 << bits) - 1;

    let mut out = Vec::with_capacity(packed_len(vector.len(), bits).unwrap_or(0));
    let mut acc: u64 = 0;
    let mut filled: u32 = 0;
    for &v in vector {
        let q = (v.clamp(-1.0, 1.0) * scale).round() as i32;
        acc |= ((q as u32 & mask) as u64) << filled;
        filled += bits as u32;
        while filled >= 8 {
            out.push(acc as u8);
            acc >>= 8;
            filled -= 8;
        }
    }
    if filled > 0 {
        out.push(acc as u8);
    }
    Ok(out)
}

/// Unpack and rescale `dim` components.
pub fn dequantize(packed: &[u8], dim: usize, bits: u8) -> Result<Vec<f32>> {
    check_bits(bits)?;
    let expected = packed_len(dim, bits).ok_or_else(|| {
        Error::InvalidEnvelope(format!("{} components at {} bits overflow", dim, bits))
    })?;
    if packed.len() != expected {
        return Err(Error::InvalidEnvelope(format!(
            "{} components at {} bits need {} bytes, got {}",
            dim,
            bits,
            expected,
            packed.len()
        )));
    }

    let scale = scale(bits);
    let mask = (1u32 << bits) - 1;
    let sign_bit = 1u32 << (bits - 1);

    let mut out = Vec::with_capacity(dim);
    let mut bytes = packed.iter();
    let mut acc: u64 = 0;
    let mut filled: u32 = 0;
    for _ in 0..dim {
        while filled < bits as u32 {
            let byte = bytes.next().copied().unwrap_or(0);
            acc |= (byte as u64) << filled;
            filled += 8;
        }
        let raw = (acc as u32) & mask;
        acc >>= bits;
        filled -= bits as u32;

        let q = if raw & sign_bit != 0 {
            raw as i32 - (1i32 << bits)
        } else {
            raw as i32
        };
        out.push(q as f32 / scale);
    }
    Ok(out)
}

/// Recover the approximate vector from an envelope.
pub fn decompress(envelope: &EmbeddingEnvelope) -> Result<Vec<f32>> {
    check_bits(envelope.bits)?;
    let packed = STANDARD.decode(envelope.emb.as_bytes())?;
    dequantize(&packed, envelope.dim, envelope.bits)
}

/// Cosine similarity, or `None` for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        Some(dot / (norm_a * norm_b))
    } else {
        None
    }
}
