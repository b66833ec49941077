//! CBP encoder and decoder.
//!
//! Encoding tries, in order: a hash reference to a payload the registry
//! already holds, a delta against a caller-supplied base, and finally the raw
//! body (LZ4 compressed when that pays off). Decoding reverses the chosen
//! path and mirrors every full payload it sees into its registry so later
//! references from the same peer resolve.
//!
//! The encoder touches its registry only after a frame has been built, so a
//! failed call leaves nothing behind that a later reference could point to.

use crate::cbp::compression::{BlockCompressor, CompressionStats};
use crate::cbp::delta::{DeltaEncoder, DeltaRecord};
use crate::cbp::frame::{Block, Frame, FramePayload, MAX_PAYLOAD};
use crate::cbp::registry::{RegistryStats, SemanticRegistry};
use crate::cbp::value::{decode_message, encode_message, WireValue};
use crate::core::config::CbpConfig;
use crate::core::{round_to, ContentHash, Error, Result, StructuredMessage};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Which encoding a frame used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodePath {
    /// Full body
    Raw,
    /// Hash reference to a known payload
    Dedup,
    /// Changes against a base
    Delta,
}

/// Per-call encoding metrics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompressionMetrics {
    /// Path taken
    pub path: EncodePath,
    /// Compact JSON size of the message
    pub original_bytes: usize,
    /// Serialized binary body size before framing
    pub payload_bytes: usize,
    /// Final frame size
    pub encoded_bytes: usize,
    /// (original - encoded) / original, as a percentage
    pub reduction_percent: f64,
    /// original / encoded
    pub compression_ratio: f64,
    /// Whether the body was LZ4 compressed
    pub compressed: bool,
    /// LZ4 attempt on the body; `None` for hash references
    pub compression: Option<CompressionStats>,
    /// Content hash of the full message payload, usable as a delta base
    pub content_hash: ContentHash,
    /// Bytes the registry saved on this call
    pub bytes_saved: usize,
    /// Encoding time in microseconds
    pub elapsed_us: u64,
}

/// An encoded frame and how it was produced.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    pub metrics: CompressionMetrics,
}

/// Cumulative encoder statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EncoderStats {
    pub messages: u64,
    pub total_original_bytes: u64,
    pub total_encoded_bytes: u64,
    pub reduction_percent: f64,
    pub dedup_frames: u64,
    pub delta_frames: u64,
    pub compressed_frames: u64,
    pub registry: RegistryStats,
}

/// JSON versus CBP size for one message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonComparison {
    pub json_bytes: usize,
    pub cbp_bytes: usize,
    pub reduction_percent: f64,
    pub compression_ratio: f64,
}

#[derive(Debug, Default)]
struct Counters {
    messages: AtomicU64,
    original_bytes: AtomicU64,
    encoded_bytes: AtomicU64,
    dedup_frames: AtomicU64,
    delta_frames: AtomicU64,
    compressed_frames: AtomicU64,
}

/// Encodes structured messages into CBP frames.
#[derive(Debug)]
pub struct CbpEncoder {
    registry: Arc<SemanticRegistry>,
    delta: DeltaEncoder,
    compressor: BlockCompressor,
    use_dedup: bool,
    counters: Counters,
}

impl CbpEncoder {
    /// Encoder with default settings over a shared registry.
    pub fn new(registry: Arc<SemanticRegistry>) -> Self {
        Self::with_config(registry, &CbpConfig::default())
    }

    /// Encoder configured from `config`.
    pub fn with_config(registry: Arc<SemanticRegistry>, config: &CbpConfig) -> Self {
        let compressor = if config.use_lz4 {
            BlockCompressor::new(config.lz4_threshold)
        } else {
            BlockCompressor::disabled()
        };
        Self {
            delta: DeltaEncoder::new(Arc::clone(&registry)),
            registry,
            compressor,
            use_dedup: config.use_dedup,
            counters: Counters::default(),
        }
    }

    pub fn registry(&self) -> &Arc<SemanticRegistry> {
        &self.registry
    }

    /// Encode `msg`, optionally as a delta against `delta_base`.
    ///
    /// A delta base must already be in the registry, typically the
    /// `content_hash` of an earlier frame; otherwise the call fails with
    /// [`Error::UnknownReference`]. A delta that would not fit a frame is
    /// sent as a full body instead.
    pub fn encode(
        &self,
        msg: &StructuredMessage,
        delta_base: Option<ContentHash>,
    ) -> Result<EncodedFrame> {
        self.encode_with(msg, delta_base, self.use_dedup)
    }

    /// Encode `msg` as a full body, never as a hash reference.
    ///
    /// This is the resend a peer asks for after failing with
    /// [`Error::UnknownReference`]. The payload is still registered, so later
    /// references to it resolve on both sides.
    pub fn encode_full(&self, msg: &StructuredMessage) -> Result<EncodedFrame> {
        self.encode_with(msg, None, false)
    }

    fn encode_with(
        &self,
        msg: &StructuredMessage,
        delta_base: Option<ContentHash>,
        allow_ref: bool,
    ) -> Result<EncodedFrame> {
        let start = Instant::now();
        let original_bytes = serde_json::to_vec(msg)?.len();
        let payload = encode_message(msg)?;
        let hash = SemanticRegistry::hash(&payload);

        let (path, frame_payload, compression) = if allow_ref && self.registry.contains(hash) {
            (EncodePath::Dedup, FramePayload::HashRef(hash), None)
        } else {
            self.plan_body(msg, &payload, delta_base)?
        };
        let compressed = compression.as_ref().is_some_and(|stats| stats.applied);
        let bytes = Frame::new(frame_payload).to_bytes()?;

        let bytes_saved = if allow_ref {
            let outcome = self.registry.store_or_ref(&payload);
            if path == EncodePath::Dedup {
                outcome.bytes_saved
            } else {
                0
            }
        } else {
            self.registry.register(&payload);
            0
        };

        let metrics = CompressionMetrics {
            path,
            original_bytes,
            payload_bytes: payload.len(),
            encoded_bytes: bytes.len(),
            reduction_percent: round_to(reduction(original_bytes, bytes.len()), 2),
            compression_ratio: ratio(original_bytes, bytes.len()),
            compressed,
            compression,
            content_hash: hash,
            bytes_saved,
            elapsed_us: start.elapsed().as_micros() as u64,
        };
        self.record(&metrics);

        debug!(
            path = ?metrics.path,
            hash = %hash,
            original = original_bytes,
            encoded = bytes.len(),
            "encoded frame"
        );

        Ok(EncodedFrame { bytes, metrics })
    }

    /// Choose a delta or raw body that fits a frame.
    fn plan_body(
        &self,
        msg: &StructuredMessage,
        payload: &[u8],
        delta_base: Option<ContentHash>,
    ) -> Result<(EncodePath, FramePayload, Option<CompressionStats>)> {
        if let Some(base) = delta_base {
            let record = self.delta.compute_delta(msg, Some(base))?;
            let (body, stats) = self.block(record.to_wire().to_bytes()?);
            if ContentHash::WIRE_SIZE + body.as_bytes().len() <= MAX_PAYLOAD {
                return Ok((EncodePath::Delta, FramePayload::Delta { base, body }, Some(stats)));
            }
            debug!(
                base = %base,
                len = body.as_bytes().len(),
                "delta does not fit a frame, sending full body"
            );
        }

        let (body, stats) = self.block(payload.to_vec());
        if body.as_bytes().len() > MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge(payload.len()));
        }
        Ok((EncodePath::Raw, FramePayload::Raw(body), Some(stats)))
    }

    /// Compare compact JSON with a fresh CBP encoding of `msg`.
    ///
    /// Uses a scratch registry, so the shared registry and the cumulative
    /// statistics are untouched.
    pub fn compare_with_json(&self, msg: &StructuredMessage) -> Result<JsonComparison> {
        let scratch = CbpEncoder {
            registry: SemanticRegistry::shared(),
            delta: DeltaEncoder::new(SemanticRegistry::shared()),
            compressor: self.compressor,
            use_dedup: false,
            counters: Counters::default(),
        };
        let encoded = scratch.encode(msg, None)?;
        let json_bytes = encoded.metrics.original_bytes;
        let cbp_bytes = encoded.metrics.encoded_bytes;

        Ok(JsonComparison {
            json_bytes,
            cbp_bytes,
            reduction_percent: round_to(reduction(json_bytes, cbp_bytes), 2),
            compression_ratio: ratio(json_bytes, cbp_bytes),
        })
    }

    /// Cumulative statistics.
    pub fn get_stats(&self) -> EncoderStats {
        let c = &self.counters;
        let original = c.original_bytes.load(Ordering::Relaxed);
        let encoded = c.encoded_bytes.load(Ordering::Relaxed);
        EncoderStats {
            messages: c.messages.load(Ordering::Relaxed),
            total_original_bytes: original,
            total_encoded_bytes: encoded,
            reduction_percent: round_to(reduction(original as usize, encoded as usize), 2),
            dedup_frames: c.dedup_frames.load(Ordering::Relaxed),
            delta_frames: c.delta_frames.load(Ordering::Relaxed),
            compressed_frames: c.compressed_frames.load(Ordering::Relaxed),
            registry: self.registry.get_stats(),
        }
    }

    fn block(&self, body: Vec<u8>) -> (Block, CompressionStats) {
        match self.compressor.maybe_compress(&body) {
            (Some(compressed), stats) => (Block::Lz4(compressed), stats),
            (None, stats) => (Block::Plain(body), stats),
        }
    }

    fn record(&self, metrics: &CompressionMetrics) {
        let c = &self.counters;
        c.messages.fetch_add(1, Ordering::Relaxed);
        c.original_bytes
            .fetch_add(metrics.original_bytes as u64, Ordering::Relaxed);
        c.encoded_bytes
            .fetch_add(metrics.encoded_bytes as u64, Ordering::Relaxed);
        match metrics.path {
            EncodePath::Dedup => c.dedup_frames.fetch_add(1, Ordering::Relaxed),
            EncodePath::Delta => c.delta_frames.fetch_add(1, Ordering::Relaxed),
            EncodePath::Raw => 0,
        };
        if metrics.compressed {
            c.compressed_frames.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A decoded frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedMessage {
    /// Reconstructed message
    pub message: StructuredMessage,
    /// Path the sender used
    pub path: EncodePath,
    /// Content hash of the full message payload
    pub content_hash: ContentHash,
    /// Size of the frame that was decoded
    pub frame_bytes: usize,
    /// Decoding time in microseconds
    pub elapsed_us: u64,
}

/// Decodes CBP frames.
#[derive(Clone, Debug)]
pub struct CbpDecoder {
    registry: Arc<SemanticRegistry>,
    delta: DeltaEncoder,
}

impl CbpDecoder {
    /// Decoder resolving references against `registry`.
    pub fn new(registry: Arc<SemanticRegistry>) -> Self {
        Self {
            delta: DeltaEncoder::new(Arc::clone(&registry)),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<SemanticRegistry> {
        &self.registry
    }

    /// Decode a frame.
    ///
    /// Reconstructed delta messages are registered under the hash of their
    /// own encoding, which is the hash the sender registered.
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedMessage> {
        let start = Instant::now();
        let frame = Frame::parse(bytes)?;

        let (path, message, content_hash) = match frame.payload {
            FramePayload::HashRef(hash) => {
                let payload = self.registry.get(hash).ok_or_else(|| {
                    warn!(hash = %hash, "hash reference not in registry");
                    Error::UnknownReference(hash)
                })?;
                (EncodePath::Dedup, decode_message(&payload)?, hash)
            }
            FramePayload::Raw(body) => {
                let payload = body.into_plain()?;
                let message = decode_message(&payload)?;
                let hash = self.registry.register(&payload);
                (EncodePath::Raw, message, hash)
            }
            FramePayload::Delta { base, body } => {
                let plain = body.into_plain()?;
                let record = DeltaRecord::from_wire(Some(base), WireValue::from_bytes(&plain)?)?;
                let message = self.delta.reconstruct(&record)?;
                let hash = self.registry.register(&encode_message(&message)?);
                (EncodePath::Delta, message, hash)
            }
        };

        debug!(path = ?path, hash = %content_hash, len = bytes.len(), "decoded frame");

        Ok(DecodedMessage {
            message,
            path,
            content_hash,
            frame_bytes: bytes.len(),
            elapsed_us: start.elapsed().as_micros() as u64,
        })
    }
}

fn reduction(original: usize, encoded: usize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (original as f64 - encoded as f64) / original as f64 * 100.0
}

fn ratio(original: usize, encoded: usize) -> f64 {
    if encoded == 0 {
        return 1.0;
    }
    original as f64 / encoded as f64
}
