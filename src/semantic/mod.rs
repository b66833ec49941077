//! Embedding layer: lossy, searchable compression of text.

pub mod compressor;
pub mod embedder;

pub use compressor::{
    cosine_similarity, Candidate, EmbeddingEnvelope, SemanticCompressionReport, SemanticCompressor,
    SimilarityMatch,
};
pub use embedder::{EmbeddingProvider, LexicalEmbedder};
