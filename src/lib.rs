//! # CSDL - compression and wire protocol for agent messages
//!
//! Layered compression for messages exchanged between agents:
//! - **intent**: natural-language instructions to structured intents (V1)
//!   and their key/enum-compacted form (V2)
//! - **semantic**: quantized embeddings and similarity search
//! - **cbp**: Compact Binary Protocol frames with deduplication, deltas
//!   and LZ4
//! - **csdl**: the `T`/`C`/`R` message envelope and a pipeline that applies
//!   a chosen compression level
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use csdl::cbp::{CbpDecoder, CbpEncoder, SemanticRegistry};
//! use csdl::intent::EnhancedCompressor;
//!
//! fn main() -> csdl::Result<()> {
//!     let compressor = EnhancedCompressor::new();
//!     let msg = compressor.compress_enhanced("Build a secure JWT authentication system");
//!
//!     let sender = SemanticRegistry::shared();
//!     let receiver = SemanticRegistry::shared();
//!     let frame = CbpEncoder::new(sender).encode(&msg, None)?;
//!     let decoded = CbpDecoder::new(receiver).decode(&frame.bytes)?;
//!     assert_eq!(decoded.message, msg);
//!     Ok(())
//! }
//! ```

pub mod cbp;
pub mod core;
pub mod csdl;
pub mod intent;
pub mod semantic;

pub use core::error::{Error, Result};
