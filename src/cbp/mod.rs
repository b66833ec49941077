//! Compact Binary Protocol (CBP)
//!
//! Binary wire format for structured messages:
//! - Schema tables mapping field names and enum values to single bytes
//! - Content-addressed deduplication through a shared registry
//! - Top-level field deltas against registered messages
//! - Checksummed frames with optional LZ4 bodies

pub mod codec;
pub mod compression;
pub mod delta;
pub mod frame;
pub mod registry;
pub mod schema;
pub mod value;

pub use codec::{
    CbpDecoder, CbpEncoder, CompressionMetrics, DecodedMessage, EncodePath, EncodedFrame,
    EncoderStats, JsonComparison,
};
pub use delta::{DeltaEncoder, DeltaRecord};
pub use frame::{Block, Frame, FramePayload};
pub use registry::{RegistryStats, SemanticRegistry, StoreOutcome};
pub use schema::{SchemaRegistry, SymbolTable};
pub use value::{WireKey, WireValue};
