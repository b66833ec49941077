//! CSDL message surface: the edge envelope and the compression pipeline.

pub mod envelope;
pub mod pipeline;

pub use envelope::{CsdlMessage, CsdlMessageType, DEFAULT_PRIORITY};
pub use pipeline::{CompressedOutput, CompressionLevel, Pipeline};
